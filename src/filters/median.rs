use std::collections::VecDeque;

/// Fixed-window median smoother for spike rejection on one rate/accel axis.
#[derive(Clone, Debug)]
pub struct MedianFilter {
    window: VecDeque<f64>,
    window_size: usize,
}

impl MedianFilter {
    /// `window_size` below 1 is raised to 1.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        MedianFilter {
            window: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Push `input` (evicting the oldest once full) and return the median of
    /// the current window. Even-length windows yield the upper-middle value.
    pub fn apply(&mut self, input: f64) -> f64 {
        self.window.push_back(input);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[sorted.len() / 2]
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}
