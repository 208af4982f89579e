/// Single-pole IIR smoother for one attitude axis.
///
/// Parameters are fixed at construction; changing the cutoff means building
/// a new filter and dropping the old state.
#[derive(Clone, Debug)]
pub struct LowPassFilter {
    alpha: f64,
    last_output: Option<f64>,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let dt = 1.0 / sample_rate_hz;
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let alpha = dt / (rc + dt);
        Self {
            alpha,
            last_output: None,
        }
    }

    /// First call passes the input through and seeds the state.
    pub fn apply(&mut self, input: f64) -> f64 {
        let output = match self.last_output {
            None => input,
            Some(prev) => self.alpha * input + (1.0 - self.alpha) * prev,
        };
        self.last_output = Some(output);
        output
    }

    pub fn reset(&mut self) {
        self.last_output = None;
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
