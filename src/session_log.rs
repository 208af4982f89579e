use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::motion_processor::ProcessingStats;
use crate::types::{GestureEvent, MotionSample};

/// Recorded session: `{ "samples": [...], "events": [...] }`.
///
/// Angles stay in radians so a log can be fed back through the processor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub samples: Vec<MotionSample>,
    #[serde(default)]
    pub events: Vec<GestureEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessingStats>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl SessionLog {
    /// Read `.json` or gzip-compressed `.json.gz`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening log {}", path.display()))?;
        let log = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            serde_json::from_reader(BufReader::new(file))
        }
        .with_context(|| format!("parsing log {}", path.display()))?;
        Ok(log)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating log {}", path.display()))?;
        if is_gzip(path) {
            let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut gz, self)?;
            gz.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }
}
