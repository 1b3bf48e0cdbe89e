// TensorBoard-style scalar logging: one `step,value` CSV per tag
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::trainers::stats::{Metrics, StatsWriter};

const HEADER: &str = "step,value";

/// Keeps one buffered handle per tag open for the life of the run. Rows for a
/// step are buffered and flushed together once every tag has been written.
pub struct CsvWriter {
    log_dir: PathBuf,
    series: HashMap<String, BufWriter<File>>,
}

impl CsvWriter {
    pub fn new(log_dir: &Path, run_name: &str) -> Result<Self> {
        let log_path = log_dir.join(run_name);
        std::fs::create_dir_all(&log_path)?;

        Ok(Self {
            log_dir: log_path,
            series: HashMap::new(),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// `training/critic_loss` lands in `training_critic_loss.csv`.
    pub fn scalar_path(&self, tag: &str) -> PathBuf {
        self.log_dir.join(format!("{}.csv", tag.replace('/', "_")))
    }

    fn open_series(&self, tag: &str) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.scalar_path(tag))?;
        let fresh = file.metadata()?.len() == 0;
        let mut out = BufWriter::new(file);
        if fresh {
            writeln!(out, "{}", HEADER)?;
        }
        Ok(out)
    }

    /// Buffers one row; call `flush` to push it to disk.
    pub fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        if !self.series.contains_key(tag) {
            let out = self.open_series(tag)?;
            self.series.insert(tag.to_string(), out);
        }
        if let Some(out) = self.series.get_mut(tag) {
            writeln!(out, "{},{}", step, value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for out in self.series.values_mut() {
            out.flush()?;
        }
        Ok(())
    }

    pub fn log_hyperparams(&self, hparams: &serde_json::Value) -> Result<()> {
        let hparams_path = self.log_dir.join("hparams.json");
        std::fs::write(hparams_path, serde_json::to_string_pretty(hparams)?)?;
        Ok(())
    }
}

impl StatsWriter for CsvWriter {
    fn write(&mut self, metrics: &Metrics, step: u64) -> Result<()> {
        for (tag, value) in metrics {
            self.add_scalar(tag, *value, step)?;
        }
        self.flush()
    }
}
