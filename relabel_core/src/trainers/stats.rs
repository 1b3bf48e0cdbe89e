// Stats - metric flattening, accumulation and the sinks they are written to
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::Result;

/// Reduced metrics: tag -> scalar.
pub type Metrics = BTreeMap<String, f64>;

/// Joins nested object keys with `sep`. Non-object values are kept as-is.
pub fn flatten(map: &Map<String, Value>, sep: &str) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, map, "", sep);
    out
}

fn flatten_into(out: &mut Map<String, Value>, map: &Map<String, Value>, prefix: &str, sep: &str) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}{}{}", prefix, sep, key)
        };
        match value {
            Value::Object(inner) => flatten_into(out, inner, &name, sep),
            leaf => {
                out.insert(name, leaf.clone());
            }
        }
    }
}

/// Appends every field of `record` to the sequence stored under its key.
pub fn add_to(acc: &mut BTreeMap<String, Vec<Value>>, record: &Map<String, Value>) {
    for (key, value) in record {
        acc.entry(key.clone()).or_default().push(value.clone());
    }
}

/// Prefixes every tag with `namespace/`.
pub fn prefixed(namespace: &str, metrics: &Metrics) -> Metrics {
    metrics
        .iter()
        .map(|(key, value)| (format!("{}/{}", namespace, key), *value))
        .collect()
}

fn as_scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[derive(Debug, Default, Clone)]
pub struct MetricsAccumulator {
    values: BTreeMap<String, Vec<Value>>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &Map<String, Value>) {
        add_to(&mut self.values, record);
    }

    pub fn add_scalars(&mut self, record: &Metrics) {
        for (key, value) in record {
            self.values
                .entry(key.clone())
                .or_default()
                .push(Value::from(*value));
        }
    }

    /// Mean of every key whose values are all numeric. Keys holding
    /// anything else are skipped with a warning.
    pub fn means(&self) -> Metrics {
        let mut out = Metrics::new();
        for (key, values) in &self.values {
            let scalars: Option<Vec<f64>> = values.iter().map(as_scalar).collect();
            match scalars {
                Some(scalars) if !scalars.is_empty() => {
                    let mean = scalars.iter().sum::<f64>() / scalars.len() as f64;
                    out.insert(key.clone(), mean);
                }
                Some(_) => {}
                None => log::warn!("Skipping non-numeric metric {}", key),
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub trait StatsWriter {
    fn write(&mut self, metrics: &Metrics, step: u64) -> Result<()>;
}

/// Writes each batch of metrics as one log record.
pub struct ConsoleWriter;

impl StatsWriter for ConsoleWriter {
    fn write(&mut self, metrics: &Metrics, step: u64) -> Result<()> {
        let line = metrics
            .iter()
            .map(|(key, value)| format!("{}={:.4}", key, value))
            .collect::<Vec<_>>()
            .join(" ");
        log::info!("Step {}: {}", step, line);
        Ok(())
    }
}

/// Fans namespaced metrics out to every registered writer.
pub struct StatsReporter {
    writers: Vec<Box<dyn StatsWriter>>,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self {
            writers: Vec::new(),
        }
    }

    pub fn add_writer(&mut self, writer: Box<dyn StatsWriter>) {
        self.writers.push(writer);
    }

    pub fn write_stats(&mut self, namespace: &str, metrics: &Metrics, step: u64) -> Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        let tagged = prefixed(namespace, metrics);
        for writer in &mut self.writers {
            writer.write(&tagged, step)?;
        }
        Ok(())
    }
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::new()
    }
}
