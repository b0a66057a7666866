use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Label carrying the metric name in remote-write label sets. It never
/// appears in [`Record::tags`].
pub const METRIC_NAME_LABEL: &str = "__name__";

/// One persisted sample: metric name, epoch-millisecond timestamp, value and
/// the remaining labels.
///
/// Serialized as a single JSON object per line in the open batch file:
///
/// ```
/// use tsexport::Record;
///
/// let record = Record::new("up", 1_504_779_771_421, 1.0).with_tag("job", "node");
/// let line = serde_json::to_string(&record).unwrap();
/// assert!(line.starts_with(r#"{"metric":"up","timestamp":1504779771421,"value":1.0"#));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub metric: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub value: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Record {
    pub fn new(metric: impl Into<String>, timestamp_ms: i64, value: f64) -> Self {
        Self {
            metric: metric.into(),
            timestamp_ms,
            value,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Build a record from a raw label set. Returns `None` when the set has no
    /// metric name label; the name label itself is dropped from the tags.
    pub fn from_labels<I, K, V>(labels: I, timestamp_ms: i64, value: f64) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut metric = None;
        let mut tags = HashMap::new();
        for (name, label_value) in labels {
            let name = name.into();
            if name == METRIC_NAME_LABEL {
                metric = Some(label_value.into());
            } else {
                tags.insert(name, label_value.into());
            }
        }

        metric.map(|metric| Self {
            metric,
            timestamp_ms,
            value,
            tags,
        })
    }

    /// Records with an empty metric or a NaN value must never reach a writer.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.metric.is_empty() {
            return Err(RecordError::EmptyMetric);
        }
        if self.value.is_nan() {
            return Err(RecordError::NaNValue {
                metric: self.metric.clone(),
            });
        }
        Ok(())
    }
}
