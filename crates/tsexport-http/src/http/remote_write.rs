//! Prometheus remote-write wire format.
//!
//! A request body is a snappy block (not framed) wrapping a protobuf
//! `WriteRequest`. Only the fields the exporter reads are declared; unknown
//! fields such as metadata are skipped by the decoder.

use std::fmt;

use log::debug;
use prost::Message;
use tsexport::Record;

#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    Snappy(snap::Error),
    Protobuf(prost::DecodeError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Snappy(e) => write!(f, "Invalid snappy block: {e}"),
            DecodeError::Protobuf(e) => write!(f, "Invalid WriteRequest: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub fn decode_write_request(body: &[u8]) -> Result<WriteRequest, DecodeError> {
    let raw = snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(DecodeError::Snappy)?;
    WriteRequest::decode(raw.as_slice()).map_err(DecodeError::Protobuf)
}

/// Encodes `request` the way a Prometheus server sends it.
pub fn encode_write_request(request: &WriteRequest) -> Result<Vec<u8>, snap::Error> {
    snap::raw::Encoder::new().compress_vec(&request.encode_to_vec())
}

/// Records extracted from one `WriteRequest`.
#[derive(Debug, Default)]
pub struct Translation {
    pub records: Vec<Record>,
    /// Series without a `__name__` label.
    pub skipped_series: usize,
    pub skipped_samples: usize,
}

/// Turns every sample into a [`Record`] named after the series' `__name__`
/// label and tagged with its other labels. Series without a name and NaN
/// samples are dropped and counted.
pub fn into_records(request: WriteRequest) -> Translation {
    let mut translation = Translation::default();

    for series in request.timeseries {
        let labels = series.labels.into_iter().map(|l| (l.name, l.value));
        let Some(template) = Record::from_labels(labels, 0, 0.0) else {
            translation.skipped_series += 1;
            continue;
        };

        for sample in series.samples {
            if sample.value.is_nan() {
                debug!("Skipping NaN sample of {}", template.metric);
                translation.skipped_samples += 1;
                continue;
            }
            translation.records.push(Record {
                timestamp_ms: sample.timestamp,
                value: sample.value,
                ..template.clone()
            });
        }
    }

    translation
}
