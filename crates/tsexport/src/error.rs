use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    Storage(StorageError),
    PoolExhausted {
        max_total: usize,
    },
    PoolTimeout {
        waited_ms: u64,
    },
    PoolClosed,
    WriterClosed {
        writer_id: u64,
    },
    InvalidRecord(RecordError),
    Config {
        field: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    ReadFailed {
        context: String,
        source: Box<StorageErrorSource>,
    },
    WriteFailed {
        context: String,
        source: Box<StorageErrorSource>,
    },
    InsufficientSpace {
        context: String,
    },
    PermissionDenied {
        context: String,
    },
    Unavailable {
        context: String,
    },
    DirectoryLocked {
        context: String,
        pid: Option<u32>,
    },
    LockAcquisitionFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageErrorSource {
    Io(String),
    Serialization(String),
    Compression(String),
}

/// Reasons a decoded sample is refused before it reaches a writer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    EmptyMetric,
    NaNValue { metric: String },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Storage(err) => write!(f, "Storage error: {err}"),
            ExportError::PoolExhausted { max_total } => {
                write!(f, "Writer pool exhausted ({max_total} writers in use)")
            }
            ExportError::PoolTimeout { waited_ms } => {
                write!(f, "Timed out after {waited_ms}ms waiting for a writer")
            }
            ExportError::PoolClosed => write!(f, "Writer pool is closed"),
            ExportError::WriterClosed { writer_id } => {
                write!(f, "Writer {writer_id} is closed")
            }
            ExportError::InvalidRecord(err) => write!(f, "Invalid record: {err}"),
            ExportError::Config { field, reason } => {
                write!(f, "Invalid configuration for '{field}': {reason}")
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ReadFailed { context, source } => {
                write!(f, "Read failed in {context}: {source}")
            }
            StorageError::WriteFailed { context, source } => {
                write!(f, "Write failed in {context}: {source}")
            }
            StorageError::InsufficientSpace { context } => {
                write!(f, "Insufficient space in {context}")
            }
            StorageError::PermissionDenied { context } => {
                write!(f, "Permission denied in {context}")
            }
            StorageError::Unavailable { context } => {
                write!(f, "Storage unavailable in {context}")
            }
            StorageError::DirectoryLocked { context, pid } => match pid {
                Some(pid) => write!(f, "Directory locked in {context} (PID: {pid})"),
                None => write!(f, "Directory locked in {context}"),
            },
            StorageError::LockAcquisitionFailed => {
                write!(f, "Failed to acquire exclusive lock on file")
            }
        }
    }
}

impl fmt::Display for StorageErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorSource::Io(msg) => write!(f, "IO error: {msg}"),
            StorageErrorSource::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            StorageErrorSource::Compression(msg) => write!(f, "Compression error: {msg}"),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::EmptyMetric => write!(f, "metric name is empty"),
            RecordError::NaNValue { metric } => write!(f, "value of '{metric}' is NaN"),
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for StorageError {}
impl std::error::Error for StorageErrorSource {}
impl std::error::Error for RecordError {}

impl ExportError {
    /// True when the pool refused to hand out a writer; callers should apply
    /// backpressure to the producer.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            ExportError::PoolExhausted { .. }
                | ExportError::PoolTimeout { .. }
                | ExportError::PoolClosed
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExportError::InvalidRecord(_) | ExportError::Config { .. }
        )
    }

    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        ExportError::Config {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<RecordError> for ExportError {
    fn from(err: RecordError) -> Self {
        ExportError::InvalidRecord(err)
    }
}

impl StorageError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                context: context.to_string(),
            },
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::OutOfMemory => {
                StorageError::InsufficientSpace {
                    context: context.to_string(),
                }
            }
            _ => StorageError::WriteFailed {
                context: context.to_string(),
                source: Box::new(StorageErrorSource::Io(e.to_string())),
            },
        }
    }

    pub fn from_read_error(e: std::io::Error, context: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                context: context.to_string(),
            },
            _ => StorageError::ReadFailed {
                context: context.to_string(),
                source: Box::new(StorageErrorSource::Io(e.to_string())),
            },
        }
    }

    pub fn from_serialization_error(e: impl std::fmt::Display, context: &str) -> Self {
        StorageError::WriteFailed {
            context: context.to_string(),
            source: Box::new(StorageErrorSource::Serialization(e.to_string())),
        }
    }

    pub fn from_compression_error(e: std::io::Error, context: &str) -> Self {
        match e.kind() {
            std::io::ErrorKind::StorageFull => StorageError::InsufficientSpace {
                context: context.to_string(),
            },
            _ => StorageError::WriteFailed {
                context: context.to_string(),
                source: Box::new(StorageErrorSource::Compression(e.to_string())),
            },
        }
    }
}
