pub mod common;
pub mod compressor;
pub mod directory_lock;
pub mod recovery;
pub mod writer;

pub use common::DataFileName;
pub use compressor::Compressor;
pub use directory_lock::DirectoryLock;
pub use recovery::{RecoveryReport, recover_export_directory};
pub use writer::{BatchWriter, CommitTrigger, WriterConfig, WriterState, WriterStats};
