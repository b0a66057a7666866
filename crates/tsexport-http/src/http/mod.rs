//! HTTP surface of the exporter
//!
//! This module contains:
//! - The Prometheus remote-write wire messages and their decoding
//! - Request and response types shared by the handlers
//! - The receiver server and its routes

pub mod common;
pub mod remote_write;
pub mod server;

pub use common::*;
