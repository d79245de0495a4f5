#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Logging primitives shared across the dockconf workspace.
//!
//! Layout: `init.rs` (subscriber installation and logging configuration),
//! `error.rs` (telemetry errors).

pub mod error;
pub mod init;

pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
