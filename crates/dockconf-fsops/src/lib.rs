//! Filesystem policy primitives for configuration files and provisioned secrets.
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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Layout: `error.rs` (structured errors), `ownership.rs` (uid/gid resolution),
//! `policy.rs` (ownership/permission checks and creation of missing paths),
//! `secret_file.rs` (atomic per-file secret materialisation).

pub mod error;
pub mod ownership;
pub mod policy;
pub mod secret_file;

pub use error::{FsOpsError, FsOpsResult};
pub use ownership::Ownership;
pub use policy::{PathKind, PathPolicy, PathState};
pub use secret_file::{validate_file_name, write_atomic};
