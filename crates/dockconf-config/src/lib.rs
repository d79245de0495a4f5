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
#![allow(clippy::module_name_repetitions)]

//! Layered configuration for containerised services: typed fields grouped in
//! plain and secret sections, persisted to `NAME=VALUE` files and provisioned
//! to per-service secret files.
//!
//! Layout: `field.rs` (typed fields), `section.rs` (storage backends),
//! `service.rs` (service maps), `linestore.rs` (line-oriented files),
//! `module.rs` + `declaration.rs` (module building and loading),
//! `settings.rs` (engine settings), `engine.rs` (`ConfigEngine`),
//! `provision.rs` (secret provisioning), `report.rs` (listings),
//! `error.rs` (error taxonomy).

pub mod declaration;
pub mod engine;
pub mod error;
pub mod field;
pub mod linestore;
pub mod module;
pub mod provision;
pub mod report;
pub mod section;
pub mod service;
pub mod settings;

pub use engine::{ConfigEngine, Resolved};
pub use error::{ConfigError, ConfigResult, MissingReason};
pub use field::{ConfigValue, Field, FieldError, FieldKind, RawValue, ValidationError};
pub use linestore::{LineStore, WritePolicy};
pub use module::{ConfigModule, ModuleBuilder, ModuleCatalog, ModuleFactory, ModuleLoader, SectionDecl};
pub use provision::ProvisionedSecret;
pub use report::{ConfigReport, EntryState, ReportEntry, ReportSection, SECRET_MASK};
pub use section::{FieldDecl, Section, SectionKind, StorageKind};
pub use service::{DEFAULT_SECRET_MODE, SecretTarget, ServiceEntry, ServiceMap, TargetSpec};
pub use settings::{ConfigPaths, Deployment, EngineSettings, SettingsOverrides};
