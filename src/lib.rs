//! This file is the root of the `tamper` Rust crate.
//!
//! `tamper` builds the compact, versioned pack artifacts that clients use to
//! filter a record collection locally: one existence encoding of the guids
//! present, plus one compressed pack per declared attribute.
//!
//! Its responsibilities are strictly limited to declaring the top-level
//! modules and re-exporting the public API.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod config;
pub mod encoders;
pub mod error;
pub mod observability;
pub mod pack_set;
pub mod record;
pub mod types;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use config::{BuildOptions, DEFAULT_GUID_ATTR, FORMAT_VERSION};
pub use encoders::{AttributePack, DefaultPackFactory, ExistenceEncoder, PackFactory};
pub use error::TamperError;
pub use pack_set::{
    AttributeDeclaration, BufferedAttributeDeclaration, BufferingPacker, BuildState, PackSet,
    Packer,
};
pub use record::Record;
pub use types::{Guid, PackEncoding};
