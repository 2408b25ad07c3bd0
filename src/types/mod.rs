//! This module defines the core, strongly-typed data representations shared by
//! the pack set and every encoder.
//!
//! It currently includes the `Guid` identifier type and the canonical
//! `PackEncoding` enum that names each encoder's wire layout.

pub mod pack_encoding;

/// The identifier type for records. Guids order records and populate the
/// existence encoding.
pub type Guid = u64;

// Re-export the main type(s) for easier access.
pub use pack_encoding::PackEncoding;
