// In: src/error.rs

//! This module defines the single, unified error type for the entire tamper library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

use crate::types::Guid;

#[derive(Error, Debug)]
pub enum TamperError {
    // =========================================================================
    // === Declaration & Build Parameter Errors
    // =========================================================================
    #[error("`{0}` is required here but was not supplied")]
    MissingRequiredOption(String),

    #[error("Option `{option}` is invalid: {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Metadata key `{0}` is reserved by the pack set format")]
    ReservedMetadataKey(String),

    // =========================================================================
    // === Record Ingestion Errors
    // =========================================================================
    /// A record has no usable identifier under the configured guid attribute.
    #[error("Record #{position} has no usable identifier under `{guid_attr}`")]
    UnresolvedIdentifier { guid_attr: String, position: usize },

    /// A record was rejected earlier in this build; no further records are accepted.
    #[error("Build aborted: record #{position} was rejected")]
    BuildAborted { position: usize },

    // =========================================================================
    // === Encoder-Internal Errors (propagated unmodified by the coordinator)
    // =========================================================================
    #[error("Guid {guid} exceeds the declared max guid {max_guid}")]
    GuidOutOfRange { guid: Guid, max_guid: Guid },

    #[error("Guid {guid} arrived after guid {previous}; guids must be strictly increasing")]
    GuidOutOfOrder { guid: Guid, previous: Guid },

    #[error("Item index {index} is outside the declared item count {num_items}")]
    ItemOutOfRange { index: usize, num_items: usize },

    #[error("Attribute `{attr_name}` has no possibility matching {value}")]
    UnknownPossibility { attr_name: String, value: String },

    #[error("Attribute `{attr_name}` allows {max_choices} choice(s) per item, got {got}")]
    TooManyChoices {
        attr_name: String,
        max_choices: usize,
        got: usize,
    },

    #[error("Encoder `{encoder}` cannot {operation} while {state}")]
    LifecycleViolation {
        encoder: String,
        operation: &'static str,
        state: &'static str,
    },

    // =========================================================================
    // === Pack Set State Errors
    // =========================================================================
    #[error("A previous build failed; this pack set must be discarded")]
    PackSetPoisoned,

    #[error("The pack set has not been built since its last declaration")]
    NotBuilt,

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error from the Serde JSON library, typically during artifact serialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error originating from the underlying I/O subsystem (e.g., opening a log file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TamperError {
    pub(crate) fn invalid_option(option: &str, reason: impl Into<String>) -> Self {
        TamperError::InvalidOption {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}
