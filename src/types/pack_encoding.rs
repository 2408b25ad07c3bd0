//! This module defines the canonical, type-safe name of each pack layout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The layout an encoder writes into its `pack` payload.
///
/// The string form is written to the `encoding` field of every serialized
/// pack, so clients can pick the matching decoder.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PackEncoding {
    /// One bit per guid in `0..=max_guid`.
    Existence,
    /// `max_choices` fixed-width windows per item, each holding a possibility
    /// index (offset by one so zero means "no value").
    Integer,
    /// One bit per possibility per item.
    Bitmap,
}

impl PackEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Existence => "existence",
            Self::Integer => "integer",
            Self::Bitmap => "bitmap",
        }
    }
}

/// Provides the canonical string representation for a `PackEncoding`.
impl fmt::Display for PackEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // These string representations are part of the public contract.
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde_name() {
        for encoding in [PackEncoding::Existence, PackEncoding::Integer, PackEncoding::Bitmap] {
            let json = serde_json::to_value(encoding).unwrap();
            assert_eq!(json, serde_json::Value::String(encoding.to_string()));
        }
    }
}
