// In: src/config.rs

//! The single source of truth for pack set build configuration.
//!
//! `BuildOptions` is created at the application boundary (in code, or
//! deserialized from a JSON job description) and handed to one of the
//! `PackSet` build entry points. Only `guid_attr` has a default; `max_guid`
//! and `num_items` are either supplied by the caller or derived from a
//! materialized record collection by `PackSet::pack`.

use serde::{Deserialize, Serialize};

use crate::error::TamperError;
use crate::types::Guid;

//==================================================================================
// 0. Format Constants
//==================================================================================

/// The format version written to the `version` key of every artifact.
pub const FORMAT_VERSION: &str = "2.1";

/// The record field used as the identifier when none is configured.
pub const DEFAULT_GUID_ATTR: &str = "id";

/// Top-level artifact keys owned by the format. Caller metadata may not reuse them.
pub const RESERVED_ARTIFACT_KEYS: [&str; 3] = ["version", "existence", "attributes"];

//==================================================================================
// I. Build Options
//==================================================================================

/// Parameters for one build of a `PackSet`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BuildOptions {
    /// Name of the record field holding each record's guid.
    #[serde(default = "default_guid_attr")]
    pub guid_attr: String,

    /// The largest guid any record in this build may carry. Sizes the
    /// existence encoding's universe.
    #[serde(default)]
    pub max_guid: Option<Guid>,

    /// The number of records this build will encode.
    #[serde(default)]
    pub num_items: Option<usize>,
}

// Default implementation to make constructing the options easier.
impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            guid_attr: default_guid_attr(),
            max_guid: None,
            num_items: None,
        }
    }
}

impl BuildOptions {
    pub fn with_guid_attr(mut self, guid_attr: impl Into<String>) -> Self {
        self.guid_attr = guid_attr.into();
        self
    }

    pub fn with_max_guid(mut self, max_guid: Guid) -> Self {
        self.max_guid = Some(max_guid);
        self
    }

    pub fn with_num_items(mut self, num_items: usize) -> Self {
        self.num_items = Some(num_items);
        self
    }

    /// Resolves the parameters every encoder must agree on before a build starts.
    ///
    /// Fails with `MissingRequiredOption` when either bound is absent. `num_items`
    /// is checked first, mirroring the order the build parameters are declared.
    pub(crate) fn resolve(&self) -> Result<ResolvedBuild, TamperError> {
        let num_items = self
            .num_items
            .ok_or_else(|| TamperError::MissingRequiredOption("num_items".into()))?;
        let max_guid = self
            .max_guid
            .ok_or_else(|| TamperError::MissingRequiredOption("max_guid".into()))?;
        Ok(ResolvedBuild {
            guid_attr: self.guid_attr.clone(),
            max_guid,
            num_items,
        })
    }
}

/// Build parameters after every default has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedBuild {
    pub guid_attr: String,
    pub max_guid: Guid,
    pub num_items: usize,
}

/// Helper for `serde` to provide a default for `guid_attr`.
fn default_guid_attr() -> String {
    DEFAULT_GUID_ATTR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let opts: BuildOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, BuildOptions::default());
        assert_eq!(opts.guid_attr, "id");
    }

    #[test]
    fn test_deserializes_full_options() {
        let opts: BuildOptions =
            serde_json::from_str(r#"{"guid_attr":"uid","max_guid":42,"num_items":7}"#).unwrap();
        assert_eq!(
            opts,
            BuildOptions::default()
                .with_guid_attr("uid")
                .with_max_guid(42)
                .with_num_items(7)
        );
    }

    #[test]
    fn test_resolve_requires_both_bounds() {
        let only_max = BuildOptions::default().with_max_guid(10);
        assert!(matches!(
            only_max.resolve(),
            Err(TamperError::MissingRequiredOption(ref o)) if o == "num_items"
        ));

        let only_count = BuildOptions::default().with_num_items(3);
        assert!(matches!(
            only_count.resolve(),
            Err(TamperError::MissingRequiredOption(ref o)) if o == "max_guid"
        ));

        let resolved = only_count.with_max_guid(10).resolve().unwrap();
        assert_eq!(resolved.max_guid, 10);
        assert_eq!(resolved.num_items, 3);
        assert_eq!(resolved.guid_attr, "id");
    }
}
