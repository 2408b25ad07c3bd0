//! Read-only access to the records fed into a build.
//!
//! The pack set never owns record structure; it only needs to look up named
//! fields. `Record` is that narrow capability, implemented for the JSON shapes
//! callers hand us.

use serde_json::{Map, Value};

use crate::error::TamperError;
use crate::types::Guid;

/// A keyed mapping from attribute name to value.
pub trait Record {
    /// Returns the value stored under `name`, if any.
    fn field(&self, name: &str) -> Option<&Value>;
}

impl Record for Map<String, Value> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Non-object values have no fields.
impl Record for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(name))
    }
}

impl<R: Record + ?Sized> Record for &R {
    fn field(&self, name: &str) -> Option<&Value> {
        (**self).field(name)
    }
}

/// Looks up a logical field that may be stored under its plain key (`id`) or
/// its symbol-style key (`:id`), as written by Ruby-origin exporters.
///
/// Plain-before-symbol precedence is intentional; do not swap the two lookups.
/// A `null` under the plain key falls through to the symbol key.
pub fn lookup_field<'a, R: Record + ?Sized>(record: &'a R, name: &str) -> Option<&'a Value> {
    match record.field(name) {
        Some(value) if !value.is_null() => Some(value),
        _ => record
            .field(&format!(":{name}"))
            .filter(|value| !value.is_null()),
    }
}

/// Extracts the guid of `record` at ingestion position `position`.
///
/// Guids must be non-negative JSON integers; anything else is unresolved.
pub fn extract_guid<R: Record + ?Sized>(
    record: &R,
    guid_attr: &str,
    position: usize,
) -> Result<Guid, TamperError> {
    lookup_field(record, guid_attr)
        .and_then(Value::as_u64)
        .ok_or_else(|| TamperError::UnresolvedIdentifier {
            guid_attr: guid_attr.to_string(),
            position,
        })
}
