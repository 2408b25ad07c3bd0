//! Assembles a built `PackSet` into its versioned, serializable artifact.
//!
//! Layout (keys in this order):
//!
//! ```text
//! {
//!   "version":    "2.1",
//!   "existence":  <existence encoder output>,
//!   "attributes": [<encoded packs, declaration order>..., <buffered attrs, declaration order>...],
//!   ...top-level metadata
//! }
//! ```
//!
//! Assembly is pure: it only reads sealed encoders, so repeated calls yield
//! identical output.

use std::io::Write;

use serde_json::{Map, Value};

use super::{AttributePacks, BufferedAttributes, BuildState, PackSet};
use crate::config::FORMAT_VERSION;
use crate::encoders::ExistenceEncoder;
use crate::error::TamperError;

/// Merges every encoder's output, the buffered declarations and the metadata.
pub(crate) fn assemble(
    existence: &dyn ExistenceEncoder,
    attr_packs: &AttributePacks,
    buffered_attrs: &BufferedAttributes,
    meta: &Map<String, Value>,
) -> Result<Value, TamperError> {
    let mut attributes = Vec::with_capacity(attr_packs.len() + buffered_attrs.len());
    for pack in attr_packs.values() {
        attributes.push(pack.to_serializable()?);
    }
    attributes.extend(buffered_attrs.values().map(|decl| decl.to_value()));

    let mut out = Map::new();
    out.insert("version".into(), Value::from(FORMAT_VERSION));
    out.insert("existence".into(), existence.to_serializable()?);
    out.insert("attributes".into(), Value::Array(attributes));
    for (key, value) in meta {
        out.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(out))
}

impl PackSet {
    /// The assembled artifact. Only available after a successful build.
    pub fn to_value(&self) -> Result<Value, TamperError> {
        match self.state {
            BuildState::Built => assemble(
                self.existence.as_ref(),
                &self.attr_packs,
                &self.buffered_attrs,
                &self.meta,
            ),
            BuildState::Declaring => Err(TamperError::NotBuilt),
            BuildState::Poisoned => Err(TamperError::PackSetPoisoned),
        }
    }

    /// The assembled artifact as compact JSON.
    pub fn to_json(&self) -> Result<String, TamperError> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Streams the assembled artifact as compact JSON into `writer`.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), TamperError> {
        serde_json::to_writer(writer, &self.to_value()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::{ChoicePack, ExistencePack};
    use crate::encoders::AttributePack;
    use crate::pack_set::BufferedAttributeDeclaration;
    use indexmap::IndexMap;
    use serde_json::json;

    fn sealed_existence() -> ExistencePack {
        let mut existence = ExistencePack::new();
        existence.initialize_pack(3, 0).unwrap();
        existence.finalize_pack().unwrap();
        existence
    }

    #[test]
    fn test_layout_and_key_order() {
        let existence = sealed_existence();

        let mut pack = ChoicePack::bitmap("size", vec![json!("s"), json!("m")], 1);
        pack.initialize_pack(3, 0).unwrap();
        pack.finalize_pack().unwrap();
        let mut packs: AttributePacks = IndexMap::new();
        packs.insert("size".into(), Box::new(pack));

        let mut buffered: BufferedAttributes = IndexMap::new();
        buffered.insert(
            "title".into(),
            BufferedAttributeDeclaration::new("title").with_meta("display", json!(true)),
        );

        let mut meta = Map::new();
        meta.insert("source".into(), json!("v1"));

        let out = assemble(&existence, &packs, &buffered, &meta).unwrap();
        let keys: Vec<&str> = out.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["version", "existence", "attributes", "source"]);
        assert_eq!(out["version"], "2.1");
        assert_eq!(out["attributes"][0]["attr_name"], "size");
        assert_eq!(out["attributes"][1], json!({"attr_name": "title", "display": true}));
    }

    #[test]
    fn test_unsealed_encoders_propagate_errors() {
        let existence = ExistencePack::new();
        let out = assemble(&existence, &IndexMap::new(), &IndexMap::new(), &Map::new());
        assert!(matches!(out, Err(TamperError::LifecycleViolation { .. })));
    }

    #[test]
    fn test_write_json_matches_to_json() {
        let mut set = PackSet::new();
        set.pack(&[json!({"id": 2})], &Default::default()).unwrap();

        let mut buf = Vec::new();
        set.write_json(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), set.to_json().unwrap());
    }
}
