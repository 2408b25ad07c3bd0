// In: src/pack_set/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Pack Set
// ====================================================================================
//
// A `PackSet` owns every encoder that describes one record collection:
//
//   1. [Declaration]  add_attribute / add_buffered_attribute
//         |
//         `-> the PackFactory builds one AttributePack per encoded attribute,
//             buffered attributes only keep their metadata
//
//   2. [Build]        build_pack / pack / build_unordered_pack   (builder.rs)
//         |
//         `-> initialize every encoder -> encode each record -> finalize
//
//   3. [Assembly]     to_value / to_json                         (artifact.rs)
//         |
//         `-> { version, existence, attributes, ...meta }
//
// Declaration order is kept in `IndexMap`s so the `attributes` array order is
// part of the contract rather than an accident of hashing.
// ====================================================================================

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::config::RESERVED_ARTIFACT_KEYS;
use crate::encoders::{
    AttributePack, DefaultPackFactory, ExistenceEncoder, ExistencePack, PackFactory,
};
use crate::error::TamperError;

pub mod artifact;
pub mod builder;

pub use self::builder::{BufferingPacker, Packer};

pub(crate) type AttributePacks = IndexMap<String, Box<dyn AttributePack>>;
pub(crate) type BufferedAttributes = IndexMap<String, BufferedAttributeDeclaration>;

//==================================================================================
// 1. Declarations
//==================================================================================

/// An attribute whose per-record values are encoded into a pack.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeclaration {
    pub attr_name: String,
    pub possibilities: Vec<Value>,
    pub max_choices: usize,
    pub meta: Map<String, Value>,
}

impl AttributeDeclaration {
    pub fn new(
        attr_name: impl Into<String>,
        possibilities: impl IntoIterator<Item = Value>,
        max_choices: usize,
    ) -> Self {
        Self {
            attr_name: attr_name.into(),
            possibilities: possibilities.into_iter().collect(),
            max_choices,
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Parses an option bag of the form
    /// `{attr_name, possibilities, max_choices, ...meta}`.
    pub fn from_options(mut opts: Map<String, Value>) -> Result<Self, TamperError> {
        for required in ["attr_name", "possibilities", "max_choices"] {
            if !opts.contains_key(required) {
                return Err(TamperError::MissingRequiredOption(required.into()));
            }
        }

        let attr_name = take_name(&mut opts)?;
        let possibilities = match opts.remove("possibilities") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(TamperError::invalid_option(
                    "possibilities",
                    "expected an array",
                ))
            }
        };
        let max_choices = opts
            .remove("max_choices")
            .and_then(|v| v.as_u64())
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                TamperError::invalid_option("max_choices", "expected a non-negative integer")
            })?;

        Ok(Self {
            attr_name,
            possibilities,
            max_choices,
            meta: opts,
        })
    }
}

/// An attribute that is never encoded; only its metadata reaches the artifact.
/// Clients fetch its values from elsewhere (e.g. a `buffer_url` in the metadata).
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedAttributeDeclaration {
    pub attr_name: String,
    pub meta: Map<String, Value>,
}

impl BufferedAttributeDeclaration {
    pub fn new(attr_name: impl Into<String>) -> Self {
        Self {
            attr_name: attr_name.into(),
            meta: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Parses an option bag of the form `{attr_name, ...meta}`.
    pub fn from_options(mut opts: Map<String, Value>) -> Result<Self, TamperError> {
        if !opts.contains_key("attr_name") {
            return Err(TamperError::MissingRequiredOption("attr_name".into()));
        }
        let attr_name = take_name(&mut opts)?;
        Ok(Self {
            attr_name,
            meta: opts,
        })
    }

    /// The artifact entry: `{attr_name, ...meta}`.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("attr_name".into(), Value::from(self.attr_name.as_str()));
        for (key, value) in &self.meta {
            out.insert(key.clone(), value.clone());
        }
        Value::Object(out)
    }
}

fn take_name(opts: &mut Map<String, Value>) -> Result<String, TamperError> {
    match opts.remove("attr_name") {
        Some(Value::String(name)) => Ok(name),
        _ => Err(TamperError::invalid_option("attr_name", "expected a string")),
    }
}

//==================================================================================
// 2. The PackSet
//==================================================================================

/// Where a `PackSet` is in its build cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildState {
    /// Declarations changed since the last successful build (or none ran yet).
    #[default]
    Declaring,
    /// Every encoder is sealed and the artifact can be assembled.
    Built,
    /// A build failed part way; encoders are in an unknown state.
    Poisoned,
}

pub struct PackSet {
    existence: Box<dyn ExistenceEncoder>,
    factory: Box<dyn PackFactory>,
    attr_packs: AttributePacks,
    buffered_attrs: BufferedAttributes,
    meta: Map<String, Value>,
    state: BuildState,
}

impl Default for PackSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PackSet {
    /// A pack set using the default existence bitmap and pack factory.
    pub fn new() -> Self {
        Self::with_encoders(Box::new(ExistencePack::new()), Box::new(DefaultPackFactory))
    }

    pub fn with_encoders(
        existence: Box<dyn ExistenceEncoder>,
        factory: Box<dyn PackFactory>,
    ) -> Self {
        Self {
            existence,
            factory,
            attr_packs: IndexMap::new(),
            buffered_attrs: IndexMap::new(),
            meta: Map::new(),
            state: BuildState::Declaring,
        }
    }

    /// A default pack set whose artifact carries `meta` at the top level.
    pub fn with_meta(meta: Map<String, Value>) -> Result<Self, TamperError> {
        let mut set = Self::new();
        set.set_meta(meta)?;
        Ok(set)
    }

    /// Replaces the top-level metadata. Keys owned by the artifact format are rejected.
    pub fn set_meta(&mut self, meta: Map<String, Value>) -> Result<(), TamperError> {
        if let Some(key) = RESERVED_ARTIFACT_KEYS
            .iter()
            .find(|key| meta.contains_key(**key))
        {
            return Err(TamperError::ReservedMetadataKey(key.to_string()));
        }
        self.meta = meta;
        Ok(())
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn existence_pack(&self) -> &dyn ExistenceEncoder {
        self.existence.as_ref()
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    //------------------------------------------------------------------------------
    // Registry
    //------------------------------------------------------------------------------

    /// Declares an attribute from an option bag. See `AttributeDeclaration::from_options`.
    pub fn add_attribute(
        &mut self,
        opts: Map<String, Value>,
    ) -> Result<&mut dyn AttributePack, TamperError> {
        let declaration = AttributeDeclaration::from_options(opts)?;
        self.declare_attribute(declaration)
    }

    /// Builds the pack for `declaration` and stores it under its name.
    ///
    /// Null possibilities are dropped. A redeclared name replaces the old pack
    /// in its original position.
    pub fn declare_attribute(
        &mut self,
        declaration: AttributeDeclaration,
    ) -> Result<&mut dyn AttributePack, TamperError> {
        let AttributeDeclaration {
            attr_name,
            possibilities,
            max_choices,
            meta,
        } = declaration;
        let possibilities: Vec<Value> = possibilities.into_iter().filter(|v| !v.is_null()).collect();

        let mut pack = self.factory.build(&attr_name, possibilities, max_choices)?;
        pack.set_meta(meta);
        self.mark_declarations_changed();

        let slot: &mut dyn AttributePack = match self.attr_packs.entry(attr_name) {
            Entry::Occupied(mut occupied) => {
                log::debug!("Replacing declared attribute `{}`", occupied.key());
                occupied.insert(pack);
                &mut **occupied.into_mut()
            }
            Entry::Vacant(vacant) => &mut **vacant.insert(pack),
        };
        Ok(slot)
    }

    /// Declares a buffered attribute from an option bag of the form `{attr_name, ...meta}`.
    pub fn add_buffered_attribute(&mut self, opts: Map<String, Value>) -> Result<(), TamperError> {
        let declaration = BufferedAttributeDeclaration::from_options(opts)?;
        self.declare_buffered_attribute(declaration);
        Ok(())
    }

    pub fn declare_buffered_attribute(&mut self, declaration: BufferedAttributeDeclaration) {
        self.buffered_attrs
            .insert(declaration.attr_name.clone(), declaration);
    }

    /// Encoded attribute names, in declaration order.
    pub fn attributes(&self) -> Vec<&str> {
        self.attr_packs.keys().map(String::as_str).collect()
    }

    /// Buffered attribute names, in declaration order.
    pub fn buffered_attributes(&self) -> Vec<&str> {
        self.buffered_attrs.keys().map(String::as_str).collect()
    }

    pub fn pack_for(&self, attr_name: &str) -> Option<&dyn AttributePack> {
        self.attr_packs.get(attr_name).map(|pack| pack.as_ref())
    }

    pub fn buffered_attribute(&self, attr_name: &str) -> Option<&BufferedAttributeDeclaration> {
        self.buffered_attrs.get(attr_name)
    }

    /// A freshly built pack has never been through a build, so the set needs
    /// another one before it can be assembled. Poisoned sets stay poisoned.
    fn mark_declarations_changed(&mut self) {
        if self.state == BuildState::Built {
            self.state = BuildState::Declaring;
        }
    }
}
