// In: src/encoders/mod.rs

//! Defines the behavioral contracts for every encoder a `PackSet` drives.
//!
//! The pack set treats encoders as black boxes. It only relies on the
//! four-phase contract below (initialize, encode, finalize, serialize), so
//! custom encoders can be injected through `PackSet::with_encoders` without
//! touching the build coordinator. The default implementations live in the
//! submodules.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bitvec::prelude::*;
use serde_json::{Map, Value};

use crate::error::TamperError;
use crate::record::Record;
use crate::types::Guid;

//==================================================================================
// 1. Module Declarations
//==================================================================================

pub mod choice;
pub mod existence;

pub use self::choice::ChoicePack;
pub use self::existence::ExistencePack;

/// The bit buffer every default encoder writes into.
pub type PackBits = BitVec<u8, Msb0>;

/// Largest bit buffer a default encoder allocates (512 MiB). Larger existence
/// universes or attribute packs are rejected with `InvalidOption`.
pub const MAX_PACK_BITS: usize = u32::MAX as usize;

//==================================================================================
// 2. Encoder Contracts
//==================================================================================

/// **CONTRACT:** Records which guids, out of `0..=max_guid`, are present.
///
/// `initialize_pack` is called once per build before any `encode`, `encode`
/// receives guids in the order records were accepted, and `finalize_pack` is
/// called once after the last record. `to_serializable` is only valid after
/// `finalize_pack` and must not mutate state.
pub trait ExistenceEncoder {
    fn initialize_pack(&mut self, max_guid: Guid, num_items: usize) -> Result<(), TamperError>;
    fn encode(&mut self, guid: Guid) -> Result<(), TamperError>;
    fn finalize_pack(&mut self) -> Result<(), TamperError>;
    fn to_serializable(&self) -> Result<Value, TamperError>;
}

/// **CONTRACT:** Compresses one attribute's value per record into a small index.
///
/// Same phase rules as `ExistenceEncoder`. `encode` receives the zero-based
/// position of the record within the build; the same record has the same
/// position in every pack of a build.
pub trait AttributePack {
    fn attr_name(&self) -> &str;

    /// Extra metadata merged into this pack's serialized form.
    fn meta(&self) -> &Map<String, Value>;
    fn set_meta(&mut self, meta: Map<String, Value>);

    fn initialize_pack(&mut self, max_guid: Guid, num_items: usize) -> Result<(), TamperError>;
    fn encode(&mut self, index: usize, record: &dyn Record) -> Result<(), TamperError>;
    fn finalize_pack(&mut self) -> Result<(), TamperError>;
    fn to_serializable(&self) -> Result<Value, TamperError>;
}

/// **CONTRACT:** Chooses and constructs the attribute pack for a declaration.
pub trait PackFactory {
    fn build(
        &self,
        attr_name: &str,
        possibilities: Vec<Value>,
        max_choices: usize,
    ) -> Result<Box<dyn AttributePack>, TamperError>;
}

/// Picks integer windows when they are narrower than one bit per possibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPackFactory;

impl PackFactory for DefaultPackFactory {
    fn build(
        &self,
        attr_name: &str,
        possibilities: Vec<Value>,
        max_choices: usize,
    ) -> Result<Box<dyn AttributePack>, TamperError> {
        if max_choices == 0 {
            return Err(TamperError::invalid_option(
                "max_choices",
                format!("attribute `{attr_name}` must allow at least one choice"),
            ));
        }
        let integer_width = max_choices.saturating_mul(bits_needed(possibilities.len()));
        let pack = if integer_width < possibilities.len() {
            ChoicePack::integer(attr_name, possibilities, max_choices)
        } else {
            ChoicePack::bitmap(attr_name, possibilities, max_choices)
        };
        log::debug!(
            "Built {} pack for `{}` (item window: {} bits)",
            pack.encoding(),
            attr_name,
            pack.item_window_width()
        );
        Ok(Box::new(pack))
    }
}

//==================================================================================
// 3. Shared Encoder Lifecycle
//==================================================================================

/// The phase an encoder is in. A sealed encoder may be reopened by the next build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Open,
    Sealed,
}

impl Lifecycle {
    fn describe(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Open => "open",
            Lifecycle::Sealed => "sealed",
        }
    }

    fn violation(&self, encoder: &str, operation: &'static str) -> TamperError {
        TamperError::LifecycleViolation {
            encoder: encoder.to_string(),
            operation,
            state: self.describe(),
        }
    }

    /// Moves to `Open`. Initializing an already open encoder is rejected.
    pub fn open(&mut self, encoder: &str) -> Result<(), TamperError> {
        if *self == Lifecycle::Open {
            return Err(self.violation(encoder, "initialize"));
        }
        *self = Lifecycle::Open;
        Ok(())
    }

    pub fn ensure_open(&self, encoder: &str, operation: &'static str) -> Result<(), TamperError> {
        match self {
            Lifecycle::Open => Ok(()),
            other => Err(other.violation(encoder, operation)),
        }
    }

    pub fn seal(&mut self, encoder: &str) -> Result<(), TamperError> {
        self.ensure_open(encoder, "finalize")?;
        *self = Lifecycle::Sealed;
        Ok(())
    }

    pub fn ensure_sealed(&self, encoder: &str, operation: &'static str) -> Result<(), TamperError> {
        match self {
            Lifecycle::Sealed => Ok(()),
            other => Err(other.violation(encoder, operation)),
        }
    }
}

//==================================================================================
// 4. Private Helpers
//==================================================================================

/// Number of bits needed to store every value in `0..=max_value` (at least one).
pub(crate) fn bits_needed(max_value: usize) -> usize {
    (usize::BITS - max_value.leading_zeros()).max(1) as usize
}

/// Writes `value` MSB-first into `width` bits starting at `start`.
pub(crate) fn write_window(bits: &mut BitSlice<u8, Msb0>, start: usize, width: usize, value: u64) {
    for offset in 0..width {
        let shift = width - 1 - offset;
        bits.set(start + offset, (value >> shift) & 1 == 1);
    }
}

pub(crate) fn encode_bits(bits: &PackBits) -> String {
    STANDARD.encode(bits.as_raw_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 1);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(3), 2);
        assert_eq!(bits_needed(4), 3);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
    }

    #[test]
    fn test_write_window_is_msb_first() {
        let mut bits: PackBits = bitvec![u8, Msb0; 0; 16];
        write_window(&mut bits, 4, 3, 0b101);
        assert_eq!(bits.as_raw_slice(), &[0b0000_1010, 0]);
    }

    #[test]
    fn test_lifecycle_phases() {
        let mut phase = Lifecycle::default();
        assert!(phase.ensure_open("p", "encode").is_err());
        assert!(phase.seal("p").is_err());

        phase.open("p").unwrap();
        assert!(matches!(
            phase.open("p"),
            Err(TamperError::LifecycleViolation { operation: "initialize", state: "open", .. })
        ));
        phase.ensure_open("p", "encode").unwrap();
        assert!(phase.ensure_sealed("p", "serialize").is_err());

        phase.seal("p").unwrap();
        phase.ensure_sealed("p", "serialize").unwrap();
        assert!(phase.ensure_open("p", "encode").is_err());

        // The next build reopens a sealed encoder.
        phase.open("p").unwrap();
    }

    fn built_encoding(possibilities: Vec<Value>, max_choices: usize) -> Value {
        let mut pack = DefaultPackFactory
            .build("attr", possibilities, max_choices)
            .unwrap();
        pack.initialize_pack(0, 0).unwrap();
        pack.finalize_pack().unwrap();
        pack.to_serializable().unwrap()["encoding"].clone()
    }

    #[test]
    fn test_factory_picks_encoding_by_width() {
        // 2 possibilities need 2-bit windows, no narrower than a 2-bit bitmap.
        assert_eq!(built_encoding(vec![json!("a"), json!("b")], 1), json!("bitmap"));

        // 20 possibilities: two 5-bit windows beat a 20-bit bitmap.
        let many: Vec<Value> = (0..20).map(|i| json!(i)).collect();
        assert_eq!(built_encoding(many.clone(), 2), json!("integer"));

        // Four 5-bit windows no longer do.
        assert_eq!(built_encoding(many, 4), json!("bitmap"));
    }

    #[test]
    fn test_factory_rejects_zero_choices() {
        let err = DefaultPackFactory.build("x", vec![json!(1)], 0).err().unwrap();
        assert!(matches!(err, TamperError::InvalidOption { ref option, .. } if option == "max_choices"));
    }
}
