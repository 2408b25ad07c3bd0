//! Attribute packs that store each item's chosen possibilities in a fixed-size
//! bit window.
//!
//! Two layouts share one implementation:
//! - **integer**: `max_choices` windows of `bit_window_width` bits, each
//!   holding `possibility_index + 1` (zero means "no value").
//! - **bitmap**: one bit per possibility.

use bitvec::prelude::*;
use serde_json::{Map, Value};

use super::{
    bits_needed, encode_bits, write_window, AttributePack, Lifecycle, PackBits, MAX_PACK_BITS,
};
use crate::error::TamperError;
use crate::record::{lookup_field, Record};
use crate::types::{Guid, PackEncoding};

#[derive(Debug, Clone)]
pub struct ChoicePack {
    attr_name: String,
    encoding: PackEncoding,
    possibilities: Vec<Value>,
    max_choices: usize,
    bit_window_width: usize,
    item_window_width: usize,
    meta: Map<String, Value>,
    lifecycle: Lifecycle,
    num_items: usize,
    bits: PackBits,
}

impl ChoicePack {
    pub fn integer(attr_name: &str, possibilities: Vec<Value>, max_choices: usize) -> Self {
        let bit_window_width = bits_needed(possibilities.len());
        Self::with_layout(
            attr_name,
            PackEncoding::Integer,
            possibilities,
            max_choices,
            bit_window_width,
            bit_window_width * max_choices,
        )
    }

    pub fn bitmap(attr_name: &str, possibilities: Vec<Value>, max_choices: usize) -> Self {
        let item_window_width = possibilities.len();
        Self::with_layout(
            attr_name,
            PackEncoding::Bitmap,
            possibilities,
            max_choices,
            1,
            item_window_width,
        )
    }

    fn with_layout(
        attr_name: &str,
        encoding: PackEncoding,
        possibilities: Vec<Value>,
        max_choices: usize,
        bit_window_width: usize,
        item_window_width: usize,
    ) -> Self {
        Self {
            attr_name: attr_name.to_string(),
            encoding,
            possibilities,
            max_choices,
            bit_window_width,
            item_window_width,
            meta: Map::new(),
            lifecycle: Lifecycle::default(),
            num_items: 0,
            bits: PackBits::new(),
        }
    }

    pub fn encoding(&self) -> PackEncoding {
        self.encoding
    }

    pub fn possibilities(&self) -> &[Value] {
        &self.possibilities
    }

    pub fn item_window_width(&self) -> usize {
        self.item_window_width
    }

    /// Resolves the record's value into possibility indexes.
    ///
    /// Missing and `null` values select nothing; arrays select each non-null element.
    fn choices_for(&self, record: &dyn Record) -> Result<Vec<usize>, TamperError> {
        let selected: Vec<&Value> = match lookup_field(record, &self.attr_name) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
            Some(value) => vec![value],
        };

        if selected.len() > self.max_choices {
            return Err(TamperError::TooManyChoices {
                attr_name: self.attr_name.clone(),
                max_choices: self.max_choices,
                got: selected.len(),
            });
        }

        selected
            .into_iter()
            .map(|value| {
                self.possibilities
                    .iter()
                    .position(|p| p == value)
                    .ok_or_else(|| TamperError::UnknownPossibility {
                        attr_name: self.attr_name.clone(),
                        value: value.to_string(),
                    })
            })
            .collect()
    }
}

impl AttributePack for ChoicePack {
    fn attr_name(&self) -> &str {
        &self.attr_name
    }

    fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    fn set_meta(&mut self, meta: Map<String, Value>) {
        self.meta = meta;
    }

    fn initialize_pack(&mut self, _max_guid: Guid, num_items: usize) -> Result<(), TamperError> {
        let total_bits = num_items
            .checked_mul(self.item_window_width)
            .filter(|&n| n <= MAX_PACK_BITS)
            .ok_or_else(|| {
                TamperError::invalid_option(
                    "num_items",
                    format!(
                        "{num_items} items of {} bits exceed the `{}` pack limit of {MAX_PACK_BITS} bits",
                        self.item_window_width, self.attr_name
                    ),
                )
            })?;

        self.lifecycle.open(&self.attr_name)?;
        self.num_items = num_items;
        self.bits = bitvec![u8, Msb0; 0; total_bits];
        Ok(())
    }

    fn encode(&mut self, index: usize, record: &dyn Record) -> Result<(), TamperError> {
        self.lifecycle.ensure_open(&self.attr_name, "encode")?;
        if index >= self.num_items {
            return Err(TamperError::ItemOutOfRange {
                index,
                num_items: self.num_items,
            });
        }

        let choices = self.choices_for(record)?;
        let item_start = index * self.item_window_width;
        match self.encoding {
            PackEncoding::Bitmap => {
                for choice in choices {
                    self.bits.set(item_start + choice, true);
                }
            }
            _ => {
                for (slot, choice) in choices.into_iter().enumerate() {
                    let start = item_start + slot * self.bit_window_width;
                    write_window(&mut self.bits, start, self.bit_window_width, choice as u64 + 1);
                }
            }
        }
        Ok(())
    }

    fn finalize_pack(&mut self) -> Result<(), TamperError> {
        self.lifecycle.seal(&self.attr_name)
    }

    fn to_serializable(&self) -> Result<Value, TamperError> {
        self.lifecycle.ensure_sealed(&self.attr_name, "serialize")?;

        let mut out = Map::new();
        out.insert("encoding".into(), Value::from(self.encoding.as_str()));
        out.insert("attr_name".into(), Value::from(self.attr_name.as_str()));
        out.insert("possibilities".into(), Value::Array(self.possibilities.clone()));
        out.insert("max_choices".into(), Value::from(self.max_choices));
        out.insert("bit_window_width".into(), Value::from(self.bit_window_width));
        out.insert("item_window_width".into(), Value::from(self.item_window_width));
        out.insert("pack".into(), Value::from(encode_bits(&self.bits)));
        // Attribute metadata is merged last and may override the fields above.
        for (key, value) in &self.meta {
            out.insert(key.clone(), value.clone());
        }
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn colors() -> Vec<Value> {
        vec![json!("red"), json!("green"), json!("blue")]
    }

    fn run(pack: &mut ChoicePack, records: &[Value]) -> Result<(), TamperError> {
        pack.initialize_pack(records.len() as Guid, records.len())?;
        for (i, record) in records.iter().enumerate() {
            pack.encode(i, record)?;
        }
        pack.finalize_pack()
    }

    #[test]
    fn test_integer_layout() {
        // 3 possibilities -> 2-bit windows, 2 choices -> 4-bit items.
        let mut pack = ChoicePack::integer("color", colors(), 2);
        let records = [
            json!({"color": "blue"}),
            json!({"color": ["red", "green"]}),
        ];
        run(&mut pack, &records).unwrap();

        // item 0: [11][00], item 1: [01][10]
        assert_eq!(pack.bits.as_raw_slice(), &[0b1100_0110]);

        let out = pack.to_serializable().unwrap();
        assert_eq!(out["encoding"], "integer");
        assert_eq!(out["bit_window_width"], 2);
        assert_eq!(out["item_window_width"], 4);
        assert_eq!(out["pack"], "xg==");
    }

    #[test]
    fn test_bitmap_layout_and_missing_values() {
        let mut pack = ChoicePack::bitmap("color", colors(), 3);
        let records = [
            json!({"color": ["red", "blue"]}),
            json!({"color": null}),
            json!({"other": 1}),
            json!({":color": "green"}),
        ];
        run(&mut pack, &records).unwrap();

        // 101 000 000 010 (+ 4 bits of padding)
        assert_eq!(pack.bits.as_raw_slice(), &[0b1010_0000, 0b0010_0000]);
    }

    #[test]
    fn test_encoding_errors() {
        let mut pack = ChoicePack::integer("color", colors(), 1);
        pack.initialize_pack(10, 2).unwrap();

        let too_many = json!({"color": ["red", "blue"]});
        assert!(matches!(
            pack.encode(0, &too_many),
            Err(TamperError::TooManyChoices { max_choices: 1, got: 2, .. })
        ));

        let unknown = json!({"color": "purple"});
        assert!(matches!(
            pack.encode(0, &unknown),
            Err(TamperError::UnknownPossibility { ref value, .. }) if value == "\"purple\""
        ));

        let fine = json!({"color": "red"});
        assert!(matches!(
            pack.encode(2, &fine),
            Err(TamperError::ItemOutOfRange { index: 2, num_items: 2 })
        ));
    }

    #[test]
    fn test_lifecycle_is_enforced() {
        let mut pack = ChoicePack::bitmap("color", colors(), 1);
        let record = json!({"color": "red"});
        assert!(matches!(
            pack.encode(0, &record),
            Err(TamperError::LifecycleViolation { operation: "encode", .. })
        ));

        pack.initialize_pack(1, 1).unwrap();
        assert!(pack.to_serializable().is_err());
        pack.finalize_pack().unwrap();
        assert!(pack.encode(0, &record).is_err());
        assert!(pack.finalize_pack().is_err());
    }

    #[test]
    fn test_oversized_item_count_is_rejected() {
        let mut pack = ChoicePack::bitmap("flag", vec![json!("a"), json!("b")], 1);
        for num_items in [usize::MAX, MAX_PACK_BITS] {
            assert!(matches!(
                pack.initialize_pack(3, num_items),
                Err(TamperError::InvalidOption { ref option, .. }) if option == "num_items"
            ));
        }
        // Still uninitialized, so a normal build can follow.
        assert!(pack.encode(0, &json!({"flag": "a"})).is_err());
        pack.initialize_pack(3, 1).unwrap();
    }

    #[test]
    fn test_meta_is_merged_last() {
        let mut pack = ChoicePack::bitmap("color", colors(), 1);
        let mut meta = Map::new();
        meta.insert("label".into(), json!("Color"));
        meta.insert("max_choices".into(), json!(99));
        pack.set_meta(meta);
        run(&mut pack, &[]).unwrap();

        let out = pack.to_serializable().unwrap();
        assert_eq!(out["label"], "Color");
        assert_eq!(out["max_choices"], 99);
        assert_eq!(out["attr_name"], "color");
        assert_eq!(out["pack"], "");
    }
}
