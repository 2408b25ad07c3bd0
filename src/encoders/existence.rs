//! The default existence encoder: a bitmap over the guid universe.
//!
//! Bit `g` is set when a record with guid `g` was encoded. The universe
//! `0..=max_guid` is capped at `MAX_PACK_BITS` bits. Guids must arrive
//! strictly increasing, which is what the build coordinator's ordered paths
//! deliver; anything else is reported rather than silently reordered.

use bitvec::prelude::*;
use serde_json::{Map, Value};

use super::{encode_bits, ExistenceEncoder, Lifecycle, PackBits, MAX_PACK_BITS};
use crate::error::TamperError;
use crate::types::{Guid, PackEncoding};

const ENCODER_NAME: &str = "existence";

#[derive(Debug, Clone, Default)]
pub struct ExistencePack {
    lifecycle: Lifecycle,
    max_guid: Guid,
    num_items: usize,
    encoded: usize,
    last_guid: Option<Guid>,
    bits: PackBits,
}

impl ExistencePack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of guids encoded in the current (or last) build.
    pub fn encoded_count(&self) -> usize {
        self.encoded
    }

    pub fn contains(&self, guid: Guid) -> bool {
        usize::try_from(guid)
            .ok()
            .and_then(|idx| self.bits.get(idx).map(|bit| *bit))
            .unwrap_or(false)
    }
}

impl ExistenceEncoder for ExistencePack {
    fn initialize_pack(&mut self, max_guid: Guid, num_items: usize) -> Result<(), TamperError> {
        let universe = max_guid
            .checked_add(1)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|&n| n <= MAX_PACK_BITS)
            .ok_or_else(|| {
                TamperError::invalid_option(
                    "max_guid",
                    format!("{max_guid} exceeds the existence bitmap limit of {MAX_PACK_BITS} bits"),
                )
            })?;

        self.lifecycle.open(ENCODER_NAME)?;
        self.max_guid = max_guid;
        self.num_items = num_items;
        self.encoded = 0;
        self.last_guid = None;
        self.bits = bitvec![u8, Msb0; 0; universe];
        Ok(())
    }

    fn encode(&mut self, guid: Guid) -> Result<(), TamperError> {
        self.lifecycle.ensure_open(ENCODER_NAME, "encode")?;
        if guid > self.max_guid {
            return Err(TamperError::GuidOutOfRange {
                guid,
                max_guid: self.max_guid,
            });
        }
        if let Some(previous) = self.last_guid {
            if guid <= previous {
                return Err(TamperError::GuidOutOfOrder { guid, previous });
            }
        }

        // In range, so the cast cannot truncate.
        self.bits.set(guid as usize, true);
        self.last_guid = Some(guid);
        self.encoded += 1;
        Ok(())
    }

    fn finalize_pack(&mut self) -> Result<(), TamperError> {
        self.lifecycle.seal(ENCODER_NAME)?;
        if self.encoded != self.num_items {
            log::warn!(
                "Existence pack sealed with {} guids but {} items were declared",
                self.encoded,
                self.num_items
            );
        }
        Ok(())
    }

    fn to_serializable(&self) -> Result<Value, TamperError> {
        self.lifecycle.ensure_sealed(ENCODER_NAME, "serialize")?;

        let mut out = Map::new();
        out.insert("encoding".into(), Value::from(PackEncoding::Existence.as_str()));
        out.insert("max_guid".into(), Value::from(self.max_guid));
        out.insert("num_items".into(), Value::from(self.num_items));
        out.insert("pack".into(), Value::from(encode_bits(&self.bits)));
        Ok(Value::Object(out))
    }
}
