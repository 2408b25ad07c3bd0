// In: src/pack_set/builder.rs

//! The build coordinator.
//!
//! Every build runs the same synchronized lifecycle over all encoders of a
//! `PackSet`:
//!
//! 1. `initialize_pack(max_guid, num_items)` on the existence encoder, then on
//!    every attribute pack in declaration order.
//! 2. For each record accepted by the producer: existence `encode(guid)`, then
//!    `encode(index, record)` on every attribute pack with one shared index.
//! 3. `finalize_pack()` on the existence encoder, then on every attribute pack.
//!
//! `build_pack` is the streaming entry point and trusts the producer to feed
//! records in ascending guid order. `pack` feeds a materialized, sorted slice
//! and can derive the build bounds from it. `build_unordered_pack` buffers
//! records from any order, sorts them by guid, then delegates to `pack`.

use std::collections::BTreeMap;

use super::{AttributePacks, BuildState, PackSet};
use crate::config::{BuildOptions, ResolvedBuild};
use crate::encoders::ExistenceEncoder;
use crate::error::TamperError;
use crate::record::{extract_guid, Record};
use crate::types::Guid;

//==================================================================================
// 1. Record Acceptors
//==================================================================================

/// The ordered acceptor handed to a `build_pack` producer.
///
/// Each `add` runs one record through every encoder. After the first failed
/// `add`, the packer refuses further records and the build fails even if the
/// producer ignored the error.
pub struct Packer<'a> {
    guid_attr: &'a str,
    existence: &'a mut dyn ExistenceEncoder,
    packs: &'a mut AttributePacks,
    index: usize,
    aborted_at: Option<usize>,
}

impl<'a> Packer<'a> {
    pub fn add<R: Record>(&mut self, record: &R) -> Result<(), TamperError> {
        if let Some(position) = self.aborted_at {
            return Err(TamperError::BuildAborted { position });
        }
        let result = self.encode_record(record);
        if result.is_err() {
            self.aborted_at = Some(self.index);
        }
        result
    }

    /// Number of records encoded so far.
    pub fn count(&self) -> usize {
        self.index
    }

    fn encode_record<R: Record>(&mut self, record: &R) -> Result<(), TamperError> {
        let guid = extract_guid(record, self.guid_attr, self.index)?;
        self.existence.encode(guid)?;
        for pack in self.packs.values_mut() {
            pack.encode(self.index, record)?;
        }
        self.index += 1;
        Ok(())
    }
}

/// The buffering acceptor handed to a `build_unordered_pack` producer.
///
/// Records are keyed by guid; a later record with the same guid replaces the
/// earlier one.
pub struct BufferingPacker<R> {
    guid_attr: String,
    records: BTreeMap<Guid, R>,
    received: usize,
    aborted_at: Option<usize>,
}

impl<R: Record> BufferingPacker<R> {
    fn new(guid_attr: &str) -> Self {
        Self {
            guid_attr: guid_attr.to_string(),
            records: BTreeMap::new(),
            received: 0,
            aborted_at: None,
        }
    }

    pub fn add(&mut self, record: R) -> Result<(), TamperError> {
        if let Some(position) = self.aborted_at {
            return Err(TamperError::BuildAborted { position });
        }
        let guid = match extract_guid(&record, &self.guid_attr, self.received) {
            Ok(guid) => guid,
            Err(err) => {
                self.aborted_at = Some(self.received);
                return Err(err);
            }
        };
        if self.records.insert(guid, record).is_some() {
            log::debug!("Guid {} supplied more than once; keeping the latest record", guid);
        }
        self.received += 1;
        Ok(())
    }

    /// Number of distinct guids buffered so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending guid order.
    fn into_sorted(self) -> Vec<R> {
        self.records.into_values().collect()
    }
}

//==================================================================================
// 2. Build Entry Points
//==================================================================================

impl PackSet {
    /// Runs one build, feeding records through `producer`.
    ///
    /// `opts.max_guid` and `opts.num_items` are required; when either is missing
    /// the call fails before any encoder is touched. Records must be added in
    /// strictly ascending guid order.
    pub fn build_pack<F>(&mut self, opts: &BuildOptions, producer: F) -> Result<(), TamperError>
    where
        F: FnOnce(&mut Packer<'_>) -> Result<(), TamperError>,
    {
        self.ensure_buildable()?;
        let params = opts.resolve()?;

        log::info!(
            "Building pack set: {} attribute pack(s), max guid {}, {} item(s)",
            self.attr_packs.len(),
            params.max_guid,
            params.num_items
        );

        match self.run_lifecycle(&params, producer) {
            Ok(encoded) => {
                if encoded != params.num_items {
                    log::debug!(
                        "Encoded {} record(s) but {} were declared",
                        encoded,
                        params.num_items
                    );
                }
                self.state = BuildState::Built;
                log::info!("Pack set built from {} record(s)", encoded);
                Ok(())
            }
            Err(err) => {
                self.state = BuildState::Poisoned;
                log::warn!("Pack set build failed: {}", err);
                Err(err)
            }
        }
    }

    /// Builds from a collection already sorted by ascending guid.
    ///
    /// When not supplied, `max_guid` is taken from the last record and
    /// `num_items` from the collection length.
    pub fn pack<R: Record>(&mut self, data: &[R], opts: &BuildOptions) -> Result<(), TamperError> {
        self.ensure_buildable()?;

        let mut opts = opts.clone();
        if opts.max_guid.is_none() {
            let last = data
                .last()
                .ok_or_else(|| TamperError::MissingRequiredOption("max_guid".into()))?;
            opts.max_guid = Some(extract_guid(last, &opts.guid_attr, data.len() - 1)?);
        }
        if opts.num_items.is_none() {
            opts.num_items = Some(data.len());
        }
        log::debug!("Resolved build options from collection: {:?}", opts);

        self.build_pack(&opts, |packer| {
            for record in data {
                packer.add(record)?;
            }
            Ok(())
        })
    }

    /// Builds from records supplied in any order.
    ///
    /// All records are buffered in memory and sorted by guid before the build
    /// runs; duplicate guids keep the last record supplied.
    pub fn build_unordered_pack<R, F>(
        &mut self,
        opts: &BuildOptions,
        producer: F,
    ) -> Result<(), TamperError>
    where
        R: Record,
        F: FnOnce(&mut BufferingPacker<R>) -> Result<(), TamperError>,
    {
        self.ensure_buildable()?;

        let mut buffer = BufferingPacker::new(&opts.guid_attr);
        producer(&mut buffer)?;
        if let Some(position) = buffer.aborted_at {
            return Err(TamperError::BuildAborted { position });
        }
        log::debug!(
            "Buffered {} distinct guid(s) from {} record(s)",
            buffer.len(),
            buffer.received
        );

        let sorted = buffer.into_sorted();
        self.pack(&sorted, opts)
    }

    fn ensure_buildable(&self) -> Result<(), TamperError> {
        if self.state == BuildState::Poisoned {
            return Err(TamperError::PackSetPoisoned);
        }
        Ok(())
    }

    /// Initialize, encode, finalize. Returns the number of records encoded.
    fn run_lifecycle<F>(&mut self, params: &ResolvedBuild, producer: F) -> Result<usize, TamperError>
    where
        F: FnOnce(&mut Packer<'_>) -> Result<(), TamperError>,
    {
        // Existence first: attribute packs may rely on the guid universe being primed.
        self.existence
            .initialize_pack(params.max_guid, params.num_items)?;
        for pack in self.attr_packs.values_mut() {
            pack.initialize_pack(params.max_guid, params.num_items)?;
        }

        let encoded = {
            let mut packer = Packer {
                guid_attr: &params.guid_attr,
                existence: self.existence.as_mut(),
                packs: &mut self.attr_packs,
                index: 0,
                aborted_at: None,
            };
            producer(&mut packer)?;
            if let Some(position) = packer.aborted_at {
                return Err(TamperError::BuildAborted { position });
            }
            packer.index
        };

        self.existence.finalize_pack()?;
        for pack in self.attr_packs.values_mut() {
            pack.finalize_pack()?;
        }
        Ok(encoded)
    }
}
