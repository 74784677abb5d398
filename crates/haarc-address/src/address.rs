//! Trivariate address generation, slicing and validation

use crate::alphabet;
use crate::murmur::murmur3_32;
use haarc_core::{ContextRecord, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Symbols per segment.
pub const SEGMENT_LEN: usize = 16;
/// Symbols per address.
pub const ADDRESS_LEN: usize = SEGMENT_LEN * 3;

/// Hashed in place of an empty context record.
pub const NO_CONTEXT_SENTINEL: &str = "\u{2205}no-context";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Positions 1-16, from the operation name
    Semantic,
    /// Positions 17-32, from the serialized context
    Context,
    /// Positions 33-48, from the uniqueness token
    Unique,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Semantic, Segment::Context, Segment::Unique];
}

/// A 48-symbol, three-segment address. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrivariateAddress {
    full: String,
    /// Byte offsets of the context and unique segments
    bounds: [usize; 2],
}

impl TrivariateAddress {
    /// Wrap an existing address string after validating it.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_string(s.to_string())
    }

    fn from_string(full: String) -> Result<Self> {
        if !validate(&full) {
            return Err(Error::invalid_context(format!(
                "not a trivariate address: {:?}",
                full
            )));
        }
        let bounds = segment_bounds(&full);
        Ok(Self { full, bounds })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    pub fn segment(&self, which: Segment) -> &str {
        let [ctx, uniq] = self.bounds;
        match which {
            Segment::Semantic => &self.full[..ctx],
            Segment::Context => &self.full[ctx..uniq],
            Segment::Unique => &self.full[uniq..],
        }
    }

    pub fn semantic(&self) -> &str {
        self.segment(Segment::Semantic)
    }

    pub fn context(&self) -> &str {
        self.segment(Segment::Context)
    }

    pub fn unique(&self) -> &str {
        self.segment(Segment::Unique)
    }

    /// The 32-bit hash a segment was expanded from.
    pub fn segment_hash(&self, which: Segment) -> Option<u32> {
        alphabet::decode_prefix(self.segment(which))
    }

    /// Semantic + context segments: the same kind of work in the same
    /// situation, regardless of which instance it is.
    pub fn semantic_context_key(&self) -> &str {
        &self.full[..self.bounds[1]]
    }
}

impl std::fmt::Display for TrivariateAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

impl TryFrom<String> for TrivariateAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_string(s)
    }
}

impl From<TrivariateAddress> for String {
    fn from(a: TrivariateAddress) -> Self {
        a.full
    }
}

impl AsRef<str> for TrivariateAddress {
    fn as_ref(&self) -> &str {
        &self.full
    }
}

fn segment_bounds(full: &str) -> [usize; 2] {
    let mut offsets = full.char_indices().map(|(i, _)| i);
    let ctx = offsets.nth(SEGMENT_LEN).unwrap_or(full.len());
    let uniq = offsets.nth(SEGMENT_LEN - 1).unwrap_or(full.len());
    [ctx, uniq]
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Seed constants for the three hash passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    pub semantic_seed: u32,
    pub context_seed: u32,
    pub unique_seed: u32,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            semantic_seed: 0x5348_4331,
            context_seed: 0x4355_4944,
            unique_seed: 0x5555_4944,
        }
    }
}

/// Pure address generator. Cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct AddressEngine {
    config: AddressConfig,
}

impl AddressEngine {
    pub fn new(config: AddressConfig) -> Result<Self> {
        let AddressConfig {
            semantic_seed,
            context_seed,
            unique_seed,
        } = config;
        if semantic_seed == context_seed
            || context_seed == unique_seed
            || semantic_seed == unique_seed
        {
            return Err(Error::config("address seeds must be distinct"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AddressConfig {
        &self.config
    }

    /// Derive the address for one unit of work. Identical inputs always give
    /// the identical address.
    pub fn generate(
        &self,
        operation_name: &str,
        context: &ContextRecord,
        uniqueness_seed: &[u8],
    ) -> Result<TrivariateAddress> {
        if operation_name.trim().is_empty() {
            return Err(Error::invalid_context("empty operation name"));
        }
        if uniqueness_seed.is_empty() {
            return Err(Error::invalid_context("empty uniqueness seed"));
        }

        let canonical = context.canonical()?;
        let context_bytes = if canonical.is_empty() {
            NO_CONTEXT_SENTINEL.as_bytes()
        } else {
            canonical.as_bytes()
        };

        let hashes = [
            murmur3_32(operation_name.as_bytes(), self.config.semantic_seed),
            murmur3_32(context_bytes, self.config.context_seed),
            murmur3_32(uniqueness_seed, self.config.unique_seed),
        ];

        let mut full = String::with_capacity(ADDRESS_LEN * 2);
        for hash in hashes {
            alphabet::expand(hash, SEGMENT_LEN, &mut full);
        }
        trace!(operation = operation_name, address = %full, "address generated");

        let bounds = segment_bounds(&full);
        Ok(TrivariateAddress { full, bounds })
    }
}

/// [`AddressEngine::generate`] with the default seeds.
pub fn generate(
    operation_name: &str,
    context: &ContextRecord,
    uniqueness_seed: &[u8],
) -> Result<TrivariateAddress> {
    AddressEngine::default().generate(operation_name, context, uniqueness_seed)
}

/// Slice one segment out of an address. No recomputation.
pub fn segment(address: &TrivariateAddress, which: Segment) -> &str {
    address.segment(which)
}

/// Length and alphabet check only. Cannot (and does not try to) reverse the hash.
pub fn validate(candidate: &str) -> bool {
    let mut count = 0;
    for c in candidate.chars() {
        if !alphabet::is_symbol(c) {
            return false;
        }
        count += 1;
        if count > ADDRESS_LEN {
            return false;
        }
    }
    count == ADDRESS_LEN
}
