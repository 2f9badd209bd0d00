//! Bit-packed model encodings shared between the builder and the runtime.

use core::fmt::Debug;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::{NodeId, TokenId};

/// Number of bits encoding a token surface length.
pub const TOKEN_LENGTH_BITS: u32 = 8;
/// Maximum surface byte length of a token, excluding the suffix indicator.
pub const MAX_TOKEN_LENGTH: u32 = (1 << TOKEN_LENGTH_BITS) - 1;
/// Maximum number of entries in a vocabulary.
pub const MAX_VOCAB_SIZE: u32 = 1 << 22;
/// Number of bits encoding the length of a failure pops list.
pub const POPS_LENGTH_BITS: u32 = 8;
/// Maximum length of a single failure pops list.
pub const MAX_POPS_LENGTH: u32 = (1 << POPS_LENGTH_BITS) - 1;
/// Maximum offset into the failure pops pool.
pub const MAX_POPS_OFFSET: u32 = (1 << 24) - 1;

/// Sentinel for an absent trie node.
pub const NULL_NODE: NodeId = NodeId::MAX;

/// A vocabulary token packed into 32 bits.
///
/// Layout, from the least significant bit: the suffix flag in bit 0, 8 bits of
/// surface byte length excluding the suffix indicator, and 22 bits of token id.
/// Bit 31 stays clear, leaving `u32::MAX` free for sentinels. The layout is
/// part of the model ABI and must match between the builder and the runtime.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialization", serde(transparent))]
pub struct EncodedToken(u32);

impl EncodedToken {
    #[inline(always)]
    pub(crate) fn new(id: TokenId, length: u32, is_suffix: bool) -> Self {
        debug_assert!(id < MAX_VOCAB_SIZE);
        debug_assert!(length <= MAX_TOKEN_LENGTH);
        Self(id << (TOKEN_LENGTH_BITS + 1) | length << 1 | is_suffix as u32)
    }

    #[inline(always)]
    pub(crate) fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub(crate) fn bits(self) -> u32 {
        self.0
    }

    /// The token id.
    #[inline(always)]
    pub fn id(self) -> TokenId {
        self.0 >> (TOKEN_LENGTH_BITS + 1)
    }

    /// The byte length of the token surface, excluding the suffix indicator.
    #[inline(always)]
    pub fn length(self) -> usize {
        ((self.0 >> 1) & MAX_TOKEN_LENGTH) as usize
    }

    /// Whether the token continues a word.
    #[inline(always)]
    pub fn is_suffix(self) -> bool {
        self.0 & 1 != 0
    }
}

impl Debug for EncodedToken {
    #[inline(never)]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("EncodedToken")
            .field("id", &self.id())
            .field("length", &self.length())
            .field("is_suffix", &self.is_suffix())
            .finish()
    }
}

/// A slice of the failure pops pool packed into 32 bits: 24 bits of pool
/// offset above 8 bits of list length.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialization", serde(transparent))]
pub struct PopsRange(u32);

impl PopsRange {
    /// An empty slice.
    pub const EMPTY: PopsRange = PopsRange(0);

    #[inline(always)]
    pub(crate) fn new(offset: u32, length: u32) -> Self {
        debug_assert!(offset <= MAX_POPS_OFFSET);
        debug_assert!(length <= MAX_POPS_LENGTH);
        Self(offset << POPS_LENGTH_BITS | length)
    }

    /// Offset of the first entry in the pool.
    #[inline(always)]
    pub fn offset(self) -> usize {
        (self.0 >> POPS_LENGTH_BITS) as usize
    }

    /// Number of entries.
    #[inline(always)]
    pub fn len(self) -> usize {
        (self.0 & MAX_POPS_LENGTH) as usize
    }

    /// Whether the slice is empty.
    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Debug for PopsRange {
    #[inline(never)]
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PopsRange")
            .field("offset", &self.offset())
            .field("len", &self.len())
            .finish()
    }
}
