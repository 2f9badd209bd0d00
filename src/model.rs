//! Flat tokenizer model container.

use alloc::format;
use alloc::vec::Vec;
use core::fmt::Debug;

use bstr::ByteSlice;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::encoded::{EncodedToken, PopsRange, MAX_TOKEN_LENGTH, MAX_VOCAB_SIZE, NULL_NODE};
use crate::trie::TrieNode;
use crate::InitializationError;

/// Numeric identifier of a token.
pub type TokenId = u32;
/// Byte sequence of a token.
pub type TokenBytes = Vec<u8>;
/// Index of a trie node.
pub type NodeId = u32;

/// Failure metadata of a single trie node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Deserialize, Serialize))]
pub struct Failure {
    /// Node continuing the match after the pops are emitted, or [`NULL_NODE`].
    pub link: NodeId,
    /// Tokens emitted when transitioning through the link.
    pub pops: PopsRange,
}

impl Failure {
    pub const NONE: Failure = Failure {
        link: NULL_NODE,
        pops: PopsRange::EMPTY,
    };
}

/// Tokenizer model.
///
/// A flat, read-only container holding the vocabulary, the trie and the
/// failure structures driving the linear matching loop. Constructed offline
/// by [`ModelBuilder`](crate::ModelBuilder) and never mutated afterwards; any
/// number of threads may share one model.
///
/// Suffix entries are stored with the indicator stripped, so the logical
/// vocabulary entry at `i` is `suffix_indicator + vocab[i]` when
/// `is_suffix[i]`.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Deserialize, Serialize))]
pub struct Model {
    /// Token surfaces in id order, suffix entries stripped of the indicator.
    pub vocab: Vec<TokenBytes>,
    /// Whether the entry at the same index continues a word.
    pub is_suffix: Vec<bool>,
    /// The word continuation marker, typically `##`. May be empty.
    pub suffix_indicator: TokenBytes,
    /// Surface of the unknown token.
    pub unk_token: TokenBytes,
    /// Id of the unknown token.
    pub unk_token_id: TokenId,
    /// Words longer than this map to the unknown token.
    pub max_bytes_per_token: u32,
    /// Whether the tokenizer detects word boundaries itself.
    pub end_to_end: bool,
    /// Whether the model retains what detokenization needs.
    pub support_detokenization: bool,
    /// Double-array trie over the vocabulary surfaces.
    pub trie: Vec<TrieNode>,
    /// Per-node failure metadata, same length as `trie`.
    pub failure: Vec<Failure>,
    /// Pool backing the failure pops slices.
    pub failure_pops_pool: Vec<EncodedToken>,
    /// Tokenization of the word equal to the suffix indicator.
    pub suffix_indicator_result: Vec<EncodedToken>,
    /// Node reached by traversing the suffix indicator from the root.
    pub suffix_root: NodeId,
    /// Inert node terminating punctuation failure chains, or [`NULL_NODE`].
    pub punct_failure_node: NodeId,
}

impl Debug for Model {
    #[inline(never)]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Model")
            .field("vocab", &format!("Vocab({})", self.vocab.len()))
            .field("suffix_indicator", &self.suffix_indicator.as_bstr())
            .field("unk_token", &self.unk_token.as_bstr())
            .field("unk_token_id", &self.unk_token_id)
            .field("max_bytes_per_token", &self.max_bytes_per_token)
            .field("end_to_end", &self.end_to_end)
            .field("support_detokenization", &self.support_detokenization)
            .field("trie", &format!("Trie({})", self.trie.len()))
            .field("failure_pops_pool", &format!("Pops({})", self.failure_pops_pool.len()))
            .field("suffix_root", &self.suffix_root)
            .field("punct_failure_node", &self.punct_failure_node)
            .finish()
    }
}

impl Model {
    /// Validates the model invariants the matching loop relies on.
    ///
    /// Returns an error if the vocabulary, the trie or the failure structures
    /// are inconsistent.
    #[inline(never)]
    pub fn validate(&self) -> Result<(), InitializationError> {
        if self.vocab.is_empty() {
            return Err(InitializationError::EmptyVocab);
        }
        if self.vocab.len() != self.is_suffix.len() || self.vocab.len() > MAX_VOCAB_SIZE as usize {
            return Err(InitializationError::InvalidVocab);
        }
        let unk = self
            .vocab
            .get(self.unk_token_id as usize)
            .ok_or(InitializationError::InvalidUnkToken)?;
        if *unk != self.unk_token {
            return Err(InitializationError::InvalidUnkToken);
        }
        if self.max_bytes_per_token == 0 || self.max_bytes_per_token > MAX_TOKEN_LENGTH {
            return Err(InitializationError::InvalidSizeLimit);
        }
        if self.trie.is_empty() || self.trie.len() != self.failure.len() {
            return Err(InitializationError::InvalidTrie);
        }
        let nodes = self.trie.len();
        if self.suffix_root != NULL_NODE && self.suffix_root as usize >= nodes {
            return Err(InitializationError::InvalidTrie);
        }
        if self.punct_failure_node != NULL_NODE && self.punct_failure_node as usize >= nodes {
            return Err(InitializationError::InvalidTrie);
        }
        for (node, failure) in self.trie.iter().zip(self.failure.iter()) {
            if failure.link != NULL_NODE && failure.link as usize >= nodes {
                return Err(InitializationError::InvalidFailure);
            }
            if failure.pops.offset() + failure.pops.len() > self.failure_pops_pool.len() {
                return Err(InitializationError::InvalidFailure);
            }
            if node.data != TrieNode::NO_DATA {
                let data = EncodedToken::from_bits(node.data);
                if data.id() as usize >= self.vocab.len() {
                    return Err(InitializationError::InvalidTokenEncoding);
                }
                // The matching loop follows the link of a data node without
                // checking it again.
                if failure.link == NULL_NODE {
                    return Err(InitializationError::InvalidFailure);
                }
            }
        }
        for pop in self.failure_pops_pool.iter().chain(self.suffix_indicator_result.iter()) {
            if pop.id() as usize >= self.vocab.len() {
                return Err(InitializationError::InvalidTokenEncoding);
            }
        }
        if !self.suffix_indicator.is_empty()
            && self.suffix_root != NULL_NODE
            && self.suffix_indicator_result.is_empty()
        {
            return Err(InitializationError::InvalidTokenEncoding);
        }
        Ok(())
    }
}
