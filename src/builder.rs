//! Offline model construction.
//!
//! Builds the double-array trie and the failure structures that drive the
//! linear matching loop from a plain vocabulary listing. Construction cost is
//! irrelevant to the runtime: models are built once and loaded read-only.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::encoded::{
    EncodedToken, PopsRange, MAX_POPS_LENGTH, MAX_POPS_OFFSET, MAX_TOKEN_LENGTH, MAX_VOCAB_SIZE,
    NULL_NODE,
};
use crate::trie::TrieNode;
use crate::unicode::is_punct_or_cjk;
use crate::{Failure, Model, NodeId, TokenBytes, TokenId};

/// Errors encountered during model construction.
#[non_exhaustive]
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum BuildError {
    /// The vocabulary is empty.
    #[cfg_attr(feature = "std", error("empty vocabulary"))]
    EmptyVocab,
    /// The vocabulary exceeds the id budget of the token encoding.
    #[cfg_attr(feature = "std", error("vocabulary exceeds the id budget"))]
    VocabTooLarge,
    /// The vocabulary contains the same surface twice.
    #[cfg_attr(feature = "std", error("duplicate vocabulary entry {0:?}"))]
    DuplicateToken(TokenBytes),
    /// A vocabulary surface is empty or longer than the token encoding allows.
    #[cfg_attr(feature = "std", error("invalid vocabulary entry {0:?}"))]
    InvalidToken(TokenBytes),
    /// The unknown token is missing from the vocabulary or marked as suffix.
    #[cfg_attr(feature = "std", error("unknown token missing from the vocabulary"))]
    InvalidUnkToken,
    /// `max_bytes_per_token` is zero or exceeds the token encoding length field.
    #[cfg_attr(feature = "std", error("invalid word size limit"))]
    InvalidSizeLimit,
    /// The failure pops exceeded their encoding budget.
    #[cfg_attr(feature = "std", error("failure pops exceed the encoding budget"))]
    PopsOverflow,
}

/// Builder for [`Model`]s.
///
/// The vocabulary lists token surfaces in id order, with suffix entries
/// carrying the indicator prefix as they appear in vocabulary files.
///
/// ```
/// # fn main() -> Result<(), fastpiece::BuildError> {
/// use fastpiece::ModelBuilder;
///
/// let model = ModelBuilder::new(["hello", "##world", "[UNK]"], "##", "[UNK]")
///     .max_bytes_per_token(100)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    vocab: Vec<TokenBytes>,
    suffix_indicator: TokenBytes,
    unk_token: TokenBytes,
    max_bytes_per_token: u32,
    end_to_end: bool,
    support_detokenization: bool,
}

impl ModelBuilder {
    /// Creates a builder over the given vocabulary.
    #[inline(never)]
    pub fn new(
        vocab: impl IntoIterator<Item = impl Into<TokenBytes>>,
        suffix_indicator: impl Into<TokenBytes>, unk_token: impl Into<TokenBytes>,
    ) -> Self {
        Self {
            vocab: vocab.into_iter().map(Into::into).collect(),
            suffix_indicator: suffix_indicator.into(),
            unk_token: unk_token.into(),
            max_bytes_per_token: 100,
            end_to_end: false,
            support_detokenization: false,
        }
    }

    /// Sets the word size limit in bytes. Longer words map to the unknown
    /// token without being matched.
    #[inline(always)]
    pub fn max_bytes_per_token(mut self, max_bytes_per_token: u32) -> Self {
        self.max_bytes_per_token = max_bytes_per_token;
        self
    }

    /// Builds a model that detects word boundaries itself instead of
    /// expecting pre-split words.
    #[inline(always)]
    pub fn end_to_end(mut self, end_to_end: bool) -> Self {
        self.end_to_end = end_to_end;
        self
    }

    /// Enables the detokenization API on the built model.
    #[inline(always)]
    pub fn support_detokenization(mut self, support_detokenization: bool) -> Self {
        self.support_detokenization = support_detokenization;
        self
    }

    /// Builds the model.
    ///
    /// Returns an error if the vocabulary is inconsistent or exceeds the
    /// encoding budgets.
    #[inline(never)]
    pub fn build(self) -> Result<Model, BuildError> {
        let Self {
            vocab,
            suffix_indicator,
            unk_token,
            max_bytes_per_token,
            end_to_end,
            support_detokenization,
        } = self;

        if vocab.is_empty() {
            return Err(BuildError::EmptyVocab);
        }
        if vocab.len() > MAX_VOCAB_SIZE as usize {
            return Err(BuildError::VocabTooLarge);
        }
        if max_bytes_per_token == 0 || max_bytes_per_token > MAX_TOKEN_LENGTH {
            return Err(BuildError::InvalidSizeLimit);
        }

        let mut ids = HashMap::with_capacity(vocab.len());
        for (id, surface) in vocab.iter().enumerate() {
            if ids.insert(surface.clone(), id as TokenId).is_some() {
                return Err(BuildError::DuplicateToken(surface.clone()));
            }
        }
        let unk_token_id = *ids.get(&unk_token).ok_or(BuildError::InvalidUnkToken)?;

        let is_suffix = vocab
            .iter()
            .map(|surface| {
                !suffix_indicator.is_empty() && surface.starts_with(&suffix_indicator)
            })
            .collect::<Vec<_>>();
        if is_suffix[unk_token_id as usize] {
            return Err(BuildError::InvalidUnkToken);
        }

        // Raw trie over the vocabulary surfaces. The entry equal to the
        // suffix indicator is left out; that word is covered by the
        // precomputed result instead.
        let mut raw = Vec::from([RawNode::default()]);
        for (id, surface) in vocab.iter().enumerate() {
            let stripped = if is_suffix[id] {
                &surface[suffix_indicator.len()..]
            } else {
                &surface[..]
            };
            if surface.is_empty() || stripped.len() > MAX_TOKEN_LENGTH as usize {
                return Err(BuildError::InvalidToken(surface.clone()));
            }
            if *surface == suffix_indicator {
                continue;
            }
            let node = raw_insert(&mut raw, surface);
            raw[node].data =
                Some(EncodedToken::new(id as TokenId, stripped.len() as u32, is_suffix[id]));
        }

        // The indicator path always exists, so failure links of token nodes
        // have a target even when the vocabulary has no suffix entries.
        let suffix_root_raw = raw_insert(&mut raw, &suffix_indicator);

        // End-to-end matching requires every boundary scalar to be present in
        // the trie, otherwise the outer loop could not advance over it. Chars
        // missing from the vocabulary map to the unknown token.
        let mut punct_dummies = HashSet::new();
        if end_to_end {
            let mut buffer = [0u8; 4];
            for ch in ('\0'..=char::MAX).filter(|&ch| is_punct_or_cjk(ch)) {
                let bytes = ch.encode_utf8(&mut buffer).as_bytes();
                let node = raw_insert(&mut raw, bytes);
                if raw[node].data.is_none() {
                    raw[node].data =
                        Some(EncodedToken::new(unk_token_id, bytes.len() as u32, false));
                    punct_dummies.insert(node);
                }
            }
        }

        let fails = compute_failures(&raw, &suffix_indicator, suffix_root_raw, &punct_dummies);

        let (mut nodes, map) = layout_double_array(&raw);
        let punct_failure_node = if end_to_end {
            let node = nodes.len() as NodeId;
            nodes.push(TrieNode::EMPTY);
            node
        } else {
            NULL_NODE
        };

        let mut failure = Vec::from_iter(core::iter::repeat(Failure::NONE).take(nodes.len()));
        let mut failure_pops_pool = Vec::new();
        for (node, raw_node) in raw.iter().enumerate() {
            let (link, pops) = match fails.target[node] {
                FailTarget::None => (NULL_NODE, PopsRange::EMPTY),
                FailTarget::PunctSentinel => (punct_failure_node, PopsRange::EMPTY),
                FailTarget::Node(target) => {
                    // The token of a data node is its implicit sole pop; only
                    // plain nodes serialize their pops list.
                    if raw_node.data.is_some() || fails.pops[node].is_empty() {
                        (map[target], PopsRange::EMPTY)
                    } else {
                        let offset = failure_pops_pool.len();
                        if offset > MAX_POPS_OFFSET as usize
                            || fails.pops[node].len() > MAX_POPS_LENGTH as usize
                        {
                            return Err(BuildError::PopsOverflow);
                        }
                        failure_pops_pool.extend_from_slice(&fails.pops[node]);
                        (map[target], PopsRange::new(offset as u32, fails.pops[node].len() as u32))
                    }
                }
            };
            failure[map[node] as usize] = Failure { link, pops };
        }

        let suffix_indicator_result = precompute_suffix_indicator_result(
            &ids,
            &vocab,
            &is_suffix,
            &suffix_indicator,
            unk_token_id,
        );

        let vocab = vocab
            .into_iter()
            .zip(is_suffix.iter())
            .map(|(surface, &suffix)| {
                if suffix {
                    surface[suffix_indicator.len()..].to_vec()
                } else {
                    surface
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "built model: {} tokens, {} trie nodes, {} failure pops",
            vocab.len(),
            nodes.len(),
            failure_pops_pool.len()
        );

        Ok(Model {
            vocab,
            is_suffix,
            suffix_indicator,
            unk_token,
            unk_token_id,
            max_bytes_per_token,
            end_to_end,
            support_detokenization,
            trie: nodes,
            failure,
            failure_pops_pool,
            suffix_indicator_result,
            suffix_root: map[suffix_root_raw],
            punct_failure_node,
        })
    }
}

#[derive(Debug, Default, Clone)]
struct RawNode {
    children: Vec<(u8, usize)>,
    data:     Option<EncodedToken>,
}

fn raw_child(raw: &[RawNode], node: usize, byte: u8) -> Option<usize> {
    raw[node]
        .children
        .binary_search_by_key(&byte, |&(label, _)| label)
        .ok()
        .map(|found| raw[node].children[found].1)
}

fn raw_insert(raw: &mut Vec<RawNode>, key: &[u8]) -> usize {
    let mut node = 0;
    for &byte in key {
        node = match raw[node].children.binary_search_by_key(&byte, |&(label, _)| label) {
            Ok(found) => raw[node].children[found].1,
            Err(slot) => {
                let next = raw.len();
                raw.push(RawNode::default());
                raw[node].children.insert(slot, (byte, next));
                next
            }
        };
    }
    node
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailTarget {
    None,
    Node(usize),
    PunctSentinel,
}

struct Failures {
    target: Vec<FailTarget>,
    pops:   Vec<Vec<EncodedToken>>,
}

/// Computes failure links and failure pops over the raw trie.
///
/// Breadth-first over the trie: a node holding a token links to the suffix
/// root (or the punctuation sentinel) with its own token as the sole pop;
/// nodes on the indicator path never pop; any other node inherits its
/// parent's pops and walks the parent's failure chain until a chain node can
/// consume the node's last byte.
fn compute_failures(
    raw: &[RawNode], suffix_indicator: &[u8], suffix_root_raw: usize,
    punct_dummies: &HashSet<usize>,
) -> Failures {
    let mut target = Vec::from_iter(core::iter::repeat(FailTarget::None).take(raw.len()));
    let mut pops: Vec<Vec<EncodedToken>> = Vec::from_iter(
        core::iter::repeat(Vec::new()).take(raw.len()),
    );

    let suffix_path = {
        let mut path = Vec::from([0usize]);
        let mut node = 0;
        for &byte in suffix_indicator {
            node = raw_child(raw, node, byte).unwrap();
            path.push(node);
        }
        path
    };

    let mut queue = VecDeque::from([0usize]);
    while let Some(node) = queue.pop_front() {
        for &(byte, child) in &raw[node].children {
            queue.push_back(child);
            if let Some(data) = raw[child].data {
                pops[child] = Vec::from([data]);
                target[child] = if punct_dummies.contains(&child) {
                    FailTarget::PunctSentinel
                } else {
                    FailTarget::Node(suffix_root_raw)
                };
                continue;
            }
            if suffix_path.contains(&child) {
                continue;
            }
            let mut candidate = target[node];
            let mut collected = pops[node].clone();
            loop {
                let FailTarget::Node(chain) = candidate else {
                    break;
                };
                if let Some(next) = raw_child(raw, chain, byte) {
                    target[child] = FailTarget::Node(next);
                    pops[child] = collected;
                    break;
                }
                collected.extend_from_slice(&pops[chain]);
                candidate = target[chain];
            }
        }
    }

    Failures { target, pops }
}

/// Lays out the raw trie as a double array.
///
/// Children of a node are placed at `base ^ byte`; the builder probes bases
/// starting from the lowest free slot until all children fit. Returns the
/// units and the raw-to-unit index mapping.
fn layout_double_array(raw: &[RawNode]) -> (Vec<TrieNode>, Vec<NodeId>) {
    let mut nodes = Vec::from([TrieNode::EMPTY]);
    let mut map = Vec::from_iter(core::iter::repeat(NULL_NODE).take(raw.len()));
    map[0] = 0;
    let mut search_start = 1u32;
    let mut queue = VecDeque::from([0usize]);
    while let Some(node) = queue.pop_front() {
        if raw[node].children.is_empty() {
            continue;
        }
        let mut base = search_start;
        'search: loop {
            let limit = (base | 0xFF) as usize + 1;
            if nodes.len() < limit {
                nodes.resize(limit, TrieNode::EMPTY);
            }
            for &(byte, _) in &raw[node].children {
                let slot = (base ^ byte as u32) as usize;
                if slot == 0 || nodes[slot].check != TrieNode::NO_PARENT {
                    base += 1;
                    continue 'search;
                }
            }
            break;
        }
        nodes[map[node] as usize].base = base;
        for &(byte, child) in &raw[node].children {
            let slot = base ^ byte as u32;
            nodes[slot as usize].check = map[node];
            if let Some(data) = raw[child].data {
                nodes[slot as usize].data = data.bits();
            }
            map[child] = slot;
            queue.push_back(child);
        }
        while (search_start as usize) < nodes.len()
            && nodes[search_start as usize].check != TrieNode::NO_PARENT
        {
            search_start += 1;
        }
    }
    let used = nodes
        .iter()
        .rposition(|node| node.check != TrieNode::NO_PARENT)
        .map_or(1, |last| last + 1);
    nodes.truncate(used);
    (nodes, map)
}

/// Tokenizes the word equal to the suffix indicator with plain greedy
/// longest-match WordPiece, falling back to a single unknown encoding.
fn precompute_suffix_indicator_result(
    ids: &HashMap<TokenBytes, TokenId>, vocab: &[TokenBytes], is_suffix: &[bool],
    suffix_indicator: &[u8], unk_token_id: TokenId,
) -> Vec<EncodedToken> {
    if suffix_indicator.is_empty() {
        return Vec::new();
    }
    let unknown = Vec::from([EncodedToken::new(
        unk_token_id,
        (suffix_indicator.len() as u32).min(MAX_TOKEN_LENGTH),
        false,
    )]);
    let mut result = Vec::new();
    let mut start = 0;
    while start < suffix_indicator.len() {
        let mut matched = None;
        let mut end = suffix_indicator.len();
        while end > start {
            let key = if start == 0 {
                suffix_indicator[..end].to_vec()
            } else {
                [suffix_indicator, &suffix_indicator[start..end]].concat()
            };
            if let Some(&id) = ids.get(&key) {
                matched = Some((id, end));
                break;
            }
            end -= 1;
        }
        let Some((id, end)) = matched else {
            return unknown;
        };
        let length = if is_suffix[id as usize] {
            vocab[id as usize].len() - suffix_indicator.len()
        } else {
            vocab[id as usize].len()
        };
        result.push(EncodedToken::new(id, length as u32, is_suffix[id as usize]));
        start = end;
    }
    result
}
