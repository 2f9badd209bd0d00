//! **Fast WordPiece tokenizer for language models.**
//!
//! Linear-time WordPiece subword tokenization driven by a double-array trie
//! augmented with failure links and failure pops, following the LinMaxMatch
//! construction from "Fast WordPiece Tokenization" (EMNLP 2021). A single
//! left-to-right pass over the input produces the same segmentation as the
//! classic longest-match-first algorithm, without its quadratic backtracking.
//!
//! Models are built offline with [`ModelBuilder`] and loaded read-only; the
//! matching loop allocates nothing beyond the output containers it appends
//! to. Depending on the model, the tokenizer either consumes pre-split words
//! or detects word boundaries itself using Unicode whitespace, punctuation
//! and CJK rules.
//!
//! # Examples
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use fastpiece::{Fastpiece, ModelBuilder};
//!
//! let model = ModelBuilder::new(["a", "abcd", "##b", "##bc", "##z", "[UNK]"], "##", "[UNK]")
//!     .end_to_end(true)
//!     .support_detokenization(true)
//!     .build()?;
//! let tokenizer = Fastpiece::new(model)?;
//!
//! let mut ids = Vec::new();
//! tokenizer.tokenize("abcz", &mut ids, 0);
//! assert_eq!(ids, [0, 3, 4]);
//!
//! let text = tokenizer.detokenize(&ids)?;
//! assert_eq!(text, b"abcz");
//! # Ok(())
//! # }
//! ```
//!
//! # Cargo features
//!
//! - `std`: Enables standard library features, including reading and writing
//!   models from and to files.
//! - `serialization`: Enables `serde` implementations and methods for
//!   serialization and deserialization of models.
//! - `builder`: Enables offline model construction from a vocabulary.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod encoded;
mod model;
mod trie;
mod unicode;

#[cfg(feature = "builder")]
mod builder;

#[cfg(feature = "serialization")]
mod serialization;

use alloc::vec::Vec;

pub use crate::encoded::{EncodedToken, PopsRange, NULL_NODE};
pub use crate::model::*;
pub use crate::trie::TrieNode;

#[cfg(feature = "builder")]
pub use crate::builder::{BuildError, ModelBuilder};

#[cfg(feature = "serialization")]
pub use crate::serialization::*;

use crate::trie::{Trie, TrieCursor};

/// Errors encountered during initialization.
#[non_exhaustive]
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum InitializationError {
    /// The vocabulary is empty.
    #[cfg_attr(feature = "std", error("empty vocabulary"))]
    EmptyVocab,
    /// The vocabulary and suffix flags disagree, or the vocabulary exceeds
    /// the id budget of the token encoding.
    #[cfg_attr(feature = "std", error("invalid vocabulary"))]
    InvalidVocab,
    /// The unknown token id is out of range or its vocabulary entry differs
    /// from the unknown token surface.
    #[cfg_attr(feature = "std", error("invalid unknown token"))]
    InvalidUnkToken,
    /// The word size limit is zero or exceeds the token encoding.
    #[cfg_attr(feature = "std", error("invalid word size limit"))]
    InvalidSizeLimit,
    /// The trie is empty or a node reference points outside of it.
    #[cfg_attr(feature = "std", error("invalid trie"))]
    InvalidTrie,
    /// A failure link or failure pops slice is inconsistent.
    #[cfg_attr(feature = "std", error("invalid failure table"))]
    InvalidFailure,
    /// A packed token refers past the vocabulary.
    #[cfg_attr(feature = "std", error("invalid token encoding"))]
    InvalidTokenEncoding,
}

/// Errors encountered during detokenization.
#[non_exhaustive]
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum DetokenizeError {
    /// The model was built without detokenization support.
    #[cfg_attr(
        feature = "std",
        error("the model was built without detokenization support")
    )]
    Unsupported,
    /// A token id has no vocabulary entry.
    #[cfg_attr(feature = "std", error("invalid token {0}"))]
    InvalidToken(TokenId),
}

/// Fast WordPiece tokenizer.
///
/// Wraps a validated [`Model`] and exposes the tokenization and
/// detokenization operations. The tokenizer is immutable; any number of
/// threads may share one instance.
#[derive(Debug, Clone)]
pub struct Fastpiece {
    model: Model,
}

/// Output slots of one tokenization call. Unrequested slots stay `None` and
/// cost nothing to skip.
#[derive(Debug)]
struct TokenSink<'a> {
    pieces: Option<&'a mut Vec<TokenBytes>>,
    ids:    Option<&'a mut Vec<TokenId>>,
    starts: Option<&'a mut Vec<usize>>,
    ends:   Option<&'a mut Vec<usize>>,
}

impl TokenSink<'_> {
    #[inline(always)]
    fn len(&self) -> usize {
        match (&self.pieces, &self.ids) {
            (Some(pieces), _) => pieces.len(),
            (_, Some(ids)) => ids.len(),
            _ => 0,
        }
    }

    #[inline(always)]
    fn wants_surface(&self) -> bool {
        self.pieces.is_some() || self.starts.is_some() || self.ends.is_some()
    }

    #[inline(always)]
    fn truncate(&mut self, len: usize) {
        if let Some(pieces) = &mut self.pieces {
            pieces.truncate(len);
        }
        if let Some(ids) = &mut self.ids {
            ids.truncate(len);
        }
        if let Some(starts) = &mut self.starts {
            starts.truncate(len);
        }
        if let Some(ends) = &mut self.ends {
            ends.truncate(len);
        }
    }
}

impl Fastpiece {
    /// Creates a tokenizer from the given model.
    ///
    /// Returns an error if the model fails to validate. See [`Model`] for the
    /// invariants the matching loop relies on.
    #[inline(never)]
    pub fn new(model: Model) -> Result<Self, InitializationError> {
        model.validate()?;
        Ok(Self { model })
    }

    /// The model backing this tokenizer.
    #[inline(always)]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Consumes the tokenizer and returns its model.
    #[inline(always)]
    pub fn into_model(self) -> Model {
        self.model
    }

    /// Tokenizes the input into token ids, appended to `output_ids`.
    ///
    /// With an end-to-end model the input is arbitrary text and word
    /// boundaries are detected internally; otherwise the input must be a
    /// single pre-split word. A word that cannot be segmented contributes
    /// exactly one unknown token; tokenization itself never fails, and
    /// malformed UTF-8 resolves to unknown tokens as well.
    ///
    /// `word_offset` shifts the offsets reported for single-word input and is
    /// ignored by end-to-end models.
    #[inline(never)]
    pub fn tokenize(
        &self, text: impl AsRef<[u8]>, output_ids: &mut Vec<TokenId>, word_offset: usize,
    ) {
        let mut sink = TokenSink {
            pieces: None,
            ids:    Some(output_ids),
            starts: None,
            ends:   None,
        };
        self.tokenize_into(text.as_ref(), word_offset, &mut sink);
    }

    /// Tokenizes the input into token ids and byte offsets.
    ///
    /// Offsets are byte positions into the input; each token spans
    /// `starts[i]..ends[i]`. See [`Fastpiece::tokenize`] for the remaining
    /// semantics.
    #[inline(never)]
    pub fn tokenize_with_offsets(
        &self, text: impl AsRef<[u8]>, output_ids: &mut Vec<TokenId>,
        output_starts: &mut Vec<usize>, output_ends: &mut Vec<usize>, word_offset: usize,
    ) {
        let mut sink = TokenSink {
            pieces: None,
            ids:    Some(output_ids),
            starts: Some(output_starts),
            ends:   Some(output_ends),
        };
        self.tokenize_into(text.as_ref(), word_offset, &mut sink);
    }

    /// Tokenizes the input into surface pieces, token ids and byte offsets.
    ///
    /// Continuation pieces carry the suffix indicator prefix; a word that
    /// could not be segmented appears as the unknown token surface. See
    /// [`Fastpiece::tokenize`] for the remaining semantics.
    #[inline(never)]
    pub fn tokenize_with_pieces(
        &self, text: impl AsRef<[u8]>, output_pieces: &mut Vec<TokenBytes>,
        output_ids: &mut Vec<TokenId>, output_starts: &mut Vec<usize>,
        output_ends: &mut Vec<usize>, word_offset: usize,
    ) {
        let mut sink = TokenSink {
            pieces: Some(output_pieces),
            ids:    Some(output_ids),
            starts: Some(output_starts),
            ends:   Some(output_ends),
        };
        self.tokenize_into(text.as_ref(), word_offset, &mut sink);
    }

    /// Assembles words from the given token ids.
    ///
    /// Consecutive suffix tokens are concatenated onto their preceding token;
    /// a suffix token at the start keeps its indicator. Requires a model
    /// built with detokenization support.
    #[inline(never)]
    pub fn detokenize_to_tokens(
        &self, ids: impl AsRef<[TokenId]>,
    ) -> Result<Vec<TokenBytes>, DetokenizeError> {
        if !self.model.support_detokenization {
            return Err(DetokenizeError::Unsupported);
        }
        let ids = ids.as_ref();
        let mut tokens = Vec::new();
        let mut subwords = TokenBytes::new();
        for &id in ids {
            let bytes = self
                .model
                .vocab
                .get(id as usize)
                .ok_or(DetokenizeError::InvalidToken(id))?;
            let is_suffix = self.model.is_suffix[id as usize];
            if !subwords.is_empty() && !is_suffix {
                tokens.push(core::mem::take(&mut subwords));
            }
            if subwords.is_empty() && is_suffix {
                // A suffix token at the start of a word keeps its indicator.
                subwords.extend_from_slice(&self.model.suffix_indicator);
            }
            subwords.extend_from_slice(bytes);
        }
        if !subwords.is_empty() {
            tokens.push(subwords);
        }
        Ok(tokens)
    }

    /// Assembles the given token ids into text, words joined by single
    /// spaces.
    ///
    /// Requires a model built with detokenization support.
    #[inline(never)]
    pub fn detokenize(&self, ids: impl AsRef<[TokenId]>) -> Result<Vec<u8>, DetokenizeError> {
        let tokens = self.detokenize_to_tokens(ids)?;
        Ok(bstr::join(" ", &tokens))
    }

    #[inline(always)]
    fn tokenize_into(&self, text: &[u8], word_offset: usize, sink: &mut TokenSink) {
        if self.model.end_to_end {
            self.tokenize_text(text, sink);
        } else {
            self.tokenize_word(text, word_offset, sink);
        }
    }

    /// Tokenizes a single whitespace-free word.
    #[inline(never)]
    fn tokenize_word(&self, word: &[u8], word_offset: usize, sink: &mut TokenSink) {
        if word.is_empty() {
            return;
        }
        let mut original_len = sink.len();
        if word.len() > self.model.max_bytes_per_token as usize {
            self.reset_append_unknown(sink, word_offset, word.len(), &mut original_len);
            return;
        }
        let trie = Trie::new(&self.model.trie);
        let mut cursor = trie.root();
        let mut cur_offset = 0;
        let mut hops = self.failure_budget(word.len());
        for &byte in word {
            while !trie.try_step(&mut cursor, byte) {
                if !self.follow_failure(
                    &trie,
                    &mut cursor,
                    word,
                    word_offset,
                    &mut cur_offset,
                    &mut hops,
                    sink,
                ) {
                    // The next byte has no trie edge and the current node has
                    // nothing left to pop: the word cannot be segmented.
                    self.reset_append_unknown(sink, word_offset, word.len(), &mut original_len);
                    return;
                }
            }
        }
        self.handle_trailing(
            &trie,
            &mut cursor,
            word,
            word_offset,
            &mut original_len,
            &mut cur_offset,
            &mut hops,
            sink,
        );
    }

    /// Tokenizes arbitrary text, detecting word boundaries internally.
    #[inline(never)]
    fn tokenize_text(&self, text: &[u8], sink: &mut TokenSink) {
        if text.is_empty() {
            return;
        }
        let input_size = text.len();
        let max_bytes = self.model.max_bytes_per_token as usize;
        let trie = Trie::new(&self.model.trie);
        let mut original_len = sink.len();
        let mut cur_pos = 0;
        let mut prev_char: Option<char> = None;
        let mut cur_char: Option<char> = None;
        while cur_pos < input_size {
            let word_start = cur_pos;
            let mut cursor = trie.root();
            let mut cur_offset = 0;
            let mut word_bytes = 0;
            let mut next_pos = cur_pos;
            let mut hops = self.failure_budget(input_size - word_start);
            'word: while cur_pos < input_size {
                prev_char = cur_char;
                let (scalar, width) = unicode::next_scalar(&text[cur_pos..]);
                cur_char = scalar;
                next_pos = cur_pos + width;
                if word_bytes + width > max_bytes {
                    break;
                }
                while !trie.try_step_bytes(&mut cursor, &text[cur_pos..next_pos]) {
                    if !self.follow_failure(
                        &trie,
                        &mut cursor,
                        &text[word_start..],
                        word_start,
                        &mut cur_offset,
                        &mut hops,
                        sink,
                    ) {
                        break 'word;
                    }
                }
                word_bytes += width;
                cur_pos = next_pos;
            }
            if cur_pos >= input_size {
                self.handle_trailing(
                    &trie,
                    &mut cursor,
                    &text[word_start..cur_pos],
                    word_start,
                    &mut original_len,
                    &mut cur_offset,
                    &mut hops,
                    sink,
                );
                break;
            }
            let is_whitespace = cur_char.is_some_and(unicode::is_whitespace);
            if is_whitespace
                || cur_char.is_some_and(unicode::is_punct_or_cjk)
                || (cur_pos != 0 && prev_char.is_some_and(unicode::is_punct_or_cjk))
            {
                // A word boundary: flush the tokens still sitting on the trie
                // path. Punctuation is not skipped, it becomes its own word.
                self.handle_trailing(
                    &trie,
                    &mut cursor,
                    &text[word_start..cur_pos],
                    word_start,
                    &mut original_len,
                    &mut cur_offset,
                    &mut hops,
                    sink,
                );
                if is_whitespace {
                    cur_pos = next_pos;
                }
                continue;
            }
            // Unknown characters or the size limit: the whole word maps to
            // the unknown token and matching restarts past it.
            cur_pos = next_pos;
            let end_of_word = self.skip_word_and_trailing_whitespace(text, &mut cur_pos);
            self.reset_append_unknown(sink, word_start, end_of_word - word_start, &mut original_len);
        }
    }

    /// Skips the rest of the current word and any trailing whitespace,
    /// returning the exclusive end of the word.
    #[inline(never)]
    fn skip_word_and_trailing_whitespace(&self, text: &[u8], cur_pos: &mut usize) -> usize {
        let mut end_of_word = *cur_pos;
        while *cur_pos < text.len() {
            let (scalar, width) = unicode::next_scalar(&text[*cur_pos..]);
            let next_pos = *cur_pos + width;
            if scalar.is_some_and(unicode::is_whitespace) {
                *cur_pos = next_pos;
                break;
            }
            if scalar.is_some_and(unicode::is_punct_or_cjk) {
                // Punctuation may be a token by itself; leave it unconsumed.
                break;
            }
            end_of_word = next_pos;
            *cur_pos = next_pos;
        }
        end_of_word
    }

    /// Pops the longest-matching prefix tokens off the current trie path and
    /// transits through the failure link.
    ///
    /// Returns `false` when the node has no failure link, meaning the path
    /// cannot be segmented any further.
    #[inline(always)]
    #[allow(clippy::too_many_arguments)]
    fn follow_failure(
        &self, trie: &Trie, cursor: &mut TrieCursor, word: &[u8], word_offset: usize,
        cur_offset: &mut usize, hops: &mut usize, sink: &mut TokenSink,
    ) -> bool {
        // A valid failure table cannot chain longer than the budget; a
        // corrupt one must not be able to cycle forever.
        if *hops == 0 {
            return false;
        }
        *hops -= 1;
        if let Some(token) = trie.data(cursor) {
            // The token ending at this node is its sole failure pop.
            self.append_token(token, word, word_offset, cur_offset, sink);
            trie.set(cursor, self.model.failure[cursor.node() as usize].link);
            return true;
        }
        let failure = self.model.failure[cursor.node() as usize];
        if failure.link == NULL_NODE {
            return false;
        }
        let pops = &self.model.failure_pops_pool
            [failure.pops.offset()..failure.pops.offset() + failure.pops.len()];
        for &token in pops {
            self.append_token(token, word, word_offset, cur_offset, sink);
        }
        trie.set(cursor, failure.link);
        true
    }

    /// Collects the tokens still sitting on the trie path once all bytes of
    /// the word are consumed, or determines that the word cannot be
    /// segmented.
    #[inline(always)]
    #[allow(clippy::too_many_arguments)]
    fn handle_trailing(
        &self, trie: &Trie, cursor: &mut TrieCursor, word: &[u8], word_offset: usize,
        original_len: &mut usize, cur_offset: &mut usize, hops: &mut usize, sink: &mut TokenSink,
    ) {
        if cursor.node() == Trie::ROOT {
            // Empty word.
            return;
        }
        if self.try_handle_suffix_indicator_word(
            cursor,
            word,
            word_offset,
            original_len,
            cur_offset,
            sink,
        ) {
            *original_len = sink.len();
            return;
        }
        // The word is segmented iff following the failure links lands on the
        // node of the empty suffix.
        while cursor.node() != self.model.suffix_root
            && cursor.node() != self.model.punct_failure_node
        {
            if !self.follow_failure(trie, cursor, word, word_offset, cur_offset, hops, sink) {
                self.reset_append_unknown(sink, word_offset, word.len(), original_len);
                return;
            }
        }
        *original_len = sink.len();
    }

    /// Emits the precomputed result when the word is exactly the suffix
    /// indicator.
    ///
    /// That word traverses the indicator path without producing tokens, so it
    /// is the only way to end on the suffix root with nothing emitted.
    #[inline(always)]
    fn try_handle_suffix_indicator_word(
        &self, cursor: &TrieCursor, word: &[u8], word_offset: usize, original_len: &mut usize,
        cur_offset: &mut usize, sink: &mut TokenSink,
    ) -> bool {
        if cursor.node() != self.model.suffix_root || sink.len() != *original_len {
            return false;
        }
        let result = &self.model.suffix_indicator_result;
        if result.len() == 1 && result[0].id() == self.model.unk_token_id {
            self.reset_append_unknown(sink, word_offset, word.len(), original_len);
            return true;
        }
        for &token in result {
            self.append_token(token, word, word_offset, cur_offset, sink);
        }
        true
    }

    /// Appends one recognized token to the requested outputs.
    #[inline(always)]
    fn append_token(
        &self, token: EncodedToken, word: &[u8], word_offset: usize, cur_offset: &mut usize,
        sink: &mut TokenSink,
    ) {
        if let Some(ids) = &mut sink.ids {
            ids.push(token.id());
        }
        if !sink.wants_surface() {
            return;
        }
        let mut length = token.length();
        if *cur_offset == 0 && token.is_suffix() {
            // The word itself starts with the suffix indicator; the piece
            // covers those bytes as well.
            length += self.model.suffix_indicator.len();
        }
        if let Some(pieces) = &mut sink.pieces {
            let mut piece = TokenBytes::with_capacity(self.model.suffix_indicator.len() + length);
            if *cur_offset != 0 {
                piece.extend_from_slice(&self.model.suffix_indicator);
            }
            if token.id() == self.model.unk_token_id {
                piece.extend_from_slice(&self.model.unk_token);
            } else {
                piece.extend_from_slice(&word[*cur_offset..*cur_offset + length]);
            }
            pieces.push(piece);
        }
        if let Some(starts) = &mut sink.starts {
            starts.push(word_offset + *cur_offset);
        }
        if let Some(ends) = &mut sink.ends {
            ends.push(word_offset + *cur_offset + length);
        }
        *cur_offset += length;
    }

    /// Drops the tentative tokens of the current word and appends a single
    /// unknown token spanning the whole word.
    #[inline(never)]
    fn reset_append_unknown(
        &self, sink: &mut TokenSink, word_offset: usize, input_size: usize,
        original_len: &mut usize,
    ) {
        sink.truncate(*original_len);
        if let Some(pieces) = &mut sink.pieces {
            pieces.push(self.model.unk_token.clone());
        }
        if let Some(ids) = &mut sink.ids {
            ids.push(self.model.unk_token_id);
        }
        if let Some(starts) = &mut sink.starts {
            starts.push(word_offset);
        }
        if let Some(ends) = &mut sink.ends {
            ends.push(word_offset + input_size);
        }
        *original_len += 1;
    }

    #[inline(always)]
    fn failure_budget(&self, input_size: usize) -> usize {
        2 * input_size + self.model.trie.len() + 2
    }
}

impl TryFrom<Model> for Fastpiece {
    type Error = InitializationError;

    #[inline(always)]
    fn try_from(value: Model) -> Result<Self, Self::Error> {
        Fastpiece::new(value)
    }
}

impl From<Fastpiece> for Model {
    #[inline(always)]
    fn from(value: Fastpiece) -> Self {
        value.into_model()
    }
}
