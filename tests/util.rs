#![allow(dead_code)]

use std::sync::{Once, OnceLock};

use fastpiece::{Fastpiece, Model, ModelBuilder, TokenId};

static INIT_ENV: Once = Once::new();

pub fn init_env() {
    INIT_ENV.call_once(|| {
        simple_logger::SimpleLogger::new()
            .with_level(log::Level::Debug.to_level_filter())
            .env()
            .init()
            .unwrap();
    });
}

/// Vocabulary shared by most scenarios.
pub fn test_vocab() -> Vec<&'static str> {
    Vec::from(["a", "abcd", "##b", "##bc", "##z", "[UNK]"])
}

/// Id of `[UNK]` in [`test_vocab`].
pub const UNK: TokenId = 5;

pub fn test_model(end_to_end: bool) -> Model {
    static END_TO_END: OnceLock<Model> = OnceLock::new();
    static SINGLE_WORD: OnceLock<Model> = OnceLock::new();
    let cell = if end_to_end { &END_TO_END } else { &SINGLE_WORD };
    cell.get_or_init(|| {
        ModelBuilder::new(test_vocab(), "##", "[UNK]")
            .max_bytes_per_token(100)
            .end_to_end(end_to_end)
            .support_detokenization(true)
            .build()
            .unwrap()
    })
    .clone()
}

pub fn test_tokenizer(end_to_end: bool) -> Fastpiece {
    Fastpiece::new(test_model(end_to_end)).unwrap()
}

/// Runs the full-output variant and returns pieces as strings.
pub fn tokenize_full(
    tokenizer: &Fastpiece, text: &str,
) -> (Vec<String>, Vec<TokenId>, Vec<usize>, Vec<usize>) {
    let mut pieces = Vec::new();
    let mut ids = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    tokenizer.tokenize_with_pieces(text, &mut pieces, &mut ids, &mut starts, &mut ends, 0);
    let pieces = pieces
        .into_iter()
        .map(|piece| String::from_utf8(piece).unwrap())
        .collect();
    (pieces, ids, starts, ends)
}

/// Byte `(start, end)` pairs for readable assertions.
pub fn spans(starts: &[usize], ends: &[usize]) -> Vec<(usize, usize)> {
    starts.iter().copied().zip(ends.iter().copied()).collect()
}
