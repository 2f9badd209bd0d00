mod util;

use fastpiece::{Fastpiece, ModelBuilder};

use util::*;

#[test]
fn test_text_subwords() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "abcz");
    assert_eq!(pieces, ["a", "##bc", "##z"]);
    assert_eq!(ids, [0, 3, 4]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 3), (3, 4)]);
}

#[test]
fn test_text_full_word() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "abcd");
    assert_eq!(pieces, ["abcd"]);
    assert_eq!(ids, [1]);
    assert_eq!(spans(&starts, &ends), [(0, 4)]);
}

#[test]
fn test_text_unknown_second_word() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "ab cd");
    assert_eq!(pieces, ["a", "##b", "[UNK]"]);
    assert_eq!(ids, [0, 2, UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 2), (3, 5)]);
}

#[test]
fn test_text_punctuation() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "a!b");
    assert_eq!(pieces, ["a", "[UNK]", "[UNK]"]);
    assert_eq!(ids, [0, UNK, UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 2), (2, 3)]);
}

#[test]
fn test_text_suffix_indicator_word() {
    init_env();
    let tokenizer = test_tokenizer(true);
    // The test vocabulary cannot segment "##", so the whole word maps to the
    // unknown token.
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "##");
    assert_eq!(pieces, ["[UNK]"]);
    assert_eq!(ids, [UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 2)]);
}

#[test]
fn test_text_suffix_indicator_word_in_vocab() {
    init_env();
    let model = ModelBuilder::new(["##", "[UNK]"], "##", "[UNK]")
        .end_to_end(true)
        .build()
        .unwrap();
    let tokenizer = Fastpiece::new(model).unwrap();
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "##");
    assert_eq!(pieces, ["##"]);
    assert_eq!(ids, [0]);
    assert_eq!(spans(&starts, &ends), [(0, 2)]);
}

#[test]
fn test_text_whitespace_handling() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "  abcd\t\nab \u{00A0}a ");
    assert_eq!(pieces, ["abcd", "a", "##b", "a"]);
    assert_eq!(ids, [1, 0, 2, 0]);
    assert_eq!(spans(&starts, &ends), [(2, 6), (8, 9), (9, 10), (13, 14)]);
}

#[test]
fn test_text_cjk_chars_are_words() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "你好");
    assert_eq!(pieces, ["[UNK]", "[UNK]"]);
    assert_eq!(ids, [UNK, UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 3), (3, 6)]);
}

#[test]
fn test_text_cjk_flushes_word() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "ab你abcd");
    assert_eq!(pieces, ["a", "##b", "[UNK]", "abcd"]);
    assert_eq!(ids, [0, 2, UNK, 1]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 2), (2, 5), (5, 9)]);
}

#[test]
fn test_text_malformed_utf8() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let mut pieces = Vec::new();
    let mut ids = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    tokenizer.tokenize_with_pieces(
        b"ab\xffcd".as_slice(),
        &mut pieces,
        &mut ids,
        &mut starts,
        &mut ends,
        0,
    );
    // The malformed byte is no boundary; the word around it maps to unknown.
    assert_eq!(pieces, [b"[UNK]".to_vec()]);
    assert_eq!(ids, [UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 5)]);

    let mut ids = Vec::new();
    tokenizer.tokenize(b"\xff\xfe".as_slice(), &mut ids, 0);
    assert_eq!(ids, [UNK]);
}

#[test]
fn test_text_empty() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let mut ids = Vec::new();
    tokenizer.tokenize("", &mut ids, 0);
    assert!(ids.is_empty());
    tokenizer.tokenize("   \n\t ", &mut ids, 0);
    assert!(ids.is_empty());
}

#[test]
fn test_text_ids_only_matches_full_output() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let text = "abcz abcd ab cd a!b ## 你好 \u{3000}abcde";
    let (_, full_ids, starts, ends) = tokenize_full(&tokenizer, text);

    let mut ids = Vec::new();
    tokenizer.tokenize(text, &mut ids, 0);
    assert_eq!(ids, full_ids);

    let mut ids = Vec::new();
    let mut other_starts = Vec::new();
    let mut other_ends = Vec::new();
    tokenizer.tokenize_with_offsets(text, &mut ids, &mut other_starts, &mut other_ends, 0);
    assert_eq!(ids, full_ids);
    assert_eq!(other_starts, starts);
    assert_eq!(other_ends, ends);
}

#[test]
fn test_text_outputs_are_appended() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let mut ids = Vec::from([42]);
    tokenizer.tokenize("abcd", &mut ids, 0);
    assert_eq!(ids, [42, 1]);
}

#[test]
fn test_single_word_subwords() {
    init_env();
    let tokenizer = test_tokenizer(false);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "abcz");
    assert_eq!(pieces, ["a", "##bc", "##z"]);
    assert_eq!(ids, [0, 3, 4]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 3), (3, 4)]);

    let (pieces, ids, _, _) = tokenize_full(&tokenizer, "ab");
    assert_eq!(pieces, ["a", "##b"]);
    assert_eq!(ids, [0, 2]);
}

#[test]
fn test_single_word_offset() {
    init_env();
    let tokenizer = test_tokenizer(false);
    let mut ids = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    tokenizer.tokenize_with_offsets("abcz", &mut ids, &mut starts, &mut ends, 10);
    assert_eq!(ids, [0, 3, 4]);
    assert_eq!(spans(&starts, &ends), [(10, 11), (11, 13), (13, 14)]);
}

#[test]
fn test_single_word_unknown() {
    init_env();
    let tokenizer = test_tokenizer(false);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "qqq");
    assert_eq!(pieces, ["[UNK]"]);
    assert_eq!(ids, [UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 3)]);

    // A longest-match prefix exists but the rest cannot be segmented.
    let (pieces, ids, _, _) = tokenize_full(&tokenizer, "abcde");
    assert_eq!(pieces, ["[UNK]"]);
    assert_eq!(ids, [UNK]);
}

#[test]
fn test_single_word_size_limit() {
    init_env();
    let tokenizer = test_tokenizer(false);
    let word = "a".repeat(101);
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, &word);
    assert_eq!(pieces, ["[UNK]"]);
    assert_eq!(ids, [UNK]);
    assert_eq!(spans(&starts, &ends), [(0, 101)]);
}

#[test]
fn test_text_size_limit() {
    init_env();
    let model = ModelBuilder::new(["a", "ab", "##b", "[UNK]"], "##", "[UNK]")
        .max_bytes_per_token(2)
        .end_to_end(true)
        .build()
        .unwrap();
    let tokenizer = Fastpiece::new(model).unwrap();
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "abb ab");
    assert_eq!(pieces, ["[UNK]", "ab"]);
    assert_eq!(ids, [3, 1]);
    assert_eq!(spans(&starts, &ends), [(0, 3), (4, 6)]);
}

#[test]
fn test_unknown_atomicity() {
    init_env();
    let tokenizer = test_tokenizer(true);
    // Every word that fails contributes exactly one unknown token spanning
    // the whole word, never partial output.
    for text in ["abq", "qabcd", "abcdq", "cd", "aq"] {
        let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, text);
        assert_eq!(pieces, ["[UNK]"], "{text:?}");
        assert_eq!(ids, [UNK], "{text:?}");
        assert_eq!(spans(&starts, &ends), [(0, text.len())], "{text:?}");
    }
}

#[test]
fn test_output_consistency() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let text = "abcz abcd!ab cd ## 你好, abq a!b\u{2014}abcd  \u{3000}z";
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, text);
    assert_eq!(pieces.len(), ids.len());
    assert_eq!(pieces.len(), starts.len());
    assert_eq!(pieces.len(), ends.len());
    let max = tokenizer.model().max_bytes_per_token as usize
        + tokenizer.model().suffix_indicator.len();
    for i in 0..ids.len() {
        assert!(starts[i] <= ends[i]);
        assert!(ends[i] <= text.len());
        assert!(ends[i] - starts[i] <= max);
        if i > 0 {
            assert!(starts[i - 1] <= starts[i]);
        }
    }
}

#[test]
fn test_determinism() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let text = "abcz abcd ab cd a!b ## 你好 abq";
    let first = tokenize_full(&tokenizer, text);
    for _ in 0..8 {
        assert_eq!(tokenize_full(&tokenizer, text), first);
    }
}

#[test]
fn test_parallel_consistency() {
    init_env();
    let tokenizer = test_tokenizer(true);
    let text = "abcz abcd ab cd a!b ## 你好 abq";
    let mut serial = Vec::new();
    tokenizer.tokenize(text, &mut serial, 0);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..16 {
                    let mut ids = Vec::new();
                    tokenizer.tokenize(text, &mut ids, 0);
                    assert_eq!(ids, serial);
                }
            });
        }
    });
}

#[test]
fn test_empty_suffix_indicator() {
    init_env();
    let model = ModelBuilder::new(["a", "b", "ab", "[UNK]"], "", "[UNK]")
        .build()
        .unwrap();
    let tokenizer = Fastpiece::new(model).unwrap();
    let (pieces, ids, _, _) = tokenize_full(&tokenizer, "ab");
    assert_eq!(pieces, ["ab"]);
    assert_eq!(ids, [2]);
    let (pieces, ids, _, _) = tokenize_full(&tokenizer, "ba");
    assert_eq!(pieces, ["b", "a"]);
    assert_eq!(ids, [1, 0]);
}

#[test]
fn test_punctuation_in_vocab() {
    init_env();
    let model = ModelBuilder::new(["a", "!", "[UNK]"], "##", "[UNK]")
        .end_to_end(true)
        .build()
        .unwrap();
    let tokenizer = Fastpiece::new(model).unwrap();
    let (pieces, ids, starts, ends) = tokenize_full(&tokenizer, "a!a");
    assert_eq!(pieces, ["a", "!", "a"]);
    assert_eq!(ids, [0, 1, 0]);
    assert_eq!(spans(&starts, &ends), [(0, 1), (1, 2), (2, 3)]);
}
