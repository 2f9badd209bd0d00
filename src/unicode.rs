//! UTF-8 scanning and word boundary classification.

use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

/// Decodes the next scalar from `bytes`.
///
/// Returns `None` together with the number of bytes to skip when the input is
/// not valid UTF-8. Always advances by at least one byte on non-empty input,
/// so scanning cannot stall on malformed data.
#[inline(always)]
pub(crate) fn next_scalar(bytes: &[u8]) -> (Option<char>, usize) {
    let (ch, size) = bstr::decode_utf8(bytes);
    (ch, size.max(1))
}

/// Whether the scalar has the `White_Space` property.
#[inline(always)]
pub(crate) fn is_whitespace(ch: char) -> bool {
    ch.is_whitespace()
}

/// Whether the scalar ends a word by itself: ASCII punctuation, the Unicode
/// punctuation and symbol categories, or a CJK ideograph.
#[inline(always)]
pub(crate) fn is_punct_or_cjk(ch: char) -> bool {
    if ch.is_ascii() {
        return matches!(ch, '!'..='/' | ':'..='@' | '['..='`' | '{'..='~');
    }
    if is_cjk(ch) {
        return true;
    }
    matches!(
        ch.general_category_group(),
        GeneralCategoryGroup::Punctuation | GeneralCategoryGroup::Symbol
    )
}

/// Whether the scalar is a CJK ideograph: the unified block and its
/// extensions, plus the compatibility blocks.
#[inline(always)]
fn is_cjk(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}
