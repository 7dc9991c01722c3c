#![forbid(unsafe_code)]

//! The token identity space.
//!
//! Ids are `i32`. The lowest value is the sentence boundary, followed by two
//! fixed blocks (punctuation, then symbols). Everything above
//! [`UNDEFINED_DICTIONARY_ID`] belongs to learned dictionary entries.
//!
//! The fixed tables are append-only: an assignment that has shipped must
//! never change, since stored transition tables refer to it.

/// Identity of a token in a context.
pub type TokenId = i32;

/// Start/end of utterance marker. Never assigned to a real token.
pub const BOUNDARY_ID: TokenId = i32::MIN;

/// First id of the punctuation block.
pub const PUNCTUATION_BASE: TokenId = BOUNDARY_ID + 1;
/// Number of slots reserved for punctuation.
pub const PUNCTUATION_SLOTS: i32 = 32;

/// First id of the symbol block.
pub const SYMBOLS_BASE: TokenId = BOUNDARY_ID + 34;
/// Number of slots reserved for symbols.
pub const SYMBOLS_SLOTS: i32 = 1024;

/// Highest id that is never handed to a learned entry.
pub const UNDEFINED_DICTIONARY_ID: TokenId = BOUNDARY_ID + 4096;
/// First id a fresh dictionary assigns.
pub const FIRST_LEARNED_ID: TokenId = UNDEFINED_DICTIONARY_ID + 1;

const PUNCTUATION: [(i32, &str); 12] = [
    (0, "."),
    (1, ","),
    (2, "…"),
    (3, "?"),
    (4, "!"),
    (5, ";"),
    (6, ":"),
    (7, "⁈"),
    (8, "‼"),
    (9, "⁇"),
    (10, "—"),
    (11, "&"),
];

const SYMBOLS: [(i32, &str); 39] = [
    // emoticons
    (0, ":)"),
    (1, ":("),
    (2, ":|"),
    (3, ":D"),
    (4, "D:"),
    (5, ">:D"),
    (6, "D:<"),
    (7, ">:("),
    (8, ":O"),
    (9, ";_;"),
    (10, "T_T"),
    (11, "n.n"),
    (12, "\\o/"),
    (13, "\\o\\"),
    (14, "vOv"),
    (15, ":3"),
    (16, ">:3"),
    (17, "<3"),
    (18, "</3"),
    (19, "C:"),
    (20, "C:<"),
    (21, ":C"),
    (22, ">:C"),
    (23, ":3c"),
    (24, ">:3c"),
    // kaomoji
    (127, "¯\\_(ツ)_/¯"),
    // emoji
    (255, "😶"),
    (256, "😑"),
    (257, "🙂"),
    (258, "😃"),
    (259, "🙁"),
    (260, "😦"),
    (261, "🙃"),
    (262, "🤔"),
    (263, "😂"),
    (264, "😭"),
    (265, "😢"),
    (266, "😮"),
    (267, "🔥"),
];

/// Alternative spellings mapped onto the canonical symbol they stand for.
const SYMBOL_ALIASES: [(&str, &str); 19] = [
    (":-)", ":)"),
    (":-(", ":("),
    (":-|", ":|"),
    (":-D", ":D"),
    (":-O", ":O"),
    (":-3", ":3"),
    ("(:", ":)"),
    ("):", ":("),
    ("|:", ":|"),
    ("):<", ">:("),
    (":o", ":O"),
    (";.;", ";_;"),
    ("T.T", "T_T"),
    ("n_n", "n.n"),
    ("/o/", "\\o\\"),
    ("c:", "C:"),
    ("c:<", "C:<"),
    (":c", ":C"),
    (">:c", ">:C"),
];

/// Id of a punctuation mark, if `repr` is one.
pub fn punctuation_id(repr: &str) -> Option<TokenId> {
    PUNCTUATION
        .iter()
        .find(|(_, p)| *p == repr)
        .map(|(offset, _)| PUNCTUATION_BASE + offset)
}

/// Text of a punctuation id.
pub fn punctuation_repr(id: TokenId) -> Option<&'static str> {
    PUNCTUATION
        .iter()
        .find(|(offset, _)| PUNCTUATION_BASE + offset == id)
        .map(|(_, p)| *p)
}

/// Id of a canonical symbol.
pub fn symbol_id(repr: &str) -> Option<TokenId> {
    SYMBOLS
        .iter()
        .find(|(_, s)| *s == repr)
        .map(|(offset, _)| SYMBOLS_BASE + offset)
}

/// Text of a symbol id.
pub fn symbol_repr(id: TokenId) -> Option<&'static str> {
    SYMBOLS
        .iter()
        .find(|(offset, _)| SYMBOLS_BASE + offset == id)
        .map(|(_, s)| *s)
}

/// Canonical spelling of a symbol, following aliases.
pub fn canonical_symbol(raw: &str) -> Option<&'static str> {
    if let Some((_, s)) = SYMBOLS.iter().find(|(_, s)| *s == raw) {
        return Some(*s);
    }
    SYMBOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, canonical)| *canonical)
}

/// True for chars that may appear inside a symbol (used by the lexer).
pub fn is_symbol_char(c: char) -> bool {
    SYMBOLS
        .iter()
        .map(|(_, s)| *s)
        .chain(SYMBOL_ALIASES.iter().map(|(alias, _)| *alias))
        .any(|s| s.contains(c))
}

/// True if `id` names a punctuation mark.
pub fn is_punctuation(id: TokenId) -> bool {
    punctuation_repr(id).is_some()
}

/// True if `id` names a symbol.
pub fn is_symbol(id: TokenId) -> bool {
    symbol_repr(id).is_some()
}

/// Id of a punctuation mark or symbol; these never enter the dictionary.
pub fn fixed_id(repr: &str) -> Option<TokenId> {
    punctuation_id(repr).or_else(|| symbol_id(repr))
}

/// True for ids that can never belong to a learned entry.
pub fn is_reserved(id: TokenId) -> bool {
    id <= UNDEFINED_DICTIONARY_ID
}

/// Every punctuation mark, in id order.
pub fn punctuation_marks() -> impl Iterator<Item = &'static str> {
    PUNCTUATION.iter().map(|(_, p)| *p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_tables_stay_inside_their_blocks() {
        for (offset, _) in PUNCTUATION.iter() {
            assert!(*offset < PUNCTUATION_SLOTS);
        }
        for (offset, _) in SYMBOLS.iter() {
            assert!(*offset < SYMBOLS_SLOTS);
        }
        assert!(PUNCTUATION_BASE + PUNCTUATION_SLOTS <= SYMBOLS_BASE);
        assert!(SYMBOLS_BASE + SYMBOLS_SLOTS < UNDEFINED_DICTIONARY_ID);
    }

    #[test]
    fn shipped_assignments_are_stable() {
        assert_eq!(punctuation_id("."), Some(-2147483647));
        assert_eq!(punctuation_id("&"), Some(-2147483647 + 11));
        assert_eq!(symbol_id(":)"), Some(-2147483614));
        assert_eq!(symbol_id("🔥"), Some(-2147483614 + 267));
        assert_eq!(FIRST_LEARNED_ID, i32::MIN + 4097);
    }

    #[test]
    fn aliases_resolve_to_known_symbols() {
        for (alias, canonical) in SYMBOL_ALIASES.iter() {
            assert_eq!(canonical_symbol(alias), Some(*canonical));
            assert!(symbol_id(canonical).is_some(), "{} has no id", canonical);
        }
        assert_eq!(canonical_symbol("nope"), None);
    }

    #[test]
    fn classification() {
        let dot = punctuation_id(".").unwrap_or_default();
        let heart = symbol_id("<3").unwrap_or_default();
        assert!(is_punctuation(dot) && !is_symbol(dot));
        assert!(is_symbol(heart) && !is_punctuation(heart));
        assert!(!is_punctuation(BOUNDARY_ID));
        assert!(is_reserved(BOUNDARY_ID));
        assert!(!is_reserved(FIRST_LEARNED_ID));
        assert!(is_symbol_char('ツ'));
        assert!(!is_symbol_char('z'));
    }
}
