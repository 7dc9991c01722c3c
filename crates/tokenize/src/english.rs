#![forbid(unsafe_code)]

//! English front-end.
//!
//! Lexing is whitespace-delimited. A token is first tried as a symbol, then
//! leading/trailing punctuation is cut off and compressed, and whatever is
//! left must look like an English word.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::dictionary::{DictionaryEntry, ParsedToken};
use crate::ids::{self, TokenId};
use crate::language::Language;

const APOSTROPHE: char = '\'';
const HYPHEN: char = '-';
const VOWEL_RUN_LIMIT: usize = 3;
const CONSONANT_RUN_LIMIT: usize = 6;

/// Contraction spellings mapped to their proper form so both land on one id.
const CORRECTIONS: &[(&str, &str)] = &[
    ("aint", "ain't"),
    ("arent", "aren't"),
    ("cant", "can't"),
    ("couldnt", "couldn't"),
    ("couldve", "could've"),
    ("didnt", "didn't"),
    ("doesnt", "doesn't"),
    ("dont", "don't"),
    ("hadnt", "hadn't"),
    ("havent", "haven't"),
    ("hed", "he'd"),
    ("hes", "he's"),
    ("im", "i'm"),
    ("ima", "i'mma"),
    ("i'ma", "i'mma"),
    ("imma", "i'mma"),
    ("isnt", "isn't"),
    ("ive", "i've"),
    ("mightve", "might've"),
    ("mustnt", "mustn't"),
    ("mustve", "must've"),
    ("shes", "she's"),
    ("shouldnt", "shouldn't"),
    ("shouldve", "should've"),
    ("hte", "the"),
    ("teh", "the"),
    ("their's", "theirs"),
    ("theres", "there's"),
    ("theyre", "they're"),
    ("theyd", "they'd"),
    ("theyll", "they'll"),
    ("theyve", "they've"),
    ("wasnt", "wasn't"),
    ("wernt", "weren't"),
    ("werent", "weren't"),
    ("weve", "we've"),
    ("wheres", "where's"),
    ("whos", "who's"),
    ("wont", "won't"),
    ("wouldnt", "wouldn't"),
    ("yall", "y'all"),
    ("youll", "you'll"),
];

/// Common misspelled fragments; the first match is replaced once. Wrong
/// spellings that are also fragments of real words (`que`, `artic`) are left
/// out.
const FRAGMENT_FIXES: &[(&str, &[&str])] = &[
    ("acceptabl", &["acceptibl"]),
    ("accidental", &["accidentl"]),
    ("accommodat", &["accomodat", "acommodat"]),
    ("achiev", &["acheiv"]),
    ("acknowledg", &["acknowleg", "aknowledg"]),
    ("aggress", &["agress"]),
    ("almost", &["allmost"]),
    ("annual", &["anual"]),
    ("apparent", &["apparant", "aparent", "apparrent", "aparrent"]),
    ("argument", &["arguement"]),
    ("atheist", &["athiest", "athist"]),
    ("barbecue", &["bbq", "barbeque", "barbequeue"]),
    ("beautiful", &["beatiful"]),
    ("beginning", &["begining"]),
    ("belie", &["belei"]),
    ("business", &["buisness"]),
    ("calendar", &["calender"]),
    ("categor", &["catagor"]),
    ("cemetery", &["cemetary", "cematery"]),
    ("congratulat", &["congradulat"]),
    ("conscious", &["concious", "consious"]),
    ("controvers", &["contravers"]),
    ("decei", &["decie"]),
    ("definit", &["definat"]),
    ("desper", &["despar"]),
    ("differ", &["diffr"]),
    ("embarrass", &["embarass"]),
    ("existen", &["existan"]),
    ("experien", &["experian"]),
    ("foreign", &["foriegn"]),
    ("friend", &["freind"]),
    ("fulfil", &["fullfil", "fulfill"]),
    ("gauge", &["guage"]),
    ("harass", &["harrass"]),
    ("heroes", &["heros"]),
    ("hygien", &["hygen", "hygein"]),
    ("hypocri", &["hipocrit", "hippocrit"]),
    ("ignoran", &["ignoren"]),
    ("independent", &["independant"]),
    ("indispensabl", &["indispensibl"]),
    ("inoculat", &["innoculat"]),
    ("jewelry", &["jewelery"]),
    ("judgment", &["judgement"]),
    ("kernel", &["kernal"]),
    ("necessar", &["neccessar"]),
    ("niece", &["neice"]),
    ("notice", &["notica"]),
    ("occasion", &["occassion"]),
    ("occurre", &["occurra", "occure"]),
    ("omission", &["ommision", "omision"]),
    ("pastime", &["passtime", "pasttime"]),
    ("personnel", &["personell", "personel"]),
    ("possess", &["posess"]),
    ("potatoes", &["potatos"]),
    ("privilege", &["privelege", "priviledge"]),
    ("publicly", &["publically"]),
    ("quarantine", &["quarentine"]),
    ("receive", &["recieve"]),
    ("receipt", &["reciept"]),
    ("recommend", &["recomend", "reccommend"]),
    ("relevan", &["releven"]),
    ("restaurant", &["restarant", "restaraunt"]),
    ("rhythm", &["rythm", "rythem"]),
    ("separate", &["seperate"]),
    ("speech", &["speach"]),
    ("surpris", &["supris"]),
    ("tomatoes", &["tomatos"]),
    ("tomorrow", &["tommorow", "tommorrow"]),
    ("vacuum", &["vaccuum", "vaccum", "vacume"]),
    ("weird", &["wierd"]),
    ("zeroes", &["zeros"]),
];

/// Full-width marks folded onto their ASCII counterparts.
const EQUIVALENTS: &[(char, char)] = &[('。', '.'), ('、', ','), ('？', '?'), ('！', '!')];

fn compressors() -> &'static [(&'static str, Regex)] {
    static COMPRESSORS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPRESSORS.get_or_init(|| {
        [
            ("…", r"^\.\.+$"),
            ("‼", r"^!!+$"),
            ("⁇", r"^\?\?+$"),
            ("—", r"^--$"),
            ("⁈", r"^[?!]{2,}$"),
        ]
        .iter()
        .filter_map(|(mark, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*mark, re)),
            Err(e) => {
                log::error!("bad punctuation pattern {}: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == APOSTROPHE || c == HYPHEN || is_combining_mark(c) || is_accented_letter(c)
}

/// A Latin letter plus diacritics, like `é` or `ï`.
fn is_accented_letter(c: char) -> bool {
    let mut parts = std::iter::once(c).nfd().filter(|p| !is_combining_mark(*p));
    matches!((parts.next(), parts.next()), (Some(p), None) if p.is_ascii_alphabetic())
}

/// Dictionary key for a word: decomposed, stripped of combining marks,
/// lower-cased and recomposed, so `Café` and `cafe` share one entry.
fn normalise(word: &str) -> String {
    word.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .nfc()
        .collect()
}

fn is_punctuation_char(c: char) -> bool {
    c == HYPHEN
        || EQUIVALENTS.iter().any(|(from, _)| *from == c)
        || ids::punctuation_marks().any(|m| m.starts_with(c) && m.chars().count() == 1)
}

fn fold_equivalent(c: char) -> char {
    EQUIVALENTS
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// Turn a run of punctuation chars into one token, or `None` if the run is
/// not something we accept.
fn digest_punctuation(run: &str) -> Option<ParsedToken> {
    let mut chars = run.chars();
    if let (Some(only), None) = (chars.next(), chars.next()) {
        if only == HYPHEN {
            return None;
        }
        return Some(ParsedToken::plain(run));
    }
    compressors()
        .iter()
        .find(|(_, re)| re.is_match(run))
        .map(|(mark, _)| ParsedToken::plain(mark))
}

/// Split leading and trailing punctuation off `token`.
///
/// Returns `(before, core, after)`, or `None` when either run is invalid.
fn dissect(token: &str) -> Option<(Option<ParsedToken>, String, Option<ParsedToken>)> {
    let chars: Vec<char> = token.chars().collect();
    let lead = chars.iter().take_while(|c| is_punctuation_char(**c)).count();
    let rest = chars.get(lead..).unwrap_or_default();
    let trail = rest.iter().rev().take_while(|c| is_punctuation_char(**c)).count();
    let core_len = rest.len() - trail;

    let before = match lead {
        0 => None,
        _ => {
            let run: String = chars.iter().take(lead).map(|c| fold_equivalent(*c)).collect();
            Some(digest_punctuation(&run)?)
        }
    };
    let after = match trail {
        0 => None,
        _ => {
            let run: String = rest.iter().skip(core_len).map(|c| fold_equivalent(*c)).collect();
            Some(digest_punctuation(&run)?)
        }
    };
    let core: String = rest.iter().take(core_len).collect();
    Some((before, core, after))
}

fn looks_like_gibberish(base: &str) -> bool {
    let mut vowels = 0;
    let mut consonants = 0;
    for c in base.chars() {
        if matches!(c, 'a' | 'e' | 'i' | 'o' | 'u') {
            vowels += 1;
            consonants = 0;
        } else {
            consonants += 1;
            vowels = 0;
        }
        if vowels > VOWEL_RUN_LIMIT || consonants > CONSONANT_RUN_LIMIT {
            return true;
        }
    }
    false
}

fn correct(base: String) -> String {
    if let Some((_, fixed)) = CORRECTIONS.iter().find(|(wrong, _)| *wrong == base) {
        return fixed.to_string();
    }
    for (right, wrongs) in FRAGMENT_FIXES {
        if let Some(wrong) = wrongs.iter().find(|w| base.contains(**w)) {
            return base.replacen(wrong, right, 1);
        }
    }
    base
}

/// Validate the word part of a token and normalise it.
fn digest_word(word: &str) -> Option<ParsedToken> {
    if word.starts_with(APOSTROPHE) || word.ends_with(APOSTROPHE) {
        return None;
    }
    let mut marks = 0;
    for c in word.chars() {
        if !is_word_char(c) {
            return None;
        }
        if c == APOSTROPHE || c == HYPHEN {
            marks += 1;
            if marks > 1 {
                return None;
            }
        }
    }
    let base = normalise(word);
    if looks_like_gibberish(&base) {
        return None;
    }
    Some(ParsedToken { base: correct(base), variant: word.nfc().collect() })
}

fn digest(token: &str) -> Option<Vec<ParsedToken>> {
    if let Some(symbol) = ids::canonical_symbol(token) {
        return Some(vec![ParsedToken::plain(symbol)]);
    }
    let (before, core, after) = dissect(token)?;
    let mut out = Vec::with_capacity(3);
    out.extend(before);
    if !core.is_empty() {
        out.push(digest_word(&core)?);
    }
    out.extend(after);
    Some(out)
}

/// English parsing and formatting rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct English;

impl Language for English {
    fn name(&self) -> &'static str {
        "english"
    }

    fn normalise(&self, word: &str) -> String {
        normalise(word)
    }

    fn parse(&self, input: &str, learn: bool, max_token_length: usize) -> (Vec<ParsedToken>, bool) {
        let mut tokens = Vec::new();
        let mut learnable = true;
        for raw in input.split(' ').filter(|t| !t.is_empty()) {
            let lexable = raw.chars().count() <= max_token_length
                && raw
                    .chars()
                    .all(|c| is_word_char(c) || is_punctuation_char(c) || ids::is_symbol_char(c));
            match lexable.then(|| digest(raw)).flatten() {
                Some(digested) => tokens.extend(digested),
                None if learn => return (Vec::new(), false),
                None => learnable = false,
            }
        }

        if learnable {
            let mut previous_was_punctuation = false;
            for token in &tokens {
                let is_punctuation = ids::punctuation_id(&token.base).is_some();
                if is_punctuation && previous_was_punctuation {
                    return (tokens, false);
                }
                previous_was_punctuation = is_punctuation;
            }
        }
        (tokens, learnable)
    }

    fn format(
        &self,
        production: &[TokenId],
        entries: &HashMap<TokenId, DictionaryEntry>,
        base_representation_threshold: f32,
    ) -> Option<String> {
        let mut out = String::new();
        let mut sentence_start = true;
        let mut suppress_space = false;
        for (i, &id) in production.iter().enumerate() {
            if let Some(mark) = ids::punctuation_repr(id) {
                match mark {
                    "…" => {
                        out.push_str(mark);
                        suppress_space = i == 0;
                    }
                    "." | "?" | "!" | "⁈" | "‼" | "⁇" => {
                        out.push_str(mark);
                        sentence_start = true;
                    }
                    "—" | "&" => {
                        out.push(' ');
                        out.push_str(mark);
                    }
                    _ => out.push_str(mark),
                }
                continue;
            }

            if i > 0 && !suppress_space {
                out.push(' ');
            }
            suppress_space = false;

            if let Some(symbol) = ids::symbol_repr(id) {
                out.push_str(symbol);
                continue;
            }

            let Some(entry) = entries.get(&id) else {
                log::error!("no dictionary entry for id {}; store is inconsistent", id);
                return None;
            };
            let (repr, is_base) = entry.represent(base_representation_threshold);
            if is_base && sentence_start {
                let mut chars = repr.chars();
                if let Some(head) = chars.next() {
                    out.extend(head.to_uppercase());
                    out.push_str(chars.as_str());
                }
            } else {
                out.push_str(repr);
            }
            sentence_start = false;
        }
        Some(out)
    }
}
