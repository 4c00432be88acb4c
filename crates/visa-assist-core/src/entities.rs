//! Country mentions in user text and their origin/destination reading.
//!
//! Matching runs over lowercase word tokens against a lexicon built from the
//! country table plus common aliases ("UK", "Dubai") and nationality words
//! ("Pakistani", "Americans"). Longer phrases win ("South Korea" before
//! "Korea"). Uppercase acronyms ("US", "UAE", any ISO-3 code) match only when
//! written in capitals, so "tell us" is not the United States.
//!
//! When nothing matches exactly, words of five letters or more are compared
//! against single-word lexicon entries by edit distance, so "pakisatni"
//! still reads as Pakistani.
//!
//! Roles come from the words around a mention:
//!
//! | Cue | Role |
//! |-----|------|
//! | `from X`, `I'm X`, `as a X`, `citizen of X`, `X passport`, `X citizen` | origin |
//! | `to X`, `visit X`, `enter X`, `into X`, `for X` (a place) | destination |
//! | `for Xs` (a nationality), bare nationality word | origin |
//! | `X visa for Y` | X destination, Y origin |
//!
//! Two uncued places are read in order as origin then destination. A single
//! uncued place is reported as [`Extraction::ambiguous`] and left to the
//! caller.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::countries::{country_code, COUNTRIES};

const ALIASES: &[(&str, &str)] = &[
    ("uk", "GBR"),
    ("britain", "GBR"),
    ("great britain", "GBR"),
    ("england", "GBR"),
    ("america", "USA"),
    ("usa", "USA"),
    ("united states of america", "USA"),
    ("uae", "ARE"),
    ("dubai", "ARE"),
    ("abu dhabi", "ARE"),
    ("emirates", "ARE"),
    ("korea", "KOR"),
    ("czechia", "CZE"),
    ("holland", "NLD"),
];

const DEMONYMS: &[(&str, &str)] = &[
    ("afghan", "AFG"),
    ("afghans", "AFG"),
    ("algerian", "DZA"),
    ("algerians", "DZA"),
    ("american", "USA"),
    ("americans", "USA"),
    ("australian", "AUS"),
    ("australians", "AUS"),
    ("bahraini", "BHR"),
    ("bahrainis", "BHR"),
    ("bangladeshi", "BGD"),
    ("bangladeshis", "BGD"),
    ("brazilian", "BRA"),
    ("brazilians", "BRA"),
    ("brits", "GBR"),
    ("british", "GBR"),
    ("canadian", "CAN"),
    ("canadians", "CAN"),
    ("chinese", "CHN"),
    ("dutch", "NLD"),
    ("egyptian", "EGY"),
    ("egyptians", "EGY"),
    ("emirati", "ARE"),
    ("emiratis", "ARE"),
    ("ethiopian", "ETH"),
    ("ethiopians", "ETH"),
    ("filipino", "PHL"),
    ("filipinos", "PHL"),
    ("french", "FRA"),
    ("german", "DEU"),
    ("germans", "DEU"),
    ("indian", "IND"),
    ("indians", "IND"),
    ("indonesian", "IDN"),
    ("indonesians", "IDN"),
    ("iranian", "IRN"),
    ("iranians", "IRN"),
    ("iraqi", "IRQ"),
    ("iraqis", "IRQ"),
    ("italian", "ITA"),
    ("italians", "ITA"),
    ("japanese", "JPN"),
    ("jordanian", "JOR"),
    ("jordanians", "JOR"),
    ("kenyan", "KEN"),
    ("kenyans", "KEN"),
    ("korean", "KOR"),
    ("koreans", "KOR"),
    ("kuwaiti", "KWT"),
    ("kuwaitis", "KWT"),
    ("lebanese", "LBN"),
    ("malaysian", "MYS"),
    ("malaysians", "MYS"),
    ("mexican", "MEX"),
    ("mexicans", "MEX"),
    ("moroccan", "MAR"),
    ("moroccans", "MAR"),
    ("nepali", "NPL"),
    ("nepalis", "NPL"),
    ("nigerian", "NGA"),
    ("nigerians", "NGA"),
    ("omani", "OMN"),
    ("omanis", "OMN"),
    ("pakistani", "PAK"),
    ("pakistanis", "PAK"),
    ("qatari", "QAT"),
    ("qataris", "QAT"),
    ("russian", "RUS"),
    ("russians", "RUS"),
    ("saudi", "SAU"),
    ("saudis", "SAU"),
    ("singaporean", "SGP"),
    ("singaporeans", "SGP"),
    ("south african", "ZAF"),
    ("south africans", "ZAF"),
    ("spanish", "ESP"),
    ("sri lankan", "LKA"),
    ("sri lankans", "LKA"),
    ("sudanese", "SDN"),
    ("syrian", "SYR"),
    ("syrians", "SYR"),
    ("thai", "THA"),
    ("thais", "THA"),
    ("tunisian", "TUN"),
    ("tunisians", "TUN"),
    ("turkish", "TUR"),
    ("vietnamese", "VNM"),
    ("yemeni", "YEM"),
    ("yemenis", "YEM"),
];

/// Capitalized acronyms that are not ISO-3 codes.
const ACRONYMS: &[(&str, &str)] = &[("US", "USA"), ("UK", "GBR"), ("UAE", "ARE")];

const ORIGIN_BEFORE: &[&str] = &["from", "i'm", "im", "as", "being", "am"];
const ORIGIN_BEFORE_PAIRS: &[(&str, &str)] = &[
    ("citizen", "of"),
    ("citizens", "of"),
    ("national", "of"),
    ("nationals", "of"),
    ("passport", "is"),
    ("am", "a"),
    ("am", "an"),
    ("i'm", "a"),
    ("i'm", "an"),
    ("as", "a"),
    ("as", "an"),
    ("being", "a"),
];
const ORIGIN_AFTER: &[&str] = &[
    "passport",
    "passports",
    "citizen",
    "citizens",
    "national",
    "nationals",
    "passport-holder",
    "passport-holders",
];
const DESTINATION_BEFORE: &[&str] = &[
    "to", "visit", "visiting", "enter", "entering", "into",
];

const FUZZY_MIN_LEN: usize = 5;
const FUZZY_MIN_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy)]
struct Entry {
    code: &'static str,
    demonym: bool,
}

struct Lexicon {
    entries: HashMap<String, Entry>,
    max_words: usize,
}

fn lexicon() -> &'static Lexicon {
    static LEXICON: OnceLock<Lexicon> = OnceLock::new();
    LEXICON.get_or_init(|| {
        let mut entries = HashMap::new();
        let places = COUNTRIES.iter().map(|(c, n)| (*n, *c)).chain(ALIASES.iter().copied());
        for (phrase, code) in places {
            entries.insert(phrase_key(phrase), Entry { code, demonym: false });
        }
        for &(phrase, code) in DEMONYMS {
            entries.insert(phrase_key(phrase), Entry { code, demonym: true });
        }
        let max_words = entries
            .keys()
            .map(|k| k.split(' ').count())
            .max()
            .unwrap_or(1);
        Lexicon { entries, max_words }
    })
}

fn phrase_key(phrase: &str) -> String {
    tokenize(phrase)
        .into_iter()
        .map(|t| t.lower)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Token {
    raw: String,
    lower: String,
}

fn tokenize(text: &str) -> Vec<Token> {
    text.replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| {
            let w = w.strip_suffix("'s").unwrap_or(w);
            Token {
                raw: w.to_string(),
                lower: w.to_lowercase(),
            }
        })
        .collect()
}

/// A country found in the text, spanning tokens `first..=last`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mention {
    pub code: &'static str,
    /// A nationality word ("Indian") rather than a place ("India").
    pub demonym: bool,
    /// Matched by edit distance rather than exactly.
    pub fuzzy: bool,
    first: usize,
    last: usize,
}

/// What a message says about the trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    /// Passport country.
    pub origin: Option<&'static str>,
    pub destination: Option<&'static str>,
    /// A lone place with no cue either way.
    pub ambiguous: Option<&'static str>,
    pub mentions: Vec<Mention>,
}

/// Find country mentions in `text` and read their roles.
pub fn extract(text: &str) -> Extraction {
    let tokens = tokenize(text);
    let mut mentions = exact_mentions(&tokens);
    if mentions.is_empty() {
        mentions = fuzzy_mentions(&tokens);
    }
    let mut extraction = classify(&tokens, &mentions);
    extraction.mentions = mentions;
    extraction
}

fn acronym(raw: &str) -> Option<&'static str> {
    if !(2..=3).contains(&raw.len()) || !raw.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    ACRONYMS
        .iter()
        .find(|(a, _)| *a == raw)
        .map(|(_, code)| *code)
        .or_else(|| country_code(raw).filter(|_| raw.len() == 3))
}

fn exact_mentions(tokens: &[Token]) -> Vec<Mention> {
    let lex = lexicon();
    let mut mentions = Vec::new();
    let mut i = 0;
    'scan: while i < tokens.len() {
        if let Some(code) = acronym(&tokens[i].raw) {
            mentions.push(Mention {
                code,
                demonym: false,
                fuzzy: false,
                first: i,
                last: i,
            });
            i += 1;
            continue;
        }
        for n in (1..=lex.max_words.min(tokens.len() - i)).rev() {
            let key = tokens[i..i + n]
                .iter()
                .map(|t| t.lower.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            // Bare "us" is the pronoun; the country needs capitals
            if key == "us" {
                continue;
            }
            if let Some(entry) = lex.entries.get(&key) {
                mentions.push(Mention {
                    code: entry.code,
                    demonym: entry.demonym,
                    fuzzy: false,
                    first: i,
                    last: i + n - 1,
                });
                i += n;
                continue 'scan;
            }
        }
        i += 1;
    }
    mentions
}

fn fuzzy_mentions(tokens: &[Token]) -> Vec<Mention> {
    let lex = lexicon();
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.lower.chars().count() >= FUZZY_MIN_LEN && t.lower.chars().all(char::is_alphabetic)
        })
        .filter_map(|(i, t)| {
            let len = t.lower.chars().count();
            lex.entries
                .iter()
                .filter(|(key, _)| !key.contains(' ') && key.chars().count().abs_diff(len) <= 3)
                .map(|(key, entry)| (similarity(&t.lower, key), key, entry))
                .filter(|(ratio, _, _)| *ratio > FUZZY_MIN_RATIO)
                // Highest ratio, then the lexicographically first key for stability
                .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
                .map(|(_, _, entry)| Mention {
                    code: entry.code,
                    demonym: entry.demonym,
                    fuzzy: true,
                    first: i,
                    last: i,
                })
        })
        .collect()
}

/// `1 - distance / longer length`, over chars.
fn similarity(a: &str, b: &str) -> f64 {
    let longer = a.chars().count().max(b.chars().count());
    if longer == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / longer as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for j in 1..=b.len() {
            let substitution = prev[j - 1] + usize::from(ca != b[j - 1]);
            curr[j] = substitution.min(prev[j] + 1).min(curr[j - 1] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Up to two words before token `at`, nearest last, skipping "the".
fn words_before(tokens: &[Token], at: usize) -> (Option<&str>, Option<&str>) {
    let mut before = tokens[..at]
        .iter()
        .rev()
        .map(|t| t.lower.as_str())
        .filter(|w| *w != "the");
    let near = before.next();
    let far = before.next();
    (far, near)
}

fn word_after(tokens: &[Token], at: usize) -> Option<&str> {
    tokens.get(at + 1).map(|t| t.lower.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Origin,
    Destination,
    None,
}

fn cue(tokens: &[Token], m: &Mention) -> Cue {
    let (far, near) = words_before(tokens, m.first);
    let after = word_after(tokens, m.last);

    let origin_pair = matches!((far, near), (Some(f), Some(n)) if ORIGIN_BEFORE_PAIRS.contains(&(f, n)));
    let origin_single = near.is_some_and(|n| ORIGIN_BEFORE.contains(&n));
    let origin_after = after.is_some_and(|a| ORIGIN_AFTER.contains(&a));
    if origin_pair || origin_single || origin_after {
        return Cue::Origin;
    }

    match near {
        Some(n) if DESTINATION_BEFORE.contains(&n) => Cue::Destination,
        Some("for") if m.demonym => Cue::Origin,
        Some("for") => Cue::Destination,
        _ => Cue::None,
    }
}

fn classify(tokens: &[Token], mentions: &[Mention]) -> Extraction {
    let mut out = Extraction::default();

    // "Singapore visa for Pakistani"
    for pair in mentions.windows(2) {
        let (dest, origin) = (&pair[0], &pair[1]);
        let between: Vec<&str> = tokens[dest.last + 1..origin.first]
            .iter()
            .map(|t| t.lower.as_str())
            .collect();
        if between == ["visa", "for"] && dest.code != origin.code {
            out.origin = Some(origin.code);
            out.destination = Some(dest.code);
            return out;
        }
    }

    let mut uncued: Vec<&Mention> = Vec::new();
    for m in mentions {
        match cue(tokens, m) {
            Cue::Origin if out.origin.is_none() => out.origin = Some(m.code),
            Cue::Destination if out.destination.is_none() => out.destination = Some(m.code),
            Cue::None if m.demonym && out.origin.is_none() => out.origin = Some(m.code),
            Cue::None => uncued.push(m),
            _ => {}
        }
    }

    let taken = |code: &str, out: &Extraction| out.origin == Some(code) || out.destination == Some(code);
    let mut rest = uncued.into_iter().map(|m| m.code);
    match (out.origin, out.destination) {
        (None, None) => {
            let first = rest.next();
            let second = rest.find(|c| Some(*c) != first);
            match (first, second) {
                (Some(o), Some(d)) => {
                    out.origin = Some(o);
                    out.destination = Some(d);
                }
                (lone, _) => out.ambiguous = lone,
            }
        }
        (Some(_), None) => out.destination = rest.find(|c| !taken(*c, &out)),
        (None, Some(_)) => out.origin = rest.find(|c| !taken(*c, &out)),
        (Some(_), Some(_)) => {}
    }
    out
}
