//! Song name normalization.
//! Produces the comparison key used by the index, the matcher and the store.
//!
//! CRITICAL: keys persisted by `push-store` are computed here too. Changing any
//! step changes which spellings collapse together; re-import after changes.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Runs of any Unicode whitespace.
pub static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A hyphen with whatever spacing surrounds it ("a-b", "a -b", "a- b").
pub static HYPHEN_SPACING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());

/// Prefix of the row-2 seed annotation, with or without the colon.
pub static SEED_ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Ausgangssong von:?").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Map quote and dash look-alikes onto their ASCII forms.
/// Single quotes (curly, low-9, reversed, acute, backtick) become `'`,
/// double quotes (curly, low-9, reversed) become `"`,
/// hyphen/figure/en/em/bar dashes and the minus sign become `-`.
pub fn unify_glyph(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{00B4}' | '\u{0060}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
        '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
        other => other,
    }
}

/// Strip diacritics via canonical decomposition.
/// e.g., "röck" → "rock", "mé" → "me"
pub fn strip_diacritics(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a song name into its comparison key.
///
/// Steps, in order: lowercase, drop combining marks after NFD, unify quote and
/// dash glyphs, collapse whitespace, space every hyphen as " - ", trim.
/// Total and idempotent.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let lowered = raw.to_lowercase();
    let folded = strip_diacritics(&lowered);
    let unified: String = folded.chars().map(unify_glyph).collect();
    let collapsed = WHITESPACE_RUN.replace_all(&unified, " ");
    let spaced = HYPHEN_SPACING.replace_all(&collapsed, " - ");

    spaced.trim().to_string()
}

/// Extract the seed contributor from a row-2 annotation cell.
///
/// "Ausgangssong von: Anna" → Some("Anna"). A cell without the prefix is taken
/// as the name itself; blank cells yield None. The boolean reports whether the
/// annotation prefix was present.
pub fn parse_seed_annotation(cell: Option<&str>) -> (Option<String>, bool) {
    let Some(text) = cell else {
        return (None, false);
    };

    let (rest, annotated) = match SEED_ANNOTATION.find(text) {
        Some(m) => (&text[m.end()..], true),
        None => (text, false),
    };

    let name = rest.trim();
    if name.is_empty() {
        (None, annotated)
    } else {
        (Some(name.to_string()), annotated)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t "), "");
    }

    #[test]
    fn test_normalize_accents() {
        assert_eq!(normalize("Röck Me Amadeus"), "rock me amadeus");
        assert_eq!(normalize("Beyoncé - Halo"), "beyonce - halo");
        assert_eq!(normalize("MOTÖRHEAD - Ace of Spades"), "motorhead - ace of spades");
    }

    #[test]
    fn test_normalize_dash_spacing() {
        assert_eq!(normalize("Artist-Song"), "artist - song");
        assert_eq!(normalize("Artist -  Song"), "artist - song");
        assert_eq!(normalize("a -b"), "a - b");
        assert_eq!(normalize("a- b"), "a - b");
        assert_eq!(normalize("Falco – Rock Me Amadeus"), "falco - rock me amadeus");
        assert_eq!(normalize("Falco — Rock Me Amadeus"), "falco - rock me amadeus");
        assert_eq!(normalize("Falco − Rock Me Amadeus"), "falco - rock me amadeus");
    }

    #[test]
    fn test_normalize_quotes() {
        assert_eq!(normalize("Don’t Stop Me Now"), "don't stop me now");
        assert_eq!(normalize("Don`t Stop"), "don't stop");
        assert_eq!(normalize("Don´t Stop"), "don't stop");
        assert_eq!(normalize("„Hallo“ sagt er"), "\"hallo\" sagt er");
        assert_eq!(normalize("“Heroes”"), "\"heroes\"");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize("  Queen \t We  Will\u{a0}Rock You  "), "queen we will rock you");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "Röck Me Amadeus",
            "AC/DC - Highway to Hell",
            "a--b",
            "  - leading dash",
            "trailing dash -",
            "Don’t  Stop – Me",
            "",
            "ÉÈÊ---x",
            "İstanbul",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_parse_seed_annotation() {
        assert_eq!(
            parse_seed_annotation(Some("Ausgangssong von: Anna")),
            (Some("Anna".to_string()), true)
        );
        assert_eq!(
            parse_seed_annotation(Some("Ausgangssong von Ben ")),
            (Some("Ben".to_string()), true)
        );
        assert_eq!(
            parse_seed_annotation(Some("  Clara ")),
            (Some("Clara".to_string()), false)
        );
        assert_eq!(parse_seed_annotation(Some("Ausgangssong von:")), (None, true));
        assert_eq!(parse_seed_annotation(None), (None, false));
    }
}
