/// Diacritic folding table applied after uppercasing. Letters not listed
/// here pass through unchanged.
pub const FOLD_TABLE: &[(char, char)] = &[
    ('À', 'A'),
    ('Á', 'A'),
    ('Â', 'A'),
    ('Ã', 'A'),
    ('Ä', 'A'),
    ('Å', 'A'),
    ('Ç', 'C'),
    ('È', 'E'),
    ('É', 'E'),
    ('Ê', 'E'),
    ('Ë', 'E'),
    ('Ì', 'I'),
    ('Í', 'I'),
    ('Î', 'I'),
    ('Ï', 'I'),
    ('Ñ', 'N'),
    ('Ò', 'O'),
    ('Ó', 'O'),
    ('Ô', 'O'),
    ('Õ', 'O'),
    ('Ö', 'O'),
    ('Ù', 'U'),
    ('Ú', 'U'),
    ('Û', 'U'),
    ('Ü', 'U'),
    ('Ý', 'Y'),
    ('Ÿ', 'Y'),
];

/// Combining diacritical marks block (decomposed accents).
fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn fold(c: char) -> char {
    FOLD_TABLE
        .iter()
        .find(|(from, _)| *from == c)
        .map_or(c, |&(_, to)| to)
}

/// Normalize a chat guess or vocabulary token into the form stored in the
/// puzzle: uppercase, accents folded, everything but letters and digits
/// removed. Idempotent.
pub fn normalize_guess(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| !is_combining_mark(*c))
        .map(fold)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// True when the token is usable as a crossword entry: letters only.
pub fn is_word_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphabetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_case() {
        assert_eq!(normalize_guess("gáto"), "GATO");
        assert_eq!(normalize_guess("Canción"), "CANCION");
        assert_eq!(normalize_guess("pingüino"), "PINGUINO");
        assert_eq!(normalize_guess("año"), "ANO");
    }

    #[test]
    fn strips_whitespace_and_punctuation() {
        assert_eq!(normalize_guess("  gato  "), "GATO");
        assert_eq!(normalize_guess("ice-cream"), "ICECREAM");
        assert_eq!(normalize_guess("hello world!"), "HELLOWORLD");
    }

    #[test]
    fn strips_decomposed_accents() {
        // "e" followed by U+0301 COMBINING ACUTE ACCENT
        assert_eq!(normalize_guess("cafe\u{0301}"), "CAFE");
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        assert_eq!(normalize_guess(""), "");
        assert_eq!(normalize_guess(" - "), "");
    }

    #[test]
    fn word_token_rejects_digits() {
        assert!(is_word_token("GATO"));
        assert!(!is_word_token("G4TO"));
        assert!(!is_word_token(""));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(input in "[a-zA-Z0-9 áéíóúüñÁÉÍÓÚÜÑçÇàèìòùâêîôû'!?.-]{0,24}") {
                let once = normalize_guess(&input);
                prop_assert_eq!(normalize_guess(&once), once);
            }

            #[test]
            fn normalized_output_has_no_lowercase(input in "[a-zA-Z áéíóúñ-]{0,24}") {
                let out = normalize_guess(&input);
                prop_assert!(out.chars().all(|c| !c.is_lowercase()));
                prop_assert!(out.chars().all(|c| !c.is_whitespace() && c != '-'));
            }
        }
    }
}
