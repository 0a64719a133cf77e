//! Query tokenizer.
//!
//! Must stay in lockstep with the offline indexer (`re.findall(r"\b\w+\b")`
//! over lowercased text): a mismatch does not fail, it silently drops terms
//! from every query.
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid token pattern"));

pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.trim().to_lowercase();
    TOKEN_RE.find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::tokenize;

    #[test]
    fn lowercases_and_splits_on_non_word_runs() {
        assert_eq!(tokenize("  CalServer,   Inventar!! "), vec!["calserver", "inventar"]);
    }

    #[test]
    fn keeps_unicode_letters_and_digits() {
        assert_eq!(tokenize("Prüfmittel für Labore 2024"), vec!["prüfmittel", "für", "labore", "2024"]);
    }

    #[test]
    fn blank_input_has_no_tokens() {
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("--- ???").is_empty());
    }
}
