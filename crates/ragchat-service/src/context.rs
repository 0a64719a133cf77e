use ragchat_core::locale::Locale;
use ragchat_core::text::summarise;
use ragchat_core::types::{ContextItem, ContextPassage, Meta};
use ragchat_index::ScoredResult;
use serde_json::Value;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn non_blank(metadata: &Meta, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Human-readable name of a hit: `title (Section N)`, `title`, `source`, or
/// `Result N` counted from one.
pub fn label(metadata: &Meta, position: usize, locale: Locale) -> String {
    if let Some(title) = non_blank(metadata, "title") {
        return match non_blank(metadata, "chunk_index") {
            Some(chunk) => format!("{title} ({} {chunk})", locale.section()),
            None => title,
        };
    }
    non_blank(metadata, "source").unwrap_or_else(|| format!("{} {}", locale.result(), position + 1))
}

/// The caller-facing item and the responder-facing passage for one hit.
pub fn build_entry(
    hit: &ScoredResult<'_>,
    position: usize,
    locale: Locale,
    origin_domain: Option<&str>,
    snippet_chars: usize,
) -> (ContextItem, ContextPassage) {
    let mut metadata = hit.chunk.metadata.clone();
    if let Some(domain) = origin_domain {
        metadata.insert("domain".into(), Value::String(domain.to_string()));
    }
    let label = label(&metadata, position, locale);
    let item = ContextItem {
        id: hit.chunk_id.to_string(),
        label: label.clone(),
        snippet: summarise(&hit.chunk.text, snippet_chars),
        score: round_to(hit.score, 4),
        metadata: metadata.clone(),
    };
    let passage = ContextPassage {
        id: hit.chunk_id.to_string(),
        text: hit.chunk.text.clone(),
        score: round_to(hit.score, 6),
        metadata,
        label,
    };
    (item, passage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Meta {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn label_prefers_title_with_section() {
        let m = meta(json!({"title": "Feature Overview", "chunk_index": 1, "source": "x.md"}));
        assert_eq!(label(&m, 0, Locale::De), "Feature Overview (Abschnitt 1)");
        assert_eq!(label(&m, 0, Locale::En), "Feature Overview (Section 1)");
    }

    #[test]
    fn label_falls_back_through_source_and_position() {
        assert_eq!(label(&meta(json!({"title": "Only"})), 0, Locale::En), "Only");
        assert_eq!(label(&meta(json!({"title": " ", "source": "guide.md"})), 0, Locale::En), "guide.md");
        assert_eq!(label(&meta(json!({})), 2, Locale::En), "Result 3");
        assert_eq!(label(&meta(json!({"chunk_index": 4})), 0, Locale::De), "Ergebnis 1");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.123456789, 4), 0.1235);
        assert_eq!(round_to(0.123456789, 6), 0.123457);
    }
}
