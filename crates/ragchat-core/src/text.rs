use crate::locale::Locale;
use crate::types::ContextPassage;

/// Collapse whitespace and cut to `limit` characters, ending in an ellipsis
/// when shortened.
pub fn summarise(text: &str, limit: usize) -> String {
    let condensed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if condensed.chars().count() <= limit {
        return condensed;
    }
    let mut cut: String = condensed.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// The knowledge-base block placed in front of the user's question.
pub fn context_block(locale: Locale, passages: &[ContextPassage], snippet_chars: usize) -> String {
    let mut sections = vec![locale.context_header().to_string()];
    for (i, p) in passages.iter().enumerate() {
        let label = if p.label.is_empty() { p.id.as_str() } else { p.label.as_str() };
        sections.push(format!("[{}] {}\n{}", i + 1, label, summarise(&p.text, snippet_chars)));
    }
    sections.join("\n\n")
}
