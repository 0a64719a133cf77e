use ragchat_core::locale::Locale;
use ragchat_core::text::summarise;
use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextPassage, Role};
use ragchat_core::Result;

pub const DEFAULT_SNIPPET_CHARS: usize = 320;

/// Summarises the retrieved passages without calling any model.
#[derive(Debug, Clone, Copy)]
pub struct LocalExtractiveResponder {
    locale: Locale,
    snippet_chars: usize,
}

impl LocalExtractiveResponder {
    pub fn new(locale: Locale) -> Self {
        Self { locale, snippet_chars: DEFAULT_SNIPPET_CHARS }
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars.max(1);
        self
    }

    pub fn locale(&self) -> Locale { self.locale }

    fn render(&self, question: Option<&str>, context: &[ContextPassage]) -> String {
        if context.is_empty() {
            return self.locale.no_results().to_string();
        }
        let mut lines = vec![self.locale.intro().to_string()];
        for (i, passage) in context.iter().enumerate() {
            let label = if passage.label.is_empty() { passage.id.as_str() } else { passage.label.as_str() };
            lines.push(format!("{}. {}: {}", i + 1, label, summarise(&passage.text, self.snippet_chars)));
        }
        if let Some(q) = question.map(str::trim).filter(|q| !q.is_empty()) {
            lines.push(String::new());
            lines.push(format!("{}: {}", self.locale.question(), q));
        }
        lines.join("\n")
    }
}

impl ChatResponder for LocalExtractiveResponder {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        let question = messages.iter().rev().find(|m| m.role == Role::User).map(|m| m.content.as_str());
        Ok(self.render(question, context))
    }
}
