//! Text extraction from the loosely structured `content`/`output` fields
//! returned by chat services.

use serde_json::Value;

/// One node of a provider's content tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Output(Vec<ContentPart>),
    Other,
}

impl ContentPart {
    /// Objects contribute `text`, then `value`, then nested `content`, then
    /// nested `output`. Every other key, `type` included, is ignored.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => ContentPart::Text(s.clone()),
            Value::Array(items) => ContentPart::Output(items.iter().map(Self::from_value).collect()),
            Value::Object(map) => {
                let mut parts = Vec::new();
                for key in ["text", "value"] {
                    if let Some(Value::String(s)) = map.get(key) {
                        parts.push(ContentPart::Text(s.clone()));
                    }
                }
                for key in ["content", "output"] {
                    if let Some(nested) = map.get(key) {
                        parts.push(Self::from_value(nested));
                    }
                }
                if parts.is_empty() { ContentPart::Other } else { ContentPart::Output(parts) }
            }
            _ => ContentPart::Other,
        }
    }

    /// All text fragments concatenated in document order.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        match self {
            ContentPart::Text(s) => out.push_str(s),
            ContentPart::Output(children) => children.iter().for_each(|c| c.write_into(out)),
            ContentPart::Other => {}
        }
    }
}

/// Flattened text of `value`, or `None` when nothing but whitespace remains.
pub fn content_text(value: &Value) -> Option<String> {
    let text = ContentPart::from_value(value).flatten();
    if text.trim().is_empty() { None } else { Some(text) }
}
