use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use ragchat_core::config::{AppConfig, ChatSettings, TenantConfig};
use ragchat_core::locale::Locale;
use ragchat_core::traits::ChatResponder;
use ragchat_core::types::{ChatMessage, ContextPassage, Role};
use ragchat_core::{Error, Result};
use ragchat_index::IndexCache;
use ragchat_service::RagChatService;
use serde_json::{json, Value};
use tempfile::TempDir;

const FIXTURE: &str = r#"{
    "vocabulary": ["calserver", "inventar"],
    "idf": [1.0, 1.0],
    "chunks": [
        {"id": "chunk-1", "text": "calserver inventar verwalten",
         "metadata": {"title": "Feature Overview", "chunk_index": 1},
         "vector": [[0, 0.5], [1, 0.5]], "norm": 0.707107},
        {"id": "chunk-2", "text": "Inventarverwaltung für Labore",
         "metadata": {"source": "docs/usage.md"},
         "vector": [[1, 1.0]], "norm": 1.0}
    ]
}"#;

type Call = (Vec<ChatMessage>, Vec<ContextPassage>);

struct Recording {
    reply: std::result::Result<String, String>,
    calls: Mutex<Vec<Call>>,
}

impl Recording {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(answer.into()), calls: Mutex::new(Vec::new()) })
    }

    fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self { reply: Err(reason.into()), calls: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChatResponder for Recording {
    fn respond(&self, messages: &[ChatMessage], context: &[ContextPassage]) -> Result<String> {
        self.calls.lock().unwrap().push((messages.to_vec(), context.to_vec()));
        self.reply.clone().map_err(Error::Provider)
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.json"), FIXTURE).unwrap();
        Self { dir }
    }

    fn domain_index(&self, candidate: &str, body: &str) {
        let dir = self.dir.path().join("domains").join(candidate);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.json"), body).unwrap();
    }

    fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.index_path = path_str(&self.dir.path().join("index.json"));
        config.paths.doc_base = path_str(&self.dir.path().join("domains"));
        config.paths.index_base = None;
        config
    }

    fn service(&self, config: AppConfig) -> RagChatService {
        RagChatService::new(config).with_cache(Arc::new(IndexCache::new()))
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

#[test]
fn answer_grounds_the_question_and_returns_external_answer_verbatim() {
    let fx = Fixture::new();
    let recording = Recording::answering("Extern: siehe Handbuch.");
    let service = fx.service(fx.config()).with_responder(recording.clone());

    let response = service.answer("  calserver inventar ", Locale::De).unwrap();

    assert_eq!(response.question, "calserver inventar");
    assert_eq!(response.answer, "Extern: siehe Handbuch.");
    assert_eq!(response.context.len(), 2);
    assert_eq!(response.context[0].id, "chunk-1");
    assert_eq!(response.context[0].label, "Feature Overview (Abschnitt 1)");
    assert_eq!(response.context[0].snippet, "calserver inventar verwalten");
    assert_eq!(response.context[0].score, 1.0);
    assert_eq!(response.context[1].label, "docs/usage.md");

    let calls = recording.calls();
    assert_eq!(calls.len(), 1);
    let (messages, passages) = &calls[0];
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, Locale::De.system_prompt());
    assert!(messages[1].grounding);
    assert!(messages[1].content.starts_with("Kontext aus der Wissensbasis:"));
    assert!(messages[1].content.contains("[1] Feature Overview (Abschnitt 1)\ncalserver inventar verwalten"));
    assert_eq!(messages[2], ChatMessage::user("calserver inventar"));
    assert_eq!(passages[0].text, "calserver inventar verwalten");
    assert_eq!(passages[0].metadata["chunk_index"], 1);
}

#[test]
fn english_locale_localizes_labels() {
    let fx = Fixture::new();
    let service = fx.service(fx.config()).with_responder(Recording::answering("ok"));
    let response = service.answer("calserver", Locale::parse("en-GB")).unwrap();
    assert_eq!(response.context[0].label, "Feature Overview (Section 1)");
}

#[test]
fn empty_question_is_rejected() {
    let fx = Fixture::new();
    let recording = Recording::answering("never");
    let service = fx.service(fx.config()).with_responder(recording.clone());
    for question in ["", "   \n"] {
        match service.answer(question, Locale::De) {
            Err(Error::Validation(msg)) => assert_eq!(msg, "Question must not be empty."),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(recording.calls().is_empty());
}

#[test]
fn top_k_limits_the_context() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.retrieval.top_k = 1;
    let service = fx.service(config).with_responder(Recording::answering("ok"));
    assert_eq!(service.answer("calserver inventar", Locale::De).unwrap().context.len(), 1);
}

#[test]
fn local_responder_without_configured_endpoint() {
    let fx = Fixture::new();
    let service = fx.service(fx.config());

    let found = service.answer("calserver inventar", Locale::De).unwrap();
    assert!(found.answer.starts_with(Locale::De.intro()));
    assert!(found.answer.contains("1. Feature Overview (Abschnitt 1): calserver inventar verwalten"));
    assert!(found.answer.ends_with("Frage: calserver inventar"));

    let nothing = service.answer("unrelated", Locale::En).unwrap();
    assert!(nothing.context.is_empty());
    assert_eq!(nothing.answer, Locale::En.no_results());
}

#[test]
fn external_responder_is_called_with_empty_context() {
    let fx = Fixture::new();
    let recording = Recording::answering("Dazu weiß ich nichts.");
    let service = fx.service(fx.config()).with_responder(recording.clone());

    let response = service.answer("unrelated", Locale::De).unwrap();
    assert_eq!(response.answer, "Dazu weiß ich nichts.");
    assert!(response.context.is_empty());

    let (messages, passages) = recording.calls().remove(0);
    assert!(passages.is_empty());
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| !m.grounding));
}

#[test]
fn provider_errors_surface_unless_fallback_is_enabled() {
    let fx = Fixture::new();
    let service = fx.service(fx.config()).with_responder(Recording::failing("HTTP 502"));
    assert!(matches!(service.answer("calserver", Locale::De), Err(Error::Provider(_))));

    let mut config = fx.config();
    config.chat.fallback_to_local = Some(true);
    let service = fx.service(config).with_responder(Recording::failing("HTTP 502"));
    let response = service.answer("calserver", Locale::De).unwrap();
    assert!(response.answer.starts_with(Locale::De.intro()));
}

#[test]
fn missing_global_index_is_an_error() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.paths.index_path = path_str(&fx.dir.path().join("absent.json"));
    let service = fx.service(config).with_responder(Recording::answering("x"));
    assert!(matches!(service.answer("calserver", Locale::De), Err(Error::Parse(_) | Error::Io(_))));
}

#[test]
fn domain_index_is_preferred_and_tagged() {
    let fx = Fixture::new();
    fx.domain_index("calserver", FIXTURE);
    let mut config = fx.config();
    config.domains.marketing = vec!["calserver.com".into()];
    let recording = Recording::answering("ok");
    let service = fx.service(config).with_responder(recording.clone());

    let response = service
        .answer_for_domain("calserver inventar", Locale::De, Some("https://www.calserver.com/de"))
        .unwrap();
    assert_eq!(response.context.len(), 2);
    assert!(response.context.iter().all(|c| c.metadata["domain"] == "calserver"));
    let (_, passages) = recording.calls().remove(0);
    assert_eq!(passages[0].metadata["domain"], "calserver");
}

#[test]
fn first_label_is_tried_after_the_slug() {
    let fx = Fixture::new();
    fx.domain_index("example.com", "{broken");
    fx.domain_index("example", FIXTURE);
    let service = fx.service(fx.config()).with_responder(Recording::answering("ok"));

    let response = service.answer_for_domain("calserver", Locale::De, Some("example.com")).unwrap();
    assert_eq!(response.context[0].metadata["domain"], "example");
}

#[test]
fn tenant_without_matches_gets_no_global_results() {
    let fx = Fixture::new();
    let recording = Recording::answering("ok");
    let service = fx.service(fx.config()).with_responder(recording.clone());

    let response = service.answer_for_domain("calserver inventar", Locale::De, Some("other.example")).unwrap();
    assert!(response.context.is_empty());
    assert!(recording.calls()[0].1.is_empty());

    let global = service.answer_for_domain("calserver inventar", Locale::De, Some("  ")).unwrap();
    assert_eq!(global.context.len(), 2);
}

/// Answers one request with `body` and hands back the request body.
fn one_shot(body: &'static str) -> (String, JoinHandle<String>) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/chat", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    let request = String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    stream.write_all(response.as_bytes()).unwrap();
                    return request;
                }
            }
            assert!(n > 0, "client closed early");
        }
    });
    (url, handle)
}

#[test]
fn tenant_chat_settings_select_the_http_responder() {
    let fx = Fixture::new();
    let (url, handle) = one_shot(r#"{"result":"Hallo!"}"#);
    let mut config = fx.config();
    config.domains.marketing = vec!["calserver.com".into()];
    config.tenants = HashMap::from([(
        "calserver".to_string(),
        TenantConfig { chat: ChatSettings { url: Some(url), driver: Some("http".into()), ..Default::default() } },
    )]);
    let service = fx.service(config);

    let response = service.answer_for_domain("calserver inventar", Locale::De, Some("calserver.com")).unwrap();
    assert_eq!(response.answer, "Hallo!");

    let sent: Value = serde_json::from_str(&handle.join().unwrap()).unwrap();
    assert_eq!(sent["messages"].as_array().unwrap().len(), 2);
    assert_eq!(sent["context"], json!([]));

    // other tenants keep the local default
    let local = service.answer("calserver", Locale::De).unwrap();
    assert!(local.answer.starts_with(Locale::De.intro()));
}

#[test]
fn openai_endpoint_receives_context_inside_messages() {
    let fx = Fixture::new();
    let (url, handle) = one_shot(r#"{"choices":[{"message":{"role":"assistant","content":"Antwort"}}]}"#);
    let mut config = fx.config();
    config.chat = ChatSettings {
        url: Some(url),
        model: Some("gpt-4o-mini".into()),
        force_openai: Some(true),
        ..Default::default()
    };
    let service = fx.service(config);

    let response = service.answer("calserver inventar", Locale::De).unwrap();
    assert_eq!(response.answer, "Antwort");

    let sent: Value = serde_json::from_str(&handle.join().unwrap()).unwrap();
    assert!(sent.get("context").is_none());
    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[1]["content"].as_str().unwrap().contains("Kontext aus der Wissensbasis"));
    assert_eq!(messages[2]["content"], "calserver inventar");
}
