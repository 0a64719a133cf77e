//! Message catalog for the two supported locales.
//!
//! Anything that is not recognisably English falls back to German, the
//! product's primary language.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    De,
    En,
}

impl Locale {
    pub fn parse(tag: &str) -> Self {
        if tag.trim().to_lowercase().starts_with("en") { Locale::En } else { Locale::De }
    }

    pub fn intro(self) -> &'static str {
        match self {
            Locale::De => "Basierend auf der Wissensbasis habe ich folgende Hinweise gefunden:",
            Locale::En => "Based on our knowledge base I found the following hints:",
        }
    }

    pub fn no_results(self) -> &'static str {
        match self {
            Locale::De => "Ich konnte keine passenden Informationen in der Dokumentation finden. \
                           Bitte formuliere deine Frage anders oder schränke das Thema ein.",
            Locale::En => "I could not find matching information in the documentation. \
                           Please rephrase your question or narrow down the topic.",
        }
    }

    pub fn question(self) -> &'static str {
        match self {
            Locale::De => "Frage",
            Locale::En => "Question",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Locale::De => "Du bist ein hilfreicher Assistent für die QuizRace-Dokumentation. \
                           Beantworte Fragen ausschließlich anhand der bereitgestellten Kontexte.",
            Locale::En => "You are a helpful assistant for the QuizRace documentation. \
                           Answer questions only by relying on the supplied context snippets.",
        }
    }

    pub fn context_header(self) -> &'static str {
        match self {
            Locale::De => "Kontext aus der Wissensbasis:",
            Locale::En => "Context from the knowledge base:",
        }
    }

    pub fn section(self) -> &'static str {
        match self {
            Locale::De => "Abschnitt",
            Locale::En => "Section",
        }
    }

    pub fn result(self) -> &'static str {
        match self {
            Locale::De => "Ergebnis",
            Locale::En => "Result",
        }
    }
}
