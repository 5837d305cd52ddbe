pub mod client;
pub mod relay;

#[cfg(test)]
pub mod mock;

pub use client::HttpTranslator;
pub use relay::{Inbound, Outbound, RelayStats, TranslationRelay};

#[cfg(test)]
pub use mock::MockTranslator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("No translation service configured")]
    NotConfigured,

    #[error("Translation service unreachable: {0}")]
    Connection(String),

    #[error("Translation service returned error (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Translation timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Translation response parsing error: {0}")]
    ResponseParsing(String),
}

/// The two conversation languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// User-facing language.
    Turkish,
    /// Generation language.
    English,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::Turkish => "tr",
            Self::English => "en",
        }
    }
}

/// Machine translation backend.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslationError>;

    fn name(&self) -> &str;
}

impl Translator for Box<dyn Translator> {
    fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslationError> {
        (**self).translate(text, source, target)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
