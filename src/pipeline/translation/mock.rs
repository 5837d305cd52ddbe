//! Table-driven `Translator` for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Language, TranslationError, Translator};

/// Returns the table entry for a known text and the input unchanged
/// otherwise. Counts every call per target language.
#[derive(Default)]
pub struct MockTranslator {
    table: HashMap<String, String>,
    failure: Option<TranslationError>,
    corrupt_placeholders: bool,
    calls: Mutex<Vec<(Language, String)>>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failure: Some(TranslationError::Connection("http://mock".into())),
            ..Self::default()
        }
    }

    /// Splits every placeholder the way a careless translator would.
    pub fn corrupting() -> Self {
        Self {
            corrupt_placeholders: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, target: Language) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == target)
            .count()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Translator for MockTranslator {
    fn translate(
        &self,
        text: &str,
        _source: Language,
        target: Language,
    ) -> Result<String, TranslationError> {
        self.calls
            .lock()
            .unwrap()
            .push((target, text.to_string()));
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        let out = self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string());
        if self.corrupt_placeholders {
            return Ok(out.replace("MEDTOK", "MED TOK"));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
