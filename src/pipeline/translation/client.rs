use serde::{Deserialize, Serialize};

use super::{Language, TranslationError, Translator};

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpTranslator {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, TranslationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TranslationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> TranslationError {
        if e.is_connect() {
            TranslationError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            TranslationError::Timeout(self.timeout_secs)
        } else {
            TranslationError::HttpClient(e.to_string())
        }
    }
}

impl Translator for HttpTranslator {
    fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<String, TranslationError> {
        let url = format!("{}/translate", self.base_url);
        let body = TranslateRequest {
            q: text,
            source: source.code(),
            target: target.code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TranslationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranslateResponse = response
            .json()
            .map_err(|e| TranslationError::ResponseParsing(e.to_string()))?;
        Ok(parsed.translated_text)
    }

    fn name(&self) -> &str {
        "libretranslate"
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_language_codes() {
        let body = TranslateRequest {
            q: "başım ağrıyor",
            source: Language::Turkish.code(),
            target: Language::English.code(),
            format: "text",
            api_key: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["source"], "tr");
        assert_eq!(json["target"], "en");
        assert!(json.get("api_key").is_none());
    }

    #[test]
    fn response_field_is_camel_case() {
        let parsed: TranslateResponse =
            serde_json::from_str(r#"{"translatedText":"my head hurts"}"#).unwrap();
        assert_eq!(parsed.translated_text, "my head hurts");
    }

    #[test]
    fn unreachable_service_fails() {
        let translator = HttpTranslator::new("http://127.0.0.1:9/", None, 2).unwrap();
        assert_eq!(translator.base_url(), "http://127.0.0.1:9");
        let err = translator
            .translate("merhaba", Language::Turkish, Language::English)
            .unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Connection(_)
                | TranslationError::Timeout(_)
                | TranslationError::HttpClient(_)
        ));
    }
}
