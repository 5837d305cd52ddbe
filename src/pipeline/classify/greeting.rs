use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::pipeline::text::word_spans;

use super::lexicon::{phrases, MatchMode, Phrase};

/// Small-talk categories, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreetingKind {
    Trust,
    HowAreYou,
    Thanks,
    Bye,
    Hello,
}

const TRUST: &[&str] = &[
    "sana güvenebilir miyim",
    "güvenilir misin",
    "sen doktor musun",
    "sen kimsin",
    "ne yapabilirsin",
    "yapay zeka mısın",
    "robot musun",
    "sen nesin",
    "are you a doctor",
    "can i trust you",
];

const HOW_ARE_YOU: &[&str] = &[
    "nasılsın",
    "naber",
    "nasıl gidiyor",
    "ne haber",
    "nabır",
    "ne var ne yok",
    "naptın",
    "how are you",
];

const THANKS: &[&str] = &[
    "teşekkür",
    "sağol",
    "sağ ol",
    "eyvallah",
    "thanks",
    "thank you",
];

const BYE: &[&str] = &[
    "görüşürüz",
    "hoşça kal",
    "hoşçakal",
    "bye",
    "bb",
    "iyi geceler",
    "kendine iyi bak",
];

const HELLO: &[&str] = &[
    "selam",
    "merhaba",
    "günaydın",
    "iyi günler",
    "iyi akşamlar",
    "hey",
    "sa",
    "slm",
    "mrb",
    "hello",
    "hi",
];

static GREETING_TABLE: LazyLock<Vec<(GreetingKind, Vec<Phrase>)>> = LazyLock::new(|| {
    vec![
        (GreetingKind::Trust, phrases(TRUST, MatchMode::Stem)),
        (GreetingKind::HowAreYou, phrases(HOW_ARE_YOU, MatchMode::Stem)),
        (GreetingKind::Thanks, phrases(THANKS, MatchMode::Stem)),
        (GreetingKind::Bye, phrases(BYE, MatchMode::Stem)),
        (GreetingKind::Hello, phrases(HELLO, MatchMode::Stem)),
    ]
});

/// Detect small talk. Trust questions win over "how are you", which wins
/// over thanks, goodbye and hello.
pub fn detect_greeting(text: &str) -> Option<GreetingKind> {
    let spans = word_spans(text);
    if spans.is_empty() {
        return None;
    }
    GREETING_TABLE.iter().find_map(|(kind, set)| {
        set.iter()
            .any(|p| !p.find_all(text, &spans).is_empty())
            .then_some(*kind)
    })
}

/// Canned L1 reply for a pure greeting.
pub fn greeting_response(kind: GreetingKind) -> &'static str {
    match kind {
        GreetingKind::Hello => {
            "Merhaba! 👋 Ben sağlık asistanınızım.\n\n\
             Size sağlıkla ilgili konularda yardımcı olabilirim:\n\
             - Semptomlarınızı değerlendirmek\n\
             - Hastalıklar hakkında bilgi vermek\n\
             - İlaçlar hakkında genel bilgi sunmak\n\n\
             Nasıl yardımcı olabilirim?"
        }
        GreetingKind::HowAreYou => {
            "Teşekkür ederim, iyiyim! 😊 Siz nasılsınız?\n\n\
             Sağlığınızla ilgili bir sorunuz veya şikayetiniz varsa yardımcı olmaya hazırım."
        }
        GreetingKind::Thanks => {
            "Rica ederim! 😊 Yardımcı olabildiysem ne mutlu.\n\n\
             Başka bir sağlık sorunuz olursa çekinmeden sorabilirsiniz. Geçmiş olsun!"
        }
        GreetingKind::Bye => {
            "Görüşmek üzere! 👋 Kendinize iyi bakın.\n\n\
             Şikayetleriniz devam ederse veya kötüleşirse lütfen bir doktora başvurun."
        }
        GreetingKind::Trust => {
            "Ben yapay zeka destekli bir sağlık bilgi asistanıyım, doktor değilim. 🤖\n\n\
             Yanıtlarım güvenilir tıbbi kaynaklardan derlenen bilgilere dayanır, ancak \
             kesin tanı veya tedavi önerisi yerine geçmez.\n\n\
             Ciddi veya devam eden şikayetlerde mutlaka bir sağlık profesyoneline danışın."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_hello() {
        assert_eq!(detect_greeting("Merhaba"), Some(GreetingKind::Hello));
        assert_eq!(detect_greeting("selamlar!"), Some(GreetingKind::Hello));
    }

    #[test]
    fn how_are_you_outranks_hello() {
        assert_eq!(
            detect_greeting("merhaba, nasılsın?"),
            Some(GreetingKind::HowAreYou)
        );
    }

    #[test]
    fn trust_question_has_highest_priority() {
        assert_eq!(
            detect_greeting("selam, sen doktor musun?"),
            Some(GreetingKind::Trust)
        );
    }

    #[test]
    fn thanks_and_bye() {
        assert_eq!(detect_greeting("çok teşekkürler"), Some(GreetingKind::Thanks));
        assert_eq!(detect_greeting("hoşça kal"), Some(GreetingKind::Bye));
    }

    #[test]
    fn short_tokens_need_whole_words() {
        assert_eq!(detect_greeting("sabah ateşim vardı"), None);
        assert_eq!(detect_greeting("hiç"), None);
    }

    #[test]
    fn responses_are_turkish_and_non_empty() {
        for kind in [
            GreetingKind::Trust,
            GreetingKind::HowAreYou,
            GreetingKind::Thanks,
            GreetingKind::Bye,
            GreetingKind::Hello,
        ] {
            assert!(!greeting_response(kind).is_empty());
        }
        assert!(greeting_response(GreetingKind::Trust).contains("doktor değilim"));
    }
}
