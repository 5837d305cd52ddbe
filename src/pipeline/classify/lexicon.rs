//! Phrase tables and the token-sequence matcher the classifier runs them
//! through.
//!
//! Turkish is agglutinative: "ağrı" has to hit "ağrıyor", "ağrısı" and
//! "ağrım". Pattern tokens of four or more letters therefore match as word
//! prefixes (stems); shorter tokens must match the whole word so that "kan"
//! does not fire on "kanal".

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::text::{clause_break_between, phrase_tokens, WordSpan};

const STEM_MIN_CHARS: usize = 4;

/// How pattern tokens compare against words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Long tokens match as stems, short tokens exactly.
    Stem,
    /// Every token must equal the word.
    Exact,
}

/// A folded token sequence.
#[derive(Debug, Clone)]
pub struct Phrase {
    pub text: &'static str,
    tokens: Vec<String>,
    mode: MatchMode,
}

impl Phrase {
    pub fn new(text: &'static str, mode: MatchMode) -> Self {
        Self {
            text,
            tokens: phrase_tokens(text),
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn token_matches(&self, pattern: &str, word: &str) -> bool {
        match self.mode {
            MatchMode::Exact => pattern == word,
            MatchMode::Stem => {
                if pattern.chars().count() >= STEM_MIN_CHARS {
                    word.starts_with(pattern)
                } else {
                    pattern == word
                }
            }
        }
    }

    /// Does the phrase match starting at span `at` without crossing a
    /// clause boundary?
    pub fn matches_at(&self, text: &str, spans: &[WordSpan], at: usize) -> bool {
        let n = self.tokens.len();
        if n == 0 || at + n > spans.len() {
            return false;
        }
        let window = &spans[at..at + n];
        if window
            .windows(2)
            .any(|pair| clause_break_between(text, &pair[0], &pair[1]))
        {
            return false;
        }
        self.tokens
            .iter()
            .zip(window)
            .all(|(pattern, span)| self.token_matches(pattern, &span.folded))
    }

    /// Span index ranges `[start, end)` of every match.
    pub fn find_all(&self, text: &str, spans: &[WordSpan]) -> Vec<(usize, usize)> {
        (0..spans.len())
            .filter(|&at| self.matches_at(text, spans, at))
            .map(|at| (at, at + self.tokens.len()))
            .collect()
    }

    /// True if the phrase occurs entirely inside span range `[from, to)`.
    pub fn occurs_within(&self, text: &str, spans: &[WordSpan], from: usize, to: usize) -> bool {
        let n = self.tokens.len();
        if n == 0 || to < from + n {
            return false;
        }
        (from..=to - n).any(|at| self.matches_at(text, spans, at))
    }
}

/// Build phrases from a static word list.
pub fn phrases(list: &[&'static str], mode: MatchMode) -> Vec<Phrase> {
    list.iter().map(|p| Phrase::new(p, mode)).collect()
}

/// Phrases from `set` that occur anywhere in the text.
pub fn matched<'p>(set: &'p [Phrase], text: &str, spans: &[WordSpan]) -> Vec<&'p Phrase> {
    set.iter()
        .filter(|p| !p.find_all(text, spans).is_empty())
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Health signals
// ═══════════════════════════════════════════════════════════

const HEALTH_TERMS: &[&str] = &[
    // Symptoms
    "ağrı", "acı", "acıyor", "sızı", "sancı", "yanma", "batma", "ateş", "titreme", "üşüme",
    "öksür", "hapşır", "burun akıntısı", "burun tıkanıklığı", "bulantı", "kusma", "kusuyorum",
    "kustum", "ishal", "kabız", "baş dönmesi", "başım dönüyor", "sersem", "bayılma", "halsiz",
    "yorgun", "kaşıntı", "kaşını", "döküntü", "kızarık", "şişlik", "şişti", "morarma", "nefes",
    "soluk", "ödem", "çarpıntı", "tansiyon", "uykusuz", "uyku problemi", "kilo kaybı",
    "iştahsız", "kanama", "kanıyor", "kan", "yara",
    // Conditions
    "hastalık", "hastayım", "rahatsız", "şikayet", "belirti", "semptom", "grip", "nezle",
    "soğuk algınlığı", "enfeksiyon", "virüs", "bakteri", "diyabet", "şeker hastalığı",
    "hipertansiyon", "astım", "bronşit", "zatürre", "kalp", "damar", "kolesterol", "kanser",
    "tümör", "alerji", "egzama", "sedef", "depresyon", "anksiyete", "kaygı", "stres",
    "panik atak", "migren", "vertigo", "gastrit", "ülser", "reflü", "böbrek", "karaciğer",
    "safra", "tiroid", "guatr", "artrit", "romatizma", "kireçlenme", "covid", "korona",
    // Care
    "tedavi", "ilaç", "hap", "şurup", "krem", "merhem", "doktor", "hekim", "hastane",
    "klinik", "acil", "ameliyat", "operasyon", "cerrahi", "tahlil", "tetkik", "röntgen",
    "tomografi", "ultrason", "aşı", "reçete", "antibiyotik", "ağrı kesici", "vitamin",
    "takviye", "tanı", "teşhis", "kronik", "akut", "bağışıklık",
    // Body
    "başım", "karnım", "midem", "mide", "boğaz", "bademcik", "kulak", "gözüm", "göz", "burnum",
    "dişim", "diş", "akciğer", "bağırsak", "eklem", "kas", "kemik", "omurga", "belim", "sırtım",
    "dizim", "cilt", "deri", "saç dökülme",
    // Questions
    "doktora gitmeli", "tehlikeli mi", "normal mi", "endişelen", "ciddi mi", "bulaşıcı mı",
    "geçer mi", "iyi gelir", "zararlı mı", "yan etki",
    // English, for L2 text and mixed input
    "pain", "ache", "headache", "fever", "cough", "nausea", "vomit", "dizzy", "dizziness",
    "tired", "fatigue", "sick", "hurt", "symptom", "medicine", "medication", "doctor",
    "breath", "chest", "bleeding", "rash", "swelling", "allergy", "infection",
];

static HEALTH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"ne\s+yapmalı",
        r"doktora\s+git",
        r"tedavi\s+(?:ne|nasıl)",
        r"ilaç\s+(?:öner|kullan)",
        r"(?:bu|şu)\s+normal\s+mi",
        r"endişelen(?:meli|iyorum)",
        r"(?:ne|hangi)\s+(?:hastalık|rahatsızlık)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub static HEALTH_PHRASES: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(HEALTH_TERMS, MatchMode::Stem));

/// Number of health regex patterns hitting the folded text.
pub fn health_pattern_hits(folded: &str) -> usize {
    HEALTH_PATTERNS.iter().filter(|r| r.is_match(folded)).count()
}

// ═══════════════════════════════════════════════════════════
// Non-health signals
// ═══════════════════════════════════════════════════════════

/// Unambiguous off-topic markers.
const HARD_NON_HEALTH: &[&str] = &[
    "tarif", "yemek tarifi", "malzemeler", "pişir", "fırın", "tencere", "makarna", "pilav",
    "çorba tarifi", "kek", "pasta", "kurabiye", "yemek yap", "aşçı", "mutfak",
    "restoran önerisi", "maç skoru", "maç sonucu", "şampiyon", "futbol", "basketbol",
    "teknik direktör", "penaltı", "telefon önerisi", "bilgisayar önerisi", "laptop",
    "uygulama önerisi", "oyun önerisi", "yazılım", "programlama", "kod yaz", "python",
    "javascript", "hava durumu", "hava nasıl", "film önerisi", "dizi önerisi",
    "kitap önerisi", "müzik önerisi", "şarkı sözleri", "çeviri yap", "uçak bileti", "araba",
    "otomobil", "benzin", "politika", "seçim", "cumhurbaşkanı", "başbakan", "borsa", "dolar",
    "euro", "kripto", "bitcoin", "astroloji", "burç", "rüya tabiri", "kara delik", "gezegen",
    "uzay", "galaksi", "big bang", "nasa", "güneş sistemi", "asteroid", "kuyruklu yıldız",
    "denklem", "integral", "türev", "dünya savaşı", "osmanlı", "başkenti", "nüfusu kaç",
    "hangi kıtada", "recipe", "football", "weather", "movie", "stock market",
];

/// Off-topic markers that also appear in health talk ("tablet", "ne kadar").
const SOFT_NON_HEALTH: &[&str] = &[
    "tablet", "ne kadar", "fiyat", "ucuz", "pahalı", "ocak", "tava", "parti", "motor", "lig",
    "gol", "transfer", "tercüme", "seyahat", "tatil", "otel", "fal",
];

pub static HARD_NON_HEALTH_PHRASES: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(HARD_NON_HEALTH, MatchMode::Stem));

pub static SOFT_NON_HEALTH_PHRASES: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(SOFT_NON_HEALTH, MatchMode::Stem));

// ═══════════════════════════════════════════════════════════
// Emergency lexicon
// ═══════════════════════════════════════════════════════════

/// Red-flag phrases with the reason shown to the user.
pub const EMERGENCY_LEXICON: &[(&str, &str)] = &[
    // Cardiac
    ("göğüs ağrı", "Göğüs ağrısı kalp krizi belirtisi olabilir!"),
    ("göğsümde ağrı", "Göğüs ağrısı kalp krizi belirtisi olabilir!"),
    ("göğsüme baskı", "Göğüs baskısı kalp krizi belirtisi olabilir!"),
    ("koluma yayılan ağrı", "Kola yayılan ağrı kalp krizi belirtisi olabilir!"),
    ("çene ağrısı ve terleme", "Bu belirtiler kalp krizi işareti olabilir!"),
    ("chest pain", "Göğüs ağrısı kalp krizi belirtisi olabilir!"),
    ("heart attack", "Kalp krizi şüphesi acil müdahale gerektirir!"),
    // Stroke
    ("yüzüm uyuşuyor", "Ani yüz uyuşması felç belirtisi olabilir!"),
    ("kolum uyuşuyor", "Ani kol uyuşması felç belirtisi olabilir!"),
    ("konuşamıyorum", "Ani konuşma bozukluğu felç belirtisi olabilir!"),
    ("bir tarafım uyuşuyor", "Vücudun bir tarafında uyuşma felç belirtisi olabilir!"),
    ("felç", "Felç şüphesi acil müdahale gerektirir!"),
    ("stroke", "Felç şüphesi acil müdahale gerektirir!"),
    ("slurred speech", "Ani konuşma bozukluğu felç belirtisi olabilir!"),
    // Breathing
    ("nefes alamıyorum", "Nefes alamama acil müdahale gerektiren bir durumdur!"),
    ("boğuluyorum", "Boğulma hissi acil bir durumdur!"),
    ("nefessiz kaldım", "Nefes darlığı acil değerlendirme gerektirir!"),
    ("nefes almakta zorlanıyorum", "Nefes zorluğu acil değerlendirme gerektirir!"),
    ("can t breathe", "Nefes alamama acil müdahale gerektiren bir durumdur!"),
    ("cannot breathe", "Nefes alamama acil müdahale gerektiren bir durumdur!"),
    ("can not breathe", "Nefes alamama acil müdahale gerektiren bir durumdur!"),
    ("not breathing", "Nefes alamama acil müdahale gerektiren bir durumdur!"),
    ("difficulty breathing", "Nefes zorluğu acil değerlendirme gerektirir!"),
    ("choking", "Boğulma hissi acil bir durumdur!"),
    // Bleeding
    ("çok kan kaybediyorum", "Ciddi kanama acil müdahale gerektirir!"),
    ("kan durmuyor", "Durdurulamayan kanama acil müdahale gerektirir!"),
    ("severe bleeding", "Ciddi kanama acil müdahale gerektirir!"),
    ("bleeding heavily", "Ciddi kanama acil müdahale gerektirir!"),
    // Consciousness
    ("bayılıyorum", "Bayılma/bilinç kaybı acil değerlendirme gerektirir!"),
    ("bilincimi kaybediyorum", "Bilinç kaybı acil müdahale gerektirir!"),
    ("bilinç kaybı", "Bilinç kaybı acil müdahale gerektirir!"),
    ("unconscious", "Bilinç kaybı acil müdahale gerektirir!"),
    ("passed out", "Bayılma/bilinç kaybı acil değerlendirme gerektirir!"),
    ("loss of consciousness", "Bilinç kaybı acil müdahale gerektirir!"),
    // Anaphylaxis
    ("boğazım şişiyor", "Boğaz şişmesi anafilaksi belirtisi olabilir!"),
    ("dudaklarım şişiyor", "Dudak şişmesi ciddi alerjik reaksiyon olabilir!"),
    ("throat swelling", "Boğaz şişmesi anafilaksi belirtisi olabilir!"),
    // Other
    ("intihar", "İntihar düşüncesi acil psikolojik destek gerektirir!"),
    ("kendime zarar", "Kendinize zarar verme düşüncesi acil destek gerektirir!"),
    ("suicid", "İntihar düşüncesi acil psikolojik destek gerektirir!"),
    ("kill myself", "İntihar düşüncesi acil psikolojik destek gerektirir!"),
    ("self harm", "Kendinize zarar verme düşüncesi acil destek gerektirir!"),
    ("zehirlendim", "Zehirlenme acil müdahale gerektirir!"),
    ("overdose", "Aşırı doz acil müdahale gerektirir!"),
    ("kaza geçirdim", "Kaza sonrası acil değerlendirme gerekebilir!"),
    ("seizure", "Nöbet acil değerlendirme gerektirir!"),
];

/// Words that make a serious symptom urgent ("ani", "şiddetli").
pub const URGENCY_INDICATORS: &[&str] = &[
    "ani", "aniden", "şiddetli", "dayanılmaz", "çok kötü", "ilk kez", "hiç olmamıştı",
    "sudden", "suddenly", "unbearable", "worst",
];

/// Symptoms that become an emergency when paired with an urgency indicator.
pub const SERIOUS_SYMPTOMS: &[&str] = &[
    "ağrı", "baş dönmesi", "nefes", "uyuşma", "uyuşuyor", "görme", "bilinç", "pain",
    "dizziness", "breath", "numb", "vision", "consciousness",
];

pub const COMBINED_SYMPTOM_REASON: &str =
    "Belirttiğiniz semptomlar acil değerlendirme gerektirebilir!";

/// Negation cues that precede the negated finding.
pub const LEADING_NEGATIONS: &[&str] = &[
    "no", "not", "without", "never", "denies", "deny", "denied", "don t", "dont", "doesn t",
    "didn t", "haven t", "free of", "absence of", "negative for", "no sign of",
];

/// Turkish negation follows the finding ("göğüs ağrım yok").
pub const TRAILING_NEGATIONS: &[&str] = &[
    "yok", "yoktur", "değil", "değildir", "olmadı", "olmuyor", "hissetmiyorum", "yaşamadım",
];

/// Words that end negation scope the way punctuation does.
pub const SCOPE_BREAKERS: &[&str] = &[
    "but", "however", "although", "though", "ama", "fakat", "ancak", "lakin",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::text::word_spans;

    #[test]
    fn stem_tokens_match_suffixed_words() {
        let p = Phrase::new("ağrı", MatchMode::Stem);
        let text = "başım ağrıyor";
        assert_eq!(p.find_all(text, &word_spans(text)), vec![(1, 2)]);
    }

    #[test]
    fn short_tokens_match_whole_words_only() {
        let p = Phrase::new("kan", MatchMode::Stem);
        let text = "kanal değiştir";
        assert!(p.find_all(text, &word_spans(text)).is_empty());
        let text = "kan geldi";
        assert_eq!(p.find_all(text, &word_spans(text)).len(), 1);
    }

    #[test]
    fn phrases_do_not_cross_clause_breaks() {
        let p = Phrase::new("chest pain", MatchMode::Stem);
        let text = "my chest. pain elsewhere";
        assert!(p.find_all(text, &word_spans(text)).is_empty());
    }

    #[test]
    fn exact_mode_rejects_prefixes() {
        let p = Phrase::new("never", MatchMode::Exact);
        let text = "nevertheless";
        assert!(p.find_all(text, &word_spans(text)).is_empty());
    }

    #[test]
    fn apostrophe_contractions_tokenize_as_sequences() {
        let p = Phrase::new("can t breathe", MatchMode::Stem);
        let text = "I can't breathe";
        assert_eq!(p.find_all(text, &word_spans(text)), vec![(1, 4)]);
    }

    #[test]
    fn occurs_within_respects_bounds() {
        let p = Phrase::new("no", MatchMode::Exact);
        let text = "no chest pain";
        let spans = word_spans(text);
        assert!(p.occurs_within(text, &spans, 0, 1));
        assert!(!p.occurs_within(text, &spans, 1, 3));
    }

    #[test]
    fn health_patterns_fire_on_questions() {
        assert_eq!(health_pattern_hits("bu normal mi"), 1);
        assert_eq!(health_pattern_hits("bugün hava güzel"), 0);
    }

    #[test]
    fn lexicon_tables_are_non_empty() {
        assert!(HEALTH_PHRASES.len() > 100);
        assert!(EMERGENCY_LEXICON.iter().all(|(_, reason)| !reason.is_empty()));
    }
}
