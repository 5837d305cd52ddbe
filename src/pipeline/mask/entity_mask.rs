use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::dictionary::{MedicineDictionary, MedicineMatch};
use super::MaskError;
use crate::pipeline::text::{clause_break_between, word_spans, WordSpan};

/// Anything a translator could have produced from a placeholder: spacing,
/// hyphenation, case changes, a dropped index or a dropped `X`.
static PLACEHOLDER_SHAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)MED[\s_\-]*TOK[\s_\-]*\d*X?").unwrap());

/// The only shape unmask accepts.
static PLACEHOLDER_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^MEDTOK(\d+)X$").unwrap());

/// Placeholder text for the n-th masked entity.
pub fn placeholder(index: u32) -> String {
    format!("MEDTOK{index}X")
}

/// A protected span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedEntity {
    /// Exactly what the user typed.
    pub surface: String,
    /// Folded dictionary brand.
    pub canonical: String,
    /// English generic name.
    pub generic: String,
}

/// Placeholder index → protected span. Lives for one translation round-trip;
/// `mask_continuing` extends it so later passes never reuse an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMaskMap {
    entries: BTreeMap<u32, MaskedEntity>,
    next_index: u32,
}

impl EntityMaskMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&MaskedEntity> {
        self.entries.get(&index)
    }

    /// (placeholder, entity) in index order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &MaskedEntity)> {
        self.entries.iter().map(|(i, e)| (placeholder(*i), e))
    }

    /// Distinct generic names in first-seen order.
    pub fn generics(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for entity in self.entries.values() {
            if !out.contains(&entity.generic.as_str()) {
                out.push(&entity.generic);
            }
        }
        out
    }

    fn insert(&mut self, entity: MaskedEntity) -> String {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(index, entity);
        placeholder(index)
    }
}

/// How a placeholder is rendered back into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmaskStyle {
    /// The user's own spelling ("parol"). Used for L1 display text.
    Surface,
    /// The English generic ("paracetamol"). Used for the L2 shadow.
    Generic,
    /// "parol (paracetamol)".
    SurfaceWithGeneric,
}

impl UnmaskStyle {
    fn render(&self, entity: &MaskedEntity) -> String {
        match self {
            UnmaskStyle::Surface => entity.surface.clone(),
            UnmaskStyle::Generic => entity.generic.clone(),
            UnmaskStyle::SurfaceWithGeneric => {
                format!("{} ({})", entity.surface, entity.generic)
            }
        }
    }
}

/// A dictionary hit located in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedSpan {
    pub start: usize,
    pub end: usize,
    pub medicine: MedicineMatch,
}

/// Detects medicine names and swaps them for placeholders.
pub struct EntityMask {
    dictionary: MedicineDictionary,
}

impl EntityMask {
    pub fn new(dictionary: MedicineDictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &MedicineDictionary {
        &self.dictionary
    }

    /// Left to right over word spans; at each position the longest n-gram
    /// that resolves wins, then the scan resumes after it.
    pub fn detect(&self, text: &str) -> Vec<DetectedSpan> {
        let spans = word_spans(text);
        let mut found = Vec::new();
        let mut i = 0;

        while i < spans.len() {
            match self.longest_match_at(text, &spans, i) {
                Some((consumed, medicine)) => {
                    found.push(DetectedSpan {
                        start: spans[i].start,
                        end: spans[i + consumed - 1].end,
                        medicine,
                    });
                    i += consumed;
                }
                None => i += 1,
            }
        }

        found
    }

    fn longest_match_at(
        &self,
        text: &str,
        spans: &[WordSpan],
        at: usize,
    ) -> Option<(usize, MedicineMatch)> {
        let max_n = self.dictionary.max_ngram().min(spans.len() - at);

        for n in (2..=max_n).rev() {
            let window = &spans[at..at + n];
            if window
                .windows(2)
                .any(|pair| clause_break_between(text, &pair[0], &pair[1]))
            {
                continue;
            }
            let phrase = window
                .iter()
                .map(|w| w.folded.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(hit) = self.dictionary.lookup_exact(&phrase) {
                if self.dictionary.is_medicine_context(&hit.canonical, text) {
                    return Some((n, hit));
                }
            }
        }

        let hit = self.dictionary.match_word(&spans[at].folded)?;
        if self.dictionary.is_medicine_context(&hit.canonical, text) {
            Some((1, hit))
        } else {
            None
        }
    }

    pub fn contains_medicine(&self, text: &str) -> bool {
        !self.detect(text).is_empty()
    }

    /// Mask with a fresh map.
    pub fn mask(&self, text: &str) -> (String, EntityMaskMap) {
        let mut map = EntityMaskMap::default();
        let masked = self.mask_continuing(text, &mut map);
        (masked, map)
    }

    /// Mask into an existing map; new placeholders continue its numbering.
    pub fn mask_continuing(&self, text: &str, map: &mut EntityMaskMap) -> String {
        let detected = self.detect(text);
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        for span in detected {
            out.push_str(&text[cursor..span.start]);
            let token = map.insert(MaskedEntity {
                surface: text[span.start..span.end].to_string(),
                canonical: span.medicine.canonical,
                generic: span.medicine.generic,
            });
            out.push_str(&token);
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);

        tracing::debug!(entities = map.len(), "Masked medicine names");
        out
    }
}

impl Default for EntityMask {
    fn default() -> Self {
        Self::new(MedicineDictionary::builtin())
    }
}

/// Restore placeholders. Any placeholder-shaped token that is malformed or
/// not in the map fails the whole call.
pub fn unmask(text: &str, map: &EntityMaskMap, style: UnmaskStyle) -> Result<String, MaskError> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for m in PLACEHOLDER_SHAPED.find_iter(text) {
        let token = m.as_str();
        let index = PLACEHOLDER_EXACT
            .captures(token)
            .and_then(|caps| caps.get(1))
            .and_then(|digits| digits.as_str().parse::<u32>().ok())
            .ok_or_else(|| MaskError::Corrupted(token.to_string()))?;
        let entity = map
            .get(index)
            .ok_or_else(|| MaskError::UnknownPlaceholder(token.to_string()))?;

        out.push_str(&text[cursor..m.start()]);
        out.push_str(&style.render(entity));
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);

    Ok(out)
}

/// Like `unmask`, but every placeholder in `expected` must still be present.
/// Used on translated user text, where a dropped placeholder means a
/// medicine silently vanished from the question.
pub fn unmask_expecting(
    text: &str,
    map: &EntityMaskMap,
    expected: &[String],
    style: UnmaskStyle,
) -> Result<String, MaskError> {
    let present = placeholders_in(text);
    if let Some(missing) = expected.iter().find(|p| !present.contains(p)) {
        return Err(MaskError::Missing(missing.clone()));
    }
    unmask(text, map, style)
}

/// Well-formed placeholders in `text`, normalised to upper case.
pub fn placeholders_in(text: &str) -> Vec<String> {
    PLACEHOLDER_SHAPED
        .find_iter(text)
        .filter(|m| PLACEHOLDER_EXACT.is_match(m.as_str()))
        .map(|m| m.as_str().to_uppercase())
        .collect()
}

/// Unmasks a token stream without ever splitting a placeholder across the
/// output: a tail that could still grow into a placeholder is held back
/// until the next push or `finish`.
pub struct StreamUnmasker<'m> {
    map: &'m EntityMaskMap,
    style: UnmaskStyle,
    pending: String,
}

impl<'m> StreamUnmasker<'m> {
    pub fn new(map: &'m EntityMaskMap, style: UnmaskStyle) -> Self {
        Self {
            map,
            style,
            pending: String::new(),
        }
    }

    /// Feed raw model output; returns the text that is safe to emit now.
    pub fn push(&mut self, piece: &str) -> Result<String, MaskError> {
        self.pending.push_str(piece);
        let cut = incomplete_placeholder_start(&self.pending).unwrap_or(self.pending.len());
        if cut == 0 {
            return Ok(String::new());
        }
        let ready: String = self.pending.drain(..cut).collect();
        unmask(&ready, self.map, self.style)
    }

    /// Flush whatever is held back. An unfinished placeholder here is
    /// corruption.
    pub fn finish(&mut self) -> Result<String, MaskError> {
        let rest = std::mem::take(&mut self.pending);
        unmask(&rest, self.map, self.style)
    }
}

const PLACEHOLDER_HEAD: &str = "MEDTOK";
const HOLDBACK_WINDOW: usize = 32;

/// Byte offset where a possibly-unfinished placeholder starts, if the text
/// ends with one.
fn incomplete_placeholder_start(text: &str) -> Option<usize> {
    let window_start = text
        .char_indices()
        .rev()
        .nth(HOLDBACK_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);

    text[window_start..]
        .char_indices()
        .filter(|(_, ch)| matches!(ch, 'M' | 'm'))
        .map(|(i, _)| window_start + i)
        .find(|&start| is_placeholder_prefix(&text[start..]))
}

fn is_placeholder_prefix(tail: &str) -> bool {
    let squashed: String = tail
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '_' || *c == '-'))
        .flat_map(char::to_uppercase)
        .collect();

    if squashed.len() <= PLACEHOLDER_HEAD.len() {
        return PLACEHOLDER_HEAD.starts_with(&squashed);
    }
    match squashed.strip_prefix(PLACEHOLDER_HEAD) {
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

// ═══════════════════════════════════════════════════════════
// English generic → Turkish generic
// ═══════════════════════════════════════════════════════════

/// Generic names the model tends to introduce on its own, with their
/// Turkish spelling.
const ENGLISH_TO_TURKISH_GENERICS: &[(&str, &str)] = &[
    ("paracetamol", "Parasetamol"),
    ("acetaminophen", "Parasetamol"),
    ("ibuprofen", "İbuprofen"),
    ("naproxen", "Naproksen"),
    ("aspirin", "Aspirin"),
    ("diclofenac", "Diklofenak"),
    ("amoxicillin", "Amoksisilin"),
    ("azithromycin", "Azitromisin"),
    ("ciprofloxacin", "Siprofloksasin"),
    ("metronidazole", "Metronidazol"),
    ("penicillin", "Penisilin"),
    ("doxycycline", "Doksisiklin"),
    ("omeprazole", "Omeprazol"),
    ("pantoprazole", "Pantoprazol"),
    ("ranitidine", "Ranitidin"),
    ("metoclopramide", "Metoklopramid"),
    ("cetirizine", "Setirizin"),
    ("loratadine", "Loratadin"),
    ("desloratadine", "Desloratadin"),
    ("fexofenadine", "Feksofenadin"),
    ("diphenhydramine", "Difenhidramin"),
    ("pseudoephedrine", "Psödoefedrin"),
    ("dextromethorphan", "Dekstrometorfan"),
    ("guaifenesin", "Guaifenesin"),
    ("metformin", "Metformin"),
    ("insulin", "İnsülin"),
    ("atorvastatin", "Atorvastatin"),
    ("lisinopril", "Lisinopril"),
    ("amlodipine", "Amlodipin"),
    ("losartan", "Losartan"),
    ("vitamin d", "D Vitamini"),
    ("vitamin c", "C Vitamini"),
    ("vitamin b12", "B12 Vitamini"),
    ("folic acid", "Folik Asit"),
    ("calcium", "Kalsiyum"),
    ("magnesium", "Magnezyum"),
];

static GENERIC_PHRASES: LazyLock<Vec<(Vec<String>, &'static str, &'static str)>> =
    LazyLock::new(|| {
        let mut phrases: Vec<_> = ENGLISH_TO_TURKISH_GENERICS
            .iter()
            .map(|(en, tr)| (crate::pipeline::text::phrase_tokens(en), *en, *tr))
            .collect();
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(b.1.len().cmp(&a.1.len())));
        phrases
    });

/// Rewrite English generic names in L1 text to their Turkish form.
/// Names inside parentheses are left alone, so "Parol (paracetamol)" stays
/// as written. With `keep_english` the result reads "Parasetamol (paracetamol)".
pub fn localize_generics(text: &str, keep_english: bool) -> String {
    let spans = word_spans(text);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut i = 0;

    while i < spans.len() {
        let hit = GENERIC_PHRASES.iter().find(|(tokens, _, _)| {
            i + tokens.len() <= spans.len()
                && tokens
                    .iter()
                    .zip(&spans[i..i + tokens.len()])
                    .all(|(t, s)| *t == s.folded)
        });

        match hit {
            Some((tokens, en, tr)) if !inside_parentheses(text, spans[i].start) => {
                let end = spans[i + tokens.len() - 1].end;
                out.push_str(&text[cursor..spans[i].start]);
                if keep_english {
                    out.push_str(&format!("{tr} ({en})"));
                } else {
                    out.push_str(tr);
                }
                cursor = end;
                i += tokens.len();
            }
            _ => i += 1,
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn inside_parentheses(text: &str, idx: usize) -> bool {
    let before = &text[..idx];
    match (before.rfind('('), before.rfind(')')) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}
