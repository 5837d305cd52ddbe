//! Evidence assembly for the prompt: ranked chunks become a bounded
//! reference block, placeholders get a generic-name legend, and the safety
//! fields of the top chunks pick the response mode.

use crate::pipeline::mask::EntityMaskMap;
use crate::pipeline::retrieval::{RankedChunk, SeverityTier};

use super::ResponseMode;

/// Rough token estimate used for the evidence budget.
const CHARS_PER_TOKEN: usize = 4;

/// Minimum room worth spending on a truncated chunk.
const MIN_PARTIAL_CHARS: usize = 200;

pub const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 2_500;

const EMERGENCY_TOP_SCORE: f32 = 0.75;
const EMERGENCY_SECOND_SCORE: f32 = 0.6;

const CRISIS_TITLE_MARKERS: &[&str] = &[
    "suicid",
    "self-harm",
    "self harm",
    "intihar",
    "kendine zarar",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledEvidence {
    pub text: String,
    /// Chunk ids that made it into the block, best first.
    pub included: Vec<String>,
    pub estimated_tokens: usize,
}

impl AssembledEvidence {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }
}

/// Build the reference block from ranked chunks, most relevant first,
/// stopping once `budget_tokens` is spent. The last chunk may be cut short
/// at a character boundary when enough room remains.
pub fn assemble_evidence(ranked: &[RankedChunk<'_>], budget_tokens: usize) -> AssembledEvidence {
    let budget_chars = budget_tokens * CHARS_PER_TOKEN;
    let mut text = String::new();
    let mut included = Vec::new();

    for (i, rc) in ranked.iter().enumerate() {
        let entry = format_entry(i + 1, rc);
        let used = text.chars().count();
        let remaining = budget_chars.saturating_sub(used);

        if entry.chars().count() <= remaining {
            text.push_str(&entry);
            included.push(rc.chunk.id.clone());
            continue;
        }

        if remaining >= MIN_PARTIAL_CHARS {
            let cut: String = entry.chars().take(remaining.saturating_sub(4)).collect();
            text.push_str(&cut);
            text.push_str("...\n");
            included.push(rc.chunk.id.clone());
        }
        break;
    }

    let estimated_tokens = text.chars().count().div_ceil(CHARS_PER_TOKEN);
    tracing::debug!(
        chunks = included.len(),
        estimated_tokens,
        "Evidence assembled"
    );

    AssembledEvidence {
        text: text.trim_end().to_string(),
        included,
        estimated_tokens,
    }
}

fn format_entry(rank: usize, rc: &RankedChunk<'_>) -> String {
    let chunk = rc.chunk;
    let mut entry = format!(
        "[RELEVANT MEDICAL INFO #{rank}]\nTopic: {}\nCategory: {}\nSource: {}\n",
        chunk.title, chunk.category, chunk.source_name
    );
    if !chunk.safety.red_flags.is_empty() {
        entry.push_str(&format!(
            "Red flags: {}\n",
            chunk.safety.red_flags.join(", ")
        ));
    }
    if !chunk.safety.contraindications.is_empty() {
        entry.push_str(&format!(
            "Contraindications: {}\n",
            chunk.safety.contraindications.join(", ")
        ));
    }
    entry.push_str(&chunk.body);
    entry.push_str("\n\n");
    entry
}

/// Legend explaining each placeholder's generic name, `None` for an empty map.
pub fn token_hints(map: &EntityMaskMap) -> Option<String> {
    if map.is_empty() {
        return None;
    }
    let mut hints = String::from("=== MEDICATION TOKEN MAPPING ===\n");
    for (token, entity) in map.iter() {
        hints.push_str(&format!(
            "{token} = a medicine whose active ingredient is {}\n",
            entity.generic
        ));
    }
    hints.push_str(
        "Use the reference information about the active ingredient when answering about the token. \
Always refer to the medicine by its token.",
    );
    Some(hints)
}

/// Response mode implied by the top-ranked chunks' safety tiers.
pub fn select_mode(ranked: &[RankedChunk<'_>]) -> ResponseMode {
    let emergency = ranked.iter().take(2).enumerate().any(|(i, rc)| {
        let needed = if i == 0 {
            EMERGENCY_TOP_SCORE
        } else {
            EMERGENCY_SECOND_SCORE
        };
        rc.chunk.safety.severity_tier == SeverityTier::Emergency && rc.semantic >= needed
    });
    if emergency {
        return ResponseMode::Emergency;
    }

    let crisis = ranked.iter().take(2).any(|rc| {
        let title = rc.chunk.title.to_lowercase();
        rc.chunk.safety.severity_tier == SeverityTier::Sensitive
            && CRISIS_TITLE_MARKERS.iter().any(|m| title.contains(m))
    });
    if crisis {
        return ResponseMode::Crisis;
    }

    let sensitive = ranked.iter().take(2).any(|rc| {
        rc.chunk.safety.severity_tier == SeverityTier::Sensitive
            || rc.chunk.category == "mental_health"
    });
    if sensitive {
        ResponseMode::Sensitive
    } else {
        ResponseMode::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mask::EntityMask;
    use crate::pipeline::retrieval::{KnowledgeChunk, SafetyFields};

    fn chunk(id: &str, title: &str, tier: SeverityTier, body: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            title: title.into(),
            title_l1: None,
            body: body.into(),
            category: "general".into(),
            keywords: Default::default(),
            embedding: vec![],
            source_name: "MedlinePlus".into(),
            source_url: None,
            safety: SafetyFields {
                severity_tier: tier,
                ..SafetyFields::default()
            },
        }
    }

    fn ranked(chunk: &KnowledgeChunk, semantic: f32) -> RankedChunk<'_> {
        RankedChunk {
            chunk,
            relevance: semantic,
            semantic,
            keyword_hits: 0,
            position: 0,
        }
    }

    #[test]
    fn evidence_is_numbered_in_rank_order() {
        let a = chunk("a", "Headache", SeverityTier::General, "Rest and fluids.");
        let b = chunk("b", "Migraine", SeverityTier::General, "Dark room.");
        let evidence = assemble_evidence(&[ranked(&a, 0.9), ranked(&b, 0.8)], 2_500);
        assert_eq!(evidence.included, vec!["a", "b"]);
        let first = evidence.text.find("#1]\nTopic: Headache").unwrap();
        let second = evidence.text.find("#2]\nTopic: Migraine").unwrap();
        assert!(first < second);
        assert!(evidence.text.contains("Source: MedlinePlus"));
    }

    #[test]
    fn budget_truncates_and_drops_the_tail() {
        let long = "x".repeat(3_000);
        let a = chunk("a", "A", SeverityTier::General, &long);
        let b = chunk("b", "B", SeverityTier::General, &long);
        let c = chunk("c", "C", SeverityTier::General, "short");
        let evidence = assemble_evidence(
            &[ranked(&a, 0.9), ranked(&b, 0.8), ranked(&c, 0.7)],
            1_000,
        );
        assert_eq!(evidence.included, vec!["a", "b"]);
        assert!(evidence.text.chars().count() <= 4_000);
        assert!(evidence.text.ends_with("..."));
    }

    #[test]
    fn empty_ranking_gives_empty_evidence() {
        let evidence = assemble_evidence(&[], 2_500);
        assert!(evidence.is_empty());
        assert_eq!(evidence.estimated_tokens, 0);
    }

    #[test]
    fn hints_list_generics_per_placeholder() {
        let mask = EntityMask::default();
        let (_, map) = mask.mask("parol ve augmentin");
        let hints = token_hints(&map).unwrap();
        assert!(hints.contains("MEDTOK0X = a medicine whose active ingredient is paracetamol"));
        assert!(hints.contains("MEDTOK1X"));
        assert!(token_hints(&EntityMaskMap::default()).is_none());
    }

    #[test]
    fn mode_follows_safety_tiers() {
        let emergency = chunk("e", "Heart attack", SeverityTier::Emergency, "");
        let crisis = chunk("s", "Suicide prevention", SeverityTier::Sensitive, "");
        let sensitive = chunk("m", "Anxiety", SeverityTier::Sensitive, "");
        let plain = chunk("p", "Cold", SeverityTier::General, "");

        assert_eq!(select_mode(&[ranked(&emergency, 0.8)]), ResponseMode::Emergency);
        assert_eq!(select_mode(&[ranked(&emergency, 0.7)]), ResponseMode::Normal);
        assert_eq!(
            select_mode(&[ranked(&plain, 0.9), ranked(&emergency, 0.65)]),
            ResponseMode::Emergency
        );
        assert_eq!(select_mode(&[ranked(&crisis, 0.5)]), ResponseMode::Crisis);
        assert_eq!(select_mode(&[ranked(&sensitive, 0.5)]), ResponseMode::Sensitive);
        assert_eq!(select_mode(&[ranked(&plain, 0.9)]), ResponseMode::Normal);
        assert_eq!(select_mode(&[]), ResponseMode::Normal);
    }
}
