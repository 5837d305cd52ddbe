//! Medicine-name dictionary: brand → generic, typo table, Turkish suffix
//! stripping and conservative fuzzy matching.

use std::collections::HashMap;

use crate::pipeline::text::fold_case;

/// Seed brand table (folded brand, generic). Multi-word products are
/// matched as n-grams before single words.
const BUILTIN_BRANDS: &[(&str, &str)] = &[
    // Paracetamol and combinations
    ("parol", "paracetamol"),
    ("tylol", "paracetamol"),
    ("minoset", "paracetamol"),
    ("vermidon", "paracetamol"),
    ("calpol", "paracetamol"),
    ("parasetamol", "paracetamol"),
    ("panadol", "paracetamol"),
    ("aferin", "paracetamol-caffeine"),
    ("aferin forte", "paracetamol-caffeine"),
    ("gripin", "paracetamol-phenylephrine-chlorpheniramine"),
    ("tylol hot", "paracetamol-combination"),
    ("theraflu", "paracetamol-combination"),
    ("fervex", "paracetamol-combination"),
    ("coldrex", "paracetamol-combination"),
    ("deflu", "paracetamol-pseudoephedrine"),
    // NSAIDs
    ("nurofen", "ibuprofen"),
    ("pedifen", "ibuprofen"),
    ("brufen", "ibuprofen"),
    ("dolven", "ibuprofen"),
    ("apranax", "naproxen"),
    ("naprosyn", "naproxen"),
    ("opraks", "naproxen"),
    ("voltaren", "diclofenac"),
    ("dikloron", "diclofenac"),
    ("diclomec", "diclofenac"),
    ("cataflam", "diclofenac"),
    ("majezik", "flurbiprofen"),
    ("arveles", "dexketoprofen"),
    ("dexofen", "dexketoprofen"),
    ("novalgin", "metamizole"),
    ("aspirin", "aspirin"),
    ("disprin", "aspirin"),
    ("ecopirin", "aspirin"),
    ("coraspin", "aspirin"),
    ("kardegic", "aspirin"),
    // Antibiotics
    ("augmentin", "amoxicillin-clavulanate"),
    ("amoklavin", "amoxicillin-clavulanate"),
    ("klamoks", "amoxicillin-clavulanate"),
    ("amoksisilin", "amoxicillin"),
    ("duocid", "ampicillin-sulbactam"),
    ("cipro", "ciprofloxacin"),
    ("ciproxin", "ciprofloxacin"),
    ("siprofloksasin", "ciprofloxacin"),
    ("klacid", "clarithromycin"),
    ("macrol", "clarithromycin"),
    ("azitromisin", "azithromycin"),
    ("zitromax", "azithromycin"),
    ("azro", "azithromycin"),
    ("cefaks", "cefuroxime"),
    ("suprax", "cefixime"),
    // Gastro
    ("nexium", "esomeprazole"),
    ("lansor", "lansoprazole"),
    ("controloc", "pantoprazole"),
    ("pantpas", "pantoprazole"),
    ("losec", "omeprazole"),
    ("gaviscon", "alginate-antacid"),
    ("rennie", "calcium-carbonate-antacid"),
    ("talcid", "hydrotalcite"),
    ("motilium", "domperidone"),
    ("metpamid", "metoclopramide"),
    ("buscopan", "hyoscine"),
    ("duspatalin", "mebeverine"),
    // Allergy and respiratory
    ("zyrtec", "cetirizine"),
    ("cetrin", "cetirizine"),
    ("allerset", "cetirizine"),
    ("aerius", "desloratadine"),
    ("xyzal", "levocetirizine"),
    ("telfast", "fexofenadine"),
    ("avil", "pheniramine"),
    ("otrivin", "xylometazoline"),
    ("iliadin", "oxymetazoline"),
    ("prospan", "ivy-leaf-extract"),
    ("mucosolvan", "ambroxol"),
    ("sudafed", "pseudoephedrine"),
    ("sinecod", "butamirate"),
    ("ventolin", "salbutamol"),
    ("seretide", "fluticasone-salmeterol"),
    ("symbicort", "budesonide-formoterol"),
    ("singulair", "montelukast"),
    ("pulmicort", "budesonide"),
    // Muscle relaxants
    ("muscoril", "thiocolchicoside"),
    ("myoril", "thiocolchicoside"),
    ("sirdalud", "tizanidine"),
    // Endocrine
    ("euthyrox", "levothyroxine"),
    ("levotiron", "levothyroxine"),
    ("tefor", "levothyroxine"),
    ("glucophage", "metformin"),
    ("metformin", "metformin"),
    ("diamicron", "gliclazide"),
    ("ozempic", "semaglutide"),
    ("wegovy", "semaglutide"),
    ("jardiance", "empagliflozin"),
    ("forxiga", "dapagliflozin"),
    ("januvia", "sitagliptin"),
    ("lantus", "insulin-glargine"),
    // Cardiovascular
    ("beloc", "metoprolol"),
    ("concor", "bisoprolol"),
    ("norvasc", "amlodipine"),
    ("lipitor", "atorvastatin"),
    ("crestor", "rosuvastatin"),
    ("coumadin", "warfarin"),
    ("plavix", "clopidogrel"),
    ("eliquis", "apixaban"),
    ("xarelto", "rivaroxaban"),
    ("pradaxa", "dabigatran"),
    // Psychiatric
    ("lexapro", "escitalopram"),
    ("cipralex", "escitalopram"),
    ("prozac", "fluoxetine"),
    ("lustral", "sertraline"),
    ("xanax", "alprazolam"),
    // Dermatology and supplements
    ("fucidin", "fusidic-acid"),
    ("bactroban", "mupirocin"),
    ("bepanthen", "dexpanthenol"),
    ("supradyn", "multivitamin"),
    ("centrum", "multivitamin"),
    ("berocca", "b-vitamins"),
];

/// Common misspellings → folded brand.
const BUILTIN_TYPOS: &[(&str, &str)] = &[
    ("paroll", "parol"),
    ("parool", "parol"),
    ("paral", "parol"),
    ("porol", "parol"),
    ("afeirin", "aferin"),
    ("afferin", "aferin"),
    ("afirin", "aferin"),
    ("eferin", "aferin"),
    ("aferrin", "aferin"),
    ("tilol", "tylol"),
    ("tyloll", "tylol"),
    ("taylol", "tylol"),
    ("apranaks", "apranax"),
    ("apranx", "apranax"),
    ("aprenax", "apranax"),
    ("apranex", "apranax"),
    ("norofen", "nurofen"),
    ("nurafen", "nurofen"),
    ("neurofen", "nurofen"),
    ("macezik", "majezik"),
    ("majezic", "majezik"),
    ("ogmentin", "augmentin"),
    ("agmentin", "augmentin"),
    ("augmantin", "augmentin"),
    ("giripin", "gripin"),
    ("gribin", "gripin"),
    ("arvales", "arveles"),
    ("arvelez", "arveles"),
    ("woltaren", "voltaren"),
    ("voltaran", "voltaren"),
    ("asprin", "aspirin"),
    ("novaljin", "novalgin"),
    ("novalcin", "novalgin"),
    ("novalgın", "novalgin"),
    ("euthrox", "euthyrox"),
    ("eutirox", "euthyrox"),
    ("ozempik", "ozempic"),
    ("ksarelto", "xarelto"),
    ("zarelto", "xarelto"),
];

/// Turkish case/plural suffixes, longest first. Bare `a`/`e` are left out
/// so that ordinary words ("parola") do not collapse onto a brand.
const TURKISH_SUFFIXES: &[&str] = &[
    "lerden", "lardan", "lerde", "larda", "lerin", "ların", "lere", "lara", "lerle", "larla",
    "leri", "ları", "ler", "lar", "ından", "inden", "undan", "ünden", "ında", "inde", "unda",
    "ünde", "ının", "inin", "unun", "ünün", "ına", "ine", "una", "üne", "ıyla", "iyle", "uyla",
    "üyle", "ını", "ini", "unu", "ünü", "dan", "den", "tan", "ten", "da", "de", "ta", "te", "ya",
    "ye", "ım", "im", "um", "üm", "ın", "in", "un", "ün", "sı", "si", "su", "sü", "mı", "mi", "mu",
    "mü", "ı", "i", "u", "ü",
];

/// Brands that are also everyday words and need a context check.
struct AmbiguousName {
    word: &'static str,
    non_medicine_phrases: &'static [&'static str],
    trailing_interjections: &'static [&'static str],
    medicine_cues: &'static [&'static str],
}

const AMBIGUOUS_NAMES: &[AmbiguousName] = &[AmbiguousName {
    word: "aferin",
    non_medicine_phrases: &[
        "aferin sana",
        "aferin size",
        "aferin ona",
        "aferin bana",
        "aferin bize",
        "aferin onlara",
        "aferin çocuğum",
        "aferin kızım",
        "aferin oğlum",
        "aferin be",
        "bravo",
        "tebrik",
        "helal olsun",
    ],
    trailing_interjections: &["ya", "valla"],
    medicine_cues: &[
        "alsam", "almalı", "alayım", "aldım", "alıyor", "almak", "alınır", "içsem", "içmeliyim",
        "içeyim", "içtim", "içiyor", "içmek", "içilir", "kullansam", "kullanmalı", "kullandım",
        "kullanıyor", "kullanılır", "mg", "tablet", "hap", "şurup", "doz", "günde", "saatte",
        "ağrı", "ateş", "baş", "kafa", "grip", "reçete", "doktor", "eczane", "ilaç", "forte",
        "plus", "cold", "hot", "neden", "nasıl", "faydası", "etkisi", "yan etki", "zararlı",
        "işe yarar",
    ],
}];

const SHORT_TEXT_HEALTH_HINTS: &[&str] = &[
    "ağrı", "agri", "ateş", "ates", "hasta", "ilaç", "ilac", "doktor", "eczane", "baş", "bas",
    "grip", "nezle",
];

/// A resolved dictionary hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineMatch {
    /// Folded canonical brand ("parol").
    pub canonical: String,
    /// English generic name ("paracetamol").
    pub generic: String,
}

/// Brand dictionary with typo and fuzzy lookup.
#[derive(Debug, Clone)]
pub struct MedicineDictionary {
    brands: Vec<(String, String)>,
    by_brand: HashMap<String, usize>,
    typos: HashMap<String, String>,
    max_ngram: usize,
}

impl MedicineDictionary {
    /// Build from (brand, generic) and (typo, brand) pairs. Keys are folded.
    pub fn from_pairs<'a>(
        brands: impl IntoIterator<Item = (&'a str, &'a str)>,
        typos: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut list: Vec<(String, String)> = Vec::new();
        let mut by_brand = HashMap::new();
        let mut max_ngram = 1;

        for (brand, generic) in brands {
            let key = fold_case(brand.trim());
            if key.is_empty() || by_brand.contains_key(&key) {
                continue;
            }
            max_ngram = max_ngram.max(key.split_whitespace().count());
            by_brand.insert(key.clone(), list.len());
            list.push((key, generic.to_string()));
        }

        let typos = typos
            .into_iter()
            .map(|(typo, brand)| (fold_case(typo), fold_case(brand)))
            .filter(|(_, brand)| by_brand.contains_key(brand))
            .collect();

        Self {
            brands: list,
            by_brand,
            typos,
            max_ngram: max_ngram.min(3),
        }
    }

    /// The seed dictionary shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_pairs(
            BUILTIN_BRANDS.iter().copied(),
            BUILTIN_TYPOS.iter().copied(),
        )
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }

    /// Longest multi-word product name, capped at 3 tokens.
    pub fn max_ngram(&self) -> usize {
        self.max_ngram
    }

    /// Exact lookup of a folded, single-space-joined phrase.
    pub fn lookup_exact(&self, folded: &str) -> Option<MedicineMatch> {
        self.by_brand.get(folded).map(|&idx| {
            let (canonical, generic) = &self.brands[idx];
            MedicineMatch {
                canonical: canonical.clone(),
                generic: generic.clone(),
            }
        })
    }

    /// Generic name for a brand or typo.
    pub fn generic_for(&self, name: &str) -> Option<String> {
        let folded = fold_case(name.trim());
        let brand = self.typos.get(&folded).cloned().unwrap_or(folded);
        self.lookup_exact(&brand).map(|m| m.generic)
    }

    /// Resolve one folded word: typo table, exact brand, suffix-stripped
    /// candidates, then fuzzy match.
    pub fn match_word(&self, folded: &str) -> Option<MedicineMatch> {
        if folded.chars().count() < 3 {
            return None;
        }

        if let Some(brand) = self.typos.get(folded) {
            return self.lookup_exact(brand);
        }
        if let Some(hit) = self.lookup_exact(folded) {
            return Some(hit);
        }

        let candidates = suffix_candidates(folded);
        for candidate in candidates.iter().skip(1) {
            if let Some(hit) = self.lookup_exact(candidate) {
                return Some(hit);
            }
            if let Some(brand) = self.typos.get(candidate) {
                return self.lookup_exact(brand);
            }
        }

        self.fuzzy_match(&candidates)
    }

    /// Closest single-word brand within the length-scaled edit budget.
    /// Brands of five letters or fewer only match through the typo table.
    /// Ties at the best distance are rejected.
    fn fuzzy_match(&self, candidates: &[String]) -> Option<MedicineMatch> {
        let mut best: Option<usize> = None;
        let mut best_distance = u32::MAX;
        let mut ambiguous = false;

        for candidate in candidates {
            let cand_len = candidate.chars().count();
            if cand_len < 4 {
                continue;
            }
            let cand_head: String = candidate.chars().take(2).collect();

            for (idx, (brand, _)) in self.brands.iter().enumerate() {
                if brand.contains(' ') {
                    continue;
                }
                let brand_len = brand.chars().count();
                if brand_len < 4 {
                    continue;
                }
                // Typos rarely touch the first two letters.
                if !brand.starts_with(&cand_head) {
                    continue;
                }

                let budget = match cand_len.min(brand_len) {
                    0..=5 => 0,
                    6..=7 => 1,
                    _ => 2,
                };
                if budget == 0 {
                    continue;
                }
                if (cand_len as i64 - brand_len as i64).unsigned_abs() > budget {
                    continue;
                }

                let dist = edit_distance(candidate, brand);
                if dist as u64 > budget {
                    continue;
                }
                if dist < best_distance {
                    best_distance = dist;
                    best = Some(idx);
                    ambiguous = false;
                } else if dist == best_distance && best != Some(idx) {
                    ambiguous = true;
                }
            }
        }

        if ambiguous {
            return None;
        }
        best.map(|idx| {
            let (canonical, generic) = &self.brands[idx];
            MedicineMatch {
                canonical: canonical.clone(),
                generic: generic.clone(),
            }
        })
    }

    /// Whether an everyday-word brand ("aferin" = "well done") is used as a
    /// medicine in this text. Non-ambiguous brands always pass.
    pub fn is_medicine_context(&self, canonical: &str, full_text: &str) -> bool {
        let Some(entry) = AMBIGUOUS_NAMES.iter().find(|a| a.word == canonical) else {
            return true;
        };

        let text = fold_case(full_text);
        if entry.non_medicine_phrases.iter().any(|p| text.contains(p)) {
            return false;
        }

        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if let [.., last_two, last] = words.as_slice() {
            if *last_two == entry.word && entry.trailing_interjections.contains(last) {
                return false;
            }
        }

        if entry.medicine_cues.iter().any(|cue| text.contains(cue)) {
            return true;
        }

        if words.len() == 1 && words[0] == entry.word {
            return false;
        }

        let has_hint = SHORT_TEXT_HEALTH_HINTS.iter().any(|h| text.contains(h));
        !(words.len() <= 3 && !has_hint)
    }
}

impl Default for MedicineDictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Progressive suffix-stripping candidates, the word itself first.
fn suffix_candidates(word: &str) -> Vec<String> {
    let mut candidates = vec![word.to_string()];
    let mut current = word.to_string();

    for _ in 0..3 {
        let current_len = current.chars().count();
        let stripped = TURKISH_SUFFIXES.iter().find_map(|suffix| {
            let suffix_len = suffix.chars().count();
            if current.ends_with(suffix) && current_len > suffix_len + 2 {
                Some(current[..current.len() - suffix.len()].to_string())
            } else {
                None
            }
        });

        match stripped {
            Some(s) => {
                if !candidates.contains(&s) {
                    candidates.push(s.clone());
                }
                current = s;
            }
            None => break,
        }
    }

    candidates
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n as u32;
    }
    if n == 0 {
        return m as u32;
    }

    let mut prev: Vec<u32> = (0..=n as u32).collect();
    let mut curr = vec![0u32; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = (i + 1) as u32;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> MedicineDictionary {
        MedicineDictionary::builtin()
    }

    #[test]
    fn exact_brand_resolves_to_generic() {
        let hit = dict().match_word("parol").unwrap();
        assert_eq!(hit.canonical, "parol");
        assert_eq!(hit.generic, "paracetamol");
    }

    #[test]
    fn typo_table_resolves() {
        assert_eq!(dict().match_word("apranaks").unwrap().canonical, "apranax");
        assert_eq!(dict().match_word("ogmentin").unwrap().generic, "amoxicillin-clavulanate");
    }

    #[test]
    fn suffix_stripped_brand_resolves() {
        assert_eq!(dict().match_word("parolü").unwrap().canonical, "parol");
        assert_eq!(dict().match_word("voltarenden").unwrap().canonical, "voltaren");
    }

    #[test]
    fn fuzzy_match_within_budget() {
        // one substitution on a 8-letter brand
        assert_eq!(dict().match_word("voltaron").unwrap().canonical, "voltaren");
    }

    #[test]
    fn fuzzy_requires_same_first_two_letters() {
        assert!(dict().match_word("baroll").is_none());
    }

    #[test]
    fn ordinary_words_do_not_match() {
        for word in ["başım", "ağrıyor", "parola", "bugün", "doktor"] {
            assert!(dict().match_word(word).is_none(), "{word} matched");
        }
    }

    #[test]
    fn short_words_never_match() {
        assert!(dict().match_word("pa").is_none());
    }

    #[test]
    fn multiword_products_set_max_ngram() {
        let d = dict();
        assert_eq!(d.max_ngram(), 2);
        assert!(d.lookup_exact("aferin forte").is_some());
    }

    #[test]
    fn generic_for_accepts_typos() {
        assert_eq!(dict().generic_for("Paroll").as_deref(), Some("paracetamol"));
        assert_eq!(dict().generic_for("unknown"), None);
    }

    #[test]
    fn aferin_as_praise_is_not_medicine() {
        let d = dict();
        assert!(!d.is_medicine_context("aferin", "Aferin sana!"));
        assert!(!d.is_medicine_context("aferin", "aferin"));
        assert!(!d.is_medicine_context("aferin", "çok iyi aferin ya"));
    }

    #[test]
    fn aferin_with_medicine_cue_is_medicine() {
        let d = dict();
        assert!(d.is_medicine_context("aferin", "Başım ağrıyor aferin alsam olur mu"));
        assert!(d.is_medicine_context("aferin", "günde kaç aferin içilir"));
    }

    #[test]
    fn unambiguous_brand_always_in_context() {
        assert!(dict().is_medicine_context("parol", "parol"));
    }

    #[test]
    fn edit_distance_basic() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("ağrı", "ağrı"), 0);
        assert_eq!(edit_distance("voltaren", "voltaron"), 1);
    }

    #[test]
    fn suffix_candidates_strip_progressively() {
        let c = suffix_candidates("parollerden");
        assert_eq!(c[0], "parollerden");
        assert!(c.contains(&"parol".to_string()));
    }
}
