//! Word-level tokenization shared by the classifier, mask and retriever.
//!
//! Every matcher in the pipeline works on the same span list so that
//! "whole word" means the same thing everywhere: a maximal run of
//! alphanumeric characters (plus `_`). Spans keep byte offsets into the
//! original text, which is what makes mask/unmask reversible.

/// A word in the source text with its case-folded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// Case-folded word used for lookups.
    pub folded: String,
}

impl WordSpan {
    pub fn surface<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }
}

/// Clause boundaries stop negation scope and phrase matching.
pub fn is_clause_break(ch: char) -> bool {
    matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | '\n')
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Case-fold with the Turkish dotted capital handled explicitly.
///
/// `İ` lowercases to `i` + combining dot under Unicode rules, which breaks
/// dictionary lookups, so it is mapped straight to `i`.
pub fn fold_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == 'İ' {
            out.push('i');
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Split text into word spans.
pub fn word_spans(text: &str) -> Vec<WordSpan> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if is_word_char(ch) {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            spans.push(WordSpan {
                start: s,
                end: idx,
                folded: fold_case(&text[s..idx]),
            });
        }
    }

    if let Some(s) = start {
        spans.push(WordSpan {
            start: s,
            end: text.len(),
            folded: fold_case(&text[s..]),
        });
    }

    spans
}

/// True when a clause break sits between two spans.
pub fn clause_break_between(text: &str, left: &WordSpan, right: &WordSpan) -> bool {
    if left.end >= right.start {
        return false;
    }
    text[left.end..right.start].chars().any(is_clause_break)
}

/// Folded tokens of a phrase ("Göğüs ağrısı" → ["göğüs", "ağrısı"]).
pub fn phrase_tokens(phrase: &str) -> Vec<String> {
    word_spans(phrase).into_iter().map(|w| w.folded).collect()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_words_with_offsets() {
        let text = "Parol, 500mg içtim.";
        let spans = word_spans(text);
        let words: Vec<&str> = spans.iter().map(|s| s.surface(text)).collect();
        assert_eq!(words, vec!["Parol", "500mg", "içtim"]);
        assert_eq!(spans[0].folded, "parol");
    }

    #[test]
    fn turkish_dotted_capital_folds_to_plain_i() {
        assert_eq!(fold_case("İbuprofen"), "ibuprofen");
        assert_eq!(fold_case("İNTİHAR"), "intihar");
    }

    #[test]
    fn clause_break_detected_between_spans() {
        let text = "no fever, chest pain";
        let spans = word_spans(text);
        assert!(clause_break_between(text, &spans[1], &spans[2]));
        assert!(!clause_break_between(text, &spans[0], &spans[1]));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("ağrı var", 3), "ağr");
        assert_eq!(truncate_chars("kısa", 10), "kısa");
    }

    #[test]
    fn phrase_tokens_fold_each_word() {
        assert_eq!(phrase_tokens("Göğüs Ağrısı"), vec!["göğüs", "ağrısı"]);
    }
}
