use serde::{Deserialize, Serialize};

use crate::session::Role;

use super::GenerationOptions;

/// Upper bound on generated tokens per turn.
pub const MAX_RESPONSE_TOKENS: u32 = 2048;

pub const SAFETY_SYSTEM_PROMPT: &str = r#"You are a health information assistant. You are NOT a doctor.

ABSOLUTE RULES:
1. Never diagnose. Never say "you have [condition]".
2. Never prescribe or give doses. Suggest discussing medicines with a doctor or pharmacist.
3. Base your answer on the reference information when it is provided and mention the source names you used.
4. If anything suggests a medical emergency, tell the user to call 112 immediately, before anything else.
5. Be calm, empathetic and concise. Do not create panic.
6. Only discuss health topics."#;

pub const PLACEHOLDER_RULE: &str = "Tokens of the form MEDTOK<number>X (for example MEDTOK0X) stand for medicine names. \
Copy every such token exactly as written. Never translate, split, reformat or explain the token itself.";

const FIRST_QUESTION_FORMAT: &str = r#"This is the user's FIRST question. Answer with this structure:

**Your concern:** 1-2 sentences acknowledging the concern.

**Possible Causes:**
• 3-4 common causes

**What You Can Do:**
• 3-4 safe, general recommendations

**Questions for You:**
• duration, severity, other symptoms

**⚠️ Warning Signs - See a Doctor If:**
• 3-4 red flags

Use bullet points (•) for every list and **bold** section headers."#;

const FOLLOW_UP_FORMAT: &str = r#"This is a FOLLOW-UP question. Answer it directly and briefly:
- 3-5 bullet points or 2-3 short paragraphs
- Do not repeat what was already said
- If the user reports new symptoms, say whether urgency changes"#;

const SENSITIVE_GUIDANCE: &str = r#"The topic is sensitive. Acknowledge the user's feelings before giving information, stay non-judgmental, never diagnose mental health conditions, and encourage professional support."#;

const CRISIS_GUIDANCE: &str = r#"The user may be in crisis. Lead with empathy, not medical information.
Start by acknowledging their feelings in 1-2 sentences, then list support options prominently:
• Emergency: 112 (24/7)
• Alo 183 social support line
• The nearest emergency room or mental health centre
Remind them they are not alone and that asking for help is a sign of strength. Never minimize their feelings."#;

const NO_REFERENCE_NOTE: &str = "No reference information was found for this question. Answer briefly from general health knowledge and recommend seeing a doctor for anything specific.";

/// Response tone chosen from the retrieved evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Normal,
    Sensitive,
    Crisis,
    Emergency,
}

impl ResponseMode {
    pub fn temperature(self) -> f32 {
        match self {
            Self::Normal => 0.7,
            Self::Sensitive => 0.5,
            Self::Crisis | Self::Emergency => 0.3,
        }
    }
}

/// Language the model is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerLanguage {
    /// English; the relay translates the answer once.
    #[default]
    English,
    /// Turkish directly, for streamed answers.
    Turkish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    pub role: Role,
    pub text: String,
}

/// Everything that goes into one generation call, in assembly order.
#[derive(Debug, Clone, Default)]
pub struct PromptParts {
    pub mode: ResponseMode,
    pub follow_up: bool,
    /// Set when the classifier flagged an emergency.
    pub emergency_flagged: bool,
    pub emergency_number: Option<String>,
    pub token_hints: Option<String>,
    pub evidence: Option<String>,
    pub history: Vec<HistoryLine>,
    pub user_text: String,
    pub symptom_context: Option<String>,
    pub answer_language: AnswerLanguage,
}

#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

impl PromptParts {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> RenderedPrompt {
        RenderedPrompt {
            system: self.system_prompt(),
            prompt: self.user_prompt(),
            options: GenerationOptions {
                temperature: self.mode.temperature(),
                max_tokens: MAX_RESPONSE_TOKENS,
            },
        }
    }

    fn system_prompt(&self) -> String {
        let mut sections = vec![SAFETY_SYSTEM_PROMPT.to_string()];

        let number = self.emergency_number.as_deref().unwrap_or("112");
        match self.mode {
            ResponseMode::Emergency => sections.push(emergency_guidance(number)),
            ResponseMode::Crisis => sections.push(CRISIS_GUIDANCE.to_string()),
            ResponseMode::Sensitive => sections.push(SENSITIVE_GUIDANCE.to_string()),
            ResponseMode::Normal => {}
        }
        if self.emergency_flagged && self.mode != ResponseMode::Emergency {
            sections.push(format!(
                "The user's message contains possible emergency warning signs. Open your answer by telling them to call {number} now if the symptoms are severe or getting worse."
            ));
        }

        if self.mode == ResponseMode::Normal || self.mode == ResponseMode::Sensitive {
            sections.push(if self.follow_up {
                FOLLOW_UP_FORMAT.to_string()
            } else {
                FIRST_QUESTION_FORMAT.to_string()
            });
        }

        if self.evidence.is_none() {
            sections.push(NO_REFERENCE_NOTE.to_string());
        }
        if self.token_hints.is_some() || self.user_text.contains("MEDTOK") {
            sections.push(PLACEHOLDER_RULE.to_string());
        }
        sections.push(match self.answer_language {
            AnswerLanguage::English => "Write your answer in English.".to_string(),
            AnswerLanguage::Turkish => {
                "Write your entire answer in fluent, natural Turkish. Do not use English words.".to_string()
            }
        });

        sections.join("\n\n")
    }

    fn user_prompt(&self) -> String {
        let mut prompt = String::new();

        if self.token_hints.is_some() || self.evidence.is_some() {
            prompt.push_str("=== REFERENCE INFORMATION ===\n");
            if let Some(hints) = &self.token_hints {
                prompt.push_str(hints);
                prompt.push_str("\n\n");
            }
            if let Some(evidence) = &self.evidence {
                prompt.push_str(evidence);
                prompt.push('\n');
            }
            prompt.push_str("=============================\n\n");
        }

        if !self.history.is_empty() {
            prompt.push_str("<CONVERSATION_HISTORY>\n");
            for line in &self.history {
                let role = match line.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{}: {}\n", role, line.text));
            }
            prompt.push_str("</CONVERSATION_HISTORY>\n\n");
        }

        prompt.push_str(&format!("User message: {}\n", self.user_text));

        if let Some(context) = &self.symptom_context {
            prompt.push_str("\n=== STRUCTURED SYMPTOM REPORT ===\n");
            prompt.push_str(context);
            prompt.push('\n');
        }

        prompt
    }
}

fn emergency_guidance(number: &str) -> String {
    format!(
        r#"The question matches EMERGENCY medical content. Your first priority is safety.
Answer with this structure:

🚨 **EMERGENCY WARNING**
• **Call {number} immediately** if: the specific emergency signs from the reference information

**While Waiting for Help:**
• 2-3 first aid steps

**Do NOT:**
• 1-2 things to avoid

Always start with the {number} advice. Keep instructions short and actionable."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> PromptParts {
        let mut p = PromptParts::new("I have a headache");
        p.evidence = Some("[RELEVANT MEDICAL INFO #1]\nTension headache".into());
        p.history = vec![
            HistoryLine {
                role: Role::User,
                text: "hello".into(),
            },
            HistoryLine {
                role: Role::Assistant,
                text: "Hi, how can I help?".into(),
            },
        ];
        p.symptom_context = Some("Region: head".into());
        p
    }

    #[test]
    fn sections_are_assembled_in_order() {
        let rendered = parts().render();
        let evidence = rendered.prompt.find("Tension headache").unwrap();
        let history = rendered.prompt.find("<CONVERSATION_HISTORY>").unwrap();
        let turn = rendered.prompt.find("User message: I have a headache").unwrap();
        let symptoms = rendered.prompt.find("Region: head").unwrap();
        assert!(evidence < history && history < turn && turn < symptoms);
    }

    #[test]
    fn system_prompt_leads_with_safety_rules() {
        let rendered = parts().render();
        assert!(rendered.system.starts_with(SAFETY_SYSTEM_PROMPT));
        assert!(rendered.system.contains("FIRST question"));
        assert!(rendered.system.ends_with("Write your answer in English."));
    }

    #[test]
    fn follow_up_uses_concise_format() {
        let mut p = parts();
        p.follow_up = true;
        let system = p.render().system;
        assert!(system.contains("FOLLOW-UP"));
        assert!(!system.contains("FIRST question"));
    }

    #[test]
    fn mode_sets_temperature_and_guidance() {
        let mut p = parts();
        p.mode = ResponseMode::Emergency;
        p.emergency_number = Some("112".into());
        let rendered = p.render();
        assert_eq!(rendered.options.temperature, 0.3);
        assert_eq!(rendered.options.max_tokens, MAX_RESPONSE_TOKENS);
        assert!(rendered.system.contains("Call 112 immediately"));

        p.mode = ResponseMode::Sensitive;
        assert_eq!(p.render().options.temperature, 0.5);
        p.mode = ResponseMode::Normal;
        assert_eq!(p.render().options.temperature, 0.7);
    }

    #[test]
    fn placeholder_rule_appears_with_masked_text() {
        let mut p = PromptParts::new("Can I take MEDTOK0X?");
        assert!(p.render().system.contains("MEDTOK<number>X"));
        p.user_text = "no medicine here".into();
        assert!(!p.render().system.contains("MEDTOK<number>X"));
    }

    #[test]
    fn missing_evidence_adds_note_and_no_reference_block() {
        let rendered = PromptParts::new("hi").render();
        assert!(rendered.system.contains("No reference information"));
        assert!(!rendered.prompt.contains("REFERENCE INFORMATION"));
    }

    #[test]
    fn turkish_answer_language() {
        let mut p = parts();
        p.answer_language = AnswerLanguage::Turkish;
        assert!(p.render().system.contains("natural Turkish"));
    }

    #[test]
    fn flagged_emergency_adds_directive() {
        let mut p = parts();
        p.emergency_flagged = true;
        assert!(p.render().system.contains("call 112 now"));
    }
}
