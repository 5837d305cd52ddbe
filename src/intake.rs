//! Structured symptom intake.
//!
//! The intake wizard walks `idle → region_selected → symptom_selected →
//! severity_set → intake_complete → chat`. Entering `chat` hands back the
//! finished [`SymptomReport`] exactly once; the session turns it into the
//! first user turn with [`SymptomReport::to_turn_text`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SEVERITY: u8 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    #[error("Event {event} is not allowed in state {state}")]
    InvalidTransition { state: IntakeState, event: &'static str },

    #[error("Severity must be between 0 and 10, got {0}")]
    SeverityOutOfRange(u8),

    #[error("Onset is required to complete intake")]
    OnsetRequired,

    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),
}

// ═══════════════════════════════════════════════════════════
// SymptomReport
// ═══════════════════════════════════════════════════════════

/// Structured symptom data collected by the intake wizard or sent by a
/// client alongside a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymptomReport {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub symptom: Option<String>,
    #[serde(default, alias = "severity_0_10")]
    pub severity: Option<u8>,
    #[serde(default)]
    pub onset: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SymptomReport {
    /// Turkish first-turn text. Field order is fixed: location and
    /// symptom, severity, onset, red flags, then trigger and notes.
    pub fn to_turn_text(&self) -> String {
        let mut sentences = Vec::new();

        match (&self.region, &self.symptom) {
            (Some(region), Some(symptom)) => sentences.push(format!(
                "{} bölgemde {} var.",
                region_label(region),
                symptom_label(symptom)
            )),
            (Some(region), None) => {
                sentences.push(format!("{} bölgemde bir şikayetim var.", region_label(region)))
            }
            (None, Some(symptom)) => {
                sentences.push(format!("{} şikayetim var.", capitalize(&symptom_label(symptom))))
            }
            (None, None) => sentences.push("Bir sağlık şikayetim var.".to_string()),
        }
        if let Some(severity) = self.severity {
            sentences.push(format!("Şiddeti 10 üzerinden {severity}."));
        }
        if let Some(onset) = &self.onset {
            sentences.push(format!("{}.", capitalize(&onset_label(onset))));
        }
        if !self.red_flags.is_empty() {
            let labels: Vec<&str> = self
                .red_flags
                .iter()
                .map(|f| crate::pipeline::classify::emergency::red_flag_label(f))
                .collect();
            sentences.push(format!("Ayrıca şunlar var: {}.", labels.join(", ")));
        }
        if let Some(trigger) = &self.trigger {
            sentences.push(format!("Tetikleyen durum: {}.", humanize(trigger)));
        }
        if let Some(notes) = self.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            sentences.push(format!("Not: {notes}"));
        }

        sentences.join(" ")
    }

    /// Labelled fields appended to the prompt, in English.
    pub fn to_prompt_fields(&self) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "Not specified".into());
        let severity = self
            .severity
            .map(|s| format!("{s}/{MAX_SEVERITY}"))
            .unwrap_or_else(|| "Not specified".into());
        let red_flags = if self.red_flags.is_empty() {
            "None".to_string()
        } else {
            self.red_flags.join(", ")
        };
        format!(
            "BODY REGION: {}\nSYMPTOM TYPE: {}\nSEVERITY: {}\nONSET: {}\nTRIGGER: {}\nRED FLAGS REPORTED: {}",
            or_unknown(&self.region),
            or_unknown(&self.symptom),
            severity,
            or_unknown(&self.onset),
            or_unknown(&self.trigger),
            red_flags
        )
    }
}

// ── Labels ──────────────────────────────────────────────

/// Turkish name of a body-region id ("left_knee" → "Sol diz").
pub fn region_label(region: &str) -> String {
    let label = match region {
        "head" => "Baş",
        "face" => "Yüz",
        "neck" => "Boyun",
        "chest" => "Göğüs",
        "abdomen" => "Karın",
        "upper_back" => "Sırt",
        "lower_back" => "Bel",
        "left_shoulder" => "Sol omuz",
        "right_shoulder" => "Sağ omuz",
        "left_arm" => "Sol kol",
        "right_arm" => "Sağ kol",
        "left_hand" => "Sol el",
        "right_hand" => "Sağ el",
        "left_hip" => "Sol kalça",
        "right_hip" => "Sağ kalça",
        "left_knee" => "Sol diz",
        "right_knee" => "Sağ diz",
        "left_shin" => "Sol kaval kemiği",
        "right_shin" => "Sağ kaval kemiği",
        "left_ankle" => "Sol ayak bileği",
        "right_ankle" => "Sağ ayak bileği",
        "left_foot" => "Sol ayak",
        "right_foot" => "Sağ ayak",
        other => return capitalize(&humanize(other)),
    };
    label.to_string()
}

/// Turkish name of a symptom id ("pain" → "ağrı").
pub fn symptom_label(symptom: &str) -> String {
    let label = match symptom {
        "pain" => "ağrı",
        "swelling" => "şişlik",
        "numbness" => "uyuşma",
        "tingling" => "karıncalanma",
        "itching" => "kaşıntı",
        "rash" => "döküntü",
        "burning" => "yanma",
        "stiffness" => "tutukluk",
        "weakness" => "güçsüzlük",
        "bruising" => "morarma",
        "cramp" => "kramp",
        "redness" => "kızarıklık",
        other => return humanize(other),
    };
    label.to_string()
}

/// Turkish phrase for an onset id ("2_3_days" → "2-3 gündür devam ediyor").
pub fn onset_label(onset: &str) -> String {
    let label = match onset {
        "just_now" => "az önce başladı",
        "today" => "bugün başladı",
        "1_day" => "1 gündür devam ediyor",
        "2_3_days" => "2-3 gündür devam ediyor",
        "4_7_days" => "4-7 gündür devam ediyor",
        "1_2_weeks" => "1-2 haftadır devam ediyor",
        "more_than_2_weeks" => "2 haftadan uzun süredir devam ediyor",
        "chronic" => "uzun süredir (kronik) devam ediyor",
        other => return humanize(other),
    };
    label.to_string()
}

fn humanize(id: &str) -> String {
    id.trim().replace('_', " ")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ═══════════════════════════════════════════════════════════
// State machine
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeState {
    #[default]
    Idle,
    RegionSelected,
    SymptomSelected,
    SeveritySet,
    IntakeComplete,
    Chat,
}

impl std::fmt::Display for IntakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RegionSelected => "region_selected",
            Self::SymptomSelected => "symptom_selected",
            Self::SeveritySet => "severity_set",
            Self::IntakeComplete => "intake_complete",
            Self::Chat => "chat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IntakeEvent {
    SelectRegion {
        region: String,
    },
    SelectSymptom {
        symptom: String,
    },
    SetSeverity {
        severity: u8,
    },
    Complete {
        onset: String,
        #[serde(default)]
        trigger: Option<String>,
        #[serde(default)]
        red_flags: Vec<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    StartChat,
}

impl IntakeEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::SelectRegion { .. } => "select_region",
            Self::SelectSymptom { .. } => "select_symptom",
            Self::SetSeverity { .. } => "set_severity",
            Self::Complete { .. } => "complete",
            Self::StartChat => "start_chat",
        }
    }
}

/// Draft report plus the wizard position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeMachine {
    state: IntakeState,
    draft: SymptomReport,
}

impl IntakeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-form chat skips the wizard.
    pub fn skipped() -> Self {
        Self {
            state: IntakeState::Chat,
            draft: SymptomReport::default(),
        }
    }

    pub fn state(&self) -> IntakeState {
        self.state
    }

    pub fn draft(&self) -> &SymptomReport {
        &self.draft
    }

    /// Apply one wizard event. Earlier steps may be redone before the
    /// report is complete; redoing a step drops everything after it.
    /// `StartChat` returns the finished report; every other event returns
    /// `None`.
    pub fn apply(&mut self, event: IntakeEvent) -> Result<Option<SymptomReport>, IntakeError> {
        use IntakeState::*;
        let invalid = |state: IntakeState, event: &IntakeEvent| IntakeError::InvalidTransition {
            state,
            event: event.name(),
        };

        match (&event, self.state) {
            (IntakeEvent::SelectRegion { region }, Idle | RegionSelected | SymptomSelected | SeveritySet) => {
                let region = non_empty(region, "region")?;
                self.draft = SymptomReport {
                    region: Some(region),
                    ..SymptomReport::default()
                };
                self.state = RegionSelected;
            }
            (IntakeEvent::SelectSymptom { symptom }, RegionSelected | SymptomSelected | SeveritySet) => {
                self.draft.symptom = Some(non_empty(symptom, "symptom")?);
                self.draft.severity = None;
                self.state = SymptomSelected;
            }
            (IntakeEvent::SetSeverity { severity }, SymptomSelected | SeveritySet) => {
                if *severity > MAX_SEVERITY {
                    return Err(IntakeError::SeverityOutOfRange(*severity));
                }
                self.draft.severity = Some(*severity);
                self.state = SeveritySet;
            }
            (
                IntakeEvent::Complete {
                    onset,
                    trigger,
                    red_flags,
                    notes,
                },
                SeveritySet,
            ) => {
                if onset.trim().is_empty() {
                    return Err(IntakeError::OnsetRequired);
                }
                self.draft.onset = Some(onset.trim().to_string());
                self.draft.trigger = trigger.clone().filter(|t| !t.trim().is_empty());
                self.draft.red_flags = red_flags
                    .iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
                self.draft.notes = notes.clone();
                self.state = IntakeComplete;
            }
            (IntakeEvent::StartChat, IntakeComplete) => {
                self.state = Chat;
                let report = std::mem::take(&mut self.draft);
                tracing::info!(red_flags = report.red_flags.len(), "Intake complete, starting chat");
                return Ok(Some(report));
            }
            (event, state) => return Err(invalid(state, event)),
        }

        tracing::debug!(state = %self.state, "Intake advanced");
        Ok(None)
    }

    /// Back to `idle` with an empty draft.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<String, IntakeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IntakeError::EmptyField(field));
    }
    Ok(value.to_string())
}
