//! Renderable projection of controller state. Adapters draw these values; they
//! never mutate them directly.

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use shared::{
    domain::{ChatMessage, MessageRole, Patient, PatientId, TrainingDetails},
    protocol::CreatePatientRequest,
};
use tokio::time::Instant;

use crate::{state::TrainingPatientSet, symptoms::SymptomReport, ticker::NO_DURATION_LABEL};

pub const WELCOME_MESSAGE: &str =
    "Hello! I'm your Virtual Diagnostic Assistant. Please tell me about your symptoms or concerns.";
pub const PENDING_INDICATOR: &str = "AI is thinking...";
pub const NO_HISTORY_LABEL: &str = "No medical history recorded";
pub const MISSING_FIELD: &str = "-";
pub const DEFAULT_PATIENT_LABEL: &str = "Default Patient";
pub const REGULAR_GROUP_LABEL: &str = "Regular Patients";
pub const TRAINING_GROUP_LABEL: &str = "Training Data Patients";
pub const ALL_LOADED_LABEL: &str = "All Loaded";
pub const LOADING_LABEL: &str = "Loading...";
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

const HISTORY_SUMMARY_RECORDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: MessageRole,
    pub content: String,
    pub time_label: String,
}

impl TranscriptEntry {
    pub fn new(role: MessageRole, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            time_label: at.with_timezone(&Local).format("%H:%M").to_string(),
        }
    }

    pub fn from_history(message: &ChatMessage, now: DateTime<Utc>) -> Self {
        let time_label = message
            .timestamp
            .clone()
            .unwrap_or_else(|| now.with_timezone(&Local).format("%H:%M").to_string());
        Self {
            role: message.role,
            content: message.content.clone(),
            time_label,
        }
    }
}

/// An empty transcript renders as the welcome message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
    pub pending: bool,
    /// Bumped whenever `entries` is replaced wholesale rather than appended to.
    pub revision: u64,
}

impl Transcript {
    pub fn is_welcome(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.pending = false;
    }

    pub fn replace(&mut self, entries: Vec<TranscriptEntry>) {
        self.entries = entries;
        self.pending = false;
        self.revision += 1;
    }

    pub fn count_role(&self, role: MessageRole) -> usize {
        self.entries.iter().filter(|entry| entry.role == role).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposerState {
    pub enabled: bool,
    pub focused: bool,
}

impl ComposerState {
    pub fn ready() -> Self {
        Self {
            enabled: true,
            focused: true,
        }
    }

    pub fn busy() -> Self {
        Self {
            enabled: false,
            focused: false,
        }
    }
}

impl Default for ComposerState {
    fn default() -> Self {
        Self::ready()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorEntry {
    pub id: PatientId,
    pub label: String,
}

impl SelectorEntry {
    fn from_patient(patient: &Patient) -> Self {
        Self {
            id: patient.id.clone(),
            label: patient.name.clone(),
        }
    }
}

/// The patient dropdown: a fixed default entry followed by two groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientSelector {
    pub regular: Vec<SelectorEntry>,
    pub training: Vec<SelectorEntry>,
    pub selected: PatientId,
}

impl PatientSelector {
    pub fn build(regular: &[Patient], training: &TrainingPatientSet, selected: PatientId) -> Self {
        Self {
            regular: regular
                .iter()
                .filter(|patient| !patient.is_training())
                .map(SelectorEntry::from_patient)
                .collect(),
            training: training
                .loaded()
                .iter()
                .map(SelectorEntry::from_patient)
                .collect(),
            selected,
        }
    }

    pub fn default_entry() -> SelectorEntry {
        SelectorEntry {
            id: PatientId::default(),
            label: DEFAULT_PATIENT_LABEL.to_string(),
        }
    }

    pub fn find(&self, id: &PatientId) -> Option<&SelectorEntry> {
        self.regular
            .iter()
            .chain(self.training.iter())
            .find(|entry| &entry.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientPanel {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub phone: String,
    pub history_summary: String,
    /// Present only for training-sourced patients with at least one field.
    pub training_details: Option<TrainingDetails>,
}

impl PatientPanel {
    pub fn placeholder() -> Self {
        Self {
            name: DEFAULT_PATIENT_LABEL.to_string(),
            age: MISSING_FIELD.to_string(),
            gender: MISSING_FIELD.to_string(),
            phone: MISSING_FIELD.to_string(),
            history_summary: NO_HISTORY_LABEL.to_string(),
            training_details: None,
        }
    }

    pub fn from_patient(patient: &Patient) -> Self {
        let training_details = (patient.is_training() && !patient.training.is_empty())
            .then(|| patient.training.clone());
        Self {
            name: or_missing(Some(patient.name.clone())),
            age: or_missing(patient.age.map(|age| age.to_string())),
            gender: or_missing(patient.gender.clone()),
            phone: or_missing(patient.phone.clone()),
            history_summary: history_summary(patient),
            training_details,
        }
    }
}

impl Default for PatientPanel {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// Last three recorded conditions, else training notes, else the fixed label.
pub fn history_summary(patient: &Patient) -> String {
    if let Some(history) = &patient.medical_history {
        let start = history.records.len().saturating_sub(HISTORY_SUMMARY_RECORDS);
        let conditions: Vec<&str> = history.records[start..]
            .iter()
            .filter_map(|record| record.condition.as_deref())
            .filter(|condition| !condition.is_empty())
            .collect();
        if !conditions.is_empty() {
            return conditions.join(", ");
        }
    }

    if patient.is_training() {
        let notes = patient
            .medical_history
            .as_ref()
            .and_then(|history| history.notes.as_deref())
            .or(patient.notes.as_deref())
            .filter(|notes| !notes.trim().is_empty());
        if let Some(notes) = notes {
            return notes.to_string();
        }
    }

    NO_HISTORY_LABEL.to_string()
}

fn or_missing(value: Option<String>) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| MISSING_FIELD.to_string())
}

/// Raw field values of the create-patient dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPatientForm {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub phone: String,
    pub email: String,
}

impl NewPatientForm {
    pub fn to_request(&self) -> CreatePatientRequest {
        CreatePatientRequest {
            name: self.name.trim().to_string(),
            age: parse_age(&self.age),
            gender: self.gender.clone(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }
}

/// Leading-integer parse; zero and unparsable input both mean "not given".
pub fn parse_age(raw: &str) -> Option<u32> {
    let trimmed = raw.trim_start();
    let digits: String = trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok().filter(|age| *age > 0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportDialog {
    pub selected_file: Option<String>,
    pub preview: Option<String>,
    pub warnings: Vec<String>,
    pub confirm_enabled: bool,
    pub uploading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreControl {
    pub enabled: bool,
    pub label: String,
}

impl LoadMoreControl {
    pub fn for_set(training: &TrainingPatientSet) -> Self {
        match (training.total(), training.is_complete()) {
            (Some(_), true) => Self {
                enabled: false,
                label: ALL_LOADED_LABEL.to_string(),
            },
            (Some(total), false) => Self {
                enabled: true,
                label: format!("Load More ({}/{total})", training.loaded().len()),
            },
            (None, _) => Self {
                enabled: true,
                label: "Load More".to_string(),
            },
        }
    }

    pub fn loading() -> Self {
        Self {
            enabled: false,
            label: LOADING_LABEL.to_string(),
        }
    }
}

impl Default for LoadMoreControl {
    fn default() -> Self {
        Self::for_set(&TrainingPatientSet::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Success,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>, now: Instant) -> Self {
        Self {
            severity,
            message: message.into(),
            expires_at: now + NOTIFICATION_TTL,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub transcript: Transcript,
    pub composer: ComposerState,
    pub selector: PatientSelector,
    pub patient_panel: PatientPanel,
    pub symptoms: Option<SymptomReport>,
    pub duration_label: String,
    pub new_patient_dialog: Option<NewPatientForm>,
    pub import_dialog: Option<ImportDialog>,
    pub history_overlay: Option<Vec<ChatMessage>>,
    pub load_more: LoadMoreControl,
    pub notifications: Vec<Notification>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            transcript: Transcript::default(),
            composer: ComposerState::ready(),
            selector: PatientSelector::default(),
            patient_panel: PatientPanel::placeholder(),
            symptoms: None,
            duration_label: NO_DURATION_LABEL.to_string(),
            new_patient_dialog: None,
            import_dialog: None,
            history_overlay: None,
            load_more: LoadMoreControl::default(),
            notifications: Vec::new(),
        }
    }
}

impl ViewState {
    /// Drops expired notifications; returns whether any were removed.
    pub fn expire_notifications(&mut self, now: Instant) -> bool {
        let before = self.notifications.len();
        self.notifications
            .retain(|notification| !notification.is_expired(now));
        self.notifications.len() != before
    }

    /// Adds a notification after dropping the ones already expired at `now`.
    pub fn push_notification(&mut self, notification: Notification, now: Instant) -> bool {
        let expired = self.expire_notifications(now);
        self.notifications.push(notification);
        expired
    }
}
