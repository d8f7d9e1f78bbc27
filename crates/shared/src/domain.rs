use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier reserved for the placeholder patient that has no server record.
pub const DEFAULT_PATIENT_ID: &str = "default";

/// Identifier prefix the backend uses for patients sourced from the training dataset.
pub const TRAINING_ID_PREFIX: &str = "training_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_PATIENT_ID
    }

    /// Provenance is encoded in the identifier on the wire; this is the only
    /// place that reads the prefix.
    pub fn source(&self) -> PatientSource {
        if self.0.starts_with(TRAINING_ID_PREFIX) {
            PatientSource::Training
        } else {
            PatientSource::Registered
        }
    }
}

impl Default for PatientId {
    fn default() -> Self {
        Self(DEFAULT_PATIENT_ID.to_string())
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientSource {
    Registered,
    Training,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistory {
    #[serde(default)]
    pub records: Vec<HistoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Fields only the training dataset carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDetails {
    pub birthdate: Option<String>,
    pub blood_type: Option<String>,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub address: Option<String>,
}

impl TrainingDetails {
    pub fn is_empty(&self) -> bool {
        self.birthdate.is_none()
            && self.blood_type.is_none()
            && self.weight.is_none()
            && self.height.is_none()
            && self.address.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: PatientId,
    pub source: PatientSource,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub medical_history: Option<MedicalHistory>,
    pub notes: Option<String>,
    pub training: TrainingDetails,
}

impl Patient {
    pub fn is_training(&self) -> bool {
        self.source == PatientSource::Training
    }
}
