use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{
    MedicalHistory, Patient, PatientId, PatientSource, TrainingDetails,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub patient_id: PatientId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Patient record as the backend serves it. Regular and training records share
/// this shape; training records fill the dataset fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_age")]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_history")]
    pub medical_history: Option<MedicalHistory>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub weight: Option<Value>,
    #[serde(default)]
    pub height: Option<Value>,
    #[serde(default)]
    pub address: Option<String>,
}

impl From<PatientRecord> for Patient {
    fn from(record: PatientRecord) -> Self {
        let source = record.id.source();
        let training = match source {
            PatientSource::Training => TrainingDetails {
                birthdate: non_empty(record.birthdate),
                blood_type: non_empty(record.blood_type),
                weight: record.weight.as_ref().and_then(scalar_text),
                height: record.height.as_ref().and_then(scalar_text),
                address: non_empty(record.address),
            },
            PatientSource::Registered => TrainingDetails::default(),
        };
        let name = record
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| record.id.to_string());

        Self {
            id: record.id,
            source,
            name,
            age: record.age,
            gender: non_empty(record.gender),
            phone: non_empty(record.phone),
            email: non_empty(record.email),
            medical_history: record.medical_history,
            notes: non_empty(record.notes),
            training,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreatePatientRequest {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientResponse {
    pub patient_id: PatientId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientExport {
    pub filename: String,
    pub data: Value,
    #[serde(default)]
    pub is_training_data: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgeStatistics {
    #[serde(default)]
    pub known: u64,
    #[serde(default)]
    pub unknown: u64,
    #[serde(default)]
    pub average: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingSummary {
    pub total_patients: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gender_distribution: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_statistics: Option<AgeStatistics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    Filename,
    #[serde(other)]
    Generated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub filename: String,
    pub patient_id: PatientId,
    #[serde(default = "generated_id_source")]
    pub id_source: IdSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn generated_id_source() -> IdSource {
    IdSource::Generated
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTrainingPatientRequest {
    pub old_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTrainingPatientResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub old_id: String,
    pub new_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportTrainingToStoreRequest {
    pub limit: usize,
}

/// Outcome of copying the first `limit` training patients into the patient
/// store; ids already stored are skipped and not counted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportTrainingToStoreResponse {
    #[serde(default)]
    pub imported_count: usize,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Renders a JSON scalar the way a detail field shows it.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn lenient_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

// Older rows store the history as an embedded JSON string.
fn lenient_history<'de, D>(deserializer: D) -> Result<Option<MedicalHistory>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => serde_json::from_value(Value::Object(map)).ok(),
        Some(Value::String(raw)) => serde_json::from_str(&raw).ok(),
        _ => None,
    })
}
