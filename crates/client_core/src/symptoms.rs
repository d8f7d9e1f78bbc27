//! Keyword-based symptom detection over the user's own chat text.

use chrono::NaiveDate;

pub const SYMPTOM_KEYWORDS: [&str; 10] = [
    "headache",
    "fever",
    "cough",
    "stomach pain",
    "fatigue",
    "insomnia",
    "nausea",
    "vomiting",
    "pain",
    "tired",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymptomReport {
    pub date: NaiveDate,
    pub symptoms: Vec<&'static str>,
}

/// Case-insensitive substring match, in keyword-list order. Overlapping
/// keywords ("stomach pain" and "pain") both match.
pub fn extract_symptoms(message: &str) -> Vec<&'static str> {
    let lower = message.to_lowercase();
    SYMPTOM_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| lower.contains(keyword))
        .collect()
}

/// `None` when nothing matched; callers keep the previous report in that case.
pub fn symptom_report(message: &str, date: NaiveDate) -> Option<SymptomReport> {
    let symptoms = extract_symptoms(message);
    if symptoms.is_empty() {
        None
    } else {
        Some(SymptomReport { date, symptoms })
    }
}
