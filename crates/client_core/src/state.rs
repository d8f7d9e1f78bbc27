//! Client-held session and training-set bookkeeping. Nothing here talks to the
//! network; the controller feeds responses in.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Patient, PatientId},
    protocol::TrainingSummary,
};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub current_patient: PatientId,
    pub message_count: usize,
    /// Set by the first displayed message, cleared by `reset_chat`.
    pub chat_started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn mark_message_displayed(&mut self, now: DateTime<Utc>) {
        if self.chat_started_at.is_none() {
            self.chat_started_at = Some(now);
        }
    }

    pub fn reset_chat(&mut self) {
        self.message_count = 0;
        self.chat_started_at = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Patients this call is expected to add.
    pub count: usize,
    /// `limit` sent to the server; the endpoint always returns the first
    /// `limit` patients of the dataset.
    pub limit: usize,
    pub clamped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadMoreError {
    #[error("Please enter a valid positive number")]
    InvalidCount,
    #[error("Training data summary is not available")]
    StatsUnavailable,
    #[error("All training patients are already loaded")]
    AllLoaded,
}

/// Training patients fetched so far, unique by id and never more than the
/// server-reported total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingPatientSet {
    loaded: Vec<Patient>,
    stats: Option<TrainingSummary>,
}

impl TrainingPatientSet {
    pub fn loaded(&self) -> &[Patient] {
        &self.loaded
    }

    pub fn stats(&self) -> Option<&TrainingSummary> {
        self.stats.as_ref()
    }

    pub fn total(&self) -> Option<usize> {
        self.stats.as_ref().map(|stats| stats.total_patients)
    }

    pub fn remaining(&self) -> Option<usize> {
        self.total()
            .map(|total| total.saturating_sub(self.loaded.len()))
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    pub fn contains(&self, id: &PatientId) -> bool {
        self.loaded.iter().any(|patient| &patient.id == id)
    }

    pub fn set_stats(&mut self, stats: TrainingSummary) {
        self.loaded.truncate(stats.total_patients);
        self.stats = Some(stats);
    }

    pub fn plan_load(&self, requested: usize) -> Result<LoadPlan, LoadMoreError> {
        if requested == 0 {
            return Err(LoadMoreError::InvalidCount);
        }
        let remaining = self.remaining().ok_or(LoadMoreError::StatsUnavailable)?;
        if remaining == 0 {
            return Err(LoadMoreError::AllLoaded);
        }
        let count = requested.min(remaining);
        Ok(LoadPlan {
            count,
            limit: self.loaded.len() + count,
            clamped: requested > remaining,
        })
    }

    /// Appends the patients not already present, stopping at the total.
    /// Returns how many were added.
    pub fn merge(&mut self, patients: Vec<Patient>) -> usize {
        let capacity = self.remaining().unwrap_or(usize::MAX);
        let mut seen: HashSet<PatientId> =
            self.loaded.iter().map(|patient| patient.id.clone()).collect();
        let mut added = 0;
        for patient in patients {
            if added == capacity {
                break;
            }
            if seen.insert(patient.id.clone()) {
                self.loaded.push(patient);
                added += 1;
            }
        }
        added
    }
}

/// Parses user-entered counts the way a numeric input does: surrounding
/// whitespace is ignored, anything else must be a positive integer.
pub fn parse_load_count(raw: &str) -> Result<usize, LoadMoreError> {
    match raw.trim().parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(LoadMoreError::InvalidCount),
    }
}
