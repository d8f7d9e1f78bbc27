//! The diagnostician controller: owns session, training and view state and
//! mediates between user input, the remote API and rendering adapters.
//!
//! State lives behind one mutex that is never held across a network call.
//! Patient-scoped and training-scoped responses carry the generation they were
//! issued under and are dropped when a newer request has superseded them.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{Local, Utc};
use shared::{
    domain::{ChatMessage, MessageRole, Patient, PatientId},
    protocol::{ChatRequest, IdSource, TrainingSummary},
};
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    downloads::DownloadSink,
    import_preview::ImportPreview,
    state::{parse_load_count, Session, TrainingPatientSet},
    symptoms::symptom_report,
    ticker::{format_elapsed, DurationTicker},
    view::{
        ComposerState, ImportDialog, LoadMoreControl, NewPatientForm, Notification, PatientPanel,
        PatientSelector, Severity, TranscriptEntry, ViewState,
    },
    ApiClientError, DiagnosticianApi,
};

pub const CLEAR_CHAT_QUESTION: &str =
    "Are you sure you want to clear the chat history? This action cannot be undone.";
pub const IMPORT_FOLLOW_UP_DELAY: Duration = Duration::from_secs(2);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Interactive yes/no confirmation supplied by the rendering adapter.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Change notifications for rendering adapters. Adapters read the new values
/// through [`DiagnosticianController::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    TranscriptChanged,
    ComposerChanged,
    SelectorChanged,
    PatientPanelChanged,
    SymptomsChanged,
    CountersChanged,
    NewPatientDialogChanged,
    ImportDialogChanged,
    HistoryOverlayChanged,
    TrainingControlsChanged,
    Notified(Notification),
    NotificationsExpired,
    Downloaded { path: PathBuf },
}

/// Point-in-time copy of everything the controller owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub session: Session,
    pub training: TrainingPatientSet,
    pub view: ViewState,
}

#[derive(Default)]
struct ControllerState {
    session: Session,
    training: TrainingPatientSet,
    regular_patients: Vec<Patient>,
    view: ViewState,
    pending_import: Option<ImportPreview>,
    patient_generation: u64,
    training_generation: u64,
}

impl ControllerState {
    fn rebuild_selector(&mut self) {
        self.view.selector = PatientSelector::build(
            &self.regular_patients,
            &self.training,
            self.session.current_patient.clone(),
        );
    }

    fn refresh_counters(&mut self) {
        self.view.duration_label = format_elapsed(self.session.chat_started_at, Utc::now());
    }

    /// The message count becomes the history length, zero included.
    fn show_history(&mut self, history: &[ChatMessage]) {
        let now = Utc::now();
        self.view.transcript.replace(
            history
                .iter()
                .map(|message| TranscriptEntry::from_history(message, now))
                .collect(),
        );
        if !history.is_empty() {
            self.session.mark_message_displayed(now);
        }
        self.session.message_count = history.len();
        self.refresh_counters();
    }

    fn append_entry(&mut self, role: MessageRole, content: &str) {
        let now = Utc::now();
        self.view
            .transcript
            .entries
            .push(TranscriptEntry::new(role, content, now));
        self.session.mark_message_displayed(now);
    }
}

pub struct DiagnosticianController {
    api: Arc<dyn DiagnosticianApi>,
    downloads: Arc<dyn DownloadSink>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl DiagnosticianController {
    pub fn new(api: Arc<dyn DiagnosticianApi>, downloads: Arc<dyn DownloadSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            api,
            downloads,
            inner: Mutex::new(ControllerState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let guard = self.inner.lock().await;
        Snapshot {
            session: guard.session.clone(),
            training: guard.training.clone(),
            view: guard.view.clone(),
        }
    }

    /// Initial page load: training stats, patient list and the default patient,
    /// a fresh chat, and the duration ticker.
    pub async fn start(self: &Arc<Self>) -> DurationTicker {
        self.initialize_chat().await;
        self.refresh_training_stats().await;
        self.load_patients().await;
        info!("controller: started");
        self.start_duration_ticker()
    }

    pub fn start_duration_ticker(self: &Arc<Self>) -> DurationTicker {
        DurationTicker::spawn(self)
    }

    /// One duration tick: recompute the elapsed label and expire old toasts.
    pub async fn tick(&self) {
        let mut guard = self.inner.lock().await;
        let label = format_elapsed(guard.session.chat_started_at, Utc::now());
        if label != guard.view.duration_label {
            guard.view.duration_label = label;
            self.emit(ControllerEvent::CountersChanged);
        }
        if guard.view.expire_notifications(Instant::now()) {
            self.emit(ControllerEvent::NotificationsExpired);
        }
    }

    pub async fn initialize_chat(&self) {
        let mut guard = self.inner.lock().await;
        guard.session.reset_chat();
        guard.refresh_counters();
        self.emit(ControllerEvent::CountersChanged);
    }

    pub async fn send_message(&self, text: &str) {
        let message = text.trim();
        if message.is_empty() {
            return;
        }

        let (patient_id, generation) = {
            let mut guard = self.inner.lock().await;
            if !guard.view.composer.enabled {
                debug!("send_message: previous message still in flight, ignoring");
                return;
            }
            guard.view.composer = ComposerState::busy();
            guard.append_entry(MessageRole::User, message);
            guard.view.transcript.pending = true;
            (guard.session.current_patient.clone(), guard.patient_generation)
        };
        self.emit(ControllerEvent::ComposerChanged);
        self.emit(ControllerEvent::TranscriptChanged);

        let result = self
            .api
            .send_chat(&ChatRequest {
                message: message.to_string(),
                patient_id: patient_id.clone(),
            })
            .await;

        let mut guard = self.inner.lock().await;
        guard.view.transcript.pending = false;
        match result {
            Ok(reply) if generation == guard.patient_generation => {
                guard.append_entry(MessageRole::Assistant, &reply.response);
                guard.session.message_count += 1;
                guard.refresh_counters();
                self.emit(ControllerEvent::CountersChanged);
                if let Some(report) = symptom_report(message, Local::now().date_naive()) {
                    guard.view.symptoms = Some(report);
                    self.emit(ControllerEvent::SymptomsChanged);
                }
            }
            Ok(_) => {
                debug!(%patient_id, "send_message: patient switched before reply, dropping");
            }
            Err(err) => {
                warn!(%patient_id, error = %err, "send_message failed");
                let message = match &err {
                    ApiClientError::Server { message, .. } => {
                        format!("Failed to send message: {message}")
                    }
                    other => format!("Network error: {other}"),
                };
                self.notify(&mut guard, Severity::Error, message);
            }
        }
        guard.view.composer = ComposerState::ready();
        self.emit(ControllerEvent::TranscriptChanged);
        self.emit(ControllerEvent::ComposerChanged);
    }

    pub async fn switch_patient(&self, id: PatientId) {
        {
            let mut guard = self.inner.lock().await;
            info!(from = %guard.session.current_patient, to = %id, "controller: switching patient");
            guard.session.current_patient = id.clone();
            guard.patient_generation += 1;
            guard.view.selector.selected = id;
        }
        self.emit(ControllerEvent::SelectorChanged);
        futures::join!(self.load_patient_info(), self.load_chat_history());
    }

    pub async fn load_patients(&self) {
        self.refresh_patient_lists().await;
        self.load_patient_info().await;
    }

    /// Rebuilds the selector from the server's regular patients and the
    /// client-held training patients.
    pub async fn refresh_patient_lists(&self) {
        match self.api.list_patients().await {
            Ok(patients) => {
                let mut guard = self.inner.lock().await;
                guard.regular_patients = patients
                    .into_iter()
                    .filter(|patient| !patient.is_training())
                    .collect();
                guard.rebuild_selector();
                debug!(
                    regular = guard.regular_patients.len(),
                    training = guard.training.loaded().len(),
                    "controller: patient selector rebuilt"
                );
                self.emit(ControllerEvent::SelectorChanged);
            }
            Err(err) => warn!(error = %err, "failed to load patient list"),
        }
    }

    pub async fn load_patient_info(&self) {
        let (patient_id, generation) = self.current_patient().await;
        if patient_id.is_default() {
            let mut guard = self.inner.lock().await;
            guard.view.patient_panel = PatientPanel::placeholder();
            self.emit(ControllerEvent::PatientPanelChanged);
            return;
        }

        let result = self.api.patient(&patient_id).await;
        let mut guard = self.inner.lock().await;
        if generation != guard.patient_generation {
            debug!(%patient_id, "load_patient_info: stale response dropped");
            return;
        }
        match result {
            Ok(patient) => {
                guard.view.patient_panel = PatientPanel::from_patient(&patient);
                self.emit(ControllerEvent::PatientPanelChanged);
            }
            Err(err) => warn!(%patient_id, error = %err, "failed to load patient information"),
        }
    }

    pub async fn load_chat_history(&self) {
        let (patient_id, generation) = self.current_patient().await;
        let result = self.api.chat_history(&patient_id).await;
        let mut guard = self.inner.lock().await;
        if generation != guard.patient_generation {
            debug!(%patient_id, "load_chat_history: stale response dropped");
            return;
        }
        match result {
            Ok(history) => {
                guard.show_history(&history);
                self.emit(ControllerEvent::TranscriptChanged);
                self.emit(ControllerEvent::CountersChanged);
            }
            Err(err) => warn!(%patient_id, error = %err, "failed to load chat history"),
        }
    }

    /// Replaces the transcript with `history`; the message count becomes its length.
    pub async fn display_chat_history(&self, history: Vec<ChatMessage>) {
        let mut guard = self.inner.lock().await;
        guard.show_history(&history);
        self.emit(ControllerEvent::TranscriptChanged);
        self.emit(ControllerEvent::CountersChanged);
    }

    pub async fn open_new_patient_dialog(&self) {
        let mut guard = self.inner.lock().await;
        guard.view.new_patient_dialog = Some(NewPatientForm::default());
        self.emit(ControllerEvent::NewPatientDialogChanged);
    }

    /// Closing discards whatever was typed.
    pub async fn close_new_patient_dialog(&self) {
        let mut guard = self.inner.lock().await;
        guard.view.new_patient_dialog = None;
        self.emit(ControllerEvent::NewPatientDialogChanged);
    }

    pub async fn create_patient(&self, form: NewPatientForm) {
        let request = form.to_request();
        {
            let mut guard = self.inner.lock().await;
            guard.view.new_patient_dialog = Some(form);
            self.emit(ControllerEvent::NewPatientDialogChanged);
            if request.name.is_empty() {
                self.notify(&mut guard, Severity::Error, "Please enter patient name");
                return;
            }
        }

        let created = match self.api.create_patient(&request).await {
            Ok(created) => created,
            Err(err) => {
                warn!(error = %err, "create_patient failed");
                let message = match &err {
                    ApiClientError::Server { message, .. } => message.clone(),
                    other => format!("Network error: {other}"),
                };
                let mut guard = self.inner.lock().await;
                self.notify(&mut guard, Severity::Error, message);
                return;
            }
        };

        self.refresh_patient_lists().await;
        {
            let mut guard = self.inner.lock().await;
            guard.session.current_patient = created.patient_id.clone();
            guard.patient_generation += 1;
            guard.view.selector.selected = created.patient_id.clone();
            guard.view.new_patient_dialog = None;
        }
        self.emit(ControllerEvent::SelectorChanged);
        self.emit(ControllerEvent::NewPatientDialogChanged);
        futures::join!(self.load_patient_info(), self.load_chat_history());

        let mut guard = self.inner.lock().await;
        info!(patient_id = %created.patient_id, "controller: patient created");
        self.notify(&mut guard, Severity::Success, "Patient created successfully");
    }

    pub async fn open_import_dialog(&self) {
        let mut guard = self.inner.lock().await;
        guard.pending_import = None;
        guard.view.import_dialog = Some(ImportDialog::default());
        self.emit(ControllerEvent::ImportDialogChanged);
    }

    pub async fn cancel_import(&self) {
        let mut guard = self.inner.lock().await;
        guard.pending_import = None;
        guard.view.import_dialog = None;
        self.emit(ControllerEvent::ImportDialogChanged);
    }

    /// First import phase: validate locally and show the pretty-printed file.
    pub async fn preview_training_file(&self, path: &Path) {
        let result = ImportPreview::load(path).await;
        let mut guard = self.inner.lock().await;
        match result {
            Ok(preview) => {
                info!(filename = %preview.filename, name = %preview.name, "import: preview ready");
                guard.view.import_dialog = Some(ImportDialog {
                    selected_file: Some(preview.filename.clone()),
                    preview: Some(preview.pretty.clone()),
                    warnings: preview.warnings.clone(),
                    confirm_enabled: true,
                    uploading: false,
                });
                guard.pending_import = Some(preview);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "import: preview rejected");
                guard.pending_import = None;
                guard.view.import_dialog = Some(ImportDialog::default());
                self.notify(&mut guard, Severity::Error, err.to_string());
            }
        }
        self.emit(ControllerEvent::ImportDialogChanged);
    }

    /// Second import phase: upload the previewed file unchanged.
    pub async fn confirm_training_import(self: &Arc<Self>) {
        let preview = {
            let mut guard = self.inner.lock().await;
            let Some(preview) = guard.pending_import.clone() else {
                self.notify(&mut guard, Severity::Error, "Please select a JSON file first");
                return;
            };
            if let Some(dialog) = guard.view.import_dialog.as_mut() {
                dialog.confirm_enabled = false;
                dialog.uploading = true;
            }
            self.emit(ControllerEvent::ImportDialogChanged);
            preview
        };

        let response = match self
            .api
            .import_training_json(&preview.filename, preview.contents)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(filename = %preview.filename, error = %err, "import: upload failed");
                let mut guard = self.inner.lock().await;
                if let Some(dialog) = guard.view.import_dialog.as_mut() {
                    dialog.confirm_enabled = true;
                    dialog.uploading = false;
                }
                self.emit(ControllerEvent::ImportDialogChanged);
                self.notify(&mut guard, Severity::Error, format!("Import failed: {err}"));
                return;
            }
        };

        {
            let mut guard = self.inner.lock().await;
            guard.pending_import = None;
            guard.view.import_dialog = None;
            self.emit(ControllerEvent::ImportDialogChanged);
            let origin = match response.id_source {
                IdSource::Filename => "ID from filename",
                IdSource::Generated => "generated ID",
            };
            let message = format!(
                "Imported {} as patient {} ({origin})",
                response.filename, response.patient_id
            );
            info!(patient_id = %response.patient_id, id_source = ?response.id_source, "import: done");
            self.notify(&mut guard, Severity::Success, message);
        }

        self.refresh_training_stats().await;
        self.refresh_patient_lists().await;

        let remaining = {
            let guard = self.inner.lock().await;
            guard.training.remaining().unwrap_or(0)
        };
        if remaining > 0 {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(IMPORT_FOLLOW_UP_DELAY).await;
                let mut guard = controller.inner.lock().await;
                controller.notify(
                    &mut guard,
                    Severity::Info,
                    format!(
                        "{remaining} training patients are not loaded yet. Use Load More to see the imported patient."
                    ),
                );
            });
        }
    }

    pub async fn refresh_training_stats(&self) {
        match self.api.training_summary().await {
            Ok(summary) => self.apply_training_stats(summary).await,
            Err(err) => warn!(error = %err, "failed to load training summary"),
        }
    }

    async fn apply_training_stats(&self, summary: TrainingSummary) {
        let mut guard = self.inner.lock().await;
        debug!(total = summary.total_patients, "controller: training stats updated");
        guard.training.set_stats(summary);
        guard.view.load_more = LoadMoreControl::for_set(&guard.training);
        guard.rebuild_selector();
        self.emit(ControllerEvent::TrainingControlsChanged);
        self.emit(ControllerEvent::SelectorChanged);
    }

    pub async fn load_more_training_data(&self, requested: &str) {
        let requested = match parse_load_count(requested) {
            Ok(count) => count,
            Err(err) => {
                let mut guard = self.inner.lock().await;
                self.notify(&mut guard, Severity::Error, err.to_string());
                return;
            }
        };

        let has_stats = self.inner.lock().await.training.stats().is_some();
        if !has_stats {
            self.refresh_training_stats().await;
        }

        let (plan, generation) = {
            let mut guard = self.inner.lock().await;
            let plan = match guard.training.plan_load(requested) {
                Ok(plan) => plan,
                Err(err) => {
                    debug!(requested, error = %err, "load_more_training_data: rejected");
                    self.notify(&mut guard, Severity::Error, err.to_string());
                    return;
                }
            };
            if plan.clamped {
                self.notify(
                    &mut guard,
                    Severity::Info,
                    format!(
                        "Only {} training patients remain; loading {}",
                        plan.count, plan.count
                    ),
                );
            }
            guard.training_generation += 1;
            guard.view.load_more = LoadMoreControl::loading();
            self.emit(ControllerEvent::TrainingControlsChanged);
            (plan, guard.training_generation)
        };

        let result = self.api.training_patients(plan.limit).await;
        let mut guard = self.inner.lock().await;
        if generation != guard.training_generation {
            debug!(limit = plan.limit, "load_more_training_data: stale response dropped");
            return;
        }
        match result {
            Ok(patients) => {
                let added = guard.training.merge(patients);
                info!(
                    added,
                    loaded = guard.training.loaded().len(),
                    "controller: training patients loaded"
                );
                guard.rebuild_selector();
                self.emit(ControllerEvent::SelectorChanged);
                self.notify(
                    &mut guard,
                    Severity::Success,
                    format!("Loaded {added} training patients"),
                );
            }
            Err(err) => {
                warn!(error = %err, "failed to load training patients");
                self.notify(
                    &mut guard,
                    Severity::Error,
                    format!("Failed to load training data: {err}"),
                );
            }
        }
        guard.view.load_more = LoadMoreControl::for_set(&guard.training);
        self.emit(ControllerEvent::TrainingControlsChanged);
    }

    pub async fn export_patient_data(&self) {
        let (patient_id, _) = self.current_patient().await;
        let outcome = async {
            let export = self
                .api
                .export_patient(&patient_id)
                .await
                .map_err(|err| err.to_string())?;
            let contents =
                serde_json::to_vec_pretty(&export.data).map_err(|err| err.to_string())?;
            let path = self
                .downloads
                .save(&export.filename, &contents)
                .await
                .map_err(|err| format!("{err:#}"))?;
            Ok::<_, String>((export, path))
        }
        .await;

        let mut guard = self.inner.lock().await;
        match outcome {
            Ok((export, path)) => {
                let message = if export.is_training_data {
                    format!("Training data exported: {}", export.filename)
                } else {
                    format!("Data exported: {}", export.filename)
                };
                self.emit(ControllerEvent::Downloaded { path });
                self.notify(&mut guard, Severity::Success, message);
            }
            Err(err) => {
                warn!(%patient_id, error = %err, "patient export failed");
                self.notify(&mut guard, Severity::Error, format!("Export failed: {err}"));
            }
        }
    }

    pub async fn export_chat_history(&self) {
        let (patient_id, _) = self.current_patient().await;
        let filename = format!(
            "chat_history_{}_{}.json",
            patient_id,
            Utc::now().format("%Y-%m-%d")
        );
        let outcome = async {
            let history = self
                .api
                .chat_history(&patient_id)
                .await
                .map_err(|err| err.to_string())?;
            let contents = serde_json::to_vec_pretty(&history).map_err(|err| err.to_string())?;
            self.downloads
                .save(&filename, &contents)
                .await
                .map_err(|err| format!("{err:#}"))
        }
        .await;

        let mut guard = self.inner.lock().await;
        match outcome {
            Ok(path) => {
                self.emit(ControllerEvent::Downloaded { path });
                self.notify(
                    &mut guard,
                    Severity::Success,
                    "Chat history exported successfully",
                );
            }
            Err(err) => {
                warn!(%patient_id, error = %err, "chat history export failed");
                self.notify(
                    &mut guard,
                    Severity::Error,
                    format!("Failed to export chat history: {err}"),
                );
            }
        }
    }

    /// Local view reset only; the server keeps the stored history.
    pub async fn clear_chat(&self, prompt: &dyn ConfirmPrompt) {
        if !prompt.confirm(CLEAR_CHAT_QUESTION).await {
            return;
        }
        let mut guard = self.inner.lock().await;
        guard.view.transcript.reset();
        guard.session.reset_chat();
        guard.refresh_counters();
        self.emit(ControllerEvent::TranscriptChanged);
        self.emit(ControllerEvent::CountersChanged);
    }

    pub async fn view_history(&self) {
        let (patient_id, _) = self.current_patient().await;
        match self.api.chat_history(&patient_id).await {
            Ok(history) if history.is_empty() => {
                let mut guard = self.inner.lock().await;
                self.notify(
                    &mut guard,
                    Severity::Info,
                    "No chat history found for this patient",
                );
            }
            Ok(history) => self.show_history_overlay(history).await,
            Err(err) => {
                warn!(%patient_id, error = %err, "failed to load chat history");
                let mut guard = self.inner.lock().await;
                self.notify(
                    &mut guard,
                    Severity::Error,
                    format!("Failed to load chat history: {err}"),
                );
            }
        }
    }

    pub async fn show_history_overlay(&self, history: Vec<ChatMessage>) {
        let mut guard = self.inner.lock().await;
        guard.view.history_overlay = Some(history);
        self.emit(ControllerEvent::HistoryOverlayChanged);
    }

    pub async fn refresh_history_overlay(&self) {
        self.dismiss_history_overlay().await;
        self.view_history().await;
    }

    pub async fn load_history_overlay_to_chat(&self) {
        self.dismiss_history_overlay().await;
        self.load_chat_history().await;
        let mut guard = self.inner.lock().await;
        self.notify(
            &mut guard,
            Severity::Success,
            "Chat history loaded to conversation",
        );
    }

    pub async fn dismiss_history_overlay(&self) {
        let mut guard = self.inner.lock().await;
        if guard.view.history_overlay.take().is_some() {
            self.emit(ControllerEvent::HistoryOverlayChanged);
        }
    }

    async fn current_patient(&self) -> (PatientId, u64) {
        let guard = self.inner.lock().await;
        (guard.session.current_patient.clone(), guard.patient_generation)
    }

    fn notify(
        &self,
        state: &mut ControllerState,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let now = Instant::now();
        let notification = Notification::new(severity, message, now);
        if state.view.push_notification(notification.clone(), now) {
            self.emit(ControllerEvent::NotificationsExpired);
        }
        self.emit(ControllerEvent::Notified(notification));
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
