//! Text projection of controller state for the terminal.

use std::sync::Arc;

use client_core::{
    view::{
        ImportDialog, Notification, PatientPanel, PatientSelector, Severity, TranscriptEntry,
        PENDING_INDICATOR, REGULAR_GROUP_LABEL, TRAINING_GROUP_LABEL, WELCOME_MESSAGE,
    },
    ControllerEvent, DiagnosticianController, Snapshot,
};
use shared::domain::{ChatMessage, MessageRole};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

pub fn transcript_line(entry: &TranscriptEntry) -> String {
    let speaker = match entry.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
    };
    format!("[{}] {speaker}: {}", entry.time_label, entry.content)
}

pub fn notification_line(notification: &Notification) -> String {
    let tag = match notification.severity {
        Severity::Error => "error",
        Severity::Success => "ok",
        Severity::Info => "info",
    };
    format!("({tag}) {}", notification.message)
}

pub fn panel_lines(panel: &PatientPanel) -> Vec<String> {
    let mut lines = vec![
        format!("Name:    {}", panel.name),
        format!("Age:     {}", panel.age),
        format!("Gender:  {}", panel.gender),
        format!("Phone:   {}", panel.phone),
        format!("History: {}", panel.history_summary),
    ];
    if let Some(details) = &panel.training_details {
        let fields = [
            ("Birthdate", &details.birthdate),
            ("Blood type", &details.blood_type),
            ("Weight", &details.weight),
            ("Height", &details.height),
            ("Address", &details.address),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                lines.push(format!("{label}: {value}"));
            }
        }
    }
    lines
}

pub fn selector_lines(selector: &PatientSelector) -> Vec<String> {
    let marker = |id: &shared::domain::PatientId| {
        if *id == selector.selected {
            "*"
        } else {
            " "
        }
    };
    let default = PatientSelector::default_entry();
    let mut lines = vec![format!("{} {} ({})", marker(&default.id), default.label, default.id)];
    for (group, entries) in [
        (REGULAR_GROUP_LABEL, &selector.regular),
        (TRAINING_GROUP_LABEL, &selector.training),
    ] {
        if entries.is_empty() {
            continue;
        }
        lines.push(format!("{group}:"));
        for entry in entries {
            lines.push(format!("{} {} ({})", marker(&entry.id), entry.label, entry.id));
        }
    }
    lines
}

pub fn history_lines(history: &[ChatMessage]) -> Vec<String> {
    history
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "Patient",
                MessageRole::Assistant => "AI Assistant",
            };
            match &message.timestamp {
                Some(at) => format!("{speaker} ({at}): {}", message.content),
                None => format!("{speaker}: {}", message.content),
            }
        })
        .collect()
}

fn import_lines(dialog: &ImportDialog) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(file) = &dialog.selected_file {
        lines.push(format!("Selected file: {file}"));
    }
    if let Some(preview) = &dialog.preview {
        lines.extend(preview.lines().map(str::to_string));
    }
    lines.extend(dialog.warnings.iter().map(|warning| format!("warning: {warning}")));
    if dialog.uploading {
        lines.push("Uploading...".to_string());
    } else if dialog.confirm_enabled {
        lines.push("Type /confirm to import or /cancel to close.".to_string());
    }
    lines
}

/// Tracks what has already been printed so transcript updates only append.
/// A replaced or shortened transcript is printed again from the top.
#[derive(Debug, Default)]
pub struct Renderer {
    printed_entries: usize,
    printed_revision: u64,
    showed_pending: bool,
}

impl Renderer {
    pub fn render(&mut self, event: &ControllerEvent, snapshot: &Snapshot) -> Vec<String> {
        let view = &snapshot.view;
        match event {
            ControllerEvent::TranscriptChanged => {
                let transcript = &view.transcript;
                let entries = &transcript.entries;
                let mut lines = Vec::new();
                if transcript.revision != self.printed_revision
                    || entries.len() < self.printed_entries
                    || entries.is_empty()
                {
                    self.printed_entries = 0;
                    self.printed_revision = transcript.revision;
                    if entries.is_empty() {
                        lines.push(format!("assistant: {WELCOME_MESSAGE}"));
                    }
                }
                lines.extend(entries[self.printed_entries..].iter().map(transcript_line));
                self.printed_entries = entries.len();
                if view.transcript.pending && !self.showed_pending {
                    lines.push(PENDING_INDICATOR.to_string());
                }
                self.showed_pending = view.transcript.pending;
                lines
            }
            ControllerEvent::PatientPanelChanged => panel_lines(&view.patient_panel),
            ControllerEvent::SymptomsChanged => match &view.symptoms {
                Some(report) => vec![format!(
                    "Symptoms ({}): {}",
                    report.date.format("%Y-%m-%d"),
                    report.symptoms.join(", ")
                )],
                None => Vec::new(),
            },
            ControllerEvent::ImportDialogChanged => view
                .import_dialog
                .as_ref()
                .map(import_lines)
                .unwrap_or_default(),
            ControllerEvent::HistoryOverlayChanged => match &view.history_overlay {
                Some(history) => {
                    let mut lines = vec![format!("Chat history ({} messages):", history.len())];
                    lines.extend(history_lines(history));
                    lines.push("Use /history load, /history refresh or /history close.".into());
                    lines
                }
                None => Vec::new(),
            },
            ControllerEvent::TrainingControlsChanged => {
                vec![format!("[{}]", view.load_more.label)]
            }
            ControllerEvent::Notified(notification) => vec![notification_line(notification)],
            ControllerEvent::Downloaded { path } => vec![format!("Saved {}", path.display())],
            ControllerEvent::ComposerChanged
            | ControllerEvent::SelectorChanged
            | ControllerEvent::CountersChanged
            | ControllerEvent::NewPatientDialogChanged
            | ControllerEvent::NotificationsExpired => Vec::new(),
        }
    }
}

/// Prints controller events until the controller's event channel closes.
pub async fn run(
    controller: Arc<DiagnosticianController>,
    mut events: broadcast::Receiver<ControllerEvent>,
) {
    let mut renderer = Renderer::default();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "render: lagged behind controller events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let snapshot = controller.snapshot().await;
        for line in renderer.render(&event, &snapshot) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use client_core::{state::TrainingPatientSet, view::ViewState};
    use shared::domain::{PatientId, TrainingDetails};
    use tokio::time::Instant;

    use super::*;

    fn snapshot(view: ViewState) -> Snapshot {
        Snapshot {
            session: Default::default(),
            training: TrainingPatientSet::default(),
            view,
        }
    }

    #[test]
    fn transcript_updates_only_print_new_entries() {
        let mut renderer = Renderer::default();
        let mut view = ViewState::default();
        view.transcript
            .entries
            .push(TranscriptEntry::new(MessageRole::User, "hello", Utc::now()));
        view.transcript.pending = true;

        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view.clone()));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("you: hello"));
        assert_eq!(lines[1], PENDING_INDICATOR);

        view.transcript.pending = false;
        view.transcript
            .entries
            .push(TranscriptEntry::new(MessageRole::Assistant, "hi", Utc::now()));
        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view.clone()));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("assistant: hi"));

        view.transcript.reset();
        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view));
        assert_eq!(lines, vec![format!("assistant: {WELCOME_MESSAGE}")]);
    }

    #[test]
    fn replaced_transcript_is_printed_from_the_top() {
        let mut renderer = Renderer::default();
        let mut view = ViewState::default();
        view.transcript
            .replace(vec![TranscriptEntry::new(MessageRole::User, "A1", Utc::now())]);
        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view.clone()));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("you: A1"));

        view.transcript.replace(vec![
            TranscriptEntry::new(MessageRole::User, "B1", Utc::now()),
            TranscriptEntry::new(MessageRole::Assistant, "B2", Utc::now()),
        ]);
        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view.clone()));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("you: B1"));
        assert!(lines[1].ends_with("assistant: B2"));

        view.transcript
            .entries
            .push(TranscriptEntry::new(MessageRole::User, "B3", Utc::now()));
        let lines = renderer.render(&ControllerEvent::TranscriptChanged, &snapshot(view));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("you: B3"));
    }

    #[test]
    fn training_details_are_listed_when_present() {
        let panel = PatientPanel {
            training_details: Some(TrainingDetails {
                blood_type: Some("B+".into()),
                ..TrainingDetails::default()
            }),
            ..PatientPanel::placeholder()
        };
        let lines = panel_lines(&panel);
        assert_eq!(lines.last().map(String::as_str), Some("Blood type: B+"));
    }

    #[test]
    fn selector_marks_the_current_patient() {
        let selector = PatientSelector {
            regular: vec![client_core::view::SelectorEntry {
                id: PatientId::new("p1"),
                label: "Jane Doe".into(),
            }],
            training: Vec::new(),
            selected: PatientId::new("p1"),
        };
        let lines = selector_lines(&selector);
        assert_eq!(lines[0], "  Default Patient (default)");
        assert_eq!(lines[1], "Regular Patients:");
        assert_eq!(lines[2], "* Jane Doe (p1)");
    }

    #[test]
    fn notifications_are_tagged_by_severity() {
        let line = notification_line(&Notification::new(
            Severity::Error,
            "Please enter patient name",
            Instant::now(),
        ));
        assert_eq!(line, "(error) Please enter patient name");
    }
}
