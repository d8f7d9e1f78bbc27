use std::path::PathBuf;

use shared::domain::PatientId;

pub const HELP: &str = "\
Type a message to chat with the assistant, or use a command:
  /patients              list patients in the selector
  /switch <id>           switch to a patient (\"default\" for the placeholder)
  /info                  show the current patient's details
  /new                   create a patient (prompts for each field)
  /import <file.json>    preview a training-data file
  /confirm               upload the previewed file
  /cancel                close the import preview
  /more [count]          load more training patients
  /export                export the current patient's data
  /export-chat           export the current chat history
  /clear                 clear the conversation view
  /history               show stored chat history
  /history load          load the shown history into the conversation
  /history refresh       reload the shown history
  /history close         close the history view
  /help                  show this help
  /quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Patients,
    Switch(PatientId),
    Info,
    NewPatient,
    Import(PathBuf),
    ConfirmImport,
    CancelImport,
    LoadMore(Option<String>),
    Export,
    ExportChat,
    Clear,
    History,
    HistoryLoad,
    HistoryRefresh,
    HistoryClose,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|arg| !arg.is_empty())),
            None => (rest, None),
        };

        match (name, arg) {
            ("patients", None) => Self::Patients,
            ("switch", Some(id)) => Self::Switch(PatientId::new(id)),
            ("info", None) => Self::Info,
            ("new", None) => Self::NewPatient,
            ("import", Some(path)) => Self::Import(PathBuf::from(path)),
            ("confirm", None) => Self::ConfirmImport,
            ("cancel", None) => Self::CancelImport,
            ("more", count) => Self::LoadMore(count.map(str::to_string)),
            ("export", None) => Self::Export,
            ("export-chat", None) => Self::ExportChat,
            ("clear", None) => Self::Clear,
            ("history", None) => Self::History,
            ("history", Some("load")) => Self::HistoryLoad,
            ("history", Some("refresh")) => Self::HistoryRefresh,
            ("history", Some("close")) => Self::HistoryClose,
            ("help", None) => Self::Help,
            ("quit" | "exit", None) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}
