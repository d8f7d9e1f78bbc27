use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{
    view::NewPatientForm, ConfirmPrompt, DiagnosticianController, DirectoryDownloads,
    HttpDiagnosticianApi,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, Mutex},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{Command, HELP};
use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the virtual diagnostician")]
struct Args {
    /// Config file; missing files are skipped.
    #[arg(long, default_value = "diagnostician.toml")]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

type Lines = Arc<Mutex<mpsc::Receiver<String>>>;

fn spawn_stdin_reader() -> Lines {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    Arc::new(Mutex::new(rx))
}

async fn next_line(lines: &Lines) -> Option<String> {
    lines.lock().await.recv().await
}

async fn ask(lines: &Lines, question: &str) -> Option<String> {
    println!("{question}");
    next_line(lines).await
}

struct TerminalPrompt {
    lines: Lines,
}

#[async_trait]
impl ConfirmPrompt for TerminalPrompt {
    async fn confirm(&self, question: &str) -> bool {
        match ask(&self.lines, &format!("{question} [y/N]")).await {
            Some(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}

/// Walks the create-patient dialog one field at a time; `/cancel` closes it.
async fn new_patient_dialog(controller: &DiagnosticianController, lines: &Lines) {
    controller.open_new_patient_dialog().await;
    let mut form = NewPatientForm::default();
    let fields: [(&str, &mut String); 5] = [
        ("Name:", &mut form.name),
        ("Age (optional):", &mut form.age),
        ("Gender (optional):", &mut form.gender),
        ("Phone (optional):", &mut form.phone),
        ("Email (optional):", &mut form.email),
    ];
    for (question, slot) in fields {
        match ask(lines, question).await {
            Some(answer) if answer.trim() != "/cancel" => *slot = answer,
            _ => {
                controller.close_new_patient_dialog().await;
                return;
            }
        }
    }
    controller.create_patient(form).await;
}

async fn run_repl(
    controller: Arc<DiagnosticianController>,
    lines: Lines,
    load_more_default: usize,
) {
    let prompt = TerminalPrompt {
        lines: Arc::clone(&lines),
    };
    println!("{HELP}");

    while let Some(line) = next_line(&lines).await {
        match Command::parse(&line) {
            Command::Chat(text) => controller.send_message(&text).await,
            Command::Patients => {
                let snapshot = controller.snapshot().await;
                for entry in render::selector_lines(&snapshot.view.selector) {
                    println!("{entry}");
                }
            }
            Command::Switch(id) => controller.switch_patient(id).await,
            Command::Info => {
                let snapshot = controller.snapshot().await;
                for field in render::panel_lines(&snapshot.view.patient_panel) {
                    println!("{field}");
                }
                println!(
                    "Messages: {}  Duration: {}",
                    snapshot.session.message_count, snapshot.view.duration_label
                );
            }
            Command::NewPatient => new_patient_dialog(&controller, &lines).await,
            Command::Import(path) => {
                controller.open_import_dialog().await;
                controller.preview_training_file(&path).await;
            }
            Command::ConfirmImport => controller.confirm_training_import().await,
            Command::CancelImport => controller.cancel_import().await,
            Command::LoadMore(count) => {
                let count = count.unwrap_or_else(|| load_more_default.to_string());
                controller.load_more_training_data(&count).await;
            }
            Command::Export => controller.export_patient_data().await,
            Command::ExportChat => controller.export_chat_history().await,
            Command::Clear => controller.clear_chat(&prompt).await,
            Command::History => controller.view_history().await,
            Command::HistoryLoad => controller.load_history_overlay_to_chat().await,
            Command::HistoryRefresh => controller.refresh_history_overlay().await,
            Command::HistoryClose => controller.dismiss_history_overlay().await,
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Empty => {}
            Command::Unknown(raw) => println!("Unknown command: {raw} (try /help)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        settings.request_timeout_secs = timeout_secs;
    }
    if let Some(download_dir) = args.download_dir {
        settings.download_dir = download_dir;
    }
    settings.validate().context("invalid configuration")?;
    info!(
        server_url = %settings.server_url,
        download_dir = %settings.download_dir.display(),
        "diagnostician starting"
    );

    let api = HttpDiagnosticianApi::new(&settings.server_url, settings.request_timeout())?;
    let downloads = DirectoryDownloads::new(settings.download_dir.clone());
    let controller = DiagnosticianController::new(Arc::new(api), Arc::new(downloads));

    let renderer = tokio::spawn(render::run(
        Arc::clone(&controller),
        controller.subscribe_events(),
    ));
    let ticker = controller.start().await;

    run_repl(
        Arc::clone(&controller),
        spawn_stdin_reader(),
        settings.load_more_default,
    )
    .await;

    ticker.stop();
    renderer.abort();
    info!("diagnostician stopped");
    Ok(())
}
