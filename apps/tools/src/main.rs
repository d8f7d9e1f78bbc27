use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    DiagnosticianApi, DirectoryDownloads, DownloadSink, HttpDiagnosticianApi,
    DEFAULT_REQUEST_TIMEOUT,
};
use shared::{
    domain::PatientId,
    protocol::{IdSource, PatientExport, RenameTrainingPatientRequest},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DIAGNOSTICIAN_SERVER_URL", default_value = "http://localhost:8000")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the training dataset summary.
    Summary,
    ListPatients {
        /// List the first N training patients instead of registered ones.
        #[arg(long)]
        training: Option<usize>,
    },
    ShowPatient {
        patient_id: String,
        /// Look the id up in the training dataset.
        #[arg(long)]
        training: bool,
    },
    ExportPatient {
        patient_id: String,
        /// Directory the export is written to.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    Import {
        file: PathBuf,
    },
    /// Copy the first N training patients into the patient store.
    ImportTrainingToStore {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    RenameTraining {
        old_id: String,
        new_id: String,
    },
}

/// Server-supplied names never leave `out_dir`.
async fn save_export(out_dir: &Path, export: &PatientExport) -> Result<PathBuf> {
    let contents = serde_json::to_vec_pretty(&export.data)?;
    DirectoryDownloads::new(out_dir)
        .save(&export.filename, &contents)
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    let api = HttpDiagnosticianApi::new(&cli.server_url, DEFAULT_REQUEST_TIMEOUT)?;

    match cli.command {
        Command::Summary => {
            let summary = api.training_summary().await?;
            println!("total_patients={}", summary.total_patients);
            for (gender, count) in &summary.gender_distribution {
                println!("gender {gender}={count}");
            }
            if let Some(ages) = summary.age_statistics {
                println!(
                    "age known={} unknown={} average={:.1}",
                    ages.known, ages.unknown, ages.average
                );
            }
        }
        Command::ListPatients { training } => {
            let patients = match training {
                Some(limit) => api.training_patients(limit).await?,
                None => api.list_patients().await?,
            };
            for patient in patients {
                println!("{}\t{}", patient.id, patient.name);
            }
        }
        Command::ShowPatient {
            patient_id,
            training,
        } => {
            let id = PatientId::new(patient_id);
            let patient = if training {
                api.training_patient(&id).await?
            } else {
                api.patient(&id).await?
            };
            println!("{}\t{}", patient.id, patient.name);
            if let Some(age) = patient.age {
                println!("age={age}");
            }
            for (label, value) in [
                ("gender", &patient.gender),
                ("phone", &patient.phone),
                ("email", &patient.email),
                ("birthdate", &patient.training.birthdate),
                ("blood_type", &patient.training.blood_type),
                ("weight", &patient.training.weight),
                ("height", &patient.training.height),
                ("address", &patient.training.address),
            ] {
                if let Some(value) = value {
                    println!("{label}={value}");
                }
            }
        }
        Command::ExportPatient {
            patient_id,
            out_dir,
        } => {
            let export = api.export_patient(&PatientId::new(patient_id)).await?;
            let path = save_export(&out_dir, &export).await?;
            println!("exported {}", path.display());
        }
        Command::Import { file } => {
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .context("import path has no file name")?;
            let contents = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let response = api.import_training_json(&filename, contents).await?;
            let origin = match response.id_source {
                IdSource::Filename => "from filename",
                IdSource::Generated => "generated",
            };
            println!("imported patient_id={} ({origin})", response.patient_id);
        }
        Command::ImportTrainingToStore { limit } => {
            let result = api.import_training_to_store(limit).await?;
            println!(
                "imported={} processed={}",
                result.imported_count, result.total_processed
            );
            for error in &result.errors {
                println!("error {error}");
            }
        }
        Command::RenameTraining { old_id, new_id } => {
            let response = api
                .rename_training_patient(&RenameTrainingPatientRequest { old_id, new_id })
                .await?;
            println!("renamed {} -> {}", response.old_id, response.new_id);
        }
    }

    Ok(())
}
