//! Local validation and preview of a training-data JSON file before upload.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

const RECOMMENDED_FIELDS: [&str; 6] = [
    "birthdate",
    "gender",
    "blood_type",
    "address",
    "weight",
    "height",
];
const KNOWN_GENDERS: [&str; 4] = ["M", "F", "Male", "Female"];

#[derive(Debug, Error)]
pub enum ImportPreviewError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("File must be a JSON file")]
    NotJsonFile,
    #[error("Invalid JSON file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("JSON file must contain an object at the top level")]
    NotAnObject,
    #[error("JSON file is missing the required \"name\" field")]
    MissingName,
}

/// A parsed import candidate. `contents` is uploaded unchanged on confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPreview {
    pub filename: String,
    pub contents: Vec<u8>,
    pub name: String,
    pub pretty: String,
    pub warnings: Vec<String>,
}

impl ImportPreview {
    pub async fn load(path: &Path) -> Result<Self, ImportPreviewError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| ImportPreviewError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(filename, contents)
    }

    pub fn parse(filename: impl Into<String>, contents: Vec<u8>) -> Result<Self, ImportPreviewError> {
        let filename = filename.into();
        if !filename.to_ascii_lowercase().ends_with(".json") {
            return Err(ImportPreviewError::NotJsonFile);
        }

        let value: Value = serde_json::from_slice(&contents)?;
        let Value::Object(fields) = &value else {
            return Err(ImportPreviewError::NotAnObject);
        };

        let name = match fields.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => return Err(ImportPreviewError::MissingName),
        };

        let mut warnings = Vec::new();
        for field in RECOMMENDED_FIELDS {
            if is_blank(fields.get(field)) {
                warnings.push(format!("Missing recommended field: {field}"));
            }
        }
        for field in ["weight", "height"] {
            if let Some(value) = fields.get(field) {
                if !is_blank(Some(value)) && !value.is_number() {
                    warnings.push(format!("{field} should be a number"));
                }
            }
        }
        if let Some(Value::String(gender)) = fields.get("gender") {
            if !gender.is_empty() && !KNOWN_GENDERS.contains(&gender.as_str()) {
                warnings.push("Gender should be M/F or Male/Female".to_string());
            }
        }

        let pretty = serde_json::to_string_pretty(&value)?;
        Ok(Self {
            filename,
            contents,
            name,
            pretty,
            warnings,
        })
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}
