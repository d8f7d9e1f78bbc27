use std::{collections::HashMap, sync::Arc};

use super::*;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    chats: Arc<Mutex<Vec<ChatRequest>>>,
    limits: Arc<Mutex<Vec<usize>>>,
    uploads: Arc<Mutex<Vec<(String, Option<String>, Vec<u8>)>>>,
    store_imports: Arc<Mutex<Vec<Value>>>,
}

async fn handle_chat(
    State(state): State<ServerState>,
    Json(request): Json<ChatRequest>,
) -> Json<Value> {
    let reply = format!("echo: {}", request.message);
    state.chats.lock().await.push(request);
    Json(json!({ "response": reply, "timestamp": "2024-05-01T10:00:00" }))
}

async fn handle_patient(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
    match id.as_str() {
        "p1" => (
            StatusCode::OK,
            Json(json!({
                "id": "p1",
                "name": "Jane Doe",
                "age": 33,
                "medical_history": {"records": [{"condition": "asthma", "date": "2020"}]}
            })),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Patient not found" })),
        ),
    }
}

async fn handle_summary() -> Json<Value> {
    Json(json!({ "error": "Training data not loaded", "details": ["dataset missing"] }))
}

async fn handle_training_patients(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let limit: usize = params
        .get("limit")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(10);
    state.limits.lock().await.push(limit);
    let patients: Vec<Value> = (1..=limit)
        .map(|n| {
            json!({
                "id": format!("training_{n}"),
                "name": format!("Trainee {n}"),
                "blood_type": "O+"
            })
        })
        .collect();
    Json(Value::Array(patients))
}

async fn handle_import(State(state): State<ServerState>, mut multipart: Multipart) -> Json<Value> {
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.expect("field bytes").to_vec();
        state.uploads.lock().await.push((name, filename, bytes));
    }
    Json(json!({
        "filename": "patient_42_record.json",
        "patient_id": "42",
        "id_source": "filename",
        "message": "Import succeeded"
    }))
}

async fn handle_store_import(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let limit = body["limit"].as_u64().unwrap_or(10);
    state.store_imports.lock().await.push(body);
    if limit > 100 {
        return Json(json!({ "error": "limit too large", "status": "failed" }));
    }
    Json(json!({
        "imported_count": 2,
        "total_processed": limit,
        "errors": ["Error importing training_3: duplicate"],
        "status": "success"
    }))
}

async fn handle_history(Path(id): Path<String>) -> Json<Value> {
    if id == "p1" {
        Json(json!([
            {"type": "user", "content": "I have a cough", "timestamp": "09:00"},
            {"type": "assistant", "content": "How long?"}
        ]))
    } else {
        Json(json!([]))
    }
}

async fn spawn_api_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/history/:id", get(handle_history))
        .route("/api/patient/:id", get(handle_patient))
        .route("/api/training/summary", get(handle_summary))
        .route("/api/training/patients", get(handle_training_patients))
        .route("/api/training/import-json", post(handle_import))
        .route("/api/training/import", post(handle_store_import))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

async fn client() -> (HttpDiagnosticianApi, ServerState) {
    let (server_url, state) = spawn_api_server().await.expect("spawn server");
    let api = HttpDiagnosticianApi::new(&server_url, DEFAULT_REQUEST_TIMEOUT).expect("client");
    (api, state)
}

#[tokio::test]
async fn send_chat_posts_message_and_patient() {
    let (api, state) = client().await;

    let reply = api
        .send_chat(&ChatRequest {
            message: "I have a headache".to_string(),
            patient_id: PatientId::new("p1"),
        })
        .await
        .expect("chat reply");

    assert_eq!(reply.response, "echo: I have a headache");
    let chats = state.chats.lock().await;
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].patient_id.as_str(), "p1");
}

#[tokio::test]
async fn patient_lookup_maps_wire_record() {
    let (api, _state) = client().await;

    let patient = api.patient(&PatientId::new("p1")).await.expect("patient");
    assert_eq!(patient.name, "Jane Doe");
    assert_eq!(patient.age, Some(33));
    assert!(!patient.is_training());
}

#[tokio::test]
async fn not_found_surfaces_server_error_text() {
    let (api, _state) = client().await;

    let err = api
        .patient(&PatientId::new("missing"))
        .await
        .expect_err("should fail");
    match err {
        ApiClientError::Server { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Patient not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn error_field_with_ok_status_is_still_an_error() {
    let (api, _state) = client().await;

    let err = api.training_summary().await.expect_err("should fail");
    assert!(err.is_server());
    assert_eq!(err.to_string(), "Training data not loaded (dataset missing)");
}

#[tokio::test]
async fn training_patients_sends_limit_query() {
    let (api, state) = client().await;

    let patients = api.training_patients(3).await.expect("patients");
    assert_eq!(patients.len(), 3);
    assert!(patients.iter().all(Patient::is_training));
    assert_eq!(patients[0].training.blood_type.as_deref(), Some("O+"));
    assert_eq!(*state.limits.lock().await, vec![3]);
}

#[tokio::test]
async fn import_uploads_raw_file_as_multipart() {
    let (api, state) = client().await;
    let contents = br#"{"name": "Imported"}"#.to_vec();

    let response = api
        .import_training_json("patient_42_record.json", contents.clone())
        .await
        .expect("import");

    assert_eq!(response.patient_id.as_str(), "42");
    assert_eq!(response.id_source, shared::protocol::IdSource::Filename);
    let uploads = state.uploads.lock().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "file");
    assert_eq!(uploads[0].1.as_deref(), Some("patient_42_record.json"));
    assert_eq!(uploads[0].2, contents);
}

#[tokio::test]
async fn training_store_import_posts_limit_and_reports_counts() {
    let (api, state) = client().await;

    let result = api.import_training_to_store(3).await.expect("store import");
    assert_eq!(result.imported_count, 2);
    assert_eq!(result.total_processed, 3);
    assert_eq!(result.errors, vec!["Error importing training_3: duplicate"]);
    assert_eq!(result.status.as_deref(), Some("success"));
    assert_eq!(*state.store_imports.lock().await, vec![json!({ "limit": 3 })]);

    let err = api
        .import_training_to_store(500)
        .await
        .expect_err("should fail");
    assert!(err.is_server());
    assert_eq!(err.to_string(), "limit too large");
}

#[tokio::test]
async fn chat_history_decodes_roles() {
    let (api, _state) = client().await;

    let history = api.chat_history(&PatientId::new("p1")).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, shared::domain::MessageRole::User);
    assert_eq!(history[0].timestamp.as_deref(), Some("09:00"));
    assert_eq!(history[1].role, shared::domain::MessageRole::Assistant);

    let empty = api.chat_history(&PatientId::default()).await.expect("history");
    assert!(empty.is_empty());
}

#[test]
fn base_path_is_preserved_in_endpoints() {
    let api = HttpDiagnosticianApi::new("http://localhost:8000/proxy/", DEFAULT_REQUEST_TIMEOUT)
        .expect("client");
    let url = api
        .endpoint(&["api", "patient", "a b"])
        .expect("endpoint");
    assert_eq!(url.as_str(), "http://localhost:8000/proxy/api/patient/a%20b");
}

#[tokio::test]
async fn transport_failure_is_not_a_server_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let api = HttpDiagnosticianApi::new(&format!("http://{addr}"), DEFAULT_REQUEST_TIMEOUT)
        .expect("client");
    let err = api.list_patients().await.expect_err("should fail");
    assert!(matches!(err, ApiClientError::Transport(_)));
}

#[test]
fn rejects_unusable_server_url() {
    assert!(HttpDiagnosticianApi::new("not a url", DEFAULT_REQUEST_TIMEOUT).is_err());
    assert!(HttpDiagnosticianApi::new("mailto:x@example.com", DEFAULT_REQUEST_TIMEOUT).is_err());
}
