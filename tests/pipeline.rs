use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use httpmock::{
    Method::{GET, POST},
    MockServer,
};
use rusty_estimator::{
    analysis::{DocumentAnalysisClient, PollPolicy},
    api::create_router,
    completion::AzureOpenAiClient,
    estimate::{EstimationService, ServiceComponents, tasks_from_xlsx},
    rates::{RateTable, StaticRateSource},
    search::SearchIndexClient,
    storage::LocalDirStore,
    vocabulary::Revision,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const COMPLETIONS: &str = "/openai/deployments/gpt/chat/completions";

fn chat_reply(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn app(server: &MockServer, store_root: &std::path::Path, revision: Revision) -> Router {
    let service = EstimationService::new(ServiceComponents {
        store: Arc::new(LocalDirStore::new(store_root)),
        analysis: DocumentAnalysisClient::new(&server.base_url(), "doc-key").expect("analysis"),
        completion: Box::new(
            AzureOpenAiClient::new(&server.url(COMPLETIONS), "llm-key").expect("completion"),
        ),
        search: SearchIndexClient::new(&server.base_url(), "search-key", "tasks").expect("search"),
        rates: Box::new(StaticRateSource::new(RateTable::from_pairs([
            ("Blended FE dev", 200.0),
            ("Project Manager", 400.0),
        ]))),
        poll_policy: PollPolicy {
            interval: Duration::from_millis(1),
            max_polls: 3,
        },
        revision,
    });
    create_router(Arc::new(service))
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .expect("request"),
        )
        .await
        .expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, bytes.to_vec())
}

async fn mock_search_with_one_hit(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/indexes/tasks/docs/search");
            then.status(200).json_body(json!({
                "value": [{
                    "@search.score": 3.1,
                    "id": "7",
                    "Task": "Build booking calendar",
                    "MSCW": "1 Must Have",
                    "Profile": "Blended FE dev",
                    "MinDays": 4,
                    "RealDays": 6,
                    "MaxDays": 9,
                    "EstimatedDays": 8,
                    "EstimatedPrice": 1600.0
                }]
            }));
        })
        .await;
}

#[tokio::test]
async fn document_to_estimate_to_workbook() {
    let server = MockServer::start_async().await;
    let location = server.url("/operations/42");
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/formrecognizer/documentModels/prebuilt-read:analyze");
            then.status(202).header("Operation-Location", location.as_str());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/operations/42");
            then.status(200).json_body(json!({
                "status": "succeeded",
                "analyzeResult": { "content": "Clinic portal with online booking." }
            }));
        })
        .await;
    let query = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS)
                .body_contains("Write a query to search")
                .body_contains("Clinic portal with online booking.");
            then.status(200)
                .json_body(chat_reply("  clinic booking calendar tasks  "));
        })
        .await;
    mock_search_with_one_hit(&server).await;
    let synthesis = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS)
                .body_contains("Ignore the")
                .body_contains("Build booking calendar");
            then.status(200).json_body(chat_reply(
                "```json\n{\"total_price\": 2400, \"tasks\": [\
                 {\"MSCW\": \"1 Must Have\", \"Area\": \"04 Development\", \"Module\": \"Frontend\", \
                 \"Feature\": \"User Interface (UI)\", \"Task\": \"Booking screens\", \
                 \"Profile\": \"Blended FE dev\", \"MinDays\": 4, \"RealDays\": 6, \"MaxDays\": 9, \
                 \"% Contingency\": \"0\", \"EstimatedDays\": 8, \"EstimatedPrice\": 1600, \
                 \"Potential Issues\": \"Calendar integration errors\"},\
                 {\"MSCW\": \"2 Should Have\", \"Area\": \"01 Analyze & Design\", \"Module\": \"Overall\", \
                 \"Feature\": \"Project Manager\", \"Task\": \"Coordination\", \
                 \"Profile\": \"Project Manager\", \"MinDays\": 1, \"RealDays\": 2, \"MaxDays\": 2, \
                 \"% Contingency\": \"0\", \"EstimatedDays\": 2, \"EstimatedPrice\": 800, \
                 \"Potential Issues\": \"\"}]}\n```",
            ));
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&server, dir.path(), Revision::Weighted);

    let (status, body) = send(
        &app,
        Method::POST,
        "/documents?name=clinic.pdf",
        Body::from("%PDF-1.7 clinic"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let document: Value = serde_json::from_slice(&body).expect("json");
    assert!(dir.path().join("clinic.pdf").exists());

    let payload = json!({
        "document_text": document["text"],
        "requirements": "Patients book from their phone"
    });
    let (status, body) = send(&app, Method::POST, "/estimate", Body::from(payload.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    query.assert();
    synthesis.assert();

    let outcome: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(outcome["status"], "estimated");
    assert_eq!(outcome["query"], "clinic booking calendar tasks");
    assert_eq!(outcome["hits"][0]["Task"], "Build booking calendar");
    assert_eq!(outcome["report"]["total_price"], 2400.0);
    assert_eq!(outcome["report"]["total_days"], 10.0);
    assert_eq!(outcome["report"]["declared_summary"], "2400");
    assert_eq!(outcome["report"]["issues"], json!([]));

    let export = json!({ "tasks": outcome["report"]["tasks"] });
    let (status, body) = send(&app, Method::POST, "/export/xlsx", Body::from(export.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    let tasks = tasks_from_xlsx(&body).expect("workbook");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].potential_issues, vec!["Calendar integration errors".to_string()]);
    assert_eq!(tasks[1].estimated_price, 800.0);

    let (_, body) = send(&app, Method::GET, "/metrics", Body::empty()).await;
    let metrics: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(metrics["documents_analyzed"], 1);
    assert_eq!(metrics["queries_generated"], 1);
    assert_eq!(metrics["estimates_produced"], 1);
    assert_eq!(metrics["failures"], 0);
}

#[tokio::test]
async fn bounded_revision_flags_out_of_range_days() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS)
                .body_contains("Write a query to search");
            then.status(200).json_body(chat_reply("calendar"));
        })
        .await;
    mock_search_with_one_hit(&server).await;
    let synthesis = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(COMPLETIONS)
                .body_contains("total_duration");
            then.status(200).json_body(chat_reply(
                "{\"total_duration\": 12, \"tasks\": [{\"MSCW\": \"1 Must Have\", \
                 \"Area\": \"04 Development\", \"Module\": \"Frontend\", \"Feature\": \"General\", \
                 \"Task\": \"Calendar\", \"Profile\": \"Blended FE dev\", \"MinDays\": 4, \
                 \"RealDays\": 6, \"MaxDays\": 9, \"EstimatedDays\": 12, \"EstimatedPrice\": 2400}]}",
            ));
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&server, dir.path(), Revision::Bounded);
    let payload = json!({ "requirements": "Calendar sync" });
    let (status, body) = send(&app, Method::POST, "/estimate", Body::from(payload.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    synthesis.assert();
    let outcome: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(outcome["report"]["summary_field"], "total_duration");
    let issues = outcome["report"]["issues"].as_array().expect("issues");
    assert!(
        issues.iter().any(|issue| issue["field"] == "EstimatedDays"),
        "out-of-range days must be flagged: {issues:?}"
    );
}

#[tokio::test]
async fn provider_outage_maps_to_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(COMPLETIONS);
            then.status(500).body("deployment offline");
        })
        .await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST).path("/indexes/tasks/docs/search");
            then.status(200).json_body(json!({ "value": [] }));
        })
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let app = app(&server, dir.path(), Revision::Weighted);
    let payload = json!({ "requirements": "Anything" });
    let (status, body) = send(&app, Method::POST, "/estimate", Body::from(payload.to_string())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(String::from_utf8_lossy(&body).contains("deployment offline"));
    search.assert_hits(0);

    let (_, body) = send(&app, Method::GET, "/metrics", Body::empty()).await;
    let metrics: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(metrics["failures"], 1);
}
