use rusty_estimator::{
    completion::{AzureOpenAiClient, CompletionClient, CompletionRequest},
    config::{self, Config},
    rates::rate_source_from_config,
    search::SearchIndexClient,
};

fn live_config() -> &'static Config {
    config::init_config().expect("live tests need a complete .env")
}

#[tokio::test]
#[ignore = "Requires a live search index"]
async fn live_search_returns_documents() {
    let client = SearchIndexClient::from_config(live_config()).expect("search client");
    let hits = client
        .search("authentication setup", 5)
        .await
        .expect("search request");
    assert!(hits.len() <= 5, "top must cap results: {}", hits.len());
    assert!(
        client.max_document_id().await.expect("max id").is_some() || hits.is_empty(),
        "an index with hits must have a numeric max id"
    );
}

#[tokio::test]
#[ignore = "Requires a live completion deployment"]
async fn live_completion_answers() {
    let client = AzureOpenAiClient::from_config(live_config()).expect("completion client");
    let text = client
        .complete(CompletionRequest {
            prompt: "Reply with the single word: ready".into(),
            max_tokens: 5,
            temperature: 0.0,
        })
        .await
        .expect("completion request");
    assert!(!text.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires the roles_rates database or RATE_TABLE_PATH"]
async fn live_rate_table_is_populated() {
    let rates = rate_source_from_config(live_config())
        .try_fetch()
        .await
        .expect("rate table");
    assert!(!rates.is_empty());
}
