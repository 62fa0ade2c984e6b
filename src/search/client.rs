//! HTTP client wrapper for the hosted search index.

use crate::search::types::{
    ID_NUMBER_FIELD, IdOnly, IndexingResult, SearchDocument, SearchError, SearchHit,
    SearchResponse, UploadSummary,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// REST API version sent with every request.
pub const API_VERSION: &str = "2023-11-01";

/// Number of hits requested by a similarity search.
pub const DEFAULT_TOP: usize = 5;

/// Largest batch accepted by a single indexing request.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Lightweight HTTP client for one search index.
pub struct SearchIndexClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) index_name: String,
}

impl SearchIndexClient {
    /// Construct a client for `index_name` on the service at `endpoint`.
    pub fn new(endpoint: &str, api_key: &str, index_name: &str) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent("rusty-estimator/search")
            .build()?;
        let base_url = normalize_base_url(endpoint).map_err(SearchError::InvalidUrl)?;
        tracing::debug!(url = %base_url, index = index_name, "Initialized search index client");

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            index_name: index_name.to_string(),
        })
    }

    /// Build a client from the global configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, SearchError> {
        Self::new(
            &config.search_endpoint,
            &config.search_api_key,
            &config.search_index_name,
        )
    }

    /// Name of the index this client targets.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Full-text search returning up to `top` hits in service ranking order.
    pub async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, SearchError> {
        let body = json!({ "search": query, "top": top });
        let response = self
            .request(
                Method::POST,
                &format!("indexes/{}/docs/search", self.index_name),
            )
            .json(&body)
            .send()
            .await?;

        let response = self.check(response, "Search request failed").await?;
        let SearchResponse { value } = response.json::<SearchResponse<SearchHit>>().await?;
        tracing::debug!(index = %self.index_name, hits = value.len(), "Search completed");
        Ok(value)
    }

    /// Highest document id currently stored, or `None` for an empty index.
    ///
    /// Orders by [`ID_NUMBER_FIELD`] so that "10" ranks above "9"; the string key is only
    /// read when a document lacks the numeric mirror.
    pub async fn max_document_id(&self) -> Result<Option<u64>, SearchError> {
        let body = json!({
            "search": "*",
            "select": format!("id,{ID_NUMBER_FIELD}"),
            "orderby": format!("{ID_NUMBER_FIELD} desc"),
            "top": 1,
        });
        let response = self
            .request(
                Method::POST,
                &format!("indexes/{}/docs/search", self.index_name),
            )
            .json(&body)
            .send()
            .await?;

        let response = self.check(response, "Max id lookup failed").await?;
        let SearchResponse { value } = response.json::<SearchResponse<IdOnly>>().await?;
        match value.into_iter().next() {
            None => Ok(None),
            Some(IdOnly {
                id_number: Some(number),
                ..
            }) => Ok(Some(number)),
            Some(IdOnly { id, .. }) => id
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| SearchError::InvalidDocumentId(id)),
        }
    }

    /// Upload documents in batches of at most [`MAX_BATCH_SIZE`].
    ///
    /// Rejected documents are counted, not treated as a request failure.
    pub async fn upload_documents(
        &self,
        documents: &[SearchDocument],
    ) -> Result<UploadSummary, SearchError> {
        let mut summary = UploadSummary::default();
        for batch in documents.chunks(MAX_BATCH_SIZE) {
            let actions = batch
                .iter()
                .map(upload_action)
                .collect::<Result<Vec<Value>, _>>()?;

            let response = self
                .request(
                    Method::POST,
                    &format!("indexes/{}/docs/index", self.index_name),
                )
                .json(&json!({ "value": actions }))
                .send()
                .await?;

            let response = self.check(response, "Document upload failed").await?;
            let SearchResponse { value } =
                response.json::<SearchResponse<IndexingResult>>().await?;
            summary.batches += 1;
            for result in value {
                if result.status {
                    summary.uploaded += 1;
                } else {
                    summary.failed += 1;
                    tracing::warn!(
                        key = %result.key,
                        error = result.error_message.as_deref().unwrap_or("unknown"),
                        "Document rejected by index"
                    );
                }
            }
            tracing::debug!(
                index = %self.index_name,
                batch = summary.batches,
                size = batch.len(),
                "Uploaded document batch"
            );
        }
        Ok(summary)
    }

    /// Delete the index. A missing index is not an error.
    pub async fn delete_index(&self) -> Result<(), SearchError> {
        let response = self
            .request(Method::DELETE, &format!("indexes/{}", self.index_name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(index = %self.index_name, "Index did not exist");
            return Ok(());
        }
        self.check(response, "Index deletion failed").await?;
        tracing::info!(index = %self.index_name, "Index deleted");
        Ok(())
    }

    /// Create the index from `schema`; its `name` is forced to this client's index.
    pub async fn create_index(&self, schema: &Value) -> Result<(), SearchError> {
        let mut schema = schema.clone();
        if let Value::Object(map) = &mut schema {
            map.insert("name".into(), json!(self.index_name));
        }
        let response = self
            .request(Method::POST, "indexes")
            .json(&schema)
            .send()
            .await?;

        self.check(response, "Index creation failed").await?;
        tracing::info!(index = %self.index_name, "Index created");
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        self.client
            .request(method, url)
            .query(&[("api-version", API_VERSION)])
            .header("api-key", &self.api_key)
    }

    async fn check(
        &self,
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<reqwest::Response, SearchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = SearchError::UnexpectedStatus { status, body };
        tracing::error!(index = %self.index_name, error = %error, "{context}");
        Err(error)
    }
}

fn upload_action(document: &SearchDocument) -> Result<Value, SearchError> {
    let mut value = serde_json::to_value(document).map_err(|source| SearchError::Encode {
        id: document.id.clone(),
        source,
    })?;
    if let Value::Object(map) = &mut value {
        map.insert("@search.action".into(), json!("upload"));
    }
    Ok(value)
}

/// Index definition matching [`SearchDocument`].
pub fn default_index_schema(index_name: &str) -> Value {
    let text = |name: &str| {
        json!({
            "name": name, "type": "Edm.String",
            "searchable": true, "filterable": true, "facetable": true, "sortable": false
        })
    };
    let integer = |name: &str| {
        json!({
            "name": name, "type": "Edm.Int32",
            "searchable": false, "filterable": true, "facetable": false, "sortable": true
        })
    };

    json!({
        "name": index_name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "searchable": false,
              "filterable": true, "sortable": true, "facetable": false },
            { "name": ID_NUMBER_FIELD, "type": "Edm.Int64", "searchable": false,
              "filterable": true, "sortable": true, "facetable": false },
            { "name": "Task", "type": "Edm.String", "searchable": true,
              "filterable": false, "sortable": false, "facetable": false },
            text("MSCW"),
            text("Area"),
            text("Module"),
            text("Feature"),
            text("Profile"),
            integer("MinDays"),
            integer("RealDays"),
            integer("MaxDays"),
            { "name": "Contingency", "type": "Edm.String", "searchable": false,
              "filterable": true, "sortable": false, "facetable": false },
            integer("EstimatedDays"),
            { "name": "EstimatedPrice", "type": "Edm.Double", "searchable": false,
              "filterable": true, "sortable": true, "facetable": false },
            { "name": "PotentialIssues", "type": "Edm.String", "searchable": true,
              "filterable": false, "sortable": false, "facetable": false }
        ]
    })
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, POST},
        MockServer,
    };

    fn service(server: &MockServer) -> SearchIndexClient {
        SearchIndexClient {
            client: Client::builder()
                .user_agent("rusty-estimator-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: "search-key".into(),
            index_name: "tasks".into(),
        }
    }

    fn document(id: u64) -> SearchDocument {
        SearchDocument {
            id: id.to_string(),
            id_number: id as i64,
            task: format!("Task {id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn search_emits_expected_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/tasks/docs/search")
                    .query_param("api-version", API_VERSION)
                    .header("api-key", "search-key")
                    .json_body(json!({ "search": "mobile booking app", "top": 5 }));
                then.status(200).json_body(json!({
                    "value": [
                        { "@search.score": 3.1, "id": "4", "Task": "Design booking flow", "MinDays": 1 },
                        { "@search.score": 1.2, "id": "9", "Task": "Push notifications" }
                    ]
                }));
            })
            .await;

        let hits = service(&server)
            .search("mobile booking app", DEFAULT_TOP)
            .await
            .expect("search");

        mock.assert();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "4");
        assert_eq!(hits[0].document.min_days, 1);
        assert_eq!(hits[1].document.task, "Push notifications");
    }

    #[tokio::test]
    async fn search_error_status_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/tasks/docs/search");
                then.status(403).body("forbidden");
            })
            .await;

        let error = service(&server)
            .search("anything", DEFAULT_TOP)
            .await
            .expect_err("forbidden");
        match error {
            SearchError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_document_id_reads_top_result() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/tasks/docs/search")
                    .json_body(json!({
                        "search": "*",
                        "select": "id,IdNumber",
                        "orderby": "IdNumber desc",
                        "top": 1
                    }));
                then.status(200).json_body(json!({
                    "value": [{ "@search.score": 1.0, "id": "41", "IdNumber": 41 }]
                }));
            })
            .await;

        let max = service(&server).max_document_id().await.expect("lookup");
        mock.assert();
        assert_eq!(max, Some(41));
    }

    #[tokio::test]
    async fn max_document_id_prefers_numeric_mirror_over_text_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/tasks/docs/search");
                then.status(200)
                    .json_body(json!({ "value": [{ "id": "12", "IdNumber": 12 }] }));
            })
            .await;
        assert_eq!(
            service(&server).max_document_id().await.expect("lookup"),
            Some(12)
        );
    }

    #[tokio::test]
    async fn max_document_id_is_none_for_empty_index() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/tasks/docs/search");
                then.status(200).json_body(json!({ "value": [] }));
            })
            .await;

        assert_eq!(
            service(&server).max_document_id().await.expect("lookup"),
            None
        );
    }

    #[tokio::test]
    async fn non_numeric_max_id_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/tasks/docs/search");
                then.status(200).json_body(json!({ "value": [{ "id": "abc" }] }));
            })
            .await;

        let error = service(&server)
            .max_document_id()
            .await
            .expect_err("invalid id");
        assert!(matches!(error, SearchError::InvalidDocumentId(ref id) if id == "abc"));
    }

    #[tokio::test]
    async fn upload_documents_batches_and_counts_rejections() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/tasks/docs/index")
                    .body_contains("\"@search.action\":\"upload\"");
                then.status(207).json_body(json!({
                    "value": [
                        { "key": "1", "status": true, "statusCode": 201 },
                        { "key": "2", "status": false, "errorMessage": "bad field", "statusCode": 400 }
                    ]
                }));
            })
            .await;

        let documents: Vec<_> = (1..=1001).map(document).collect();
        let summary = service(&server)
            .upload_documents(&documents)
            .await
            .expect("upload");

        mock.assert_hits(2);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.failed, 2);
    }

    #[tokio::test]
    async fn upload_of_nothing_sends_nothing() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "value": [] }));
            })
            .await;

        let summary = service(&server).upload_documents(&[]).await.expect("upload");
        mock.assert_hits(0);
        assert_eq!(summary, UploadSummary::default());
    }

    #[tokio::test]
    async fn delete_index_tolerates_missing_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/indexes/tasks");
                then.status(404);
            })
            .await;

        service(&server).delete_index().await.expect("delete");
        mock.assert();
    }

    #[tokio::test]
    async fn create_index_forces_index_name() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes")
                    .body_contains("\"name\":\"tasks\"");
                then.status(201).json_body(json!({ "name": "tasks" }));
            })
            .await;

        service(&server)
            .create_index(&default_index_schema("something-else"))
            .await
            .expect("create");
        mock.assert();
    }

    #[test]
    fn default_schema_has_numeric_sort_field() {
        let schema = default_index_schema("tasks");
        let id = &schema["fields"][0];
        assert_eq!(id["name"], "id");
        assert_eq!(id["key"], true);
        let number = &schema["fields"][1];
        assert_eq!(number["name"], ID_NUMBER_FIELD);
        assert_eq!(number["type"], "Edm.Int64");
        assert_eq!(number["sortable"], true);
        assert_eq!(schema["fields"].as_array().map(Vec::len), Some(15));
    }

    #[test]
    fn upload_action_tags_document_with_numeric_id() {
        let action = upload_action(&document(10)).expect("encode");
        assert_eq!(action["@search.action"], "upload");
        assert_eq!(action["id"], "10");
        assert_eq!(action["IdNumber"], 10);
    }
}
