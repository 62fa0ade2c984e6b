//! Blob storage over the REST API, authorized with an optional SAS token.

use super::{ObjectStore, StorageError};
use async_trait::async_trait;
use quick_xml::{Reader, events::Event};
use reqwest::{Client, Method, StatusCode, Url};

const STORAGE_API_VERSION: &str = "2021-08-06";

/// One blob container addressed through `{endpoint}/{container}`.
pub struct AzureBlobStore {
    pub(crate) client: Client,
    pub(crate) endpoint: Url,
    pub(crate) container: String,
    pub(crate) sas_token: Option<String>,
}

impl AzureBlobStore {
    /// Create a client for `container` under `endpoint`.
    pub fn new(
        endpoint: &str,
        container: &str,
        sas_token: Option<String>,
    ) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|err| StorageError::InvalidUrl(err.to_string()))?;
        let client = Client::builder().user_agent("rusty-estimator/0.2").build()?;
        tracing::debug!(
            endpoint = %endpoint,
            container,
            has_sas = sas_token.is_some(),
            "Initialized blob storage client"
        );
        Ok(Self {
            client,
            endpoint,
            container: container.to_string(),
            sas_token: sas_token.map(|token| token.trim_start_matches('?').to_string()),
        })
    }

    fn url(&self, blob: Option<&str>, params: &[(&str, &str)]) -> Result<Url, StorageError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StorageError::InvalidUrl(self.endpoint.to_string()))?;
            segments.pop_if_empty().push(&self.container);
            if let Some(name) = blob {
                segments.extend(name.split('/'));
            }
        }
        url.set_query(self.sas_token.as_deref());
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("x-ms-version", STORAGE_API_VERSION)
    }

    async fn ensure_container(&self) -> Result<(), StorageError> {
        let url = self.url(None, &[("restype", "container")])?;
        let response = self.request(Method::PUT, url).send().await?;
        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container = %self.container, "Created blob container");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => Err(unexpected(status, response).await),
        }
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.ensure_container().await?;
        let url = self.url(Some(name), &[])?;
        let size = bytes.len();
        let response = self
            .request(Method::PUT, url.clone())
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = unexpected(response.status(), response).await;
            tracing::error!(container = %self.container, blob = name, error = %error, "Blob upload failed");
            return Err(error);
        }

        tracing::info!(container = %self.container, blob = name, size, "Blob uploaded");
        Ok(url.to_string())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut params = vec![("restype", "container"), ("comp", "list")];
            if let Some(marker) = marker.as_deref() {
                params.push(("marker", marker));
            }
            let url = self.url(None, &params)?;
            let response = self.request(Method::GET, url).send().await?;
            if !response.status().is_success() {
                let error = unexpected(response.status(), response).await;
                tracing::error!(container = %self.container, error = %error, "Failed to list blobs");
                return Err(error);
            }

            let body = response.text().await?;
            let page = parse_listing(&body)?;
            names.extend(page.names);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        tracing::debug!(container = %self.container, blobs = names.len(), "Listed blobs");
        Ok(names)
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.url(Some(name), &[])?;
        let response = self.request(Method::GET, url).send().await?;
        if !response.status().is_success() {
            let error = unexpected(response.status(), response).await;
            tracing::error!(container = %self.container, blob = name, error = %error, "Blob download failed");
            return Err(error);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> StorageError {
    let body = response.text().await.unwrap_or_default();
    StorageError::UnexpectedStatus { status, body }
}

#[derive(Debug, Default)]
struct ListingPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Capture {
    BlobName,
    NextMarker,
}

/// Read blob names and the continuation marker from a `List Blobs` response.
fn parse_listing(xml: &str) -> Result<ListingPage, StorageError> {
    let malformed = |err: quick_xml::Error| StorageError::MalformedListing(err.to_string());
    let mut reader = Reader::from_str(xml);
    let mut page = ListingPage::default();
    let mut in_blob = false;
    let mut capture: Option<Capture> = None;
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(element) => match element.name().as_ref() {
                b"Blob" => in_blob = true,
                b"Name" if in_blob => {
                    capture = Some(Capture::BlobName);
                    text.clear();
                }
                b"NextMarker" => {
                    capture = Some(Capture::NextMarker);
                    text.clear();
                }
                _ => {}
            },
            Event::Text(content) if capture.is_some() => {
                text.push_str(&content.unescape().map_err(malformed)?);
            }
            Event::CData(content) if capture.is_some() => {
                text.push_str(&String::from_utf8_lossy(&content.into_inner()));
            }
            Event::End(element) => match (element.name().as_ref(), capture) {
                (b"Name", Some(Capture::BlobName)) => {
                    page.names.push(std::mem::take(&mut text));
                    capture = None;
                }
                (b"NextMarker", Some(Capture::NextMarker)) => {
                    let marker = std::mem::take(&mut text);
                    page.next_marker = (!marker.trim().is_empty()).then_some(marker);
                    capture = None;
                }
                (b"Blob", _) => in_blob = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(page)
}
