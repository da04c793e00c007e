//! Multibeam file catalog client

use anyhow::{Context, Result};
use async_trait::async_trait;
use pointstore_common::types::BBox;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

/// Looks up survey files intersecting an area
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Return the catalog's file listing for `bbox` filtered by `predicate`
    async fn find_files(&self, bbox: &BBox, predicate: &str) -> Result<String>;
}

/// Map-service catalog reached over HTTP
pub struct HttpCatalogClient {
    client: Client,
    url: String,
}

impl HttpCatalogClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn find_files(&self, bbox: &BBox, predicate: &str) -> Result<String> {
        let geometry = bbox.to_string();
        let mut params = vec![("geometry", geometry.as_str())];
        if !predicate.is_empty() {
            params.push(("where", predicate));
        }

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .context("Catalog request failed")?
            .error_for_status()
            .context("Catalog returned an error status")?;

        let body = response
            .text()
            .await
            .context("Failed to read catalog response")?;
        debug!(bytes = body.len(), "Catalog response received");
        Ok(body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn bbox() -> BBox {
        BBox::from_coords(&[5.0, 60.0, 6.0, 61.0]).unwrap()
    }

    #[tokio::test]
    async fn test_find_files_sends_geometry_and_predicate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("geometry", "5,60,6,61"))
            .and(query_param("where", "DATASET_TYPE_NAME = 'MB RAW'"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a.mb58 58\n"))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpCatalogClient::new(format!("{}/files", server.uri()), Duration::from_secs(5))
                .unwrap();
        let body = client
            .find_files(&bbox(), "DATASET_TYPE_NAME = 'MB RAW'")
            .await
            .unwrap();
        assert_eq!(body, "a.mb58 58\n");
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpCatalogClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(client.find_files(&bbox(), "").await.is_err());
    }
}
