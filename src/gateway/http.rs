use super::{Gateway, GatewayError};
use crate::model::{
    FeedItem, FeedQuery, ItemId, Location, PostPayload, ReportBody, Vote, VoteReceipt,
};
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Default retry budget for idempotent GET requests.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Header identifying the device to the backend.
const USER_UUID_HEADER: &str = "x-user-uuid";

/// `reqwest`-backed [`Gateway`].
///
/// Read requests are retried with exponential backoff on transient failures.
/// Mutating requests are sent exactly once; a retried vote or post would be
/// applied twice by the backend.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
    device_id: String,
    timeout: Duration,
    max_retries: u32,
}

impl HttpGateway {
    /// Build a gateway rooted at `base_url`.
    ///
    /// Rejects plain HTTP unless the host is localhost (tests run against a
    /// local mock server).
    pub fn new(base_url: &str, device_id: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base = Url::parse(base_url)?;
        if base.scheme() != "https" {
            let is_localhost = matches!(base.host_str(), Some("localhost") | Some("127.0.0.1"));
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS API base URL");
                return Err(GatewayError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS API base URL (localhost only)");
        }
        // Url::join drops the last path segment unless it ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base,
            device_id: device_id.to_string(),
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Override the retry budget for read requests (0 disables retries).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(USER_UUID_HEADER, self.device_id.as_str())
    }

    /// Send once and return the raw body of a 2xx response.
    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, GatewayError> {
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| GatewayError::Timeout)?
            .map_err(GatewayError::Network)?;

        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status().as_u16()));
        }

        read_limited(response, MAX_RESPONSE_SIZE).await
    }

    /// GET and decode JSON, retrying transient failures.
    /// Uses exponential backoff: 1s, 2s, 4s.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let mut retry_count = 0;

        loop {
            match self.send(self.request(Method::GET, url.clone())).await {
                Ok(body) => return Ok(serde_json::from_slice(&body)?),
                Err(e) if e.is_retryable() && retry_count < self.max_retries => {
                    let delay = 1u64 << retry_count;
                    tracing::debug!(
                        url = %url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_secs = delay,
                        "Retrying request after transient error"
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: &serde_json::Value,
        token: Option<&SecretString>,
    ) -> Result<Vec<u8>, GatewayError> {
        let mut request = self
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }
        self.send(request).await
    }
}

/// Comment count replies come either as a bare number or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommentCount {
    Bare(u32),
    Wrapped {
        #[serde(rename = "numberOfComments", alias = "count")]
        count: u32,
    },
}

impl Gateway for HttpGateway {
    async fn fetch_models(
        &self,
        resource: &str,
        query: &FeedQuery,
    ) -> Result<Vec<FeedItem>, GatewayError> {
        let mut url = self.endpoint(&format!("api/{}", resource))?;
        url.query_pairs_mut().extend_pairs(query.pairs());
        self.get_json(url).await
    }

    async fn fetch_more_feed(
        &self,
        last_id: ItemId,
        query: &FeedQuery,
    ) -> Result<Vec<FeedItem>, GatewayError> {
        let mut url = self.endpoint("api/feed")?;
        url.query_pairs_mut()
            .append_pair("beforeId", &last_id.to_string())
            .extend_pairs(query.pairs());
        self.get_json(url).await
    }

    async fn fetch_comments(
        &self,
        parent_id: ItemId,
        offset: usize,
        query: &FeedQuery,
    ) -> Result<Vec<FeedItem>, GatewayError> {
        let mut url = self.endpoint(&format!("api/feed/{}/comments", parent_id))?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .extend_pairs(query.pairs());
        self.get_json(url).await
    }

    async fn post_action(
        &self,
        payload: &PostPayload,
        location: Option<Location>,
        query: &FeedQuery,
    ) -> Result<(), GatewayError> {
        let mut url = self.endpoint("api/actions")?;
        url.query_pairs_mut().extend_pairs(query.pairs());
        self.send_json(Method::POST, url, &payload.to_body(location), None)
            .await?;
        Ok(())
    }

    async fn vote_feed_item(&self, vote: Vote) -> Result<VoteReceipt, GatewayError> {
        let url = self.endpoint("api/vote")?;
        let body = self
            .send_json(Method::PUT, url, &serde_json::to_value(vote)?, None)
            .await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(VoteReceipt::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn delete_feed_item(&self, item: &FeedItem) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("api/feed/{}", item.id))?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn admin_delete(&self, item: &FeedItem, token: &SecretString) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("api/admin/feed/{}", item.id))?;
        let request = self
            .request(Method::DELETE, url)
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        self.send(request).await?;
        Ok(())
    }

    async fn report_item(&self, body: &ReportBody) -> Result<(), GatewayError> {
        let url = self.endpoint("api/reports")?;
        self.send_json(Method::POST, url, &serde_json::to_value(body)?, None)
            .await?;
        Ok(())
    }

    async fn refresh_comment_count(&self, parent_id: ItemId) -> Result<u32, GatewayError> {
        let url = self.endpoint(&format!("api/feed/{}/comments/count", parent_id))?;
        let count: CommentCount = self.get_json(url).await?;
        Ok(match count {
            CommentCount::Bare(count) | CommentCount::Wrapped { count } => count,
        })
    }

    async fn shadow_ban(&self, item: &FeedItem, token: &SecretString) -> Result<(), GatewayError> {
        let url = self.endpoint("api/admin/shadowban")?;
        let body = serde_json::json!({ "feedItemId": item.id });
        self.send_json(Method::PUT, url, &body, Some(token)).await?;
        Ok(())
    }
}

async fn read_limited(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, GatewayError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(GatewayError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(GatewayError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(GatewayError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
