//! Backend gateway: the request/response contract the dispatcher consumes.
//!
//! The [`Gateway`] trait is the seam between reconciliation logic and the
//! network. [`HttpGateway`] is the production implementation over `reqwest`.
//! Failures carry enough information to be classified into the handful of
//! cases the dispatcher reacts to differently (see [`ErrorClass`]).

mod http;

pub use http::HttpGateway;

use crate::model::{FeedItem, FeedQuery, ItemId, Location, PostPayload, ReportBody, Vote, VoteReceipt};
use secrecy::SecretString;
use std::future::Future;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// How the dispatcher reacts to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 429
    RateLimited,
    /// 403: the action is not allowed right now (e.g. check-in outside an event).
    Forbidden,
    /// 401: credentials rejected. Only meaningful for admin calls.
    Unauthorized,
    /// 404
    NotFound,
    /// Transport failures and every other status.
    Generic,
}

impl GatewayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::HttpStatus(429) => ErrorClass::RateLimited,
            GatewayError::HttpStatus(403) => ErrorClass::Forbidden,
            GatewayError::HttpStatus(401) => ErrorClass::Unauthorized,
            GatewayError::HttpStatus(404) => ErrorClass::NotFound,
            _ => ErrorClass::Generic,
        }
    }

    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Network(_) => true,
            GatewayError::HttpStatus(status) => *status >= 500,
            GatewayError::ResponseTooLarge(_)
            | GatewayError::Decode(_)
            | GatewayError::InvalidUrl(_)
            | GatewayError::InsecureBaseUrl => false,
        }
    }
}

// ============================================================================
// Gateway Contract
// ============================================================================

/// Remote backend operations.
///
/// Every call settles exactly once with a parsed result or a classified
/// failure. Implementations must be shareable across spawned tasks.
pub trait Gateway: Send + Sync + 'static {
    /// Fetch a named collection (`feed`, `users/<id>/feed`, ...).
    fn fetch_models(
        &self,
        resource: &str,
        query: &FeedQuery,
    ) -> impl Future<Output = Result<Vec<FeedItem>, GatewayError>> + Send;

    /// Fetch the page of feed items older than `last_id`.
    fn fetch_more_feed(
        &self,
        last_id: ItemId,
        query: &FeedQuery,
    ) -> impl Future<Output = Result<Vec<FeedItem>, GatewayError>> + Send;

    fn fetch_comments(
        &self,
        parent_id: ItemId,
        offset: usize,
        query: &FeedQuery,
    ) -> impl Future<Output = Result<Vec<FeedItem>, GatewayError>> + Send;

    fn post_action(
        &self,
        payload: &PostPayload,
        location: Option<Location>,
        query: &FeedQuery,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn vote_feed_item(
        &self,
        vote: Vote,
    ) -> impl Future<Output = Result<VoteReceipt, GatewayError>> + Send;

    fn delete_feed_item(
        &self,
        item: &FeedItem,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn admin_delete(
        &self,
        item: &FeedItem,
        token: &SecretString,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn report_item(
        &self,
        body: &ReportBody,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Current `numberOfComments` of a parent item.
    fn refresh_comment_count(
        &self,
        parent_id: ItemId,
    ) -> impl Future<Output = Result<u32, GatewayError>> + Send;

    fn shadow_ban(
        &self,
        item: &FeedItem,
        token: &SecretString,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}
