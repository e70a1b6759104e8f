//! Error types for the sentinel pipeline.
//!
//! Feed and store failures are fatal to a cycle and surface as
//! [`CycleError`]. Model failures never leave the synthesis layer.

use thiserror::Error;

/// Failure while acquiring data from an upstream feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed payload from {provider}: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("failed to read fixture {path}: {detail}")]
    Fixture { path: String, detail: String },
}

/// Failure while calling a language model.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("cannot reach model endpoint {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to decode model response: {0}")]
    Decode(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

/// Failure while persisting or loading reports.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("report store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The only error a cycle returns.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("{feed} feed failed: {source}")]
    Feed {
        feed: &'static str,
        #[source]
        source: FeedError,
    },

    #[error("failed to persist report: {0}")]
    Store(#[from] StoreError),
}

impl CycleError {
    pub fn feed(feed: &'static str) -> impl FnOnce(FeedError) -> CycleError {
        move |source| CycleError::Feed { feed, source }
    }
}
