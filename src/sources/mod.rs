// External update sources. Each one knows how to fetch a single snapshot;
// scheduling and distribution live in the poller.

mod solaredge;
mod tado;

pub use solaredge::{DEFAULT_BASE_URL as SOLAREDGE_BASE_URL, SolarEdgeUpdater};
pub use tado::{DEFAULT_BASE_URL as TADO_BASE_URL, TadoUpdater};

use std::future::Future;
use std::time::Duration;

/// Per-request timeout for the external APIs. The pipeline itself has none.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http: {0}")]
    Http(#[source] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("response is missing {0}")]
    MissingField(&'static str),
}

// SolarEdge takes its api_key in the query string; keep URLs out of error text.
impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Http(e.without_url())
    }
}

/// Fetches one update from an external system.
pub trait Updater: Send + Sync + 'static {
    type Update: Clone + Send + Sync + 'static;

    /// Short name used in logs and health messages.
    fn source(&self) -> &'static str;

    fn get_update(&self) -> impl Future<Output = Result<Self::Update, SourceError>> + Send;
}

pub(crate) fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(crate::version::user_agent())
        .build()?)
}

/// Maps non-2xx responses to `SourceError::Status`.
pub(crate) fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SourceError::Status {
            url: resp.url().path().to_string(),
            status: status.as_u16(),
        })
    }
}
