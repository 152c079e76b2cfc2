use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use snafu::{ResultExt as _, Snafu};
use tracing::debug;

use crate::document::{MalformedDocument, SyndicationDocument, parse_document};

const LOG_TARGET: &str = "gator::fetch";

pub const USER_AGENT: &str = concat!("gator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Snafu)]
pub enum FetchError {
    #[snafu(display("Request to {url} failed"))]
    Transport { url: String, source: reqwest::Error },
    #[snafu(display("{url} responded with {status}"))]
    Status { url: String, status: StatusCode },
    #[snafu(display("Failed to read response body of {url}"))]
    BodyRead { url: String, source: reqwest::Error },
    #[snafu(display("Could not decode document at {url}"))]
    MalformedDocument {
        url: String,
        source: MalformedDocument,
    },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Retrieves and decodes the syndication document at a url
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<SyndicationDocument>;
}

/// [`FeedFetcher`] doing a single plain GET, no retries
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<SyndicationDocument> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(TransportSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu { url, status }.fail();
        }

        let body = response.bytes().await.context(BodyReadSnafu { url })?;
        debug!(target: LOG_TARGET, %url, len = body.len(), "Fetched document");

        let document = parse_document(&body).context(MalformedDocumentSnafu { url })?;
        debug!(
            target: LOG_TARGET,
            %url,
            title = %document.title,
            entries = document.entries.len(),
            "Decoded document"
        );
        Ok(document)
    }
}
