use std::{path::Path, time::Duration};

use reqwest::Url;

use crate::{AppResult, ErrType};

/// HTTP capability used to download source images.
///
/// Status codes are not interpreted: whatever body the server sends is
/// handed back to the caller.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout_secs: u64) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }

        let client = builder.build().map_err(|err| ErrType::FetchError.err(err, "Failed to build http client"))?;

        Ok(Self {
            client,
        })
    }

    pub async fn get(&self, url: Url) -> AppResult<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ErrType::FetchError.err(err, format!("Failed to fetch {url}")))?;

        tracing::debug!(url = %url, status = %response.status(), "Fetched remote image");

        Ok(response)
    }
}

pub fn parse_url(url: &str) -> AppResult<Url> {
    Url::parse(url).map_err(|err| ErrType::FetchError.err(err, format!("Invalid url {url}")))
}

/// Extension of the url path with its leading dot, or an empty string
pub fn url_extension(url: &Url) -> String {
    Path::new(url.path())
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}
