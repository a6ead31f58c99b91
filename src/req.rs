use reqwest::Client;

use crate::errors::{Error, Result};

/// Identification header sent on the auth and streaming handshakes.
pub(crate) const CLIENT_INFORMATION: &str = "IntrinioRealtimeRustSDKv1.0";

/// Thin GET-for-text helper shared by token authorization and the REST
/// market-data fetchers. Retry policy belongs to the callers: the session
/// retries under its backoff schedule, the fetchers under their bounded
/// attempt counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub(crate) fn new() -> Self {
        HttpClient {
            client: Client::new(),
        }
    }

    /// GET a URL and return the response body as text. Non-2xx statuses and
    /// empty bodies are errors.
    pub(crate) async fn get_text(&self, url: &str) -> Result<String> {
        self.get_text_with_headers(url, &[]).await
    }

    pub(crate) async fn get_text_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(Error::request)?;
        let status = response.status();
        let text = response.text().await.map_err(Error::request)?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: text,
            });
        }
        if text.is_empty() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: "empty response body".to_string(),
            });
        }
        Ok(text)
    }
}
