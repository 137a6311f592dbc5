//! Blocking HTTP transport behind the engine's store layer.

use lmsync_engine::{HttpClient, HttpResponse};
use std::time::Duration;

/// Read timeout; must exceed the changes-feed long-poll bound (60s).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// An [`HttpClient`] over a blocking reqwest client.
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client with the CLI's timeout applied.
    pub fn new() -> Result<Self, reqwest::Error> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { inner })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, String> {
        let response = self.inner.get(url).send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse::new(status, body))
    }

    fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, String> {
        let response = self
            .inner
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_vec())
            .send()
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse::new(status, body))
    }
}
