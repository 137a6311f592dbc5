//! CouchDB store implementation over an abstract HTTP client.
//!
//! The engine never embeds an HTTP library. Implement [`HttpClient`] with
//! whatever transport the process uses and hand it to [`CouchStore`], which
//! maps the store traits onto the CouchDB REST endpoints.

use crate::error::{SyncError, SyncResult};
use crate::store::{SourceStore, TargetStore};
use lmsync_protocol::{
    ChangeEvent, ChangesRequest, ChangesResponse, MultiGetRow, RouterDocument, Seq, WriteResult,
};
use serde_json::Value;

/// A minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this to provide the actual transport. Errors are transport
/// failures (connection refused, timeout); HTTP error statuses come back as
/// regular responses.
pub trait HttpClient: Send + Sync {
    /// Issues a GET request.
    fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Issues a POST request with a JSON body.
    fn post_json(&self, url: &str, body: &[u8]) -> Result<HttpResponse, String>;
}

/// A CouchDB database reachable over HTTP.
///
/// One instance per database; implements [`SourceStore`] for source
/// databases and [`TargetStore`] for the LibreMap target.
pub struct CouchStore<C: HttpClient> {
    /// Name used in error messages and logs.
    name: String,
    /// Database URL without a trailing slash.
    base_url: String,
    /// Long-poll wait bound passed to the changes feed, in milliseconds.
    longpoll_timeout_ms: u64,
    client: C,
}

impl<C: HttpClient> CouchStore<C> {
    /// Creates a store for the database at `base_url`.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            name: name.into(),
            base_url,
            longpoll_timeout_ms: 60_000,
            client,
        }
    }

    /// Sets the long-poll wait bound.
    pub fn with_longpoll_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.longpoll_timeout_ms = timeout_ms;
        self
    }

    /// The database URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transient(&self, message: impl Into<String>) -> SyncError {
        SyncError::transient(&self.name, message)
    }

    fn get_checked(&self, url: &str) -> SyncResult<HttpResponse> {
        self.client.get(url).map_err(|e| self.transient(e))
    }

    fn post_checked(&self, url: &str, body: &Value) -> SyncResult<Value> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| self.transient(format!("encode body: {e}")))?;
        let response = self
            .client
            .post_json(url, &bytes)
            .map_err(|e| self.transient(e))?;
        if !response.is_success() {
            return Err(self.transient(format!("HTTP {} from {url}", response.status)));
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| self.transient(format!("decode response from {url}: {e}")))
    }

    /// Normalizes a CouchDB sequence value: a JSON number (CouchDB 1.x) or
    /// string (2.x+) both become an opaque token.
    fn parse_seq(value: &Value) -> Option<Seq> {
        match value {
            Value::Number(n) => Some(Seq::new(n.to_string())),
            Value::String(s) => Some(Seq::new(s.clone())),
            _ => None,
        }
    }

    fn parse_changes(&self, since: &Seq, body: Value) -> SyncResult<ChangesResponse> {
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| self.transient("changes response without results"))?;

        let mut events = Vec::with_capacity(results.len());
        for row in results {
            let Some(id) = row.get("id").and_then(Value::as_str) else {
                continue;
            };
            let seq = row
                .get("seq")
                .and_then(Self::parse_seq)
                .unwrap_or_else(|| since.clone());
            let deleted = row
                .get("deleted")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            events.push(ChangeEvent {
                seq,
                id: id.to_string(),
                doc: row.get("doc").filter(|d| !d.is_null()).cloned(),
                deleted,
            });
        }

        let last_seq = body
            .get("last_seq")
            .and_then(Self::parse_seq)
            .unwrap_or_else(|| since.clone());
        Ok(ChangesResponse::new(events, last_seq))
    }
}

impl<C: HttpClient> SourceStore for CouchStore<C> {
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        let mut url = format!(
            "{}/_changes?feed={}&since={}&include_docs={}",
            self.base_url,
            request.feed.as_param(),
            request.since,
            request.include_docs,
        );
        if request.feed == lmsync_protocol::FeedMode::Longpoll {
            url.push_str(&format!("&timeout={}", self.longpoll_timeout_ms));
        }
        if let Some(limit) = request.limit {
            url.push_str(&format!("&limit={limit}"));
        }

        let response = self.get_checked(&url)?;
        if !response.is_success() {
            return Err(self.transient(format!("HTTP {} from changes feed", response.status)));
        }
        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| self.transient(format!("decode changes feed: {e}")))?;
        self.parse_changes(&request.since, body)
    }

    fn get(&self, id: &str) -> SyncResult<Option<Value>> {
        let url = format!("{}/{id}", self.base_url);
        let response = self.get_checked(&url)?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(self.transient(format!("HTTP {} from {url}", response.status)));
        }
        let doc: Value = serde_json::from_slice(&response.body)
            .map_err(|e| self.transient(format!("decode document {id}: {e}")))?;
        Ok(Some(doc))
    }
}

impl<C: HttpClient> TargetStore for CouchStore<C> {
    fn multi_get(&self, ids: &[String]) -> SyncResult<Vec<MultiGetRow>> {
        let url = format!("{}/_all_docs?include_docs=true", self.base_url);
        let body = serde_json::json!({ "keys": ids });
        let response = self.post_checked(&url, &body)?;

        let rows = response
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| self.transient("_all_docs response without rows"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row
                .get("id")
                .or_else(|| row.get("key"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let doc = row
                .get("doc")
                .filter(|d| !d.is_null())
                .and_then(|d| match serde_json::from_value(d.clone()) {
                    Ok(doc) => Some(doc),
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "existing target document has unexpected shape");
                        None
                    }
                });
            out.push(MultiGetRow { id, doc });
        }
        Ok(out)
    }

    fn bulk_update(&self, docs: &[RouterDocument]) -> SyncResult<Vec<WriteResult>> {
        let url = format!("{}/_bulk_docs", self.base_url);
        let body = serde_json::json!({ "docs": docs });
        let response = self.post_checked(&url, &body)?;

        let rows = response
            .as_array()
            .ok_or_else(|| self.transient("_bulk_docs response is not an array"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let result = if row.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                let rev = row
                    .get("rev")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                WriteResult::accepted(id, rev)
            } else if row.get("error").and_then(Value::as_str) == Some("conflict") {
                WriteResult::conflicted(id)
            } else {
                let reason = row
                    .get("reason")
                    .or_else(|| row.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                WriteResult::failed(id, reason)
            };
            out.push(result);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmsync_protocol::FeedMode;
    use parking_lot::Mutex;
    use serde_json::json;

    /// A scripted client: records request URLs and pops queued responses.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn push_json(&self, status: u16, body: Value) {
            self.responses
                .lock()
                .push(HttpResponse::new(status, body.to_string().into_bytes()));
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }

        fn pop(&self, url: &str) -> Result<HttpResponse, String> {
            self.requests.lock().push(url.to_string());
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err("connection refused".into())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    impl HttpClient for &ScriptedClient {
        fn get(&self, url: &str) -> Result<HttpResponse, String> {
            self.pop(url)
        }

        fn post_json(&self, url: &str, _body: &[u8]) -> Result<HttpResponse, String> {
            self.pop(url)
        }
    }

    #[test]
    fn changes_request_url_and_parse() {
        let client = ScriptedClient::default();
        client.push_json(
            200,
            json!({
                "results": [
                    {"seq": 5, "id": "n1", "doc": {"_id": "n1"}},
                    {"seq": "6-abc", "id": "n2", "deleted": true}
                ],
                "last_seq": "6-abc"
            }),
        );

        let store = CouchStore::new("am", "http://couch:5984/altermap/", &client);
        let request = ChangesRequest::since(Seq::new("3"), FeedMode::Longpoll).with_limit(100);
        let response = store.changes(&request).unwrap();

        let url = &store.base_url;
        assert_eq!(url, "http://couch:5984/altermap");
        let requested = client.requests();
        assert!(requested[0].contains("/_changes?feed=longpoll&since=3&include_docs=true"));
        assert!(requested[0].contains("&timeout=60000"));
        assert!(requested[0].contains("&limit=100"));

        assert_eq!(response.results.len(), 2);
        // Numeric and string sequences both normalize.
        assert_eq!(response.results[0].seq, Seq::new("5"));
        assert!(response.results[1].deleted);
        assert_eq!(response.last_seq, Seq::new("6-abc"));
    }

    #[test]
    fn point_get_distinguishes_absent() {
        let client = ScriptedClient::default();
        client.push_json(404, json!({"error": "not_found"}));
        client.push_json(200, json!({"_id": "net7", "name": "CommunityX"}));

        let store = CouchStore::new("am", "http://couch:5984/altermap", &client);
        assert!(store.get("missing").unwrap().is_none());

        let doc = store.get("net7").unwrap().unwrap();
        assert_eq!(doc["name"], "CommunityX");
    }

    #[test]
    fn transport_failure_is_transient() {
        let client = ScriptedClient::default();
        let store = CouchStore::new("am", "http://couch:5984/altermap", &client);

        let request = ChangesRequest::since(Seq::zero(), FeedMode::Normal);
        let err = store.changes(&request).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn multi_get_parses_rows() {
        let client = ScriptedClient::default();
        client.push_json(
            200,
            json!({
                "rows": [
                    {"id": "n1", "doc": {
                        "_id": "n1", "_rev": "2-abc", "api_rev": "1.0", "type": "router",
                        "hostname": "router-a", "lat": 1.0, "lon": 2.0,
                        "ctime": "t0", "mtime": "t1"
                    }},
                    {"key": "n2", "error": "not_found"}
                ]
            }),
        );

        let store = CouchStore::new("lm", "http://couch:5984/libremap", &client);
        let rows = store
            .multi_get(&["n1".to_string(), "n2".to_string()])
            .unwrap();

        assert_eq!(rows.len(), 2);
        let existing = rows[0].doc.as_ref().unwrap();
        assert_eq!(existing.rev.as_deref(), Some("2-abc"));
        assert_eq!(existing.ctime, "t0");
        assert_eq!(rows[1].id, "n2");
        assert!(rows[1].doc.is_none());
    }

    #[test]
    fn bulk_update_maps_outcomes() {
        let client = ScriptedClient::default();
        client.push_json(
            201,
            json!([
                {"ok": true, "id": "n1", "rev": "1-abc"},
                {"id": "n2", "error": "conflict", "reason": "Document update conflict."},
                {"id": "n3", "error": "forbidden", "reason": "read only"}
            ]),
        );

        let store = CouchStore::new("lm", "http://couch:5984/libremap", &client);
        let docs = vec![
            RouterDocument::new("n1", "a", 0.0, 0.0, "t", "t"),
            RouterDocument::new("n2", "b", 0.0, 0.0, "t", "t"),
            RouterDocument::new("n3", "c", 0.0, 0.0, "t", "t"),
        ];
        let results = store.bulk_update(&docs).unwrap();

        assert!(results[0].is_accepted());
        assert!(results[1].is_conflict());
        assert!(matches!(
            results[2].status,
            lmsync_protocol::WriteStatus::Failed { .. }
        ));
    }
}
