//! REST API Port (Driven Port)
//!
//! Boundary contract for exchange REST wrappers. Requests name an action
//! path, an HTTP verb, whether they need signing, and an ordered payload.
//! Private requests are signed with an HMAC of the canonical payload (see
//! `infrastructure::rest`).

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

/// HTTP verb of a REST call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Uppercase verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a request needs credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiAccess {
    /// Unsigned market data call.
    #[default]
    Public,
    /// Signed account/order call.
    Private,
}

/// One REST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Path of the endpoint, relative to the exchange base URL.
    pub action: String,
    /// HTTP verb.
    pub method: HttpMethod,
    /// Signing requirement.
    pub access: ApiAccess,
    /// Parameters in the order they are sent.
    pub payload: Vec<(String, String)>,
}

impl ApiRequest {
    /// Public request without parameters.
    #[must_use]
    pub fn new(method: HttpMethod, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            method,
            access: ApiAccess::Public,
            payload: Vec::new(),
        }
    }

    /// Mark the request as requiring a signature.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.access = ApiAccess::Private;
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.payload.push((key.into(), value.to_string()));
        self
    }
}

/// REST call errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RestError {
    /// Private request without configured credentials.
    #[error("credentials required for {action}")]
    MissingCredentials { action: String },

    /// Exchange answered with an error status.
    #[error("HTTP {status} from {action}: {message}")]
    Status {
        action: String,
        status: u16,
        message: String,
    },

    /// Request could not be sent.
    #[error("REST transport error: {0}")]
    Transport(String),

    /// Response body is not valid JSON.
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Exchange REST wrapper.
#[async_trait]
pub trait RestApi: Send + Sync {
    /// Execute a request and return the decoded JSON body.
    async fn request(&self, request: ApiRequest) -> Result<Value, RestError>;

    /// GET `action`.
    async fn get(
        &self,
        action: &str,
        access: ApiAccess,
        payload: Vec<(String, String)>,
    ) -> Result<Value, RestError> {
        self.request(with_verb(HttpMethod::Get, action, access, payload))
            .await
    }

    /// POST `action`.
    async fn post(
        &self,
        action: &str,
        access: ApiAccess,
        payload: Vec<(String, String)>,
    ) -> Result<Value, RestError> {
        self.request(with_verb(HttpMethod::Post, action, access, payload))
            .await
    }

    /// PUT `action`.
    async fn put(
        &self,
        action: &str,
        access: ApiAccess,
        payload: Vec<(String, String)>,
    ) -> Result<Value, RestError> {
        self.request(with_verb(HttpMethod::Put, action, access, payload))
            .await
    }

    /// PATCH `action`.
    async fn patch(
        &self,
        action: &str,
        access: ApiAccess,
        payload: Vec<(String, String)>,
    ) -> Result<Value, RestError> {
        self.request(with_verb(HttpMethod::Patch, action, access, payload))
            .await
    }

    /// DELETE `action`.
    async fn delete(
        &self,
        action: &str,
        access: ApiAccess,
        payload: Vec<(String, String)>,
    ) -> Result<Value, RestError> {
        self.request(with_verb(HttpMethod::Delete, action, access, payload))
            .await
    }
}

fn with_verb(
    method: HttpMethod,
    action: &str,
    access: ApiAccess,
    payload: Vec<(String, String)>,
) -> ApiRequest {
    ApiRequest {
        action: action.to_string(),
        method,
        access,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingApi {
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl RestApi for RecordingApi {
        async fn request(&self, request: ApiRequest) -> Result<Value, RestError> {
            self.seen.lock().push(request);
            Ok(json!({"ok": true}))
        }
    }

    #[tokio::test]
    async fn verbs_route_through_request() {
        let api = RecordingApi::default();
        let payload = vec![("symbol".to_string(), "ETHBTC".to_string())];

        api.get("/api/2/public/ticker", ApiAccess::Public, vec![]).await.unwrap();
        api.post("/api/2/order", ApiAccess::Private, payload.clone()).await.unwrap();
        api.delete("/api/2/order", ApiAccess::Private, payload).await.unwrap();

        let seen = api.seen.lock();
        let methods: Vec<HttpMethod> = seen.iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete]);
        assert_eq!(seen[1].access, ApiAccess::Private);
        assert_eq!(seen[1].payload[0].1, "ETHBTC");
    }

    #[test]
    fn request_builder_keeps_param_order() {
        let request = ApiRequest::new(HttpMethod::Post, "/api/v3/order")
            .private()
            .param("symbol", "LTCBTC")
            .param("quantity", 1)
            .param("price", "0.1");

        assert_eq!(request.access, ApiAccess::Private);
        let keys: Vec<&str> = request.payload.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["symbol", "quantity", "price"]);
        assert_eq!(request.method.to_string(), "POST");
    }
}
