//! REST Request Signing
//!
//! Canonical payload rendering and HMAC-SHA256 signatures for private
//! [`ApiRequest`]s. Uses `ring` for the HMAC; secrets are never logged or
//! included in error messages.
//!
//! The canonical payload is `key=value` pairs joined by `&`, in the order
//! the request lists them. The signature is the lowercase hex HMAC of that
//! string.

use ring::hmac;

use crate::application::ports::{ApiAccess, ApiRequest, RestError};

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Render `payload` as `key=value&key=value`.
#[must_use]
pub fn canonical_payload(payload: &[(String, String)]) -> String {
    payload
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
#[must_use]
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let signature = hmac::sign(&key, payload.as_bytes());
    hex::encode(signature.as_ref())
}

/// Request ready to be sent by an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Original request.
    pub request: ApiRequest,
    /// Canonical payload.
    pub query: String,
    /// API key header value (private requests only).
    pub api_key: Option<String>,
    /// Hex signature (private requests only).
    pub signature: Option<String>,
}

/// Signs private requests with optional credentials.
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    credentials: Option<Credentials>,
}

impl RequestSigner {
    /// Signer for public calls only.
    #[must_use]
    pub const fn public() -> Self {
        Self { credentials: None }
    }

    /// Signer holding credentials.
    #[must_use]
    pub const fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// Canonicalize `request` and sign it if it is private.
    ///
    /// # Errors
    ///
    /// Returns `RestError::MissingCredentials` for a private request when no
    /// credentials are configured.
    pub fn sign(&self, request: ApiRequest) -> Result<SignedRequest, RestError> {
        let query = canonical_payload(&request.payload);

        if request.access == ApiAccess::Public {
            return Ok(SignedRequest {
                request,
                query,
                api_key: None,
                signature: None,
            });
        }

        let Some(credentials) = &self.credentials else {
            return Err(RestError::MissingCredentials {
                action: request.action,
            });
        };

        let signature = sign_payload(&credentials.api_secret, &query);
        Ok(SignedRequest {
            request,
            query,
            api_key: Some(credentials.api_key.clone()),
            signature: Some(signature),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::HttpMethod;

    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";

    fn order_request() -> ApiRequest {
        ApiRequest::new(HttpMethod::Post, "/api/v3/order")
            .private()
            .param("symbol", "LTCBTC")
            .param("side", "BUY")
            .param("type", "LIMIT")
            .param("timeInForce", "GTC")
            .param("quantity", 1)
            .param("price", "0.1")
            .param("recvWindow", 5000)
            .param("timestamp", 1_499_827_319_559_u64)
    }

    #[test]
    fn canonical_payload_keeps_order() {
        assert_eq!(
            canonical_payload(&order_request().payload),
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559"
        );
        assert_eq!(canonical_payload(&[]), "");
    }

    #[test]
    fn signs_known_vector() {
        let signer = RequestSigner::with_credentials(Credentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A".to_string(),
            SECRET.to_string(),
        ));

        let signed = signer.sign(order_request()).unwrap();

        assert_eq!(
            signed.signature.as_deref(),
            Some("c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71")
        );
        assert!(signed.api_key.is_some());
    }

    #[test]
    fn public_requests_are_not_signed() {
        let request = ApiRequest::new(HttpMethod::Get, "/api/2/public/ticker").param("symbols", "ETHBTC");
        let signed = RequestSigner::public().sign(request).unwrap();

        assert_eq!(signed.query, "symbols=ETHBTC");
        assert!(signed.signature.is_none());
        assert!(signed.api_key.is_none());
    }

    #[test]
    fn private_request_needs_credentials() {
        let result = RequestSigner::public().sign(order_request());
        assert!(matches!(
            result,
            Err(RestError::MissingCredentials { action }) if action == "/api/v3/order"
        ));
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn signatures_depend_on_secret_and_payload() {
        let a = sign_payload("secret_a", "symbol=BTCUSDT");
        assert_ne!(a, sign_payload("secret_b", "symbol=BTCUSDT"));
        assert_ne!(a, sign_payload("secret_a", "symbol=ETHUSDT"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }
}
