//! HMAC request signing for the agent push API.
//!
//! Signature contract shared with the agent-server:
//!
//! ```text
//! X-Timestamp: unix seconds
//! X-Signature: hex(hmac_sha256(secret, ts \n METHOD \n path \n body))
//! ```
//!
//! `path` is the URL path without query string.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";

/// Header carrying the hex HMAC digest.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Signs outbound agent-server requests with a shared secret.
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl RequestSigner {
    /// Create a signer from the shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the hex signature for one request.
    pub fn sign(&self, method: &str, path: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.as_bytes());
        mac.update(b"\n");
        mac.update(method.to_uppercase().as_bytes());
        mac.update(b"\n");
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Produce `(timestamp, signature)` for a request issued now.
    pub fn headers(&self, method: &str, path: &str, body: &[u8]) -> (String, String) {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(method, path, &timestamp, body);
        (timestamp, signature)
    }

    /// Verify a signature, for endpoints that receive signed requests.
    pub fn verify(
        &self,
        method: &str,
        path: &str,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> bool {
        self.sign(method, path, timestamp, body) == signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic() {
        let signer = RequestSigner::new("secret");
        let a = signer.sign("POST", "/api/agents/a1/tasks", "1700000000", b"{}");
        let b = signer.sign("POST", "/api/agents/a1/tasks", "1700000000", b"{}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_sign_covers_every_field() {
        let signer = RequestSigner::new("secret");
        let base = signer.sign("POST", "/p", "1", b"x");
        assert_ne!(base, signer.sign("GET", "/p", "1", b"x"));
        assert_ne!(base, signer.sign("POST", "/q", "1", b"x"));
        assert_ne!(base, signer.sign("POST", "/p", "2", b"x"));
        assert_ne!(base, signer.sign("POST", "/p", "1", b"y"));
        assert_ne!(base, RequestSigner::new("other").sign("POST", "/p", "1", b"x"));
    }

    #[test]
    fn test_method_case_insensitive() {
        let signer = RequestSigner::new("secret");
        assert_eq!(
            signer.sign("post", "/p", "1", b""),
            signer.sign("POST", "/p", "1", b"")
        );
    }

    #[test]
    fn test_verify() {
        let signer = RequestSigner::new("secret");
        let sig = signer.sign("POST", "/p", "1", b"body");
        assert!(signer.verify("POST", "/p", "1", b"body", &sig));
        assert!(!signer.verify("POST", "/p", "1", b"tampered", &sig));
    }
}
