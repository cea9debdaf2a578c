//! Compact HS256 tokens: `base64url(header).base64url(claims).base64url(mac)`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{KeyError, Result};
use crate::types::TokenClaims;

type HmacSha256 = Hmac<Sha256>;

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Signs and checks capability tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_days", &self.ttl.num_days())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_days: u32) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::days(i64::from(ttl_days)),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| KeyError::Signing("invalid HMAC key length".to_string()))
    }

    pub fn sign(&self, owner_id: &str, author_id: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = TokenClaims {
            owner_id: owner_id.to_string(),
            author_id: author_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
        let claims_json =
            serde_json::to_vec(&claims).map_err(|e| KeyError::Signing(e.to_string()))?;

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string().as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(&claims_json);
        let message = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{message}.{sig_b64}"))
    }

    /// Check structure, signature and expiry. Says nothing about whether
    /// the token is still the owner's active key.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected three segments"));
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(invalid("unsupported algorithm"));
        }

        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| invalid("signature is not base64url"))?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| invalid("signature mismatch"))?;

        let claims: TokenClaims = decode_json(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(invalid("token expired"));
        }
        Ok(claims)
    }
}

fn invalid(reason: &str) -> KeyError {
    KeyError::InvalidSignature(reason.to_string())
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| invalid("segment is not base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| invalid("segment is not valid JSON"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn sign_then_verify() {
        let signer = TokenSigner::new("secret", 3650);
        let token = signer.sign("owner-1", "author-1", now()).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = signer.verify(&token, now()).unwrap();
        assert_eq!(claims.owner_id, "owner-1");
        assert_eq!(claims.author_id, "author-1");
        assert_eq!(claims.exp - claims.iat, 3650 * 86_400);
    }

    #[test]
    fn same_second_tokens_differ() {
        let signer = TokenSigner::new("secret", 1);
        assert_ne!(
            signer.sign("o", "a", now()).unwrap(),
            signer.sign("o", "a", now()).unwrap()
        );
    }

    #[test]
    fn wrong_secret_fails() {
        let token = TokenSigner::new("secret", 1).sign("o", "a", now()).unwrap();
        let err = TokenSigner::new("other", 1).verify(&token, now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn tampered_claims_fail() {
        let signer = TokenSigner::new("secret", 1);
        let token = signer.sign("owner-1", "a", now()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                owner_id: "owner-2".into(),
                author_id: "a".into(),
                iat: 0,
                exp: i64::MAX,
                jti: "forged".into(),
            })
            .unwrap(),
        );
        let token = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert!(signer.verify(&token, now()).is_err());
    }

    #[test]
    fn expired_token_fails() {
        let signer = TokenSigner::new("secret", 1);
        let token = signer.sign("o", "a", now()).unwrap();
        assert!(signer.verify(&token, now() + Duration::days(1)).is_err());
        assert!(signer.verify(&token, now() + Duration::hours(23)).is_ok());
    }

    #[test]
    fn malformed_tokens_fail() {
        let signer = TokenSigner::new("secret", 1);
        for token in ["", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(signer.verify(token, now()).is_err(), "{token:?}");
        }
    }

    #[test]
    fn debug_hides_secret() {
        let out = format!("{:?}", TokenSigner::new("hunter2", 1));
        assert!(!out.contains("hunter2"));
    }
}
