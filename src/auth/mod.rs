//! Bearer credentials: HS256 JSON Web Tokens.
//!
//! Only the compact HS256 form is accepted. The user id comes from the `sub`
//! claim, falling back to `userId`; `exp` is enforced when present.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::MailTraceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// The authenticated user, if either id claim is non-empty.
    pub fn user(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.user_id.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

pub struct JwtKeys {
    secret: Vec<u8>,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn unauthorized(reason: &str) -> MailTraceError {
    MailTraceError::Auth(reason.to_string())
}

impl JwtKeys {
    pub fn new(secret: &str) -> Result<Self, MailTraceError> {
        if secret.is_empty() {
            return Err(MailTraceError::Config("jwtSecret is empty".into()));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, MailTraceError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, MailTraceError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = serde_json::to_vec(claims).map_err(anyhow::Error::from)?;
        let signing_input = format!("{}.{}", header, URL_SAFE_NO_PAD.encode(payload));
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Mint a token for `user_id`, expiring after `ttl` if given.
    pub fn issue(&self, user_id: &str, ttl: Option<Duration>) -> Result<String, MailTraceError> {
        let now = Utc::now().timestamp();
        let exp = ttl.map(|ttl| {
            let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
            now.saturating_add(secs)
        });
        self.sign(&Claims {
            sub: Some(user_id.to_string()),
            user_id: None,
            iat: Some(now),
            exp,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, MailTraceError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unauthorized("malformed token"));
        };

        let header: Header = URL_SAFE_NO_PAD
            .decode(header)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| unauthorized("malformed header"))?;
        if header.alg != "HS256" {
            return Err(unauthorized("unsupported algorithm"));
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| unauthorized("malformed signature"))?;
        let signing_input = &token[..token.len() - signature.len() - 1];
        let expected = self.mac(signing_input)?.finalize().into_bytes();
        if !bool::from(expected.as_slice().ct_eq(&provided)) {
            return Err(unauthorized("bad signature"));
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| unauthorized("malformed claims"))?;
        if let Some(exp) = claims.exp
            && exp <= Utc::now().timestamp()
        {
            return Err(unauthorized("token expired"));
        }
        if claims.user().is_none() {
            return Err(unauthorized("token has no subject"));
        }
        Ok(claims)
    }

    /// Resolve an `Authorization` header value to a user id.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<String, MailTraceError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        let claims = self.verify(token)?;
        claims
            .user()
            .map(str::to_string)
            .ok_or_else(|| unauthorized("token has no subject"))
    }
}
