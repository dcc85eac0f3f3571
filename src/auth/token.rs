//! Signed bearer tokens.
//!
//! Wire format: `base64url(claims_json) "." base64url(hmac_sha256(key, first_segment))`,
//! unpadded. Claims carry the username and absolute issue/expiry instants in
//! Unix seconds. Tokens are stateless; the signer only needs its key.

use super::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime: 8 hours (seconds).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 8 * 3600;

/// Byte length of a generated signing key.
const GENERATED_KEY_BYTES: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Decoded contents of a token whose signature verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
}

/// Issues and checks tokens with one process-wide key.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer from an externally supplied key.
    pub fn new(key: &[u8], ttl_secs: u64) -> anyhow::Result<Self> {
        if key.is_empty() {
            anyhow::bail!("Token signing key cannot be empty");
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("Invalid token signing key: {e}"))?;
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| anyhow::anyhow!("Token TTL out of range: {ttl_secs}"))?;
        Ok(Self { mac, ttl })
    }

    /// Build a signer with a random key. Tokens die with the process.
    pub fn generate(ttl_secs: u64) -> anyhow::Result<Self> {
        let key: [u8; GENERATED_KEY_BYTES] = rand::random();
        Self::new(&key, ttl_secs)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issue a token for `username` expiring `ttl` from now.
    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        self.issue_at(username, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: username.to_string(),
            iat: issued_at.timestamp(),
            exp: issued_at
                .checked_add_signed(self.ttl)
                .ok_or(AuthError::ExpiryOutOfRange)?
                .timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        Ok(format!("{payload}.{signature}"))
    }

    /// Check the signature and decode the claims. Expiry is reported, not
    /// enforced; see [`TokenSigner::verify`].
    pub fn parse(&self, token: &str) -> Result<ParsedToken, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidToken)?;

        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(AuthError::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidToken)?;

        Ok(ParsedToken {
            username: claims.sub,
            issued_at,
            expires_at,
            expired: Utc::now() > expires_at,
        })
    }

    /// Parse and reject expired tokens. Returns the bound username.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let parsed = self.parse(token)?;
        if parsed.expired {
            return Err(AuthError::TokenExpired);
        }
        Ok(parsed.username)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}
