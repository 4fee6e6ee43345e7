//! Opaque bearer tokens: generation, format checks and lookup hashes.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::models::{TokenRecord, TokenScope};

/// Random bytes behind every token.
pub const TOKEN_BYTES: usize = 16;
/// Rendered length of a token: 16 bytes in unpadded base64url.
pub const TOKEN_LENGTH: usize = 22;

/// SHA-256 digest of a token plaintext; the only form that is persisted.
#[derive(Clone, Copy, Eq)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for TokenHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl TryFrom<&[u8]> for TokenHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(bytes.try_into()?))
    }
}

impl std::fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenHash(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// A token handed back to the caller exactly once.
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    #[serde(rename = "token")]
    pub plaintext: String,
    pub expiry: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("plaintext", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

pub struct TokenCodec;

impl TokenCodec {
    pub fn generate() -> (String, TokenHash) {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let plaintext = URL_SAFE_NO_PAD.encode(bytes);
        let hash = Self::hash(&plaintext);
        (plaintext, hash)
    }

    pub fn hash(plaintext: &str) -> TokenHash {
        TokenHash(Sha256::digest(plaintext.as_bytes()).into())
    }

    /// Cheap structural check, run before any store lookup.
    pub fn validate_format(candidate: &str) -> bool {
        !candidate.is_empty() && candidate.len() == TOKEN_LENGTH
    }

    /// Mint a token for `user_id`. The record carries only the hash.
    pub fn issue(user_id: i64, ttl: Duration, scope: TokenScope) -> (IssuedToken, TokenRecord) {
        let (plaintext, hash) = Self::generate();
        let now = Utc::now();
        // Saturates at the latest representable instant.
        let expiry = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let record = TokenRecord {
            hash,
            user_id,
            expiry,
            scope,
        };

        (IssuedToken { plaintext, expiry }, record)
    }
}
