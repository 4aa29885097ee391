use crate::config::SigningSecret;
use crate::domain::claims::TokenClaims;
use crate::domain::session::BearerToken;
use crate::error::{Result, TapError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Marks the token family; also pins the claims schema version.
pub const TOKEN_PREFIX: &str = "TAP_";
const SEPARATOR: char = '.';

/// Encodes and verifies tap tokens of the form
/// `TAP_<base64url(claims-json)>.<base64url(HMAC-SHA256)>`.
///
/// The MAC covers the encoded claims text, so a token is rejected on its
/// signature before any claim is decoded.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl TokenCodec {
    pub fn new(secret: &SigningSecret) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret())
            .map_err(|e| TapError::Configuration(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn encode(&self, claims: &TokenClaims) -> Result<BearerToken> {
        let json = serde_json::to_vec(claims)?;
        let encoded_claims = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(encoded_claims.as_bytes()));
        Ok(BearerToken::new(format!(
            "{TOKEN_PREFIX}{encoded_claims}{SEPARATOR}{signature}"
        )))
    }

    /// Verifies against the wall clock.
    pub fn decode(&self, token: &BearerToken) -> Result<TokenClaims> {
        self.decode_at(token, Utc::now())
    }

    pub fn decode_at(&self, token: &BearerToken, now: DateTime<Utc>) -> Result<TokenClaims> {
        let body = token
            .as_str()
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(TapError::InvalidFormat)?;

        let mut parts = body.split(SEPARATOR);
        let (Some(encoded_claims), Some(signature), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TapError::InvalidFormat);
        };

        // A MAC segment that is not even base64 cannot match either.
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TapError::InvalidSignature)?;
        let mut mac = self.mac.clone();
        mac.update(encoded_claims.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TapError::InvalidSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded_claims)
            .map_err(|_| TapError::InvalidFormat)?;
        let claims: TokenClaims =
            serde_json::from_slice(&json).map_err(|_| TapError::InvalidFormat)?;

        if now.timestamp_millis() > claims.expires_at {
            return Err(TapError::Expired);
        }
        Ok(claims)
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}
