use std::collections::BTreeSet;

use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use time::OffsetDateTime;

/// Standard alphabet that tolerates non-zero bits in the final symbol, as
/// some token issuers emit them.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Why a token payload could not be read. Never leaves this module.
#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("missing payload segment")]
    MissingSegment,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// `aud` claim. Providers emit either a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(a) => a == audience,
            Self::Multiple(all) => all.iter().any(|a| a == audience),
        }
    }
}

/// Claim set read from the payload segment of a compact token.
///
/// The signature is NOT verified. Treat these claims as a client-side hint
/// (display name, roles for UI gating), not as proof of identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    inner: Map<String, JsonValue>,
}

impl Claims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Gets the full claim map.
    #[must_use]
    pub fn as_json(&self) -> &Map<String, JsonValue> {
        &self.inner
    }

    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.str_claim("preferred_username")
    }

    #[must_use]
    pub fn iss(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    #[must_use]
    pub fn azp(&self) -> Option<&str> {
        self.str_claim("azp")
    }

    #[must_use]
    pub fn aud(&self) -> Option<Audience> {
        self.inner
            .get("aud")
            .and_then(|v| Audience::deserialize(v).ok())
    }

    /// Expiry as epoch seconds. Fractional values are truncated.
    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        let exp = self.inner.get("exp")?;
        exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
    }

    /// True when `exp` is present and `now` is at or past it.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }

    /// Roles under `realm_access.roles`. Non-string entries are ignored.
    #[must_use]
    pub fn roles(&self) -> BTreeSet<String> {
        self.inner
            .get("realm_access")
            .and_then(|ra| ra.get("roles"))
            .and_then(JsonValue::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn str_claim(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(JsonValue::as_str)
    }
}

impl From<Map<String, JsonValue>> for Claims {
    fn from(inner: Map<String, JsonValue>) -> Self {
        Self { inner }
    }
}

/// Decodes the claim set of a compact `header.payload.signature` token.
///
/// Returns `None` for anything that is not a readable JSON object in the
/// second segment. Callers treat `None` as "not authenticated".
#[must_use]
pub fn decode_claims(token: &str) -> Option<Claims> {
    match try_decode(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(error = %e, "Token payload not decodable");
            None
        }
    }
}

fn try_decode(token: &str) -> Result<Claims, DecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(DecodeError::MissingSegment)?;

    let bytes = PAYLOAD_ENGINE.decode(to_padded_standard(payload))?;
    let text = String::from_utf8(bytes)?;

    match serde_json::from_str::<JsonValue>(&text)? {
        JsonValue::Object(inner) => Ok(Claims { inner }),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Maps the base64url alphabet onto the standard one and restores `=` padding.
fn to_padded_standard(segment: &str) -> String {
    let mut normalized: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    normalized
}
