use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

/// Short-lived credential presented as `Authorization: Bearer <token>`.
///
/// Opaque compact string, replaced wholesale on refresh. `Debug` never
/// prints the token value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Longer-lived credential exchanged for a new [`AccessToken`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

impl RefreshToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_token() {
        let access = AccessToken::from("secret-access".to_string());
        let refresh = RefreshToken::from("secret-refresh".to_string());

        assert!(!format!("{access:?}").contains("secret"));
        assert!(!format!("{refresh:?}").contains("secret"));
    }

    #[test]
    fn serde_is_transparent() {
        let token = AccessToken::from("abc.def.ghi".to_string());
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"abc.def.ghi\"");
    }

    #[test]
    fn newtypes_prevent_mixing() {
        fn takes_access(_: &AccessToken) {}
        fn takes_refresh(_: &RefreshToken) {}

        takes_access(&AccessToken::from("t".to_string()));
        takes_refresh(&RefreshToken::from("t".to_string()));
        // takes_access(&RefreshToken::from(..));  // Compile error!
    }
}
