//! Per-provider placement of auth material on outgoing requests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::credentials::Scheme;

/// How a connector carries its credential on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: sso-key <key>:<secret>`.
    SsoKey,
    /// `Authorization: Basic base64(<key>:<secret>)`.
    Basic,
    /// Raw token in a vendor header, e.g. `xi-api-key`.
    Header { name: String },
    /// Key appended to the query string, e.g. `key=<apiKey>`.
    QueryKey { param: String },
}

/// Credential material available at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMaterial<'a> {
    KeySecret { key: &'a str, secret: &'a str },
    Token(&'a str),
    ApiKey(&'a str),
}

/// Where the strategy wants the credential to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlacement {
    Header { name: String, value: String },
    Query { name: String, value: String },
}

impl AuthStrategy {
    /// Whether this strategy can carry credentials of `scheme`.
    pub fn accepts(&self, scheme: Scheme) -> bool {
        match self {
            Self::SsoKey | Self::Basic => scheme == Scheme::ApiKeySecret,
            Self::Bearer | Self::Header { .. } | Self::QueryKey { .. } => matches!(
                scheme,
                Scheme::BearerToken | Scheme::OAuth2 | Scheme::ApiKeyOnly
            ),
        }
    }

    /// Map material to a header or query placement; `None` on mismatch.
    pub fn apply(&self, material: AuthMaterial<'_>) -> Option<AuthPlacement> {
        match (self, material) {
            (Self::SsoKey, AuthMaterial::KeySecret { key, secret }) => Some(AuthPlacement::Header {
                name: "Authorization".to_string(),
                value: format!("sso-key {key}:{secret}"),
            }),
            (Self::Basic, AuthMaterial::KeySecret { key, secret }) => Some(AuthPlacement::Header {
                name: "Authorization".to_string(),
                value: format!("Basic {}", STANDARD.encode(format!("{key}:{secret}"))),
            }),
            (Self::Bearer, AuthMaterial::Token(token) | AuthMaterial::ApiKey(token)) => {
                Some(AuthPlacement::Header {
                    name: "Authorization".to_string(),
                    value: format!("Bearer {token}"),
                })
            }
            (Self::Header { name }, AuthMaterial::Token(token) | AuthMaterial::ApiKey(token)) => {
                Some(AuthPlacement::Header {
                    name: name.clone(),
                    value: token.to_string(),
                })
            }
            (
                Self::QueryKey { param },
                AuthMaterial::Token(token) | AuthMaterial::ApiKey(token),
            ) => Some(AuthPlacement::Query {
                name: param.clone(),
                value: token.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sso_key_joins_key_and_secret() {
        let placement = AuthStrategy::SsoKey.apply(AuthMaterial::KeySecret {
            key: "k",
            secret: "s",
        });
        assert_eq!(
            placement,
            Some(AuthPlacement::Header {
                name: "Authorization".into(),
                value: "sso-key k:s".into(),
            })
        );
    }

    #[test]
    fn basic_encodes_credentials() {
        let placement = AuthStrategy::Basic.apply(AuthMaterial::KeySecret {
            key: "user",
            secret: "app password",
        });
        assert_eq!(
            placement,
            Some(AuthPlacement::Header {
                name: "Authorization".into(),
                value: "Basic dXNlcjphcHAgcGFzc3dvcmQ=".into(),
            })
        );
    }

    #[test]
    fn vendor_header_carries_raw_token() {
        let strategy = AuthStrategy::Header {
            name: "xi-api-key".into(),
        };
        assert_eq!(
            strategy.apply(AuthMaterial::Token("t")),
            Some(AuthPlacement::Header {
                name: "xi-api-key".into(),
                value: "t".into(),
            })
        );
    }

    #[test]
    fn query_key_places_api_key_in_query() {
        let strategy = AuthStrategy::QueryKey { param: "key".into() };
        assert_eq!(
            strategy.apply(AuthMaterial::ApiKey("abc")),
            Some(AuthPlacement::Query {
                name: "key".into(),
                value: "abc".into(),
            })
        );
    }

    #[test]
    fn mismatched_material_yields_no_placement() {
        assert_eq!(AuthStrategy::SsoKey.apply(AuthMaterial::Token("t")), None);
        assert!(!AuthStrategy::SsoKey.accepts(Scheme::OAuth2));
        assert!(AuthStrategy::Bearer.accepts(Scheme::OAuth2));
        assert!(!AuthStrategy::Bearer.accepts(Scheme::ApiKeySecret));
    }

    #[test]
    fn strategy_deserializes_from_tagged_toml() {
        let parsed: AuthStrategy =
            toml::from_str("type = \"header\"\nname = \"X-Figma-Token\"\n").expect("parse");
        assert_eq!(
            parsed,
            AuthStrategy::Header {
                name: "X-Figma-Token".into()
            }
        );
    }
}
