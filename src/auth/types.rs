//! Static credential types
//!
//! Credentials are turned into a `RequestEditor` that runs before any
//! per-call option, so a call can still override them.

use crate::http::options::{set_header, set_query};
use crate::http::RequestEditor;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

/// Query parameter the CRM expects API tokens in
pub const DEFAULT_TOKEN_PARAM: &str = "api_token";

/// Location for API token placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Place in HTTP header
    Header,
    /// Place in query parameter
    #[default]
    Query,
}

/// Credentials attached to every request
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Auth {
    /// No authentication
    #[default]
    None,

    /// API token in a query parameter or header
    ApiToken {
        /// Where to place the token
        #[serde(default)]
        location: Location,
        /// Query parameter or header name
        #[serde(default = "default_token_param")]
        name: String,
        /// The token
        value: String,
    },

    /// Bearer token authentication
    Bearer {
        /// The bearer token
        token: String,
    },

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
}

fn default_token_param() -> String {
    DEFAULT_TOKEN_PARAM.to_string()
}

impl Auth {
    /// API token sent as `?api_token=...`
    pub fn api_token(value: impl Into<String>) -> Self {
        Self::ApiToken {
            location: Location::Query,
            name: default_token_param(),
            value: value.into(),
        }
    }

    /// Bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Query parameter carrying an API token, for tokens placed in the query
    pub fn query_param(&self) -> Option<(&str, &str)> {
        match self {
            Auth::ApiToken {
                location: Location::Query,
                name,
                value,
            } => Some((name.as_str(), value.as_str())),
            _ => None,
        }
    }

    /// Editor that attaches these credentials to a built request, if any
    pub fn editor(&self) -> Option<RequestEditor> {
        match self {
            Auth::None => None,
            Auth::ApiToken {
                location: Location::Query,
                name,
                value,
            } => Some(set_query(name.as_str(), value.as_str())),
            Auth::ApiToken {
                location: Location::Header,
                name,
                value,
            } => Some(set_header(name.as_str(), value.as_str(), true)),
            Auth::Bearer { token } => Some(set_header(
                AUTHORIZATION.as_str(),
                format!("Bearer {token}"),
                true,
            )),
            Auth::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                Some(set_header(
                    AUTHORIZATION.as_str(),
                    format!("Basic {encoded}"),
                    true,
                ))
            }
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::ApiToken { location, name, .. } => f
                .debug_struct("ApiToken")
                .field("location", location)
                .field("name", name)
                .field("value", &"<redacted>")
                .finish(),
            Auth::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}
