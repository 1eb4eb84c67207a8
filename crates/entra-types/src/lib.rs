//! Shared types for the Entra session adapter

pub mod errors;

pub use errors::{SessionError, SessionResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signed-in account as reported by the identity-provider client.
///
/// The adapter never owns account state independently; this is a copy of
/// the provider's record, carried inside the current [`AuthResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Provider-assigned stable identifier for the account
    pub home_account_id: String,

    /// Authority host the account was issued by
    pub environment: String,

    /// Tenant the account belongs to
    pub tenant_id: String,

    /// Sign-in name (usually a UPN or email address)
    pub username: String,

    /// Display name, if the provider supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Structured outcome of a successful token acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Account the tokens were issued for
    pub account: Option<Account>,

    /// Access token for resource calls
    pub access_token: String,

    /// OIDC identity token
    pub id_token: String,

    /// Access token expiry, if the provider reported one
    pub expires_on: Option<DateTime<Utc>>,

    /// Scopes granted (may differ from requested)
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthResult {
    /// Serialize the result for cross-boundary transport.
    ///
    /// Callers outside this crate receive the acquisition outcome as an
    /// encoded JSON payload, never as a live object.
    pub fn to_payload(&self) -> SessionResult<String> {
        serde_json::to_string(self)
            .map_err(|e| SessionError::Provider(format!("Failed to serialize auth result: {}", e)))
    }
}

/// Prompt behavior requested for interactive flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Never show UI; fail instead
    None,
    /// Force credential entry
    Login,
    /// Show the account picker
    SelectAccount,
    /// Force the consent dialog
    Consent,
    /// Sign up a new user (B2C)
    Create,
}

impl Prompt {
    /// Wire value sent to the authorization endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Prompt::None => "none",
            Prompt::Login => "login",
            Prompt::SelectAccount => "select_account",
            Prompt::Consent => "consent",
            Prompt::Create => "create",
        }
    }
}

/// Immutable token request derived from configuration at startup.
///
/// Built once; every acquisition call reuses it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Requested scopes, in configuration order
    pub scopes: Vec<String>,

    /// Prompt behavior for interactive flows
    pub prompt: Option<Prompt>,

    /// Extra query parameters forwarded to the provider
    pub extra_parameters: HashMap<String, String>,

    /// Pre-filled sign-in name for interactive flows
    pub login_hint: Option<String>,
}
