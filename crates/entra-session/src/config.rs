//! Session configuration and provider-settings derivation

use entra_types::{Prompt, SessionError, SessionResult, TokenRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::client::ClientSettings;

/// Where the provider client keeps its token cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLocation {
    /// Long-lived host storage, survives restarts
    #[default]
    LocalStorage,
    /// Session-scoped host storage
    SessionStorage,
    /// In-memory only
    Memory,
}

/// Requested scopes: a space-delimited string or an explicit list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeSetting {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeSetting {
    /// Derived scope list.
    ///
    /// A delimited string splits on single spaces; an explicit list passes
    /// through unchanged.
    pub fn to_scopes(&self) -> Vec<String> {
        match self {
            ScopeSetting::Delimited(raw) => raw.split(' ').map(str::to_string).collect(),
            ScopeSetting::List(list) => list.clone(),
        }
    }
}

/// Provider and session configuration recognized at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Application (client) id registered with the identity provider
    pub client_id: String,

    /// Tenant name or id used to build the authority URL
    pub tenant: String,

    /// B2C tenants build a policy authority instead of the standard one
    #[serde(default)]
    pub is_b2c: bool,

    /// B2C user-flow policy name; required when `is_b2c` is set
    #[serde(default)]
    pub policy: Option<String>,

    /// Where the provider redirects after interactive flows
    pub redirect_uri: String,

    /// Where the provider redirects after logout, if different
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,

    /// Token cache placement for the provider client
    #[serde(default)]
    pub cache_location: CacheLocation,

    /// Verbose provider logging
    #[serde(default)]
    pub enable_logging: bool,

    /// Requested scopes
    pub scope: ScopeSetting,

    /// Extra query parameters as a JSON-encoded object of strings
    #[serde(default)]
    pub custom_parameters: Option<String>,

    /// Prompt behavior for interactive flows
    #[serde(default)]
    pub prompt: Option<Prompt>,

    /// Pre-filled sign-in name for interactive flows
    #[serde(default)]
    pub login_hint: Option<String>,
}

impl SessionConfig {
    /// Authority URL for this tenant.
    ///
    /// B2C tenants use the trust-framework-policy authority on the
    /// b2clogin.com host; everything else goes through
    /// login.microsoftonline.com.
    pub fn authority(&self) -> String {
        if self.is_b2c {
            let policy = self.policy.as_deref().unwrap_or_default();
            format!(
                "https://{}.b2clogin.com/tfp/{}.onmicrosoft.com/{}/",
                self.tenant, self.tenant, policy
            )
        } else {
            format!("https://login.microsoftonline.com/{}", self.tenant)
        }
    }

    /// Host names the provider client may trust for this tenant
    pub fn known_authorities(&self) -> Vec<String> {
        vec![
            format!("{}.b2clogin.com", self.tenant),
            "login.microsoftonline.com".to_string(),
        ]
    }

    /// Build the immutable token request used for every acquisition.
    ///
    /// Fails fast if `custom_parameters` is not a JSON object of strings.
    pub fn token_request(&self) -> SessionResult<TokenRequest> {
        let extra_parameters = match self.custom_parameters.as_deref() {
            None => HashMap::new(),
            Some(raw) => serde_json::from_str::<HashMap<String, String>>(raw)
                .map_err(|e| SessionError::Config(format!("Malformed custom parameters: {}", e)))?,
        };

        Ok(TokenRequest {
            scopes: self.scope.to_scopes(),
            prompt: self.prompt,
            extra_parameters,
            login_hint: self.login_hint.clone(),
        })
    }

    /// Construction input for the identity-provider client
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            client_id: self.client_id.clone(),
            authority: self.authority(),
            known_authorities: self.known_authorities(),
            redirect_uri: self.redirect_uri.clone(),
            post_logout_redirect_uri: self.post_logout_redirect_uri.clone(),
            cache_location: self.cache_location,
            enable_logging: self.enable_logging,
        }
    }
}
