//! Auth session adapter for Microsoft Entra ID
//!
//! Wraps an injected MSAL-style identity-provider client: silent token
//! refresh, interactive login (popup or redirect), logout and cached-account
//! lookup. Protocol work — authorization code flow, PKCE, token caching,
//! token validation, secure storage — stays behind the [`IdentityClient`]
//! trait; this crate only sequences calls against it, with the ordering
//! constraint that every acquisition path awaits the redirect-completion
//! check first.

pub mod client;
pub mod config;
mod redirect;
pub mod session;
pub mod storage;

// Re-export public API
pub use client::{
    ClientFactory, ClientSettings, IdentityClient, InteractiveRequest, MockIdentityClient,
    SilentRequest,
};
pub use config::{CacheLocation, ScopeSetting, SessionConfig};
pub use entra_types::{Account, AuthResult, Prompt, SessionError, SessionResult, TokenRequest};
pub use session::{AuthSession, LoginFlow, LoginOutcome, LogoutFlow};
pub use storage::{Cookie, FileHostStorage, HostStorage, MemoryHostStorage};
