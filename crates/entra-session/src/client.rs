//! Identity-provider client boundary
//!
//! Everything protocol-shaped — authorization code flow, PKCE, token
//! caching, redirect plumbing, secure storage — lives behind the
//! [`IdentityClient`] trait. The adapter only sequences calls against it.

use async_trait::async_trait;
use entra_types::{Account, AuthResult, Prompt, SessionResult, TokenRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::CacheLocation;

/// Construction input for the identity-provider client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Application (client) id
    pub client_id: String,

    /// Authority URL (tenant or B2C policy authority)
    pub authority: String,

    /// Host names the client may trust
    pub known_authorities: Vec<String>,

    /// Redirect URI for interactive flows
    pub redirect_uri: String,

    /// Redirect URI after logout, if different
    pub post_logout_redirect_uri: Option<String>,

    /// Token cache placement
    pub cache_location: CacheLocation,

    /// Verbose provider logging
    pub enable_logging: bool,
}

/// Silent acquisition call payload.
///
/// The adapter always forces `prompt` to [`Prompt::None`]; a silent call
/// must never raise UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilentRequest {
    pub scopes: Vec<String>,
    pub prompt: Prompt,
    pub account: Account,
    pub extra_parameters: HashMap<String, String>,
}

/// Interactive login call payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveRequest {
    pub scopes: Vec<String>,
    pub prompt: Option<Prompt>,
    pub account: Option<Account>,
    pub extra_parameters: HashMap<String, String>,
    pub login_hint: Option<String>,
}

impl InteractiveRequest {
    /// Build the interactive payload from the immutable token request,
    /// pinned to whatever account is currently resolvable.
    pub(crate) fn from_token_request(request: &TokenRequest, account: Option<Account>) -> Self {
        Self {
            scopes: request.scopes.clone(),
            prompt: request.prompt,
            account,
            extra_parameters: request.extra_parameters.clone(),
            login_hint: request.login_hint.clone(),
        }
    }
}

/// Operations the adapter consumes from the identity-provider client
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Resolve the return leg of a redirect-based flow, if this process was
    /// launched by one. Called at most once per adapter lifetime; repeated
    /// awaits go through the adapter's memoized gate.
    async fn complete_redirect(&self) -> SessionResult<Option<AuthResult>>;

    /// Acquire a token without user interaction.
    ///
    /// Fails when no valid cached session exists and the refresh mechanism
    /// cannot produce one.
    async fn acquire_token_silent(&self, request: SilentRequest) -> SessionResult<AuthResult>;

    /// Interactive login in a popup window
    async fn login_popup(&self, request: InteractiveRequest) -> SessionResult<AuthResult>;

    /// Start a full-page redirect login.
    ///
    /// The call only confirms the redirect was started; the outcome is
    /// observed by the next adapter construction via [`complete_redirect`].
    ///
    /// [`complete_redirect`]: IdentityClient::complete_redirect
    async fn begin_redirect_login(&self, request: InteractiveRequest) -> SessionResult<()>;

    /// All cached accounts, in provider-defined order
    async fn accounts(&self) -> SessionResult<Vec<Account>>;

    /// Popup-window logout
    async fn logout_popup(&self, account: Option<Account>) -> SessionResult<()>;

    /// Redirect-based logout.
    ///
    /// `suppress_navigation` keeps the provider from navigating away so the
    /// host application controls the post-logout flow.
    async fn begin_redirect_logout(
        &self,
        account: Option<Account>,
        suppress_navigation: bool,
    ) -> SessionResult<()>;

    /// Clear the provider's own persisted cache
    async fn clear_cache(&self) -> SessionResult<()>;
}

/// Factory injected by the embedding application to bind a real provider
/// client to the settings derived from configuration.
pub type ClientFactory =
    dyn Fn(ClientSettings) -> SessionResult<Arc<dyn IdentityClient>> + Send + Sync;

/// Scripted popup outcome for [`MockIdentityClient`]
enum PopupBehavior {
    Respond(SessionResult<AuthResult>),
    /// Hold the call open forever (in-flight interactive login)
    NeverResolve,
}

/// In-memory identity client for tests.
///
/// Outcomes are scripted up front with the `with_*` builders; every call is
/// counted and acquisition payloads are recorded for assertions.
pub struct MockIdentityClient {
    redirect_result: Mutex<SessionResult<Option<AuthResult>>>,
    silent_result: Mutex<SessionResult<AuthResult>>,
    popup_behavior: Mutex<PopupBehavior>,
    accounts: Mutex<Vec<Account>>,
    logout_result: Mutex<SessionResult<()>>,

    redirect_completions: AtomicUsize,
    silent_calls: AtomicUsize,
    popup_calls: AtomicUsize,
    redirect_login_calls: AtomicUsize,
    account_queries: AtomicUsize,
    logout_popup_calls: AtomicUsize,
    redirect_logout_calls: AtomicUsize,
    clear_cache_calls: AtomicUsize,

    silent_requests: Mutex<Vec<SilentRequest>>,
    interactive_requests: Mutex<Vec<InteractiveRequest>>,
    suppressed_navigations: Mutex<Vec<bool>>,
}

impl MockIdentityClient {
    pub fn new() -> Self {
        Self {
            redirect_result: Mutex::new(Ok(None)),
            silent_result: Mutex::new(Err(entra_types::SessionError::Provider(
                "no silent result scripted".to_string(),
            ))),
            popup_behavior: Mutex::new(PopupBehavior::Respond(Err(
                entra_types::SessionError::Interactive("no popup result scripted".to_string()),
            ))),
            accounts: Mutex::new(Vec::new()),
            logout_result: Mutex::new(Ok(())),
            redirect_completions: AtomicUsize::new(0),
            silent_calls: AtomicUsize::new(0),
            popup_calls: AtomicUsize::new(0),
            redirect_login_calls: AtomicUsize::new(0),
            account_queries: AtomicUsize::new(0),
            logout_popup_calls: AtomicUsize::new(0),
            redirect_logout_calls: AtomicUsize::new(0),
            clear_cache_calls: AtomicUsize::new(0),
            silent_requests: Mutex::new(Vec::new()),
            interactive_requests: Mutex::new(Vec::new()),
            suppressed_navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_redirect_result(self, result: SessionResult<Option<AuthResult>>) -> Self {
        *self.redirect_result.lock() = result;
        self
    }

    pub fn with_silent_result(self, result: SessionResult<AuthResult>) -> Self {
        *self.silent_result.lock() = result;
        self
    }

    pub fn with_popup_result(self, result: SessionResult<AuthResult>) -> Self {
        *self.popup_behavior.lock() = PopupBehavior::Respond(result);
        self
    }

    /// Script the popup to stay pending forever
    pub fn with_popup_never_resolving(self) -> Self {
        *self.popup_behavior.lock() = PopupBehavior::NeverResolve;
        self
    }

    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        *self.accounts.lock() = accounts;
        self
    }

    pub fn with_logout_result(self, result: SessionResult<()>) -> Self {
        *self.logout_result.lock() = result;
        self
    }

    pub fn redirect_completions(&self) -> usize {
        self.redirect_completions.load(Ordering::SeqCst)
    }

    pub fn silent_calls(&self) -> usize {
        self.silent_calls.load(Ordering::SeqCst)
    }

    pub fn popup_calls(&self) -> usize {
        self.popup_calls.load(Ordering::SeqCst)
    }

    pub fn redirect_login_calls(&self) -> usize {
        self.redirect_login_calls.load(Ordering::SeqCst)
    }

    pub fn logout_popup_calls(&self) -> usize {
        self.logout_popup_calls.load(Ordering::SeqCst)
    }

    pub fn redirect_logout_calls(&self) -> usize {
        self.redirect_logout_calls.load(Ordering::SeqCst)
    }

    pub fn clear_cache_calls(&self) -> usize {
        self.clear_cache_calls.load(Ordering::SeqCst)
    }

    /// Silent acquisition payloads seen so far
    pub fn silent_requests(&self) -> Vec<SilentRequest> {
        self.silent_requests.lock().clone()
    }

    /// Interactive payloads seen so far (popup and redirect)
    pub fn interactive_requests(&self) -> Vec<InteractiveRequest> {
        self.interactive_requests.lock().clone()
    }

    /// Navigation-suppression flags seen by redirect logouts
    pub fn suppressed_navigations(&self) -> Vec<bool> {
        self.suppressed_navigations.lock().clone()
    }
}

impl Default for MockIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn complete_redirect(&self) -> SessionResult<Option<AuthResult>> {
        self.redirect_completions.fetch_add(1, Ordering::SeqCst);
        self.redirect_result.lock().clone()
    }

    async fn acquire_token_silent(&self, request: SilentRequest) -> SessionResult<AuthResult> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        self.silent_requests.lock().push(request);
        self.silent_result.lock().clone()
    }

    async fn login_popup(&self, request: InteractiveRequest) -> SessionResult<AuthResult> {
        self.popup_calls.fetch_add(1, Ordering::SeqCst);
        self.interactive_requests.lock().push(request);
        let scripted = match &*self.popup_behavior.lock() {
            PopupBehavior::Respond(result) => Some(result.clone()),
            PopupBehavior::NeverResolve => None,
        };
        match scripted {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn begin_redirect_login(&self, request: InteractiveRequest) -> SessionResult<()> {
        self.redirect_login_calls.fetch_add(1, Ordering::SeqCst);
        self.interactive_requests.lock().push(request);
        Ok(())
    }

    async fn accounts(&self) -> SessionResult<Vec<Account>> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().clone())
    }

    async fn logout_popup(&self, _account: Option<Account>) -> SessionResult<()> {
        self.logout_popup_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_result.lock().clone()
    }

    async fn begin_redirect_logout(
        &self,
        _account: Option<Account>,
        suppress_navigation: bool,
    ) -> SessionResult<()> {
        self.redirect_logout_calls.fetch_add(1, Ordering::SeqCst);
        self.suppressed_navigations.lock().push(suppress_navigation);
        self.logout_result.lock().clone()
    }

    async fn clear_cache(&self) -> SessionResult<()> {
        self.clear_cache_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
