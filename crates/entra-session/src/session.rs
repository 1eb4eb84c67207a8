//! Auth session adapter
//!
//! Sequences silent and interactive token acquisition against the injected
//! identity-provider client. The adapter owns the current authentication
//! result and the redirect-completion gate; everything protocol-shaped is
//! delegated.

use entra_types::{Account, AuthResult, SessionError, SessionResult, TokenRequest};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, IdentityClient, InteractiveRequest, SilentRequest};
use crate::config::SessionConfig;
use crate::redirect::RedirectGate;
use crate::storage::HostStorage;

/// How an interactive login is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// Popup window; the call resolves with the outcome
    Popup,
    /// Full-page redirect; the outcome arrives on the next construction
    Redirect,
}

/// How logout is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutFlow {
    Popup,
    Redirect,
}

/// Outcome of [`AuthSession::login`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// A token was acquired; the payload is the serialized auth result
    Authenticated(String),
    /// A full-page redirect was started; success or failure will be
    /// observed by the next adapter construction via the redirect check
    RedirectStarted,
}

/// Auth session adapter.
///
/// One instance serves the whole process lifetime; construct it once at
/// startup and reuse it until shutdown. `login` and `refresh` are
/// single-flight — a second call while one is in flight fails with
/// [`SessionError::AcquisitionInFlight`].
pub struct AuthSession {
    client: Arc<dyn IdentityClient>,
    token_request: TokenRequest,
    storage: Arc<dyn HostStorage>,
    last_auth: RwLock<Option<AuthResult>>,
    redirect_gate: Arc<RedirectGate>,
    acquiring: Mutex<()>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession").finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Construct the adapter.
    ///
    /// Builds the immutable token request, creates the provider client
    /// through `factory` and starts the redirect-completion check. Fails
    /// fast on malformed configuration. Must be called from within a tokio
    /// runtime.
    pub fn new(
        config: &SessionConfig,
        factory: &ClientFactory,
        storage: Arc<dyn HostStorage>,
    ) -> SessionResult<Self> {
        let token_request = config.token_request()?;
        let settings = config.client_settings();

        debug!(
            "Creating identity-provider client for authority {}",
            settings.authority
        );
        let client = factory(settings)?;
        let redirect_gate = RedirectGate::start(Arc::clone(&client));

        Ok(Self {
            client,
            token_request,
            storage,
            last_auth: RwLock::new(None),
            redirect_gate,
            acquiring: Mutex::new(()),
        })
    }

    /// Sign in, preferring an existing session over user interaction.
    ///
    /// A silent acquisition is attempted first; only when it yields nothing
    /// does the interactive flow run. `allow_redirect_refresh` is accepted
    /// for interface compatibility and has no distinct effect: the provider
    /// cannot reuse a refresh token while the access token is still valid,
    /// so it behaves exactly like `false`.
    pub async fn login(
        &self,
        allow_redirect_refresh: bool,
        flow: LoginFlow,
    ) -> SessionResult<LoginOutcome> {
        let _guard = self
            .acquiring
            .try_lock()
            .map_err(|_| SessionError::AcquisitionInFlight)?;
        let _ = allow_redirect_refresh;

        if let Some(result) = self.silent_acquire().await {
            debug!("Silent session found, skipping interactive login");
            return Ok(LoginOutcome::Authenticated(result.to_payload()?));
        }

        let account = self.resolve_account().await;
        let request = InteractiveRequest::from_token_request(&self.token_request, account);

        match flow {
            LoginFlow::Redirect => {
                self.client
                    .begin_redirect_login(request)
                    .await
                    .map_err(interactive_error)?;
                // The page is about to navigate away; nothing more happens
                // in this process.
                Ok(LoginOutcome::RedirectStarted)
            }
            LoginFlow::Popup => match self.client.login_popup(request).await {
                Ok(result) => {
                    self.adopt(result.clone());
                    info!("Interactive login succeeded");
                    Ok(LoginOutcome::Authenticated(result.to_payload()?))
                }
                Err(e) => {
                    warn!("Interactive login failed: {}", e);
                    Err(interactive_error(e))
                }
            },
        }
    }

    /// Refresh the session without user interaction.
    ///
    /// The redirect check is consulted first and its failure is reported,
    /// unlike in the combined login path. Returns the serialized current
    /// auth result — which may have been adopted by an earlier acquisition
    /// — or [`SessionError::NoSession`] when neither the redirect nor a
    /// silent acquisition produced one.
    pub async fn refresh(&self) -> SessionResult<String> {
        let _guard = self
            .acquiring
            .try_lock()
            .map_err(|_| SessionError::AcquisitionInFlight)?;

        match self.redirect_gate.wait().await {
            Ok(Some(result)) => self.adopt(result),
            Ok(None) => {}
            Err(e) => return Err(redirect_error(e)),
        }

        self.silent_acquire().await;

        let last = self.last_auth.read();
        match last.as_ref() {
            Some(result) => result.to_payload(),
            None => Err(SessionError::NoSession),
        }
    }

    /// Sign out.
    ///
    /// With no resolvable account the provider is skipped entirely and only
    /// local state is cleared. Otherwise the current result is dropped
    /// immediately, the provider logout runs (navigation suppressed on the
    /// redirect variant), and local state is cleared afterwards.
    pub async fn logout(&self, flow: LogoutFlow) -> SessionResult<()> {
        let account = self.resolve_account().await;

        let Some(account) = account else {
            debug!("No account to sign out, clearing local state only");
            self.clear_local_state().await?;
            return Ok(());
        };

        *self.last_auth.write() = None;

        let result = match flow {
            LogoutFlow::Popup => self.client.logout_popup(Some(account)).await,
            LogoutFlow::Redirect => self.client.begin_redirect_logout(Some(account), true).await,
        };
        result.map_err(logout_error)?;

        self.clear_local_state().await?;
        info!("Signed out");
        Ok(())
    }

    /// Access token from a silent acquisition, `None` if unavailable
    pub async fn access_token(&self) -> Option<String> {
        self.silent_acquire().await.map(|r| r.access_token)
    }

    /// Identity token from a silent acquisition, `None` if unavailable
    pub async fn id_token(&self) -> Option<String> {
        self.silent_acquire().await.map(|r| r.id_token)
    }

    /// Whole auth result from a silent acquisition, serialized, `None` if
    /// unavailable
    pub async fn token(&self) -> Option<String> {
        self.silent_acquire().await.and_then(|r| r.to_payload().ok())
    }

    /// Whether a cached account exists, either from the current result or
    /// the provider's account cache
    pub async fn has_cached_account_information(&self) -> bool {
        self.resolve_account().await.is_some()
    }

    /// Clear host-local stores and cookies, then the provider's own cache.
    ///
    /// Runs as part of every logout, including the no-account path.
    pub async fn clear_local_state(&self) -> SessionResult<()> {
        self.storage.clear_persistent_store()?;
        self.storage.clear_session_store()?;
        self.storage.expire_cookies()?;
        self.client.clear_cache().await?;
        debug!("Cleared local state and provider cache");
        Ok(())
    }

    /// Try to acquire a token without user interaction.
    ///
    /// The redirect gate is awaited first; a non-null redirect outcome is
    /// adopted and returned without touching the silent endpoint. A gate
    /// failure is swallowed here — `refresh` reports it, the login path
    /// proceeds to the interactive branch regardless. Returns `None` when
    /// no cached identity exists or the provider refused the acquisition;
    /// provider errors never escape this path.
    async fn silent_acquire(&self) -> Option<AuthResult> {
        match self.redirect_gate.wait().await {
            Ok(Some(result)) => {
                debug!("Adopting redirect authentication result");
                self.adopt(result.clone());
                return Some(result);
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Ignoring redirect completion failure: {}", e);
            }
        }

        let account = self.resolve_account().await?;

        let request = SilentRequest {
            scopes: self.token_request.scopes.clone(),
            prompt: entra_types::Prompt::None,
            account,
            extra_parameters: self.token_request.extra_parameters.clone(),
        };

        match self.client.acquire_token_silent(request).await {
            Ok(result) => {
                debug!("Silent acquisition succeeded");
                self.adopt(result.clone());
                Some(result)
            }
            Err(e) => {
                info!("Unable to silently acquire a new token: {}", e);
                None
            }
        }
    }

    /// Account for acquisition calls: the current result's account when
    /// present, otherwise the provider's cached accounts. With more than
    /// one cached account the first in provider order wins.
    async fn resolve_account(&self) -> Option<Account> {
        if let Some(account) = self.last_auth.read().as_ref().and_then(|r| r.account.clone()) {
            return Some(account);
        }

        let accounts = match self.client.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Failed to enumerate cached accounts: {}", e);
                return None;
            }
        };

        if accounts.len() > 1 {
            warn!("Multiple accounts detected, selecting first");
        }
        accounts.into_iter().next()
    }

    /// Replace the current authentication result wholesale
    fn adopt(&self, result: AuthResult) {
        *self.last_auth.write() = Some(result);
    }
}

fn interactive_error(e: SessionError) -> SessionError {
    match e {
        SessionError::Interactive(_) => e,
        other => SessionError::Interactive(other.to_string()),
    }
}

fn redirect_error(e: SessionError) -> SessionError {
    match e {
        SessionError::RedirectHandling(_) => e,
        other => SessionError::RedirectHandling(other.to_string()),
    }
}

fn logout_error(e: SessionError) -> SessionError {
    match e {
        SessionError::Logout(_) => e,
        other => SessionError::Logout(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientSettings, MockIdentityClient};
    use crate::config::{ScopeSetting, SessionConfig};
    use crate::storage::MemoryHostStorage;
    use entra_types::Prompt;

    fn account(id: &str) -> Account {
        Account {
            home_account_id: id.to_string(),
            environment: "login.microsoftonline.com".to_string(),
            tenant_id: "contoso".to_string(),
            username: format!("{}@contoso.com", id),
            name: None,
        }
    }

    fn auth_result(token: &str, account: Option<Account>) -> AuthResult {
        AuthResult {
            account,
            access_token: token.to_string(),
            id_token: format!("id-{}", token),
            expires_on: None,
            scopes: vec!["openid".to_string()],
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            client_id: "client-123".to_string(),
            tenant: "contoso".to_string(),
            is_b2c: false,
            policy: None,
            redirect_uri: "https://app.example/redirect".to_string(),
            post_logout_redirect_uri: None,
            cache_location: Default::default(),
            enable_logging: false,
            scope: ScopeSetting::Delimited("openid profile".to_string()),
            custom_parameters: None,
            prompt: Some(Prompt::SelectAccount),
            login_hint: None,
        }
    }

    fn session_with(
        mock: &Arc<MockIdentityClient>,
    ) -> (Arc<AuthSession>, Arc<MemoryHostStorage>) {
        let storage = Arc::new(MemoryHostStorage::new());
        let client = Arc::clone(mock);
        let factory = move |_settings: ClientSettings| -> SessionResult<Arc<dyn IdentityClient>> {
            Ok(Arc::clone(&client) as Arc<dyn IdentityClient>)
        };
        let session = AuthSession::new(
            &test_config(),
            &factory,
            Arc::clone(&storage) as Arc<dyn HostStorage>,
        )
        .unwrap();
        (Arc::new(session), storage)
    }

    #[tokio::test]
    async fn test_new_fails_fast_on_malformed_custom_parameters() {
        let mock = Arc::new(MockIdentityClient::new());
        let client = Arc::clone(&mock);
        let factory = move |_settings: ClientSettings| -> SessionResult<Arc<dyn IdentityClient>> {
            Ok(Arc::clone(&client) as Arc<dyn IdentityClient>)
        };
        let mut config = test_config();
        config.custom_parameters = Some("{broken".to_string());

        let err = AuthSession::new(
            &config,
            &factory,
            Arc::new(MemoryHostStorage::new()) as Arc<dyn HostStorage>,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[tokio::test]
    async fn test_redirect_result_short_circuits_silent_call() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_redirect_result(Ok(Some(auth_result("at-redirect", Some(user)))))
                .with_silent_result(Ok(auth_result("at-silent", None))),
        );
        let (session, _) = session_with(&mock);

        let token = session.access_token().await;

        assert_eq!(token.as_deref(), Some("at-redirect"));
        assert_eq!(mock.silent_calls(), 0);
    }

    #[tokio::test]
    async fn test_redirect_check_runs_once_across_operations() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, _) = session_with(&mock);

        let _ = session.token().await;
        let _ = session.token().await;

        assert_eq!(mock.redirect_completions(), 1);
    }

    #[tokio::test]
    async fn test_login_with_silent_session_skips_interactive() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_accounts(vec![user.clone()])
                .with_silent_result(Ok(auth_result("at-1", Some(user)))),
        );
        let (session, _) = session_with(&mock);

        let outcome = session.login(false, LoginFlow::Popup).await.unwrap();

        match outcome {
            LoginOutcome::Authenticated(payload) => assert!(payload.contains("at-1")),
            other => panic!("Expected Authenticated, got {:?}", other),
        }
        assert_eq!(mock.popup_calls(), 0);
        assert_eq!(mock.redirect_login_calls(), 0);
    }

    #[tokio::test]
    async fn test_silent_call_forces_prompt_none() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_accounts(vec![user.clone()])
                .with_silent_result(Ok(auth_result("at-1", Some(user.clone())))),
        );
        let (session, _) = session_with(&mock);

        let _ = session.access_token().await;

        let requests = mock.silent_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, Prompt::None);
        assert_eq!(requests[0].account, user);
        assert_eq!(requests[0].scopes, vec!["openid", "profile"]);
    }

    #[tokio::test]
    async fn test_login_falls_back_to_popup() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new().with_popup_result(Ok(auth_result("at-pop", Some(user)))),
        );
        let (session, _) = session_with(&mock);

        let outcome = session.login(false, LoginFlow::Popup).await.unwrap();

        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
        assert_eq!(mock.popup_calls(), 1);
        // The adopted result now answers account lookups without the
        // provider cache.
        assert!(session.has_cached_account_information().await);
    }

    #[tokio::test]
    async fn test_login_popup_failure_is_reported() {
        let mock = Arc::new(MockIdentityClient::new().with_popup_result(Err(
            SessionError::Interactive("user closed the window".to_string()),
        )));
        let (session, _) = session_with(&mock);

        let err = session.login(false, LoginFlow::Popup).await.unwrap_err();

        assert!(matches!(err, SessionError::Interactive(_)));
    }

    #[tokio::test]
    async fn test_login_redirect_flow_starts_redirect() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, _) = session_with(&mock);

        let outcome = session.login(false, LoginFlow::Redirect).await.unwrap();

        assert_eq!(outcome, LoginOutcome::RedirectStarted);
        assert_eq!(mock.redirect_login_calls(), 1);
        assert_eq!(mock.popup_calls(), 0);
    }

    #[tokio::test]
    async fn test_access_token_none_without_session() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, _) = session_with(&mock);

        assert_eq!(session.access_token().await, None);
        assert_eq!(session.id_token().await, None);
        assert_eq!(session.token().await, None);
    }

    #[tokio::test]
    async fn test_silent_provider_error_is_swallowed() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_accounts(vec![user])
                .with_silent_result(Err(SessionError::Provider("refresh expired".to_string()))),
        );
        let (session, _) = session_with(&mock);

        assert_eq!(session.token().await, None);
        assert_eq!(mock.silent_calls(), 1);
    }

    #[tokio::test]
    async fn test_multiple_accounts_picks_first_in_provider_order() {
        let first = account("first");
        let second = account("second");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_accounts(vec![first.clone(), second])
                .with_silent_result(Ok(auth_result("at-1", Some(first.clone())))),
        );
        let (session, _) = session_with(&mock);

        let _ = session.access_token().await;

        assert_eq!(mock.silent_requests()[0].account, first);
    }

    #[tokio::test]
    async fn test_has_cached_account_information_false_when_empty() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, _) = session_with(&mock);

        assert!(!session.has_cached_account_information().await);
    }

    #[tokio::test]
    async fn test_refresh_reports_redirect_failure() {
        let mock = Arc::new(MockIdentityClient::new().with_redirect_result(Err(
            SessionError::Provider("interaction required".to_string()),
        )));
        let (session, _) = session_with(&mock);

        let err = session.refresh().await.unwrap_err();

        assert!(matches!(err, SessionError::RedirectHandling(_)));
    }

    #[tokio::test]
    async fn test_refresh_adopts_redirect_result() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_redirect_result(Ok(Some(auth_result("at-redirect", Some(user))))),
        );
        let (session, _) = session_with(&mock);

        let payload = session.refresh().await.unwrap();

        assert!(payload.contains("at-redirect"));
    }

    #[tokio::test]
    async fn test_refresh_without_any_session_is_no_session() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, _) = session_with(&mock);

        let err = session.refresh().await.unwrap_err();

        assert_eq!(err, SessionError::NoSession);
    }

    #[tokio::test]
    async fn test_refresh_returns_current_result_when_silent_fails() {
        // A result adopted by an earlier interactive login still satisfies
        // refresh even when the provider refuses a new silent acquisition.
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_popup_result(Ok(auth_result("at-pop", Some(user))))
                .with_silent_result(Err(SessionError::Provider("refresh expired".to_string()))),
        );
        let (session, _) = session_with(&mock);

        session.login(false, LoginFlow::Popup).await.unwrap();
        let payload = session.refresh().await.unwrap();

        assert!(payload.contains("at-pop"));
    }

    #[tokio::test]
    async fn test_logout_without_account_skips_provider_logout() {
        let mock = Arc::new(MockIdentityClient::new());
        let (session, storage) = session_with(&mock);
        storage.store_persistent_value("key", "value");

        session.logout(LogoutFlow::Popup).await.unwrap();

        assert_eq!(mock.logout_popup_calls(), 0);
        assert_eq!(mock.redirect_logout_calls(), 0);
        assert_eq!(mock.clear_cache_calls(), 1);
        assert!(storage.persistent_is_empty());
    }

    #[tokio::test]
    async fn test_logout_with_account_clears_session_state() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new().with_popup_result(Ok(auth_result("at-pop", Some(user)))),
        );
        let (session, storage) = session_with(&mock);
        storage.store_session_value("key", "value");

        session.login(false, LoginFlow::Popup).await.unwrap();
        session.logout(LogoutFlow::Popup).await.unwrap();

        assert_eq!(mock.logout_popup_calls(), 1);
        assert!(storage.session_is_empty());
        assert_eq!(mock.clear_cache_calls(), 1);
        assert!(!session.has_cached_account_information().await);
    }

    #[tokio::test]
    async fn test_logout_redirect_suppresses_navigation() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new().with_popup_result(Ok(auth_result("at-pop", Some(user)))),
        );
        let (session, _) = session_with(&mock);

        session.login(false, LoginFlow::Popup).await.unwrap();
        session.logout(LogoutFlow::Redirect).await.unwrap();

        assert_eq!(mock.suppressed_navigations(), vec![true]);
    }

    #[tokio::test]
    async fn test_logout_provider_failure_leaves_local_state() {
        let user = account("uid");
        let mock = Arc::new(
            MockIdentityClient::new()
                .with_popup_result(Ok(auth_result("at-pop", Some(user))))
                .with_logout_result(Err(SessionError::Provider("network".to_string()))),
        );
        let (session, storage) = session_with(&mock);
        storage.store_persistent_value("key", "value");

        session.login(false, LoginFlow::Popup).await.unwrap();
        let err = session.logout(LogoutFlow::Popup).await.unwrap_err();

        assert!(matches!(err, SessionError::Logout(_)));
        assert!(!storage.persistent_is_empty());
        assert_eq!(mock.clear_cache_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_login_is_rejected() {
        let mock = Arc::new(MockIdentityClient::new().with_popup_never_resolving());
        let (session, _) = session_with(&mock);

        let in_flight = Arc::clone(&session);
        let handle = tokio::spawn(async move { in_flight.login(false, LoginFlow::Popup).await });

        // Let the first login reach the popup and hold the guard.
        while mock.popup_calls() == 0 {
            tokio::task::yield_now().await;
        }

        let err = session.login(false, LoginFlow::Popup).await.unwrap_err();
        assert_eq!(err, SessionError::AcquisitionInFlight);

        handle.abort();
    }
}
