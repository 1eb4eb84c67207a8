//! Redirect-completion gate
//!
//! A redirect-based interactive flow finishes on a later page load, so the
//! first thing an adapter does after construction is ask the provider
//! whether the current process is the return leg of one. That check must
//! run once, but every acquisition path has to await it before trusting
//! cached-account state.

use entra_types::{AuthResult, SessionResult};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::IdentityClient;

/// Memoized handle to the one-shot redirect-completion check.
///
/// Created at adapter construction; the underlying provider call runs at
/// most once and every waiter observes the same settled value, including a
/// settled failure.
pub(crate) struct RedirectGate {
    client: Arc<dyn IdentityClient>,
    outcome: OnceCell<SessionResult<Option<AuthResult>>>,
}

impl RedirectGate {
    /// Create the gate and kick the provider check off eagerly.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(client: Arc<dyn IdentityClient>) -> Arc<Self> {
        let gate = Arc::new(Self {
            client,
            outcome: OnceCell::new(),
        });

        let eager = Arc::clone(&gate);
        tokio::spawn(async move {
            let _ = eager.wait().await;
        });

        gate
    }

    /// Await the redirect outcome.
    ///
    /// Safe to call any number of times; calls after settlement return the
    /// memoized value immediately.
    pub(crate) async fn wait(&self) -> SessionResult<Option<AuthResult>> {
        self.outcome
            .get_or_init(|| async {
                let result = self.client.complete_redirect().await;
                match &result {
                    Ok(Some(_)) => debug!("Redirect completion produced an authentication result"),
                    Ok(None) => debug!("No pending redirect to complete"),
                    Err(e) => debug!("Redirect completion failed: {}", e),
                }
                result
            })
            .await
            .clone()
    }
}
