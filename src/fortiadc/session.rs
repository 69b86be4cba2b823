//! Session Token Management
//!
//! Holds the bearer token shared by every request of one [`FadcClient`] and
//! serialises logins. Each login attempt (successful or not) bumps a generation
//! counter; a request that saw generation `g` fail with 401 only logs in again if
//! nobody else has moved past `g` in the meantime. N concurrent 401s therefore
//! collapse into a single login.
//!
//! [`FadcClient`]: crate::fortiadc::FadcClient

use crate::error::{ExporterError, Result};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Default)]
struct SessionState {
    token: Option<SecretString>,
    generation: u64,
    last_failure: Option<String>,
}

/// Token store shared by all in-flight requests of one client
#[derive(Default)]
pub struct SessionManager {
    state: RwLock<SessionState>,
    login_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token (if any) and the generation it belongs to
    pub async fn snapshot(&self) -> (Option<String>, u64) {
        let state = self.state.read().await;
        (
            state.token.as_ref().map(|t| t.expose_secret().to_string()),
            state.generation,
        )
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    /// Run `login` unconditionally and install its token
    pub async fn login<F, Fut>(&self, login: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SecretString>>,
    {
        let _guard = self.login_lock.lock().await;
        self.attempt(login).await
    }

    /// Re-authenticate after a request using generation `seen` was rejected.
    ///
    /// Returns without logging in when another request already refreshed the
    /// session since `seen`; in that case the outcome of that login is reused.
    pub async fn refresh<F, Fut>(&self, seen: u64, login: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SecretString>>,
    {
        let _guard = self.login_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != seen {
                debug!("Session already refreshed by a concurrent request");
                return match (&state.token, &state.last_failure) {
                    (Some(_), _) => Ok(()),
                    (None, reason) => Err(ExporterError::AuthenticationFailed(format!(
                        "re-authentication failed: {}",
                        reason.as_deref().unwrap_or("no token")
                    ))),
                };
            }
        }
        self.attempt(login).await
    }

    async fn attempt<F, Fut>(&self, login: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SecretString>>,
    {
        let outcome = login().await;
        let mut state = self.state.write().await;
        state.generation += 1;
        match outcome {
            Ok(token) => {
                state.token = Some(token);
                state.last_failure = None;
                Ok(())
            }
            Err(e) => {
                state.token = None;
                state.last_failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Forget the token
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_refreshes_log_in_once() {
        let session = Arc::new(SessionManager::new());
        let logins = Arc::new(AtomicUsize::new(0));
        let seen = session.generation().await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                let logins = logins.clone();
                tokio::spawn(async move {
                    session
                        .refresh(seen, || async move {
                            logins.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok::<_, ExporterError>(SecretString::from("fresh-token"))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
        assert_eq!(session.snapshot().await.0.as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn test_failed_refresh_is_shared_with_waiters() {
        let session = SessionManager::new();
        let seen = session.generation().await;

        let first = session
            .refresh(seen, || async {
                Err::<SecretString, _>(ExporterError::AuthenticationFailed("bad password".into()))
            })
            .await;
        assert!(first.is_err());

        // Same stale generation: must not log in again
        let logins = AtomicUsize::new(0);
        let second = session
            .refresh(seen, || async {
                logins.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ExporterError>(SecretString::from("late-token"))
            })
            .await;
        let message = second.unwrap_err().to_string();
        assert!(message.contains("bad password"));
        assert_eq!(logins.load(Ordering::SeqCst), 0);
        assert!(!session.is_authenticated().await);
    }
}
