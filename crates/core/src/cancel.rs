//! Cancellation and per-call context for store operations.
//!
//! Every store call takes a [`CallScope`]. The scope carries a [`CancelToken`] and the
//! credentials of the caller. When the token is cancelled before or during a call, the call
//! resolves to [`StoreError::Cancelled`] and its result is never applied; a view that goes
//! away while a request is in flight cancels its scope instead of racing the response.

use crate::auth::AuthUser;
use crate::store::{StoreError, StoreResult};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation flag. All clones observe the same state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Cancels the token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // The sender lives as long as any clone of this token, so this is unreachable
                // while `self` is alive.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Context passed into every store call.
#[derive(Clone, Debug, Default)]
pub struct CallScope {
    cancel: CancelToken,
    id_token: Option<String>,
    owner: Option<String>,
}

impl CallScope {
    /// A scope with no credentials and a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope acting on behalf of `user`.
    pub fn for_user(user: &AuthUser) -> Self {
        Self {
            cancel: CancelToken::new(),
            id_token: Some(user.id_token().to_string()),
            owner: Some(user.uid.clone()),
        }
    }

    /// Replaces the cancellation token, e.g. with one wired to Ctrl-C.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bearer credential forwarded to the hosted store, if any.
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Uid of the caller, used to key duplicate-submission guards.
    pub fn owner(&self) -> &str {
        self.owner.as_deref().unwrap_or("anonymous")
    }

    /// Runs `fut` unless the scope is, or becomes, cancelled.
    ///
    /// Cancellation wins ties: an already-cancelled scope never polls `fut`.
    pub async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            result = fut => result,
        }
    }
}
