//! Request-scoped values passed explicitly through every call chain.

use std::sync::Arc;

use tokio::sync::watch;

use crate::identity::Claims;

/// Address of a collaborating service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service: &'static str,
    pub uri: String,
}

impl ServiceEndpoint {
    pub fn new(service: &'static str, uri: impl Into<String>) -> Self {
        Self {
            service,
            uri: uri.into(),
        }
    }
}

/// Handles for the profile, partition and notification services.
///
/// Handlers that need richer identity resolution can reach them through the
/// context; the record write path does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collaborators {
    pub profile: ServiceEndpoint,
    pub partition: ServiceEndpoint,
    pub notification: ServiceEndpoint,
}

/// Cancels the [`Cancellation`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancels on drop, so a request abandoned mid-flight is observed as cancelled.
#[derive(Debug)]
pub struct CancelOnDrop(pub CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn pair() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, Cancellation { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    claims: Option<Claims>,
    collaborators: Option<Arc<Collaborators>>,
    cancellation: Cancellation,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

impl RequestContext {
    /// Anonymous, never-cancelled context.
    pub fn background() -> Self {
        Self {
            claims: None,
            collaborators: None,
            cancellation: Cancellation::never(),
        }
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn with_optional_claims(mut self, claims: Option<Claims>) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_collaborators(mut self, collaborators: Arc<Collaborators>) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Attaches a fresh cancellation signal and returns its handle.
    pub fn cancellable(self) -> (Self, CancelHandle) {
        let (handle, cancellation) = Cancellation::pair();
        (self.with_cancellation(cancellation), handle)
    }

    /// Same identity and handles, but no longer tied to the caller's lifetime.
    pub fn detached(&self) -> Self {
        Self {
            claims: self.claims.clone(),
            collaborators: self.collaborators.clone(),
            cancellation: Cancellation::never(),
        }
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn collaborators(&self) -> Option<&Collaborators> {
        self.collaborators.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}
