//! Authorization guard for trade-mutating commands.

use std::sync::{Arc, PoisonError, RwLock};

use guardian_domain::{AuthorizationList, CommandKind, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Caller identity is required for {0}")]
    Unauthenticated(CommandKind),
    #[error("Caller is not authorized for {0}")]
    Forbidden(CommandKind),
}

impl GuardError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Unauthenticated(_) => FailureKind::Unauthenticated,
            Self::Forbidden(_) => FailureKind::Forbidden,
        }
    }
}

/// Decides whether a caller may run a command kind.
///
/// Deny by default: an empty list or a missing identity never passes for
/// {SendTradeRequest, OfferGp, AcceptTrade}. Other kinds are always allowed.
/// The list is swapped as a whole on reload, so concurrent checks see either
/// the old list or the new one.
#[derive(Debug, Default)]
pub struct AuthorizationGuard {
    list: RwLock<Arc<AuthorizationList>>,
}

impl AuthorizationGuard {
    pub fn new(list: AuthorizationList) -> Self {
        Self {
            list: RwLock::new(Arc::new(list)),
        }
    }

    pub fn authorize(&self, requester: Option<&str>, kind: CommandKind) -> Result<(), GuardError> {
        if !kind.requires_authorization() {
            return Ok(());
        }
        let requester = requester
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(GuardError::Unauthenticated(kind))?;

        if self.current().contains(requester) {
            Ok(())
        } else {
            Err(GuardError::Forbidden(kind))
        }
    }

    /// Replaces the allow-list atomically.
    pub fn replace(&self, list: AuthorizationList) {
        let size = list.len();
        *self.list.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(list);
        tracing::info!(authorized = size, "Authorization list replaced");
    }

    pub fn current(&self) -> Arc<AuthorizationList> {
        Arc::clone(&self.list.read().unwrap_or_else(PoisonError::into_inner))
    }
}
