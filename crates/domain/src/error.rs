//! Unified error types for the domain layer
//!
//! Validation and trade-protocol failures share one error type so the
//! engine can map them onto client-facing failure kinds in a single place.

use thiserror::Error;

use crate::trade::TradeState;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A trade is already being negotiated
    #[error("Trade already in progress ({0})")]
    TradeAlreadyInProgress(TradeState),

    /// The trade window is not open for this action
    #[error("Trade window not open ({0})")]
    TradeWindowNotOpen(TradeState),

    /// The host reported a trade event that contradicts the current session
    #[error("Trade protocol violation: {0}")]
    ProtocolViolation(String),
}

impl DomainError {
    /// Creates a validation error for rejected command parameters.
    ///
    /// # Example
    /// ```ignore
    /// if text.is_empty() {
    ///     return Err(DomainError::validation("Message cannot be empty"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("name cannot be empty");
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: name cannot be empty");
    }

    #[test]
    fn test_trade_errors_name_the_state() {
        let err = DomainError::TradeWindowNotOpen(TradeState::Requested);
        assert_eq!(err.to_string(), "Trade window not open (requested)");

        let err = DomainError::TradeAlreadyInProgress(TradeState::OfferPending);
        assert_eq!(err.to_string(), "Trade already in progress (offer_pending)");
    }
}
