//! Error types used inside the engine. None of them cross the public boundary:
//! routing errors degrade to a straight-line path and dispatch errors revert state.

use crate::fleet::{BusId, PassengerId};

/// Outcome of a single failed resolver attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("attempt timed out")]
    Timeout,
    #[error("resolver unavailable (status {status})")]
    Unavailable { status: u16 },
    #[error("resolver rejected request (status {status})")]
    Rejected { status: u16 },
    #[error("invalid resolver response: {0}")]
    InvalidResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("resolver found no route")]
    NoRoute,
}

impl RouteError {
    /// Whether another attempt may succeed. Definitive rejections and bad payloads are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RouteError::Timeout | RouteError::Unavailable { .. } | RouteError::Transport(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("resolved path is empty")]
    EmptyPath,
    #[error("path lookup aborted: {0}")]
    LookupAborted(String),
    #[error("unknown bus {0}")]
    UnknownBus(BusId),
    #[error("{0} is already being served")]
    PassengerAlreadyBound(PassengerId),
}
