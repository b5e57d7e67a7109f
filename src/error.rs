use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckoutError>;

/// The gateway could not issue a payment reservation.
///
/// Non-recoverable for the session: it never reaches `AwaitingPayment` and
/// the caller retries with a brand-new session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CreationError {
    #[error("payment gateway unreachable: {0}")]
    Unreachable(String),
    #[error("reservation rejected by gateway: {0}")]
    Rejected(String),
}

/// A status probe failed in transit. Recoverable; the session is unchanged
/// and the probe may simply be retried.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("status probe failed: {0}")]
pub struct PollError(pub String);

/// The order service refused or failed the cancel call. Cancellation is
/// best-effort: the session is terminal locally regardless.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("order cancellation failed: {0}")]
pub struct CancellationError(pub String);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckoutError {
    #[error(transparent)]
    Creation(#[from] CreationError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("no session is awaiting payment")]
    NoSession,
    #[error("a session is already in progress")]
    SessionActive,
    #[error("controller has been disposed")]
    Disposed,
    #[error("session cannot be resumed: {0}")]
    InvalidResume(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
