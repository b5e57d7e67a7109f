use crate::error::CheckoutError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of the order being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A positive monetary amount.
///
/// Wraps `rust_decimal::Decimal` so a reservation can never be requested
/// for a zero or negative value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, CheckoutError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(CheckoutError::InvalidAmount(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = CheckoutError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payment payload handed back by the gateway after a successful
/// reservation: the scannable reference plus the gateway's own id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReference {
    pub payment_reference: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    AwaitingPayment,
    Paid,
    Cancelled,
    Expired,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Cancelled | Self::Expired | Self::Failed
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::AwaitingPayment => "awaiting-payment",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One checkout attempt's payment state.
///
/// `settled` flips false -> true exactly once, the instant any terminal
/// transition out of `AwaitingPayment` is committed. Every trigger racing
/// to finish the session goes through [`OrderSession::settle`]; whichever
/// runs first wins unconditionally and the rest become no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSession {
    pub id: OrderId,
    pub amount: Amount,
    pub description: String,
    pub gateway: Option<GatewayReference>,
    pub status: SessionStatus,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OrderSession {
    pub fn new(id: OrderId, amount: Amount, description: impl Into<String>, window_secs: u64) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            amount,
            description: description.into(),
            gateway: None,
            status: SessionStatus::Created,
            settled: false,
            created_at,
            expires_at: created_at + Duration::seconds(window_secs as i64),
        }
    }

    /// Records the gateway reservation and moves the session into
    /// `AwaitingPayment`. Only valid once, from `Created`.
    pub fn await_payment(&mut self, reference: GatewayReference) {
        debug_assert_eq!(self.status, SessionStatus::Created);
        self.gateway = Some(reference);
        self.status = SessionStatus::AwaitingPayment;
    }

    /// The atomic check-and-set all terminal triggers funnel through.
    ///
    /// Returns true only for the first caller on an unsettled
    /// `AwaitingPayment` session; every later caller gets false and must do
    /// nothing. Callers hold the session lock for the whole call, so the
    /// check and the set cannot interleave across triggers.
    pub fn settle(&mut self, terminal: SessionStatus) -> bool {
        debug_assert!(terminal.is_terminal());
        if self.settled || self.status != SessionStatus::AwaitingPayment {
            return false;
        }
        self.settled = true;
        self.status = terminal;
        true
    }

    /// Marks a session whose reservation never materialised. Does not touch
    /// `settled`: there is no live reservation to guard against.
    pub fn fail_creation(&mut self) {
        debug_assert_eq!(self.status, SessionStatus::Created);
        self.status = SessionStatus::Failed;
    }

    pub fn is_awaiting_payment(&self) -> bool {
        self.status == SessionStatus::AwaitingPayment && !self.settled
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.gateway.as_ref().map(|g| g.transaction_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn session() -> OrderSession {
        OrderSession::new(
            OrderId::from("order-1"),
            Amount::new(dec!(100.0)).unwrap(),
            "two bags of kibble",
            300,
        )
    }

    fn reference() -> GatewayReference {
        GatewayReference {
            payment_reference: "wallet://pay/abc".to_string(),
            transaction_id: "txn-1".to_string(),
        }
    }

    #[test]
    fn test_amount_rejects_non_positive() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(CheckoutError::InvalidAmount(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-5.0)),
            Err(CheckoutError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_transaction_id_present_iff_past_created() {
        let mut s = session();
        assert_eq!(s.status, SessionStatus::Created);
        assert!(s.transaction_id().is_none());

        s.await_payment(reference());
        assert_eq!(s.status, SessionStatus::AwaitingPayment);
        assert_eq!(s.transaction_id(), Some("txn-1"));
    }

    #[test]
    fn test_settle_wins_exactly_once() {
        let mut s = session();
        s.await_payment(reference());

        assert!(s.settle(SessionStatus::Paid));
        assert_eq!(s.status, SessionStatus::Paid);
        assert!(s.settled);

        // Every later trigger is a no-op, even a "better" outcome.
        assert!(!s.settle(SessionStatus::Expired));
        assert!(!s.settle(SessionStatus::Paid));
        assert_eq!(s.status, SessionStatus::Paid);
    }

    #[test]
    fn test_settle_refused_before_awaiting_payment() {
        let mut s = session();
        assert!(!s.settle(SessionStatus::Cancelled));
        assert_eq!(s.status, SessionStatus::Created);
        assert!(!s.settled);
    }

    #[test]
    fn test_failed_creation_leaves_settled_clear() {
        let mut s = session();
        s.fail_creation();
        assert_eq!(s.status, SessionStatus::Failed);
        assert!(!s.settled);
        assert!(s.transaction_id().is_none());
    }

    #[test]
    fn test_expiry_window_derived_from_creation() {
        let s = session();
        assert_eq!(s.expires_at - s.created_at, Duration::seconds(300));
    }

    #[test]
    fn test_session_round_trips_through_serde() {
        let mut s = session();
        s.await_payment(reference());
        let json = serde_json::to_string(&s).unwrap();
        let back: OrderSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
