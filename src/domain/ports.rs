use super::session::{Amount, GatewayReference, OrderId};
use crate::error::{CancellationError, CreationError, PollError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Payment state as reported by the gateway's status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Paid,
    Pending,
    /// Anything the gateway reports that we do not recognise; treated the
    /// same as pending.
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    pub fn is_paid(self) -> bool {
        self == Self::Paid
    }
}

/// External wallet/payment provider. Black box: the controller relies only
/// on this contract, never on the gateway's wire format.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Requests a time-boxed payment reservation for the order.
    async fn create_order(
        &self,
        order: &OrderId,
        amount: Amount,
        description: &str,
    ) -> Result<GatewayReference, CreationError>;

    /// Probes the current payment state of a previously created reservation.
    async fn check_status(&self, order: &OrderId) -> Result<GatewayPaymentStatus, PollError>;
}

/// Order-management service. The controller guarantees at most one
/// `cancel_order` call per session; the service need not be idempotent for
/// that contract to hold.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn cancel_order(&self, order: &OrderId) -> Result<(), CancellationError>;
}

/// Terminal callbacks consumed by the presentation layer.
///
/// Each is invoked at most once per session, consistent with the settlement
/// guarantee. Default bodies are empty so a view only implements what it
/// cares about.
pub trait CheckoutEvents: Send + Sync {
    fn on_success(&self) {}
    fn on_failed(&self) {}
    fn on_cancelled(&self) {}
    fn on_request_close(&self) {}
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type OrderServiceRef = Arc<dyn OrderService>;
pub type CheckoutEventsRef = Arc<dyn CheckoutEvents>;
