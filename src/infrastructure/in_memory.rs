use crate::domain::ports::{
    CheckoutEvents, GatewayPaymentStatus, OrderService, PaymentGateway,
};
use crate::domain::session::{Amount, GatewayReference, OrderId};
use crate::error::{CancellationError, CreationError, PollError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct GatewayState {
    paid: bool,
    creation_failure: Option<String>,
    poll_failure: bool,
    create_delay: Option<Duration>,
    create_calls: u32,
    status_calls: u32,
    next_txn: u32,
}

/// Scriptable in-memory wallet gateway.
///
/// Issues reservations with synthetic transaction ids and a JSON payment
/// payload, and reports whatever payment state it has been told to. Drives
/// both the demo binary and the test suite.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent reservation attempt fail with the message.
    pub fn fail_creation(&self, message: impl Into<String>) {
        lock(&self.state).creation_failure = Some(message.into());
    }

    pub fn restore_creation(&self) {
        lock(&self.state).creation_failure = None;
    }

    /// Marks the outstanding reservation as paid; the next probe sees it.
    pub fn set_paid(&self, paid: bool) {
        lock(&self.state).paid = paid;
    }

    /// Makes status probes fail in transit until switched back off.
    pub fn set_poll_failure(&self, failing: bool) {
        lock(&self.state).poll_failure = failing;
    }

    /// Delays reservation creation, for exercising disposal mid-creation.
    pub fn set_create_delay(&self, delay: Duration) {
        lock(&self.state).create_delay = Some(delay);
    }

    pub fn create_calls(&self) -> u32 {
        lock(&self.state).create_calls
    }

    pub fn status_calls(&self) -> u32 {
        lock(&self.state).status_calls
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_order(
        &self,
        order: &OrderId,
        amount: Amount,
        description: &str,
    ) -> Result<GatewayReference, CreationError> {
        let (delay, failure, txn) = {
            let mut st = lock(&self.state);
            st.create_calls += 1;
            st.next_txn += 1;
            (st.create_delay, st.creation_failure.clone(), st.next_txn)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(CreationError::Rejected(message));
        }
        let payload = json!({
            "order": order.as_str(),
            "amount": amount.to_string(),
            "description": description,
        });
        Ok(GatewayReference {
            payment_reference: payload.to_string(),
            transaction_id: format!("txn-{txn}"),
        })
    }

    async fn check_status(&self, _order: &OrderId) -> Result<GatewayPaymentStatus, PollError> {
        let mut st = lock(&self.state);
        st.status_calls += 1;
        if st.poll_failure {
            return Err(PollError("connection reset".to_string()));
        }
        Ok(if st.paid {
            GatewayPaymentStatus::Paid
        } else {
            GatewayPaymentStatus::Pending
        })
    }
}

#[derive(Default)]
struct OrderServiceState {
    cancelled: Vec<OrderId>,
    failing: bool,
}

/// In-memory order service that records every cancel call.
#[derive(Clone, Default)]
pub struct InMemoryOrderService {
    state: Arc<Mutex<OrderServiceState>>,
}

impl InMemoryOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn cancel_calls(&self) -> usize {
        lock(&self.state).cancelled.len()
    }

    pub fn cancelled_orders(&self) -> Vec<OrderId> {
        lock(&self.state).cancelled.clone()
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn cancel_order(&self, order: &OrderId) -> Result<(), CancellationError> {
        let mut st = lock(&self.state);
        st.cancelled.push(order.clone());
        if st.failing {
            return Err(CancellationError("order service unavailable".to_string()));
        }
        Ok(())
    }
}

/// A terminal callback fired by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    Success,
    Failed,
    Cancelled,
    RequestClose,
}

/// Records callback invocations in order, for asserting the at-most-once
/// contract.
#[derive(Clone, Default)]
pub struct RecordingEvents {
    log: Arc<Mutex<Vec<CheckoutEvent>>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<CheckoutEvent> {
        lock(&self.log).clone()
    }

    pub fn count(&self, event: CheckoutEvent) -> usize {
        lock(&self.log).iter().filter(|e| **e == event).count()
    }
}

impl CheckoutEvents for RecordingEvents {
    fn on_success(&self) {
        lock(&self.log).push(CheckoutEvent::Success);
    }

    fn on_failed(&self) {
        lock(&self.log).push(CheckoutEvent::Failed);
    }

    fn on_cancelled(&self) {
        lock(&self.log).push(CheckoutEvent::Cancelled);
    }

    fn on_request_close(&self) {
        lock(&self.log).push(CheckoutEvent::RequestClose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount() -> Amount {
        Amount::new(dec!(42.0)).unwrap()
    }

    #[tokio::test]
    async fn test_gateway_issues_distinct_transaction_ids() {
        let gateway = InMemoryGateway::new();
        let a = gateway
            .create_order(&OrderId::from("o-1"), amount(), "first")
            .await
            .unwrap();
        let b = gateway
            .create_order(&OrderId::from("o-2"), amount(), "second")
            .await
            .unwrap();
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(gateway.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_gateway_reports_paid_after_set_paid() {
        let gateway = InMemoryGateway::new();
        let order = OrderId::from("o-1");
        assert_eq!(
            gateway.check_status(&order).await.unwrap(),
            GatewayPaymentStatus::Pending
        );
        gateway.set_paid(true);
        assert_eq!(
            gateway.check_status(&order).await.unwrap(),
            GatewayPaymentStatus::Paid
        );
        assert_eq!(gateway.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_gateway_scripted_failures() {
        let gateway = InMemoryGateway::new();
        gateway.fail_creation("insufficient merchant balance");
        let err = gateway
            .create_order(&OrderId::from("o-1"), amount(), "kibble")
            .await
            .unwrap_err();
        assert!(matches!(err, CreationError::Rejected(_)));

        gateway.set_poll_failure(true);
        let err = gateway.check_status(&OrderId::from("o-1")).await.unwrap_err();
        assert_eq!(err, PollError("connection reset".to_string()));
    }

    #[tokio::test]
    async fn test_order_service_records_cancellations() {
        let orders = InMemoryOrderService::new();
        orders.cancel_order(&OrderId::from("o-1")).await.unwrap();
        assert_eq!(orders.cancel_calls(), 1);
        assert_eq!(orders.cancelled_orders(), vec![OrderId::from("o-1")]);

        orders.set_failing(true);
        assert!(orders.cancel_order(&OrderId::from("o-2")).await.is_err());
        // A failed call still counts as an attempt.
        assert_eq!(orders.cancel_calls(), 2);
    }

    #[test]
    fn test_recording_events_preserves_order() {
        let events = RecordingEvents::new();
        events.on_success();
        events.on_request_close();
        assert_eq!(
            events.log(),
            vec![CheckoutEvent::Success, CheckoutEvent::RequestClose]
        );
        assert_eq!(events.count(CheckoutEvent::Success), 1);
        assert_eq!(events.count(CheckoutEvent::Cancelled), 0);
    }
}
