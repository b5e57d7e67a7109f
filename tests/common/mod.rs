use payflow::application::controller::CheckoutController;
use payflow::config::CheckoutConfig;
use payflow::domain::session::{Amount, OrderId};
use payflow::infrastructure::in_memory::{InMemoryGateway, InMemoryOrderService, RecordingEvents};
use rust_decimal_macros::dec;
use std::sync::Arc;

pub struct Harness {
    pub controller: CheckoutController,
    pub gateway: InMemoryGateway,
    pub orders: InMemoryOrderService,
    pub events: RecordingEvents,
}

pub fn harness(config: CheckoutConfig) -> Harness {
    let gateway = InMemoryGateway::new();
    let orders = InMemoryOrderService::new();
    let events = RecordingEvents::new();
    let controller = CheckoutController::new(
        config,
        Arc::new(gateway.clone()),
        Arc::new(orders.clone()),
        Arc::new(events.clone()),
    );
    Harness {
        controller,
        gateway,
        orders,
        events,
    }
}

pub fn config_with_window(window_secs: u64) -> CheckoutConfig {
    CheckoutConfig {
        window_secs,
        ..CheckoutConfig::default()
    }
}

pub fn amount() -> Amount {
    Amount::new(dec!(100.0)).unwrap()
}

pub fn order(id: &str) -> OrderId {
    OrderId::from(id)
}
