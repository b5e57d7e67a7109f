use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::controller::CheckoutController;
use payflow::config::CheckoutConfig;
use payflow::domain::ports::CheckoutEvents;
use payflow::domain::session::{Amount, OrderId, SessionStatus};
use payflow::infrastructure::in_memory::{InMemoryGateway, InMemoryOrderService};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drives one simulated checkout against the in-memory gateway: creates a
/// reservation, prints the scannable reference, then waits for the payment,
/// the window, or the simulated customer to decide the outcome.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Order identifier to pay for
    order: String,

    /// Payment amount
    #[arg(long, default_value = "100.00")]
    amount: Decimal,

    /// Description passed to the gateway with the reservation
    #[arg(long, default_value = "demo checkout")]
    description: String,

    /// Payment window in seconds
    #[arg(long, default_value_t = 30)]
    window: u64,

    /// Seconds until the simulated customer pays; omit to let the window expire
    #[arg(long)]
    pay_after: Option<u64>,

    /// Automatic gateway probe cadence in seconds
    #[arg(long, default_value_t = 2)]
    poll_every: u64,
}

/// Stand-in for the presentation view: logs terminal callbacks and tells
/// the main loop when the checkout should close.
#[derive(Default)]
struct DemoView {
    closed: Notify,
}

impl CheckoutEvents for DemoView {
    fn on_success(&self) {
        info!("payment confirmed, thank you");
    }

    fn on_failed(&self) {
        warn!("reservation failed");
        self.closed.notify_one();
    }

    fn on_cancelled(&self) {
        info!("checkout cancelled");
        self.closed.notify_one();
    }

    fn on_request_close(&self) {
        self.closed.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let amount = Amount::new(cli.amount).into_diagnostic()?;

    let gateway = InMemoryGateway::new();
    let orders = InMemoryOrderService::new();
    let view = Arc::new(DemoView::default());
    let config = CheckoutConfig {
        window_secs: cli.window,
        auto_poll_interval_secs: Some(cli.poll_every),
        ..CheckoutConfig::default()
    };
    let controller = CheckoutController::new(
        config,
        Arc::new(gateway.clone()),
        Arc::new(orders.clone()),
        view.clone(),
    );

    if let Some(secs) = cli.pay_after {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("simulated customer scanned and paid");
            gateway.set_paid(true);
        });
    }

    let reference = controller
        .start(OrderId::new(cli.order), amount, &cli.description)
        .await
        .into_diagnostic()?;
    info!(txn = %reference.transaction_id, "scan to pay: {}", reference.payment_reference);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = view.closed.notified() => break,
            _ = ticker.tick() => match controller.status() {
                Some(SessionStatus::AwaitingPayment) => {
                    info!("{}s remaining", controller.remaining_secs());
                }
                // Paid settles before the close signal arrives; keep the
                // view open until it does.
                Some(SessionStatus::Paid) => {}
                _ => break,
            },
        }
    }

    let final_status = controller.status();
    controller.dispose();
    match final_status {
        Some(status) => info!(%status, cancel_calls = orders.cancel_calls(), "checkout finished"),
        None => warn!("checkout never produced a session"),
    }
    Ok(())
}
