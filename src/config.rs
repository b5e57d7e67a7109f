use serde::Deserialize;
use std::time::Duration;

/// Tuning knobs for a checkout flow.
///
/// Deserializable so a host application can load it from its own
/// configuration file; every field has a sensible default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// Payment deadline: seconds the customer has to pay after creation.
    pub window_secs: u64,
    /// Cosmetic delay between a winning paid settlement and the success /
    /// close callbacks, so the view can render a success state first.
    pub success_close_delay_ms: u64,
    /// If set, the controller probes the gateway on this cadence in
    /// addition to any manual polls.
    pub auto_poll_interval_secs: Option<u64>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            success_close_delay_ms: 1800,
            auto_poll_interval_secs: None,
        }
    }
}

impl CheckoutConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn success_close_delay(&self) -> Duration {
        Duration::from_millis(self.success_close_delay_ms)
    }

    pub fn auto_poll_interval(&self) -> Option<Duration> {
        self.auto_poll_interval_secs.map(Duration::from_secs)
    }
}
