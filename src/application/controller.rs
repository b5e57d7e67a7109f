use super::timer::CountdownTimer;
use crate::config::CheckoutConfig;
use crate::domain::ports::{CheckoutEventsRef, OrderServiceRef, PaymentGatewayRef};
use crate::domain::session::{Amount, GatewayReference, OrderId, OrderSession, SessionStatus};
use crate::error::{CheckoutError, Result};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Outcome of a single status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The probe reported paid and this probe won the settlement race.
    Paid,
    /// The gateway still reports the payment as outstanding.
    Pending,
    /// The session settled before this probe could act; a late paid
    /// response is discarded rather than resurrecting the session.
    AlreadySettled(SessionStatus),
}

/// Why a session is being given up on. All give-up paths funnel through
/// the same settlement check-and-set regardless of reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The payment window ran out.
    Expired,
    /// The owning view was torn down while the session was still live.
    Abandoned,
    /// The customer explicitly backed out.
    Dismissed,
}

impl CancelReason {
    fn terminal_status(self) -> SessionStatus {
        match self {
            Self::Expired => SessionStatus::Expired,
            Self::Abandoned | Self::Dismissed => SessionStatus::Cancelled,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Expired => "expired",
            Self::Abandoned => "abandoned",
            Self::Dismissed => "dismissed",
        };
        f.write_str(s)
    }
}

/// Single source of truth for one checkout attempt's progress.
///
/// Owns the session and its countdown, drives creation, polling, expiry and
/// disposal, and is the only component that calls
/// [`OrderService::cancel_order`](crate::domain::ports::OrderService).
///
/// Three independent triggers can finish a session: a status probe coming
/// back paid, the countdown reaching zero, and disposal of the owning view.
/// All three go through [`OrderSession::settle`] under the state lock, so
/// whichever executes first wins unconditionally and the rest are no-ops.
/// The winner alone fires the matching terminal callback and, on the
/// give-up paths, the single `cancel_order` call.
#[derive(Clone)]
pub struct CheckoutController {
    inner: Arc<Inner>,
}

struct Inner {
    config: CheckoutConfig,
    gateway: PaymentGatewayRef,
    orders: OrderServiceRef,
    events: CheckoutEventsRef,
    state: Mutex<ControllerState>,
}

#[derive(Default)]
struct ControllerState {
    session: Option<OrderSession>,
    remaining_secs: u64,
    disposed: bool,
    timer: Option<CountdownTimer>,
    auto_poll: Option<AbortHandle>,
    close_signal: Option<AbortHandle>,
}

impl ControllerState {
    fn stop_tasks(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        if let Some(task) = self.auto_poll.take() {
            task.abort();
        }
        if let Some(task) = self.close_signal.take() {
            task.abort();
        }
    }

    /// True while a session would be clobbered by starting another one.
    fn session_in_progress(&self) -> bool {
        self.session.as_ref().is_some_and(|s| {
            !s.settled
                && matches!(
                    s.status,
                    SessionStatus::Created | SessionStatus::AwaitingPayment
                )
        })
    }
}

impl CheckoutController {
    pub fn new(
        config: CheckoutConfig,
        gateway: PaymentGatewayRef,
        orders: OrderServiceRef,
        events: CheckoutEventsRef,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                orders,
                events,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Requests a payment reservation and, on success, starts the payment
    /// window. Returns the gateway reference for display.
    ///
    /// A failed creation leaves the session `Failed` and never arms the
    /// timer; the caller retries by calling `start` again, which builds a
    /// fresh session rather than reusing the failed one.
    pub async fn start(
        &self,
        order: OrderId,
        amount: Amount,
        description: &str,
    ) -> Result<GatewayReference> {
        {
            let mut st = self.inner.state();
            if st.disposed {
                return Err(CheckoutError::Disposed);
            }
            if st.session_in_progress() {
                return Err(CheckoutError::SessionActive);
            }
            // Any finished predecessor gets its timer and tasks torn down
            // before the replacement exists; two timers are never live.
            st.stop_tasks();
            st.session = Some(OrderSession::new(
                order.clone(),
                amount,
                description,
                self.inner.config.window_secs,
            ));
            st.remaining_secs = self.inner.config.window_secs;
        }

        match self
            .inner
            .gateway
            .create_order(&order, amount, description)
            .await
        {
            Ok(reference) => {
                let mut st = self.inner.state();
                if st.disposed {
                    // The view went away while the reservation was in
                    // flight. It was never displayed, so the gateway window
                    // lapses on its own and no cancel call goes out.
                    if let Some(session) = st.session.as_mut() {
                        session.await_payment(reference);
                        session.settle(SessionStatus::Cancelled);
                    }
                    return Err(CheckoutError::Disposed);
                }
                if let Some(session) = st.session.as_mut() {
                    session.await_payment(reference.clone());
                }
                st.timer = Some(Arc::clone(&self.inner).spawn_timer(self.inner.config.window_secs));
                if let Some(every) = self.inner.config.auto_poll_interval() {
                    st.auto_poll = Some(Arc::clone(&self.inner).spawn_auto_poll(every));
                }
                debug!(order = %order, "reservation created, awaiting payment");
                Ok(reference)
            }
            Err(err) => {
                {
                    let mut st = self.inner.state();
                    if let Some(session) = st.session.as_mut() {
                        session.fail_creation();
                    }
                }
                warn!(order = %order, error = %err, "payment reservation failed");
                self.inner.events.on_failed();
                Err(err.into())
            }
        }
    }

    /// Re-adopts a persisted `AwaitingPayment` session, seeding the
    /// countdown once from the supplied remaining value. The remaining
    /// value is owned by the controller from here on and never re-derived.
    pub fn resume(&self, session: OrderSession, remaining_secs: u64) -> Result<GatewayReference> {
        let mut st = self.inner.state();
        if st.disposed {
            return Err(CheckoutError::Disposed);
        }
        if st.session_in_progress() {
            return Err(CheckoutError::SessionActive);
        }
        if !session.is_awaiting_payment() {
            return Err(CheckoutError::InvalidResume(format!(
                "session is {}, not awaiting payment",
                session.status
            )));
        }
        let Some(reference) = session.gateway.clone() else {
            return Err(CheckoutError::InvalidResume(
                "session has no gateway reference".to_string(),
            ));
        };
        st.stop_tasks();
        st.remaining_secs = remaining_secs;
        st.session = Some(session);
        st.timer = Some(Arc::clone(&self.inner).spawn_timer(remaining_secs));
        if let Some(every) = self.inner.config.auto_poll_interval() {
            st.auto_poll = Some(Arc::clone(&self.inner).spawn_auto_poll(every));
        }
        Ok(reference)
    }

    /// Probes the gateway for the current payment state. Idempotent;
    /// callable any number of times while awaiting payment.
    pub async fn poll_status(&self) -> Result<PollOutcome> {
        Arc::clone(&self.inner).poll_once().await
    }

    /// The single funnel for every give-up path. Only the caller that wins
    /// the settlement race proceeds to the order service; everyone else
    /// returns immediately having done nothing.
    pub async fn cancel(&self, reason: CancelReason) {
        Arc::clone(&self.inner).cancel_with(reason, true).await;
    }

    /// Tears the controller down when the owning view goes away.
    ///
    /// Synchronous and unconditional for timer teardown. A session still
    /// awaiting payment is treated as abandonment: it settles here, and the
    /// cancel call goes out fire-and-forget. Disposal never waits on the
    /// network.
    pub fn dispose(&self) {
        let order = {
            let mut st = self.inner.state();
            if st.disposed {
                return;
            }
            st.disposed = true;
            st.stop_tasks();
            st.session.as_mut().and_then(|session| {
                if session.settle(SessionStatus::Cancelled) {
                    Some(session.id.clone())
                } else {
                    None
                }
            })
        };
        let Some(order) = order else { return };
        debug!(order = %order, "session abandoned on disposal");
        self.inner.events.on_cancelled();
        // State is already terminal; the background call only talks to the
        // order service and mutates nothing if it outlives us.
        let orders = Arc::clone(&self.inner.orders);
        tokio::spawn(async move {
            if let Err(err) = orders.cancel_order(&order).await {
                warn!(order = %order, error = %err, "order cancellation failed");
            }
        });
    }

    /// Snapshot of the current session, if any.
    pub fn session(&self) -> Option<OrderSession> {
        self.inner.state().session.clone()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.inner.state().session.as_ref().map(|s| s.status)
    }

    /// Seconds left on the payment window, for display.
    pub fn remaining_secs(&self) -> u64 {
        self.inner.state().remaining_secs
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state().disposed
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        // No state is left half-written on a panic path, so a poisoned
        // lock is still coherent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_timer(self: Arc<Self>, secs: u64) -> CountdownTimer {
        let weak = Arc::downgrade(&self);
        CountdownTimer::arm(secs, move |remaining| {
            let weak = Weak::clone(&weak);
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.handle_tick(remaining).await,
                    None => ControlFlow::Break(()),
                }
            }
        })
    }

    fn spawn_auto_poll(self: Arc<Self>, every: Duration) -> AbortHandle {
        let weak = Arc::downgrade(&self);
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                match inner.poll_once().await {
                    Ok(PollOutcome::Pending) => {}
                    Ok(_) => break,
                    Err(CheckoutError::Poll(err)) => {
                        // Transient; the next cadence retries.
                        debug!(error = %err, "automatic status probe failed");
                    }
                    Err(_) => break,
                }
            }
        })
        .abort_handle()
    }

    /// One countdown step. A tick that arrives after settlement is a
    /// designed no-op, not an error: races against teardown are expected.
    async fn handle_tick(self: Arc<Self>, remaining: u64) -> ControlFlow<()> {
        {
            let mut st = self.state();
            let live = st.session.as_ref().is_some_and(|s| s.is_awaiting_payment());
            if st.disposed || !live {
                return ControlFlow::Break(());
            }
            st.remaining_secs = remaining;
            if remaining > 0 {
                return ControlFlow::Continue(());
            }
        }
        // Window exhausted. This runs on the timer task itself, which ends
        // right after this call returns, so the timer handle must stay put
        // instead of aborting the task out from under the cancel call.
        self.cancel_with(CancelReason::Expired, false).await;
        ControlFlow::Break(())
    }

    async fn poll_once(self: Arc<Self>) -> Result<PollOutcome> {
        let order = {
            let st = self.state();
            if st.disposed {
                return Err(CheckoutError::Disposed);
            }
            match st.session.as_ref() {
                Some(session) if session.is_awaiting_payment() => session.id.clone(),
                Some(session) if session.status.is_terminal() => {
                    return Ok(PollOutcome::AlreadySettled(session.status));
                }
                _ => return Err(CheckoutError::NoSession),
            }
        };

        let status = self.gateway.check_status(&order).await?;
        if !status.is_paid() {
            return Ok(PollOutcome::Pending);
        }
        Ok(self.settle_paid(&order))
    }

    /// Attempts the paid transition. Settlement is immediate; only the
    /// success and close callbacks are deferred so the view can render a
    /// success state before it goes away.
    fn settle_paid(self: Arc<Self>, order: &OrderId) -> PollOutcome {
        let mut st = self.state();
        let Some(session) = st.session.as_mut() else {
            return PollOutcome::AlreadySettled(SessionStatus::Cancelled);
        };
        if !session.settle(SessionStatus::Paid) {
            // Lost the race: the session is already expired or cancelled
            // and must not be resurrected by a late paid response.
            return PollOutcome::AlreadySettled(session.status);
        }
        debug!(order = %order, "payment confirmed");

        let weak = Arc::downgrade(&self);
        let delay = self.config.success_close_delay();
        let close_signal = tokio::spawn(async move {
            time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.events.on_success();
                inner.events.on_request_close();
            }
        })
        .abort_handle();
        st.close_signal = Some(close_signal);
        if let Some(timer) = st.timer.take() {
            timer.stop();
        }
        // May be our own task when the auto-poller won the race; abort
        // last, with nothing awaited afterwards.
        if let Some(task) = st.auto_poll.take() {
            task.abort();
        }
        PollOutcome::Paid
    }

    async fn cancel_with(self: Arc<Self>, reason: CancelReason, stop_timer: bool) {
        let order = {
            let mut st = self.state();
            let Some(session) = st.session.as_mut() else {
                return;
            };
            if !session.settle(reason.terminal_status()) {
                return;
            }
            let order = session.id.clone();
            if stop_timer && let Some(timer) = st.timer.take() {
                timer.stop();
            }
            if let Some(task) = st.auto_poll.take() {
                task.abort();
            }
            if let Some(task) = st.close_signal.take() {
                task.abort();
            }
            order
        };
        debug!(order = %order, %reason, "session cancelled");
        self.events.on_cancelled();
        if let Err(err) = self.orders.cancel_order(&order).await {
            // Best effort: the terminal outcome stands regardless, and
            // retrying on teardown would leak timers and handles.
            warn!(order = %order, error = %err, "order cancellation failed");
        }
    }
}
