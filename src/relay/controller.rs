//! Relay safety state machine.
//!
//! # States
//! - OFF: line at the de-energized level, no timers pending
//! - ON: line energized, safety and max-on timers armed (when configured)
//!
//! # State Transitions
//! ```text
//! OFF → ON:  user command (guarded) or forced init
//! ON  → OFF: user command (guarded), safety timeout, max on-time,
//!            emergency stop, shutdown (all forced)
//! ```
//!
//! # Design Decisions
//! - All mutation happens under one mutex; timer tasks take the same lock
//! - Pin write happens before any state change, so a failed write leaves
//!   the recorded state untouched
//! - Every ON edge bumps an epoch; a timer only acts on the epoch it was
//!   armed for, so a stale timer can never cut a later session short

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RelayConfig;
use crate::observability::metrics;
use crate::relay::pin::{PinError, PinLevel, RelayPin};
use crate::relay::stats::{unix_now, RelayStatistics, StatsStore};

/// Minimum spacing between unforced transitions.
pub const MIN_TRANSITION_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before a timer retries a failed forced-OFF write.
const TIMER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Error from a transition request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay switched less than {:?} ago", MIN_TRANSITION_INTERVAL)]
    TooFrequent,
    #[error("relay hardware write failed: {0}")]
    HardwareWriteFailure(#[from] PinError),
}

/// What asked for a transition. Used for logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Init,
    User,
    SafetyTimeout,
    MaxOnTime,
    EmergencyStop,
    SelfTest,
    Shutdown,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Init => "init",
            Trigger::User => "user",
            Trigger::SafetyTimeout => "safety_timeout",
            Trigger::MaxOnTime => "max_on_time",
            Trigger::EmergencyStop => "emergency_stop",
            Trigger::SelfTest => "self_test",
            Trigger::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Safety,
    MaxOn,
}

impl TimerKind {
    fn trigger(self) -> Trigger {
        match self {
            TimerKind::Safety => Trigger::SafetyTimeout,
            TimerKind::MaxOn => Trigger::MaxOnTime,
        }
    }
}

/// Logical relay state. The single source of truth for line polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayState {
    pub is_on: bool,
    pub active_low_polarity: bool,
    pub last_transition_at: Option<Instant>,
    pub session_start_at: Option<Instant>,
    pub safety_deadline: Option<Instant>,
    pub max_on_deadline: Option<Instant>,
}

/// Status document served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub state: bool,
    pub pin: u32,
    pub active_low: bool,
    pub current_session_duration: f64,
    pub total_runtime: f64,
    pub total_cycles: u64,
    pub power_on_count: u64,
    /// Unix seconds of the last transition, 0 if none.
    pub last_state_change: f64,
    pub safety_timer_active: bool,
    pub max_on_timer_active: bool,
}

/// Statistics plus figures derived from the running session.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    #[serde(flatten)]
    pub stats: RelayStatistics,
    pub current_session_duration: f64,
    pub total_runtime_including_current: f64,
    pub average_session_duration: f64,
}

/// Timeouts applied on every ON edge, in seconds (0 disables).
#[derive(Debug, Clone, Copy)]
pub struct SafetySettings {
    pub safety_timeout: u64,
    pub max_on_time: u64,
}

impl From<&RelayConfig> for SafetySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            safety_timeout: config.safety_timeout,
            max_on_time: config.max_on_time,
        }
    }
}

struct Inner {
    pin: Box<dyn RelayPin>,
    relay: RelayState,
    stats: RelayStatistics,
    last_transition_wall: f64,
    epoch: u64,
    timers: Vec<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<Inner>,
    settings: SafetySettings,
    store: StatsStore,
    pin_number: u32,
}

/// Owns the relay line, its safety timers and usage statistics.
///
/// Cloning yields another handle to the same relay.
#[derive(Clone)]
pub struct RelaySafetyController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RelaySafetyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySafetyController")
            .field("pin", &self.shared.pin_number)
            .field("settings", &self.shared.settings)
            .finish()
    }
}

impl RelaySafetyController {
    /// Build the controller, load persisted statistics and force the
    /// configured initial state onto the line.
    ///
    /// Must be called within a Tokio runtime, since an initial ON arms timers.
    pub fn new(
        config: &RelayConfig,
        pin: Box<dyn RelayPin>,
        store: StatsStore,
    ) -> Result<Self, RelayError> {
        let pin_number = pin.number();
        let stats = store.load_or_default();
        let controller = Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    pin,
                    relay: RelayState {
                        is_on: false,
                        active_low_polarity: config.active_low,
                        last_transition_at: None,
                        session_start_at: None,
                        safety_deadline: None,
                        max_on_deadline: None,
                    },
                    stats,
                    last_transition_wall: 0.0,
                    epoch: 0,
                    timers: Vec::new(),
                }),
                settings: SafetySettings::from(config),
                store,
                pin_number,
            }),
        };

        controller.request_transition(config.initial_state, true, Trigger::Init)?;
        tracing::info!(
            pin = pin_number,
            active_low = config.active_low,
            initial_state = if config.initial_state { "ON" } else { "OFF" },
            "Relay initialized"
        );
        Ok(controller)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-transition cannot leave a torn state: the line is
        // written before any field changes. Keep serving.
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive the relay to `target`.
    ///
    /// Unforced requests are refused with [`RelayError::TooFrequent`] within
    /// [`MIN_TRANSITION_INTERVAL`] of the previous transition. Returns the
    /// resulting state.
    pub fn request_transition(
        &self,
        target: bool,
        force: bool,
        trigger: Trigger,
    ) -> Result<bool, RelayError> {
        let mut inner = self.lock();
        self.transition_locked(&mut inner, target, force, trigger)
    }

    fn transition_locked(
        &self,
        inner: &mut Inner,
        target: bool,
        force: bool,
        trigger: Trigger,
    ) -> Result<bool, RelayError> {
        let now = Instant::now();

        if !force {
            if let Some(last) = inner.relay.last_transition_at {
                if now.duration_since(last) < MIN_TRANSITION_INTERVAL {
                    tracing::warn!(trigger = trigger.as_str(), "Relay switching too rapidly, ignoring command");
                    return Err(RelayError::TooFrequent);
                }
            }
        }

        let level = PinLevel::for_state(target, inner.relay.active_low_polarity);
        if let Err(e) = inner.pin.write(level) {
            tracing::error!(
                error = %e,
                trigger = trigger.as_str(),
                target = if target { "ON" } else { "OFF" },
                "Failed to set relay state"
            );
            return Err(RelayError::HardwareWriteFailure(e));
        }

        let was_on = inner.relay.is_on;
        inner.relay.is_on = target;
        inner.relay.last_transition_at = Some(now);
        inner.last_transition_wall = unix_now();

        match (was_on, target) {
            (false, true) => self.on_edge(inner, now),
            (true, false) => self.off_edge(inner, now),
            _ => {}
        }

        metrics::record_relay_transition(trigger.as_str(), target);
        tracing::info!(
            trigger = trigger.as_str(),
            forced = force,
            "Relay turned {}",
            if target { "ON" } else { "OFF" }
        );
        Ok(target)
    }

    fn on_edge(&self, inner: &mut Inner, now: Instant) {
        inner.relay.session_start_at = Some(now);
        inner.stats.power_on_count += 1;
        inner.stats.last_on_at = inner.last_transition_wall;
        inner.epoch += 1;
        self.arm_timers(inner, now);
    }

    fn off_edge(&self, inner: &mut Inner, now: Instant) {
        let duration = inner
            .relay
            .session_start_at
            .take()
            .map(|start| now.duration_since(start).as_secs_f64())
            .unwrap_or_default();
        inner.stats.total_runtime_seconds += duration;
        inner.stats.total_cycles += 1;
        inner.stats.last_off_at = inner.last_transition_wall;
        Self::clear_timers(inner);

        tracing::info!(session_secs = duration, "Relay session ended");
        self.shared.store.save_best_effort(&inner.stats);
    }

    fn arm_timers(&self, inner: &mut Inner, now: Instant) {
        Self::clear_timers(inner);
        let settings = self.shared.settings;

        if settings.safety_timeout > 0 {
            let deadline = now + Duration::from_secs(settings.safety_timeout);
            inner.relay.safety_deadline = Some(deadline);
            inner
                .timers
                .push(self.spawn_timer(TimerKind::Safety, inner.epoch, deadline));
            tracing::debug!(secs = settings.safety_timeout, "Safety timer started");
        }
        if settings.max_on_time > 0 {
            let deadline = now + Duration::from_secs(settings.max_on_time);
            inner.relay.max_on_deadline = Some(deadline);
            inner
                .timers
                .push(self.spawn_timer(TimerKind::MaxOn, inner.epoch, deadline));
            tracing::debug!(secs = settings.max_on_time, "Maximum on-time timer started");
        }
    }

    fn clear_timers(inner: &mut Inner) {
        for handle in inner.timers.drain(..) {
            handle.abort();
        }
        inner.relay.safety_deadline = None;
        inner.relay.max_on_deadline = None;
    }

    fn spawn_timer(&self, kind: TimerKind, epoch: u64, deadline: Instant) -> JoinHandle<()> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                RelaySafetyController { shared }.fire_timer(kind, epoch);
            }
        })
    }

    /// Timer expiry for the session identified by `epoch`.
    fn fire_timer(&self, kind: TimerKind, epoch: u64) {
        let mut inner = self.lock();
        if !inner.relay.is_on || inner.epoch != epoch {
            tracing::debug!(timer = kind.trigger().as_str(), "Stale relay timer ignored");
            return;
        }

        tracing::warn!(
            timer = kind.trigger().as_str(),
            "Relay timer expired, automatically turning OFF relay"
        );
        if self
            .transition_locked(&mut inner, false, true, kind.trigger())
            .is_err()
        {
            // Still ON; try again rather than leave the load energized.
            let retry_at = Instant::now() + TIMER_RETRY_DELAY;
            let handle = self.spawn_timer(kind, epoch, retry_at);
            inner.timers.push(handle);
        }
    }

    /// Safety timeout expiry: forced OFF.
    pub fn on_safety_timeout(&self) -> Result<bool, RelayError> {
        tracing::warn!("Safety timeout triggered");
        self.request_transition(false, true, Trigger::SafetyTimeout)
    }

    /// Maximum on-time expiry: forced OFF.
    pub fn on_max_on_time(&self) -> Result<bool, RelayError> {
        tracing::warn!("Maximum on-time reached");
        self.request_transition(false, true, Trigger::MaxOnTime)
    }

    /// Force the relay OFF regardless of the rapid-switch guard.
    ///
    /// An already-OFF relay has its line driven again, but the guard clock
    /// is left alone so the next user command is not refused.
    pub fn emergency_stop(&self) -> Result<bool, RelayError> {
        tracing::warn!("EMERGENCY STOP - forcing relay OFF");
        let mut inner = self.lock();
        if inner.relay.is_on {
            return self.transition_locked(&mut inner, false, true, Trigger::EmergencyStop);
        }

        let level = PinLevel::for_state(false, inner.relay.active_low_polarity);
        inner.pin.write(level).map_err(|e| {
            tracing::error!(error = %e, "Failed to reassert relay OFF");
            RelayError::HardwareWriteFailure(e)
        })?;
        Self::clear_timers(&mut inner);
        Ok(false)
    }

    /// Exercise the hardware: forced ON, hold for `hold`, forced OFF.
    ///
    /// Counts as a normal session in the statistics.
    pub async fn self_test(&self, hold: Duration) -> Result<(), RelayError> {
        tracing::info!(hold_secs = hold.as_secs_f64(), "Testing relay operation");
        self.request_transition(true, true, Trigger::SelfTest)?;
        tokio::time::sleep(hold).await;
        self.request_transition(false, true, Trigger::SelfTest)?;
        tracing::info!("Relay test completed successfully");
        Ok(())
    }

    /// Flip the relay, subject to the rapid-switch guard.
    pub fn toggle(&self) -> Result<bool, RelayError> {
        let mut inner = self.lock();
        let target = !inner.relay.is_on;
        self.transition_locked(&mut inner, target, false, Trigger::User)
    }

    pub fn is_on(&self) -> bool {
        self.lock().relay.is_on
    }

    /// Snapshot of the logical state.
    pub fn relay_state(&self) -> RelayState {
        self.lock().relay.clone()
    }

    pub fn statistics(&self) -> RelayStatistics {
        self.lock().stats.clone()
    }

    pub fn pin_number(&self) -> u32 {
        self.shared.pin_number
    }

    pub fn status(&self) -> RelayStatus {
        let inner = self.lock();
        let current = current_session(&inner.relay);
        RelayStatus {
            state: inner.relay.is_on,
            pin: self.shared.pin_number,
            active_low: inner.relay.active_low_polarity,
            current_session_duration: current,
            total_runtime: inner.stats.total_runtime_seconds,
            total_cycles: inner.stats.total_cycles,
            power_on_count: inner.stats.power_on_count,
            last_state_change: inner.last_transition_wall,
            safety_timer_active: inner.relay.safety_deadline.is_some(),
            max_on_timer_active: inner.relay.max_on_deadline.is_some(),
        }
    }

    pub fn statistics_report(&self) -> StatisticsReport {
        let inner = self.lock();
        let current = current_session(&inner.relay);
        StatisticsReport {
            current_session_duration: current,
            total_runtime_including_current: inner.stats.total_runtime_seconds + current,
            average_session_duration: inner.stats.average_session_duration(),
            stats: inner.stats.clone(),
        }
    }

    /// Zero all counters and persist.
    pub fn reset_statistics(&self) {
        let mut inner = self.lock();
        inner.stats = RelayStatistics::default();
        self.shared.store.save_best_effort(&inner.stats);
        tracing::info!("Relay statistics reset");
    }

    /// Turn the relay off if needed, stop timers and save statistics.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.relay.is_on {
            if let Err(e) = self.transition_locked(&mut inner, false, true, Trigger::Shutdown) {
                tracing::error!(error = %e, "Relay cleanup could not turn the relay off");
            }
        }
        Self::clear_timers(&mut inner);
        self.shared.store.save_best_effort(&inner.stats);
        tracing::info!("Relay controller cleanup completed");
    }
}

fn current_session(relay: &RelayState) -> f64 {
    match (relay.is_on, relay.session_start_at) {
        (true, Some(start)) => Instant::now().duration_since(start).as_secs_f64(),
        _ => 0.0,
    }
}
