//! Foreground view context.
//!
//! [`Foreground`] owns the [`AppState`] while the view is open. Every mutation
//! is written back to the store right away, and the view runs its own reminder
//! tick next to the worker's. When a worker is attached the view registers as
//! its client so the worker can ask for a reminder check with live state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use med_core::{
    dispatch::{DispatchOutcome, Dispatcher},
    error::ParseError,
    medication::Progress,
    messages::ClientMessage,
    notifications::Permission,
    reminder::{MarkerScope, ReminderGate, ReminderTime, TickOutcome},
    reset::{apply_daily_reset, ResetOutcome},
    task::PeriodicTask,
    AppState, HostEnv,
};
use med_worker::WorkerHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundConfig {
    pub tick_period: Duration,
    pub shared_marker: bool,
    pub default_reminder_time: ReminderTime,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            tick_period: med_worker::DEFAULT_TICK_PERIOD,
            shared_marker: false,
            default_reminder_time: ReminderTime::default(),
        }
    }
}

struct ViewCore {
    env: HostEnv,
    dispatcher: Dispatcher,
    gate: ReminderGate,
    default_reminder_time: ReminderTime,
    state: Mutex<AppState>,
}

impl ViewCore {
    fn tick(&self) -> TickOutcome {
        let now = self.env.clock.now();
        let reminder_time = self.state.lock().reminder_time;
        let outcome = self
            .gate
            .evaluate(&*self.env.store, now, reminder_time, || {
                self.check_and_send();
            });
        if outcome == TickOutcome::Fired {
            info!(%reminder_time, "foreground reminder fired");
        }
        outcome
    }

    /// Reloads the store, so edits from another context are picked up, and
    /// runs the dispatcher on the result.
    fn check_and_send(&self) -> DispatchOutcome {
        let store = &*self.env.store;
        let today = self.env.clock.today();
        let (medications, status) = {
            let mut state = self.state.lock();
            *state = AppState::load(store, self.default_reminder_time);
            apply_daily_reset(store, &mut state.status, today);
            (state.medications.clone(), state.status.clone())
        };
        self.dispatcher.dispatch_reminder(&medications, &status)
    }

    /// Locks the state for use, clearing yesterday's flags first when the
    /// view has stayed open past midnight.
    fn current(&self) -> MutexGuard<'_, AppState> {
        let mut state = self.state.lock();
        let today = self.env.clock.today();
        let reset = apply_daily_reset(&*self.env.store, &mut state.status, today);
        if reset == ResetOutcome::Cleared {
            debug!("daily status cleared while the view was open");
        }
        state
    }

    fn persist(&self, state: &AppState) {
        if let Err(err) = state.save(&*self.env.store) {
            warn!(%err, "cannot persist application state");
        }
    }
}

struct ClientLink {
    sender: mpsc::UnboundedSender<ClientMessage>,
    listener: JoinHandle<()>,
}

pub struct Foreground {
    core: Arc<ViewCore>,
    ticker: PeriodicTask,
    tick_period: Duration,
    worker: Option<WorkerHandle>,
    link: Option<ClientLink>,
}

impl Foreground {
    /// Loads the state, applies the daily reset, attaches to the worker and
    /// arms the reminder tick.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(config: ForegroundConfig, env: HostEnv, worker: Option<WorkerHandle>) -> Self {
        let today = env.clock.today();
        let (state, reset) = AppState::activate(&*env.store, config.default_reminder_time, today);
        if reset == ResetOutcome::Cleared {
            debug!("daily status cleared on activation");
        }

        let mut dispatcher = Dispatcher::new(env.permission.clone(), Arc::clone(&env.sink));
        if let Some(handle) = &worker {
            dispatcher = dispatcher.with_worker(Arc::new(handle.clone()));
        } else {
            warn!("no background worker, notifications are shown by the view");
        }

        let core = Arc::new(ViewCore {
            env,
            dispatcher,
            gate: ReminderGate::new(MarkerScope::Foreground, config.shared_marker),
            default_reminder_time: config.default_reminder_time,
            state: Mutex::new(state),
        });

        let link = worker.as_ref().map(|handle| {
            let (sender, receiver) = mpsc::unbounded_channel();
            handle.clients().register(sender.clone());
            ClientLink {
                sender,
                listener: tokio::spawn(listen(Arc::clone(&core), receiver)),
            }
        });

        let mut view = Self {
            core,
            ticker: PeriodicTask::new("foreground-reminder"),
            tick_period: config.tick_period,
            worker,
            link,
        };
        view.schedule_reminder();
        info!(
            medications = view.core.state.lock().medications.len(),
            worker = view.worker.is_some(),
            "foreground view activated"
        );
        view
    }

    pub fn state(&self) -> AppState {
        self.core.current().clone()
    }

    pub fn progress(&self) -> Progress {
        self.core.current().progress()
    }

    pub fn reminder_time(&self) -> ReminderTime {
        self.core.state.lock().reminder_time
    }

    pub fn permission(&self) -> Permission {
        self.core.env.permission.get()
    }

    pub fn worker(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref()
    }

    /// Adds a trimmed, non-empty name that is not in the list yet.
    pub fn add_medication(&self, name: &str) -> Result<String, ParseError> {
        let mut state = self.core.current();
        let added = state.medications.add(name)?.to_string();
        self.core.persist(&state);
        info!(medication = %added, "medication added");
        Ok(added)
    }

    /// Removes the medication at `index` along with its status entry.
    pub fn delete_medication(&self, index: usize) -> Option<String> {
        let mut state = self.core.current();
        let removed = state.medications.remove_at(index)?;
        state.status.forget(&removed);
        self.core.persist(&state);
        info!(medication = %removed, "medication deleted");
        Some(removed)
    }

    /// Flips the taken flag of a listed medication and returns the new value.
    pub fn toggle(&self, name: &str) -> Option<bool> {
        let mut state = self.core.current();
        if !state.medications.contains(name) {
            return None;
        }
        let taken = state.status.toggle(name);
        self.core.persist(&state);
        debug!(medication = name, taken, "medication toggled");
        Some(taken)
    }

    /// Clears every taken flag. The last-reset marker stays as it is.
    pub fn reset_day(&self) {
        let mut state = self.core.current();
        state.status.clear();
        self.core.persist(&state);
        info!("day reset by user");
    }

    /// Stores the new reminder time and re-arms both contexts.
    pub fn save_settings(&mut self, reminder_time: ReminderTime) {
        {
            let mut state = self.core.current();
            state.reminder_time = reminder_time;
            self.core.persist(&state);
        }
        info!(%reminder_time, "reminder time saved");
        self.schedule_reminder();
    }

    pub fn test_notification(&self) -> DispatchOutcome {
        self.core.dispatcher.dispatch_test()
    }

    /// Records the user's answer to the permission prompt. A grant is
    /// confirmed with the test notification.
    pub fn request_permission(&self, answer: Permission) -> Permission {
        let permission = self.core.env.permission.resolve(answer);
        info!(%permission, "notification permission resolved");
        if permission.is_granted() {
            self.core.dispatcher.dispatch_test();
        }
        permission
    }

    /// Runs the dispatcher right away, bypassing the time and marker checks.
    pub fn check_reminder_now(&self) -> DispatchOutcome {
        self.core.check_and_send()
    }

    /// Detaches from the worker and stops the tick.
    pub fn deactivate(mut self) {
        self.detach();
    }

    /// Tells the worker the current time, replaces the local tick loop and
    /// evaluates once immediately.
    fn schedule_reminder(&mut self) {
        let reminder_time = self.reminder_time();
        self.core.dispatcher.schedule_reminder(reminder_time);
        let core = Arc::clone(&self.core);
        self.ticker.arm(self.tick_period, move || {
            core.tick();
        });
        self.core.tick();
    }

    fn detach(&mut self) {
        self.ticker.cancel();
        if let Some(link) = self.link.take() {
            if let Some(worker) = &self.worker {
                worker.clients().unregister(&link.sender);
            }
            link.listener.abort();
            debug!("foreground view detached");
        }
    }
}

impl Drop for Foreground {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn listen(core: Arc<ViewCore>, mut receiver: mpsc::UnboundedReceiver<ClientMessage>) {
    while let Some(message) = receiver.recv().await {
        debug!(tag = message.tag(), "message from worker");
        match message {
            ClientMessage::CheckReminderNow => {
                let outcome = core.check_and_send();
                debug!(?outcome, "reminder check requested by worker");
            }
        }
    }
}
