//! Background worker context.
//!
//! The worker lives independently of the foreground view. It keeps its own
//! reminder tick and its own last-reminder marker, owns the worker-hosted
//! notification path, and only talks to the view through messages. It never
//! holds the application state; when no view is around it reads the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use med_core::{
    dispatch::WorkerRoute,
    error::ChannelError,
    messages::{ClientMessage, WorkerMessage},
    notifications::{NotificationAction, NotificationRequest, ReminderSummary},
    reminder::{MarkerScope, ReminderGate, ReminderTime, TickOutcome},
    reset,
    store::keys,
    task::PeriodicTask,
    AppState, HostEnv,
};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub tick_period: Duration,
    /// Share the last-reminder marker with the foreground view.
    pub shared_marker: bool,
    pub default_reminder_time: ReminderTime,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            shared_marker: false,
            default_reminder_time: ReminderTime::default(),
        }
    }
}

/// The foreground view currently attached to the worker, if any.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    client: Arc<RwLock<Option<mpsc::UnboundedSender<ClientMessage>>>>,
}

impl ClientRegistry {
    pub fn register(&self, client: mpsc::UnboundedSender<ClientMessage>) {
        *self.client.write() = Some(client);
        debug!("foreground view registered");
    }

    /// Detaches `client` if it is still the registered view.
    pub fn unregister(&self, client: &mpsc::UnboundedSender<ClientMessage>) {
        let mut current = self.client.write();
        if current
            .as_ref()
            .is_some_and(|registered| registered.same_channel(client))
        {
            *current = None;
            debug!("foreground view unregistered");
        }
    }

    /// The attached view, unless its receiving end is gone.
    pub fn active(&self) -> Option<mpsc::UnboundedSender<ClientMessage>> {
        self.client
            .read()
            .as_ref()
            .filter(|client| !client.is_closed())
            .cloned()
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }
}

/// Result of the user clicking a worker-shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An attached view should be brought to the front.
    FocusView,
    /// No view is attached; the application should be opened.
    OpenApp,
    Closed,
}

enum Inbox {
    Message(WorkerMessage),
    Click {
        tag: String,
        action: Option<NotificationAction>,
        reply: oneshot::Sender<ClickOutcome>,
    },
}

/// Cloneable sending side of the worker's inbox.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    inbox: mpsc::UnboundedSender<Inbox>,
    clients: ClientRegistry,
}

impl WorkerHandle {
    pub fn post(&self, message: WorkerMessage) -> Result<(), ChannelError> {
        debug!(tag = message.tag(), "posting to worker");
        self.inbox
            .send(Inbox::Message(message))
            .map_err(|_| ChannelError::WorkerGone)
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Delivers a notification click to the worker and waits for its decision.
    pub async fn notification_clicked(
        &self,
        tag: &str,
        action: Option<NotificationAction>,
    ) -> Result<ClickOutcome, ChannelError> {
        let (reply, outcome) = oneshot::channel();
        self.inbox
            .send(Inbox::Click {
                tag: tag.to_string(),
                action,
                reply,
            })
            .map_err(|_| ChannelError::WorkerGone)?;
        outcome.await.map_err(|_| ChannelError::WorkerGone)
    }
}

impl WorkerRoute for WorkerHandle {
    fn schedule_reminder(&self, reminder_time: ReminderTime) -> Result<(), ChannelError> {
        self.post(WorkerMessage::ScheduleReminder { reminder_time })
    }

    fn test_notification(&self) -> Result<(), ChannelError> {
        self.post(WorkerMessage::TestNotification)
    }

    fn send_reminder(&self, summary: ReminderSummary) -> Result<(), ChannelError> {
        self.post(WorkerMessage::SendReminder(summary))
    }
}

/// State reachable from the worker's tick loop.
struct WorkerCore {
    env: HostEnv,
    clients: ClientRegistry,
    gate: ReminderGate,
    default_reminder_time: ReminderTime,
    reminder_time: Mutex<ReminderTime>,
}

impl WorkerCore {
    fn tick(&self) -> TickOutcome {
        let now = self.env.clock.now();
        let reminder_time = *self.reminder_time.lock();
        let outcome = self
            .gate
            .evaluate(&*self.env.store, now, reminder_time, || {
                self.remind(now.date())
            });
        if outcome == TickOutcome::Fired {
            info!(%reminder_time, "worker reminder fired");
        }
        outcome
    }

    /// Prefers the live state of an attached view; otherwise falls back to the
    /// stored state and a reminder without medication names.
    fn remind(&self, today: NaiveDate) {
        if let Some(client) = self.clients.active() {
            if client.send(ClientMessage::CheckReminderNow).is_ok() {
                info!("asked foreground view to check reminder");
                return;
            }
            warn!("foreground view went away, using stored state");
        }

        let store = &*self.env.store;
        let mut state = AppState::load(store, self.default_reminder_time);
        reset::discard_if_stale(store, &mut state.status, today);
        if state.summary().is_none() {
            info!("stored state shows nothing outstanding, no reminder");
            return;
        }
        self.show(NotificationRequest::generic_reminder());
    }

    fn show(&self, notification: NotificationRequest) -> bool {
        let permission = self.env.permission.get();
        if !permission.is_granted() {
            warn!(%permission, tag = %notification.tag, "cannot show notification");
            return false;
        }
        match self.env.sink.show(notification) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "notification delivery failed");
                false
            }
        }
    }

    fn click(&self, tag: &str, action: Option<NotificationAction>) -> ClickOutcome {
        self.env.sink.close(tag);
        match action {
            Some(NotificationAction::Dismiss) => ClickOutcome::Closed,
            Some(NotificationAction::View) | None => {
                if self.clients.is_active() {
                    ClickOutcome::FocusView
                } else {
                    ClickOutcome::OpenApp
                }
            }
        }
    }
}

pub struct BackgroundWorker {
    core: Arc<WorkerCore>,
    ticker: PeriodicTask,
    tick_period: Duration,
    inbox: mpsc::UnboundedReceiver<Inbox>,
}

impl BackgroundWorker {
    /// Starts the worker on the current tokio runtime.
    ///
    /// The reminder time is seeded from the store and later replaced by
    /// `SCHEDULE_REMINDER` messages. The worker stops once every
    /// [`WorkerHandle`] is dropped.
    pub fn spawn(config: WorkerConfig, env: HostEnv) -> (WorkerHandle, JoinHandle<()>) {
        let reminder_time = match env.store.get(keys::REMINDER_TIME) {
            Ok(Some(raw)) => raw.parse::<ReminderTime>().unwrap_or_else(|err| {
                warn!(%err, "ignoring stored reminder time, using default");
                config.default_reminder_time
            }),
            Ok(None) => config.default_reminder_time,
            Err(err) => {
                warn!(%err, "cannot read reminder time, using default");
                config.default_reminder_time
            }
        };
        let clients = ClientRegistry::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            core: Arc::new(WorkerCore {
                env,
                clients: clients.clone(),
                gate: ReminderGate::new(MarkerScope::Worker, config.shared_marker),
                default_reminder_time: config.default_reminder_time,
                reminder_time: Mutex::new(reminder_time),
            }),
            ticker: PeriodicTask::new("worker-reminder"),
            tick_period: config.tick_period,
            inbox: rx,
        };
        let join = tokio::spawn(worker.run());
        (WorkerHandle { inbox: tx, clients }, join)
    }

    async fn run(mut self) {
        let reminder_time = *self.core.reminder_time.lock();
        info!(%reminder_time, "background worker started");
        self.rearm();
        while let Some(item) = self.inbox.recv().await {
            match item {
                Inbox::Message(message) => self.handle_message(message),
                Inbox::Click { tag, action, reply } => {
                    let outcome = self.core.click(&tag, action);
                    debug!(?outcome, %tag, "notification click handled");
                    let _ = reply.send(outcome);
                }
            }
        }
        self.ticker.cancel();
        info!("background worker stopped");
    }

    #[instrument(skip(self), fields(tag = message.tag()))]
    fn handle_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::ScheduleReminder { reminder_time } => {
                *self.core.reminder_time.lock() = reminder_time;
                info!(%reminder_time, "reminder rescheduled");
                self.rearm();
            }
            WorkerMessage::TestNotification => {
                self.core.show(NotificationRequest::test());
            }
            WorkerMessage::SendReminder(summary) => {
                self.core.show(NotificationRequest::reminder(&summary));
            }
        }
    }

    /// Replaces the tick loop and evaluates once right away.
    fn rearm(&mut self) {
        let core = Arc::clone(&self.core);
        self.ticker.arm(self.tick_period, move || {
            core.tick();
        });
        self.core.tick();
    }
}
