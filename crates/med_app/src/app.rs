use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use med_core::{
    clock::SystemClock,
    dispatch::DispatchOutcome,
    notifications::{
        NotificationAction, NotificationSink, Permission, PermissionHandle, APP_TITLE,
        REMINDER_TAG,
    },
    reminder::ReminderTime,
    HostEnv, JsonFileStore,
};
use med_worker::{BackgroundWorker, ClickOutcome, WorkerConfig, WorkerHandle};

use crate::foreground::{Foreground, ForegroundConfig};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store_path: PathBuf,
    pub tick_period: Duration,
    pub permission: Permission,
    pub worker_enabled: bool,
    pub shared_marker: bool,
    pub default_reminder_time: ReminderTime,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_vars(|key| std::env::var(key).ok()))
    }

    /// Builds the configuration from any variable source; unusable values
    /// keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = var("MED_STORE_PATH") {
            if !path.trim().is_empty() {
                config.store_path = PathBuf::from(path.trim());
            }
        }
        if let Some(secs) = var("MED_TICK_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(value) if value > 0 => config.tick_period = Duration::from_secs(value),
                _ => warn!(value = %secs, "ignoring MED_TICK_SECS"),
            }
        }
        if let Some(permission) = var("MED_NOTIFICATIONS") {
            match permission.parse::<Permission>() {
                Ok(value) => config.permission = value,
                Err(err) => warn!(%err, "ignoring MED_NOTIFICATIONS"),
            }
        }
        if let Some(worker) = var("MED_WORKER") {
            config.worker_enabled = !matches!(
                worker.trim().to_ascii_lowercase().as_str(),
                "off" | "0" | "false" | "no"
            );
        }
        if let Some(shared) = var("MED_SHARED_REMINDER_MARKER") {
            config.shared_marker = matches!(
                shared.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(time) = var("MED_DEFAULT_REMINDER_TIME") {
            match time.parse::<ReminderTime>() {
                Ok(value) => config.default_reminder_time = value,
                Err(err) => warn!(%err, "ignoring MED_DEFAULT_REMINDER_TIME"),
            }
        }
        config
    }

    pub fn foreground(&self) -> ForegroundConfig {
        ForegroundConfig {
            tick_period: self.tick_period,
            shared_marker: self.shared_marker,
            default_reminder_time: self.default_reminder_time,
        }
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            tick_period: self.tick_period,
            shared_marker: self.shared_marker,
            default_reminder_time: self.default_reminder_time,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./data/medications.json"),
            tick_period: med_worker::DEFAULT_TICK_PERIOD,
            permission: Permission::Default,
            worker_enabled: true,
            shared_marker: false,
            default_reminder_time: ReminderTime::default(),
        }
    }
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    /// 1-based position as shown by `status`.
    Delete(usize),
    Toggle(String),
    Reset,
    Time(ReminderTime),
    Test,
    Remind,
    Permission(Permission),
    Status,
    Close,
    Open,
    Click(Option<NotificationAction>),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "add" => Self::Add(rest.to_string()),
            "delete" | "del" => {
                let position: usize = rest
                    .parse()
                    .with_context(|| format!("`{rest}` is not a list position"))?;
                if position == 0 {
                    bail!("list positions start at 1");
                }
                Self::Delete(position)
            }
            "toggle" => {
                if rest.is_empty() {
                    bail!("toggle needs a medication name");
                }
                Self::Toggle(rest.to_string())
            }
            "reset" => Self::Reset,
            "time" => Self::Time(rest.parse::<ReminderTime>()?),
            "test" => Self::Test,
            "remind" => Self::Remind,
            "permission" => Self::Permission(
                rest.parse::<Permission>()
                    .map_err(anyhow::Error::msg)?,
            ),
            "status" | "" => Self::Status,
            "close" => Self::Close,
            "open" => Self::Open,
            "click" => Self::Click(match rest {
                "" | "none" => None,
                action => Some(action.parse::<NotificationAction>()?),
            }),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command `{other}`, try `help`"),
        };
        Ok(command)
    }
}

const HELP: &str = "\
add <name>            Medikament hinzufügen
delete <n>            Medikament an Position n löschen
toggle <name>         als eingenommen markieren oder Markierung entfernen
reset                 Tag zurücksetzen
time HH:MM            Erinnerungszeit speichern
test                  Test-Benachrichtigung senden
remind                Erinnerung jetzt prüfen
permission <answer>   Benachrichtigungen erlauben (granted) oder blockieren (denied)
status                Liste und Fortschritt anzeigen
close | open          Ansicht schließen oder öffnen
click [view|dismiss]  Klick auf die Erinnerung simulieren
quit                  beenden";

/// Both contexts of one running application.
pub struct Session {
    config: AppConfig,
    env: HostEnv,
    worker: Option<WorkerHandle>,
    worker_task: Option<JoinHandle<()>>,
    view: Option<Foreground>,
}

impl Session {
    /// Starts the worker (unless disabled) and opens the view.
    pub fn start(config: AppConfig, env: HostEnv) -> Self {
        let (worker, worker_task) = if config.worker_enabled {
            let (handle, task) = BackgroundWorker::spawn(config.worker(), env.clone());
            (Some(handle), Some(task))
        } else {
            (None, None)
        };
        let view = Foreground::activate(config.foreground(), env.clone(), worker.clone());
        Self {
            config,
            env,
            worker,
            worker_task,
            view: Some(view),
        }
    }

    pub fn view(&self) -> Option<&Foreground> {
        self.view.as_ref()
    }

    fn open_view(&mut self) -> Result<&mut Foreground> {
        self.view
            .as_mut()
            .context("the view is closed, use `open` first")
    }

    pub async fn execute(&mut self, command: Command) -> Result<ControlFlow<(), String>> {
        debug!(?command, "executing command");
        let reply = match command {
            Command::Add(name) => {
                let added = self.open_view()?.add_medication(&name)?;
                format!("„{added}“ hinzugefügt")
            }
            Command::Delete(position) => {
                let removed = self
                    .open_view()?
                    .delete_medication(position - 1)
                    .with_context(|| format!("no medication at position {position}"))?;
                format!("„{removed}“ gelöscht")
            }
            Command::Toggle(name) => {
                let taken = self
                    .open_view()?
                    .toggle(&name)
                    .with_context(|| format!("`{name}` is not in the list"))?;
                if taken {
                    format!("{name}: eingenommen")
                } else {
                    format!("{name}: nicht eingenommen")
                }
            }
            Command::Reset => {
                self.open_view()?.reset_day();
                "Tag zurückgesetzt".to_string()
            }
            Command::Time(reminder_time) => {
                self.open_view()?.save_settings(reminder_time);
                format!("Erinnerung um {reminder_time} gespeichert")
            }
            Command::Test => describe(self.open_view()?.test_notification()),
            Command::Remind => describe(self.open_view()?.check_reminder_now()),
            Command::Permission(answer) => {
                let permission = self.open_view()?.request_permission(answer);
                permission.status_line().to_string()
            }
            Command::Status => self.status(),
            Command::Close => match self.view.take() {
                Some(view) => {
                    view.deactivate();
                    "Ansicht geschlossen".to_string()
                }
                None => "Ansicht ist bereits geschlossen".to_string(),
            },
            Command::Open => {
                if self.view.is_some() {
                    "Ansicht ist bereits geöffnet".to_string()
                } else {
                    self.reopen();
                    self.status()
                }
            }
            Command::Click(action) => {
                let worker = self
                    .worker
                    .as_ref()
                    .context("no background worker is running")?;
                match worker.notification_clicked(REMINDER_TAG, action).await? {
                    ClickOutcome::FocusView => "Ansicht im Vordergrund".to_string(),
                    ClickOutcome::OpenApp => {
                        self.reopen();
                        self.status()
                    }
                    ClickOutcome::Closed => "Benachrichtigung geschlossen".to_string(),
                }
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(ControlFlow::Break(())),
        };
        Ok(ControlFlow::Continue(reply))
    }

    fn reopen(&mut self) {
        info!("reopening view");
        self.view = Some(Foreground::activate(
            self.config.foreground(),
            self.env.clone(),
            self.worker.clone(),
        ));
    }

    fn status(&self) -> String {
        let Some(view) = &self.view else {
            return "Ansicht ist geschlossen".to_string();
        };
        let state = view.state();
        let today = self.env.clock.today();
        let mut lines = vec![format!("{APP_TITLE}, {}", today.format("%d.%m.%Y"))];
        if state.medications.is_empty() {
            lines.push("Noch keine Medikamente. Mit `add <name>` hinzufügen.".to_string());
        }
        for (index, name) in state.medications.iter().enumerate() {
            let mark = if state.status.is_taken(name) { "x" } else { " " };
            lines.push(format!("[{mark}] {}. {name}", index + 1));
        }
        let progress = state.progress();
        lines.push(format!(
            "{} von {} eingenommen ({:.0}%)",
            progress.completed,
            progress.total,
            progress.percentage()
        ));
        lines.push(format!("Erinnerung: {}", state.reminder_time));
        lines.push(view.permission().status_line().to_string());
        lines.join("\n")
    }

    /// Closes the view, drops the worker handle and waits for the worker to stop.
    pub async fn shutdown(mut self) {
        if let Some(view) = self.view.take() {
            view.deactivate();
        }
        self.worker = None;
        if let Some(task) = self.worker_task.take() {
            if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
                warn!("background worker did not stop in time");
            }
        }
    }
}

fn describe(outcome: DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::NothingOutstanding => {
            "Alle Medikamente eingenommen, keine Erinnerung".to_string()
        }
        DispatchOutcome::PermissionNotGranted => {
            "Bitte aktivieren Sie zuerst die Benachrichtigungen.".to_string()
        }
        DispatchOutcome::RoutedToWorker(_) => {
            "Benachrichtigung an den Hintergrunddienst übergeben".to_string()
        }
        DispatchOutcome::ShownDirectly(_) => "Benachrichtigung angezeigt".to_string(),
        DispatchOutcome::Failed(err) => format!("Benachrichtigung fehlgeschlagen: {err}"),
    }
}

fn notification_sink() -> Arc<dyn NotificationSink> {
    #[cfg(feature = "desktop")]
    {
        Arc::new(crate::desktop::DesktopSink)
    }
    #[cfg(not(feature = "desktop"))]
    {
        Arc::new(med_core::notifications::LogSink)
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    info!(
        store = %config.store_path.display(),
        tick_secs = config.tick_period.as_secs(),
        permission = %config.permission,
        worker = config.worker_enabled,
        "starting medication reminder"
    );
    let env = HostEnv {
        store: Arc::new(JsonFileStore::new(&config.store_path)),
        clock: Arc::new(SystemClock),
        sink: notification_sink(),
        permission: PermissionHandle::new(config.permission),
    };
    let mut session = Session::start(config, env);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(format!("{}\n", session.status()).as_bytes())
        .await
        .context("failed to write to stdout")?;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let reply = match Command::parse(&line) {
            Ok(command) => match session.execute(command).await {
                Ok(ControlFlow::Continue(reply)) => reply,
                Ok(ControlFlow::Break(())) => break,
                Err(err) => format!("Fehler: {err:#}"),
            },
            Err(err) => format!("Fehler: {err:#}"),
        };
        stdout
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .context("failed to write to stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }

    session.shutdown().await;
    info!("medication reminder stopped");
    Ok(())
}
