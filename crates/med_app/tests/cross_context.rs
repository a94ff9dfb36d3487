use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use tokio::time::sleep;

use med_app::app::{AppConfig, Command, Session};
use med_core::{
    clock::{date_marker, ManualClock},
    dispatch::DispatchOutcome,
    notifications::{
        NotificationAction, NotificationRequest, Permission, PermissionHandle, RecordingSink,
        ReminderSummary, REMINDER_TAG, TEST_TAG,
    },
    store::keys,
    HostEnv, JsonFileStore, LocalStore, LocalStoreExt,
};

const TICK: Duration = Duration::from_secs(60);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    today().and_hms_opt(hour, minute, 0).unwrap()
}

async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

struct Harness {
    dir: TempDir,
    store: Arc<JsonFileStore>,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
    permission: PermissionHandle,
    session: Session,
}

impl Harness {
    async fn run(&mut self, line: &str) -> String {
        let command = Command::parse(line).unwrap();
        match self.session.execute(command).await.unwrap() {
            ControlFlow::Continue(reply) => reply,
            ControlFlow::Break(()) => panic!("`{line}` quit the session"),
        }
    }

    /// Moves the wall clock and lets one tick of both contexts play out.
    async fn tick_at(&self, now: NaiveDateTime) {
        self.clock.set(now);
        sleep(TICK).await;
        settle().await;
    }
}

fn seeded_store(dir: &TempDir) -> JsonFileStore {
    let store = JsonFileStore::new(dir.path().join("medications.json"));
    store
        .set_json(keys::MEDICATIONS, &["Aspirin", "Vitamin D"])
        .unwrap();
    store.set(keys::REMINDER_TIME, "08:00").unwrap();
    store.set(keys::LAST_RESET, &date_marker(today())).unwrap();
    let yesterday = date_marker(today().pred_opt().unwrap());
    store.set(keys::LAST_REMINDER_SENT, &yesterday).unwrap();
    store
}

async fn start_with(
    config: AppConfig,
    permission: Permission,
    now: NaiveDateTime,
    seed: impl FnOnce(&JsonFileStore),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(&dir);
    seed(&store);
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(now));
    let sink = Arc::new(RecordingSink::new());
    let permission = PermissionHandle::new(permission);
    let env = HostEnv {
        store: store.clone(),
        clock: clock.clone(),
        sink: sink.clone(),
        permission: permission.clone(),
    };
    let session = Session::start(config, env);
    settle().await;
    Harness {
        dir,
        store,
        clock,
        sink,
        permission,
        session,
    }
}

async fn start(shared_marker: bool) -> Harness {
    let config = AppConfig {
        shared_marker,
        ..AppConfig::default()
    };
    start_with(config, Permission::Granted, at(7, 59), |_| {}).await
}

fn full_summary() -> ReminderSummary {
    ReminderSummary {
        remaining: vec!["Aspirin".into(), "Vitamin D".into()],
        total: 2,
        completed: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn due_reminder_lists_every_outstanding_medication() {
    let h = start(true).await;
    assert!(h.sink.shown().is_empty());

    h.tick_at(at(8, 0)).await;
    assert_eq!(
        h.sink.shown(),
        vec![NotificationRequest::reminder(&full_summary())]
    );

    h.tick_at(at(8, 1)).await;
    h.tick_at(at(8, 0)).await;
    assert_eq!(h.sink.count_tagged(REMINDER_TAG), 1);
    assert_eq!(
        h.store.get(keys::LAST_REMINDER_SENT).unwrap(),
        Some(date_marker(today()))
    );
}

#[tokio::test(start_paused = true)]
async fn separate_markers_let_each_context_remind_once() {
    let h = start(false).await;

    h.tick_at(at(8, 0)).await;
    let shown = h.sink.shown();
    assert_eq!(shown.len(), 2);
    assert!(shown
        .iter()
        .all(|request| *request == NotificationRequest::reminder(&full_summary())));
    assert_eq!(
        h.store.get(keys::LAST_REMINDER_SENT).unwrap(),
        Some(date_marker(today()))
    );
    assert_eq!(
        h.store.get(keys::WORKER_LAST_REMINDER_SENT).unwrap(),
        Some(date_marker(today()))
    );

    h.tick_at(at(8, 0)).await;
    assert_eq!(h.sink.shown().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn everything_taken_means_no_reminder() {
    let mut h = start(true).await;
    h.run("toggle Aspirin").await;
    h.run("toggle Vitamin D").await;
    assert!(h.run("status").await.contains("2 von 2 eingenommen"));

    h.tick_at(at(8, 0)).await;
    assert!(h.sink.shown().is_empty());
    // The day still counts as handled.
    assert_eq!(
        h.store.get(keys::LAST_REMINDER_SENT).unwrap(),
        Some(date_marker(today()))
    );
}

#[tokio::test(start_paused = true)]
async fn empty_list_never_reminds() {
    let config = AppConfig {
        shared_marker: true,
        ..AppConfig::default()
    };
    let mut h = start_with(config, Permission::Granted, at(7, 59), |store| {
        store.set(keys::MEDICATIONS, "[]").unwrap();
    })
    .await;

    h.tick_at(at(8, 0)).await;
    assert_eq!(
        h.run("remind").await,
        "Alle Medikamente eingenommen, keine Erinnerung"
    );
    assert!(h.sink.shown().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rescheduling_moves_the_reminder_in_both_contexts() {
    let mut h = start(true).await;
    assert_eq!(
        h.run("time 09:15").await,
        "Erinnerung um 09:15 gespeichert"
    );
    assert_eq!(h.store.get(keys::REMINDER_TIME).unwrap().as_deref(), Some("09:15"));
    settle().await;

    h.tick_at(at(8, 0)).await;
    assert!(h.sink.shown().is_empty());

    h.tick_at(at(9, 15)).await;
    assert_eq!(h.sink.count_tagged(REMINDER_TAG), 1);

    h.tick_at(at(9, 15)).await;
    assert_eq!(h.sink.count_tagged(REMINDER_TAG), 1);
}

#[tokio::test(start_paused = true)]
async fn saving_on_the_reminder_minute_fires_immediately() {
    let mut h = start(true).await;
    h.clock.set(at(9, 30));
    h.run("time 09:30").await;
    settle().await;
    assert_eq!(h.sink.count_tagged(REMINDER_TAG), 1);
}

#[tokio::test(start_paused = true)]
async fn without_worker_the_view_notifies_directly() {
    let config = AppConfig {
        worker_enabled: false,
        ..AppConfig::default()
    };
    let mut h = start_with(config, Permission::Granted, at(7, 59), |_| {}).await;
    assert!(h.session.view().unwrap().worker().is_none());

    h.tick_at(at(8, 0)).await;
    assert_eq!(
        h.sink.shown(),
        vec![NotificationRequest::reminder(&full_summary())]
    );

    assert_eq!(h.run("test").await, "Benachrichtigung angezeigt");
    assert_eq!(h.sink.count_tagged(TEST_TAG), 1);
    let click = Command::Click(Some(NotificationAction::View));
    assert!(h.session.execute(click).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn closed_view_leaves_worker_with_generic_reminder() {
    let mut h = start(false).await;
    assert_eq!(h.run("close").await, "Ansicht geschlossen");
    settle().await;

    h.tick_at(at(8, 0)).await;
    assert_eq!(
        h.sink.shown(),
        vec![NotificationRequest::generic_reminder()]
    );
    assert_eq!(
        h.store.get(keys::WORKER_LAST_REMINDER_SENT).unwrap(),
        Some(date_marker(today()))
    );

    // Clicking the reminder opens the application again.
    let reply = h.run("click view").await;
    assert!(reply.contains("0 von 2 eingenommen"), "{reply}");
    assert!(h.session.view().is_some());
    assert_eq!(h.run("click").await, "Ansicht im Vordergrund");
    assert_eq!(h.run("click dismiss").await, "Benachrichtigung geschlossen");
}

#[tokio::test(start_paused = true)]
async fn view_left_open_past_midnight_keeps_todays_flags() {
    let config = AppConfig {
        worker_enabled: false,
        ..AppConfig::default()
    };
    let mut h = start_with(config, Permission::Granted, at(22, 0), |store| {
        store.set(keys::DAILY_STATUS, "{\"Vitamin D\":true}").unwrap();
    })
    .await;
    assert_eq!(h.session.view().unwrap().progress().completed, 1);

    let tomorrow = today().succ_opt().unwrap();
    h.clock.set(tomorrow.and_hms_opt(0, 30, 0).unwrap());
    assert_eq!(h.run("toggle Aspirin").await, "Aspirin: eingenommen");
    assert_eq!(
        h.store.get(keys::LAST_RESET).unwrap(),
        Some(date_marker(tomorrow))
    );

    h.clock.set(tomorrow.and_hms_opt(7, 0, 0).unwrap());
    let view = h.session.view().unwrap();
    assert_eq!(
        view.check_reminder_now(),
        DispatchOutcome::ShownDirectly(Some(ReminderSummary {
            remaining: vec!["Vitamin D".into()],
            total: 2,
            completed: 1,
        }))
    );
    assert_eq!(view.progress().completed, 1);
    assert_eq!(
        h.store.get(keys::DAILY_STATUS).unwrap().as_deref(),
        Some("{\"Aspirin\":true}")
    );
}

#[tokio::test(start_paused = true)]
async fn activation_resets_yesterdays_status_on_disk() {
    let h = start_with(AppConfig::default(), Permission::Granted, at(7, 0), |store| {
        store.set(keys::LAST_RESET, "2025-03-13").unwrap();
        store
            .set(keys::DAILY_STATUS, "{\"Aspirin\":true,\"Vitamin D\":true}")
            .unwrap();
    })
    .await;

    let view = h.session.view().unwrap();
    assert_eq!(view.progress().completed, 0);

    let reopened = JsonFileStore::new(h.dir.path().join("medications.json"));
    assert_eq!(
        reopened.get(keys::LAST_RESET).unwrap(),
        Some(date_marker(today()))
    );
    assert_eq!(reopened.get(keys::DAILY_STATUS).unwrap().as_deref(), Some("{}"));
}

#[tokio::test(start_paused = true)]
async fn reminder_check_reloads_edits_from_other_contexts() {
    let h = start(true).await;
    h.store
        .set(keys::DAILY_STATUS, "{\"Aspirin\":true,\"Vitamin D\":true}")
        .unwrap();

    let view = h.session.view().unwrap();
    assert_eq!(view.check_reminder_now(), DispatchOutcome::NothingOutstanding);
    assert_eq!(view.progress().completed, 2);

    h.store.set(keys::DAILY_STATUS, "{\"Aspirin\":true}").unwrap();
    let outcome = view.check_reminder_now();
    assert_eq!(
        outcome,
        DispatchOutcome::RoutedToWorker(Some(ReminderSummary {
            remaining: vec!["Vitamin D".into()],
            total: 2,
            completed: 1,
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn granting_permission_sends_test_notification() {
    let mut h = start_with(AppConfig::default(), Permission::Default, at(7, 0), |_| {}).await;
    assert_eq!(
        h.run("test").await,
        "Bitte aktivieren Sie zuerst die Benachrichtigungen."
    );

    let reply = h.run("permission granted").await;
    assert_eq!(reply, Permission::Granted.status_line());
    settle().await;
    assert_eq!(h.sink.count_tagged(TEST_TAG), 1);

    // A decided permission is not asked again.
    let reply = h.run("permission denied").await;
    assert_eq!(reply, Permission::Granted.status_line());
    assert_eq!(h.permission.get(), Permission::Granted);
}

#[tokio::test(start_paused = true)]
async fn list_editing_is_persisted() {
    let mut h = start(true).await;
    assert_eq!(h.run("add  Magnesium ").await, "„Magnesium“ hinzugefügt");
    assert!(h.session.execute(Command::Add("Aspirin".into())).await.is_err());
    assert!(h.session.execute(Command::Add("   ".into())).await.is_err());

    h.run("toggle Vitamin D").await;
    assert_eq!(h.run("delete 2").await, "„Vitamin D“ gelöscht");
    assert!(h.session.execute(Command::Delete(9)).await.is_err());

    let names: Vec<String> = h.store.get_json(keys::MEDICATIONS).unwrap().unwrap();
    assert_eq!(names, ["Aspirin", "Magnesium"]);
    assert_eq!(h.store.get(keys::DAILY_STATUS).unwrap().as_deref(), Some("{}"));

    h.run("toggle Aspirin").await;
    assert_eq!(h.run("reset").await, "Tag zurückgesetzt");
    let status = h.run("status").await;
    assert!(status.contains("[ ] 1. Aspirin"), "{status}");
    assert!(status.contains("0 von 2 eingenommen (0%)"), "{status}");
    assert_eq!(
        h.store.get(keys::LAST_RESET).unwrap(),
        Some(date_marker(today()))
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_worker() {
    let mut h = start(true).await;
    let command = Command::parse("quit").unwrap();
    assert_eq!(
        h.session.execute(command).await.unwrap(),
        ControlFlow::Break(())
    );
    let Harness { session, sink, .. } = h;
    session.shutdown().await;
    assert!(sink.shown().is_empty());
}
