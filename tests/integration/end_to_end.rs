//! Full invocation flows through the orchestrator: scripted provider,
//! recording notifier, manual clock, real state files.

use std::time::Duration;

use pretty_assertions::assert_eq;

use traffic_warden::{
    InstanceStatus, events,
    clock::Clock,
    notify::Severity,
    orchestrator::{Orchestrator, RunSummary},
    state::StateStore,
};

use crate::helpers::*;

#[tokio::test]
async fn stopped_instance_with_safe_traffic_is_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let config = create_test_config(
        vec![create_test_target("i-1", "hk-01", 180.0)],
        store.path().to_path_buf(),
    );

    // stopped at decision time, running on the second confirmation poll
    let gateway = ScriptedGateway::new().script(
        "i-1",
        100 * GIB,
        vec![
            InstanceStatus::Stopped,
            InstanceStatus::Transitioning,
            InstanceStatus::Running,
        ],
    );
    let notifier = RecordingNotifier::new();
    let clock = ManualClock::at(1_700_000_000);

    let summary = Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert_eq!(
        summary,
        RunSummary {
            processed: 1,
            failed: 0
        }
    );
    assert_eq!(gateway.commands(), vec![Command::Start("i-1".to_string())]);
    assert_eq!(
        notifier.sent(),
        vec![("Monitoring Resumed".to_string(), Severity::Ok)]
    );

    // persisted history: counter reset, resumed cooldown armed
    let history = store.load();
    assert_eq!(history.start_failures("i-1"), 0);
    assert!(!history.cooldown_elapsed(
        "i-1",
        events::RESUMED,
        Duration::from_secs(3600),
        clock.now()
    ));
}

#[tokio::test]
async fn repeated_start_timeouts_end_in_the_exhaustion_gate() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let config = create_test_config(
        vec![create_test_target("i-1", "hk-01", 180.0)],
        store.path().to_path_buf(),
    );
    let notifier = RecordingNotifier::new();
    let clock = ManualClock::at(1_700_000_000);

    // three invocations whose starts never confirm
    for expected_failures in 1..=3 {
        let gateway = ScriptedGateway::new().script(
            "i-1",
            100 * GIB,
            vec![InstanceStatus::Stopped], // stays stopped through every poll
        );
        Orchestrator::new(&gateway, &notifier, &clock)
            .run(&config, &store)
            .await;

        assert_eq!(gateway.commands(), vec![Command::Start("i-1".to_string())]);
        assert_eq!(store.load().start_failures("i-1"), expected_failures);
        clock.advance(Duration::from_secs(300));
    }

    // only the first timeout notified inside the one-hour window
    assert_eq!(notifier.count("Start Failure"), 1);

    // fourth invocation: the gate holds, no start command at all
    clock.advance(Duration::from_secs(3600));
    let gateway =
        ScriptedGateway::new().script("i-1", 100 * GIB, vec![InstanceStatus::Stopped]);
    Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert!(gateway.commands().is_empty());
    assert_eq!(notifier.count("Capacity Alert"), 1);
    assert_eq!(store.load().start_failures("i-1"), 3);
}

#[tokio::test]
async fn overlimit_stops_once_and_stays_quiet_for_a_day() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let config = create_test_config(
        vec![create_test_target("i-1", "hk-01", 180.0)],
        store.path().to_path_buf(),
    );
    let notifier = RecordingNotifier::new();
    let clock = ManualClock::at(1_700_000_000);

    // 200 GiB >= 180 GiB quota, instance still running
    let gateway =
        ScriptedGateway::new().script("i-1", 200 * GIB, vec![InstanceStatus::Running]);
    Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert_eq!(gateway.commands(), vec![Command::Stop("i-1".to_string())]);
    assert_eq!(notifier.count("Traffic Alert"), 1);

    // an hour later the instance is stopped, traffic still over quota:
    // no stop command and no second notification
    clock.advance(Duration::from_secs(3600));
    let gateway =
        ScriptedGateway::new().script("i-1", 200 * GIB, vec![InstanceStatus::Stopped]);
    Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert!(gateway.commands().is_empty());
    assert_eq!(notifier.count("Traffic Alert"), 1);
    assert_eq!(notifier.count("Traffic Reminder"), 0);

    // a day later the reminder fires
    clock.advance(Duration::from_secs(86400));
    let gateway =
        ScriptedGateway::new().script("i-1", 200 * GIB, vec![InstanceStatus::Stopped]);
    Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert_eq!(notifier.count("Traffic Reminder"), 1);
}

#[tokio::test]
async fn safe_running_instance_needs_no_action() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let config = create_test_config(
        vec![create_test_target("i-1", "hk-01", 180.0)],
        store.path().to_path_buf(),
    );

    let gateway =
        ScriptedGateway::new().script("i-1", 50 * GIB, vec![InstanceStatus::Running]);
    let notifier = RecordingNotifier::new();
    let clock = ManualClock::at(1_700_000_000);

    let summary = Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert_eq!(summary.failed, 0);
    assert!(gateway.commands().is_empty());
    assert!(notifier.sent().is_empty());
    assert_eq!(store.load().start_failures("i-1"), 0);
}

#[tokio::test]
async fn one_broken_target_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("state.json"));
    let config = create_test_config(
        vec![
            create_test_target("i-missing", "gone-01", 180.0),
            create_test_target("i-2", "hk-02", 180.0),
        ],
        store.path().to_path_buf(),
    );

    // i-missing answers traffic but the provider does not know the
    // instance id; i-2 is over quota and running
    let gateway = ScriptedGateway::new()
        .script("i-missing", 10 * GIB, vec![])
        .script("i-2", 200 * GIB, vec![InstanceStatus::Running]);

    let notifier = RecordingNotifier::new();
    let clock = ManualClock::at(1_700_000_000);

    let summary = Orchestrator::new(&gateway, &notifier, &clock)
        .run(&config, &store)
        .await;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);

    // the healthy target was still acted on and its history persisted
    assert_eq!(gateway.commands(), vec![Command::Stop("i-2".to_string())]);
    let history = store.load();
    assert!(!history.cooldown_elapsed(
        "i-2",
        events::OVERLIMIT,
        Duration::from_secs(86400),
        clock.now()
    ));
    // the broken target's cycle left no trace
    assert!(history.target("i-missing").is_none());
}
