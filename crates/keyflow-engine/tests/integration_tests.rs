use std::{fs, sync::Arc, time::Duration};

use chrono::{NaiveDate, NaiveDateTime};
use keyflow_config::{Flow, FlowStore, MemoryStore, ScheduleKind};
use keyflow_engine::{
    ActionError, Engine, EngineBuilder, EngineConfig, Error, JsonlArchive, ManualClock,
    MockHotkeyApi, Run, RunArchive,
    test_support::{ScriptedActions, recv_until, store, wait_finished, wait_press_wait},
};
use keyflow_keycode::Chord;
use keyflow_protocol::{
    CoreEvent, FlowId, RunStatus, SkipReason, StepResult, Trigger,
    ipc::{EventRx, event_channel},
};

const WAIT_MS: u64 = 3_000;

fn chord(s: &str) -> Chord {
    Chord::parse(s).expect("chord")
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, d)
        .and_then(|date| date.and_hms_opt(h, m, 0))
        .expect("valid datetime")
}

fn test_config() -> EngineConfig {
    EngineConfig {
        hotkey_release_delay: Duration::ZERO,
        // Ticks are driven by hand through `tick_now`.
        scheduler_tick: Duration::from_secs(3_600),
        ..EngineConfig::default()
    }
}

struct Harness {
    engine: Engine,
    rx: EventRx,
    actions: Arc<ScriptedActions>,
    hotkeys: Arc<MockHotkeyApi>,
    clock: Arc<ManualClock>,
}

fn start_engine(store: Arc<MemoryStore>) -> Harness {
    let (tx, rx) = event_channel();
    let actions = ScriptedActions::new();
    let (api, hotkey_rx) = MockHotkeyApi::new();
    let hotkeys = Arc::new(api);
    let clock = Arc::new(ManualClock::new(at(1, 8, 0)));
    let engine = EngineBuilder::new(store, actions.clone())
        .config(test_config())
        .hotkeys(hotkeys.clone(), hotkey_rx)
        .clock(clock.clone())
        .events(tx)
        .start()
        .expect("engine start");
    Harness {
        engine,
        rx,
        actions,
        hotkeys,
        clock,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_run_completes_and_reports_in_order() {
    let mut h = start_engine(store([wait_press_wait("greet")]));
    let run_id = h.engine.run_manual("greet").await.expect("started");

    let mut seen = Vec::new();
    let finished = recv_until(&mut h.rx, WAIT_MS, |ev| {
        seen.push(ev.clone());
        matches!(ev, CoreEvent::RunFinished { .. })
    })
    .await;
    assert_eq!(
        finished,
        Some(CoreEvent::RunFinished {
            run_id,
            status: RunStatus::Completed
        })
    );
    assert!(matches!(
        &seen[0],
        CoreEvent::RunStarted { trigger: Trigger::Manual, .. }
    ));
    let completed: Vec<usize> = seen
        .iter()
        .filter_map(|ev| match ev {
            CoreEvent::StepCompleted { index, result, .. } => {
                assert_eq!(*result, StepResult::Success);
                Some(*index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![0, 1, 2]);

    let run = h.engine.finished_run(run_id).expect("in history");
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.steps().len(), 3);
    assert!(h.engine.active_run().is_none());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn second_request_while_busy_is_rejected_without_logs() {
    let mut h = start_engine(store([wait_press_wait("a"), wait_press_wait("b")]));
    let gate = h.actions.hold(0);
    let first = h.engine.run_manual("a").await.expect("first starts");
    let gate = tokio::task::spawn_blocking(move || {
        assert!(gate.wait_entered(WAIT_MS));
        gate
    })
    .await
    .expect("gate");

    assert_eq!(first, h.engine.active_run().expect("active").0);
    let err = h.engine.run_manual("b").await.expect_err("busy");
    assert!(matches!(err, Error::Busy));

    let skipped = h.engine.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].flow_id, FlowId::from("b"));
    assert_eq!(skipped[0].reason, SkipReason::Busy);
    assert_eq!(skipped[0].source, Trigger::Manual);

    gate.release();
    assert_eq!(
        wait_finished(&mut h.rx, first, WAIT_MS).await,
        Some(RunStatus::Completed)
    );
    let history = h.engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].flow().id, FlowId::from("a"));
    assert!(
        h.actions
            .calls()
            .iter()
            .all(|c| c.flow_id == FlowId::from("a"))
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_and_empty_flows_are_rejected() {
    let mut h = start_engine(store([Flow::new("empty", "Empty", vec![])]));
    assert!(matches!(
        h.engine.run_manual("missing").await,
        Err(Error::UnknownFlow(id)) if id == FlowId::from("missing")
    ));
    assert!(matches!(
        h.engine.run_manual("empty").await,
        Err(Error::EmptyFlow(_))
    ));
    let ev = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(
            ev,
            CoreEvent::TriggerSkipped {
                reason: SkipReason::EmptyFlow,
                ..
            }
        )
    })
    .await;
    assert!(ev.is_some());
    assert!(h.engine.history().is_empty());
    assert_eq!(h.engine.skipped().len(), 2);
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn hotkey_press_starts_the_bound_flow() {
    let flow = wait_press_wait("hot").with_hotkey(chord("ctrl+alt+h"));
    let mut h = start_engine(store([flow]));
    assert_eq!(h.engine.load_report().hotkeys.len(), 1);
    assert!(h.hotkeys.press(&chord("alt+ctrl+H")));

    let started = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::RunStarted { .. })
    })
    .await;
    let Some(CoreEvent::RunStarted {
        run_id,
        flow_id,
        trigger,
    }) = started
    else {
        panic!("no run started");
    };
    assert_eq!(flow_id, FlowId::from("hot"));
    assert_eq!(
        trigger,
        Trigger::Hotkey {
            combo: "ctrl+alt+h".into()
        }
    );
    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Completed)
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn emergency_hotkey_stops_after_the_current_step() {
    let mut h = start_engine(store([wait_press_wait("long")]));
    let gate = h.actions.hold(1);
    let run_id = h.engine.run_manual("long").await.expect("started");
    let gate = tokio::task::spawn_blocking(move || {
        assert!(gate.wait_entered(WAIT_MS));
        gate
    })
    .await
    .expect("gate");

    assert!(h.hotkeys.press(&chord("ctrl+alt+esc")));
    let stop = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::StopRequested { .. })
    })
    .await;
    assert_eq!(stop, Some(CoreEvent::StopRequested { run_id }));
    gate.release();

    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Stopped)
    );
    let run = h.engine.finished_run(run_id).expect("recorded");
    assert_eq!(run.steps().len(), 2);
    assert_eq!(run.steps()[1].index, 1);
    assert_eq!(h.actions.called_indices(), vec![0, 1]);
    assert!(h.engine.emergency_stop().is_none());
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_tick_starts_a_run_once() {
    let flow = wait_press_wait("daily").with_schedule(ScheduleKind::Daily, "09:00");
    let mut h = start_engine(store([flow]));
    let id = FlowId::from("daily");
    assert_eq!(h.engine.triggers().next_fire(&id), Some(at(1, 9, 0)));

    assert_eq!(h.engine.triggers().tick_now(), 0);
    h.clock.set(at(1, 9, 0));
    assert_eq!(h.engine.triggers().tick_now(), 1);
    assert_eq!(h.engine.triggers().tick_now(), 0);
    assert_eq!(h.engine.triggers().next_fire(&id), Some(at(2, 9, 0)));

    let started = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::RunStarted { .. })
    })
    .await;
    let Some(CoreEvent::RunStarted { run_id, trigger, .. }) = started else {
        panic!("no run started");
    };
    assert_eq!(
        trigger,
        Trigger::Schedule {
            kind: ScheduleKind::Daily,
            spec: "09:00".into()
        }
    );
    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Completed)
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn schedule_firing_during_a_stop_is_busy() {
    let sched = wait_press_wait("sched").with_schedule(ScheduleKind::Daily, "09:00");
    let mut h = start_engine(store([wait_press_wait("manual"), sched]));
    let gate = h.actions.hold(0);
    let run_id = h.engine.run_manual("manual").await.expect("started");
    let gate = tokio::task::spawn_blocking(move || {
        assert!(gate.wait_entered(WAIT_MS));
        gate
    })
    .await
    .expect("gate");

    assert_eq!(h.engine.emergency_stop(), Some(run_id));
    h.clock.set(at(1, 9, 0));
    assert_eq!(h.engine.triggers().tick_now(), 1);
    let skipped = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::TriggerSkipped { .. })
    })
    .await;
    assert!(matches!(
        skipped,
        Some(CoreEvent::TriggerSkipped {
            reason: SkipReason::Busy,
            source: Trigger::Schedule { .. },
            ..
        })
    ));
    gate.release();
    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Stopped)
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn conflicting_triggers_are_reported_at_load() {
    let store = store([
        wait_press_wait("a").with_hotkey(chord("ctrl+1")),
        wait_press_wait("b").with_hotkey(chord("ctrl+1")),
        wait_press_wait("c").with_hotkey(chord("ctrl+alt+esc")),
        wait_press_wait("d").with_schedule(ScheduleKind::Cron, "61 * * * *"),
    ]);
    let mut h = start_engine(store);
    let report = h.engine.load_report();
    assert_eq!(report.hotkeys, vec![(FlowId::from("a"), "ctrl+1".to_string())]);
    assert_eq!(report.conflicts.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, FlowId::from("d"));

    let mut conflicts = Vec::new();
    let mut rejected = false;
    recv_until(&mut h.rx, WAIT_MS, |ev| {
        match ev {
            CoreEvent::HotkeyConflict {
                combo,
                existing_flow_id,
            } => conflicts.push((combo.clone(), existing_flow_id.clone())),
            CoreEvent::ScheduleRejected { flow_id, .. } => {
                rejected = *flow_id == FlowId::from("d");
            }
            _ => {}
        }
        conflicts.len() == 2 && rejected
    })
    .await;
    assert!(rejected);
    assert!(conflicts.contains(&("ctrl+1".to_string(), Some(FlowId::from("a")))));
    assert!(conflicts.contains(&("ctrl+alt+esc".to_string(), None)));

    // The rejected flows stay unbound; the first owner still works.
    assert!(!h.hotkeys.press(&chord("ctrl+2")));
    assert!(h.hotkeys.press(&chord("ctrl+1")));
    let started = recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::RunStarted { .. })
    })
    .await;
    assert!(matches!(
        started,
        Some(CoreEvent::RunStarted { flow_id, .. }) if flow_id == FlowId::from("a")
    ));
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_picks_up_store_changes() {
    let store = store([wait_press_wait("a").with_hotkey(chord("f6"))]);
    let h = start_engine(store.clone());
    assert_eq!(h.hotkeys.registered(), vec!["ctrl+alt+esc", "f6"]);

    store.upsert(wait_press_wait("a").with_hotkey(chord("f7")));
    store.upsert(wait_press_wait("b").with_schedule(ScheduleKind::Weekly, "wed@09:00"));
    let report = h.engine.reload_triggers();
    assert!(report.is_clean());
    assert_eq!(h.hotkeys.registered(), vec!["ctrl+alt+esc", "f7"]);
    // 2024-05-01 is a Wednesday and the clock reads 08:00.
    assert_eq!(
        h.engine.triggers().next_fire(&FlowId::from("b")),
        Some(at(1, 9, 0))
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_run_keeps_its_snapshot() {
    let store = store([wait_press_wait("edit")]);
    let mut h = start_engine(store.clone());
    let gate = h.actions.hold(0);
    let run_id = h.engine.run_manual("edit").await.expect("started");
    let gate = tokio::task::spawn_blocking(move || {
        assert!(gate.wait_entered(WAIT_MS));
        gate
    })
    .await
    .expect("gate");

    store.upsert(Flow::new("edit", "Edited", vec![]));
    gate.release();
    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Completed)
    );
    let run = h.engine.finished_run(run_id).expect("recorded");
    assert_eq!(run.flow().name, "edit");
    assert_eq!(run.steps().len(), 3);
    assert_eq!(
        store.load_flow(&FlowId::from("edit")).map(|f| f.steps.len()),
        Some(0)
    );
    h.engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_runs_are_archived_before_the_dispatcher_frees() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("runs.jsonl");
    let (tx, mut rx) = event_channel();
    let actions = ScriptedActions::new();
    actions.fail_at(
        1,
        ActionError::WindowNotFound {
            title: "Notepad".into(),
        },
    );
    let engine = EngineBuilder::new(store([wait_press_wait("log")]), actions)
        .config(test_config())
        .archive(Arc::new(JsonlArchive::new(&path)))
        .events(tx)
        .start()
        .expect("engine start");

    let run_id = engine.run_manual("log").await.expect("started");
    assert_eq!(
        wait_finished(&mut rx, run_id, WAIT_MS).await,
        Some(RunStatus::Failed)
    );
    let text = fs::read_to_string(&path).expect("archive written");
    assert_eq!(text.lines().count(), 1);
    let v: serde_json::Value = serde_json::from_str(text.trim()).expect("json line");
    assert_eq!(v["status"], "failed");
    assert_eq!(v["failure"]["step_index"], 1);
    assert_eq!(v["failure"]["error"]["kind"], "window_not_found");
    assert_eq!(v["steps"].as_array().map(Vec::len), Some(2));
    assert_eq!(v["trigger"]["type"], "manual");
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_the_active_run() {
    let mut h = start_engine(store([wait_press_wait("slow")]));
    let run_id = h.engine.run_manual("slow").await.expect("started");
    recv_until(&mut h.rx, WAIT_MS, |ev| {
        matches!(ev, CoreEvent::StepStarted { index: 0, .. })
    })
    .await
    .expect("step 0 started");
    h.engine.shutdown().await;
    let run = h.engine.finished_run(run_id).expect("recorded on shutdown");
    assert_eq!(run.status(), RunStatus::Stopped);
    assert_eq!(run.steps().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_action_is_recorded_as_a_failed_run() {
    let mut h = start_engine(store([wait_press_wait("boom"), wait_press_wait("next")]));
    h.actions.panic_at(1);
    let run_id = h.engine.run_manual("boom").await.expect("started");
    assert_eq!(
        wait_finished(&mut h.rx, run_id, WAIT_MS).await,
        Some(RunStatus::Failed)
    );

    let run = h.engine.finished_run(run_id).expect("in history");
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(run.failure().map(|f| f.step_index), Some(1));
    assert_eq!(run.steps().len(), 2);
    assert!(h.engine.active_run().is_none());

    // The dispatcher is free again; the scripted panic hits step 1 of any flow.
    let next = h.engine.run_manual("next").await.expect("next starts");
    assert_eq!(
        wait_finished(&mut h.rx, next, WAIT_MS).await,
        Some(RunStatus::Failed)
    );
    h.engine.shutdown().await;
}

struct PanickingArchive;

impl RunArchive for PanickingArchive {
    fn append(&self, _run: &Run) -> keyflow_engine::Result<()> {
        panic!("disk on fire");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_archive_keeps_the_run_in_history() {
    let (tx, mut rx) = event_channel();
    let engine = EngineBuilder::new(store([wait_press_wait("a")]), ScriptedActions::new())
        .config(test_config())
        .archive(Arc::new(PanickingArchive))
        .events(tx)
        .start()
        .expect("engine start");

    let run_id = engine.run_manual("a").await.expect("started");
    assert_eq!(
        wait_finished(&mut rx, run_id, WAIT_MS).await,
        Some(RunStatus::Completed)
    );
    let run = engine.finished_run(run_id).expect("in history");
    assert_eq!(run.steps().len(), 3);
    assert!(engine.active_run().is_none());
    engine.shutdown().await;
}
