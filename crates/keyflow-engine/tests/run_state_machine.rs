use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use keyflow_config::{Action, Flow, TypeMode, TypeTextParams, WaitParams};
use keyflow_engine::{
    ActionError, EventSink, RunOptions, RunStateMachine, StopController,
    test_support::{ScriptedActions, wait_press_wait},
};
use keyflow_protocol::{RunId, RunStatus, StepResult, Trigger};

fn machine(actions: Arc<ScriptedActions>, options: RunOptions) -> RunStateMachine {
    RunStateMachine::new(actions, EventSink::detached(), options)
}

#[test]
fn all_steps_succeed() {
    let actions = ScriptedActions::new();
    let m = machine(actions.clone(), RunOptions::default());
    let started = Instant::now();
    let run = m.run(
        Arc::new(wait_press_wait("f")),
        Trigger::Manual,
        RunId::new(),
        &StopController::new(),
    );
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.steps().len(), 3);
    assert!(run.steps().iter().all(|s| s.result == StepResult::Success));
    assert!(run.failure().is_none());
    // Both waits were honoured by the worker.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(run.steps()[0].duration_ms >= 100);
    let ids: Vec<&str> = run.steps().iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids, vec!["f-1", "f-2", "f-3"]);
}

#[test]
fn failure_stops_processing() {
    let actions = ScriptedActions::new();
    actions.fail_at(
        1,
        ActionError::Failed {
            reason: "key stuck".into(),
        },
    );
    let m = machine(actions.clone(), RunOptions::default());
    let run = m.run(
        Arc::new(wait_press_wait("f")),
        Trigger::Manual,
        RunId::new(),
        &StopController::new(),
    );
    assert_eq!(run.status(), RunStatus::Failed);
    let failure = run.failure().expect("failure detail");
    assert_eq!(failure.step_index, 1);
    assert_eq!(
        failure.error,
        ActionError::Failed {
            reason: "key stuck".into()
        }
    );
    assert_eq!(run.steps().len(), 2);
    assert_eq!(run.steps()[0].result, StepResult::Success);
    assert_eq!(run.steps()[1].result, StepResult::Failure);
    assert!(run.steps()[1].error.is_some());
    assert_eq!(actions.called_indices(), vec![0, 1]);
}

#[test]
fn stop_before_first_step_logs_nothing() {
    let actions = ScriptedActions::new();
    let m = machine(actions.clone(), RunOptions::default());
    let stop = StopController::new();
    stop.request_stop();
    let run = m.run(
        Arc::new(wait_press_wait("f")),
        Trigger::Manual,
        RunId::new(),
        &stop,
    );
    assert_eq!(run.status(), RunStatus::Stopped);
    assert!(run.steps().is_empty());
    assert!(actions.calls().is_empty());
}

/// A stop requested while step index 1 is executing takes effect before step
/// index 2 begins: steps 0 and 1 are logged (two entries), step 2 is never
/// invoked and is absent from the log rather than logged as skipped.
#[test]
fn stop_during_step_one_keeps_it_and_omits_step_two() {
    let actions = ScriptedActions::new();
    let gate = actions.hold(1);
    let m = Arc::new(machine(actions.clone(), RunOptions::default()));
    let stop = StopController::new();

    let worker = {
        let m = m.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            m.run(
                Arc::new(wait_press_wait("f")),
                Trigger::Manual,
                RunId::new(),
                &stop,
            )
        })
    };
    assert!(gate.wait_entered(2_000));
    assert!(stop.request_stop());
    gate.release();
    let run = worker.join().expect("worker");

    assert_eq!(run.status(), RunStatus::Stopped);
    assert_eq!(run.steps().len(), 2);
    assert_eq!(run.steps()[0].index, 0);
    assert_eq!(run.steps()[1].index, 1);
    assert_eq!(run.steps()[1].result, StepResult::Success);
    assert!(run.steps().len() <= run.flow().step_count);
    assert_eq!(actions.called_indices(), vec![0, 1]);
}

#[test]
fn stop_during_last_step_completes() {
    let actions = ScriptedActions::new();
    let gate = actions.hold(2);
    let m = Arc::new(machine(actions.clone(), RunOptions::default()));
    let stop = StopController::new();
    let worker = {
        let (m, stop) = (m.clone(), stop.clone());
        thread::spawn(move || {
            m.run(
                Arc::new(wait_press_wait("f")),
                Trigger::Manual,
                RunId::new(),
                &stop,
            )
        })
    };
    assert!(gate.wait_entered(2_000));
    stop.request_stop();
    gate.release();
    let run = worker.join().expect("worker");
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.steps().len(), 3);
}

#[test]
fn action_timeout_fails_the_step() {
    let actions = ScriptedActions::new();
    actions.delay_at(1, Duration::from_millis(400));
    let m = machine(
        actions.clone(),
        RunOptions {
            action_timeout: Some(Duration::from_millis(50)),
            ..RunOptions::default()
        },
    );
    let started = Instant::now();
    let run = m.run(
        Arc::new(wait_press_wait("f")),
        Trigger::Manual,
        RunId::new(),
        &StopController::new(),
    );
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(run.status(), RunStatus::Failed);
    assert_eq!(
        run.failure().map(|f| f.error.clone()),
        Some(ActionError::Timeout { ms: 50 })
    );
    assert_eq!(run.steps().len(), 2);
}

#[test]
fn waits_outlast_the_action_timeout() {
    let actions = ScriptedActions::new();
    let m = machine(
        actions.clone(),
        RunOptions {
            action_timeout: Some(Duration::from_millis(50)),
            ..RunOptions::default()
        },
    );
    let flow = Flow::new(
        "slow",
        "Slow",
        vec![
            Action::Wait(WaitParams { ms: 200 }),
            Action::Wait(WaitParams { ms: 0 }),
        ],
    );
    let started = Instant::now();
    let run = m.run(
        Arc::new(flow),
        Trigger::Manual,
        RunId::new(),
        &StopController::new(),
    );
    assert_eq!(run.status(), RunStatus::Completed);
    assert!(run.failure().is_none());
    assert_eq!(run.steps().len(), 2);
    assert!(run.steps()[0].duration_ms >= 200);
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn panicking_action_fails_the_step() {
    for timeout in [None, Some(Duration::from_secs(5))] {
        let actions = ScriptedActions::new();
        actions.panic_at(1);
        let m = machine(
            actions.clone(),
            RunOptions {
                action_timeout: timeout,
                ..RunOptions::default()
            },
        );
        let run = m.run(
            Arc::new(wait_press_wait("f")),
            Trigger::Manual,
            RunId::new(),
            &StopController::new(),
        );
        assert_eq!(run.status(), RunStatus::Failed, "timeout {timeout:?}");
        let failure = run.failure().expect("failure detail");
        assert_eq!(failure.step_index, 1);
        assert!(
            matches!(&failure.error, ActionError::Failed { reason } if reason.contains("scripted panic")),
            "{:?}",
            failure.error
        );
        assert_eq!(run.steps().len(), 2);
        assert_eq!(run.steps()[1].result, StepResult::Failure);
        assert_eq!(actions.called_indices(), vec![0, 1]);
    }
}

#[test]
fn hotkey_runs_wait_for_key_release() {
    let actions = ScriptedActions::new();
    let m = machine(
        actions.clone(),
        RunOptions {
            hotkey_release_delay: Duration::from_millis(80),
            ..RunOptions::default()
        },
    );
    let flow = Arc::new(Flow::new(
        "quick",
        "Quick",
        vec![Action::Wait(WaitParams { ms: 0 })],
    ));
    let run = m.run(
        flow.clone(),
        Trigger::Hotkey {
            combo: "ctrl+alt+q".into(),
        },
        RunId::new(),
        &StopController::new(),
    );
    let waited = run.steps()[0].started_at - run.started_at();
    assert!(waited.num_milliseconds() >= 80, "{waited:?}");

    let run = m.run(flow, Trigger::Manual, RunId::new(), &StopController::new());
    let waited = run.steps()[0].started_at - run.started_at();
    assert!(waited.num_milliseconds() < 80, "{waited:?}");
}

#[test]
fn typed_text_is_redacted_and_focus_is_forwarded() {
    let actions = ScriptedActions::new();
    let m = machine(actions.clone(), RunOptions::default());
    let mut flow = Flow::new(
        "secret",
        "Secret",
        vec![
            Action::TypeText(TypeTextParams {
                text: "hunter2".into(),
                mode: TypeMode::Paste,
                interval_ms: None,
            }),
            Action::Wait(WaitParams { ms: 0 }),
        ],
    );
    flow.require_window_focus = true;
    flow.steps[1].require_window_focus = Some(false);
    let run = m.run(
        Arc::new(flow),
        Trigger::Manual,
        RunId::new(),
        &StopController::new(),
    );
    let params = &run.steps()[0].params;
    assert_eq!(params["length"], 7);
    assert_eq!(params["mode"], "paste");
    assert!(params.get("text").is_none());
    assert!(!serde_json::to_string(&run).expect("json").contains("hunter2"));

    let focus: Vec<bool> = actions
        .calls()
        .iter()
        .map(|c| c.require_window_focus)
        .collect();
    assert_eq!(focus, vec![true, false]);
}
