//! `keyflow check`: validate a flow file without running anything.

use std::sync::Arc;

use keyflow_config::FlowStore;
use keyflow_engine::{
    Clock, Error as EngineError, HotkeyRegistry, LocalClock, MockHotkeyApi, Scheduler,
};

use crate::{
    context::Context,
    error::{Error, Result},
};

/// Validate hotkeys and schedules of every flow and print a summary.
pub fn run(ctx: &Context) -> Result<()> {
    let (api, _events) = MockHotkeyApi::new();
    let mut registry = HotkeyRegistry::new(Arc::new(api));
    let mut scheduler = Scheduler::new();
    let now = LocalClock.now();
    let mut problems = 0usize;

    registry
        .reserve_emergency_stop(&ctx.settings.emergency_hotkey)
        .map_err(EngineError::from)?;
    println!(
        "{}: {} flow(s), emergency stop {}",
        ctx.flows_path.display(),
        ctx.store.len(),
        ctx.settings.emergency_hotkey
    );

    for flow in ctx.store.flows() {
        let mut line = format!("  {} ({}): {} step(s)", flow.id, flow.name, flow.steps.len());
        if !flow.is_runnable() {
            line.push_str(", not runnable: no steps");
            problems += 1;
        }
        if let Some(h) = &flow.hotkey {
            match registry.register(&h.keys, &flow.id) {
                Ok(()) => line.push_str(&format!(", hotkey {}", h.keys)),
                Err(c) => {
                    line.push_str(&format!(", hotkey rejected: {c}"));
                    problems += 1;
                }
            }
        }
        if let Some(s) = &flow.schedule {
            match scheduler.arm(&flow.id, s, now) {
                Ok(next) => line.push_str(&format!(
                    ", {} {:?} next {}",
                    s.kind,
                    s.expression,
                    next.format("%Y-%m-%d %H:%M")
                )),
                Err(e) => {
                    line.push_str(&format!(", schedule rejected: {}", e.message));
                    problems += 1;
                }
            }
        }
        println!("{line}");
    }

    if problems > 0 {
        return Err(Error::CheckFailed(problems));
    }
    println!("ok");
    Ok(())
}
