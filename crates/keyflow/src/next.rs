//! `keyflow next`: upcoming schedule firings.

use chrono::NaiveDateTime;
use keyflow_config::FlowStore;
use keyflow_engine::{Clock, LocalClock, Scheduler};
use tracing::warn;

use crate::{
    cli::NextArgs,
    context::Context,
    error::{Error, Result},
};

/// Parse `--at`.
fn parse_at(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .map_err(|e| Error::Usage(format!("invalid --at {s:?}: {e} (expected YYYY-MM-DD HH:MM)")))
}

/// Print every armed schedule in fire order.
pub fn run(ctx: &Context, args: &NextArgs) -> Result<()> {
    let now = match &args.at {
        Some(s) => parse_at(s)?,
        None => LocalClock.now(),
    };
    let mut scheduler = Scheduler::new();
    for flow in ctx.store.flows() {
        if let Some(spec) = &flow.schedule
            && let Err(e) = scheduler.arm(&flow.id, spec, now)
        {
            warn!(flow = %flow.id, error = %e, "schedule_skipped");
        }
    }
    if scheduler.is_empty() {
        println!("no scheduled flows");
        return Ok(());
    }
    for (flow_id, at) in scheduler.upcoming() {
        let until = at - now;
        println!(
            "{}  {}  (in {}h{:02}m)",
            at.format("%Y-%m-%d %a %H:%M"),
            flow_id,
            until.num_hours(),
            until.num_minutes() % 60
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_at() {
        let t = parse_at("2024-05-01 09:30").expect("parse");
        assert_eq!(t.format("%H:%M").to_string(), "09:30");
        assert!(parse_at("tomorrow").is_err());
    }
}
