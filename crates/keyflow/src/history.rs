//! `keyflow history`: summarize archived runs.

use keyflow_engine::{JsonlArchive, Run};
use keyflow_protocol::RunStatus;

use crate::{cli::HistoryArgs, context::Context, error::Result};

/// One summary line for a run.
fn describe(run: &Run) -> String {
    let mut line = format!(
        "{}  {:<9}  {}  {}  {}/{} step(s)",
        run.started_at().format("%Y-%m-%d %H:%M:%S"),
        run.status().to_string(),
        run.id(),
        run.flow().id,
        run.steps().len(),
        run.flow().step_count,
    );
    line.push_str(&format!("  [{}]", run.trigger()));
    if let Some(f) = run.failure() {
        line.push_str(&format!("  step {}: {}", f.step_index, f.error));
    }
    line
}

/// Print the most recent runs, oldest first, and a status tally.
pub fn run(ctx: &Context, args: &HistoryArgs) -> Result<()> {
    let path = args
        .archive
        .clone()
        .unwrap_or_else(|| ctx.settings.log_path.clone());
    let runs = JsonlArchive::read_all(&path)?;
    if runs.is_empty() {
        println!("no runs in {}", path.display());
        return Ok(());
    }
    let skip = runs.len().saturating_sub(args.limit);
    for run in &runs[skip..] {
        println!("{}", describe(run));
    }
    let count = |s: RunStatus| runs.iter().filter(|r| r.status() == s).count();
    println!(
        "{} run(s): {} completed, {} stopped, {} failed",
        runs.len(),
        count(RunStatus::Completed),
        count(RunStatus::Stopped),
        count(RunStatus::Failed)
    );
    Ok(())
}
