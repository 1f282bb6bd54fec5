//! `keyflow run`: execute one flow now and print its record.

use keyflow_protocol::{CoreEvent, ipc::event_channel};
use tokio::time;

use crate::{
    cli::RunArgs,
    context::Context,
    engine,
    error::{Error, Result},
};

/// Start the flow, wait for it to finish and print the run as JSON.
pub async fn run(ctx: &Context, args: &RunArgs) -> Result<()> {
    let (tx, mut rx) = event_channel();
    let engine = engine::builder(ctx, !args.no_archive, tx).start()?;
    let run_id = engine.run_manual(args.flow.as_str()).await?;

    let finished = time::timeout(args.timeout, async {
        while let Some(ev) = rx.recv().await {
            if matches!(ev, CoreEvent::RunFinished { run_id: id, .. } if id == run_id) {
                return true;
            }
        }
        false
    })
    .await;
    if !matches!(finished, Ok(true)) {
        engine.emergency_stop();
        engine.shutdown().await;
        return Err(Error::Timeout(args.timeout));
    }

    let record = engine.finished_run(run_id);
    engine.shutdown().await;
    if let Some(record) = record {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}
