//! `keyflow serve`: hotkeys and schedules until interrupted.
//!
//! Hotkeys are simulated on stdin: each line is a chord such as
//! `ctrl+alt+1`. Typing the emergency chord stops the active run. The
//! lines `run <flow>` and `stop` are accepted too. Core events are printed
//! to stdout as JSON lines.

use std::{future, sync::Arc};

use keyflow_engine::{Engine, MockHotkeyApi};
use keyflow_keycode::Chord;
use keyflow_protocol::ipc::event_channel;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    signal, time,
};
use tracing::{info, warn};

use crate::{cli::ServeArgs, context::Context, engine, error::Result};

/// Act on one stdin line.
async fn handle_line(engine: &Engine, hotkeys: &MockHotkeyApi, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if line == "stop" {
        if engine.emergency_stop().is_none() {
            println!("# nothing to stop");
        }
        return;
    }
    if let Some(flow) = line.strip_prefix("run ") {
        if let Err(e) = engine.run_manual(flow.trim()).await {
            println!("# {e}");
        }
        return;
    }
    match Chord::parse(line) {
        Some(chord) => {
            if !hotkeys.press(&chord) {
                println!("# no binding for {chord}");
            }
        }
        None => println!("# not a chord: {line:?}"),
    }
}

/// Run the engine with stdin-simulated hotkeys.
pub async fn run(ctx: &Context, args: &ServeArgs) -> Result<()> {
    let (tx, mut rx) = event_channel();
    let (api, hotkey_events) = MockHotkeyApi::new();
    let hotkeys = Arc::new(api);
    let engine =
        engine::builder_with_hotkeys(ctx, !args.no_archive, tx, hotkeys.clone(), hotkey_events)
            .start()?;

    for (combo, binding) in engine.triggers().hotkeys() {
        println!("# {combo} -> {binding}");
    }
    for (flow, at) in engine.triggers().upcoming() {
        println!("# {flow} next at {}", at.format("%Y-%m-%d %H:%M"));
    }

    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match serde_json::to_string(&ev) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "event_encode_failed"),
            }
        }
    });

    let deadline = async {
        match args.duration {
            Some(d) => time::sleep(d).await,
            None => future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = &mut deadline => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&engine, &hotkeys, &line).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin_read_failed");
                    stdin_open = false;
                }
            },
        }
    }

    engine.shutdown().await;
    drop(engine);
    printer.abort();
    Ok(())
}
