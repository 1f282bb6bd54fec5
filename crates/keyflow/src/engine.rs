//! Engine assembly shared by `run` and `serve`.

use std::sync::Arc;

use keyflow_engine::{
    EngineBuilder, EngineConfig, HotkeyApi, HotkeyEvents, JsonlArchive, LoggingActions,
};
use keyflow_protocol::ipc::EventTx;

use crate::context::Context;

/// Builder with the dry-run capability, settings and (optionally) the archive.
pub fn builder(ctx: &Context, archive: bool, events: EventTx) -> EngineBuilder {
    let mut b = EngineBuilder::new(ctx.store.clone(), Arc::new(LoggingActions))
        .config(EngineConfig::from(&ctx.settings))
        .events(events);
    if archive {
        b = b.archive(Arc::new(JsonlArchive::new(ctx.settings.log_path.clone())));
    }
    b
}

/// Same as [`builder`], with an explicit hotkey backend.
pub fn builder_with_hotkeys(
    ctx: &Context,
    archive: bool,
    events: EventTx,
    api: Arc<dyn HotkeyApi>,
    hotkey_events: HotkeyEvents,
) -> EngineBuilder {
    builder(ctx, archive, events).hotkeys(api, hotkey_events)
}
