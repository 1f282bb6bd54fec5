//! Hotkey backend seam and its in-process mock.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering},
};

use keyflow_keycode::Chord;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{Error, Result};

// ---- Hotkey API abstraction ----

/// Registration ids reported by a hotkey backend when a chord is pressed.
pub type HotkeyEvents = mpsc::UnboundedReceiver<u32>;

/// Minimal global-hotkey backend used by the hotkey registry.
///
/// A backend reports presses of intercepted chords by sending their
/// registration id on the channel handed to the trigger manager.
pub trait HotkeyApi: Send + Sync {
    /// Start intercepting `chord`, returning its registration id.
    fn intercept(&self, chord: Chord) -> u32;
    /// Stop intercepting a registration.
    fn unregister(&self, id: u32) -> Result<()>;
}

/// In-process hotkey backend. Presses are injected with [`MockHotkeyApi::press`].
pub struct MockHotkeyApi {
    /// Next registration id.
    next_id: AtomicU32,
    /// Live registrations.
    registered: Mutex<HashMap<u32, Chord>>,
    /// Press sink.
    events: mpsc::UnboundedSender<u32>,
}

impl MockHotkeyApi {
    /// Create the backend and the event stream it feeds.
    pub fn new() -> (Self, HotkeyEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let api = Self {
            next_id: AtomicU32::new(1000),
            registered: Mutex::new(HashMap::new()),
            events,
        };
        (api, rx)
    }

    /// Simulate pressing `chord`. Returns false when no registration matches.
    pub fn press(&self, chord: &Chord) -> bool {
        let want = chord.to_string_canonical();
        let id = self
            .registered
            .lock()
            .iter()
            .find(|(_, c)| c.to_string_canonical() == want)
            .map(|(id, _)| *id);
        match id {
            Some(id) => {
                trace!(combo = %want, id, "mock_hotkey_press");
                self.events.send(id).is_ok()
            }
            None => false,
        }
    }

    /// Canonical strings of every intercepted chord, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .registered
            .lock()
            .values()
            .map(Chord::to_string_canonical)
            .collect();
        out.sort();
        out
    }
}

impl HotkeyApi for MockHotkeyApi {
    fn intercept(&self, chord: Chord) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registered.lock().insert(id, chord);
        id
    }

    fn unregister(&self, id: u32) -> Result<()> {
        match self.registered.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::Hotkey(format!("unknown registration id {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_reports_unknown_ids() {
        let (api, _rx) = MockHotkeyApi::new();
        let chord = Chord::parse("ctrl+alt+k").expect("chord");
        let id = api.intercept(chord.clone());
        assert!(api.press(&chord));
        api.unregister(id).expect("first unregister");
        assert!(!api.press(&chord));
        let err = api.unregister(id).expect_err("already gone");
        assert!(matches!(err, Error::Hotkey(_)));
        assert!(err.to_string().contains(&id.to_string()));
    }
}
