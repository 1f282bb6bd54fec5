//! keyflow-keycode: keys, modifiers and chords for hotkey bindings and key actions.
//!
//! - `Key`: enum of the keys a flow can press or bind.
//! - `Modifier`: enum of modifier keys with conversions to/from `Key`.
//! - `Chord`: a modifier set plus one key, parsed from `"ctrl+alt+esc"` or
//!   `["ctrl", "alt", "esc"]` and rendered in a canonical order. The canonical
//!   string is the identity used by the hotkey registry.

mod key;
pub use key::Key;

mod spec;

mod modifiers;
pub use modifiers::Modifier;

mod chord;
pub use chord::Chord;
