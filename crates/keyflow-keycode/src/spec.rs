//! Textual key specs: shorthand, aliases and serde for `Key`.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::Key;

/// Central mapping between enum variants and spec strings for shorthand and
/// non-name specs, shared by parsing and formatting.
macro_rules! key_spec_map {
    ($m:ident, $arg:tt) => {
        $m! { $arg,
            Digit0 => "0",
            Digit1 => "1",
            Digit2 => "2",
            Digit3 => "3",
            Digit4 => "4",
            Digit5 => "5",
            Digit6 => "6",
            Digit7 => "7",
            Digit8 => "8",
            Digit9 => "9",
            Minus => "-",
            Equal => "=",
            LeftBracket => "[",
            RightBracket => "]",
            Backslash => "\\",
            Semicolon => ";",
            Quote => "'",
            Comma => ",",
            Period => ".",
            Slash => "/",
            Grave => "`",
            Return => "enter",
            Escape => "esc",
            Control => "ctrl",
            LeftArrow => "left",
            RightArrow => "right",
            UpArrow => "up",
            DownArrow => "down",
            Function => "fn",
        }
    };
}

/// Expand the spec table into a `Key` to spec match.
macro_rules! to_spec_match {
    ( $key:expr, $( $k:ident => $s:expr, )* ) => {
        match $key {
            $( Key::$k => $s, )*
            _ => $key.name(),
        }
    }
}

/// Expand the spec table into a spec to `Key` match.
macro_rules! from_spec_match {
    ( $s:expr, $( $k:ident => $v:expr, )* ) => {{
        match $s {
            $( $v => Some(Key::$k), )*
            _ => None,
        }
    }}
}

/// Aliases that only apply to parsing specs (not emitted by `to_spec`).
macro_rules! key_spec_aliases {
    ($m:ident, $arg:expr) => {
        $m! { $arg,
            // modifier words
            Control => "control",
            Alt => "opt",
            Alt => "option",
            Super => "cmd",
            Super => "command",
            Super => "win",
            Super => "meta",
            CapsLock => "caps",

            // enter/delete variants
            Return => "ret",
            Backspace => "bksp",
            Delete => "del",
            Escape => "escape",
            Insert => "ins",
            PrintScreen => "prtsc",
            Space => " ",

            // spelled-out punctuation
            Backslash => "backslash",
            Comma => "comma",
            Period => "period",
            Slash => "slash",
            Minus => "minus",
            Equal => "equal",
            Semicolon => "semicolon",
            Quote => "quote",
            Grave => "grave",
            LeftBracket => "leftbracket",
            RightBracket => "rightbracket",

            // navigation
            PageUp => "pgup",
            PageDown => "pgdn",
            LeftArrow => "arrowleft",
            RightArrow => "arrowright",
            UpArrow => "arrowup",
            DownArrow => "arrowdown",
        }
    };
}

/// Parses a key specification into a `Key`.
///
/// First tries a case-insensitive enum name (via `Key::from_name`). If that
/// fails, falls back to the shorthand specs centrally defined in
/// `key_spec_map`, then to the alias words.
pub fn from_spec(s: &str) -> Option<Key> {
    if let Some(k) = Key::from_name(s) {
        return Some(k);
    }
    if let some @ Some(_) = key_spec_map!(from_spec_match, s) {
        return some;
    }
    let lowered = s.to_ascii_lowercase();
    let lowered = lowered.as_str();
    if let some @ Some(_) = key_spec_map!(from_spec_match, lowered) {
        return some;
    }
    key_spec_aliases!(from_spec_match, lowered)
}

/// Returns the key specification string for a `Key`.
///
/// Uses centrally defined shorthand first (digits, punctuation, short words),
/// then falls back to the lowercased enum variant name.
pub fn to_spec(key: Key) -> String {
    let s = key_spec_map!(to_spec_match, key);
    s.to_ascii_lowercase()
}

impl Key {
    /// Parses a key specification string into a `Key`.
    ///
    /// Accepts variant names case-insensitively, symbol shorthands for digits
    /// and punctuation, and common alias words such as esc, enter, ctrl, alt,
    /// win, cmd, pgup, pgdn. Returns `None` if no mapping matches.
    pub fn from_spec(s: &str) -> Option<Self> {
        from_spec(s)
    }

    /// Returns the canonical spec string for this `Key`.
    pub fn to_spec(self) -> String {
        to_spec(self)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_spec())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_spec(raw.trim())
            .ok_or_else(|| de::Error::custom(format!("unknown key: {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_roundtrip(k: Key) {
        let spec = to_spec(k);
        assert_eq!(
            from_spec(&spec),
            Some(k),
            "roundtrip failed for {} -> {}",
            k.name(),
            spec
        );
    }

    #[test]
    fn every_key_roundtrips() {
        for k in Key::ALL {
            assert_roundtrip(*k);
        }
    }

    #[test]
    fn digit_and_punctuation_shorthand() {
        assert_eq!(to_spec(Key::Digit1), "1");
        assert_eq!(from_spec("digit1"), Some(Key::Digit1));
        assert_eq!(to_spec(Key::Comma), ",");
        assert_eq!(from_spec("comma"), Some(Key::Comma));
        assert_eq!(from_spec("\\"), Some(Key::Backslash));
    }

    #[test]
    fn named_aliases() {
        assert_eq!(to_spec(Key::Tab), "tab");
        assert_eq!(to_spec(Key::Space), "space");
        assert_eq!(from_spec(" "), Some(Key::Space));
        assert_eq!(from_spec("Enter"), Some(Key::Return));
        assert_eq!(from_spec("ret"), Some(Key::Return));
        assert_eq!(from_spec("ESC"), Some(Key::Escape));
        assert_eq!(from_spec("win"), Some(Key::Super));
        assert_eq!(from_spec("cmd"), Some(Key::Super));
        assert_eq!(from_spec("opt"), Some(Key::Alt));
        assert_eq!(from_spec("pgdn"), Some(Key::PageDown));
        assert_eq!(from_spec("f5"), Some(Key::F5));
        assert_eq!(from_spec("nope"), None);
    }

    #[test]
    fn serde_uses_spec_strings() {
        let json = serde_json::to_string(&Key::Escape).expect("serialize");
        assert_eq!(json, "\"esc\"");
        let k: Key = serde_json::from_str("\"PageDown\"").expect("deserialize");
        assert_eq!(k, Key::PageDown);
        assert!(serde_json::from_str::<Key>("\"bogus\"").is_err());
    }
}
