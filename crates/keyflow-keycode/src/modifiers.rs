//! Modifier keys.

use std::convert::TryFrom;

use crate::Key;

/// Modifier keys that can participate in a chord.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    /// Ctrl.
    Control,
    /// Alt (Option on Apple keyboards).
    Alt,
    /// Shift.
    Shift,
    /// Windows / Command / Meta key.
    Super,
    /// Fn.
    Function,
}

impl From<Modifier> for Key {
    fn from(m: Modifier) -> Self {
        match m {
            Modifier::Control => Self::Control,
            Modifier::Alt => Self::Alt,
            Modifier::Shift => Self::Shift,
            Modifier::Super => Self::Super,
            Modifier::Function => Self::Function,
        }
    }
}

impl TryFrom<Key> for Modifier {
    type Error = ();
    fn try_from(k: Key) -> Result<Self, Self::Error> {
        match k {
            Key::Control => Ok(Self::Control),
            Key::Alt => Ok(Self::Alt),
            Key::Shift => Ok(Self::Shift),
            Key::Super => Ok(Self::Super),
            Key::Function => Ok(Self::Function),
            _ => Err(()),
        }
    }
}

impl Modifier {
    /// Parses a modifier specification string via key specs, then converts.
    ///
    /// Accepts everything `Key::from_spec` accepts (ctrl/control, alt/opt,
    /// win/cmd/super/meta, shift, fn). Fails if the key is not a modifier.
    pub fn from_spec(s: &str) -> Option<Self> {
        Key::from_spec(s).and_then(|k| Self::try_from(k).ok())
    }

    /// Returns the canonical lowercase spec string for this modifier.
    pub fn to_spec(self) -> String {
        Key::from(self).to_spec()
    }
}
