//! Chords: a key plus a set of modifiers.

use std::{collections::HashSet, fmt};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, SeqAccess, Visitor},
};

use crate::{Key, Modifier};

/// A key chord: a set of modifiers plus a single key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chord {
    /// Set of modifier keys held down for this chord.
    pub modifiers: HashSet<Modifier>,
    /// The final key for this chord.
    pub key: Key,
}

impl Chord {
    /// Build a chord with no modifiers.
    pub fn key(key: Key) -> Self {
        Self {
            modifiers: HashSet::new(),
            key,
        }
    }

    /// Parses a chord specification of the form "ctrl+alt+k".
    ///
    /// - Case-insensitive for both modifiers and the key.
    /// - Components are separated by "+"; the last component is always the key spec.
    /// - The key accepts the full `Key::from_spec` space, including modifier
    ///   keys, so "ctrl+shift" is a chord whose key is Shift.
    pub fn parse(s: &str) -> Option<Self> {
        let mut buf: Vec<&str> = s.split('+').collect();
        let key_raw = buf.pop()?;
        // keep raw to allow literal space
        let key = if key_raw == " " {
            Key::from_spec(" ")
        } else {
            Key::from_spec(key_raw.trim())
        }?;
        let mut modifiers = HashSet::new();
        for m in buf {
            let mt = m.trim();
            if mt.is_empty() {
                return None;
            }
            modifiers.insert(Modifier::from_spec(mt)?);
        }
        Some(Self { modifiers, key })
    }

    /// Parses a chord given as separate components, e.g. `["ctrl", "alt", "esc"]`.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }
        let joined: Vec<&str> = keys.iter().map(AsRef::as_ref).collect();
        Self::parse(&joined.join("+"))
    }

    /// Sort rank of a modifier in canonical form.
    fn modifier_order(m: &Modifier) -> usize {
        match m {
            // Canonical order: Control, Alt, Shift, Super, Function
            Modifier::Control => 0,
            Modifier::Alt => 1,
            Modifier::Shift => 2,
            Modifier::Super => 3,
            Modifier::Function => 4,
        }
    }

    /// Returns the canonical string form of this chord using the canonical
    /// modifier order and the canonical spec name for each component.
    ///
    /// Two chords that press the same keys always render identically, so this
    /// string is used as the binding identity.
    pub fn to_string_canonical(&self) -> String {
        let mut mods: Vec<Modifier> = self.modifiers.iter().copied().collect();
        mods.sort_by_key(Self::modifier_order);
        let mut out: Vec<String> = Vec::with_capacity(mods.len() + 1);
        for m in mods {
            out.push(m.to_spec());
        }
        out.push(self.key.to_spec());
        out.join("+")
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_canonical())
    }
}

impl Serialize for Chord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_canonical())
    }
}

/// Accepts either `"ctrl+alt+esc"` or `["ctrl", "alt", "esc"]`.
struct ChordVisitor;

impl<'de> Visitor<'de> for ChordVisitor {
    type Value = Chord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a chord string like \"ctrl+alt+k\" or a list of key names")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Chord, E> {
        Chord::parse(v).ok_or_else(|| E::custom(format!("invalid chord: {v:?}")))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Chord, A::Error> {
        let mut parts: Vec<String> = Vec::new();
        while let Some(part) = seq.next_element::<String>()? {
            parts.push(part);
        }
        Chord::from_keys(&parts)
            .ok_or_else(|| de::Error::custom(format!("invalid chord: {parts:?}")))
    }
}

impl<'de> Deserialize<'de> for Chord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ChordVisitor)
    }
}
