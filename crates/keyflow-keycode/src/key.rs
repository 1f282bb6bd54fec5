//! The `Key` enum and its variant-name table.

/// Declare `Key` with its variant-name table.
macro_rules! define_keys {
    ($( $variant:ident ),* $(,)?) => {
        /// A physical key that can be pressed by a step or bound as a hotkey.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub enum Key {
            $(
                #[allow(missing_docs)]
                $variant,
            )*
        }

        impl Key {
            /// Every key, in declaration order.
            pub const ALL: &'static [Self] = &[$( Self::$variant, )*];

            /// The enum variant name, e.g. `"LeftArrow"`.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => stringify!($variant), )*
                }
            }

            /// Case-insensitive lookup by variant name.
            pub fn from_name(s: &str) -> Option<Self> {
                $(
                    if s.eq_ignore_ascii_case(stringify!($variant)) {
                        return Some(Self::$variant);
                    }
                )*
                None
            }
        }
    };
}

define_keys! {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    Return, Tab, Space, Backspace, Delete, Escape, Insert,
    Home, End, PageUp, PageDown,
    LeftArrow, RightArrow, UpArrow, DownArrow,
    Minus, Equal, LeftBracket, RightBracket, Backslash,
    Semicolon, Quote, Comma, Period, Slash, Grave,
    PrintScreen, CapsLock, Menu,
    Control, Alt, Shift, Super, Function,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_resolvable() {
        for k in Key::ALL {
            assert_eq!(Key::from_name(k.name()), Some(*k));
            assert_eq!(Key::from_name(&k.name().to_ascii_uppercase()), Some(*k));
        }
    }
}
