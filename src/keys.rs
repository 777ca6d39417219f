//! Key codes, key tables, and key bindings.
//!
//! tmux identifies keys with a 64-bit code: a Unicode codepoint or a
//! named-key value above the codepoint range, plus modifier bits. The
//! session prefix keys and every binding reported by `list-keys` come to
//! us as tmux key strings (`C-b`, `M-F1`, `PPage`, …), so the table here
//! mirrors tmux's own name table, trimmed to the keyboard keys tmux
//! actually prints (mouse pseudo-keys are not tracked).

use std::collections::HashMap;

/// A single tmux key: codepoint or named key, with modifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u64);

const KEYC_BASE: u64 = 0x0000_1000_0000;

impl KeyCode {
    /// No key bound.
    pub const NONE: Self = Self(0xffff_0000_0000);
    /// A key we could not interpret.
    pub const UNKNOWN: Self = Self(0xfffe_0000_0000);

    /// Meta/escape modifier bit.
    pub const ESCAPE: u64 = 0x2000_0000_0000;
    /// Control modifier bit.
    pub const CTRL: u64 = 0x4000_0000_0000;
    /// Shift modifier bit.
    pub const SHIFT: u64 = 0x8000_0000_0000;

    const MASK_MOD: u64 = Self::ESCAPE | Self::CTRL | Self::SHIFT;

    #[must_use]
    pub const fn from_char(c: char) -> Self {
        Self(c as u64)
    }

    /// The key without its modifier bits.
    #[must_use]
    pub const fn base(self) -> u64 {
        self.0 & !Self::MASK_MOD
    }

    #[must_use]
    pub const fn has_ctrl(self) -> bool {
        self.0 & Self::CTRL != 0
    }

    #[must_use]
    pub const fn has_meta(self) -> bool {
        self.0 & Self::ESCAPE != 0
    }

    #[must_use]
    pub const fn is_known(self) -> bool {
        self.base() != Self::NONE.base() && self.base() != Self::UNKNOWN.base()
    }
}

impl Default for KeyCode {
    fn default() -> Self {
        Self::NONE
    }
}

macro_rules! named_keys {
    ($($name:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy)]
        #[repr(u64)]
        #[allow(clippy::upper_case_acronyms)]
        enum Named {
            $($name,)*
        }

        impl Named {
            const fn code(self) -> u64 {
                KEYC_BASE + self as u64
            }
        }
    };
}

// Order matches tmux's enumeration so the numeric values line up with
// what other tmux-aware tooling expects.
named_keys! {
    BSpace,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    IC, DC, Home, End, NPage, PPage, BTab,
    Up, Down, Left, Right,
    KPSlash, KPStar, KPMinus, KPSeven, KPEight, KPNine,
    KPPlus, KPFour, KPFive, KPSix, KPOne, KPTwo, KPThree,
    KPEnter, KPZero, KPPeriod,
}

/// tmux key-name table, aliases included.
const KEY_NAMES: &[(&str, u64)] = &[
    ("F1", Named::F1.code()),
    ("F2", Named::F2.code()),
    ("F3", Named::F3.code()),
    ("F4", Named::F4.code()),
    ("F5", Named::F5.code()),
    ("F6", Named::F6.code()),
    ("F7", Named::F7.code()),
    ("F8", Named::F8.code()),
    ("F9", Named::F9.code()),
    ("F10", Named::F10.code()),
    ("F11", Named::F11.code()),
    ("F12", Named::F12.code()),
    ("IC", Named::IC.code()),
    ("DC", Named::DC.code()),
    ("Home", Named::Home.code()),
    ("End", Named::End.code()),
    ("NPage", Named::NPage.code()),
    ("PageDown", Named::NPage.code()),
    ("PgDn", Named::NPage.code()),
    ("PPage", Named::PPage.code()),
    ("PageUp", Named::PPage.code()),
    ("PgUp", Named::PPage.code()),
    ("Tab", 0x09),
    ("BTab", Named::BTab.code()),
    ("Space", 0x20),
    ("BSpace", Named::BSpace.code()),
    ("Enter", 0x0d),
    ("Escape", 0x1b),
    ("Up", Named::Up.code()),
    ("Down", Named::Down.code()),
    ("Left", Named::Left.code()),
    ("Right", Named::Right.code()),
    ("KP/", Named::KPSlash.code()),
    ("KP*", Named::KPStar.code()),
    ("KP-", Named::KPMinus.code()),
    ("KP7", Named::KPSeven.code()),
    ("KP8", Named::KPEight.code()),
    ("KP9", Named::KPNine.code()),
    ("KP+", Named::KPPlus.code()),
    ("KP4", Named::KPFour.code()),
    ("KP5", Named::KPFive.code()),
    ("KP6", Named::KPSix.code()),
    ("KP1", Named::KPOne.code()),
    ("KP2", Named::KPTwo.code()),
    ("KP3", Named::KPThree.code()),
    ("KPEnter", Named::KPEnter.code()),
    ("KP0", Named::KPZero.code()),
    ("KP.", Named::KPPeriod.code()),
];

fn search_table(name: &str) -> Option<u64> {
    KEY_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

/// Parse a tmux key string (`C-b`, `M-F1`, `^a`, `PPage`, `é`, `0x7e`).
///
/// Returns [`KeyCode::NONE`] for the literal `None` and
/// [`KeyCode::UNKNOWN`] for anything unparseable, matching tmux's own
/// lookup semantics.
#[must_use]
pub fn lookup(string: &str) -> KeyCode {
    if string.eq_ignore_ascii_case("none") {
        return KeyCode::NONE;
    }

    if let Some(hex) = string.strip_prefix("0x") {
        return match u64::from_str_radix(hex, 16) {
            Ok(code) if code <= 0x001f_ffff => KeyCode(code),
            _ => KeyCode::UNKNOWN,
        };
    }

    let mut modifiers = 0u64;
    let mut rest = string;
    if let Some(stripped) = rest.strip_prefix('^')
        && !stripped.is_empty()
    {
        modifiers |= KeyCode::CTRL;
        rest = stripped;
    }
    loop {
        let mut chars = rest.chars();
        let (Some(m), Some('-')) = (chars.next(), chars.next()) else {
            break;
        };
        match m {
            'C' | 'c' => modifiers |= KeyCode::CTRL,
            'M' | 'm' => modifiers |= KeyCode::ESCAPE,
            'S' | 's' => modifiers |= KeyCode::SHIFT,
            _ => return KeyCode::UNKNOWN,
        }
        rest = &rest[2..];
    }
    if rest.is_empty() {
        return KeyCode::UNKNOWN;
    }

    let mut chars = rest.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        // A single character: printable ASCII and any Unicode key are
        // fine, control characters are not addressable by literal.
        if c.is_ascii() && ((c as u32) < 32 || c as u32 == 127) {
            return KeyCode::UNKNOWN;
        }
        return KeyCode(c as u64 | modifiers);
    }

    match search_table(rest) {
        Some(code) => KeyCode(code | modifiers),
        None => KeyCode::UNKNOWN,
    }
}

/// One entry in a key table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub code: KeyCode,
    /// The tmux command executed when the binding fires.
    pub command: String,
    /// Whether the key may be held to repeat without re-pressing prefix.
    pub repeat: bool,
    /// The table the client transitions into after this binding.
    pub next_table: String,
}

/// A named collection of key bindings (`root`, `prefix`, `copy-mode`, …).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTable {
    pub name: String,
    pub binds: HashMap<KeyCode, KeyBinding>,
}

impl KeyTable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binds: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_characters() {
        assert_eq!(lookup("a"), KeyCode(u64::from(b'a')));
        assert_eq!(lookup("é"), KeyCode('é' as u64));
    }

    #[test]
    fn modifiers_stack() {
        assert_eq!(lookup("C-b"), KeyCode(u64::from(b'b') | KeyCode::CTRL));
        assert_eq!(
            lookup("C-M-x"),
            KeyCode(u64::from(b'x') | KeyCode::CTRL | KeyCode::ESCAPE)
        );
        assert_eq!(lookup("^a"), KeyCode(u64::from(b'a') | KeyCode::CTRL));
    }

    #[test]
    fn named_keys_and_aliases() {
        assert_eq!(lookup("PPage"), lookup("PageUp"));
        assert_eq!(lookup("Enter"), KeyCode(0x0d));
        assert_eq!(lookup("space"), KeyCode(0x20));
        assert!(!lookup("S-F5").has_ctrl());
        assert_eq!(lookup("S-F5").base(), lookup("F5").0);
    }

    #[test]
    fn none_and_garbage() {
        assert_eq!(lookup("None"), KeyCode::NONE);
        assert_eq!(lookup("NoSuchKey"), KeyCode::UNKNOWN);
        assert_eq!(lookup("Q-b"), KeyCode::UNKNOWN);
        assert_eq!(lookup("C-"), KeyCode::UNKNOWN);
        assert!(!KeyCode::UNKNOWN.is_known());
        assert!(!KeyCode::NONE.is_known());
    }

    #[test]
    fn hex_form() {
        assert_eq!(lookup("0x7e"), KeyCode(0x7e));
        assert_eq!(lookup("0xffffffff"), KeyCode::UNKNOWN);
    }
}
