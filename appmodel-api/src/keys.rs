//! Key chords.
//!
//! A [`KeyCombo`] is one key press with a modifier set (`Ctrl+S`). A
//! [`KeyBinding`] is a sequence of combos pressed one after another
//! (`Ctrl+K Ctrl+C`), which is what keybinding rules resolve to.
//!
//! The portable modifiers `CtrlCmd` and `WinCtrl` are resolved against an
//! [`OperatingSystem`] at parse time, so two bindings compare equal exactly
//! when the physical keys pressed are the same.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating system family, used for platform-specific bindings and the
/// `is_linux` / `is_mac` / `is_windows` context keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Mac,
    Windows,
}

impl OperatingSystem {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            OperatingSystem::Mac
        } else if cfg!(target_os = "windows") {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Linux
        }
    }

    pub fn is_mac(self) -> bool {
        self == OperatingSystem::Mac
    }

    pub fn is_windows(self) -> bool {
        self == OperatingSystem::Windows
    }

    pub fn is_linux(self) -> bool {
        self == OperatingSystem::Linux
    }
}

/// Keyboard modifiers for key combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool, // Command on macOS, Super/Win elsewhere
}

impl Modifiers {
    pub const NONE: Self = Self { ctrl: false, alt: false, shift: false, meta: false };
    pub const CTRL: Self = Self { ctrl: true, alt: false, shift: false, meta: false };
    pub const ALT: Self = Self { ctrl: false, alt: true, shift: false, meta: false };
    pub const SHIFT: Self = Self { ctrl: false, alt: false, shift: true, meta: false };
    pub const META: Self = Self { ctrl: false, alt: false, shift: false, meta: true };
    pub const CTRL_SHIFT: Self = Self { ctrl: true, alt: false, shift: true, meta: false };
    pub const META_SHIFT: Self = Self { ctrl: false, alt: false, shift: true, meta: true };

    /// `Cmd` on macOS, `Ctrl` everywhere else.
    pub fn ctrl_cmd(os: OperatingSystem) -> Self {
        if os.is_mac() { Self::META } else { Self::CTRL }
    }

    /// The Windows key on Windows, `Ctrl` everywhere else.
    pub fn win_ctrl(os: OperatingSystem) -> Self {
        if os.is_windows() { Self::META } else { Self::CTRL }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            ctrl: self.ctrl || other.ctrl,
            alt: self.alt || other.alt,
            shift: self.shift || other.shift,
            meta: self.meta || other.meta,
        }
    }
}

/// Named (non-character) keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Escape,
    Enter,
    Tab,
    Backspace,
    Delete,
    Insert,
    Space,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

impl NamedKey {
    fn from_name(name: &str) -> Option<Self> {
        let named = match name {
            "escape" | "esc" => NamedKey::Escape,
            "enter" | "return" => NamedKey::Enter,
            "tab" => NamedKey::Tab,
            "backspace" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "insert" | "ins" => NamedKey::Insert,
            "space" => NamedKey::Space,
            "up" | "arrowup" => NamedKey::ArrowUp,
            "down" | "arrowdown" => NamedKey::ArrowDown,
            "left" | "arrowleft" => NamedKey::ArrowLeft,
            "right" | "arrowright" => NamedKey::ArrowRight,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" => NamedKey::PageUp,
            "pagedown" => NamedKey::PageDown,
            other => {
                let n: u8 = other.strip_prefix('f')?.parse().ok()?;
                if (1..=24).contains(&n) {
                    NamedKey::F(n)
                } else {
                    return None;
                }
            }
        };
        Some(named)
    }

    fn name(&self) -> String {
        match self {
            NamedKey::Escape => "Escape".to_string(),
            NamedKey::Enter => "Enter".to_string(),
            NamedKey::Tab => "Tab".to_string(),
            NamedKey::Backspace => "Backspace".to_string(),
            NamedKey::Delete => "Delete".to_string(),
            NamedKey::Insert => "Insert".to_string(),
            NamedKey::Space => "Space".to_string(),
            NamedKey::ArrowUp => "Up".to_string(),
            NamedKey::ArrowDown => "Down".to_string(),
            NamedKey::ArrowLeft => "Left".to_string(),
            NamedKey::ArrowRight => "Right".to_string(),
            NamedKey::Home => "Home".to_string(),
            NamedKey::End => "End".to_string(),
            NamedKey::PageUp => "PageUp".to_string(),
            NamedKey::PageDown => "PageDown".to_string(),
            NamedKey::F(n) => format!("F{}", n),
        }
    }
}

/// Specification for a key (character or named key).
///
/// Characters are stored lowercased so `Ctrl+Z` and `Ctrl+z` are one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Named(NamedKey),
}

impl Key {
    pub fn char(c: char) -> Self {
        Self::Char(c.to_ascii_lowercase())
    }

    pub const fn named(n: NamedKey) -> Self {
        Self::Named(n)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Named(n) => write!(f, "{}", n.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("empty key binding")]
    Empty,

    #[error("no key specified (only modifiers) in {0:?}")]
    NoKey(String),

    #[error("unknown key: {0:?}")]
    UnknownKey(String),

    #[error("more than one key in {0:?}")]
    MultipleKeys(String),
}

/// A key combination (modifiers + key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl KeyCombo {
    pub const fn new(modifiers: Modifiers, key: Key) -> Self {
        Self { modifiers, key }
    }

    /// Parse `"Ctrl+Shift+Z"` style text, resolving portable modifiers for `os`.
    pub fn parse_for(text: &str, os: OperatingSystem) -> Result<Self, KeyParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(KeyParseError::Empty);
        }

        // `+` is both the separator and a key: "Ctrl++" / "+".
        let (mods_part, forced_key) = if text == "+" {
            ("", Some(Key::Char('+')))
        } else if let Some(rest) = text.strip_suffix("++") {
            (rest, Some(Key::Char('+')))
        } else {
            (text, None)
        };

        let mut modifiers = Modifiers::NONE;
        let mut key = forced_key;

        for part in mods_part.split('+').filter(|p| !p.is_empty()) {
            let lower = part.trim().to_lowercase();
            let modifier = match lower.as_str() {
                "ctrl" | "control" => Some(Modifiers::CTRL),
                "alt" | "option" | "opt" => Some(Modifiers::ALT),
                "shift" => Some(Modifiers::SHIFT),
                "meta" | "cmd" | "command" | "win" | "super" => Some(Modifiers::META),
                "ctrlcmd" => Some(Modifiers::ctrl_cmd(os)),
                "winctrl" => Some(Modifiers::win_ctrl(os)),
                _ => None,
            };
            if let Some(m) = modifier {
                modifiers = modifiers.union(m);
                continue;
            }

            if key.is_some() {
                return Err(KeyParseError::MultipleKeys(text.to_string()));
            }
            let mut chars = lower.chars();
            key = match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Key::char(c)),
                _ => Some(Key::Named(
                    NamedKey::from_name(&lower)
                        .ok_or_else(|| KeyParseError::UnknownKey(part.to_string()))?,
                )),
            };
        }

        let key = key.ok_or_else(|| KeyParseError::NoKey(text.to_string()))?;
        Ok(Self { modifiers, key })
    }

    /// Format for display, using macOS glyphs on the Mac (e.g., "⌘K", "Ctrl+C").
    pub fn display_for(&self, os: OperatingSystem) -> String {
        if !os.is_mac() {
            return self.to_string();
        }
        let mut result = String::new();
        if self.modifiers.ctrl {
            result.push('⌃');
        }
        if self.modifiers.alt {
            result.push('⌥');
        }
        if self.modifiers.shift {
            result.push('⇧');
        }
        if self.modifiers.meta {
            result.push('⌘');
        }
        result.push_str(&self.key.to_string());
        result
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.modifiers.alt {
            write!(f, "Alt+")?;
        }
        if self.modifiers.shift {
            write!(f, "Shift+")?;
        }
        if self.modifiers.meta {
            write!(f, "Meta+")?;
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for KeyCombo {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_for(s, OperatingSystem::current())
    }
}

/// A full key binding: one or more combos pressed in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyBinding {
    parts: Vec<KeyCombo>,
}

impl KeyBinding {
    pub fn single(combo: KeyCombo) -> Self {
        Self { parts: vec![combo] }
    }

    /// Parse whitespace-separated combos (`"Ctrl+K Ctrl+C"`) for `os`.
    pub fn parse_for(text: &str, os: OperatingSystem) -> Result<Self, KeyParseError> {
        let parts = text
            .split_whitespace()
            .map(|part| KeyCombo::parse_for(part, os))
            .collect::<Result<Vec<_>, _>>()?;
        if parts.is_empty() {
            return Err(KeyParseError::Empty);
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[KeyCombo] {
        &self.parts
    }

    /// True for multi-press sequences like `Ctrl+K Ctrl+C`.
    pub fn is_chord(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn display_for(&self, os: OperatingSystem) -> String {
        self.parts
            .iter()
            .map(|p| p.display_for(os))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<KeyCombo> for KeyBinding {
    fn from(combo: KeyCombo) -> Self {
        Self::single(combo)
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl FromStr for KeyBinding {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_for(s, OperatingSystem::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_combo() {
        let combo = KeyCombo::parse_for("Ctrl+Shift+Z", OperatingSystem::Linux).unwrap();
        assert_eq!(combo.modifiers, Modifiers::CTRL_SHIFT);
        assert_eq!(combo.key, Key::Char('z'));
    }

    #[test]
    fn test_ctrl_cmd_resolves_per_platform() {
        let mac = KeyCombo::parse_for("CtrlCmd+O", OperatingSystem::Mac).unwrap();
        let linux = KeyCombo::parse_for("CtrlCmd+O", OperatingSystem::Linux).unwrap();
        assert_eq!(mac.modifiers, Modifiers::META);
        assert_eq!(linux.modifiers, Modifiers::CTRL);
    }

    #[test]
    fn test_win_ctrl_resolves_per_platform() {
        let win = KeyCombo::parse_for("WinCtrl+R", OperatingSystem::Windows).unwrap();
        let mac = KeyCombo::parse_for("WinCtrl+R", OperatingSystem::Mac).unwrap();
        assert_eq!(win.modifiers, Modifiers::META);
        assert_eq!(mac.modifiers, Modifiers::CTRL);
    }

    #[test]
    fn test_case_insensitive_keys() {
        let a = KeyCombo::parse_for("ctrl+w", OperatingSystem::Linux).unwrap();
        let b = KeyCombo::parse_for("Ctrl+W", OperatingSystem::Linux).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_named_and_function_keys() {
        let esc = KeyCombo::parse_for("Esc", OperatingSystem::Linux).unwrap();
        assert_eq!(esc.key, Key::Named(NamedKey::Escape));
        let f5 = KeyCombo::parse_for("Shift+F5", OperatingSystem::Linux).unwrap();
        assert_eq!(f5.key, Key::Named(NamedKey::F(5)));
        assert!(KeyCombo::parse_for("F25", OperatingSystem::Linux).is_err());
    }

    #[test]
    fn test_plus_key() {
        let plus = KeyCombo::parse_for("Ctrl++", OperatingSystem::Linux).unwrap();
        assert_eq!(plus.modifiers, Modifiers::CTRL);
        assert_eq!(plus.key, Key::Char('+'));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(KeyCombo::parse_for("", OperatingSystem::Linux), Err(KeyParseError::Empty));
        assert!(matches!(
            KeyCombo::parse_for("Ctrl+Shift", OperatingSystem::Linux),
            Err(KeyParseError::NoKey(_))
        ));
        assert!(matches!(
            KeyCombo::parse_for("Ctrl+Banana", OperatingSystem::Linux),
            Err(KeyParseError::UnknownKey(_))
        ));
        assert!(matches!(
            KeyCombo::parse_for("A+B", OperatingSystem::Linux),
            Err(KeyParseError::MultipleKeys(_))
        ));
    }

    #[test]
    fn test_chord_display_roundtrip() {
        let binding = KeyBinding::parse_for("Ctrl+K Ctrl+C", OperatingSystem::Linux).unwrap();
        assert!(binding.is_chord());
        assert_eq!(binding.to_string(), "Ctrl+K Ctrl+C");
        let again = KeyBinding::parse_for(&binding.to_string(), OperatingSystem::Linux).unwrap();
        assert_eq!(binding, again);
    }

    #[test]
    fn test_mac_display_uses_glyphs() {
        let combo = KeyCombo::parse_for("Cmd+Shift+Z", OperatingSystem::Mac).unwrap();
        assert_eq!(combo.display_for(OperatingSystem::Mac), "⇧⌘Z");
        assert_eq!(combo.display_for(OperatingSystem::Linux), "Shift+Meta+Z");
    }
}
