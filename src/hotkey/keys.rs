//! Hotkey strings, modifier names and Linux key codes
//!
//! A hotkey string is `(<modifier>+)*<key>`: case-insensitive, `+`-delimited,
//! whitespace around tokens ignored. Examples: `ctrl+shift+r`, `super+F9`,
//! `altgr+comma`, `scrolllock`.

use self::code::*;
use std::collections::HashMap;
use std::fmt;

/// Side-specific modifier names as tracked in modifier state
pub const SIDE_MODIFIERS: [&str; 8] = [
    "leftctrl",
    "rightctrl",
    "leftshift",
    "rightshift",
    "leftalt",
    "rightalt",
    "leftmeta",
    "rightmeta",
];

/// Generic modifier names accepted in hotkey strings
const GENERIC_MODIFIERS: [&str; 9] = [
    "ctrl", "control", "alt", "altgr", "shift", "super", "meta", "win", "hyper",
];

/// A parsed hotkey: zero or more modifiers plus one main key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCombination {
    /// Lower-cased modifier names in the order they were written
    pub modifiers: Vec<String>,
    /// Lower-cased main key name (empty for an empty hotkey string)
    pub key: String,
}

impl KeyCombination {
    /// Whether this combination has no modifiers
    pub fn is_bare(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Check a key-down of `key` against the given modifier state
    ///
    /// Every modifier of the combination must be held. Modifiers held in
    /// addition to those are not checked.
    pub fn matches(&self, key: &str, modifiers: &HashMap<String, bool>) -> bool {
        if self.key.is_empty() || !self.key.eq_ignore_ascii_case(key) {
            return false;
        }
        self.modifiers
            .iter()
            .all(|m| modifier_pressed(m, modifiers))
    }
}

impl fmt::Display for KeyCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", m)?;
        }
        write!(f, "{}", self.key)
    }
}

/// Parse a hotkey string into modifiers and key
///
/// Total: never fails. The last `+`-separated token is the key, all earlier
/// non-empty tokens are modifiers.
pub fn parse_hotkey(hotkey: &str) -> KeyCombination {
    let mut tokens: Vec<String> = hotkey
        .split('+')
        .map(|t| t.trim().to_lowercase())
        .collect();

    let key = tokens.pop().map(|k| canonical_key(&k)).unwrap_or_default();

    let mut modifiers: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens.iter().filter(|t| !t.is_empty()) {
        let token = canonical_key(token);
        if !modifiers.contains(&token) {
            modifiers.push(token);
        }
    }

    KeyCombination { modifiers, key }
}

/// Normalize a hotkey string so equivalent spellings compare equal
///
/// `" Ctrl + Shift + R "` becomes `"ctrl+shift+r"`.
pub fn normalize_hotkey(hotkey: &str) -> String {
    parse_hotkey(hotkey).to_string()
}

/// Whether `name` is a modifier (generic or side-specific), case-insensitive
pub fn is_modifier(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    GENERIC_MODIFIERS.contains(&name.as_str()) || SIDE_MODIFIERS.contains(&name.as_str())
}

/// Whether a (possibly generic) modifier is currently held
///
/// Generic names match either physical side; `altgr` matches only the
/// right Alt key.
pub fn modifier_pressed(modifier: &str, state: &HashMap<String, bool>) -> bool {
    let held = |name: &str| state.get(name).copied().unwrap_or(false);

    match modifier {
        "ctrl" | "control" => held("leftctrl") || held("rightctrl"),
        "shift" => held("leftshift") || held("rightshift"),
        "alt" => held("leftalt") || held("rightalt"),
        "altgr" => held("rightalt"),
        "super" | "meta" | "win" | "hyper" => held("leftmeta") || held("rightmeta"),
        side => held(side),
    }
}

/// Build the canonical hotkey string for a key-down under the given modifier state
///
/// Modifiers are emitted as `ctrl`, `alt`, `altgr`, `shift`, `super` in that
/// order. Left Alt is `alt`; right Alt is `altgr`.
pub fn combination_string(key: &str, state: &HashMap<String, bool>) -> String {
    let held = |name: &str| state.get(name).copied().unwrap_or(false);
    let mut parts: Vec<&str> = Vec::new();

    if held("leftctrl") || held("rightctrl") {
        parts.push("ctrl");
    }
    if held("leftalt") {
        parts.push("alt");
    }
    if held("rightalt") {
        parts.push("altgr");
    }
    if held("leftshift") || held("rightshift") {
        parts.push("shift");
    }
    if held("leftmeta") || held("rightmeta") {
        parts.push("super");
    }
    parts.push(key);

    parts.join("+")
}

/// Map alternative spellings of a key to the name used by [`key_name`]
pub fn canonical_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "esc" => "escape",
        "return" => "enter",
        "dot" => "period",
        "del" => "delete",
        "spacebar" => "space",
        "backtick" => "grave",
        "scroll_lock" => "scrolllock",
        "caps_lock" => "capslock",
        "num_lock" => "numlock",
        "pgup" => "pageup",
        "pgdn" => "pagedown",
        "lctrl" => "leftctrl",
        "rctrl" => "rightctrl",
        "lshift" => "leftshift",
        "rshift" => "rightshift",
        "lalt" => "leftalt",
        "ralt" => "rightalt",
        "lmeta" => "leftmeta",
        "rmeta" => "rightmeta",
        other => other,
    };
    canonical.to_string()
}

/// Linux input key codes, as in `linux/input-event-codes.h`
///
/// Named after the kernel's `KEY_*` constants so they line up with
/// `evdev::Key::KEY_*` on Linux. Only the codes the hotkey grammar knows
/// about are listed; letter and digit rows are given by their ends.
pub mod code {
    pub const KEY_ESC: u16 = 1;
    pub const KEY_1: u16 = 2;
    pub const KEY_0: u16 = 11;
    pub const KEY_MINUS: u16 = 12;
    pub const KEY_EQUAL: u16 = 13;
    pub const KEY_BACKSPACE: u16 = 14;
    pub const KEY_TAB: u16 = 15;
    pub const KEY_Q: u16 = 16;
    pub const KEY_R: u16 = 19;
    pub const KEY_P: u16 = 25;
    pub const KEY_LEFTBRACE: u16 = 26;
    pub const KEY_RIGHTBRACE: u16 = 27;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_A: u16 = 30;
    pub const KEY_L: u16 = 38;
    pub const KEY_SEMICOLON: u16 = 39;
    pub const KEY_APOSTROPHE: u16 = 40;
    pub const KEY_GRAVE: u16 = 41;
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_BACKSLASH: u16 = 43;
    pub const KEY_Z: u16 = 44;
    pub const KEY_C: u16 = 46;
    pub const KEY_M: u16 = 50;
    pub const KEY_COMMA: u16 = 51;
    pub const KEY_DOT: u16 = 52;
    pub const KEY_SLASH: u16 = 53;
    pub const KEY_RIGHTSHIFT: u16 = 54;
    pub const KEY_KPASTERISK: u16 = 55;
    pub const KEY_LEFTALT: u16 = 56;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_CAPSLOCK: u16 = 58;
    pub const KEY_F1: u16 = 59;
    pub const KEY_F9: u16 = 67;
    pub const KEY_F10: u16 = 68;
    pub const KEY_NUMLOCK: u16 = 69;
    pub const KEY_SCROLLLOCK: u16 = 70;
    pub const KEY_F11: u16 = 87;
    pub const KEY_F12: u16 = 88;
    pub const KEY_KPENTER: u16 = 96;
    pub const KEY_RIGHTCTRL: u16 = 97;
    pub const KEY_SYSRQ: u16 = 99;
    pub const KEY_RIGHTALT: u16 = 100;
    pub const KEY_HOME: u16 = 102;
    pub const KEY_UP: u16 = 103;
    pub const KEY_PAGEUP: u16 = 104;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_END: u16 = 107;
    pub const KEY_DOWN: u16 = 108;
    pub const KEY_PAGEDOWN: u16 = 109;
    pub const KEY_INSERT: u16 = 110;
    pub const KEY_DELETE: u16 = 111;
    pub const KEY_MUTE: u16 = 113;
    pub const KEY_VOLUMEDOWN: u16 = 114;
    pub const KEY_VOLUMEUP: u16 = 115;
    pub const KEY_PAUSE: u16 = 119;
    pub const KEY_LEFTMETA: u16 = 125;
    pub const KEY_RIGHTMETA: u16 = 126;
    pub const KEY_COMPOSE: u16 = 127;
    pub const KEY_NEXTSONG: u16 = 163;
    pub const KEY_PLAYPAUSE: u16 = 164;
    pub const KEY_PREVIOUSSONG: u16 = 165;
    pub const KEY_F13: u16 = 183;
    pub const KEY_F24: u16 = 194;
}

/// Side-specific modifier name for a key code, if it is a modifier key
pub fn modifier_name(code: u16) -> Option<&'static str> {
    match code {
        KEY_LEFTCTRL => Some("leftctrl"),
        KEY_RIGHTCTRL => Some("rightctrl"),
        KEY_LEFTSHIFT => Some("leftshift"),
        KEY_RIGHTSHIFT => Some("rightshift"),
        KEY_LEFTALT => Some("leftalt"),
        KEY_RIGHTALT => Some("rightalt"),
        KEY_LEFTMETA => Some("leftmeta"),
        KEY_RIGHTMETA => Some("rightmeta"),
        _ => None,
    }
}

/// Name of a Linux input key code
pub fn key_name(code: u16) -> Option<&'static str> {
    if let Some(m) = modifier_name(code) {
        return Some(m);
    }

    const LETTERS_QP: [&str; 10] = ["q", "w", "e", "r", "t", "y", "u", "i", "o", "p"];
    const LETTERS_AL: [&str; 9] = ["a", "s", "d", "f", "g", "h", "j", "k", "l"];
    const LETTERS_ZM: [&str; 7] = ["z", "x", "c", "v", "b", "n", "m"];
    const DIGITS: [&str; 10] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "0"];
    const F1_F10: [&str; 10] = ["f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10"];
    const F13_F24: [&str; 12] = [
        "f13", "f14", "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24",
    ];

    let name = match code {
        KEY_ESC => "escape",
        KEY_1..=KEY_0 => DIGITS[(code - KEY_1) as usize],
        KEY_MINUS => "minus",
        KEY_EQUAL => "equal",
        KEY_BACKSPACE => "backspace",
        KEY_TAB => "tab",
        KEY_Q..=KEY_P => LETTERS_QP[(code - KEY_Q) as usize],
        KEY_LEFTBRACE => "leftbrace",
        KEY_RIGHTBRACE => "rightbrace",
        KEY_ENTER => "enter",
        KEY_A..=KEY_L => LETTERS_AL[(code - KEY_A) as usize],
        KEY_SEMICOLON => "semicolon",
        KEY_APOSTROPHE => "apostrophe",
        KEY_GRAVE => "grave",
        KEY_BACKSLASH => "backslash",
        KEY_Z..=KEY_M => LETTERS_ZM[(code - KEY_Z) as usize],
        KEY_COMMA => "comma",
        KEY_DOT => "period",
        KEY_SLASH => "slash",
        KEY_KPASTERISK => "kpasterisk",
        KEY_SPACE => "space",
        KEY_CAPSLOCK => "capslock",
        KEY_F1..=KEY_F10 => F1_F10[(code - KEY_F1) as usize],
        KEY_NUMLOCK => "numlock",
        KEY_SCROLLLOCK => "scrolllock",
        KEY_F11 => "f11",
        KEY_F12 => "f12",
        KEY_KPENTER => "kpenter",
        KEY_SYSRQ => "sysrq",
        KEY_HOME => "home",
        KEY_UP => "up",
        KEY_PAGEUP => "pageup",
        KEY_LEFT => "left",
        KEY_RIGHT => "right",
        KEY_END => "end",
        KEY_DOWN => "down",
        KEY_PAGEDOWN => "pagedown",
        KEY_INSERT => "insert",
        KEY_DELETE => "delete",
        KEY_MUTE => "mute",
        KEY_VOLUMEDOWN => "volumedown",
        KEY_VOLUMEUP => "volumeup",
        KEY_PAUSE => "pause",
        KEY_COMPOSE => "compose",
        KEY_NEXTSONG => "nextsong",
        KEY_PLAYPAUSE => "playpause",
        KEY_PREVIOUSSONG => "previoussong",
        KEY_F13..=KEY_F24 => F13_F24[(code - KEY_F13) as usize],
        _ => return None,
    };
    Some(name)
}

/// Reverse of [`key_name`], accepting the aliases of [`canonical_key`]
pub fn key_code(name: &str) -> Option<u16> {
    let wanted = canonical_key(name);
    (1..=255u16).find(|&code| key_name(code) == Some(wanted.as_str()))
}

/// Whether a key is an ordinary typing key (letters, digits, punctuation, whitespace)
pub fn is_typing_key(key: &str) -> bool {
    let key = canonical_key(key);
    if key.chars().count() == 1 {
        return true;
    }
    matches!(
        key.as_str(),
        "space"
            | "enter"
            | "tab"
            | "backspace"
            | "minus"
            | "equal"
            | "leftbrace"
            | "rightbrace"
            | "semicolon"
            | "apostrophe"
            | "grave"
            | "backslash"
            | "comma"
            | "period"
            | "slash"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pressed: &[&str]) -> HashMap<String, bool> {
        pressed.iter().map(|k| (k.to_string(), true)).collect()
    }

    #[test]
    fn test_parse_single_key() {
        let combo = parse_hotkey("a");
        assert_eq!(combo.key, "a");
        assert!(combo.modifiers.is_empty());
    }

    #[test]
    fn test_parse_trims_and_lowercases() {
        let combo = parse_hotkey(" ctrl + shift + r ");
        assert_eq!(combo.key, "r");
        assert_eq!(combo.modifiers, vec!["ctrl", "shift"]);

        let combo = parse_hotkey("CTRL+Alt+F9");
        assert_eq!(combo.key, "f9");
        assert_eq!(combo.modifiers, vec!["ctrl", "alt"]);
    }

    #[test]
    fn test_parse_empty_is_degenerate() {
        let combo = parse_hotkey("");
        assert_eq!(combo.key, "");
        assert!(combo.modifiers.is_empty());
        assert!(!combo.matches("", &HashMap::new()));
    }

    #[test]
    fn test_parse_key_aliases() {
        assert_eq!(parse_hotkey("ctrl+esc").key, "escape");
        assert_eq!(parse_hotkey("super+Return").key, "enter");
    }

    #[test]
    fn test_normalize_hotkey() {
        assert_eq!(normalize_hotkey(" Ctrl + Shift + R "), "ctrl+shift+r");
        assert_eq!(normalize_hotkey("ctrl+ctrl+r"), "ctrl+r");
    }

    #[test]
    fn test_is_modifier_case_insensitive() {
        assert!(is_modifier("CTRL"));
        assert!(is_modifier("ctrl"));
        assert!(is_modifier("AltGr"));
        assert!(is_modifier("rightalt"));
        assert!(!is_modifier("a"));
        assert!(!is_modifier("f1"));
    }

    #[test]
    fn test_generic_modifier_matches_either_side() {
        assert!(modifier_pressed("ctrl", &state(&["leftctrl"])));
        assert!(modifier_pressed("ctrl", &state(&["rightctrl"])));
        assert!(modifier_pressed("super", &state(&["rightmeta"])));
        assert!(!modifier_pressed("shift", &state(&["leftctrl"])));
    }

    #[test]
    fn test_altgr_matches_right_alt_only() {
        assert!(modifier_pressed("altgr", &state(&["rightalt"])));
        assert!(!modifier_pressed("altgr", &state(&["leftalt"])));
        assert!(modifier_pressed("alt", &state(&["rightalt"])));
    }

    #[test]
    fn test_matches_requires_all_modifiers() {
        let combo = parse_hotkey("ctrl+shift+r");
        assert!(combo.matches("r", &state(&["leftctrl", "rightshift"])));
        assert!(combo.matches("R", &state(&["leftctrl", "leftshift"])));
        assert!(!combo.matches("r", &state(&["leftctrl"])));
        assert!(!combo.matches("t", &state(&["leftctrl", "leftshift"])));
    }

    #[test]
    fn test_released_modifier_not_pressed() {
        let mut s = state(&["leftctrl"]);
        s.insert("leftctrl".into(), false);
        assert!(!modifier_pressed("ctrl", &s));
    }

    #[test]
    fn test_key_name_table() {
        assert_eq!(key_name(KEY_ESC), Some("escape"));
        assert_eq!(key_name(KEY_R), Some("r"));
        assert_eq!(key_name(KEY_A), Some("a"));
        assert_eq!(key_name(KEY_M), Some("m"));
        assert_eq!(key_name(KEY_0), Some("0"));
        assert_eq!(key_name(KEY_SPACE), Some("space"));
        assert_eq!(key_name(KEY_F12), Some("f12"));
        assert_eq!(key_name(KEY_F24), Some("f24"));
        assert_eq!(key_name(KEY_RIGHTALT), Some("rightalt"));
        assert_eq!(key_name(400), None);
    }

    #[test]
    fn test_key_code_reverse() {
        assert_eq!(key_code("r"), Some(KEY_R));
        assert_eq!(key_code("ESC"), Some(KEY_ESC));
        assert_eq!(key_code("scrolllock"), Some(KEY_SCROLLLOCK));
        assert_eq!(key_code("f9"), Some(KEY_F9));
        assert_eq!(key_code("nosuchkey"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_codes_agree_with_evdev() {
        use evdev::Key;

        let pairs = [
            (KEY_ESC, Key::KEY_ESC),
            (KEY_1, Key::KEY_1),
            (KEY_0, Key::KEY_0),
            (KEY_Q, Key::KEY_Q),
            (KEY_R, Key::KEY_R),
            (KEY_P, Key::KEY_P),
            (KEY_A, Key::KEY_A),
            (KEY_L, Key::KEY_L),
            (KEY_Z, Key::KEY_Z),
            (KEY_C, Key::KEY_C),
            (KEY_M, Key::KEY_M),
            (KEY_DOT, Key::KEY_DOT),
            (KEY_SPACE, Key::KEY_SPACE),
            (KEY_F1, Key::KEY_F1),
            (KEY_F9, Key::KEY_F9),
            (KEY_F10, Key::KEY_F10),
            (KEY_F11, Key::KEY_F11),
            (KEY_F12, Key::KEY_F12),
            (KEY_F13, Key::KEY_F13),
            (KEY_F24, Key::KEY_F24),
            (KEY_SCROLLLOCK, Key::KEY_SCROLLLOCK),
            (KEY_PAUSE, Key::KEY_PAUSE),
            (KEY_DELETE, Key::KEY_DELETE),
            (KEY_PLAYPAUSE, Key::KEY_PLAYPAUSE),
            (KEY_LEFTCTRL, Key::KEY_LEFTCTRL),
            (KEY_RIGHTCTRL, Key::KEY_RIGHTCTRL),
            (KEY_LEFTSHIFT, Key::KEY_LEFTSHIFT),
            (KEY_RIGHTSHIFT, Key::KEY_RIGHTSHIFT),
            (KEY_LEFTALT, Key::KEY_LEFTALT),
            (KEY_RIGHTALT, Key::KEY_RIGHTALT),
            (KEY_LEFTMETA, Key::KEY_LEFTMETA),
            (KEY_RIGHTMETA, Key::KEY_RIGHTMETA),
        ];
        for (ours, theirs) in pairs {
            assert_eq!(ours, theirs.code(), "{:?}", theirs);
        }
    }

    #[test]
    fn test_combination_string_canonical_order() {
        let s = state(&["leftshift", "rightctrl", "leftmeta"]);
        assert_eq!(combination_string("r", &s), "ctrl+shift+super+r");
        assert_eq!(combination_string("comma", &state(&["rightalt"])), "altgr+comma");
        assert_eq!(combination_string("f9", &HashMap::new()), "f9");
    }

    #[test]
    fn test_combination_string_round_trips_through_parse() {
        let s = state(&["leftctrl", "leftalt"]);
        let combo = parse_hotkey(&combination_string("d", &s));
        assert!(combo.matches("d", &s));
    }

    #[test]
    fn test_is_typing_key() {
        assert!(is_typing_key("a"));
        assert!(is_typing_key("7"));
        assert!(is_typing_key("space"));
        assert!(is_typing_key("comma"));
        assert!(!is_typing_key("f13"));
        assert!(!is_typing_key("scrolllock"));
        assert!(!is_typing_key("pause"));
    }
}
