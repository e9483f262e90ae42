//! Canonical key table and per-platform native code maps
//!
//! Every row pairs a canonical code string (the web `KeyboardEvent.code`
//! name) with the native code reported by each platform's hook:
//! macOS virtual key codes, Linux evdev `KEY_*` codes and Windows
//! virtual-key codes. `_` marks a key the platform does not report.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::{LogicalKey, Side};

/// Windows reports keypad Enter as `VK_RETURN` with the extended flag;
/// the hook folds the flag into this bit.
pub const WINDOWS_EXTENDED: u32 = 0x100;

macro_rules! native {
    (_) => {
        None
    };
    ($code:literal) => {
        Some($code)
    };
}

macro_rules! key_table {
    ($( $key:ident [$mac:tt, $evdev:tt, $win:tt] ),* $(,)?) => {
        /// Base identity of a physical key.
        ///
        /// Left and right modifiers share one variant; the side lives in
        /// [`LogicalKey`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Key {
            $( $key, )*
            Control,
            Shift,
            Alt,
            Meta,
        }

        const PLAIN_KEYS: &[Entry] = &[
            $(
                Entry {
                    code: stringify!($key),
                    key: LogicalKey::new(Key::$key),
                    mac: native!($mac),
                    evdev: native!($evdev),
                    windows: native!($win),
                },
            )*
        ];
    };
}

/// One row of the key table
struct Entry {
    code: &'static str,
    key: LogicalKey,
    mac: Option<u32>,
    evdev: Option<u32>,
    windows: Option<u32>,
}

key_table! {
    KeyA [0x00, 30, 0x41],
    KeyB [0x0B, 48, 0x42],
    KeyC [0x08, 46, 0x43],
    KeyD [0x02, 32, 0x44],
    KeyE [0x0E, 18, 0x45],
    KeyF [0x03, 33, 0x46],
    KeyG [0x05, 34, 0x47],
    KeyH [0x04, 35, 0x48],
    KeyI [0x22, 23, 0x49],
    KeyJ [0x26, 36, 0x4A],
    KeyK [0x28, 37, 0x4B],
    KeyL [0x25, 38, 0x4C],
    KeyM [0x2E, 50, 0x4D],
    KeyN [0x2D, 49, 0x4E],
    KeyO [0x1F, 24, 0x4F],
    KeyP [0x23, 25, 0x50],
    KeyQ [0x0C, 16, 0x51],
    KeyR [0x0F, 19, 0x52],
    KeyS [0x01, 31, 0x53],
    KeyT [0x11, 20, 0x54],
    KeyU [0x20, 22, 0x55],
    KeyV [0x09, 47, 0x56],
    KeyW [0x0D, 17, 0x57],
    KeyX [0x07, 45, 0x58],
    KeyY [0x10, 21, 0x59],
    KeyZ [0x06, 44, 0x5A],
    Digit1 [0x12, 2, 0x31],
    Digit2 [0x13, 3, 0x32],
    Digit3 [0x14, 4, 0x33],
    Digit4 [0x15, 5, 0x34],
    Digit5 [0x17, 6, 0x35],
    Digit6 [0x16, 7, 0x36],
    Digit7 [0x1A, 8, 0x37],
    Digit8 [0x1C, 9, 0x38],
    Digit9 [0x19, 10, 0x39],
    Digit0 [0x1D, 11, 0x30],
    Minus [0x1B, 12, 0xBD],
    Equal [0x18, 13, 0xBB],
    BracketLeft [0x21, 26, 0xDB],
    BracketRight [0x1E, 27, 0xDD],
    Backslash [0x2A, 43, 0xDC],
    Semicolon [0x29, 39, 0xBA],
    Quote [0x27, 40, 0xDE],
    Backquote [0x32, 41, 0xC0],
    Comma [0x2B, 51, 0xBC],
    Period [0x2F, 52, 0xBE],
    Slash [0x2C, 53, 0xBF],
    Enter [0x24, 28, 0x0D],
    Escape [0x35, 1, 0x1B],
    Backspace [0x33, 14, 0x08],
    Tab [0x30, 15, 0x09],
    Space [0x31, 57, 0x20],
    CapsLock [0x39, 58, 0x14],
    F1 [0x7A, 59, 0x70],
    F2 [0x78, 60, 0x71],
    F3 [0x63, 61, 0x72],
    F4 [0x76, 62, 0x73],
    F5 [0x60, 63, 0x74],
    F6 [0x61, 64, 0x75],
    F7 [0x62, 65, 0x76],
    F8 [0x64, 66, 0x77],
    F9 [0x65, 67, 0x78],
    F10 [0x6D, 68, 0x79],
    F11 [0x67, 87, 0x7A],
    F12 [0x6F, 88, 0x7B],
    F13 [0x69, 183, 0x7C],
    F14 [0x6B, 184, 0x7D],
    F15 [0x71, 185, 0x7E],
    F16 [0x6A, 186, 0x7F],
    F17 [0x40, 187, 0x80],
    F18 [0x4F, 188, 0x81],
    F19 [0x50, 189, 0x82],
    F20 [0x5A, 190, 0x83],
    F21 [_, 191, 0x84],
    F22 [_, 192, 0x85],
    F23 [_, 193, 0x86],
    F24 [_, 194, 0x87],
    PrintScreen [_, 99, 0x2C],
    ScrollLock [_, 70, 0x91],
    Pause [_, 119, 0x13],
    Insert [_, 110, 0x2D],
    Home [0x73, 102, 0x24],
    PageUp [0x74, 104, 0x21],
    Delete [0x75, 111, 0x2E],
    End [0x77, 107, 0x23],
    PageDown [0x79, 109, 0x22],
    ArrowRight [0x7C, 106, 0x27],
    ArrowLeft [0x7B, 105, 0x25],
    ArrowDown [0x7D, 108, 0x28],
    ArrowUp [0x7E, 103, 0x26],
    NumLock [0x47, 69, 0x90],
    NumpadDivide [0x4B, 98, 0x6F],
    NumpadMultiply [0x43, 55, 0x6A],
    NumpadSubtract [0x4E, 74, 0x6D],
    NumpadAdd [0x45, 78, 0x6B],
    NumpadEnter [0x4C, 96, 0x10D],
    Numpad1 [0x53, 79, 0x61],
    Numpad2 [0x54, 80, 0x62],
    Numpad3 [0x55, 81, 0x63],
    Numpad4 [0x56, 75, 0x64],
    Numpad5 [0x57, 76, 0x65],
    Numpad6 [0x58, 77, 0x66],
    Numpad7 [0x59, 71, 0x67],
    Numpad8 [0x5B, 72, 0x68],
    Numpad9 [0x5C, 73, 0x69],
    Numpad0 [0x52, 82, 0x60],
    NumpadDecimal [0x41, 83, 0x6E],
    IntlBackslash [0x0A, 86, 0xE2],
    ContextMenu [0x6E, 127, 0x5D],
    NumpadEqual [0x51, 117, 0x92],
    Power [_, 116, _],
    Help [0x72, 138, 0x2F],
    Undo [_, 131, _],
    Cut [_, 137, _],
    Copy [_, 133, _],
    Paste [_, 135, _],
    AudioVolumeMute [0x4A, 113, 0xAD],
    AudioVolumeUp [0x48, 115, 0xAF],
    AudioVolumeDown [0x49, 114, 0xAE],
    NumpadComma [0x5F, 121, 0xC2],
    IntlRo [0x5E, 89, 0xC1],
    KanaMode [_, 93, 0x15],
    IntlYen [0x5D, 124, _],
    Convert [_, 92, 0x1C],
    NonConvert [_, 94, 0x1D],
    Lang1 [0x68, 122, _],
    Lang2 [0x66, 123, _],
    Lang3 [_, 90, _],
    Lang4 [_, 91, _],
    MediaTrackNext [_, 163, 0xB0],
    MediaTrackPrevious [_, 165, 0xB1],
    MediaStop [_, 166, 0xB2],
    Eject [_, 161, _],
    MediaPlayPause [_, 164, 0xB3],
    MediaSelect [_, 226, 0xB5],
    LaunchMail [_, 155, 0xB4],
    LaunchApp2 [_, 140, 0xB7],
    LaunchApp1 [_, 144, 0xB6],
    BrowserSearch [_, 217, 0xAA],
    BrowserHome [_, 172, 0xAC],
    BrowserBack [_, 158, 0xA6],
    BrowserForward [_, 159, 0xA7],
    BrowserStop [_, 128, 0xA9],
    BrowserRefresh [_, 173, 0xA8],
    BrowserFavorites [_, 156, 0xAB],
    Sleep [_, 142, 0x5F],
    WakeUp [_, 143, _],
}

/// Side-specific modifiers carry native codes; merged ones only exist
/// as registration targets.
const MODIFIER_KEYS: &[Entry] = &[
    modifier("ControlLeft", Key::Control, Some(Side::Left), [0x3B, 29, 0xA2]),
    modifier("ControlRight", Key::Control, Some(Side::Right), [0x3E, 97, 0xA3]),
    modifier("ShiftLeft", Key::Shift, Some(Side::Left), [0x38, 42, 0xA0]),
    modifier("ShiftRight", Key::Shift, Some(Side::Right), [0x3C, 54, 0xA1]),
    modifier("AltLeft", Key::Alt, Some(Side::Left), [0x3A, 56, 0xA4]),
    modifier("AltRight", Key::Alt, Some(Side::Right), [0x3D, 100, 0xA5]),
    modifier("MetaLeft", Key::Meta, Some(Side::Left), [0x37, 125, 0x5B]),
    modifier("MetaRight", Key::Meta, Some(Side::Right), [0x36, 126, 0x5C]),
    merged("Control", Key::Control),
    merged("Shift", Key::Shift),
    merged("Alt", Key::Alt),
    merged("Meta", Key::Meta),
];

const fn modifier(code: &'static str, key: Key, side: Option<Side>, native: [u32; 3]) -> Entry {
    Entry {
        code,
        key: LogicalKey { key, side },
        mac: Some(native[0]),
        evdev: Some(native[1]),
        windows: Some(native[2]),
    }
}

const fn merged(code: &'static str, key: Key) -> Entry {
    Entry {
        code,
        key: LogicalKey::new(key),
        mac: None,
        evdev: None,
        windows: None,
    }
}

fn entries() -> impl Iterator<Item = &'static Entry> {
    PLAIN_KEYS.iter().chain(MODIFIER_KEYS.iter())
}

/// All canonical code strings, in table order
pub fn codes() -> impl Iterator<Item = &'static str> {
    entries().map(|entry| entry.code)
}

pub(super) fn by_code(code: &str) -> Option<LogicalKey> {
    static INDEX: OnceLock<HashMap<&'static str, LogicalKey>> = OnceLock::new();
    INDEX
        .get_or_init(|| entries().map(|entry| (entry.code, entry.key)).collect())
        .get(code)
        .copied()
}

pub(super) fn code_of(key: LogicalKey) -> Option<&'static str> {
    static INDEX: OnceLock<HashMap<LogicalKey, &'static str>> = OnceLock::new();
    INDEX
        .get_or_init(|| entries().map(|entry| (entry.key, entry.code)).collect())
        .get(&key)
        .copied()
}

/// Which platform's native code space a hook reports in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keymap {
    /// macOS virtual key codes (`kVK_*`)
    MacOs,
    /// Linux input event codes (`KEY_*`)
    Evdev,
    /// Windows virtual-key codes (`VK_*`), extended Enter folded in
    Windows,
}

impl Keymap {
    /// The code space of the platform this binary was built for
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            Keymap::MacOs
        } else if cfg!(target_os = "windows") {
            Keymap::Windows
        } else {
            Keymap::Evdev
        }
    }

    /// Map a native code to its side-resolved logical key
    ///
    /// Returns `None` for codes outside the table; callers report them.
    pub fn lookup(self, code: u32) -> Option<LogicalKey> {
        self.index().get(&code).copied()
    }

    /// Native code for a key, if this platform reports it
    ///
    /// Merged modifiers have no native code of their own.
    pub fn native_code(self, key: LogicalKey) -> Option<u32> {
        entries()
            .find(|entry| entry.key == key)
            .and_then(|entry| self.column(entry))
    }

    fn column(self, entry: &Entry) -> Option<u32> {
        match self {
            Keymap::MacOs => entry.mac,
            Keymap::Evdev => entry.evdev,
            Keymap::Windows => entry.windows,
        }
    }

    fn index(self) -> &'static HashMap<u32, LogicalKey> {
        static MAC: OnceLock<HashMap<u32, LogicalKey>> = OnceLock::new();
        static EVDEV: OnceLock<HashMap<u32, LogicalKey>> = OnceLock::new();
        static WINDOWS: OnceLock<HashMap<u32, LogicalKey>> = OnceLock::new();

        let cell = match self {
            Keymap::MacOs => &MAC,
            Keymap::Evdev => &EVDEV,
            Keymap::Windows => &WINDOWS,
        };

        cell.get_or_init(|| {
            entries()
                .filter_map(|entry| self.column(entry).map(|code| (code, entry.key)))
                .collect()
        })
    }
}
