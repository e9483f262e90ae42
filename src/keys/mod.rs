//! Logical key model
//!
//! A [`LogicalKey`] is a base [`Key`] plus an optional [`Side`]. Native
//! codes always resolve to the side-specific identity (`ShiftLeft`),
//! while registrations may name either that or the merged modifier
//! (`Shift`), which matches both sides.

mod table;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

pub use table::{codes, Key, Keymap, WINDOWS_EXTENDED};

/// Physical side of a modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Right,
}

/// Canonical identity of a physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
    key: Key,
    side: Option<Side>,
}

impl LogicalKey {
    /// A key without a side tag
    pub const fn new(key: Key) -> Self {
        Self { key, side: None }
    }

    /// A side-specific modifier; `None` for keys that have no sides
    pub fn sided(key: Key, side: Side) -> Option<Self> {
        key.is_modifier().then_some(Self {
            key,
            side: Some(side),
        })
    }

    pub fn key(self) -> Key {
        self.key
    }

    pub fn side(self) -> Option<Side> {
        self.side
    }

    pub fn is_modifier(self) -> bool {
        self.key.is_modifier()
    }

    /// Stable numeric id, distinct for merged and side-specific keys
    pub fn id(self) -> u16 {
        let side = match self.side {
            None => 0,
            Some(Side::Left) => 1,
            Some(Side::Right) => 2,
        };
        ((self.key as u16) << 2) | side
    }

    /// Collapse left/right variants onto the merged key
    pub fn normalize(self) -> Self {
        Self::new(self.key)
    }

    /// Whether a held key satisfies this key as a combination member
    ///
    /// A merged member accepts either side; a side-specific member only
    /// its own side.
    pub fn matches(self, held: LogicalKey) -> bool {
        self.key == held.key && (self.side.is_none() || self.side == held.side)
    }

    /// Canonical code string (`"ShiftLeft"`, `"KeyA"`, ...)
    pub fn code(self) -> &'static str {
        // every constructible key has a table row
        table::code_of(self).unwrap_or("Unidentified")
    }
}

impl Key {
    pub fn is_modifier(self) -> bool {
        matches!(self, Key::Control | Key::Shift | Key::Alt | Key::Meta)
    }
}

impl FromStr for LogicalKey {
    type Err = ValidationError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        table::by_code(code).ok_or_else(|| ValidationError::UnknownKey(code.to_string()))
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether `code` names a key in the canonical table
pub fn is_valid_code(code: &str) -> bool {
    table::by_code(code).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_codes() {
        let key: LogicalKey = "KeyA".parse().unwrap();
        assert_eq!(key.key(), Key::KeyA);
        assert_eq!(key.side(), None);

        let key: LogicalKey = "ControlRight".parse().unwrap();
        assert_eq!(key.key(), Key::Control);
        assert_eq!(key.side(), Some(Side::Right));

        let key: LogicalKey = "Meta".parse().unwrap();
        assert_eq!(key, LogicalKey::new(Key::Meta));
    }

    #[test]
    fn test_unknown_code_is_rejected() {
        let err = "NotAKey".parse::<LogicalKey>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownKey("NotAKey".into()));
        assert!(!is_valid_code("NotAKey"));
        assert!(!is_valid_code("shift"));
        assert!(is_valid_code("Shift"));
    }

    #[test]
    fn test_every_code_round_trips() {
        for code in codes() {
            let key: LogicalKey = code.parse().unwrap();
            assert_eq!(key.code(), code);
        }
    }

    #[test]
    fn test_merged_matches_both_sides() {
        let shift = LogicalKey::new(Key::Shift);
        let left = LogicalKey::sided(Key::Shift, Side::Left).unwrap();
        let right = LogicalKey::sided(Key::Shift, Side::Right).unwrap();

        assert!(shift.matches(left));
        assert!(shift.matches(right));
        assert!(left.matches(left));
        assert!(!left.matches(right));
        assert!(!shift.matches(LogicalKey::new(Key::Space)));
    }

    #[test]
    fn test_sided_requires_modifier() {
        assert!(LogicalKey::sided(Key::Space, Side::Left).is_none());
        assert!(LogicalKey::sided(Key::Alt, Side::Left).is_some());
    }

    #[test]
    fn test_ids_are_distinct() {
        let shift = LogicalKey::new(Key::Shift);
        let left = LogicalKey::sided(Key::Shift, Side::Left).unwrap();
        assert_ne!(shift.id(), left.id());
        assert_eq!(left.normalize().id(), shift.id());
    }

    #[test]
    fn test_modifier_flag() {
        assert!(LogicalKey::new(Key::Control).is_modifier());
        assert!(!LogicalKey::new(Key::KeyA).is_modifier());
    }
}
