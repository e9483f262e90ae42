//! Sets of keys that must be held together

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::ValidationError;
use crate::keys::LogicalKey;

/// Non-empty, duplicate-free, order-irrelevant set of keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Combination(BTreeSet<LogicalKey>);

impl Combination {
    /// Validate code strings and build a combination
    ///
    /// Fails on an empty list or on the first unknown code.
    pub fn parse<I, S>(codes: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = codes
            .into_iter()
            .map(|code| code.as_ref().parse::<LogicalKey>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Self::from_keys(keys)
    }

    pub fn from_keys(keys: impl IntoIterator<Item = LogicalKey>) -> Result<Self, ValidationError> {
        let keys: BTreeSet<_> = keys.into_iter().collect();
        if keys.is_empty() {
            return Err(ValidationError::EmptyCombination);
        }
        Ok(Self(keys))
    }

    pub fn keys(&self) -> impl Iterator<Item = LogicalKey> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether a held key counts toward some member of this combination
    pub fn involves(&self, held: LogicalKey) -> bool {
        self.0.iter().any(|member| member.matches(held))
    }

    /// Whether every member is matched by some held key
    pub fn is_satisfied_by(&self, held: &HashSet<LogicalKey>) -> bool {
        self.0
            .iter()
            .all(|member| held.iter().any(|key| member.matches(*key)))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // modifiers first: "Shift+Space"
        let modifiers = self.0.iter().filter(|key| key.is_modifier());
        let others = self.0.iter().filter(|key| !key.is_modifier());
        for (index, key) in modifiers.chain(others).enumerate() {
            if index > 0 {
                f.write_str("+")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Key, Side};

    fn held(codes: &[&str]) -> HashSet<LogicalKey> {
        codes.iter().map(|c| c.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_deduplicates_and_ignores_order() {
        let a = Combination::parse(["Shift", "KeyA", "Shift"]).unwrap();
        let b = Combination::parse(["KeyA", "Shift"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_parse_rejects_empty() {
        let codes: [&str; 0] = [];
        assert_eq!(
            Combination::parse(codes).unwrap_err(),
            ValidationError::EmptyCombination
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(
            Combination::parse(["Shift", "NotAKey"]).unwrap_err(),
            ValidationError::UnknownKey("NotAKey".into())
        );
    }

    #[test]
    fn test_merged_modifier_satisfied_by_either_side() {
        let combo = Combination::parse(["Control", "KeyC"]).unwrap();
        assert!(combo.is_satisfied_by(&held(&["ControlLeft", "KeyC"])));
        assert!(combo.is_satisfied_by(&held(&["ControlRight", "KeyC"])));
        assert!(!combo.is_satisfied_by(&held(&["ControlRight"])));
    }

    #[test]
    fn test_side_specific_member() {
        let combo = Combination::parse(["ShiftRight", "KeyZ"]).unwrap();
        assert!(combo.is_satisfied_by(&held(&["ShiftRight", "KeyZ"])));
        assert!(!combo.is_satisfied_by(&held(&["ShiftLeft", "KeyZ"])));

        let left = LogicalKey::sided(Key::Shift, Side::Left).unwrap();
        assert!(!combo.involves(left));
    }

    #[test]
    fn test_superset_satisfies() {
        let combo = Combination::parse(["Shift", "Space"]).unwrap();
        assert!(combo.is_satisfied_by(&held(&["ShiftLeft", "Space", "KeyA"])));
    }

    #[test]
    fn test_display() {
        let combo = Combination::parse(["Space", "Shift"]).unwrap();
        assert_eq!(combo.to_string(), "Shift+Space");
    }
}
