//! Combination matching
//!
//! Tracks which keys are held and which registrations are active.
//! Updates are incremental: a key press can only activate registrations
//! that involve it, and a release can only deactivate those that did.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::hook::{KeyAction, RawKeyEvent};
use crate::keys::{Keymap, LogicalKey};
use crate::registry::{Registration, RegistrationId};

/// Whether a registration became active or inactive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
}

/// One registration changing state
#[derive(Debug, Clone)]
pub struct Matched {
    pub registration: Arc<Registration>,
    pub transition: Transition,
    pub timestamp: Instant,
}

/// Pressed-key state and active registrations for one engine run
#[derive(Debug)]
pub struct Matcher {
    keymap: Keymap,
    pressed: HashSet<LogicalKey>,
    active: HashSet<RegistrationId>,
}

impl Matcher {
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap,
            pressed: HashSet::new(),
            active: HashSet::new(),
        }
    }

    /// Keys currently held, side-resolved
    pub fn pressed(&self) -> &HashSet<LogicalKey> {
        &self.pressed
    }

    pub fn is_active(&self, id: RegistrationId) -> bool {
        self.active.contains(&id)
    }

    /// Apply one raw event against a registry snapshot
    ///
    /// Unknown codes, auto-repeat and releases of keys that were never
    /// seen going down produce nothing.
    pub fn process(
        &mut self,
        event: &RawKeyEvent,
        registrations: &[Arc<Registration>],
    ) -> Vec<Matched> {
        let Some(key) = self.keymap.lookup(event.code) else {
            debug!(code = event.code, keymap = ?self.keymap, "unknown native key code");
            return Vec::new();
        };

        match event.action {
            KeyAction::Down => self.press(key, event.timestamp, registrations),
            KeyAction::Up => self.release(key, event.timestamp, registrations),
        }
    }

    fn press(
        &mut self,
        key: LogicalKey,
        timestamp: Instant,
        registrations: &[Arc<Registration>],
    ) -> Vec<Matched> {
        if !self.pressed.insert(key) {
            trace!(%key, "auto-repeat ignored");
            return Vec::new();
        }

        let mut matched = Vec::new();
        for registration in registrations {
            let combination = registration.combination();
            if self.active.contains(&registration.id())
                || !combination.involves(key)
                || !combination.is_satisfied_by(&self.pressed)
            {
                continue;
            }

            self.active.insert(registration.id());
            matched.push(Matched {
                registration: Arc::clone(registration),
                transition: Transition::Activated,
                timestamp,
            });
        }

        matched
    }

    fn release(
        &mut self,
        key: LogicalKey,
        timestamp: Instant,
        registrations: &[Arc<Registration>],
    ) -> Vec<Matched> {
        if !self.pressed.remove(&key) {
            trace!(%key, "release of a key not seen pressed");
            return Vec::new();
        }

        let mut matched = Vec::new();
        for registration in registrations {
            let combination = registration.combination();
            if !self.active.contains(&registration.id())
                || !combination.involves(key)
                || combination.is_satisfied_by(&self.pressed)
            {
                continue;
            }

            self.active.remove(&registration.id());
            matched.push(Matched {
                registration: Arc::clone(registration),
                transition: Transition::Deactivated,
                timestamp,
            });
        }

        // forget registrations removed while active
        if !self.active.is_empty() {
            self.active
                .retain(|id| registrations.iter().any(|r| r.id() == *id));
        }

        matched
    }

    /// Deactivate everything and forget held keys
    ///
    /// Used when the hook may have missed events; every active
    /// registration still present gets a keyup.
    pub fn release_all(
        &mut self,
        timestamp: Instant,
        registrations: &[Arc<Registration>],
    ) -> Vec<Matched> {
        let matched = registrations
            .iter()
            .filter(|registration| self.active.contains(&registration.id()))
            .map(|registration| Matched {
                registration: Arc::clone(registration),
                transition: Transition::Deactivated,
                timestamp,
            })
            .collect();

        self.clear();
        matched
    }

    /// Drop all state without emitting anything
    pub fn clear(&mut self) {
        self.pressed.clear();
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HotkeyEvent;
    use crate::registry::{Combination, Registry, Subscription};

    struct Fixture {
        registry: Registry,
        matcher: Matcher,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: Registry::new(),
                matcher: Matcher::new(Keymap::Evdev),
            }
        }

        fn register(&self, codes: &[&str]) -> Subscription {
            self.registry.insert(
                Combination::parse(codes).unwrap(),
                Arc::new(|_: HotkeyEvent| {}),
            )
        }

        fn send(&mut self, code: &str, action: KeyAction) -> Vec<(RegistrationId, Transition)> {
            let key: LogicalKey = code.parse().unwrap();
            let event = RawKeyEvent {
                code: Keymap::Evdev.native_code(key).unwrap(),
                action,
                timestamp: Instant::now(),
            };
            self.matcher
                .process(&event, &self.registry.snapshot())
                .into_iter()
                .map(|m| (m.registration.id(), m.transition))
                .collect()
        }

        fn down(&mut self, code: &str) -> Vec<(RegistrationId, Transition)> {
            self.send(code, KeyAction::Down)
        }

        fn up(&mut self, code: &str) -> Vec<(RegistrationId, Transition)> {
            self.send(code, KeyAction::Up)
        }
    }

    use Transition::{Activated, Deactivated};

    #[test]
    fn test_shift_space_scenario() {
        let mut f = Fixture::new();
        let sub = f.register(&["Shift", "Space"]);

        assert!(f.down("ShiftLeft").is_empty());
        assert_eq!(f.down("Space"), vec![(sub.id(), Activated)]);
        assert_eq!(f.up("Space"), vec![(sub.id(), Deactivated)]);
        assert!(f.up("ShiftLeft").is_empty());
        assert!(f.matcher.pressed().is_empty());
    }

    #[test]
    fn test_any_press_order_fires_once() {
        let orders: [[&str; 3]; 3] = [
            ["ControlLeft", "AltLeft", "KeyK"],
            ["KeyK", "ControlLeft", "AltLeft"],
            ["AltLeft", "KeyK", "ControlLeft"],
        ];

        for order in orders {
            let mut f = Fixture::new();
            let sub = f.register(&["Control", "Alt", "KeyK"]);

            let fired: Vec<_> = order.iter().flat_map(|code| f.down(code)).collect();
            assert_eq!(fired, vec![(sub.id(), Activated)], "order {order:?}");

            for release in order {
                let mut g = Fixture::new();
                let sub = g.register(&["Control", "Alt", "KeyK"]);
                for code in order {
                    g.down(code);
                }
                assert_eq!(g.up(release), vec![(sub.id(), Deactivated)]);
            }
        }
    }

    #[test]
    fn test_auto_repeat_does_not_refire() {
        let mut f = Fixture::new();
        let sub = f.register(&["Shift", "KeyA"]);

        f.down("ShiftLeft");
        assert_eq!(f.down("KeyA"), vec![(sub.id(), Activated)]);
        assert!(f.down("KeyA").is_empty());
        assert!(f.down("KeyA").is_empty());
        assert!(f.down("ShiftLeft").is_empty());
        assert_eq!(f.up("KeyA"), vec![(sub.id(), Deactivated)]);
    }

    #[test]
    fn test_shared_modifier_fires_independently() {
        let mut f = Fixture::new();
        let a = f.register(&["Shift", "KeyA"]);
        let b = f.register(&["Shift", "KeyB"]);

        f.down("ShiftLeft");
        assert_eq!(f.down("KeyA"), vec![(a.id(), Activated)]);
        assert_eq!(f.down("KeyB"), vec![(b.id(), Activated)]);
        assert_eq!(
            f.up("ShiftLeft"),
            vec![(a.id(), Deactivated), (b.id(), Deactivated)]
        );
        assert!(f.up("KeyA").is_empty());
        assert!(f.up("KeyB").is_empty());
    }

    #[test]
    fn test_no_most_specific_suppression() {
        let mut f = Fixture::new();
        let short = f.register(&["Control", "KeyC"]);
        let long = f.register(&["Control", "Shift", "KeyC"]);

        f.down("ControlLeft");
        f.down("ShiftLeft");
        assert_eq!(
            f.down("KeyC"),
            vec![(short.id(), Activated), (long.id(), Activated)]
        );
        assert_eq!(f.up("ShiftLeft"), vec![(long.id(), Deactivated)]);
        assert!(f.matcher.is_active(short.id()));
    }

    #[test]
    fn test_merged_modifier_holds_while_other_side_pressed() {
        let mut f = Fixture::new();
        let sub = f.register(&["Shift", "KeyX"]);

        f.down("ShiftLeft");
        assert_eq!(f.down("KeyX"), vec![(sub.id(), Activated)]);
        assert!(f.down("ShiftRight").is_empty());
        assert!(f.up("ShiftLeft").is_empty());
        assert_eq!(f.up("ShiftRight"), vec![(sub.id(), Deactivated)]);
    }

    #[test]
    fn test_side_specific_and_merged_coexist() {
        let mut f = Fixture::new();
        let merged = f.register(&["Control", "KeyV"]);
        let right = f.register(&["ControlRight", "KeyV"]);

        f.down("ControlLeft");
        assert_eq!(f.down("KeyV"), vec![(merged.id(), Activated)]);
        f.up("KeyV");
        f.up("ControlLeft");

        f.down("ControlRight");
        assert_eq!(
            f.down("KeyV"),
            vec![(merged.id(), Activated), (right.id(), Activated)]
        );
    }

    #[test]
    fn test_single_key_combination() {
        let mut f = Fixture::new();
        let sub = f.register(&["F13"]);
        assert_eq!(f.down("F13"), vec![(sub.id(), Activated)]);
        assert_eq!(f.up("F13"), vec![(sub.id(), Deactivated)]);
    }

    #[test]
    fn test_duplicate_registrations_both_fire() {
        let mut f = Fixture::new();
        let a = f.register(&["Shift", "Space"]);
        let b = f.register(&["Shift", "Space"]);

        f.down("ShiftRight");
        assert_eq!(
            f.down("Space"),
            vec![(a.id(), Activated), (b.id(), Activated)]
        );
    }

    #[test]
    fn test_registration_added_while_held_waits_for_member_press() {
        let mut f = Fixture::new();
        f.down("ShiftLeft");
        f.down("KeyQ");
        let sub = f.register(&["Shift", "KeyQ"]);

        assert!(f.down("KeyW").is_empty());
        f.up("KeyQ");
        assert_eq!(f.down("KeyQ"), vec![(sub.id(), Activated)]);
    }

    #[test]
    fn test_unsubscribed_while_active_is_forgotten() {
        let mut f = Fixture::new();
        let sub = f.register(&["KeyA"]);
        f.down("KeyA");
        assert!(f.matcher.is_active(sub.id()));

        sub.unsubscribe();
        assert!(f.up("KeyA").is_empty());
        assert!(!f.matcher.is_active(sub.id()));
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        let mut f = Fixture::new();
        f.register(&["KeyA"]);
        let event = RawKeyEvent {
            code: 0xFFFF,
            action: KeyAction::Down,
            timestamp: Instant::now(),
        };
        assert!(f.matcher.process(&event, &f.registry.snapshot()).is_empty());
        assert!(f.matcher.pressed().is_empty());
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut f = Fixture::new();
        f.register(&["KeyA"]);
        assert!(f.up("KeyA").is_empty());
    }

    #[test]
    fn test_release_all_emits_keyup_for_active() {
        let mut f = Fixture::new();
        let a = f.register(&["Shift", "KeyA"]);
        let _b = f.register(&["Shift", "KeyB"]);

        f.down("ShiftLeft");
        f.down("KeyA");

        let released: Vec<_> = f
            .matcher
            .release_all(Instant::now(), &f.registry.snapshot())
            .into_iter()
            .map(|m| (m.registration.id(), m.transition))
            .collect();
        assert_eq!(released, vec![(a.id(), Deactivated)]);
        assert!(f.matcher.pressed().is_empty());

        // a held key released later produces nothing
        assert!(f.up("KeyA").is_empty());
    }
}
