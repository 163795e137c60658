// Copyright 2024 The Skhd Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Keyboard event and modifier types.

use std::fmt;

bitflags::bitflags! {
    /// A set of held modifier keys, with both side-generic and
    /// side-specific bits.
    ///
    /// Hardware always reports a side-specific bit together with its
    /// side-generic bit; rules written by the user may carry either. The
    /// side-generic bit of a family matches either side, a side-specific
    /// bit matches only that side (see [`ModifierSet::matches`]).
    pub struct ModifierSet: u32 {
        const ALT      = 1 << 0;
        const LALT     = 1 << 1;
        const RALT     = 1 << 2;
        const SHIFT    = 1 << 3;
        const LSHIFT   = 1 << 4;
        const RSHIFT   = 1 << 5;
        const CMD      = 1 << 6;
        const LCMD     = 1 << 7;
        const RCMD     = 1 << 8;
        const CONTROL  = 1 << 9;
        const LCONTROL = 1 << 10;
        const RCONTROL = 1 << 11;
        const FN       = 1 << 12;
        /// The event is a system-defined media-key event.
        const NX       = 1 << 13;

        const HYPER = Self::CMD.bits | Self::ALT.bits | Self::SHIFT.bits | Self::CONTROL.bits;
        const MEH = Self::CONTROL.bits | Self::SHIFT.bits | Self::ALT.bits;
    }
}

/// The four left/right modifier families.
const FAMILIES: &[(ModifierSet, ModifierSet, ModifierSet, &str)] = &[
    (ModifierSet::ALT, ModifierSet::LALT, ModifierSet::RALT, "alt"),
    (
        ModifierSet::SHIFT,
        ModifierSet::LSHIFT,
        ModifierSet::RSHIFT,
        "shift",
    ),
    (ModifierSet::CMD, ModifierSet::LCMD, ModifierSet::RCMD, "cmd"),
    (
        ModifierSet::CONTROL,
        ModifierSet::LCONTROL,
        ModifierSet::RCONTROL,
        "control",
    ),
];

impl ModifierSet {
    /// Fold side-specific bits into their side-generic bits.
    ///
    /// This is the form used for the lookup fingerprint, so that `lalt - x`
    /// and `alt - x` hash to the same bucket; equality then separates them.
    pub fn canonical(self) -> ModifierSet {
        let mut out = self & (ModifierSet::FN | ModifierSet::NX);
        for &(general, left, right, _) in FAMILIES {
            if self.intersects(general | left | right) {
                out |= general;
            }
        }
        out
    }

    /// Whether a rule written with `self` is triggered by an event carrying
    /// `event` modifiers.
    ///
    /// Per family: a side-generic bit matches either side, a side-specific
    /// bit matches exactly that side, and an empty family requires the
    /// family to be absent from the event. `fn` and `nx` compare exactly.
    pub fn matches(self, event: ModifierSet) -> bool {
        for &(general, left, right, _) in FAMILIES {
            let ok = if self.contains(general) {
                event.intersects(general | left | right)
            } else {
                let mut ok = true;
                if self.contains(left) {
                    ok &= event.contains(left);
                }
                if self.contains(right) {
                    ok &= event.contains(right);
                }
                if !self.intersects(left | right) {
                    ok = !event.intersects(general | left | right);
                }
                ok
            };
            if !ok {
                return false;
            }
        }
        self.contains(ModifierSet::FN) == event.contains(ModifierSet::FN)
            && self.contains(ModifierSet::NX) == event.contains(ModifierSet::NX)
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut sep = "";
        for &(general, left, right, name) in FAMILIES {
            for (bit, prefix) in [(general, ""), (left, "l"), (right, "r")] {
                if self.contains(bit) {
                    write!(f, "{sep}{prefix}{name}")?;
                    sep = " + ";
                }
            }
        }
        if self.contains(ModifierSet::FN) {
            write!(f, "{sep}fn")?;
            sep = " + ";
        }
        if self.contains(ModifierSet::NX) {
            write!(f, "{sep}nx")?;
        }
        Ok(())
    }
}

/// What a keyboard event reports about its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    /// A modifier was pressed or released on its own.
    FlagsChanged,
}

/// A keyboard event as delivered by the platform tap, normalized.
///
/// System-defined media-key events arrive as `KeyDown`/`KeyUp` with the
/// `NX` modifier bit set and the media keycode in `keycode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: EventKind,
    /// Virtual keycode (media keycode for NX events).
    pub keycode: u32,
    pub mods: ModifierSet,
    /// Set when this event was posted by this process.
    pub synthetic: bool,
}

impl KeyEvent {
    pub fn down(keycode: u32, mods: ModifierSet) -> KeyEvent {
        KeyEvent {
            kind: EventKind::KeyDown,
            keycode,
            mods,
            synthetic: false,
        }
    }

    pub fn up(keycode: u32, mods: ModifierSet) -> KeyEvent {
        KeyEvent {
            kind: EventKind::KeyUp,
            keycode,
            mods,
            synthetic: false,
        }
    }
}

/// A key combination to be synthesized: the payload of a forward action and
/// of the `--key` command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub mods: ModifierSet,
    pub keycode: u32,
}

impl fmt::Display for KeyPress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.mods.is_empty() {
            write!(f, "{:#04x}", self.keycode)
        } else {
            write!(f, "{} - {:#04x}", self.mods, self.keycode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_folds_sides_into_general() {
        let mods = ModifierSet::LALT | ModifierSet::RSHIFT | ModifierSet::FN;
        assert_eq!(
            mods.canonical(),
            ModifierSet::ALT | ModifierSet::SHIFT | ModifierSet::FN
        );
    }

    #[test]
    fn general_rule_matches_either_side() {
        let rule = ModifierSet::ALT;
        assert!(rule.matches(ModifierSet::ALT | ModifierSet::LALT));
        assert!(rule.matches(ModifierSet::ALT | ModifierSet::RALT));
        assert!(rule.matches(ModifierSet::ALT));
        assert!(!rule.matches(ModifierSet::empty()));
        assert!(!rule.matches(ModifierSet::SHIFT | ModifierSet::LSHIFT));
    }

    #[test]
    fn side_rule_matches_only_that_side() {
        let rule = ModifierSet::LALT;
        assert!(rule.matches(ModifierSet::ALT | ModifierSet::LALT));
        assert!(!rule.matches(ModifierSet::ALT | ModifierSet::RALT));
        assert!(!rule.matches(ModifierSet::ALT));
    }

    #[test]
    fn unrequested_family_rejects() {
        let rule = ModifierSet::CMD;
        assert!(!rule.matches(ModifierSet::CMD | ModifierSet::LCMD | ModifierSet::SHIFT));
    }

    #[test]
    fn fn_and_nx_compare_exactly() {
        assert!(!ModifierSet::FN.matches(ModifierSet::empty()));
        assert!(!ModifierSet::empty().matches(ModifierSet::FN));
        assert!((ModifierSet::NX).matches(ModifierSet::NX));
    }

    #[test]
    fn hyper_is_all_four_families() {
        let hyper = ModifierSet::HYPER;
        assert!(hyper.matches(
            ModifierSet::CMD
                | ModifierSet::LCMD
                | ModifierSet::ALT
                | ModifierSet::LALT
                | ModifierSet::SHIFT
                | ModifierSet::LSHIFT
                | ModifierSet::CONTROL
                | ModifierSet::LCONTROL
        ));
        assert!(!hyper.matches(ModifierSet::CMD | ModifierSet::LCMD));
    }

    #[test]
    fn display_is_stable() {
        let mods = ModifierSet::CMD | ModifierSet::LSHIFT;
        assert_eq!(mods.to_string(), "lshift + cmd");
    }
}
