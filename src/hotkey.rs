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

//! Hotkeys: a trigger, its flags, and its per-process actions.

use crate::keyboard::{KeyPress, ModifierSet};

bitflags::bitflags! {
    /// Auxiliary hotkey behavior bits.
    pub struct HotkeyFlags: u32 {
        /// Do not suppress the original event.
        const PASSTHROUGH = 1 << 0;
        /// The hotkey switches modes.
        const ACTIVATE = 1 << 1;
        /// The trigger is a system-defined media key.
        const NX = 1 << 2;
        /// Fire on key release instead of key press.
        const ON_RELEASE = 1 << 3;
    }
}

/// What a matched hotkey does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a command through the configured shell.
    Command(String),
    /// Post a synthesized key combination in place of the event.
    Forward(KeyPress),
    /// Switch the dispatcher to another mode.
    Activate(String),
    /// Swallow the event without doing anything; used to shadow.
    Unbound,
}

/// The per-process action table of a hotkey: a sparse list of lower-cased
/// process names plus a separate wildcard slot. Process lists rarely exceed
/// a handful of entries, so a linear scan beats a map here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMap {
    entries: Vec<(String, Action)>,
    wildcard: Option<Action>,
}

impl ProcessMap {
    /// Add a process-specific action. The name is lower-cased on insertion.
    /// Returns `false` when the process already has an entry.
    pub fn insert(&mut self, process: &str, action: Action) -> bool {
        let process = process.to_lowercase();
        if self.entries.iter().any(|(name, _)| *name == process) {
            return false;
        }
        self.entries.push((process, action));
        true
    }

    /// Set the wildcard (any-process) action. Returns `false` when the
    /// wildcard slot is already taken.
    pub fn insert_wildcard(&mut self, action: Action) -> bool {
        if self.wildcard.is_some() {
            return false;
        }
        self.wildcard = Some(action);
        true
    }

    /// Select the action for a (lower-cased) process name, falling back to
    /// the wildcard slot.
    pub fn select(&self, process: &str) -> Option<&Action> {
        self.entries
            .iter()
            .find(|(name, _)| name == process)
            .map(|(_, action)| action)
            .or(self.wildcard.as_ref())
    }

    pub fn wildcard(&self) -> Option<&Action> {
        self.wildcard.as_ref()
    }

    /// Merge `other` into `self`. Returns the name of the first colliding
    /// process key (`"*"` for the wildcard slot), if any; nothing is
    /// merged on collision.
    pub fn merge(&mut self, other: &ProcessMap) -> Option<String> {
        for (name, _) in &other.entries {
            if self.entries.iter().any(|(mine, _)| mine == name) {
                return Some(name.clone());
            }
        }
        if other.wildcard.is_some() && self.wildcard.is_some() {
            return Some("*".into());
        }
        self.entries.extend(other.entries.iter().cloned());
        if let Some(action) = &other.wildcard {
            self.wildcard = Some(action.clone());
        }
        None
    }
}

/// A hotkey: the trigger of a rule, its flags, the modes it is registered
/// in, and its per-process action table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    pub mods: ModifierSet,
    /// Virtual keycode (media keycode for NX triggers).
    pub keycode: u32,
    pub flags: HotkeyFlags,
    /// Names of the modes this hotkey is registered in.
    pub modes: Vec<String>,
    pub actions: ProcessMap,
}

impl Hotkey {
    pub fn new(mods: ModifierSet, keycode: u32) -> Hotkey {
        Hotkey {
            mods,
            keycode,
            flags: HotkeyFlags::empty(),
            modes: Vec::new(),
            actions: ProcessMap::default(),
        }
    }

    /// The 64-bit lookup key: the side-folded modifier mask in the high
    /// half, the keycode in the low half. Side-specific rules land in the
    /// same bucket as their side-generic sibling; [`Hotkey::same_identity`]
    /// then tells them apart.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(self.mods, self.keycode)
    }

    /// Identity as a lookup key: exact modifier set and keycode. Actions
    /// and process maps are values, not part of identity.
    pub fn same_identity(&self, other: &Hotkey) -> bool {
        self.mods == other.mods && self.keycode == other.keycode
    }

    /// Whether an event with these modifiers triggers this hotkey.
    pub fn matches_event(&self, mods: ModifierSet) -> bool {
        self.mods.matches(mods)
    }
}

/// The fingerprint of an incoming event, for probing a mode's hotkey map.
pub fn fingerprint(mods: ModifierSet, keycode: u32) -> u64 {
    ((mods.canonical().bits() as u64) << 32) | keycode as u64
}
