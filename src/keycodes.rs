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

//! The static key catalog: modifier names, literal key names, and the
//! layout-dependent character map.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::keyboard::ModifierSet;

/// A named key from the literal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralKey {
    pub keycode: u32,
    /// The key arrives as a system-defined media event rather than a
    /// normal key event.
    pub implicit_nx: bool,
}

/// Modifier names as they appear in the config file.
static MODIFIER_NAMES: Lazy<HashMap<&'static str, ModifierSet>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("alt", ModifierSet::ALT);
    m.insert("lalt", ModifierSet::LALT);
    m.insert("ralt", ModifierSet::RALT);
    m.insert("shift", ModifierSet::SHIFT);
    m.insert("lshift", ModifierSet::LSHIFT);
    m.insert("rshift", ModifierSet::RSHIFT);
    m.insert("cmd", ModifierSet::CMD);
    m.insert("lcmd", ModifierSet::LCMD);
    m.insert("rcmd", ModifierSet::RCMD);
    m.insert("control", ModifierSet::CONTROL);
    m.insert("lcontrol", ModifierSet::LCONTROL);
    m.insert("rcontrol", ModifierSet::RCONTROL);
    m.insert("fn", ModifierSet::FN);
    m.insert("nx", ModifierSet::NX);
    m.insert("hyper", ModifierSet::HYPER);
    m.insert("meh", ModifierSet::MEH);
    m
});

// Virtual keycodes are the kVK_* values from Carbon's Events.h; media keys
// are NX_KEYTYPE_* values from IOKit's ev_keymap.h.
static LITERAL_KEYS: Lazy<HashMap<&'static str, LiteralKey>> = Lazy::new(|| {
    const KEYS: &[(&str, u32)] = &[
        ("return", 0x24),
        ("tab", 0x30),
        ("space", 0x31),
        ("backspace", 0x33),
        ("escape", 0x35),
        ("delete", 0x75),
        ("home", 0x73),
        ("end", 0x77),
        ("pageup", 0x74),
        ("pagedown", 0x79),
        ("insert", 0x72),
        ("left", 0x7b),
        ("right", 0x7c),
        ("down", 0x7d),
        ("up", 0x7e),
        ("f1", 0x7a),
        ("f2", 0x78),
        ("f3", 0x63),
        ("f4", 0x76),
        ("f5", 0x60),
        ("f6", 0x61),
        ("f7", 0x62),
        ("f8", 0x64),
        ("f9", 0x65),
        ("f10", 0x6d),
        ("f11", 0x67),
        ("f12", 0x6f),
        ("f13", 0x69),
        ("f14", 0x6b),
        ("f15", 0x71),
        ("f16", 0x6a),
        ("f17", 0x40),
        ("f18", 0x4f),
        ("f19", 0x50),
        ("f20", 0x5a),
    ];
    const NX_KEYS: &[(&str, u32)] = &[
        ("sound_up", 0x00),
        ("sound_down", 0x01),
        ("brightness_up", 0x02),
        ("brightness_down", 0x03),
        ("mute", 0x07),
        ("play", 0x10),
        ("next", 0x11),
        ("previous", 0x12),
        ("fast", 0x13),
        ("rewind", 0x14),
        ("illumination_up", 0x15),
        ("illumination_down", 0x16),
    ];
    let mut m = HashMap::new();
    for &(name, keycode) in KEYS {
        m.insert(
            name,
            LiteralKey {
                keycode,
                implicit_nx: false,
            },
        );
    }
    for &(name, keycode) in NX_KEYS {
        m.insert(
            name,
            LiteralKey {
                keycode,
                implicit_nx: true,
            },
        );
    }
    m
});

/// Look up a modifier name (`alt`, `lalt`, `hyper`, ...).
pub fn modifier_from_name(name: &str) -> Option<ModifierSet> {
    MODIFIER_NAMES.get(name).copied()
}

pub fn is_modifier_name(name: &str) -> bool {
    MODIFIER_NAMES.contains_key(name)
}

/// Look up a literal key name (`return`, `f1`, `sound_up`, ...).
pub fn literal_from_name(name: &str) -> Option<LiteralKey> {
    LITERAL_KEYS.get(name).copied()
}

pub fn is_literal_name(name: &str) -> bool {
    LITERAL_KEYS.contains_key(name)
}

/// The modifier bits a physical modifier keycode contributes when held.
///
/// Used to let `flags_changed` events participate in matching for hotkeys
/// whose key token is itself a modifier.
pub fn modifier_bits_for_keycode(keycode: u32) -> Option<ModifierSet> {
    let bits = match keycode {
        0x36 => ModifierSet::CMD | ModifierSet::RCMD,
        0x37 => ModifierSet::CMD | ModifierSet::LCMD,
        0x38 => ModifierSet::SHIFT | ModifierSet::LSHIFT,
        0x3a => ModifierSet::ALT | ModifierSet::LALT,
        0x3b => ModifierSet::CONTROL | ModifierSet::LCONTROL,
        0x3c => ModifierSet::SHIFT | ModifierSet::RSHIFT,
        0x3d => ModifierSet::ALT | ModifierSet::RALT,
        0x3e => ModifierSet::CONTROL | ModifierSet::RCONTROL,
        0x3f => ModifierSet::FN,
        _ => return None,
    };
    Some(bits)
}

pub fn is_modifier_keycode(keycode: u32) -> bool {
    modifier_bits_for_keycode(keycode).is_some()
}

/// The keycodes pressed to synthesize a modifier set, preferring the left
/// key for side-generic bits.
pub fn keycodes_for_modifiers(mods: ModifierSet) -> Vec<u32> {
    const FAMILIES: &[(ModifierSet, ModifierSet, ModifierSet, u32, u32)] = &[
        (ModifierSet::CMD, ModifierSet::LCMD, ModifierSet::RCMD, 0x37, 0x36),
        (ModifierSet::SHIFT, ModifierSet::LSHIFT, ModifierSet::RSHIFT, 0x38, 0x3c),
        (ModifierSet::ALT, ModifierSet::LALT, ModifierSet::RALT, 0x3a, 0x3d),
        (ModifierSet::CONTROL, ModifierSet::LCONTROL, ModifierSet::RCONTROL, 0x3b, 0x3e),
    ];
    let mut out = Vec::new();
    for &(general, left, right, left_code, right_code) in FAMILIES {
        if mods.contains(left) {
            out.push(left_code);
        }
        if mods.contains(right) {
            out.push(right_code);
        }
        if mods.contains(general) && !mods.intersects(left | right) {
            out.push(left_code);
        }
    }
    if mods.contains(ModifierSet::FN) {
        out.push(0x3f);
    }
    out
}

/// The keycodes a keyboard layout is asked about when building the
/// character map: every key that can produce a printable character on an
/// ANSI keyboard.
pub const LAYOUT_KEYCODES: &[u32] = &[
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
    0x1e, 0x1f, 0x20, 0x21, 0x22, 0x23, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d,
    0x2e, 0x2f, 0x32,
];

/// The US-ANSI character map, used when the active layout cannot be
/// queried (and on hosts without a native layout API).
static US_ANSI: Lazy<HashMap<String, u32>> = Lazy::new(|| {
    const CHARS: &[(&str, u32)] = &[
        ("a", 0x00),
        ("s", 0x01),
        ("d", 0x02),
        ("f", 0x03),
        ("h", 0x04),
        ("g", 0x05),
        ("z", 0x06),
        ("x", 0x07),
        ("c", 0x08),
        ("v", 0x09),
        ("b", 0x0b),
        ("q", 0x0c),
        ("w", 0x0d),
        ("e", 0x0e),
        ("r", 0x0f),
        ("y", 0x10),
        ("t", 0x11),
        ("1", 0x12),
        ("2", 0x13),
        ("3", 0x14),
        ("4", 0x15),
        ("6", 0x16),
        ("5", 0x17),
        ("=", 0x18),
        ("9", 0x19),
        ("7", 0x1a),
        ("-", 0x1b),
        ("8", 0x1c),
        ("0", 0x1d),
        ("]", 0x1e),
        ("o", 0x1f),
        ("u", 0x20),
        ("[", 0x21),
        ("i", 0x22),
        ("p", 0x23),
        ("l", 0x25),
        ("j", 0x26),
        ("'", 0x27),
        ("k", 0x28),
        (";", 0x29),
        ("\\", 0x2a),
        (",", 0x2b),
        ("/", 0x2c),
        ("n", 0x2d),
        ("m", 0x2e),
        (".", 0x2f),
        ("`", 0x32),
    ];
    CHARS
        .iter()
        .map(|&(s, code)| (s.to_string(), code))
        .collect()
});

/// The key catalog handed to the parser: the static tables plus the
/// layout-dependent character map built by the backend at startup.
#[derive(Debug, Clone)]
pub struct KeyCatalog {
    layout: HashMap<String, u32>,
}

impl KeyCatalog {
    /// A catalog over a character map queried from the live layout.
    pub fn with_layout(layout: HashMap<String, u32>) -> KeyCatalog {
        KeyCatalog { layout }
    }

    /// The US-ANSI fallback catalog.
    pub fn us_ansi() -> KeyCatalog {
        KeyCatalog {
            layout: US_ANSI.clone(),
        }
    }

    /// Resolve a single character to its keycode under the current layout.
    pub fn resolve_char(&self, s: &str) -> Option<u32> {
        self.layout.get(s).copied()
    }
}
