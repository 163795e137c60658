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

//! Posts synthetic CGEvents, tagged so the tap recognises them.

use std::thread;
use std::time::Duration;

use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, EventField};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use tracing::{debug, warn};

use crate::keyboard::{KeyPress, ModifierSet};
use crate::keycodes::keycodes_for_modifiers;
use crate::synth::Synthesizer;

/// Value planted in the user-data field of every event we post; the tap
/// passes tagged events through untouched, which breaks feedback loops.
pub(crate) const SYNTH_USER_DATA: i64 = 0x736B_6864; // "skhd"

/// Pause between the keystrokes of `--text`, so slow apps keep up.
const TEXT_KEY_DELAY: Duration = Duration::from_millis(1);

pub(crate) struct MacSynthesizer {
    source: CGEventSource,
}

impl MacSynthesizer {
    pub(crate) fn new() -> Option<MacSynthesizer> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).ok()?;
        Some(MacSynthesizer { source })
    }

    fn post_key(&self, keycode: u32, down: bool, flags: CGEventFlags) {
        let event = match CGEvent::new_keyboard_event(self.source.clone(), keycode as u16, down) {
            Ok(event) => event,
            Err(()) => {
                warn!(keycode, "could not create keyboard event");
                return;
            }
        };
        event.set_flags(flags);
        event.set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, SYNTH_USER_DATA);
        event.post(CGEventTapLocation::HID);
    }
}

fn cg_flags(mods: ModifierSet) -> CGEventFlags {
    let mut flags = CGEventFlags::CGEventFlagNull;
    let families = [
        (
            ModifierSet::CMD | ModifierSet::LCMD | ModifierSet::RCMD,
            CGEventFlags::CGEventFlagCommand,
        ),
        (
            ModifierSet::SHIFT | ModifierSet::LSHIFT | ModifierSet::RSHIFT,
            CGEventFlags::CGEventFlagShift,
        ),
        (
            ModifierSet::ALT | ModifierSet::LALT | ModifierSet::RALT,
            CGEventFlags::CGEventFlagAlternate,
        ),
        (
            ModifierSet::CONTROL | ModifierSet::LCONTROL | ModifierSet::RCONTROL,
            CGEventFlags::CGEventFlagControl,
        ),
        (ModifierSet::FN, CGEventFlags::CGEventFlagSecondaryFn),
    ];
    for (bits, flag) in families {
        if mods.intersects(bits) {
            flags |= flag;
        }
    }
    flags
}

impl Synthesizer for MacSynthesizer {
    fn post(&mut self, key: KeyPress) {
        if key.mods.contains(ModifierSet::NX) {
            // Media keys travel as NSSystemDefined events, which cannot be
            // fabricated through the keyboard-event API.
            debug!(%key, "cannot synthesize a media key; dropping");
            return;
        }
        let flags = cg_flags(key.mods);
        let modifiers = keycodes_for_modifiers(key.mods);
        for &keycode in &modifiers {
            self.post_key(keycode, true, flags);
        }
        self.post_key(key.keycode, true, flags);
        self.post_key(key.keycode, false, flags);
        for &keycode in modifiers.iter().rev() {
            self.post_key(keycode, false, CGEventFlags::CGEventFlagNull);
        }
    }

    fn type_text(&mut self, text: &str) {
        for unit in text.encode_utf16() {
            for down in [true, false] {
                let event =
                    match CGEvent::new_keyboard_event(self.source.clone(), 0, down) {
                        Ok(event) => event,
                        Err(()) => {
                            warn!("could not create keyboard event");
                            return;
                        }
                    };
                event.set_string_from_utf16_unchecked(&[unit]);
                event
                    .set_integer_value_field(EventField::EVENT_SOURCE_USER_DATA, SYNTH_USER_DATA);
                event.post(CGEventTapLocation::HID);
                thread::sleep(TEXT_KEY_DELAY);
            }
        }
    }
}
