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

//! The CGEvent tap.
//!
//! Created with raw CoreGraphics calls rather than the `core-graphics`
//! wrapper because system-defined (media key) events are outside the
//! wrapper's event-type enum. Media keys arrive as NSSystemDefined events
//! whose payload is unpacked through `NSEvent`.

use std::ffi::c_void;

use cocoa::base::{id, nil};
use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop, CFRunLoopSource};
use objc::{class, msg_send, sel, sel_impl};
use tracing::warn;

use super::synth::SYNTH_USER_DATA;
use super::Context;
use crate::dispatch::Decision;
use crate::error::Error;
use crate::keyboard::{EventKind, KeyEvent, ModifierSet};

type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;

const kCGSessionEventTap: u32 = 1;
const kCGHeadInsertEventTap: u32 = 0;
const kCGEventTapOptionDefault: u32 = 0;

const kCGEventKeyDown: u32 = 10;
const kCGEventKeyUp: u32 = 11;
const kCGEventFlagsChanged: u32 = 12;
/// NSEventTypeSystemDefined; carries the media keys.
const kCGEventSystemDefined: u32 = 14;
const kCGEventTapDisabledByTimeout: u32 = 0xFFFFFFFE;
const kCGEventTapDisabledByUserInput: u32 = 0xFFFFFFFF;

const kCGKeyboardEventKeycode: u32 = 9;
const kCGEventSourceUserData: u32 = 42;

// CGEventFlags.
const kCGEventFlagMaskShift: u64 = 0x00020000;
const kCGEventFlagMaskControl: u64 = 0x00040000;
const kCGEventFlagMaskAlternate: u64 = 0x00080000;
const kCGEventFlagMaskCommand: u64 = 0x00100000;
const kCGEventFlagMaskSecondaryFn: u64 = 0x00800000;

// Device-dependent (side-specific) modifier bits, from IOKit's ev.h.
const NX_DEVICELCTLKEYMASK: u64 = 0x00000001;
const NX_DEVICELSHIFTKEYMASK: u64 = 0x00000002;
const NX_DEVICERSHIFTKEYMASK: u64 = 0x00000004;
const NX_DEVICELCMDKEYMASK: u64 = 0x00000008;
const NX_DEVICERCMDKEYMASK: u64 = 0x00000010;
const NX_DEVICELALTKEYMASK: u64 = 0x00000020;
const NX_DEVICERALTKEYMASK: u64 = 0x00000040;
const NX_DEVICERCTLKEYMASK: u64 = 0x00002000;

/// NX_SUBTYPE_AUX_CONTROL_BUTTONS.
const NX_SYSDEFINED_MEDIA_KEYS: i16 = 8;

type CGEventTapCallBack = extern "C" fn(
    proxy: CGEventTapProxy,
    etype: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(port: CFMachPortRef, enable: bool);
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetFlags(event: CGEventRef) -> u64;
}

pub(crate) fn event_flags_to_modifiers(flags: u64) -> ModifierSet {
    const MAP: &[(u64, ModifierSet)] = &[
        (kCGEventFlagMaskCommand, ModifierSet::CMD),
        (NX_DEVICELCMDKEYMASK, ModifierSet::LCMD),
        (NX_DEVICERCMDKEYMASK, ModifierSet::RCMD),
        (kCGEventFlagMaskShift, ModifierSet::SHIFT),
        (NX_DEVICELSHIFTKEYMASK, ModifierSet::LSHIFT),
        (NX_DEVICERSHIFTKEYMASK, ModifierSet::RSHIFT),
        (kCGEventFlagMaskAlternate, ModifierSet::ALT),
        (NX_DEVICELALTKEYMASK, ModifierSet::LALT),
        (NX_DEVICERALTKEYMASK, ModifierSet::RALT),
        (kCGEventFlagMaskControl, ModifierSet::CONTROL),
        (NX_DEVICELCTLKEYMASK, ModifierSet::LCONTROL),
        (NX_DEVICERCTLKEYMASK, ModifierSet::RCONTROL),
        (kCGEventFlagMaskSecondaryFn, ModifierSet::FN),
    ];
    let mut mods = ModifierSet::empty();
    for &(mask, bit) in MAP {
        if flags & mask != 0 {
            mods |= bit;
        }
    }
    mods
}

fn is_synthetic(event: CGEventRef) -> bool {
    unsafe { CGEventGetIntegerValueField(event, kCGEventSourceUserData) == SYNTH_USER_DATA }
}

/// Unpack an NSSystemDefined event into (keycode, key-down); `None` for
/// subtypes that are not media keys.
fn decode_system_defined(event: CGEventRef) -> Option<(u32, bool)> {
    unsafe {
        let ns_event: id = msg_send![class!(NSEvent), eventWithCGEvent: event];
        if ns_event == nil {
            return None;
        }
        let subtype: i16 = msg_send![ns_event, subtype];
        if subtype != NX_SYSDEFINED_MEDIA_KEYS {
            return None;
        }
        let data1: isize = msg_send![ns_event, data1];
        let keycode = ((data1 as u64 & 0xFFFF_0000) >> 16) as u32;
        let down = ((data1 as u64 & 0x0000_FF00) >> 8) == 0x0A;
        Some((keycode, down))
    }
}

extern "C" fn event_tap_callback(
    _proxy: CGEventTapProxy,
    etype: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    let ctx = unsafe { &mut *(user_info as *mut Context) };
    let key_event = match etype {
        kCGEventTapDisabledByTimeout | kCGEventTapDisabledByUserInput => {
            warn!("event tap was disabled by the system; re-enabling");
            if let Some(port) = ctx.tap_port {
                unsafe { CGEventTapEnable(port, true) };
            }
            return event;
        }
        kCGEventKeyDown | kCGEventKeyUp | kCGEventFlagsChanged => {
            let keycode =
                unsafe { CGEventGetIntegerValueField(event, kCGKeyboardEventKeycode) } as u32;
            let kind = match etype {
                kCGEventKeyDown => EventKind::KeyDown,
                kCGEventKeyUp => EventKind::KeyUp,
                _ => EventKind::FlagsChanged,
            };
            KeyEvent {
                kind,
                keycode,
                mods: event_flags_to_modifiers(unsafe { CGEventGetFlags(event) }),
                synthetic: is_synthetic(event),
            }
        }
        kCGEventSystemDefined => {
            let Some((keycode, down)) = decode_system_defined(event) else {
                return event;
            };
            KeyEvent {
                kind: if down {
                    EventKind::KeyDown
                } else {
                    EventKind::KeyUp
                },
                keycode,
                mods: event_flags_to_modifiers(unsafe { CGEventGetFlags(event) })
                    | ModifierSet::NX,
                synthetic: is_synthetic(event),
            }
        }
        _ => return event,
    };
    match ctx.handler.key_event(&key_event) {
        Decision::Pass => event,
        Decision::Suppress | Decision::Replace(_) => std::ptr::null_mut(),
    }
}

/// The installed tap; dropping it tears the run-loop source down.
pub(crate) struct EventTap {
    port: CFMachPort,
    source: CFRunLoopSource,
}

impl EventTap {
    pub(crate) fn install(ctx: *mut Context) -> Result<EventTap, Error> {
        let mask = (1u64 << kCGEventKeyDown)
            | (1u64 << kCGEventKeyUp)
            | (1u64 << kCGEventFlagsChanged)
            | (1u64 << kCGEventSystemDefined);
        unsafe {
            let port_ref = CGEventTapCreate(
                kCGSessionEventTap,
                kCGHeadInsertEventTap,
                kCGEventTapOptionDefault,
                mask,
                event_tap_callback,
                ctx as *mut c_void,
            );
            if port_ref.is_null() {
                return Err(Error::EventTapFailed);
            }
            (*ctx).tap_port = Some(port_ref);
            let port = CFMachPort::wrap_under_create_rule(port_ref);
            let source = port
                .create_runloop_source(0)
                .map_err(|_| Error::EventTapFailed)?;
            CFRunLoop::get_current().add_source(&source, kCFRunLoopCommonModes);
            CGEventTapEnable(port.as_concrete_TypeRef(), true);
            Ok(EventTap { port, source })
        }
    }
}

impl Drop for EventTap {
    fn drop(&mut self) {
        unsafe {
            CGEventTapEnable(self.port.as_concrete_TypeRef(), false);
        }
        CFRunLoop::get_current().remove_source(&self.source, unsafe { kCFRunLoopCommonModes });
    }
}
