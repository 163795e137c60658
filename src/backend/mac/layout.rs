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

//! The layout-dependent character map, via `UCKeyTranslate`.
//!
//! At startup (and after every layout switch) each keyboard-relevant
//! keycode is translated against the active ASCII-capable layout; the
//! resulting character string keys the map the parser resolves single
//! characters through.

use std::collections::HashMap;
use std::ffi::c_void;

use core_foundation::base::{CFRelease, TCFType};
use core_foundation::data::{CFData, CFDataRef};
use core_foundation::string::CFStringRef;
use tracing::debug;

use super::Context;
use crate::keycodes::LAYOUT_KEYCODES;

const kUCKeyActionDisplay: u16 = 3;
const kUCKeyTranslateNoDeadKeysMask: u32 = 1;

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    static kTISPropertyUnicodeKeyLayoutData: CFStringRef;
    static kTISNotifySelectedKeyboardInputSourceChanged: CFStringRef;

    fn TISCopyCurrentASCIICapableKeyboardLayoutInputSource() -> *mut c_void;
    fn TISGetInputSourceProperty(source: *mut c_void, key: CFStringRef) -> *mut c_void;
    fn LMGetKbdType() -> u8;

    fn UCKeyTranslate(
        key_layout_ptr: *const c_void,
        virtual_key_code: u16,
        key_action: u16,
        modifier_key_state: u32,
        keyboard_type: u32,
        key_translate_options: u32,
        dead_key_state: *mut u32,
        max_string_length: u32,
        actual_string_length: *mut u32,
        unicode_string: *mut u16,
    ) -> i32;
}

// CFNotificationCenter is absent from the core-foundation crate.
type CFNotificationCenterRef = *mut c_void;
type CFNotificationCallback = extern "C" fn(
    center: CFNotificationCenterRef,
    observer: *mut c_void,
    name: CFStringRef,
    object: *const c_void,
    user_info: *const c_void,
);

const CFNotificationSuspensionBehaviorDeliverImmediately: isize = 4;

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFNotificationCenterGetDistributedCenter() -> CFNotificationCenterRef;
    fn CFNotificationCenterAddObserver(
        center: CFNotificationCenterRef,
        observer: *const c_void,
        callback: CFNotificationCallback,
        name: CFStringRef,
        object: *const c_void,
        suspension_behavior: isize,
    );
    fn CFNotificationCenterRemoveObserver(
        center: CFNotificationCenterRef,
        observer: *const c_void,
        name: CFStringRef,
        object: *const c_void,
    );
}

/// Translate every layout keycode to its character under the active
/// ASCII-capable layout. `None` when the layout cannot be queried.
pub(crate) fn build_layout_map() -> Option<HashMap<String, u32>> {
    unsafe {
        let source = TISCopyCurrentASCIICapableKeyboardLayoutInputSource();
        if source.is_null() {
            return None;
        }
        let data_ref =
            TISGetInputSourceProperty(source, kTISPropertyUnicodeKeyLayoutData) as CFDataRef;
        if data_ref.is_null() {
            CFRelease(source as _);
            return None;
        }
        let data = CFData::wrap_under_get_rule(data_ref);
        let layout_ptr = data.bytes().as_ptr() as *const c_void;
        let kbd_type = LMGetKbdType() as u32;

        let mut map = HashMap::new();
        for &keycode in LAYOUT_KEYCODES {
            let mut dead_key_state: u32 = 0;
            let mut unicode: [u16; 4] = [0; 4];
            let mut length: u32 = 0;
            let status = UCKeyTranslate(
                layout_ptr,
                keycode as u16,
                kUCKeyActionDisplay,
                0,
                kbd_type,
                kUCKeyTranslateNoDeadKeysMask,
                &mut dead_key_state,
                unicode.len() as u32,
                &mut length,
                unicode.as_mut_ptr(),
            );
            if status != 0 || length == 0 {
                continue;
            }
            if let Ok(s) = String::from_utf16(&unicode[..length as usize]) {
                map.insert(s, keycode);
            }
        }
        CFRelease(source as _);
        debug!(keys = map.len(), "layout map built");
        Some(map)
    }
}

extern "C" fn layout_changed(
    _center: CFNotificationCenterRef,
    observer: *mut c_void,
    _name: CFStringRef,
    _object: *const c_void,
    _user_info: *const c_void,
) {
    if observer.is_null() {
        return;
    }
    let ctx = unsafe { &mut *(observer as *mut Context) };
    ctx.handler.layout_changed();
}

/// Subscribed for the lifetime of the run loop; fires when the user
/// switches keyboard layouts.
pub(crate) struct LayoutObserver {
    ctx: *const c_void,
}

impl LayoutObserver {
    pub(crate) fn install(ctx: *mut Context) -> LayoutObserver {
        unsafe {
            CFNotificationCenterAddObserver(
                CFNotificationCenterGetDistributedCenter(),
                ctx as *const c_void,
                layout_changed,
                kTISNotifySelectedKeyboardInputSourceChanged,
                std::ptr::null(),
                CFNotificationSuspensionBehaviorDeliverImmediately,
            );
        }
        LayoutObserver {
            ctx: ctx as *const c_void,
        }
    }
}

impl Drop for LayoutObserver {
    fn drop(&mut self) {
        unsafe {
            CFNotificationCenterRemoveObserver(
                CFNotificationCenterGetDistributedCenter(),
                self.ctx,
                kTISNotifySelectedKeyboardInputSourceChanged,
                std::ptr::null(),
            );
        }
    }
}
