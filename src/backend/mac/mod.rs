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

//! macOS backend: event tap, frontmost-app tracking, layout map, and
//! event synthesis, all on the main run loop.

#![allow(non_upper_case_globals)]

mod layout;
mod process;
mod synth;
mod tap;
mod util;

use std::ffi::c_void;

use core_foundation::date::CFAbsoluteTimeGetCurrent;
use core_foundation::runloop::{
    kCFRunLoopCommonModes, CFRunLoop, CFRunLoopTimer, CFRunLoopTimerContext, CFRunLoopTimerRef,
};
use tracing::warn;

use crate::daemon::EventHandler;
use crate::error::Error;
use crate::keycodes::KeyCatalog;
use crate::synth::{NullSynthesizer, Synthesizer};

/// Seconds between housekeeping ticks (reload and shutdown checks).
const HOUSEKEEPING_INTERVAL: f64 = 0.3;

/// Shared by every run-loop callback. All callbacks are serialized on the
/// main run loop, so the handler is only ever borrowed by one of them at
/// a time.
pub(crate) struct Context<'a> {
    pub(crate) handler: &'a mut dyn EventHandler,
    pub(crate) tap_port: Option<core_foundation::mach_port::CFMachPortRef>,
}

/// The key catalog over the active keyboard layout, falling back to
/// US-ANSI when the layout cannot be queried.
pub fn key_catalog() -> KeyCatalog {
    match layout::build_layout_map() {
        Some(map) => KeyCatalog::with_layout(map),
        None => {
            warn!("could not query the active keyboard layout; using US-ANSI");
            KeyCatalog::us_ansi()
        }
    }
}

pub fn synthesizer() -> Box<dyn Synthesizer> {
    match synth::MacSynthesizer::new() {
        Some(synth) => Box::new(synth),
        None => {
            warn!("could not create an event source; key synthesis disabled");
            Box::new(NullSynthesizer)
        }
    }
}

/// Install the event tap and observers, then run the main loop until the
/// handler asks to exit.
pub fn run(handler: &mut dyn EventHandler) -> Result<(), Error> {
    util::assert_main_thread();
    let mut ctx = Context {
        handler,
        tap_port: None,
    };
    let ctx_ptr: *mut Context = &mut ctx;

    let _tap = tap::EventTap::install(ctx_ptr)?;
    let _workspace = process::WorkspaceObserver::install(ctx_ptr);
    let _layout = layout::LayoutObserver::install(ctx_ptr);
    let _timer = install_housekeeping_timer(ctx_ptr);

    CFRunLoop::run_current();
    Ok(())
}

fn install_housekeeping_timer(ctx: *mut Context) -> CFRunLoopTimer {
    extern "C" fn tick(_timer: CFRunLoopTimerRef, info: *mut c_void) {
        let ctx = unsafe { &mut *(info as *mut Context) };
        ctx.handler.idle();
        if ctx.handler.should_exit() {
            CFRunLoop::get_current().stop();
        }
    }
    let mut context = CFRunLoopTimerContext {
        version: 0,
        info: ctx as *mut c_void,
        retain: None,
        release: None,
        copyDescription: None,
    };
    unsafe {
        let timer = CFRunLoopTimer::new(
            CFAbsoluteTimeGetCurrent() + HOUSEKEEPING_INTERVAL,
            HOUSEKEEPING_INTERVAL,
            0,
            0,
            tick,
            &mut context,
        );
        CFRunLoop::get_current().add_timer(&timer, kCFRunLoopCommonModes);
        timer
    }
}
