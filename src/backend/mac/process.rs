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

//! Tracks the frontmost application through NSWorkspace notifications.

use std::ffi::c_void;

use cocoa::base::{id, nil};
use objc::declare::ClassDecl;
use objc::runtime::{Class, Object, Sel};
use objc::{class, msg_send, sel, sel_impl};
use once_cell::sync::Lazy;

use super::util::{from_nsstring, make_nsstring};
use super::Context;

static CONTEXT_IVAR: &str = "skhdContext";

struct ObserverClass(*const Class);
unsafe impl Sync for ObserverClass {}
unsafe impl Send for ObserverClass {}

static OBSERVER_CLASS: Lazy<ObserverClass> = Lazy::new(|| unsafe {
    let mut decl = ClassDecl::new("SkhdWorkspaceObserver", class!(NSObject))
        .expect("workspace observer class definition failed");
    decl.add_ivar::<*mut c_void>(CONTEXT_IVAR);
    decl.add_method(
        sel!(workspaceDidActivateApplication:),
        workspace_did_activate_application as extern "C" fn(&mut Object, Sel, id),
    );
    ObserverClass(decl.register())
});

extern "C" fn workspace_did_activate_application(this: &mut Object, _: Sel, notification: id) {
    unsafe {
        let info: *mut c_void = *this.get_ivar(CONTEXT_IVAR);
        if info.is_null() {
            return;
        }
        let ctx = &mut *(info as *mut Context);
        let user_info: id = msg_send![notification, userInfo];
        if user_info == nil {
            return;
        }
        let key = make_nsstring("NSWorkspaceApplicationKey");
        let app: id = msg_send![user_info, objectForKey: key];
        if app == nil {
            return;
        }
        let name: id = msg_send![app, localizedName];
        if name != nil {
            ctx.handler.front_app_changed(&from_nsstring(name));
        }
    }
}

/// The name of the application currently owning the keyboard focus.
pub(crate) fn frontmost_application_name() -> Option<String> {
    unsafe {
        let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
        let app: id = msg_send![workspace, frontmostApplication];
        if app == nil {
            return None;
        }
        let name: id = msg_send![app, localizedName];
        if name == nil {
            return None;
        }
        Some(from_nsstring(name))
    }
}

pub(crate) struct WorkspaceObserver {
    instance: id,
}

impl WorkspaceObserver {
    pub(crate) fn install(ctx: *mut Context) -> WorkspaceObserver {
        unsafe {
            let instance: id = msg_send![OBSERVER_CLASS.0, alloc];
            let instance: id = msg_send![instance, init];
            (*instance).set_ivar(CONTEXT_IVAR, ctx as *mut c_void);

            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let center: id = msg_send![workspace, notificationCenter];
            let name = make_nsstring("NSWorkspaceDidActivateApplicationNotification");
            let () = msg_send![center,
                addObserver: instance
                selector: sel!(workspaceDidActivateApplication:)
                name: name
                object: nil];

            // Seed the cache; there is no notification for the app that is
            // already frontmost at startup.
            if let Some(name) = frontmost_application_name() {
                (*ctx).handler.front_app_changed(&name);
            }
            WorkspaceObserver { instance }
        }
    }
}

impl Drop for WorkspaceObserver {
    fn drop(&mut self) {
        unsafe {
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let center: id = msg_send![workspace, notificationCenter];
            let () = msg_send![center, removeObserver: self.instance];
            let () = msg_send![self.instance, release];
        }
    }
}
