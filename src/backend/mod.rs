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

//! Platform backend selection.
//!
//! The macOS backend owns the event tap, the frontmost-app watcher, the
//! layout map, and event synthesis. The headless backend keeps everything
//! above this line compiling (and testable) on other hosts.

// It would be clearer to use cfg_if! macros here, but that breaks rustfmt.

#[cfg(target_os = "macos")]
mod mac;
#[cfg(target_os = "macos")]
pub use mac::*;

#[cfg(not(target_os = "macos"))]
mod headless;
#[cfg(not(target_os = "macos"))]
pub use headless::*;
