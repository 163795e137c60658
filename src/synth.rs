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

//! Posting synthetic key events.
//!
//! The real implementation lives in the macOS backend; everything above it
//! talks to this trait so the hot path can be tested with a recorder.

use tracing::debug;

use crate::keyboard::KeyPress;

/// Posts synthetic keyboard input back into the window server.
///
/// Implementations tag their events so the dispatcher recognises them as
/// self-generated and passes them through untouched.
pub trait Synthesizer {
    /// Press and release a key combination: modifier downs, key down, key
    /// up, modifier ups.
    fn post(&mut self, key: KeyPress);

    /// Type a string as Unicode keystrokes.
    fn type_text(&mut self, text: &str);
}

/// A synthesizer for hosts without a window server; it only logs.
pub struct NullSynthesizer;

impl Synthesizer for NullSynthesizer {
    fn post(&mut self, key: KeyPress) {
        debug!(%key, "no backend to post key");
    }

    fn type_text(&mut self, text: &str) {
        debug!(len = text.len(), "no backend to type text");
    }
}
