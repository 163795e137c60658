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

//! Backend stub for hosts without an event tap.
//!
//! Config compilation, `--key` parsing, and the whole test suite work
//! here; only the daemon and synthesis paths need real hardware.

use crate::daemon::EventHandler;
use crate::error::Error;
use crate::keycodes::KeyCatalog;
use crate::synth::{NullSynthesizer, Synthesizer};

/// The layout map cannot be queried without a window server; parsing uses
/// the US-ANSI fallback.
pub fn key_catalog() -> KeyCatalog {
    KeyCatalog::us_ansi()
}

pub fn synthesizer() -> Box<dyn Synthesizer> {
    Box::new(NullSynthesizer)
}

/// There is no event source to run against.
pub fn run(_handler: &mut dyn EventHandler) -> Result<(), Error> {
    Err(Error::BackendUnavailable(std::env::consts::OS))
}
