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

//! Simple hotkey daemon for macOS.
//!
//! `skhd` intercepts every keyboard event system-wide, matches it against
//! a rule set compiled from an `skhdrc` file, and either suppresses the
//! event and runs a shell command in its place, forwards a remapped key
//! back into the window server, or lets it pass through.
//!
//! The crate splits into a platform-independent core — the config
//! compiler ([`lexer`]/[`parser`]), the rule graph ([`Mappings`]), and the
//! event hot path ([`Dispatcher`]) — and a platform [`backend`] that owns
//! the event tap, frontmost-app tracking, the keyboard-layout map, and
//! event synthesis. Everything above the backend is exercised by tests on
//! any host.

#![allow(clippy::new_without_default)]
#![deny(clippy::trivially_copy_pass_by_ref)]

pub mod backend;

mod config;
mod daemon;
mod dispatch;
mod error;
mod exec;
mod hotkey;
mod keyboard;
mod keycodes;
mod lexer;
mod mappings;
mod parser;
mod synth;
mod watcher;

pub use config::{
    locate_config, pidfile_path, remove_pidfile, running_instance, signal_reload, write_pidfile,
};
pub use daemon::{Daemon, EventHandler, Observer, EXIT_REQUESTED, RELOAD_REQUESTED};
pub use dispatch::{Decision, DispatchStats, Dispatcher};
pub use error::{Error, ParseError, ParseErrorKind};
pub use exec::{CommandRunner, ShellRunner};
pub use hotkey::{Action, Hotkey, HotkeyFlags, ProcessMap};
pub use keyboard::{EventKind, KeyEvent, KeyPress, ModifierSet};
pub use keycodes::KeyCatalog;
pub use lexer::{Lexer, Token, TokenKind};
pub use mappings::{GraphError, Mappings, Mode, DEFAULT_MODE};
pub use parser::{parse_file, parse_keypress, parse_str, ParseOutcome};
pub use synth::{NullSynthesizer, Synthesizer};
pub use watcher::ConfigWatcher;
