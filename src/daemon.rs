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

//! The daemon: wires the dispatcher to the platform backend and owns the
//! reload machinery.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::dispatch::{Decision, Dispatcher};
use crate::error::Error;
use crate::keyboard::KeyEvent;
use crate::keycodes::KeyCatalog;
use crate::parser;
use crate::watcher::ConfigWatcher;

/// Raised by the SIGUSR1 handler; consumed by the next housekeeping tick.
pub static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);
/// Raised by the SIGINT/SIGTERM handler; stops the run loop.
pub static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Implemented by whoever sits on the receiving end of the platform
/// backend: the daemon in normal operation, the observer under `-o`.
pub trait EventHandler {
    /// One keyboard event; the return value decides the fate of the
    /// original event.
    fn key_event(&mut self, event: &KeyEvent) -> Decision;

    /// The frontmost application changed.
    fn front_app_changed(&mut self, name: &str) {
        let _ = name;
    }

    /// The keyboard layout changed.
    fn layout_changed(&mut self) {}

    /// Housekeeping between events (reload checks).
    fn idle(&mut self) {}

    /// When `true`, the backend winds down its run loop.
    fn should_exit(&self) -> bool {
        EXIT_REQUESTED.load(Ordering::Relaxed)
    }
}

/// The hotkey daemon proper.
pub struct Daemon {
    dispatcher: Dispatcher,
    catalog: KeyCatalog,
    config_path: PathBuf,
    watcher: Option<ConfigWatcher>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Compile `config_path` and build the daemon around it. Startup
    /// fails when the config has errors; they are printed to stderr.
    pub fn new(
        config_path: PathBuf,
        catalog: KeyCatalog,
        mut dispatcher: Dispatcher,
    ) -> Result<Daemon, Error> {
        let outcome = parser::parse_file(&config_path, &catalog)?;
        if !outcome.is_ok() {
            for err in &outcome.errors {
                eprintln!("{err}");
            }
            return Err(Error::ConfigRejected);
        }
        let watcher = match ConfigWatcher::new(outcome.mappings.loaded_files()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("config watching disabled: {e}");
                None
            }
        };
        info!(
            config = %config_path.display(),
            hotkeys = outcome.mappings.hotkeys().len(),
            "config loaded"
        );
        dispatcher.install(Rc::new(outcome.mappings));
        Ok(Daemon {
            dispatcher,
            catalog,
            config_path,
            watcher,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Recompile the config. On errors the current rule graph stays
    /// installed; on success the new graph replaces it and the dispatcher
    /// drops back to `default` mode.
    fn reload(&mut self) {
        info!(config = %self.config_path.display(), "reloading");
        let outcome = match parser::parse_file(&self.config_path, &self.catalog) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("reload failed: {e}");
                return;
            }
        };
        if !outcome.is_ok() {
            for err in &outcome.errors {
                error!("{err}");
            }
            warn!("keeping the previous config");
            return;
        }
        match ConfigWatcher::new(outcome.mappings.loaded_files()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => {
                warn!("config watching disabled: {e}");
                self.watcher = None;
            }
        }
        info!(hotkeys = outcome.mappings.hotkeys().len(), "config swapped");
        self.dispatcher.install(Rc::new(outcome.mappings));
    }

    fn reload_pending(&self) -> bool {
        RELOAD_REQUESTED.swap(false, Ordering::Relaxed)
            || self.watcher.as_ref().map_or(false, ConfigWatcher::changed)
    }
}

impl EventHandler for Daemon {
    fn key_event(&mut self, event: &KeyEvent) -> Decision {
        self.dispatcher.dispatch(event)
    }

    fn front_app_changed(&mut self, name: &str) {
        self.dispatcher.set_front_app(name);
    }

    fn layout_changed(&mut self) {
        // The character map was built from the old layout; recompiling
        // against the backend's fresh catalog picks up the new one.
        self.catalog = crate::backend::key_catalog();
        self.reload();
    }

    fn idle(&mut self) {
        if self.reload_pending() {
            self.reload();
        }
    }
}

/// The `--observe` handler: prints one line per event, touches nothing.
pub struct Observer;

impl EventHandler for Observer {
    fn key_event(&mut self, event: &KeyEvent) -> Decision {
        println!(
            "{:?}\tkeycode: {:#04x}\tmods: {}",
            event.kind, event.keycode, event.mods
        );
        Decision::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandRunner;
    use crate::synth::NullSynthesizer;

    struct SilentRunner;
    impl CommandRunner for SilentRunner {
        fn run(&mut self, _shell: &str, _command: &str) {}
    }

    fn daemon_with(config: &str) -> (Daemon, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skhdrc");
        std::fs::write(&path, config).unwrap();
        let dispatcher =
            Dispatcher::new(Box::new(SilentRunner), Box::new(NullSynthesizer));
        let daemon = Daemon::new(path, KeyCatalog::us_ansi(), dispatcher).unwrap();
        (daemon, dir)
    }

    #[test]
    fn startup_rejects_a_broken_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skhdrc");
        std::fs::write(&path, "comd - x : echo\n").unwrap();
        let dispatcher =
            Dispatcher::new(Box::new(SilentRunner), Box::new(NullSynthesizer));
        let err = Daemon::new(path, KeyCatalog::us_ansi(), dispatcher).unwrap_err();
        assert!(matches!(err, Error::ConfigRejected));
    }

    #[test_log::test]
    fn reload_keeps_the_old_graph_on_errors() {
        let (mut daemon, dir) = daemon_with("cmd - a : echo one\n");
        std::fs::write(dir.path().join("skhdrc"), "broken ! config\n").unwrap();
        daemon.reload();
        // The original binding must still resolve.
        use crate::keyboard::{KeyEvent, ModifierSet};
        let decision = daemon.key_event(&KeyEvent::down(
            0x00,
            ModifierSet::CMD | ModifierSet::LCMD,
        ));
        assert_eq!(decision, Decision::Suppress);
    }

    #[test_log::test]
    fn reload_swaps_in_a_good_config() {
        let (mut daemon, dir) = daemon_with("cmd - a : echo one\n");
        std::fs::write(dir.path().join("skhdrc"), "cmd - b : echo two\n").unwrap();
        daemon.reload();
        use crate::keyboard::{KeyEvent, ModifierSet};
        let mods = ModifierSet::CMD | ModifierSet::LCMD;
        assert_eq!(daemon.key_event(&KeyEvent::down(0x00, mods)), Decision::Pass);
        assert_eq!(
            daemon.key_event(&KeyEvent::down(0x0b, mods)),
            Decision::Suppress
        );
    }

    #[test]
    fn sigusr1_flag_is_consumed_once() {
        let (daemon, _dir) = daemon_with("cmd - a : echo one\n");
        RELOAD_REQUESTED.store(true, Ordering::Relaxed);
        assert!(daemon.reload_pending());
        assert!(!daemon.reload_pending());
    }
}
