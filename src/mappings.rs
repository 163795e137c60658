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

//! The rule graph: modes, their hotkey maps, and the owning root.
//!
//! `Mappings` owns every hotkey exactly once, in `Rc`s on a single list.
//! Each `Mode` keys non-owning clones by fingerprint for lookup, and each
//! hotkey records the names of the modes containing it, which keeps the
//! mode↔hotkey back-reference acyclic.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::hotkey::{fingerprint, Hotkey};
use crate::keyboard::ModifierSet;

pub const DEFAULT_MODE: &str = "default";

const FALLBACK_SHELL: &str = "/bin/bash";

/// Structural errors raised by rule-graph mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    ModeNotFound(String),
    ModeAlreadyExists(String),
    /// An identity-equal hotkey is already registered in the named mode.
    DuplicateHotkey(String),
    BlacklistDuplicate(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GraphError::ModeNotFound(name) => write!(f, "mode '{name}' was not declared"),
            GraphError::ModeAlreadyExists(name) => write!(f, "mode '{name}' already declared"),
            GraphError::DuplicateHotkey(mode) => {
                write!(f, "hotkey already registered in mode '{mode}'")
            }
            GraphError::BlacklistDuplicate(name) => {
                write!(f, "process '{name}' already blacklisted")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// A named rule set.
#[derive(Debug, Clone, Default)]
pub struct Mode {
    pub name: String,
    /// When set, keys that miss in this mode are still suppressed.
    pub capture: bool,
    /// Command run when the mode is activated.
    pub on_enter: Option<String>,
    hotkey_map: HashMap<u64, Vec<Rc<Hotkey>>>,
}

impl Mode {
    pub fn new(name: impl Into<String>) -> Mode {
        Mode {
            name: name.into(),
            ..Mode::default()
        }
    }

    /// Find the hotkey triggered by an event with these modifiers and
    /// keycode, honoring side-agnostic modifier matching.
    pub fn lookup(&self, mods: ModifierSet, keycode: u32) -> Option<&Rc<Hotkey>> {
        self.hotkey_map
            .get(&fingerprint(mods, keycode))?
            .iter()
            .find(|hotkey| hotkey.matches_event(mods))
    }

    /// Find a hotkey with the exact identity (modifier set and keycode).
    pub fn find_identity(&self, probe: &Hotkey) -> Option<&Rc<Hotkey>> {
        self.hotkey_map
            .get(&probe.fingerprint())?
            .iter()
            .find(|hotkey| hotkey.same_identity(probe))
    }

    fn insert(&mut self, hotkey: Rc<Hotkey>) {
        self.hotkey_map
            .entry(hotkey.fingerprint())
            .or_default()
            .push(hotkey);
    }

    pub fn hotkey_count(&self) -> usize {
        self.hotkey_map.values().map(Vec::len).sum()
    }
}

/// The root of the rule graph, rebuilt from scratch on every (re)load.
#[derive(Debug, Clone)]
pub struct Mappings {
    modes: HashMap<String, Mode>,
    blacklist: HashSet<String>,
    shell: String,
    loaded_files: Vec<PathBuf>,
    hotkeys: Vec<Rc<Hotkey>>,
}

impl Default for Mappings {
    fn default() -> Mappings {
        Mappings::new()
    }
}

impl Mappings {
    /// An empty graph. The shell defaults to `$SHELL`, falling back to
    /// `/bin/bash`.
    pub fn new() -> Mappings {
        let shell = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SHELL.into());
        Mappings {
            modes: HashMap::new(),
            blacklist: HashSet::new(),
            shell,
            loaded_files: Vec::new(),
            hotkeys: Vec::new(),
        }
    }

    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.get(name)
    }

    pub fn has_mode(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.modes.values()
    }

    /// Fetch a mode, creating it (non-capturing, no on-enter command) when
    /// absent.
    pub fn get_or_create_mode(&mut self, name: &str) -> &mut Mode {
        self.modes
            .entry(name.to_string())
            .or_insert_with(|| Mode::new(name))
    }

    /// Insert a declared mode.
    pub fn put_mode(&mut self, mode: Mode) -> Result<(), GraphError> {
        if self.modes.contains_key(&mode.name) {
            return Err(GraphError::ModeAlreadyExists(mode.name));
        }
        self.modes.insert(mode.name.clone(), mode);
        Ok(())
    }

    /// Register a hotkey in every mode in its mode set.
    ///
    /// Fails atomically: when any listed mode is missing or already holds
    /// an identity-equal hotkey, nothing is inserted anywhere.
    pub fn add_hotkey(&mut self, hotkey: Hotkey) -> Result<Rc<Hotkey>, GraphError> {
        for name in &hotkey.modes {
            let mode = self
                .modes
                .get(name)
                .ok_or_else(|| GraphError::ModeNotFound(name.clone()))?;
            if mode.find_identity(&hotkey).is_some() {
                return Err(GraphError::DuplicateHotkey(name.clone()));
            }
        }
        let hotkey = Rc::new(hotkey);
        for name in &hotkey.modes {
            self.modes
                .get_mut(name)
                .expect("mode checked above")
                .insert(Rc::clone(&hotkey));
        }
        self.hotkeys.push(Rc::clone(&hotkey));
        Ok(hotkey)
    }

    /// Blacklist a process name (lower-cased).
    pub fn add_blacklist(&mut self, name: &str) -> Result<(), GraphError> {
        let name = name.to_lowercase();
        if !self.blacklist.insert(name.clone()) {
            return Err(GraphError::BlacklistDuplicate(name));
        }
        Ok(())
    }

    pub fn is_blacklisted(&self, process: &str) -> bool {
        self.blacklist.contains(process)
    }

    pub fn set_shell(&mut self, shell: impl Into<String>) {
        self.shell = shell.into();
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn add_loaded_file(&mut self, path: impl Into<PathBuf>) {
        self.loaded_files.push(path.into());
    }

    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    pub fn was_loaded(&self, path: &Path) -> bool {
        self.loaded_files.iter().any(|p| p == path)
    }

    pub fn hotkeys(&self) -> &[Rc<Hotkey>] {
        &self.hotkeys
    }

    /// The `default` mode always exists, even for an empty config.
    pub fn ensure_default_mode(&mut self) {
        self.get_or_create_mode(DEFAULT_MODE);
    }
}
