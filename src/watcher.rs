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

//! Watches the loaded config files for changes.
//!
//! The parent directory of every loaded file is watched, because editors
//! routinely replace the file by rename rather than writing in place.
//! Notifications cross to the run-loop thread over a channel; the daemon
//! drains it between events and reparses at most once per drain.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::Error;

pub struct ConfigWatcher {
    // Dropping the watcher cancels the subscriptions.
    _watcher: RecommendedWatcher,
    rx: Receiver<()>,
}

impl ConfigWatcher {
    /// Watch every file in `files` (the `Mappings::loaded_files` list).
    pub fn new(files: &[PathBuf]) -> Result<ConfigWatcher, Error> {
        let names: HashSet<OsString> = files
            .iter()
            .filter_map(|p| p.file_name().map(OsString::from))
            .collect();
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .filter_map(|p| p.file_name())
                        .any(|name| names.contains(name));
                    if relevant {
                        debug!(paths = ?event.paths, "config change");
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!("file watcher error: {e}"),
            }
        })
        .map_err(|e| anyhow::anyhow!("could not create file watcher: {e}"))?;

        let dirs: HashSet<&Path> = files.iter().filter_map(|p| p.parent()).collect();
        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| anyhow::anyhow!("could not watch {}: {e}", dir.display()))?;
        }
        Ok(ConfigWatcher { _watcher: watcher, rx })
    }

    /// Drain pending notifications; `true` when anything changed since the
    /// last call.
    pub fn changed(&self) -> bool {
        self.rx.try_iter().count() > 0
    }

    #[cfg(test)]
    fn wait(&self, timeout: std::time::Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn notices_a_rewrite_of_a_watched_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skhdrc");
        std::fs::write(&path, "cmd - a : echo one\n").unwrap();

        let watcher = ConfigWatcher::new(&[path.clone()]).unwrap();
        std::fs::write(&path, "cmd - a : echo two\n").unwrap();
        assert!(watcher.wait(Duration::from_secs(5)));
    }

    #[test]
    fn ignores_unrelated_files_in_the_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skhdrc");
        std::fs::write(&path, "").unwrap();

        let watcher = ConfigWatcher::new(&[path]).unwrap();
        std::fs::write(dir.path().join("unrelated"), "x").unwrap();
        assert!(!watcher.wait(Duration::from_millis(500)));
        assert!(!watcher.changed());
    }
}
