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

//! Fire-and-forget execution of matched commands.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// The dispatcher's seam for running matched commands, so tests can record
/// instead of spawning.
pub trait CommandRunner {
    fn run(&mut self, shell: &str, command: &str);
}

/// Runs commands as `shell -c command`, detached from the dispatcher.
///
/// Exit status is ignored and stdio is discarded; the child is reaped on a
/// background thread so it never lingers as a zombie.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, shell: &str, command: &str) {
        debug!(shell, command, "spawning");
        match Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!("failed to spawn '{command}': {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_does_not_panic() {
        ShellRunner.run("/nonexistent-shell", "echo hi");
    }

    #[test]
    fn commands_run_detached() {
        // Nothing to observe without blocking; just exercise the path.
        ShellRunner.run("/bin/sh", "true");
    }
}
