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

//! Config-file discovery and the pidfile protocol.

use std::env;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Error;

const CONFIG_NAME: &str = "skhdrc";

/// The discovery order for the config file.
fn candidates(xdg_config_home: Option<&str>, home: Option<&str>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(xdg) = xdg_config_home {
        out.push(PathBuf::from(xdg).join("skhd").join(CONFIG_NAME));
    }
    if let Some(home) = home {
        out.push(PathBuf::from(home).join(".config").join("skhd").join(CONFIG_NAME));
        out.push(PathBuf::from(home).join(format!(".{CONFIG_NAME}")));
    }
    out.push(PathBuf::from(CONFIG_NAME));
    out
}

/// Locate the config file: `$XDG_CONFIG_HOME/skhd/skhdrc`,
/// `$HOME/.config/skhd/skhdrc`, `$HOME/.skhdrc`, then `./skhdrc`.
pub fn locate_config() -> Result<PathBuf, Error> {
    let xdg = env::var("XDG_CONFIG_HOME").ok();
    let home = env::var("HOME").ok();
    candidates(xdg.as_deref(), home.as_deref())
        .into_iter()
        .find(|path| path.is_file())
        .ok_or(Error::ConfigNotFound)
}

/// Where the daemon records its pid: `$TMPDIR/skhd_$USER.pid`.
pub fn pidfile_path() -> PathBuf {
    let tmp = env::var("TMPDIR").unwrap_or_else(|_| "/tmp".into());
    let user = env::var("USER").unwrap_or_else(|_| "unknown".into());
    PathBuf::from(tmp).join(format!("skhd_{user}.pid"))
}

fn read_pid() -> Option<u32> {
    std::fs::read_to_string(pidfile_path())
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// The pid of a live instance, if one is running.
pub fn running_instance() -> Option<u32> {
    let pid = read_pid()?;
    // Signal 0 probes for existence without delivering anything.
    let alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
    alive.then_some(pid)
}

/// Claim the pidfile for this process. Fails when another instance holds it.
pub fn write_pidfile() -> Result<(), Error> {
    if let Some(pid) = running_instance() {
        return Err(Error::AlreadyRunning(pid));
    }
    let path = pidfile_path();
    std::fs::write(&path, std::process::id().to_string())
        .map_err(|e| anyhow::anyhow!("could not write {}: {e}", path.display()))?;
    debug!(path = %path.display(), "wrote pidfile");
    Ok(())
}

pub fn remove_pidfile() {
    let _ = std::fs::remove_file(pidfile_path());
}

/// Ask a running instance to reload its config (SIGUSR1).
pub fn signal_reload() -> Result<u32, Error> {
    let pid = running_instance().ok_or_else(|| {
        Error::Other(std::sync::Arc::new(anyhow::anyhow!(
            "no running instance found"
        )))
    })?;
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGUSR1) };
    if rc != 0 {
        return Err(Error::Other(std::sync::Arc::new(anyhow::anyhow!(
            "could not signal pid {pid}"
        ))));
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_order_is_xdg_then_home_then_cwd() {
        let paths = candidates(Some("/xdg"), Some("/home/u"));
        let rendered: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "/xdg/skhd/skhdrc",
                "/home/u/.config/skhd/skhdrc",
                "/home/u/.skhdrc",
                "skhdrc",
            ]
        );
    }

    #[test]
    fn discovery_without_env_falls_back_to_cwd() {
        let paths = candidates(None, None);
        assert_eq!(paths, vec![PathBuf::from("skhdrc")]);
    }
}
