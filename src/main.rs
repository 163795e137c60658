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

//! Command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use skhd::{backend, Daemon, Dispatcher, Error, Observer, ShellRunner};

#[derive(Debug, Parser)]
#[command(name = "skhd", about = "Simple hotkey daemon for macOS.", disable_version_flag = true)]
struct Args {
    /// Use PATH as the primary config file.
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Print a human-readable line per keyboard event.
    #[arg(short = 'o', long)]
    observe: bool,

    /// Parse SPEC as a hotkey, synthesize it, and exit.
    #[arg(short = 'k', long, value_name = "SPEC")]
    key: Option<String>,

    /// Type STRING as Unicode keystrokes and exit.
    #[arg(short = 't', long, value_name = "STRING")]
    text: Option<String>,

    /// Ask a running instance to reload its config and exit.
    #[arg(short = 'r', long)]
    reload: bool,

    /// Print version and exit.
    #[arg(short = 'v', long)]
    version: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "skhd=debug" } else { "skhd=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if args.version {
        println!("skhd version {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("skhd: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    if args.reload {
        let pid = skhd::signal_reload()?;
        println!("requested reload from pid {pid}");
        return Ok(());
    }

    let catalog = backend::key_catalog();

    if let Some(spec) = args.key {
        let press = skhd::parse_keypress(&spec, &catalog)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        backend::synthesizer().post(press);
        return Ok(());
    }

    if let Some(text) = args.text {
        backend::synthesizer().type_text(&text);
        return Ok(());
    }

    install_signal_handlers();

    if args.observe {
        let mut observer = Observer;
        return backend::run(&mut observer);
    }

    let config_path = match args.config {
        Some(path) => path,
        None => skhd::locate_config()?,
    };
    skhd::write_pidfile()?;
    let dispatcher = Dispatcher::new(Box::new(ShellRunner), backend::synthesizer());
    let result = Daemon::new(config_path, catalog, dispatcher)
        .and_then(|mut daemon| backend::run(&mut daemon));
    skhd::remove_pidfile();
    result
}

extern "C" fn handle_terminate(_signal: libc::c_int) {
    skhd::EXIT_REQUESTED.store(true, Ordering::Relaxed);
}

extern "C" fn handle_reload(_signal: libc::c_int) {
    skhd::RELOAD_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(
            libc::SIGINT,
            handle_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            handle_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGUSR1,
            handle_reload as extern "C" fn(libc::c_int) as libc::sighandler_t,
        );
    }
}
