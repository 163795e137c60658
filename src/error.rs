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

//! Errors at the daemon level, and the config compiler's diagnostics.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Daemon errors.
#[derive(Debug, Clone)]
pub enum Error {
    /// The primary config file could not be located.
    ConfigNotFound,
    /// The config did not compile; the diagnostics were already reported.
    ConfigRejected,
    /// This host has no usable event-tap backend.
    BackendUnavailable(&'static str),
    /// The event tap could not be installed (usually missing the
    /// Accessibility permission).
    EventTapFailed,
    /// Another instance is already running.
    AlreadyRunning(u32),
    /// Other miscellaneous error.
    Other(Arc<anyhow::Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Error::ConfigNotFound => write!(f, "could not locate a config file."),
            Error::ConfigRejected => write!(f, "the config file contains errors."),
            Error::BackendUnavailable(os) => {
                write!(f, "no event-tap backend is available on {os}.")
            }
            Error::EventTapFailed => write!(
                f,
                "could not install the event tap; is the accessibility permission granted?"
            ),
            Error::AlreadyRunning(pid) => {
                write!(f, "an instance is already running (pid {pid}).")
            }
            Error::Other(s) => write!(f, "{s}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(src: anyhow::Error) -> Error {
        Error::Other(Arc::new(src))
    }
}

/// Everything that can go wrong while compiling a config file.
///
/// The parser collects these instead of bailing: a malformed top-level form
/// is recorded and parsing resumes at the next line, so a single pass
/// reports every problem in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The file is not valid UTF-8.
    InvalidUtf8,
    /// A token that does not belong where it was found.
    UnexpectedToken,
    /// An unknown modifier name in a `+` chain.
    UnknownModifier,
    /// A key character the active keyboard layout cannot produce.
    UnresolvableKey,
    /// A mode prefix or activation target that was never declared.
    ModeNotFound,
    /// The same mode listed twice in one prefix or declaration.
    DuplicateModeInList,
    /// An identity-equal hotkey already registered in the mode.
    DuplicateHotkey,
    /// A process already present in the blacklist.
    BlacklistDuplicate,
    /// A mode declared twice.
    ModeAlreadyExists,
    /// A `.load` that reaches a file already on the load stack.
    CyclicLoad,
    /// A `.load` target that does not exist.
    LoadNotFound,
    /// An I/O failure reading a config file.
    IoError,
}

impl ParseErrorKind {
    fn message(self) -> &'static str {
        match self {
            ParseErrorKind::InvalidUtf8 => "file is not valid utf-8",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnknownModifier => "unknown modifier",
            ParseErrorKind::UnresolvableKey => "key is not produced by the active layout",
            ParseErrorKind::ModeNotFound => "mode was not declared",
            ParseErrorKind::DuplicateModeInList => "mode listed twice",
            ParseErrorKind::DuplicateHotkey => "hotkey already registered in this mode",
            ParseErrorKind::BlacklistDuplicate => "process already blacklisted",
            ParseErrorKind::ModeAlreadyExists => "mode already declared",
            ParseErrorKind::CyclicLoad => "load cycle",
            ParseErrorKind::LoadNotFound => "loaded file does not exist",
            ParseErrorKind::IoError => "could not read file",
        }
    }
}

/// A single config diagnostic with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub file: PathBuf,
    /// 1-based.
    pub line: u32,
    /// 1-based.
    pub col: u32,
    /// The offending token's text, empty when no token applies.
    pub token: String,
    /// Position of the earlier declaration, for duplicate diagnostics.
    pub previous: Option<(u32, u32)>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        file: impl Into<PathBuf>,
        line: u32,
        col: u32,
        token: impl Into<String>,
    ) -> ParseError {
        ParseError {
            kind,
            file: file.into(),
            line,
            col,
            token: token.into(),
            previous: None,
        }
    }

    pub fn with_previous(mut self, line: u32, col: u32) -> ParseError {
        self.previous = Some((line, col));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "{}:{}:{}: error: {}",
            self.file.display(),
            self.line,
            self.col,
            self.kind.message()
        )?;
        if !self.token.is_empty() {
            write!(f, " near '{}'", self.token)?;
        }
        if let Some((line, col)) = self.previous {
            write!(f, " (previously declared at {line}:{col})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_renders_with_position_and_token() {
        let err = ParseError::new(ParseErrorKind::UnknownModifier, "/tmp/skhdrc", 3, 7, "cmdd");
        assert_eq!(
            err.to_string(),
            "/tmp/skhdrc:3:7: error: unknown modifier near 'cmdd'"
        );
    }

    #[test]
    fn duplicate_diagnostics_carry_both_positions() {
        let err = ParseError::new(ParseErrorKind::DuplicateHotkey, "skhdrc", 9, 1, "cmd")
            .with_previous(4, 1);
        assert!(err.to_string().ends_with("(previously declared at 4:1)"));
    }
}
