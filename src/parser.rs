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

//! Compiles a token stream into a [`Mappings`] rule graph.
//!
//! The parser recovers per top-level form: a malformed hotkey or directive
//! is recorded as a [`ParseError`] and parsing resumes at the next line, so
//! one pass reports every problem. The caller inspects the error list and
//! decides whether to reject the result.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, ParseError, ParseErrorKind};
use crate::hotkey::{Action, Hotkey, HotkeyFlags};
use crate::keyboard::{KeyPress, ModifierSet};
use crate::keycodes::{self, KeyCatalog};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::mappings::{Mappings, Mode, DEFAULT_MODE};

/// The result of compiling a config file: the graph that was built, plus
/// every diagnostic collected along the way, in source order.
#[derive(Debug)]
pub struct ParseOutcome {
    pub mappings: Mappings,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compile the config file at `path`, following `.load` directives.
///
/// Only a failure to read the primary file is a hard error; everything
/// else lands in [`ParseOutcome::errors`].
pub fn parse_file(path: &Path, catalog: &KeyCatalog) -> Result<ParseOutcome, Error> {
    let src = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("could not read {}: {e}", path.display()))?;
    let abs = absolute(path);
    let mut compiler = Compiler::new(catalog);
    match String::from_utf8(src) {
        Ok(src) => compiler.parse_root(&src, &abs),
        Err(_) => compiler.errors.push(ParseError::new(
            ParseErrorKind::InvalidUtf8,
            &abs,
            1,
            1,
            "",
        )),
    }
    Ok(compiler.finish())
}

/// Compile config text directly, attributing positions to `file`.
/// Relative `.load` paths resolve against `file`'s directory.
pub fn parse_str(src: &str, file: &Path, catalog: &KeyCatalog) -> ParseOutcome {
    let mut compiler = Compiler::new(catalog);
    compiler.parse_root(src, &absolute(file));
    compiler.finish()
}

/// Parse a `--key` argument (`"cmd + shift - space"`) into a key press.
pub fn parse_keypress(spec: &str, catalog: &KeyCatalog) -> Result<KeyPress, ParseError> {
    let mut parser = FileParser::new(spec, Path::new("<key>"), catalog);
    let (mods, keycode, _) = parser.parse_trigger()?;
    if let Some(tok) = parser.advance() {
        return Err(parser.err_at(ParseErrorKind::UnexpectedToken, &tok));
    }
    Ok(KeyPress { mods, keycode })
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Exact-identity key for duplicate detection: the unfolded modifier bits
/// and the keycode.
fn identity_key(hotkey: &Hotkey) -> u64 {
    ((hotkey.mods.bits() as u64) << 32) | hotkey.keycode as u64
}

struct PendingHotkey {
    hotkey: Hotkey,
    file: PathBuf,
    line: u32,
    col: u32,
}

/// Accumulates state across all loaded files.
struct Compiler<'c> {
    catalog: &'c KeyCatalog,
    mappings: Mappings,
    /// Hotkeys stay malleable until the end of the parse so that later
    /// process-map extensions can merge into them.
    pending: Vec<PendingHotkey>,
    /// (mode name, identity) → index into `pending`.
    index: HashMap<(String, u64), usize>,
    errors: Vec<ParseError>,
    /// Files currently being parsed, for cycle detection.
    loading: Vec<PathBuf>,
    /// Every file parsed so far, for sibling dedup.
    loaded: HashSet<PathBuf>,
}

impl<'c> Compiler<'c> {
    fn new(catalog: &'c KeyCatalog) -> Compiler<'c> {
        Compiler {
            catalog,
            mappings: Mappings::new(),
            pending: Vec::new(),
            index: HashMap::new(),
            errors: Vec::new(),
            loading: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    fn parse_root(&mut self, src: &str, abs: &Path) {
        self.mappings.add_loaded_file(abs);
        self.loaded.insert(abs.to_path_buf());
        self.loading.push(abs.to_path_buf());
        FileParser::new(src, abs, self.catalog).run(self);
        self.loading.pop();
    }

    /// Parse a `.load`ed file. `origin` positions diagnostics at the
    /// directive that pulled the file in.
    fn load(&mut self, path: &Path, origin: &ParseError) {
        let abs = absolute(path);
        if self.loading.contains(&abs) {
            self.errors.push(ParseError {
                kind: ParseErrorKind::CyclicLoad,
                ..origin.clone()
            });
            return;
        }
        if self.loaded.contains(&abs) {
            // The same file reached from two siblings is parsed once.
            return;
        }
        let bytes = match std::fs::read(&abs) {
            Ok(bytes) => bytes,
            Err(e) => {
                let kind = if e.kind() == std::io::ErrorKind::NotFound {
                    ParseErrorKind::LoadNotFound
                } else {
                    ParseErrorKind::IoError
                };
                self.errors.push(ParseError {
                    kind,
                    ..origin.clone()
                });
                return;
            }
        };
        let src = match String::from_utf8(bytes) {
            Ok(src) => src,
            Err(_) => {
                self.errors.push(ParseError {
                    kind: ParseErrorKind::InvalidUtf8,
                    ..origin.clone()
                });
                return;
            }
        };
        self.parse_root(&src, &abs);
    }

    /// Register a fully parsed hotkey, merging its process map into an
    /// identity-equal hotkey already registered in one of its modes.
    fn register(&mut self, hotkey: Hotkey, err: ParseError) -> Result<(), ParseError> {
        let ident = identity_key(&hotkey);
        let mut existing: Option<usize> = None;
        for mode in &hotkey.modes {
            if let Some(&idx) = self.index.get(&(mode.clone(), ident)) {
                match existing {
                    None => existing = Some(idx),
                    Some(prev) if prev == idx => {}
                    Some(prev) => {
                        let at = &self.pending[prev];
                        return Err(err.with_previous(at.line, at.col));
                    }
                }
            }
        }
        match existing {
            None => {
                let idx = self.pending.len();
                for mode in &hotkey.modes {
                    self.index.insert((mode.clone(), ident), idx);
                }
                self.pending.push(PendingHotkey {
                    hotkey,
                    file: err.file,
                    line: err.line,
                    col: err.col,
                });
            }
            Some(idx) => {
                let (prev_line, prev_col) = (self.pending[idx].line, self.pending[idx].col);
                let prev = &mut self.pending[idx].hotkey;
                if prev.flags != hotkey.flags || prev.actions.merge(&hotkey.actions).is_some() {
                    return Err(err.with_previous(prev_line, prev_col));
                }
                for mode in &hotkey.modes {
                    if !prev.modes.contains(mode) {
                        prev.modes.push(mode.clone());
                    }
                    self.index.insert((mode.clone(), ident), idx);
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> ParseOutcome {
        self.mappings.ensure_default_mode();
        for pending in self.pending {
            if let Err(err) = self.mappings.add_hotkey(pending.hotkey) {
                // The compiler's bookkeeping should make this unreachable;
                // surface it rather than dropping it.
                self.errors.push(ParseError::new(
                    ParseErrorKind::DuplicateHotkey,
                    pending.file,
                    pending.line,
                    pending.col,
                    err.to_string(),
                ));
            }
        }
        ParseOutcome {
            mappings: self.mappings,
            errors: self.errors,
        }
    }
}

/// Recursive-descent parser over one file's token stream.
struct FileParser<'s, 'p> {
    tokens: std::iter::Peekable<Lexer<'s>>,
    file: &'p Path,
    catalog: &'p KeyCatalog,
    /// Position of the last consumed token, for end-of-file diagnostics.
    last: (u32, u32),
}

impl<'s, 'p> FileParser<'s, 'p> {
    fn new(src: &'s str, file: &'p Path, catalog: &'p KeyCatalog) -> FileParser<'s, 'p> {
        FileParser {
            tokens: Lexer::new(src).peekable(),
            file,
            catalog,
            last: (1, 1),
        }
    }

    fn advance(&mut self) -> Option<Token<'s>> {
        let tok = self.tokens.next();
        if let Some(tok) = &tok {
            self.last = (tok.line, tok.col);
        }
        tok
    }

    fn run(mut self, compiler: &mut Compiler) {
        loop {
            let Some(tok) = self.tokens.peek().copied() else {
                break;
            };
            let result = match tok.kind {
                TokenKind::Option => self.parse_directive(compiler),
                TokenKind::Decl => self.parse_mode_decl(compiler),
                TokenKind::Identifier
                | TokenKind::Modifier
                | TokenKind::Literal
                | TokenKind::Key
                | TokenKind::KeyHex => self.parse_form(compiler),
                _ => {
                    self.advance();
                    Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok))
                }
            };
            if let Err(err) = result {
                // Resume at the first token on a later line.
                while let Some(tok) = self.tokens.peek() {
                    if tok.line > err.line {
                        break;
                    }
                    self.advance();
                }
                compiler.errors.push(err);
            }
        }
    }

    fn err_at(&self, kind: ParseErrorKind, tok: &Token) -> ParseError {
        ParseError::new(kind, self.file, tok.line, tok.col, tok.text)
    }

    fn err_eof(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.file, self.last.0, self.last.1, "")
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'s>, ParseError> {
        match self.advance() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
            None => Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|tok| tok.kind)
    }

    /// `.load`, `.shell`, or `.blacklist`.
    fn parse_directive(&mut self, compiler: &mut Compiler) -> Result<(), ParseError> {
        let tok = self.advance().expect("caller peeked an Option token");
        match tok.text {
            "load" => {
                let arg = self.expect(TokenKind::String)?;
                let mut path = PathBuf::from(arg.text);
                if path.is_relative() {
                    if let Some(dir) = self.file.parent() {
                        path = dir.join(path);
                    }
                }
                let origin = self.err_at(ParseErrorKind::LoadNotFound, &arg);
                compiler.load(&path, &origin);
                Ok(())
            }
            "shell" => {
                let arg = self.expect(TokenKind::String)?;
                compiler.mappings.set_shell(arg.text);
                Ok(())
            }
            "blacklist" => {
                self.expect(TokenKind::BeginList)?;
                loop {
                    match self.advance() {
                        Some(tok)
                            if tok.kind == TokenKind::String
                                || tok.kind == TokenKind::Identifier =>
                        {
                            if compiler.mappings.add_blacklist(tok.text).is_err() {
                                return Err(
                                    self.err_at(ParseErrorKind::BlacklistDuplicate, &tok)
                                );
                            }
                        }
                        Some(tok) if tok.kind == TokenKind::EndList => return Ok(()),
                        Some(tok) => {
                            return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok))
                        }
                        None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
                    }
                }
            }
            _ => Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
        }
    }

    /// A hotkey, optionally prefixed by a mode list ending in `<`.
    fn parse_form(&mut self, compiler: &mut Compiler) -> Result<(), ParseError> {
        let first = self.tokens.peek().copied().expect("caller peeked");
        if first.kind == TokenKind::Identifier {
            // A leading word is a mode prefix or a character key; the
            // token after it decides.
            let mut probe = self.tokens.clone();
            probe.next();
            match probe.next().map(|tok| tok.kind) {
                Some(TokenKind::Comma) | Some(TokenKind::Insert) => {
                    let names = self.parse_mode_list()?;
                    return match self.advance() {
                        Some(tok) if tok.kind == TokenKind::Insert => {
                            self.parse_scoped_hotkey(compiler, names, first)
                        }
                        Some(tok) => Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
                        None => Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
                    };
                }
                Some(TokenKind::Plus) | Some(TokenKind::Dash) => {
                    // Reads like a trigger whose first word is not a known
                    // modifier name.
                    return Err(self.err_at(ParseErrorKind::UnknownModifier, &first));
                }
                _ => {}
            }
        }
        self.parse_hotkey(compiler, Vec::new(), first)
    }

    /// A comma-separated list of mode names, rejecting duplicates.
    fn parse_mode_list(&mut self) -> Result<Vec<Token<'s>>, ParseError> {
        let mut names: Vec<Token> = Vec::new();
        loop {
            let name = match self.advance() {
                Some(tok) if tok.kind == TokenKind::Identifier => tok,
                Some(tok) => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
                None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
            };
            if names.iter().any(|n| n.text == name.text) {
                return Err(self.err_at(ParseErrorKind::DuplicateModeInList, &name));
            }
            names.push(name);
            if self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
            } else {
                return Ok(names);
            }
        }
    }

    /// `:: name, ... @? command?` — a mode declaration.
    fn parse_mode_decl(&mut self, compiler: &mut Compiler) -> Result<(), ParseError> {
        self.advance();
        let names = self.parse_mode_list()?;
        let capture = if self.peek_kind() == Some(TokenKind::Capture) {
            self.advance();
            true
        } else {
            false
        };
        let on_enter = if self.peek_kind() == Some(TokenKind::Command) {
            Some(self.advance().expect("peeked").text.to_string())
        } else {
            None
        };
        for name in names {
            let mut mode = Mode::new(name.text);
            mode.capture = capture;
            mode.on_enter = on_enter.clone();
            if compiler.mappings.put_mode(mode).is_err() {
                return Err(self.err_at(ParseErrorKind::ModeAlreadyExists, &name));
            }
        }
        Ok(())
    }

    /// The tail of `name, ... <`: the scoped hotkey. Every listed mode
    /// must have been declared.
    fn parse_scoped_hotkey(
        &mut self,
        compiler: &mut Compiler,
        names: Vec<Token>,
        first: Token,
    ) -> Result<(), ParseError> {
        let mut modes = Vec::new();
        for name in names {
            if !compiler.mappings.has_mode(name.text) {
                return Err(self.err_at(ParseErrorKind::ModeNotFound, &name));
            }
            modes.push(name.text.to_string());
        }
        self.parse_hotkey(compiler, modes, first)
    }

    /// Trigger plus action (or process map). `modes` is empty for an
    /// unscoped hotkey, which lands in `default`.
    fn parse_hotkey(
        &mut self,
        compiler: &mut Compiler,
        mut modes: Vec<String>,
        first: Token,
    ) -> Result<(), ParseError> {
        if modes.is_empty() {
            compiler.mappings.get_or_create_mode(DEFAULT_MODE);
            modes.push(DEFAULT_MODE.to_string());
        }
        let (mods, keycode, mut flags) = self.parse_trigger()?;
        // A trailing `@` fires the hotkey on key release.
        if self.peek_kind() == Some(TokenKind::Capture) {
            self.advance();
            flags |= HotkeyFlags::ON_RELEASE;
        }

        let mut hotkey = Hotkey::new(mods, keycode);
        hotkey.flags = flags;
        hotkey.modes = modes;

        // The action must start on the trigger's line; otherwise the
        // trigger has no action and the next form must not be consumed.
        let trigger_line = self.last.0;
        if self.tokens.peek().map_or(true, |tok| tok.line != trigger_line) {
            return Err(self.err_eof(ParseErrorKind::UnexpectedToken));
        }

        match self.advance() {
            Some(tok) if tok.kind == TokenKind::Command => {
                hotkey.actions.insert_wildcard(Action::Command(tok.text.to_string()));
            }
            Some(tok) if tok.kind == TokenKind::Arrow => {
                hotkey.flags |= HotkeyFlags::PASSTHROUGH;
                let cmd = self.expect(TokenKind::Command)?;
                hotkey
                    .actions
                    .insert_wildcard(Action::Command(cmd.text.to_string()));
            }
            Some(tok) if tok.kind == TokenKind::Forward => {
                let (fmods, fkeycode, _) = self.parse_trigger()?;
                hotkey.actions.insert_wildcard(Action::Forward(KeyPress {
                    mods: fmods,
                    keycode: fkeycode,
                }));
            }
            Some(tok) if tok.kind == TokenKind::Activate => {
                self.check_activate_target(compiler, &tok)?;
                hotkey.flags |= HotkeyFlags::ACTIVATE;
                hotkey
                    .actions
                    .insert_wildcard(Action::Activate(tok.text.to_string()));
            }
            Some(tok) if tok.kind == TokenKind::Unbound => {
                hotkey.actions.insert_wildcard(Action::Unbound);
            }
            Some(tok) if tok.kind == TokenKind::BeginList => {
                self.parse_process_list(compiler, &mut hotkey)?;
            }
            Some(tok) => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
            None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
        }

        let position = ParseError::new(
            ParseErrorKind::DuplicateHotkey,
            self.file,
            first.line,
            first.col,
            first.text,
        );
        compiler.register(hotkey, position)
    }

    /// The body of `[ ... ]`: process entries.
    fn parse_process_list(
        &mut self,
        compiler: &mut Compiler,
        hotkey: &mut Hotkey,
    ) -> Result<(), ParseError> {
        loop {
            let name = match self.advance() {
                Some(tok) if tok.kind == TokenKind::EndList => return Ok(()),
                Some(tok)
                    if tok.kind == TokenKind::String || tok.kind == TokenKind::Wildcard =>
                {
                    tok
                }
                Some(tok) => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
                None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
            };
            let action = match self.advance() {
                Some(tok) if tok.kind == TokenKind::Command => {
                    Action::Command(tok.text.to_string())
                }
                Some(tok) if tok.kind == TokenKind::Forward => {
                    let (fmods, fkeycode, _) = self.parse_trigger()?;
                    Action::Forward(KeyPress {
                        mods: fmods,
                        keycode: fkeycode,
                    })
                }
                Some(tok) if tok.kind == TokenKind::Unbound => Action::Unbound,
                Some(tok) if tok.kind == TokenKind::Activate => {
                    self.check_activate_target(compiler, &tok)?;
                    hotkey.flags |= HotkeyFlags::ACTIVATE;
                    Action::Activate(tok.text.to_string())
                }
                Some(tok) => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok)),
                None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
            };
            let inserted = if name.kind == TokenKind::Wildcard {
                hotkey.actions.insert_wildcard(action)
            } else {
                hotkey.actions.insert(name.text, action)
            };
            if !inserted {
                return Err(self.err_at(ParseErrorKind::DuplicateHotkey, &name));
            }
        }
    }

    fn check_activate_target(
        &self,
        compiler: &Compiler,
        tok: &Token,
    ) -> Result<(), ParseError> {
        if tok.text != DEFAULT_MODE && !compiler.mappings.has_mode(tok.text) {
            return Err(self.err_at(ParseErrorKind::ModeNotFound, tok));
        }
        Ok(())
    }

    /// `(modifier ('+' modifier)* '-')? key`.
    fn parse_trigger(&mut self) -> Result<(ModifierSet, u32, HotkeyFlags), ParseError> {
        let mut mods = ModifierSet::empty();
        let mut flags = HotkeyFlags::empty();
        if self.peek_kind() == Some(TokenKind::Modifier) {
            loop {
                let tok = self.advance().expect("peeked");
                match keycodes::modifier_from_name(tok.text) {
                    Some(bits) => mods |= bits,
                    None => return Err(self.err_at(ParseErrorKind::UnknownModifier, &tok)),
                }
                match self.advance() {
                    Some(tok) if tok.kind == TokenKind::Plus => {
                        if self.peek_kind() != Some(TokenKind::Modifier) {
                            let err = match self.advance() {
                                Some(tok) => {
                                    self.err_at(ParseErrorKind::UnknownModifier, &tok)
                                }
                                None => self.err_eof(ParseErrorKind::UnknownModifier),
                            };
                            return Err(err);
                        }
                    }
                    Some(tok) if tok.kind == TokenKind::Dash => break,
                    Some(tok) => {
                        return Err(self.err_at(ParseErrorKind::UnexpectedToken, &tok))
                    }
                    None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
                }
            }
        }
        let key = match self.advance() {
            Some(tok) => tok,
            None => return Err(self.err_eof(ParseErrorKind::UnexpectedToken)),
        };
        let keycode = match key.kind {
            TokenKind::Literal => {
                let literal = keycodes::literal_from_name(key.text)
                    .expect("lexer only classifies known literals");
                if literal.implicit_nx {
                    mods |= ModifierSet::NX;
                    flags |= HotkeyFlags::NX;
                }
                literal.keycode
            }
            // Words land here too; anything the layout cannot produce
            // (including multi-character words) is unresolvable.
            TokenKind::Key | TokenKind::Identifier => match self.catalog.resolve_char(key.text) {
                Some(keycode) => keycode,
                None => return Err(self.err_at(ParseErrorKind::UnresolvableKey, &key)),
            },
            TokenKind::KeyHex => match u32::from_str_radix(&key.text[2..], 16) {
                Ok(keycode) => keycode,
                Err(_) => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &key)),
            },
            _ => return Err(self.err_at(ParseErrorKind::UnexpectedToken, &key)),
        };
        Ok((mods, keycode, flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::Action;
    use crate::keyboard::ModifierSet;

    fn parse(src: &str) -> ParseOutcome {
        parse_str(src, Path::new("skhdrc"), &KeyCatalog::us_ansi())
    }

    fn parse_clean(src: &str) -> Mappings {
        let outcome = parse(src);
        assert!(outcome.errors.is_empty(), "unexpected errors: {:?}", outcome.errors);
        outcome.mappings
    }

    #[test]
    fn empty_config_yields_default_mode_only() {
        let mappings = parse_clean("");
        assert!(mappings.has_mode(DEFAULT_MODE));
        assert_eq!(mappings.modes().count(), 1);
        assert!(mappings.hotkeys().is_empty());
    }

    #[test]
    fn simple_command_hotkey() {
        let mappings = parse_clean("cmd - space : echo hi");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode
            .lookup(ModifierSet::CMD | ModifierSet::LCMD, 0x31)
            .expect("cmd-space should resolve");
        assert_eq!(hit.actions.wildcard(), Some(&Action::Command("echo hi".into())));
        assert!(hit.flags.is_empty());
    }

    #[test]
    fn per_process_overrides() {
        let src = "cmd - t [\n    \"terminal\" : open -a Terminal\n    * : echo other\n]";
        let mappings = parse_clean(src);
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::CMD, 0x11).unwrap();
        assert_eq!(
            hit.actions.select("terminal"),
            Some(&Action::Command("open -a Terminal".into()))
        );
        assert_eq!(
            hit.actions.select("safari"),
            Some(&Action::Command("echo other".into()))
        );
    }

    #[test]
    fn passthrough_sets_the_flag() {
        let mappings = parse_clean("cmd - s -> : sync");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::CMD, 0x01).unwrap();
        assert!(hit.flags.contains(HotkeyFlags::PASSTHROUGH));
        assert_eq!(hit.actions.wildcard(), Some(&Action::Command("sync".into())));
    }

    #[test]
    fn forward_action_parses_the_target_trigger() {
        let mappings = parse_clean("f13 | escape");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::empty(), 0x69).unwrap();
        assert_eq!(
            hit.actions.wildcard(),
            Some(&Action::Forward(KeyPress {
                mods: ModifierSet::empty(),
                keycode: 0x35,
            }))
        );
    }

    #[test]
    fn modes_declare_activate_and_scope() {
        let src = ":: window @ : echo enter\n\
                   cmd - w ; window\n\
                   window < h : echo left\n\
                   window < escape ; default";
        let mappings = parse_clean(src);

        let window = mappings.mode("window").unwrap();
        assert!(window.capture);
        assert_eq!(window.on_enter.as_deref(), Some("echo enter"));
        assert_eq!(window.hotkey_count(), 2);

        let default = mappings.mode(DEFAULT_MODE).unwrap();
        let activate = default.lookup(ModifierSet::CMD, 0x0d).unwrap();
        assert!(activate.flags.contains(HotkeyFlags::ACTIVATE));
        assert_eq!(
            activate.actions.wildcard(),
            Some(&Action::Activate("window".into()))
        );

        let back = window.lookup(ModifierSet::empty(), 0x35).unwrap();
        assert_eq!(
            back.actions.wildcard(),
            Some(&Action::Activate("default".into()))
        );
    }

    #[test]
    fn single_character_mode_names_parse() {
        let src = ":: v\ncmd - v ; v\nv < h : echo left\nv < escape ; default";
        let mappings = parse_clean(src);
        let v = mappings.mode("v").unwrap();
        assert_eq!(v.hotkey_count(), 2);
        // `v` the mode name and `v` the key coexist.
        let default = mappings.mode(DEFAULT_MODE).unwrap();
        let activate = default.lookup(ModifierSet::CMD, 0x09).unwrap();
        assert_eq!(
            activate.actions.wildcard(),
            Some(&Action::Activate("v".into()))
        );
    }

    #[test]
    fn hotkey_shared_between_modes_is_one_object() {
        let src = ":: a\n:: b\na, b < cmd - x : echo shared";
        let mappings = parse_clean(src);
        let in_a = mappings.mode("a").unwrap().lookup(ModifierSet::CMD, 0x07).unwrap();
        let in_b = mappings.mode("b").unwrap().lookup(ModifierSet::CMD, 0x07).unwrap();
        assert!(std::rc::Rc::ptr_eq(in_a, in_b));
        assert_eq!(mappings.hotkeys().len(), 1);
    }

    #[test]
    fn undeclared_mode_prefix_is_a_strict_error() {
        let outcome = parse("window < h : echo left\ncmd - x : echo ok");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::ModeNotFound);
        assert_eq!(outcome.errors[0].token, "window");
        // Parsing resumed on the next line.
        let mode = outcome.mappings.mode(DEFAULT_MODE).unwrap();
        assert!(mode.lookup(ModifierSet::CMD, 0x07).is_some());
    }

    #[test]
    fn duplicate_mode_in_list_is_rejected() {
        let outcome = parse(":: a\na, a < cmd - x : echo");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::DuplicateModeInList);
    }

    #[test]
    fn duplicate_mode_declaration_is_rejected() {
        let outcome = parse(":: a\n:: a");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::ModeAlreadyExists);
    }

    #[test]
    fn duplicate_hotkey_reports_both_positions() {
        let outcome = parse("cmd - x : one\ncmd - x : two");
        assert_eq!(outcome.errors.len(), 1);
        let err = &outcome.errors[0];
        assert_eq!(err.kind, ParseErrorKind::DuplicateHotkey);
        assert_eq!(err.line, 2);
        assert_eq!(err.previous, Some((1, 1)));
    }

    #[test]
    fn later_process_entries_extend_earlier_hotkeys() {
        let src = "cmd - x : fallback\ncmd - x [\n    \"kitty\" : echo kitty\n]";
        let mappings = parse_clean(src);
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::CMD, 0x07).unwrap();
        assert_eq!(hit.actions.select("kitty"), Some(&Action::Command("echo kitty".into())));
        assert_eq!(hit.actions.select("other"), Some(&Action::Command("fallback".into())));
        assert_eq!(mappings.hotkeys().len(), 1);
    }

    #[test]
    fn conflicting_process_key_is_a_duplicate_error() {
        let src = "cmd - x [\n    \"kitty\" : one\n]\ncmd - x [\n    \"kitty\" : two\n]";
        let outcome = parse(src);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::DuplicateHotkey);
        assert!(outcome.errors[0].previous.is_some());
    }

    #[test]
    fn side_specific_hotkeys_are_distinct_identities() {
        let mappings = parse_clean("alt - x : general\nlalt - x : left");
        assert_eq!(mappings.hotkeys().len(), 2);
    }

    #[test]
    fn unknown_modifier_diagnoses_the_word() {
        let outcome = parse("comd + shift - x : echo");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::UnknownModifier);
        assert_eq!(outcome.errors[0].token, "comd");
    }

    #[test]
    fn unresolvable_key_is_reported() {
        let outcome = parse("cmd - é : echo");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::UnresolvableKey);
        assert_eq!(outcome.errors[0].token, "é");
    }

    #[test]
    fn hex_keys_are_taken_verbatim() {
        let mappings = parse_clean("cmd - 0x32 : echo backtick");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        assert!(mode.lookup(ModifierSet::CMD, 0x32).is_some());
    }

    #[test]
    fn media_keys_carry_the_nx_bit() {
        let mappings = parse_clean("play : echo toggle");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::NX, 0x10).unwrap();
        assert!(hit.flags.contains(HotkeyFlags::NX));
        // Without the NX bit the same keycode is a different key.
        assert!(mode.lookup(ModifierSet::empty(), 0x10).is_none());
    }

    #[test]
    fn hyper_expands_to_all_four_families() {
        let mappings = parse_clean("hyper - a : echo");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let event = ModifierSet::CMD
            | ModifierSet::LCMD
            | ModifierSet::ALT
            | ModifierSet::LALT
            | ModifierSet::SHIFT
            | ModifierSet::LSHIFT
            | ModifierSet::CONTROL
            | ModifierSet::LCONTROL;
        assert!(mode.lookup(event, 0x00).is_some());
    }

    #[test]
    fn on_release_flag_via_trailing_at() {
        let mappings = parse_clean("cmd - x @ : echo up");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::CMD, 0x07).unwrap();
        assert!(hit.flags.contains(HotkeyFlags::ON_RELEASE));
    }

    #[test]
    fn unbound_swallows() {
        let mappings = parse_clean("cmd - q ~");
        let mode = mappings.mode(DEFAULT_MODE).unwrap();
        let hit = mode.lookup(ModifierSet::CMD, 0x0c).unwrap();
        assert_eq!(hit.actions.wildcard(), Some(&Action::Unbound));
    }

    #[test]
    fn shell_and_blacklist_directives() {
        let src = ".shell \"/bin/dash\"\n.blacklist [\n    \"LastPass\"\n    loginwindow\n]";
        let mappings = parse_clean(src);
        assert_eq!(mappings.shell(), "/bin/dash");
        assert!(mappings.is_blacklisted("lastpass"));
        assert!(mappings.is_blacklisted("loginwindow"));
    }

    #[test]
    fn duplicate_blacklist_entry_is_rejected() {
        let outcome = parse(".blacklist [ \"kitty\" \"Kitty\" ]");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::BlacklistDuplicate);
    }

    #[test]
    fn activating_an_undeclared_mode_is_an_error() {
        let outcome = parse("cmd - w ; window");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::ModeNotFound);
        assert_eq!(outcome.errors[0].token, "window");
    }

    #[test]
    fn load_follows_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extra.skhdrc"), "cmd - e : echo extra\n").unwrap();
        let main = dir.path().join("skhdrc");
        std::fs::write(&main, ".load \"extra.skhdrc\"\ncmd - m : echo main\n").unwrap();

        let outcome = parse_file(&main, &KeyCatalog::us_ansi()).unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        let mode = outcome.mappings.mode(DEFAULT_MODE).unwrap();
        assert!(mode.lookup(ModifierSet::CMD, 0x0e).is_some());
        assert!(mode.lookup(ModifierSet::CMD, 0x2e).is_some());
        assert_eq!(outcome.mappings.loaded_files().len(), 2);
    }

    #[test]
    fn self_load_is_cyclic() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("skhdrc");
        std::fs::write(&main, ".load \"skhdrc\"\n").unwrap();
        let outcome = parse_file(&main, &KeyCatalog::us_ansi()).unwrap();
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::CyclicLoad);
    }

    #[test]
    fn sibling_loads_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shared.skhdrc"), "cmd - s : echo shared\n").unwrap();
        let main = dir.path().join("skhdrc");
        std::fs::write(
            &main,
            ".load \"shared.skhdrc\"\n.load \"shared.skhdrc\"\n",
        )
        .unwrap();
        let outcome = parse_file(&main, &KeyCatalog::us_ansi()).unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.mappings.loaded_files().len(), 2);
    }

    #[test]
    fn missing_load_target_is_reported_with_position() {
        let outcome = parse(".load \"nope.skhdrc\"");
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::LoadNotFound);
        assert_eq!(outcome.errors[0].token, "nope.skhdrc");
    }

    #[test]
    fn keypress_specs_parse_for_the_cli() {
        let catalog = KeyCatalog::us_ansi();
        let press = parse_keypress("cmd + shift - space", &catalog).unwrap();
        assert_eq!(press.mods, ModifierSet::CMD | ModifierSet::SHIFT);
        assert_eq!(press.keycode, 0x31);

        let press = parse_keypress("escape", &catalog).unwrap();
        assert_eq!(press.keycode, 0x35);

        assert!(parse_keypress("cmd +", &catalog).is_err());
        assert!(parse_keypress("cmd - space trailing", &catalog).is_err());
    }

    #[test]
    fn trigger_without_action_does_not_eat_the_next_form() {
        let outcome = parse("cmd - x\ncmd - y : ok");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, ParseErrorKind::UnexpectedToken);
        let mode = outcome.mappings.mode(DEFAULT_MODE).unwrap();
        assert!(mode.lookup(ModifierSet::CMD, 0x10).is_some());
    }

    #[test]
    fn recovery_reports_every_error_in_order() {
        let src = "comd - x : echo\ncmd - é : echo\ncmd - x : echo ok";
        let outcome = parse(src);
        let kinds: Vec<_> = outcome.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ParseErrorKind::UnknownModifier, ParseErrorKind::UnresolvableKey]
        );
        let mode = outcome.mappings.mode(DEFAULT_MODE).unwrap();
        assert!(mode.lookup(ModifierSet::CMD, 0x07).is_some());
    }
}
