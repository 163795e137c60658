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

//! Tokenizer for the skhdrc configuration language.
//!
//! The lexer operates on a `&str`, so the input is valid UTF-8 by
//! construction; the byte-level UTF-8 check happens where the file is read.
//! Positions are 1-based line/column pairs. Command bodies run to the end
//! of the line and honor a trailing backslash as a continuation; the body
//! is kept byte-for-byte (the shell is the one that interprets it).

use crate::keycodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A word that is neither a modifier nor a literal key name: a mode
    /// name, a blacklist entry, or a character key, depending on where it
    /// appears.
    Identifier,
    /// A known modifier name (`cmd`, `lalt`, `hyper`, ...).
    Modifier,
    /// A known literal key name (`return`, `f1`, `sound_up`, ...).
    Literal,
    /// A `0x..` keycode.
    KeyHex,
    /// A single punctuation character acting as a key.
    Key,
    /// A shell command body (everything after `:` to end of line).
    Command,
    /// `;` followed by a mode name.
    Activate,
    /// A double-quoted string (no escapes).
    String,
    /// `.` followed by a directive name (`load`, `shell`, `blacklist`).
    Option,
    /// `::`, a mode declaration.
    Decl,
    /// `<`, scoping a hotkey to the preceding mode list.
    Insert,
    /// `->`, passthrough.
    Arrow,
    /// `|`, forward/remap.
    Forward,
    Dash,
    Plus,
    Comma,
    /// `@`, capture flag on a mode declaration.
    Capture,
    /// `~`, explicitly unbound.
    Unbound,
    /// `*`, the any-process slot.
    Wildcard,
    /// `[`.
    BeginList,
    /// `]`.
    EndList,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// 1-based.
    pub line: u32,
    /// 1-based.
    pub col: u32,
}

/// A lazy token stream over the config text.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            src,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if c.is_ascii_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: u32, col: u32) -> Token<'a> {
        Token {
            kind,
            text: &self.src[start..self.pos],
            line,
            col,
        }
    }

    /// Read a word of identifier characters starting at the current
    /// position and classify it.
    fn lex_word(&mut self, line: u32, col: u32) -> Token<'a> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        // Whether an identifier is a mode name or a character key is
        // decided by its position in the grammar, not here.
        let kind = if keycodes::is_modifier_name(text) {
            TokenKind::Modifier
        } else if keycodes::is_literal_name(text) {
            TokenKind::Literal
        } else {
            TokenKind::Identifier
        };
        Token {
            kind,
            text,
            line,
            col,
        }
    }

    /// Read a command body: everything up to end of line, with `\` at end
    /// of line continuing onto the next physical line. The bytes are kept
    /// exactly as written.
    fn lex_command(&mut self, line: u32, col: u32) -> Token<'a> {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            if c == '\\' && matches!(self.peek2(), Some('\n') | None) {
                // Consume the backslash and the newline, keep lexing.
                self.bump();
                self.bump();
                continue;
            }
            self.bump();
        }
        let text = self.src[start..self.pos].trim_end();
        Token {
            kind: TokenKind::Command,
            text,
            line,
            col,
        }
    }

    fn lex_string(&mut self, line: u32, col: u32) -> Token<'a> {
        // Opening quote is already consumed.
        let start = self.pos;
        loop {
            match self.peek() {
                Some('"') => {
                    let text = &self.src[start..self.pos];
                    self.bump();
                    return Token {
                        kind: TokenKind::String,
                        text,
                        line,
                        col,
                    };
                }
                Some('\n') | None => {
                    return self.token(TokenKind::Unknown, start, line, col);
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn lex_hex(&mut self, line: u32, col: u32) -> Token<'a> {
        let start = self.pos;
        // "0x" prefix.
        self.bump();
        self.bump();
        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
            self.bump();
        }
        self.token(TokenKind::KeyHex, start, line, col)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_trivia();
        let (line, col) = (self.line, self.col);
        let start = self.pos;
        let c = self.peek()?;
        let (kind, advance) = match c {
            '+' => (TokenKind::Plus, 1),
            ',' => (TokenKind::Comma, 1),
            '<' => (TokenKind::Insert, 1),
            '@' => (TokenKind::Capture, 1),
            '~' => (TokenKind::Unbound, 1),
            '*' => (TokenKind::Wildcard, 1),
            '[' => (TokenKind::BeginList, 1),
            ']' => (TokenKind::EndList, 1),
            '|' => (TokenKind::Forward, 1),
            '-' if self.peek2() == Some('>') => (TokenKind::Arrow, 2),
            '-' => (TokenKind::Dash, 1),
            ':' if self.peek2() == Some(':') => (TokenKind::Decl, 2),
            ':' => {
                self.bump();
                return Some(self.lex_command(line, col));
            }
            '"' => {
                self.bump();
                return Some(self.lex_string(line, col));
            }
            '.' => {
                self.bump();
                let mut tok = self.lex_word(line, col);
                tok.kind = if tok.text.is_empty() {
                    TokenKind::Unknown
                } else {
                    TokenKind::Option
                };
                return Some(tok);
            }
            ';' => {
                self.bump();
                while matches!(self.peek(), Some(' ') | Some('\t')) {
                    self.bump();
                }
                let mut tok = self.lex_word(line, col);
                tok.kind = if tok.text.is_empty() {
                    TokenKind::Unknown
                } else {
                    TokenKind::Activate
                };
                return Some(tok);
            }
            '0' if matches!(self.peek2(), Some('x') | Some('X')) => {
                return Some(self.lex_hex(line, col));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                return Some(self.lex_word(line, col));
            }
            // Remaining printable punctuation acts as a single-character
            // key, resolved through the layout map.
            c if !c.is_control() => (TokenKind::Key, 1),
            _ => (TokenKind::Unknown, 1),
        };
        for _ in 0..advance {
            self.bump();
        }
        Some(self.token(kind, start, line, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_a_simple_hotkey() {
        let toks: Vec<_> = Lexer::new("cmd + shift - space : open -a Terminal").collect();
        let expected = [
            (TokenKind::Modifier, "cmd"),
            (TokenKind::Plus, "+"),
            (TokenKind::Modifier, "shift"),
            (TokenKind::Dash, "-"),
            (TokenKind::Literal, "space"),
            (TokenKind::Command, "open -a Terminal"),
        ];
        assert_eq!(toks.len(), expected.len());
        for (tok, (kind, text)) in toks.iter().zip(expected) {
            assert_eq!((tok.kind, tok.text), (kind, text));
        }
    }

    #[test]
    fn tracks_line_and_column() {
        let toks: Vec<_> = Lexer::new("# comment\n  alt - h : echo hi").collect();
        assert_eq!((toks[0].line, toks[0].col), (2, 3));
        assert_eq!(toks[0].text, "alt");
        let cmd = toks.last().unwrap();
        assert_eq!(cmd.kind, TokenKind::Command);
        assert_eq!((cmd.line, cmd.col), (2, 11));
    }

    #[test]
    fn command_continuation_keeps_bytes() {
        let src = "cmd - x : echo one \\\n     two";
        let cmd = Lexer::new(src).last().unwrap();
        assert_eq!(cmd.kind, TokenKind::Command);
        assert_eq!(cmd.text, "echo one \\\n     two");
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        assert_eq!(
            kinds("a # b c d\nq"),
            vec![TokenKind::Identifier, TokenKind::Identifier]
        );
    }

    #[test]
    fn words_classify_by_table_not_length() {
        let toks: Vec<_> = Lexer::new("cmd f1 a window").collect();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Modifier,
                TokenKind::Literal,
                TokenKind::Identifier,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn mode_declaration_tokens() {
        let toks: Vec<_> = Lexer::new(":: window @ : echo enter").collect();
        assert_eq!(toks[0].kind, TokenKind::Decl);
        assert_eq!((toks[1].kind, toks[1].text), (TokenKind::Identifier, "window"));
        assert_eq!(toks[2].kind, TokenKind::Capture);
        assert_eq!((toks[3].kind, toks[3].text), (TokenKind::Command, "echo enter"));
    }

    #[test]
    fn activate_consumes_the_mode_name() {
        let toks: Vec<_> = Lexer::new("cmd - w ; window").collect();
        let last = toks.last().unwrap();
        assert_eq!((last.kind, last.text), (TokenKind::Activate, "window"));
    }

    #[test]
    fn option_directives_and_strings() {
        let toks: Vec<_> = Lexer::new(".load \"partial file.skhdrc\"").collect();
        assert_eq!((toks[0].kind, toks[0].text), (TokenKind::Option, "load"));
        assert_eq!(
            (toks[1].kind, toks[1].text),
            (TokenKind::String, "partial file.skhdrc")
        );
    }

    #[test]
    fn hex_keys_and_process_lists() {
        let src = "cmd - 0x32 [\n    \"kitty\" ~\n    * : echo x\n]";
        let toks: Vec<_> = Lexer::new(src).collect();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Modifier,
                TokenKind::Dash,
                TokenKind::KeyHex,
                TokenKind::BeginList,
                TokenKind::String,
                TokenKind::Unbound,
                TokenKind::Wildcard,
                TokenKind::Command,
                TokenKind::EndList,
            ]
        );
        assert_eq!(toks[2].text, "0x32");
        assert_eq!(toks[7].text, "echo x");
    }

    #[test]
    fn forward_and_passthrough_operators() {
        assert_eq!(
            kinds("f13 | escape"),
            vec![TokenKind::Literal, TokenKind::Forward, TokenKind::Literal]
        );
        let toks: Vec<_> = Lexer::new("cmd - s -> : sync").collect();
        assert_eq!(toks[2].kind, TokenKind::Arrow);
        assert_eq!(toks[3].kind, TokenKind::Command);
    }

    #[test]
    fn punctuation_keys_lex_as_keys() {
        let toks: Vec<_> = Lexer::new("cmd - '").collect();
        assert_eq!((toks[2].kind, toks[2].text), (TokenKind::Key, "'"));
    }

    #[test]
    fn retokenizing_reconstructed_source_is_stable() {
        let src = ":: focus @\ncmd + lalt - h [ \"safari\" : echo s * ~ ]\nfocus < escape ; default";
        let first: Vec<_> = Lexer::new(src).collect();
        let mut rebuilt = String::new();
        for tok in &first {
            match tok.kind {
                TokenKind::Command => rebuilt.push_str(": "),
                TokenKind::Activate => rebuilt.push_str("; "),
                TokenKind::Option => rebuilt.push('.'),
                TokenKind::String => rebuilt.push('"'),
                _ => {}
            }
            rebuilt.push_str(tok.text);
            if tok.kind == TokenKind::String {
                rebuilt.push('"');
            }
            // Commands run to end of line, so they must stay line-final.
            rebuilt.push(if tok.kind == TokenKind::Command { '\n' } else { ' ' });
        }
        let second: Vec<_> = Lexer::new(&rebuilt).collect();
        let strip = |toks: &[Token]| -> Vec<(TokenKind, String)> {
            toks.iter().map(|t| (t.kind, t.text.to_string())).collect()
        };
        assert_eq!(strip(&first), strip(&second));
    }
}
