// src/core/interp/expand.rs

//! Word expansion: quote removal, parameters, command substitution,
//! arithmetic, field splitting and pathname expansion, in that order.

use super::io::{Io, Out};
use super::{Control, Flow, Interpreter, SCRIPT_NAME, arith, braces, pattern, vars};
use crate::constants::GENERIC_FAILURE_CODE;
use crate::core::syntax;
use std::sync::PoisonError;

const DEFAULT_IFS: &str = " \t\n";

/// A run of text produced while scanning one word.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    /// Unquoted source text: not split, but globbed.
    Literal(String),
    /// Quoted or escaped text: neither split nor globbed.
    Quoted(String),
    /// The result of an unquoted expansion: split and globbed.
    Expanded(String),
    /// `"$@"`: one field per element; the first and last join their
    /// neighbours.
    Fields(Vec<String>),
}

impl Piece {
    fn into_text(self) -> String {
        match self {
            Self::Literal(text) | Self::Quoted(text) | Self::Expanded(text) => text,
            Self::Fields(values) => values.join(" "),
        }
    }
}

/// A cursor over the characters of a word.
struct Scan {
    chars: Vec<char>,
    pos: usize,
}

impl Scan {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, mut f: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|&c| f(c)) {
            out.push(c);
            self.pos += 1;
        }
        out
    }

    /// Everything up to `end`, which is consumed. The rest of the word if
    /// `end` never comes.
    fn until(&mut self, end: char) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == end {
                break;
            }
            out.push(c);
        }
        out
    }

    /// The text up to the `close` balancing an `open` consumed just before.
    /// Quoted regions do not count. The closing character is consumed.
    fn balanced(&mut self, open: char, close: char) -> String {
        let mut depth = 1usize;
        let mut text = String::new();
        let (mut single, mut double) = (false, false);
        while let Some(c) = self.bump() {
            match c {
                '\\' if !single => {
                    text.push(c);
                    if let Some(next) = self.bump() {
                        text.push(next);
                    }
                    continue;
                }
                '\'' if !double => single = !single,
                '"' if !single => double = !double,
                c if c == open && !single && !double => depth += 1,
                c if c == close && !single && !double => {
                    depth -= 1;
                    if depth == 0 {
                        return text;
                    }
                }
                _ => {}
            }
            text.push(c);
        }
        text
    }
}

/// One field under construction.
#[derive(Debug, Default)]
struct Field {
    text: String,
    /// The same text as a pattern: quoted parts escaped.
    pattern: String,
    has_glob: bool,
}

/// Splits expansion results into fields on `IFS`.
struct FieldBuilder {
    ifs: String,
    fields: Vec<Field>,
    current: Field,
    started: bool,
    /// A whitespace delimiter just ended a field.
    after_space: bool,
}

impl FieldBuilder {
    fn new(ifs: String) -> Self {
        Self {
            ifs,
            fields: Vec::new(),
            current: Field::default(),
            started: false,
            after_space: false,
        }
    }

    fn finish(&mut self) {
        self.fields.push(std::mem::take(&mut self.current));
        self.started = false;
    }

    fn quoted(&mut self, text: &str) {
        self.current.text.push_str(text);
        self.current.pattern.push_str(&pattern::escape(text));
        self.started = true;
        self.after_space = false;
    }

    fn literal(&mut self, text: &str) {
        self.current.text.push_str(text);
        self.current.pattern.push_str(text);
        self.current.has_glob |= pattern::has_glob_chars(text);
        self.started = true;
        self.after_space = false;
    }

    fn expanded_char(&mut self, c: char) {
        self.current.text.push(c);
        if c == '\\' {
            self.current.pattern.push_str("\\\\");
        } else {
            self.current.pattern.push(c);
        }
        self.current.has_glob |= matches!(c, '*' | '?' | '[');
        self.started = true;
        self.after_space = false;
    }

    fn expanded(&mut self, text: &str) {
        for c in text.chars() {
            if !self.ifs.contains(c) {
                self.expanded_char(c);
            } else if c.is_whitespace() {
                if self.started {
                    self.finish();
                    self.after_space = true;
                }
            } else {
                // A non-space delimiter always ends a field, even an empty one.
                if self.started || !self.after_space {
                    self.finish();
                }
                self.after_space = false;
            }
        }
    }

    fn fields(&mut self, values: &[String]) {
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                self.finish();
            }
            self.quoted(value);
        }
    }

    fn done(mut self) -> Vec<Field> {
        if self.started {
            self.finish();
        }
        self.fields
    }
}

/// A parsed `${...}` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Default,
    Assign,
    Alternative,
    Error,
}

impl Interpreter {
    /// Expands words into fields: braces, then everything else, then
    /// splitting and pathname expansion.
    pub(super) fn expand_words(&mut self, raw: &[String], io: &Io) -> Flow<Vec<String>> {
        let mut out = Vec::new();
        for word in raw {
            for word in braces::expand(word) {
                let pieces = self.word_pieces(&word, io)?;
                let mut builder = FieldBuilder::new(self.ifs());
                for piece in &pieces {
                    match piece {
                        Piece::Literal(text) => builder.literal(text),
                        Piece::Quoted(text) => builder.quoted(text),
                        Piece::Expanded(text) => builder.expanded(text),
                        Piece::Fields(values) => builder.fields(values),
                    }
                }
                for field in builder.done() {
                    if field.has_glob && !self.flags.noglob {
                        let matches = pattern::expand_paths(&self.cwd, &field.pattern);
                        if !matches.is_empty() {
                            out.extend(matches);
                            continue;
                        }
                    }
                    out.push(field.text);
                }
            }
        }
        Ok(out)
    }

    /// Expands one word into a single string, without splitting or globbing.
    /// Used for assignments, redirection targets and `case` words.
    pub(super) fn expand_string(&mut self, raw: &str, io: &Io) -> Flow<String> {
        Ok(self
            .word_pieces(raw, io)?
            .into_iter()
            .map(Piece::into_text)
            .collect())
    }

    /// Expands a word used as a pattern: quoted parts lose their special
    /// meaning.
    pub(super) fn expand_pattern(&mut self, raw: &str, io: &Io) -> Flow<String> {
        Ok(self
            .word_pieces(raw, io)?
            .into_iter()
            .map(|piece| match piece {
                Piece::Literal(text) | Piece::Expanded(text) => text,
                Piece::Quoted(text) => pattern::escape(&text),
                Piece::Fields(values) => pattern::escape(&values.join(" ")),
            })
            .collect())
    }

    /// Expands a here-document body: only `$`, backquotes and backslashes
    /// before `$`, `` ` `` or `\` are special.
    pub(super) fn expand_heredoc(&mut self, body: &str, io: &Io) -> Flow<String> {
        let mut scan = Scan::new(body);
        let mut out = String::new();
        while let Some(c) = scan.bump() {
            match c {
                '\\' => match scan.peek() {
                    Some(next @ ('$' | '`' | '\\')) => {
                        scan.bump();
                        out.push(next);
                    }
                    Some('\n') => {
                        scan.bump();
                    }
                    _ => out.push('\\'),
                },
                '$' => out.push_str(&self.dollar(&mut scan, io, true)?.into_text()),
                '`' => out.push_str(&self.backquoted(&mut scan, io)?),
                c => out.push(c),
            }
        }
        Ok(out)
    }

    /// Evaluates `$(( ))`, `(( ))` and `let` text after parameter expansion.
    pub(super) fn eval_arithmetic(&mut self, text: &str, io: &Io) -> Flow<i64> {
        let expanded = self.expand_string(text, io)?;
        arith::evaluate(&expanded, &mut self.vars).map_err(|message| {
            io.error(message);
            Control::Failed(GENERIC_FAILURE_CODE)
        })
    }

    /// Runs `script` in a subshell and returns its output without trailing
    /// newlines.
    pub(super) fn command_substitution(&mut self, script: &str, io: &Io) -> Flow<String> {
        let program = match syntax::parse(script) {
            Ok(program) => program,
            Err(e) => {
                io.error(format!("command substitution: {}", e));
                return Err(Control::Failed(2));
            }
        };
        let (stdout, buffer) = Out::buffer();
        let sub_io = Io {
            stdin: io.stdin.clone(),
            stdout,
            stderr: io.stderr.clone(),
        };
        let status = self.subshell(|sub| sub.run_program(&program, &sub_io))?;
        self.last_subst_status = Some(status);
        let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        let kept = text.trim_end_matches('\n').len();
        text.truncate(kept);
        Ok(text)
    }

    pub(super) fn ifs(&self) -> String {
        self.vars.get("IFS").unwrap_or(DEFAULT_IFS).to_string()
    }

    fn home(&self) -> String {
        self.vars
            .get("HOME")
            .map(str::to_string)
            .or_else(|| dirs::home_dir().map(|home| home.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "~".to_string())
    }

    fn word_pieces(&mut self, raw: &str, io: &Io) -> Flow<Vec<Piece>> {
        let mut scan = Scan::new(raw);
        let mut pieces = Vec::new();
        if scan.peek() == Some('~') && matches!(scan.peek_at(1), None | Some('/')) {
            scan.bump();
            pieces.push(Piece::Quoted(self.home()));
        }
        while let Some(c) = scan.bump() {
            match c {
                '\'' => pieces.push(Piece::Quoted(scan.until('\''))),
                '"' => self.double_quoted(&mut scan, io, &mut pieces)?,
                '\\' => match scan.bump() {
                    Some('\n') => {}
                    Some(next) => pieces.push(Piece::Quoted(next.to_string())),
                    None => push_literal(&mut pieces, '\\'),
                },
                '$' if scan.peek() == Some('\'') => {
                    scan.bump();
                    pieces.push(Piece::Quoted(ansi_c(&mut scan)));
                }
                '$' => {
                    let piece = self.dollar(&mut scan, io, false)?;
                    pieces.push(piece);
                }
                '`' => {
                    let text = self.backquoted(&mut scan, io)?;
                    pieces.push(Piece::Expanded(text));
                }
                c => push_literal(&mut pieces, c),
            }
        }
        Ok(pieces)
    }

    fn double_quoted(&mut self, scan: &mut Scan, io: &Io, pieces: &mut Vec<Piece>) -> Flow<()> {
        let before = pieces.len();
        let mut text = String::new();
        while let Some(c) = scan.bump() {
            match c {
                '"' => break,
                '\\' => match scan.peek() {
                    Some(next @ ('$' | '`' | '"' | '\\')) => {
                        scan.bump();
                        text.push(next);
                    }
                    Some('\n') => {
                        scan.bump();
                    }
                    _ => text.push('\\'),
                },
                '$' => {
                    flush(&mut text, pieces);
                    let piece = self.dollar(scan, io, true)?;
                    pieces.push(piece);
                }
                '`' => {
                    flush(&mut text, pieces);
                    let output = self.backquoted(scan, io)?;
                    pieces.push(Piece::Quoted(output));
                }
                c => text.push(c),
            }
        }
        flush(&mut text, pieces);
        // `""` is still an (empty) field.
        if pieces.len() == before {
            pieces.push(Piece::Quoted(String::new()));
        }
        Ok(())
    }

    fn backquoted(&mut self, scan: &mut Scan, io: &Io) -> Flow<String> {
        let mut script = String::new();
        while let Some(c) = scan.bump() {
            match c {
                '`' => break,
                '\\' => match scan.peek() {
                    Some(next @ ('$' | '`' | '\\')) => {
                        scan.bump();
                        script.push(next);
                    }
                    _ => script.push('\\'),
                },
                c => script.push(c),
            }
        }
        self.command_substitution(&script, io)
    }

    /// Expands what follows a `$`. `quoted` is true inside double quotes.
    fn dollar(&mut self, scan: &mut Scan, io: &Io, quoted: bool) -> Flow<Piece> {
        let wrap = |text: String| {
            if quoted {
                Piece::Quoted(text)
            } else {
                Piece::Expanded(text)
            }
        };
        match scan.peek() {
            Some('(') if scan.peek_at(1) == Some('(') => {
                scan.pos += 2;
                let inner = scan.balanced('(', ')');
                if scan.eat(')') {
                    let value = self.eval_arithmetic(&inner, io)?;
                    return Ok(wrap(value.to_string()));
                }
                // `$( (subshell) ... )` rather than arithmetic.
                let rest = scan.balanced('(', ')');
                let output = self.command_substitution(&format!("({}){}", inner, rest), io)?;
                Ok(wrap(output))
            }
            Some('(') => {
                scan.bump();
                let script = scan.balanced('(', ')');
                let output = self.command_substitution(&script, io)?;
                Ok(wrap(output))
            }
            Some('{') => {
                scan.bump();
                let body = scan.balanced('{', '}');
                self.braced_parameter(&body, io, quoted)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let name = scan.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let value = self.parameter(&name, io)?;
                Ok(wrap(value.unwrap_or_default()))
            }
            Some('@') if quoted => {
                scan.bump();
                Ok(Piece::Fields(self.positional.clone()))
            }
            Some(c) if c.is_ascii_digit() || "@*?$!#-".contains(c) => {
                scan.bump();
                let value = self.parameter(&c.to_string(), io)?;
                Ok(wrap(value.unwrap_or_default()))
            }
            _ => Ok(if quoted {
                Piece::Quoted("$".to_string())
            } else {
                Piece::Literal("$".to_string())
            }),
        }
    }

    /// The value of a variable or special parameter.
    fn special_parameter(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_status.to_string()),
            "$" => Some(std::process::id().to_string()),
            "!" => self.last_bg.map(|pid| pid.to_string()),
            "#" => Some(self.positional.len().to_string()),
            "-" => Some(self.option_letters()),
            "0" => Some(SCRIPT_NAME.to_string()),
            "@" => Some(self.positional.join(" ")),
            "*" => {
                let separator = self.ifs().chars().next().map(String::from).unwrap_or_default();
                Some(self.positional.join(&separator))
            }
            digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                let index: usize = digits.parse().ok()?;
                index
                    .checked_sub(1)
                    .and_then(|i| self.positional.get(i))
                    .cloned()
            }
            _ => self.vars.get(name).map(str::to_string),
        }
    }

    /// Like `special_parameter`, but an unset name is fatal under `set -u`.
    fn parameter(&self, name: &str, io: &Io) -> Flow<Option<String>> {
        let value = self.special_parameter(name);
        if value.is_none() && self.flags.nounset && !matches!(name, "@" | "*") {
            io.error(format!("{}: unbound variable", name));
            return Err(Control::Exit(GENERIC_FAILURE_CODE));
        }
        Ok(value)
    }

    fn option_letters(&self) -> String {
        let mut letters = String::new();
        for (set, letter) in [
            (self.flags.errexit, 'e'),
            (self.flags.noglob, 'f'),
            (self.flags.nounset, 'u'),
        ] {
            if set {
                letters.push(letter);
            }
        }
        letters
    }

    /// `${...}` with every operator except arrays.
    fn braced_parameter(&mut self, body: &str, io: &Io, quoted: bool) -> Flow<Piece> {
        let wrap = |text: String| {
            if quoted {
                Piece::Quoted(text)
            } else {
                Piece::Expanded(text)
            }
        };
        let bad = |io: &Io| {
            io.error(format!("${{{}}}: bad substitution", body));
            Err(Control::Failed(GENERIC_FAILURE_CODE))
        };

        if body == "#" {
            return Ok(wrap(self.positional.len().to_string()));
        }
        if let Some(name) = body.strip_prefix('#') {
            if !is_parameter_name(name) {
                return bad(io);
            }
            let length = match name {
                "@" | "*" => self.positional.len(),
                _ => self.parameter(name, io)?.unwrap_or_default().chars().count(),
            };
            return Ok(wrap(length.to_string()));
        }
        if let Some(name) = body.strip_prefix('!') {
            if !vars::is_name(name) {
                return bad(io);
            }
            let target = self.parameter(name, io)?.unwrap_or_default();
            if !is_parameter_name(&target) {
                return bad(io);
            }
            return Ok(wrap(self.parameter(&target, io)?.unwrap_or_default()));
        }

        let mut scan = Scan::new(body);
        let name = match scan.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                scan.take_while(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            Some(c) if c.is_ascii_digit() => scan.take_while(|c| c.is_ascii_digit()),
            Some(c) if "@*?$!#-".contains(c) => {
                scan.bump();
                c.to_string()
            }
            _ => return bad(io),
        };
        let rest: String = scan.chars.get(scan.pos..).unwrap_or_default().iter().collect();
        if rest.is_empty() {
            if name == "@" && quoted {
                return Ok(Piece::Fields(self.positional.clone()));
            }
            return Ok(wrap(self.parameter(&name, io)?.unwrap_or_default()));
        }

        let value = self.special_parameter(&name);
        if let Some((operator, colon, word)) = default_operator(&rest) {
            let set = value.as_ref().is_some_and(|v| !colon || !v.is_empty());
            let text = match (operator, set) {
                (Operator::Default, true) | (Operator::Assign, true) | (Operator::Error, true) => {
                    value.unwrap_or_default()
                }
                (Operator::Default, false) => self.expand_string(word, io)?,
                (Operator::Assign, false) => {
                    if !vars::is_name(&name) {
                        io.error(format!("${}: cannot assign in this way", name));
                        return Err(Control::Failed(GENERIC_FAILURE_CODE));
                    }
                    let text = self.expand_string(word, io)?;
                    self.assign(&name, &text, io)?;
                    text
                }
                (Operator::Alternative, true) => self.expand_string(word, io)?,
                (Operator::Alternative, false) => String::new(),
                (Operator::Error, false) => {
                    let message = match self.expand_string(word, io)? {
                        m if m.is_empty() => "parameter null or not set".to_string(),
                        m => m,
                    };
                    io.error(format!("{}: {}", name, message));
                    return Err(Control::Exit(GENERIC_FAILURE_CODE));
                }
            };
            return Ok(wrap(text));
        }

        if value.is_none() && self.flags.nounset {
            io.error(format!("{}: unbound variable", name));
            return Err(Control::Exit(GENERIC_FAILURE_CODE));
        }
        let value = value.unwrap_or_default();
        let text = if let Some(pattern) = rest.strip_prefix("##") {
            pattern::remove_prefix(&value, &self.expand_pattern(pattern, io)?, true)
        } else if let Some(pattern) = rest.strip_prefix('#') {
            pattern::remove_prefix(&value, &self.expand_pattern(pattern, io)?, false)
        } else if let Some(pattern) = rest.strip_prefix("%%") {
            pattern::remove_suffix(&value, &self.expand_pattern(pattern, io)?, true)
        } else if let Some(pattern) = rest.strip_prefix('%') {
            pattern::remove_suffix(&value, &self.expand_pattern(pattern, io)?, false)
        } else if let Some(body) = rest.strip_prefix('/') {
            let (all, anchor, body) = if let Some(body) = body.strip_prefix('/') {
                (true, pattern::Anchor::Anywhere, body)
            } else if let Some(body) = body.strip_prefix('#') {
                (false, pattern::Anchor::Start, body)
            } else if let Some(body) = body.strip_prefix('%') {
                (false, pattern::Anchor::End, body)
            } else {
                (false, pattern::Anchor::Anywhere, body)
            };
            let (find, replacement) = split_replacement(body);
            let find = self.expand_pattern(find, io)?;
            let replacement = self.expand_string(replacement, io)?;
            pattern::replace(&value, &find, &replacement, all, anchor)
        } else if rest.starts_with("^^") {
            value.to_uppercase()
        } else if rest.starts_with('^') {
            map_first(&value, |c| c.to_uppercase().collect())
        } else if rest.starts_with(",,") {
            value.to_lowercase()
        } else if rest.starts_with(',') {
            map_first(&value, |c| c.to_lowercase().collect())
        } else if let Some(range) = rest.strip_prefix(':') {
            self.substring(&value, range, io)?
        } else {
            return bad(io);
        };
        Ok(wrap(text))
    }

    /// `${var:offset}` and `${var:offset:length}`, counted in characters.
    fn substring(&mut self, value: &str, range: &str, io: &Io) -> Flow<String> {
        let (offset, length) = match range.split_once(':') {
            Some((offset, length)) => (offset, Some(length)),
            None => (range, None),
        };
        let chars: Vec<char> = value.chars().collect();
        let count = i64::try_from(chars.len()).unwrap_or(i64::MAX);
        let mut start = self.eval_arithmetic(offset, io)?;
        if start < 0 {
            start = (count + start).max(0);
        }
        let start = start.min(count);
        let end = match length {
            None => count,
            Some(length) => {
                let length = self.eval_arithmetic(length, io)?;
                if length < 0 {
                    count + length
                } else {
                    start.saturating_add(length).min(count)
                }
            }
        };
        if end < start {
            io.error(format!("{}: substring expression < 0", range));
            return Err(Control::Failed(GENERIC_FAILURE_CODE));
        }
        let (start, end) = (
            usize::try_from(start).unwrap_or_default(),
            usize::try_from(end).unwrap_or_default(),
        );
        Ok(chars.get(start..end).unwrap_or_default().iter().collect())
    }
}

fn push_literal(pieces: &mut Vec<Piece>, c: char) {
    if let Some(Piece::Literal(text)) = pieces.last_mut() {
        text.push(c);
    } else {
        pieces.push(Piece::Literal(c.to_string()));
    }
}

fn flush(text: &mut String, pieces: &mut Vec<Piece>) {
    if !text.is_empty() {
        pieces.push(Piece::Quoted(std::mem::take(text)));
    }
}

fn is_parameter_name(name: &str) -> bool {
    vars::is_name(name)
        || (!name.is_empty() && name.chars().all(|c| c.is_ascii_digit()))
        || matches!(name, "@" | "*" | "?" | "$" | "!" | "#" | "-")
}

/// `-`, `=`, `+`, `?` and their `:` forms, with the word after them.
fn default_operator(rest: &str) -> Option<(Operator, bool, &str)> {
    let (colon, rest) = match rest.strip_prefix(':') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let mut chars = rest.chars();
    let operator = match chars.next()? {
        '-' => Operator::Default,
        '=' => Operator::Assign,
        '+' => Operator::Alternative,
        '?' => Operator::Error,
        _ => return None,
    };
    Some((operator, colon, chars.as_str()))
}

/// Splits `pattern/replacement` at the first unescaped `/`.
fn split_replacement(body: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '/' => {
                return (
                    body.get(..index).unwrap_or_default(),
                    body.get(index + 1..).unwrap_or_default(),
                );
            }
            _ => {}
        }
    }
    (body, "")
}

fn map_first(value: &str, f: impl FnOnce(char) -> String) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => format!("{}{}", f(first), chars.as_str()),
        None => String::new(),
    }
}

/// Decodes the body of `$'...'`; the closing quote is consumed.
fn ansi_c(scan: &mut Scan) -> String {
    let mut out = String::new();
    while let Some(c) = scan.bump() {
        match c {
            '\'' => break,
            '\\' => {
                let Some(escape) = scan.bump() else {
                    out.push('\\');
                    break;
                };
                match escape {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'e' | 'E' => out.push('\x1b'),
                    'f' => out.push('\x0c'),
                    'v' => out.push('\x0b'),
                    'x' => {
                        let digits = scan.take_while(|c| c.is_ascii_hexdigit());
                        let digits: String = digits.chars().take(2).collect();
                        match u8::from_str_radix(&digits, 16) {
                            Ok(byte) => out.push(char::from(byte)),
                            Err(_) => out.push_str("\\x"),
                        }
                    }
                    '0'..='7' => {
                        let mut digits = escape.to_string();
                        while digits.len() < 3 {
                            match scan.peek() {
                                Some(d @ '0'..='7') => {
                                    digits.push(d);
                                    scan.bump();
                                }
                                _ => break,
                            }
                        }
                        match u8::from_str_radix(&digits, 8) {
                            Ok(byte) => out.push(char::from(byte)),
                            Err(_) => out.push('?'),
                        }
                    }
                    other => out.push(other),
                }
            }
            c => out.push(c),
        }
    }
    out
}
