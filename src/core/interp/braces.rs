// src/core/interp/braces.rs

//! Brace expansion (`{a,b}`, `{1..5}`, `{a..e..2}`) through the
//! `brush_parser` brace grammar, combined with a cartesian product.

use brush_parser::word::{self, BraceExpressionMember, BraceExpressionOrText};
use itertools::Itertools;

/// Expands the braces in one raw word. Words without an unquoted brace
/// list come back unchanged.
pub(crate) fn expand(raw: &str) -> Vec<String> {
    if !has_brace_list(raw) {
        return vec![raw.to_string()];
    }
    match word::parse_brace_expansions(raw, &brush_parser::ParserOptions::default()) {
        Ok(Some(pieces)) => combine(pieces),
        Ok(None) => vec![raw.to_string()],
        Err(e) => {
            log::trace!("No brace expansion for '{}': {:?}", raw, e);
            vec![raw.to_string()]
        }
    }
}

fn combine(pieces: Vec<BraceExpressionOrText>) -> Vec<String> {
    pieces
        .into_iter()
        .map(alternatives)
        .multi_cartesian_product()
        .map(|parts| parts.concat())
        .collect()
}

fn alternatives(piece: BraceExpressionOrText) -> Vec<String> {
    match piece {
        BraceExpressionOrText::Text(text) => vec![text],
        BraceExpressionOrText::Expr(members) => members.into_iter().flat_map(member).collect(),
    }
}

fn member(member: BraceExpressionMember) -> Vec<String> {
    match member {
        BraceExpressionMember::NumberSequence {
            start,
            end,
            increment,
        } => sequence(start, end, increment)
            .map(|n| n.to_string())
            .collect(),
        BraceExpressionMember::CharSequence {
            start,
            end,
            increment,
        } => sequence(i64::from(u32::from(start)), i64::from(u32::from(end)), increment)
            .filter_map(|n| u32::try_from(n).ok().and_then(char::from_u32))
            .map(String::from)
            .collect(),
        BraceExpressionMember::Child(pieces) => combine(pieces),
    }
}

/// `start..=end` in steps of `|increment|`, counting down when `end` is
/// smaller.
fn sequence(start: i64, end: i64, increment: i64) -> Box<dyn Iterator<Item = i64>> {
    let step = usize::try_from(increment.unsigned_abs()).unwrap_or(1).max(1);
    if start <= end {
        Box::new((start..=end).step_by(step))
    } else {
        Box::new((end..=start).rev().step_by(step))
    }
}

/// True if `raw` has a `{` outside quotes, not part of `${`, enclosing a
/// top-level `,` or `..`.
fn has_brace_list(raw: &str) -> bool {
    let mut depth = 0usize;
    let (mut single, mut double, mut escaped) = (false, false, false);
    let mut previous = '\0';
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            _ if escaped => escaped = false,
            '\\' if !single => escaped = true,
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ if single || double => {}
            '{' if previous != '$' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            ',' if depth > 0 => return raw.contains('}'),
            '.' if depth > 0 && chars.peek() == Some(&'.') => return raw.contains('}'),
            _ => {}
        }
        previous = c;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_and_sequences() {
        assert_eq!(expand("{a,b,c}"), vec!["a", "b", "c"]);
        assert_eq!(expand("file{1..3}.txt"), vec!["file1.txt", "file2.txt", "file3.txt"]);
        assert_eq!(expand("{5..1..2}"), vec!["5", "3", "1"]);
        assert_eq!(expand("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn test_words_without_lists_are_untouched() {
        assert_eq!(expand("{single}"), vec!["{single}"]);
        assert_eq!(expand("${HOME}"), vec!["${HOME}"]);
        assert_eq!(expand("'{print $1, $2}'"), vec!["'{print $1, $2}'"]);
        assert_eq!(expand("\"{a,b}\""), vec!["\"{a,b}\""]);
    }
}
