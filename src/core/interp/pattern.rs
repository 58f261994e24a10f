// src/core/interp/pattern.rs

//! Shell patterns (`*`, `?`, `[...]`) for `case`, `${var#pattern}`, `[[ == ]]`
//! and pathname expansion. A backslash makes the next character literal;
//! the expander uses that to mark quoted text.

use regex::Regex;
use std::path::Path;

/// True if `pattern` has an unescaped `*`, `?` or `[`.
pub(crate) fn has_glob_chars(pattern: &str) -> bool {
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Escapes every pattern metacharacter in `text`.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Drops the escaping backslashes.
pub(crate) fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    for c in pattern.chars() {
        if c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        out.push(c);
    }
    out
}

/// The regex body equivalent to `pattern`, without anchors.
pub(crate) fn to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    out.push_str(&regex::escape(&next.to_string()));
                    i += 2;
                } else {
                    out.push_str(r"\\");
                    i += 1;
                }
            }
            '*' => {
                out.push_str(".*");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => match bracket_class(&chars, i) {
                Some((class, end)) => {
                    out.push_str(&class);
                    i = end + 1;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            other => {
                out.push_str(&regex::escape(&other.to_string()));
                i += 1;
            }
        }
    }
    out
}

/// Translates the bracket expression opening at `start`. Returns the regex
/// class and the index of the closing `]`.
fn bracket_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let mut class = String::from("[");
    if matches!(chars.get(i), Some('!' | '^')) {
        class.push('^');
        i += 1;
    }
    let first = i;
    while let Some(&c) = chars.get(i) {
        match c {
            ']' if i > first => {
                class.push(']');
                return Some((class, i));
            }
            '[' if chars.get(i + 1) == Some(&':') => {
                // [:alpha:] and friends pass through unchanged.
                let close = (i + 2..chars.len())
                    .find(|&j| chars.get(j) == Some(&':') && chars.get(j + 1) == Some(&']'))?;
                class.extend(chars.get(i..close + 2)?.iter());
                i = close + 2;
            }
            '\\' => {
                let next = *chars.get(i + 1)?;
                if next.is_ascii_punctuation() {
                    class.push('\\');
                }
                class.push(next);
                i += 2;
            }
            '-' if i > first && chars.get(i + 1).is_some_and(|&n| n != ']') => {
                class.push('-');
                i += 1;
            }
            c if c.is_ascii_alphanumeric() => {
                class.push(c);
                i += 1;
            }
            c if c.is_ascii_punctuation() => {
                class.push('\\');
                class.push(c);
                i += 1;
            }
            c => {
                class.push(c);
                i += 1;
            }
        }
    }
    None
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?s)^{}$", to_regex(pattern))) {
        Ok(re) => Some(re),
        Err(e) => {
            log::debug!("Pattern '{}' did not compile: {}", pattern, e);
            None
        }
    }
}

/// Whole-string match.
pub(crate) fn matches(pattern: &str, text: &str) -> bool {
    if !has_glob_chars(pattern) {
        return unescape(pattern) == text;
    }
    compile(pattern).is_some_and(|re| re.is_match(text))
}

/// Char-boundary offsets of `value`, shortest first.
fn boundaries(value: &str) -> Vec<usize> {
    value
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(value.len()))
        .collect()
}

/// `${var#pattern}` and `${var##pattern}`.
pub(crate) fn remove_prefix(value: &str, pattern: &str, longest: bool) -> String {
    let Some(re) = compile(pattern) else {
        return value.to_string();
    };
    let mut cuts = boundaries(value);
    if longest {
        cuts.reverse();
    }
    cuts.into_iter()
        .find(|&cut| value.get(..cut).is_some_and(|head| re.is_match(head)))
        .and_then(|cut| value.get(cut..))
        .unwrap_or(value)
        .to_string()
}

/// `${var%pattern}` and `${var%%pattern}`.
pub(crate) fn remove_suffix(value: &str, pattern: &str, longest: bool) -> String {
    let Some(re) = compile(pattern) else {
        return value.to_string();
    };
    let mut cuts = boundaries(value);
    if !longest {
        cuts.reverse();
    }
    cuts.into_iter()
        .find(|&cut| value.get(cut..).is_some_and(|tail| re.is_match(tail)))
        .and_then(|cut| value.get(..cut))
        .unwrap_or(value)
        .to_string()
}

/// Where a `${var/pattern/replacement}` match may sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    Anywhere,
    Start,
    End,
}

/// `${var/pattern/replacement}` and `${var//pattern/replacement}`.
/// Matches are longest-first, as in bash.
pub(crate) fn replace(value: &str, pattern: &str, replacement: &str, all: bool, anchor: Anchor) -> String {
    if pattern.is_empty() {
        return value.to_string();
    }
    let Some(re) = compile(pattern) else {
        return value.to_string();
    };
    let cuts = boundaries(value);
    let mut out = String::new();
    let mut index = 0usize;
    let mut replaced = false;
    while let Some(&start) = cuts.get(index) {
        let allowed = match anchor {
            Anchor::Anywhere => !replaced || all,
            Anchor::Start => start == 0,
            Anchor::End => true,
        };
        let found = allowed
            .then(|| {
                cuts.iter()
                    .rev()
                    .filter(|&&end| end > start)
                    .filter(|&&end| anchor != Anchor::End || end == value.len())
                    .find(|&&end| value.get(start..end).is_some_and(|s| re.is_match(s)))
                    .copied()
            })
            .flatten();
        match found {
            Some(end) => {
                out.push_str(replacement);
                replaced = true;
                index = cuts.iter().position(|&c| c == end).unwrap_or(cuts.len());
                if !all || anchor != Anchor::Anywhere {
                    out.push_str(value.get(end..).unwrap_or_default());
                    return out;
                }
            }
            None => {
                let next = cuts.get(index + 1).copied().unwrap_or(value.len());
                out.push_str(value.get(start..next).unwrap_or_default());
                index += 1;
            }
        }
    }
    out
}

/// Pathname expansion of `pattern` relative to `cwd`.
///
/// Results keep the form of the pattern (relative stays relative) and are
/// sorted. Hidden names only match a pattern segment that starts with `.`.
/// An empty result means the caller keeps the word as written.
pub(crate) fn expand_paths(cwd: &Path, pattern: &str) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let trailing_slash = pattern.ends_with('/') && pattern.len() > 1;
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut candidates: Vec<String> = vec![if absolute { "/".to_string() } else { String::new() }];

    for segment in segments {
        let mut next = Vec::new();
        for base in &candidates {
            let dir = if base.is_empty() {
                cwd.to_path_buf()
            } else {
                cwd.join(base)
            };
            if !has_glob_chars(segment) {
                next.push(join(base, &unescape(segment)));
                continue;
            }
            let Some(re) = compile(segment) else {
                continue;
            };
            let show_hidden = segment.starts_with('.') || segment.starts_with("\\.");
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| show_hidden || !name.starts_with('.'))
                .filter(|name| re.is_match(name))
                .collect();
            names.sort();
            next.extend(names.iter().map(|name| join(base, name)));
        }
        candidates = next;
        if candidates.is_empty() {
            return Vec::new();
        }
    }

    let mut found: Vec<String> = candidates
        .into_iter()
        .filter(|path| std::fs::symlink_metadata(cwd.join(path)).is_ok())
        .filter(|path| !trailing_slash || cwd.join(path).is_dir())
        .map(|path| if trailing_slash { format!("{}/", path) } else { path })
        .collect();
    found.sort();
    found
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_wildcards_and_classes() {
        assert!(matches("*.rs", "main.rs"));
        assert!(!matches("*.rs", "main.rsx"));
        assert!(matches("?at", "cat"));
        assert!(matches("[a-c]at", "bat"));
        assert!(!matches("[!a-c]at", "bat"));
        assert!(matches("[[:digit:]]*", "7up"));
        assert!(matches("a\\*b", "a*b"));
        assert!(!matches("a\\*b", "axxb"));
        assert!(matches("[", "["));
    }

    #[test]
    fn test_remove_prefix_and_suffix() {
        assert_eq!(remove_prefix("a/b/c", "*/", false), "b/c");
        assert_eq!(remove_prefix("a/b/c", "*/", true), "c");
        assert_eq!(remove_suffix("file.tar.gz", ".*", false), "file.tar");
        assert_eq!(remove_suffix("file.tar.gz", ".*", true), "file");
        assert_eq!(remove_suffix("plain", "x", false), "plain");
    }

    #[test]
    fn test_replace_first_all_and_anchored() {
        assert_eq!(replace("a-b-c", "-", "+", false, Anchor::Anywhere), "a+b-c");
        assert_eq!(replace("a-b-c", "-", "+", true, Anchor::Anywhere), "a+b+c");
        assert_eq!(replace("abcabc", "abc", "x", false, Anchor::Start), "xabc");
        assert_eq!(replace("abcabc", "abc", "x", false, Anchor::End), "abcx");
        assert_eq!(replace("abc", "z", "x", true, Anchor::Anywhere), "abc");
    }

    #[test]
    fn test_expand_paths_relative_and_sorted() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", ".hidden.txt", "c.md"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("x.txt"), "").unwrap();

        // --- Assertions ---
        assert_eq!(expand_paths(dir.path(), "*.txt"), vec!["a.txt", "b.txt"]);
        assert_eq!(expand_paths(dir.path(), ".*.txt"), vec![".hidden.txt"]);
        assert_eq!(expand_paths(dir.path(), "*/*.txt"), vec!["sub/x.txt"]);
        assert_eq!(expand_paths(dir.path(), "*/"), vec!["sub/"]);
        assert!(expand_paths(dir.path(), "*.none").is_empty());
    }
}
