//! Shell-style wildcard matching for account names.
//!
//! Patterns follow `fnmatch` semantics and are case-sensitive:
//!
//! | Pattern   | Matches                                  |
//! |-----------|------------------------------------------|
//! | `*`       | any sequence of characters, even empty   |
//! | `?`       | exactly one character                    |
//! | `[seq]`   | one character from `seq` (ranges allowed)|
//! | `[!seq]`  | one character not in `seq`               |
//!
//! An opening `[` without a closing `]` is taken literally.

use regex::Regex;
use thiserror::Error;

/// Errors that can occur while compiling a glob pattern.
#[derive(Debug, Error)]
pub enum GlobError {
    /// The translated pattern was rejected by the regex engine.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob pattern.
    pub fn new(pattern: &str) -> Result<Self, GlobError> {
        let regex = Regex::new(&translate(pattern)).map_err(|source| GlobError::Invalid {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns the pattern this glob was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if the whole of `candidate` matches the pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

/// Translates a glob pattern into an anchored regular expression.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }

                if j >= chars.len() {
                    out.push_str(r"\[");
                    continue;
                }

                let body = &chars[i..j];
                i = j + 1;

                out.push_str(&translate_set(body));
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    out
}

/// Translates the inside of a `[...]` set into a regex class.
///
/// Only a `-` between two characters forms a range; any other `-` is a
/// literal. Reversed ranges such as `z-a` match nothing and are dropped.
fn translate_set(body: &[char]) -> String {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };

    // Split on range separators. The first character is never one, and the
    // two characters after a separator cannot start another range.
    let mut chunks: Vec<Vec<char>> = Vec::new();
    let mut start = 0;
    let mut k = 1;
    while let Some(offset) = body.get(k..).and_then(|rest| rest.iter().position(|&c| c == '-')) {
        let dash = k + offset;
        chunks.push(body[start..dash].to_vec());
        start = dash + 1;
        k = dash + 3;
    }
    chunks.push(body[start..].to_vec());

    for k in (1..chunks.len()).rev() {
        let (Some(&low), Some(&high)) = (chunks[k - 1].last(), chunks[k].first()) else {
            continue;
        };
        if low > high {
            let tail = chunks.remove(k);
            chunks[k - 1].pop();
            chunks[k - 1].extend_from_slice(&tail[1..]);
        }
    }

    let set = chunks
        .iter()
        .map(|chunk| chunk.iter().map(|c| regex::escape(&c.to_string())).collect::<String>())
        .collect::<Vec<_>>()
        .join("-");

    match (set.is_empty(), negated) {
        (true, false) => r"[^\x00-\x{10FFFF}]".to_string(),
        (true, true) => ".".to_string(),
        (false, false) => format!("[{}]", set),
        (false, true) => format!("[^{}]", set),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(pattern: &str) -> GlobPattern {
        GlobPattern::new(pattern).unwrap()
    }

    #[test]
    fn star_matches_any_sequence() {
        let g = glob("j*");
        assert!(g.matches("j"));
        assert!(g.matches("jane"));
        assert!(g.matches("john.doe"));
        assert!(!g.matches("bob"));
        assert!(!g.matches("Jane"));
    }

    #[test]
    fn star_alone_matches_everything() {
        let g = glob("*");
        assert!(g.matches(""));
        assert!(g.matches("anything at all"));
        assert!(g.matches("multi\nline"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let g = glob("b?b");
        assert!(g.matches("bob"));
        assert!(g.matches("béb"));
        assert!(!g.matches("bb"));
        assert!(!g.matches("boob"));
    }

    #[test]
    fn character_class_and_range() {
        let g = glob("[abc]*");
        assert!(g.matches("alice"));
        assert!(g.matches("carol"));
        assert!(!g.matches("dave"));

        let g = glob("user[0-9]");
        assert!(g.matches("user7"));
        assert!(!g.matches("userx"));
        assert!(!g.matches("user10"));
    }

    #[test]
    fn negated_class() {
        let g = glob("[!a]*");
        assert!(g.matches("bob"));
        assert!(!g.matches("alice"));
    }

    #[test]
    fn bracket_edge_cases() {
        // ']' right after '[' is part of the set.
        let g = glob("[]]x");
        assert!(g.matches("]x"));

        // Unterminated '[' is a literal.
        let g = glob("a[b");
        assert!(g.matches("a[b"));
        assert!(!g.matches("ab"));

        // Regex metacharacters inside a set stay literal.
        let g = glob("[.^&~]");
        assert!(g.matches("."));
        assert!(g.matches("^"));
        assert!(g.matches("&"));
        assert!(!g.matches("x"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let g = glob("a.b+(c)");
        assert!(g.matches("a.b+(c)"));
        assert!(!g.matches("axb+(c)"));
        assert!(!g.matches("a.bb(c)"));
    }

    #[test]
    fn exact_match_without_wildcards() {
        let g = glob("alice");
        assert!(g.matches("alice"));
        assert!(!g.matches("alice2"));
        assert!(!g.matches("xalice"));
        assert_eq!(g.as_str(), "alice");
    }

    #[test]
    fn reversed_range_matches_nothing() {
        let g = glob("[z-a]");
        assert!(!g.matches("a"));
        assert!(!g.matches("m"));
        assert!(!g.matches("z"));
        assert!(!g.matches(""));

        let g = glob("[!z-a]");
        assert!(g.matches("a"));
        assert!(g.matches("-"));

        // Only the reversed range is dropped.
        let g = glob("[xz-a]");
        assert!(g.matches("x"));
        assert!(!g.matches("z"));
    }

    #[test]
    fn dashes_outside_ranges_are_literal() {
        // 'a--' is reversed and dropped, leaving 'z'.
        let g = glob("[a--z]");
        assert!(g.matches("z"));
        assert!(!g.matches("a"));
        assert!(!g.matches("-"));

        let g = glob("[-a]");
        assert!(g.matches("-"));
        assert!(g.matches("a"));

        let g = glob("[a-]");
        assert!(g.matches("-"));
        assert!(g.matches("a"));
        assert!(!g.matches("b"));

        // A '-' right after a range is literal.
        let g = glob("[a-c-e]");
        assert!(g.matches("b"));
        assert!(g.matches("-"));
        assert!(g.matches("e"));
        assert!(!g.matches("d"));

        let g = glob("[!-]*");
        assert!(g.matches("bob"));
        assert!(!g.matches("-x"));
    }
}
