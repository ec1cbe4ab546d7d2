//! Text pattern matching used by the rule engine, content search, and staged
//! content edits.
//!
//! Three modes are supported: literal substring, user-supplied regular
//! expressions, and "smart wildcard" patterns where `*` is a non-greedy gap
//! and literal whitespace tolerates any run of whitespace or newlines.
//!
//! Invalid patterns are not an error condition anywhere in the engine: they
//! compile to an inert matcher that yields zero matches, and callers surface
//! that through status text.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How a pattern string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Literal,
    Regex,
    Wildcard,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchMode::Literal => "literal",
            MatchMode::Regex => "regex",
            MatchMode::Wildcard => "wildcard",
        };
        f.write_str(name)
    }
}

impl FromStr for MatchMode {
    type Err = MatchModeParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "literal" => Ok(MatchMode::Literal),
            "regex" => Ok(MatchMode::Regex),
            "wildcard" => Ok(MatchMode::Wildcard),
            _ => Err(MatchModeParseError {
                attempted: source.to_owned(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid match mode '{attempted}'. Valid values are: literal, regex, wildcard")]
pub struct MatchModeParseError {
    attempted: String,
}

/// A single occurrence of a pattern in some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchHit {
    /// Byte range of the whole match in the searched text.
    pub range: Range<usize>,
    /// Captured groups, in order. For wildcard patterns, one entry per `*`.
    pub groups: Vec<String>,
}

/// A compiled pattern.
///
/// Compilation never fails; a pattern that does not compile produces a
/// matcher whose `find_all` always returns no hits.
#[derive(Debug)]
pub struct Matcher {
    regex: Option<Regex>,
}

impl Matcher {
    pub fn compile(pattern: &str, mode: MatchMode, case_sensitive: bool) -> Matcher {
        let source = match mode {
            MatchMode::Literal => regex::escape(pattern),
            MatchMode::Regex => pattern.to_owned(),
            MatchMode::Wildcard => translate_wildcard(pattern),
        };

        // The case flag doubles as "dot matches newline" for user regexes,
        // and wildcard gaps always span line breaks.
        let dot_matches_new_line = match mode {
            MatchMode::Wildcard => true,
            MatchMode::Regex => !case_sensitive,
            MatchMode::Literal => false,
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(!case_sensitive)
            .dot_matches_new_line(dot_matches_new_line)
            .build();

        if let Err(err) = &regex {
            log::debug!("Pattern {:?} did not compile: {}", pattern, err);
        }

        Matcher { regex: regex.ok() }
    }

    /// Whether the pattern compiled. An invalid matcher still works, it just
    /// never matches anything.
    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Every non-overlapping occurrence of the pattern, left to right.
    pub fn find_all(&self, text: &str) -> Vec<MatchHit> {
        let regex = match &self.regex {
            Some(regex) => regex,
            None => return Vec::new(),
        };

        regex
            .captures_iter(text)
            .map(|captures| {
                let whole = captures.get(0).unwrap();
                let groups = (1..captures.len())
                    .map(|index| {
                        captures
                            .get(index)
                            .map(|group| group.as_str().to_owned())
                            .unwrap_or_default()
                    })
                    .collect();

                MatchHit {
                    range: whole.range(),
                    groups,
                }
            })
            .collect()
    }
}

/// Substitutes `*` placeholders in a replacement template with captured
/// groups, left to right: the first `*` receives group 1, the second group 2,
/// and so on. Placeholders beyond the available groups expand to nothing.
pub fn expand_replacement(template: &str, groups: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next_group = 0;

    for ch in template.chars() {
        if ch == '*' {
            if let Some(group) = groups.get(next_group) {
                out.push_str(group);
            }
            next_group += 1;
        } else {
            out.push(ch);
        }
    }

    out
}

/// Builds a regex source string from a smart wildcard pattern.
///
/// Literal characters are escaped. Each `*` becomes a non-greedy capture-any
/// gap with surrounding whitespace absorbed, so `<tag>*</tag>` captures
/// `hello` out of `<tag>\nhello\n</tag>`. Runs of literal whitespace match
/// any run of whitespace or newlines, letting a single-line pattern match
/// text that was reflowed.
fn translate_wildcard(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() * 2);
    let mut in_whitespace = false;

    for ch in pattern.chars() {
        if ch == '*' {
            source.push_str(r"\s*(.*?)\s*");
            in_whitespace = false;
        } else if ch.is_whitespace() {
            if !in_whitespace {
                source.push_str(r"\s+");
                in_whitespace = true;
            }
        } else {
            source.push_str(&regex::escape(&ch.to_string()));
            in_whitespace = false;
        }
    }

    source
}
