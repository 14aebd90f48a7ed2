//! Address validation and pattern matching
//!
//! Method addresses are literal paths:
//! ```text
//! /oscillator/4/frequency
//! /mixer/channel/1/gain
//! ```
//!
//! Patterns (the address of an incoming message) may use:
//! - `*` any run of characters within one segment
//! - `?` any single character within one segment
//! - `[abc]`, `[a-z]`, `[!abc]` character classes (`!` negates)
//! - `{foo,bar}` alternation
//!
//! A pattern only ever matches addresses with the same number of segments.

use crate::error::{AddressError, PatternError};

/// Characters that may appear in patterns but never in a method address
pub const RESERVED_CHARS: &str = "*?,[]{}# ";

/// A validated literal method address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    raw: String,
}

impl Address {
    /// Parse a literal address
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        if !s.starts_with('/') {
            return Err(AddressError::MissingLeadingSlash(s.to_string()));
        }

        if let Some(character) = s.chars().find(|c| RESERVED_CHARS.contains(*c)) {
            return Err(AddressError::ReservedCharacter {
                address: s.to_string(),
                character,
            });
        }

        Ok(Self { raw: s.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of '/'-delimited segments
    pub fn segment_count(&self) -> usize {
        segment_count(&self.raw)
    }

    /// Address segments without the leading empty one
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw[1..].split('/')
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<&str> for Address {
    type Error = AddressError;

    fn try_from(s: &str) -> Result<Self, AddressError> {
        Address::parse(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Segment count used for match gating
pub fn segment_count(address: &str) -> usize {
    address.bytes().filter(|b| *b == b'/').count()
}

/// True if the string uses any wildcard syntax
pub fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '[', ']', '{', '}'])
}

/// A compiled address pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    segments: usize,
    regex: Option<regex_lite::Regex>,
}

impl Pattern {
    /// Compile an OSC address pattern
    pub fn compile(s: &str) -> Result<Self, PatternError> {
        if !s.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(s.to_string()));
        }

        let regex = if is_pattern(s) {
            let regex_str = translate(s)?;
            Some(
                regex_lite::Regex::new(&regex_str).map_err(|e| PatternError::Regex {
                    pattern: s.to_string(),
                    reason: e.to_string(),
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            raw: s.to_string(),
            segments: segment_count(s),
            regex,
        })
    }

    /// Check whether a literal address is selected by this pattern
    pub fn matches(&self, candidate: &str) -> bool {
        if segment_count(candidate) != self.segments {
            return false;
        }

        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None => candidate == self.raw,
        }
    }

    /// Check whether a validated address is selected by this pattern
    pub fn matches_address(&self, addr: &Address) -> bool {
        self.matches(addr.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segment_count(&self) -> usize {
        self.segments
    }

    pub fn is_literal(&self) -> bool {
        self.regex.is_none()
    }
}

/// Translate OSC pattern syntax into an anchored regular expression
fn translate(pattern: &str) -> Result<String, PatternError> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut in_class = false;
    let mut class_start = false;
    let mut in_braces = false;

    for c in pattern.chars() {
        if in_class {
            match c {
                ']' => {
                    in_class = false;
                    out.push(']');
                }
                '!' if class_start => out.push('^'),
                '\\' | '[' | '^' => {
                    out.push('\\');
                    out.push(c);
                }
                _ => out.push(c),
            }
            class_start = false;
            continue;
        }

        match c {
            '[' => {
                in_class = true;
                class_start = true;
                out.push('[');
            }
            ']' => {
                return Err(PatternError::Unbalanced {
                    pattern: pattern.to_string(),
                    delimiter: ']',
                })
            }
            '{' => {
                if in_braces {
                    return Err(PatternError::Nested {
                        pattern: pattern.to_string(),
                        delimiter: '{',
                    });
                }
                in_braces = true;
                out.push('(');
            }
            '}' => {
                if !in_braces {
                    return Err(PatternError::Unbalanced {
                        pattern: pattern.to_string(),
                        delimiter: '}',
                    });
                }
                in_braces = false;
                out.push(')');
            }
            ',' if in_braces => out.push('|'),
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex_lite::escape(c.encode_utf8(&mut buf)));
            }
        }
    }

    if in_class {
        return Err(PatternError::Unbalanced {
            pattern: pattern.to_string(),
            delimiter: '[',
        });
    }
    if in_braces {
        return Err(PatternError::Unbalanced {
            pattern: pattern.to_string(),
            delimiter: '{',
        });
    }

    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let addr = Address::parse("/oscillator/4/frequency").unwrap();
        assert_eq!(addr.segment_count(), 3);
        assert_eq!(
            addr.segments().collect::<Vec<_>>(),
            vec!["oscillator", "4", "frequency"]
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(Address::parse(""), Err(AddressError::Empty));
        assert!(matches!(
            Address::parse("no/leading/slash"),
            Err(AddressError::MissingLeadingSlash(_))
        ));
        for bad in ["/a*", "/a?", "/a,b", "/[a]", "/{a}", "/a#", "/a b"] {
            assert!(
                matches!(
                    Address::parse(bad),
                    Err(AddressError::ReservedCharacter { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_translate() {
        assert_eq!(translate("/a/*").unwrap(), "^/a/[^/]*$");
        assert_eq!(translate("/a.b?").unwrap(), r"^/a\.b[^/]$");
        assert_eq!(translate("/os{c,}").unwrap(), "^/os(c|)$");
        assert_eq!(translate("/x[!0-3]").unwrap(), "^/x[^0-3]$");
        assert_eq!(translate("/p(1)").unwrap(), r"^/p\(1\)$");
    }

    #[test]
    fn test_single_wildcard() {
        let pattern = Pattern::compile("/mixer/*/gain").unwrap();

        assert!(pattern.matches("/mixer/1/gain"));
        assert!(pattern.matches("/mixer/master/gain"));
        assert!(!pattern.matches("/mixer/1/pan"));
        assert!(!pattern.matches("/mixer/1/2/gain"));
    }

    #[test]
    fn test_star_stays_within_segment() {
        let pattern = Pattern::compile("/a/*").unwrap();
        assert!(pattern.matches("/a/b"));
        assert!(pattern.matches("/a/"));
        assert!(!pattern.matches("/a/b/c"));
    }

    #[test]
    fn test_question_mark() {
        let pattern = Pattern::compile("/ch?").unwrap();
        assert!(pattern.matches("/ch1"));
        assert!(!pattern.matches("/ch"));
        assert!(!pattern.matches("/ch12"));
    }

    #[test]
    fn test_character_class() {
        let pattern = Pattern::compile("/track/[1-3]").unwrap();
        assert!(pattern.matches("/track/2"));
        assert!(!pattern.matches("/track/4"));

        let negated = Pattern::compile("/track/[!1-3]").unwrap();
        assert!(negated.matches("/track/4"));
        assert!(!negated.matches("/track/2"));
    }

    #[test]
    fn test_brace_alternation() {
        let pattern = Pattern::compile("/os{c,}").unwrap();
        assert!(pattern.matches("/osc"));
        assert!(pattern.matches("/os"));
        assert!(!pattern.matches("/osx"));

        let pattern = Pattern::compile("/{left,right}/level").unwrap();
        assert!(pattern.matches("/left/level"));
        assert!(pattern.matches("/right/level"));
        assert!(!pattern.matches("/center/level"));
    }

    #[test]
    fn test_literal_metacharacters_do_not_leak() {
        let pattern = Pattern::compile("/v1.0/*").unwrap();
        assert!(pattern.matches("/v1.0/x"));
        assert!(!pattern.matches("/v1x0/x"));

        let pattern = Pattern::compile("/f(x)/?").unwrap();
        assert!(pattern.matches("/f(x)/y"));
        assert!(!pattern.matches("/fx/y"));
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let pattern = Pattern::compile("/Synth/gain").unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.matches("/Synth/gain"));
        assert!(!pattern.matches("/synth/gain"));
        assert!(!pattern.matches("/Synth/gain/x"));
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            Pattern::compile("nope"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            Pattern::compile("/a/[bc"),
            Err(PatternError::Unbalanced { delimiter: '[', .. })
        ));
        assert!(matches!(
            Pattern::compile("/a/{b,c"),
            Err(PatternError::Unbalanced { delimiter: '{', .. })
        ));
        assert!(matches!(
            Pattern::compile("/a/b}"),
            Err(PatternError::Unbalanced { delimiter: '}', .. })
        ));
        assert!(matches!(
            Pattern::compile("/a/{b,{c}}"),
            Err(PatternError::Nested { delimiter: '{', .. })
        ));
        assert!(matches!(
            Pattern::compile("/a/[]"),
            Err(PatternError::Regex { .. })
        ));
    }
}
