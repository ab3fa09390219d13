//! Pattern matching for the `like` and `ilike` query functions.
//!
//! SQL LIKE with two wildcards:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A backslash escapes the following character so `\%` and `\_` match
//! literally. Matching operates on Unicode scalar values.

use alloc::vec::Vec;

/// Case-sensitive SQL LIKE matching.
///
/// ```
/// use rivulet_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p = tokenize(pattern.chars());
    matches(&v, &p)
}

/// Case-insensitive SQL LIKE matching.
///
/// ```
/// use rivulet_core::pattern_match::ilike;
/// assert!(ilike("Hello", "h%O"));
/// ```
pub fn ilike(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().flat_map(char::to_lowercase).collect();
    let p = tokenize(pattern.chars().flat_map(char::to_lowercase));
    matches(&v, &p)
}

#[derive(Clone, Copy, PartialEq)]
enum Token {
    Any,
    One,
    Lit(char),
}

fn tokenize(pattern: impl Iterator<Item = char>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut escaped = false;
    for ch in pattern {
        if escaped {
            tokens.push(Token::Lit(ch));
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '%' => {
                // collapse runs of %
                if tokens.last() != Some(&Token::Any) {
                    tokens.push(Token::Any);
                }
            }
            '_' => tokens.push(Token::One),
            c => tokens.push(Token::Lit(c)),
        }
    }
    if escaped {
        tokens.push(Token::Lit('\\'));
    }
    tokens
}

/// Greedy wildcard matching with single backtrack point.
fn matches(v: &[char], p: &[Token]) -> bool {
    let (mut vi, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        match p.get(pi) {
            Some(Token::Any) => {
                backtrack = Some((pi, vi));
                pi += 1;
            }
            Some(Token::One) => {
                vi += 1;
                pi += 1;
            }
            Some(Token::Lit(c)) if *c == v[vi] => {
                vi += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_vi)) => {
                    pi = star_pi + 1;
                    vi = star_vi + 1;
                    backtrack = Some((star_pi, star_vi + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|t| *t == Token::Any)
}
