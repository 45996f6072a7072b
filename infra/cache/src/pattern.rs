//! Redis-style glob matching for key enumeration.

use crate::error::CacheError;

/// Matches `text` against a glob `pattern`.
///
/// * `*` matches any run of characters (including none).
/// * `?` matches exactly one character.
/// * `\x` matches `x` literally.
///
/// ```rust
/// use gts_cache::glob_match;
///
/// assert!(glob_match("transaction:group:*", "transaction:group:G1"));
/// assert!(!glob_match("transaction:group:?", "transaction:group:G1"));
/// ```
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Last `*` position in the pattern and the text position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            },
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            },
            Some('\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            },
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            },
            _ => {},
        }

        match backtrack {
            Some((star, from)) => {
                p = star + 1;
                t = from + 1;
                backtrack = Some((star, from + 1));
            },
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Rejects patterns ending in a dangling escape.
pub(crate) fn validate(pattern: &str) -> Result<(), CacheError> {
    let trailing = pattern.chars().rev().take_while(|&c| c == '\\').count();
    if trailing % 2 == 1 {
        return Err(CacheError::InvalidCommand {
            message: format!("dangling escape in pattern '{pattern}'").into(),
            context: None,
        });
    }
    Ok(())
}
