//! Name-aware natural ordering for host identities
//!
//! Fleet hosts are conventionally named `<site letters><index>` ("HK1",
//! "HK10", "US3"). Plain lexicographic ordering puts "HK10" before "HK2",
//! which reads wrong on every dashboard, so identities of that shape are
//! compared as (letters, numeric index). Anything else falls back to a
//! generic natural comparator over alternating digit/non-digit runs.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static SITE_INDEX_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)(\d*)$").unwrap());

/// Compare two host identities in natural order.
///
/// Guarantees `"HK1" < "HK2" < "HK10" < "US1"`.
pub fn compare_identities(a: &str, b: &str) -> Ordering {
    let a = a.trim();
    let b = b.trim();

    match (SITE_INDEX_SHAPE.captures(a), SITE_INDEX_SHAPE.captures(b)) {
        (Some(ca), Some(cb)) => {
            let letters = ca[1].cmp(&cb[1]);
            if letters != Ordering::Equal {
                return letters;
            }
            numeric_value(&ca[2]).cmp(&numeric_value(&cb[2]))
        }
        _ => compare_natural(a, b),
    }
}

/// Absent numeric suffix sorts as 0
fn numeric_value(digits: &str) -> u64 {
    if digits.is_empty() {
        0
    } else {
        // Overly long runs saturate rather than fail the comparison
        digits.parse().unwrap_or(u64::MAX)
    }
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Number(u64),
    Text(&'a str),
}

fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }

        let run = &s[start..end];
        if is_digit {
            tokens.push(Token::Number(run.parse().unwrap_or(u64::MAX)));
        } else {
            tokens.push(Token::Text(run));
        }
        start = end;
    }

    tokens
}

/// Generic natural comparator: digit runs compare numerically, everything
/// else lexicographically; on a full prefix match the shorter sequence
/// sorts first.
fn compare_natural(a: &str, b: &str) -> Ordering {
    let ta = tokenize(a);
    let tb = tokenize(b);

    for (x, y) in ta.iter().zip(tb.iter()) {
        let ord = match (x, y) {
            (Token::Number(n), Token::Number(m)) => n.cmp(m),
            (Token::Text(s), Token::Text(t)) => s.cmp(t),
            // Mixed runs at the same position: compare the raw text
            (Token::Number(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    ta.len().cmp(&tb.len())
}
