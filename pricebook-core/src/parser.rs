//! Line classification: which reconstructed lines are price book rows.
//!
//! A row is `<part code> <description> <price>`; everything else on the
//! page (headers, footers, section titles) is noise and is skipped.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use crate::price::Price;
use crate::pricebook::PriceBookEntry;

/// Letter/digit groups joined by `-`, `.` or `/`: `AX-100`, `CACU0001`, `P/N.12`.
static PART_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+(?:[-./][A-Za-z0-9]+)*$").expect("valid part code regex")
});

const PART_CODE_LEN: RangeInclusive<usize> = 3..=16;
/// Cells that may follow the price on a row (the lead time).
const LEAD_TIME_CELLS: usize = 1;

/// Result of classifying one text line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    Matched(PriceBookEntry),
    Unmatched(UnmatchedReason),
}

/// Why a line did not yield a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmatchedReason {
    Blank,
    /// First token is not shaped like a part code.
    NoPartCode,
    /// Neither of the last two tokens is a price.
    NoPrice,
    /// A trailing token looks numeric but is not a valid price.
    AmbiguousPrice,
    /// Part code and price with nothing in between.
    NoDescription,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnmatchedReason::Blank => "blank line",
            UnmatchedReason::NoPartCode => "no leading part code",
            UnmatchedReason::NoPrice => "no trailing price",
            UnmatchedReason::AmbiguousPrice => "unparseable price",
            UnmatchedReason::NoDescription => "no description",
        };
        f.write_str(text)
    }
}

/// Classify one line as a price book row or noise.
///
/// The price is the last token, or the one before it when the row ends in a
/// lead-time cell (`5`, `Stock`), which is dropped. Whitespace runs inside
/// the description collapse to single spaces.
pub fn classify_line(line: &str) -> LineClass {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&first, rest)) = tokens.split_first() else {
        return LineClass::Unmatched(UnmatchedReason::Blank);
    };
    let Some(part_code) = parse_part_code(first) else {
        return LineClass::Unmatched(UnmatchedReason::NoPartCode);
    };

    let tail_start = rest.len().saturating_sub(LEAD_TIME_CELLS + 1);
    let found = rest
        .iter()
        .enumerate()
        .skip(tail_start)
        .rev()
        .find_map(|(i, token)| token.parse::<Price>().ok().map(|price| (i, price)));
    let Some((index, price)) = found else {
        let reason = if rest[tail_start..].iter().any(|t| is_malformed_price(t)) {
            UnmatchedReason::AmbiguousPrice
        } else {
            UnmatchedReason::NoPrice
        };
        return LineClass::Unmatched(reason);
    };
    let description = &rest[..index];
    if description.is_empty() {
        return LineClass::Unmatched(UnmatchedReason::NoDescription);
    }

    LineClass::Matched(PriceBookEntry {
        part_code,
        description: description.join(" "),
        price,
    })
}

/// Price-like text that still fails to parse: bad grouping, doubled points,
/// a sign, or too many fraction digits. Bare integers are not prices at all.
fn is_malformed_price(token: &str) -> bool {
    let unsigned = token.trim_start_matches('-');
    Price::looks_numeric(unsigned) && (unsigned.len() != token.len() || unsigned.contains(['.', ',']))
}

/// Normalize `token` to an upper-case part code if it has the right shape:
/// 3 to 16 characters with at least one letter and one digit.
pub fn parse_part_code(token: &str) -> Option<String> {
    if !PART_CODE_LEN.contains(&token.len()) || !PART_CODE_RE.is_match(token) {
        return None;
    }
    let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    (has_letter && has_digit).then(|| token.to_ascii_uppercase())
}
