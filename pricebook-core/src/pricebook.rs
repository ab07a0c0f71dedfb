use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::ConflictPolicy;
use crate::error::{PricebookError, Result};
use crate::parser::{classify_line, LineClass, UnmatchedReason};
use crate::price::Price;

/// One row of the price book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBookEntry {
    pub part_code: String,
    pub description: String,
    pub price: Price,
}

/// A part code seen again with a different price than its first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceConflict {
    pub part_code: String,
    /// Price of the first occurrence, which stays in the price book.
    pub kept: Price,
    /// Price of the later occurrence, which is dropped.
    pub rejected: Price,
    pub rejected_description: String,
}

/// Counters describing what happened to every extracted line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub pages: usize,
    pub lines: usize,
    /// Lines that matched the row pattern, before deduplication.
    pub matched: usize,
    /// Headers, footers and other lines without the row shape.
    pub noise: usize,
    /// Row-shaped lines whose trailing price could not be parsed.
    pub ambiguous: usize,
    /// Repeats of a part code at the same price.
    pub duplicates: usize,
    pub conflicts: Vec<PriceConflict>,
}

impl ExtractSummary {
    /// Lines that produced no row at all.
    pub fn dropped(&self) -> usize {
        self.noise + self.ambiguous
    }
}

/// Price book entries in first-seen order, one per part code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceBook {
    entries: IndexMap<String, PriceBookEntry>,
}

impl PriceBook {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, part_code: &str) -> Option<&PriceBookEntry> {
        self.entries.get(part_code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceBookEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> Vec<PriceBookEntry> {
        self.entries.into_values().collect()
    }
}

/// Serialized as a JSON array of entries.
impl Serialize for PriceBook {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

/// Accumulates rows line by line, applying the duplicate policy.
#[derive(Debug)]
pub struct PriceBookBuilder {
    book: PriceBook,
    policy: ConflictPolicy,
    summary: ExtractSummary,
}

impl PriceBookBuilder {
    pub fn new(policy: ConflictPolicy) -> Self {
        PriceBookBuilder {
            book: PriceBook::default(),
            policy,
            summary: ExtractSummary::default(),
        }
    }

    /// Classify a text line and add it if it is a row. Non-row lines are
    /// counted, never errors.
    pub fn add_line(&mut self, line: &str) -> Result<()> {
        self.summary.lines += 1;
        match classify_line(line) {
            LineClass::Matched(entry) => {
                self.summary.matched += 1;
                self.insert(entry)
            }
            LineClass::Unmatched(UnmatchedReason::AmbiguousPrice) => {
                self.summary.ambiguous += 1;
                tracing::debug!(line, "dropping row with unparseable price");
                Ok(())
            }
            LineClass::Unmatched(reason) => {
                self.summary.noise += 1;
                tracing::trace!(line, %reason, "skipping line");
                Ok(())
            }
        }
    }

    /// Add a row. The first occurrence of a part code wins; a repeat with a
    /// different price is recorded as a conflict, or fails under
    /// [`ConflictPolicy::Strict`].
    pub fn insert(&mut self, entry: PriceBookEntry) -> Result<()> {
        let existing = self.book.entries.get(&entry.part_code).map(|e| e.price);
        match existing {
            None => {
                self.book.entries.insert(entry.part_code.clone(), entry);
            }
            Some(kept) if kept == entry.price => {
                self.summary.duplicates += 1;
                tracing::debug!(part_code = %entry.part_code, "skipping duplicate row");
            }
            Some(kept) => {
                if self.policy == ConflictPolicy::Strict {
                    return Err(PricebookError::ConflictingPrices {
                        part_code: entry.part_code,
                        first: kept.to_string(),
                        other: entry.price.to_string(),
                    });
                }
                tracing::warn!(
                    part_code = %entry.part_code,
                    kept = %kept,
                    ignored = %entry.price,
                    "part code repeats with a different price; keeping the first"
                );
                self.summary.conflicts.push(PriceConflict {
                    part_code: entry.part_code,
                    kept,
                    rejected: entry.price,
                    rejected_description: entry.description,
                });
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> &ExtractSummary {
        &self.summary
    }

    pub fn finish(self) -> (PriceBook, ExtractSummary) {
        (self.book, self.summary)
    }
}
