use crate::schema::{round_one_decimal, BudgetLine, ChangeFromSettled, SettledLine};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of unmatched posts above which the join quality is flagged.
pub const NEW_POST_WARNING_SHARE: f64 = 0.10;

/// Join result against the settled budget for one (chapter, post) key.
/// `None` means the post does not exist in the settled budget: a new post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledMatch {
    pub amount: i64,
    pub absolute_change: i64,
    pub percent_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostChange {
    /// Current amount at main-post granularity (sub-posts summed).
    pub current_amount: i64,
    pub settled: Option<SettledMatch>,
}

impl PostChange {
    pub fn is_new(&self) -> bool {
        self.settled.is_none()
    }

    pub fn percent_change(&self) -> Option<f64> {
        self.settled.as_ref().and_then(|m| m.percent_change)
    }

    /// Annotation for a single sub-post line sharing this key. The settled
    /// amount and deltas are only known at main-post granularity, so they are
    /// propagated as-is; the amount is the line's own.
    pub fn line_annotation(&self, line_amount: i64) -> Option<ChangeFromSettled> {
        self.settled.as_ref().map(|m| ChangeFromSettled {
            amount: line_amount,
            settled_amount: m.amount,
            absolute_change: m.absolute_change,
            percent_change: m.percent_change,
        })
    }
}

/// The canonical table joined against the settled budget, keyed by
/// (chapter, post).
#[derive(Debug, Clone, Default)]
pub struct ReconciliationIndex {
    entries: BTreeMap<(u32, u32), PostChange>,
}

impl ReconciliationIndex {
    pub fn get(&self, chapter_number: u32, post_number: u32) -> Option<&PostChange> {
        self.entries.get(&(chapter_number, post_number))
    }

    pub fn post_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u32), &PostChange)> {
        self.entries.iter()
    }

    pub fn stats(&self) -> ReconciliationStats {
        let post_count = self.entries.len();
        let matched_count = self
            .entries
            .values()
            .filter(|entry| entry.settled.is_some())
            .count();
        let new_count = post_count - matched_count;

        let match_rate_percent = if post_count == 0 {
            0.0
        } else {
            round_one_decimal(matched_count as f64 / post_count as f64 * 100.0)
        };

        let settled_total: i64 = self
            .entries
            .values()
            .filter_map(|entry| entry.settled.as_ref())
            .map(|m| m.amount)
            .sum();
        let current_total: i64 = self.entries.values().map(|entry| entry.current_amount).sum();

        ReconciliationStats {
            post_count,
            matched_count,
            new_count,
            match_rate_percent,
            settled_total,
            current_total,
            net_change: current_total - settled_total,
        }
    }
}

/// Joins the canonical table against the settled budget.
///
/// The canonical table is first aggregated to (chapter, post) granularity to
/// match the settled table; the join is left-outer, so every current post is
/// kept and posts without a settled counterpart are flagged new.
pub fn reconcile(rows: &[BudgetLine], settled: &[SettledLine]) -> ReconciliationIndex {
    let mut current: BTreeMap<(u32, u32), i64> = BTreeMap::new();
    for row in rows {
        *current
            .entry((row.chapter_number, row.post_number))
            .or_default() += row.amount;
    }

    let mut settled_amounts: BTreeMap<(u32, u32), i64> = BTreeMap::new();
    for line in settled {
        *settled_amounts
            .entry((line.chapter_number, line.post_number))
            .or_default() += line.amount;
    }

    let entries = current
        .into_iter()
        .map(|(key, current_amount)| {
            let settled = settled_amounts.get(&key).map(|&amount| {
                let change = ChangeFromSettled::from_totals(current_amount, amount);
                SettledMatch {
                    amount,
                    absolute_change: change.absolute_change,
                    percent_change: change.percent_change,
                }
            });
            (
                key,
                PostChange {
                    current_amount,
                    settled,
                },
            )
        })
        .collect();

    ReconciliationIndex { entries }
}

/// Summary statistics for the join, embedded in the exported metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReconciliationStats {
    pub post_count: usize,
    pub matched_count: usize,
    pub new_count: usize,
    pub match_rate_percent: f64,
    pub settled_total: i64,
    pub current_total: i64,
    pub net_change: i64,
}

impl ReconciliationStats {
    /// Zeroed statistics for runs without settled data.
    pub fn empty() -> Self {
        ReconciliationStats {
            post_count: 0,
            matched_count: 0,
            new_count: 0,
            match_rate_percent: 0.0,
            settled_total: 0,
            current_total: 0,
            net_change: 0,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "matched {} of {} posts ({}%), net change {} NOK",
            self.matched_count, self.post_count, self.match_rate_percent, self.net_change
        )
    }
}

/// Advisory data-quality warnings about the join. These never block the run;
/// callers log them and surface them in the run report.
pub fn quality_warnings(stats: &ReconciliationStats) -> Vec<String> {
    let mut warnings = Vec::new();

    if stats.post_count > 0 {
        let new_share = stats.new_count as f64 / stats.post_count as f64;
        if new_share > NEW_POST_WARNING_SHARE {
            warnings.push(format!(
                "too many posts without a settled match: {:.1}% ({} of {})",
                new_share * 100.0,
                stats.new_count,
                stats.post_count
            ));
        }
    }

    if stats.settled_total <= 0 {
        warnings.push(format!(
            "settled budget total is zero or negative: {}",
            stats.settled_total
        ));
    }

    warnings
}
