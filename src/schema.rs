use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Chapter numbers at or above this threshold belong to the revenue side.
pub const REVENUE_CHAPTER_THRESHOLD: u32 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Expense,
    Revenue,
}

impl Side {
    pub fn from_chapter(chapter_number: u32) -> Self {
        if chapter_number >= REVENUE_CHAPTER_THRESHOLD {
            Side::Revenue
        } else {
            Side::Expense
        }
    }
}

/// Post-group classification, derived from the post number range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PostGroup {
    #[schemars(description = "Operating expenditure (posts 1-29, also the default)")]
    Operating,

    #[schemars(description = "Investment (posts 30-49)")]
    Investment,

    #[schemars(description = "Transfers to other government accounts (posts 50-69)")]
    GovernmentTransfers,

    #[schemars(description = "Transfers to the private sector (posts 70-89)")]
    PrivateTransfers,

    #[schemars(description = "Lending and state debt (posts 90-99)")]
    LendingAndDebt,
}

impl PostGroup {
    pub fn from_post_number(post_number: u32) -> Self {
        match post_number {
            30..=49 => PostGroup::Investment,
            50..=69 => PostGroup::GovernmentTransfers,
            70..=89 => PostGroup::PrivateTransfers,
            90..=99 => PostGroup::LendingAndDebt,
            _ => PostGroup::Operating,
        }
    }
}

/// One canonical row of the source budget table, at sub-post granularity.
/// Immutable once ingested; `side` and `post_group` are derived, never read
/// from the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub ministry_number: u32,
    pub ministry_name: String,
    pub area_number: u32,
    pub area_name: String,
    pub category_number: u32,
    pub category_name: String,
    pub chapter_number: u32,
    pub chapter_name: String,
    pub post_number: u32,
    pub sub_post_number: u32,
    pub post_name: String,
    /// Amount in whole NOK.
    pub amount: i64,
    pub keywords: Vec<String>,
    pub side: Side,
    pub post_group: PostGroup,
}

/// One row of the previously enacted ("settled") budget, at main-post
/// granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledLine {
    pub chapter_number: u32,
    pub post_number: u32,
    pub amount: i64,
}

/// Splits the free-text keyword field on commas. Whitespace is trimmed and
/// empty entries dropped, so an absent field yields an empty list.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Change against the settled budget, attached at any level of the
/// hierarchy. The percentage is always recomputed from the level's own
/// amounts; it is `None` exactly when the settled amount is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeFromSettled {
    pub amount: i64,
    pub settled_amount: i64,
    pub absolute_change: i64,
    pub percent_change: Option<f64>,
}

impl ChangeFromSettled {
    pub fn from_totals(amount: i64, settled_amount: i64) -> Self {
        let absolute_change = amount - settled_amount;
        let percent_change = if settled_amount == 0 {
            None
        } else {
            Some(round_one_decimal(
                absolute_change as f64 / (settled_amount as f64).abs() * 100.0,
            ))
        };
        ChangeFromSettled {
            amount,
            settled_amount,
            absolute_change,
            percent_change,
        }
    }
}

pub(crate) fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
