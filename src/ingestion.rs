use crate::error::{BudgetDatasetError, Result};
use crate::schema::{parse_keywords, BudgetLine, PostGroup, SettledLine, Side};
use log::warn;
use serde::Deserialize;
use std::path::Path;

/// Column contract for the source budget table. The ingested file must carry
/// exactly these columns, in this order.
pub const BUDGET_COLUMNS: [&str; 13] = [
    "ministry_number",
    "ministry_name",
    "area_number",
    "area_name",
    "category_number",
    "category_name",
    "chapter_number",
    "chapter_name",
    "post_number",
    "sub_post_number",
    "post_name",
    "keywords",
    "amount",
];

/// Column contract for the settled budget table (main-post granularity).
pub const SETTLED_COLUMNS: [&str; 3] = ["chapter_number", "post_number", "amount"];

#[derive(Debug, Deserialize)]
struct RawBudgetRow {
    ministry_number: u32,
    ministry_name: String,
    area_number: u32,
    area_name: String,
    category_number: u32,
    category_name: String,
    chapter_number: u32,
    chapter_name: String,
    post_number: u32,
    sub_post_number: u32,
    post_name: String,
    keywords: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RawSettledRow {
    chapter_number: u32,
    post_number: u32,
    amount: i64,
}

/// Reads the source budget CSV and returns the canonical row table.
///
/// Any deviation from the column contract is a fatal error: the core pipeline
/// never sees a malformed table.
pub fn read_budget_csv(path: &Path) -> Result<Vec<BudgetLine>> {
    let mut reader = open_checked(path, &BUDGET_COLUMNS)?;
    let file = file_label(path);

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<RawBudgetRow>().enumerate() {
        let raw = record.map_err(|e| BudgetDatasetError::InvalidField {
            file: file.clone(),
            // 1-based, counting the header line
            row: index + 2,
            details: e.to_string(),
        })?;
        rows.push(canonicalize(raw));
    }

    Ok(rows)
}

/// Reads the settled budget CSV at main-post granularity.
pub fn read_settled_csv(path: &Path) -> Result<Vec<SettledLine>> {
    let mut reader = open_checked(path, &SETTLED_COLUMNS)?;
    let file = file_label(path);

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<RawSettledRow>().enumerate() {
        let raw = record.map_err(|e| BudgetDatasetError::InvalidField {
            file: file.clone(),
            row: index + 2,
            details: e.to_string(),
        })?;
        rows.push(SettledLine {
            chapter_number: raw.chapter_number,
            post_number: raw.post_number,
            amount: raw.amount,
        });
    }

    Ok(rows)
}

fn open_checked(path: &Path, expected_columns: &[&str]) -> Result<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(BudgetDatasetError::SourceFileMissing(file_label(path)));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let actual: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let expected: Vec<String> = expected_columns.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        return Err(BudgetDatasetError::ColumnContract {
            file: file_label(path),
            expected,
            actual,
        });
    }

    Ok(reader)
}

fn file_label(path: &Path) -> String {
    path.display().to_string()
}

fn canonicalize(raw: RawBudgetRow) -> BudgetLine {
    BudgetLine {
        ministry_number: raw.ministry_number,
        ministry_name: raw.ministry_name.trim().to_string(),
        area_number: raw.area_number,
        area_name: raw.area_name.trim().to_string(),
        category_number: raw.category_number,
        category_name: raw.category_name.trim().to_string(),
        chapter_number: raw.chapter_number,
        chapter_name: raw.chapter_name.trim().to_string(),
        post_number: raw.post_number,
        sub_post_number: raw.sub_post_number,
        post_name: raw.post_name.trim().to_string(),
        amount: raw.amount,
        keywords: parse_keywords(&raw.keywords),
        side: Side::from_chapter(raw.chapter_number),
        post_group: PostGroup::from_post_number(raw.post_number),
    }
}

/// Basic properties of an ingested dataset, used for progress logging and
/// run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub row_count: usize,
    pub expense_count: usize,
    pub revenue_count: usize,
    pub expense_total: i64,
    pub revenue_total: i64,
}

/// Summarizes the canonical table and logs advisory warnings for datasets
/// that look implausible. Warnings never abort the run.
pub fn dataset_summary(rows: &[BudgetLine]) -> DatasetSummary {
    let mut summary = DatasetSummary {
        row_count: rows.len(),
        expense_count: 0,
        revenue_count: 0,
        expense_total: 0,
        revenue_total: 0,
    };

    for row in rows {
        match row.side {
            Side::Expense => {
                summary.expense_count += 1;
                summary.expense_total += row.amount;
            }
            Side::Revenue => {
                summary.revenue_count += 1;
                summary.revenue_total += row.amount;
            }
        }
    }

    if summary.row_count < 100 {
        warn!("unusually small dataset: {} rows", summary.row_count);
    }
    if summary.expense_count == 0 {
        warn!("no expense posts found");
    }
    if summary.revenue_count == 0 {
        warn!("no revenue posts found");
    }

    summary
}
