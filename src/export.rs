use crate::enrichment::{AggregatedCategory, FundSnapshot, ManualFigures, OilCorrected};
use crate::error::Result;
use crate::hierarchy::SideTree;
use crate::reconciliation::ReconciliationStats;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const FULL_DOCUMENT: &str = "budget_full.json";
pub const AGGREGATED_DOCUMENT: &str = "budget_aggregated.json";
pub const CHANGES_DOCUMENT: &str = "budget_changes.json";
pub const METADATA_DOCUMENT: &str = "metadata.json";

pub const CURRENCY: &str = "NOK";

/// The complete hierarchy document: both side trees, the fund snapshot and
/// the oil-corrected totals.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FullDocument {
    pub budget_year: i32,
    pub published: NaiveDate,
    pub currency: String,
    pub expenses: SideTree,
    pub revenues: SideTree,
    pub fund: FundSnapshot,
    pub oil_corrected: OilCorrected,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_figures: Option<ManualFigures>,
    pub metadata: SourceMetadata,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SourceMetadata {
    pub source: String,
    pub settled_budget: String,
}

/// The small aggregated document backing the landing page. Stays within a
/// fixed byte budget; the validator enforces it.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AggregatedDocument {
    pub budget_year: i32,
    /// Sum of the expense categories.
    pub total_expenses: i64,
    /// Equal to `total_expenses` under the balanced-budget convention: the
    /// revenue side plus the fund withdrawal covers the expense side.
    pub total_revenues: i64,
    pub expense_categories: Vec<AggregatedCategory>,
    pub revenue_categories: Vec<AggregatedCategory>,
    pub fund: FundSnapshot,
}

/// Reconciliation summary against the settled budget.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ChangesDocument {
    pub budget_year: i32,
    /// Label of the settled source, or `None` when no reconciliation ran.
    pub settled_source: Option<String>,
    pub settled_year: i32,
    pub has_reconciliation: bool,
    pub change_label: String,
    pub statistics: ReconciliationStats,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MetadataDocument {
    pub budget_year: i32,
    pub published: NaiveDate,
    pub source: String,
    pub settled_budget: String,
    pub totals: GrandTotals,
    pub oil_corrected: OilCorrected,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_figures: Option<ManualFigures>,
    pub fund: FundSnapshot,
    pub post_counts: PostCounts,
}

#[derive(Debug, Clone, Copy, Serialize, JsonSchema)]
pub struct GrandTotals {
    pub expenses: i64,
    pub revenues: i64,
}

#[derive(Debug, Clone, Copy, Serialize, JsonSchema)]
pub struct PostCounts {
    pub expenses: usize,
    pub revenues: usize,
}

impl FullDocument {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FullDocument)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::generate_json_schema())?)
    }
}

impl AggregatedDocument {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AggregatedDocument)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::generate_json_schema())?)
    }
}

/// Standard label for a budget-year source document.
pub fn source_label(budget_year: i32) -> String {
    format!("Gul bok {budget_year}")
}

/// Standard label for the settled budget a proposal is reconciled against.
pub fn settled_label(settled_year: i32) -> String {
    format!("Saldert budsjett {settled_year}")
}

pub fn export_full(document: &FullDocument, out_dir: &Path) -> Result<PathBuf> {
    write_document(out_dir, FULL_DOCUMENT, document)
}

pub fn export_aggregated(document: &AggregatedDocument, out_dir: &Path) -> Result<PathBuf> {
    write_document(out_dir, AGGREGATED_DOCUMENT, document)
}

pub fn export_changes(document: &ChangesDocument, out_dir: &Path) -> Result<PathBuf> {
    write_document(out_dir, CHANGES_DOCUMENT, document)
}

pub fn export_metadata(document: &MetadataDocument, out_dir: &Path) -> Result<PathBuf> {
    write_document(out_dir, METADATA_DOCUMENT, document)
}

fn write_document<T: Serialize>(out_dir: &Path, name: &str, document: &T) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(name);
    // UTF-8 JSON with the Norwegian characters kept literal, not escaped.
    let json = serde_json::to_string_pretty(document)?;
    fs::write(&path, json)?;
    Ok(path)
}
