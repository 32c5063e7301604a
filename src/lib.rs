//! # Budget Dataset Builder
//!
//! A library for transforming a national budget proposal ("Gul bok") into
//! validated, hierarchical, machine-readable datasets for a public
//! visualization front end.
//!
//! ## Core Concepts
//!
//! - **Canonical rows**: one line per budget post at sub-post granularity,
//!   with the expense/revenue side and the post group derived from fixed
//!   numbering rules
//! - **Hierarchy**: program area → category → chapter → post, with every
//!   total folded bottom-up from its children (whole NOK, zero drift)
//! - **Fund snapshot**: the sovereign wealth fund transfers, the petroleum
//!   cash flow by source, and the withdrawal that balances the
//!   oil-corrected budget
//! - **Oil-corrected totals**: expense and revenue totals excluding the
//!   petroleum chapters, per the fixed exclusion rules
//! - **Reconciliation**: a left join against the previously settled budget,
//!   with percentages recomputed from rolled-up sums at every level
//! - **Integrity gate**: every exported total is re-derived from the
//!   exported files themselves; a run only passes with zero violations
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_dataset_builder::{run_year, PipelineOptions};
//! use std::path::PathBuf;
//!
//! let report = run_year(&PipelineOptions {
//!     budget_year: 2026,
//!     source_path: PathBuf::from("data/gul_bok_2026.csv"),
//!     settled_path: Some(PathBuf::from("data/saldert_2025.csv")),
//!     out_dir: PathBuf::from("out"),
//!     published: None,
//! })?;
//!
//! assert!(report.is_ok(), "validation violations: {:?}", report.violations);
//! ```

pub mod enrichment;
pub mod error;
pub mod export;
pub mod hierarchy;
pub mod ingestion;
pub mod reconciliation;
pub mod schema;
pub mod validator;

pub use enrichment::{
    aggregate_expense_categories, aggregate_revenue_categories, compute_fund_snapshot,
    compute_oil_corrected, manual_figures_for_year, AggregatedCategory, CashFlowSource,
    FundSnapshot, ManualFigures, OilCorrected,
};
pub use error::{BudgetDatasetError, Result};
pub use export::{
    AggregatedDocument, ChangesDocument, FullDocument, GrandTotals, MetadataDocument,
    PostCounts, SourceMetadata,
};
pub use hierarchy::{build_hierarchy, AreaNode, CategoryNode, ChapterNode, Hierarchy, Post, SideTree};
pub use ingestion::{dataset_summary, read_budget_csv, read_settled_csv, DatasetSummary};
pub use reconciliation::{
    quality_warnings, reconcile, PostChange, ReconciliationIndex, ReconciliationStats,
    SettledMatch,
};
pub use schema::{BudgetLine, ChangeFromSettled, PostGroup, SettledLine, Side};
pub use validator::validate_exports;

use chrono::{Local, NaiveDate};
use log::{info, warn};
use std::path::PathBuf;

/// Inputs for one budget-year run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub budget_year: i32,
    /// CSV with the canonical row table for the proposal.
    pub source_path: PathBuf,
    /// CSV with the settled budget at main-post granularity, when a
    /// reconciliation baseline exists.
    pub settled_path: Option<PathBuf>,
    /// Documents are written to `<out_dir>/<budget_year>/`.
    pub out_dir: PathBuf,
    /// Publication date stamped into the documents; today when `None`.
    pub published: Option<NaiveDate>,
}

/// Outcome of one budget-year run. The documents are written even when
/// validation finds violations, so a failed run can be inspected on disk.
#[derive(Debug)]
pub struct YearReport {
    pub budget_year: i32,
    pub row_count: usize,
    pub expense_total: i64,
    pub revenue_total: i64,
    pub documents: Vec<PathBuf>,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl YearReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Runs the full pipeline for one budget year: ingestion, optional
/// reconciliation, hierarchy building, enrichment, export and validation.
///
/// Contract violations in the input abort with an error before anything is
/// written. Validation violations do not: they are returned in the report
/// and the caller decides the run's exit status.
pub fn run_year(options: &PipelineOptions) -> Result<YearReport> {
    info!("running budget pipeline for {}", options.budget_year);

    let rows = ingestion::read_budget_csv(&options.source_path)?;
    let summary = ingestion::dataset_summary(&rows);
    info!(
        "ingested {} rows ({} expense posts, {} revenue posts)",
        summary.row_count, summary.expense_count, summary.revenue_count
    );

    let mut warnings = Vec::new();
    let (index, statistics) = match &options.settled_path {
        Some(path) => {
            let settled = ingestion::read_settled_csv(path)?;
            let index = reconciliation::reconcile(&rows, &settled);
            let statistics = index.stats();
            info!("reconciliation: {}", statistics.summary());
            for warning in reconciliation::quality_warnings(&statistics) {
                warn!("{warning}");
                warnings.push(warning);
            }
            (Some(index), Some(statistics))
        }
        None => (None, None),
    };

    let hierarchy = hierarchy::build_hierarchy(&rows, index.as_ref());
    let oil_corrected = enrichment::compute_oil_corrected(&rows);
    let fund = enrichment::compute_fund_snapshot(&rows, oil_corrected.deficit);
    let expense_categories = enrichment::aggregate_expense_categories(&rows);
    let revenue_categories = enrichment::aggregate_revenue_categories(&rows);
    let manual_figures = enrichment::manual_figures_for_year(options.budget_year);

    let published = options
        .published
        .unwrap_or_else(|| Local::now().date_naive());
    let settled_year = options.budget_year - 1;
    let out_dir = options.out_dir.join(options.budget_year.to_string());

    let total_expenses: i64 = expense_categories.iter().map(|c| c.amount).sum();
    let expense_total = hierarchy.expenses.total;
    let revenue_total = hierarchy.revenues.total;

    let full = export::FullDocument {
        budget_year: options.budget_year,
        published,
        currency: export::CURRENCY.to_string(),
        expenses: hierarchy.expenses,
        revenues: hierarchy.revenues,
        fund: fund.clone(),
        oil_corrected,
        manual_figures,
        metadata: export::SourceMetadata {
            source: export::source_label(options.budget_year),
            settled_budget: settled_year.to_string(),
        },
    };

    let aggregated = export::AggregatedDocument {
        budget_year: options.budget_year,
        total_expenses,
        total_revenues: total_expenses,
        expense_categories,
        revenue_categories,
        fund: fund.clone(),
    };

    let has_reconciliation = statistics.is_some();
    let changes = export::ChangesDocument {
        budget_year: options.budget_year,
        settled_source: options
            .settled_path
            .as_ref()
            .map(|_| export::settled_label(settled_year)),
        settled_year,
        has_reconciliation,
        change_label: format!("Endring fra saldert budsjett {settled_year}"),
        statistics: statistics.unwrap_or_else(ReconciliationStats::empty),
    };

    let metadata = export::MetadataDocument {
        budget_year: options.budget_year,
        published,
        source: export::source_label(options.budget_year),
        settled_budget: settled_year.to_string(),
        totals: export::GrandTotals {
            expenses: expense_total,
            revenues: revenue_total,
        },
        oil_corrected,
        manual_figures,
        fund,
        post_counts: export::PostCounts {
            expenses: summary.expense_count,
            revenues: summary.revenue_count,
        },
    };

    let documents = vec![
        export::export_full(&full, &out_dir)?,
        export::export_aggregated(&aggregated, &out_dir)?,
        export::export_changes(&changes, &out_dir)?,
        export::export_metadata(&metadata, &out_dir)?,
    ];

    // Validation runs against what was actually written, never the in-memory
    // structures.
    let violations = validator::validate_exports(&out_dir, options.budget_year);
    if violations.is_empty() {
        info!("all validations passed for {}", options.budget_year);
    } else {
        for violation in &violations {
            warn!("validation: {violation}");
        }
    }

    Ok(YearReport {
        budget_year: options.budget_year,
        row_count: summary.row_count,
        expense_total,
        revenue_total,
        documents,
        violations,
        warnings,
    })
}

/// Outcome of one year inside a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub budget_year: i32,
    pub result: Result<YearReport>,
}

/// Report for a multi-year batch run.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// True only when every year ran without errors and without validation
    /// violations.
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|outcome| {
            matches!(&outcome.result, Ok(report) if report.is_ok())
        })
    }
}

/// Runs several budget years sequentially. A fatal error in one year aborts
/// only that year; the batch continues and the per-year outcome records the
/// error.
pub fn run_batch(runs: Vec<PipelineOptions>) -> BatchReport {
    let outcomes = runs
        .into_iter()
        .map(|options| {
            let budget_year = options.budget_year;
            let result = run_year(&options);
            if let Err(error) = &result {
                warn!("pipeline failed for {budget_year}: {error}");
            }
            BatchOutcome {
                budget_year,
                result,
            }
        })
        .collect();

    BatchReport { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "ministry_number,ministry_name,area_number,area_name,category_number,\
                          category_name,chapter_number,chapter_name,post_number,sub_post_number,\
                          post_name,keywords,amount";

    fn write_file(dir: &std::path::Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn source_csv() -> String {
        let rows = [
            "10,HOD,10,Helse og omsorg,1010,Helseforvaltning,700,Helsedirektoratet,1,0,Driftsutgifter,,600",
            "13,KDD,13,Kommuner og distrikter,1310,Rammetilskudd,571,Rammetilskudd til kommuner,60,0,Innbyggertilskudd,,400",
            "28,ASD,28,Alderdom,2810,Alderspensjon,2541,Alderspensjon,70,0,Grunnpensjon,overslagsbevilgning,500",
            "4,FD,4,Forsvar,410,Militært forsvar,1700,Forsvarsdepartementet,1,0,Driftsutgifter,,200",
            "20,FIN,34,Statens pensjonsfond utland,3410,Fondet,2800,Statens pensjonsfond utland,50,0,Overføring til fondet,,350",
            "20,FIN,34,Statens pensjonsfond utland,3410,Fondet,2800,Statens pensjonsfond utland,96,0,Finansposter overført til fondet,,50",
            "16,NFD,16,Fiskeri,1610,Forvaltning,900,Nærings- og fiskeridepartementet,90,0,Lån,,100",
            "20,FIN,25,Skatter og avgifter,2510,Skatter,5501,Skatt på inntekt og formue,70,0,Trinnskatt mv.,,800",
            "20,FIN,25,Skatter og avgifter,2510,Avgifter,5521,Merverdiavgift,70,0,Merverdiavgift,,300",
            "20,FIN,25,Skatter og avgifter,2515,Folketrygden,5700,Folketrygdens inntekter,71,0,Trygdeavgift,,150",
            "20,FIN,25,Skatter og avgifter,2515,Folketrygden,5700,Folketrygdens inntekter,72,0,Arbeidsgiveravgift,,120",
            "20,FIN,26,Petroleum,2600,Skatter,5507,Skatt på utvinning av petroleum,70,0,Ordinær skatt,,180",
            "20,FIN,26,Petroleum,2600,SDØE,5440,Statens direkte økonomiske engasjement,24,0,Driftsresultat,,90",
            "20,FIN,26,Petroleum,2600,Utbytte,5685,Aksjer i Equinor ASA,85,0,Utbytte,,30",
            "20,FIN,31,Fondet,3110,Overføringer,5800,Statens pensjonsfond utland,50,0,Overføring fra fondet,,290",
            "2,UD,2,Utenriks,210,Utenrikstjenesten,3021,Utenrikstjenesten,1,0,Diverse gebyrer,,40",
        ];
        format!("{HEADER}\n{}\n", rows.join("\n"))
    }

    fn settled_csv() -> String {
        // Matches most posts from the source fixture, with one zero-amount
        // baseline; chapter 3021 post 1 is deliberately absent (a new post).
        "chapter_number,post_number,amount\n\
         700,1,550\n\
         571,60,380\n\
         2541,70,480\n\
         1700,1,190\n\
         2800,50,320\n\
         2800,96,45\n\
         900,90,100\n\
         5501,70,750\n\
         5521,70,280\n\
         5700,71,140\n\
         5700,72,0\n\
         5507,70,170\n\
         5440,24,85\n\
         5685,85,25\n\
         5800,50,260\n"
            .to_string()
    }

    fn options(dir: &std::path::Path, settled: bool) -> PipelineOptions {
        let source_path = write_file(dir, "gul_bok_2027.csv", &source_csv());
        let settled_path =
            settled.then(|| write_file(dir, "saldert_2026.csv", &settled_csv()));
        PipelineOptions {
            budget_year: 2027,
            source_path,
            settled_path,
            out_dir: dir.join("out"),
            published: NaiveDate::from_ymd_opt(2026, 10, 7),
        }
    }

    #[test]
    fn test_end_to_end_run_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_year(&options(dir.path(), true)).unwrap();

        assert!(report.is_ok(), "violations: {:?}", report.violations);
        assert_eq!(report.row_count, 16);
        // Expense side: 600 + 400 + 500 + 200 + 350 + 50 + 100.
        assert_eq!(report.expense_total, 2200);
        // Revenue side: 800 + 300 + 150 + 120 + 180 + 90 + 30 + 290 + 40.
        assert_eq!(report.revenue_total, 2000);
        assert_eq!(report.documents.len(), 4);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_run_without_settled_budget() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_year(&options(dir.path(), false)).unwrap();
        assert!(report.is_ok(), "violations: {:?}", report.violations);

        let raw = std::fs::read_to_string(
            dir.path().join("out/2027").join(export::CHANGES_DOCUMENT),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["settled_source"], serde_json::Value::Null);
        assert_eq!(value["has_reconciliation"], false);
    }

    #[test]
    fn test_identical_inputs_produce_identical_documents() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        run_year(&options(dir_a.path(), true)).unwrap();
        run_year(&options(dir_b.path(), true)).unwrap();

        for name in [
            export::FULL_DOCUMENT,
            export::AGGREGATED_DOCUMENT,
            export::CHANGES_DOCUMENT,
            export::METADATA_DOCUMENT,
        ] {
            let a = std::fs::read(dir_a.path().join("out/2027").join(name)).unwrap();
            let b = std::fs::read(dir_b.path().join("out/2027").join(name)).unwrap();
            assert_eq!(a, b, "document {name} differs between identical runs");
        }
    }

    #[test]
    fn test_batch_continues_past_a_failing_year() {
        let dir = tempfile::tempdir().unwrap();
        let good = options(dir.path(), true);
        let bad = PipelineOptions {
            budget_year: 2028,
            source_path: dir.path().join("missing.csv"),
            settled_path: None,
            out_dir: dir.path().join("out"),
            published: NaiveDate::from_ymd_opt(2026, 10, 7),
        };

        let report = run_batch(vec![bad, good]);
        assert!(!report.all_ok());
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].result.is_err());
        assert!(matches!(&report.outcomes[1].result, Ok(r) if r.is_ok()));
    }
}
