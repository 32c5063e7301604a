use crate::schema::{BudgetLine, Side};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Fixed chapter/post identifiers for the sovereign wealth fund flows.
// These are business rules of the budget document, not configuration.
pub const FUND_CHAPTER_TO: u32 = 2800;
pub const FUND_POST_TRANSFER: u32 = 50;
pub const FUND_POST_FINANCIAL_ITEMS: u32 = 96;
pub const FUND_CHAPTER_FROM: u32 = 5800;

/// Petroleum chapters excluded from the oil-corrected expense total.
pub const PETROLEUM_EXPENSE_CHAPTERS: [u32; 2] = [2800, 2440];

/// Petroleum chapters excluded from the oil-corrected revenue total.
pub const PETROLEUM_REVENUE_CHAPTERS: [u32; 6] = [5800, 5507, 5508, 5509, 5440, 5685];

/// Petroleum tax chapters (ordinary tax, CO2 duty, NOx duty).
const PETROLEUM_TAX_CHAPTERS: [u32; 3] = [5507, 5508, 5509];
const SDFI_CHAPTER: u32 = 5440;
const EQUINOR_DIVIDEND_CHAPTER: u32 = 5685;

/// Program areas that make up the national insurance scheme.
pub const SOCIAL_INSURANCE_AREAS: [u32; 4] = [28, 29, 30, 33];

/// Posts at or above this number are financial transactions (lending, debt)
/// and fall outside the oil-corrected budget.
const FINANCIAL_TRANSACTION_POST: u32 = 90;

/// Monochrome marine scale for expense categories, darkest first.
pub const EXPENSE_PALETTE: [&str; 8] = [
    "#0C1045", "#181C62", "#263080", "#354A9E", "#4A65B5", "#6580C5", "#839DD5", "#A8BAE2",
];

/// Monochrome teal scale for revenue categories, darkest first.
pub const REVENUE_PALETTE: [&str; 5] = [
    "#004D52", "#006B73", "#008286", "#2A9D8F", "#5AB8AD",
];

/// One source of the state's net cash flow from petroleum activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CashFlowSource {
    pub id: String,
    pub name: String,
    pub amount: i64,
}

/// Key figures for the sovereign wealth fund: booked transfers, the
/// withdrawal that balances the oil-corrected budget, and the petroleum cash
/// flow broken down by source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FundSnapshot {
    pub transfer_to_fund: i64,
    pub financial_items_to_fund: i64,
    pub transfer_from_fund: i64,
    /// Booked net transfer: to-fund plus financial items minus from-fund.
    pub net_transfer: i64,
    /// The oil-corrected deficit, supplied by the aggregator.
    pub withdrawal: i64,
    /// Sum of the cash-flow sources below.
    pub net_cash_flow: i64,
    pub cash_flow_sources: Vec<CashFlowSource>,
}

/// Isolates the fund transfer posts and the petroleum cash-flow sources.
///
/// The withdrawal is a balancing figure derived from the oil-corrected
/// totals, so it is passed in rather than summed from rows. The sources list
/// is variable-length: the Equinor dividend and the residual are only listed
/// when positive, and an omitted residual is never subtracted elsewhere.
pub fn compute_fund_snapshot(rows: &[BudgetLine], withdrawal: i64) -> FundSnapshot {
    let transfer_to_fund = sum_chapter_post(rows, FUND_CHAPTER_TO, FUND_POST_TRANSFER);
    let financial_items_to_fund = sum_chapter_post(rows, FUND_CHAPTER_TO, FUND_POST_FINANCIAL_ITEMS);
    let transfer_from_fund = sum_chapter_post(rows, FUND_CHAPTER_FROM, FUND_POST_TRANSFER);

    let petroleum_taxes: i64 = rows
        .iter()
        .filter(|r| r.side == Side::Revenue && PETROLEUM_TAX_CHAPTERS.contains(&r.chapter_number))
        .map(|r| r.amount)
        .sum();
    let sdfi: i64 = rows
        .iter()
        .filter(|r| r.side == Side::Revenue && r.chapter_number == SDFI_CHAPTER)
        .map(|r| r.amount)
        .sum();
    let equinor_dividend: i64 = rows
        .iter()
        .filter(|r| r.side == Side::Revenue && r.chapter_number == EQUINOR_DIVIDEND_CHAPTER)
        .map(|r| r.amount)
        .sum();

    let mut cash_flow_sources = vec![
        CashFlowSource {
            id: "petroleum_taxes".to_string(),
            name: "Petroleumsskatter".to_string(),
            amount: petroleum_taxes,
        },
        CashFlowSource {
            id: "sdfi".to_string(),
            name: "SDFI".to_string(),
            amount: sdfi,
        },
    ];
    if equinor_dividend > 0 {
        cash_flow_sources.push(CashFlowSource {
            id: "equinor_dividend".to_string(),
            name: "Equinor-utbytte".to_string(),
            amount: equinor_dividend,
        });
    }

    let mut net_cash_flow: i64 = cash_flow_sources.iter().map(|s| s.amount).sum();

    // Residual petroleum revenue, using the booked transfer to the fund as a
    // proxy for the total cash flow. If the named sources already cover the
    // booked transfer the residual is omitted entirely.
    let other_petroleum = transfer_to_fund + financial_items_to_fund - net_cash_flow;
    if other_petroleum > 0 {
        cash_flow_sources.push(CashFlowSource {
            id: "other_petroleum".to_string(),
            name: "Andre petroleumsinntekter".to_string(),
            amount: other_petroleum,
        });
        net_cash_flow += other_petroleum;
    }

    FundSnapshot {
        transfer_to_fund,
        financial_items_to_fund,
        transfer_from_fund,
        net_transfer: transfer_to_fund + financial_items_to_fund - transfer_from_fund,
        withdrawal,
        net_cash_flow,
        cash_flow_sources,
    }
}

fn sum_chapter_post(rows: &[BudgetLine], chapter_number: u32, post_number: u32) -> i64 {
    rows.iter()
        .filter(|r| r.chapter_number == chapter_number && r.post_number == post_number)
        .map(|r| r.amount)
        .sum()
}

/// Totals for the budget excluding petroleum-related flows, and the deficit
/// the fund withdrawal has to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OilCorrected {
    pub expense_total: i64,
    pub revenue_total: i64,
    /// `expense_total - revenue_total`: definitionally the difference, never
    /// independently summed.
    pub deficit: i64,
}

pub fn compute_oil_corrected(rows: &[BudgetLine]) -> OilCorrected {
    let expense_total: i64 = oil_corrected_expenses(rows).map(|r| r.amount).sum();
    let revenue_total: i64 = oil_corrected_revenues(rows).map(|r| r.amount).sum();
    OilCorrected {
        expense_total,
        revenue_total,
        deficit: expense_total - revenue_total,
    }
}

fn oil_corrected_expenses(rows: &[BudgetLine]) -> impl Iterator<Item = &BudgetLine> {
    rows.iter().filter(|r| {
        r.side == Side::Expense
            && r.post_number < FINANCIAL_TRANSACTION_POST
            && !PETROLEUM_EXPENSE_CHAPTERS.contains(&r.chapter_number)
    })
}

fn oil_corrected_revenues(rows: &[BudgetLine]) -> impl Iterator<Item = &BudgetLine> {
    rows.iter().filter(|r| {
        r.side == Side::Revenue
            && r.post_number < FINANCIAL_TRANSACTION_POST
            && !PETROLEUM_REVENUE_CHAPTERS.contains(&r.chapter_number)
    })
}

/// One human-facing category in the aggregated dataset. The membership
/// descriptor (`area_number` / `area_numbers`) exists for traceability only;
/// amounts are always computed from the row filters, never from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregatedCategory {
    pub id: String,
    pub name: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub area_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub area_numbers: Option<Vec<u32>>,
    pub color: String,
}

impl AggregatedCategory {
    fn for_area(id: &str, name: &str, area_number: u32, amount: i64) -> Self {
        AggregatedCategory {
            id: id.to_string(),
            name: name.to_string(),
            amount,
            area_number: Some(area_number),
            area_numbers: None,
            color: String::new(),
        }
    }

    fn for_areas(id: &str, name: &str, area_numbers: Vec<u32>, amount: i64) -> Self {
        AggregatedCategory {
            id: id.to_string(),
            name: name.to_string(),
            amount,
            area_number: None,
            area_numbers: Some(area_numbers),
            color: String::new(),
        }
    }
}

/// Buckets the oil-corrected expense rows into the fixed category partition
/// for the landing-page dataset.
pub fn aggregate_expense_categories(rows: &[BudgetLine]) -> Vec<AggregatedCategory> {
    let filtered: Vec<&BudgetLine> = oil_corrected_expenses(rows).collect();

    let sum_area = |area: u32| -> i64 {
        filtered
            .iter()
            .filter(|r| r.area_number == area)
            .map(|r| r.amount)
            .sum()
    };

    let social_insurance: i64 = filtered
        .iter()
        .filter(|r| SOCIAL_INSURANCE_AREAS.contains(&r.area_number))
        .map(|r| r.amount)
        .sum();

    // Area 34 holds only the fund-transfer chapter, which the petroleum
    // filter already removed; it is still listed as known so it never shows
    // up in the residual bucket.
    let mut known_areas: BTreeSet<u32> = SOCIAL_INSURANCE_AREAS.into_iter().collect();
    known_areas.extend([34, 13, 10, 7, 17, 4, 21]);

    let residual: i64 = filtered
        .iter()
        .filter(|r| !known_areas.contains(&r.area_number))
        .map(|r| r.amount)
        .sum();
    let residual_areas: Vec<u32> = filtered
        .iter()
        .filter(|r| !known_areas.contains(&r.area_number))
        .map(|r| r.area_number)
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    let mut categories = vec![
        AggregatedCategory::for_areas(
            "folketrygden",
            "Folketrygden",
            SOCIAL_INSURANCE_AREAS.to_vec(),
            social_insurance,
        ),
        AggregatedCategory::for_area("kommuner", "Kommuner og distrikter", 13, sum_area(13)),
        AggregatedCategory::for_area("helse", "Helse og omsorg", 10, sum_area(10)),
        AggregatedCategory::for_area("kunnskap", "Kunnskapsformål", 7, sum_area(7)),
        AggregatedCategory::for_area("naering", "Næring og fiskeri", 17, sum_area(17)),
        AggregatedCategory::for_area("forsvar", "Forsvar", 4, sum_area(4)),
        AggregatedCategory::for_area("transport", "Innenlands transport", 21, sum_area(21)),
        AggregatedCategory::for_areas("ovrige_utgifter", "Øvrige utgifter", residual_areas, residual),
    ];

    assign_colors(&mut categories, &EXPENSE_PALETTE);
    categories
}

/// Buckets the oil-corrected revenue rows. The residual is defined as the
/// filtered grand total minus the named buckets, so the partition always
/// sums exactly to the oil-corrected revenue total.
pub fn aggregate_revenue_categories(rows: &[BudgetLine]) -> Vec<AggregatedCategory> {
    let filtered: Vec<&BudgetLine> = oil_corrected_revenues(rows).collect();

    let sum_chapter = |chapter: u32| -> i64 {
        filtered
            .iter()
            .filter(|r| r.chapter_number == chapter)
            .map(|r| r.amount)
            .sum()
    };
    let sum_chapter_post = |chapter: u32, post: u32| -> i64 {
        filtered
            .iter()
            .filter(|r| r.chapter_number == chapter && r.post_number == post)
            .map(|r| r.amount)
            .sum()
    };

    let income_and_wealth_tax = sum_chapter(5501);
    let vat = sum_chapter(5521);
    let insurance_contribution = sum_chapter_post(5700, 71);
    let employer_contribution = sum_chapter_post(5700, 72);

    let grand_total: i64 = filtered.iter().map(|r| r.amount).sum();
    let named_total =
        income_and_wealth_tax + vat + insurance_contribution + employer_contribution;
    let residual = grand_total - named_total;

    let residual_areas: Vec<u32> = filtered
        .iter()
        .filter(|r| r.area_number != 25 && r.area_number != 34)
        .map(|r| r.area_number)
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    let mut categories = vec![
        AggregatedCategory::for_area(
            "skatt_person",
            "Skatt på inntekt og formue",
            25,
            income_and_wealth_tax,
        ),
        AggregatedCategory::for_area("mva", "Merverdiavgift", 25, vat),
        AggregatedCategory::for_area("trygdeavgift", "Trygdeavgift", 25, insurance_contribution),
        AggregatedCategory::for_area(
            "arbeidsgiveravgift",
            "Arbeidsgiveravgift",
            25,
            employer_contribution,
        ),
        AggregatedCategory::for_areas("ovrige_inntekter", "Øvrige inntekter", residual_areas, residual),
    ];

    assign_colors(&mut categories, &REVENUE_PALETTE);
    categories
}

/// Sorts categories descending by amount and assigns palette colors by rank,
/// darkest to the largest. Past the end of the palette the last color
/// repeats.
fn assign_colors(categories: &mut [AggregatedCategory], palette: &[&str]) {
    categories.sort_by(|a, b| b.amount.cmp(&a.amount));
    for (rank, category) in categories.iter_mut().enumerate() {
        category.color = palette[rank.min(palette.len() - 1)].to_string();
    }
}

/// Figures published outside the budget document itself (in the national
/// budget white paper). They cannot be derived from the source table and are
/// keyed in manually per year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManualFigures {
    /// Structural oil-corrected deficit, in whole NOK.
    pub structural_deficit: i64,
    /// Fund withdrawal as a percentage of the fund's value.
    pub withdrawal_percent: f64,
}

pub fn manual_figures_for_year(budget_year: i32) -> Option<ManualFigures> {
    match budget_year {
        2026 => Some(ManualFigures {
            structural_deficit: 579_400_000_000,
            withdrawal_percent: 3.1,
        }),
        _ => None,
    }
}
