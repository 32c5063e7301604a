use crate::export::{AGGREGATED_DOCUMENT, CHANGES_DOCUMENT, FULL_DOCUMENT, METADATA_DOCUMENT};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Byte budget for the aggregated document; a contract with the front end.
pub const MAX_AGGREGATED_BYTES: u64 = 50 * 1024;

/// Tolerance for the category balancing identities, in whole NOK. It only
/// absorbs category-bucket rounding against multi-billion totals.
pub const BALANCE_TOLERANCE: i64 = 1000;

struct ReferenceTotals {
    expense_total: i64,
    revenue_total: i64,
    oil_corrected_expense_total: i64,
    margin: i64,
}

/// Externally verified totals per budget year. Years without an entry skip
/// the reference check.
fn reference_totals_for_year(budget_year: i32) -> Option<ReferenceTotals> {
    match budget_year {
        2025 => Some(ReferenceTotals {
            expense_total: 2_970_900_000_000,
            revenue_total: 2_796_800_000_000,
            oil_corrected_expense_total: 2_246_000_000_000,
            margin: 500_000_000,
        }),
        _ => None,
    }
}

/// Validates the exported documents for one budget year.
///
/// This is the integrity gate: it reads the files back from disk and
/// re-derives every published total from its own constituents, so it catches
/// serialization bugs as well as computation bugs. All checks run; the
/// returned list holds every violation found, and an empty list is a pass.
pub fn validate_exports(out_dir: &Path, budget_year: i32) -> Vec<String> {
    let mut violations = Vec::new();

    // Check 1: all documents must exist. Without them nothing else can run.
    let names = [
        FULL_DOCUMENT,
        AGGREGATED_DOCUMENT,
        CHANGES_DOCUMENT,
        METADATA_DOCUMENT,
    ];
    for name in names {
        if !out_dir.join(name).exists() {
            violations.push(format!("missing document: {}", out_dir.join(name).display()));
        }
    }
    if !violations.is_empty() {
        return violations;
    }

    let mut documents = Vec::new();
    for name in names {
        match read_document(out_dir, name) {
            Ok(value) => documents.push((name, value)),
            Err(message) => violations.push(message),
        }
    }
    if documents.len() != names.len() {
        return violations;
    }

    // Check 2: every document declares the requested budget year.
    for (name, value) in &documents {
        if value.get("budget_year").and_then(Value::as_i64) != Some(budget_year as i64) {
            violations.push(format!(
                "wrong budget year in {name}: expected {budget_year}, got {:?}",
                value.get("budget_year")
            ));
        }
    }

    let full = &documents[0].1;
    let aggregated = &documents[1].1;

    // Check 3: grand totals against externally verified reference values.
    if let Some(reference) = reference_totals_for_year(budget_year) {
        check_reference(
            full,
            &["expenses", "total"],
            reference.expense_total,
            reference.margin,
            "expense total",
            &mut violations,
        );
        check_reference(
            full,
            &["revenues", "total"],
            reference.revenue_total,
            reference.margin,
            "revenue total",
            &mut violations,
        );
    }

    // Check 4: exact tree sums at every level of both side trees.
    for side_name in ["expenses", "revenues"] {
        match full.get(side_name) {
            Some(side) => check_tree(side, side_name, &mut violations),
            None => violations.push(format!("missing '{side_name}' tree in {FULL_DOCUMENT}")),
        }
    }

    // Checks 5-6: category sums, the balancing identity and the declared
    // aggregated totals.
    let expense_category_sum = category_sum(aggregated, "expense_categories");
    let revenue_category_sum = category_sum(aggregated, "revenue_categories");
    let withdrawal = int_at(aggregated, &["fund", "withdrawal"]);

    if expense_category_sum <= 0 {
        violations.push(format!(
            "aggregated expense total is zero or negative: {expense_category_sum}"
        ));
    }
    if revenue_category_sum <= 0 {
        violations.push(format!(
            "aggregated revenue total is zero or negative: {revenue_category_sum}"
        ));
    }

    match withdrawal {
        Some(withdrawal) => {
            if withdrawal <= 0 {
                violations.push(format!("fund withdrawal is zero or negative: {withdrawal}"));
            }
            let imbalance = expense_category_sum - revenue_category_sum - withdrawal;
            if imbalance.abs() > BALANCE_TOLERANCE {
                violations.push(format!(
                    "categories do not balance: expenses={expense_category_sum}, \
                     revenues={revenue_category_sum}, withdrawal={withdrawal}, \
                     difference={imbalance}"
                ));
            }
        }
        None => violations.push(format!("missing 'fund.withdrawal' in {AGGREGATED_DOCUMENT}")),
    }

    match int_at(aggregated, &["total_expenses"]) {
        Some(declared) => {
            if (declared - expense_category_sum).abs() > BALANCE_TOLERANCE {
                violations.push(format!(
                    "declared total_expenses does not match the category sum: \
                     {declared} != {expense_category_sum}"
                ));
            }
            // Balanced-budget convention: the declared revenue total equals
            // the declared expense total.
            if int_at(aggregated, &["total_revenues"]) != Some(declared) {
                violations.push(format!(
                    "declared total_revenues must equal total_expenses ({declared})"
                ));
            }
        }
        None => violations.push(format!("missing 'total_expenses' in {AGGREGATED_DOCUMENT}")),
    }

    // Check 7: oil-corrected totals in the full document match the category
    // sums exactly.
    match int_at(full, &["oil_corrected", "expense_total"]) {
        Some(expense_total) => {
            if expense_total != expense_category_sum {
                violations.push(format!(
                    "oil_corrected.expense_total does not match the expense category sum: \
                     {expense_total} != {expense_category_sum}"
                ));
            }
        }
        None => violations.push(format!("missing 'oil_corrected' section in {FULL_DOCUMENT}")),
    }
    if let Some(revenue_total) = int_at(full, &["oil_corrected", "revenue_total"]) {
        if revenue_total != revenue_category_sum {
            violations.push(format!(
                "oil_corrected.revenue_total does not match the revenue category sum: \
                 {revenue_total} != {revenue_category_sum}"
            ));
        }
    }

    // Check 8: the fund's net-transfer identity.
    match int_at(aggregated, &["fund", "net_transfer"]) {
        Some(net_transfer) => {
            let net_cash_flow = int_at(aggregated, &["fund", "net_cash_flow"]).unwrap_or(0);
            let expected = net_cash_flow - withdrawal.unwrap_or(0);
            if (net_transfer - expected).abs() > BALANCE_TOLERANCE {
                violations.push(format!(
                    "fund net_transfer is inconsistent: {net_transfer} != \
                     net_cash_flow({net_cash_flow}) - withdrawal({})",
                    withdrawal.unwrap_or(0)
                ));
            }
        }
        None => violations.push(format!("missing 'fund.net_transfer' in {AGGREGATED_DOCUMENT}")),
    }

    // The oil-corrected expense total also has a reference value for known
    // years (part of check 3, but it needs the category sum from above).
    if let Some(reference) = reference_totals_for_year(budget_year) {
        if (expense_category_sum - reference.oil_corrected_expense_total).abs() > reference.margin {
            violations.push(format!(
                "oil-corrected expense total deviates from the reference: \
                 {expense_category_sum} (expected {} ± {})",
                reference.oil_corrected_expense_total, reference.margin
            ));
        }
    }

    // Check 9: the aggregated document must stay within its byte budget.
    if let Ok(metadata) = fs::metadata(out_dir.join(AGGREGATED_DOCUMENT)) {
        if metadata.len() > MAX_AGGREGATED_BYTES {
            violations.push(format!(
                "{AGGREGATED_DOCUMENT} is too large: {} bytes (max {MAX_AGGREGATED_BYTES})",
                metadata.len()
            ));
        }
    }

    violations
}

fn read_document(out_dir: &Path, name: &str) -> Result<Value, String> {
    let path = out_dir.join(name);
    let raw = fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

fn int_at(value: &Value, path: &[&str]) -> Option<i64> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_i64()
}

fn check_reference(
    full: &Value,
    path: &[&str],
    expected: i64,
    margin: i64,
    label: &str,
    violations: &mut Vec<String>,
) {
    match int_at(full, path) {
        Some(actual) => {
            if (actual - expected).abs() > margin {
                violations.push(format!(
                    "{label} deviates from the reference: {actual} (expected {expected} ± {margin})"
                ));
            }
        }
        None => violations.push(format!("missing {label} in {FULL_DOCUMENT}")),
    }
}

/// Re-derives every total in a side tree from its own children and reports
/// each mismatch. Integer equality, zero tolerance.
fn check_tree(side: &Value, side_name: &str, violations: &mut Vec<String>) {
    let Some(areas) = side.get("areas").and_then(Value::as_array) else {
        violations.push(format!("missing 'areas' list under '{side_name}'"));
        return;
    };

    let area_sum: i64 = areas.iter().filter_map(|a| int_at(a, &["total"])).sum();
    if int_at(side, &["total"]) != Some(area_sum) {
        violations.push(format!(
            "inconsistent total for {side_name}: areas sum to {area_sum}, declared {:?}",
            int_at(side, &["total"])
        ));
    }

    for area in areas {
        let area_number = int_at(area, &["area_number"]).unwrap_or(-1);
        let categories = area
            .get("categories")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let category_sum: i64 = categories.iter().filter_map(|c| int_at(c, &["total"])).sum();
        if int_at(area, &["total"]) != Some(category_sum) {
            violations.push(format!(
                "inconsistent total for {side_name} area {area_number}: \
                 categories sum to {category_sum}, declared {:?}",
                int_at(area, &["total"])
            ));
        }

        for category in categories {
            let category_number = int_at(category, &["category_number"]).unwrap_or(-1);
            let chapters = category
                .get("chapters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let chapter_sum: i64 = chapters.iter().filter_map(|c| int_at(c, &["total"])).sum();
            if int_at(category, &["total"]) != Some(chapter_sum) {
                violations.push(format!(
                    "inconsistent total for {side_name} category {category_number}: \
                     chapters sum to {chapter_sum}, declared {:?}",
                    int_at(category, &["total"])
                ));
            }

            for chapter in chapters {
                let chapter_number = int_at(chapter, &["chapter_number"]).unwrap_or(-1);
                let posts = chapter
                    .get("posts")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);

                let post_sum: i64 = posts.iter().filter_map(|p| int_at(p, &["amount"])).sum();
                if int_at(chapter, &["total"]) != Some(post_sum) {
                    violations.push(format!(
                        "inconsistent total for {side_name} chapter {chapter_number}: \
                         posts sum to {post_sum}, declared {:?}",
                        int_at(chapter, &["total"])
                    ));
                }
            }
        }
    }
}

fn category_sum(aggregated: &Value, list_name: &str) -> i64 {
    aggregated
        .get(list_name)
        .and_then(Value::as_array)
        .map(|categories| {
            categories
                .iter()
                .filter_map(|c| int_at(c, &["amount"]))
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_documents_are_the_only_violations_reported() {
        let dir = tempfile::tempdir().unwrap();
        let violations = validate_exports(dir.path(), 2027);
        assert_eq!(violations.len(), 4);
        assert!(violations.iter().all(|v| v.contains("missing document")));
    }

    #[test]
    fn test_tree_check_flags_exactly_the_broken_node() {
        let side: Value = serde_json::json!({
            "total": 1000,
            "areas": [
                {
                    "area_number": 10,
                    "total": 1000,
                    "categories": [
                        {
                            "category_number": 1010,
                            "total": 1000,
                            "chapters": [
                                {
                                    "chapter_number": 700,
                                    "total": 1000,
                                    "posts": [
                                        { "amount": 600 },
                                        { "amount": 399 }
                                    ]
                                }
                            ]
                        }
                    ]
                }
            ]
        });

        let mut violations = Vec::new();
        check_tree(&side, "expenses", &mut violations);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("chapter 700"));
    }

    #[test]
    fn test_reference_totals_only_exist_for_known_years() {
        assert!(reference_totals_for_year(2025).is_some());
        assert!(reference_totals_for_year(2027).is_none());
    }
}
