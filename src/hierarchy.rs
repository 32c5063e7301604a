use crate::reconciliation::ReconciliationIndex;
use crate::schema::{BudgetLine, ChangeFromSettled, PostGroup, Side};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;

/// Leaf of the hierarchy: one budget line at sub-post granularity.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Post {
    pub post_number: u32,
    pub sub_post_number: u32,
    pub name: String,
    pub amount: i64,
    pub post_group: PostGroup,
    pub keywords: Vec<String>,
    pub change_from_settled: Option<ChangeFromSettled>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ChapterNode {
    pub chapter_number: u32,
    pub name: String,
    pub total: i64,
    pub change_from_settled: Option<ChangeFromSettled>,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CategoryNode {
    pub category_number: u32,
    pub name: String,
    pub total: i64,
    pub change_from_settled: Option<ChangeFromSettled>,
    pub chapters: Vec<ChapterNode>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AreaNode {
    pub area_number: u32,
    pub name: String,
    pub total: i64,
    pub change_from_settled: Option<ChangeFromSettled>,
    pub categories: Vec<CategoryNode>,
}

/// One side (expense or revenue) of the budget, rolled up bottom-up.
/// The invariant at every level is `total == sum(children.total)`, in whole
/// NOK with no rounding drift.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SideTree {
    pub total: i64,
    pub change_from_settled: Option<ChangeFromSettled>,
    pub areas: Vec<AreaNode>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Hierarchy {
    pub expenses: SideTree,
    pub revenues: SideTree,
}

/// Builds both side trees from the canonical table.
///
/// Grouping keys are (number, name) pairs held in `BTreeMap`s, so identical
/// inputs always produce an identical tree shape regardless of input row
/// order. When a reconciliation index is present, every level carries a
/// change record rolled up from its own sums.
pub fn build_hierarchy(
    rows: &[BudgetLine],
    reconciliation: Option<&ReconciliationIndex>,
) -> Hierarchy {
    let expenses = rows.iter().filter(|r| r.side == Side::Expense);
    let revenues = rows.iter().filter(|r| r.side == Side::Revenue);
    Hierarchy {
        expenses: build_side(expenses, reconciliation),
        revenues: build_side(revenues, reconciliation),
    }
}

fn build_side<'a>(
    rows: impl Iterator<Item = &'a BudgetLine>,
    reconciliation: Option<&ReconciliationIndex>,
) -> SideTree {
    let mut by_area: BTreeMap<(u32, &'a str), Vec<&'a BudgetLine>> = BTreeMap::new();
    for row in rows {
        by_area
            .entry((row.area_number, row.area_name.as_str()))
            .or_default()
            .push(row);
    }

    let areas: Vec<AreaNode> = by_area
        .into_iter()
        .map(|((number, name), rows)| build_area(number, name, rows, reconciliation))
        .collect();

    let total = areas.iter().map(|a| a.total).sum();
    let change_from_settled = roll_up_changes(
        total,
        areas.iter().map(|a| a.change_from_settled.as_ref()),
    );

    SideTree {
        total,
        change_from_settled,
        areas,
    }
}

fn build_area<'a>(
    area_number: u32,
    name: &str,
    rows: Vec<&'a BudgetLine>,
    reconciliation: Option<&ReconciliationIndex>,
) -> AreaNode {
    let mut by_category: BTreeMap<(u32, &'a str), Vec<&'a BudgetLine>> = BTreeMap::new();
    for row in rows {
        by_category
            .entry((row.category_number, row.category_name.as_str()))
            .or_default()
            .push(row);
    }

    let categories: Vec<CategoryNode> = by_category
        .into_iter()
        .map(|((number, name), rows)| build_category(number, name, rows, reconciliation))
        .collect();

    let total = categories.iter().map(|c| c.total).sum();
    let change_from_settled = roll_up_changes(
        total,
        categories.iter().map(|c| c.change_from_settled.as_ref()),
    );

    AreaNode {
        area_number,
        name: name.to_string(),
        total,
        change_from_settled,
        categories,
    }
}

fn build_category<'a>(
    category_number: u32,
    name: &str,
    rows: Vec<&'a BudgetLine>,
    reconciliation: Option<&ReconciliationIndex>,
) -> CategoryNode {
    let mut by_chapter: BTreeMap<(u32, &'a str), Vec<&'a BudgetLine>> = BTreeMap::new();
    for row in rows {
        by_chapter
            .entry((row.chapter_number, row.chapter_name.as_str()))
            .or_default()
            .push(row);
    }

    let chapters: Vec<ChapterNode> = by_chapter
        .into_iter()
        .map(|((number, name), rows)| build_chapter(number, name, rows, reconciliation))
        .collect();

    let total = chapters.iter().map(|c| c.total).sum();
    let change_from_settled = roll_up_changes(
        total,
        chapters.iter().map(|c| c.change_from_settled.as_ref()),
    );

    CategoryNode {
        category_number,
        name: name.to_string(),
        total,
        change_from_settled,
        chapters,
    }
}

fn build_chapter(
    chapter_number: u32,
    name: &str,
    mut rows: Vec<&BudgetLine>,
    reconciliation: Option<&ReconciliationIndex>,
) -> ChapterNode {
    rows.sort_by_key(|r| (r.post_number, r.sub_post_number));

    let posts: Vec<Post> = rows
        .iter()
        .map(|row| Post {
            post_number: row.post_number,
            sub_post_number: row.sub_post_number,
            name: row.post_name.clone(),
            amount: row.amount,
            post_group: row.post_group,
            keywords: row.keywords.clone(),
            change_from_settled: reconciliation
                .and_then(|index| index.get(row.chapter_number, row.post_number))
                .and_then(|entry| entry.line_annotation(row.amount)),
        })
        .collect();

    let total = posts.iter().map(|p| p.amount).sum();
    let change_from_settled =
        reconciliation.and_then(|index| chapter_change(total, &rows, index));

    ChapterNode {
        chapter_number,
        name: name.to_string(),
        total,
        change_from_settled,
        posts,
    }
}

/// Chapter-level change record. The settled budget is only known at
/// main-post granularity, so each post's settled amount is counted once even
/// when several sub-post lines share the post.
fn chapter_change(
    total: i64,
    rows: &[&BudgetLine],
    index: &ReconciliationIndex,
) -> Option<ChangeFromSettled> {
    let mut settled_by_post: BTreeMap<u32, i64> = BTreeMap::new();
    for row in rows {
        if let Some(matched) = index
            .get(row.chapter_number, row.post_number)
            .and_then(|entry| entry.settled.as_ref())
        {
            settled_by_post.insert(row.post_number, matched.amount);
        }
    }

    if settled_by_post.is_empty() {
        return None;
    }
    Some(ChangeFromSettled::from_totals(
        total,
        settled_by_post.values().sum(),
    ))
}

/// Rolls child change records up one level. The absolute change is the
/// level's own total minus the sum of the children's settled amounts, and
/// the percentage is recomputed from those sums, never averaged across
/// children.
fn roll_up_changes<'a>(
    total: i64,
    children: impl Iterator<Item = Option<&'a ChangeFromSettled>>,
) -> Option<ChangeFromSettled> {
    let mut settled_sum = 0i64;
    let mut any = false;
    for change in children.flatten() {
        settled_sum += change.settled_amount;
        any = true;
    }

    if !any {
        return None;
    }
    Some(ChangeFromSettled::from_totals(total, settled_sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::reconcile;
    use crate::schema::SettledLine;

    fn line(
        area_number: u32,
        category_number: u32,
        chapter_number: u32,
        post_number: u32,
        amount: i64,
    ) -> BudgetLine {
        sub_line(area_number, category_number, chapter_number, post_number, 0, amount)
    }

    fn sub_line(
        area_number: u32,
        category_number: u32,
        chapter_number: u32,
        post_number: u32,
        sub_post_number: u32,
        amount: i64,
    ) -> BudgetLine {
        BudgetLine {
            ministry_number: 1,
            ministry_name: "Dep".to_string(),
            area_number,
            area_name: format!("Area {area_number}"),
            category_number,
            category_name: format!("Cat {category_number}"),
            chapter_number,
            chapter_name: format!("Chapter {chapter_number}"),
            post_number,
            sub_post_number,
            post_name: "Post".to_string(),
            amount,
            keywords: Vec::new(),
            side: Side::from_chapter(chapter_number),
            post_group: PostGroup::from_post_number(post_number),
        }
    }

    fn assert_tree_sums(tree: &SideTree) {
        let area_sum: i64 = tree.areas.iter().map(|a| a.total).sum();
        assert_eq!(tree.total, area_sum);
        for area in &tree.areas {
            let category_sum: i64 = area.categories.iter().map(|c| c.total).sum();
            assert_eq!(area.total, category_sum);
            for category in &area.categories {
                let chapter_sum: i64 = category.chapters.iter().map(|c| c.total).sum();
                assert_eq!(category.total, chapter_sum);
                for chapter in &category.chapters {
                    let post_sum: i64 = chapter.posts.iter().map(|p| p.amount).sum();
                    assert_eq!(chapter.total, post_sum);
                }
            }
        }
    }

    #[test]
    fn test_totals_fold_bottom_up() {
        let rows = vec![
            line(10, 1010, 700, 1, 600),
            line(10, 1010, 700, 21, 150),
            line(10, 1010, 701, 1, 250),
            line(10, 1020, 740, 70, 400),
            line(13, 1310, 571, 60, 900),
            line(25, 2510, 5501, 70, 5000),
        ];

        let hierarchy = build_hierarchy(&rows, None);

        assert_eq!(hierarchy.expenses.total, 2300);
        assert_eq!(hierarchy.revenues.total, 5000);
        assert_tree_sums(&hierarchy.expenses);
        assert_tree_sums(&hierarchy.revenues);

        // Two areas on the expense side, ordered by area number.
        let areas: Vec<u32> = hierarchy
            .expenses
            .areas
            .iter()
            .map(|a| a.area_number)
            .collect();
        assert_eq!(areas, vec![10, 13]);
    }

    #[test]
    fn test_shape_is_independent_of_row_order() {
        let rows = vec![
            line(10, 1010, 700, 1, 600),
            line(10, 1010, 701, 1, 250),
            line(13, 1310, 571, 60, 900),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = build_hierarchy(&rows, None);
        let b = build_hierarchy(&reversed, None);

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_change_rollup_is_not_an_average_of_child_percentages() {
        // Two chapters with very different magnitudes and percentages:
        // 1000 -> 2000 (+100%) and 100 -> 110 (+10%).
        let rows = vec![
            line(10, 1010, 700, 1, 2000),
            line(10, 1010, 701, 1, 110),
        ];
        let settled = vec![
            SettledLine { chapter_number: 700, post_number: 1, amount: 1000 },
            SettledLine { chapter_number: 701, post_number: 1, amount: 100 },
        ];
        let index = reconcile(&rows, &settled);
        let hierarchy = build_hierarchy(&rows, Some(&index));

        let category = &hierarchy.expenses.areas[0].categories[0];
        let change = category.change_from_settled.as_ref().unwrap();
        assert_eq!(change.amount, 2110);
        assert_eq!(change.settled_amount, 1100);
        assert_eq!(change.absolute_change, 1010);
        // 1010 / 1100 = 91.8%, far from the 55% a naive mean would give.
        assert_eq!(change.percent_change, Some(91.8));
    }

    #[test]
    fn test_new_posts_are_excluded_from_the_rollup_base() {
        let rows = vec![
            line(10, 1010, 700, 1, 500),
            line(10, 1010, 700, 70, 200), // not in settled: new post
        ];
        let settled = vec![SettledLine { chapter_number: 700, post_number: 1, amount: 400 }];
        let index = reconcile(&rows, &settled);
        let hierarchy = build_hierarchy(&rows, Some(&index));

        let chapter = &hierarchy.expenses.areas[0].categories[0].chapters[0];

        // The new post carries no annotation.
        let new_post = chapter.posts.iter().find(|p| p.post_number == 70).unwrap();
        assert!(new_post.change_from_settled.is_none());

        // The chapter's absolute change is its full total minus the settled
        // amounts that exist: 700 - 400.
        let change = chapter.change_from_settled.as_ref().unwrap();
        assert_eq!(change.absolute_change, 300);
        assert_eq!(change.percent_change, Some(75.0));
    }

    #[test]
    fn test_sub_posts_count_the_settled_amount_once() {
        let rows = vec![
            sub_line(10, 1010, 700, 1, 1, 300),
            sub_line(10, 1010, 700, 1, 2, 500),
        ];
        let settled = vec![SettledLine { chapter_number: 700, post_number: 1, amount: 600 }];
        let index = reconcile(&rows, &settled);
        let hierarchy = build_hierarchy(&rows, Some(&index));

        let chapter = &hierarchy.expenses.areas[0].categories[0].chapters[0];
        let change = chapter.change_from_settled.as_ref().unwrap();
        assert_eq!(change.settled_amount, 600);
        assert_eq!(change.absolute_change, 200);

        // Each sub-post line shares the post-level deltas but keeps its own
        // amount.
        assert_eq!(chapter.posts[0].amount, 300);
        let annotation = chapter.posts[0].change_from_settled.as_ref().unwrap();
        assert_eq!(annotation.amount, 300);
        assert_eq!(annotation.settled_amount, 600);
        assert_eq!(annotation.absolute_change, 200);
    }

    #[test]
    fn test_no_settled_data_means_no_change_records() {
        let rows = vec![line(10, 1010, 700, 1, 600)];
        let hierarchy = build_hierarchy(&rows, None);
        assert!(hierarchy.expenses.change_from_settled.is_none());
        assert!(hierarchy.expenses.areas[0].change_from_settled.is_none());
    }
}
