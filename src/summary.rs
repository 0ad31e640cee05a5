use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::CategoryTotals;
use crate::export::display_date;
use crate::models::{DashboardStats, KendraType, TrendPoint};

const RULE: &str = "------------------";

/// Plain-text totals for one kendra type, ready to paste into a chat.
pub fn totals_message(kendra_type: KendraType, totals: &CategoryTotals) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "*{kendra_type} Report - Total Summary*");
    let _ = writeln!(output);
    let _ = writeln!(output, "{RULE}");
    let _ = writeln!(output, "Yuva Kendra: *{}*", totals.yuva);
    let _ = writeln!(output, "Bhavferni: *{}*", totals.bhavferni);
    let _ = writeln!(output, "Pravachan: *{}*", totals.pravachan);
    let _ = writeln!(output, "{RULE}");
    let _ = writeln!(output, "*Grand Total: {}*", totals.grand_total());

    output
}

pub fn dashboard_markdown(
    scope_label: &str,
    generated_on: NaiveDate,
    stats: &DashboardStats,
    trends: &[TrendPoint],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Attendance Dashboard");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        display_date(generated_on)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Reports: {}", stats.total_reports);
    let _ = writeln!(output, "- Avg Yuva Kendra: {:.2}", stats.avg_yuva);
    let _ = writeln!(output, "- Avg Bhavferni: {:.2}", stats.avg_bhavferni);
    let _ = writeln!(output, "- Avg Pravachan: {:.2}", stats.avg_pravachan);
    if let Some(active) = stats.active_kendras {
        let _ = writeln!(output, "- Active kendras: {active}");
    }
    if let Some(last_week) = stats.last_week_total {
        let _ = writeln!(output, "- Last week total: {last_week}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if trends.is_empty() {
        let _ = writeln!(output, "No reports recorded for this window.");
    } else {
        let _ = writeln!(output, "| Week | Yuva | Bhavferni | Pravachan |");
        let _ = writeln!(output, "|------|------|-----------|-----------|");
        for point in trends {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                display_date(point.week_start),
                point.yuva,
                point.bhavferni,
                point.pravachan
            );
        }
    }

    output
}
