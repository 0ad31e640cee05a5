use std::io::Write;

use chrono::NaiveDate;
use csv::{QuoteStyle, WriterBuilder};

use crate::error::Result;
use crate::models::ReportRow;

pub const EXPORT_HEADERS: [&str; 12] = [
    "Kendra",
    "City",
    "Type",
    "Week Start Date",
    "Pushp Number",
    "Yuva Attendance",
    "Bhavferni Attendance",
    "Pravachan Attendance",
    "Total Attendance",
    "Description",
    "Created By",
    "Created At",
];

/// `Jul 15, 2024`, the format spreadsheet users see in the app.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

fn creator_label(row: &ReportRow) -> String {
    match &row.creator {
        Some(creator) if !creator.name.is_empty() => creator.name.clone(),
        Some(creator) => creator.email.clone(),
        None => String::new(),
    }
}

fn export_record(row: &ReportRow) -> [String; 12] {
    let report = &row.report;
    [
        row.kendra_name.clone().unwrap_or_default(),
        row.city_name.clone().unwrap_or_default(),
        row.kendra_type.map(|t| t.to_string()).unwrap_or_default(),
        display_date(report.week_start),
        report.period_number.to_string(),
        report.attendance.yuva.to_string(),
        report.attendance.bhavferni.to_string(),
        report.attendance.pravachan.to_string(),
        report.attendance.total().to_string(),
        report.note.clone().unwrap_or_default(),
        creator_label(row),
        display_date(report.created_at.date_naive()),
    ]
}

/// Writes `rows` in the given order with a header line. Every cell is quoted.
pub fn write_reports_csv<W: Write>(writer: W, rows: &[ReportRow]) -> Result<()> {
    let mut csv = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);
    csv.write_record(EXPORT_HEADERS)?;
    for row in rows {
        csv.write_record(export_record(row))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_file_name(today: NaiveDate) -> String {
    format!("reports_{}.csv", today.format("%Y-%m-%d"))
}
