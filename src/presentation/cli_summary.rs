use crate::application::confirmation::{DeleteOutcome, DeleteStatus};
use crate::application::merge::MergeReport;
use crate::application::monitoring::PerfReport;
use crate::domain::analysis::AnalysisResult;
use crate::domain::category_tree::CategoryTree;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct DependentRow {
    id: String,
    name: String,
    #[tabled(rename = "depends on it")]
    linked: String,
}

#[derive(Tabled)]
struct CascadeRow {
    kind: String,
    count: String,
    ids: String,
}

/// Print what deleting the selection would do.
pub fn print_analysis(analysis: &AnalysisResult) {
    println!();
    println!(
        "{} {}",
        "DELETE ANALYSIS".bold().cyan(),
        analysis.kind.to_string().bold()
    );
    println!(
        "{} selected  ·  {} with dependents  ·  {} safe",
        analysis.selected_count().to_string().bold(),
        analysis.items_with_dependents.len().to_string().yellow(),
        analysis.safe_to_delete.len().to_string().green(),
    );
    println!();

    if analysis.has_dependents() {
        let rows: Vec<DependentRow> = analysis
            .items_with_dependents
            .iter()
            .map(|d| DependentRow {
                id: d.record.id().bold().to_string(),
                name: d.record.name().to_string(),
                linked: format!(
                    "{} {}",
                    d.linked_entities.len().to_string().yellow(),
                    d.linked_kind
                ),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    let rows: Vec<CascadeRow> = analysis
        .cascade_delete_list
        .iter()
        .map(|(kind, ids)| CascadeRow {
            kind: kind.to_string(),
            count: ids.len().to_string().red().to_string(),
            ids: ids.join(", "),
        })
        .collect();
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    println!("{}", "Cascade".bold());
    println!("{table}");

    print_warnings(analysis.warnings.iter().map(ToString::to_string));
    println!();
}

pub fn print_delete_outcome(outcome: &DeleteOutcome) {
    let message = outcome.message.clone().unwrap_or_default();
    match outcome.status {
        DeleteStatus::Success => println!("{} {}", "✓".bold().green(), message),
        DeleteStatus::Cancelled => println!("{} {}", "–".dimmed(), message.italic()),
        DeleteStatus::Error => println!("{} {}", "✗".bold().red(), message.red()),
    }
}

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

pub fn print_merge_report(report: &MergeReport) {
    println!();
    println!("{} {}", "MERGE".bold().cyan(), report.kind.to_string().bold());
    println!(
        "{} ← {}",
        report.master_id.green(),
        report.losers.join(", ").red()
    );
    println!();

    let rows = vec![
        SummaryRow {
            metric: "References rewritten".into(),
            value: report.references_rewritten.to_string().yellow().to_string(),
        },
        SummaryRow {
            metric: "Mappings transferred".into(),
            value: report.mappings_transferred.to_string().green().to_string(),
        },
        SummaryRow {
            metric: "Mappings dropped".into(),
            value: report.mappings_dropped.to_string().dimmed().to_string(),
        },
        SummaryRow {
            metric: "Rows deleted".into(),
            value: report.rows_deleted.to_string().red().to_string(),
        },
    ];
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    print_warnings(report.warnings.iter().map(ToString::to_string));
    println!();
}

/// Print the category hierarchy, one indented line per category.
pub fn print_tree(tree: &CategoryTree) {
    println!("{}", "CATEGORIES".bold().cyan());
    for (id, line) in tree.flatten() {
        println!("{}  {}", line, id.dimmed());
    }
    print_warnings(tree.warnings.iter().map(ToString::to_string));
}

fn print_warnings(warnings: impl Iterator<Item = String>) {
    for w in warnings {
        println!("  {} {}", "!".bold().yellow(), w.yellow());
    }
}

// ─── Store timings ───

#[derive(Tabled)]
struct TimingRow {
    call: String,
    sheet: String,
    forced: String,
    rows: String,
    ms: String,
}

/// Print every timed store call, then the totals.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }
    println!("{}", "STORE TIMINGS".bold().cyan());

    let rows: Vec<TimingRow> = report
        .timings
        .iter()
        .map(|t| TimingRow {
            call: t.call.to_string().dimmed().to_string(),
            sheet: t.sheet.bold().to_string(),
            forced: if t.forced {
                "yes".yellow().to_string()
            } else {
                String::new()
            },
            rows: t.rows.to_string(),
            ms: paint_ms(t.duration_ms),
        })
        .collect();
    let table = Table::new(rows)
        .with(Style::modern())
        .with(Modify::new(Columns::new(3..=4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!(
        "  {} row(s) read, {} write request(s), {}",
        report.total_rows_fetched.to_string().bold(),
        report.total_requests_written.to_string().bold(),
        paint_ms(report.total_ms),
    );
    println!();
}

fn paint_ms(ms: u128) -> String {
    let text = format!("{} ms", ms);
    match ms {
        0..=99 => text.green().to_string(),
        100..=999 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}
