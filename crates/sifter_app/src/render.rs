use std::fmt::Write as _;

use sifter_core::{JobRecord, ResultRow, SessionState};
use sifter_engine::ContextId;

const MAX_ROWS: usize = 20;

/// One-line summary printed whenever a context publishes a new snapshot.
pub fn summary(id: ContextId, state: &SessionState) -> String {
    let filters = &state.filters;
    let mut line = format!(
        "[ctx {id}] {}..{} [{}] {} {}",
        or_dash(&filters.from_date),
        or_dash(&filters.to_date),
        filters.ticker_list().join(","),
        filters.metric,
        filters.run_mode,
    );

    if state.query.loading {
        line.push_str(" | query: loading");
    } else if !state.query.rows.is_empty() {
        let _ = write!(line, " | query: {} rows", state.query.rows.len());
    }
    if let Some(err) = &state.query.error {
        let _ = write!(line, " | query error: {err}");
    }

    if let Some(job) = job_summary(&state.job) {
        let _ = write!(line, " | {job}");
    }
    if let Some(key) = &state.selection {
        let _ = write!(line, " | selected {key}");
    }
    line
}

fn job_summary(job: &JobRecord) -> Option<String> {
    if job.request_id.is_none() && !job.loading && job.status.is_none() {
        return None;
    }
    let mut text = format!(
        "job {} {} {:.0}%",
        job.request_id.as_deref().unwrap_or("(pending)"),
        job.status.map_or_else(|| "-".to_string(), |s| s.to_string()),
        job.progress * 100.0
    );
    if !job.message.is_empty() {
        let _ = write!(text, " {}", job.message);
    }
    if let Some(result) = &job.result {
        let _ = write!(text, " ({} result rows)", result.rows.len());
    }
    if let Some(err) = &job.error {
        let _ = write!(text, " error: {err}");
    }
    Some(text)
}

/// Multi-line view of a snapshot for the `show` command.
pub fn detail(id: ContextId, state: &SessionState) -> String {
    let mut out = summary(id, state);
    let rows = match &state.job.result {
        Some(result) if !result.rows.is_empty() => &result.rows,
        _ => &state.query.rows,
    };
    for row in rows.iter().take(MAX_ROWS) {
        let marker = if state.selection.as_ref() == Some(&row.key()) {
            '*'
        } else {
            ' '
        };
        let _ = write!(out, "\n {marker} {}", row_line(row));
    }
    if rows.len() > MAX_ROWS {
        let _ = write!(out, "\n   ... {} more", rows.len() - MAX_ROWS);
    }
    out
}

fn row_line(row: &ResultRow) -> String {
    let values: Vec<String> = row
        .values
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("{} {} {}", row.ticker, row.date, values.join(" "))
        .trim_end()
        .to_string()
}

fn or_dash(text: &str) -> &str {
    if text.is_empty() {
        "-"
    } else {
        text
    }
}
