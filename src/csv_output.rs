//! CSV export of the query statistics report
//!
//! One row per query shape for spreadsheet analysis. Parameters and call
//! sites are not exported.

use crate::report::Report;

const HEADER: &str = "query,calls,distinct_params,total_time,avg_time";

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render a report as CSV, header first, rows in report order
pub fn to_csv(report: &Report) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for entry in &report.entries {
        out.push_str(&format!(
            "{},{},{},{:.4},{:.4}\n",
            escape_field(&entry.query),
            entry.count,
            entry.distinct_params,
            entry.total_time_secs,
            entry.average_secs
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamKey, ParamValue};
    use crate::stats::CollectorState;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("SELECT 1"), "SELECT 1");
        assert_eq!(escape_field("a, b"), "\"a, b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("a\nb"), "\"a\nb\"");
    }

    #[test]
    fn test_empty_report_is_header_only() {
        let csv = to_csv(&Report::build(&CollectorState::default(), false));
        assert_eq!(csv, format!("{}\n", HEADER));
    }

    #[test]
    fn test_rows_in_report_order() {
        let mut state = CollectorState::new(false);
        let stats = state.entry("SELECT a, b FROM t");
        stats.record_call(ParamKey::from_params(&[ParamValue::from(1)]), None);
        stats.record_call(ParamKey::from_params(&[ParamValue::from(1)]), None);
        stats.add_time(0.5);
        let stats = state.entry("SELECT 1");
        stats.record_call(ParamKey::from_params(&[]), None);
        stats.add_time(0.1);

        let csv = to_csv(&Report::build(&state, false));
        let rows: Vec<_> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], "SELECT 1,1,1,0.1000,0.1000");
        assert_eq!(rows[2], "\"SELECT a, b FROM t\",2,1,0.5000,0.2500");
    }
}
