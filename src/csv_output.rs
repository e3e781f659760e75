//! CSV export of rolling totals and frame history
//!
//! Flattens the nested statistics into one row per class/method (totals) or
//! one row per frame/class (frames) for spreadsheet analysis.

use crate::frames::FrameStats;
use crate::stats::RollingTotals;

/// One row of the rolling totals table
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTotalRow {
    pub class: String,
    pub instances: u64,
    pub method: String,
    pub spent_total_ms: f64,
    pub max_call_count_per_frame: u64,
    pub max_spent_per_frame_ms: f64,
    pub total_call_count: u64,
}

/// One row of the frame history table
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFrameRow {
    pub frame: usize,
    pub frame_spent_total_ms: f64,
    pub class: String,
    pub class_spent_total_ms: f64,
}

/// Flatten rolling totals, ordered by class then method
pub fn total_stats_rows(totals: &RollingTotals) -> Vec<CsvTotalRow> {
    let mut rows = Vec::new();
    for (class, stats) in &totals.classes {
        for (method, method_stats) in &stats.methods {
            rows.push(CsvTotalRow {
                class: class.clone(),
                instances: stats.instance_count,
                method: method.clone(),
                spent_total_ms: method_stats.spent_total_ms,
                max_call_count_per_frame: method_stats.max_call_count_per_frame,
                max_spent_per_frame_ms: method_stats.max_spent_per_frame_ms,
                total_call_count: method_stats.total_call_count,
            });
        }
    }
    rows
}

/// Flatten frames, numbered from zero in the order given
pub fn frame_stats_rows(frames: &[FrameStats]) -> Vec<CsvFrameRow> {
    let mut rows = Vec::new();
    for (index, frame) in frames.iter().enumerate() {
        for (class, stats) in &frame.classes {
            rows.push(CsvFrameRow {
                frame: index,
                frame_spent_total_ms: frame.spent_total_ms,
                class: class.clone(),
                class_spent_total_ms: stats.spent_total_ms,
            });
        }
    }
    rows
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_ms(ms: f64) -> String {
    format!("{:.3}", ms)
}

/// Rolling totals as CSV text, header included
pub fn totals_to_csv(totals: &RollingTotals) -> String {
    let mut output = String::from(
        "class,instances,method,spent_total_ms,max_call_count_per_frame,max_spent_per_frame_ms,total_call_count\n",
    );
    for row in total_stats_rows(totals) {
        let fields = [
            escape_field(&row.class),
            row.instances.to_string(),
            escape_field(&row.method),
            format_ms(row.spent_total_ms),
            row.max_call_count_per_frame.to_string(),
            format_ms(row.max_spent_per_frame_ms),
            row.total_call_count.to_string(),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

/// Frame history as CSV text, header included
pub fn frames_to_csv(frames: &[FrameStats]) -> String {
    let mut output = String::from("frame,frame_spent_total_ms,class,class_spent_total_ms\n");
    for row in frame_stats_rows(frames) {
        let fields = [
            row.frame.to_string(),
            format_ms(row.frame_spent_total_ms),
            escape_field(&row.class),
            format_ms(row.class_spent_total_ms),
        ];
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{ClassStats, REMAINING_CLASS};
    use crate::stats::{ClassTotals, MethodTotals};

    fn sample_totals() -> RollingTotals {
        let mut totals = RollingTotals::default();
        let mut class = ClassTotals {
            instance_count: 2,
            ..Default::default()
        };
        class.methods.insert(
            "step".to_string(),
            MethodTotals {
                spent_total_ms: 12.5,
                max_call_count_per_frame: 3,
                max_spent_per_frame_ms: 6.25,
                total_call_count: 5,
            },
        );
        totals.classes.insert("Physics".to_string(), class);
        totals
    }

    #[test]
    fn test_csv_escape_field_simple() {
        assert_eq!(escape_field("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_field_with_comma() {
        assert_eq!(escape_field("hello,world"), "\"hello,world\"");
    }

    #[test]
    fn test_csv_escape_field_with_quote() {
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_total_rows() {
        let rows = total_stats_rows(&sample_totals());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class, "Physics");
        assert_eq!(rows[0].instances, 2);
        assert_eq!(rows[0].total_call_count, 5);
    }

    #[test]
    fn test_totals_to_csv() {
        let csv = totals_to_csv(&sample_totals());
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("class,instances,method,spent_total_ms,max_call_count_per_frame,max_spent_per_frame_ms,total_call_count")
        );
        assert_eq!(lines.next(), Some("Physics,2,step,12.500,3,6.250,5"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_frames_to_csv_numbers_frames() {
        let mut first = FrameStats {
            spent_total_ms: 10.0,
            ..Default::default()
        };
        first.classes.insert(
            "A, B".to_string(),
            ClassStats {
                spent_total_ms: 4.0,
                ..Default::default()
            },
        );
        first.classes.insert(
            REMAINING_CLASS.to_string(),
            ClassStats {
                spent_total_ms: 6.0,
                ..Default::default()
            },
        );
        let second = FrameStats::default();

        let csv = frames_to_csv(&[first, second]);
        assert!(csv.starts_with("frame,frame_spent_total_ms,class,class_spent_total_ms\n"));
        assert!(csv.contains("0,10.000,\"A, B\",4.000\n"));
        assert!(csv.contains("0,10.000,_remaining,6.000\n"));
        assert_eq!(csv.lines().count(), 3);
    }
}
