//! Human-readable summary tables

use crate::frames::REMAINING_CLASS;
use crate::palette::class_color;
use crate::profiler::ProfileSnapshot;
use std::fmt::Write;

const WIDTH: usize = 80;

fn banner(out: &mut String, title: &str) {
    let _ = writeln!(out, "╔{}╗", "═".repeat(WIDTH));
    let _ = writeln!(out, "║  {:<width$}║", title, width = WIDTH - 2);
    let _ = writeln!(out, "╚{}╝", "═".repeat(WIDTH));
}

/// Class names to report: registration order first, then any class that
/// only appears in the data
fn ordered_classes<'a>(
    snapshot: &'a ProfileSnapshot,
    extra: impl Iterator<Item = &'a String>,
) -> Vec<&'a str> {
    let mut names: Vec<&str> = snapshot.tracked_classes.iter().map(String::as_str).collect();
    for name in extra {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
    names
}

/// Rolling totals, one block per class
pub fn render_totals(snapshot: &ProfileSnapshot) -> String {
    let totals = &snapshot.totals;
    let mut out = String::new();
    banner(&mut out, "Frame Performance Statistics");
    let _ = writeln!(
        out,
        "exceeded frame budget {} times ({} frames, budget {:.1}ms)",
        totals.exceeded_frame_budget_count, totals.frames_observed, snapshot.frame_budget_ms
    );

    for class in ordered_classes(snapshot, totals.classes.keys()) {
        if class == REMAINING_CLASS {
            continue;
        }
        let _ = writeln!(out);
        let Some(stats) = totals.classes.get(class) else {
            let _ = writeln!(out, "■ {} {}", class_color(class), class);
            let _ = writeln!(out, "  (no stats)");
            continue;
        };
        let _ = writeln!(
            out,
            "■ {} {}  ({} instances)",
            class_color(class),
            class,
            stats.instance_count
        );
        for (method, m) in &stats.methods {
            let _ = writeln!(out, "  .{}", method);
            let _ = writeln!(out, "        max. call count per frame = {}", m.max_call_count_per_frame);
            let _ = writeln!(out, "        max. spent per frame (ms) = {:.1}ms", m.max_spent_per_frame_ms);
            let _ = writeln!(out, "          avg. time per call (ms) = {:.1}ms", m.avg_per_call_ms());
            let _ = writeln!(out, "                  total time (ms) = {:.1}ms", m.spent_total_ms);
        }
    }
    out
}

/// Closed frames, one row per frame and one column per class
pub fn render_frames(snapshot: &ProfileSnapshot) -> String {
    let mut out = String::new();
    banner(&mut out, "Frame History (ms)");

    if snapshot.frames.is_empty() {
        let _ = writeln!(out, "No frames closed.");
        return out;
    }

    let classes = ordered_classes(
        snapshot,
        snapshot.frames.iter().flat_map(|frame| frame.classes.keys()),
    );
    let column = classes.iter().map(|c| c.len()).max().unwrap_or(0).max(9);

    let _ = write!(out, "{:>6} {:>10}", "Frame", "Total");
    for class in &classes {
        let _ = write!(out, " {:>column$}", class);
    }
    let _ = writeln!(out);
    let rule = 6 + 1 + 10 + classes.len() * (column + 1);
    let _ = writeln!(out, "{}", "─".repeat(rule));

    for (index, frame) in snapshot.frames.iter().enumerate() {
        let over = frame.spent_total_ms.max(frame.tracked_total_ms()) > snapshot.frame_budget_ms;
        let _ = write!(out, "{:>6} {:>10.2}", index, frame.spent_total_ms);
        for class in &classes {
            let _ = write!(out, " {:>column$.2}", frame.class_spent_ms(class));
        }
        if over {
            let _ = write!(out, "  !");
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "{}", "─".repeat(rule));
    out
}
