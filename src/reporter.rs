use crate::types::{StatusEvent, SweepSummary};

/// Emit a status event as a single JSON line to stdout.
pub fn report_event(event: &StatusEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

/// Emit the sweep summary as pretty-printed JSON to stdout.
pub fn report_sweep_summary(summary: &SweepSummary) {
    if let Ok(json) = serde_json::to_string_pretty(summary) {
        println!("{json}");
    }
}
