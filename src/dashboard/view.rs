//! Plain-text rendering for the dashboard tables
//!
//! Display-only: these functions take already-fetched data and produce the
//! exact text printed to the terminal, including the documented empty states,
//! so the rendering is testable without a backend.

use super::api::CallLog;
use chrono::DateTime;

/// Render the "Available Slots" table.
pub fn render_appointments(slots: &[String]) -> String {
    let mut out = String::new();
    out.push_str("Available Slots\n");
    out.push_str(&format!("{:<24} {}\n", "Time", "Status"));

    if slots.is_empty() {
        out.push_str("No slots available\n");
        return out;
    }

    for slot in slots {
        out.push_str(&format!("{:<24} open\n", format_slot(slot)));
    }

    out
}

/// Render the "Recent Calls" table.
pub fn render_calls(calls: &[CallLog]) -> String {
    let mut out = String::new();
    out.push_str("Recent Calls\n");
    out.push_str(&format!("{:<40} {:>8}  {}\n", "Summary", "Duration", "Rec"));

    if calls.is_empty() {
        out.push_str("No call history\n");
        return out;
    }

    for call in calls {
        let summary = call
            .transcript_summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("No summary");
        let rec = match call.recording_url.as_deref() {
            Some(url) if !url.is_empty() => "yes",
            _ => "-",
        };
        out.push_str(&format!(
            "{:<40} {:>7}s  {}\n",
            truncate(summary, 40),
            call.duration,
            rec
        ));
    }

    out
}

/// RFC 3339 timestamps become "YYYY-MM-DD HH:MM"; anything unparseable is
/// shown as-is.
fn format_slot(slot: &str) -> String {
    match DateTime::parse_from_rfc3339(slot) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => slot.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}
