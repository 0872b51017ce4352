//! Plain-text rendering of inbound events for the terminal.

use carelink::{ChatUpdate, CodecError, Connection, StepProgress};

pub fn step_line(step: &StepProgress) -> String {
    format!("[step {}] {}", step.step_index, step.description)
}

/// Lines to print for a chat update: a server error if any, then the newest
/// history entry. Earlier entries were printed when they arrived.
pub fn update_lines(update: &ChatUpdate) -> Result<Vec<String>, CodecError> {
    let mut lines = Vec::new();
    if let Some(error) = update.error() {
        lines.push(format!("! server: {error}"));
    }
    if let Some(last) = update.history()?.last() {
        let speaker = last.name.as_deref().unwrap_or(&last.role);
        lines.push(format!("{speaker}: {}", last.content));
    }
    Ok(lines)
}

pub fn status_line(conn: &Connection) -> String {
    format!(
        "{:?} to {} ({} reconnect attempts)",
        conn.state(),
        conn.endpoint(),
        conn.reconnect_attempts()
    )
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
