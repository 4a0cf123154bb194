//! Event script parsing.
//!
//! One event per line: `<start_ms> <duration_ms> <bandwidth_bps>
//! <delay_ms> <loss_per_10000> <description...>`. Blank lines and `#`
//! comments are ignored; malformed lines are logged with their line
//! number and skipped, never fatal.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use smallvec::SmallVec;
use tracing::warn;

use crate::link::Bandwidth;
use crate::scenario::NetworkEvent;

pub type EventList = SmallVec<[NetworkEvent; 16]>;

/// Load a script file. I/O failure is a setup error; parse problems are
/// per-line and non-fatal.
pub fn load_script(path: &Path) -> Result<EventList> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read script '{}'", path.display()))?;
    Ok(parse_script(&text))
}

pub fn parse_script(text: &str) -> EventList {
    let mut events = EventList::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Some(event) => events.push(event),
            None => warn!("script line {}: malformed, skipped: {line}", idx + 1),
        }
    }
    events
}

/// Split one whitespace-delimited token off the front of `rest`.
fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        *rest = s;
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (field, tail) = s.split_at(end);
    *rest = tail;
    Some(field)
}

fn parse_line(line: &str) -> Option<NetworkEvent> {
    let mut rest = line;

    let start_ms: i64 = next_field(&mut rest)?.parse().ok()?;
    let duration_ms: i64 = next_field(&mut rest)?.parse().ok()?;
    let bandwidth_bps: u64 = next_field(&mut rest)?.parse().ok()?;
    let delay_ms: i64 = next_field(&mut rest)?.parse().ok()?;
    let loss_per_10000: u32 = next_field(&mut rest)?.parse().ok()?;
    if start_ms < 0 || duration_ms < 0 || delay_ms < 0 {
        return None;
    }
    let description = rest.trim_start().to_string();

    Some(NetworkEvent {
        start_ms,
        duration_ms,
        bandwidth: match bandwidth_bps {
            0 => Bandwidth::Unlimited,
            bps => Bandwidth::Limited(bps),
        },
        delay_ms,
        loss_per_10000,
        description,
    })
}
