//! Output Truncation
//!
//! Content-aware clipping for a single command or tool output. Head and
//! tail lines are kept along with any error/warning lines from the middle;
//! only when that is still too large does a hard character cut apply.

use std::sync::OnceLock;

use regex::Regex;

const HEAD_LINES: usize = 20;
const TAIL_LINES: usize = 20;
const MAX_SIGNAL_LINES: usize = 40;
/// Room reserved for the hard-cut marker.
const MARKER_BUDGET: usize = 48;

fn signal_regex() -> Option<&'static Regex> {
    static SIGNAL: OnceLock<Option<Regex>> = OnceLock::new();
    SIGNAL
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(error|errors|warning|warn|failed|failure|fail|panicked|panic|exception|fatal|traceback)\b",
            )
            .ok()
        })
        .as_ref()
}

/// Line mentions an error, warning or failure.
pub fn is_signal_line(line: &str) -> bool {
    signal_regex().map(|re| re.is_match(line)).unwrap_or(false)
}

/// Clip `text` to at most `max_chars` characters.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > HEAD_LINES + TAIL_LINES {
        let middle = &lines[HEAD_LINES..lines.len() - TAIL_LINES];
        let signal: Vec<&str> = middle
            .iter()
            .copied()
            .filter(|l| is_signal_line(l))
            .take(MAX_SIGNAL_LINES)
            .collect();
        let marker = format!(
            "[... {} lines omitted, {} error/warning lines kept ...]",
            middle.len() - signal.len(),
            signal.len()
        );

        let mut kept: Vec<&str> = Vec::with_capacity(HEAD_LINES + TAIL_LINES + signal.len() + 1);
        kept.extend_from_slice(&lines[..HEAD_LINES]);
        kept.push(&marker);
        kept.extend(signal);
        kept.extend_from_slice(&lines[lines.len() - TAIL_LINES..]);
        let condensed = kept.join("\n");
        return hard_truncate(&condensed, max_chars);
    }

    hard_truncate(text, max_chars)
}

/// Keep the first two thirds and last third of the budget around a marker.
pub fn hard_truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    if max_chars <= MARKER_BUDGET {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - MARKER_BUDGET;
    let head_len = keep * 2 / 3;
    let tail_len = keep - head_len;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();
    format!(
        "{}\n[... {} chars truncated ...]\n{}",
        head,
        total - keep,
        tail
    )
}
