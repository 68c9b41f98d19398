//! Stuck Detection
//!
//! Sliding window over recently executed shell-like commands. The run is
//! considered stuck when the window is full and every command shares a
//! normalized prefix with the first one that covers more than
//! `threshold` of the longer string. Detection only raises a flag; the
//! orchestrator escalates it to a decision prompt.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct StuckDetector {
    window: VecDeque<String>,
    size: usize,
    threshold: f64,
}

/// Lowercase and collapse whitespace.
fn normalize(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Common-prefix length over the longer length, in chars.
pub fn prefix_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    let common = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    common as f64 / longest as f64
}

impl StuckDetector {
    pub fn new(size: usize, threshold: f64) -> Self {
        let size = size.max(2);
        Self {
            window: VecDeque::with_capacity(size),
            size,
            threshold,
        }
    }

    pub fn record(&mut self, command: &str) {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        self.window.push_back(command.to_string());
    }

    pub fn is_stuck(&self) -> bool {
        if self.window.len() < self.size {
            return false;
        }
        let Some(first) = self.window.front() else {
            return false;
        };
        self.window
            .iter()
            .skip(1)
            .all(|c| prefix_similarity(first, c) > self.threshold)
    }

    /// Commands currently in the window, oldest first.
    pub fn recent(&self) -> Vec<&str> {
        self.window.iter().map(String::as_str).collect()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
