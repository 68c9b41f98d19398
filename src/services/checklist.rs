//! Checklist Tracker
//!
//! Ordered task list for the current goal. The tracker, not its callers,
//! keeps the single-in-progress invariant: starting an item demotes any
//! other in-progress item back to pending. Counts and percentages are
//! derived on demand.

use crate::models::checklist::{TaskChecklistItem, TaskStatus};
use crate::utils::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default)]
pub struct ChecklistTracker {
    goal: Option<String>,
    items: Vec<TaskChecklistItem>,
}

impl ChecklistTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the goal and task list. Ids are assigned 1..=n in order.
    pub fn set_goal(&mut self, goal: impl Into<String>, tasks: &[String]) {
        self.goal = Some(goal.into());
        self.items = tasks
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, t)| TaskChecklistItem::new(i as u32 + 1, t))
            .collect();
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn items(&self) -> &[TaskChecklistItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn item_mut(&mut self, id: u32) -> EngineResult<&mut TaskChecklistItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EngineError::not_found(format!("checklist item {}", id)))
    }

    pub fn mark_in_progress(&mut self, id: u32) -> EngineResult<()> {
        let target = self.item_mut(id)?;
        if target.status.is_terminal() {
            return Err(EngineError::validation(format!(
                "checklist item {} is already {:?}",
                id, target.status
            )));
        }
        for item in &mut self.items {
            if item.status == TaskStatus::InProgress && item.id != id {
                item.status = TaskStatus::Pending;
            }
        }
        self.item_mut(id)?.status = TaskStatus::InProgress;
        Ok(())
    }

    fn finish(&mut self, id: u32, status: TaskStatus, note: Option<String>) -> EngineResult<()> {
        let item = self.item_mut(id)?;
        if item.status.is_terminal() {
            return Err(EngineError::validation(format!(
                "checklist item {} is already {:?}",
                id, item.status
            )));
        }
        item.status = status;
        if note.is_some() {
            item.note = note;
        }
        Ok(())
    }

    pub fn mark_completed(&mut self, id: u32, note: Option<String>) -> EngineResult<()> {
        self.finish(id, TaskStatus::Completed, note)
    }

    pub fn mark_failed(&mut self, id: u32, note: Option<String>) -> EngineResult<()> {
        self.finish(id, TaskStatus::Failed, note)
    }

    pub fn mark_skipped(&mut self, id: u32, note: Option<String>) -> EngineResult<()> {
        self.finish(id, TaskStatus::Skipped, note)
    }

    /// Skip every non-terminal item. Returns how many changed.
    pub fn skip_remaining(&mut self, note: &str) -> usize {
        let mut skipped = 0;
        for item in &mut self.items {
            if !item.status.is_terminal() {
                item.status = TaskStatus::Skipped;
                item.note = Some(note.to_string());
                skipped += 1;
            }
        }
        skipped
    }

    pub fn current(&self) -> Option<&TaskChecklistItem> {
        self.items
            .iter()
            .find(|i| i.status == TaskStatus::InProgress)
    }

    /// Start the lowest-id pending item when nothing is in progress.
    ///
    /// Returns the newly started item.
    pub fn promote_next(&mut self) -> Option<&TaskChecklistItem> {
        if self.current().is_some() {
            return None;
        }
        let next = self
            .items
            .iter_mut()
            .filter(|i| i.status == TaskStatus::Pending)
            .min_by_key(|i| i.id)?;
        next.status = TaskStatus::InProgress;
        Some(&*next)
    }

    pub fn completed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == TaskStatus::Completed)
            .count()
    }

    /// Share of items in a terminal state, 0..=100.
    pub fn progress_percent(&self) -> u8 {
        if self.items.is_empty() {
            return 0;
        }
        let done = self.items.iter().filter(|i| i.status.is_terminal()).count();
        ((done * 100) / self.items.len()) as u8
    }

    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }

    pub fn remaining(&self) -> Vec<&TaskChecklistItem> {
        self.items
            .iter()
            .filter(|i| !i.status.is_terminal())
            .collect()
    }

    /// Compact text form for prompts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(goal) = &self.goal {
            out.push_str(&format!("Goal: {}\n", goal));
        }
        for item in &self.items {
            out.push_str(&format!(
                "{} {}. {}",
                item.status.marker(),
                item.id,
                item.description
            ));
            if let Some(note) = &item.note {
                out.push_str(&format!(" ({})", note));
            }
            out.push('\n');
        }
        out
    }
}
