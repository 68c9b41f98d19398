//! Integration Tests Module
//!
//! End-to-end runs of the engine against a scripted provider and tool
//! doubles: run lifecycle and checklist progression, context budgeting,
//! approval and file locking, and session rollback/persistence.

// Shared builders
mod support;

// Phase sequences, checklist progression, summarization
mod run_lifecycle_test;

// Approval gate decisions, file locks and cancellation
mod approval_lock_test;

// Checkpoint rollback, branching and persistence through a session
mod session_test;
