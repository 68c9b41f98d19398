//! Context Window Management
//!
//! - `budget` - effective limit and derived capture/memory limits
//! - `truncation` - per-entry clipping that favors error lines
//! - `compaction` - pluggable log summarizers
//! - `window` - the per-run log and its summarization trigger

pub mod budget;
pub mod compaction;
pub mod truncation;
pub mod window;

pub use budget::ContextBudget;
pub use compaction::{ContextCompactor, ExtractiveCompactor, LlmSummaryCompactor};
pub use truncation::truncate_output;
pub use window::{summarize_log, ContextWindowManager, SummarizeOutcome, SummaryReport};
