//! Shared test utilities for tool unit tests.

use std::path::Path;

use stepwise_core::context::ToolContext;

/// Context rooted at `dir`.
pub(crate) fn make_test_ctx(dir: &Path) -> ToolContext {
    ToolContext::new("test", "run-test", dir).with_tool_call_id("call-test")
}
