//! Built-in Tools
//!
//! The fixed toolset the engine ships with. Each tool lives in its own
//! module; `builtin_registry` registers all of them in a stable order.

mod delete;
mod edit;
mod http;
mod list;
mod read;
mod shell;
mod write;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use crate::trait_def::ToolRegistry;

pub use delete::DeleteFileTool;
pub use edit::EditFileTool;
pub use http::HttpGetTool;
pub use list::ListDirTool;
pub use read::ReadFileTool;
pub use shell::RunCommandTool;
pub use write::WriteFileTool;

/// Maximum bytes a file tool will read into memory.
pub(crate) const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

/// Registry holding every built-in tool.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry);
    registry
}

pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(ReadFileTool));
    registry.register(Arc::new(ListDirTool));
    registry.register(Arc::new(WriteFileTool));
    registry.register(Arc::new(EditFileTool));
    registry.register(Arc::new(DeleteFileTool));
    registry.register(Arc::new(RunCommandTool::new()));
    registry.register(Arc::new(HttpGetTool::new()));
}

pub(crate) fn missing_param_error(param: &str) -> String {
    format!("Missing required parameter: {param}")
}

pub(crate) fn str_arg<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

/// Read a file as text when it exists; `Ok(None)` when it does not.
pub(crate) async fn read_existing(path: &std::path::Path) -> Result<Option<String>, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("Failed to read {}: {}", path.display(), e)),
    }
}
