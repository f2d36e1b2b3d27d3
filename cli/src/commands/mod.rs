//! CLI subcommands (§10.4): `serve`, `call`, `list`, `validate`.

pub mod call;
pub mod list;
pub mod serve;
pub mod validate;

use std::path::{Path, PathBuf};

use mcp_shell_core::infrastructure::catalog;
use mcp_shell_core::ToolRegistry;

/// Resolve the catalog path via the discovery order, then load and
/// compile the registry. Shared by every subcommand that needs a live
/// registry.
pub async fn load_registry(explicit: Option<&Path>) -> anyhow::Result<ToolRegistry> {
    let path = catalog::discover_catalog_path(explicit)?;
    let registry = ToolRegistry::load(&path, None).await?;
    Ok(registry)
}

pub fn resolve_catalog_path(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    Ok(catalog::discover_catalog_path(explicit)?)
}
