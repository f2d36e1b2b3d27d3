//! `validate`: load and compile the catalog, report success or failure,
//! without standing up a transport. The compile-only half of `serve`.

use std::path::Path;

use tracing::info;

pub async fn run(catalog: Option<&Path>) -> anyhow::Result<()> {
    let path = super::resolve_catalog_path(catalog)?;
    let registry = super::load_registry(Some(&path)).await?;
    info!(path = %path.display(), tools = registry.list().len(), "catalog is valid");
    println!("catalog OK: {} tool(s) registered from {}", registry.list().len(), path.display());
    Ok(())
}
