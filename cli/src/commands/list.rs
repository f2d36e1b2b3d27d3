//! `list`: print every tool the catalog accepted, after prerequisite
//! filtering, with no transport involved.

use std::path::Path;

pub async fn run(catalog: Option<&Path>) -> anyhow::Result<()> {
    let registry = super::load_registry(catalog).await?;
    for tool in registry.list() {
        println!("{}\t{}", tool.name, tool.description);
        for (name, spec) in &tool.params {
            let required = if spec.is_effectively_required() { "required" } else { "optional" };
            println!("    {name}: {:?} ({required})", spec.kind);
        }
    }
    Ok(())
}
