use regularity_core::{ModelCatalog, ProjectRegistry, Result};

/// Populate the project registry for this process.
///
/// An unknown `requested` id is replaced by the catalog default and reported at `warn`.
pub fn load_registry(catalog: &ModelCatalog, requested: &str) -> Result<ProjectRegistry> {
    let (registry, resolution) = ProjectRegistry::bootstrap(catalog, requested)?;
    if resolution.substituted {
        tracing::warn!(
            requested = %resolution.requested,
            using = %resolution.resolved,
            known = ?catalog.ids().collect::<Vec<_>>(),
            "model not found, loading default instead"
        );
    }
    tracing::info!(model = %resolution.resolved, "model registered");
    Ok(registry)
}
