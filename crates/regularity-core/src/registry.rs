//! Projects: named bindings of a predictive model to its display configuration.
//!
//! The registry is built once at startup and only read afterwards, so it carries no locks.
//! Share it behind an `Arc`.

use crate::{Error, PredictiveModel, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a model instance. Construction may fail (bad settings, missing weights).
pub type ModelFactory = Box<dyn Fn() -> Result<Arc<dyn PredictiveModel>> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Human-readable label for clients.
    pub name: String,
    /// Catalog id of the bound model.
    pub model: String,
}

impl ProjectConfig {
    pub fn for_model(model_id: &str) -> Self {
        Self {
            name: model_id.to_string(),
            model: model_id.to_string(),
        }
    }
}

pub struct Project {
    id: String,
    config: ProjectConfig,
    model: Arc<dyn PredictiveModel>,
}

impl Project {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn PredictiveModel> {
        &self.model
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("model", &self.model.name())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, Project>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `model` under `id`. A previous project with the same id is replaced and returned.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        model: Arc<dyn PredictiveModel>,
        config: ProjectConfig,
    ) -> Option<Project> {
        let id = id.into();
        let project = Project {
            id: id.clone(),
            config,
            model,
        };
        self.projects.insert(id, project)
    }

    pub fn resolve(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    /// Client-facing enumeration. Only configuration leaves the registry.
    pub fn list_all(&self) -> BTreeMap<String, ProjectConfig> {
        self.projects
            .iter()
            .map(|(id, p)| (id.clone(), p.config.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Startup population: resolve `requested` against the catalog (falling back to its
    /// default), build that model and register it under the resolved id.
    ///
    /// On substitution the same model is also registered under `requested`, so clients that
    /// send the id the process was started with keep getting scores. The returned
    /// `Resolution` tells the caller whether a substitution happened.
    pub fn bootstrap(catalog: &ModelCatalog, requested: &str) -> Result<(Self, Resolution)> {
        let resolution = catalog.resolve_with_fallback(requested)?;
        let model = catalog.build(&resolution.resolved)?;
        let mut registry = Self::new();
        if resolution.substituted {
            registry.register(
                resolution.requested.clone(),
                model.clone(),
                ProjectConfig {
                    name: resolution.requested.clone(),
                    model: resolution.resolved.clone(),
                },
            );
        }
        registry.register(
            resolution.resolved.clone(),
            model,
            ProjectConfig::for_model(&resolution.resolved),
        );
        Ok((registry, resolution))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub requested: String,
    pub resolved: String,
    /// True when `requested` was unknown and the catalog default was used instead.
    pub substituted: bool,
}

/// Static table of the models this process knows how to build.
pub struct ModelCatalog {
    default_id: String,
    factories: BTreeMap<String, ModelFactory>,
}

impl ModelCatalog {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            default_id: default_id.into(),
            factories: BTreeMap::new(),
        }
    }

    pub fn add<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn PredictiveModel>> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Box::new(factory));
        self
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }

    pub fn resolve_with_fallback(&self, requested: &str) -> Result<Resolution> {
        if self.contains(requested) {
            return Ok(Resolution {
                requested: requested.to_string(),
                resolved: requested.to_string(),
                substituted: false,
            });
        }
        if !self.contains(&self.default_id) {
            return Err(Error::UnknownModel(format!(
                "{requested} (and default {} is not registered)",
                self.default_id
            )));
        }
        Ok(Resolution {
            requested: requested.to_string(),
            resolved: self.default_id.clone(),
            substituted: true,
        })
    }

    pub fn build(&self, id: &str) -> Result<Arc<dyn PredictiveModel>> {
        let factory = self
            .factories
            .get(id)
            .ok_or_else(|| Error::UnknownModel(id.to_string()))?;
        factory()
    }
}

impl fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("default_id", &self.default_id)
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenPrediction;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl PredictiveModel for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn predict(&self, _text: &str, _top_k: usize) -> Result<Vec<TokenPrediction>> {
            Ok(Vec::new())
        }
    }

    fn catalog() -> ModelCatalog {
        let mut c = ModelCatalog::new("alpha");
        c.add("alpha", || Ok(Arc::new(Fixed("alpha")) as Arc<dyn PredictiveModel>));
        c.add("beta", || Ok(Arc::new(Fixed("beta")) as Arc<dyn PredictiveModel>));
        c.add("broken", || Err(Error::NotConfigured("no weights".to_string())));
        c
    }

    #[test]
    fn resolve_unknown_project_is_none() {
        let reg = ProjectRegistry::new();
        assert!(reg.resolve("gpt-2").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn register_twice_last_wins() {
        let mut reg = ProjectRegistry::new();
        let first = reg.register("p", Arc::new(Fixed("one")), ProjectConfig::for_model("one"));
        assert!(first.is_none());
        let replaced = reg.register("p", Arc::new(Fixed("two")), ProjectConfig::for_model("two"));
        assert_eq!(replaced.map(|p| p.config().model.clone()).as_deref(), Some("one"));

        let p = reg.resolve("p").unwrap();
        assert_eq!(p.model().name(), "two");
        assert_eq!(p.id(), "p");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn list_all_exposes_only_configuration() {
        let mut reg = ProjectRegistry::new();
        reg.register("a", Arc::new(Fixed("alpha")), ProjectConfig::for_model("alpha"));
        reg.register(
            "b",
            Arc::new(Fixed("beta")),
            ProjectConfig {
                name: "Beta model".to_string(),
                model: "beta".to_string(),
            },
        );

        let all = reg.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"].name, "Beta model");

        let v = serde_json::to_value(&all).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "a": { "name": "alpha", "model": "alpha" },
                "b": { "name": "Beta model", "model": "beta" }
            })
        );
    }

    #[test]
    fn known_model_resolves_without_substitution() {
        let r = catalog().resolve_with_fallback("beta").unwrap();
        assert_eq!(r.resolved, "beta");
        assert!(!r.substituted);
    }

    #[test]
    fn unknown_model_falls_back_and_reports_it() {
        let r = catalog().resolve_with_fallback("gpt-9").unwrap();
        assert_eq!(r.requested, "gpt-9");
        assert_eq!(r.resolved, "alpha");
        assert!(r.substituted);
    }

    #[test]
    fn missing_default_is_an_error() {
        let mut c = ModelCatalog::new("absent");
        c.add("beta", || Ok(Arc::new(Fixed("beta")) as Arc<dyn PredictiveModel>));
        assert!(matches!(
            c.resolve_with_fallback("nope"),
            Err(Error::UnknownModel(_))
        ));
        // A known id still resolves even when the default is missing.
        assert!(c.resolve_with_fallback("beta").is_ok());
    }

    #[test]
    fn bootstrap_registers_resolved_model_and_requested_alias() {
        let (reg, res) = ProjectRegistry::bootstrap(&catalog(), "unknown").unwrap();
        assert!(res.substituted);
        assert_eq!(reg.len(), 2);
        let p = reg.resolve("alpha").unwrap();
        assert_eq!(p.model().name(), "alpha");
        assert_eq!(p.config(), &ProjectConfig::for_model("alpha"));

        let alias = reg.resolve("unknown").unwrap();
        assert!(Arc::ptr_eq(alias.model(), p.model()));
        assert_eq!(
            alias.config(),
            &ProjectConfig {
                name: "unknown".to_string(),
                model: "alpha".to_string(),
            }
        );
    }

    #[test]
    fn bootstrap_known_model_has_no_alias() {
        let (reg, res) = ProjectRegistry::bootstrap(&catalog(), "beta").unwrap();
        assert!(!res.substituted);
        assert_eq!(reg.list_all().keys().collect::<Vec<_>>(), vec!["beta"]);
    }

    #[test]
    fn bootstrap_propagates_factory_failure() {
        let err = ProjectRegistry::bootstrap(&catalog(), "broken").unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }
}
