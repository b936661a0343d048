use forgecast_core::{EngineError, EngineResult};

use crate::config::EngineConfig;
use crate::model::{ForecastModel, ModelConfig, ModelFamily};

/// Registered models in registration order.
///
/// Built once at engine initialization and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ForecastModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One default model per family.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let mut registry = Self::new();
        for family in ModelFamily::ALL {
            registry.register(ModelConfig::for_family(
                family,
                config.horizon_length,
                config.sequence_window,
            ))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, config: ModelConfig) -> EngineResult<()> {
        if config.name.trim().is_empty() {
            return Err(EngineError::validation("model name must not be empty"));
        }
        if config.horizon_length == 0 {
            return Err(EngineError::validation(format!(
                "{}: horizon_length must be positive",
                config.name
            )));
        }
        if self.contains(&config.name) {
            return Err(EngineError::validation(format!(
                "model already registered: {}",
                config.name
            )));
        }
        self.models.push(ForecastModel::from_config(config));
        Ok(())
    }

    pub fn get(&self, name: &str) -> EngineResult<&ForecastModel> {
        self.models
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| EngineError::model_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(ForecastModel::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForecastModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_one_model_per_family() {
        let registry = ModelRegistry::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(registry.len(), 4);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec!["sequence", "tree_ensemble", "autoregressive", "decomposition"]
        );
        assert_eq!(
            registry.get("sequence").unwrap().family(),
            ModelFamily::Sequence
        );
    }

    #[test]
    fn unknown_name_is_model_not_found() {
        let registry = ModelRegistry::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(
            registry.get("lstm").unwrap_err(),
            EngineError::ModelNotFound("lstm".into())
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ModelRegistry::from_config(&EngineConfig::default()).unwrap();
        let dup = ModelConfig::for_family(ModelFamily::Autoregressive, 7, 30);
        assert!(matches!(
            registry.register(dup),
            Err(EngineError::Validation(_))
        ));

        let renamed =
            ModelConfig::for_family(ModelFamily::Autoregressive, 7, 30).with_name("ar_weekly");
        registry.register(renamed).unwrap();
        assert!(registry.contains("ar_weekly"));
    }
}
