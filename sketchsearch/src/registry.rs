//! Sketch, timeline and search template lookup.

use crate::model::{SearchTemplate, Sketch};
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait SketchRegistry: Send + Sync {
    async fn sketch(&self, sketch_id: i64) -> Result<Option<Sketch>>;

    async fn search_template(&self, template_id: i64) -> Result<Option<SearchTemplate>>;
}

/// Registry file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub sketches: Vec<Sketch>,
    #[serde(default)]
    pub templates: Vec<SearchTemplate>,
}

/// Registry held in memory, loaded from YAML or built in code.
#[derive(Default)]
pub struct StaticRegistry {
    sketches: RwLock<HashMap<i64, Sketch>>,
    templates: RwLock<HashMap<i64, SearchTemplate>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_yaml_str(&content)?;
        tracing::info!(
            "Loaded {} sketches and {} templates from {:?}",
            registry.sketches.read().len(),
            registry.templates.read().len(),
            path
        );
        Ok(registry)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(content)?;
        let registry = Self::new();
        for sketch in file.sketches {
            registry.add_sketch(sketch);
        }
        for template in file.templates {
            registry.add_template(template);
        }
        Ok(registry)
    }

    pub fn add_sketch(&self, sketch: Sketch) {
        self.sketches.write().insert(sketch.id, sketch);
    }

    pub fn add_template(&self, template: SearchTemplate) {
        self.templates.write().insert(template.id, template);
    }

    pub fn with_sketch(self, sketch: Sketch) -> Self {
        self.add_sketch(sketch);
        self
    }

    pub fn with_template(self, template: SearchTemplate) -> Self {
        self.add_template(template);
        self
    }
}

#[async_trait]
impl SketchRegistry for StaticRegistry {
    async fn sketch(&self, sketch_id: i64) -> Result<Option<Sketch>> {
        Ok(self.sketches.read().get(&sketch_id).cloned())
    }

    async fn search_template(&self, template_id: i64) -> Result<Option<SearchTemplate>> {
        Ok(self.templates.read().get(&template_id).cloned())
    }
}
