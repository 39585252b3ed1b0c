use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{ApiConfig, DEFAULT_MAX_BODY_BYTES};
use crate::category::{CategoryResolver, CategoryTable, MatchPolicy};
use crate::detect::{labels, BackendRegistry, StubBackend};

const DEFAULT_API_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_MULTI_CONFIDENCE: f32 = 0.3;
const DEFAULT_IOU_THRESHOLD: f32 = crate::detect::yolo::DEFAULT_IOU_THRESHOLD;

const KNOWN_BACKENDS: &[&str] = &["stub", "tract", "none"];

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
    categories: Option<CategoriesConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    multi_confidence: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CategoriesConfigFile {
    path: Option<PathBuf>,
    match_policy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub max_body_bytes: usize,
    pub detector: DetectorSettings,
    pub categories: CategorySettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `stub`, `tract` or `none`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// One class name per line; COCO names when unset.
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence: f32,
    pub multi_confidence: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct CategorySettings {
    /// TOML table replacing the built-in one.
    pub path: Option<PathBuf>,
    pub match_policy: MatchPolicy,
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WASTE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Result<Self> {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let categories = file.categories.unwrap_or_default();
        let match_policy = match categories.match_policy.as_deref() {
            Some(policy) => policy.parse()?,
            None => MatchPolicy::default(),
        };
        Ok(Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_body_bytes: api.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence: detector.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                multi_confidence: detector
                    .multi_confidence
                    .unwrap_or(DEFAULT_MULTI_CONFIDENCE),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
            categories: CategorySettings {
                path: categories.path,
                match_policy,
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("WASTE_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(bytes) = non_empty_env("WASTE_MAX_BODY_BYTES") {
            self.max_body_bytes = bytes
                .parse()
                .map_err(|_| anyhow!("WASTE_MAX_BODY_BYTES must be an integer byte count"))?;
        }
        if let Some(backend) = non_empty_env("WASTE_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("WASTE_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("WASTE_LABELS_PATH") {
            self.detector.labels_path = Some(PathBuf::from(path));
        }
        if let Some(value) = non_empty_env("WASTE_CONFIDENCE") {
            self.detector.confidence = parse_threshold("WASTE_CONFIDENCE", &value)?;
        }
        if let Some(value) = non_empty_env("WASTE_MULTI_CONFIDENCE") {
            self.detector.multi_confidence = parse_threshold("WASTE_MULTI_CONFIDENCE", &value)?;
        }
        if let Some(path) = non_empty_env("WASTE_CATEGORIES_PATH") {
            self.categories.path = Some(PathBuf::from(path));
        }
        if let Some(policy) = non_empty_env("WASTE_MATCH_POLICY") {
            self.categories.match_policy = policy.parse()?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.api_addr
            .parse::<SocketAddr>()
            .map_err(|_| anyhow!("invalid api address '{}'", self.api_addr))?;
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than zero"));
        }

        let detector = &mut self.detector;
        detector.backend = detector.backend.trim().to_lowercase();
        if !KNOWN_BACKENDS.contains(&detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                detector.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if detector.backend == "tract" && detector.model_path.is_none() {
            return Err(anyhow!("tract backend requires a model path"));
        }
        if detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        for (name, value) in [
            ("confidence", detector.confidence),
            ("multi_confidence", detector.multi_confidence),
            ("iou_threshold", detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            addr: self.api_addr.clone(),
            max_body_bytes: self.max_body_bytes,
            detect_confidence: self.detector.confidence,
            multi_confidence: self.detector.multi_confidence,
        }
    }

    /// Build the category table once and wrap it in a resolver.
    pub fn build_resolver(&self) -> Result<CategoryResolver> {
        let table = match &self.categories.path {
            Some(path) => CategoryTable::load(path)?,
            None => CategoryTable::builtin(),
        };
        Ok(CategoryResolver::new(
            Arc::new(table),
            self.categories.match_policy,
        ))
    }
}

impl DetectorSettings {
    /// Class names for the model: the labels file, or COCO names.
    pub fn load_labels(&self) -> Result<Vec<String>> {
        match &self.labels_path {
            Some(path) => labels::load_labels(path),
            None => Ok(labels::coco_labels()),
        }
    }

    /// Registry holding the configured backend, or nothing for `none`.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new();
        match self.backend.as_str() {
            "none" => {}
            "stub" => registry.register(StubBackend::default()),
            "tract" => self.register_tract(&mut registry)?,
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        if self.backend != "none" {
            registry.set_default(&self.backend)?;
        }
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_tract(&self, registry: &mut BackendRegistry) -> Result<()> {
        use crate::detect::{DetectorBackend, TractBackend};

        let model_path = self
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
        let mut backend = TractBackend::new(
            model_path,
            self.load_labels()?,
            self.input_size,
            self.input_size,
        )?
        .with_iou_threshold(self.iou_threshold);
        backend.warm_up()?;
        registry.register(backend);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_tract(&self, _registry: &mut BackendRegistry) -> Result<()> {
        Err(anyhow!(
            "tract backend requested but this build lacks the backend-tract feature"
        ))
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_threshold(key: &str, value: &str) -> Result<f32> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number between 0 and 1", key))
}
