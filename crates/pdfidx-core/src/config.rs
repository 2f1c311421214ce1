use crate::constants;
use crate::error::ConfigError;
use crate::types::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration. The core itself only needs `workspace_dir` and
/// `embedding.model_id`; `http.port` exists purely so the (out-of-scope) HTTP
/// surface has somewhere to read a port from without inventing its own file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_distance_metric")]
    pub distance_metric: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_workspace_dir() -> String {
    "~/.pdfidx".into()
}
fn default_model_id() -> String {
    "pdfidx/deterministic-v1".into()
}
fn default_dimensions() -> usize {
    256
}
fn default_distance_metric() -> String {
    "cosine".into()
}
fn default_worker_count() -> usize {
    constants::DEFAULT_WORKER_COUNT
}
fn default_port() -> u16 {
    8731
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            dimensions: default_dimensions(),
            distance_metric: default_distance_metric(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EmbeddingConfig {
    pub fn distance_metric_typed(&self) -> DistanceMetric {
        parse_distance_metric(&self.distance_metric).unwrap_or(DistanceMetric::Cosine)
    }
}

impl Config {
    /// Load configuration with four-layer precedence (lowest to highest):
    /// built-in defaults, global (`~/.config/pdfidx/config.toml`), workspace
    /// local (`<workspace_dir>/config.toml`), explicit `--config` file, then
    /// environment variable overrides.
    pub fn load(workspace_dir_hint: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_file(workspace_dir_hint, None)
    }

    pub fn load_with_file(
        workspace_dir_hint: Option<&Path>,
        explicit_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(constants::GLOBAL_CONFIG_DIR).join("config.toml");
            if global_path.exists() {
                merge_toml_values(&mut merged, &load_toml_value(&global_path)?);
            }
        }

        if let Some(dir) = workspace_dir_hint {
            let workspace_path = dir.join(constants::WORKSPACE_CONFIG_FILE);
            if workspace_path.exists() {
                merge_toml_values(&mut merged, &load_toml_value(&workspace_path)?);
            }
        }

        if let Some(path) = explicit_file {
            merge_toml_values(&mut merged, &load_toml_value(path)?);
        }

        let merged_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&merged_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);

        config.workspace.workspace_dir = expand_tilde(&config.workspace.workspace_dir);
        if parse_distance_metric(&config.embedding.distance_metric).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "embedding.distance_metric".into(),
                reason: format!("unknown metric {:?}", config.embedding.distance_metric),
            });
        }

        Ok(config)
    }

    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.workspace.workspace_dir)
    }
}

fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("PDFIDX_WORKSPACE_WORKSPACE_DIR") {
        config.workspace.workspace_dir = v;
    }
    if let Ok(v) = std::env::var("PDFIDX_EMBEDDING_MODEL_ID") {
        config.embedding.model_id = v;
    }
    if let Ok(v) = std::env::var("PDFIDX_EMBEDDING_DIMENSIONS")
        && let Ok(n) = v.parse()
    {
        config.embedding.dimensions = n;
    }
    if let Ok(v) = std::env::var("PDFIDX_EMBEDDING_DISTANCE_METRIC") {
        config.embedding.distance_metric = v;
    }
    if let Ok(v) = std::env::var("PDFIDX_WORKER_COUNT")
        && let Ok(n) = v.parse()
    {
        config.worker.count = n;
    }
    if let Ok(v) = std::env::var("PDFIDX_HTTP_PORT")
        && let Ok(n) = v.parse()
    {
        config.http.port = n;
    }
    if let Ok(v) = std::env::var("PDFIDX_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn parse_distance_metric(raw: &str) -> Option<DistanceMetric> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "l2" => Some(DistanceMetric::L2),
        "ip" | "inner_product" => Some(DistanceMetric::InnerProduct),
        "cosine" => Some(DistanceMetric::Cosine),
        _ => None,
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    path.to_string()
}
