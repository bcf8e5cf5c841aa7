//! Configuration for the assistant.
//!
//! Loaded from `recibot.toml` in the platform config directory, or from the
//! path named by `RECIBOT_CONFIG`. Every field has a serde default so an
//! empty (or absent) file still produces a runnable configuration.

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Inbound webhook server + outbound WhatsApp gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address for the inbound webhook server
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Base URL of the WhatsApp gateway HTTP API
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// Bearer token for the gateway API (empty = no auth)
    #[serde(default)]
    pub api_token: String,
    /// Pause after the typing indicator before each reply, in milliseconds
    #[serde(default = "default_typing_delay_ms")]
    pub typing_delay_ms: u64,
}

/// Paths to the CSV datasets, one per menu command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    #[serde(default = "default_medicines")]
    pub medicines: String,
    #[serde(default = "default_theatres")]
    pub theatres: String,
    #[serde(default = "default_health_units")]
    pub health_units: String,
    #[serde(default = "default_telecenters")]
    pub telecenters: String,
    #[serde(default = "default_security_units")]
    pub security_units: String,
    #[serde(default = "default_medicine_by_neighborhood")]
    pub medicine_by_neighborhood: String,
}

impl DatasetsConfig {
    /// Resolve a dataset path, expanding `~`.
    pub fn resolve(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).into_owned())
    }
}

/// Static map renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders
    #[serde(default = "default_tile_url")]
    pub tile_url: String,
    /// Identifying User-Agent the tile server requires
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Map center latitude (Recife by default)
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,
    /// Map center longitude
    #[serde(default = "default_center_lon")]
    pub center_lon: f64,
    /// Slippy-map zoom level
    #[serde(default = "default_zoom")]
    pub zoom: u32,
    /// Square canvas size in pixels
    #[serde(default = "default_canvas_size")]
    pub canvas_size: u32,
    /// Per-tile fetch timeout in seconds
    #[serde(default = "default_tile_timeout_secs")]
    pub tile_timeout_secs: u64,
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are evicted
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8090".into()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_typing_delay_ms() -> u64 {
    1000
}

fn default_medicines() -> String {
    "./data/medicamentos.csv".into()
}

fn default_theatres() -> String {
    "./data/teatros.csv".into()
}

fn default_health_units() -> String {
    "./data/unidades_saude.csv".into()
}

fn default_telecenters() -> String {
    "./data/telecentros.csv".into()
}

fn default_security_units() -> String {
    "./data/unidades_seguranca.csv".into()
}

fn default_medicine_by_neighborhood() -> String {
    "./data/rel_medicamento_bairro.csv".into()
}

fn default_tile_url() -> String {
    "https://tile.openstreetmap.org/{z}/{x}/{y}.png".into()
}

fn default_user_agent() -> String {
    format!("recibot/{} (municipal assistant)", env!("CARGO_PKG_VERSION"))
}

fn default_center_lat() -> f64 {
    -8.0476
}

fn default_center_lon() -> f64 {
    -34.8770
}

fn default_zoom() -> u32 {
    15
}

fn default_canvas_size() -> u32 {
    400
}

fn default_tile_timeout_secs() -> u64 {
    10
}

fn default_idle_ttl_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_url: default_gateway_url(),
            api_token: String::new(),
            typing_delay_ms: default_typing_delay_ms(),
        }
    }
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            medicines: default_medicines(),
            theatres: default_theatres(),
            health_units: default_health_units(),
            telecenters: default_telecenters(),
            security_units: default_security_units(),
            medicine_by_neighborhood: default_medicine_by_neighborhood(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tile_url: default_tile_url(),
            user_agent: default_user_agent(),
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            zoom: default_zoom(),
            canvas_size: default_canvas_size(),
            tile_timeout_secs: default_tile_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl BotConfig {
    /// Load configuration.
    ///
    /// Order: `RECIBOT_CONFIG` path if set, then `recibot.toml` in the
    /// platform config directory, then built-in defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("RECIBOT_CONFIG") {
            return Self::load_from(PathBuf::from(shellexpand::tilde(&path).into_owned()));
        }

        if let Some(dirs) = directories::ProjectDirs::from("br", "recife", "recibot") {
            let path = dirs.config_dir().join("recibot.toml");
            if path.exists() {
                return Self::load_from(path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw)
            .map_err(|e| BotError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_recife_deployment() {
        let config = BotConfig::default();
        assert_eq!(config.map.zoom, 15);
        assert_eq!(config.map.canvas_size, 400);
        assert!((config.map.center_lat - -8.0476).abs() < 1e-9);
        assert!((config.map.center_lon - -34.8770).abs() < 1e-9);
        assert_eq!(config.session.idle_ttl_secs, 1800);
        assert!(config.map.tile_url.contains("{z}"));
    }

    #[test]
    fn empty_file_deserializes_to_defaults() {
        let config: BotConfig = toml::from_str("").unwrap();
        assert_eq!(config.datasets.medicines, "./data/medicamentos.csv");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: BotConfig = toml::from_str(
            r#"
            [map]
            zoom = 12

            [gateway]
            base_url = "http://gateway:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.map.zoom, 12);
        assert_eq!(config.map.canvas_size, 400);
        assert_eq!(config.gateway.base_url, "http://gateway:9000");
    }

    #[test]
    fn load_from_reads_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nidle_ttl_secs = 60").unwrap();
        let config = BotConfig::load_from(file.path().to_path_buf()).unwrap();
        assert_eq!(config.session.idle_ttl_secs, 60);
    }

    #[test]
    fn load_from_missing_file_is_io_error() {
        let err = BotConfig::load_from(PathBuf::from("/nonexistent/recibot.toml")).unwrap_err();
        assert!(matches!(err, crate::error::BotError::Io(_)));
    }
}
