//! Presswork configuration.
//!
//! Every section has defaults matching the production setup, so an empty
//! config is valid. Values can come from a KDL (or JSON) file and from
//! `PRESSWORK_*` environment variables; the environment wins.
//!
//! ```kdl
//! ingest {
//!     mode "auto"
//!     max-input-bytes 20971520
//!     inline-max-bytes 524288
//! }
//! compression {
//!     max-output-bytes 2097152
//!     quality-floor 0.1
//!     max-attempts 8
//! }
//! storage {
//!     public-base "https://cdn.example.com/article-images/"
//!     store-dir "./assets"
//!     namespace "desk"
//! }
//! ```

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::MIB;
use crate::error::ConfigError;

/// How ingested images end up in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    /// Compress and upload every image.
    #[default]
    Upload,
    /// Embed every image as base64, uncompressed.
    Inline,
    /// Embed images up to `inline_max_bytes`, upload the rest.
    Auto,
}

impl std::str::FromStr for AssetMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "inline" => Ok(Self::Inline),
            "auto" => Ok(Self::Auto),
            _ => Err(ConfigError::InvalidValue {
                key: "ingest.mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Ingestion limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IngestConfig {
    pub mode: AssetMode,
    /// Declared file sizes above this are rejected before reading.
    pub max_input_bytes: u64,
    /// Largest image that may be embedded inline.
    pub inline_max_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: AssetMode::default(),
            max_input_bytes: 20 * MIB,
            inline_max_bytes: MIB / 2,
        }
    }
}

/// Compression engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompressionConfig {
    /// Hard ceiling on encoded output.
    pub max_output_bytes: u64,
    /// Lowest quality the retry loop may reach, in `0.0..=1.0`.
    pub quality_floor: f32,
    /// Upper bound on encode attempts per image.
    pub max_attempts: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 2 * MIB,
            quality_floor: 0.1,
            max_attempts: 8,
        }
    }
}

/// Where uploaded assets go and how they are addressed publicly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Public base every locator is derived from.
    pub public_base: String,
    /// Local directory for the filesystem store.
    pub store_dir: Option<PathBuf>,
    /// Storage REST endpoint for the HTTP store.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub api_key: Option<String>,
    /// Optional actor/session prefix for generated names.
    pub namespace: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base: "http://localhost:8080/article-images/".to_string(),
            store_dir: None,
            endpoint: None,
            bucket: "article-images".to_string(),
            api_key: None,
            namespace: None,
        }
    }
}

impl StorageConfig {
    /// Parse the public base, normalised to end with `/` so names join under it.
    pub fn public_base_url(&self) -> Result<Url, ConfigError> {
        let mut base = self.public_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).map_err(|e| ConfigError::UrlParse {
            url: self.public_base.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressworkConfig {
    pub ingest: IngestConfig,
    pub compression: CompressionConfig,
    pub storage: StorageConfig,
}

impl PressworkConfig {
    /// Load from a `.kdl` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("kdl") => Self::from_kdl(&content),
            Some("json") => {
                let config: Self = serde_json::from_str(&content).map_err(ConfigError::Json)?;
                config.validate()?;
                Ok(config)
            }
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Parse a KDL config document. Unknown nodes are ignored.
    pub fn from_kdl(source: &str) -> Result<Self, ConfigError> {
        let doc: KdlDocument = source.parse()?;
        let mut config = Self::default();

        if let Some(ingest) = section(&doc, "ingest") {
            if let Some(mode) = string_arg(ingest, "mode", "ingest.mode")? {
                config.ingest.mode = mode.parse()?;
            }
            if let Some(v) = u64_arg(ingest, "max-input-bytes", "ingest.max-input-bytes")? {
                config.ingest.max_input_bytes = v;
            }
            if let Some(v) = u64_arg(ingest, "inline-max-bytes", "ingest.inline-max-bytes")? {
                config.ingest.inline_max_bytes = v;
            }
        }

        if let Some(compression) = section(&doc, "compression") {
            if let Some(v) = u64_arg(
                compression,
                "max-output-bytes",
                "compression.max-output-bytes",
            )? {
                config.compression.max_output_bytes = v;
            }
            if let Some(v) = compression.get_arg("quality-floor") {
                config.compression.quality_floor = v
                    .as_f64()
                    .ok_or_else(|| invalid("compression.quality-floor", v))?
                    as f32;
            }
            if let Some(v) = u64_arg(compression, "max-attempts", "compression.max-attempts")? {
                config.compression.max_attempts =
                    u32::try_from(v).map_err(|_| ConfigError::InvalidValue {
                        key: "compression.max-attempts".to_string(),
                        value: v.to_string(),
                    })?;
            }
        }

        if let Some(storage) = section(&doc, "storage") {
            if let Some(v) = string_arg(storage, "public-base", "storage.public-base")? {
                config.storage.public_base = v.to_string();
            }
            if let Some(v) = string_arg(storage, "store-dir", "storage.store-dir")? {
                config.storage.store_dir = Some(PathBuf::from(v));
            }
            if let Some(v) = string_arg(storage, "endpoint", "storage.endpoint")? {
                config.storage.endpoint = Some(v.to_string());
            }
            if let Some(v) = string_arg(storage, "bucket", "storage.bucket")? {
                config.storage.bucket = v.to_string();
            }
            if let Some(v) = string_arg(storage, "api-key", "storage.api-key")? {
                config.storage.api_key = Some(v.to_string());
            }
            if let Some(v) = string_arg(storage, "namespace", "storage.namespace")? {
                config.storage.namespace = Some(v.to_string());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PRESSWORK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from an environment lookup.
    ///
    /// - `PRESSWORK_INGEST_MODE`: `upload`, `inline` or `auto`
    /// - `PRESSWORK_MAX_INPUT_BYTES`, `PRESSWORK_INLINE_MAX_BYTES`
    /// - `PRESSWORK_MAX_OUTPUT_BYTES`
    /// - `PRESSWORK_PUBLIC_BASE`, `PRESSWORK_STORE_DIR`
    /// - `PRESSWORK_STORAGE_ENDPOINT`, `PRESSWORK_STORAGE_BUCKET`, `PRESSWORK_STORAGE_KEY`
    /// - `PRESSWORK_NAMESPACE`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(mode) = lookup("PRESSWORK_INGEST_MODE") {
            self.ingest.mode = mode.parse()?;
        }
        if let Some(v) = lookup("PRESSWORK_MAX_INPUT_BYTES") {
            self.ingest.max_input_bytes = parse_u64("PRESSWORK_MAX_INPUT_BYTES", &v)?;
        }
        if let Some(v) = lookup("PRESSWORK_INLINE_MAX_BYTES") {
            self.ingest.inline_max_bytes = parse_u64("PRESSWORK_INLINE_MAX_BYTES", &v)?;
        }
        if let Some(v) = lookup("PRESSWORK_MAX_OUTPUT_BYTES") {
            self.compression.max_output_bytes = parse_u64("PRESSWORK_MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = lookup("PRESSWORK_PUBLIC_BASE") {
            self.storage.public_base = v;
        }
        if let Some(v) = lookup("PRESSWORK_STORE_DIR") {
            self.storage.store_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PRESSWORK_STORAGE_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = lookup("PRESSWORK_STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("PRESSWORK_STORAGE_KEY") {
            self.storage.api_key = Some(v);
        }
        if let Some(v) = lookup("PRESSWORK_NAMESPACE") {
            self.storage.namespace = Some(v);
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let floor = self.compression.quality_floor;
        if !(floor > 0.0 && floor <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "compression.quality-floor".to_string(),
                value: floor.to_string(),
            });
        }
        if self.compression.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "compression.max-attempts".to_string(),
                value: "0".to_string(),
            });
        }
        self.storage.public_base_url()?;
        Ok(())
    }
}

fn section<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlDocument> {
    doc.get(name).and_then(|node| node.children())
}

fn string_arg<'a>(
    doc: &'a KdlDocument,
    name: &str,
    key: &str,
) -> Result<Option<&'a str>, ConfigError> {
    match doc.get_arg(name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(Some)
            .ok_or_else(|| invalid(key, value)),
    }
}

fn u64_arg(doc: &KdlDocument, name: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match doc.get_arg(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|v| u64::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| invalid(key, value)),
    }
}

fn invalid(key: &str, value: &KdlValue) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults_match_production_limits() {
        let config = PressworkConfig::default();
        assert_eq!(config.compression.max_output_bytes, 2 * MIB);
        assert_eq!(config.ingest.mode, AssetMode::Upload);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_kdl_overrides_sections() {
        let config = PressworkConfig::from_kdl(
            r#"
            ingest {
                mode "auto"
                inline-max-bytes 1000
            }
            compression {
                quality-floor 0.2
            }
            storage {
                public-base "https://cdn.example.com/images"
                namespace "desk"
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.ingest.mode, AssetMode::Auto);
        assert_eq!(config.ingest.inline_max_bytes, 1000);
        assert_eq!(config.ingest.max_input_bytes, 20 * MIB);
        assert!((config.compression.quality_floor - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.storage.namespace.as_deref(), Some("desk"));
        assert_eq!(
            config.storage.public_base_url().unwrap().as_str(),
            "https://cdn.example.com/images/"
        );
    }

    #[test]
    fn test_from_kdl_rejects_bad_mode() {
        let err = PressworkConfig::from_kdl("ingest {\n mode \"sideways\"\n}\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_kdl_rejects_attempts_past_u32() {
        let err = PressworkConfig::from_kdl("compression {\n max-attempts 4294967297\n}\n")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, ref value }
                if key == "compression.max-attempts" && value == "4294967297"
        ));

        let config =
            PressworkConfig::from_kdl("compression {\n max-attempts 12\n}\n").unwrap();
        assert_eq!(config.compression.max_attempts, 12);
    }

    #[test]
    fn test_apply_env_wins() {
        let vars: HashMap<&str, &str> = [
            ("PRESSWORK_INGEST_MODE", "inline"),
            ("PRESSWORK_MAX_INPUT_BYTES", "4096"),
            ("PRESSWORK_PUBLIC_BASE", "https://assets.example.org"),
        ]
        .into_iter()
        .collect();

        let mut config = PressworkConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ingest.mode, AssetMode::Inline);
        assert_eq!(config.ingest.max_input_bytes, 4096);
        assert_eq!(config.storage.public_base, "https://assets.example.org");
    }

    #[test]
    fn test_apply_env_rejects_garbage_numbers() {
        let mut config = PressworkConfig::default();
        let err = config
            .apply_env(|key| (key == "PRESSWORK_MAX_OUTPUT_BYTES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presswork.json");
        std::fs::write(&path, r#"{"ingest": {"mode": "auto", "inline-max-bytes": 10}}"#).unwrap();

        let config = PressworkConfig::load(&path).unwrap();
        assert_eq!(config.ingest.mode, AssetMode::Auto);
        assert_eq!(config.ingest.inline_max_bytes, 10);
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presswork.yaml");
        std::fs::write(&path, "ingest: {}").unwrap();

        assert!(matches!(
            PressworkConfig::load(&path),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
