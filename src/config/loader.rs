use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides, e.g. `ROUTEKIT__LISTEN_ADDR`
const ENV_PREFIX: &str = "ROUTEKIT";

/// Load configuration from a file using the config crate.
///
/// The format follows the extension (YAML when unknown). Values can be
/// overridden from the environment with `ROUTEKIT__<FIELD>`, nested fields
/// separated by `__` (`ROUTEKIT__LIMITS__MAX_QUERY_KEYS=50`).
pub async fn load_config(config_path: impl AsRef<Path>) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: impl AsRef<Path>) -> Result<ServerConfig> {
    let config_path = config_path.as_ref();

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            file_format(config_path),
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })
}

/// Determine file format based on extension
pub fn file_format(config_path: &Path) -> FileFormat {
    match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:4000"
limits:
  max_query_keys: 20
static_files:
  - prefix: "/assets"
    root: "./public"
cors:
  origins: ["https://app.example"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path()).await.unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:4000");
        assert_eq!(config.limits.max_query_keys, 20);
        assert_eq!(config.limits.max_path_len, 1024);
        assert_eq!(config.static_files.len(), 1);
        assert_eq!(
            config.static_files[0].index_file.as_deref(),
            Some("index.html")
        );
        assert_eq!(config.cors.unwrap().origins, ["https://app.example"]);
        assert!(config.basic_auth.is_none());
    }

    #[tokio::test]
    async fn test_load_json_config() {
        let json_content = r#"
{
  "listen_addr": "127.0.0.1:4000",
  "basic_auth": {
    "username": "admin",
    "password": "secret"
  },
  "logging": {
    "level": "debug",
    "json": false
  }
}
"#;

        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{}", json_content).unwrap();

        let config = load_config(temp_file.path()).await.unwrap();
        let auth = config.basic_auth.unwrap();
        assert_eq!(auth.username.as_deref(), Some("admin"));
        assert_eq!(auth.realm, None);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "0.0.0.0:8080"

[[static_files]]
prefix = "/"
root = "./site"
index_file = "home.html"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config_sync(temp_file.path()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(
            config.static_files[0].index_file.as_deref(),
            Some("home.html")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = load_config_sync("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to build config"));
    }
}
