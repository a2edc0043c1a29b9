// Configuration module entry point
// Loads layered configuration and holds runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, FileRoute, HealthConfig, HttpConfig, LoggingConfig, PerformanceConfig, RoutesConfig,
    ServerConfig, UploadConfig,
};

/// Default config file (extension optional)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// A missing file is fine: defaults and `SERVER_*` environment apply
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.show_headers", false)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "rangeserve/0.1")?
            .set_default("http.enable_cors", false)?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ViewResponder;

    fn load(contents: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        Config::load_from(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(dir.path().join("absent").to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.http.max_body_size, 10_485_760);
        assert!(cfg.routes.files.is_empty());
        assert!(cfg.routes.health.enabled);
        assert!(cfg.uploads.temp_dir.is_none());
        assert!(cfg.uploads.path.is_none());
        assert_eq!(cfg.get_socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_file_routes() {
        let cfg = load(
            r#"
[server]
port = 9090

[routes.files."/media"]
type = "dir"
path = "/srv/media"

[routes.files."/favicon"]
type = "file"
path = "/srv/favicon.svg"

[uploads]
temp_dir = "/var/tmp/rangeserve"
path = "/upload"
"#,
        );
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(
            cfg.routes.files.get("/media"),
            Some(&FileRoute::Dir {
                path: "/srv/media".to_string()
            })
        );
        assert_eq!(
            cfg.routes.files.get("/favicon"),
            Some(&FileRoute::File {
                path: "/srv/favicon.svg".to_string()
            })
        );
        assert_eq!(cfg.uploads.temp_dir.as_deref(), Some("/var/tmp/rangeserve"));
        assert_eq!(cfg.uploads.path.as_deref(), Some("/upload"));
    }

    #[test]
    fn test_invalid_address() {
        let mut cfg = load("");
        cfg.server.host = "not a host".to_string();
        assert!(cfg.get_socket_addr().is_err());
    }

    #[test]
    fn test_upload_staging_uses_configured_root() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = load("");
        cfg.uploads.temp_dir = Some(root.path().to_string_lossy().into_owned());

        let state = AppState::new(&cfg, ViewResponder::from_templates([]).unwrap());
        let mut staging = state.upload_staging();
        let dir = staging.staging_dir().unwrap();
        assert!(dir.starts_with(root.path()));
    }
}
