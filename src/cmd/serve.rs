//! API server command (`freelancie serve`).

use anyhow::Result;
use std::path::{Path, PathBuf};

use freelancie::config::AppConfig;

/// Flags that take precedence over file and environment settings.
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub db_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub dev: bool,
}

impl ServeOverrides {
    fn apply(self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(path) = self.db_path {
            config.database.path = path;
        }
        if let Some(dir) = self.static_dir {
            config.server.static_dir = Some(dir);
        }
        if self.dev {
            config.server.dev_mode = true;
        }
    }
}

pub async fn cmd_serve(
    config_path: Option<&Path>,
    verbose: bool,
    overrides: ServeOverrides,
) -> Result<()> {
    let mut config = AppConfig::resolve(config_path)?;
    overrides.apply(&mut config);

    let _guard = freelancie::logging::init_logging(&config.logging, verbose)?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    tracing::info!(environment = %config.environment, "starting Freelancie");

    let server = config.server_config()?;
    freelancie::market::server::start_server(server).await
}
