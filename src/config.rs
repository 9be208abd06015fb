use std::{env, fs, path::PathBuf, time::Duration};

use crate::prelude::*;
use nestify::nest;
use serde::{Deserialize, Serialize};
use url::Url;

nest! {
    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]*
    #[serde(default, rename_all = "kebab-case")]*
    /// Agent configuration.
    ///
    /// Loaded from `~/.config/procwatch/agent.yaml` (following `XDG_CONFIG_HOME`) with
    /// [`AgentConfig::load_with_override`]. Every key is optional, missing keys keep their default
    /// value.
    pub struct AgentConfig {
        pub backend: pub struct BackendConfig {
            /// Ingestion endpoint of the snapshot store
            pub url: String,
            pub api_key: String,
            pub request_timeout_secs: u64,
            /// Attempts per snapshot, including the first one
            pub max_retries: u32,
            pub retry_delay_secs: f64,
        },
        pub collection: pub struct CollectionConfig {
            pub interval_secs: u64,
            pub max_processes: usize,
            pub include_hierarchy: bool,
            pub collect_command_line: bool,
            pub continue_on_error: bool,
            /// Drop processes below both `min-cpu-percent` and `min-memory-mb`
            pub apply_thresholds: bool,
            pub min_cpu_percent: f64,
            pub min_memory_mb: f64,
        },
        /// Reported hostname, defaults to the system hostname
        pub hostname: Option<String>,
        pub display_system_info: bool,
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            collection: CollectionConfig::default(),
            hostname: None,
            display_system_info: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api/processes/".to_string(),
            api_key: String::new(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 5.0,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_processes: 1000,
            include_hierarchy: true,
            collect_command_line: false,
            continue_on_error: true,
            apply_thresholds: false,
            min_cpu_percent: 0.1,
            min_memory_mb: 1.0,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_secs).unwrap_or(Duration::ZERO)
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Values coming from the command line or the environment, they take precedence over the file
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub hostname: Option<String>,
}

/// Get the path to the configuration file, following the XDG Base Directory Specification
/// at https://specifications.freedesktop.org/basedir-spec/basedir-spec-latest.html
///
/// An explicit path is used as is, after expanding a leading `~`.
fn get_configuration_file_path(config_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        return Ok(PathBuf::from(shellexpand::tilde(path).as_ref()));
    }

    let config_dir = match env::var("XDG_CONFIG_HOME") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = env::var("HOME").context("HOME env variable not set")?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_dir.join("procwatch").join("agent.yaml"))
}

impl AgentConfig {
    /// Load the configuration. If the file does not exist, the defaults are used.
    ///
    /// Overrides are applied on top of the loaded values, then the result is validated.
    pub fn load_with_override(
        config_path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let config_path = get_configuration_file_path(config_path)?;

        let mut config = match fs::read(&config_path) {
            Ok(config_str) => {
                let config: AgentConfig = serde_yaml::from_slice(&config_str).context(format!(
                    "Failed to parse agent config at {}",
                    config_path.display()
                ))?;
                debug!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file not found at {}", config_path.display());
                AgentConfig::default()
            }
            Err(e) => bail!("Failed to load config: {e}"),
        };

        if let Some(url) = &overrides.backend_url {
            config.backend.url = url.to_owned();
        }
        if let Some(api_key) = &overrides.api_key {
            config.backend.api_key = api_key.to_owned();
        }
        if let Some(hostname) = &overrides.hostname {
            config.hostname = Some(hostname.to_owned());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.backend.url)
            .with_context(|| format!("Invalid backend url: {}", self.backend.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Backend url must use http or https, got {}", url.scheme());
        }
        if !self.backend.retry_delay_secs.is_finite() || self.backend.retry_delay_secs < 0.0 {
            bail!("retry-delay-secs must be a non-negative number of seconds");
        }
        if self.collection.interval_secs == 0 {
            bail!("The collection interval must be at least 1 second");
        }
        if self.collection.max_processes == 0 {
            bail!("max-processes must be at least 1");
        }
        if let Some(hostname) = &self.hostname {
            if hostname.trim().is_empty() {
                bail!("The hostname override must not be empty");
            }
        }
        Ok(())
    }
}
