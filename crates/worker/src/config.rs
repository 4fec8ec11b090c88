use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use streamwork_engine::EngineConfig;

use crate::cli::Cli;

fn default_status_port() -> u16 {
    8081
}

fn default_service_stub() -> String {
    "mock".to_string()
}

/// Tunable overrides layered on top of [`EngineConfig::default`]. Every
/// field is optional: an absent value leaves the corresponding design
/// default untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunableOverrides {
    pub max_workers: Option<usize>,
    pub max_queue: Option<usize>,
    pub max_commit_bytes: Option<usize>,
    pub pushback_ratio: Option<f64>,
}

/// Fully resolved process configuration: service endpoint, status port,
/// service-stub tag, and tunables, assembled in increasing priority from
/// built-in defaults, an optional TOML file, `WORKER_`-prefixed environment
/// variables, and finally CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub service_hostport: String,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
    #[serde(default = "default_service_stub")]
    pub service_stub: String,
    #[serde(default)]
    pub tunables: TunableOverrides,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),
    #[error("`--hostport` (or WINDMILL_HOSTPORT) is required")]
    MissingHostport,
    #[error("malformed startup computation descriptor: {0}")]
    DescriptorParse(String),
}

/// Loads the worker's configuration, then parses any `--computation`
/// startup descriptors. Malformed descriptors are a fatal bootstrap error,
/// surfaced as `Err` so `main` can report it and exit non-zero rather than
/// panicking.
pub fn load(cli: Cli) -> Result<(WorkerConfig, Vec<streamwork_common::ComputationDescriptor>), ConfigError> {
    #[derive(Serialize)]
    struct Defaults {
        status_port: u16,
        service_stub: String,
    }

    let mut figment = Figment::new().merge(Serialized::defaults(Defaults {
        status_port: default_status_port(),
        service_stub: default_service_stub(),
    }));

    if let Some(path) = &cli.config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("WORKER_"));

    #[derive(Serialize)]
    struct CliOverrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        service_hostport: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_stub: Option<String>,
    }
    figment = figment.merge(Serialized::defaults(CliOverrides {
        service_hostport: cli.service_hostport.clone(),
        status_port: cli.status_port,
        service_stub: cli.service_stub.clone(),
    }));

    let config: WorkerConfig = figment.extract()?;
    if config.service_hostport.is_empty() {
        return Err(ConfigError::MissingHostport);
    }

    let mut descriptors = Vec::with_capacity(cli.computations.len());
    for arg in &cli.computations {
        let descriptor = streamwork_common::ComputationDescriptor::parse_startup_arg(arg)
            .map_err(|e| ConfigError::DescriptorParse(e.to_string()))?;
        descriptors.push(descriptor);
    }

    Ok((config, descriptors))
}

impl WorkerConfig {
    /// Applies the config's tunable overrides on top of the design
    /// defaults.
    pub fn engine_config(&self) -> EngineConfig {
        let mut cfg = EngineConfig::default();
        if let Some(v) = self.tunables.max_workers {
            cfg.max_workers = v;
        }
        if let Some(v) = self.tunables.max_queue {
            cfg.max_queue = v;
        }
        if let Some(v) = self.tunables.max_commit_bytes {
            cfg.max_commit_bytes = v;
        }
        if let Some(v) = self.tunables.pushback_ratio {
            cfg.pushback_ratio = v;
        }
        cfg
    }
}
