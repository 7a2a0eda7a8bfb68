//! Configuration for drydock
//!
//! Supports configuration via:
//! - YAML/TOML config files
//! - Environment variables (with DRYDOCK_ prefix)
//!
//! Everything is validated eagerly, before any engine command runs.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::runner::ArgList;
use crate::vars;

pub mod items;

pub use items::{ArgContext, ConfigItem};

/// Whether a container is the exec target or an auxiliary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Side,
}

/// Top-level configuration for one isolated build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine binary override. Defaults to `docker` discovered on PATH.
    #[serde(default)]
    pub engine: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Echo every engine command and print the probed version.
    #[serde(default)]
    pub debug: bool,

    /// Remove containers at teardown; when false they are only stopped.
    #[serde(default = "default_true")]
    pub remove_containers: bool,

    /// Host directory mounted into the main container as the build workspace.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Container-side workspace path override. When set, it wins over the
    /// host path both as mount target and as delegated working directory.
    #[serde(default)]
    pub workspace_override: Option<String>,

    /// Host temp directory mounted into the main container. Defaults to the
    /// system temp directory.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Build variables for `$VAR` resolution in user-supplied strings.
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// The container that receives all delegated build commands.
    #[serde(default)]
    pub main: ContainerConfig,

    /// Auxiliary containers sharing a private network with main, created in
    /// declared order before it.
    #[serde(default)]
    pub sides: Vec<ContainerConfig>,
}

/// How a container is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Declared container name. Required for side containers; the main
    /// container falls back to a generated name.
    #[serde(default)]
    pub name: Option<String>,

    /// Image source: a pre-built reference or a buildable context.
    #[serde(default)]
    pub image: ImageSource,

    /// Ordered create-arg contributors.
    #[serde(default)]
    pub items: Vec<ConfigItem>,

    /// Volume mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}

/// Either an existing image reference or a Dockerfile to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Image {
        /// Image reference; may contain build variables.
        reference: String,
        /// Pull the image before creation.
        #[serde(default)]
        force_pull: bool,
        /// Retries after a failed pull; `pull_retries + 1` attempts total.
        #[serde(default = "default_pull_retries")]
        pull_retries: u32,
    },
    Dockerfile {
        /// Path to a Dockerfile, relative to the context.
        #[serde(default)]
        file: Option<String>,
        /// Inline Dockerfile contents, materialized into a temp directory.
        #[serde(default)]
        text: Option<String>,
        /// Build context directory; defaults to the workspace.
        #[serde(default)]
        context: Option<String>,
        /// `--build-arg` key/value pairs, emitted in key order.
        #[serde(default)]
        build_args: BTreeMap<String, String>,
        #[serde(default)]
        force_pull: bool,
        #[serde(default)]
        squash: bool,
        /// Tag for the built image; a random UUID when empty.
        #[serde(default)]
        tag: Option<String>,
    },
}

/// A `hostPath:containerPath[:ro|rw]` bind mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_pull_retries() -> u32 {
    2
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: None,
            log_level: default_log_level(),
            debug: false,
            remove_containers: true,
            workspace: default_workspace(),
            workspace_override: None,
            temp_dir: None,
            variables: HashMap::new(),
            main: ContainerConfig::default(),
            sides: Vec::new(),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: None,
            image: ImageSource::default(),
            items: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        ImageSource::Image {
            reference: String::new(),
            force_pull: false,
            pull_retries: default_pull_retries(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    pub fn load() -> Result<Self, Error> {
        // Pick up a .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Start with defaults
            .add_source(
                config::Config::try_from(&AppConfig::default())
                    .map_err(|e| Error::Configuration(e.to_string()))?,
            )
            // Load from config file if present
            .add_source(config::File::with_name("drydock").required(false))
            .add_source(config::File::with_name("config/drydock").required(false))
            // Override with environment variables (DRYDOCK_ prefix)
            .add_source(
                config::Environment::with_prefix("DRYDOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Load configuration from a specific file, with env overrides.
    pub fn load_from(path: &str) -> Result<Self, Error> {
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(
                config::Config::try_from(&AppConfig::default())
                    .map_err(|e| Error::Configuration(e.to_string()))?,
            )
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("DRYDOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate all container configs. Fails before any engine command runs.
    pub fn validate(&self) -> Result<(), Error> {
        self.main.validate(Role::Main)?;
        for side in &self.sides {
            side.validate(Role::Side)?;
        }
        Ok(())
    }

    /// Container-side workspace path: the override, or the host path as-is.
    pub fn workspace_target(&self) -> String {
        self.workspace_override
            .clone()
            .unwrap_or_else(|| self.workspace.display().to_string())
    }
}

impl ContainerConfig {
    /// Validate the config for its role.
    pub fn validate(&self, role: Role) -> Result<(), Error> {
        if role == Role::Side && self.name.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::Configuration(
                "side container must have a name".to_string(),
            ));
        }

        match &self.image {
            ImageSource::Image { reference, .. } => {
                if reference.is_empty() {
                    return Err(Error::Configuration("image cannot be empty".to_string()));
                }
            }
            ImageSource::Dockerfile { file, text, .. } => {
                if file.as_deref().unwrap_or_default().is_empty()
                    && text.as_deref().unwrap_or_default().is_empty()
                {
                    return Err(Error::Configuration(
                        "you must specify a Dockerfile to use".to_string(),
                    ));
                }
            }
        }

        for item in &self.items {
            item.validate()?;
        }
        for volume in &self.volumes {
            volume.validate()?;
        }
        Ok(())
    }

    /// Append this config's creation contributions: items in registration
    /// order, then volumes. The trailing image reference is appended by the
    /// launcher once image setup has resolved it.
    pub fn create_args(&self, ctx: &ArgContext<'_>, args: &mut ArgList) {
        for item in &self.items {
            item.create_args(ctx, args);
        }
        for volume in &self.volumes {
            volume.add_args(ctx.vars, args);
        }
    }

    /// Append this config's delegation-time contributions.
    pub fn run_args(&self, ctx: &ArgContext<'_>, args: &mut ArgList) {
        for item in &self.items {
            item.run_args(ctx, args);
        }
    }
}

impl VolumeMount {
    pub fn validate(&self) -> Result<(), Error> {
        if self.host_path.is_empty() {
            return Err(Error::Configuration("must specify a host path".to_string()));
        }
        if self.container_path.is_empty() {
            return Err(Error::Configuration(
                "must specify a destination path".to_string(),
            ));
        }
        Ok(())
    }

    /// Append `-v host:container:ro|rw`.
    pub fn add_args(&self, build_vars: &HashMap<String, String>, args: &mut ArgList) {
        let mode = if self.read_only { "ro" } else { "rw" };
        args.add_pair(
            "-v",
            format!(
                "{}:{}:{}",
                vars::resolve(build_vars, &self.host_path),
                vars::resolve(build_vars, &self.container_path),
                mode
            ),
        );
    }
}
