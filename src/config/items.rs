//! Create-arg contributors
//!
//! Each [`ConfigItem`] appends engine-CLI flags during container creation
//! and/or command delegation, and may run a post-create hook inside the
//! fresh container. The set is a closed enum carried inside each container
//! config; there is no global registry.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::runner::{ArgList, CommandRunner};
use crate::vars;
use crate::version::EngineVersion;

/// CUDA versions the `cuda_version` item accepts literally. Values with
/// unresolved build variables skip the check.
const CUDA_VERSIONS: [&str; 8] = ["6.5", "7.0", "7.5", "8.0", "9.0", "9.1", "9.2", "10.0"];

static MEMORY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)([bkmgt])$").expect("memory regex"));

/// Context available while assembling argument vectors.
pub struct ArgContext<'a> {
    /// Build variables for `$VAR` resolution.
    pub vars: &'a HashMap<String, String>,
    /// Probed engine version, for CLI-dialect selection.
    pub version: &'a EngineVersion,
}

/// One pluggable contribution to container creation or command delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigItem {
    /// `-e KEY=VALUE` at creation.
    Env { key: String, value: String },

    /// `-m LIMIT` at creation. `LIMIT` is digits plus a b/k/m/g/t suffix.
    Memory { limit: String },

    /// Create the user inside the container after start, and run delegated
    /// commands as that user.
    User {
        username: String,
        #[serde(default)]
        uid: String,
        #[serde(default)]
        gid: String,
    },

    /// `--runtime NAME` at creation.
    Runtime { name: String },

    /// GPU visibility. Emits `--gpus` on engines that support the flag,
    /// falling back to the legacy `NVIDIA_VISIBLE_DEVICES` variable.
    GpuDevices {
        #[serde(default = "default_gpu_devices")]
        devices: String,
    },

    /// `-e NVIDIA_DRIVER_CAPABILITIES=...` at creation.
    DriverCapabilities {
        #[serde(default)]
        compute: bool,
        #[serde(default)]
        compat32: bool,
        #[serde(default)]
        graphics: bool,
        #[serde(default)]
        utility: bool,
        #[serde(default)]
        video: bool,
    },

    /// `-e NVIDIA_REQUIRE_CUDA=...` at creation.
    CudaVersion { version: String },

    /// Arbitrary extra tokens appended to the creation vector.
    ExtraArgs { args: Vec<String> },
}

fn default_gpu_devices() -> String {
    "all".to_string()
}

impl ConfigItem {
    /// Validate the item. Runs before any external command.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            ConfigItem::Env { key, .. } => {
                if key.is_empty() {
                    return Err(Error::Configuration(
                        "environment variable name cannot be empty".to_string(),
                    ));
                }
            }
            ConfigItem::Memory { limit } => {
                if !MEMORY_REGEX.is_match(limit) {
                    return Err(Error::Configuration(format!(
                        "memory value '{limit}' is not valid"
                    )));
                }
            }
            ConfigItem::User { username, uid, gid } => {
                if username.is_empty() {
                    return Err(Error::Configuration("username cannot be empty".to_string()));
                }
                if username != "root" && (uid.is_empty() || gid.is_empty()) {
                    return Err(Error::Configuration(
                        "uid and gid are required for a non-root user".to_string(),
                    ));
                }
            }
            ConfigItem::Runtime { name } => {
                if name.is_empty() {
                    return Err(Error::Configuration(
                        "container runtime cannot be empty".to_string(),
                    ));
                }
            }
            ConfigItem::GpuDevices { devices } => {
                if devices.is_empty() {
                    return Err(Error::Configuration(
                        "GPU visibility cannot be empty".to_string(),
                    ));
                }
            }
            ConfigItem::DriverCapabilities { .. } => {}
            ConfigItem::CudaVersion { version } => {
                if !vars::has_variables(version) && !CUDA_VERSIONS.contains(&version.as_str()) {
                    return Err(Error::Configuration(format!(
                        "invalid CUDA version: {version}"
                    )));
                }
            }
            ConfigItem::ExtraArgs { .. } => {}
        }
        Ok(())
    }

    /// Append this item's flags to the container-creation vector.
    pub fn create_args(&self, ctx: &ArgContext<'_>, args: &mut ArgList) {
        match self {
            ConfigItem::Env { key, value } => {
                args.add("-e");
                args.add(format!("{}={}", key, vars::resolve(ctx.vars, value)));
            }
            ConfigItem::Memory { limit } => {
                args.add_pair("-m", vars::resolve(ctx.vars, limit).to_uppercase());
            }
            // User creation happens post-create; nothing at creation time.
            ConfigItem::User { .. } => {}
            ConfigItem::Runtime { name } => {
                args.add_pair("--runtime", vars::resolve(ctx.vars, name));
            }
            ConfigItem::GpuDevices { devices } => {
                let devices = vars::resolve(ctx.vars, devices);
                if ctx.version.supports_gpus_flag() {
                    args.add("--gpus");
                    if devices == "all" {
                        args.add("all");
                    } else {
                        args.add(format!("device={devices}"));
                    }
                } else {
                    args.add("-e");
                    args.add(format!("NVIDIA_VISIBLE_DEVICES={devices}"));
                }
            }
            ConfigItem::DriverCapabilities {
                compute,
                compat32,
                graphics,
                utility,
                video,
            } => {
                let mut abilities = Vec::new();
                if *compute {
                    abilities.push("compute");
                }
                if *compat32 {
                    abilities.push("compat32");
                }
                if *graphics {
                    abilities.push("graphics");
                }
                if *utility {
                    abilities.push("utility");
                }
                if *video {
                    abilities.push("video");
                }
                if !abilities.is_empty() {
                    args.add("-e");
                    args.add(format!("NVIDIA_DRIVER_CAPABILITIES={}", abilities.join(",")));
                }
            }
            ConfigItem::CudaVersion { version } => {
                args.add("-e");
                args.add(format!(
                    "NVIDIA_REQUIRE_CUDA={}",
                    vars::resolve(ctx.vars, version)
                ));
            }
            ConfigItem::ExtraArgs { args: extra } => {
                for token in extra {
                    args.add(vars::resolve(ctx.vars, token));
                }
            }
        }
    }

    /// Append this item's flags to the delegation (`exec`) vector.
    pub fn run_args(&self, ctx: &ArgContext<'_>, args: &mut ArgList) {
        if let ConfigItem::User { username, .. } = self {
            args.add_pair("--user", vars::resolve(ctx.vars, username));
        }
    }

    /// Hook run after the container started, before the build executes.
    pub async fn post_create(
        &self,
        runner: &dyn CommandRunner,
        container_id: &str,
        build_vars: &HashMap<String, String>,
    ) -> Result<(), Error> {
        let ConfigItem::User { username, uid, gid } = self else {
            return Ok(());
        };
        if username == "root" {
            return Ok(());
        }

        let username = vars::resolve(build_vars, username);
        let uid = vars::resolve(build_vars, uid);
        let gid = vars::resolve(build_vars, gid);

        let mut group_add = ArgList::from_tokens(["exec", container_id, "groupadd", "-g"]);
        group_add.add(&gid).add(&username);
        let out = runner.run(&group_add).await?;
        if !out.success() {
            return Err(Error::Launch(format!(
                "failed to create group {username}: {}",
                out.stderr.trim()
            )));
        }

        let mut user_add = ArgList::from_tokens(["exec", container_id, "useradd", "-g"]);
        user_add.add(&gid).add("-u").add(&uid).add(&username);
        let out = runner.run(&user_add).await?;
        if !out.success() {
            return Err(Error::Launch(format!(
                "failed to create user {username}: {}",
                out.stderr.trim()
            )));
        }

        Ok(())
    }
}
