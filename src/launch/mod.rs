//! Container orchestration
//!
//! [`Launcher::launch`] provisions the private network (when side containers
//! exist), creates side containers in declared order, then the main
//! container, and aggregates every created identifier into a
//! [`RuntimeState`]. Creation is strictly sequential: the main container id
//! must be well-defined before any command delegation, and partial-failure
//! teardown needs a reproducible set of ids.

use tracing::{error, info};
use uuid::Uuid;

use crate::config::{AppConfig, ArgContext, ContainerConfig, Role};
use crate::error::{Error, LaunchError};
use crate::network::BridgeNetwork;
use crate::runner::{ArgList, CommandRunner};
use crate::state::RuntimeState;
use crate::vars;
use crate::version::EngineVersion;

mod image;

/// Orchestrates the one-shot launch of a build's containers.
pub struct Launcher<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AppConfig,
    version: EngineVersion,
}

impl<'a> Launcher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a AppConfig, version: EngineVersion) -> Self {
        Self {
            runner,
            config,
            version,
        }
    }

    /// Launch every container. On failure the returned [`LaunchError`]
    /// carries the partial [`RuntimeState`] — everything created so far —
    /// which the caller must hand to teardown.
    pub async fn launch(&self) -> Result<RuntimeState, LaunchError> {
        let mut state = RuntimeState::new(self.config.debug, self.config.remove_containers);
        match self.launch_all(&mut state).await {
            Ok(()) => Ok(state),
            Err(source) => Err(LaunchError { source, state }),
        }
    }

    async fn launch_all(&self, state: &mut RuntimeState) -> Result<(), Error> {
        // Side containers need to reach each other and main by name, so a
        // private network exists exactly when there are side containers.
        let network = if self.config.sides.is_empty() {
            None
        } else {
            let network = BridgeNetwork::create(self.runner).await?;
            state.record_network(network.id().to_string());
            Some(network)
        };

        for side in &self.config.sides {
            self.launch_container(side, Role::Side, network.as_ref(), state)
                .await?;
        }

        self.launch_container(&self.config.main, Role::Main, network.as_ref(), state)
            .await?;

        Ok(())
    }

    async fn launch_container(
        &self,
        config: &ContainerConfig,
        role: Role,
        network: Option<&BridgeNetwork>,
        state: &mut RuntimeState,
    ) -> Result<(), Error> {
        let image = image::setup_image(
            self.runner,
            &config.image,
            &self.config.variables,
            &self.config.workspace,
        )
        .await?;

        let args = self.creation_args(config, role, network, &image);
        let out = self.runner.run(&args).await?;
        if !out.success() {
            error!(image = %image, stderr = %out.stderr.trim(), "Container creation failed");
            return Err(Error::Launch(format!(
                "failed to start container image {image}"
            )));
        }

        let id = out.stdout.trim().to_string();
        info!(container_id = %id, image = %image, "Container started");

        state.record_container(id.clone());
        if role == Role::Main {
            state.record_main(id.clone());
        }

        // Post-create hooks run against the container that just started,
        // before the build executes.
        for item in &config.items {
            item.post_create(self.runner, &id, &self.config.variables)
                .await?;
        }

        Ok(())
    }

    /// Assemble the creation argument vector.
    ///
    /// Layout: `run -t -d --name <name> --network bridge [--network <net>]`,
    /// main-only blocking shell and workspace mounts, per-item create args,
    /// volumes, and the image reference last.
    fn creation_args(
        &self,
        config: &ContainerConfig,
        role: Role,
        network: Option<&BridgeNetwork>,
        image: &str,
    ) -> ArgList {
        let build_vars = &self.config.variables;
        let mut args = ArgList::from_tokens(["run", "-t", "-d"]);

        let name = match config.name.as_deref() {
            Some(name) if !name.is_empty() => vars::resolve(build_vars, name),
            _ => format!("drydock_{}", Uuid::new_v4().simple()),
        };
        args.add_pair("--name", name);

        // Default bridge keeps outbound access even without side containers.
        args.add_pair("--network", "bridge");
        if let Some(network) = network {
            network.run_args(&mut args);
        }

        if role == Role::Main {
            // A blocking shell keeps the container alive regardless of the
            // image's own entrypoint; every build command is exec'd into it.
            args.add_pair("--entrypoint", "/bin/sh");

            let target = self.config.workspace_target();
            args.add_pair("--workdir", &target);

            // Resolve symlinks so the mount source survives the
            // /var -> /private/var indirection on macOS hosts.
            let workspace_src = self
                .config
                .workspace
                .canonicalize()
                .unwrap_or_else(|_| self.config.workspace.clone());
            args.add_pair("-v", format!("{}:{}", workspace_src.display(), target));

            let temp_dest = self
                .config
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let temp_src = temp_dest
                .canonicalize()
                .unwrap_or_else(|_| temp_dest.clone());
            args.add_pair(
                "-v",
                format!("{}:{}", temp_src.display(), temp_dest.display()),
            );

            // Scratch directory next to the workspace, used by wrapper
            // scripts that must outlive a single delegated command.
            args.add_pair(
                "-v",
                format!("{}@tmp:{}@tmp", workspace_src.display(), target),
            );
        }

        let ctx = ArgContext {
            vars: build_vars,
            version: &self.version,
        };
        config.create_args(&ctx, &mut args);

        args.add(image);
        args
    }
}
