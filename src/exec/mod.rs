//! Command delegation into the running main container
//!
//! A generic "run this command" request becomes `docker exec` against the
//! main container, preserving working directory, environment, and the
//! original tokens' secret masking. The delegated process runs detached from
//! orchestration; the returned handle supports waiting and killing only.

use crate::config::{AppConfig, ArgContext};
use crate::error::Error;
use crate::runner::{ArgList, CommandRunner, OutputSink, ProcessHandle, StdioSinks};
use crate::state::RuntimeState;
use crate::version::EngineVersion;

/// A command to delegate into the main container.
#[derive(Default)]
pub struct ExecRequest {
    /// The original command tokens, masks intact.
    pub cmd: ArgList,
    /// Caller's working directory. A configured workspace override takes
    /// precedence over this value.
    pub pwd: Option<String>,
    /// Environment overlay, flattened to `KEY=VALUE` via `env`.
    pub env: Vec<(String, String)>,
    /// Output sinks; `None` falls back to the ambient build log.
    pub stdout: Option<OutputSink>,
    pub stderr: Option<OutputSink>,
}

impl ExecRequest {
    pub fn new(cmd: ArgList) -> Self {
        Self {
            cmd,
            ..Self::default()
        }
    }
}

/// Delegates build commands against a launched [`RuntimeState`].
pub struct Delegate<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a AppConfig,
    version: EngineVersion,
    state: &'a RuntimeState,
}

impl<'a> Delegate<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a AppConfig,
        version: EngineVersion,
        state: &'a RuntimeState,
    ) -> Self {
        Self {
            runner,
            config,
            version,
            state,
        }
    }

    /// Execute a command inside the main container.
    ///
    /// Fails with [`Error::ContainerNotStarted`] — before any CLI call —
    /// when the state predates a successful main-container creation; that is
    /// an ordering bug in the caller, not a runtime condition.
    pub async fn exec(&self, request: ExecRequest) -> Result<ProcessHandle, Error> {
        let main_id = self
            .state
            .main_container_id()
            .ok_or(Error::ContainerNotStarted)?;

        let mut args = ArgList::from_tokens(["exec"]);

        if let Some(pwd) = request.pwd.as_deref() {
            let path = self.config.workspace_override.as_deref().unwrap_or(pwd);
            args.add_pair("--workdir", path);
        }

        let ctx = ArgContext {
            vars: &self.config.variables,
            version: &self.version,
        };
        self.config.main.run_args(&ctx, &mut args);

        args.add(main_id);

        args.add("env");
        for (key, value) in &request.env {
            args.add(format!("{key}={value}"));
        }
        if let Some(workspace) = self.config.workspace_override.as_deref() {
            // Point $WORKSPACE at the container-side path.
            args.add(format!("WORKSPACE={workspace}"));
        }

        args.extend_from(&request.cmd);

        let io = StdioSinks {
            stdout: request.stdout.unwrap_or(OutputSink::BuildLog),
            stderr: request.stderr.unwrap_or(OutputSink::BuildLog),
        };
        self.runner.spawn(&args, io).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{ConfigItem, ContainerConfig};
    use crate::runner::fake::FakeRunner;

    fn launched_state(main_id: &str) -> RuntimeState {
        let mut state = RuntimeState::new(false, true);
        state.record_container(main_id.to_string());
        state.record_main(main_id.to_string());
        state
    }

    #[tokio::test]
    async fn test_exec_before_launch_never_reaches_the_cli() {
        let runner = FakeRunner::new();
        let config = AppConfig::default();
        let state = RuntimeState::new(false, true);
        let delegate = Delegate::new(&runner, &config, EngineVersion::unknown(), &state);

        let err = delegate
            .exec(ExecRequest::new(ArgList::from_tokens(["make"])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContainerNotStarted));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_exec_argument_vector_layout() {
        let runner = FakeRunner::new();
        let config = AppConfig {
            workspace_override: Some("/inside/ws".to_string()),
            main: ContainerConfig {
                name: Some("main".to_string()),
                items: vec![ConfigItem::User {
                    username: "builder".to_string(),
                    uid: "1000".to_string(),
                    gid: "1000".to_string(),
                }],
                ..ContainerConfig::default()
            },
            ..AppConfig::default()
        };
        let state = launched_state("main-c");
        let delegate = Delegate::new(&runner, &config, EngineVersion::unknown(), &state);

        let mut request = ExecRequest::new(ArgList::from_tokens(["make", "test"]));
        request.pwd = Some("/builds/app".to_string());
        request.env = vec![("CI".to_string(), "true".to_string())];

        let mut handle = delegate.exec(request).await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), 0);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            [
                "exec",
                "--workdir",
                "/inside/ws",
                "--user",
                "builder",
                "main-c",
                "env",
                "CI=true",
                "WORKSPACE=/inside/ws",
                "make",
                "test"
            ]
        );
    }

    #[tokio::test]
    async fn test_no_workdir_flag_without_caller_pwd() {
        let runner = FakeRunner::new();
        let config = AppConfig {
            workspace_override: Some("/inside/ws".to_string()),
            ..AppConfig::default()
        };
        let state = launched_state("main-c");
        let delegate = Delegate::new(&runner, &config, EngineVersion::unknown(), &state);

        delegate
            .exec(ExecRequest::new(ArgList::from_tokens(["true"])))
            .await
            .unwrap();

        let call = &runner.calls()[0];
        assert!(!call.contains(&"--workdir".to_string()));
        // The override still reaches the environment overlay.
        assert!(call.contains(&"WORKSPACE=/inside/ws".to_string()));
    }

    #[tokio::test]
    async fn test_caller_pwd_used_when_no_override() {
        let runner = FakeRunner::new();
        let config = AppConfig::default();
        let state = launched_state("main-c");
        let delegate = Delegate::new(&runner, &config, EngineVersion::unknown(), &state);

        let mut request = ExecRequest::new(ArgList::from_tokens(["true"]));
        request.pwd = Some("/builds/app".to_string());
        delegate.exec(request).await.unwrap();

        let call = &runner.calls()[0];
        let workdir = call.iter().position(|t| t == "--workdir").unwrap();
        assert_eq!(call[workdir + 1], "/builds/app");
        assert!(!call.iter().any(|t| t.starts_with("WORKSPACE=")));
    }

    #[tokio::test]
    async fn test_masked_tokens_stay_masked_through_delegation() {
        let runner = FakeRunner::new();
        let config = AppConfig::default();
        let state = launched_state("main-c");
        let delegate = Delegate::new(&runner, &config, EngineVersion::unknown(), &state);

        let mut cmd = ArgList::from_tokens(["deploy", "--token"]);
        cmd.add_masked("s3cret");
        delegate.exec(ExecRequest::new(cmd)).await.unwrap();

        // The spawned vector carries the real token; only its final
        // position keeps the mask flag.
        let call = &runner.calls()[0];
        assert_eq!(call.last().unwrap(), "s3cret");
        let masks = &runner.masks()[0];
        assert_eq!(masks.last(), Some(&true));
        assert_eq!(masks.iter().filter(|m| **m).count(), 1);
    }
}
