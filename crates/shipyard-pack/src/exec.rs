//! Running package commands.
//!
//! Process execution sits behind [`CommandRunner`] so that callers can be
//! exercised without spawning processes.

use std::path::{Path, PathBuf};
use std::process::Command;

use shipyard_core::Locator;
use shipyard_store::PackageService;

use crate::archive::{package_path, unpack_if_not_unpacked};
use crate::config::read_config_package;
use crate::error::{PackError, Result};
use crate::manifest::open_manifest;

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Program followed by its arguments.
    pub args: Vec<String>,
    /// The complete process environment.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub dir: PathBuf,
}

/// Runs an invocation and returns its combined output.
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion.
    ///
    /// # Errors
    ///
    /// Returns `PackError::CommandFailed` carrying the captured output if the
    /// process exits unsuccessfully, or an I/O error if it cannot be spawned.
    fn run(&self, invocation: &CommandInvocation) -> Result<Vec<u8>>;
}

/// [`CommandRunner`] that spawns real processes.
///
/// The environment is cleared and replaced with the invocation's. Output is
/// stdout followed by stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &CommandInvocation) -> Result<Vec<u8>> {
        let (program, args) = invocation
            .args
            .split_first()
            .ok_or_else(|| PackError::InvalidArgument("empty command".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .env_clear()
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&invocation.dir)
            .output()
            .map_err(|e| PackError::io(format!("failed to run {program}"), e))?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        if !output.status.success() {
            return Err(PackError::CommandFailed {
                command: invocation.args.join(" "),
                status: output.status.to_string(),
                output: combined,
            });
        }
        Ok(combined)
    }
}

/// Run the manifest command `command` of package `loc`.
///
/// The package is unpacked under `storage_dir` if needed. The process runs in
/// the unpacked directory with the manifest's argument vector followed by
/// `exec_args`. Its environment holds the host `PATH` plus every binding of
/// the configuration package `config`, if given.
///
/// # Errors
///
/// Returns `PackError::NotFound` if the command is not declared, an I/O
/// error if unpacking or spawning fails, and `PackError::CommandFailed`
/// (with the captured output) if the command fails.
pub fn execute_package_command<S: PackageService + ?Sized>(
    service: &S,
    runner: &dyn CommandRunner,
    command: &str,
    loc: &Locator,
    config: Option<&Locator>,
    exec_args: &[String],
    storage_dir: &Path,
) -> Result<Vec<u8>> {
    let dir = package_path(storage_dir, loc)?;
    unpack_if_not_unpacked(service, loc, &dir)?;

    let manifest = open_manifest(&dir)?;
    let spec = manifest.command(command)?;

    let mut env = vec![(
        "PATH".to_string(),
        std::env::var_os("PATH")
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
    )];
    if let Some(config) = config {
        let (_, reader) = service.read_package(config)?;
        env.extend(read_config_package(reader)?);
    }

    let invocation = CommandInvocation {
        args: spec.args.iter().chain(exec_args).cloned().collect(),
        env,
        dir,
    };

    tracing::info!(package = %loc, command, args = ?invocation.args, "Running package command");
    runner.run(&invocation).map_err(|e| {
        tracing::warn!(package = %loc, command, error = %e, "Package command failed");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::configure_package;
    use crate::test_utils::{app_manifest, store_with_package, RecordingRunner};
    use shipyard_core::Labels;
    use tempfile::TempDir;

    fn loc(s: &str) -> Locator {
        s.parse().unwrap()
    }

    #[test]
    fn resolves_command_environment_and_directory() {
        let (store, app) = store_with_package("app/web:1.0.0", &app_manifest(), Labels::new());
        let conf = loc("app/web-config:1.0.0");
        configure_package(
            &store,
            &app,
            &conf,
            &["--domain".to_string(), "example.com".to_string()],
            &Labels::new(),
        )
        .unwrap();
        let storage = TempDir::new().unwrap();
        let runner = RecordingRunner::new(b"ok".to_vec());

        let output = execute_package_command(
            &store,
            &runner,
            "hook",
            &app,
            Some(&conf),
            &["--dry-run".to_string()],
            storage.path(),
        )
        .unwrap();
        assert_eq!(output, b"ok");

        let invocation = runner.last().unwrap();
        assert_eq!(invocation.args, vec!["/bin/sh", "hook.sh", "--dry-run"]);
        assert_eq!(invocation.dir, storage.path().join("app/web/1.0.0"));
        assert_eq!(invocation.env[0].0, "PATH");
        assert!(invocation
            .env
            .contains(&("DOMAIN".to_string(), "example.com".to_string())));
    }

    #[test]
    fn undeclared_command_is_not_found() {
        let (store, app) = store_with_package("app/web:1.0.0", &app_manifest(), Labels::new());
        let storage = TempDir::new().unwrap();
        let runner = RecordingRunner::new(Vec::new());

        let err = execute_package_command(&store, &runner, "missing", &app, None, &[], storage.path())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(runner.last().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_output_on_failure() {
        let dir = TempDir::new().unwrap();
        let invocation = CommandInvocation {
            args: vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "echo out; echo err >&2; exit 3".to_string(),
            ],
            env: vec![("PATH".to_string(), "/bin:/usr/bin".to_string())],
            dir: dir.path().to_path_buf(),
        };

        let err = ProcessRunner.run(&invocation).unwrap_err();
        assert!(matches!(err, PackError::CommandFailed { .. }));
        assert_eq!(err.output(), Some(&b"out\nerr\n"[..]));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_uses_only_given_environment() {
        let dir = TempDir::new().unwrap();
        let invocation = CommandInvocation {
            args: vec!["/bin/sh".to_string(), "-c".to_string(), "echo \"$GREETING\"; pwd".to_string()],
            env: vec![("GREETING".to_string(), "hello".to_string())],
            dir: dir.path().to_path_buf(),
        };

        let output = String::from_utf8(ProcessRunner.run(&invocation).unwrap()).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("hello"));
        assert!(lines.next().is_some());
    }

    #[test]
    fn process_runner_rejects_empty_command() {
        let invocation = CommandInvocation {
            args: Vec::new(),
            env: Vec::new(),
            dir: PathBuf::from("."),
        };
        assert!(matches!(
            ProcessRunner.run(&invocation),
            Err(PackError::InvalidArgument(_))
        ));
    }
}
