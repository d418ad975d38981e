use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use thiserror::Error;
use tokio::process::Command as TokioCommand;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {}", describe_duration(.after))]
    Timeout { command: String, after: Duration },

    #[error("'{command}' failed with {}", describe_exit(.code))]
    Failed { command: String, code: Option<i32> },
}

fn describe_duration(after: &Duration) -> String {
    humantime::format_duration(*after).to_string()
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

/// A program and its arguments, run without an intermediate shell unless
/// built with [`CommandSpec::shell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Runs a free-form command line through the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(target_os = "windows") {
            Self::new("cmd", ["/C", command])
        } else {
            Self::new("sh", ["-c", command])
        }
    }

    /// `<python> script/<name> <args..>`
    pub fn script<I, S>(python: &str, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![script_path(name)];
        all.extend(args.into_iter().map(Into::into));
        Self::new(python, all)
    }
}

fn script_path(name: &str) -> String {
    PathBuf::from("script").join(name).to_string_lossy().into_owned()
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs external commands to completion. The call does not return before the
/// child has exited (or has been killed and reaped).
pub trait Executor {
    fn run(
        &self,
        spec: &CommandSpec,
        cwd: &Path,
    ) -> impl Future<Output = Result<(), CommandError>>;
}

/// Spawns real child processes with the caller's stdio.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Executor for ProcessExecutor {
    async fn run(&self, spec: &CommandSpec, cwd: &Path) -> Result<(), CommandError> {
        run_command_with_timeout(spec, cwd, self.timeout).await
    }
}

pub async fn run_command_with_timeout(
    spec: &CommandSpec,
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<(), CommandError> {
    let command = spec.to_string();
    tracing::debug!(%command, cwd = %cwd.display(), "spawning");

    let mut child = TokioCommand::new(&spec.program)
        .args(&spec.args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Io {
            command: command.clone(),
            source,
        })?;

    let waited = match timeout {
        Some(duration) => {
            tokio::select! {
                result = child.wait() => result,
                _ = tokio::time::sleep(duration) => {
                    if let Err(kill_err) = child.kill().await {
                        tracing::warn!(%command, "failed to kill timed-out process: {}", kill_err);
                    }
                    let _ = child.wait().await;
                    return Err(CommandError::Timeout { command, after: duration });
                }
            }
        }
        None => child.wait().await,
    };

    let status = waited.map_err(|source| CommandError::Io {
        command: command.clone(),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Failed {
            command,
            code: status.code(),
        })
    }
}

pub fn parse_timeout(timeout_str: Option<&str>, default_timeout: Option<&str>) -> Option<Duration> {
    let timeout_to_parse = timeout_str.or(default_timeout)?;

    if timeout_to_parse == "0" || timeout_to_parse.is_empty() {
        return None;
    }

    match timeout_to_parse.parse::<humantime::Duration>() {
        Ok(duration) => Some(duration.into()),
        Err(e) => {
            tracing::warn!(
                "Invalid timeout format '{}': {}; use a duration like '5m', '30s', '1h30m'",
                timeout_to_parse,
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_prefers_explicit_value() {
        assert_eq!(
            parse_timeout(Some("30s"), Some("5m")),
            Some(Duration::from_secs(30))
        );
        assert_eq!(parse_timeout(None, Some("5m")), Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_or_garbage_timeout_disables_it() {
        assert_eq!(parse_timeout(Some("0"), None), None);
        assert_eq!(parse_timeout(Some(""), Some("1m")), None);
        assert_eq!(parse_timeout(Some("soon"), None), None);
        assert_eq!(parse_timeout(None, None), None);
    }

    #[test]
    fn script_spec_renders_like_a_command_line() {
        let spec = CommandSpec::script("python", "build.py", ["-c", "D"]);
        let expected = format!(
            "python {} -c D",
            PathBuf::from("script").join("build.py").display()
        );
        assert_eq!(spec.to_string(), expected);
    }

    #[test]
    fn failure_message_names_the_exit_code() {
        let err = CommandError::Failed {
            command: "git submodule sync".to_string(),
            code: Some(128),
        };
        assert_eq!(err.to_string(), "'git submodule sync' failed with exit code 128");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command_with_timeout(&CommandSpec::shell("exit 3"), dir.path(), None).await;
        match result {
            Err(CommandError::Failed { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_the_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        run_command_with_timeout(&CommandSpec::shell("touch marker"), dir.path(), None)
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command_with_timeout(
            &CommandSpec::shell("sleep 5"),
            dir.path(),
            Some(Duration::from_millis(50)),
        )
        .await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("relman-no-such-program", Vec::<String>::new());
        let result = run_command_with_timeout(&spec, dir.path(), None).await;
        assert!(matches!(result, Err(CommandError::Io { .. })));
    }
}
