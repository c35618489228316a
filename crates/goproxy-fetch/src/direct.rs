//! Direct-path toolchain invocation.
//!
//! The direct path shells out to a locally installed `go` binary. It
//! is modeled as a `ToolchainRunner` trait so tests can supply canned
//! JSON without actually launching a process, the same pattern the
//! corpus uses for its own registry/process collaborators.

use async_trait::async_trait;
use goproxy_core::context::FetchContext;
use goproxy_core::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Output of a single subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The `go` toolchain as an injectable collaborator.
#[async_trait]
pub trait ToolchainRunner: Send + Sync {
    async fn run(
        &self,
        ctx: &FetchContext,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<CommandOutput>;
}

/// Real `ToolchainRunner` backed by `tokio::process::Command`.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    go_bin: String,
}

impl SubprocessRunner {
    pub fn new(go_bin: impl Into<String>) -> Self {
        Self {
            go_bin: go_bin.into(),
        }
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new("go")
    }
}

#[async_trait]
impl ToolchainRunner for SubprocessRunner {
    async fn run(
        &self,
        ctx: &FetchContext,
        args: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(&self.go_bin);
        command
            .args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| Error::internal(e.to_string()))?;
        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let wait = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let (_, _, status) = tokio::try_join!(
                async {
                    stdout_pipe
                        .read_to_string(&mut stdout)
                        .await
                        .map_err(|e| Error::internal(e.to_string()))
                },
                async {
                    stderr_pipe
                        .read_to_string(&mut stderr)
                        .await
                        .map_err(|e| Error::internal(e.to_string()))
                },
                async { child.wait().await.map_err(|e| Error::internal(e.to_string())) },
            )?;
            Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: status.code().unwrap_or(-1),
            })
        };

        ctx.race(wait).await
    }
}

/// Builds the derived environment the direct path passes to the
/// toolchain: a fresh `GOPROXY=direct`/`GOSUMDB=off` world that cannot
/// see the caller's own proxy/sumdb intent, rooted at `temp_dir` for
/// cache/path/tmp.
pub fn derived_env(temp_dir: &Path, extra: &HashMap<String, String>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = extra.clone();
    for key in ["GOPROXY", "GONOPROXY", "GOSUMDB", "GONOSUMDB", "GOPRIVATE"] {
        env.remove(key);
    }
    env.insert("GOPROXY".to_string(), "direct".to_string());
    env.insert("GONOPROXY".to_string(), String::new());
    env.insert("GOSUMDB".to_string(), "off".to_string());
    env.insert("GONOSUMDB".to_string(), String::new());
    env.insert("GOPRIVATE".to_string(), String::new());
    env.insert("GO111MODULE".to_string(), "on".to_string());
    env.insert("GOCACHE".to_string(), temp_dir.display().to_string());
    env.insert("GOPATH".to_string(), temp_dir.display().to_string());
    env.insert("GOTMPDIR".to_string(), temp_dir.display().to_string());
    env
}

/// Extracts a usable error message from a failed subprocess invocation:
/// prefer a JSON `Error` field on stdout, else fall back to stderr;
/// strip noisy `go: finding` lines and leading `go: `/`go list -m: `
/// prefixes.
pub fn classify_failure(output: &CommandOutput) -> Error {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&output.stdout) {
        if let Some(message) = value.get("Error").and_then(|v| v.as_str()) {
            return Error::not_found(clean_message(message));
        }
    }
    if !output.stderr.trim().is_empty() {
        return Error::not_found(clean_message(&output.stderr));
    }
    Error::not_found("go command failed with no diagnostic output")
}

fn clean_message(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("go: finding"))
        .map(strip_go_prefix)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn strip_go_prefix(line: &str) -> &str {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("go list -m: ")
        .or_else(|| trimmed.strip_prefix("go: "))
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_env_overrides_proxy_variables() {
        let dir = Path::new("/tmp/goproxy-test");
        let mut extra = HashMap::new();
        extra.insert("GOPROXY".to_string(), "https://leaked".to_string());
        let env = derived_env(dir, &extra);
        assert_eq!(env.get("GOPROXY"), Some(&"direct".to_string()));
        assert_eq!(env.get("GOSUMDB"), Some(&"off".to_string()));
        assert_eq!(env.get("GONOPROXY"), Some(&String::new()));
        assert_eq!(env.get("GOCACHE"), Some(&dir.display().to_string()));
    }

    #[test]
    fn classify_failure_prefers_json_error_field() {
        let output = CommandOutput {
            stdout: r#"{"Error":"go: finding module example.com/foo: not found"}"#.to_string(),
            stderr: String::new(),
            exit_code: 1,
        };
        let err = classify_failure(&output);
        assert!(err.is_not_found());
        assert!(!err.to_string().contains("finding"));
    }

    #[test]
    fn classify_failure_falls_back_to_stderr() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "go: module example.com/foo: not found\n".to_string(),
            exit_code: 1,
        };
        let err = classify_failure(&output);
        assert!(err.to_string().contains("module example.com/foo: not found"));
    }

    #[test]
    fn clean_message_strips_finding_lines_and_prefixes() {
        let raw = "go: finding module example.com/foo\ngo: module example.com/foo: not found";
        assert_eq!(clean_message(raw), "module example.com/foo: not found");
    }
}
