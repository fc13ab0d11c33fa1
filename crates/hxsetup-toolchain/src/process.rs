use std::{ffi::OsString, process::Stdio};

use async_trait::async_trait;
use tokio::{io::AsyncReadExt, process::Command};
use tracing::{debug, info};

use crate::error::{Result, ToolchainError};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Return the output instead of failing on a non-zero exit.
    pub ignore_return_code: bool,
    /// Extra environment for the child on top of the inherited one.
    pub env: Vec<(String, OsString)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        opts: &RunOptions,
    ) -> Result<ProcessOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        opts: &RunOptions,
    ) -> Result<ProcessOutput> {
        info!("[command] {program} {}", args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ToolchainError::Process {
            program: program.to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stderr {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = child.wait().await.map_err(|source| ToolchainError::Process {
            program: program.to_string(),
            source,
        })?;
        let output = ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).to_string(),
            stderr: String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).to_string(),
            exit_code: status.code(),
        };
        debug!("{program} exited with {status}");

        if !status.success() && !opts.ignore_return_code {
            return Err(ToolchainError::ProcessFailed {
                program: program.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = SystemRunner
            .run("echo", &["hello".to_string()], &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn non_zero_exit_fails_unless_ignored() {
        let args = vec!["-c".to_string(), "echo bad >&2; exit 3".to_string()];
        let err = SystemRunner
            .run("sh", &args, &RunOptions::default())
            .await
            .unwrap_err();
        match err {
            ToolchainError::ProcessFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error {other}"),
        }

        let opts = RunOptions {
            ignore_return_code: true,
            ..RunOptions::default()
        };
        let out = SystemRunner.run("sh", &args, &opts).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn extra_env_reaches_child() {
        let opts = RunOptions {
            env: vec![("HXSETUP_CHILD_VAR".into(), "neko".into())],
            ..RunOptions::default()
        };
        let args = vec!["-c".to_string(), "printf %s \"$HXSETUP_CHILD_VAR\"".to_string()];
        let out = SystemRunner.run("sh", &args, &opts).await.unwrap();
        assert_eq!(out.stdout, "neko");
    }
}
