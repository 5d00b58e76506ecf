use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use wx_common::{Command, PipelineError, Result};

const STDERR_TAIL_BYTES: usize = 1024;

/// What one subprocess invocation produced, independent of whether it ran
/// for real or was short-circuited by dry-run.
pub struct StepOutput {
    pub duration: Duration,
    pub exit_code: i32,
    pub stderr_tail: String,
}

/// Executes the structured commands each pipeline stage builds. Never
/// retries internally — a failed step is the stage's problem to decide
/// what to do about, not the runner's.
pub struct StepRunner {
    dry_run: bool,
}

impl StepRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Runs `cmd` for `step`. In dry-run mode the subprocess never starts;
    /// instead `dry_run_outputs` are touched as empty placeholder files so
    /// downstream stages see the expected files without doing the work.
    pub async fn run(
        &self,
        step: &str,
        cmd: &Command,
        dry_run_outputs: &[&Path],
    ) -> Result<StepOutput> {
        let start = Instant::now();

        if self.dry_run {
            for path in dry_run_outputs {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, b"").await?;
            }
            debug!(step, command = %cmd.display_argv(), "dry-run: wrote placeholder outputs instead of invoking subprocess");
            return Ok(StepOutput {
                duration: start.elapsed(),
                exit_code: 0,
                stderr_tail: String::new(),
            });
        }

        let mut command = TokioCommand::new(&cmd.program);
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());
        // If this step's future is dropped mid-await (run cancelled by a
        // signal), make sure the child doesn't keep running unsupervised.
        command.kill_on_drop(true);

        debug!(step, command = %cmd.display_argv(), "spawning subprocess");
        let mut child = command.spawn().map_err(|e| PipelineError::StageFailed {
            stage: step.to_string(),
            message: format!("failed to spawn {}: {e}", cmd.program),
        })?;

        let mut stderr_buf = Vec::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_end(&mut stderr_buf).await;
        }

        let status = child.wait().await.map_err(|e| PipelineError::StageFailed {
            stage: step.to_string(),
            message: format!("failed waiting on {}: {e}", cmd.program),
        })?;

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);
        let tail = tail_utf8(&stderr_buf, STDERR_TAIL_BYTES);

        if !status.success() {
            return Err(PipelineError::StepExitFailure {
                step: step.to_string(),
                status: exit_code,
                tail,
            });
        }

        info!(step, duration_ms = duration.as_millis(), "step completed");
        Ok(StepOutput {
            duration,
            exit_code,
            stderr_tail: tail,
        })
    }
}

fn tail_utf8(buf: &[u8], max_bytes: usize) -> String {
    let start = buf.len().saturating_sub(max_bytes);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wx_common::Command;

    #[tokio::test]
    async fn successful_step_returns_zero_exit() {
        let runner = StepRunner::new(false);
        let cmd = Command::new("/bin/true");
        let out = runner.run("download", &cmd, &[]).await.unwrap();
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn failing_step_surfaces_stderr_tail() {
        let runner = StepRunner::new(false);
        let cmd = Command::new("/bin/sh")
            .arg("-c")
            .arg("echo boom 1>&2; exit 7");
        let err = runner.run("processing", &cmd, &[]).await.unwrap_err();
        match err {
            PipelineError::StepExitFailure { status, tail, .. } => {
                assert_eq!(status, 7);
                assert!(tail.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dry_run_writes_placeholders_without_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let out_path = tmp.path().join("tile.png");
        let runner = StepRunner::new(true);
        let cmd = Command::new("/does/not/exist");
        let out = runner.run("tile_generation", &cmd, &[&out_path]).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out_path.exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_stage_failure_not_a_panic() {
        let runner = StepRunner::new(false);
        let cmd = Command::new("/does/not/exist/binary");
        let err = runner.run("colormap", &cmd, &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageFailed { .. }));
    }
}
