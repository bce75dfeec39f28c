//! Process helpers shared by the CLI-based platform clients

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::errors::{PlatformError, Result};
use crate::output::{OutputSink, OutputStream};

/// Captured output of a platform CLI invocation
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> PlatformError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PlatformError::NotInstalled {
            tool: program.to_string(),
        }
    } else {
        PlatformError::CliError(format!("Failed to execute {}: {}", program, e))
    }
}

/// Run a platform CLI to completion and capture its output
pub async fn run_captured(program: &str, args: &[String], stdin: Option<&str>) -> Result<CapturedOutput> {
    debug!("Running {} {:?}", program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| spawn_error(program, e))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| PlatformError::CliError(format!("Failed to write stdin of {}: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| PlatformError::CliError(format!("Failed to wait for {}: {}", program, e)))?;

    Ok(CapturedOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run a platform CLI and fail unless it exits successfully
pub async fn run_checked(program: &str, args: &[String], stdin: Option<&str>) -> Result<String> {
    let output = run_captured(program, args, stdin).await?;
    if !output.success() {
        return Err(PlatformError::CliError(format!(
            "{} {} exited with code {}: {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            output.exit_code,
            output.stderr.trim()
        ))
        .into());
    }
    Ok(output.stdout)
}

/// Forward a pipe into the sink until EOF
///
/// Lines are decoded lossily; the pipe is drained even when a line is not
/// valid UTF-8.
async fn forward_lines<R>(pipe: R, command_id: &str, stream: OutputStream, sink: &dyn OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                sink.write_line(command_id, stream, &String::from_utf8_lossy(&buf));
            }
            Err(e) => {
                debug!("Stopped reading {:?} of '{}': {}", stream, command_id, e);
                break;
            }
        }
    }
}

/// Run a platform CLI, streaming both output streams line by line into the sink
///
/// Returns the exit code of the process (`-1` when killed by a signal).
pub async fn run_streaming(
    program: &str,
    args: &[String],
    command_id: &str,
    sink: &dyn OutputSink,
) -> Result<i32> {
    debug!("Streaming {} {:?}", program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PlatformError::CliError(format!("{} stdout not captured", program)))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PlatformError::CliError(format!("{} stderr not captured", program)))?;

    let forward_stdout = forward_lines(stdout, command_id, OutputStream::Stdout, sink);
    let forward_stderr = forward_lines(stderr, command_id, OutputStream::Stderr, sink);
    tokio::join!(forward_stdout, forward_stderr);

    let status = child
        .wait()
        .await
        .map_err(|e| PlatformError::CliError(format!("Failed to wait for {}: {}", program, e)))?;

    Ok(status.code().unwrap_or(-1))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::output::BufferSink;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_streaming_forwards_both_streams() {
        let sink = BufferSink::new();
        let code = run_streaming("sh", &sh("echo out; echo err >&2; exit 3"), "cmd", &sink)
            .await
            .unwrap();
        assert_eq!(code, 3);

        let lines = sink.lines();
        assert!(lines
            .iter()
            .any(|l| l.stream == OutputStream::Stdout && l.line == "out"));
        assert!(lines
            .iter()
            .any(|l| l.stream == OutputStream::Stderr && l.line == "err"));
    }

    #[tokio::test]
    async fn test_run_streaming_survives_undecodable_and_bulk_output() {
        let sink = BufferSink::new();
        let script = "printf 'ok\\n\\377\\n'; i=0; while [ $i -lt 3000 ]; do \
                      echo line-$i-padding-padding-padding; i=$((i+1)); done; exit 0";
        let code = run_streaming("sh", &sh(script), "bulk", &sink).await.unwrap();
        assert_eq!(code, 0);

        let lines = sink.lines();
        assert_eq!(lines.len(), 3002);
        assert_eq!(lines[0].line, "ok");
        assert_eq!(lines[1].line, "\u{FFFD}");
        assert_eq!(lines[3001].line, "line-2999-padding-padding-padding");
    }

    #[tokio::test]
    async fn test_run_captured_with_stdin() {
        let output = run_captured("sh", &sh("cat"), Some("hello")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let err = run_checked("sh", &sh("echo nope >&2; exit 1"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_installed() {
        let err = run_captured("definitely-not-a-real-binary-xyz", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::errors::DevrunError::Platform(PlatformError::NotInstalled { .. })
        ));
    }
}
