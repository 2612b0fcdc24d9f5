//! Built-in tools: local shell commands and HTTP GET.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::{Tool, ToolCapability, ToolError, ToolOutput};

/// Registered name of [`ShellTool`].
pub const SHELL_TOOL_NAME: &str = "shell";

/// Registered name of [`HttpGetTool`].
pub const HTTP_GET_TOOL_NAME: &str = "http_get";

/// Maximum output length kept from a tool, in bytes.
const MAX_OUTPUT_LENGTH: usize = 100_000;

/// Default timeout for command execution in seconds.
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Runs its input as a `sh -c` command.
///
/// Exit code zero yields trimmed stdout; any other exit code is an error
/// output that still carries stdout.
pub struct ShellTool {
    timeout: Duration,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellTool {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        SHELL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a POSIX shell command; input is the command line, result is its stdout"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Shell
    }

    async fn invoke(&self, input: &str) -> Result<ToolOutput, ToolError> {
        if input.trim().is_empty() {
            return Err(ToolError::InvalidInput("empty command".to_string()));
        }

        let child = Command::new("sh")
            .arg("-c")
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to spawn sh: {}", e)))?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ToolError::ExecutionFailed(format!("Error reading output: {}", e)))?;

        let stdout = truncate(String::from_utf8_lossy(&output.stdout).trim_end());
        if output.status.success() {
            return Ok(ToolOutput::stdout(stdout));
        }

        let stderr = truncate(String::from_utf8_lossy(&output.stderr).trim_end());
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut failed = ToolOutput::error(format!("exit code {}: {}", code, stderr));
        if !stdout.is_empty() {
            failed.stdout = Some(stdout);
        }
        Ok(failed)
    }
}

/// Fetches a URL and returns the response body.
pub struct HttpGetTool {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpGetTool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGetTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        HTTP_GET_TOOL_NAME
    }

    fn description(&self) -> &str {
        "HTTP GET a URL; input is the URL, result is the response body"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Network
    }

    async fn invoke(&self, input: &str) -> Result<ToolOutput, ToolError> {
        let url = input.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidInput(format!(
                "expected an http(s) URL, got '{}'",
                url
            )));
        }

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to read body: {}", e)))?;
        let body = truncate(&body);

        if status.is_success() {
            Ok(ToolOutput::ok(body))
        } else {
            let mut failed = ToolOutput::error(format!("HTTP {}", status.as_u16()));
            failed.stdout = Some(body);
            Ok(failed)
        }
    }
}

/// Truncates to [`MAX_OUTPUT_LENGTH`] bytes on a char boundary.
fn truncate(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_LENGTH {
        return text.to_string();
    }
    let mut end = MAX_OUTPUT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
