//! Command runner abstraction for executing shell commands.
//!
//! `CommandRunner` is the trait the systemd, package, archive and account
//! collaborators use to reach the OS. `ShellRunner` is the production
//! implementation that spawns `sh -c`. `MockRunner` records calls and returns
//! preset responses.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::Command;
use std::rc::Rc;

/// Trait for executing shell command strings. `Err` carries stderr (or the
/// spawn error) for non-zero exits.
pub trait CommandRunner {
    fn run(&self, cmd: &str) -> Result<String, String>;
}

/// Production runner that spawns `sh -c <cmd>`.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        tracing::trace!(command = cmd, "running");
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(|e| format!("Failed to execute: {}", e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(format!("`{}` exited with {}", cmd, output.status))
            } else {
                Err(stderr)
            }
        }
    }
}

/// Quote a string for `sh` unless it is made only of safe characters.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '=' | '@' | ',')
    }) {
        return s.to_string();
    }
    let escaped = s.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

#[derive(Default)]
struct MockRunnerState {
    /// Responses for commands starting with a prefix; checked first.
    by_prefix: Vec<(String, Result<String, String>)>,
    /// Fallback queue, consumed in order.
    queued: VecDeque<Result<String, String>>,
    commands: Vec<String>,
}

/// Test double that records commands and returns pre-configured responses.
/// Clones share state, so a test can keep one handle after boxing another.
#[derive(Clone, Default)]
pub struct MockRunner {
    state: Rc<RefCell<MockRunnerState>>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        let runner = MockRunner::new();
        runner.state.borrow_mut().queued = responses.into();
        runner
    }

    /// Answer every command starting with `prefix` with `response`.
    pub fn respond_to(&self, prefix: &str, response: Result<String, String>) {
        self.state
            .borrow_mut()
            .by_prefix
            .push((prefix.to_string(), response));
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        let mut state = self.state.borrow_mut();
        state.commands.push(cmd.to_string());
        if let Some((_, response)) = state
            .by_prefix
            .iter()
            .find(|(prefix, _)| cmd.starts_with(prefix.as_str()))
        {
            return response.clone();
        }
        state.queued.pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}
