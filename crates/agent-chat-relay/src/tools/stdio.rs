use std::io::{BufRead as _, BufReader, Write as _};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, unbounded};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{ToolProvider, ToolSpec};
use crate::config::ToolServerConfig;
use crate::errors::ToolProviderError;

const PROTOCOL_VERSION: &str = "2024-11-05";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Connection {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

/// Tool server reached over newline-delimited JSON-RPC on a child process's
/// stdin/stdout.
///
/// `enter` spawns the process and performs the `initialize` handshake;
/// `exit` kills it. The process lives only for the duration of one call.
pub struct StdioToolProvider {
    name: String,
    config: ToolServerConfig,
    request_timeout: Duration,
    connection: Option<Connection>,
    next_id: u64,
}

impl StdioToolProvider {
    pub fn new(name: impl Into<String>, config: ToolServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connection: None,
            next_id: 1,
        }
    }

    /// Overrides how long each request waits for its response.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<Connection, ToolProviderError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Own process group, so launchers like `uvx` go down with their server.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|err| ToolProviderError::Spawn {
                server: self.name.clone(),
                message: format!("{}: {err}", self.config.command),
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolProviderError::io(&self.name, "child stdio not captured"));
            }
        };

        let (tx, lines) = unbounded();
        let server = self.name.clone();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(server = %server, error = %err, "tool server stdout closed");
                        break;
                    }
                }
            }
        });

        Ok(Connection {
            child,
            stdin,
            lines,
        })
    }

    fn connection(&mut self) -> Result<&mut Connection, ToolProviderError> {
        let server = self.name.clone();
        self.connection
            .as_mut()
            .ok_or(ToolProviderError::NotEntered { server })
    }

    fn send(&mut self, message: &Value) -> Result<(), ToolProviderError> {
        let server = self.name.clone();
        let mut line = serde_json::to_string(message)
            .map_err(|err| ToolProviderError::protocol(&server, err.to_string()))?;
        line.push('\n');
        let connection = self.connection()?;
        connection
            .stdin
            .write_all(line.as_bytes())
            .and_then(|()| connection.stdin.flush())
            .map_err(|err| ToolProviderError::io(&server, err))
    }

    fn request(&mut self, method: &str, params: Value) -> Result<Value, ToolProviderError> {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;
        self.wait_for_response(id, method)
    }

    fn notify(&mut self, method: &str) -> Result<(), ToolProviderError> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method }))
    }

    fn wait_for_response(&mut self, id: u64, method: &str) -> Result<Value, ToolProviderError> {
        let server = self.name.clone();
        let deadline = Instant::now() + self.request_timeout;
        let connection = self.connection()?;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = || ToolProviderError::Timeout {
                server: server.clone(),
                method: method.to_string(),
            };
            if remaining.is_zero() {
                return Err(timeout());
            }
            let line = match connection.lines.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => return Err(timeout()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ToolProviderError::io(&server, "tool server closed its output"));
                }
            };
            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(_) => {
                    debug!(server = %server, line = %line, "skipping non-JSON tool server output");
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(server = %server, "skipping unrelated tool server message");
                continue;
            }
            if let Some(error) = message.get("error") {
                let detail = error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(ToolProviderError::protocol(
                    &server,
                    format!("{method} failed: {detail}"),
                ));
            }
            return message.get("result").cloned().ok_or_else(|| {
                ToolProviderError::protocol(&server, format!("{method} response has no result"))
            });
        }
    }
}

impl ToolProvider for StdioToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self) -> Result<(), ToolProviderError> {
        if self.connection.is_some() {
            return Ok(());
        }
        self.connection = Some(self.spawn()?);
        self.next_id = 1;
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "agent-chat",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )?;
        self.notify("notifications/initialized")?;
        info!(server = %self.name, command = %self.config.command, "tool server started");
        Ok(())
    }

    fn list_tools(&mut self) -> Result<Vec<ToolSpec>, ToolProviderError> {
        let result = self.request("tools/list", json!({}))?;
        let Some(tools) = result.get("tools").and_then(Value::as_array) else {
            return Err(ToolProviderError::protocol(
                &self.name,
                "tools/list result has no tools array",
            ));
        };
        let specs: Vec<ToolSpec> = tools
            .iter()
            .filter_map(|tool| {
                let name = tool.get("name").and_then(Value::as_str)?;
                let description = tool
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(ToolSpec::new(name, description))
            })
            .collect();
        debug!(server = %self.name, count = specs.len(), "tool server listed tools");
        Ok(specs)
    }

    fn exit(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        drop(connection.stdin);
        #[cfg(unix)]
        kill_process_group(&self.name, &connection.child);
        if let Err(err) = connection.child.kill() {
            debug!(server = %self.name, error = %err, "tool server already exited");
        }
        if let Err(err) = connection.child.wait() {
            warn!(server = %self.name, error = %err, "failed to reap tool server");
        }
        info!(server = %self.name, "tool server stopped");
    }
}

#[cfg(unix)]
fn kill_process_group(server: &str, child: &Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(server = %server, error = %err, "failed to kill tool server process group"),
    }
}

impl Drop for StdioToolProvider {
    fn drop(&mut self) {
        self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolScope;
    use std::collections::HashMap;

    const HANDSHAKE_AND_LIST: &str = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{}}}'
read line
read line
echo 'starting up'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"search_documentation","description":"Search docs","inputSchema":{}},{"name":"read_documentation"}]}}'
read line
"#;

    fn sh(script: &str) -> ToolServerConfig {
        ToolServerConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            env: HashMap::new(),
        }
    }

    #[test]
    fn handshake_then_lists_tools() {
        let mut provider = StdioToolProvider::new("docs", sh(HANDSHAKE_AND_LIST))
            .request_timeout(Duration::from_secs(5));
        let tools = {
            let mut scope = ToolScope::enter(&mut provider).expect("enter");
            scope.list_tools().expect("list")
        };
        assert_eq!(
            tools,
            vec![
                ToolSpec::new("search_documentation", "Search docs"),
                ToolSpec::new("read_documentation", ""),
            ]
        );
        assert!(provider.connection.is_none());
    }

    #[test]
    fn silent_server_times_out() {
        let mut provider = StdioToolProvider::new("slow", sh("sleep 5"))
            .request_timeout(Duration::from_millis(200));
        let err = ToolScope::enter(&mut provider).err();
        assert!(matches!(
            err,
            Some(ToolProviderError::Timeout { method, .. }) if method == "initialize"
        ));
        assert!(provider.connection.is_none());
    }

    #[test]
    fn error_response_is_protocol_error() {
        let script = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"bad init"}}'
read line
"#;
        let mut provider =
            StdioToolProvider::new("broken", sh(script)).request_timeout(Duration::from_secs(5));
        let err = provider.enter().err();
        provider.exit();
        assert!(matches!(
            err,
            Some(ToolProviderError::Protocol { message, .. }) if message.contains("bad init")
        ));
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let mut provider = StdioToolProvider::new(
            "missing",
            ToolServerConfig {
                command: "/nonexistent/agent-chat-tool-server".into(),
                args: Vec::new(),
                env: HashMap::new(),
            },
        );
        assert!(matches!(
            provider.enter(),
            Err(ToolProviderError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn exit_stops_processes_started_by_the_server() {
        let dir = tempfile::tempdir().expect("temp dir");
        let marker = dir.path().join("late");
        let script = r#"
(sleep 1; touch "$MARKER") &
read line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
read line
read line
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}'
read line
"#;
        let mut config = sh(script);
        config
            .env
            .insert("MARKER".into(), marker.display().to_string());
        let mut provider =
            StdioToolProvider::new("launcher", config).request_timeout(Duration::from_secs(5));
        {
            let mut scope = ToolScope::enter(&mut provider).expect("enter");
            assert!(scope.list_tools().expect("list").is_empty());
        }

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn listing_before_enter_is_rejected() {
        let mut provider = StdioToolProvider::new("idle", sh("true"));
        assert!(matches!(
            provider.list_tools(),
            Err(ToolProviderError::NotEntered { .. })
        ));
    }
}
