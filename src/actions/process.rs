//! Process Plugins
//!
//! Actions living outside the probe binary. Each plugin is an executable
//! named after its action id inside the plugin directory, and speaks a
//! one-shot JSON protocol:
//!
//! 1. the resolved input map is written to the plugin's stdin as JSON;
//! 2. the plugin writes one JSON object (its result) to stdout;
//! 3. a non-zero exit status marks an action-level failure, stderr holds
//!    the reason.
//!
//! # Plugin Directory Resolution
//!
//! When no directory is configured, it is resolved in this order:
//! 1. `PROBE_PLUGIN_DIR` environment variable
//! 2. `plugins/` next to the probe executable
//! 3. `./plugins` in the current directory

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::workflow::Mapping;

use super::dispatcher::{DispatchError, Dispatcher};
use super::registry::ActionRegistry;

/// Environment variable overriding the plugin directory.
pub const PLUGIN_DIR_ENV: &str = "PROBE_PLUGIN_DIR";

/// Lazily-resolved default plugin directory.
pub static DEFAULT_PLUGIN_DIR: Lazy<PathBuf> = Lazy::new(|| {
    // Priority 1: Explicit override
    if let Ok(dir) = std::env::var(PLUGIN_DIR_ENV) {
        if !dir.trim().is_empty() {
            info!("Using plugin directory from {}: {}", PLUGIN_DIR_ENV, dir);
            return PathBuf::from(dir);
        }
    }

    // Priority 2: Next to the executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let bundled = exe_dir.join("plugins");
            if bundled.is_dir() {
                info!("Using bundled plugin directory: {}", bundled.display());
                return bundled;
            }
        }
    }

    // Priority 3: Current working directory
    let cwd_path = PathBuf::from("plugins");
    info!("Using CWD plugin directory: {}", cwd_path.display());
    cwd_path
});

/// Dispatches actions to executables in a plugin directory.
#[derive(Debug, Clone)]
pub struct ProcessDispatcher {
    plugin_dir: PathBuf,
}

impl ProcessDispatcher {
    /// Creates a dispatcher serving plugins from `plugin_dir`.
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
        }
    }

    /// Creates a dispatcher over [`DEFAULT_PLUGIN_DIR`].
    pub fn from_default_dir() -> Self {
        Self::new(DEFAULT_PLUGIN_DIR.clone())
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Maps an action id to its executable.
    ///
    /// Ids are plain file names; anything that could escape the plugin
    /// directory is rejected.
    pub fn executable_for(&self, action_id: &str) -> Result<PathBuf, DispatchError> {
        let is_plain_name = !action_id.is_empty()
            && action_id != "."
            && action_id != ".."
            && !action_id.contains(['/', '\\']);

        if !is_plain_name {
            return Err(DispatchError::InvalidActionId(action_id.to_string()));
        }

        let path = self.plugin_dir.join(action_id);
        if !path.is_file() {
            return Err(DispatchError::UnknownAction(action_id.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl Dispatcher for ProcessDispatcher {
    async fn dispatch(&self, action_id: &str, input: Mapping) -> Result<Mapping, DispatchError> {
        let executable = self.executable_for(action_id)?;
        let transport = |message: String| DispatchError::Transport {
            action: action_id.to_string(),
            message,
        };

        debug!("Spawning plugin: {}", executable.display());

        let mut child = Command::new(&executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                action: action_id.to_string(),
                source,
            })?;

        let payload =
            serde_json::to_vec(&Value::Object(input)).map_err(|e| transport(e.to_string()))?;

        // Input is fed while stdout/stderr are drained; a plugin may answer
        // before it has read everything.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                // A plugin may exit without reading its input.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
            // Dropping stdin closes it and marks the input complete.
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| transport(e.to_string()))?;
        fed.map_err(|e| transport(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(DispatchError::ActionFailed {
                action: action_id.to_string(),
                message,
            });
        }

        parse_output(action_id, &output.stdout)
    }
}

/// Parses a plugin's stdout into a result map.
fn parse_output(action_id: &str, stdout: &[u8]) -> Result<Mapping, DispatchError> {
    let malformed = |message: String| DispatchError::MalformedOutput {
        action: action_id.to_string(),
        message,
    };

    match serde_json::from_slice::<Value>(stdout) {
        Ok(Value::Object(result)) => Ok(result),
        Ok(other) => Err(malformed(format!("expected a JSON object, got {}", other))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

/// Serves one builtin action over the plugin protocol.
///
/// Backs `probe builtin <action>`: reads the input object from `reader`
/// (empty input means an empty map) and writes the result to `writer`.
pub fn serve_builtin(
    registry: &ActionRegistry,
    action_id: &str,
    mut reader: impl Read,
    mut writer: impl Write,
) -> Result<(), DispatchError> {
    let transport = |message: String| DispatchError::Transport {
        action: action_id.to_string(),
        message,
    };

    let mut raw = Vec::new();
    reader
        .read_to_end(&mut raw)
        .map_err(|e| transport(e.to_string()))?;

    let input = if raw.iter().all(u8::is_ascii_whitespace) {
        Mapping::new()
    } else {
        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(input)) => input,
            Ok(_) => return Err(transport("input must be a JSON object".to_string())),
            Err(e) => return Err(transport(format!("invalid input: {}", e))),
        }
    };

    let result = registry.run(action_id, &input)?;

    serde_json::to_writer(&mut writer, &Value::Object(result))
        .map_err(|e| transport(e.to_string()))?;
    writer.flush().map_err(|e| transport(e.to_string()))
}
