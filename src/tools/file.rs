//! Sandboxed file-system handler. Every path is resolved against a
//! configured root and verified after canonicalization, so `..` hops,
//! absolute paths and symlinks cannot reach outside the sandbox.

use super::Tool;
use crate::error::{AgentError, Result};
use chrono::{DateTime, Local};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

const MAX_READ_BYTES: u64 = 10 * 1024 * 1024;
const TEXT_PREVIEW_CHARS: usize = 5000;
const CSV_PREVIEW_ROWS: usize = 5;
const LIST_CAP: usize = 10;
const SEARCH_CAP: usize = 20;
const SEARCH_MAX_DEPTH: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the router can request from the file tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Read,
    Write,
    List,
    Search,
    Info,
    Exists,
    Mkdir,
}

/// Parameters for file operations
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FileParams {
    pub op: FileOp,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

/// File tool confined to one root directory. Operations run on the
/// blocking pool under a timeout, so a stalled mount cannot hang the
/// session.
#[derive(Debug, Clone)]
pub struct FileTool {
    root: PathBuf,
    timeout: Duration,
}

impl FileTool {
    /// Build a tool rooted at `root`. The root must exist; it is
    /// canonicalized once so later containment checks compare resolved
    /// paths, not string prefixes.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            AgentError::Config(format!(
                "file root {} is not usable: {}",
                root.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            root,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve a user-supplied path inside the root, or fail with
    /// `PathEscapesRoot`. Existing paths are canonicalized (resolving
    /// symlinks); for paths still to be created the deepest existing
    /// ancestor is canonicalized and the remainder normalized lexically.
    fn confine(&self, raw: &str) -> Result<PathBuf> {
        let candidate = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.root.join(raw)
        };

        if let Ok(resolved) = candidate.canonicalize() {
            return if resolved.starts_with(&self.root) {
                Ok(resolved)
            } else {
                Err(AgentError::PathEscapesRoot(raw.to_string()))
            };
        }

        if let (Some(parent), Some(name)) = (candidate.parent(), candidate.file_name()) {
            if let Ok(resolved_parent) = parent.canonicalize() {
                return if resolved_parent.starts_with(&self.root) {
                    Ok(resolved_parent.join(name))
                } else {
                    Err(AgentError::PathEscapesRoot(raw.to_string()))
                };
            }
        }

        // Nothing on disk yet (nested mkdir): normalize `..` lexically.
        let normalized = normalize(&candidate);
        if normalized.starts_with(&self.root) {
            Ok(normalized)
        } else {
            Err(AgentError::PathEscapesRoot(raw.to_string()))
        }
    }

    fn read(&self, raw: &str) -> Result<String> {
        let path = self.confine(raw)?;
        let meta = fs::metadata(&path)
            .map_err(|_| AgentError::UnreadableFormat(format!("file not found: {}", raw)))?;
        if !meta.is_file() {
            return Err(AgentError::UnreadableFormat(format!("not a file: {}", raw)));
        }
        if meta.len() > MAX_READ_BYTES {
            return Err(AgentError::UnreadableFormat(format!(
                "file too large (over 10MB): {}",
                raw
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "json" => {
                let text = fs::read_to_string(&path)?;
                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    AgentError::UnreadableFormat(format!("malformed JSON in {}: {}", raw, e))
                })?;
                Ok(format!("JSON content:\n{}", serde_json::to_string_pretty(&value)?))
            }
            "csv" => {
                let text = fs::read_to_string(&path)?;
                let rows: Vec<&str> = text.lines().collect();
                if rows.is_empty() {
                    return Err(AgentError::UnreadableFormat(format!("empty CSV: {}", raw)));
                }
                let preview = rows
                    .iter()
                    .take(CSV_PREVIEW_ROWS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(format!(
                    "CSV content (first {} of {} rows):\n{}",
                    rows.len().min(CSV_PREVIEW_ROWS),
                    rows.len(),
                    preview
                ))
            }
            _ => {
                let bytes = fs::read(&path)?;
                let text = String::from_utf8_lossy(&bytes);
                let mut preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
                if text.chars().count() > TEXT_PREVIEW_CHARS {
                    preview.push_str("\n...(truncated)");
                }
                Ok(preview)
            }
        }
    }

    /// Write through a temp file in the destination directory, then
    /// rename over the target, so a failure mid-write never leaves a
    /// partial file behind.
    fn write(&self, raw: &str, content: &str) -> Result<String> {
        let path = self.confine(raw)?;
        let parent = path
            .parent()
            .ok_or_else(|| AgentError::PathEscapesRoot(raw.to_string()))?;
        if !parent.is_dir() {
            return Err(AgentError::UnreadableFormat(format!(
                "parent directory does not exist: {}",
                raw
            )));
        }

        let mut staging = tempfile::NamedTempFile::new_in(parent)?;
        staging.write_all(content.as_bytes())?;
        staging.persist(&path).map_err(|e| AgentError::Io(e.error))?;
        Ok(format!("saved {} ({} bytes)", raw, content.len()))
    }

    fn list(&self, raw: &str) -> Result<String> {
        let path = self.confine(raw)?;
        if !path.is_dir() {
            return Err(AgentError::UnreadableFormat(format!(
                "not a directory: {}",
                raw
            )));
        }

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                dirs.push(format!("{}/", name));
            } else {
                files.push(format!("{} ({})", name, format_size(meta.len())));
            }
        }
        dirs.sort();
        files.sort();

        if dirs.is_empty() && files.is_empty() {
            return Ok(format!("{} is empty", raw));
        }

        let total = dirs.len() + files.len();
        let shown = dirs.len().min(LIST_CAP) + files.len().min(LIST_CAP);
        let mut lines = vec![format!("{} ({} entries):", raw, total)];
        lines.extend(dirs.into_iter().take(LIST_CAP));
        lines.extend(files.into_iter().take(LIST_CAP));
        if shown < total {
            lines.push(format!("...({} more not shown)", total - shown));
        }
        Ok(lines.join("\n"))
    }

    fn search(&self, raw: &str, pattern: &str) -> Result<String> {
        let path = self.confine(raw)?;
        let pattern = Pattern::new(pattern)
            .map_err(|e| AgentError::ToolExecution(format!("bad glob pattern: {}", e)))?;

        let mut matches = Vec::new();
        walk(&path, &pattern, 0, &mut matches)?;

        if matches.is_empty() {
            return Ok(format!("no files matching {} under {}", pattern.as_str(), raw));
        }
        let listed: Vec<String> = matches
            .iter()
            .map(|hit| {
                hit.strip_prefix(&path)
                    .unwrap_or(hit)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        Ok(format!(
            "{} files matching {}:\n{}",
            listed.len(),
            pattern.as_str(),
            listed.join("\n")
        ))
    }

    fn info(&self, raw: &str) -> Result<String> {
        let path = self.confine(raw)?;
        let meta = fs::metadata(&path)
            .map_err(|_| AgentError::UnreadableFormat(format!("file not found: {}", raw)))?;

        let kind = if meta.is_dir() {
            "directory".to_string()
        } else {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!("{} file", ext))
                .unwrap_or_else(|| "file".to_string())
        };
        let modified = meta
            .modified()
            .map(|time| {
                DateTime::<Local>::from(time)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(format!(
            "{}: {}, {}, modified {}",
            raw,
            kind,
            format_size(meta.len()),
            modified
        ))
    }

    fn exists(&self, raw: &str) -> Result<String> {
        let path = self.confine(raw)?;
        Ok(match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => format!("{} exists (directory)", raw),
            Ok(_) => format!("{} exists (file)", raw),
            Err(_) => format!("{} does not exist", raw),
        })
    }

    fn mkdir(&self, raw: &str) -> Result<String> {
        let path = self.confine(raw)?;
        if path.exists() {
            return Err(AgentError::UnreadableFormat(format!(
                "already exists: {}",
                raw
            )));
        }
        fs::create_dir_all(&path)?;
        Ok(format!("created directory {}", raw))
    }

    fn run(&self, params: &FileParams) -> Result<String> {
        match params.op {
            FileOp::Read => self.read(&params.path),
            FileOp::Write => self.write(&params.path, params.content.as_deref().unwrap_or("")),
            FileOp::List => self.list(&params.path),
            FileOp::Search => self.search(&params.path, params.pattern.as_deref().unwrap_or("*")),
            FileOp::Info => self.info(&params.path),
            FileOp::Exists => self.exists(&params.path),
            FileOp::Mkdir => self.mkdir(&params.path),
        }
    }
}

impl Tool for FileTool {
    fn name(&self) -> &'static str {
        "file"
    }

    fn description(&self) -> &'static str {
        "Read, write, list, search and inspect files inside a configured root directory"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["read", "write", "list", "search", "info", "exists", "mkdir"]
                },
                "path": { "type": "string" },
                "content": { "type": "string" },
                "pattern": { "type": "string" }
            },
            "required": ["op"]
        })
    }

    fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value>> + Send + '_>> {
        Box::pin(async move {
            let params: FileParams = serde_json::from_value(parameters)
                .map_err(|e| AgentError::ToolExecution(format!("invalid parameters: {}", e)))?;
            debug!(target: "tool_agent::file", op = ?params.op, path = %params.path, "file operation");

            let tool = self.clone();
            let result = bounded(self.timeout, move || tool.run(&params)).await?;
            Ok(serde_json::Value::String(result))
        })
    }
}

/// Run a blocking file operation on the blocking pool, failing with
/// `RequestTimeout` once `limit` elapses.
async fn bounded<T, F>(limit: Duration, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(AgentError::ToolExecution(format!(
            "file task failed: {}",
            join_error
        ))),
        Err(_) => Err(AgentError::RequestTimeout(format!(
            "file operation exceeded {:?}",
            limit
        ))),
    }
}

/// Lexical normalization for not-yet-existing paths: `.` dropped, `..`
/// pops, so escapes fail the containment check instead of sneaking past.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                prefix.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    // More `..` than directories: force a non-contained path.
                    return PathBuf::new();
                }
            }
            Component::Normal(name) => parts.push(name.to_os_string()),
        }
    }
    let mut result = prefix;
    for part in parts {
        result.push(part);
    }
    result
}

fn walk(dir: &Path, pattern: &Pattern, depth: usize, matches: &mut Vec<PathBuf>) -> Result<()> {
    if depth > SEARCH_MAX_DEPTH || matches.len() >= SEARCH_CAP {
        return Ok(());
    }
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        if matches.len() >= SEARCH_CAP {
            break;
        }
        // Symlinks are skipped entirely; following one could enumerate
        // names outside the sandbox root.
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            walk(&entry.path(), pattern, depth + 1, matches)?;
        } else if pattern.matches(&entry.file_name().to_string_lossy()) {
            matches.push(entry.path());
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
