//! Stdio JSON-RPC query server.
//!
//! `steward serve` runs a long-lived, read-only query process over the
//! file-backed stores, speaking JSON-RPC 2.0 with Content-Length framing
//! (byte lengths, not char counts). Tools:
//! - `search_observations`: filter the session journal
//! - `observation_stats`: aggregate counters for the current session
//! - `get_session` / `list_sessions`: latest and archived summaries
//! - `fork_pipeline` / `merge_fork`: scratch copies of pipeline state,
//!   process-local only (see [`forkmap`])
//!
//! Requests without an id are notifications and get no response.

pub mod forkmap;

pub use forkmap::ForkMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::config::StewardConfig;
use crate::pipeline::PipelineStore;
use crate::project::ProjectPaths;
use crate::session::{ObservationRecord, SessionStore};
use crate::summary::{SummaryDoc, SummaryStore};

const SERVER_NAME: &str = "steward-memory";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: &str = "2024-11-05";
const DEFAULT_OBSERVATION_LIMIT: usize = 20;
const DEFAULT_SESSION_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Read one Content-Length framed message. `None` on clean EOF.
pub async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
        {
            content_length = Some(value.parse().context("invalid Content-Length header")?);
        }
    }

    let len = content_length.context("frame without Content-Length header")?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write one framed message. The header length is in bytes.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// The query server. Message handling is synchronous; only the stdio
/// framing is async.
pub struct Server {
    paths: ProjectPaths,
    config: StewardConfig,
    forks: ForkMap,
}

impl Server {
    pub fn new(paths: ProjectPaths, config: StewardConfig) -> Self {
        Self {
            paths,
            config,
            forks: ForkMap::new(),
        }
    }

    /// Serve until stdin closes.
    pub async fn run(&mut self) -> Result<()> {
        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();

        while let Some(body) = read_frame(&mut stdin).await? {
            let request: RpcRequest = match serde_json::from_slice(&body) {
                Ok(req) => req,
                Err(err) => {
                    tracing::warn!(%err, "dropping unparseable frame");
                    continue;
                }
            };
            if let Some(response) = self.handle(request) {
                let rendered = serde_json::to_vec(&response)?;
                write_frame(&mut stdout, &rendered).await?;
            }
        }
        Ok(())
    }

    /// Dispatch one message. Notifications (no id) produce no response.
    pub fn handle(&mut self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id?;
        let response = match request.method.as_str() {
            "initialize" => RpcResponse::ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
                }),
            ),
            "ping" => RpcResponse::ok(id, json!({})),
            "tools/list" => RpcResponse::ok(id, json!({"tools": tool_definitions()})),
            "tools/call" => {
                let params = request.params.unwrap_or_else(|| json!({}));
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(RpcResponse::err(id, -32602, "Missing tool name"));
                };
                let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                RpcResponse::ok(id, self.call_tool(name, &args))
            }
            other => RpcResponse::err(id, -32601, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn call_tool(&mut self, name: &str, args: &Value) -> Value {
        match name {
            "search_observations" => self.search_observations(args),
            "observation_stats" => self.observation_stats(),
            "get_session" => self.get_session(args),
            "list_sessions" => self.list_sessions(args),
            "fork_pipeline" => self.fork_pipeline(args),
            "merge_fork" => self.merge_fork(args),
            other => error_result(format!("Unknown tool: {other}")),
        }
    }

    fn search_observations(&self, args: &Value) -> Value {
        let kind = args.get("type").and_then(Value::as_str);
        let file = args.get("file").and_then(Value::as_str);
        let query = args.get("query").and_then(Value::as_str);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_OBSERVATION_LIMIT);

        let matches: Vec<String> = SessionStore::new(&self.paths)
            .observations()
            .read_all()
            .into_iter()
            .filter(|obs| kind.is_none_or(|k| obs.kind.as_str() == k))
            .filter(|obs| {
                file.is_none_or(|f| obs.file.as_deref().is_some_and(|path| path.contains(f)))
            })
            .filter(|obs| query.is_none_or(|q| observation_text(obs).contains(q)))
            .take(limit)
            .map(|obs| format_observation(&obs))
            .collect();

        if matches.is_empty() {
            text_result("No matching observations.")
        } else {
            text_result(&matches.join("\n"))
        }
    }

    fn observation_stats(&self) -> Value {
        let stats = SessionStore::new(&self.paths).observations().stats();
        let mut lines = vec![format!("# Observation stats ({} total)", stats.total)];
        lines.push(format!("- files modified: {}", stats.files_modified.len()));
        lines.push(format!("- commands run (recent): {}", stats.commands_run.len()));
        lines.push(format!("- skills used: {}", stats.skills_used.len()));
        if !stats.files_modified.is_empty() {
            lines.push(format!("- files: {}", stats.files_modified.join(", ")));
        }
        text_result(&lines.join("\n"))
    }

    fn get_session(&self, args: &Value) -> Value {
        let store = SummaryStore::new(&self.paths);
        let wanted = args.get("session_id").and_then(Value::as_str);

        let found = match wanted {
            None => store.load_latest(),
            Some(id) => store
                .load_latest()
                .filter(|doc| doc.session_id == id)
                .or_else(|| {
                    store
                        .list_archived()
                        .into_iter()
                        .find(|doc| doc.session_id == id)
                }),
        };
        match found {
            Some(doc) => text_result(&format_session_detail(&doc)),
            None => text_result("Session not found."),
        }
    }

    fn list_sessions(&self, args: &Value) -> Value {
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_SESSION_LIMIT);
        let store = SummaryStore::new(&self.paths);

        let mut sessions = store.list_archived();
        sessions.extend(store.load_latest());
        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        let lines: Vec<String> = sessions
            .iter()
            .take(limit)
            .map(|doc| {
                format!(
                    "[{}] {} ({})",
                    doc.completed_at.format("%Y-%m-%d %H:%M"),
                    doc.summary.request,
                    doc.session_id
                )
            })
            .collect();
        if lines.is_empty() {
            text_result("No stored sessions.")
        } else {
            text_result(&lines.join("\n"))
        }
    }

    fn fork_pipeline(&mut self, args: &Value) -> Value {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("scratch");
        let state = PipelineStore::new(&self.paths, &self.config)
            .load()
            .and_then(|status| serde_json::to_value(status).ok())
            .unwrap_or_else(|| json!({}));
        let fork_id = self.forks.fork(name, state);
        text_result(&format!("fork created: {fork_id}"))
    }

    fn merge_fork(&mut self, args: &Value) -> Value {
        let Some(fork_id) = args.get("fork_id").and_then(Value::as_str) else {
            return error_result("Missing fork_id".to_string());
        };
        if let Some(updates) = args.get("updates") {
            self.forks.update(fork_id, updates.clone());
        }
        match self.forks.take(fork_id) {
            Some(_) => text_result(&format!("fork merged: {fork_id}")),
            None => error_result(format!("Unknown fork: {fork_id}")),
        }
    }
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "search_observations",
            "description": "Search the current session's tool-use journal.",
            "inputSchema": {"type": "object", "properties": {
                "type": {"type": "string", "enum": ["write", "bash", "skill"]},
                "file": {"type": "string"},
                "query": {"type": "string"},
                "limit": {"type": "number", "default": DEFAULT_OBSERVATION_LIMIT}
            }}
        },
        {
            "name": "observation_stats",
            "description": "Aggregate counters over the current session's journal.",
            "inputSchema": {"type": "object", "properties": {}}
        },
        {
            "name": "get_session",
            "description": "Detailed summary of one session (latest when session_id is omitted).",
            "inputSchema": {"type": "object", "properties": {
                "session_id": {"type": "string"}
            }}
        },
        {
            "name": "list_sessions",
            "description": "Recent session summaries, newest first.",
            "inputSchema": {"type": "object", "properties": {
                "limit": {"type": "number", "default": DEFAULT_SESSION_LIMIT}
            }}
        },
        {
            "name": "fork_pipeline",
            "description": "Create a process-local scratch copy of pipeline state.",
            "inputSchema": {"type": "object", "properties": {
                "name": {"type": "string"}
            }}
        },
        {
            "name": "merge_fork",
            "description": "Apply updates to a fork and consume it.",
            "inputSchema": {"type": "object", "properties": {
                "fork_id": {"type": "string"},
                "updates": {"type": "object"}
            }}
        }
    ])
}

fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

fn error_result(text: String) -> Value {
    json!({"isError": true, "content": [{"type": "text", "text": text}]})
}

fn observation_text(obs: &ObservationRecord) -> String {
    [
        obs.file.as_deref(),
        obs.command.as_deref(),
        obs.skill.as_deref(),
        obs.observation_type.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}

fn format_observation(obs: &ObservationRecord) -> String {
    let mut parts = vec![format!("[{}]", obs.ts.format("%H:%M:%S"))];
    parts.push(
        obs.observation_type
            .clone()
            .unwrap_or_else(|| obs.kind.as_str().to_string()),
    );
    if let Some(file) = &obs.file {
        parts.push(file.clone());
    }
    if let Some(command) = &obs.command {
        parts.push(command.chars().take(80).collect());
    }
    if let Some(skill) = &obs.skill {
        parts.push(format!("skill:{skill}"));
    }
    if !obs.concepts.is_empty() {
        parts.push(format!("({})", obs.concepts.join(", ")));
    }
    parts.join(" ")
}

fn format_session_detail(doc: &SummaryDoc) -> String {
    let mut lines = vec![
        format!("# Session {}", doc.session_id),
        format!(
            "Completed: {} | source: {}",
            doc.completed_at.format("%Y-%m-%d %H:%M"),
            doc.source
        ),
        String::new(),
        format!("## Request\n{}", doc.summary.request),
    ];
    if !doc.summary.completed.is_empty() {
        lines.push(format!(
            "\n## Completed\n{}",
            doc.summary
                .completed
                .iter()
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    if !doc.summary.next_steps.is_empty() {
        lines.push(format!(
            "\n## Next steps\n{}",
            doc.summary
                .next_steps
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    lines.push(format!(
        "\n## Stats\n- tool uses: {}\n- files modified: {}",
        doc.stats.tool_uses,
        doc.stats.files_modified.len()
    ));
    lines.join("\n")
}
