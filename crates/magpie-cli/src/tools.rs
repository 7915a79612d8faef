//! Stdio tool server for Magpie.
//!
//! Exposes memory operations as tools over JSON-RPC 2.0 with Content-Length
//! framing, the protocol agent hosts speak natively. One engine handle per
//! configured graph profile; every tool accepts an optional `profile`
//! argument to address a non-default graph.

use magpie_engine::MemoryEngine;
use magpie_types::config::{GraphProfile, MagpieConfig};
use magpie_types::model::{DissonanceAction, FragmentId, Role, SessionId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tokio::runtime::Runtime;

/// Refuse frames larger than this to keep a hostile host from ballooning us.
const MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Tool names advertised by `tools/list`, in dispatch order.
const TOOL_NAMES: [&str; 13] = [
    "ingest",
    "retrieve",
    "forget",
    "update",
    "resolve_dissonance",
    "list_dissonance",
    "trigger_consolidation",
    "graph_query",
    "list_profiles",
    "session_start",
    "session_append",
    "session_end",
    "session_log",
];

/// One connected engine per configured graph profile.
pub struct ToolHost {
    engines: HashMap<String, MemoryEngine>,
    profiles: Vec<GraphProfile>,
    default_profile: String,
}

impl ToolHost {
    /// Connect an engine for every configured profile.
    pub fn new(config: &MagpieConfig) -> anyhow::Result<Self> {
        if config.graph.profiles.is_empty() {
            anyhow::bail!("no graph profiles configured");
        }
        let mut engines = HashMap::new();
        for profile in &config.graph.profiles {
            let engine = MemoryEngine::connect(profile, &config.models, config.engine.clone())?;
            engines.insert(profile.name.clone(), engine);
        }
        let default_profile = if engines.contains_key(&config.graph.default_profile) {
            config.graph.default_profile.clone()
        } else {
            config.graph.profiles[0].name.clone()
        };
        Ok(Self {
            engines,
            profiles: config.graph.profiles.clone(),
            default_profile,
        })
    }

    /// Engine for a named profile, or the default when none is given.
    pub fn engine(&self, profile: Option<&str>) -> Result<&MemoryEngine, String> {
        let name = profile.unwrap_or(&self.default_profile);
        self.engines
            .get(name)
            .ok_or_else(|| format!("unknown profile '{name}'"))
    }
}

/// Serve tools over stdin/stdout until EOF.
pub fn run_tool_server(host: &ToolHost, rt: &Runtime) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    loop {
        match read_message(&mut reader) {
            Ok(Some(msg)) => {
                if let Some(resp) = handle_message(host, rt, &msg) {
                    write_message(&mut writer, &resp);
                }
            }
            Ok(None) => break,
            Err(_) => break,
        }
    }
}

/// Read one Content-Length framed JSON-RPC message. `None` means EOF.
fn read_message(reader: &mut impl BufRead) -> io::Result<Option<Value>> {
    let mut content_length: usize = 0;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        let trimmed = header.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    if content_length == 0 {
        return Ok(None);
    }
    if content_length > MAX_FRAME_BYTES {
        // Drain the body so the stream stays framed, then refuse it.
        let mut discard = [0u8; 4096];
        let mut remaining = content_length;
        while remaining > 0 {
            let take = remaining.min(discard.len());
            if reader.read_exact(&mut discard[..take]).is_err() {
                break;
            }
            remaining -= take;
        }
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {content_length} bytes (max {MAX_FRAME_BYTES})"),
        ));
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body).ok())
}

/// Write one Content-Length framed JSON-RPC message.
fn write_message(writer: &mut impl Write, msg: &Value) {
    let body = serde_json::to_string(msg).unwrap_or_default();
    let _ = write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body);
    let _ = writer.flush();
}

/// Handle one JSON-RPC message. `None` means no response (notification).
fn handle_message(host: &ToolHost, rt: &Runtime, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    match method {
        "initialize" => {
            let result = json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "magpie",
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            Some(jsonrpc_response(id?, result))
        }

        "notifications/initialized" => None,

        "tools/list" => Some(jsonrpc_response(id?, json!({ "tools": tool_catalog() }))),

        "tools/call" => {
            let params = &msg["params"];
            let tool_name = params["name"].as_str().unwrap_or("");
            if !TOOL_NAMES.contains(&tool_name) {
                return Some(jsonrpc_error(
                    id?,
                    -32602,
                    &format!("Unknown tool: {tool_name}"),
                ));
            }
            match dispatch_tool(host, rt, tool_name, &params["arguments"]) {
                Ok(text) => Some(jsonrpc_response(
                    id?,
                    json!({"content": [{"type": "text", "text": text}]}),
                )),
                Err(e) => Some(jsonrpc_response(
                    id?,
                    json!({
                        "content": [{"type": "text", "text": format!("Error: {e}")}],
                        "isError": true
                    }),
                )),
            }
        }

        _ => id.map(|id| jsonrpc_error(id, -32601, &format!("Method not found: {method}"))),
    }
}

/// Run one tool call against the addressed engine.
fn dispatch_tool(host: &ToolHost, rt: &Runtime, name: &str, args: &Value) -> Result<String, String> {
    let engine = host.engine(args["profile"].as_str())?;

    match name {
        "ingest" => {
            let text = require_str(args, "text")?;
            let role = args["role"]
                .as_str()
                .unwrap_or("user")
                .parse::<Role>()
                .map_err(|e| e.to_string())?;
            let entities = match args.get("entities") {
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            };
            let id = rt
                .block_on(engine.ingest(text, &role, entities))
                .map_err(|e| e.to_string())?;
            Ok(json!({"fragment_id": id.to_string()}).to_string())
        }

        "retrieve" => {
            let query = require_str(args, "query")?;
            let top_k = args["top_k"].as_u64().unwrap_or(5) as usize;
            let fast = args["fast"].as_bool().unwrap_or(false);
            let bundle = rt
                .block_on(engine.retrieve(query, top_k, fast))
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&bundle).map_err(|e| e.to_string())
        }

        "forget" => {
            let id = parse_fragment_id(require_str(args, "id")?)?;
            rt.block_on(engine.forget(&id)).map_err(|e| e.to_string())?;
            Ok(format!("Forgot fragment {id}"))
        }

        "update" => {
            let id = parse_fragment_id(require_str(args, "id")?)?;
            let text = require_str(args, "text")?;
            rt.block_on(engine.update(&id, text))
                .map_err(|e| e.to_string())?;
            Ok(format!("Updated fragment {id}"))
        }

        "resolve_dissonance" => {
            let id = parse_fragment_id(require_str(args, "id")?)?;
            let action = match require_str(args, "action")? {
                "accept" => DissonanceAction::Accept,
                "reject" => DissonanceAction::Reject,
                "update" => DissonanceAction::Update {
                    text: require_str(args, "text")?.to_string(),
                },
                other => {
                    return Err(format!("unknown action '{other}' (accept, reject, update)"))
                }
            };
            rt.block_on(engine.resolve_dissonance(&id, &action))
                .map_err(|e| e.to_string())?;
            Ok(format!("Resolved fragment {id}"))
        }

        "list_dissonance" => {
            let cases = rt
                .block_on(engine.list_dissonance())
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&cases).map_err(|e| e.to_string())
        }

        "trigger_consolidation" => {
            let report = rt
                .block_on(engine.consolidate_once())
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&report).map_err(|e| e.to_string())
        }

        "graph_query" => {
            let statement = require_str(args, "statement")?;
            let parameters = args.get("parameters").cloned().unwrap_or_else(|| json!({}));
            let rows = rt
                .block_on(engine.store().run(statement, &parameters))
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&rows).map_err(|e| e.to_string())
        }

        "list_profiles" => {
            // Credentials stay out of tool output.
            let profiles: Vec<Value> = host
                .profiles
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "uri": p.uri,
                        "database": p.database,
                        "user": p.user,
                        "default": p.name == host.default_profile,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&profiles).map_err(|e| e.to_string())
        }

        "session_start" => {
            let name = require_str(args, "name")?;
            let id = rt
                .block_on(engine.session_start(name))
                .map_err(|e| e.to_string())?;
            Ok(json!({"session_id": id.to_string()}).to_string())
        }

        "session_append" => {
            let session = parse_session_id(require_str(args, "session_id")?)?;
            let role = require_str(args, "role")?
                .parse::<Role>()
                .map_err(|e| e.to_string())?;
            let text = require_str(args, "text")?;
            rt.block_on(engine.session_append(&session, &role, text))
                .map_err(|e| e.to_string())?;
            Ok(format!("Appended to session {session}"))
        }

        "session_end" => {
            let session = parse_session_id(require_str(args, "session_id")?)?;
            let ingest_digest = args["ingest_digest"].as_bool().unwrap_or(false);
            let digest = rt
                .block_on(engine.session_end(&session, ingest_digest))
                .map_err(|e| e.to_string())?;
            Ok(json!({"digest_fragment_id": digest.map(|id| id.to_string())}).to_string())
        }

        "session_log" => {
            let session = parse_session_id(require_str(args, "session_id")?)?;
            let messages = rt
                .block_on(engine.session_log(&session))
                .map_err(|e| e.to_string())?;
            serde_json::to_string_pretty(&messages).map_err(|e| e.to_string())
        }

        _ => Err(format!("unknown tool '{name}'")),
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args[key]
        .as_str()
        .ok_or_else(|| format!("missing '{key}' argument"))
}

fn parse_fragment_id(raw: &str) -> Result<FragmentId, String> {
    raw.parse().map_err(|_| format!("invalid fragment id '{raw}'"))
}

fn parse_session_id(raw: &str) -> Result<SessionId, String> {
    raw.parse().map_err(|_| format!("invalid session id '{raw}'"))
}

/// Catalog entry with the shared `profile` argument injected.
fn tool_entry(name: &str, description: &str, mut schema: Value) -> Value {
    if let Some(props) = schema["properties"].as_object_mut() {
        props.insert(
            "profile".to_string(),
            json!({
                "type": "string",
                "description": "Graph profile to address (configured default when omitted)"
            }),
        );
    }
    json!({"name": name, "description": description, "inputSchema": schema})
}

fn tool_catalog() -> Vec<Value> {
    vec![
        tool_entry(
            "ingest",
            "Store a memory fragment; entities are linked immediately, embedding is deferred",
            json!({"type": "object", "properties": {
                "text": {"type": "string", "description": "Fragment text"},
                "role": {"type": "string", "description": "user, assistant, or system (default user)"},
                "entities": {"type": "array", "items": {"type": "string"}, "description": "Explicit entity names; skips extraction"}
            }, "required": ["text"]}),
        ),
        tool_entry(
            "retrieve",
            "Recall memories by fusion of episodic, abstractive, and relational strategies",
            json!({"type": "object", "properties": {
                "query": {"type": "string", "description": "Natural-language query"},
                "top_k": {"type": "integer", "description": "Episodic fragments to return (default 5)"},
                "fast": {"type": "boolean", "description": "Relational only; no embedding calls"}
            }, "required": ["query"]}),
        ),
        tool_entry(
            "forget",
            "Delete a fragment and any entities orphaned by its removal",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "description": "Fragment ID (UUID)"}
            }, "required": ["id"]}),
        ),
        tool_entry(
            "update",
            "Replace a fragment's text; it re-enters the embedding and dissonance queues",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "description": "Fragment ID (UUID)"},
                "text": {"type": "string", "description": "Replacement text"}
            }, "required": ["id", "text"]}),
        ),
        tool_entry(
            "resolve_dissonance",
            "Resolve a flagged contradiction: accept, reject, or update the fragment",
            json!({"type": "object", "properties": {
                "id": {"type": "string", "description": "Flagged fragment ID (UUID)"},
                "action": {"type": "string", "description": "accept, reject, or update"},
                "text": {"type": "string", "description": "Replacement text (update only)"}
            }, "required": ["id", "action"]}),
        ),
        tool_entry(
            "list_dissonance",
            "List fragments currently flagged as contradicting established memories",
            json!({"type": "object", "properties": {}}),
        ),
        tool_entry(
            "trigger_consolidation",
            "Run one foreground metabolism pass: one embedding, one check, one summarizer sweep",
            json!({"type": "object", "properties": {}}),
        ),
        tool_entry(
            "graph_query",
            "Execute one raw Cypher statement with parameters (power-user escape hatch)",
            json!({"type": "object", "properties": {
                "statement": {"type": "string", "description": "Cypher statement"},
                "parameters": {"type": "object", "description": "Statement parameters"}
            }, "required": ["statement"]}),
        ),
        tool_entry(
            "list_profiles",
            "List configured graph profiles (credentials excluded)",
            json!({"type": "object", "properties": {}}),
        ),
        tool_entry(
            "session_start",
            "Open a named recording session for raw conversation turns",
            json!({"type": "object", "properties": {
                "name": {"type": "string", "description": "Session name"}
            }, "required": ["name"]}),
        ),
        tool_entry(
            "session_append",
            "Append one turn to an active recording session",
            json!({"type": "object", "properties": {
                "session_id": {"type": "string", "description": "Session ID (UUID)"},
                "role": {"type": "string", "description": "user, assistant, or system"},
                "text": {"type": "string", "description": "Turn text"}
            }, "required": ["session_id", "role", "text"]}),
        ),
        tool_entry(
            "session_end",
            "Close a recording session, optionally ingesting a generated digest",
            json!({"type": "object", "properties": {
                "session_id": {"type": "string", "description": "Session ID (UUID)"},
                "ingest_digest": {"type": "boolean", "description": "Condense the transcript into a system fragment"}
            }, "required": ["session_id"]}),
        ),
        tool_entry(
            "session_log",
            "Read back a session's turns in order",
            json!({"type": "object", "properties": {
                "session_id": {"type": "string", "description": "Session ID (UUID)"}
            }, "required": ["session_id"]}),
        ),
    ]
}

fn jsonrpc_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn jsonrpc_error(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}
