//! Line-oriented stdio server exposing the single `generate_pptx` tool.
//!
//! One JSON-RPC message per line on stdin, one response per line on
//! stdout. Logging stays on stderr so the transport is never polluted.

mod wire;

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::{application::deck::DeckService, util::rfc3339};

use wire::{
    ErrorObject, GeneratePptxArgs, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
    Request, Response, ToolCallParams, ToolResult,
};

const SOURCE: &str = "mcp::server";
const PROTOCOL_VERSION: &str = "2024-11-05";
const TOOL_NAME: &str = "generate_pptx";

pub struct McpServer {
    service: Arc<DeckService>,
}

impl McpServer {
    pub fn new(service: Arc<DeckService>) -> Self {
        Self { service }
    }

    /// Serve requests until the reader reaches end-of-file.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<(), std::io::Error>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut payload = serde_json::to_vec(&response)?;
            payload.push(b'\n');
            writer.write_all(&payload).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<Response> {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!(target = SOURCE, error = %err, "discarding unparseable request line");
                return Some(Response::failure(
                    Value::Null,
                    ErrorObject::new(PARSE_ERROR, format!("parse error: {err}")),
                ));
            }
        };

        let Some(id) = request.id else {
            // Notifications get no reply.
            debug!(target = SOURCE, method = %request.method, "notification received");
            return None;
        };

        let response = match self.dispatch(&request.method, request.params).await {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        };
        Some(response)
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, ErrorObject> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": [{
                    "name": TOOL_NAME,
                    "description": "Generate a PPTX slide deck from Marp Markdown and return a time-limited download link.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "markdown": {
                                "type": "string",
                                "description": "Marp Markdown content with optional front-matter controlling theme",
                            },
                        },
                        "required": ["markdown"],
                    },
                }],
            })),
            "tools/call" => self.call_tool(params).await,
            other => Err(ErrorObject::new(
                METHOD_NOT_FOUND,
                format!("method `{other}` is not supported"),
            )),
        }
    }

    async fn call_tool(&self, params: Value) -> Result<Value, ErrorObject> {
        let call: ToolCallParams = serde_json::from_value(params).map_err(|err| {
            ErrorObject::new(INVALID_PARAMS, format!("invalid tool call parameters: {err}"))
        })?;

        if call.name != TOOL_NAME {
            return Err(ErrorObject::new(
                INVALID_PARAMS,
                format!("unknown tool `{}`", call.name),
            ));
        }

        let args: GeneratePptxArgs = serde_json::from_value(call.arguments).map_err(|err| {
            ErrorObject::new(INVALID_PARAMS, format!("invalid tool arguments: {err}"))
        })?;

        let result = match self.service.generate(&args.markdown).await {
            Ok(link) => ToolResult::text(format!(
                "Slide deck generated.\nfile: {}\ntype: {}\nurl: {}\nexpires: {}",
                link.filename,
                link.content_type,
                link.url,
                rfc3339(link.expires_at),
            )),
            Err(err) => ToolResult::error(err.to_string()),
        };

        serde_json::to_value(result)
            .map_err(|err| ErrorObject::new(INTERNAL_ERROR, format!("encoding failure: {err}")))
    }
}
