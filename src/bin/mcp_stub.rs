//! Minimal stand-in for a Playwright MCP server, used by integration tests.
//! Optional first argument: a file that receives one line per tools/call.
//! Flags such as `--headless` are accepted and ignored.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

fn main() {
    let call_log = std::env::args().nth(1).filter(|a| !a.starts_with("--"));
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut page = String::from("about:blank");
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        // notifications carry no id and get no reply
        let Some(id) = msg.get("id").cloned() else {
            continue;
        };
        let method = msg
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let response = match method.as_str() {
            "initialize" => json!({
                "jsonrpc":"2.0",
                "id": id,
                "result": {
                    "protocolVersion":"2024-11-05",
                    "capabilities":{"tools":{}},
                    "serverInfo":{"name":"mcp_stub","version":"0.0.0"}
                }
            }),
            "tools/list" => json!({
                "jsonrpc":"2.0",
                "id": id,
                "result": { "tools": tool_catalog() }
            }),
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(Value::Null);
                let name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                if let Some(path) = &call_log {
                    if let Ok(mut f) = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                    {
                        let _ = writeln!(f, "{name}");
                    }
                }
                json!({
                    "jsonrpc":"2.0",
                    "id": id,
                    "result": call_tool(&name, &args, &mut page)
                })
            }
            _ => json!({
                "jsonrpc":"2.0",
                "id": id,
                "error": { "code": -32601, "message":"Method not found" }
            }),
        };
        let _ = writeln!(stdout, "{}", response);
        let _ = stdout.flush();
    }
}

fn tool_catalog() -> Value {
    let target = json!({
        "type":"object",
        "properties":{"element":{"type":"string"},"ref":{"type":"string"}},
        "required":["ref"]
    });
    json!([
        {
            "name":"browser_navigate",
            "description":"Navigate to a URL",
            "inputSchema":{"type":"object","properties":{"url":{"type":"string"}},"required":["url"]}
        },
        {"name":"browser_click","description":"Click an element","inputSchema": target},
        {"name":"browser_snapshot","description":"Accessibility snapshot of the page","inputSchema":{"type":"object"}},
        {"name":"browser_take_screenshot","description":"Screenshot of the page","inputSchema":{"type":"object"}},
        {
            "name":"browser_evaluate",
            "description":"Evaluate a JavaScript function on the page",
            "inputSchema":{"type":"object","properties":{"function":{"type":"string"}},"required":["function"]}
        }
    ])
}

fn text(s: String) -> Value {
    json!({ "content": [{ "type":"text", "text": s }] })
}

fn error(s: String) -> Value {
    json!({ "content": [{ "type":"text", "text": s }], "isError": true })
}

fn call_tool(name: &str, args: &Value, page: &mut String) -> Value {
    let arg = |k: &str| args.get(k).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    match name {
        "browser_navigate" => {
            let url = arg("url");
            if url.is_empty() {
                return error("url is required".to_string());
            }
            *page = url;
            text(format!("Navigated to {page}"))
        }
        "browser_click" => {
            let r = arg("ref");
            if r == "missing" {
                error(format!("Element with ref {r} not found"))
            } else {
                text(format!("Clicked {r}"))
            }
        }
        "browser_snapshot" => text(format!(
            "- Page URL: {page}\n- heading \"Dashboard\" [ref=e1]\n- button \"Log out\" [ref=e2]"
        )),
        "browser_take_screenshot" => json!({
            "content": [
                { "type":"text", "text":"Took screenshot" },
                { "type":"image", "data": PNG_1X1, "mimeType":"image/png" }
            ]
        }),
        "browser_evaluate" => text("undefined".to_string()),
        other => error(format!("Tool \"{other}\" not found")),
    }
}
