//! HTTP server for text2sql
//! Minimal HTTP handling on a tokio listener: `POST /generate-sql`, `GET /health`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use text2sql::{Config, SqlGenerator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // The blocking HTTP client must be built off the async runtime.
    let generator = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || SqlGenerator::from_config(&config)).await??
    };
    let generator = Arc::new(generator);

    info!("Starting text2sql server with engine {}", generator.engine_name());
    let listener = TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);

    loop {
        let (stream, addr) = listener.accept().await?;
        let generator = generator.clone();
        let span = info_span!("request", id = %Uuid::new_v4(), peer = %addr);
        tokio::spawn(handle_connection(stream, addr, generator).instrument(span));
    }
}

async fn handle_connection(mut stream: TcpStream, addr: SocketAddr, generator: Arc<SqlGenerator>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to read request from {}: {}", addr, e);
            return;
        }
    };

    let response = handle_request(&request, generator).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        error!("Failed to write response: {}", e);
    }
}

/// Read headers, then as much body as `Content-Length` announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let size = stream.read(&mut buffer).await?;
        if size == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..size]);

        let text = String::from_utf8_lossy(&data);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let headers = parse_headers(&text[..header_end]);
            let expected = headers
                .get("content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= header_end + 4 + expected {
                break;
            }
        }
        if data.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn parse_headers(head: &str) -> HashMap<String, String> {
    head.lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect()
}

async fn handle_request(request: &str, generator: Arc<SqlGenerator>) -> String {
    let request_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", r#"{"error":"Malformed request"}"#);
    }

    let method = parts[0];
    let mut path = parts[1].split('?').next().unwrap_or("/").trim_end_matches('/');
    if path.is_empty() {
        path = "/";
    }
    info!("{} {}", method, path);

    match (method, path) {
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("GET", "/health") => {
            let body = serde_json::json!({
                "status": "ok",
                "service": "text2sql",
                "engine": generator.engine_name(),
            });
            create_response(200, "OK", &body.to_string())
        }
        ("POST", "/generate-sql") => {
            let Some(query) = extract_query(request) else {
                return error_response(400, "Bad Request", "Missing 'query' parameter");
            };
            generate(query, generator).await
        }
        _ => error_response(404, "Not Found", "Not found"),
    }
}

fn extract_query(request: &str) -> Option<String> {
    let body = request.split_once("\r\n\r\n").map(|(_, body)| body.trim())?;
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
}

async fn generate(query: String, generator: Arc<SqlGenerator>) -> String {
    info!("Query: {}", query);
    let result = tokio::task::spawn_blocking(move || generator.generate_sql(&query)).await;

    match result {
        Ok(Ok(sql)) => {
            let body = serde_json::json!({ "sql": sql });
            create_response(200, "OK", &body.to_string())
        }
        Ok(Err(e)) if e.is_client_error() => {
            warn!("Rejected: {}", e);
            error_response(400, "Bad Request", &e.to_string())
        }
        Ok(Err(e)) => {
            error!("Generation failed: {}", e);
            error_response(500, "Internal Server Error", &e.to_string())
        }
        Err(e) => {
            error!("Generation task failed: {}", e);
            error_response(500, "Internal Server Error", "SQL generation failed")
        }
    }
}

fn error_response(status: u16, status_text: &str, message: &str) -> String {
    let body = serde_json::json!({ "error": message });
    create_response(status, status_text, &body.to_string())
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
