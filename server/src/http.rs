//! One-shot HTTP/1.1 transport for IPP.
//!
//! Every connection carries exactly one request and is closed after the
//! response. POST bodies are IPP; chunked transfer encoding and
//! `Expect: 100-continue` are handled here because CUPS and the macOS
//! dialog rely on both. GET serves the liveness string and the PPD.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::ipp_service::IppService;

/// Upper bound on a request body; misbehaving clients get dropped.
const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Accept loop: one spawned handler per connection.
pub async fn serve(listener: TcpListener, service: Arc<IppService>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("accept")?;
        debug!(peer = %peer, "incoming connection");
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, service.as_ref()).await {
                warn!(peer = %peer, error = %e, "connection handler error");
            }
        });
    }
}

/// Parsed request line and headers (header names lowercased).
struct RequestHead {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Handle one request/response exchange, then let the connection close.
pub(crate) async fn handle_connection<S>(stream: S, service: &IppService) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let head = read_head(&mut reader).await?;
    debug!(method = %head.method, path = %head.path, "request");

    // Clients gate large bodies on the interim response; always wave
    // them through.
    if head
        .header("expect")
        .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
    {
        write_half.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        write_half.flush().await?;
    }

    match head.method.as_str() {
        "POST" => {
            let body = read_body(&mut reader, &head).await?;
            info!(bytes = body.len(), "IPP request body received");
            let response = service.handle_request(&body).await;
            write_response(&mut write_half, "200 OK", "application/ipp", &response).await
        }
        "GET" => handle_get(&mut write_half, &head.path, service).await,
        other => {
            debug!(method = %other, "unsupported method");
            write_response(&mut write_half, "404 Not Found", "text/plain", b"not found").await
        }
    }
}

async fn handle_get<W>(writer: &mut W, path: &str, service: &IppService) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if path == "/" {
        let body = format!(
            "IPP server is running: {}\n",
            service.config().printer_name
        );
        return write_response(writer, "200 OK", "text/plain", body.as_bytes()).await;
    }

    if path.ends_with(".ppd") {
        let ppd_path = &service.config().ppd_path;
        return match tokio::fs::read(ppd_path).await {
            Ok(bytes) => {
                // Invalid bytes are replaced; the PPD goes out as UTF-8.
                let text = String::from_utf8_lossy(&bytes).into_owned();
                write_response(writer, "200 OK", "text/plain", text.as_bytes()).await
            }
            Err(e) => {
                warn!(path = %ppd_path.display(), error = %e, "PPD not readable");
                write_response(writer, "404 Not Found", "text/plain", b"no PPD").await
            }
        };
    }

    write_response(writer, "404 Not Found", "text/plain", b"not found").await
}

/// Read the request line and headers through the blank line.
async fn read_head<R>(reader: &mut R) -> anyhow::Result<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| anyhow!("empty request line"))?
        .to_string();
    let path = parts
        .next()
        .ok_or_else(|| anyhow!("request line missing path"))?
        .to_string();

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Ok(RequestHead {
        method,
        path,
        headers,
    })
}

/// Read the request body per its framing headers.
async fn read_body<R>(reader: &mut R, head: &RequestHead) -> anyhow::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    if head
        .header("transfer-encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    {
        return read_chunked(reader).await;
    }

    if let Some(length) = head.header("content-length") {
        let length: usize = length.parse().context("content-length")?;
        if length > MAX_REQUEST_BYTES {
            bail!("request body of {length} bytes exceeds limit");
        }
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await.context("request body")?;
        return Ok(body);
    }

    // No framing: the body runs to connection close.
    let mut body = Vec::new();
    reader
        .take(MAX_REQUEST_BYTES as u64)
        .read_to_end(&mut body)
        .await?;
    Ok(body)
}

/// Decode a chunked body: hex size line, chunk, CRLF, zero-size
/// terminator, optional trailers.
async fn read_chunked<R>(reader: &mut R) -> anyhow::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader).await?;
        let size_field = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .with_context(|| format!("bad chunk size line {size_line:?}"))?;

        if size == 0 {
            // Trailer section ends at the blank line.
            loop {
                if read_line(reader).await?.is_empty() {
                    break;
                }
            }
            break;
        }

        if body.len() + size > MAX_REQUEST_BYTES {
            bail!("chunked body exceeds limit");
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await.context("chunk data")?;

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await.context("chunk terminator")?;
        if &crlf != b"\r\n" {
            bail!("chunk not terminated by CRLF");
        }
    }
    Ok(body)
}

/// One CRLF-terminated line, decoded lossily; bare LF is tolerated.
async fn read_line<R>(reader: &mut R) -> anyhow::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        bail!("connection closed mid-request");
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write a full response with the fixed header set and close semantics.
async fn write_response<W>(
    writer: &mut W,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    let head = format!(
        "HTTP/1.1 {status}\r\n\
         Server: ipp-server\r\n\
         Date: {date}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Bind the configured address and run the accept loop.
pub async fn run(service: Arc<IppService>) -> anyhow::Result<()> {
    let cfg = service.config();
    let listener = TcpListener::bind((cfg.bind_addr.as_str(), cfg.server_port))
        .await
        .with_context(|| format!("bind {}:{}", cfg.bind_addr, cfg.server_port))?;
    info!(
        addr = %cfg.bind_addr,
        port = cfg.server_port,
        "IPP server listening"
    );
    serve(listener, service).await
}
