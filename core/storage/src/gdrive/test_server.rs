//! Minimal HTTP/1.1 responder for exercising the Drive transports on the wire.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use locallydrive_common::DriveSettings;

/// Pause between body parts so the client sees them as separate reads.
const PART_DELAY: Duration = Duration::from_millis(20);

/// A canned response.
pub struct Reply {
    head: String,
    parts: Vec<Vec<u8>>,
    chunked: bool,
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

impl Reply {
    /// Response with a body of the given content type and an exact length.
    pub fn with_body(status: u16, content_type: &str, body: &str) -> Self {
        Self::raw(
            &format!(
                "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
                status,
                reason(status),
                content_type,
                body.len()
            ),
            body.as_bytes(),
        )
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::with_body(status, "application/json", body)
    }

    /// Response with a caller-written status line and headers.
    pub fn raw(head: &str, body: &[u8]) -> Self {
        Self {
            head: head.to_string(),
            parts: vec![body.to_vec()],
            chunked: false,
        }
    }

    /// 200 response sent with chunked transfer encoding, one chunk per part.
    pub fn chunked(parts: &[&[u8]]) -> Self {
        Self {
            head: "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
                   Transfer-Encoding: chunked\r\n"
                .to_string(),
            parts: parts.iter().map(|p| p.to_vec()).collect(),
            chunked: true,
        }
    }

    async fn write_to(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        stream
            .write_all(format!("{}Connection: close\r\n\r\n", self.head).as_bytes())
            .await?;

        for part in &self.parts {
            if self.chunked {
                stream.write_all(format!("{:x}\r\n", part.len()).as_bytes()).await?;
                stream.write_all(part).await?;
                stream.write_all(b"\r\n").await?;
                stream.flush().await?;
                tokio::time::sleep(PART_DELAY).await;
            } else {
                stream.write_all(part).await?;
            }
        }
        if self.chunked {
            stream.write_all(b"0\r\n\r\n").await?;
        }
        stream.flush().await?;
        stream.shutdown().await
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Read one request: the head, then as many body bytes as it announces.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let body_start = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&buf) {
            break end;
        }
    };

    let expected = body_start + content_length(&String::from_utf8_lossy(&buf[..body_start]));
    while buf.len() < expected {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Serves one reply per connection, in order, and records each raw request.
pub struct TestServer {
    base: String,
    handle: JoinHandle<Vec<String>>,
}

impl TestServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut stream).await.unwrap_or_default());
                let _ = reply.write_to(&mut stream).await;
            }
            requests
        });

        Self { base, handle }
    }

    /// Base URL, without a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Settings pointing both Drive endpoints at this server.
    pub fn drive_settings(&self) -> DriveSettings {
        let mut settings = DriveSettings::new("/tmp/key.json");
        settings.api_base = format!("{}/drive/v3", self.base);
        settings.upload_base = format!("{}/upload/drive/v3", self.base);
        settings
    }

    /// Raw requests received, once every reply has been served.
    pub async fn requests(self) -> Vec<String> {
        self.handle.await.unwrap()
    }
}
