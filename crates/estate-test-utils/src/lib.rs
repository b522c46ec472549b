use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Canned response served by the mock server.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status_line: String,
    pub content_type: String,
    pub extra_headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn json(status_line: &str, body: &str) -> Self {
        Self {
            status_line: status_line.to_string(),
            content_type: "application/json".to_string(),
            extra_headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// Server-sent-events body; the connection closes after `body` is written.
    pub fn event_stream(body: &str) -> Self {
        Self {
            status_line: "200 OK".to_string(),
            content_type: "text/event-stream".to_string(),
            extra_headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers
            .push((name.to_string(), value.to_string()));
        self
    }
}

/// Spawn a mock HTTP server that answers one request per connection with the
/// next scripted response, in order, then stops accepting. Returns the base
/// URL and a receiver yielding every captured request.
pub fn spawn_scripted_server(
    responses: Vec<MockResponse>,
) -> (String, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let addr = listener.local_addr().expect("read mock server addr");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = listener.accept().expect("accept mock request");
            let req = read_http_request(&mut stream);
            // The test may have stopped listening; keep serving regardless.
            let _ = tx.send(req);

            let mut head = format!(
                "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n",
                response.status_line,
                response.content_type,
                response.body.len()
            );
            for (name, value) in &response.extra_headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            stream
                .write_all(head.as_bytes())
                .expect("write mock response head");
            stream
                .write_all(response.body.as_bytes())
                .expect("write mock response body");
        }
    });

    (format!("http://{addr}"), rx)
}

/// Spawn a mock HTTP server that accepts a single request, captures it,
/// and responds with the given status line and JSON body.
pub fn spawn_one_shot_server(
    status_line: &str,
    response_body: &str,
) -> (String, mpsc::Receiver<CapturedRequest>) {
    spawn_scripted_server(vec![MockResponse::json(status_line, response_body)])
}

fn read_http_request(stream: &mut std::net::TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut header_end = None;
    let mut content_length = 0usize;

    loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).expect("read request bytes");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if header_end.is_none() {
            header_end = buf
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
                .map(|idx| idx + 4);
            if let Some(end) = header_end {
                let headers = String::from_utf8_lossy(&buf[..end]);
                for line in headers.lines() {
                    if let Some((key, value)) = line.split_once(':') {
                        if key.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse::<usize>().unwrap_or(0);
                        }
                    }
                }
            }
        }
        if let Some(end) = header_end {
            if buf.len() >= end + content_length {
                break;
            }
        }
    }

    let end = header_end.expect("request headers must be present");
    let headers_raw = String::from_utf8_lossy(&buf[..end]);
    let mut lines = headers_raw.lines();
    let request_line = lines.next().expect("request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().expect("method").to_string();
    let path = parts.next().expect("path").to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let body = String::from_utf8(buf[end..end + content_length].to_vec()).expect("utf8 body");

    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}
