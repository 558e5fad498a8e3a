//! Minimal HTTP/1.1 origin for the curl adapter tests.
//!
//! `GET /<name>` serves a registered object and honours `Range: bytes=a-` /
//! `bytes=a-b`; unknown names get 404. `PUT /<key>` stores the request body
//! so tests can inspect what an upload sent.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct OriginOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Status returned for every PUT (200 unless a test wants failures).
    pub put_status: u16,
}

impl Default for OriginOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            put_status: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Origin {
    /// e.g. "http://127.0.0.1:12345"
    pub base_url: String,
    puts: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl Origin {
    /// Keys and bodies received by PUT, in arrival order.
    pub fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.puts.lock().unwrap().clone()
    }
}

pub fn start(objects: HashMap<String, Vec<u8>>) -> Origin {
    start_with_options(objects, OriginOptions::default())
}

/// Serve `objects` from a background thread until the process exits.
pub fn start_with_options(objects: HashMap<String, Vec<u8>>, opts: OriginOptions) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let objects = Arc::new(objects);
    let puts = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&puts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let objects = Arc::clone(&objects);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || handle(stream, &objects, &recorded, opts));
        }
    });
    Origin {
        base_url: format!("http://127.0.0.1:{}", port),
        puts,
    }
}

struct Request {
    method: String,
    path: String,
    range: Option<(u64, Option<u64>)>,
    content_length: usize,
    expect_continue: bool,
}

fn handle(
    mut stream: TcpStream,
    objects: &HashMap<String, Vec<u8>>,
    puts: &Mutex<Vec<(String, Vec<u8>)>>,
    opts: OriginOptions,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };
    let Some(req) = std::str::from_utf8(&buf[..head_end]).ok().and_then(parse_request) else {
        return;
    };
    let name = req.path.trim_start_matches('/').to_string();

    if req.method.eq_ignore_ascii_case("PUT") {
        if req.expect_continue {
            let _ = stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n");
        }
        let mut body = buf[head_end..].to_vec();
        while body.len() < req.content_length {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => body.extend_from_slice(&chunk[..n]),
            }
        }
        body.truncate(req.content_length);
        if (200..300).contains(&opts.put_status) {
            puts.lock().unwrap().push((name, body));
        }
        let response = format!(
            "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            opts.put_status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !req.method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let Some(body) = objects.get(&name) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    };
    let total = body.len() as u64;
    let (status, content_range, slice) = match req.range.filter(|_| opts.support_ranges) {
        Some((start, end)) => {
            let end_incl = end.unwrap_or(u64::MAX).min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                ("416 Range Not Satisfiable", Some(format!("bytes */{}", total)), &body[0..0])
            } else {
                let slice = &body[start as usize..=end_incl as usize];
                (
                    "206 Partial Content",
                    Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                    slice,
                )
            }
        }
        None => ("200 OK", None, &body[..]),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_request(head: &str) -> Option<Request> {
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let mut req = Request {
        method: first.next()?.to_string(),
        path: first.next()?.to_string(),
        range: None,
        content_length: 0,
        expect_continue: false,
    };
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("range") {
            req.range = value.strip_prefix("bytes=").and_then(|spec| {
                let (a, b) = spec.split_once('-')?;
                let start = a.trim().parse().ok()?;
                let end = b.trim().parse().ok();
                Some((start, end))
            });
        } else if name.eq_ignore_ascii_case("content-length") {
            req.content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("expect") {
            req.expect_continue = value.eq_ignore_ascii_case("100-continue");
        }
    }
    Some(req)
}
