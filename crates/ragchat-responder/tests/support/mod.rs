//! Minimal HTTP/1.1 endpoint for exercising the blocking clients.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub enum Reply {
    Json(u16, String),
    /// Read the request, then keep the socket open without answering.
    Hang(Duration),
}

#[derive(Debug)]
pub struct Captured {
    pub head: String,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_lowercase());
        self.head
            .lines()
            .find(|l| l.to_lowercase().starts_with(&prefix))
            .map(|l| l[prefix.len()..].trim().to_string())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

pub struct Stub {
    pub url: String,
    handle: JoinHandle<Vec<Captured>>,
}

impl Stub {
    pub fn requests(self) -> Vec<Captured> {
        self.handle.join().expect("stub thread")
    }
}

/// Serves one connection per reply, in order, on `path`.
pub fn serve(path: &str, replies: Vec<Reply>) -> Stub {
    // Keep any proxy configured in the environment away from the stub.
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}{}", listener.local_addr().unwrap(), path);
    let handle = thread::spawn(move || {
        let mut captured = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            captured.push(read_request(&mut stream));
            match reply {
                Reply::Json(status, body) => {
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    stream.write_all(response.as_bytes()).unwrap();
                }
                Reply::Hang(d) => {
                    thread::spawn(move || {
                        thread::sleep(d);
                        drop(stream);
                    });
                }
            }
        }
        captured
    });
    Stub { url, handle }
}

fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).expect("read");
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let length = head
        .lines()
        .find_map(|l| {
            let lower = l.to_lowercase();
            lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).expect("read body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[head_end..head_end + length]).to_string();
    Captured { head, body }
}
