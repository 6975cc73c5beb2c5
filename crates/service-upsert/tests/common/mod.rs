#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is json")
    }
}

pub type Handler = Box<dyn Fn(&Recorded) -> (u16, String) + Send + 'static>;

pub struct FakeApi {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeApi {
    /// Serves exactly `request_limit` requests, answering each with `handler`.
    pub fn spawn(request_limit: usize, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for _ in 0..request_limit {
                let (mut stream, _) = listener.accept().expect("accept");
                let Some(req) = read_request(&mut stream) else {
                    continue;
                };
                let (status, body) = handler(&req);
                seen.lock().expect("lock").push(req);
                let hdr = format!(
                    "HTTP/1.1 {status} {}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n",
                    reason(status),
                    body.len()
                );
                let _ = stream.write_all(hdr.as_bytes());
                let _ = stream.write_all(body.as_bytes());
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
            handle: Some(handle),
        }
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock").clone()
    }

    pub fn join(mut self) -> Vec<Recorded> {
        if let Some(h) = self.handle.take() {
            h.join().expect("join fake api");
        }
        self.recorded()
    }
}

/// Accepts one connection and never answers it.
pub fn spawn_silent_server() -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(std::time::Duration::from_secs(3));
            drop(stream);
        }
    });
    (format!("http://{addr}"), handle)
}

/// An address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < len {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(Recorded {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

pub fn service_doc(name: &str, image: &str, version: u64) -> String {
    serde_json::json!({
        "ID": format!("id-{name}"),
        "Version": {"Index": version},
        "CreatedAt": "2024-01-01T00:00:00Z",
        "Spec": {
            "Name": name,
            "Labels": {"team": "web", "traefik.port": "8080"},
            "TaskTemplate": {
                "ContainerSpec": {
                    "Image": image,
                    "Env": ["MODE=prod"],
                    "Mounts": [{"Type": "bind", "Source": "/srv/data", "Target": "/data"}],
                    "Secrets": [{"SecretID": "s1", "SecretName": "db_password",
                                 "File": {"Name": "db_password", "UID": "0", "GID": "0",
                                          "Mode": 292}}]
                },
                "Placement": {"Constraints": ["node.role == worker"]},
                "RestartPolicy": {"Condition": "on-failure", "MaxAttempts": 3},
                "ForceUpdate": 0,
                "Runtime": "container"
            },
            "Mode": {"Replicated": {"Replicas": 4}},
            "UpdateConfig": {"Parallelism": 1, "FailureAction": "rollback", "Order": "start-first"},
            "RollbackConfig": {"Parallelism": 1, "FailureAction": "pause", "Order": "stop-first"},
            "Networks": [{"Target": "proxy"}],
            "EndpointSpec": {
                "Mode": "vip",
                "Ports": [{"Protocol": "tcp", "TargetPort": 80, "PublishedPort": 8080}]
            }
        }
    })
    .to_string()
}

pub fn not_found(name: &str) -> (u16, String) {
    (404, format!(r#"{{"message":"service {name} not found"}}"#))
}
