#![allow(dead_code)]

use autoroute::errors::DomainError;
use autoroute::implementation::{Implementation, Invocation, MethodName, Reply};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const ITEMS_SPEC: &str = r##"
openapi: 3.0.3
info:
  title: Items
  version: "1.0"
components:
  schemas:
    NewItem:
      type: object
      required: [name]
      properties:
        name: { type: string, minLength: 1 }
        price: { type: number, minimum: 0 }
    Item:
      type: object
      required: [id, name]
      properties:
        id: { type: integer }
        name: { type: string }
        status: { type: string, default: active }
paths:
  /items:
    get:
      parameters:
        - { name: limit, in: query, schema: { type: integer, minimum: 1, default: 20 } }
        - { name: tags, in: query, schema: { type: array, items: { type: string } } }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                type: array
                items: { $ref: "#/components/schemas/Item" }
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema: { $ref: "#/components/schemas/NewItem" }
      responses:
        "201":
          description: created
          content:
            application/json:
              schema: { $ref: "#/components/schemas/Item" }
  /items/{id}:
    parameters:
      - { name: id, in: path, required: true, schema: { type: integer } }
    get:
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema: { $ref: "#/components/schemas/Item" }
    delete:
      responses:
        "204": { description: deleted }
"##;

pub fn items_document() -> Value {
    serde_yaml::from_str(ITEMS_SPEC).unwrap()
}

pub fn document(yaml: &str) -> Value {
    serde_yaml::from_str(yaml).unwrap()
}

/// Test double: records every invocation and answers from a fixed script.
#[derive(Default)]
pub struct CountingImpl {
    pub calls: AtomicUsize,
    pub last: Mutex<Option<Invocation>>,
    /// Methods to leave out of `exposes`.
    pub missing: Vec<MethodName>,
    /// When set, `create` fails with this conflict detail.
    pub conflict: Option<String>,
}

impl CountingImpl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, method: MethodName) -> Self {
        self.missing.push(method);
        self
    }

    pub fn conflicting(mut self, detail: &str) -> Self {
        self.conflict = Some(detail.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Value> {
        self.last.lock().unwrap().as_ref().and_then(|c| c.body.clone())
    }

    pub fn last_arg(&self, name: &str) -> Option<Value> {
        self.last
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|c| c.arg(name).cloned())
    }
}

impl Implementation for CountingImpl {
    fn exposes(&self, method: &MethodName) -> bool {
        !self.missing.contains(method)
    }

    fn invoke(&self, call: Invocation) -> Result<Reply, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let method = call.method.clone();
        let id = call.arg("id").cloned().unwrap_or(json!(1));
        *self.last.lock().unwrap() = Some(call);
        match method {
            MethodName::List => Ok(json!([{ "id": 1, "name": "widget" }]).into()),
            MethodName::Get => Ok(json!({ "id": id, "name": "widget", "internal": true }).into()),
            MethodName::Create => match &self.conflict {
                Some(detail) => Err(DomainError::conflict(detail.clone())),
                None => Ok(json!({ "id": 1, "name": "widget", "price": null }).into()),
            },
            MethodName::Delete => Ok(Value::Null.into()),
            other => Ok(json!({ "method": other.as_str() }).into()),
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::Once;
    use std::time::Duration;

    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    pub fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Send one raw HTTP request and read until the declared body length arrives.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if is_complete(&buf) {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn is_complete(buf: &[u8]) -> bool {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]);
        let length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + 4 + length
    }

    pub fn parse_status(resp: &str) -> u16 {
        resp.lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap_or("0")
            .parse()
            .unwrap()
    }

    pub fn parse_header<'a>(resp: &'a str, name: &str) -> Option<&'a str> {
        resp.split("\r\n\r\n")
            .next()?
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    pub fn parse_body(resp: &str) -> serde_json::Value {
        let body = resp.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("");
        serde_json::from_str(body).unwrap_or(serde_json::Value::Null)
    }
}
