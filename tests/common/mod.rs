//! In-process fake backend for driving the client over a real socket.

use pgwire_lite::Opts;
use pgwire_lite::protocol::frontend::startup::StartupMessage;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

/// Route client logs to the test harness. Filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Bind a listener on an ephemeral port and return options pointing at it.
pub async fn listen() -> (TcpListener, Opts) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let opts = Opts {
        host: "127.0.0.1".into(),
        port,
        user: "alice".into(),
        database: Some("app".into()),
        ..Default::default()
    };
    (listener, opts)
}

/// Read an untagged startup-phase packet (startup or cancel request).
pub async fn read_untagged(sock: &mut TcpStream) -> Vec<u8> {
    let len = sock.read_i32().await.unwrap() as usize;
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(&(len as i32).to_be_bytes());
    sock.read_exact(&mut data[4..]).await.unwrap();
    data
}

pub async fn read_startup(sock: &mut TcpStream) -> StartupMessage {
    StartupMessage::parse(&read_untagged(sock).await).unwrap()
}

/// Read one tagged frontend message. `None` on end of stream.
pub async fn read_message(sock: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let tag = sock.read_u8().await.ok()?;
    let len = sock.read_i32().await.ok()? as usize;
    let mut body = vec![0u8; len - 4];
    sock.read_exact(&mut body).await.ok()?;
    Some((tag, body))
}

/// Read a Query message and return its SQL text.
pub async fn read_query(sock: &mut TcpStream) -> String {
    let (tag, body) = read_message(sock).await.unwrap();
    assert_eq!(tag, b'Q');
    String::from_utf8(body[..body.len() - 1].to_vec()).unwrap()
}

pub fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

pub fn auth(code: i32, extra: &[u8]) -> Vec<u8> {
    let mut body = code.to_be_bytes().to_vec();
    body.extend_from_slice(extra);
    message(b'R', &body)
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = Vec::new();
    cstr(&mut body, name);
    cstr(&mut body, value);
    message(b'S', &body)
}

pub fn backend_key(pid: u32, secret: u32) -> Vec<u8> {
    let mut body = pid.to_be_bytes().to_vec();
    body.extend_from_slice(&secret.to_be_bytes());
    message(b'K', &body)
}

pub fn ready(status: u8) -> Vec<u8> {
    message(b'Z', &[status])
}

/// RowDescription with text-format columns.
pub fn row_description(fields: &[(&str, u32)]) -> Vec<u8> {
    let mut body = (fields.len() as i16).to_be_bytes().to_vec();
    for (name, type_oid) in fields {
        cstr(&mut body, name);
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        body.extend_from_slice(&type_oid.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
    }
    message(b'T', &body)
}

pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut body = (values.len() as i16).to_be_bytes().to_vec();
    for value in values {
        match value {
            Some(v) => {
                body.extend_from_slice(&(v.len() as i32).to_be_bytes());
                body.extend_from_slice(v.as_bytes());
            }
            None => body.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    message(b'D', &body)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = Vec::new();
    cstr(&mut body, tag);
    message(b'C', &body)
}

pub fn error_response(fields: &[(u8, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (code, value) in fields {
        body.push(*code);
        cstr(&mut body, value);
    }
    body.push(0);
    message(b'E', &body)
}

/// AuthenticationOk, two ParameterStatus, BackendKeyData(123, 456), ReadyForQuery('I').
pub fn greeting() -> Vec<u8> {
    [
        auth(0, &[]),
        parameter_status("server_version", "16.2"),
        parameter_status("client_encoding", "UTF8"),
        backend_key(123, 456),
        ready(b'I'),
    ]
    .concat()
}

/// Accept one connection, check the startup message and send the greeting.
pub async fn accept(listener: &TcpListener) -> TcpStream {
    let (mut sock, _) = listener.accept().await.unwrap();
    let startup = read_startup(&mut sock).await;
    assert_eq!(startup.version, (3, 0));
    sock.write_all(&greeting()).await.unwrap();
    sock
}
