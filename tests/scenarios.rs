//! End-to-end scenarios exercising a real bound daemon against a real
//! `TcpStream`, plus the client driver against that same daemon.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tempfile::tempdir;
use upload_client::{NoControls, UploadDriver, UploadOutcome};
use upload_core::{UploadId, UploadMetadata, Visibility};
use upload_daemon::{bind_daemon, DaemonConfig, BoundDaemon};
use upload_notifier::recording::RecordingNotifier;
use upload_test_support::connect_with_retries;

fn test_config(dir: &std::path::Path) -> DaemonConfig {
    DaemonConfig {
        host: "127.0.0.1".into(),
        port: 0,
        storage_dir: dir.join("storage"),
        state_file: dir.join("state.json"),
        backend_url: "http://127.0.0.1:1/unused".into(),
        idle_timeout: Duration::from_secs(5),
        chunk_size: 4,
    }
}

fn start_daemon(dir: &std::path::Path) -> (BoundDaemon<RecordingNotifier>, std::net::SocketAddr) {
    let daemon = bind_daemon(test_config(dir), RecordingNotifier::default()).unwrap();
    let addr = daemon.local_addr().unwrap();
    (daemon, addr)
}

fn send_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();
    stream.flush().unwrap();
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

fn metadata() -> UploadMetadata {
    UploadMetadata {
        token: "T".into(),
        filename: "a.bin".into(),
        description: None,
        visibility: Visibility::Private,
        tags: Vec::new(),
    }
}

/// S2 — pause, disconnect, resume across two connections.
#[test]
fn pause_disconnect_and_resume_completes_on_a_second_connection() {
    let dir = tempdir().unwrap();
    let (daemon, addr) = start_daemon(dir.path());
    thread::spawn(move || daemon.serve());

    {
        let mut stream = connect_with_retries(addr.port(), Duration::from_secs(5));
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(
            &mut stream,
            r#"{"action":"start","upload_id":"u1","filename":"a.bin","filesize":4,"chunk_size":4,"metadata":{"token":"T","filename":"a.bin"}}"#,
        );
        assert!(read_line(&mut reader).contains(r#""offset":0"#));

        send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":0,"length":2}"#);
        stream.write_all(&[0xDE, 0xAD]).unwrap();
        stream.flush().unwrap();
        assert!(read_line(&mut reader).contains(r#""offset":2"#));

        send_line(&mut stream, r#"{"action":"pause","upload_id":"u1"}"#);
        assert!(read_line(&mut reader).contains("paused"));
    }

    let mut stream = connect_with_retries(addr.port(), Duration::from_secs(5));
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send_line(&mut stream, r#"{"action":"query_resume","upload_id":"u1"}"#);
    assert!(read_line(&mut reader).contains(r#""offset":2"#));

    send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":2,"length":2}"#);
    stream.write_all(&[0xBE, 0xEF]).unwrap();
    stream.flush().unwrap();
    assert!(read_line(&mut reader).contains(r#""offset":4"#));

    let contents = std::fs::read(dir.path().join("storage").join("u1").join("a.bin")).unwrap();
    assert_eq!(contents, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

/// S5 — a chunk write that fails leaves the offset unchanged, and a
/// subsequent retry after remediation succeeds.
#[test]
#[cfg(unix)]
fn write_failure_leaves_offset_unchanged_then_retry_succeeds() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let (daemon, addr) = start_daemon(dir.path());
    thread::spawn(move || daemon.serve());

    let mut stream = connect_with_retries(addr.port(), Duration::from_secs(5));
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send_line(
        &mut stream,
        r#"{"action":"start","upload_id":"u1","filename":"a.bin","filesize":4,"chunk_size":4,"metadata":{"token":"T","filename":"a.bin"}}"#,
    );
    assert!(read_line(&mut reader).contains(r#""offset":0"#));

    let upload_dir = dir.path().join("storage").join("u1");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::set_permissions(&upload_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":0,"length":4}"#);
    stream.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    stream.flush().unwrap();
    assert!(read_line(&mut reader).contains("write_failed"));

    send_line(&mut stream, r#"{"action":"query_resume","upload_id":"u1"}"#);
    assert!(read_line(&mut reader).contains(r#""offset":0"#));

    std::fs::set_permissions(&upload_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

    send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":0,"length":4}"#);
    stream.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    stream.flush().unwrap();
    assert!(read_line(&mut reader).contains(r#""offset":4"#));
}

/// S6 — a restart recovers the session's offset from durable state and the
/// client completes the upload across a reconnect.
#[test]
fn restart_recovers_offset_and_client_completes_the_upload() {
    let dir = tempdir().unwrap();
    let filesize: u64 = 1024 * 1024;
    let local_file = dir.path().join("source.bin");
    std::fs::write(&local_file, vec![0x42u8; filesize as usize]).unwrap();

    let upload_id = UploadId::new("u1");

    {
        let (daemon, addr) = start_daemon(dir.path());
        let serve_handle = thread::spawn(move || daemon.serve());

        let driver = UploadDriver::open(dir.path().join("resume.json")).unwrap();
        let outcome = driver
            .upload(
                addr,
                upload_id.clone(),
                &local_file,
                "a.bin".into(),
                metadata(),
                65536,
                &StopAfterHalf::default(),
            )
            .unwrap();
        match outcome {
            UploadOutcome::Stopped { offset } => assert!(offset > 0 && offset < filesize),
            UploadOutcome::Completed { .. } => panic!("expected the transfer to be interrupted"),
        }
        drop(serve_handle);
    }

    // "Restart": a fresh daemon opened against the same durable state file.
    let (daemon, addr) = start_daemon(dir.path());
    thread::spawn(move || daemon.serve());

    let mut stream = connect_with_retries(addr.port(), Duration::from_secs(5));
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    send_line(&mut stream, &format!(r#"{{"action":"query_resume","upload_id":"{upload_id}"}}"#));
    let reply = read_line(&mut reader);
    assert!(!reply.contains(r#""offset":0"#), "expected a nonzero recovered offset: {reply}");

    let driver = UploadDriver::open(dir.path().join("resume.json")).unwrap();
    let outcome = driver
        .upload(
            addr,
            upload_id,
            &local_file,
            "a.bin".into(),
            metadata(),
            65536,
            &NoControls,
        )
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Completed { offset: filesize });

    let written = std::fs::read(dir.path().join("storage").join("u1").join("a.bin")).unwrap();
    assert_eq!(written.len() as u64, filesize);
}

#[derive(Default)]
struct StopAfterHalf {
    sent: std::sync::atomic::AtomicU64,
}

impl upload_client::UploadControls for StopAfterHalf {
    fn should_stop(&self) -> bool {
        self.sent.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= 8
    }
}

/// A plain client-server round trip over several chunks, without any
/// pause/resume in between.
#[test]
fn client_driver_completes_a_multi_chunk_upload() {
    let dir = tempdir().unwrap();
    let (daemon, addr) = start_daemon(dir.path());
    thread::spawn(move || daemon.serve());

    let local_file = dir.path().join("source.bin");
    std::fs::write(&local_file, b"DEADBEEFCAFE").unwrap();

    let driver = UploadDriver::open(dir.path().join("resume.json")).unwrap();
    let outcome = driver
        .upload(
            addr,
            UploadId::new("multi"),
            &local_file,
            "a.bin".into(),
            metadata(),
            4,
            &NoControls,
        )
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Completed { offset: 12 });
    let written = std::fs::read(dir.path().join("storage").join("multi").join("a.bin")).unwrap();
    assert_eq!(written, b"DEADBEEFCAFE");
}

/// Runs a minimal raw HTTP/1.1 responder on a background thread to observe
/// the production [`upload_notifier::HttpNotifier`]'s completion POST
/// without pulling in a mock-server dependency.
fn spawn_http_stub() -> (std::net::SocketAddr, std::sync::mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).unwrap();
            let trimmed = header.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some(value) = trimmed.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        let _ = tx.send(String::from_utf8_lossy(&body).into_owned());

        stream
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
    });

    (addr, rx)
}

#[test]
fn completion_notification_reaches_a_real_http_listener() {
    let dir = tempdir().unwrap();
    let (stub_addr, received) = spawn_http_stub();

    let config = DaemonConfig {
        host: "127.0.0.1".into(),
        port: 0,
        storage_dir: dir.path().join("storage"),
        state_file: dir.path().join("state.json"),
        backend_url: format!("http://{stub_addr}/api/uploads/complete"),
        idle_timeout: Duration::from_secs(5),
        chunk_size: 4,
    };
    let bound = bind_daemon_production(config);
    let addr = bound.local_addr().unwrap();
    thread::spawn(move || bound.serve());

    let mut stream = connect_with_retries(addr.port(), Duration::from_secs(5));
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    send_line(
        &mut stream,
        r#"{"action":"start","upload_id":"u1","filename":"a.bin","filesize":4,"chunk_size":4,"metadata":{"token":"secret-token","filename":"a.bin"}}"#,
    );
    read_line(&mut reader);

    send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":0,"length":4}"#);
    stream.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    stream.flush().unwrap();
    read_line(&mut reader);

    let body = received.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(body.contains("a.bin"));
}

fn bind_daemon_production(config: DaemonConfig) -> BoundDaemon<upload_notifier::HttpNotifier> {
    let notifier = upload_notifier::HttpNotifier::new(config.backend_url.clone()).unwrap();
    bind_daemon(config, notifier).unwrap()
}
