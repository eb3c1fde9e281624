#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `upload-daemon` is the server half of the resumable upload service: the
//! accept loop, the per-connection control/payload dispatch loop, and the
//! runtime configuration that assembles them. It owns no protocol or session
//! logic of its own — those live in `upload-protocol`, `upload-session`,
//! `upload-chunk-io`, and `upload-notifier` — this crate wires them together
//! around a [`std::net::TcpListener`].
//!
//! # Design
//!
//! One thread per accepted connection, a single [`upload_session::SessionManager`]
//! shared behind an [`std::sync::Arc`], and a soft, observability-only cap on
//! live connection threads (see [`accept`]). [`DaemonConfig`] follows the
//! same environment-then-default loading shape used elsewhere in this
//! corpus, with CLI flags (applied by the `upload-server` binary) taking
//! precedence over both.

mod accept;
mod config;
mod handler;

pub use accept::{bind_daemon, run_daemon, run_daemon_with, BoundDaemon, DaemonError};
pub use config::{ConfigError, DaemonConfig};
pub use handler::handle_connection;

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    use tempfile::tempdir;
    use upload_notifier::recording::RecordingNotifier;

    use super::*;

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

    fn send_line(stream: &mut TcpStream, line: &str) {
        stream.write_all(line.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();
        stream.flush().unwrap();
    }

    #[test]
    fn fresh_upload_single_chunk_completes_and_notifies() {
        let dir = tempdir().unwrap();
        let daemon = bind_daemon(test_config(dir.path()), RecordingNotifier::default()).unwrap();
        let addr = daemon.local_addr().unwrap();
        thread::spawn(move || daemon.serve());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(
            &mut stream,
            r#"{"action":"start","upload_id":"u1","filename":"a.bin","filesize":4,"chunk_size":4,"metadata":{"token":"T","filename":"a.bin"}}"#,
        );
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains(r#""status":"ok""#));
        assert!(reply.contains(r#""offset":0"#));

        send_line(&mut stream, r#"{"action":"chunk","upload_id":"u1","offset":0,"length":4}"#);
        stream.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        stream.flush().unwrap();

        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains(r#""offset":4"#));

        let contents = std::fs::read(dir.path().join("storage").join("u1").join("a.bin")).unwrap();
        assert_eq!(contents, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn malformed_frame_then_valid_frame_keeps_connection_open() {
        let dir = tempdir().unwrap();
        let daemon = bind_daemon(test_config(dir.path()), RecordingNotifier::default()).unwrap();
        let addr = daemon.local_addr().unwrap();
        thread::spawn(move || daemon.serve());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(&mut stream, "not-json");
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains("invalid_header"));

        send_line(&mut stream, r#"{"action":"query_resume","upload_id":"u1"}"#);
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains(r#""offset":0"#));
    }

    #[test]
    fn chunk_for_unknown_upload_is_rejected_and_creates_no_file() {
        let dir = tempdir().unwrap();
        let daemon = bind_daemon(test_config(dir.path()), RecordingNotifier::default()).unwrap();
        let addr = daemon.local_addr().unwrap();
        thread::spawn(move || daemon.serve());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(
            &mut stream,
            r#"{"action":"chunk","upload_id":"does-not-exist","offset":0,"length":4}"#,
        );
        stream.write_all(&[1, 2, 3, 4]).unwrap();
        stream.flush().unwrap();

        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains("unknown_upload"));
        assert!(!dir.path().join("storage").join("does-not-exist").exists());
    }

    #[test]
    fn chunk_with_absurd_length_is_rejected_without_reading_a_payload() {
        let dir = tempdir().unwrap();
        let daemon = bind_daemon(test_config(dir.path()), RecordingNotifier::default()).unwrap();
        let addr = daemon.local_addr().unwrap();
        thread::spawn(move || daemon.serve());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(
            &mut stream,
            r#"{"action":"chunk","upload_id":"u1","offset":0,"length":4294967295}"#,
        );
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains("invalid_length"));

        send_line(&mut stream, r#"{"action":"query_resume","upload_id":"u1"}"#);
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains(r#""offset":0"#));
    }

    #[test]
    fn pause_then_resume_round_trips_state() {
        let dir = tempdir().unwrap();
        let daemon = bind_daemon(test_config(dir.path()), RecordingNotifier::default()).unwrap();
        let addr = daemon.local_addr().unwrap();
        thread::spawn(move || daemon.serve());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        send_line(
            &mut stream,
            r#"{"action":"start","upload_id":"u1","filename":"a.bin","filesize":4,"chunk_size":4,"metadata":{"token":"T","filename":"a.bin"}}"#,
        );
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();

        send_line(&mut stream, r#"{"action":"pause","upload_id":"u1"}"#);
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains("paused"));

        send_line(&mut stream, r#"{"action":"resume","upload_id":"u1"}"#);
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert!(reply.contains("resumed"));
    }
}
