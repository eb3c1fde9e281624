#![deny(unsafe_code)]

//! Workspace root. Carries no runtime code of its own — the server and
//! client binaries live under `bin/`, and the implementation lives in the
//! `crates/` workspace members. This crate exists solely to host the
//! end-to-end integration tests under `tests/`, which exercise those crates
//! together the way a deployed server and client actually would.
