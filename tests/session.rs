//! Integration tests for the client and server binaries, spawned as real
//! processes and driven the way a user would: piping REPL lines into the
//! client's stdin and reading its transcript back.

use std::io::prelude::*;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::{env, fs, process, thread::sleep, time::Duration};

use serial_test::serial;

fn exe_path(name: &str) -> PathBuf {
    let bin_dir = env::current_exe()
        .unwrap()
        .parent()
        .expect("test executable's directory")
        .parent()
        .expect("output directory")
        .to_path_buf();
    bin_dir.join(name)
}

fn cmd_stdout(out: Output) -> String {
    String::from_utf8(out.stdout).expect("non utf-8 output")
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mftp-session-test-{tag}-{}", process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn start_server(cwd: &std::path::Path) -> process::Child {
    let server = Command::new(exe_path("mftpserve"))
        .current_dir(cwd)
        .spawn()
        .expect("failed to start mftpserve");
    // wait for the server to start listening for connections
    sleep(Duration::from_millis(150));
    server
}

fn stop_server(mut server: process::Child) {
    server.kill().expect("could not kill server process");
    server.wait().expect("waiting for server");
}

/// Run the client with `script` piped in as stdin lines, in `cwd`, and
/// return its captured stdout.
fn run_client_script(cwd: &std::path::Path, script: &str) -> String {
    let mut child = Command::new(exe_path("mftp"))
        .arg("127.0.0.1")
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start mftp client");
    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(script.as_bytes())
        .expect("writing client script");
    let out = child.wait_with_output().expect("waiting for client");
    cmd_stdout(out)
}

#[test]
fn test_client_help_flag() {
    let out = Command::new(exe_path("mftp"))
        .args(["--help"])
        .output()
        .expect("failed to run mftp --help");
    let stdout = cmd_stdout(out);
    assert!(stdout.contains("mftp") || stdout.to_lowercase().contains("client"));
}

#[test]
fn test_server_help_flag() {
    let out = Command::new(exe_path("mftpserve"))
        .arg("--help")
        .output()
        .expect("failed to run mftpserve --help");
    let stdout = cmd_stdout(out);
    assert!(stdout.contains("mftpserve") || stdout.to_lowercase().contains("server"));
}

#[test]
#[serial]
fn full_session_round_trips_get_and_put() {
    let server_dir = scratch_dir("full-server");
    let client_dir = scratch_dir("full-client");
    fs::write(server_dir.join("remote.txt"), b"hello from the server\n").unwrap();
    fs::write(client_dir.join("local.txt"), b"hello from the client\n").unwrap();

    let server = start_server(&server_dir);

    let script = "get remote.txt\nput local.txt\nexit\n";
    let transcript = run_client_script(&client_dir, script);

    stop_server(server);

    assert_eq!(transcript.matches("status = 0").count(), 3, "{transcript}");
    assert_eq!(
        fs::read(client_dir.join("remote.txt")).unwrap(),
        b"hello from the server\n"
    );
    assert_eq!(
        fs::read(server_dir.join("local.txt")).unwrap(),
        b"hello from the client\n"
    );
}

#[test]
#[serial]
fn put_to_existing_remote_file_is_reported_as_failure() {
    let server_dir = scratch_dir("exists-server");
    let client_dir = scratch_dir("exists-client");
    fs::write(server_dir.join("taken.txt"), b"do not overwrite me").unwrap();
    fs::write(client_dir.join("taken.txt"), b"new contents").unwrap();

    let server = start_server(&server_dir);

    let script = "put taken.txt\nexit\n";
    let transcript = run_client_script(&client_dir, script);

    stop_server(server);

    assert!(transcript.contains("status = 1"), "{transcript}");
    assert_eq!(
        fs::read(server_dir.join("taken.txt")).unwrap(),
        b"do not overwrite me"
    );
}

#[test]
#[serial]
fn get_to_existing_local_file_is_reported_as_failure() {
    let server_dir = scratch_dir("get-exists-server");
    let client_dir = scratch_dir("get-exists-client");
    fs::write(server_dir.join("taken.txt"), b"fresh from the server").unwrap();
    fs::write(client_dir.join("taken.txt"), b"do not overwrite me").unwrap();

    let server = start_server(&server_dir);

    let script = "get taken.txt\nexit\n";
    let transcript = run_client_script(&client_dir, script);

    stop_server(server);

    assert!(transcript.contains("status = 1"), "{transcript}");
    assert_eq!(
        fs::read(client_dir.join("taken.txt")).unwrap(),
        b"do not overwrite me"
    );
}

#[test]
#[serial]
fn rcd_then_rls_reflects_the_new_remote_directory() {
    let server_dir = scratch_dir("rcd-server");
    let client_dir = scratch_dir("rcd-client");
    fs::create_dir_all(server_dir.join("sub")).unwrap();
    fs::write(server_dir.join("sub").join("inner.txt"), b"inner").unwrap();

    let server = start_server(&server_dir);

    let script = "rcd sub\nrls\nexit\n";
    let transcript = run_client_script(&client_dir, script);

    stop_server(server);

    assert_eq!(transcript.matches("status = 0").count(), 3, "{transcript}");
    assert!(transcript.contains("inner.txt"), "{transcript}");
}

#[test]
#[serial]
fn eof_on_stdin_ends_session_without_a_server_exit() {
    let server_dir = scratch_dir("eof-server");
    let client_dir = scratch_dir("eof-client");

    let server = start_server(&server_dir);

    // no trailing "exit": stdin just closes.
    let transcript = run_client_script(&client_dir, "rls\n");

    stop_server(server);
    assert!(transcript.contains("mftp$"), "{transcript}");
}
