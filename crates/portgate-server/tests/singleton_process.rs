//! Single-instance behaviour across real processes.
//!
//! fcntl record locks belong to a process, so a second `acquire` from the
//! same process would succeed.  These tests run the compiled server binary as
//! the lock holder and query it from the test process.

#![cfg(unix)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use portgate_server::infrastructure::singleton::{acquire, read_pid_file, test_owner};
use portgate_server::infrastructure::SingletonError;

const PATIENCE: Duration = Duration::from_secs(10);

fn server_command(pid_file: &Path, port: u16) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_portgate-server"));
    cmd.arg("--pid-file")
        .arg(pid_file)
        .args(["--bind", "127.0.0.1", "--port", &port.to_string()])
        .env("RUST_LOG", "info")
        .env_remove("PORTGATE_CONFIG")
        .stdin(Stdio::null());
    cmd
}

/// Kills the child on drop so a failed assertion does not leak a server.
struct ServerProcess(Child);

impl ServerProcess {
    fn spawn(pid_file: &Path, port: u16) -> Self {
        let child = server_command(pid_file, port)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn portgate-server");
        Self(child)
    }

    fn pid(&self) -> u32 {
        self.0.id()
    }

    fn kill(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }

    fn wait_for_exit(&mut self) -> std::process::ExitStatus {
        let deadline = Instant::now() + PATIENCE;
        loop {
            if let Some(status) = self.0.try_wait().expect("poll child") {
                return status;
            }
            assert!(Instant::now() < deadline, "server did not exit in time");
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn wait_until(mut check: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + PATIENCE;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(20));
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("ephemeral port")
        .port()
}

/// Succeeds only once the accept loop is running: the server must read the
/// message and close the connection.
fn served(port: u16) -> bool {
    let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)) else {
        return false;
    };
    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));
    if stream.write_all(b"ping\0").is_err() {
        return false;
    }
    let mut rest = Vec::new();
    matches!(stream.read_to_end(&mut rest), Ok(0))
}

fn run_to_completion(pid_file: &Path, port: u16) -> Output {
    server_command(pid_file, port)
        .output()
        .expect("run portgate-server")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_second_instance_reports_already_running_and_exits_zero() {
    // Arrange: first server holds the lock
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("portgate.pid");
    let mut first = ServerProcess::spawn(&pid_file, 0);
    wait_until(
        || test_owner(&pid_file).ok() == Some(first.pid()),
        "first server to take the lock",
    );

    // Act
    let second = run_to_completion(&pid_file, 0);

    // Assert
    assert!(second.status.success(), "already running is not an error");
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("already running"), "stdout was: {stdout}");
    assert_eq!(test_owner(&pid_file).unwrap(), first.pid(), "holder undisturbed");
    assert_eq!(read_pid_file(&pid_file).unwrap(), Some(first.pid()));

    first.kill();
}

#[test]
fn test_lock_is_contended_while_holder_lives_and_free_after_it_dies() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("portgate.pid");
    let mut holder = ServerProcess::spawn(&pid_file, 0);
    wait_until(
        || test_owner(&pid_file).ok() == Some(holder.pid()),
        "server to take the lock",
    );

    // Act / Assert: contended
    match acquire(&pid_file) {
        Err(SingletonError::AlreadyRunning { path }) => assert_eq!(path, pid_file),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(test_owner(&pid_file).unwrap(), holder.pid());

    // Act: the holder dies without any cleanup
    holder.kill();

    // Assert: the kernel released the lock; the stale pid text is irrelevant
    assert_eq!(test_owner(&pid_file).unwrap(), 0);
    let lock = acquire(&pid_file).expect("lock is free after the holder died");
    assert_eq!(lock.pid(), std::process::id());
}

#[test]
fn test_sigterm_shuts_down_with_status_zero_and_releases_lock() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("portgate.pid");
    let port = free_port();
    let mut server = ServerProcess::spawn(&pid_file, port);
    wait_until(|| served(port), "server to serve a ping");

    // Act
    let pid = libc::pid_t::try_from(server.pid()).expect("pid fits pid_t");
    // SAFETY: `pid` is our own child, which has not been reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    assert_eq!(rc, 0);
    let status = server.wait_for_exit();

    // Assert
    assert!(status.success(), "orderly shutdown exits 0, got {status:?}");
    assert_eq!(test_owner(&pid_file).unwrap(), 0);
    assert!(
        TcpStream::connect(("127.0.0.1", port)).is_err(),
        "listening socket is closed"
    );
}

#[test]
fn test_port_in_use_exits_nonzero() {
    // Arrange: occupy a port
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("portgate.pid");
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    // Act
    let output = run_to_completion(&pid_file, port);

    // Assert
    assert!(!output.status.success(), "bind failure is fatal");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot listen"), "stderr was: {stderr}");
    assert_eq!(test_owner(&pid_file).unwrap(), 0, "lock released on exit");
}

#[test]
fn test_invalid_capacity_exits_nonzero_before_locking() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("portgate.pid");

    let output = server_command(&pid_file, 0)
        .args(["--max-clients", "0"])
        .output()
        .expect("run portgate-server");

    assert!(!output.status.success());
    assert!(!pid_file.exists(), "config is validated before the lock is taken");
}
