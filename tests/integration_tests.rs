//! End-to-end tests: the `dynhttp` binary reading a configuration file,
//! serving requests, and reacting to edits of that file.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

fn write_config(path: &Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// Poll `check` until it holds or ten seconds pass.
fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn hello(port: u16) -> Option<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    client
        .get(format!("http://127.0.0.1:{port}/hello"))
        .send()
        .ok()
        .and_then(|r| r.text().ok())
}

struct Server(Child);

impl Server {
    fn spawn(config: &Path, data_dir: &Path) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_dynhttp"))
            .arg("--config")
            .arg(config)
            .arg("--data-dir")
            .arg(data_dir)
            .arg("--log-threshold")
            .arg("off")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        Self(child)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

#[test]
fn generate_keystore_prints_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dev.pem");
    let output = Command::new(env!("CARGO_BIN_EXE_dynhttp"))
        .arg("--generate-keystore")
        .arg(&path)
        .arg("--data-dir")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sha256:"), "{stdout}");
    let pem = std::fs::read_to_string(&path).unwrap();
    assert!(pem.contains("BEGIN CERTIFICATE"));
    assert!(pem.contains("PRIVATE KEY"));
}

#[test]
fn serves_configuration_and_follows_file_edits() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("dynhttp.json");
    let first = free_port();
    write_config(
        &config,
        &json!({
            "http.port": first,
            "http.host": "127.0.0.1",
            "http.minThreads": 1,
            "http.maxThreads": 2,
        }),
    );

    let _server = Server::spawn(&config, dir.path());
    assert!(eventually(|| hello(first).as_deref() == Some("Hello World!\n")));

    let work = dir.path().join("work");
    assert_eq!(std::fs::read_dir(&work).unwrap().count(), 1);

    // Move to another port; the first must be released.
    let second = free_port();
    write_config(
        &config,
        &json!({
            "http.port": second,
            "http.host": "127.0.0.1",
            "http.minThreads": "1",
            "http.maxThreads": "2",
        }),
    );
    assert!(eventually(|| hello(second).is_some()));
    assert!(eventually(|| hello(first).is_none()));

    // A malformed edit is ignored; the server keeps running.
    std::fs::write(&config, "{ broken").unwrap();
    std::thread::sleep(Duration::from_millis(800));
    assert!(hello(second).is_some());

    // `null` stops the server and removes its workspace.
    std::fs::write(&config, "null").unwrap();
    assert!(eventually(|| hello(second).is_none()));
    assert!(eventually(|| std::fs::read_dir(&work).unwrap().count() == 0));
}
