//! Purpose: End-to-end tests for the HTTP table server.
//! Exports: None (integration test module).
//! Role: Validate table routes, status mapping, and fresh-read behavior across TCP.
//! Invariants: Uses loopback-only server with a temp data directory.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use serde_json::{Value, json};
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(data_dir: &Path, tables: &str) -> TestResult<Self> {
        Self::start_with_args(data_dir, tables, &[])
    }

    fn start_with_args(data_dir: &Path, tables: &str, extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_csvserve"))
                .arg("--data-dir")
                .arg(data_dir)
                .arg("--tables")
                .arg(tables)
                .args(extra)
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .env_remove("RUST_LOG")
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn get(&self, path: &str) -> TestResult<(u16, Value)> {
        let url = format!("{}{path}", self.base_url);
        let response = match ureq::get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(err.into()),
        };
        let status = response.status();
        let body = response.into_string()?;
        Ok((status, serde_json::from_str(&body)?))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn serves_every_data_row() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(
        temp_dir.path().join("orders.csv"),
        "id,customer,total\n1,ann,10\n2,bob,20\n3,cy,30\n",
    )?;
    let server = TestServer::start(temp_dir.path(), "orders")?;

    let (status, body) = server.get("/orders")?;
    assert_eq!(status, 200);
    let rows = body.as_array().expect("array");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], json!({"id": "1", "customer": "ann", "total": "10"}));
    assert_eq!(rows[2]["customer"], "cy");
    Ok(())
}

#[test]
fn unexposed_table_is_not_found() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(temp_dir.path().join("orders.csv"), "id\n1\n")?;
    std::fs::write(temp_dir.path().join("payroll.csv"), "id\n1\n")?;
    let server = TestServer::start(temp_dir.path(), "orders")?;

    let (status, body) = server.get("/payroll")?;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["kind"], "NotExposed");
    Ok(())
}

#[test]
fn repeated_requests_are_identical() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(temp_dir.path().join("orders.csv"), "id,total\n1,10\n2,\n")?;
    let server = TestServer::start(temp_dir.path(), "orders")?;

    let (_, first) = server.get("/orders")?;
    let (_, second) = server.get("/orders")?;
    assert_eq!(first, second);
    assert_eq!(first[1]["total"], Value::Null);
    Ok(())
}

#[test]
fn edits_and_removal_are_seen_on_next_request() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("orders.csv");
    std::fs::write(&path, "id\n1\n")?;
    let server = TestServer::start(temp_dir.path(), "orders")?;

    let (status, body) = server.get("/orders")?;
    assert_eq!(status, 200);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    std::fs::write(&path, "id\n1\n2\n")?;
    let (_, body) = server.get("/orders")?;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    std::fs::remove_file(&path)?;
    let (status, body) = server.get("/orders")?;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["kind"], "FileNotFound");
    Ok(())
}

#[test]
fn malformed_csv_is_a_parse_error() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(temp_dir.path().join("orders.csv"), "id,total\n1,10\n2\n")?;
    let server = TestServer::start(temp_dir.path(), "orders")?;

    let (status, body) = server.get("/orders")?;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["kind"], "ParseError");
    assert_eq!(body["error"]["row"], 2);
    assert!(body.get("data").is_none());
    Ok(())
}

#[test]
fn builtin_schema_coerces_and_can_be_disabled() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(
        temp_dir.path().join("maintenance_records.csv"),
        "maintenance_id,maintenance_date,labor_cost,odometer_reading\nm1,2024-02-03,42.5,120000\n",
    )?;

    {
        let server = TestServer::start(temp_dir.path(), "maintenance_records")?;
        let (status, body) = server.get("/maintenance_records")?;
        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!([{
                "maintenance_id": "m1",
                "maintenance_date": "2024-02-03",
                "labor_cost": 42.5,
                "odometer_reading": 120000
            }])
        );
    }

    let server = TestServer::start_with_args(
        temp_dir.path(),
        "maintenance_records",
        &["--validation", "off"],
    )?;
    let (_, body) = server.get("/maintenance_records")?;
    assert_eq!(body[0]["labor_cost"], "42.5");
    Ok(())
}

#[test]
fn paged_endpoint_and_metadata() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(
        temp_dir.path().join("fuel_purchases.csv"),
        "fuel_purchase_id,purchase_date,gallons\n\
         f1,2024-01-01 08:00:00,10\n\
         f2,2024-01-05 08:00:00,11\n\
         f3,2024-01-09 08:00:00,12\n",
    )?;
    let server = TestServer::start(temp_dir.path(), "fuel_purchases")?;

    let (status, body) = server.get("/api/fuel_purchases?limit=1&start_date=2024-01-02")?;
    assert_eq!(status, 200);
    assert_eq!(body["total_available"], 2);
    assert_eq!(body["returned"], 1);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["data"][0]["fuel_purchase_id"], "f2");

    let (status, body) = server.get("/api/fuel_purchases?limit=9999")?;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "Usage");

    let (status, body) = server.get("/api/schema/fuel_purchases")?;
    assert_eq!(status, 200);
    assert_eq!(body["schema"]["purchase_date"], "datetime");

    let (status, body) = server.get("/api/tables")?;
    assert_eq!(status, 200);
    assert_eq!(body["tables"], json!(["fuel_purchases"]));

    let (status, body) = server.get("/health")?;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let url = format!("http://{addr}/health");
    let start = Instant::now();
    loop {
        if let Ok(resp) = ureq::get(&url).call() {
            if resp.status() == 200 {
                return Ok(());
            }
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
