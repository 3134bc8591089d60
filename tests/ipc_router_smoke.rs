use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .env_remove("ROSTERD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn is_ok(v: &serde_json::Value) -> bool {
    v.get("ok").and_then(|v| v.as_bool()) == Some(true)
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rosterd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(is_ok(&health));
    assert_eq!(health["result"]["workspacePath"], serde_json::Value::Null);

    // Lists answer empty before a workspace exists.
    let early = request(&mut stdin, &mut reader, "2", "assignments.list", json!({}));
    assert_eq!(early["result"]["assignments"], json!([]));

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(is_ok(&selected), "{selected}");
    assert!(workspace.join("roster.sqlite3").is_file());

    let mut n = 10;
    for ns in ["subjects", "teachers", "groups", "classrooms"] {
        n += 1;
        let listed = request(
            &mut stdin,
            &mut reader,
            &n.to_string(),
            &format!("{ns}.list"),
            json!({}),
        );
        assert!(is_ok(&listed), "{ns}.list: {listed}");
        assert_eq!(listed["result"][ns], json!([]));
    }

    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "assignments.get",
        json!({ "groupId": 1, "day": "Mon", "moduleIndex": 0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "assignments.delete",
        json!({ "assignmentId": 999 }),
    );

    let unknown = request_raw(&mut stdin, &mut reader, "22", "grades.list");
    assert_eq!(unknown["error"]["code"], "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn request_raw(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", json!({ "id": id, "method": method })).expect("write request");
    stdin.flush().expect("flush request");
    read_response(reader)
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");

    // Blank lines are skipped without a reply.
    writeln!(stdin).expect("write blank");
    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert!(is_ok(&health));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mutations_without_workspace_are_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.save",
        json!({ "groupId": 1, "day": "Mon", "moduleIndex": 0, "subjectId": 1, "teacherId": 1 }),
    );
    assert_eq!(resp["error"]["code"], "no_workspace");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Math" }),
    );
    assert_eq!(resp["error"]["code"], "no_workspace");

    drop(stdin);
    let _ = child.wait();
}
