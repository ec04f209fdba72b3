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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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

fn assert_ok(value: &serde_json::Value, method: &str) {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_ok(&health, "health");
    assert_eq!(health["result"]["schemaVersion"], 1);

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
        ("settings.defaultScale.get", json!({})),
        ("classes.create", json!({ "name": "Biology" })),
        ("classes.list", json!({})),
        (
            "categories.add",
            json!({ "className": "Biology", "name": "Quizzes", "weight": 40 }),
        ),
        (
            "categories.add",
            json!({ "className": "Biology", "name": "Exams", "weight": 60 }),
        ),
        (
            "categories.setDropped",
            json!({ "className": "Biology", "categoryName": "Quizzes", "numDropped": 1 }),
        ),
        (
            "grades.add",
            json!({ "className": "Biology", "categoryName": "Quizzes", "value": 88 }),
        ),
        (
            "grades.edit",
            json!({ "className": "Biology", "categoryName": "Quizzes", "index": 0, "value": 91 }),
        ),
        (
            "grades.delete",
            json!({ "className": "Biology", "categoryName": "Quizzes", "index": 5 }),
        ),
        ("categories.list", json!({ "className": "Biology" })),
        ("extraCredit.add", json!({ "className": "Biology", "amount": 1.5 })),
        ("extraCredit.reset", json!({ "className": "Biology" })),
        ("classes.update", json!({ "className": "Biology", "rounding": true, "roundingThreshold": 0.5 })),
        ("classes.validate", json!({ "className": "Biology" })),
        ("calc.classSummary", json!({ "className": "Biology" })),
        (
            "calc.whatIf",
            json!({ "className": "Biology", "hypothetical": { "Exams": [75, 80] } }),
        ),
        (
            "calc.neededGrades",
            json!({ "className": "Biology", "desiredLetter": "C", "remaining": { "Exams": 2 } }),
        ),
        (
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        (
            "backup.importWorkspaceBundle",
            json!({ "inPath": bundle_out.to_string_lossy() }),
        ),
        ("classes.delete", json!({ "className": "Biology" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("{}", i + 2);
        let resp = request(&mut stdin, &mut reader, &id, method, params);
        assert_ok(&resp, method);
    }

    let listed = request(&mut stdin, &mut reader, "90", "classes.list", json!({}));
    assert_eq!(listed["result"]["classes"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_methods_and_bad_lines_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{\"id\":\"1\",\"method\":\"grades.teleport\"}}").expect("write");
    stdin.flush().expect("flush");
    let unknown = read_response(&mut reader);
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "this is not json").expect("write");
    stdin.flush().expect("flush");
    let bad = read_response(&mut reader);
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    // The loop keeps serving after a bad line.
    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_ok(&health, "health");
    assert!(health["result"]["workspacePath"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mutations_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "History" }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "no_workspace");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "settings.defaultScale.get",
        json!({}),
    );
    assert_eq!(resp["error"]["code"], "no_workspace");

    drop(stdin);
    let _ = child.wait();
}
