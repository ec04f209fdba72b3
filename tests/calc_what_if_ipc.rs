use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
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

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value["ok"], false, "{} unexpectedly succeeded", method);
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

fn f(v: &serde_json::Value) -> f64 {
    v.as_f64().expect("number")
}

fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-6
}

fn seed_english(s: &mut ChildStdin, r: &mut BufReader<ChildStdout>, workspace: &Path) {
    request_ok(s, r, "1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    request_ok(s, r, "2", "classes.create", json!({ "name": "English" }));
    request_ok(
        s,
        r,
        "3",
        "categories.add",
        json!({ "className": "English", "name": "Essays", "weight": 60 }),
    );
    request_ok(
        s,
        r,
        "4",
        "categories.add",
        json!({ "className": "English", "name": "Final", "weight": 40 }),
    );
    request_ok(
        s,
        r,
        "5",
        "grades.add",
        json!({ "className": "English", "categoryName": "Essays", "value": 80 }),
    );
}

#[test]
fn what_if_appends_scores_without_touching_the_class() {
    let workspace = temp_dir("gradebook-what-if");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;
    seed_english(s, r, &workspace);

    let listed = request_ok(
        s,
        r,
        "6",
        "calc.whatIf",
        json!({ "className": "English", "hypothetical": { "final": [90, 100] } }),
    );
    assert!(close(f(&listed["currentFinalGrade"]), 80.0));
    assert_eq!(listed["currentLetterGrade"], "B-");
    assert!(close(f(&listed["finalGrade"]), 86.0));
    assert_eq!(listed["letterGrade"], "B");

    // Projected averages also feed the imputed value of ungraded categories.
    let uniform = request_ok(
        s,
        r,
        "7",
        "calc.whatIf",
        json!({
            "className": "English",
            "hypothetical": { "Essays": { "remaining": 1, "average": 100 } }
        }),
    );
    assert!(close(f(&uniform["finalGrade"]), 90.0));
    assert_eq!(uniform["breakdown"]["categories"][1]["imputed"], true);

    let summary = request_ok(s, r, "8", "calc.classSummary", json!({ "className": "English" }));
    assert!(close(f(&summary["finalGrade"]), 80.0));
    assert_eq!(summary["categories"][0]["grades"], json!([80.0]));
    assert_eq!(summary["categories"][1]["grades"], json!([]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn padded_category_keys_still_apply() {
    let workspace = temp_dir("gradebook-what-if-padded");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;
    seed_english(s, r, &workspace);

    let listed = request_ok(
        s,
        r,
        "6",
        "calc.whatIf",
        json!({ "className": "English", "hypothetical": { " Final ": [90, 100] } }),
    );
    assert!(close(f(&listed["finalGrade"]), 86.0));
    assert_eq!(listed["breakdown"]["categories"][1]["grades"], json!([90.0, 100.0]));

    let uniform = request_ok(
        s,
        r,
        "7",
        "calc.whatIf",
        json!({
            "className": "English",
            "hypothetical": { "  essays": { "remaining": 1, "average": 100 } }
        }),
    );
    assert!(close(f(&uniform["finalGrade"]), 90.0));
    assert_eq!(uniform["breakdown"]["categories"][0]["grades"], json!([80.0, 100.0]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn what_if_rejects_bad_hypotheticals() {
    let workspace = temp_dir("gradebook-what-if-bad");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;
    seed_english(s, r, &workspace);

    assert_eq!(
        request_err_code(
            s,
            r,
            "6",
            "calc.whatIf",
            json!({ "className": "English", "hypothetical": { "Projects": [90] } })
        ),
        "not_found"
    );
    assert_eq!(
        request_err_code(
            s,
            r,
            "7",
            "calc.whatIf",
            json!({ "className": "English", "hypothetical": { "Final": [120] } })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            s,
            r,
            "8",
            "calc.whatIf",
            json!({ "className": "English", "hypothetical": { "Final": { "average": 90 } } })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            s,
            r,
            "9",
            "calc.whatIf",
            json!({ "className": "English", "hypothetical": [90] })
        ),
        "bad_params"
    );
    assert_eq!(
        request_err_code(
            s,
            r,
            "10",
            "calc.whatIf",
            json!({ "className": "Latin", "hypothetical": {} })
        ),
        "not_found"
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
