// CLI integration tests for decode/check flows.
use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

const FORMAT: &str = r#"{
    "name": "skiff",
    "table_skiff_schemas": ["$row", "$row"],
    "skiff_schema_registry": {
        "row": {"wire_type": "tuple", "children": [
            {"wire_type": "variant8", "name": "first",
             "children": [{"wire_type": "nothing"}, {"wire_type": "int64"}]},
            {"wire_type": "string32", "name": "third"}
        ]}
    }
}"#;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_skiff");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn row(table: u16, row_index: Option<i64>, first: Option<i64>, third: &[u8]) -> Vec<u8> {
    let mut out = table.to_le_bytes().to_vec();
    out.push(0x00);
    for optional in [row_index, None, first] {
        match optional {
            Some(value) => {
                out.push(0x01);
                out.extend_from_slice(&value.to_le_bytes());
            }
            None => out.push(0x00),
        }
    }
    out.extend_from_slice(&(third.len() as u32).to_le_bytes());
    out.extend_from_slice(third);
    out
}

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> String {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write fixture");
    path.to_str().expect("utf8 path").to_string()
}

#[test]
fn decode_emits_one_json_line_per_row() {
    let temp = tempfile::tempdir().expect("tempdir");
    let format = write_fixture(temp.path(), "format.json", FORMAT.as_bytes());
    let mut stream = row(0, Some(10), None, b"abbacaba");
    stream.extend(row(1, Some(0), Some(5), b""));
    stream.extend(row(0, None, Some(-1), b"x"));
    let input = write_fixture(temp.path(), "rows.skiff", &stream);

    let output = cmd()
        .args(["decode", "--format", &format, "--input", &input])
        .output()
        .expect("decode");
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<Value> = text.lines().map(parse_json).collect();
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0]["table_index"], 0);
    assert_eq!(lines[0]["row_index"], 10);
    assert_eq!(lines[0]["row"]["first"], Value::Null);
    assert_eq!(lines[0]["row"]["third"], "abbacaba");
    assert_eq!(lines[1]["table_index"], 1);
    assert_eq!(lines[1]["row"]["first"], 5);
    assert_eq!(lines[2]["row_index"], 11);
    assert_eq!(lines[2]["range_index"], Value::Null);
}

#[test]
fn decode_filters_by_table_and_limit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let format = write_fixture(temp.path(), "format.json", FORMAT.as_bytes());
    let mut stream = Vec::new();
    for i in 0..4 {
        stream.extend(row(i % 2, Some(i as i64), None, b""));
    }
    let input = write_fixture(temp.path(), "rows.skiff", &stream);

    let output = cmd()
        .args([
            "decode", "--format", &format, "--input", &input, "--table", "1", "--limit", "1",
        ])
        .output()
        .expect("decode");
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf8");
    let lines: Vec<Value> = text.lines().map(parse_json).collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["table_index"], 1);
    assert_eq!(lines[0]["row_index"], 1);
}

#[test]
fn truncated_stream_keeps_good_rows_and_reports_json_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let format = write_fixture(temp.path(), "format.json", FORMAT.as_bytes());
    let mut stream = row(0, Some(1), None, b"ok");
    let mut broken = row(0, None, None, b"abbacaba");
    broken.truncate(broken.len() - 5);
    stream.extend(broken);
    let input = write_fixture(temp.path(), "rows.skiff", &stream);

    let output = cmd()
        .args(["decode", "--format", &format, "--input", &input])
        .output()
        .expect("decode");
    assert_eq!(output.status.code(), Some(6));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(stdout.lines().count(), 1);

    let stderr = String::from_utf8(output.stderr).expect("utf8");
    let err = parse_json(stderr.lines().last().expect("error line"));
    assert_eq!(err["error"]["kind"], "Decode");
    assert_eq!(err["error"]["row"], 2);
    assert_eq!(err["error"]["column"], "third");
}

#[test]
fn check_reports_resolved_tables() {
    let temp = tempfile::tempdir().expect("tempdir");
    let format = write_fixture(temp.path(), "format.json", FORMAT.as_bytes());

    let output = cmd()
        .args(["check", "--format", &format])
        .output()
        .expect("check");
    assert!(output.status.success());
    let value = parse_json(std::str::from_utf8(&output.stdout).expect("utf8"));
    assert_eq!(value["name"], "skiff");
    let tables = value["tables"].as_array().expect("tables");
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0]["columns"][0]["name"], "first");
    assert_eq!(tables[0]["columns"][0]["optional"], true);
    assert_eq!(tables[0]["columns"][1]["wire_type"], "string32");
}

#[test]
fn check_rejects_undefined_reference() {
    let temp = tempfile::tempdir().expect("tempdir");
    let format = write_fixture(
        temp.path(),
        "format.json",
        br#"{"name": "skiff", "table_skiff_schemas": ["$missing"]}"#,
    );

    let output = cmd()
        .args(["check", "--format", &format])
        .output()
        .expect("check");
    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    let err = parse_json(stderr.lines().last().expect("error line"));
    assert_eq!(err["error"]["kind"], "Schema");
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("missing")
    );
}

#[test]
fn missing_format_file_is_io_error() {
    let output = cmd()
        .args(["check", "--format", "/nonexistent/format.json"])
        .output()
        .expect("check");
    assert_eq!(output.status.code(), Some(3));
}
