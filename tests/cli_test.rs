//! CLI integration tests for the restwalk binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("restwalk"))
}

// Helper to create a temp document file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const ITEM: &str = r#"{
    "id": "item",
    "resources": {
        "item": {
            "type": "object",
            "properties": { "id": { "type": "integer" }, "label": { "type": "string" } },
            "links": {
                "self": { "path": "$/items/{id}" },
                "get": { "method": "GET" }
            }
        }
    }
}"#;

const ORDER: &str = r##"{
    "id": "order",
    "resources": {
        "order": {
            "properties": { "item": { "$ref": "item#/resources/item" } },
            "links": { "self": { "path": "$/orders/{id}" }, "get": { "method": "GET" } },
            "relations": {
                "item": { "resource": "item#/resources/item", "vars": { "id": "0/item/id" } }
            }
        }
    }
}"##;

mod check_command {
    use super::*;

    #[test]
    fn valid_set_passes() {
        let dir = TempDir::new().unwrap();
        write_temp_file(&dir, "item.json", ITEM);
        write_temp_file(&dir, "order.json", ORDER);

        cmd()
            .args(["check", dir.path().to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 files checked, all passed"));
    }

    #[test]
    fn broken_reference_fails() {
        let dir = TempDir::new().unwrap();
        let order = write_temp_file(&dir, "order.json", ORDER);

        cmd()
            .args(["check", order.to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("E003"))
            .stdout(predicate::str::contains("item#/resources/item"));
    }

    #[test]
    fn syntax_error_fails() {
        let dir = TempDir::new().unwrap();
        let bad = write_temp_file(&dir, "bad.json", "{ nope");

        cmd()
            .args(["check", bad.to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("E001"));
    }

    #[test]
    fn json_format() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        let output = cmd()
            .args(["check", item.to_str().unwrap(), "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["files_checked"], 1);
        assert_eq!(report["errors"], 0);
        assert_eq!(report["results"][0]["document"], "item");
        assert_eq!(report["results"][0]["status"], "ok");
    }

    #[test]
    fn strict_fails_on_warnings() {
        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(
            &dir,
            "docs.json",
            r#"{
                "id": "docs",
                "resources": {
                    "page": { "links": { "self": { "path": "$/page" }, "help": { "path": "$/help" } } }
                }
            }"#,
        );

        cmd()
            .args(["check", doc.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("W001"));

        cmd()
            .args(["check", doc.to_str().unwrap(), "--strict"])
            .assert()
            .code(1);
    }

    #[test]
    fn needs_a_path() {
        cmd().arg("check").assert().failure();
    }
}

mod resolve_command {
    use super::*;

    #[test]
    fn prints_flattened_definition() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);
        let order = write_temp_file(&dir, "order.json", ORDER);

        cmd()
            .args([
                "resolve",
                order.to_str().unwrap(),
                item.to_str().unwrap(),
                "--ref",
                "order#/resources/order",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""id":"order#/resources/order""#))
            .stdout(predicate::str::contains(r#""$ref":"item#/resources/item""#));
    }

    #[test]
    fn bare_names_resolve_in_the_first_document() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        cmd()
            .args(["resolve", item.to_str().unwrap(), "--ref", "item", "--pretty"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"type\": \"object\""));
    }

    #[test]
    fn writes_output_file() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);
        let out = dir.path().join("out.json");

        cmd()
            .args([
                "resolve",
                item.to_str().unwrap(),
                "--ref",
                "item#/resources/item",
                "--output",
                out.to_str().unwrap(),
            ])
            .assert()
            .success();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written["links"]["get"]["method"], "GET");
    }

    #[test]
    fn unknown_reference_exits_2() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        cmd()
            .args(["resolve", item.to_str().unwrap(), "--ref", "item#/types/nothing"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Error"));
    }

    #[test]
    fn missing_file_exits_3() {
        cmd()
            .args(["resolve", "/nonexistent/doc.json", "--ref", "x#/resources/x"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }

    #[test]
    fn duplicate_document_id_exits_2() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);
        let copy = write_temp_file(&dir, "copy.json", ITEM);

        cmd()
            .args([
                "resolve",
                item.to_str().unwrap(),
                copy.to_str().unwrap(),
                "--ref",
                "item#/resources/item",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("defined more than once"));
    }

    #[test]
    fn missing_dependency_exits_2() {
        let dir = TempDir::new().unwrap();
        let order = write_temp_file(&dir, "order.json", ORDER);

        cmd()
            .args(["resolve", order.to_str().unwrap(), "--ref", "order#/resources/order"])
            .assert()
            .code(2);
    }
}

#[cfg(feature = "remote")]
mod get_command {
    use super::*;

    #[test]
    fn fetches_and_prints() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/items/7")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"id": 7, "label": "seven"}"#)
            .create();

        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        cmd()
            .args([
                "get",
                item.to_str().unwrap(),
                "--doc",
                "item",
                "--host",
                &server.url(),
                "--resource",
                "item",
                "--var",
                "id=7",
                "--bearer",
                "tok",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""label":"seven""#));
        mock.assert();
    }

    #[test]
    fn http_error_exits_1() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/items/8").with_status(404).create();

        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        cmd()
            .args([
                "get",
                item.to_str().unwrap(),
                "--doc",
                "item",
                "--host",
                &server.url(),
                "--resource",
                "item",
                "--var",
                "id=8",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("HTTP 404"));
    }

    #[test]
    fn missing_variable_exits_2() {
        let dir = TempDir::new().unwrap();
        let item = write_temp_file(&dir, "item.json", ITEM);

        cmd()
            .args([
                "get",
                item.to_str().unwrap(),
                "--doc",
                "item",
                "--host",
                "h1",
                "--resource",
                "item",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("'id'"));
    }

    #[test]
    fn malformed_var_is_rejected() {
        cmd()
            .args([
                "get", "x.json", "--doc", "x", "--host", "h1", "--resource", "x", "--var", "nope",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("name=value"));
    }
}
