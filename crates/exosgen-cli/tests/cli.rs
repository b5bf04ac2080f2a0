use std::path::Path;
use std::process::Command;

use serde_json::Value;

const ROBOT: &str = r#"
TYPE
    Position : STRUCT
        X : REAL;
        Y : REAL;
    END_STRUCT;
    Robot : STRUCT
        Position : Position;
        Speed : REAL; (* mm/s *)
    END_STRUCT;
END_TYPE
"#;

fn run_exosgen(args: &[&str]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_exosgen");
    Command::new(exe)
        .args(args)
        .env_remove("EXOSGEN_LOG")
        .output()
        .expect("run exosgen")
}

fn parse_json_stdout(out: &std::process::Output) -> Value {
    serde_json::from_slice(&out.stdout).expect("parse stdout JSON")
}

fn stderr(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn write_bytes(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, bytes).expect("write file");
}

fn path_str(p: &Path) -> &str {
    p.to_str().expect("utf-8 path")
}

#[test]
fn generate_writes_tree_and_refuses_to_overwrite() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("robot.typ");
    write_bytes(&src, ROBOT.as_bytes());
    let out_dir = tmp.path().join("out");

    let args = [
        "generate",
        "--typ",
        path_str(&src),
        "--type",
        "Robot",
        "--out",
        path_str(&out_dir),
    ];
    let out = run_exosgen(&args);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    let v = parse_json_stdout(&out);
    assert_eq!(v["type_name"], "Robot");
    assert_eq!(v["library_name"], "Robot");
    assert_eq!(v["target"], "c-static-lib");
    assert_eq!(v["size"], 12);
    assert_eq!(v["fields"], 3);
    assert_eq!(v["files"].as_array().map(Vec::len), Some(4));
    assert!(out_dir.join("Robot/Linux/librobot.c").is_file());
    assert!(out_dir.join("Robot/Robot/exos_robot.h").is_file());

    let out = run_exosgen(&args);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[EXG0400]"), "stderr:\n{err}");
    assert!(err.contains("already exists, choose another output folder"), "stderr:\n{err}");
    assert!(err.contains("\n  help: Remove the folder"), "stderr:\n{err}");

    let mut check = args.to_vec();
    check.push("--check");
    let out = run_exosgen(&check);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));

    write_bytes(&out_dir.join("Robot/Robot/librobot.c"), b"/* edited */\n");
    let out = run_exosgen(&check);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[EXG0403]"));
}

#[test]
fn schema_errors_carry_their_code_and_context() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("robot.typ");
    write_bytes(&src, ROBOT.as_bytes());

    let out = run_exosgen(&[
        "generate",
        "--typ",
        path_str(&src),
        "--type",
        "Conveyor",
        "--out",
        path_str(&tmp.path().join("out")),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[EXG0002]"), "stderr:\n{err}");
    assert!(err.contains("generate Conveyor from"), "stderr:\n{err}");
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn layout_prints_offsets() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("robot.typ");
    write_bytes(&src, ROBOT.as_bytes());

    let out = run_exosgen(&["layout", "--typ", path_str(&src), "--type", "Robot"]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    let v = parse_json_stdout(&out);
    assert_eq!(v["size"], 12);
    let leaves = v["leaves"].as_array().expect("leaves[]");
    let paths: Vec<(&str, u64)> = leaves
        .iter()
        .map(|l| {
            (
                l["path"].as_str().expect("path"),
                l["offset"].as_u64().expect("offset"),
            )
        })
        .collect();
    assert_eq!(paths, vec![("Position.X", 0), ("Position.Y", 4), ("Speed", 8)]);
}

#[test]
fn check_names_follows_the_target_budget() {
    let out = run_exosgen(&["check-names", "ConveyorA", "ConveyorB"]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    let v = parse_json_stdout(&out);
    assert_eq!(v["budget"], 10);
    assert_eq!(v["names"][0]["library_name"], "ConveyorA");

    let out = run_exosgen(&["check-names", "--target", "swig", "ConveyorA", "ConveyorB"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[EXG0300]"), "stderr:\n{err}");
    assert!(err.contains("\"Conveyo\""), "stderr:\n{err}");

    let out = run_exosgen(&[
        "check-names",
        "--target",
        "swig",
        "--library-name-len",
        "9",
        "ConveyorA",
        "ConveyorB",
    ]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
}

#[test]
fn batch_resolves_paths_against_the_manifest() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path();
    write_bytes(&root.join("types/robot.typ"), ROBOT.as_bytes());
    write_bytes(
        &root.join("types/tank.typ"),
        b"TYPE WaterTank : STRUCT Level : LREAL; END_STRUCT; END_TYPE\n",
    );
    let manifest = serde_json::json!({
        "schema_version": "exosgen.manifest@0.1.0",
        "entries": [
            { "source": "types/robot.typ", "type": "Robot", "out_root": "gen" },
            { "source": "types/tank.typ", "type": "WaterTank", "out_root": "gen" }
        ]
    });
    let manifest_path = root.join("exosgen.json");
    write_bytes(
        &manifest_path,
        serde_json::to_string_pretty(&manifest).expect("json").as_bytes(),
    );

    let out = run_exosgen(&["batch", "--manifest", path_str(&manifest_path)]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    assert_eq!(parse_json_stdout(&out).as_array().map(Vec::len), Some(2));
    assert!(root.join("gen/Robot/Linux/librobot.c").is_file());
    assert!(root.join("gen/WaterTank/WaterTank/libwatertank.c").is_file());

    let out = run_exosgen(&["batch", "--manifest", path_str(&manifest_path), "--check"]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    let reports = parse_json_stdout(&out);
    assert_eq!(reports[1]["library_name"], "WaterTank");
    assert_eq!(reports[0]["fields"], 3);
}

#[test]
fn batch_rejects_unknown_manifest_schema() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let manifest_path = tmp.path().join("exosgen.json");
    write_bytes(
        &manifest_path,
        br#"{ "schema_version": "exosgen.manifest@9", "entries": [] }"#,
    );
    let out = run_exosgen(&["batch", "--manifest", path_str(&manifest_path)]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("schema_version mismatch"));
}

#[test]
fn config_file_sets_target_and_timing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("robot.typ");
    write_bytes(&src, ROBOT.as_bytes());
    let cfg = tmp.path().join("exosgen.config.json");
    write_bytes(
        &cfg,
        br#"{ "target": "swig", "handshake_timeout_ms": 1200, "emit_layout_json": true }"#,
    );
    let out_dir = tmp.path().join("out");

    let out = run_exosgen(&[
        "generate",
        "--typ",
        path_str(&src),
        "--type",
        "Robot",
        "--out",
        path_str(&out_dir),
        "--config",
        path_str(&cfg),
    ]);
    assert_eq!(out.status.code(), Some(0), "stderr:\n{}", stderr(&out));
    let header = std::fs::read_to_string(out_dir.join("Robot/libRobot/exos_robot.h"))
        .expect("read header");
    assert!(header.contains("#define ROBOT_HANDSHAKE_TIMEOUT_MS 1200u\n"));
    assert!(out_dir.join("Robot/Robot.layout.json").is_file());
}

#[test]
fn invalid_config_is_reported() {
    let out = run_exosgen(&["check-names", "--library-name-len", "0", "Robot"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("error[EXG0500]"));
}

#[test]
fn diagnostics_catalog_is_markdown() {
    let out = run_exosgen(&["diagnostics"]);
    assert_eq!(out.status.code(), Some(0));
    let md = String::from_utf8(out.stdout).expect("utf-8");
    assert!(md.starts_with("# exosgen diagnostics catalog\n"));
    assert!(md.contains("| EXG0400 |"));
    assert!(md.contains("| EXG0300 |"));
}
