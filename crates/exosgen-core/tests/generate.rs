use std::path::{Path, PathBuf};

use exosgen_core::diagnostics::DiagnosticCode;
use exosgen_core::generate::BatchEntry;
use exosgen_core::{
    generate, write_generation, GenerateError, GeneratorConfig, PreconditionError, SchemaError,
    Target,
};

const ROBOT: &str = r#"
TYPE
    Position : STRUCT
        X : REAL;
        Y : REAL;
    END_STRUCT;
    Robot : STRUCT
        Position : Position;
        Speed : REAL;
    END_STRUCT;
END_TYPE
"#;

fn files_under(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        entries.sort();
        for p in entries {
            if p.is_dir() {
                walk(root, &p, out);
            } else {
                let rel = p.strip_prefix(root).expect("prefix");
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out
}

fn write_source(dir: &Path, name: &str, src: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, src).expect("write source");
    path
}

fn single_struct(type_name: &str) -> String {
    format!("TYPE {type_name} : STRUCT Level : LREAL; END_STRUCT; END_TYPE\n")
}

#[test]
fn writes_the_component_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out");
    let generation = generate(ROBOT, "Robot", &GeneratorConfig::default()).expect("generate");

    let dest = write_generation(&out, &generation).expect("write");
    assert_eq!(dest, out.join("Robot"));
    assert_eq!(
        files_under(&out),
        vec![
            "Robot/Linux/exos_robot.h",
            "Robot/Linux/librobot.c",
            "Robot/Robot/exos_robot.h",
            "Robot/Robot/librobot.c",
        ]
    );

    let on_disk = std::fs::read_to_string(dest.join("Linux/librobot.c")).expect("read");
    let expected = &generation.artifact("Linux/librobot.c").expect("artifact").contents;
    assert_eq!(&on_disk, expected);
    assert_eq!(generation.report().files, files_under(&out));
}

#[test]
fn existing_component_is_left_untouched() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path();
    std::fs::create_dir_all(out.join("Robot")).expect("mkdir");
    std::fs::write(out.join("Robot/keep.txt"), "mine").expect("write");

    let generation = generate(ROBOT, "Robot", &GeneratorConfig::default()).expect("generate");
    let err = write_generation(out, &generation).unwrap_err();
    assert!(matches!(
        err,
        GenerateError::Precondition(PreconditionError::OutputExists { .. })
    ));
    assert_eq!(err.code(), DiagnosticCode::EXG0400OutputExists);
    assert!(err
        .to_string()
        .contains("already exists, choose another output folder"));

    assert_eq!(files_under(out), vec!["Robot/keep.txt"]);
    assert!(!out.join(".Robot.exosgen-staging").exists());
}

#[test]
fn output_root_must_be_a_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out");
    std::fs::write(&out, "not a dir").expect("write");

    let generation = generate(ROBOT, "Robot", &GeneratorConfig::default()).expect("generate");
    let err = write_generation(&out, &generation).unwrap_err();
    assert_eq!(err.code(), DiagnosticCode::EXG0401OutputNotDirectory);
}

#[test]
fn swig_places_the_ar_side_in_a_lib_directory() {
    let cfg = GeneratorConfig::for_target(Target::Swig);
    let robot = generate(ROBOT, "Robot", &cfg).expect("generate");
    assert_eq!(robot.library_name, "Robot");
    assert!(robot.artifact("libRobot/librobot.c").is_some());

    let tank = generate(&single_struct("WaterTank"), "WaterTank", &cfg).expect("generate");
    assert_eq!(tank.library_name, "WaterTa");
    assert!(tank.artifact("libWaterTa/exos_watertank.h").is_some());
    assert!(tank.artifact("Linux/libwatertank.c").is_some());
}

#[test]
fn library_name_len_overrides_the_target_budget() {
    let cfg = GeneratorConfig {
        library_name_len: Some(4),
        ..GeneratorConfig::default()
    };
    let generation = generate(ROBOT, "Robot", &cfg).expect("generate");
    assert_eq!(generation.library_name, "Robo");
    assert!(generation.artifact("Robo/exos_robot.h").is_some());
}

#[test]
fn layout_json_is_optional() {
    let plain = generate(ROBOT, "Robot", &GeneratorConfig::default()).expect("generate");
    assert!(plain.artifact("Robot.layout.json").is_none());

    let cfg = GeneratorConfig {
        emit_layout_json: true,
        ..GeneratorConfig::default()
    };
    let generation = generate(ROBOT, "Robot", &cfg).expect("generate");
    let json = &generation.artifact("Robot.layout.json").expect("layout json").contents;
    let v: serde_json::Value = serde_json::from_str(json).expect("json");
    assert_eq!(v["type_name"], "Robot");
    assert_eq!(v["size"], 12);
    assert_eq!(v["leaves"].as_array().map(Vec::len), Some(3));
    assert_eq!(v["fingerprint"], generation.layout.fingerprint.as_str());
}

#[test]
fn records_may_not_shadow_generated_types() {
    let src = r#"
TYPE
    robot_status_t : STRUCT
        Code : DINT;
    END_STRUCT;
    Robot : STRUCT
        Status : robot_status_t;
    END_STRUCT;
END_TYPE
"#;
    let err = generate(src, "Robot", &GeneratorConfig::default()).unwrap_err();
    match err {
        GenerateError::Schema(SchemaError::IllegalIdentifier { name, reason, .. }) => {
            assert_eq!(name, "robot_status_t");
            assert_eq!(reason, "collides with a generated C type");
        }
        other => panic!("expected IllegalIdentifier, got {other:?}"),
    }
}

#[test]
fn check_detects_drift() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path();
    let generation = generate(ROBOT, "Robot", &GeneratorConfig::default()).expect("generate");

    let err = generate::check_generation(out, &generation).unwrap_err();
    assert_eq!(err.code(), DiagnosticCode::EXG0403CheckMismatch);

    write_generation(out, &generation).expect("write");
    generate::check_generation(out, &generation).expect("up to date");

    let edited = out.join("Robot/Linux/librobot.c");
    std::fs::write(&edited, "/* hand edit */\n").expect("edit");
    match generate::check_generation(out, &generation).unwrap_err() {
        GenerateError::CheckMismatch { path } => assert_eq!(path, edited),
        other => panic!("expected CheckMismatch, got {other:?}"),
    }
}

#[test]
fn batch_with_conflicting_names_writes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out");
    let a = write_source(tmp.path(), "a.typ", &single_struct("ConveyorA"));
    let b = write_source(tmp.path(), "b.typ", &single_struct("ConveyorB"));
    let entries = vec![
        BatchEntry {
            source: a,
            type_name: "ConveyorA".to_string(),
            out_root: out.clone(),
        },
        BatchEntry {
            source: b,
            type_name: "ConveyorB".to_string(),
            out_root: out.clone(),
        },
    ];

    let err = generate::generate_batch(&entries, &GeneratorConfig::for_target(Target::Swig))
        .unwrap_err();
    match &err {
        GenerateError::NamingConflict(c) => {
            assert_eq!(c.library_name, "Conveyo");
            assert_eq!(c.budget, 7);
        }
        other => panic!("expected NamingConflict, got {other:?}"),
    }
    assert_eq!(err.code(), DiagnosticCode::EXG0300NamingConflict);
    assert!(!out.exists());

    // Ten characters keep the names apart.
    let written = generate::generate_batch(&entries, &GeneratorConfig::default()).expect("batch");
    assert_eq!(written, vec![out.join("ConveyorA"), out.join("ConveyorB")]);
    assert!(out.join("ConveyorA/ConveyorA/libconveyora.c").is_file());
    assert!(out.join("ConveyorB/ConveyorB/libconveyorb.c").is_file());
}

#[test]
fn batch_refuses_duplicate_destinations_before_writing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out");
    let src = write_source(tmp.path(), "robot.typ", ROBOT);
    let entry = BatchEntry {
        source: src,
        type_name: "Robot".to_string(),
        out_root: out.clone(),
    };

    let err = generate::generate_batch(&[entry.clone(), entry], &GeneratorConfig::default())
        .unwrap_err();
    assert_eq!(err.code(), DiagnosticCode::EXG0400OutputExists);
    assert!(!out.exists());
}

#[test]
fn batch_checks_every_destination_first() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let out = tmp.path().join("out");
    std::fs::create_dir_all(out.join("Tank")).expect("mkdir");
    let robot = write_source(tmp.path(), "robot.typ", ROBOT);
    let tank = write_source(tmp.path(), "tank.typ", &single_struct("Tank"));
    let entries = vec![
        BatchEntry {
            source: robot,
            type_name: "Robot".to_string(),
            out_root: out.clone(),
        },
        BatchEntry {
            source: tank,
            type_name: "Tank".to_string(),
            out_root: out.clone(),
        },
    ];

    let err = generate::generate_batch(&entries, &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.code(), DiagnosticCode::EXG0400OutputExists);
    assert!(!out.join("Robot").exists());
}

fn illegal_identifier(err: GenerateError) -> (String, String) {
    match err {
        GenerateError::Schema(SchemaError::IllegalIdentifier { name, reason, .. }) => (name, reason),
        other => panic!("expected IllegalIdentifier, got {other:?}"),
    }
}

#[test]
fn ar_directory_may_not_collide_with_linux() {
    let err = generate(&single_struct("Linux"), "Linux", &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.code(), DiagnosticCode::EXG0100IllegalIdentifier);
    let (name, reason) = illegal_identifier(err);
    assert_eq!(name, "Linux");
    assert_eq!(
        reason,
        "library directory \"Linux\" collides with the PUB side directory \"Linux\""
    );

    // Case-insensitive filesystems fold the two together as well.
    let err = generate(&single_struct("linux"), "linux", &GeneratorConfig::default()).unwrap_err();
    assert_eq!(illegal_identifier(err).0, "linux");

    let cfg = GeneratorConfig {
        library_name_len: Some(5),
        ..GeneratorConfig::default()
    };
    let err = generate(&single_struct("LinuxPlant"), "LinuxPlant", &cfg).unwrap_err();
    assert_eq!(illegal_identifier(err).0, "LinuxPlant");

    // SWIG prefixes the AR directory, so the same type is fine there.
    let cfg = GeneratorConfig::for_target(Target::Swig);
    let generation = generate(&single_struct("Linux"), "Linux", &cfg).expect("generate");
    assert!(generation.artifact("Linux/liblinux.c").is_some());
    assert!(generation.artifact("libLinux/liblinux.c").is_some());
}

#[test]
fn fields_may_not_shadow_generated_macros() {
    let src = "TYPE Robot : STRUCT ROBOT_SIZE : REAL; Speed : REAL; END_STRUCT; END_TYPE";
    let err = generate(src, "Robot", &GeneratorConfig::default()).unwrap_err();
    let (name, reason) = illegal_identifier(err);
    assert_eq!(name, "ROBOT_SIZE");
    assert_eq!(reason, "collides with a generated C macro");

    let nested = r#"
TYPE
    Link : STRUCT
        EXOSGEN_FRAME_ACK : BOOL;
    END_STRUCT;
    Robot : STRUCT
        Comm : Link;
    END_STRUCT;
END_TYPE
"#;
    let err = generate(nested, "Robot", &GeneratorConfig::default()).unwrap_err();
    assert_eq!(illegal_identifier(err).0, "EXOSGEN_FRAME_ACK");

    // C is case-sensitive; only the exact macro spelling clashes.
    let src = "TYPE Robot : STRUCT Robot_Size : REAL; END_STRUCT; END_TYPE";
    generate(src, "Robot", &GeneratorConfig::default()).expect("generate");
}

#[test]
fn records_may_not_shadow_generated_functions_or_macros() {
    let src = r#"
TYPE
    robot_init : STRUCT
        Code : DINT;
    END_STRUCT;
    Robot : STRUCT
        Status : robot_init;
    END_STRUCT;
END_TYPE
"#;
    let err = generate(src, "Robot", &GeneratorConfig::default()).unwrap_err();
    let (name, reason) = illegal_identifier(err);
    assert_eq!(name, "robot_init");
    assert_eq!(reason, "collides with a generated C function");

    let src = src.replace("robot_init", "ROBOT_STATE_ABORTED");
    let err = generate(&src, "Robot", &GeneratorConfig::default()).unwrap_err();
    let (name, reason) = illegal_identifier(err);
    assert_eq!(name, "ROBOT_STATE_ABORTED");
    assert_eq!(reason, "collides with a generated C macro");
}
