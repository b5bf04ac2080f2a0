use exosgen_core::layout::{resolve, MAX_LEAF_COUNT, MAX_NESTING_DEPTH};
use exosgen_core::typ::{self, ParseOptions};
use exosgen_core::{FieldLayout, LayoutError};

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

fn layout_of(src: &str, type_name: &str) -> Result<FieldLayout, LayoutError> {
    let model = typ::parse(src, type_name, &ParseOptions::default()).expect("parse");
    resolve(&model)
}

#[test]
fn robot_layout_is_flat_and_packed() {
    let layout = layout_of(ROBOT, "Robot").expect("layout");
    assert_eq!(layout.size, 12);

    let leaves: Vec<(&str, &str, u32, u32)> = layout
        .leaves
        .iter()
        .map(|l| (l.path.as_str(), l.flag_name.as_str(), l.offset, l.size))
        .collect();
    assert_eq!(
        leaves,
        vec![
            ("Position.X", "Position__X", 0, 4),
            ("Position.Y", "Position__Y", 4, 4),
            ("Speed", "Speed", 8, 4),
        ]
    );

    let records: Vec<(&str, u32)> = layout
        .records
        .iter()
        .map(|r| (r.name.as_str(), r.size))
        .collect();
    assert_eq!(records, vec![("Position", 8), ("Robot", 12)]);
    assert_eq!(layout.record_size("Position"), Some(8));
    assert_eq!(layout.record_size("Speed"), None);

    assert_eq!(layout.fingerprint.len(), 16);
    assert!(layout.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        layout.fingerprint_u64(),
        u64::from_str_radix(&layout.fingerprint, 16).expect("hex")
    );
}

#[test]
fn resolving_twice_gives_identical_layouts() {
    let a = layout_of(ROBOT, "Robot").expect("layout");
    let b = layout_of(ROBOT, "Robot").expect("layout");
    assert_eq!(a, b);
}

#[test]
fn declaration_order_does_not_change_the_layout() {
    let reordered = r#"
TYPE
    Robot : STRUCT
        Position : Position;
        Speed : REAL;
    END_STRUCT;
    Position : STRUCT
        X : REAL;
        Y : REAL;
    END_STRUCT;
END_TYPE
"#;
    let a = layout_of(ROBOT, "Robot").expect("layout");
    let b = layout_of(reordered, "Robot").expect("layout");
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.leaves, b.leaves);
}

#[test]
fn field_order_changes_the_fingerprint() {
    let swapped = r#"
TYPE
    Position : STRUCT
        Y : REAL;
        X : REAL;
    END_STRUCT;
    Robot : STRUCT
        Position : Position;
        Speed : REAL;
    END_STRUCT;
END_TYPE
"#;
    let a = layout_of(ROBOT, "Robot").expect("layout");
    let b = layout_of(swapped, "Robot").expect("layout");
    assert_eq!(a.size, b.size);
    assert_ne!(a.fingerprint, b.fingerprint);
}

#[test]
fn arrays_and_strings_are_single_leaves() {
    let src = r#"
TYPE
    Point : STRUCT
        X : LREAL;
    END_STRUCT;
    Path : STRUCT
        Name : STRING[10];
        Grid : ARRAY[0..1, 0..2] OF INT;
        Points : ARRAY[1..3] OF Point;
        Enabled : BOOL;
    END_STRUCT;
END_TYPE
"#;
    let layout = layout_of(src, "Path").expect("layout");
    let leaves: Vec<(&str, u32, u32)> = layout
        .leaves
        .iter()
        .map(|l| (l.path.as_str(), l.offset, l.size))
        .collect();
    assert_eq!(
        leaves,
        vec![
            ("Name", 0, 11),
            ("Grid", 11, 12),
            ("Points", 23, 24),
            ("Enabled", 47, 1),
        ]
    );
    assert_eq!(layout.size, 48);
}

#[test]
fn mutual_recursion_is_a_cycle() {
    let src = r#"
TYPE
    A : STRUCT
        Next : B;
    END_STRUCT;
    B : STRUCT
        Back : A;
    END_STRUCT;
END_TYPE
"#;
    let err = layout_of(src, "A").unwrap_err();
    assert_eq!(
        err,
        LayoutError::Cycle {
            path: vec!["A".to_string(), "B".to_string(), "A".to_string()]
        }
    );
}

#[test]
fn self_reference_through_an_array_is_a_cycle() {
    let src = "TYPE Node : STRUCT Children : ARRAY[0..1] OF Node; END_STRUCT; END_TYPE";
    let err = layout_of(src, "Node").unwrap_err();
    assert_eq!(
        err,
        LayoutError::Cycle {
            path: vec!["Node".to_string(), "Node".to_string()]
        }
    );
}

#[test]
fn empty_record_is_rejected() {
    let src = "TYPE Outer : STRUCT Inner : Inner; END_STRUCT; Inner : STRUCT END_STRUCT; END_TYPE";
    let err = layout_of(src, "Outer").unwrap_err();
    assert_eq!(
        err,
        LayoutError::EmptyRecord {
            name: "Inner".to_string()
        }
    );
}

#[test]
fn nesting_depth_is_bounded() {
    let mut src = String::from("TYPE\n");
    let depth = MAX_NESTING_DEPTH + 6;
    for i in 0..depth {
        src.push_str(&format!("R{i} : STRUCT Inner : R{} ; END_STRUCT;\n", i + 1));
    }
    src.push_str(&format!("R{depth} : STRUCT X : INT; END_STRUCT;\nEND_TYPE\n"));

    let err = layout_of(&src, "R0").unwrap_err();
    match err {
        LayoutError::TooDeep { limit, path } => {
            assert_eq!(limit, MAX_NESTING_DEPTH);
            assert_eq!(path.len(), MAX_NESTING_DEPTH + 1);
            assert_eq!(path[0], "R0");
        }
        other => panic!("expected TooDeep, got {other:?}"),
    }
}

#[test]
fn moderate_nesting_is_fine() {
    let mut src = String::from("TYPE\n");
    for i in 0..10 {
        src.push_str(&format!("R{i} : STRUCT Inner : R{} ; Pad : BYTE; END_STRUCT;\n", i + 1));
    }
    src.push_str("R10 : STRUCT X : INT; END_STRUCT;\nEND_TYPE\n");
    let layout = layout_of(&src, "R0").expect("layout");
    assert_eq!(layout.size, 12);
    assert_eq!(layout.leaves[0].path, format!("{}X", "Inner.".repeat(10)));
    assert_eq!(layout.leaves[0].flag_name, format!("{}X", "Inner__".repeat(10)));
}

#[test]
fn oversized_layout_is_rejected() {
    let src = "TYPE Big : STRUCT V : ARRAY[0..4000000] OF ARRAY[0..4000] OF LREAL; END_STRUCT; END_TYPE";
    let err = layout_of(src, "Big").unwrap_err();
    assert!(matches!(err, LayoutError::TooLarge { .. }));
}

/// `R0` holds two `R1`, `R1` two `R2`, and so on: `2^levels` leaves.
fn doubling_chain(levels: usize) -> String {
    let mut src = String::from("TYPE\n");
    for i in 0..levels {
        src.push_str(&format!("R{i} : STRUCT A : R{0}; B : R{0}; END_STRUCT;\n", i + 1));
    }
    src.push_str(&format!("R{levels} : STRUCT V : LREAL; END_STRUCT;\nEND_TYPE\n"));
    src
}

#[test]
fn leaf_count_is_bounded() {
    let err = layout_of(&doubling_chain(22), "R0").unwrap_err();
    assert_eq!(err.code(), exosgen_core::diagnostics::DiagnosticCode::EXG0205TooManyFields);
    match err {
        LayoutError::TooManyFields { name, limit } => {
            // R9 is the first record past 4096 leaves counting up from R22.
            assert_eq!(name, "R9");
            assert_eq!(limit, MAX_LEAF_COUNT);
        }
        other => panic!("expected TooManyFields, got {other:?}"),
    }
}

#[test]
fn leaf_count_at_the_limit_is_fine() {
    let layout = layout_of(&doubling_chain(12), "R0").expect("layout");
    assert_eq!(layout.leaves.len(), MAX_LEAF_COUNT);
    assert_eq!(layout.size, 8 * 4096);
    assert_eq!(layout.leaves[1].flag_name, format!("{}B__V", "A__".repeat(11)));
}
