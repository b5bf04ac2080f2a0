use crate::error::SchemaError;

const C_KEYWORDS: &[&str] = &[
    "auto", "bool", "break", "case", "char", "const", "continue", "default", "do", "double",
    "else", "enum", "extern", "false", "float", "for", "goto", "if", "inline", "int", "long",
    "register", "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "true", "typedef", "union", "unsigned", "void", "volatile", "while", "_Bool", "_Static_assert",
];

const IEC_KEYWORDS: &[&str] = &[
    "ARRAY", "BY", "CASE", "CONSTANT", "DO", "ELSE", "ELSIF", "END_CASE", "END_FOR", "END_IF",
    "END_REPEAT", "END_STRUCT", "END_TYPE", "END_VAR", "END_WHILE", "EXIT", "FOR", "IF", "OF",
    "REPEAT", "RETURN", "STRING", "STRUCT", "THEN", "TO", "TYPE", "UNTIL", "VAR", "VAR_GLOBAL",
    "WHILE", "WSTRING",
];

/// Checks that `name` can be used verbatim as an IEC and a C identifier.
pub fn check_identifier(name: &str, line: u32, max_len: usize) -> Result<(), SchemaError> {
    let fail = |reason: String| SchemaError::IllegalIdentifier {
        line,
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(fail("empty name".to_string()));
    };
    if !(first == '_' || first.is_ascii_alphabetic()) {
        return Err(fail("must start with a letter or '_'".to_string()));
    }
    if let Some(bad) = chars.find(|c| !(*c == '_' || c.is_ascii_alphanumeric())) {
        return Err(fail(format!("contains {bad:?}")));
    }
    // Nested field paths are joined with "__" in generated C names.
    if name.contains("__") {
        return Err(fail("contains consecutive underscores".to_string()));
    }
    if name.len() > 1 && name.ends_with('_') {
        return Err(fail("ends with '_'".to_string()));
    }
    if name.chars().count() > max_len {
        return Err(fail(format!("longer than {max_len} characters")));
    }
    if C_KEYWORDS.contains(&name) {
        return Err(fail("reserved word in C".to_string()));
    }
    if IEC_KEYWORDS.iter().any(|kw| kw.eq_ignore_ascii_case(name)) {
        return Err(fail("reserved word in IEC 61131-3".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(name: &str) -> String {
        match check_identifier(name, 1, 32) {
            Err(SchemaError::IllegalIdentifier { reason, .. }) => reason,
            other => panic!("expected IllegalIdentifier for {name:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["Speed", "_x", "Axis_1", "position"] {
            check_identifier(ok, 1, 32).expect(ok);
        }
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(reason(""), "empty name");
        assert_eq!(reason("1st"), "must start with a letter or '_'");
        assert_eq!(reason("a__b"), "contains consecutive underscores");
        assert_eq!(reason("speed_"), "ends with '_'");
        assert_eq!(reason("a-b"), "contains '-'");
    }

    #[test]
    fn rejects_reserved_words() {
        assert_eq!(reason("float"), "reserved word in C");
        assert_eq!(reason("end_struct"), "reserved word in IEC 61131-3");
    }

    #[test]
    fn enforces_length_budget() {
        assert!(check_identifier("abcdefgh", 1, 8).is_ok());
        assert!(check_identifier("abcdefghi", 1, 8).is_err());
    }
}
