//! C emission: the shared header and the two role-specific channel sources.

pub mod channel;
pub mod header;

use crate::layout::LeafField;
use crate::model::FieldKind;
use crate::naming::ArtifactNames;
use crate::protocol::{ChannelRole, ConnectionState, FrameKind, StatusCode};

pub(crate) const GENERATOR: &str = concat!("exosgen ", env!("CARGO_PKG_VERSION"));

/// Guard of the transport block shared by every generated header.
pub(crate) const TRANSPORT_API_GUARD: &str = "EXOSGEN_TRANSPORT_API";

pub(crate) const TRANSPORT_TYPE: &str = "exosgen_transport";

pub(crate) const TRANSPORT_FUNCTIONS: [&str; 6] = [
    "exosgen_transport_open",
    "exosgen_transport_send",
    "exosgen_transport_poll",
    "exosgen_transport_close",
    "exosgen_transport_millis",
    "exosgen_transport_yield",
];

/// `<TYPE>_*` macros, by suffix. The header defines the first seven, each
/// source the last two.
pub(crate) const MACRO_SUFFIXES: [&str; 9] = [
    "CHANNEL_NAME",
    "SIZE",
    "FIELD_COUNT",
    "LAYOUT_FINGERPRINT",
    "HANDSHAKE_TIMEOUT_MS",
    "ANNOUNCE_INTERVAL_MS",
    "FRAME_CAPACITY",
    "LOCAL_ALIAS",
    "LOCAL_ROLE",
];

/// `<type>_*` functions, by suffix: the entry points, then the static helpers.
pub(crate) const FUNCTION_SUFFIXES: [&str; 13] = [
    "init",
    "cyclic_update",
    "terminate",
    "put_u32",
    "get_u32",
    "put_u64",
    "get_u64",
    "send_fingerprint",
    "send_announce",
    "abort",
    "cancelled",
    "open",
    "detect_changes",
];

/// C type and symbol names shared by the header and both sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CNames {
    pub record: String,
    pub prefix: String,
    pub macro_prefix: String,
    pub header_file: String,
    pub guard: String,
    pub changed_t: String,
    pub channel_t: String,
    pub state_t: String,
    pub status_t: String,
}

impl CNames {
    pub fn new(names: &ArtifactNames) -> Self {
        let p = &names.symbol_prefix;
        CNames {
            record: names.type_name.clone(),
            prefix: p.clone(),
            macro_prefix: names.macro_prefix.clone(),
            header_file: names.header_file.clone(),
            guard: names
                .header_file
                .to_ascii_uppercase()
                .replace(['.', '-'], "_"),
            changed_t: format!("{p}_changed_t"),
            channel_t: format!("{p}_channel_t"),
            state_t: format!("{p}_connection_state_t"),
            status_t: format!("{p}_status_t"),
        }
    }

    /// Type names the header introduces besides the records themselves.
    pub fn generated_types(&self) -> [&str; 5] {
        [
            &self.changed_t,
            &self.channel_t,
            &self.state_t,
            &self.status_t,
            TRANSPORT_TYPE,
        ]
    }

    /// Every identifier the header or a source defines as a macro or an
    /// enum constant. A record or field with one of these names breaks the C.
    pub fn generated_macros(&self) -> Vec<String> {
        let mut out = vec![self.guard.clone(), TRANSPORT_API_GUARD.to_string()];
        out.extend(MACRO_SUFFIXES.iter().map(|s| self.mac(s)));
        out.extend(
            ConnectionState::ALL
                .iter()
                .map(|s| self.mac(&format!("STATE_{}", s.c_suffix()))),
        );
        out.extend(StatusCode::ALL.iter().map(|c| self.mac(c.c_suffix())));
        out.extend(
            FrameKind::ALL
                .iter()
                .map(|k| format!("EXOSGEN_FRAME_{}", k.c_suffix())),
        );
        out.extend(
            [ChannelRole::Publisher, ChannelRole::Subscriber]
                .iter()
                .map(|r| format!("EXOSGEN_ROLE_{}", r.as_str())),
        );
        out
    }

    /// Functions declared by the header or defined in a source.
    pub fn generated_functions(&self) -> Vec<String> {
        let mut out: Vec<String> = TRANSPORT_FUNCTIONS.iter().map(|s| s.to_string()).collect();
        out.extend(FUNCTION_SUFFIXES.iter().map(|s| self.func(s)));
        out
    }

    pub fn func(&self, name: &str) -> String {
        format!("{}_{name}", self.prefix)
    }

    pub fn mac(&self, name: &str) -> String {
        format!("{}_{name}", self.macro_prefix)
    }
}

/// Line-oriented C writer; four-space indentation, Allman braces.
pub(crate) struct CWriter {
    out: String,
    indent: usize,
}

impl CWriter {
    pub(crate) fn new() -> Self {
        CWriter {
            out: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn line(&mut self, s: &str) {
        if s.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub(crate) fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Writes `head` and an opening brace on its own line.
    pub(crate) fn open(&mut self, head: &str) {
        self.line(head);
        self.line("{");
        self.indent += 1;
    }

    pub(crate) fn close(&mut self, tail: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(tail);
    }

    pub(crate) fn finish(self) -> String {
        crate::util::ensure_trailing_newline(self.out)
    }
}

/// Base C type of a field kind, ignoring array dimensions.
pub(crate) fn c_base_type(kind: &FieldKind) -> String {
    match kind.element_kind() {
        FieldKind::Primitive { ty } => ty.c_type().to_string(),
        FieldKind::FixedString { .. } => "char".to_string(),
        FieldKind::Record { name } => name.clone(),
        FieldKind::FixedArray { .. } => unreachable!("element_kind strips arrays"),
    }
}

/// `float Speed`, `char Name[81]`, `double Axes[2][3]`.
pub(crate) fn c_declarator(kind: &FieldKind, name: &str) -> String {
    let mut out = format!("{} {name}", c_base_type(kind));
    for dim in kind.dimensions() {
        out.push_str(&format!("[{dim}]"));
    }
    if let FieldKind::FixedString { max_len } = kind.element_kind() {
        out.push_str(&format!("[{}]", u64::from(*max_len) + 1));
    }
    out
}

/// Short description of a leaf for comments: `REAL`, `STRING[80]`, `ARRAY[6] OF LREAL`.
pub(crate) fn describe_kind(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Primitive { ty } => ty.iec_name().to_string(),
        FieldKind::FixedString { max_len } => format!("STRING[{max_len}]"),
        FieldKind::Record { name } => name.clone(),
        FieldKind::FixedArray { element, count } => {
            format!("ARRAY[{count}] OF {}", describe_kind(element))
        }
    }
}

pub(crate) fn leaf_comment(leaf: &LeafField) -> String {
    format!(
        "/* {} @{} +{} {} */",
        leaf.path,
        leaf.offset,
        leaf.size,
        describe_kind(&leaf.kind)
    )
}

/// Escapes text for use inside a C block comment.
pub(crate) fn comment_text(s: &str) -> String {
    s.replace("*/", "* /").replace('\n', " ")
}
