//! HeaderEmitter: the datamodel header shared by both sides of a channel.

use crate::emit::channel::ChannelOptions;
use crate::emit::{
    c_declarator, comment_text, leaf_comment, CNames, CWriter, GENERATOR, TRANSPORT_API_GUARD,
};
use crate::layout::FieldLayout;
use crate::model::TypeModel;
use crate::naming::ArtifactNames;
use crate::protocol::{ChannelRole, ConnectionState, FrameKind, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOptions {
    pub names: ArtifactNames,
    pub channel: ChannelOptions,
}

/// Renders `exos_<type>.h`. The output does not depend on the channel role.
pub fn emit_header(model: &TypeModel, layout: &FieldLayout, opts: &HeaderOptions) -> String {
    let n = CNames::new(&opts.names);
    let guard = &n.guard;

    let mut w = CWriter::new();
    w.line(&format!("/* {}: generated by {GENERATOR}. Do not edit.", n.header_file));
    w.line(" *");
    w.line(&format!(" * datamodel: {}", model.type_name));
    if let Some(sha) = &model.source_sha256 {
        w.line(&format!(" * source sha256: {sha}"));
    }
    w.line(&format!(" * layout fingerprint: {}", layout.fingerprint));
    w.line(" */");
    w.line(&format!("#ifndef {guard}"));
    w.line(&format!("#define {guard}"));
    w.blank();
    w.line("#include <stdbool.h>");
    w.line("#include <stddef.h>");
    w.line("#include <stdint.h>");
    w.blank();
    w.line("#ifdef __cplusplus");
    w.line("extern \"C\" {");
    w.line("#endif");
    w.blank();

    emit_records(&mut w, model, layout);
    emit_macros(&mut w, layout, &n, &opts.channel);
    emit_transport_api(&mut w);
    emit_channel_types(&mut w, layout, &n);

    w.line(&format!("/* The handle must be zero-initialized before the first {}. */", n.func("init")));
    w.line(&format!("{} {}({} *ch);", n.status_t, n.func("init"), n.channel_t));
    w.line(&format!("{} {}({} *ch);", n.status_t, n.func("cyclic_update"), n.channel_t));
    w.line(&format!("{} {}({} *ch);", n.status_t, n.func("terminate"), n.channel_t));
    w.blank();
    w.line("#ifdef __cplusplus");
    w.line("}");
    w.line("#endif");
    w.blank();
    w.line(&format!("#endif /* {guard} */"));
    w.finish()
}

fn emit_records(w: &mut CWriter, model: &TypeModel, layout: &FieldLayout) {
    w.line("#pragma pack(push, 1)");
    w.blank();
    for rec_layout in &layout.records {
        let Some(rec) = model.record(&rec_layout.name) else {
            continue;
        };
        if let Some(c) = &rec.comment {
            w.line(&format!("/* {} */", comment_text(c)));
        }
        w.open(&format!("typedef struct {}", rec.name));
        for f in &rec.fields {
            let decl = c_declarator(&f.kind, &f.name);
            match &f.comment {
                Some(c) => w.line(&format!("{decl}; /* {} */", comment_text(c))),
                None => w.line(&format!("{decl};")),
            }
        }
        w.close(&format!("}} {};", rec.name));
        w.blank();
    }
    w.line("#pragma pack(pop)");
    w.blank();
}

fn emit_macros(w: &mut CWriter, layout: &FieldLayout, n: &CNames, channel: &ChannelOptions) {
    let frame_capacity = layout.size.max(crate::protocol::ANNOUNCE_PAYLOAD_LEN as u32) + 1;
    w.line(&format!("#define {} \"{}\"", n.mac("CHANNEL_NAME"), layout.type_name));
    w.line(&format!("#define {} {}u", n.mac("SIZE"), layout.size));
    w.line(&format!("#define {} {}u", n.mac("FIELD_COUNT"), layout.leaves.len()));
    w.line(&format!(
        "#define {} UINT64_C(0x{})",
        n.mac("LAYOUT_FINGERPRINT"),
        layout.fingerprint
    ));
    w.line(&format!(
        "#define {} {}u",
        n.mac("HANDSHAKE_TIMEOUT_MS"),
        channel.handshake_timeout_ms
    ));
    w.line(&format!(
        "#define {} {}u",
        n.mac("ANNOUNCE_INTERVAL_MS"),
        channel.announce_interval_ms
    ));
    w.line(&format!("#define {} {}u", n.mac("FRAME_CAPACITY"), frame_capacity));
    w.blank();
    w.line("#ifndef __cplusplus");
    for r in &layout.records {
        w.line(&format!(
            "_Static_assert(sizeof({}) == {}u, \"{} does not match the generated layout\");",
            r.name, r.size, r.name
        ));
    }
    w.line("#endif");
    w.blank();
}

fn emit_transport_api(w: &mut CWriter) {
    // Shared by every generated datamodel, so guarded separately.
    w.line(&format!("#ifndef {TRANSPORT_API_GUARD}"));
    w.line(&format!("#define {TRANSPORT_API_GUARD}"));
    w.blank();
    for kind in FrameKind::ALL {
        w.line(&format!("#define EXOSGEN_FRAME_{} {}u", kind.c_suffix(), kind as u8));
    }
    for role in [ChannelRole::Publisher, ChannelRole::Subscriber] {
        w.line(&format!("#define EXOSGEN_ROLE_{} {}u", role.as_str(), role.wire_value()));
    }
    w.blank();
    w.line("typedef struct exosgen_transport exosgen_transport;");
    w.blank();
    w.line("/* Provided by the platform integration. */");
    w.line("exosgen_transport *exosgen_transport_open(const char *channel, const char *alias, uint8_t role);");
    w.line("/* 0 on success, negative on failure. */");
    w.line("int32_t exosgen_transport_send(exosgen_transport *t, const uint8_t *frame, uint32_t len);");
    w.line("/* 1 when a frame was copied to buf, 0 when none is pending, negative on failure. Never blocks. */");
    w.line("int32_t exosgen_transport_poll(exosgen_transport *t, uint8_t *buf, uint32_t cap, uint32_t *len);");
    w.line("void exosgen_transport_close(exosgen_transport *t);");
    w.line("uint32_t exosgen_transport_millis(void);");
    w.line("void exosgen_transport_yield(void);");
    w.blank();
    w.line(&format!("#endif /* {TRANSPORT_API_GUARD} */"));
    w.blank();
}

fn emit_channel_types(w: &mut CWriter, layout: &FieldLayout, n: &CNames) {
    w.open("typedef enum");
    for (i, state) in ConnectionState::ALL.into_iter().enumerate() {
        w.line(&format!("{} = {i},", n.mac(&format!("STATE_{}", state.c_suffix()))));
    }
    w.close(&format!("}} {};", n.state_t));
    w.blank();

    w.open("typedef enum");
    for code in StatusCode::ALL {
        w.line(&format!("{} = {},", n.mac(code.c_suffix()), code as i32));
    }
    w.close(&format!("}} {};", n.status_t));
    w.blank();

    w.line("/* One flag per leaf field; set by the last cyclic update. */");
    w.open(&format!("typedef struct {}", n.changed_t));
    for leaf in &layout.leaves {
        w.line(&format!("bool {}; {}", leaf.flag_name, leaf_comment(leaf)));
    }
    w.close(&format!("}} {};", n.changed_t));
    w.blank();

    w.open(&format!("typedef struct {}", n.channel_t));
    w.line(&format!("{} value;", n.record));
    w.line(&format!("{} previous; /* last sent or last received */", n.record));
    w.line(&format!("{} pending; /* newest frame of the current cycle */", n.record));
    w.line(&format!("{} changed;", n.changed_t));
    w.line(&format!("volatile {} state;", n.state_t));
    w.line("volatile uint8_t cancel_requested;");
    w.line("exosgen_transport *transport;");
    w.line(&format!("uint8_t frame[{}];", n.mac("FRAME_CAPACITY")));
    w.close(&format!("}} {};", n.channel_t));
    w.blank();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingBudget;

    fn robot() -> (TypeModel, FieldLayout) {
        let src = "TYPE\n Position : STRUCT\n  X : REAL;\n  Y : REAL;\n END_STRUCT;\n \
                   Robot : STRUCT\n  Position : Position;\n  Speed : REAL; (* mm/s *)\n END_STRUCT;\nEND_TYPE\n";
        let model = crate::typ::parse(src, "Robot", &Default::default()).expect("parse");
        let layout = crate::layout::resolve(&model).expect("layout");
        (model, layout)
    }

    fn opts() -> HeaderOptions {
        HeaderOptions {
            names: ArtifactNames::new("Robot", NamingBudget::new(10)),
            channel: ChannelOptions::default(),
        }
    }

    #[test]
    fn records_follow_dependency_order() {
        let (model, layout) = robot();
        let h = emit_header(&model, &layout, &opts());
        let pos = h.find("typedef struct Position").expect("Position typedef");
        let root = h.find("typedef struct Robot").expect("Robot typedef");
        assert!(pos < root);
        assert!(h.contains("    float Speed; /* mm/s */\n"));
        assert!(h.contains("#define ROBOT_SIZE 12u\n"));
        assert!(h.contains("#define ROBOT_FIELD_COUNT 3u\n"));
    }

    #[test]
    fn changed_flags_use_joined_paths() {
        let (model, layout) = robot();
        let h = emit_header(&model, &layout, &opts());
        assert!(h.contains("bool Position__X; /* Position.X @0 +4 REAL */"));
        assert!(h.contains("bool Speed; /* Speed @8 +4 REAL */"));
    }

    #[test]
    fn declares_entry_points_and_guard() {
        let (model, layout) = robot();
        let h = emit_header(&model, &layout, &opts());
        assert!(h.starts_with("/* exos_robot.h: generated by exosgen"));
        assert!(h.contains("#ifndef EXOS_ROBOT_H\n"));
        assert!(h.contains("robot_status_t robot_init(robot_channel_t *ch);"));
        assert!(h.contains("robot_status_t robot_terminate(robot_channel_t *ch);"));
        assert!(h.contains("    ROBOT_STATE_ABORTED = 4,\n"));
        assert!(h.contains("    ROBOT_ERR_STATE = -4,\n"));
        assert!(h.ends_with("#endif /* EXOS_ROBOT_H */\n"));
    }
}
