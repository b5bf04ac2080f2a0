//! ChannelEmitter: the publisher and subscriber halves of one channel.
//!
//! Both halves come out of [`emit_channel_pair`] together so they always
//! agree on offsets, sizes and the layout fingerprint.

use serde::Serialize;

use crate::config::{DEFAULT_ANNOUNCE_INTERVAL_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS};
use crate::emit::{leaf_comment, CNames, CWriter, GENERATOR};
use crate::layout::FieldLayout;
use crate::model::TypeModel;
use crate::naming::ArtifactNames;
use crate::protocol::{ChannelRole, ANNOUNCE_PAYLOAD_LEN, FINGERPRINT_PAYLOAD_LEN};
use crate::target::ContextSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelOptions {
    pub handshake_timeout_ms: u32,
    pub announce_interval_ms: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            announce_interval_ms: DEFAULT_ANNOUNCE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    pub publisher: String,
    pub subscriber: String,
}

/// Emits both sources of a channel. `contexts` is publisher first, as
/// returned by [`crate::target::Target::contexts`].
pub fn emit_channel_pair(
    model: &TypeModel,
    layout: &FieldLayout,
    names: &ArtifactNames,
    contexts: &[ContextSpec; 2],
) -> ChannelPair {
    let [publisher, subscriber] = contexts;
    tracing::debug!(
        type_name = %layout.type_name,
        publisher = %publisher.alias,
        subscriber = %subscriber.alias,
        "emitting channel pair"
    );
    ChannelPair {
        publisher: emit_channel(model, layout, names, publisher, subscriber),
        subscriber: emit_channel(model, layout, names, subscriber, publisher),
    }
}

pub(crate) fn emit_channel(
    model: &TypeModel,
    layout: &FieldLayout,
    names: &ArtifactNames,
    local: &ContextSpec,
    peer: &ContextSpec,
) -> String {
    let n = CNames::new(names);
    let mut w = CWriter::new();

    w.line(&format!(
        "/* {}: {} side of channel \"{}\"; generated by {GENERATOR}. Do not edit.",
        names.source_file,
        local.role.as_str(),
        layout.type_name
    ));
    w.line(" *");
    w.line(&format!(" * alias: {}, peer: {}", local.alias, peer.alias));
    if let Some(sha) = &model.source_sha256 {
        w.line(&format!(" * source sha256: {sha}"));
    }
    w.line(&format!(" * layout fingerprint: {}", layout.fingerprint));
    w.line(" */");
    w.line("#include <string.h>");
    w.blank();
    w.line(&format!("#include \"{}\"", names.header_file));
    w.blank();
    w.line(&format!("#define {} \"{}\"", n.mac("LOCAL_ALIAS"), local.alias));
    w.line(&format!("#define {} EXOSGEN_ROLE_{}", n.mac("LOCAL_ROLE"), local.role.as_str()));
    w.blank();

    emit_codec_helpers(&mut w, &n, local.role);
    emit_lifecycle_helpers(&mut w, &n);
    emit_detect_changes(&mut w, &n, layout);

    match local.role {
        ChannelRole::Publisher => {
            emit_publisher_init(&mut w, &n);
            emit_publisher_cyclic(&mut w, &n);
        }
        ChannelRole::Subscriber => {
            emit_subscriber_init(&mut w, &n);
            emit_subscriber_cyclic(&mut w, &n);
        }
    }
    emit_terminate(&mut w, &n);
    w.finish()
}

fn ack_len() -> usize {
    1 + FINGERPRINT_PAYLOAD_LEN
}

fn announce_len() -> usize {
    1 + ANNOUNCE_PAYLOAD_LEN
}

fn emit_codec_helpers(w: &mut CWriter, n: &CNames, role: ChannelRole) {
    let p = &n.prefix;

    if role == ChannelRole::Publisher {
        w.open(&format!("static void {p}_put_u32(uint8_t *b, uint32_t v)"));
        w.line("b[0] = (uint8_t)v;");
        w.line("b[1] = (uint8_t)(v >> 8);");
        w.line("b[2] = (uint8_t)(v >> 16);");
        w.line("b[3] = (uint8_t)(v >> 24);");
        w.close("}");
        w.blank();
    } else {
        w.open(&format!("static uint32_t {p}_get_u32(const uint8_t *b)"));
        w.line("return (uint32_t)b[0] | ((uint32_t)b[1] << 8) | ((uint32_t)b[2] << 16) | ((uint32_t)b[3] << 24);");
        w.close("}");
        w.blank();
    }

    w.open(&format!("static void {p}_put_u64(uint8_t *b, uint64_t v)"));
    w.line("uint32_t i;");
    w.open("for (i = 0; i < 8u; i++)");
    w.line("b[i] = (uint8_t)(v >> (8u * i));");
    w.close("}");
    w.close("}");
    w.blank();

    w.open(&format!("static uint64_t {p}_get_u64(const uint8_t *b)"));
    w.line("uint64_t v = 0;");
    w.line("uint32_t i;");
    w.open("for (i = 0; i < 8u; i++)");
    w.line("v |= (uint64_t)b[i] << (8u * i);");
    w.close("}");
    w.line("return v;");
    w.close("}");
    w.blank();

    if role == ChannelRole::Subscriber {
        w.open(&format!("static int32_t {p}_send_fingerprint({} *ch, uint8_t kind)", n.channel_t));
        w.line("ch->frame[0] = kind;");
        w.line(&format!("{p}_put_u64(&ch->frame[1], {});", n.mac("LAYOUT_FINGERPRINT")));
        w.line(&format!("return exosgen_transport_send(ch->transport, ch->frame, {}u);", ack_len()));
        w.close("}");
        w.blank();
    } else {
        w.open(&format!("static int32_t {p}_send_announce({} *ch)", n.channel_t));
        w.line("ch->frame[0] = EXOSGEN_FRAME_ANNOUNCE;");
        w.line(&format!("{p}_put_u64(&ch->frame[1], {});", n.mac("LAYOUT_FINGERPRINT")));
        w.line(&format!("{p}_put_u32(&ch->frame[9], {});", n.mac("SIZE")));
        w.line(&format!("return exosgen_transport_send(ch->transport, ch->frame, {}u);", announce_len()));
        w.close("}");
        w.blank();
    }
}

fn emit_lifecycle_helpers(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;

    w.line("/* Releases the transport and leaves the channel in ABORTED. */");
    w.open(&format!("static void {p}_abort({} *ch)", n.channel_t));
    w.open("if (ch->transport != NULL)");
    w.line("exosgen_transport_close(ch->transport);");
    w.line("ch->transport = NULL;");
    w.close("}");
    w.line(&format!("ch->state = {};", n.mac("STATE_ABORTED")));
    w.close("}");
    w.blank();

    w.line("/* Handshake abandoned by terminate: release and start over. */");
    w.open(&format!("static {} {p}_cancelled({} *ch)", n.status_t, n.channel_t));
    w.open("if (ch->transport != NULL)");
    w.line("exosgen_transport_close(ch->transport);");
    w.line("ch->transport = NULL;");
    w.close("}");
    w.line("ch->cancel_requested = 0u;");
    w.line(&format!("ch->state = {};", n.mac("STATE_UNINITIALIZED")));
    w.line(&format!("return {};", n.mac("ERR_CONNECTION")));
    w.close("}");
    w.blank();

    w.open(&format!("static {} {p}_open({} *ch)", n.status_t, n.channel_t));
    w.open(&format!(
        "if (ch->state != {} && ch->state != {})",
        n.mac("STATE_UNINITIALIZED"),
        n.mac("STATE_ABORTED")
    ));
    w.line(&format!("return {};", n.mac("ERR_STATE")));
    w.close("}");
    w.line("memset(ch, 0, sizeof *ch);");
    w.line(&format!(
        "ch->transport = exosgen_transport_open({}, {}, {});",
        n.mac("CHANNEL_NAME"),
        n.mac("LOCAL_ALIAS"),
        n.mac("LOCAL_ROLE")
    ));
    w.open("if (ch->transport == NULL)");
    w.line(&format!("ch->state = {};", n.mac("STATE_ABORTED")));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.line(&format!("ch->state = {};", n.mac("STATE_CONNECTING")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.blank();
}

fn emit_detect_changes(w: &mut CWriter, n: &CNames, layout: &FieldLayout) {
    w.open(&format!(
        "static void {}_detect_changes({} *changed, const uint8_t *cur, const uint8_t *old)",
        n.prefix, n.changed_t
    ));
    for leaf in &layout.leaves {
        w.line(&format!(
            "changed->{} = memcmp(cur + {}u, old + {}u, {}u) != 0; {}",
            leaf.flag_name,
            leaf.offset,
            leaf.offset,
            leaf.size,
            leaf_comment(leaf)
        ));
    }
    w.close("}");
    w.blank();
}

/// Shared prologue of both handshake loops.
fn emit_handshake_poll(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.open("if (ch->cancel_requested)");
    w.line(&format!("return {p}_cancelled(ch);"));
    w.close("}");
    w.line(&format!(
        "rc = exosgen_transport_poll(ch->transport, ch->frame, {}, &len);",
        n.mac("FRAME_CAPACITY")
    ));
    w.open("if (rc < 0)");
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
}

fn emit_handshake_deadline(w: &mut CWriter, n: &CNames) {
    w.line("now = exosgen_transport_millis();");
    w.open(&format!(
        "if ((uint32_t)(now - started) >= {})",
        n.mac("HANDSHAKE_TIMEOUT_MS")
    ));
    w.line(&format!("{}_abort(ch);", n.prefix));
    w.line(&format!("return {};", n.mac("ERR_CONNECTION")));
    w.close("}");
}

fn emit_publisher_init(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.open(&format!("{} {}({} *ch)", n.status_t, n.func("init"), n.channel_t));
    w.line("uint32_t started;");
    w.line("uint32_t last_announce;");
    w.line(&format!("{} st;", n.status_t));
    w.blank();
    w.open("if (ch == NULL)");
    w.line(&format!("return {};", n.mac("ERR_STATE")));
    w.close("}");
    w.line(&format!("st = {p}_open(ch);"));
    w.open(&format!("if (st != {})", n.mac("OK")));
    w.line("return st;");
    w.close("}");
    w.blank();
    w.line("started = exosgen_transport_millis();");
    w.line("last_announce = started;");
    w.open(&format!("if ({p}_send_announce(ch) < 0)"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.open("for (;;)");
    w.line("uint32_t now;");
    w.line("uint32_t len = 0;");
    w.line("int32_t rc;");
    w.blank();
    emit_handshake_poll(w, n);
    w.open(&format!("if (rc > 0 && len == {}u && ch->frame[0] == EXOSGEN_FRAME_ACK)", ack_len()));
    w.open(&format!("if ({p}_get_u64(&ch->frame[1]) == {})", n.mac("LAYOUT_FINGERPRINT")));
    w.line(&format!("ch->state = {};", n.mac("STATE_OPERATIONAL")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_REJECTED")));
    w.close("}");
    w.open(&format!("if (rc > 0 && len == {}u && ch->frame[0] == EXOSGEN_FRAME_REJECT)", ack_len()));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_REJECTED")));
    w.close("}");
    emit_handshake_deadline(w, n);
    w.open(&format!(
        "if ((uint32_t)(now - last_announce) >= {})",
        n.mac("ANNOUNCE_INTERVAL_MS")
    ));
    w.open(&format!("if ({p}_send_announce(ch) < 0)"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.line("last_announce = now;");
    w.close("}");
    w.open("if (rc == 0)");
    w.line("exosgen_transport_yield();");
    w.close("}");
    w.close("}");
    w.close("}");
    w.blank();
}

fn emit_subscriber_init(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.open(&format!("{} {}({} *ch)", n.status_t, n.func("init"), n.channel_t));
    w.line("uint32_t started;");
    w.line(&format!("{} st;", n.status_t));
    w.blank();
    w.open("if (ch == NULL)");
    w.line(&format!("return {};", n.mac("ERR_STATE")));
    w.close("}");
    w.line(&format!("st = {p}_open(ch);"));
    w.open(&format!("if (st != {})", n.mac("OK")));
    w.line("return st;");
    w.close("}");
    w.blank();
    w.line("started = exosgen_transport_millis();");
    w.open("for (;;)");
    w.line("uint32_t now;");
    w.line("uint32_t len = 0;");
    w.line("int32_t rc;");
    w.blank();
    emit_handshake_poll(w, n);
    w.open(&format!(
        "if (rc > 0 && len == {}u && ch->frame[0] == EXOSGEN_FRAME_ANNOUNCE)",
        announce_len()
    ));
    w.open(&format!(
        "if ({p}_get_u64(&ch->frame[1]) == {} && {p}_get_u32(&ch->frame[9]) == {})",
        n.mac("LAYOUT_FINGERPRINT"),
        n.mac("SIZE")
    ));
    w.open(&format!("if ({p}_send_fingerprint(ch, EXOSGEN_FRAME_ACK) < 0)"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.line(&format!("ch->state = {};", n.mac("STATE_OPERATIONAL")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.line(&format!("(void){p}_send_fingerprint(ch, EXOSGEN_FRAME_REJECT);"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_REJECTED")));
    w.close("}");
    emit_handshake_deadline(w, n);
    w.open("if (rc == 0)");
    w.line("exosgen_transport_yield();");
    w.close("}");
    w.close("}");
    w.close("}");
    w.blank();
}

fn emit_cyclic_prologue(w: &mut CWriter, n: &CNames) {
    w.open(&format!("if (ch == NULL || ch->state != {})", n.mac("STATE_OPERATIONAL")));
    w.line(&format!("return {};", n.mac("ERR_STATE")));
    w.close("}");
}

fn emit_drain_poll(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.line("uint32_t len = 0;");
    w.line(&format!(
        "int32_t rc = exosgen_transport_poll(ch->transport, ch->frame, {}, &len);",
        n.mac("FRAME_CAPACITY")
    ));
    w.blank();
    w.open("if (rc < 0)");
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.open("if (rc == 0)");
    w.line("break;");
    w.close("}");
    w.open("if (len == 1u && ch->frame[0] == EXOSGEN_FRAME_BYE)");
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_CONNECTION")));
    w.close("}");
}

fn emit_publisher_cyclic(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.open(&format!("{} {}({} *ch)", n.status_t, n.func("cyclic_update"), n.channel_t));
    emit_cyclic_prologue(w, n);
    w.blank();
    w.line("/* Control frames only; repeated ACKs are ignored. */");
    w.open("for (;;)");
    emit_drain_poll(w, n);
    w.open(&format!("if (len == {}u && ch->frame[0] == EXOSGEN_FRAME_REJECT)", ack_len()));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_REJECTED")));
    w.close("}");
    w.close("}");
    w.blank();
    w.line(&format!(
        "{p}_detect_changes(&ch->changed, (const uint8_t *)&ch->value, (const uint8_t *)&ch->previous);"
    ));
    w.line("ch->frame[0] = EXOSGEN_FRAME_DATA;");
    w.line(&format!("memcpy(&ch->frame[1], &ch->value, {});", n.mac("SIZE")));
    w.open(&format!(
        "if (exosgen_transport_send(ch->transport, ch->frame, {} + 1u) < 0)",
        n.mac("SIZE")
    ));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.line(&format!("memcpy(&ch->previous, &ch->value, {});", n.mac("SIZE")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.blank();
}

fn emit_subscriber_cyclic(w: &mut CWriter, n: &CNames) {
    let p = &n.prefix;
    w.open(&format!("{} {}({} *ch)", n.status_t, n.func("cyclic_update"), n.channel_t));
    w.line("bool received = false;");
    w.blank();
    emit_cyclic_prologue(w, n);
    w.blank();
    w.line("/* Drain without blocking; only the newest DATA frame is kept. */");
    w.open("for (;;)");
    emit_drain_poll(w, n);
    w.open(&format!(
        "if (len == {} + 1u && ch->frame[0] == EXOSGEN_FRAME_DATA)",
        n.mac("SIZE")
    ));
    w.line(&format!("memcpy(&ch->pending, &ch->frame[1], {});", n.mac("SIZE")));
    w.line("received = true;");
    w.close("}");
    w.open(&format!(
        "else if (len == {}u && ch->frame[0] == EXOSGEN_FRAME_ANNOUNCE)",
        announce_len()
    ));
    w.line("/* Publisher restarted and is announcing again. */");
    w.open(&format!(
        "if ({p}_get_u64(&ch->frame[1]) != {} || {p}_get_u32(&ch->frame[9]) != {})",
        n.mac("LAYOUT_FINGERPRINT"),
        n.mac("SIZE")
    ));
    w.line(&format!("(void){p}_send_fingerprint(ch, EXOSGEN_FRAME_REJECT);"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_REJECTED")));
    w.close("}");
    w.open(&format!("if ({p}_send_fingerprint(ch, EXOSGEN_FRAME_ACK) < 0)"));
    w.line(&format!("{p}_abort(ch);"));
    w.line(&format!("return {};", n.mac("ERR_TRANSPORT")));
    w.close("}");
    w.close("}");
    w.close("}");
    w.blank();
    w.open("if (!received)");
    w.line("memset(&ch->changed, 0, sizeof ch->changed);");
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.line(&format!(
        "{p}_detect_changes(&ch->changed, (const uint8_t *)&ch->pending, (const uint8_t *)&ch->value);"
    ));
    w.line(&format!("memcpy(&ch->previous, &ch->value, {});", n.mac("SIZE")));
    w.line(&format!("memcpy(&ch->value, &ch->pending, {});", n.mac("SIZE")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.blank();
}

fn emit_terminate(w: &mut CWriter, n: &CNames) {
    w.open(&format!("{} {}({} *ch)", n.status_t, n.func("terminate"), n.channel_t));
    w.open("if (ch == NULL)");
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
    w.open("switch (ch->state)");
    w.line(&format!("case {}:", n.mac("STATE_UNINITIALIZED")));
    w.line(&format!("    return {};", n.mac("OK")));
    w.line(&format!("case {}:", n.mac("STATE_CONNECTING")));
    w.line("    /* init is still running; it releases the transport itself. */");
    w.line("    ch->cancel_requested = 1u;");
    w.line(&format!("    return {};", n.mac("OK")));
    w.line(&format!("case {}:", n.mac("STATE_ABORTED")));
    w.line(&format!("    ch->state = {};", n.mac("STATE_UNINITIALIZED")));
    w.line(&format!("    return {};", n.mac("OK")));
    w.line("default:");
    w.line("    break;");
    w.close("}");
    w.blank();
    w.line(&format!("ch->state = {};", n.mac("STATE_DISCONNECTING")));
    w.open("if (ch->transport != NULL)");
    w.line("ch->frame[0] = EXOSGEN_FRAME_BYE;");
    w.line("(void)exosgen_transport_send(ch->transport, ch->frame, 1u);");
    w.line("exosgen_transport_close(ch->transport);");
    w.line("ch->transport = NULL;");
    w.close("}");
    w.line("memset(&ch->changed, 0, sizeof ch->changed);");
    w.line(&format!("ch->state = {};", n.mac("STATE_UNINITIALIZED")));
    w.line(&format!("return {};", n.mac("OK")));
    w.close("}");
}
