//! Executable model of the generated channel.
//!
//! [`ChannelEndpoint`] runs the same state machine, frames and per-leaf change
//! detection as the emitted C sources, over any [`Transport`]. It is how the
//! runtime behaviour of a generated pair is exercised without a C toolchain.

mod endpoint;
mod transport;

pub use endpoint::{CancelHandle, ChannelEndpoint, ConnectionError, FieldAccessError};
pub use transport::{LoopbackBus, Transport, TransportError, TransportFactory};

use crate::layout::FieldLayout;

/// One flag per leaf: whether its byte range differs between `cur` and `old`.
///
/// Same comparison as the generated `<type>_detect_changes`.
pub fn changed_leaves(layout: &FieldLayout, cur: &[u8], old: &[u8]) -> Vec<bool> {
    layout
        .leaves
        .iter()
        .map(|leaf| {
            let range = leaf.offset as usize..(leaf.offset + leaf.size) as usize;
            cur.get(range.clone()) != old.get(range)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FieldLayout {
        let src = "TYPE Pair : STRUCT\n A : INT;\n B : DINT;\nEND_STRUCT;\nEND_TYPE\n";
        let model = crate::typ::parse(src, "Pair", &Default::default()).expect("parse");
        crate::layout::resolve(&model).expect("layout")
    }

    #[test]
    fn flags_follow_byte_ranges() {
        let l = layout();
        let old = [0u8; 6];
        let mut cur = old;
        cur[3] = 7;
        assert_eq!(changed_leaves(&l, &cur, &old), vec![false, true]);
        assert_eq!(changed_leaves(&l, &old, &old), vec![false, false]);
    }
}
