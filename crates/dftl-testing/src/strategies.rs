//! Proptest strategies for host-event sequences, composing per-field
//! strategies with a tuple `.prop_map` into a scenario type, mapping onto
//! [`HostEvent`] instead of a kernel-fuzzing scenario struct.

use dftl_core::{HostEvent, Operation};
use proptest::prelude::*;

pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Read),
        Just(Operation::Write),
        Just(Operation::Discard),
    ]
}

/// One host event touching an LPN in `[0, max_lpn)`, sized to a handful of
/// pages so it exercises multi-page translation without dominating runtime.
pub fn host_event(max_lpn: u64, page_size: u32) -> impl Strategy<Value = HostEvent> {
    (operation(), 0..max_lpn.max(1), 1u64..=8, any::<u32>()).prop_map(
        move |(operation, lpn, page_count, pid)| HostEvent {
            operation,
            offset_bytes: lpn * page_size as u64,
            size_bytes: page_count * page_size as u64,
            pid,
        },
    )
}

/// A bounded sequence of host events against a fixed LPN space, the
/// generator used to drive the property tests in `tests/properties.rs`.
pub fn host_event_sequence(
    max_lpn: u64,
    page_size: u32,
    max_len: usize,
) -> impl Strategy<Value = Vec<HostEvent>> {
    prop::collection::vec(host_event(max_lpn, page_size), 1..=max_len)
}
