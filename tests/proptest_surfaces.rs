//! Property-based tests for surface bookkeeping.
//!
//! Uses proptest to generate random event sequences and verify that:
//! 1. Matched connect/disconnect pairs restore every per-remote gauge slice
//! 2. Events on one remote never leak into another remote's slice
//! 3. Nested event-bus dispatches always unwind to zero in flight
//! 4. Pool queue and in-use gauges return to zero after every task ends

mod common;

use proptest::prelude::*;
use std::collections::HashMap;
use std::net::SocketAddr;
use wirestat::metrics::{ConnectionMetrics, Surface};

// =============================================================================
// STRATEGIES
// =============================================================================

/// One of a handful of remote peers.
fn remote_strategy() -> impl Strategy<Value = SocketAddr> {
    (1u8..=4, 1000u16..1004).prop_map(|(host, port)| SocketAddr::from(([10, 0, 0, host], port)))
}

/// A connect (true) or disconnect (false) on a remote.
fn event_strategy() -> impl Strategy<Value = (SocketAddr, bool)> {
    (remote_strategy(), any::<bool>())
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn connect_disconnect_pairs_restore_gauges(events in prop::collection::vec(event_strategy(), 0..64)) {
        let facade = common::facade();
        let server = facade.create_net_server_metrics(common::addr("0.0.0.0:9000")).unwrap();

        let mut expected: HashMap<SocketAddr, i64> = HashMap::new();
        for (remote, connect) in &events {
            if *connect {
                server.connected(Some(*remote));
                *expected.entry(*remote).or_default() += 1;
            } else {
                server.disconnected(Some(*remote));
                *expected.entry(*remote).or_default() -= 1;
            }
        }

        let snap = server.snapshot();
        for (remote, value) in &expected {
            let name = remote.to_string();
            prop_assert_eq!(snap["connections"].scalar(&[("remote", name.as_str())]), Some(*value as f64));
        }

        // Undo every event in reverse; each slice returns to zero.
        for (remote, connect) in events.iter().rev() {
            if *connect {
                server.disconnected(Some(*remote));
            } else {
                server.connected(Some(*remote));
            }
        }
        let snap = server.snapshot();
        for sample in &snap["connections"].samples {
            prop_assert_eq!(sample.value.as_scalar(), Some(0.0));
        }
    }

    #[test]
    fn nested_dispatch_unwinds(depths in prop::collection::vec(1usize..8, 1..6)) {
        let facade = common::facade();
        let bus = facade.create_event_bus_metrics().unwrap();
        let handler = bus.handler_registered("nested");

        let mut total = 0u64;
        for depth in &depths {
            for _ in 0..*depth {
                bus.schedule_message(&handler, false);
                bus.begin_handle(&handler, false);
            }
            prop_assert_eq!(handler.in_flight(), *depth);
            for _ in 0..*depth {
                bus.end_handle(&handler, None);
            }
            total += *depth as u64;
        }

        prop_assert_eq!(handler.in_flight(), 0);
        let snap = bus.snapshot();
        prop_assert_eq!(snap["pending"].scalar(&[("address", "nested")]), Some(0.0));
        prop_assert_eq!(snap["process_time"].count(&[("address", "nested")]), Some(total));
    }

    #[test]
    fn pool_gauges_return_to_zero(outcomes in prop::collection::vec(any::<bool>(), 0..32), max in 0usize..16) {
        let facade = common::facade();
        let pool = facade.create_pool_metrics("worker", "prop", max).unwrap();

        let running: Vec<_> = outcomes
            .iter()
            .map(|ok| (pool.begin(pool.submitted()), *ok))
            .collect();
        for (usage, ok) in running {
            pool.end(usage, ok);
        }

        let snap = pool.snapshot();
        prop_assert_eq!(snap["queue_size"].scalar(&[]), Some(0.0));
        prop_assert_eq!(snap["in_use"].scalar(&[]), Some(0.0));
        prop_assert_eq!(snap.contains_key("pool_ratio"), max > 0);
        prop_assert_eq!(snap["usage"].count(&[]), Some(outcomes.len() as u64));
    }
}
