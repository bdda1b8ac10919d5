use super::*;

fn replica(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

// =============================================================================
// Stamp ordering
// =============================================================================

#[test]
fn stamp_orders_by_clock_first() {
    let low = Stamp { clock: 1, replica: replica(9) };
    let high = Stamp { clock: 2, replica: replica(1) };
    assert!(low < high);
}

#[test]
fn stamp_breaks_ties_by_replica() {
    let a = Stamp { clock: 5, replica: replica(1) };
    let b = Stamp { clock: 5, replica: replica(2) };
    assert!(a < b);
    assert_ne!(a, b);
}

#[test]
fn stamp_equality_requires_both_fields() {
    let a = Stamp { clock: 3, replica: replica(7) };
    let b = Stamp { clock: 3, replica: replica(7) };
    assert_eq!(a, b);
}

// =============================================================================
// LamportClock
// =============================================================================

#[test]
fn tick_is_strictly_monotonic() {
    let mut clock = LamportClock::new(replica(1));
    let first = clock.tick();
    let second = clock.tick();
    assert!(second > first);
    assert_eq!(first.clock, 1);
    assert_eq!(second.clock, 2);
}

#[test]
fn tick_carries_replica_id() {
    let mut clock = LamportClock::new(replica(42));
    assert_eq!(clock.tick().replica, replica(42));
}

#[test]
fn observe_advances_past_remote_stamp() {
    let mut clock = LamportClock::new(replica(1));
    clock.observe(Stamp { clock: 10, replica: replica(2) });
    let next = clock.tick();
    assert_eq!(next.clock, 11);
}

#[test]
fn observe_ignores_older_stamp() {
    let mut clock = LamportClock::new(replica(1));
    clock.tick();
    clock.tick();
    clock.observe(Stamp { clock: 1, replica: replica(2) });
    assert_eq!(clock.current(), 2);
}

#[test]
fn resume_continues_from_counter() {
    let mut clock = LamportClock::resume(replica(1), 99);
    assert_eq!(clock.tick().clock, 100);
}

#[test]
fn stamp_serde_round_trip() {
    let stamp = Stamp { clock: 17, replica: replica(3) };
    let json = serde_json::to_string(&stamp).unwrap();
    let restored: Stamp = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, stamp);
}
