//! Tests for haarc-dispatch: registration, overlap detection, total routing

use haarc_core::{Error, OperationCode, Priority};
use haarc_dispatch::*;
use std::sync::Arc;

fn sample_builder() -> DispatchTableBuilder {
    let mut b = DispatchTableBuilder::new("fallback");
    b.register(0x100..=0x1FF, "alpha", Priority::High).unwrap();
    b.register(0x300..=0x30F, "gamma", Priority::Low).unwrap();
    b.register(0x200..=0x2FF, "beta", Priority::Normal).unwrap();
    b
}

// ===========================================================================
// register
// ===========================================================================

#[test]
fn overlapping_ranges_fail_in_either_order() {
    let pairs = [
        (0x10..=0x20, 0x18..=0x30),
        (0x10..=0x20, 0x00..=0x10),
        (0x10..=0x20, 0x12..=0x14),
        (0x10..=0x20, 0x00..=0xFF),
        (0x10..=0x20, 0x20..=0x20),
    ];
    for (a, b) in pairs {
        for (first, second) in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            let mut builder = DispatchTableBuilder::new("d");
            builder.register(first.clone(), "x", Priority::Normal).unwrap();
            let err = builder
                .register(second.clone(), "y", Priority::Normal)
                .unwrap_err();
            match err {
                Error::RangeOverlap { new, existing } => {
                    assert_eq!(new, second);
                    assert_eq!(existing, first);
                }
                other => panic!("expected RangeOverlap, got {other:?}"),
            }
        }
    }
}

#[test]
fn adjacent_ranges_do_not_overlap() {
    let mut b = DispatchTableBuilder::new("d");
    b.register(0x00..=0x0F, "a", Priority::Low).unwrap();
    b.register(0x10..=0x1F, "b", Priority::Low).unwrap();
    assert_eq!(b.len(), 2);
}

#[test]
fn inverted_range_is_config_error() {
    let mut b = DispatchTableBuilder::new("d");
    #[allow(clippy::reversed_empty_ranges)]
    let err = b.register(0x20..=0x10, "a", Priority::Low).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn failed_registration_leaves_builder_unchanged() {
    let mut b = sample_builder();
    assert!(b.register(0x150..=0x250, "bad", Priority::Critical).is_err());
    let table = b.build();
    assert_eq!(table.len(), 3);
    assert_eq!(table.route(OperationCode::new(0x150)).handler.as_str(), "alpha");
}

// ===========================================================================
// route
// ===========================================================================

#[test]
fn route_finds_bound_ranges() {
    let table = sample_builder().build();
    let r = table.route(OperationCode::new(0x100));
    assert_eq!(r.handler.as_str(), "alpha");
    assert_eq!(r.priority, Priority::High);
    assert_eq!(table.route(OperationCode::new(0x1FF)).handler.as_str(), "alpha");
    assert_eq!(table.route(OperationCode::new(0x200)).handler.as_str(), "beta");
    assert_eq!(table.route(OperationCode::new(0x30F)).handler.as_str(), "gamma");
}

#[test]
fn unmatched_codes_route_to_default_at_lowest_priority() {
    let table = sample_builder().build();
    for code in [0u32, 0xFF, 0x310, 0x10FFFF, u32::MAX] {
        let r = table.route(OperationCode::new(code));
        assert_eq!(r.handler.as_str(), "fallback");
        assert_eq!(r.priority, Priority::LOWEST);
        assert!(!table.is_bound(OperationCode::new(code)));
    }
}

#[test]
fn routing_is_total_and_matches_exactly_one_range() {
    let table = sample_builder().build();
    let ranges: Vec<_> = table.ranges().map(|(r, route)| (r, route.clone())).collect();
    for code in (0u32..0x400).chain([u32::MAX - 1, u32::MAX]) {
        let routed = table.route(OperationCode::new(code));
        let matching: Vec<_> = ranges.iter().filter(|(r, _)| r.contains(&code)).collect();
        assert!(matching.len() <= 1, "code {code:#X} in several ranges");
        match matching.first() {
            Some((_, expected)) => assert_eq!(&routed, expected),
            None => assert_eq!(&routed, table.default_route()),
        }
    }
}

#[test]
fn route_is_deterministic_across_threads() {
    let table = Arc::new(default_table("passive").unwrap());
    let expected: Vec<Route> = (0xDFF0u32..0xE090)
        .map(|c| table.route(OperationCode::new(c)))
        .collect();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let t = table.clone();
            std::thread::spawn(move || {
                (0xDFF0u32..0xE090)
                    .map(|c| t.route(OperationCode::new(c)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn ranges_iterate_in_order() {
    let table = sample_builder().build();
    let starts: Vec<u32> = table.ranges().map(|(r, _)| *r.start()).collect();
    assert_eq!(starts, vec![0x100, 0x200, 0x300]);
}

// ===========================================================================
// catalog + config
// ===========================================================================

#[test]
fn default_table_routes_primitives_by_category() {
    let table = default_table("passive").unwrap();
    assert_eq!(table.len(), 8);
    let r = table.route(Primitive::Authenticate.code());
    assert_eq!(r.handler.as_str(), "security");
    assert_eq!(r.priority, Priority::Critical);
    let r = table.route(Primitive::Read.code());
    assert_eq!(r.handler.as_str(), "crud");
    let r = table.route(OperationCode::from_char('a'));
    assert_eq!(r.handler.as_str(), "passive");
    assert_eq!(r.priority, Priority::Background);
}

#[test]
fn empty_config_uses_catalog() {
    let table = DispatchTable::from_config(&DispatchConfig::default()).unwrap();
    assert_eq!(table.len(), Category::ALL.len());
    assert_eq!(table.default_route().handler.as_str(), "passive");
}

#[test]
fn config_routes_from_toml() {
    let cfg: DispatchConfig = toml::from_str(
        r#"
        default_handler = "sink"

        [[routes]]
        start = 0xE000
        end = 0xE0FF
        handler = "everything"
        priority = "high"
        "#,
    )
    .unwrap();
    let table = DispatchTable::from_config(&cfg).unwrap();
    assert_eq!(table.route(OperationCode::new(0xE0AB)).handler.as_str(), "everything");
    assert_eq!(table.route(OperationCode::new(0xE100)).handler.as_str(), "sink");
}

#[test]
fn overlapping_config_routes_fail_startup() {
    let cfg = DispatchConfig {
        default_handler: "d".into(),
        routes: vec![
            RouteEntry { start: 0, end: 10, handler: "a".into(), priority: Priority::Low },
            RouteEntry { start: 5, end: 20, handler: "b".into(), priority: Priority::Low },
        ],
    };
    let err = DispatchTable::from_config(&cfg).unwrap_err();
    assert!(err.is_fatal_at_startup());
}

#[test]
fn handler_ref_serializes_as_string() {
    let h = HandlerRef::new("security");
    assert_eq!(serde_json::to_string(&h).unwrap(), r#""security""#);
}
