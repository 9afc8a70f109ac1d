//! Shard safety queries against generated agency states

use agency_sync::agency::state::{
    get_db_server_blocking_restart_shards, get_db_server_shards_not_in_sync, State, ANY_SERVER,
};
use serde_json::{json, Value};

/// One shard: planned servers, current servers
type ShardSpec<'a> = (&'a [&'a str], &'a [&'a str]);

fn generate(write_concern: u32, replication_factor: Option<Value>, shards: &[ShardSpec]) -> State {
    let mut plan_shards = serde_json::Map::new();
    let mut current_shards = serde_json::Map::new();

    for (idx, (plan, current)) in shards.iter().enumerate() {
        let id = format!("s{}", 100 + idx);
        plan_shards.insert(id.clone(), json!(plan));
        current_shards.insert(id, json!({ "servers": current }));
    }

    let mut collection = json!({
        "name": "test",
        "writeConcern": write_concern,
        "shards": plan_shards,
    });
    if let Some(rf) = replication_factor {
        collection["replicationFactor"] = rf;
    }

    let state = json!({
        "Plan": { "Collections": { "db": { "1001": collection } } },
        "Current": { "Collections": { "db": { "1001": current_shards } } },
    });

    serde_json::from_value(state).unwrap()
}

fn can_restart(s: &State, server: &str) -> bool {
    get_db_server_blocking_restart_shards(s, server).is_empty()
}

fn check_restart(name: &str, s: &State, ready: &[&str], not_ready: &[&str]) {
    for server in ready {
        assert!(can_restart(s, server), "{}: {} should be able to restart", name, server);
    }
    for server in not_ready {
        assert!(!can_restart(s, server), "{}: {} should be blocked", name, server);
    }
}

#[test]
fn test_restart_sole_in_sync_replica() {
    let s = generate(1, None, &[(&["A", "B"], &["A"])]);
    assert!(!can_restart(&s, "A"));
    assert!(can_restart(&s, "B"));

    let blocking = get_db_server_blocking_restart_shards(&s, "A");
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0].database, "db");
    assert_eq!(blocking[0].collection, "1001");
    assert_eq!(blocking[0].shard, "s100");
}

#[test]
fn test_restart_table() {
    check_restart(
        "not in plan, in current",
        &generate(1, None, &[(&["A"], &["B"])]),
        &["B", "A"],
        &[],
    );
    check_restart(
        "not in plan, not in current",
        &generate(1, None, &[(&["A"], &["A"])]),
        &["C", "A"],
        &[],
    );
    check_restart(
        "missing in current",
        &generate(1, None, &[(&["A", "B"], &["B"])]),
        &["A"],
        &["B"],
    );
    check_restart(
        "missing in current, broken write concern",
        &generate(2, None, &[(&["A", "B", "C"], &["B"])]),
        &[],
        &["A", "B", "C"],
    );
    check_restart(
        "missing in current, fine write concern",
        &generate(2, None, &[(&["A", "B", "C"], &["B", "C"])]),
        &["A"],
        &["B", "C"],
    );
    check_restart(
        "missing in current, low write concern",
        &generate(1, None, &[(&["A", "B", "C"], &["B", "A"])]),
        &["A", "B", "C"],
        &[],
    );
    check_restart(
        "in current, broken write concern",
        &generate(2, None, &[(&["A", "B", "C"], &["B", "A"])]),
        &["C"],
        &["A", "B"],
    );
    check_restart(
        "all shards in sync",
        &generate(
            1,
            None,
            &[(&["A", "B", "C"], &["B", "A"]), (&["A", "D"], &["D", "A"])],
        ),
        &["A", "B", "C", "D"],
        &[],
    );
    check_restart(
        "all shards in sync, broken write concern",
        &generate(
            2,
            None,
            &[(&["A", "B", "C"], &["B", "A"]), (&["A", "D"], &["D", "A"])],
        ),
        &["C", "D"],
        &["A", "B"],
    );
    check_restart(
        "some shards not fully synced",
        &generate(
            1,
            None,
            &[(&["A", "B", "C"], &["A", "B", "C"]), (&["A", "B", "C"], &["C"])],
        ),
        &["A", "B"],
        &["C"],
    );
    check_restart(
        "some shards not fully synced, broken write concern",
        &generate(
            2,
            None,
            &[(&["A", "B", "C"], &["A", "B", "C"]), (&["A", "B", "C"], &["C"])],
        ),
        &[],
        &["A", "B", "C"],
    );
    check_restart(
        "only one is able to restart",
        &generate(
            6,
            None,
            &[(&["A", "B", "C", "D", "E", "F"], &["A", "B", "C", "E", "F"])],
        ),
        &["D"],
        &["A", "B", "C", "E", "F"],
    );
}

#[test]
fn test_restart_write_concern_two() {
    let s = generate(
        2,
        None,
        &[(&["A", "B"], &["B"]), (&["A", "B", "C"], &["A", "B", "C"])],
    );
    check_restart("wc 2", &s, &["A", "C", "D"], &["B"]);

    let s = generate(
        3,
        None,
        &[(&["A", "B", "C"], &["A", "B"]), (&["A", "B", "C"], &["A", "B", "C"])],
    );
    check_restart("wc 3", &s, &["C"], &["A", "B"]);
}

#[test]
fn test_restart_ignores_unplanned_current_servers() {
    // X reports the shard but is not planned, it must not count towards the write concern
    let s = generate(1, None, &[(&["A", "B"], &["A", "X"])]);
    assert!(!can_restart(&s, "A"));
}

#[test]
fn test_restart_declared_replication_factor() {
    // Declared RF above the planned count raises the clamp ceiling
    let s = generate(2, Some(json!(3)), &[(&["A", "B"], &["A", "B"])]);
    assert!(!can_restart(&s, "A"));

    let s = generate(2, Some(json!(1)), &[(&["A", "B"], &["A", "B"])]);
    assert!(can_restart(&s, "A"), "planned count wins over a smaller RF");
}

#[test]
fn test_restart_satellite_collection() {
    let s = generate(1, Some(json!("satellite")), &[(&["A", "B", "C"], &["A", "B"])]);
    check_restart("satellite", &s, &["A", "B", "C"], &[]);

    let s = generate(1, Some(json!("satellite")), &[(&["A", "B", "C"], &["A"])]);
    check_restart("satellite, one replica", &s, &["B", "C"], &["A"]);
}

#[test]
fn test_restart_unknown_replication_factor() {
    // Unknown RF falls back to the number of in-sync replicas
    let s = generate(2, Some(json!("bogus")), &[(&["A", "B", "C"], &["A", "B"])]);
    check_restart("unknown rf", &s, &["A", "B", "C"], &[]);
}

#[test]
fn test_not_in_sync_ignores_leader_position() {
    let s = generate(1, None, &[(&["A", "B"], &["B", "A"])]);
    assert!(get_db_server_shards_not_in_sync(&s, "A").is_empty());
    assert!(get_db_server_shards_not_in_sync(&s, ANY_SERVER).is_empty());

    // The leader-aware check disagrees on purpose
    assert_eq!(s.get_shards_status().get("s100"), Some(&false));
}

#[test]
fn test_not_in_sync_per_server() {
    let s = generate(
        1,
        None,
        &[(&["A", "B"], &["A"]), (&["C", "D"], &["C", "D"])],
    );

    let shards = get_db_server_shards_not_in_sync(&s, "B");
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].shard, "s100");

    assert_eq!(get_db_server_shards_not_in_sync(&s, "A").len(), 1);
    assert!(get_db_server_shards_not_in_sync(&s, "C").is_empty());
    assert!(get_db_server_shards_not_in_sync(&s, "Z").is_empty());
    assert_eq!(get_db_server_shards_not_in_sync(&s, ANY_SERVER).len(), 1);
}

#[test]
fn test_not_in_sync_missing_current() {
    let s: State = serde_json::from_value(json!({
        "Plan": { "Collections": { "db": { "1001": { "shards": { "s1": ["A", "B"] } } } } }
    }))
    .unwrap();

    assert_eq!(get_db_server_shards_not_in_sync(&s, "A").len(), 1);
    assert!(!can_restart(&s, "A"));
    assert!(!can_restart(&s, "B"));
}
