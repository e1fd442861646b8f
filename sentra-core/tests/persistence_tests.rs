// Persistence round-trips: documents.json, index files, and the manager's
// lazy reload path.

use sentra_core::{Collection, CollectionManager, FindOptions};
use serde_json::{json, Value};
use tempfile::TempDir;

fn sample_events() -> Vec<Value> {
    (0..10)
        .map(|i| {
            json!({
                "_id": format!("e{}", i),
                "severity": if i % 3 == 0 { "high" } else { "low" },
                "n": i,
                "message": format!("event number {}", i),
                "tags": ["security", "test"],
                "details": {"host": "web01", "retries": i}
            })
        })
        .collect()
}

#[test]
fn save_then_reload_reproduces_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events");

    let before: Vec<Value>;
    {
        let coll = Collection::open("events", &path).unwrap();
        coll.create_index("severity").unwrap();
        coll.create_index("n").unwrap();
        for event in sample_events() {
            coll.insert(event).unwrap();
        }
        before = coll.find(&json!({}), &FindOptions::new()).unwrap();
        coll.save().unwrap();
        coll.save_indexes().unwrap();
    }

    let coll = Collection::open("events", &path).unwrap();
    let after = coll.find(&json!({}), &FindOptions::new()).unwrap();
    assert_eq!(before, after);

    // indexes came back too, and serve the same answers
    let mut fields = coll.index_fields();
    fields.sort();
    assert_eq!(fields, ["n", "severity"]);
    assert_eq!(coll.count(&json!({"severity": "high"})).unwrap(), 4);
    assert_eq!(coll.count(&json!({"n": {"$gte": 5, "$lt": 8}})).unwrap(), 3);
}

#[test]
fn documents_file_is_a_pretty_array() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events");

    let coll = Collection::open("events", &path).unwrap();
    coll.insert(json!({"_id": "1", "severity": "high"})).unwrap();
    coll.save().unwrap();

    let raw = std::fs::read_to_string(path.join("documents.json")).unwrap();
    assert!(raw.trim_start().starts_with('['));
    assert!(raw.contains('\n'), "expected pretty-printed output");
    let parsed: Vec<Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["_id"], json!("1"));
}

#[test]
fn save_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events");

    let coll = Collection::open("events", &path).unwrap();
    coll.create_index("severity").unwrap();
    coll.insert(json!({"_id": "1", "severity": "high"})).unwrap();
    coll.save().unwrap();
    coll.save_indexes().unwrap();

    let mut names: Vec<String> = walk(&path);
    names.sort();
    assert_eq!(names, ["documents.json", "severity.idx"]);
}

fn walk(root: &std::path::Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        if entry.path().is_dir() {
            out.extend(walk(&entry.path()));
        } else {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out
}

#[test]
fn corrupt_index_file_triggers_rebuild() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events");

    {
        let coll = Collection::open("events", &path).unwrap();
        coll.create_index("severity").unwrap();
        coll.insert(json!({"_id": "1", "severity": "high"})).unwrap();
        coll.save().unwrap();
        coll.save_indexes().unwrap();
    }

    // clobber the index file; documents survive, index rebuilds on open
    std::fs::write(path.join("indexes").join("severity.idx"), b"garbage").unwrap();

    let coll = Collection::open("events", &path).unwrap();
    assert_eq!(coll.index_fields(), ["severity"]);
    assert_eq!(coll.count(&json!({"severity": "high"})).unwrap(), 1);
}

#[test]
fn reload_preserves_insertion_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events");

    {
        let coll = Collection::open("events", &path).unwrap();
        for id in ["zulu", "alpha", "mike"] {
            coll.insert(json!({"_id": id})).unwrap();
        }
        coll.save().unwrap();
    }

    let coll = Collection::open("events", &path).unwrap();
    let ids: Vec<String> = coll
        .find(&json!({}), &FindOptions::new())
        .unwrap()
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["zulu", "alpha", "mike"]);
}

#[test]
fn manager_round_trip_through_restart() {
    let dir = TempDir::new().unwrap();

    {
        let manager = CollectionManager::new(dir.path());
        let coll = manager.get_collection("security_events").unwrap();
        coll.create_index("severity").unwrap();
        for event in sample_events() {
            coll.insert(event).unwrap();
        }
        manager.save_all().unwrap();
    }

    // "restart": a fresh manager over the same data directory
    let manager = CollectionManager::new(dir.path());
    let coll = manager.get_collection("security_events").unwrap();
    assert_eq!(coll.len(), 10);
    assert_eq!(coll.count(&json!({"severity": "high"})).unwrap(), 4);
}
