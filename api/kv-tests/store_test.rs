use packdb_api::error::StoreError;
use packdb_api::kv::{KeyValueSupport, StoreOptions, StoreSysSupport};
use packdb_api::types::Value;
use std::path::{Path, PathBuf};

use super::KvStore;

#[path = "utils.rs"]
mod utils;

fn db_prep_path(name: &str) -> PathBuf {
    utils::db_prep_path(&("kv-images-".to_string() + name), "db")
}

fn open_default(path: &Path) -> KvStore {
    KvStore::open(path, StoreOptions::default()).unwrap()
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

//The tests below live inside the engine module, so they may peek at the
//index and the registry to pin down placement decisions.
fn offset_of(store: &KvStore, key: &str) -> u64 {
    store.index.read().unwrap().get(key).unwrap().offset
}

fn registry_contains(store: &KvStore, size: u64, offset: u64) -> bool {
    store.gate.lock().unwrap().registry.contains(size, offset)
}

fn text(s: &str) -> Option<Value> {
    Some(Value::Text(s.to_string()))
}

#[test]
fn set_get_reopen() {
    let path = db_prep_path("reopen");
    let store = open_default(&path);

    store.set("a", "1").unwrap();
    store.set("b", "22").unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.has("a"));
    assert_eq!(store.get("a").unwrap(), text("1"));
    assert_eq!(store.get("b").unwrap(), text("22"));
    //Two minimal records, one 16-byte block each
    assert_eq!(file_len(&path), 32);
    drop(store);

    let store = open_default(&path);
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").unwrap(), text("1"));
    assert_eq!(store.get("b").unwrap(), text("22"));
    assert_eq!(store.get("c").unwrap(), None);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn hole_reuse_exact_size() {
    let path = db_prep_path("hole-reuse");
    let store = open_default(&path);

    store.set("a", "hello").unwrap();
    assert_eq!(file_len(&path), 16);
    store.delete("a").unwrap();
    assert!(registry_contains(&store, 16, 0));

    //Same block size: the freed offset is recycled, the file does not grow
    store.set("c", "world").unwrap();
    assert_eq!(offset_of(&store, "c"), 0);
    assert_eq!(file_len(&path), 16);
    assert!(!registry_contains(&store, 16, 0));

    //Different block size: the hole does not match, append past former eof
    store.set("d", &"x".repeat(40)[..]).unwrap();
    assert_eq!(offset_of(&store, "d"), 16);
    assert_eq!(file_len(&path), 16 + 64);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn update_in_place_and_shrink() {
    let path = db_prep_path("in-place");
    let store = open_default(&path);

    store.set("k", "initial").unwrap();
    let offset = offset_of(&store, "k");
    let len = file_len(&path);

    //An update that still fits rewrites the same block
    store.set("k", "updated").unwrap();
    assert_eq!(offset_of(&store, "k"), offset);
    assert_eq!(file_len(&path), len);
    assert_eq!(store.get("k").unwrap(), text("updated"));

    //Shrinks never relocate either
    store.set("k", "x").unwrap();
    assert_eq!(offset_of(&store, "k"), offset);
    assert_eq!(file_len(&path), len);
    assert_eq!(store.get("k").unwrap(), text("x"));
    assert_eq!(store.len(), 1);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn relocation_preserves_value_and_frees_block() {
    let path = db_prep_path("relocation");
    let store = open_default(&path);

    store.set("k", "short").unwrap();
    assert_eq!(offset_of(&store, "k"), 0);
    assert_eq!(file_len(&path), 16);

    //Too big for the 16-byte block: appended past eof, old block freed
    let long = "x".repeat(40);
    store.set("k", long.as_str()).unwrap();
    assert_eq!(offset_of(&store, "k"), 16);
    assert_eq!(store.get("k").unwrap(), text(&long));
    assert_eq!(file_len(&path), 16 + 64);
    assert!(registry_contains(&store, 16, 0));

    //The freed block is recycled by the next fitting insert
    store.set("j", "xx").unwrap();
    assert_eq!(offset_of(&store, "j"), 0);
    assert_eq!(file_len(&path), 16 + 64);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn lifo_reuse_of_freed_blocks() {
    let path = db_prep_path("lifo");
    let store = open_default(&path);

    store.set("k1", "a").unwrap();
    store.set("k2", "b").unwrap();
    store.set("k3", "c").unwrap();
    assert_eq!(file_len(&path), 48);

    //Delete the middle key; the next same-sized insert lands in its hole
    store.delete("k2").unwrap();
    store.set("k4", "d").unwrap();
    assert_eq!(offset_of(&store, "k4"), 16);
    assert_eq!(file_len(&path), 48);

    //With two holes, the most recently freed one is taken first
    store.delete("k1").unwrap();
    store.delete("k3").unwrap();
    store.set("k5", "e").unwrap();
    assert_eq!(offset_of(&store, "k5"), 32);
    store.set("k6", "f").unwrap();
    assert_eq!(offset_of(&store, "k6"), 0);
    assert_eq!(file_len(&path), 48);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn delete_is_idempotent() {
    let path = db_prep_path("delete");
    let store = open_default(&path);

    store.set("k", "v").unwrap();
    assert!(store.delete("k").unwrap());
    assert!(!store.has("k"));
    assert_eq!(store.get("k").unwrap(), None);
    assert!(!store.delete("k").unwrap());
    assert!(!store.delete("never-set").unwrap());
    assert_eq!(store.len(), 0);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn clear_truncates_and_survives_reopen() {
    let path = db_prep_path("clear");
    let store = open_default(&path);

    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.delete("a").unwrap();
    store.clear().unwrap();
    assert_eq!(store.len(), 0);
    assert_eq!(file_len(&path), 0);

    //A cleared store starts allocating from offset 0 again
    store.set("c", "3").unwrap();
    assert_eq!(offset_of(&store, "c"), 0);
    assert_eq!(file_len(&path), 16);
    store.clear().unwrap();
    drop(store);

    let store = open_default(&path);
    assert_eq!(store.len(), 0);
    assert_eq!(file_len(&path), 0);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn reopen_registers_free_blocks() {
    let path = db_prep_path("reopen-free");
    let store = open_default(&path);

    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.delete("a").unwrap();
    drop(store);

    let store = open_default(&path);
    assert_eq!(store.len(), 1);
    assert!(!store.has("a"));
    assert!(registry_contains(&store, 16, 0));

    //The rescanned hole is still reusable
    store.set("c", "3").unwrap();
    assert_eq!(offset_of(&store, "c"), 0);
    assert_eq!(file_len(&path), 32);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn uncached_values_read_from_disk() {
    let path = db_prep_path("uncached");
    let opts = StoreOptions {
        buffer_values: false,
        in_memory_values: false,
    };
    let store = KvStore::open(&path, opts).unwrap();

    store.set("k", "v").unwrap();
    store.set("long", &"y".repeat(100)[..]).unwrap();
    assert_eq!(store.get("k").unwrap(), text("v"));
    assert_eq!(store.get("long").unwrap(), text(&"y".repeat(100)));
    drop(store);

    //A second engine on the same file answers from positioned reads alone
    let store = KvStore::open(&path, opts).unwrap();
    assert_eq!(store.get("k").unwrap(), text("v"));
    assert_eq!(store.get("long").unwrap(), text(&"y".repeat(100)));
    assert_eq!(
        store.entries().unwrap(),
        vec![
            ("k".to_string(), Value::Text("v".to_string())),
            ("long".to_string(), Value::Text("y".repeat(100))),
        ]
    );

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn buffered_values_stay_bytes() {
    let path = db_prep_path("buffered");
    let opts = StoreOptions {
        buffer_values: true,
        in_memory_values: true,
    };
    let store = KvStore::open(&path, opts).unwrap();

    //Text inputs are collapsed to bytes, byte inputs stay as they are
    store.set("t", "hi").unwrap();
    store.set("b", vec![0u8, 159, 1]).unwrap();
    assert_eq!(store.get("t").unwrap(), Some(Value::Bytes(b"hi".to_vec())));
    assert_eq!(
        store.get("b").unwrap(),
        Some(Value::Bytes(vec![0u8, 159, 1]))
    );
    drop(store);

    let store = KvStore::open(&path, opts).unwrap();
    assert_eq!(
        store.get("b").unwrap(),
        Some(Value::Bytes(vec![0u8, 159, 1]))
    );

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn length_prefix_boundaries() {
    let path = db_prep_path("boundaries");
    let store = open_default(&path);

    //Keys of 255 and 256 bytes straddle the small/large key prefix
    let k255 = "k".repeat(255);
    let k256 = "q".repeat(256);
    store.set(&k255, "v").unwrap();
    store.set(&k256, "w").unwrap();
    assert_eq!(store.get(&k255).unwrap(), text("v"));
    assert_eq!(store.get(&k256).unwrap(), text("w"));

    //Values of 65535 and 65536 bytes straddle the small/large value prefix
    let v65535 = "v".repeat(65535);
    let v65536 = "w".repeat(65536);
    store.set("small-form", v65535.as_str()).unwrap();
    store.set("large-form", v65536.as_str()).unwrap();
    assert_eq!(store.get("small-form").unwrap(), text(&v65535));
    assert_eq!(store.get("large-form").unwrap(), text(&v65536));

    //Everything still decodes after a rescan
    drop(store);
    let store = open_default(&path);
    assert_eq!(store.len(), 4);
    assert_eq!(store.get(&k256).unwrap(), text("w"));
    assert_eq!(store.get("small-form").unwrap(), text(&v65535));
    assert_eq!(store.get("large-form").unwrap(), text(&v65536));

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn empty_values_and_invalid_keys() {
    let path = db_prep_path("edge-keys");
    let store = open_default(&path);

    //An empty value is a legal record in the smallest block
    store.set("e", "").unwrap();
    assert_eq!(store.get("e").unwrap(), text(""));
    assert_eq!(file_len(&path), 16);

    //Empty and oversized keys are refused before touching the file
    assert!(matches!(
        store.set("", "v"),
        Err(StoreError::InvalidKey(_))
    ));
    let huge_key = "k".repeat(65536);
    assert!(matches!(
        store.set(&huge_key, "v"),
        Err(StoreError::InvalidKey(_))
    ));
    assert_eq!(store.len(), 1);
    assert_eq!(file_len(&path), 16);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn iteration_in_insertion_order() {
    let path = db_prep_path("iteration");
    let store = open_default(&path);

    store.set("b", "1").unwrap();
    store.set("a", "2").unwrap();
    store.set("c", "3").unwrap();
    //Re-setting does not move a key to the back
    store.set("b", "9").unwrap();

    assert_eq!(store.keys(), vec!["b", "a", "c"]);
    assert_eq!(
        store.values().unwrap(),
        vec![
            Value::Text("9".into()),
            Value::Text("2".into()),
            Value::Text("3".into()),
        ]
    );
    assert_eq!(
        store.entries().unwrap(),
        vec![
            ("b".to_string(), Value::Text("9".into())),
            ("a".to_string(), Value::Text("2".into())),
            ("c".to_string(), Value::Text("3".into())),
        ]
    );

    let mut seen = Vec::new();
    store
        .for_each(|key, value| seen.push(format!("{key}={value}")))
        .unwrap();
    assert_eq!(seen, vec!["b=9", "a=2", "c=3"]);

    //try_for_each stops at the callback's first error
    let mut count = 0;
    let result = store.try_for_each(|_, _| {
        count += 1;
        if count == 2 {
            Err(StoreError::InvalidKey("stop"))
        } else {
            Ok(())
        }
    });
    assert!(result.is_err());
    assert_eq!(count, 2);

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn reopen_answers_like_the_live_store() {
    let path = db_prep_path("equivalence");
    let store = open_default(&path);

    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.set("c", "3").unwrap();
    store.set("b", &"z".repeat(40)[..]).unwrap(); //forces a relocation
    store.delete("c").unwrap();

    let mut before = store.entries().unwrap();
    before.sort_by(|a, b| a.0.cmp(&b.0));
    drop(store);

    //Iteration order after a rescan is block order, not the original
    //insertion order, so compare the sorted contents
    let store = open_default(&path);
    let mut after = store.entries().unwrap();
    after.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(before, after);
    assert_eq!(store.len(), 2);
    assert!(store.has("a"));
    assert!(!store.has("c"));

    drop(store);
    utils::db_unprep_path(&path);
}

#[test]
fn corrupt_files_fail_to_open() {
    //A file shorter than any block header
    let path = db_prep_path("corrupt-short");
    std::fs::write(&path, [0u8, 1, 2]).unwrap();
    assert!(matches!(
        KvStore::open(&path, StoreOptions::default()),
        Err(StoreError::CorruptBlock { offset: 0, .. })
    ));
    utils::db_unprep_path(&path);

    //A block whose declared size runs past end of file: exponent 5 claims
    //512 bytes, but only 16 exist
    let path = db_prep_path("corrupt-overrun");
    let mut block = [0u8; 16];
    block[0] = 5;
    std::fs::write(&path, block).unwrap();
    assert!(matches!(
        KvStore::open(&path, StoreOptions::default()),
        Err(StoreError::CorruptBlock { offset: 0, .. })
    ));
    utils::db_unprep_path(&path);

    //A record whose lengths overrun its own block: a 200-byte key cannot
    //sit in a 16-byte block
    let path = db_prep_path("corrupt-record");
    let mut block = [0u8; 16];
    block[1] = 200;
    std::fs::write(&path, block).unwrap();
    assert!(matches!(
        KvStore::open(&path, StoreOptions::default()),
        Err(StoreError::CorruptBlock { offset: 0, .. })
    ));
    utils::db_unprep_path(&path);
}
