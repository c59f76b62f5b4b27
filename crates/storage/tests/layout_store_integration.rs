use serde_json::json;
use shared::domain::{LayoutState, LAYOUT_STORAGE_KEY};
use storage::{get_typed, set_typed, shared, JsonFileStore, KeyValueStore};

#[test]
fn shared_store_persists_layout_across_processes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("console.json");

    let store = shared(JsonFileStore::open(&path).expect("open"));
    {
        let mut guard = store.lock().expect("lock");
        guard.set("unrelated", json!({"keep": true}));
        set_typed(
            &mut *guard,
            LAYOUT_STORAGE_KEY,
            &LayoutState {
                height: 31,
                expanded: true,
            },
        )
        .expect("set");
        guard.save().expect("save");
    }
    drop(store);

    let raw = std::fs::read_to_string(&path).expect("read");
    let on_disk: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(on_disk[LAYOUT_STORAGE_KEY], json!({"height": 31, "expanded": true}));
    assert!(!path.with_extension("tmp").exists());

    let reopened = JsonFileStore::open(&path).expect("reopen");
    assert_eq!(
        get_typed::<LayoutState>(&reopened, LAYOUT_STORAGE_KEY),
        Some(LayoutState {
            height: 31,
            expanded: true
        })
    );
    assert_eq!(reopened.get("unrelated"), Some(&json!({"keep": true})));
}
