use std::sync::Mutex;

use super::*;
use shared::domain::{LayoutState, LAYOUT_STORAGE_KEY};
use storage::{get_typed, MemoryStore};

fn console_with_store() -> (Console, Arc<Mutex<MemoryStore>>) {
    let store = Arc::new(Mutex::new(MemoryStore::new()));
    let shared: SharedStore = store.clone();
    (Console::new(ConsoleOptions::default(), Some(shared)), store)
}

#[test]
fn height_flag_resizes_and_persists_layout() {
    let (console, store) = console_with_store();
    apply_height(&console, Some(20));

    let store = store.lock().expect("lock");
    assert_eq!(store.save_count(), 1);
    assert_eq!(
        get_typed::<LayoutState>(&*store, LAYOUT_STORAGE_KEY),
        Some(LayoutState {
            height: 20,
            expanded: false
        })
    );
}

#[test]
fn no_height_flag_leaves_layout_untouched() {
    let (console, store) = console_with_store();
    apply_height(&console, None);
    assert_eq!(store.lock().expect("lock").save_count(), 0);
}

#[test]
fn zero_height_is_rejected_by_the_parser() {
    assert!(Args::try_parse_from(["live-console", "--height", "0"]).is_err());
    let args = Args::try_parse_from(["live-console", "--height", "8", "update", "3", "4"])
        .expect("valid args");
    assert_eq!(args.height, Some(8));
    assert!(matches!(args.command, Some(CliCommand::Update { ids }) if ids == vec![3, 4]));
}
