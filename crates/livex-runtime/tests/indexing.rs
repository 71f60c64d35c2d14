//! Index nodes over observable lists and dictionaries.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use livex_core::{FaultKind, ObservableDictionary, ObservableList, Value, ValueType};
use livex_runtime::{Engine, Expr, Indexer, NodeHandle};

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

/// An `Item` indexer that counts its reads.
fn counting_item(reads: &Arc<AtomicUsize>) -> Indexer {
    let reads = Arc::clone(reads);
    Indexer::new("Item", ValueType::Int, move |recv, args| {
        reads.fetch_add(1, Ordering::SeqCst);
        recv.index(&args[0])
    })
}

fn index_node(engine: &Engine, target: Value, indexer: &Indexer, key: Value) -> NodeHandle {
    let expr = Expr::constant(target).index(indexer, [Expr::constant(key)]);
    engine.node(&expr, None, false).unwrap()
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

#[test]
fn list_index_reevaluates_only_for_affecting_changes() {
    common::init_tracing();
    let engine = Engine::new();
    let list = Arc::new(ObservableList::from_vec(ints(&[10, 20, 30, 40])));
    let reads = Arc::new(AtomicUsize::new(0));
    let node = index_node(
        &engine,
        Value::from(Arc::clone(&list)),
        &counting_item(&reads),
        Value::Int(2),
    );
    assert_eq!(node.value(), Value::Int(30));
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    // After the observed position.
    list.push(50);
    list.remove_at(4).unwrap();
    // Before it, but same length.
    list.set(0, 11).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(node.value(), Value::Int(30));

    // Shifts the observed element.
    list.insert(0, 5).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert_eq!(node.value(), Value::Int(20));

    // [5, 11, 20, 30, 40] -> [11, 20, 30, 5, 40]
    list.move_range(0, 3, 1).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 3);
    assert_eq!(node.value(), Value::Int(30));

    list.set(2, 99).unwrap();
    assert_eq!(node.value(), Value::Int(99));
}

#[test]
fn list_reset_and_out_of_range() {
    let engine = Engine::new();
    let list = Arc::new(ObservableList::from_vec(ints(&[1, 2, 3])));
    let node = index_node(
        &engine,
        Value::from(Arc::clone(&list)),
        &Indexer::item(ValueType::Int),
        Value::Int(1),
    );
    assert_eq!(node.value(), Value::Int(2));

    list.clear();
    let fault = node.fault().unwrap();
    assert!(matches!(fault.kind(), FaultKind::IndexOutOfRange { index: 1, len: 0 }));
    assert_eq!(node.value(), Value::Int(0));

    list.reset(ints(&[7, 8]));
    assert_eq!(node.value(), Value::Int(8));
    assert!(node.fault().is_none());
}

#[test]
fn list_count_member_follows_length() {
    let engine = Engine::new();
    let list = Arc::new(ObservableList::new());
    let expr = Expr::constant(Value::from(Arc::clone(&list))).property("Count", ValueType::Int);
    let node = engine.node(&expr, None, false).unwrap();
    assert_eq!(node.value(), Value::Int(0));
    list.push("a");
    list.push("b");
    assert_eq!(node.value(), Value::Int(2));
    list.set(0, "z").unwrap();
    assert_eq!(node.value(), Value::Int(2));
}

#[test]
fn non_integer_list_key_faults() {
    let engine = Engine::new();
    let list = Arc::new(ObservableList::from_vec(ints(&[1])));
    let node = index_node(
        &engine,
        Value::from(list),
        &Indexer::item(ValueType::Int),
        Value::from("first"),
    );
    assert!(matches!(node.fault().map(|f| f.kind().to_string()), Some(m) if m.contains("int")));
}

// ---------------------------------------------------------------------------
// Dictionaries
// ---------------------------------------------------------------------------

#[test]
fn dictionary_key_lifecycle() {
    let engine = Engine::new();
    let dict = Arc::new(ObservableDictionary::new());
    dict.insert("a", 1);
    let reads = Arc::new(AtomicUsize::new(0));
    let node = index_node(
        &engine,
        Value::from(Arc::clone(&dict)),
        &counting_item(&reads),
        Value::from("a"),
    );
    assert_eq!(node.value(), Value::Int(1));

    // Other keys are ignored.
    dict.insert("b", 2);
    dict.remove(&Value::from("b"));
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    dict.insert("a", 5);
    assert_eq!(node.value(), Value::Int(5));

    dict.remove(&Value::from("a"));
    let fault = node.fault().unwrap();
    assert!(fault.is_key_removed());
    assert_eq!(fault.to_string(), "key 'a' was removed");
    // The removal is reported without re-reading the dictionary.
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    dict.insert("a", 7);
    assert_eq!(node.value(), Value::Int(7));
    assert!(node.fault().is_none());
}

#[test]
fn missing_key_and_reset() {
    let engine = Engine::new();
    let dict = Arc::new(ObservableDictionary::new());
    let node = index_node(
        &engine,
        Value::from(Arc::clone(&dict)),
        &Indexer::item(ValueType::Int),
        Value::from("k"),
    );
    assert!(matches!(node.fault().unwrap().kind(), FaultKind::KeyNotFound { .. }));

    dict.extend([(Value::from("k"), Value::Int(3))]);
    assert_eq!(node.value(), Value::Int(3));

    dict.clear();
    assert!(matches!(node.fault().unwrap().kind(), FaultKind::KeyNotFound { .. }));
}

#[test]
fn index_key_from_an_observable_member() {
    let engine = Engine::new();
    let list = Arc::new(ObservableList::from_vec(ints(&[100, 200, 300])));
    let position = Arc::new(ObservableList::from_vec(ints(&[0])));
    // items[position.Count]
    let expr = Expr::constant(Value::from(Arc::clone(&list))).item(
        Expr::constant(Value::from(Arc::clone(&position))).property("Count", ValueType::Int),
        ValueType::Int,
    );
    let node = engine.node(&expr, None, false).unwrap();
    assert_eq!(node.value(), Value::Int(200));

    position.push(0);
    assert_eq!(node.value(), Value::Int(300));
    position.push(0);
    assert!(node.fault().is_some());
}
