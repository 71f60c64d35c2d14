//! Sharing, reference counting, teardown and value disposal.

mod common;

use std::sync::Arc;

use common::{ResourceLog, TestPerson};
use livex_core::{Value, ValueType};
use livex_runtime::{
    ActiveExpression, ActiveOptions, ConstructionError, Constructor, Engine, Expr, Lambda, Member,
    Method, OptionsError,
};

const PERSON: ValueType = ValueType::Object("TestPerson");
const RESOURCE: ValueType = ValueType::Object("Resource");

fn person_arg(person: &Arc<TestPerson>) -> Value {
    Value::from(Arc::clone(person))
}

fn name_of_param() -> Lambda {
    Lambda::new(
        [PERSON],
        Expr::parameter(0, PERSON).property("Name", ValueType::Str),
    )
}

// ---------------------------------------------------------------------------
// Sharing
// ---------------------------------------------------------------------------

#[test]
fn same_lambda_and_arguments_share_one_root() {
    let engine = Engine::new();
    let person = TestPerson::new(Some("ab"));
    let a: ActiveExpression<String> = engine.create(&name_of_param(), &[person_arg(&person)]).unwrap();
    let b: ActiveExpression<String> = engine.create(&name_of_param(), &[person_arg(&person)]).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.ref_count(), 2);
    assert_eq!(engine.live_root_count(), 1);
    assert_eq!(person.name_gets(), 1);

    let other = TestPerson::new(Some("cd"));
    let c: ActiveExpression<String> = engine.create(&name_of_param(), &[person_arg(&other)]).unwrap();
    assert_ne!(a, c);
    assert_eq!(engine.live_root_count(), 2);
}

#[test]
fn handles_of_different_types_share_nodes() {
    let engine = Engine::new();
    let person = TestPerson::new(Some("ab"));
    let typed: ActiveExpression<String> = engine.create(&name_of_param(), &[person_arg(&person)]).unwrap();
    let raw: ActiveExpression = engine.create(&name_of_param(), &[person_arg(&person)]).unwrap();
    assert!(typed.same_root(&raw));
    assert_eq!(raw.value(), Value::from("ab"));
}

#[test]
fn overlapping_trees_share_subgraphs() {
    let engine = Engine::new();
    let person = TestPerson::new(Some("abc"));
    let p = Expr::parameter(0, PERSON);
    let name = p.property("Name", ValueType::Str);
    let length = Lambda::new([PERSON], name.property("Length", ValueType::Int));
    let shout = Lambda::new(
        [PERSON],
        Expr::add(name.clone(), Expr::constant("!")),
    );

    let a: ActiveExpression<i64> = engine.create(&length, &[person_arg(&person)]).unwrap();
    // person constant, Name, Length.
    assert_eq!(engine.live_node_count(), 3);
    let b: ActiveExpression<String> = engine.create(&shout, &[person_arg(&person)]).unwrap();
    // + "!" constant, + Add; Name and the person constant are reused.
    assert_eq!(engine.live_node_count(), 5);
    assert_eq!(person.name_gets(), 1);

    person.set_name(Some("hey"));
    assert_eq!(a.value(), 3);
    assert_eq!(b.value(), "hey!");
    assert_eq!(person.name_gets(), 2);

    drop(a);
    assert_eq!(engine.live_node_count(), 4);
    drop(b);
    assert_eq!(engine.live_node_count(), 0);
}

#[test]
fn releasing_everything_unsubscribes_from_objects() {
    let engine = Engine::new();
    let person = TestPerson::new(Some("ab"));
    let expr: ActiveExpression<String> = engine.create(&name_of_param(), &[person_arg(&person)]).unwrap();
    let clone = expr.clone();
    assert_eq!(person.handler_count(), 1);

    expr.dispose();
    assert_eq!(clone.ref_count(), 1);
    assert_eq!(person.handler_count(), 1);

    drop(clone);
    assert_eq!(engine.live_root_count(), 0);
    assert_eq!(engine.live_node_count(), 0);
    assert_eq!(person.handler_count(), 0);

    // Nothing left to react.
    person.set_name(Some("cd"));
    assert_eq!(person.name_gets(), 1);
}

// ---------------------------------------------------------------------------
// Construction errors
// ---------------------------------------------------------------------------

#[test]
fn construction_errors_are_returned() {
    let engine = Engine::new();
    let person = TestPerson::new(None);

    let err = engine
        .create::<String>(&name_of_param(), &[])
        .unwrap_err();
    assert_eq!(err, ConstructionError::ArgumentCount { expected: 1, found: 0 });

    let err = engine
        .create::<String>(&name_of_param(), &[Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, ConstructionError::ArgumentType { index: 0, .. }));

    let err = engine
        .create::<i64>(&name_of_param(), &[person_arg(&person)])
        .unwrap_err();
    assert!(matches!(err, ConstructionError::ResultType { found: ValueType::Str, .. }));

    let stray = Lambda::new([PERSON], Expr::parameter(1, ValueType::Int));
    let err = engine.create::<i64>(&stray, &[person_arg(&person)]).unwrap_err();
    assert_eq!(err, ConstructionError::UnboundParameter { index: 1 });

    assert_eq!(engine.live_node_count(), 0);
    assert_eq!(engine.live_root_count(), 0);
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

fn resource_ctor(log: &ResourceLog) -> Constructor {
    let log = log.clone();
    Constructor::new("Resource", RESOURCE, move |args| Ok(log.make(args[0].clone())))
}

/// `new Resource(p.Age)`
fn make_resource(ctor: &Constructor) -> Lambda {
    Lambda::new(
        [PERSON],
        Expr::construct(
            ctor,
            [Expr::parameter(0, PERSON).property("Age", ValueType::Int)],
        ),
    )
}

#[test]
fn owned_values_are_disposed_once_when_superseded_and_on_teardown() {
    let engine = Engine::new();
    let person = TestPerson::new(None);
    let log = ResourceLog::default();
    let ctor = resource_ctor(&log);
    let options = Arc::new(ActiveOptions::new().with_dispose_constructed_objects(true));

    let expr: ActiveExpression =
        engine.create_with_options(&make_resource(&ctor), &[person_arg(&person)], options).unwrap();
    assert_eq!(log.disposal_counts(), [0]);

    person.set_age(1);
    assert_eq!(log.disposal_counts(), [1, 0]);
    person.set_age(2);
    assert_eq!(log.disposal_counts(), [1, 1, 0]);

    let current = expr.raw_value();
    assert_eq!(current.downcast_ref::<common::Resource>().map(|r| r.seed.clone()), Some(Value::Int(2)));

    drop(expr);
    assert_eq!(log.disposal_counts(), [1, 1, 1]);
}

#[test]
fn values_are_not_disposed_without_options() {
    let engine = Engine::new();
    let person = TestPerson::new(None);
    let log = ResourceLog::default();
    let ctor = resource_ctor(&log);

    let expr: ActiveExpression = engine.create(&make_resource(&ctor), &[person_arg(&person)]).unwrap();
    person.set_age(1);
    drop(expr);
    assert_eq!(log.disposal_counts(), [0, 0]);
}

#[test]
fn options_partition_graphs_and_freeze() {
    let engine = Engine::new();
    let person = TestPerson::new(None);
    let log = ResourceLog::default();
    let ctor = resource_ctor(&log);
    let options = Arc::new(ActiveOptions::new());
    options.add_constructor_disposal(&ctor).unwrap();

    let owned: ActiveExpression = engine
        .create_with_options(&make_resource(&ctor), &[person_arg(&person)], Arc::clone(&options))
        .unwrap();
    let plain: ActiveExpression = engine.create(&make_resource(&ctor), &[person_arg(&person)]).unwrap();
    assert!(!owned.same_root(&plain));
    assert!(owned.options().is_some_and(|o| Arc::ptr_eq(o, &options)));
    assert!(plain.options().is_none());
    assert_eq!(log.all().len(), 2);

    assert_eq!(
        options.set_dispose_constructed_objects(true),
        Err(OptionsError::Frozen)
    );

    drop(owned);
    drop(plain);
    // Only the resource created under the options is disposed.
    assert_eq!(log.disposal_counts(), [1, 0]);
}

#[test]
fn static_method_results_follow_the_blanket_flag() {
    let engine = Engine::new();
    let log = ResourceLog::default();
    let maker = {
        let log = log.clone();
        Method::static_fn("Open", RESOURCE, move |_| Ok(log.make(Value::Null)))
    };
    let options = Arc::new(ActiveOptions::new().with_dispose_static_method_return_values(true));
    let node = engine
        .node(&Expr::static_call(&maker, []), Some(options), false)
        .unwrap();
    assert!(node.value().as_object().is_some());
    drop(node);
    assert_eq!(log.disposal_counts(), [1]);
}

#[test]
fn member_disposal_applies_to_the_registered_member_only() {
    let engine = Engine::new();
    let log = ResourceLog::default();
    let current = {
        let log = log.clone();
        Member::new_static("Current", RESOURCE, move || Ok(log.make(Value::Null)))
    };
    let other = {
        let log = log.clone();
        Member::new_static("Other", RESOURCE, move || Ok(log.make(Value::Null)))
    };
    let options = Arc::new(ActiveOptions::new().with_member_disposal(&current));
    let a = engine
        .node(&Expr::static_member(&current), Some(Arc::clone(&options)), false)
        .unwrap();
    let b = engine
        .node(&Expr::static_member(&other), Some(options), false)
        .unwrap();
    drop(a);
    drop(b);
    assert_eq!(log.disposal_counts(), [1, 0]);
}
