use assert_call::{call, CallRecorder};
use rstest::rstest;
use serde_json::json;
use widget_state::*;

use test_utils::count_notifications;

fn point3(x: i64, y: i64, z: i64) -> CompositeState {
    CompositeState::builder("Point3")
        .value("x", x)
        .value("y", y)
        .value("z", z)
        .build()
        .unwrap()
}

#[test]
fn equality_suppression() {
    let mut cr = CallRecorder::new();
    let s = IntState::new(1);
    s.on_change(|_| call!("a"));
    s.on_change(|_| call!("b"));
    s.set(1);
    cr.verify(());
    s.set(2);
    cr.verify(["a", "b"]);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
fn batch_exactness(#[case] n: usize) {
    let state = point3(0, 0, 0);
    let counter = count_notifications(&state);
    {
        let _batch = state.batch();
        for (index, name) in ["x", "y", "z"].into_iter().take(n).enumerate() {
            state.get::<IntState>(name).unwrap().set(index as i64 + 1);
        }
    }
    assert_eq!(counter.count(), 1);
}

#[test]
fn batch_with_enter_exit_pairs() {
    let state = point3(0, 0, 0);
    let counter = count_notifications(&state);
    state.base().enter_batch();
    state.get::<IntState>("x").unwrap().set(1);
    state.get::<IntState>("y").unwrap().set(2);
    state.base().exit_batch();
    assert_eq!(counter.count(), 1);
}

#[test]
fn propagation() {
    let leaf = FloatState::new(0.0);
    let mut node: CompositeState = CompositeState::new("Level0");
    node.set_member("leaf", leaf.clone()).unwrap();
    for depth in 1..4 {
        let parent = CompositeState::new(format!("Level{depth}"));
        parent.set_member("child", node).unwrap();
        node = parent;
    }
    let root = node;
    let counter = count_notifications(&root);
    leaf.set(1.0);
    assert_eq!(counter.count(), 1);
    leaf.set(2.0);
    assert_eq!(counter.count(), 2);
}

#[test]
fn computed_activation_ordering() {
    let state = CompositeState::builder("Rect")
        .computed("area", ["a", "b"], |p: &Params| {
            Ok(IntState::new(p.value::<i64>(0)? * p.value::<i64>(1)?))
        })
        .build()
        .unwrap();
    state.set_value("b", 3).unwrap();
    assert!(state.member("area").is_none());
    state.set_value("a", 2).unwrap();
    let area = state.get::<IntState>("area").unwrap();
    assert_eq!(area.get(), 6);

    let counter = count_notifications(&state);
    state.get::<IntState>("a").unwrap().set(4);
    assert_eq!(counter.count(), 1);
    state.get::<IntState>("b").unwrap().set(5);
    assert_eq!(counter.count(), 2);
    assert_eq!(area.get(), 20);
    assert!(state.get::<IntState>("area").unwrap().same_state(&area));
}

#[test]
fn round_trip() {
    let state = point3(1, 2, 3);
    let inner = CompositeState::builder("Label")
        .value("text", "hello")
        .value("size", 12.5)
        .value("bold", false)
        .build()
        .unwrap();
    state.set_member("label", inner).unwrap();
    let before = state.serialize().unwrap();

    let counter = count_notifications(&state);
    state.deserialize(&before).unwrap();
    assert_eq!(state.serialize().unwrap(), before);
    assert!(counter.count() <= 1);
}

#[test]
fn sequence_channels() {
    let mut cr = CallRecorder::new();
    let items = SequenceState::new();
    items.on_change(|_| call!("aggregate"));
    items.on_element_change(|_| call!("element"));

    let item = StringState::new("a".into());
    items.push(item.clone()).unwrap();
    cr.verify("aggregate");

    item.set("b".into());
    cr.verify("element");
}

#[test]
fn vector_scenario() {
    let v = DictState::new("V", [("x", 10), ("y", 20), ("z", 30)]).unwrap();
    assert_eq!(v.serialize().unwrap(), json!({"x": 10, "y": 20, "z": 30}));

    let counter = count_notifications(&v);
    v.set([1, 2, 3]).unwrap();
    assert_eq!(v.values().unwrap(), [json!(1), json!(2), json!(3)]);
    assert_eq!(counter.count(), 1);
}

#[test]
fn precision_rounds_before_comparing() {
    let s = FloatState::with_precision(0.5, 1);
    let counter = count_notifications(&s);
    s.set(0.54);
    assert_eq!(counter.count(), 0);
    s.set(0.56);
    assert_eq!(counter.count(), 1);
    assert_eq!(s.get(), 0.6);
}

#[test]
fn json_round_trip() {
    let state = point3(1, 2, 3);
    let text = serialize_json(&state).unwrap();
    let other = point3(0, 0, 0);
    deserialize_json(&other, &text).unwrap();
    assert_eq!(serialize_json(&other).unwrap(), text);
}
