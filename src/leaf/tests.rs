use assert_call::{call, CallRecorder};
use rstest::rstest;
use serde_json::json;

use super::*;
use crate::test_helpers::{count_notifications, record};

#[test]
fn new() {
    let s = IntState::new(10);
    assert_eq!(s.get(), 10);
    assert!(s.verifies_change());
    assert!(!ObjectState::wrap(1).verifies_change());
}

#[test]
fn set_notifies_once_per_change() {
    let mut cr = CallRecorder::new();
    let s = IntState::new(10);
    record(&s, "changed");
    s.set(20);
    cr.verify("changed");
    s.set(30);
    s.set(40);
    cr.verify(["changed", "changed"]);
    assert_eq!(s.get(), 40);
}

#[test]
fn equal_value_is_suppressed() {
    let mut cr = CallRecorder::new();
    let s = StringState::new("a".to_string());
    record(&s, "changed");
    s.set("a".to_string());
    cr.verify(());
    s.set("b".to_string());
    cr.verify("changed");
}

#[test]
fn always_notify_ignores_equality() {
    let s = IntState::always_notify(1);
    let counter = count_notifications(&s);
    s.set(1);
    s.set(1);
    assert_eq!(counter.count(), 2);
}

#[test]
fn object_state_always_notifies() {
    let s = ObjectState::wrap(vec![1, 2, 3]);
    let counter = count_notifications(&s);
    s.set(s.get());
    assert_eq!(counter.count(), 1);
    assert_eq!(
        s.get().downcast_ref::<Vec<i32>>(),
        Some(&vec![1, 2, 3])
    );
}

#[test]
fn precision_is_applied_on_construction() {
    let s = FloatState::with_precision(3.14159, 2);
    assert_eq!(s.get(), 3.14);
}

#[rstest]
#[case(1.234, 0)]
#[case(1.2349, 0)]
#[case(1.2351, 1)]
#[case(1.3, 1)]
fn precision_rounds_before_equality(#[case] value: f64, #[case] expected: usize) {
    let s = FloatState::with_precision(1.23, 2);
    let counter = count_notifications(&s);
    s.set(value);
    assert_eq!(counter.count(), expected);
}

#[test]
fn precision_stores_rounded_value() {
    let s = FloatState::with_precision(0.0, 1);
    s.set(2.76);
    assert_eq!(s.get(), 2.8);
}

#[test]
fn quantizer_applies_to_any_kind() {
    let s = IntState::with_quantizer(7, |v| v.clamp(0, 10));
    assert_eq!(s.get(), 7);
    s.set(42);
    assert_eq!(s.get(), 10);
    let counter = count_notifications(&s);
    s.set(11);
    assert_eq!(counter.count(), 0);
}

#[test]
fn derive_with_tracks_source() {
    let s = IntState::new(3);
    let squared = s.derive_with(|s| IntState::new(s.get() * s.get()));
    assert_eq!(squared.get(), 9);

    let counter = count_notifications(&squared);
    s.set(4);
    assert_eq!(squared.get(), 16);
    assert_eq!(counter.count(), 1);

    s.set(-4);
    assert_eq!(squared.get(), 16);
    assert_eq!(counter.count(), 1);
}

#[test]
fn derive_with_other_kind() {
    let s = IntState::new(3);
    let label = s.derive_with(|s| StringState::new(format!("#{}", s.get())));
    s.set(5);
    assert_eq!(label.get(), "#5");
}

#[test]
fn depends_on_recomputes() {
    let a = IntState::new(1);
    let b = IntState::new(2);
    let total = IntState::new(0);
    let (a0, b0) = (a.clone(), b.clone());
    total.depends_on([a.to_state(), b.to_state()], false, move || a0.get() + b0.get());
    assert_eq!(total.get(), 3);
    a.set(10);
    assert_eq!(total.get(), 12);
    b.set(20);
    assert_eq!(total.get(), 30);
}

#[test]
fn depends_on_sequence_element_wise() {
    let item = IntState::new(1);
    let items = SequenceState::from_states([item.clone()]).unwrap();
    let total = IntState::new(0);
    let items0 = items.clone();
    let sum = move || {
        items0
            .iter()
            .filter_map(|s| s.downcast::<IntState>())
            .map(|s| s.get())
            .sum::<i64>()
    };

    let shallow = IntState::new(0);
    let items1 = items.clone();
    shallow.depends_on([items.to_state()], false, move || items1.len() as i64);
    total.depends_on([items.to_state()], true, sum);
    assert_eq!(total.get(), 1);

    item.set(5);
    assert_eq!(total.get(), 5);

    items.push(IntState::new(2)).unwrap();
    assert_eq!(total.get(), 7);
    assert_eq!(shallow.get(), 2);
}

#[test]
fn serialize_primitives() {
    assert_eq!(IntState::new(5).serialize().unwrap(), json!(5));
    assert_eq!(FloatState::new(2.5).serialize().unwrap(), json!(2.5));
    assert_eq!(StringState::new("x".into()).serialize().unwrap(), json!("x"));
    assert_eq!(BoolState::new(true).serialize().unwrap(), json!(true));
}

#[rstest]
#[case(f64::INFINITY, "inf")]
#[case(f64::NEG_INFINITY, "-inf")]
#[case(f64::NAN, "NaN")]
fn non_finite_float_is_not_serialized(#[case] value: f64, #[case] text: &str) {
    assert_eq!(
        FloatState::new(value).serialize(),
        Err(StateError::NonFiniteFloat(text.into()))
    );
}

#[test]
fn object_is_unserializable() {
    let s = ObjectState::wrap(123);
    assert_eq!(
        s.serialize(),
        Err(StateError::UnserializableKind("ObjectState".into()))
    );
}

#[test]
fn deserialize_sets_value() {
    let mut cr = CallRecorder::new();
    let s = FloatState::new(1.0);
    record(&s, "changed");
    s.deserialize(&json!(2.5)).unwrap();
    cr.verify("changed");
    assert_eq!(s.get(), 2.5);
    s.deserialize(&json!(3)).unwrap();
    assert_eq!(s.get(), 3.0);
}

#[test]
fn deserialize_wrong_shape() {
    let s = IntState::new(1);
    assert_eq!(
        s.deserialize(&json!("one")),
        Err(StateError::SchemaMismatch {
            expected: "integer",
            found: "string".into()
        })
    );
    assert_eq!(s.get(), 1);
}

#[test]
fn copy_from_same_kind() {
    let s = IntState::new(1);
    let counter = count_notifications(&s);
    s.copy_from(&IntState::new(2)).unwrap();
    assert_eq!(s.get(), 2);
    assert_eq!(counter.count(), 1);
}

#[test]
fn copy_from_other_kind() {
    let s = IntState::new(1);
    assert_eq!(
        s.copy_from(&StringState::new("2".into())),
        Err(StateError::TypeMismatch {
            expected: "IntState".into(),
            found: "StringState".into()
        })
    );
}

#[test]
fn standard_leaf_kinds() {
    let kinds = LeafKinds::standard();
    assert!(kinds.wrap(1).is::<IntState>());
    assert!(kinds.wrap(1_i64).is::<IntState>());
    assert!(kinds.wrap(1.5).is::<FloatState>());
    assert!(kinds.wrap("a").is::<StringState>());
    assert!(kinds.wrap(String::from("a")).is::<StringState>());
    assert!(kinds.wrap(true).is::<BoolState>());
    assert!(kinds.wrap(vec![1]).is::<ObjectState>());
}

#[rstest]
#[case(LeafKinds::standard().wrap(5_i8))]
#[case(LeafKinds::standard().wrap(5_i16))]
#[case(LeafKinds::standard().wrap(5_u8))]
#[case(LeafKinds::standard().wrap(5_u16))]
#[case(LeafKinds::standard().wrap(5_isize))]
#[case(LeafKinds::standard().wrap(5_u64))]
#[case(LeafKinds::standard().wrap(5_usize))]
fn every_integer_type_is_int_state(#[case] state: AnyState) {
    assert_eq!(state.downcast::<IntState>().map(|s| s.get()), Some(5));
}

#[test]
fn integer_out_of_range_is_object() {
    let kinds = LeafKinds::standard();
    let state = kinds.wrap(u64::MAX).downcast::<ObjectState>().unwrap();
    assert_eq!(state.get().downcast_ref::<u64>(), Some(&u64::MAX));
    assert!(kinds.wrap(i64::MAX as u64).is::<IntState>());
}

#[test]
fn empty_and_default_leaf_kinds() {
    assert!(!LeafKinds::empty().contains::<i64>());
    assert!(LeafKinds::default().contains::<i64>());
    assert!(LeafKinds::default().contains::<usize>());
}

#[test]
fn custom_leaf_kind() {
    #[derive(Clone)]
    struct Celsius(f64);

    let mut kinds = LeafKinds::empty();
    assert!(kinds.wrap(Celsius(1.0)).is::<ObjectState>());
    kinds.register(|c: Celsius| FloatState::with_precision(c.0, 1).into());
    assert!(kinds.contains::<Celsius>());
    let s = kinds.wrap(Celsius(21.47)).downcast::<FloatState>().unwrap();
    assert_eq!(s.get(), 21.5);
    assert!(kinds.wrap(1).is::<ObjectState>());
}

#[test]
fn object_keeps_type_name() {
    let s = LeafKinds::standard().wrap(vec![1_u8]);
    let s = s.downcast::<ObjectState>().unwrap();
    assert_eq!(s.get().type_name(), "alloc::vec::Vec<u8>");
}

#[test]
fn callback_not_called_with_stale_value() {
    let mut cr = CallRecorder::new();
    let s = IntState::new(0);
    let s0 = s.clone();
    s.on_change(move |_| call!("{}", s0.get()));
    s.set(1);
    s.set(2);
    cr.verify(["1", "2"]);
}
