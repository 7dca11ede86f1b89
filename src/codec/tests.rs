use serde_json::json;

use super::*;
use crate::{test_helpers::count_notifications, FloatState, IntState, ObjectState, StateError};

fn settings() -> CompositeState {
    let window = CompositeState::builder("Window")
        .value("width", 640)
        .value("height", 480)
        .build()
        .unwrap();
    CompositeState::builder("Settings")
        .value("title", "main")
        .value("scale", 1.5)
        .value("visible", true)
        .member("window", window)
        .member("handle", ObjectState::wrap(()))
        .build()
        .unwrap()
}

#[test]
fn to_json_string() {
    assert_eq!(
        serde_json::to_string(&settings()).unwrap(),
        r#"{"title":"main","scale":1.5,"visible":true,"window":{"width":640,"height":480}}"#
    );
    assert_eq!(serde_json::to_string(&IntState::new(3)).unwrap(), "3");
}

#[test]
fn serialize_json_matches_serde() {
    let s = settings();
    assert_eq!(
        serialize_json(&s).unwrap(),
        serde_json::to_string(&s).unwrap()
    );
}

#[test]
fn unserializable_leaf_is_an_error() {
    let s = ObjectState::wrap(1);
    assert!(serde_json::to_string(&s).is_err());
    assert!(matches!(
        serialize_json(&s),
        Err(CodecError::State(StateError::UnserializableKind(_)))
    ));
}

#[test]
fn round_trip_into_other_instance() {
    let source = settings();
    source
        .get::<CompositeState>("window")
        .unwrap()
        .get::<IntState>("width")
        .unwrap()
        .set(1024);
    source.get::<FloatState>("scale").unwrap().set(2.0);
    let text = serialize_json(&source).unwrap();

    let target = settings();
    let counter = count_notifications(&target);
    deserialize_json(&target, &text).unwrap();
    assert_eq!(
        Observable::serialize(&target).unwrap(),
        Observable::serialize(&source).unwrap()
    );
    assert_eq!(counter.count(), 1);
}

#[test]
fn partial_input() {
    let s = settings();
    deserialize_json(&s, r#"{"window": {"height": 600}}"#).unwrap();
    assert_eq!(
        Observable::serialize(&s).unwrap()["window"],
        json!({"width": 640, "height": 600})
    );
}

#[test]
fn invalid_json() {
    let s = settings();
    let e = deserialize_json(&s, "{").unwrap_err();
    assert!(matches!(e, CodecError::Json(_)));
    assert!(std::error::Error::source(&e).is_some());
}

#[test]
fn schema_errors() {
    let s = settings();
    assert!(matches!(
        deserialize_json(&s, r#"{"missing": 1}"#),
        Err(CodecError::State(StateError::UnknownMember(_)))
    ));
    assert!(matches!(
        deserialize_json(&s, r#"{"title": 1}"#),
        Err(CodecError::State(StateError::SchemaMismatch { .. }))
    ));
    let e = deserialize_json(&s, "[]").unwrap_err();
    assert_eq!(
        e.to_string(),
        StateError::SchemaMismatch {
            expected: "mapping",
            found: "list".into()
        }
        .to_string()
    );
}

#[test]
fn value_passthrough() {
    let v: Value = serde_json::to_value(settings()).unwrap();
    assert_eq!(v["visible"], json!(true));
}
