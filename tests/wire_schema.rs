use jsonschema::validator_for;
use serde_json::Value;

use cacheprog::protocol::{encode_response, Command, Response};
use cacheprog::schema::{validate_json, validate_response, SchemaValidationError, REQUEST_SCHEMA, RESPONSE_SCHEMA};

fn line(res: &Response) -> String {
    String::from_utf8(encode_response(res).unwrap()).unwrap()
}

#[test]
fn schemas_compile() {
    for schema in [RESPONSE_SCHEMA, REQUEST_SCHEMA] {
        let json: Value = serde_json::from_str(schema).unwrap();
        validator_for(&json).unwrap();
    }
}

#[test]
fn every_response_shape_satisfies_schema() {
    let shapes = [
        Response::announce(vec![Command::Get, Command::Put, Command::Close]),
        Response::ok(4),
        Response::miss(1),
        Response::error(2, "error: frobnicate is unknown command"),
        Response {
            id: 3,
            output_id: b"cd".to_vec(),
            size: 5,
            time: chrono::DateTime::from_timestamp(1_700_000_000, 0),
            disk_path: Some("/tmp/cache/63/6364-d".into()),
            ..Response::default()
        },
        Response {
            id: 5,
            disk_path: Some("/tmp/cache/63/6364-d".into()),
            ..Response::default()
        },
    ];

    for res in &shapes {
        let encoded = line(res);
        validate_response(encoded.trim_end()).unwrap_or_else(|e| panic!("{encoded} rejected: {e}"));
    }
}

#[test]
fn response_with_unknown_field_is_rejected() {
    let err = validate_response("{\"id\":1,\"extra\":true}").unwrap_err();
    assert!(matches!(err, SchemaValidationError::ValidationFailed(_)), "got {err:?}");
}

#[test]
fn response_without_id_is_rejected() {
    let err = validate_response("{\"miss\":true}").unwrap_err();
    assert!(matches!(err, SchemaValidationError::ValidationFailed(_)), "got {err:?}");
}

#[test]
fn announcement_with_unknown_kind_is_rejected() {
    assert!(validate_response("{\"id\":0,\"known_commands\":[\"get\",\"frobnicate\"]}").is_err());
}

#[test]
fn requests_validate_against_request_schema() {
    validate_json(
        REQUEST_SCHEMA,
        "{\"id\":1,\"command\":\"put\",\"action_id\":\"YWI=\",\"output_id\":\"Y2Q=\",\"body_size\":5}",
    )
    .unwrap();
    validate_json(REQUEST_SCHEMA, "{\"id\":2,\"command\":\"frobnicate\"}").unwrap();

    let err = validate_json(REQUEST_SCHEMA, "{\"id\":3}").unwrap_err();
    assert!(matches!(err, SchemaValidationError::ValidationFailed(_)));
}

#[test]
fn unparseable_instance_is_a_parse_error() {
    let err = validate_response("{not json").unwrap_err();
    assert!(matches!(err, SchemaValidationError::SchemaParse(_)), "got {err:?}");
}

// Snapshot of the hit response line; field order and encodings are part of
// the wire contract.
#[test]
fn hit_response_snapshot() {
    let res = Response {
        id: 3,
        output_id: b"cd".to_vec(),
        size: 5,
        time: chrono::DateTime::from_timestamp(1_700_000_000, 0),
        disk_path: Some("/tmp/cache/63/6364-d".into()),
        ..Response::default()
    };

    let expected = "{\"id\":3,\"output_id\":\"Y2Q=\",\"size\":5,\"time\":\"2023-11-14T22:13:20Z\",\"disk_path\":\"/tmp/cache/63/6364-d\"}\n";
    assert_eq!(line(&res), expected, "hit response snapshot mismatch");
}
