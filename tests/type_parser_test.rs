//! `Type::parse`/`Type::name` round trips across the full type matrix,
//! including the wide integers, semi-structured types, and nested
//! container combinations.

use clickhouse_native_client::types::{
    Type,
    TypeCode,
};

fn round_trips(type_str: &str) -> Type {
    let parsed = Type::parse(type_str).unwrap_or_else(|e| panic!("failed to parse {type_str}: {e}"));
    assert_eq!(parsed.name(), type_str, "name() did not round trip for {type_str}");
    parsed
}

#[test]
fn parses_wide_integers() {
    assert_eq!(round_trips("Int256").code(), TypeCode::Int256);
    assert_eq!(round_trips("UInt256").code(), TypeCode::UInt256);
    assert_eq!(round_trips("Int128").code(), TypeCode::Int128);
    assert_eq!(round_trips("UInt128").code(), TypeCode::UInt128);
}

#[test]
fn parses_decimal256_via_precision() {
    let t = round_trips("Decimal(76, 10)");
    match t {
        Type::Decimal { precision, scale } => {
            assert_eq!(precision, 76);
            assert_eq!(scale, 10);
        }
        other => panic!("expected Decimal, got {:?}", other),
    }
}

#[test]
fn parses_bool() {
    assert_eq!(round_trips("Bool").code(), TypeCode::Bool);
}

#[test]
fn parses_variant_with_multiple_alternatives() {
    let t = round_trips("Variant(Int32, String, UUID)");
    match t {
        Type::Variant { variants } => assert_eq!(variants.len(), 3),
        other => panic!("expected Variant, got {:?}", other),
    }
}

#[test]
fn parses_plain_dynamic() {
    let t = round_trips("Dynamic");
    assert!(matches!(t, Type::Dynamic { max_types: None }));
}

#[test]
fn parses_dynamic_with_max_types() {
    let t = round_trips("Dynamic(max_types=42)");
    match t {
        Type::Dynamic { max_types } => assert_eq!(max_types, Some(42)),
        other => panic!("expected Dynamic, got {:?}", other),
    }
}

#[test]
fn parses_json_with_typed_paths() {
    let t = Type::parse("JSON(a Int32, b String)").unwrap();
    match t {
        Type::Json { typed_paths, max_dynamic_types } => {
            assert_eq!(typed_paths.len(), 2);
            assert_eq!(typed_paths[0].0, "a");
            assert!(max_dynamic_types.is_none());
        }
        other => panic!("expected Json, got {:?}", other),
    }
}

#[test]
fn parses_named_tuples() {
    let t = round_trips("Tuple(x Int32, y String)");
    match t {
        Type::Tuple { item_types, item_names } => {
            assert_eq!(item_types.len(), 2);
            assert_eq!(item_names, vec![Some("x".to_string()), Some("y".to_string())]);
        }
        other => panic!("expected Tuple, got {:?}", other),
    }
}

#[test]
fn parses_unnamed_tuples() {
    let t = round_trips("Tuple(UInt8, String, Date)");
    match t {
        Type::Tuple { item_types, item_names } => {
            assert_eq!(item_types.len(), 3);
            assert!(item_names.iter().all(Option::is_none));
        }
        other => panic!("expected Tuple, got {:?}", other),
    }
}

#[test]
fn parses_low_cardinality_nullable_string() {
    let t = round_trips("LowCardinality(Nullable(String))");
    match t {
        Type::LowCardinality { nested_type } => {
            assert!(matches!(*nested_type, Type::Nullable { .. }));
        }
        other => panic!("expected LowCardinality, got {:?}", other),
    }
}

#[test]
fn parses_map_of_string_to_array_of_int64() {
    let t = round_trips("Map(String, Array(Int64))");
    match t {
        Type::Map { key_type, value_type } => {
            assert_eq!(key_type.code(), TypeCode::String);
            assert!(matches!(*value_type, Type::Array { .. }));
        }
        other => panic!("expected Map, got {:?}", other),
    }
}

#[test]
fn parses_deeply_nested_array_of_nullable_low_cardinality() {
    let t = round_trips("Array(LowCardinality(Nullable(String)))");
    match t {
        Type::Array { item_type } => {
            assert!(matches!(*item_type, Type::LowCardinality { .. }));
        }
        other => panic!("expected Array, got {:?}", other),
    }
}

#[test]
fn rejects_unknown_type_names() {
    assert!(Type::parse("NotAClickHouseType").is_err());
}

#[test]
fn rejects_malformed_parentheses() {
    assert!(Type::parse("Array(Int32").is_err());
}
