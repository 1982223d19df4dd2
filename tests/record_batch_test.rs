//! Builder coercion laws and row-proxy stability for `RecordBatch`.

use clickhouse_native_client::types::Type;
use clickhouse_native_client::value::Value;
use clickhouse_native_client::{
    Error,
    RecordBatch,
};

fn schema() -> Vec<(String, Type)> {
    vec![
        ("id".to_string(), Type::uint32()),
        ("name".to_string(), Type::string()),
        ("active".to_string(), Type::bool()),
    ]
}

#[test]
fn from_rows_builds_a_batch_addressable_by_index_and_name() {
    let rows = vec![
        vec![Value::Int32(1), Value::String("alice".to_string()), Value::Bool(true)],
        vec![Value::Int32(2), Value::String("bob".to_string()), Value::Bool(false)],
    ];
    let batch = RecordBatch::from_rows(schema(), rows).unwrap();

    assert_eq!(batch.row_count(), 2);
    assert_eq!(batch.column_count(), 3);
    assert_eq!(batch.column_names(), vec!["id", "name", "active"]);

    let row1 = batch.row(1);
    assert_eq!(row1.get(0).unwrap(), Value::UInt32(2));
    assert_eq!(row1.get_by_name("name").unwrap().unwrap(), Value::String("bob".to_string()));
    assert!(row1.get_by_name("missing").is_none());
}

#[test]
fn from_arrays_produces_the_same_batch_as_from_rows() {
    let rows = vec![
        vec![Value::Int32(1), Value::String("a".to_string()), Value::Bool(true)],
        vec![Value::Int32(2), Value::String("b".to_string()), Value::Bool(false)],
    ];
    let from_rows = RecordBatch::from_rows(schema(), rows).unwrap();

    let arrays = vec![
        ("id".to_string(), vec![Value::Int32(1), Value::Int32(2)]),
        (
            "name".to_string(),
            vec![Value::String("a".to_string()), Value::String("b".to_string())],
        ),
        ("active".to_string(), vec![Value::Bool(true), Value::Bool(false)]),
    ];
    let from_arrays = RecordBatch::from_arrays(schema(), arrays).unwrap();

    assert_eq!(from_rows.row_count(), from_arrays.row_count());
    for i in 0..from_rows.row_count() {
        assert_eq!(from_rows.row(i).values().unwrap(), from_arrays.row(i).values().unwrap());
    }
}

#[test]
fn row_proxies_stay_independently_addressable_across_the_whole_batch() {
    let rows: Vec<Vec<Value>> = (0..50)
        .map(|i| vec![Value::Int32(i), Value::String(format!("row-{i}")), Value::Bool(i % 2 == 0)])
        .collect();
    let batch = RecordBatch::from_rows(schema(), rows).unwrap();

    let collected: Vec<i64> = batch
        .rows()
        .map(|row| match row.get(0).unwrap() {
            Value::UInt32(v) => v as i64,
            other => panic!("expected UInt32, got {:?}", other),
        })
        .collect();
    assert_eq!(collected, (0..50).collect::<Vec<_>>());

    // Indexing out of order must not disturb any other row's view.
    assert_eq!(batch.row(49).index(), 49);
    assert_eq!(batch.row(0).index(), 0);
    assert_eq!(batch.row(49).get(1).unwrap(), Value::String("row-49".to_string()));
    assert_eq!(batch.row(0).get(1).unwrap(), Value::String("row-0".to_string()));
}

#[test]
fn coercion_failure_names_the_offending_column_and_row() {
    let schema = vec![("small".to_string(), Type::uint8())];
    let rows = vec![
        vec![Value::Int32(1)],
        vec![Value::Int32(2)],
        vec![Value::Int32(999)],
    ];
    let err = RecordBatch::from_rows(schema, rows).unwrap_err();
    match err {
        Error::Coercion { column, row, .. } => {
            assert_eq!(column.as_deref(), Some("small"));
            assert_eq!(row, 2);
        }
        other => panic!("expected Error::Coercion, got {:?}", other),
    }
}

#[test]
fn mismatched_row_width_is_rejected_before_any_column_is_built() {
    let err = RecordBatch::from_rows(
        schema(),
        vec![vec![Value::Int32(1), Value::String("x".to_string())]],
    )
    .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn empty_batch_has_zero_rows_and_no_panics_on_iteration() {
    let batch = RecordBatch::from_rows(schema(), vec![]).unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.rows().count(), 0);
}

#[test]
#[should_panic]
fn row_out_of_bounds_panics_rather_than_silently_wrapping() {
    let batch = RecordBatch::from_rows(schema(), vec![]).unwrap();
    let _ = batch.row(0);
}
