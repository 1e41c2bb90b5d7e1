use chrono::DateTime;

use crate::Error;
use crate::batch::{ColumnInput, bind};
use crate::block_view::{RawBlockView, RowCursor, decode_raw_block};
use crate::codec::exports::{decode, encode};
use crate::schema::{BindField, ColumnTypes, FieldMeta, Precision, TypeCode};
use crate::value::{Decimal, Value};

fn write_i32_le(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn build_minimal_header(version: i32, total_len: i32, rows: i32, cols: i32) -> Vec<u8> {
    let mut out = Vec::new();
    write_i32_le(&mut out, version);
    write_i32_le(&mut out, total_len);
    write_i32_le(&mut out, rows);
    write_i32_le(&mut out, cols);
    write_i32_le(&mut out, 0); // flag
    out.extend_from_slice(&0u64.to_le_bytes()); // group id
    out
}

fn meta_for(fields: &[BindField]) -> Vec<FieldMeta> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| FieldMeta::new(format!("c{i}"), f.ty))
        .collect()
}

#[test]
fn every_type_survives_encode_then_decode() {
    let fields = ColumnTypes::new()
        .add_timestamp()
        .add_bool()
        .add_tinyint()
        .add_smallint()
        .add_int()
        .add_bigint()
        .add_utinyint()
        .add_usmallint()
        .add_uint()
        .add_ubigint()
        .add_float()
        .add_double()
        .add_binary(16)
        .add_varbinary(16)
        .add_nchar(16)
        .add_json(32)
        .add_geometry(32)
        .into_fields();
    let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
    let rows: Vec<Vec<Value>> = vec![
        vec![
            Value::Timestamp(ts),
            Value::Bool(true),
            Value::TinyInt(-8),
            Value::SmallInt(-300),
            Value::Int(70_000),
            Value::BigInt(-5_000_000_000),
            Value::UTinyInt(200),
            Value::USmallInt(60_000),
            Value::UInt(4_000_000_000),
            Value::UBigInt(u64::MAX),
            Value::Float(1.5),
            Value::Double(-2.25),
            Value::from("varchar"),
            Value::Bytes(vec![0, 159, 146, 150]),
            Value::from("温度"),
            Value::from(r#"{"k":1}"#),
            Value::Bytes(vec![1, 1, 0, 0, 0]),
        ],
        vec![
            Value::Timestamp(DateTime::from_timestamp_millis(0).unwrap()),
            Value::Bool(false),
            Value::TinyInt(i8::MIN),
            Value::SmallInt(i16::MIN),
            Value::Int(i32::MIN),
            Value::BigInt(i64::MIN),
            Value::UTinyInt(0),
            Value::USmallInt(0),
            Value::UInt(0),
            Value::UBigInt(0),
            Value::Float(0.0),
            Value::Double(f64::MIN),
            Value::Bytes(b"bin".to_vec()),
            Value::from("vb"),
            Value::from("x"),
            Value::from("{}"),
            Value::Bytes(vec![2]),
        ],
    ];

    let inputs = fields
        .iter()
        .enumerate()
        .map(|(c, f)| ColumnInput::new(*f, rows.iter().map(|r| r[c].clone()).collect()))
        .collect();
    let batch = bind(inputs).unwrap();
    let block = encode(&batch).unwrap();
    let decoded = decode_raw_block(&block, &meta_for(&fields), Precision::Millisecond).unwrap();

    let bound: Vec<Vec<Value>> = (0..batch.row_count())
        .map(|r| batch.columns().iter().map(|c| c.values()[r].clone()).collect())
        .collect();
    assert_eq!(decoded, bound);

    // binary from utf-8 bytes reads back as text, varbinary and json from text as bytes
    assert_eq!(decoded[1][12], Value::from("bin"));
    assert_eq!(decoded[1][13], Value::Bytes(b"vb".to_vec()));
    assert_eq!(decoded[0][15], Value::Bytes(br#"{"k":1}"#.to_vec()));
}

#[test]
fn empty_variable_entries_survive() {
    let fields = ColumnTypes::new().add_binary(4).add_varbinary(4).into_fields();
    let batch = bind(vec![
        ColumnInput::new(fields[0], vec![Value::from("")]),
        ColumnInput::new(fields[1], vec![Value::Bytes(Vec::new())]),
    ])
    .unwrap();
    let block = encode(&batch).unwrap();
    let rows = decode_raw_block(&block, &meta_for(&fields), Precision::Millisecond).unwrap();
    assert_eq!(rows, vec![vec![Value::from(""), Value::Bytes(Vec::new())]]);
}

#[test]
fn nulls_decode_in_every_column_kind() {
    let fields = ColumnTypes::new()
        .add_int()
        .add_binary(8)
        .add_nchar(4)
        .add_timestamp()
        .into_fields();
    let inputs = vec![
        ColumnInput::new(fields[0], vec![Value::Null, Value::Int(2), Value::Null]),
        ColumnInput::new(fields[1], vec![Value::from("a"), Value::Null, Value::from("c")]),
        ColumnInput::new(fields[2], vec![Value::Null, Value::Null, Value::from("z")]),
        ColumnInput::new(fields[3], vec![Value::Null; 3]),
    ];
    let block = encode(&bind(inputs).unwrap()).unwrap();

    let view = RawBlockView::parse(&block).unwrap();
    assert!(view.is_null(0, 0).unwrap());
    assert!(!view.is_null(0, 1).unwrap());
    assert_eq!(view.var_offset(1, 1).unwrap(), -1);
    assert_eq!(view.var_offset(1, 2).unwrap(), 3);
    assert!(view.var_offset(0, 0).is_err());

    let rows = decode_raw_block(&block, &meta_for(&fields), Precision::Millisecond).unwrap();
    assert_eq!(
        rows,
        vec![
            vec![Value::Null, Value::from("a"), Value::Null, Value::Null],
            vec![Value::Int(2), Value::Null, Value::Null, Value::Null],
            vec![Value::Null, Value::from("c"), Value::from("z"), Value::Null],
        ]
    );
}

#[test]
fn binary_that_is_not_utf8_stays_bytes() {
    let field = BindField::new(TypeCode::Binary).with_capacity(4);
    let batch = bind(vec![ColumnInput::new(field, vec![Value::Bytes(vec![0xff, 0x00])])]).unwrap();
    let block = encode(&batch).unwrap();
    let rows = decode_raw_block(&block, &meta_for(&[field]), Precision::Millisecond).unwrap();
    assert_eq!(rows[0][0], Value::Bytes(vec![0xff, 0x00]));
}

#[test]
fn timestamps_decode_with_result_precision() {
    let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
    for precision in [Precision::Microsecond, Precision::Nanosecond] {
        let field = BindField::new(TypeCode::Timestamp).with_precision(precision);
        let batch = bind(vec![ColumnInput::new(field, vec![Value::Timestamp(ts)])]).unwrap();
        let block = encode(&batch).unwrap();
        let rows = decode_raw_block(&block, &meta_for(&[field]), precision).unwrap();
        let Value::Timestamp(got) = rows[0][0] else {
            panic!("expected timestamp, got {:?}", rows[0][0]);
        };
        match precision {
            Precision::Microsecond => assert_eq!(got.timestamp_micros(), ts.timestamp_micros()),
            _ => assert_eq!(got, ts),
        }
    }
}

#[test]
fn decimals_take_scale_from_metadata() {
    let fields = ColumnTypes::new().add_decimal64(10, 3).add_decimal(10, 3).into_fields();
    let d = |unscaled| Value::Decimal(Decimal {
        unscaled,
        precision: 10,
        scale: 3,
    });
    let batch = bind(vec![
        ColumnInput::new(fields[0], vec![d(12_345)]),
        ColumnInput::new(fields[1], vec![d(-5)]),
    ])
    .unwrap();
    let block = encode(&batch).unwrap();
    let metas = vec![
        FieldMeta::new("a", TypeCode::Decimal64).with_decimal(10, 3),
        FieldMeta::new("b", TypeCode::Decimal).with_decimal(10, 3),
    ];
    let rows = decode_raw_block(&block, &metas, Precision::Millisecond).unwrap();
    assert_eq!(rows[0], vec![d(12_345), d(-5)]);

    let Value::Decimal(a) = rows[0][0] else {
        panic!("expected decimal");
    };
    let Value::Decimal(b) = rows[0][1] else {
        panic!("expected decimal");
    };
    assert_eq!(a.to_string(), "12.345");
    assert_eq!(b.to_string(), "-0.005");
}

#[test]
fn cursor_skips_prefix_and_reuses_row_buffer() {
    let field = BindField::new(TypeCode::Int);
    let batch = bind(vec![ColumnInput::new(
        field,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)],
    )])
    .unwrap();
    let mut bytes = vec![0xAA; 16];
    bytes.extend_from_slice(&encode(&batch).unwrap());

    let mut cursor = RowCursor::open(bytes, 16, &meta_for(&[field]), Precision::Millisecond).unwrap();
    assert_eq!(cursor.row_count(), 3);

    let mut row = Vec::new();
    let mut seen = Vec::new();
    while cursor.next_row_into(&mut row).unwrap() {
        assert_eq!(row.len(), 1);
        seen.push(row[0].clone());
    }
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.next_row().unwrap(), None);
}

#[test]
fn zero_row_block_yields_nothing() {
    let bytes = build_minimal_header(1, 28, 0, 0);
    let mut cursor = decode(bytes, &[], Precision::Millisecond).unwrap();
    assert_eq!(cursor.next_row().unwrap(), None);
}

#[test]
fn truncated_header_is_rejected() {
    let bytes = build_minimal_header(1, 28, 0, 0);
    let err = RawBlockView::parse(&bytes[..20]).unwrap_err();
    assert_eq!(err, Error::Other("truncated raw block".to_string()));
}

#[test]
fn unknown_version_is_rejected() {
    let bytes = build_minimal_header(2, 28, 0, 0);
    let err = RawBlockView::parse(&bytes).unwrap_err();
    assert_eq!(
        err,
        Error::Other("unsupported raw block version: 2".to_string())
    );
}

#[test]
fn total_length_past_buffer_is_rejected() {
    let bytes = build_minimal_header(1, 64, 0, 0);
    let err = RawBlockView::parse(&bytes).unwrap_err();
    assert_eq!(err, Error::Other("truncated raw block".to_string()));
}

#[test]
fn negative_row_count_is_rejected() {
    let bytes = build_minimal_header(1, 28, -1, 0);
    let err = RawBlockView::parse(&bytes).unwrap_err();
    assert_eq!(err, Error::Other("invalid row count: -1".to_string()));
}

#[test]
fn unknown_type_code_is_rejected() {
    let mut bytes = build_minimal_header(1, 28 + 5 + 4, 0, 1);
    bytes.push(99);
    write_i32_le(&mut bytes, 0);
    write_i32_le(&mut bytes, 0);
    let err = RawBlockView::parse(&bytes).unwrap_err();
    assert_eq!(err, Error::UnsupportedType(99));
}

#[test]
fn truncated_column_payload_is_rejected() {
    let field = BindField::new(TypeCode::BigInt);
    let batch = bind(vec![ColumnInput::new(field, vec![Value::BigInt(1), Value::BigInt(2)])]).unwrap();
    let mut block = encode(&batch).unwrap();
    block.truncate(block.len() - 3);
    let len = block.len() as i32;
    block[4..8].copy_from_slice(&len.to_le_bytes());
    let err = RawBlockView::parse(&block).unwrap_err();
    assert_eq!(err, Error::Other("truncated raw block".to_string()));
}

#[test]
fn var_offset_past_payload_is_rejected() {
    let field = BindField::new(TypeCode::Binary).with_capacity(8);
    let batch = bind(vec![ColumnInput::new(field, vec![Value::from("abc")])]).unwrap();
    let mut block = encode(&batch).unwrap();
    let table = 28 + 5 + 4 + 1;
    block[table..table + 4].copy_from_slice(&100i32.to_le_bytes());
    assert!(RawBlockView::parse(&block).is_err());
}

#[test]
fn metadata_must_match_block_columns() {
    let field = BindField::new(TypeCode::Int);
    let batch = bind(vec![ColumnInput::new(field, vec![Value::Int(1)])]).unwrap();
    let block = encode(&batch).unwrap();

    let err = decode(block.clone(), &[], Precision::Millisecond).unwrap_err();
    assert_eq!(
        err,
        Error::Other("field count mismatch: block has 1, metadata has 0".to_string())
    );

    let err = decode(
        block,
        &[FieldMeta::new("v", TypeCode::BigInt)],
        Precision::Millisecond,
    )
    .unwrap_err();
    assert_eq!(
        err,
        Error::Other("column 0 type mismatch: block has INT, metadata has BIGINT".to_string())
    );
}

#[test]
fn columns_past_declared_length_are_rejected() {
    let field = BindField::new(TypeCode::Int);
    let batch = bind(vec![ColumnInput::new(field, vec![Value::Int(1), Value::Int(2)])]).unwrap();
    let mut block = encode(&batch).unwrap();
    assert_eq!(block.len(), 46);
    block[4..8].copy_from_slice(&42i32.to_le_bytes());
    let err = RawBlockView::parse(&block).unwrap_err();
    assert_eq!(
        err,
        Error::Other("raw block overruns declared length: 46 > 42".to_string())
    );
}
