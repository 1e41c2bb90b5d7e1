use crate::Error;
use crate::config::ClientConfig;
use crate::schema::{
    Category, ColumnTypes, Encoding, Precision, TextEncoding, TypeCode, describe,
};
use crate::transport::pool::BufferPool;

#[test]
fn catalog_covers_every_known_code() {
    let expected: &[(u8, Category, Encoding)] = &[
        (1, Category::Fixed(1), Encoding::Bool),
        (2, Category::Fixed(1), Encoding::Int { signed: true }),
        (3, Category::Fixed(2), Encoding::Int { signed: true }),
        (4, Category::Fixed(4), Encoding::Int { signed: true }),
        (5, Category::Fixed(8), Encoding::Int { signed: true }),
        (6, Category::Fixed(4), Encoding::Float),
        (7, Category::Fixed(8), Encoding::Float),
        (8, Category::Variable, Encoding::Bytes),
        (9, Category::Fixed(8), Encoding::Timestamp),
        (10, Category::Variable, Encoding::Text),
        (11, Category::Fixed(1), Encoding::Int { signed: false }),
        (12, Category::Fixed(2), Encoding::Int { signed: false }),
        (13, Category::Fixed(4), Encoding::Int { signed: false }),
        (14, Category::Fixed(8), Encoding::Int { signed: false }),
        (15, Category::Variable, Encoding::Bytes),
        (16, Category::Variable, Encoding::Bytes),
        (17, Category::Fixed(16), Encoding::Decimal),
        (20, Category::Variable, Encoding::Bytes),
        (21, Category::Fixed(8), Encoding::Decimal),
    ];
    for &(code, category, encoding) in expected {
        let info = describe(code).unwrap();
        assert_eq!(info.code.as_u8(), code);
        assert_eq!(info.category, category, "code {code}");
        assert_eq!(info.encoding, encoding, "code {code}");
    }
    assert_eq!(describe(10).unwrap().text_encoding, TextEncoding::Utf32Le);
    assert_eq!(describe(8).unwrap().text_encoding, TextEncoding::None);
}

#[test]
fn unknown_codes_are_unsupported() {
    for code in [0u8, 18, 19, 22, 255] {
        assert_eq!(describe(code).unwrap_err(), Error::UnsupportedType(code));
    }
}

#[test]
fn type_names() {
    assert_eq!(TypeCode::Binary.name(), "VARCHAR");
    assert_eq!(TypeCode::UBigInt.name(), "BIGINT UNSIGNED");
    assert_eq!(TypeCode::Decimal64.name(), "DECIMAL64");
}

#[test]
fn descriptor_meta_is_fixed_width() {
    assert_eq!(TypeCode::Timestamp.info().meta(), 8);
    assert_eq!(TypeCode::Decimal.info().meta(), 16);
    assert_eq!(TypeCode::NChar.info().meta(), 0);
}

#[test]
fn precision_codes() {
    assert_eq!(Precision::from_code(0).unwrap(), Precision::Millisecond);
    assert_eq!(Precision::from_code(2).unwrap(), Precision::Nanosecond);
    assert_eq!(Precision::Microsecond.code(), 1);
    assert_eq!(
        Precision::from_code(3).unwrap_err(),
        Error::Other("unknown time precision: 3".to_string())
    );
}

#[test]
fn column_types_builder_sets_length_entries() {
    let types = ColumnTypes::new()
        .add_int()
        .add_binary(10)
        .add_nchar(4)
        .add_timestamp_with_precision(Precision::Microsecond);
    assert_eq!(types.len(), 4);
    let lengths: Vec<i32> = types
        .fields()
        .iter()
        .map(|f| f.length_entry().unwrap())
        .collect();
    assert_eq!(lengths, vec![4, 12, 18, 8]);
    assert_eq!(types.fields()[3].precision, Precision::Microsecond);
    assert!(ColumnTypes::new().is_empty());
}

#[test]
fn huge_capacities_saturate_and_fail_at_encode() {
    let types = ColumnTypes::new()
        .add_nchar(1 << 30)
        .add_binary(u32::MAX)
        .add_decimal64(18, 4);
    assert_eq!(types.fields()[0].capacity, u32::MAX);
    assert_eq!(types.fields()[1].capacity, u32::MAX);
    assert_eq!(
        types.fields()[0].length_entry().unwrap_err(),
        Error::Other(format!("column capacity too large: {}", u32::MAX))
    );
    assert_eq!(types.fields()[2].length_entry().unwrap(), 8);
    assert_eq!((types.fields()[2].decimal_precision, types.fields()[2].scale), (18, 4));
}

#[test]
fn client_config_defaults_and_overrides() {
    let config = ClientConfig::from_json(r#"{"buffer_pool_size": 2}"#).unwrap();
    assert_eq!(config.buffer_pool_size, 2);
    assert_eq!(config.buffer_capacity, ClientConfig::default().buffer_capacity);

    let mut config = ClientConfig::default();
    config.set_buffer_capacity(64).set_max_retained_capacity(128);
    assert_eq!(config.buffer_capacity, 64);
    assert_eq!(config.max_retained_capacity, 128);

    assert!(matches!(
        ClientConfig::from_json("{").unwrap_err(),
        Error::Serialization(_)
    ));
}

#[test]
fn pooled_buffers_return_on_drop() {
    let mut config = ClientConfig::default();
    config
        .set_buffer_pool_size(1)
        .set_buffer_capacity(32)
        .set_max_retained_capacity(64);
    let pool = BufferPool::new(&config);
    assert_eq!(pool.idle(), 0);

    {
        let mut a = pool.checkout();
        let mut b = pool.checkout();
        a.extend_from_slice(b"abc");
        b.extend_from_slice(b"def");
    }
    // only one slot
    assert_eq!(pool.idle(), 1);

    let reused = pool.checkout();
    assert!(reused.is_empty());
    assert!(reused.capacity() >= 32);
    drop(reused);

    {
        let mut big = pool.checkout();
        big.resize(1024, 0);
    }
    // grew past the retained limit, so the slot it came from is gone
    assert_eq!(pool.idle(), 0);
}
