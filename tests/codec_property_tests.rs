//! Property-based tests for the codec.
//!
//! These use proptest to verify universal properties across many generated
//! inputs: round-tripping, intern neutrality, varint consistency, and the
//! depth and interning bounds.

use proptest::prelude::*;

use au::intern::{INTERN_THRESH, TINY_STRING_SIZE};
use au::{ByteSource, Decoder, Encoder, NoopValueHandler, ParseError, Value, ValueParser};

// ============================================================================
// Generators
// ============================================================================

/// Generate arbitrary leaf values, including NaN and the integer extremes.
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::Uint),
        prop_oneof![
            any::<f64>(),
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(-0.0f64),
        ]
        .prop_map(Value::Double),
        any::<u64>().prop_map(Value::Time),
        "[ -~]{0,40}".prop_map(Value::string),
    ]
}

/// Generate arbitrary value trees a few levels deep.
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{0,12}", inner), 0..6).prop_map(|entries| {
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.into_bytes(), v))
                        .collect(),
                )
            }),
        ]
    })
}

/// What the decoder hands back for an encoded `value`: non-negative signed
/// integers take the unsigned wire forms, so they decode as unsigned.
fn normalize(value: Value) -> Value {
    match value {
        Value::Int(i) if i >= 0 => Value::Uint(i as u64),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .collect(),
        ),
        other => other,
    }
}

fn encode_values(values: &[Value]) -> Vec<u8> {
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    for value in values {
        encoder.encode(|w| value.write_to(w), &mut out).unwrap();
    }
    out
}

fn decode_values(bytes: Vec<u8>) -> Vec<Value> {
    let mut decoder = Decoder::new(ByteSource::from_bytes(bytes));
    let mut values = Vec::new();
    while let Some((_, value)) = decoder.next_value().unwrap() {
        values.push(value);
    }
    values
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every representable value survives an encode/decode round trip,
    /// preserving string bytes, object key order, and NaN bit patterns.
    #[test]
    fn prop_round_trip(values in prop::collection::vec(arb_value(), 1..5)) {
        let bytes = encode_values(&values);
        let decoded = decode_values(bytes);
        let expected: Vec<Value> = values.into_iter().map(normalize).collect();
        prop_assert_eq!(decoded, expected);
    }

    /// The decoded result is independent of whether strings travel inline
    /// or as dictionary references.
    #[test]
    fn prop_intern_neutrality(strings in prop::collection::vec("[ -~]{5,30}", 1..20)) {
        let encode_with = |hint: Option<bool>| {
            let mut encoder = Encoder::new();
            let mut out = Vec::new();
            for s in &strings {
                encoder
                    .encode(|w| Ok(w.string_opts(s, hint)), &mut out)
                    .unwrap();
            }
            out
        };
        let interned = decode_values(encode_with(Some(true)));
        let inlined = decode_values(encode_with(Some(false)));
        prop_assert_eq!(interned, inlined);
    }

    /// Varints round-trip for the whole u64 range.
    #[test]
    fn prop_varint_round_trip(value in any::<u64>()) {
        let mut encoded = Vec::new();
        au::varint::encode_varint(value, &mut encoded);
        prop_assert!(encoded.len() <= 10);
        let mut cursor = encoded.as_slice();
        let mut offset = 0u64;
        let decoded = au::varint::decode_varint(&mut cursor, &mut offset).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert!(cursor.is_empty());
    }

    /// Streams made only of tiny strings never grow a dictionary.
    #[test]
    fn prop_tiny_strings_never_intern(
        strings in prop::collection::vec("[a-z]{0,4}", 1..50)
    ) {
        let mut encoder = Encoder::new();
        let mut out = Vec::new();
        for s in &strings {
            // Repeat each far past the threshold.
            for _ in 0..INTERN_THRESH + 2 {
                encoder.encode(|w| Ok(w.string(s)), &mut out).unwrap();
            }
        }
        prop_assert_eq!(encoder.dict_len(), 0);
    }
}

// ============================================================================
// Interning threshold
// ============================================================================

#[test]
fn test_threshold_occurrence_promotes() {
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    let candidate = "a recurring string";
    for i in 1..INTERN_THRESH {
        encoder
            .encode(|w| Ok(w.string(candidate)), &mut out)
            .unwrap();
        assert_eq!(encoder.dict_len(), 0, "occurrence {i} must not intern");
    }
    encoder
        .encode(|w| Ok(w.string(candidate)), &mut out)
        .unwrap();
    assert_eq!(encoder.dict_len(), 1, "the threshold-th occurrence interns");
}

#[test]
fn test_intervening_strings_within_the_window_do_not_block_promotion() {
    // Interleave the candidate with distinct strings, fewer than the cache
    // size, so the candidate's tracker entry survives to promotion.
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    let candidate = "the string being tracked";
    for i in 0..INTERN_THRESH {
        encoder
            .encode(|w| Ok(w.string(candidate)), &mut out)
            .unwrap();
        encoder
            .encode(|w| Ok(w.string(&format!("filler number {i}"))), &mut out)
            .unwrap();
    }
    assert_eq!(encoder.dict_len(), 1);
    assert!(TINY_STRING_SIZE < candidate.len());
}

// ============================================================================
// Depth bounds
// ============================================================================

/// Run `f` on a thread with enough stack for 8192 recursion levels.
fn with_deep_stack<F: FnOnce() + Send + 'static>(f: F) {
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap();
}

fn nested_array_bytes(depth: usize) -> Vec<u8> {
    let mut bytes = vec![b'['; depth];
    bytes.push(b'N');
    bytes.extend(std::iter::repeat(b']').take(depth));
    bytes
}

#[test]
fn test_decoder_depth_limit() {
    with_deep_stack(|| {
        let mut source = ByteSource::from_bytes(nested_array_bytes(8192));
        let mut handler = NoopValueHandler;
        ValueParser::new(&mut source, &mut handler).parse().unwrap();

        let mut source = ByteSource::from_bytes(nested_array_bytes(8193));
        let mut handler = NoopValueHandler;
        let err = ValueParser::new(&mut source, &mut handler)
            .parse()
            .unwrap_err();
        assert!(matches!(err, ParseError::TooDeeplyNested { max: 8192, .. }));
    });
}

#[test]
fn test_encoder_depth_limit() {
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    let result = encoder.encode(
        |w| {
            for _ in 0..8193 {
                w.begin_array()?;
            }
            Ok(())
        },
        &mut out,
    );
    assert!(matches!(
        result,
        Err(au::EncodeError::TooDeeplyNested(8192))
    ));

    // 8192 levels are fine.
    let mut encoder = Encoder::new();
    encoder
        .encode(
            |w| {
                for _ in 0..8192 {
                    w.begin_array()?;
                }
                for _ in 0..8192 {
                    w.end_array();
                }
                Ok(())
            },
            &mut out,
        )
        .unwrap();
}
