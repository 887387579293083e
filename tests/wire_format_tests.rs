//! Byte-level wire format tests.
//!
//! These pin the exact encodings the decoder accepts: record framing,
//! integer forms, string interning on the wire, and NaN preservation.

use au::{ByteSource, Decoder, Encoder, EncoderConfig, Value};

/// Encode a sequence of records and return the raw stream bytes.
fn encode_stream<F>(producers: Vec<F>) -> Vec<u8>
where
    F: FnOnce(&mut au::ValueWriter<'_>) -> Result<(), au::EncodeError>,
{
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    for produce in producers {
        encoder.encode(produce, &mut out).unwrap();
    }
    out
}

/// Decode a stream fully, returning the values.
fn decode_stream(bytes: Vec<u8>) -> Vec<Value> {
    let mut decoder = Decoder::new(ByteSource::from_bytes(bytes));
    let mut values = Vec::new();
    while let Some((_, value)) = decoder.next_value().unwrap() {
        values.push(value);
    }
    values
}

/// Extract the payload of every value record in the stream.
fn value_payloads(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut decoder = Decoder::new(ByteSource::from_bytes(bytes.to_vec()));
    let mut spans = Vec::new();
    while let Some((pos, _)) = decoder.next_value().unwrap() {
        spans.push(pos as usize);
    }
    spans
        .into_iter()
        .map(|sor| {
            // 'V' + 4-byte backref, then a varint length, then the payload.
            let mut cursor = &bytes[sor + 5..];
            let mut offset = 0u64;
            let declared = au::varint::decode_varint(&mut cursor, &mut offset).unwrap();
            cursor[..declared as usize - 2].to_vec()
        })
        .collect()
}

#[test]
fn test_stream_begins_with_header_and_epoch() {
    let bytes = encode_stream(vec![|w: &mut au::ValueWriter<'_>| w.object(|_| Ok(()))]);
    // 'H' 'A' 'U' version=1 (small int 0x61) empty metadata, then the first
    // dict-clear, each terminated by E \n.
    assert_eq!(&bytes[..7], b"HAU\x61\x20E\n");
    assert_eq!(&bytes[7..11], b"C\x61E\n");
}

#[test]
fn test_empty_map_payload() {
    let bytes = encode_stream(vec![|w: &mut au::ValueWriter<'_>| w.object(|_| Ok(()))]);
    let payloads = value_payloads(&bytes);
    assert_eq!(payloads, vec![b"{}".to_vec()]);
    assert_eq!(decode_stream(bytes), vec![Value::Object(vec![])]);
}

#[test]
fn test_small_integer_forms() {
    let bytes = encode_stream(vec![|w: &mut au::ValueWriter<'_>| {
        w.array(|w| {
            for i in [0i64, 127, 128, -1, -127, -128] {
                w.int(i);
            }
            Ok(())
        })
    }]);

    let payloads = value_payloads(&bytes);
    let expected: Vec<u8> = vec![
        b'[', //
        0x60, // 0 as a small positive
        b'I', 0x7f, // 127
        b'I', 0x80, 0x01, // 128
        0x41, // -1 as a small negative
        b'J', 0x7f, // -127
        b'J', 0x80, 0x01, // -128
        b']',
    ];
    assert_eq!(payloads[0], expected);

    // Decoded, non-negative integers surface as unsigned.
    assert_eq!(
        decode_stream(bytes),
        vec![Value::Array(vec![
            Value::Uint(0),
            Value::Uint(127),
            Value::Uint(128),
            Value::Int(-1),
            Value::Int(-127),
            Value::Int(-128),
        ])]
    );
}

#[test]
fn test_interning_kicks_in_at_the_threshold() {
    let mut encoder = Encoder::new();
    let mut out = Vec::new();
    for _ in 0..12 {
        encoder
            .encode(|w| Ok(w.string("valToIntern")), &mut out)
            .unwrap();
    }

    let payloads = value_payloads(&out);
    assert_eq!(payloads.len(), 12);

    // "valToIntern" is 11 bytes: the inline form is 0x20|11 then the bytes.
    let inline: Vec<u8> = {
        let mut v = vec![0x20 | 11];
        v.extend_from_slice(b"valToIntern");
        v
    };
    for payload in &payloads[..9] {
        assert_eq!(*payload, inline);
    }
    // The tenth occurrence promotes; it and everything after are dict refs.
    for payload in &payloads[9..] {
        assert_eq!(*payload, vec![0x80]);
    }

    // Exactly one dict-add record, carrying the string inline, placed
    // before the tenth value record.
    let a_count = out.windows(3).filter(|&w| w == b"E\nA").count();
    assert_eq!(a_count, 1);

    // Decoding is oblivious to the representation change.
    let values = decode_stream(out);
    assert_eq!(values, vec![Value::string("valToIntern"); 12]);
}

#[test]
fn test_nan_bit_patterns_survive() {
    let f32_nan = f32::NAN as f64;
    let f64_nan = f64::NAN;
    let computed_nan: f64 = 0.0 / 0.0;

    let bytes = encode_stream(vec![move |w: &mut au::ValueWriter<'_>| {
        w.array(|w| {
            w.double(f32_nan);
            w.double(f64_nan);
            w.double(computed_nan);
            Ok(())
        })
    }]);

    let values = decode_stream(bytes);
    let Value::Array(items) = &values[0] else {
        panic!("expected an array");
    };
    for (item, original) in items.iter().zip([f32_nan, f64_nan, computed_nan]) {
        let Value::Double(d) = item else {
            panic!("expected a double");
        };
        assert!(d.is_nan());
        assert_eq!(d.to_bits(), original.to_bits(), "NaN payload preserved");
    }
}

#[test]
fn test_doubles_and_timestamps_are_fixed_width_le() {
    let bytes = encode_stream(vec![|w: &mut au::ValueWriter<'_>| {
        w.array(|w| {
            w.double(5.9);
            w.time_nanos(123_456_789);
            Ok(())
        })
    }]);
    let payload = value_payloads(&bytes).remove(0);
    let mut expected = vec![b'['];
    expected.push(b'D');
    expected.extend_from_slice(&5.9f64.to_le_bytes());
    expected.push(b't');
    expected.extend_from_slice(&123_456_789u64.to_le_bytes());
    expected.push(b']');
    assert_eq!(payload, expected);
}

#[test]
fn test_metadata_round_trips_through_the_header() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        metadata: "stream metadata for tests".into(),
        ..EncoderConfig::default()
    });
    let mut out = Vec::new();
    encoder.encode(|w| Ok(w.null()), &mut out).unwrap();

    let mut decoder = Decoder::new(ByteSource::from_bytes(out));
    let _ = decoder.next_value().unwrap();
    let header = decoder.header().expect("header parsed");
    assert_eq!(header.version, 1);
    assert_eq!(header.metadata, b"stream metadata for tests");
}

#[test]
fn test_oversized_metadata_is_truncated_by_the_encoder() {
    let mut encoder = Encoder::with_config(EncoderConfig {
        metadata: "m".repeat(20_000),
        ..EncoderConfig::default()
    });
    let mut out = Vec::new();
    encoder.encode(|w| Ok(w.null()), &mut out).unwrap();

    let mut decoder = Decoder::new(ByteSource::from_bytes(out));
    let _ = decoder.next_value().unwrap();
    assert_eq!(
        decoder.header().unwrap().metadata.len(),
        au::marker::MAX_METADATA_SIZE
    );
}

#[test]
fn test_value_record_declared_length_covers_payload_plus_terminator() {
    let bytes = encode_stream(vec![|w: &mut au::ValueWriter<'_>| {
        Ok(w.string("a string of 23 chars..."))
    }]);
    // Find the V record: header (7) + C (4), so it starts at 11.
    assert_eq!(bytes[11], b'V');
    let declared = bytes[16] as usize; // single-byte varint
    // Payload is 1 marker byte + 23 string bytes; declared adds E \n.
    assert_eq!(declared, 24 + 2);
    assert_eq!(&bytes[17 + 24..], b"E\n");
}
