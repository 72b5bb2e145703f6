//! Property-based tests for the length-prefixed payload convention.
//!
//! These tests use proptest to generate arbitrary headers and tails and verify
//! that decoding never panics and inverts encoding exactly.

use proptest::prelude::*;
use osdp_protocol::{
    BiometricFormat, BiometricTemplateData, BiometricType, PayloadData, decode_with_tail,
    encode_with_tail,
};

/// Strategy for biometric types (the full 0x00-0x11 range).
fn valid_bio_type() -> impl Strategy<Value = BiometricType> {
    (0u8..=0x11).prop_map(|v| BiometricType::from_u8(v).expect("value in range"))
}

/// Strategy for biometric formats.
fn valid_format() -> impl Strategy<Value = BiometricFormat> {
    prop_oneof![
        Just(BiometricFormat::NotSpecified),
        Just(BiometricFormat::FingerPrintRawPgm),
        Just(BiometricFormat::FingerPrintTemplateAnsi378),
    ]
}

proptest! {
    /// Property: decoding an encoded payload yields the same header and tail.
    #[test]
    fn prop_header_and_tail_survive(
        header in prop::array::uniform4(any::<u8>()),
        tail in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let encoded = encode_with_tail(&header, &tail).unwrap();
        prop_assert_eq!(encoded.len(), header.len() + 2 + tail.len());

        let (decoded_header, decoded_tail) = decode_with_tail::<4>(&encoded).unwrap();
        prop_assert_eq!(decoded_header, header);
        prop_assert_eq!(decoded_tail, tail.as_slice());
    }

    /// Property: arbitrary bytes never make the decoder panic.
    #[test]
    fn prop_decode_arbitrary_bytes_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let _ = decode_with_tail::<4>(&data);
        let _ = BiometricTemplateData::parse_data(&data);
    }

    /// Property: every truncation of a valid payload is rejected.
    #[test]
    fn prop_truncated_payload_rejected(
        tail in prop::collection::vec(any::<u8>(), 1..64),
        cut in 1usize..64,
    ) {
        let encoded = encode_with_tail(&[0x00, 0x01, 0x02, 0x03], &tail).unwrap();
        let cut = cut.min(encoded.len());
        let truncated = &encoded[..encoded.len() - cut];
        prop_assert!(decode_with_tail::<4>(truncated).is_err());
    }

    /// Property: any valid biometric template is reproduced field-for-field.
    #[test]
    fn prop_biometric_template_fields_preserved(
        reader in any::<u8>(),
        bio_type in valid_bio_type(),
        format in valid_format(),
        threshold in any::<u8>(),
        template in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let data = BiometricTemplateData::new(reader, bio_type, format, threshold, template.clone());
        let wire = data.build_data().unwrap();

        prop_assert_eq!(wire[0], reader);
        prop_assert_eq!(wire[1], bio_type.to_u8());
        prop_assert_eq!(wire[2], format.to_u8());
        prop_assert_eq!(wire[3], threshold);

        let parsed = BiometricTemplateData::parse_data(&wire).unwrap();
        prop_assert_eq!(parsed.template.as_ref(), template.as_slice());
        prop_assert_eq!(parsed, data);
    }
}
