//! COSE_Key decoding for ES256 passkeys.
//!
//! A registration hands us the credential public key as a CBOR map:
//!
//! ```text
//! { 1: 2 (kty EC2), 3: -7 (alg ES256), -1: 1 (crv P-256), -2: x (bstr 32), -3: y (bstr 32) }
//! ```
//!
//! The map is parsed with `ciborium` into a [`Value`] tree and then checked
//! entry by entry. Labels we do not interpret (`kid`, `key_ops`, `base_iv`,
//! private labels) are skipped whatever their value type; the five labels
//! above are held to exactly the values an ES256 key must carry. Any
//! structural surprise is a `MalformedKey`.

use ciborium::value::Value;

use crate::config::COORDINATE_LENGTH;
use crate::crypto::keys::PublicKey;
use crate::error::AuthError;

const LABEL_KTY: i128 = 1;
const LABEL_ALG: i128 = 3;
const LABEL_CRV: i128 = -1;
const LABEL_X: i128 = -2;
const LABEL_Y: i128 = -3;

const KTY_EC2: i128 = 2;
const ALG_ES256: i128 = -7;
const CRV_P256: i128 = 1;

/// COSE keys have a handful of entries; anything bigger is not a key.
const MAX_MAP_ENTRIES: usize = 16;

/// Upper bound on the encoded key, checked before any parsing.
const MAX_ENCODED_LENGTH: usize = 1024;

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::MalformedKey(reason.into())
}

fn expect_int(label: i128, value: &Value, want: i128, what: &str) -> Result<(), AuthError> {
    match value {
        Value::Integer(v) if i128::from(*v) == want => Ok(()),
        Value::Integer(v) => Err(malformed(format!(
            "{what} (label {label}) is {}, expected {want}",
            i128::from(*v)
        ))),
        _ => Err(malformed(format!("{what} (label {label}) is not an integer"))),
    }
}

fn coordinate(value: &Value, name: &str) -> Result<[u8; COORDINATE_LENGTH], AuthError> {
    match value {
        Value::Bytes(b) if b.len() == COORDINATE_LENGTH => {
            let mut out = [0u8; COORDINATE_LENGTH];
            out.copy_from_slice(b);
            Ok(out)
        }
        Value::Bytes(b) => Err(malformed(format!(
            "{name} is {} bytes, expected {COORDINATE_LENGTH}",
            b.len()
        ))),
        _ => Err(malformed(format!("{name} is not a byte string"))),
    }
}

/// Decode a COSE_Key map into a validated P-256 public key.
pub fn decode_cose_key(bytes: &[u8]) -> Result<PublicKey, AuthError> {
    if bytes.len() > MAX_ENCODED_LENGTH {
        return Err(malformed(format!("key is {} bytes", bytes.len())));
    }

    let mut rest = bytes;
    let parsed: Value = ciborium::de::from_reader(&mut rest)
        .map_err(|e| malformed(format!("invalid CBOR: {e}")))?;
    if !rest.is_empty() {
        return Err(malformed(format!("{} trailing bytes after map", rest.len())));
    }

    let entries = match parsed {
        Value::Map(entries) => entries,
        _ => return Err(malformed("expected a CBOR map")),
    };
    if entries.len() > MAX_MAP_ENTRIES {
        return Err(malformed(format!("map has {} entries", entries.len())));
    }

    let mut x = None;
    let mut y = None;

    for (i, (key, value)) in entries.iter().enumerate() {
        if entries[..i].iter().any(|(earlier, _)| earlier == key) {
            return Err(malformed(format!("duplicate label {key:?}")));
        }

        let label = match key {
            Value::Integer(label) => i128::from(*label),
            // Text labels are legal COSE but none of ours are text.
            Value::Text(_) => continue,
            _ => return Err(malformed("map key is neither an integer nor text")),
        };
        match label {
            LABEL_KTY => expect_int(label, value, KTY_EC2, "kty")?,
            LABEL_ALG => expect_int(label, value, ALG_ES256, "alg")?,
            LABEL_CRV => expect_int(label, value, CRV_P256, "crv")?,
            LABEL_X => x = Some(coordinate(value, "x")?),
            LABEL_Y => y = Some(coordinate(value, "y")?),
            _ => {}
        }
    }

    let x = x.ok_or_else(|| malformed("missing x coordinate (label -2)"))?;
    let y = y.ok_or_else(|| malformed("missing y coordinate (label -3)"))?;
    PublicKey::from_coordinates(x, y).map_err(|e| malformed(e.to_string()))
}

/// Decode a 65-byte SEC1 uncompressed point, `0x04 ‖ x ‖ y`.
pub fn decode_sec1_key(bytes: &[u8]) -> Result<PublicKey, AuthError> {
    if bytes.len() != 1 + 2 * COORDINATE_LENGTH {
        return Err(malformed(format!(
            "SEC1 key is {} bytes, expected {}",
            bytes.len(),
            1 + 2 * COORDINATE_LENGTH
        )));
    }
    if bytes[0] != 0x04 {
        return Err(malformed(format!(
            "SEC1 key prefix is 0x{:02x}, expected 0x04",
            bytes[0]
        )));
    }
    let mut x = [0u8; COORDINATE_LENGTH];
    let mut y = [0u8; COORDINATE_LENGTH];
    x.copy_from_slice(&bytes[1..1 + COORDINATE_LENGTH]);
    y.copy_from_slice(&bytes[1 + COORDINATE_LENGTH..]);
    PublicKey::from_coordinates(x, y).map_err(|e| malformed(e.to_string()))
}

/// Accept either encoding: a SEC1 point if it looks like one, COSE otherwise.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, AuthError> {
    if bytes.len() == 1 + 2 * COORDINATE_LENGTH && bytes[0] == 0x04 {
        decode_sec1_key(bytes)
    } else {
        decode_cose_key(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SoftAuthenticator;
    use proptest::prelude::*;

    /// `A? 21 58 20 <x> 22 58 20 <y>` with optional extra entries up front.
    fn minimal_key(pk: &PublicKey, prefix: &[u8], entries: u8) -> Vec<u8> {
        let mut out = vec![0xA0 | entries];
        out.extend_from_slice(prefix);
        out.extend_from_slice(&[0x21, 0x58, 0x20]);
        out.extend_from_slice(pk.x());
        out.extend_from_slice(&[0x22, 0x58, 0x20]);
        out.extend_from_slice(pk.y());
        out
    }

    #[test]
    fn decodes_authenticator_cose_key() {
        let auth = SoftAuthenticator::generate();
        let key = decode_cose_key(&auth.cose_key()).unwrap();
        assert_eq!(key, auth.public_key());
    }

    #[test]
    fn decodes_without_optional_labels() {
        let pk = SoftAuthenticator::generate().public_key();
        assert_eq!(decode_cose_key(&minimal_key(&pk, &[], 2)).unwrap(), pk);
    }

    #[test]
    fn skips_unknown_labels() {
        let pk = SoftAuthenticator::generate().public_key();
        // 2 (kid): bstr "ab"
        let key = minimal_key(&pk, &[0x02, 0x42, b'a', b'b'], 3);
        assert_eq!(decode_cose_key(&key).unwrap(), pk);
    }

    #[test]
    fn skips_unknown_labels_of_any_type() {
        let pk = SoftAuthenticator::generate().public_key();
        // 4 (key_ops): [1]
        let key = minimal_key(&pk, &[0x04, 0x81, 0x01], 3);
        assert_eq!(decode_cose_key(&key).unwrap(), pk);

        // -70000: {1: true}, 7: tag 24 (bstr ""), "note": null
        let key = minimal_key(
            &pk,
            &[
                0x3A, 0x00, 0x01, 0x11, 0x6F, 0xA1, 0x01, 0xF5, //
                0x07, 0xD8, 0x18, 0x40, //
                0x64, b'n', b'o', b't', b'e', 0xF6,
            ],
            5,
        );
        assert_eq!(decode_cose_key(&key).unwrap(), pk);
    }

    #[test]
    fn rejects_known_label_with_wrong_type() {
        let pk = SoftAuthenticator::generate().public_key();
        // 3 (alg): [-7]
        let err = decode_cose_key(&minimal_key(&pk, &[0x03, 0x81, 0x26], 3)).unwrap_err();
        assert!(err.to_string().contains("alg"), "{err}");
    }

    #[test]
    fn rejects_non_map_and_oversized_input() {
        assert!(decode_cose_key(&[0x81, 0x01]).is_err());
        assert!(decode_cose_key(&vec![0u8; MAX_ENCODED_LENGTH + 1]).is_err());
    }

    #[test]
    fn rejects_missing_coordinate() {
        let pk = SoftAuthenticator::generate().public_key();
        let mut key = vec![0xA1, 0x21, 0x58, 0x20];
        key.extend_from_slice(pk.x());
        let err = decode_cose_key(&key).unwrap_err();
        assert!(matches!(err, AuthError::MalformedKey(_)));
    }

    #[test]
    fn rejects_duplicate_label() {
        let pk = SoftAuthenticator::generate().public_key();
        let mut key = minimal_key(&pk, &[], 3);
        key.extend_from_slice(&[0x21, 0x58, 0x20]);
        key.extend_from_slice(pk.x());
        let err = decode_cose_key(&key).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }

    #[test]
    fn rejects_wrong_algorithm_and_curve() {
        let pk = SoftAuthenticator::generate().public_key();
        // alg -8 (EdDSA)
        assert!(decode_cose_key(&minimal_key(&pk, &[0x03, 0x27], 3)).is_err());
        // crv 2 (P-384)
        assert!(decode_cose_key(&minimal_key(&pk, &[0x20, 0x02], 3)).is_err());
        // kty 1 (OKP)
        assert!(decode_cose_key(&minimal_key(&pk, &[0x01, 0x01], 3)).is_err());
    }

    #[test]
    fn rejects_short_coordinate_and_truncation() {
        let auth = SoftAuthenticator::generate();
        let full = auth.cose_key();
        for cut in [1, 10, full.len() - 1] {
            assert!(decode_cose_key(&full[..cut]).is_err(), "cut at {cut}");
        }

        let mut short = vec![0xA2, 0x21, 0x58, 0x1F];
        short.extend_from_slice(&[1u8; 31]);
        assert!(decode_cose_key(&short).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut key = SoftAuthenticator::generate().cose_key();
        key.push(0x00);
        assert!(decode_cose_key(&key).is_err());
    }

    #[test]
    fn rejects_off_curve_point() {
        let pk = SoftAuthenticator::generate().public_key();
        let mut key = minimal_key(&pk, &[], 2);
        let last = key.len() - 1;
        key[last] ^= 0x01;
        assert!(matches!(
            decode_cose_key(&key),
            Err(AuthError::MalformedKey(_))
        ));
    }

    #[test]
    fn sec1_roundtrip_and_rejections() {
        let pk = SoftAuthenticator::generate().public_key();
        let sec1 = pk.to_sec1_uncompressed();
        assert_eq!(decode_sec1_key(&sec1).unwrap(), pk);
        assert_eq!(decode_public_key(&sec1).unwrap(), pk);

        let mut compressed_prefix = sec1;
        compressed_prefix[0] = 0x02;
        assert!(decode_sec1_key(&compressed_prefix).is_err());
        assert!(decode_sec1_key(&sec1[..64]).is_err());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..160)) {
            let _ = decode_cose_key(&bytes);
            let _ = decode_sec1_key(&bytes);
        }
    }
}
