//! Signed envelope construction and verification.

use koi_core::canonical::to_signing_bytes;
use koi_core::{Envelope, Error as ProtocolError};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::keypair::{verify, KeyPair};

/// The fields an envelope's signature covers, in exactly this declaration
/// order, with nulls omitted — distinct from the full `Envelope<T>` which
/// also carries the `signature` field itself.
#[derive(Serialize)]
struct SignedFields<'a, T: Serialize> {
    payload: &'a T,
    source_node: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_node: &'a Option<String>,
}

fn signing_bytes<T: Serialize>(
    payload: &T,
    source_node: &str,
    target_node: &Option<String>,
) -> serde_json::Result<Vec<u8>> {
    to_signing_bytes(&SignedFields {
        payload,
        source_node,
        target_node,
    })
}

/// Produce a signed, four-field envelope (payload, source, target, signature).
pub fn sign_envelope<T: Serialize>(
    payload: T,
    source_node: String,
    target_node: Option<String>,
    keypair: &KeyPair,
) -> Envelope<T> {
    let bytes = signing_bytes(&payload, &source_node, &target_node)
        .expect("envelope payload must serialize");
    let signature = keypair.sign(&bytes);
    Envelope {
        payload,
        source_node,
        target_node,
        signature: Some(signature),
    }
}

/// Verify a signed envelope, returning the payload and declared source on
/// success. Fails with [`ProtocolError::InvalidSignature`] if the signature
/// does not verify, or with the mismatch variants if expectations are
/// supplied and not met.
pub fn verify_envelope<T: Serialize + for<'de> Deserialize<'de>>(
    envelope: Envelope<T>,
    public_key: &VerifyingKey,
    expected_source_node: Option<&str>,
    expected_target_node: Option<&str>,
) -> Result<(T, String), ProtocolError> {
    let signature = envelope.signature.as_deref().ok_or(ProtocolError::InvalidSignature)?;
    let bytes = signing_bytes(&envelope.payload, &envelope.source_node, &envelope.target_node)?;
    verify(public_key, &bytes, signature).map_err(|_| ProtocolError::InvalidSignature)?;

    if let Some(expected) = expected_source_node {
        if expected != envelope.source_node {
            return Err(ProtocolError::SourceNodeMismatch {
                expected: expected.to_string(),
                actual: envelope.source_node,
            });
        }
    }
    if let Some(expected) = expected_target_node {
        let actual = envelope.target_node.clone().unwrap_or_default();
        if expected != actual {
            return Err(ProtocolError::TargetNodeMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    Ok((envelope.payload, envelope.source_node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        kind: String,
        n: i32,
    }

    #[test]
    fn sign_then_verify_recovers_payload_and_source() {
        let kp = KeyPair::generate();
        let payload = Payload { kind: "poll_events".into(), n: 7 };
        let envelope = sign_envelope(payload, "node-a".into(), Some("node-b".into()), &kp);

        let (recovered, source) =
            verify_envelope(envelope, &kp.verifying_key(), None, None).unwrap();
        assert_eq!(recovered, Payload { kind: "poll_events".into(), n: 7 });
        assert_eq!(source, "node-a");
    }

    #[test]
    fn tampered_envelope_fails_verification() {
        let kp = KeyPair::generate();
        let payload = Payload { kind: "poll_events".into(), n: 7 };
        let mut envelope = sign_envelope(payload, "node-a".into(), None, &kp);
        envelope.payload.n = 8;

        let result = verify_envelope(envelope, &kp.verifying_key(), None, None);
        assert!(matches!(result, Err(ProtocolError::InvalidSignature)));
    }

    #[test]
    fn source_mismatch_is_reported() {
        let kp = KeyPair::generate();
        let payload = Payload { kind: "poll_events".into(), n: 1 };
        let envelope = sign_envelope(payload, "node-a".into(), None, &kp);
        let result = verify_envelope(envelope, &kp.verifying_key(), Some("node-z"), None);
        assert!(matches!(result, Err(ProtocolError::SourceNodeMismatch { .. })));
    }
}
