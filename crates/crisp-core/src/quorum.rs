//! Multi-signature trailers and quorum verification.
//!
//! A signed payload is laid out as:
//!
//! ```text
//! body || sig_1 || ... || sig_n || count:u16
//! ```
//!
//! Every signature covers `body` only, so co-signers can append without
//! invalidating earlier signatures. Signatures are paired with candidate keys
//! by position: `sig_i` is checked against `keys[i]`. An empty slot counts
//! its signature as unverified without shifting the ones after it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, SIGNATURE_LEN};
use crate::error::{CodecError, Result};
use crate::packet::Packet;

/// Quorum threshold when quorum mode is enabled.
pub const DEFAULT_QUORUM: usize = 3;

const COUNT_LEN: usize = 2;

/// A payload split into its signed body and signature trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    body: Bytes,
    signatures: Vec<Ed25519Signature>,
}

impl SignedPayload {
    /// Wrap a body that has not been signed yet.
    pub fn unsigned(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            signatures: Vec::new(),
        }
    }

    /// Split a signed payload into body and signatures.
    pub fn parse(payload: &Bytes) -> Result<Self> {
        if payload.len() < COUNT_LEN {
            return Err(CodecError::malformed("signature trailer missing count"));
        }
        let count_at = payload.len() - COUNT_LEN;
        let count = u16::from_be_bytes([payload[count_at], payload[count_at + 1]]) as usize;

        let sigs_len = count * SIGNATURE_LEN;
        if count_at < sigs_len {
            return Err(CodecError::malformed(format!(
                "signature trailer claims {} signatures but only {} bytes precede the count",
                count, count_at
            )));
        }
        let body_end = count_at - sigs_len;

        let signatures = payload[body_end..count_at]
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                let mut bytes = [0u8; SIGNATURE_LEN];
                bytes.copy_from_slice(chunk);
                Ed25519Signature::from_bytes(bytes)
            })
            .collect();

        Ok(Self {
            body: payload.slice(..body_end),
            signatures,
        })
    }

    /// The bytes every signature covers.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Signatures in signing order.
    pub fn signatures(&self) -> &[Ed25519Signature] {
        &self.signatures
    }

    /// Append a signature.
    pub fn push(&mut self, signature: Ed25519Signature) -> Result<()> {
        if self.signatures.len() >= u16::MAX as usize {
            return Err(CodecError::FieldTooLong {
                field: "signature count",
                len: self.signatures.len() + 1,
                max: u16::MAX as usize,
            });
        }
        self.signatures.push(signature);
        Ok(())
    }

    /// Sign the body with `keypair` and append the signature.
    pub fn sign_with(&mut self, keypair: &Keypair) -> Result<()> {
        let signature = keypair.sign(&self.body);
        self.push(signature)
    }

    /// Serialize back to `body || sigs || count`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            self.body.len() + self.signatures.len() * SIGNATURE_LEN + COUNT_LEN,
        );
        buf.put_slice(&self.body);
        for sig in &self.signatures {
            buf.put_slice(sig.as_bytes());
        }
        buf.put_u16(self.signatures.len() as u16);
        buf.freeze()
    }

    /// Count signatures that verify against the key at the same position.
    pub fn verified_count(&self, keys: &[Ed25519PublicKey]) -> usize {
        self.count_matching(keys.iter().map(Some))
    }

    /// Like [`verified_count`](Self::verified_count), where `None` marks a
    /// signer whose key is not known.
    pub fn verified_slot_count(&self, slots: &[Option<Ed25519PublicKey>]) -> usize {
        self.count_matching(slots.iter().map(Option::as_ref))
    }

    fn count_matching<'k>(
        &self,
        slots: impl Iterator<Item = Option<&'k Ed25519PublicKey>>,
    ) -> usize {
        self.signatures
            .iter()
            .zip(slots)
            .filter(|(sig, key)| key.is_some_and(|key| key.verify(&self.body, sig)))
            .count()
    }
}

/// Sign a packet whose whole payload is an unsigned body.
///
/// The result keeps kind, sequence, and checksum kind; its checksum is
/// recomputed over the extended payload.
pub fn sign(packet: &Packet, keypair: &Keypair) -> Result<Packet> {
    let mut signed = SignedPayload::unsigned(packet.payload().clone());
    signed.sign_with(keypair)?;
    packet.with_payload(signed.encode())
}

/// Append a further signature to an already signed packet.
pub fn co_sign(packet: &Packet, keypair: &Keypair) -> Result<Packet> {
    let mut signed = SignedPayload::parse(packet.payload())?;
    signed.sign_with(keypair)?;
    packet.with_payload(signed.encode())
}

/// Number of positionally verified signatures, 0 if the trailer is malformed.
pub fn verified_count(packet: &Packet, keys: &[Ed25519PublicKey]) -> usize {
    SignedPayload::parse(packet.payload())
        .map(|signed| signed.verified_count(keys))
        .unwrap_or(0)
}

/// Whether at least `threshold` signatures verify.
pub fn verify(packet: &Packet, keys: &[Ed25519PublicKey], threshold: usize) -> bool {
    verified_count(packet, keys) >= threshold
}

/// Whether at least `threshold` signatures verify against `slots`, where a
/// `None` slot never verifies.
pub fn verify_slots(
    packet: &Packet,
    slots: &[Option<Ed25519PublicKey>],
    threshold: usize,
) -> bool {
    SignedPayload::parse(packet.payload())
        .map(|signed| signed.verified_slot_count(slots) >= threshold)
        .unwrap_or(false)
}

/// How many signatures an inbound packet needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    threshold: usize,
}

impl QuorumPolicy {
    /// Threshold `DEFAULT_QUORUM` in quorum mode, otherwise a single signer.
    pub fn new(use_quorums: bool) -> Self {
        Self {
            threshold: if use_quorums { DEFAULT_QUORUM } else { 1 },
        }
    }

    /// Override the threshold. Zero is raised to one.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    /// The required number of verified signatures.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Check a packet against this policy.
    pub fn verify(&self, packet: &Packet, keys: &[Ed25519PublicKey]) -> bool {
        verify(packet, keys, self.threshold)
    }

    /// Check a packet against signer slots that may be unknown.
    pub fn verify_slots(&self, packet: &Packet, slots: &[Option<Ed25519PublicKey>]) -> bool {
        verify_slots(packet, slots, self.threshold)
    }
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}
