//! Network-facing definitions consumed by the gossip and negotiation
//! layers: broadcast framing, host announcements, and negotiation
//! responses.
//!
//! The consensus core never opens a connection itself; it hands encoded
//! messages to a [`Broadcast`] collaborator and defines the byte formats
//! that higher modules read back out of the chain.

use crate::constants::{
    ACCEPT_RESPONSE, BLOCK_MESSAGE_KIND, MAX_ERROR_SIZE, PREFIX_HOST_ANNOUNCEMENT,
    SIGNATURE_ED25519,
};
use crate::encoding::{encode, hash_object};
use crate::error::{AnnouncementError, NegotiationError};
use crate::types::{Block, Specifier};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Best-effort, non-blocking broadcast of an encoded message to peers.
/// Called while the engine lock is held, so implementations must not block.
pub trait Broadcast: Send + Sync {
    fn broadcast(&self, message: &[u8]);
}

/// Frame a block for broadcast: a single kind byte followed by the encoded
/// payload.
pub fn block_message(block: &Block) -> Vec<u8> {
    let mut message = vec![BLOCK_MESSAGE_KIND];
    message.extend_from_slice(&encode(block));
    message
}

/// A public key tagged with its algorithm. Only Ed25519 keys are accepted
/// by announcement verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub algorithm: Specifier,
    pub key: Vec<u8>,
}

/// An announcement by a host that appears in a transaction's arbitrary
/// data. The prefix is always `PREFIX_HOST_ANNOUNCEMENT`; the encoded
/// announcement is followed by a detached 64-byte signature from the
/// announced key over the hash of the encoded announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAnnouncement {
    pub prefix: Specifier,
    pub net_address: String,
    pub public_key: PublicKey,
}

/// Encode and sign a host announcement, returning the exact bytes to place
/// in a transaction's arbitrary data.
pub fn create_announcement(net_address: &str, signing_key: &SigningKey) -> Vec<u8> {
    let announcement = HostAnnouncement {
        prefix: PREFIX_HOST_ANNOUNCEMENT,
        net_address: net_address.to_string(),
        public_key: PublicKey {
            algorithm: SIGNATURE_ED25519,
            key: signing_key.verifying_key().to_bytes().to_vec(),
        },
    };
    let mut bytes = encode(&announcement);
    let signature = signing_key.sign(&hash_object(&announcement));
    bytes.extend_from_slice(&signature.to_bytes());
    bytes
}

/// Decode announcement bytes, verifying the prefix, the key algorithm and
/// the signature. Returns the announced address and public key.
pub fn decode_announcement(
    bytes: &[u8],
) -> std::result::Result<(String, PublicKey), AnnouncementError> {
    let mut reader = bytes;
    let announcement: HostAnnouncement = bincode::deserialize_from(&mut reader)
        .map_err(|err| AnnouncementError::Malformed(err.to_string()))?;

    if announcement.prefix != PREFIX_HOST_ANNOUNCEMENT {
        return Err(AnnouncementError::NotAnnouncement);
    }
    if announcement.public_key.algorithm != SIGNATURE_ED25519 {
        return Err(AnnouncementError::UnrecognizedSignature);
    }

    if reader.len() < 64 {
        return Err(AnnouncementError::Malformed(
            "announcement is missing its signature".to_string(),
        ));
    }
    let mut signature_bytes = [0u8; 64];
    signature_bytes.copy_from_slice(&reader[..64]);
    let signature = Signature::from_bytes(&signature_bytes);

    let key_bytes: [u8; 32] = announcement
        .public_key
        .key
        .as_slice()
        .try_into()
        .map_err(|_| {
            AnnouncementError::InvalidSignature("announced key is not 32 bytes".to_string())
        })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|err| AnnouncementError::InvalidSignature(err.to_string()))?;

    verifying_key
        .verify(&hash_object(&announcement), &signature)
        .map_err(|err| AnnouncementError::InvalidSignature(err.to_string()))?;

    Ok((announcement.net_address, announcement.public_key))
}

/// Encode a negotiation response: the literal `"accept"` for success,
/// anything else for a rejection describing the error.
pub fn encode_negotiation_response(response: &str) -> Vec<u8> {
    encode(&response.to_string())
}

/// Read a negotiation response. A response that is not `"accept"` is
/// returned as a rejection carrying the peer's error string. Bodies are
/// bounded to MAX_ERROR_SIZE bytes.
pub fn read_negotiation_response(bytes: &[u8]) -> std::result::Result<(), NegotiationError> {
    if bytes.len() > 8 + MAX_ERROR_SIZE {
        return Err(NegotiationError::ResponseTooLarge(bytes.len()));
    }
    let response: String = bincode::deserialize(bytes)
        .map_err(|err| NegotiationError::Malformed(err.to_string()))?;
    if response == ACCEPT_RESPONSE {
        Ok(())
    } else {
        Err(NegotiationError::Rejected(response))
    }
}
