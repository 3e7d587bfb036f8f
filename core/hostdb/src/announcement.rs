//! Host announcement extraction
//!
//! Hosts announce themselves by attaching a signed payload to the arbitrary
//! data of any transaction. A payload is the 16-byte tag
//! [`ANNOUNCEMENT_PREFIX`] followed by the bincode encoding of an
//! [`Announcement`]. The signature covers the tag and the encoded identity,
//! key and terms, so none of them can be swapped without the host's key.

use crate::entry::{HostPublicKey, HostTerms, NetAddress};
use crate::errors::AnnouncementError;
use crate::metrics;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hostdb_chain::Transaction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Tag marking an arbitrary data payload as a host announcement
pub const ANNOUNCEMENT_PREFIX: [u8; 16] = *b"HostAnnouncement";

/// Largest payload considered for decoding
pub const MAX_ANNOUNCEMENT_SIZE: usize = 4096;

/// Decoded host announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub identity: NetAddress,
    pub public_key: HostPublicKey,
    pub terms: HostTerms,
    /// Ed25519 signature over [`signing_message`]
    pub signature: Vec<u8>,
}

/// Bytes a host signs to announce `identity` with `terms`
pub fn signing_message(
    identity: &NetAddress,
    public_key: &HostPublicKey,
    terms: &HostTerms,
) -> Result<Vec<u8>, AnnouncementError> {
    let body = bincode::serialize(&(identity, public_key, terms))
        .map_err(|e| AnnouncementError::Malformed(e.to_string()))?;
    let mut message = Vec::with_capacity(ANNOUNCEMENT_PREFIX.len() + body.len());
    message.extend_from_slice(&ANNOUNCEMENT_PREFIX);
    message.extend_from_slice(&body);
    Ok(message)
}

impl Announcement {
    /// Build and sign an announcement
    pub fn sign(signing_key: &SigningKey, identity: NetAddress, terms: HostTerms) -> Result<Self, AnnouncementError> {
        let public_key = HostPublicKey::from(&signing_key.verifying_key());
        let message = signing_message(&identity, &public_key, &terms)?;
        let signature = signing_key.sign(&message);

        Ok(Self {
            identity,
            public_key,
            terms,
            signature: signature.to_bytes().to_vec(),
        })
    }

    /// Encode as an arbitrary data payload
    pub fn encode(&self) -> Result<Vec<u8>, AnnouncementError> {
        let body = bincode::serialize(self).map_err(|e| AnnouncementError::Malformed(e.to_string()))?;
        let mut payload = Vec::with_capacity(ANNOUNCEMENT_PREFIX.len() + body.len());
        payload.extend_from_slice(&ANNOUNCEMENT_PREFIX);
        payload.extend_from_slice(&body);
        Ok(payload)
    }
}

/// Decode a payload. Foreign payloads yield `NotAnAnnouncement`.
pub fn parse(payload: &[u8]) -> Result<Announcement, AnnouncementError> {
    let Some(body) = payload.strip_prefix(&ANNOUNCEMENT_PREFIX[..]) else {
        return Err(AnnouncementError::NotAnAnnouncement);
    };
    if payload.len() > MAX_ANNOUNCEMENT_SIZE {
        return Err(AnnouncementError::Malformed(format!(
            "payload of {} bytes exceeds {}",
            payload.len(),
            MAX_ANNOUNCEMENT_SIZE
        )));
    }
    bincode::deserialize(body).map_err(|e| AnnouncementError::Malformed(e.to_string()))
}

/// Check the signature against the embedded public key
pub fn verify(announcement: &Announcement) -> Result<(), AnnouncementError> {
    let key = VerifyingKey::from_bytes(&announcement.public_key.0)
        .map_err(|_| AnnouncementError::InvalidPublicKey)?;
    let signature_bytes: [u8; 64] = announcement
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| AnnouncementError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);

    let message = signing_message(&announcement.identity, &announcement.public_key, &announcement.terms)?;
    key.verify(&message, &signature)
        .map_err(|_| AnnouncementError::InvalidSignature)
}

/// Every verified announcement in a transaction, in payload order.
/// Anything else is skipped.
pub fn extract(tx: &Transaction) -> Vec<Announcement> {
    let mut announcements = Vec::new();
    for payload in &tx.arbitrary_data {
        let announcement = match parse(payload) {
            Ok(announcement) => announcement,
            Err(AnnouncementError::NotAnAnnouncement) => continue,
            Err(e) => {
                debug!("Skipping undecodable announcement: {}", e);
                metrics::record_announcement("malformed");
                continue;
            }
        };

        match verify(&announcement) {
            Ok(()) => announcements.push(announcement),
            Err(e) => {
                warn!("Rejected announcement for {}: {}", announcement.identity, e);
                metrics::record_announcement("rejected");
            }
        }
    }
    announcements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> HostTerms {
        HostTerms {
            total_storage: 1 << 40,
            max_filesize: 1 << 30,
            min_duration: 10,
            max_duration: 1_000,
            price: 3,
            collateral: 5,
        }
    }

    fn signed(seed: u8, address: &str) -> Announcement {
        let key = SigningKey::from_bytes(&[seed; 32]);
        Announcement::sign(&key, NetAddress::from(address), terms()).unwrap()
    }

    #[test]
    fn test_parse_and_verify_signed_payload() {
        let announcement = signed(1, "host.example:9982");
        let payload = announcement.encode().unwrap();

        let parsed = parse(&payload).unwrap();
        assert_eq!(parsed, announcement);
        assert!(verify(&parsed).is_ok());
    }

    #[test]
    fn test_foreign_payloads_are_not_announcements() {
        assert_eq!(parse(b"hello world"), Err(AnnouncementError::NotAnAnnouncement));
        assert_eq!(parse(&[]), Err(AnnouncementError::NotAnAnnouncement));
        assert!(matches!(parse(&ANNOUNCEMENT_PREFIX), Err(AnnouncementError::Malformed(_))));

        let mut oversized = ANNOUNCEMENT_PREFIX.to_vec();
        oversized.resize(MAX_ANNOUNCEMENT_SIZE + 1, 0);
        assert!(matches!(parse(&oversized), Err(AnnouncementError::Malformed(_))));
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let mut announcement = signed(2, "host.example:9982");
        announcement.identity = NetAddress::from("evil.example:9982");
        assert_eq!(verify(&announcement), Err(AnnouncementError::InvalidSignature));

        let mut announcement = signed(2, "host.example:9982");
        announcement.terms.price = 1;
        assert_eq!(verify(&announcement), Err(AnnouncementError::InvalidSignature));

        let mut announcement = signed(2, "host.example:9982");
        announcement.signature.truncate(10);
        assert_eq!(verify(&announcement), Err(AnnouncementError::InvalidSignature));

        // Someone else's key over the same body
        let mut announcement = signed(2, "host.example:9982");
        announcement.public_key = signed(3, "host.example:9982").public_key;
        assert_eq!(verify(&announcement), Err(AnnouncementError::InvalidSignature));
    }

    #[test]
    fn test_extract_keeps_only_verified() {
        let good = signed(4, "good.example:1");
        let mut bad = signed(5, "bad.example:1");
        bad.signature[0] ^= 0xff;

        let tx = Transaction::new(
            vec![
                b"unrelated".to_vec(),
                bad.encode().unwrap(),
                good.encode().unwrap(),
                ANNOUNCEMENT_PREFIX.to_vec(),
            ],
            0,
        );
        assert_eq!(extract(&tx), vec![good]);
    }
}
