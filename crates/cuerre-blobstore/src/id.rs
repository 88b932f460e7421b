//! Store-generated blob identifiers

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Identifier of a durable blob record.
///
/// Twelve bytes rendered as 24 lowercase hex characters: a 4-byte
/// big-endian unix timestamp, 5 bytes of per-process randomness and a
/// 3-byte counter. Ids are only ever minted by the store; callers can
/// parse them from URLs but never choose them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

struct ProcessSeed {
    random: [u8; 5],
    counter: AtomicU32,
}

fn process_seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| {
        let bytes = uuid::Uuid::new_v4().into_bytes();
        let mut random = [0u8; 5];
        random.copy_from_slice(&bytes[..5]);
        let counter = u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]);
        ProcessSeed {
            random,
            counter: AtomicU32::new(counter),
        }
    })
}

impl BlobId {
    /// Length of the hex rendering
    pub const LEN: usize = 24;

    /// Mint a fresh identifier
    pub fn generate() -> Self {
        let seed = process_seed();
        let secs = Utc::now().timestamp() as u32;
        let count = seed.counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut raw = [0u8; 12];
        raw[..4].copy_from_slice(&secs.to_be_bytes());
        raw[4..9].copy_from_slice(&seed.random);
        raw[9..].copy_from_slice(&count.to_be_bytes()[1..]);

        Self(hex::encode(raw))
    }

    /// Parse an identifier taken from a request path
    pub fn parse(s: &str) -> Result<Self, InvalidBlobId> {
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidBlobId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobId {
    type Err = InvalidBlobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = InvalidBlobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

/// A string that is not a well-formed [`BlobId`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBlobId(pub String);

impl fmt::Display for InvalidBlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid blob id {:?}: expected {} hex characters",
            self.0,
            BlobId::LEN
        )
    }
}

impl std::error::Error for InvalidBlobId {}
