//! Cryptographic primitives: SHA-256 content hashing and Ed25519 member keys.
//!
//! Every content hash in the system is SHA-256 over canonical bytes. The chain
//! accumulator is the one exception: it hashes the raw hex text of two hashes.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CoreError;

/// A 32-byte SHA-256 digest, carried on the wire as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Compute the SHA-256 hash of data.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Chain accumulator: SHA-256 over `previous_hex || current_hex`.
    pub fn chain(previous: &ContentHash, current: &ContentHash) -> Self {
        Self::chain_text(&previous.to_hex(), current)
    }

    /// Chain accumulator over the predecessor reference exactly as stored.
    pub fn chain_text(previous: &str, current: &ContentHash) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(current.to_hex().as_bytes());
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from canonical hex: exactly 64 lowercase hex digits.
    ///
    /// Uppercase digits are refused. Every hash is hashed or chained as text,
    /// so two spellings of one digest are two different references.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        if let Some((index, c)) = s
            .char_indices()
            .find(|(_, c)| !matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(hex::FromHexError::InvalidHexCharacter { c, index });
        }
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA256({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// A hash reference as read from a stored document.
///
/// Canonical text parses to a digest. Anything else is kept verbatim so the
/// verifier can report it against the entry that carries it instead of the
/// whole document failing to load.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum HashRef {
    Digest(ContentHash),
    Malformed(String),
}

impl HashRef {
    pub fn parse(text: &str) -> Self {
        match ContentHash::from_hex(text) {
            Ok(hash) => Self::Digest(hash),
            Err(_) => Self::Malformed(text.to_string()),
        }
    }

    /// The digest, if the reference is canonical.
    pub fn digest(&self) -> Option<ContentHash> {
        match self {
            Self::Digest(hash) => Some(*hash),
            Self::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// The reference as it appears on the wire.
    pub fn to_text(&self) -> String {
        match self {
            Self::Digest(hash) => hash.to_hex(),
            Self::Malformed(text) => text.clone(),
        }
    }
}

impl From<ContentHash> for HashRef {
    fn from(hash: ContentHash) -> Self {
        Self::Digest(hash)
    }
}

impl PartialEq<ContentHash> for HashRef {
    fn eq(&self, other: &ContentHash) -> bool {
        matches!(self, Self::Digest(hash) if hash == other)
    }
}

impl PartialEq<HashRef> for ContentHash {
    fn eq(&self, other: &HashRef) -> bool {
        other == self
    }
}

impl fmt::Debug for HashRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest(hash) => fmt::Debug::fmt(hash, f),
            Self::Malformed(text) => write!(f, "Malformed({:?})", text),
        }
    }
}

impl fmt::Display for HashRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for HashRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for HashRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

/// A quorum member's Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey(pub [u8; 32]);

impl MemberKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes =
            hex::decode(s).map_err(|e| CoreError::Validation(format!("member key: {}", e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Validation("member key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// Verify a hex-encoded signature over a message.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> Result<(), String> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| "invalid public key".to_string())?;
        let bytes = hex::decode(signature_hex).map_err(|e| format!("signature: {}", e))?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| "signature must be 64 bytes".to_string())?;
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&bytes))
            .map_err(|_| "signature does not verify".to_string())
    }
}

impl fmt::Debug for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberKey({}...)", &self.to_hex()[..8])
    }
}

/// An Ed25519 keypair, used for custodian key material and quorum signatures.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> MemberKey {
        MemberKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message, returning the signature as hex.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}
