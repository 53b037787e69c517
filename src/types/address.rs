use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Number of leading zero bytes that mark a smart-contract address.
pub const SC_ADDRESS_ZERO_PREFIX: usize = 8;

/// 32-byte account identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Contract addresses carry an all-zero prefix; user accounts do not.
    pub fn is_smart_contract(&self) -> bool {
        self.0[..SC_ADDRESS_ZERO_PREFIX].iter().all(|b| *b == 0)
    }

    /// Deterministic contract address derived from the creator and its nonce.
    ///
    /// The creator's last two bytes are kept so the new contract lands in the
    /// creator's shard.
    pub fn derive_contract(creator: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(creator.0);
        hasher.update(nonce.to_be_bytes());
        let digest = hasher.finalize();

        let mut out = [0u8; 32];
        out[SC_ADDRESS_ZERO_PREFIX..30].copy_from_slice(&digest[..30 - SC_ADDRESS_ZERO_PREFIX]);
        out[30..].copy_from_slice(&creator.0[30..]);
        Self(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
        Address::from_slice(&raw).ok_or_else(|| format!("address must be 32 bytes, got {}", raw.len()))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
