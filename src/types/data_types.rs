/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number that uniquely identifies a replica within the fixed membership of a replica set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct ReplicaID(u32);

impl ReplicaID {
    /// Create a new `ReplicaID` with an `int` value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the `u32` value of this `ReplicaID`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ReplicaID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// View number. Starts at 0 for the genesis block, and every view after that has exactly one
/// designated leader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the view number of the genesis block.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the `u64` value of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the 32-byte subject that replicas sign when they give up on this view: the little-endian
    /// bytes of the view number followed by zeroes.
    pub fn to_hash(&self) -> CryptoHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&self.0.to_le_bytes());
        CryptoHash::new(bytes)
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;
    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber::new(self.0.saturating_add(rhs))
    }
}

impl AddAssign<u64> for ViewNumber {
    fn add_assign(&mut self, rhs: u64) {
        self.0 = self.0.saturating_add(rhs)
    }
}

impl Sub<ViewNumber> for ViewNumber {
    type Output = u64;
    fn sub(self, rhs: ViewNumber) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// 32-byte cryptographic hash.
///
/// Block hashes are always SHA256 hashes; see [`Block::hash`](super::block::Block::hash).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the all-zero hash, used as the parent of the genesis block.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ed25519 digital signature.
///
/// Within this crate these are produced by [`Ed25519Crypto`](crate::crypto::ed25519::Ed25519Crypto),
/// but any [`Signer`](crate::crypto::Signer) that produces 64-byte signatures can be plugged in.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0[..8].fmt(f)
    }
}

/// One client request, carried in a block as an opaque byte sequence.
///
/// An empty `Command` means "no payload": leaders propose it when their
/// [`CommandQueue`](crate::app::CommandQueue) has nothing to offer, and dummy blocks always carry it.
/// Empty commands are never handed to the [`Executor`](crate::app::Executor).
#[derive(Clone, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Command(Vec<u8>);

impl Command {
    /// Create a new `Command` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create a `Command` with no payload.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Get a reference to the inner bytes of this `Command`.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check whether this `Command` carries no payload.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of bytes in this `Command`.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Command({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Command {
    fn from(value: Vec<u8>) -> Self {
        Command::new(value)
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Command::new(value.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_hash_is_injective_over_small_views() {
        let hashes: Vec<CryptoHash> = (0..64).map(|v| ViewNumber::new(v).to_hash()).collect();
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn view_arithmetic_saturates() {
        assert_eq!(ViewNumber::new(u64::MAX) + 1, ViewNumber::new(u64::MAX));
        assert_eq!(ViewNumber::new(3) - ViewNumber::new(5), 0);
        assert_eq!(ViewNumber::new(5) - ViewNumber::new(3), 2);
    }
}
