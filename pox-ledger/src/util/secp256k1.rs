// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2025 Stacks Open Internet Foundation
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{
    RecoveryId as K256RecoveryId, Signature as K256Signature, SigningKey as K256SigningKey,
    VerifyingKey as K256VerifyingKey,
};

use crate::util::hash::{hex_bytes, to_hex, Sha256Sum};

pub const MESSAGE_SIGNATURE_ENCODED_SIZE: usize = 65;
pub const COMPRESSED_PUBLIC_KEY_ENCODED_SIZE: usize = 33;

/// A recoverable ECDSA signature in RSV layout: 32 bytes `r`, 32 bytes `s`,
/// then the one-byte recovery id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSignature(pub [u8; 65]);
impl_byte_array_hex!(MessageSignature, 65);

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum Secp256k1Error {
    #[error("Invalid key")]
    InvalidKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid message")]
    InvalidMessage,
    #[error("Invalid recovery ID")]
    InvalidRecoveryId,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Recovery failed")]
    RecoveryFailed,
}

impl MessageSignature {
    /// Creates an "empty" signature (all zeros). Note this is not a valid signature.
    pub fn empty() -> MessageSignature {
        MessageSignature([0u8; 65])
    }

    fn from_parts(signature: &K256Signature, recovery_id: K256RecoveryId) -> MessageSignature {
        let mut ret_bytes = [0u8; 65];
        ret_bytes[..64].copy_from_slice(signature.to_bytes().as_slice());
        ret_bytes[64] = recovery_id.to_byte();
        MessageSignature(ret_bytes)
    }

    fn to_parts(&self) -> Result<(K256Signature, K256RecoveryId), Secp256k1Error> {
        let recovery_id =
            K256RecoveryId::from_byte(self.0[64]).ok_or(Secp256k1Error::InvalidRecoveryId)?;
        let signature =
            K256Signature::from_slice(&self.0[..64]).map_err(|_| Secp256k1Error::InvalidSignature)?;
        Ok((signature, recovery_id))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Secp256k1PublicKey {
    key: K256VerifyingKey,
}

#[derive(Debug, Clone)]
pub struct Secp256k1PrivateKey {
    key: K256SigningKey,
}

impl Secp256k1PublicKey {
    /// Creates a Secp256k1PublicKey from a hex string representation.
    pub fn from_hex(hex_string: &str) -> Result<Secp256k1PublicKey, &'static str> {
        let data = hex_bytes(hex_string).map_err(|_e| "Failed to decode hex public key")?;
        Secp256k1PublicKey::from_slice(&data[..]).map_err(|_e| "Invalid public key hex string")
    }

    /// Creates a Secp256k1PublicKey from a SEC1-encoded byte slice.
    pub fn from_slice(data: &[u8]) -> Result<Secp256k1PublicKey, &'static str> {
        let key = K256VerifyingKey::from_sec1_bytes(data)
            .map_err(|_| "Invalid public key: failed to decode point")?;
        Ok(Secp256k1PublicKey { key })
    }

    pub fn from_private(privk: &Secp256k1PrivateKey) -> Secp256k1PublicKey {
        Secp256k1PublicKey {
            key: *privk.key.verifying_key(),
        }
    }

    /// Converts the public key to its 33-byte compressed encoding.
    pub fn to_bytes_compressed(&self) -> [u8; 33] {
        let encoded_point = self.key.to_encoded_point(true);
        let mut ret = [0u8; 33];
        ret.copy_from_slice(encoded_point.as_bytes());
        ret
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.to_bytes_compressed())
    }

    /// Recovers the (compressed) public key which produced `sig` over the 32-byte `msg` hash.
    pub fn recover_to_pubkey(
        msg: &[u8],
        sig: &MessageSignature,
    ) -> Result<Secp256k1PublicKey, Secp256k1Error> {
        if msg.len() != 32 {
            return Err(Secp256k1Error::InvalidMessage);
        }
        let (signature, recovery_id) = sig.to_parts()?;
        let key = K256VerifyingKey::recover_from_prehash(msg, &signature, recovery_id)
            .map_err(|_| Secp256k1Error::RecoveryFailed)?;
        Ok(Secp256k1PublicKey { key })
    }
}

impl Secp256k1PrivateKey {
    /// Generates a new random private key.
    pub fn random() -> Secp256k1PrivateKey {
        Secp256k1PrivateKey {
            key: K256SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Creates a Secp256k1PrivateKey from seed bytes by repeatedly
    ///  SHA256 hashing the seed bytes until a private key is found.
    pub fn from_seed(seed: &[u8]) -> Secp256k1PrivateKey {
        let mut re_hashed_seed = Vec::from(seed);
        loop {
            if let Ok(sk) = Secp256k1PrivateKey::from_slice(&re_hashed_seed[..]) {
                return sk;
            }
            re_hashed_seed = Sha256Sum::from_data(&re_hashed_seed[..]).as_bytes().to_vec();
        }
    }

    pub fn from_hex(hex_string: &str) -> Result<Secp256k1PrivateKey, &'static str> {
        let data = hex_bytes(hex_string).map_err(|_e| "Failed to decode hex private key")?;
        Secp256k1PrivateKey::from_slice(&data[..]).map_err(|_e| "Invalid private key hex string")
    }

    /// Accepts 32 raw bytes, or 33 bytes ending in the 0x01 compressed-public-key marker.
    pub fn from_slice(data: &[u8]) -> Result<Secp256k1PrivateKey, &'static str> {
        if data.len() < 32 {
            return Err("Invalid private key: shorter than 32 bytes");
        }
        if data.len() > 33 {
            return Err("Invalid private key: greater than 33 bytes");
        }
        if data.len() == 33 && data[32] != 0x01 {
            return Err("Invalid private key: invalid compressed byte marker");
        }
        let key = K256SigningKey::from_slice(&data[0..32])
            .map_err(|_| "Invalid private key: failed to load")?;
        Ok(Secp256k1PrivateKey { key })
    }

    pub fn to_hex(&self) -> String {
        let mut bytes = self.key.to_bytes().to_vec();
        bytes.push(0x01);
        to_hex(&bytes)
    }

    /// Signs a 32-byte message hash, producing a recoverable RSV signature.
    pub fn sign(&self, data_hash: &[u8]) -> Result<MessageSignature, Secp256k1Error> {
        if data_hash.len() != 32 {
            return Err(Secp256k1Error::InvalidMessage);
        }

        let signature: K256Signature = self
            .key
            .sign_prehash(data_hash)
            .map_err(|_| Secp256k1Error::SigningFailed)?;

        // find the recovery id which yields our own public key
        for recovery_byte in 0..4 {
            let Some(recovery_id) = K256RecoveryId::from_byte(recovery_byte) else {
                continue;
            };
            if let Ok(recovered_key) =
                K256VerifyingKey::recover_from_prehash(data_hash, &signature, recovery_id)
            {
                if recovered_key == *self.key.verifying_key() {
                    return Ok(MessageSignature::from_parts(&signature, recovery_id));
                }
            }
        }

        Err(Secp256k1Error::SigningFailed)
    }
}

/// Recovers a compressed public key from a message hash and an RSV signature.
pub fn secp256k1_recover(
    message_arr: &[u8],
    serialized_signature_arr: &[u8],
) -> Result<[u8; 33], Secp256k1Error> {
    let signature = MessageSignature::from_bytes(serialized_signature_arr)
        .ok_or(Secp256k1Error::InvalidSignature)?;
    let pubkey = Secp256k1PublicKey::recover_to_pubkey(message_arr, &signature)?;
    Ok(pubkey.to_bytes_compressed())
}
