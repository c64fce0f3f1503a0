// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2024 Stacks Open Internet Foundation
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

use std::fmt;

use crate::consts::{C32_ADDRESS_VERSION_MAINNET_SINGLESIG, C32_ADDRESS_VERSION_TESTNET_SINGLESIG};
use crate::util::hash::Hash160;
use crate::util::secp256k1::Secp256k1PublicKey;

/// A 33-byte compressed secp256k1 public key, as carried in signer-key arguments.
/// The bytes are not guaranteed to encode a curve point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StacksPublicKeyBuffer(pub [u8; 33]);
impl_byte_array_hex!(StacksPublicKeyBuffer, 33);

impl StacksPublicKeyBuffer {
    pub fn from_public_key(pubkey: &Secp256k1PublicKey) -> StacksPublicKeyBuffer {
        StacksPublicKeyBuffer(pubkey.to_bytes_compressed())
    }

    /// Decode the buffer into a curve point, if it is one
    pub fn to_public_key(&self) -> Option<Secp256k1PublicKey> {
        Secp256k1PublicKey::from_slice(&self.0).ok()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StacksAddress {
    pub version: u8,
    pub bytes: Hash160,
}

impl StacksAddress {
    pub fn new(version: u8, bytes: Hash160) -> StacksAddress {
        StacksAddress { version, bytes }
    }

    /// Single-sig address controlled by the given compressed public key bytes
    pub fn p2pkh_from_buffer(mainnet: bool, pubkey: &StacksPublicKeyBuffer) -> StacksAddress {
        let version = if mainnet {
            C32_ADDRESS_VERSION_MAINNET_SINGLESIG
        } else {
            C32_ADDRESS_VERSION_TESTNET_SINGLESIG
        };
        StacksAddress {
            version,
            bytes: Hash160::from_data(&pubkey.0),
        }
    }

    pub fn p2pkh(mainnet: bool, pubkey: &Secp256k1PublicKey) -> StacksAddress {
        StacksAddress::p2pkh_from_buffer(mainnet, &StacksPublicKeyBuffer::from_public_key(pubkey))
    }
}

impl fmt::Display for StacksAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "S{:02x}{}", self.version, &self.bytes)
    }
}

impl fmt::Debug for StacksAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A transaction sender or contract caller: either a standard account, or a
/// contract deployed by one.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrincipalData {
    Standard(StacksAddress),
    Contract(StacksAddress, String),
}

impl PrincipalData {
    pub fn is_contract(&self) -> bool {
        matches!(self, PrincipalData::Contract(..))
    }
}

impl From<StacksAddress> for PrincipalData {
    fn from(addr: StacksAddress) -> PrincipalData {
        PrincipalData::Standard(addr)
    }
}

impl fmt::Display for PrincipalData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrincipalData::Standard(addr) => write!(f, "{}", addr),
            PrincipalData::Contract(issuer, name) => write!(f, "{}.{}", issuer, name),
        }
    }
}

impl fmt::Debug for PrincipalData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::secp256k1::Secp256k1PrivateKey;

    #[test]
    fn p2pkh_uses_network_version() {
        let pubkey = Secp256k1PublicKey::from_private(&Secp256k1PrivateKey::from_seed(&[7]));
        let mainnet = StacksAddress::p2pkh(true, &pubkey);
        let testnet = StacksAddress::p2pkh(false, &pubkey);
        assert_eq!(mainnet.version, C32_ADDRESS_VERSION_MAINNET_SINGLESIG);
        assert_eq!(testnet.version, C32_ADDRESS_VERSION_TESTNET_SINGLESIG);
        assert_eq!(mainnet.bytes, testnet.bytes);
        assert_eq!(
            mainnet.bytes,
            Hash160::from_data(&pubkey.to_bytes_compressed())
        );
    }

    #[test]
    fn principal_display() {
        let addr = StacksAddress::new(26, Hash160([0x11; 20]));
        let standard = PrincipalData::from(addr);
        let contract = PrincipalData::Contract(addr, "pool".into());
        assert_eq!(
            standard.to_string(),
            "S1a1111111111111111111111111111111111111111"
        );
        assert_eq!(
            contract.to_string(),
            "S1a1111111111111111111111111111111111111111.pool"
        );
        assert!(contract.is_contract());
        assert!(!standard.is_contract());
    }
}
