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

//! Reward (PoX) addresses, as the `(version, hashbytes)` pair the ledger
//! receives after the burnchain address has been decoded.

use std::fmt;

use crate::errors::PoxError;
use crate::util::hash::to_hex;

/// Legacy pay-to-pubkey-hash
pub const ADDRESS_VERSION_P2PKH: u8 = 0x00;
/// Legacy pay-to-script-hash
pub const ADDRESS_VERSION_P2SH: u8 = 0x01;
/// Segwit P2WPKH wrapped in P2SH
pub const ADDRESS_VERSION_P2SH_P2WPKH: u8 = 0x02;
/// Segwit P2WSH wrapped in P2SH
pub const ADDRESS_VERSION_P2SH_P2WSH: u8 = 0x03;
/// Native segwit v0 key hash
pub const ADDRESS_VERSION_P2WPKH: u8 = 0x04;
/// Native segwit v0 script hash
pub const ADDRESS_VERSION_P2WSH: u8 = 0x05;
/// Native segwit v1 (taproot)
pub const ADDRESS_VERSION_P2TR: u8 = 0x06;

/// Highest version whose hashbytes are 20 bytes long
pub const MAX_ADDRESS_VERSION_BUFF_20: u8 = ADDRESS_VERSION_P2WPKH;
/// Highest supported version; versions above `MAX_ADDRESS_VERSION_BUFF_20` carry 32 bytes
pub const MAX_ADDRESS_VERSION_BUFF_32: u8 = ADDRESS_VERSION_P2TR;
/// Longest hashbytes buffer a PoX address may carry
pub const MAX_HASHBYTES_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoxAddress {
    pub version: u8,
    pub hashbytes: Vec<u8>,
}

impl PoxAddress {
    pub fn new(version: u8, hashbytes: Vec<u8>) -> PoxAddress {
        PoxAddress { version, hashbytes }
    }

    /// The address that burns its rewards: a P2PKH of twenty zero bytes
    pub fn standard_burn_address() -> PoxAddress {
        PoxAddress::new(ADDRESS_VERSION_P2PKH, vec![0u8; 20])
    }

    /// Check this address against the supported encodings
    pub fn validate(&self) -> Result<(), PoxError> {
        if !check_pox_addr_version(self.version) {
            return Err(PoxError::InvalidPoxAddress);
        }
        if !check_pox_addr_hashbytes(self.version, &self.hashbytes) {
            return Err(PoxError::InvalidPoxAddress);
        }
        Ok(())
    }

    /// Bytes used to order and aggregate addresses in a reward set
    pub fn to_burnchain_repr(&self) -> String {
        format!("{:02x}{}", self.version, to_hex(&self.hashbytes))
    }
}

impl fmt::Display for PoxAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{version: {:02x}, hashbytes: {}}}", self.version, to_hex(&self.hashbytes))
    }
}

impl fmt::Debug for PoxAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Is the address version byte one of the supported encodings?
pub fn check_pox_addr_version(version: u8) -> bool {
    version <= MAX_ADDRESS_VERSION_BUFF_32
}

/// Are the hashbytes the right length for the version?
pub fn check_pox_addr_hashbytes(version: u8, hashbytes: &[u8]) -> bool {
    if version <= MAX_ADDRESS_VERSION_BUFF_20 {
        hashbytes.len() == 20
    } else if version <= MAX_ADDRESS_VERSION_BUFF_32 {
        hashbytes.len() == 32
    } else {
        false
    }
}

/// Validate a `(version, hashbytes)` pair, failing with `InvalidPoxAddress`.
pub fn validate_pox_address(addr: &PoxAddress) -> Result<(), PoxError> {
    addr.validate()
}
