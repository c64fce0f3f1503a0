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

use std::fmt::Write;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::util::HexError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash160(pub [u8; 20]);
impl_byte_array_hex!(Hash160, 20);
pub const HASH160_ENCODED_SIZE: u32 = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sha256Sum(pub [u8; 32]);
impl_byte_array_hex!(Sha256Sum, 32);

impl Hash160 {
    pub fn from_sha256(sha256_hash: &[u8; 32]) -> Hash160 {
        let mut rmd = Ripemd160::new();
        let mut ret = [0u8; 20];
        rmd.update(sha256_hash);
        ret.copy_from_slice(rmd.finalize().as_slice());
        Hash160(ret)
    }

    /// Create a hash by hashing some data
    /// (borrwed from Andrew Poelstra)
    pub fn from_data(data: &[u8]) -> Hash160 {
        let sha2_result = Sha256::digest(data);
        let mut ret = [0u8; 20];
        ret.copy_from_slice(Ripemd160::digest(sha2_result.as_slice()).as_slice());
        Hash160(ret)
    }
}

impl Sha256Sum {
    pub fn from_data(data: &[u8]) -> Sha256Sum {
        let mut ret = [0u8; 32];
        ret.copy_from_slice(Sha256::digest(data).as_slice());
        Sha256Sum(ret)
    }

    pub fn zero() -> Sha256Sum {
        Sha256Sum([0u8; 32])
    }
}

/// Convert a hex string to a byte array
pub fn hex_bytes(s: &str) -> Result<Vec<u8>, HexError> {
    if s.len() % 2 != 0 {
        return Err(HexError::BadLength(s.len()));
    }
    let chars: Vec<char> = s.chars().collect();
    let mut v = Vec::with_capacity(chars.len() / 2);
    for pair in chars.chunks(2) {
        let hi = pair[0].to_digit(16).ok_or(HexError::BadCharacter(pair[0]))?;
        let lo = pair[1].to_digit(16).ok_or(HexError::BadCharacter(pair[1]))?;
        v.push((hi * 0x10 + lo) as u8);
    }
    Ok(v)
}

/// Convert a slice of u8 to a hex string
pub fn to_hex(s: &[u8]) -> String {
    let mut r = String::with_capacity(s.len() * 2);
    for b in s.iter() {
        // writing into a String cannot fail
        let _ = write!(r, "{:02x}", b);
    }
    r
}
