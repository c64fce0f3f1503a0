// Copyright (C) 2013-2020 Blockstack PBC, a public benefit corporation
// Copyright (C) 2020-2021 Stacks Open Internet Foundation
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

use std::collections::BTreeMap;

use crate::address::{PoxAddress, MAX_HASHBYTES_LEN};
use crate::errors::PoxError;
use crate::util::hash::Sha256Sum;
use crate::util::secp256k1::{MessageSignature, Secp256k1Error, Secp256k1PrivateKey};

/// Message prefix for signed structured data. "SIP018" in ascii
pub const STRUCTURED_DATA_PREFIX: [u8; 6] = [0x53, 0x49, 0x50, 0x30, 0x31, 0x38];

const TYPE_PREFIX_UINT: u8 = 0x01;
const TYPE_PREFIX_BUFFER: u8 = 0x02;
const TYPE_PREFIX_TUPLE: u8 = 0x0c;
const TYPE_PREFIX_STRING_ASCII: u8 = 0x0d;

/// Longest buffer a structured-data value may carry
pub const MAX_BUFFER_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuredDataError {
    #[error("string is not printable ascii: {0}")]
    NotAscii(String),
    #[error("buffer of {0} bytes is too long")]
    BufferTooLong(usize),
    #[error("tuple field name is too long: {0}")]
    BadFieldName(String),
    #[error("signing failed: {0}")]
    Signing(#[from] Secp256k1Error),
}

impl From<StructuredDataError> for PoxError {
    fn from(e: StructuredDataError) -> PoxError {
        match e {
            StructuredDataError::BufferTooLong(_) => PoxError::InvalidPoxAddress,
            StructuredDataError::NotAscii(_) | StructuredDataError::BadFieldName(_) => {
                PoxError::Unreachable
            }
            StructuredDataError::Signing(_) => PoxError::InvalidSignatureRecover,
        }
    }
}

/// The subset of Clarity values that signed structured data is built from,
/// with their consensus serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredValue {
    UInt(u128),
    Buffer(Vec<u8>),
    StringAscii(Vec<u8>),
    Tuple(BTreeMap<String, StructuredValue>),
}

impl StructuredValue {
    pub fn string_ascii_from_bytes(bytes: Vec<u8>) -> Result<StructuredValue, StructuredDataError> {
        if !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(StructuredDataError::NotAscii(
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        Ok(StructuredValue::StringAscii(bytes))
    }

    pub fn buff_from(bytes: Vec<u8>) -> Result<StructuredValue, StructuredDataError> {
        if bytes.len() > MAX_BUFFER_LEN {
            return Err(StructuredDataError::BufferTooLong(bytes.len()));
        }
        Ok(StructuredValue::Buffer(bytes))
    }

    /// Fields are kept sorted by name, which is the order they serialize in
    pub fn tuple_from_data(
        data: Vec<(&str, StructuredValue)>,
    ) -> Result<StructuredValue, StructuredDataError> {
        let mut fields = BTreeMap::new();
        for (name, value) in data.into_iter() {
            if name.is_empty() || name.len() > 128 {
                return Err(StructuredDataError::BadFieldName(name.to_string()));
            }
            fields.insert(name.to_string(), value);
        }
        Ok(StructuredValue::Tuple(fields))
    }

    pub fn serialize_write(&self, w: &mut Vec<u8>) {
        match self {
            StructuredValue::UInt(value) => {
                w.push(TYPE_PREFIX_UINT);
                w.extend_from_slice(&value.to_be_bytes());
            }
            StructuredValue::Buffer(bytes) => {
                w.push(TYPE_PREFIX_BUFFER);
                // buffer and string lengths are bounded well below u32::MAX on construction
                w.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                w.extend_from_slice(bytes);
            }
            StructuredValue::StringAscii(bytes) => {
                w.push(TYPE_PREFIX_STRING_ASCII);
                w.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                w.extend_from_slice(bytes);
            }
            StructuredValue::Tuple(fields) => {
                w.push(TYPE_PREFIX_TUPLE);
                w.extend_from_slice(&(fields.len() as u32).to_be_bytes());
                for (name, value) in fields.iter() {
                    w.push(name.len() as u8);
                    w.extend_from_slice(name.as_bytes());
                    value.serialize_write(w);
                }
            }
        }
    }

    pub fn serialize_to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![];
        self.serialize_write(&mut bytes);
        bytes
    }
}

impl PoxAddress {
    /// The `{ hashbytes, version }` tuple this address is signed over
    pub fn as_structured_tuple(&self) -> Result<StructuredValue, StructuredDataError> {
        if self.hashbytes.len() > MAX_HASHBYTES_LEN {
            return Err(StructuredDataError::BufferTooLong(self.hashbytes.len()));
        }
        StructuredValue::tuple_from_data(vec![
            ("hashbytes", StructuredValue::buff_from(self.hashbytes.clone())?),
            ("version", StructuredValue::buff_from(vec![self.version])?),
        ])
    }
}

pub fn structured_data_hash(value: &StructuredValue) -> Sha256Sum {
    Sha256Sum::from_data(&value.serialize_to_vec())
}

/// Generate a message hash for signing structured data.
/// Reference [SIP018](https://github.com/stacksgov/sips/blob/main/sips/sip-018/sip-018-signed-structured-data.md) for more information.
pub fn structured_data_message_hash(
    structured_data: &StructuredValue,
    domain: &StructuredValue,
) -> Sha256Sum {
    let message = [
        STRUCTURED_DATA_PREFIX.as_ref(),
        structured_data_hash(domain).as_bytes(),
        structured_data_hash(structured_data).as_bytes(),
    ]
    .concat();

    Sha256Sum::from_data(&message)
}

/// Sign structured data with a given private key.
pub fn sign_structured_data(
    structured_data: &StructuredValue,
    domain: &StructuredValue,
    private_key: &Secp256k1PrivateKey,
) -> Result<MessageSignature, StructuredDataError> {
    let msg_hash = structured_data_message_hash(structured_data, domain);
    Ok(private_key.sign(msg_hash.as_bytes())?)
}

// Helper function to generate domain for structured data hash
pub fn make_structured_data_domain(
    name: &str,
    version: &str,
    chain_id: u32,
) -> Result<StructuredValue, StructuredDataError> {
    StructuredValue::tuple_from_data(vec![
        (
            "name",
            StructuredValue::string_ascii_from_bytes(name.into())?,
        ),
        (
            "version",
            StructuredValue::string_ascii_from_bytes(version.into())?,
        ),
        ("chain-id", StructuredValue::UInt(chain_id.into())),
    ])
}

pub mod pox4 {
    use super::{
        make_structured_data_domain, structured_data_message_hash, MessageSignature, PoxAddress,
        Secp256k1PrivateKey, Sha256Sum, StructuredDataError, StructuredValue,
    };

    define_named_enum!(Pox4SignatureTopic {
        StackStx("stack-stx"),
        AggregationCommit("agg-commit"),
        AggregationIncrease("agg-increase"),
        StackExtend("stack-extend"),
        StackIncrease("stack-increase"),
    });

    pub const POX_4_SIGNER_DOMAIN_NAME: &str = "pox-4-signer";
    pub const POX_4_SIGNER_DOMAIN_VERSION: &str = "1.0.0";

    pub fn make_pox_4_signed_data_domain(
        chain_id: u32,
    ) -> Result<StructuredValue, StructuredDataError> {
        make_structured_data_domain(
            POX_4_SIGNER_DOMAIN_NAME,
            POX_4_SIGNER_DOMAIN_VERSION,
            chain_id,
        )
    }

    pub fn make_pox_4_signer_key_message_hash(
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: &Pox4SignatureTopic,
        chain_id: u32,
        period: u128,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<Sha256Sum, StructuredDataError> {
        let domain_tuple = make_pox_4_signed_data_domain(chain_id)?;
        let data_tuple = StructuredValue::tuple_from_data(vec![
            ("pox-addr", pox_addr.as_structured_tuple()?),
            ("reward-cycle", StructuredValue::UInt(reward_cycle)),
            ("period", StructuredValue::UInt(period)),
            (
                "topic",
                StructuredValue::string_ascii_from_bytes(topic.get_name_str().into())?,
            ),
            ("auth-id", StructuredValue::UInt(auth_id)),
            ("max-amount", StructuredValue::UInt(max_amount)),
        ])?;
        Ok(structured_data_message_hash(&data_tuple, &domain_tuple))
    }

    pub fn make_pox_4_signer_key_signature(
        pox_addr: &PoxAddress,
        signer_key: &Secp256k1PrivateKey,
        reward_cycle: u128,
        topic: &Pox4SignatureTopic,
        chain_id: u32,
        period: u128,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<MessageSignature, StructuredDataError> {
        let msg_hash = make_pox_4_signer_key_message_hash(
            pox_addr,
            reward_cycle,
            topic,
            chain_id,
            period,
            max_amount,
            auth_id,
        )?;
        Ok(signer_key.sign(msg_hash.as_bytes())?)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::consts::{CHAIN_ID_MAINNET, CHAIN_ID_TESTNET};
        use crate::util::hash::to_hex;
        use crate::util::secp256k1::Secp256k1PublicKey;

        #[test]
        /// Fixture message hash to test against in other libraries
        fn test_sig_hash_fixture() {
            let fixture = "ec5b88aa81a96a6983c26cdba537a13d253425348ffc0ba6b07130869b025a2d";
            let pox_addr = PoxAddress::standard_burn_address();
            let reward_cycle: u128 = 1;
            let lock_period = 12;
            let auth_id = 111;
            let max_amount = u128::MAX;

            let message_hash = make_pox_4_signer_key_message_hash(
                &pox_addr,
                reward_cycle,
                &Pox4SignatureTopic::StackStx,
                CHAIN_ID_TESTNET,
                lock_period,
                max_amount,
                auth_id,
            )
            .unwrap();

            assert_eq!(to_hex(message_hash.as_bytes()), fixture);
        }

        #[test]
        fn every_field_changes_the_hash() {
            let pox_addr = PoxAddress::standard_burn_address();
            let hash = |addr: &PoxAddress, cycle, topic, chain_id, period, max, auth| {
                make_pox_4_signer_key_message_hash(addr, cycle, &topic, chain_id, period, max, auth)
                    .unwrap()
            };
            let expected = hash(
                &pox_addr,
                1,
                Pox4SignatureTopic::StackStx,
                CHAIN_ID_TESTNET,
                12,
                u128::MAX,
                111,
            );

            let other_addr = PoxAddress::new(0, vec![1u8; 20]);
            assert_ne!(
                expected,
                hash(&other_addr, 1, Pox4SignatureTopic::StackStx, CHAIN_ID_TESTNET, 12, u128::MAX, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 0, Pox4SignatureTopic::StackStx, CHAIN_ID_TESTNET, 12, u128::MAX, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 1, Pox4SignatureTopic::AggregationCommit, CHAIN_ID_TESTNET, 12, u128::MAX, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 1, Pox4SignatureTopic::StackStx, CHAIN_ID_MAINNET, 12, u128::MAX, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 1, Pox4SignatureTopic::StackStx, CHAIN_ID_TESTNET, 0, u128::MAX, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 1, Pox4SignatureTopic::StackStx, CHAIN_ID_TESTNET, 12, 1010101, 111)
            );
            assert_ne!(
                expected,
                hash(&pox_addr, 1, Pox4SignatureTopic::StackStx, CHAIN_ID_TESTNET, 12, u128::MAX, 10101)
            );
        }

        #[test]
        fn signature_recovers_to_signer() {
            let privk = Secp256k1PrivateKey::from_seed(&[9, 9, 9]);
            let pubk = Secp256k1PublicKey::from_private(&privk);
            let pox_addr = PoxAddress::new(6, vec![0x42; 32]);
            let sig = make_pox_4_signer_key_signature(
                &pox_addr,
                &privk,
                3,
                &Pox4SignatureTopic::StackExtend,
                CHAIN_ID_TESTNET,
                2,
                5_000,
                7,
            )
            .unwrap();
            let msg = make_pox_4_signer_key_message_hash(
                &pox_addr,
                3,
                &Pox4SignatureTopic::StackExtend,
                CHAIN_ID_TESTNET,
                2,
                5_000,
                7,
            )
            .unwrap();
            assert_eq!(
                Secp256k1PublicKey::recover_to_pubkey(msg.as_bytes(), &sig).unwrap(),
                pubk
            );
        }

        #[test]
        fn topic_names() {
            assert_eq!(
                Pox4SignatureTopic::lookup_by_name("agg-increase"),
                Some(Pox4SignatureTopic::AggregationIncrease)
            );
            assert_eq!(Pox4SignatureTopic::lookup_by_name("stack-aggregation"), None);
            assert_eq!(Pox4SignatureTopic::StackIncrease.to_string(), "stack-increase");
            assert_eq!(Pox4SignatureTopic::ALL.len(), 5);
        }

        #[test]
        fn oversized_pox_addr_is_rejected() {
            let pox_addr = PoxAddress::new(6, vec![0x42; 33]);
            assert_eq!(
                make_pox_4_signer_key_message_hash(
                    &pox_addr,
                    1,
                    &Pox4SignatureTopic::StackStx,
                    CHAIN_ID_TESTNET,
                    1,
                    1,
                    1
                ),
                Err(StructuredDataError::BufferTooLong(33))
            );
        }
    }
}
