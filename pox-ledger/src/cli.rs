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
use std::path::PathBuf;

use clap::builder::PossibleValue;
use clap::{ArgAction, Parser, ValueEnum};

use crate::address::PoxAddress;
use crate::signed_structured_data::pox4::{
    make_pox_4_signer_key_message_hash, make_pox_4_signer_key_signature, Pox4SignatureTopic,
};
use crate::signed_structured_data::StructuredDataError;
use crate::types::StacksPublicKeyBuffer;
use crate::util::hash::{hex_bytes, Sha256Sum};
use crate::util::secp256k1::{MessageSignature, Secp256k1PrivateKey, Secp256k1PublicKey};

#[derive(Parser, Debug)]
#[command(author, version, about)]
/// The CLI arguments for the PoX ledger
pub struct Cli {
    /// Subcommand action to take
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands for the PoX ledger CLI
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Generate a signature authorizing a stacking call
    GenerateStackingSignature(GenerateStackingSignatureArgs),
    /// Print the message hash a signer key must sign for a stacking call
    MessageHash(MessageHashArgs),
    /// Map a burn block height to its reward cycle
    RewardCycle(RewardCycleArgs),
    /// Validate the config and output it
    CheckConfig(ConfigArgs),
}

/// Arguments for commands that only need the config
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to config file
    #[arg(long, short, value_name = "FILE")]
    pub config: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
/// Wrapper around `Pox4SignatureTopic` to implement `ValueEnum`
pub struct StackingSignatureMethod(Pox4SignatureTopic);

impl StackingSignatureMethod {
    /// Get the inner `Pox4SignatureTopic`
    pub const fn topic(&self) -> &Pox4SignatureTopic {
        &self.0
    }
}

impl From<Pox4SignatureTopic> for StackingSignatureMethod {
    fn from(topic: Pox4SignatureTopic) -> Self {
        Self(topic)
    }
}

impl ValueEnum for StackingSignatureMethod {
    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(self.0.get_name_str()))
    }

    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self(Pox4SignatureTopic::StackStx),
            Self(Pox4SignatureTopic::StackExtend),
            Self(Pox4SignatureTopic::StackIncrease),
            Self(Pox4SignatureTopic::AggregationIncrease),
            Self(Pox4SignatureTopic::AggregationCommit),
        ]
    }

    fn from_str(input: &str, _ignore_case: bool) -> Result<Self, String> {
        let topic = match input {
            "stack-stx" => Pox4SignatureTopic::StackStx,
            "stack-extend" => Pox4SignatureTopic::StackExtend,
            "stack-increase" => Pox4SignatureTopic::StackIncrease,
            "aggregation-increase" | "agg-increase" => Pox4SignatureTopic::AggregationIncrease,
            "aggregation-commit" | "agg-commit" => Pox4SignatureTopic::AggregationCommit,
            _ => return Err(format!("Invalid topic: {input}")),
        };
        Ok(topic.into())
    }
}

/// Fields shared by every signer authorization
#[derive(clap::Args, Debug, Clone)]
pub struct AuthorizationArgs {
    /// BTC address used to receive rewards, as `<version>:<hex hashbytes>`
    #[arg(short, long, value_parser = parse_pox_addr)]
    pub pox_address: PoxAddress,
    /// The reward cycle during which this signature is used
    #[arg(short, long)]
    pub reward_cycle: u128,
    /// Stacking method that can be used
    #[arg(short, long)]
    pub method: StackingSignatureMethod,
    /// Number of cycles used as a lock period.
    /// Use `1` for stack-aggregation-commit and stack-aggregation-increase.
    #[arg(long)]
    pub period: u128,
    /// The max amount of uSTX that can be used in this unique transaction
    #[arg(long)]
    pub max_amount: u128,
    /// A unique identifier to prevent re-using this authorization
    #[arg(long)]
    pub auth_id: u128,
}

#[derive(Parser, Debug, Clone)]
/// Arguments for the generate-stacking-signature command
pub struct GenerateStackingSignatureArgs {
    #[command(flatten)]
    pub auth: AuthorizationArgs,
    /// Path to config file holding the signer private key
    #[arg(long, short, value_name = "FILE")]
    pub config: PathBuf,
    /// Output information in JSON format
    #[arg(long, action=ArgAction::SetTrue, required=false)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
/// Arguments for the message-hash command
pub struct MessageHashArgs {
    #[command(flatten)]
    pub auth: AuthorizationArgs,
    /// Chain id of the domain the hash is bound to
    #[arg(long, value_parser = parse_chain_id, default_value = "0x80000000")]
    pub chain_id: u32,
}

#[derive(Parser, Debug, Clone)]
/// Arguments for the reward-cycle command
pub struct RewardCycleArgs {
    /// Path to config file
    #[arg(long, short, value_name = "FILE")]
    pub config: PathBuf,
    /// The burn block height to look up
    #[arg(long)]
    pub burn_height: u128,
}

/// A signer authorization, ready to print
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackingSignatureOutput {
    pub signer_key: String,
    pub signer_signature: String,
    pub auth_id: String,
    pub reward_cycle: String,
    pub period: String,
    pub max_amount: String,
    pub pox_address: String,
    pub method: String,
}

impl AuthorizationArgs {
    /// The message a signer key signs to authorize this call
    pub fn message_hash(&self, chain_id: u32) -> Result<Sha256Sum, StructuredDataError> {
        make_pox_4_signer_key_message_hash(
            &self.pox_address,
            self.reward_cycle,
            self.method.topic(),
            chain_id,
            self.period,
            self.max_amount,
            self.auth_id,
        )
    }

    /// Sign this authorization with the given key
    pub fn sign(
        &self,
        private_key: &Secp256k1PrivateKey,
        chain_id: u32,
    ) -> Result<StackingSignatureOutput, StructuredDataError> {
        let signature: MessageSignature = make_pox_4_signer_key_signature(
            &self.pox_address,
            private_key,
            self.reward_cycle,
            self.method.topic(),
            chain_id,
            self.period,
            self.max_amount,
            self.auth_id,
        )?;
        let public_key = Secp256k1PublicKey::from_private(private_key);
        Ok(StackingSignatureOutput {
            signer_key: StacksPublicKeyBuffer::from_public_key(&public_key).to_hex(),
            signer_signature: signature.to_hex(),
            auth_id: self.auth_id.to_string(),
            reward_cycle: self.reward_cycle.to_string(),
            period: self.period.to_string(),
            max_amount: self.max_amount.to_string(),
            pox_address: self.pox_address.to_string(),
            method: self.method.topic().get_name(),
        })
    }
}

/// Parse a PoX address given as `<version>:<hex hashbytes>`
pub fn parse_pox_addr(pox_address_literal: &str) -> Result<PoxAddress, String> {
    let (version, hashbytes) = pox_address_literal
        .split_once(':')
        .ok_or_else(|| format!("Expected <version>:<hashbytes>, got {pox_address_literal}"))?;
    let version = parse_u8(version)?;
    let hashbytes = hex_bytes(hashbytes).map_err(|e| format!("Invalid hashbytes: {e}"))?;
    let pox_addr = PoxAddress::new(version, hashbytes);
    pox_addr
        .validate()
        .map_err(|e| format!("Invalid PoX address {pox_address_literal}: {e}"))?;
    Ok(pox_addr)
}

fn parse_u8(input: &str) -> Result<u8, String> {
    match input.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    }
    .map_err(|e| format!("Invalid address version {input}: {e}"))
}

/// Parse a chain id, in decimal or `0x`-prefixed hex
pub fn parse_chain_id(chain_id: &str) -> Result<u32, String> {
    match chain_id.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => chain_id.parse(),
    }
    .map_err(|e| format!("Invalid chain id {chain_id}: {e}"))
}
