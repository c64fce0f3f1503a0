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

use std::fmt::{Debug, Display};
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::burnchain::{PoxParameters, POX_THRESHOLD_STEPS_USTX};
use crate::consts::{CHAIN_ID_MAINNET, CHAIN_ID_TESTNET};
use crate::pox::PoxEngine;
use crate::types::StacksAddress;
use crate::util::secp256k1::{Secp256k1PrivateKey, Secp256k1PublicKey};

#[derive(thiserror::Error, Debug)]
/// An error occurred parsing the provided configuration
pub enum ConfigError {
    /// Error occurred reading config file
    #[error("{0}")]
    InvalidConfig(String),
    /// An error occurred parsing the TOML data
    #[error("{0}")]
    ParseError(String),
    /// A field was malformed
    #[error("identifier={0}, value={1}")]
    BadField(String, String),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The network whose defaults and chain id the ledger uses
pub enum Network {
    Mainnet,
    Testnet,
    /// Testnet defaults, for local test setups
    Mocknet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Mocknet => write!(f, "mocknet"),
        }
    }
}

impl Network {
    pub const fn is_mainnet(&self) -> bool {
        match self {
            Self::Mainnet => true,
            Self::Testnet | Self::Mocknet => false,
        }
    }

    pub fn default_pox_parameters(&self) -> PoxParameters {
        if self.is_mainnet() {
            PoxParameters::mainnet_default()
        } else {
            PoxParameters::testnet_default()
        }
    }
}

/// The `[burnchain]` table
#[derive(Deserialize, Debug)]
struct RawBurnchainConfig {
    pub first_burn_height: u64,
    pub prepare_cycle_length: u64,
    pub reward_cycle_length: u64,
    /// Defaults to the network's threshold
    pub stacking_threshold: Option<u64>,
}

/// Internal struct for loading up the config file
#[derive(Deserialize, Debug)]
struct RawConfigFile {
    /// The network to use. One of "mainnet", "testnet" or "mocknet".
    pub network: Network,
    /// An optional custom chain id
    pub chain_id: Option<u32>,
    /// Lowest stacking minimum in uSTX, whatever the liquid supply
    pub stacking_minimum_floor: Option<u64>,
    /// Hex-encoded signer private key, used to sign stacking authorizations
    pub signer_private_key: Option<String>,
    /// Burnchain parameters to configure the ledger with. Network defaults
    /// apply when absent.
    pub burnchain: Option<RawBurnchainConfig>,
}

impl RawConfigFile {
    /// load the config from a string
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(data).map_err(|e| ConfigError::ParseError(format!("{e:?}")))?;
        Ok(config)
    }
}

impl TryFrom<&PathBuf> for RawConfigFile {
    type Error = ConfigError;

    fn try_from(path: &PathBuf) -> Result<Self, Self::Error> {
        Self::load_from_str(&fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidConfig(format!("failed to read config file: {e:?}"))
        })?)
    }
}

/// Ledger configuration, validated
#[derive(Clone)]
pub struct Config {
    pub network: Network,
    pub chain_id: Option<u32>,
    /// Parameters to configure at startup, if any
    pub burnchain: Option<PoxParameters>,
    pub stacking_minimum_floor: u128,
    pub signer_private_key: Option<Secp256k1PrivateKey>,
}

impl TryFrom<RawConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(raw_data: RawConfigFile) -> Result<Self, Self::Error> {
        let signer_private_key = raw_data
            .signer_private_key
            .as_deref()
            .map(Secp256k1PrivateKey::from_hex)
            .transpose()
            .map_err(|e| ConfigError::BadField("signer_private_key".to_string(), e.into()))?;

        let burnchain = match raw_data.burnchain {
            Some(raw) => {
                let stacking_threshold = raw
                    .stacking_threshold
                    .map(u128::from)
                    .unwrap_or(raw_data.network.default_pox_parameters().stacking_threshold);
                let params = PoxParameters::new(
                    raw.first_burn_height.into(),
                    raw.prepare_cycle_length.into(),
                    raw.reward_cycle_length.into(),
                    stacking_threshold,
                )
                .map_err(|e| ConfigError::BadField("burnchain".to_string(), e.to_string()))?;
                Some(params)
            }
            None => None,
        };

        Ok(Self {
            network: raw_data.network,
            chain_id: raw_data.chain_id,
            burnchain,
            stacking_minimum_floor: raw_data
                .stacking_minimum_floor
                .map(u128::from)
                .unwrap_or(POX_THRESHOLD_STEPS_USTX),
            signer_private_key,
        })
    }
}

impl TryFrom<&PathBuf> for Config {
    type Error = ConfigError;
    fn try_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let config_file = RawConfigFile::try_from(path)?;
        Self::try_from(config_file)
    }
}

impl Config {
    /// load the config from a string and parse it
    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        RawConfigFile::load_from_str(data)?.try_into()
    }

    /// load the config from a file and parse it
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        Self::try_from(&PathBuf::from(path))
    }

    /// Get the chain ID for the network
    pub fn to_chain_id(&self) -> u32 {
        self.chain_id.unwrap_or(match self.network {
            Network::Mainnet => CHAIN_ID_MAINNET,
            Network::Testnet | Network::Mocknet => CHAIN_ID_TESTNET,
        })
    }

    /// The burnchain parameters the engine runs with
    pub fn pox_parameters(&self) -> PoxParameters {
        self.burnchain
            .unwrap_or_else(|| self.network.default_pox_parameters())
    }

    /// The principal controlled by the signer key, if one is configured
    pub fn signer_address(&self) -> Option<StacksAddress> {
        self.signer_private_key.as_ref().map(|privk| {
            StacksAddress::p2pkh(
                self.network.is_mainnet(),
                &Secp256k1PublicKey::from_private(privk),
            )
        })
    }

    /// Build a ledger for this configuration
    pub fn make_engine(&self) -> Result<PoxEngine, ConfigError> {
        let mut engine = PoxEngine::new(self.network.is_mainnet(), self.to_chain_id())
            .with_stacking_minimum_floor(self.stacking_minimum_floor);
        if let Some(params) = self.burnchain.as_ref() {
            engine
                .set_burnchain_parameters(
                    params.first_burnchain_block_height,
                    params.prepare_cycle_length,
                    params.reward_cycle_length,
                    params.stacking_threshold,
                )
                .map_err(|e| ConfigError::BadField("burnchain".to_string(), e.to_string()))?;
        }
        Ok(engine)
    }

    /// Return a string with non-sensitive configuration
    /// information for logging purposes
    pub fn config_to_log_string(&self) -> String {
        let params = self.pox_parameters();
        let signer_public_key = match self.signer_private_key.as_ref() {
            Some(privk) => Secp256k1PublicKey::from_private(privk).to_hex(),
            None => "None".to_string(),
        };
        let signer_address = match self.signer_address() {
            Some(addr) => addr.to_string(),
            None => "None".to_string(),
        };
        let chain_id = format!("{:x}", self.to_chain_id());
        format!(
            r#"
Network: {network}
Chain ID: 0x{chain_id}
First burn height: {first_burn_height}
Reward cycle length: {reward_cycle_length}
Prepare cycle length: {prepare_cycle_length}
Stacking threshold: {stacking_threshold}
Stacking minimum floor: {stacking_minimum_floor}
Signer public key: {signer_public_key}
Signer address: {signer_address}
"#,
            network = self.network,
            first_burn_height = params.first_burnchain_block_height,
            reward_cycle_length = params.reward_cycle_length,
            prepare_cycle_length = params.prepare_cycle_length,
            stacking_threshold = params.stacking_threshold,
            stacking_minimum_floor = self.stacking_minimum_floor,
        )
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.config_to_log_string())
    }
}
