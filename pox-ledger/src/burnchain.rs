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

//! Burnchain parameters and reward-cycle arithmetic.
//!
//! Heights, cycles and amounts are all carried as `u128`, the width of the
//! unsigned integers the stacking contract operates on.

use crate::consts::MICROSTACKS_PER_STACKS;
use crate::errors::PoxError;

/// Shortest permitted lock, in reward cycles
pub const MIN_POX_REWARD_CYCLES: u128 = 1;
/// Longest permitted lock, in reward cycles
pub const MAX_POX_REWARD_CYCLES: u128 = 12;

/// The reward threshold never scales below 1/POX_MAXIMAL_SCALING of the liquid supply
pub const POX_MAXIMAL_SCALING: u128 = 4;
/// Reward thresholds are rounded up to a multiple of this many uSTX
pub const POX_THRESHOLD_STEPS_USTX: u128 = 10_000 * MICROSTACKS_PER_STACKS;
/// Reward outputs carried by each block commit during the reward phase
pub const OUTPUTS_PER_COMMIT: u128 = 2;

pub const STACKING_THRESHOLD_MAINNET: u128 = 20_000;
pub const STACKING_THRESHOLD_TESTNET: u128 = 8_000;

pub const POX_REWARD_CYCLE_LENGTH_MAINNET: u128 = 2_100;
pub const POX_PREPARE_CYCLE_LENGTH_MAINNET: u128 = 100;
pub const POX_REWARD_CYCLE_LENGTH_TESTNET: u128 = 1_050;
pub const POX_PREPARE_CYCLE_LENGTH_TESTNET: u128 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoxParameters {
    pub first_burnchain_block_height: u128,
    pub prepare_cycle_length: u128,
    pub reward_cycle_length: u128,
    /// The liquid supply is divided by this to get the stacking minimum
    pub stacking_threshold: u128,
}

impl PoxParameters {
    pub fn mainnet_default() -> PoxParameters {
        PoxParameters {
            first_burnchain_block_height: 0,
            prepare_cycle_length: POX_PREPARE_CYCLE_LENGTH_MAINNET,
            reward_cycle_length: POX_REWARD_CYCLE_LENGTH_MAINNET,
            stacking_threshold: STACKING_THRESHOLD_MAINNET,
        }
    }

    pub fn testnet_default() -> PoxParameters {
        PoxParameters {
            first_burnchain_block_height: 0,
            prepare_cycle_length: POX_PREPARE_CYCLE_LENGTH_TESTNET,
            reward_cycle_length: POX_REWARD_CYCLE_LENGTH_TESTNET,
            stacking_threshold: STACKING_THRESHOLD_TESTNET,
        }
    }

    pub fn new(
        first_burnchain_block_height: u128,
        prepare_cycle_length: u128,
        reward_cycle_length: u128,
        stacking_threshold: u128,
    ) -> Result<PoxParameters, PoxError> {
        let params = PoxParameters {
            first_burnchain_block_height,
            prepare_cycle_length,
            reward_cycle_length,
            stacking_threshold,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), PoxError> {
        if self.first_burnchain_block_height == 0
            || self.prepare_cycle_length == 0
            || self.reward_cycle_length == 0
            || self.stacking_threshold == 0
        {
            return Err(PoxError::InvalidParameters);
        }
        if self.reward_cycle_length <= self.prepare_cycle_length {
            return Err(PoxError::InvalidParameters);
        }
        Ok(())
    }

    /// Map a burn height to the reward cycle containing it. A height on a
    /// cycle boundary belongs to the new cycle.
    pub fn burn_height_to_reward_cycle(&self, burn_height: u128) -> Result<u128, PoxError> {
        if burn_height < self.first_burnchain_block_height {
            return Err(PoxError::HeightPrecedesGenesis);
        }
        Ok((burn_height - self.first_burnchain_block_height) / self.reward_cycle_length)
    }

    /// First burn height of the given reward cycle
    pub fn reward_cycle_to_burn_height(&self, reward_cycle: u128) -> Result<u128, PoxError> {
        reward_cycle
            .checked_mul(self.reward_cycle_length)
            .and_then(|offset| offset.checked_add(self.first_burnchain_block_height))
            .ok_or(PoxError::ArithmeticOverflow)
    }

    /// Is this height in the prepare phase that closes its reward cycle?
    pub fn is_in_prepare_phase(&self, burn_height: u128) -> bool {
        if burn_height < self.first_burnchain_block_height {
            return false;
        }
        let effective_height = burn_height - self.first_burnchain_block_height;
        let cycle_offset = effective_height % self.reward_cycle_length;
        cycle_offset >= self.reward_cycle_length - self.prepare_cycle_length
    }

    /// Number of reward slots available in one reward cycle
    pub fn reward_slots(&self) -> u128 {
        (self.reward_cycle_length - self.prepare_cycle_length) * OUTPUTS_PER_COMMIT
    }
}

/// Holds the burnchain parameters. Starts out with network defaults, and can
/// be configured exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterRegistry {
    Unconfigured(PoxParameters),
    Configured(PoxParameters),
}

impl ParameterRegistry {
    pub fn new(defaults: PoxParameters) -> ParameterRegistry {
        ParameterRegistry::Unconfigured(defaults)
    }

    pub fn params(&self) -> &PoxParameters {
        match self {
            ParameterRegistry::Unconfigured(params) | ParameterRegistry::Configured(params) => {
                params
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, ParameterRegistry::Configured(_))
    }

    pub fn configure(&mut self, params: PoxParameters) -> Result<(), PoxError> {
        if self.is_configured() {
            return Err(PoxError::AlreadyConfigured);
        }
        params.validate()?;
        *self = ParameterRegistry::Configured(params);
        Ok(())
    }
}
