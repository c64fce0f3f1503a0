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

//! The stacking state machine.
//!
//! Every public mutating operation takes a [`CallContext`] and is atomic.
//! Operations with several writes run on a staged copy of the engine, which
//! replaces the live one only if the operation succeeds. Operations with a
//! single write finish their checks first and then write in place. Read-only queries evaluate
//! expiry relative to the burn height they are given.

use std::cmp;

use crate::accounts::StxAccount;
use crate::address::{check_pox_addr_hashbytes, check_pox_addr_version, PoxAddress};
use crate::burnchain::{
    PoxParameters, MAX_POX_REWARD_CYCLES, MIN_POX_REWARD_CYCLES, POX_THRESHOLD_STEPS_USTX,
};
use crate::consts::{CHAIN_ID_MAINNET, CHAIN_ID_TESTNET};
use crate::errors::PoxError;
use crate::reward_set::{
    get_reward_threshold_and_participation, make_reward_set, RawRewardSetEntry, RewardSet,
    RewardSetEntry,
};
use crate::types::PrincipalData;

pub mod delegation;
pub mod reward_set;
pub mod signer;
pub mod stacking;
pub mod store;

#[cfg(test)]
mod tests;

pub use self::signer::SignerAuth;
pub use self::stacking::{ExtendReceipt, IncreaseReceipt, LockReceipt};
pub use self::store::{AllowanceKey, DelegationRecord, PartialStackedKey, PoxStore, StackerRecord};

/// Who is calling, and at what burn height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// The transaction sender, whose funds and records are affected
    pub sender: PrincipalData,
    /// The principal that invoked the ledger directly; differs from `sender`
    /// when the call comes through a contract
    pub contract_caller: PrincipalData,
    pub burn_height: u128,
}

impl CallContext {
    pub fn new(sender: PrincipalData, burn_height: u128) -> CallContext {
        CallContext {
            contract_caller: sender.clone(),
            sender,
            burn_height,
        }
    }

    pub fn via_contract(
        sender: PrincipalData,
        contract_caller: PrincipalData,
        burn_height: u128,
    ) -> CallContext {
        CallContext {
            sender,
            contract_caller,
            burn_height,
        }
    }
}

/// Is the lock period within the allowed number of reward cycles?
pub fn check_pox_lock_period(lock_period: u128) -> bool {
    (MIN_POX_REWARD_CYCLES..=MAX_POX_REWARD_CYCLES).contains(&lock_period)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoxEngine {
    pub(crate) store: PoxStore,
    mainnet: bool,
    chain_id: u32,
    stacking_minimum_floor: u128,
}

impl PoxEngine {
    pub fn new(mainnet: bool, chain_id: u32) -> PoxEngine {
        let defaults = if mainnet {
            PoxParameters::mainnet_default()
        } else {
            PoxParameters::testnet_default()
        };
        PoxEngine {
            store: PoxStore::new(defaults),
            mainnet,
            chain_id,
            stacking_minimum_floor: POX_THRESHOLD_STEPS_USTX,
        }
    }

    pub fn mainnet() -> PoxEngine {
        PoxEngine::new(true, CHAIN_ID_MAINNET)
    }

    pub fn testnet() -> PoxEngine {
        PoxEngine::new(false, CHAIN_ID_TESTNET)
    }

    /// Override the lowest stacking minimum, regardless of liquid supply
    pub fn with_stacking_minimum_floor(mut self, floor: u128) -> PoxEngine {
        self.stacking_minimum_floor = floor;
        self
    }

    pub fn is_mainnet(&self) -> bool {
        self.mainnet
    }

    pub fn chain_id(&self) -> u32 {
        self.chain_id
    }

    pub fn store(&self) -> &PoxStore {
        &self.store
    }

    pub fn params(&self) -> &PoxParameters {
        self.store.params()
    }

    /// Run `f` against a staged copy of the engine, and keep its writes only
    /// if it succeeds.
    pub(crate) fn as_transaction<F, R>(&mut self, f: F) -> Result<R, PoxError>
    where
        F: FnOnce(&mut PoxEngine) -> Result<R, PoxError>,
    {
        let mut staged = self.clone();
        match f(&mut staged) {
            Ok(result) => {
                *self = staged;
                Ok(result)
            }
            Err(e) => {
                debug!("PoX call rejected"; "error" => %e, "code" => e.code());
                Err(e)
            }
        }
    }

    /// Run `f` directly against the live engine. For operations that finish
    /// every check before their one write, so a rejection leaves nothing
    /// behind and no staged copy is needed.
    pub(crate) fn as_single_write<F, R>(&mut self, f: F) -> Result<R, PoxError>
    where
        F: FnOnce(&mut PoxEngine) -> Result<R, PoxError>,
    {
        f(self).map_err(|e| {
            debug!("PoX call rejected"; "error" => %e, "code" => e.code());
            e
        })
    }

    /// Configure the burnchain parameters. Succeeds exactly once.
    pub fn set_burnchain_parameters(
        &mut self,
        first_burn_height: u128,
        prepare_cycle_length: u128,
        reward_cycle_length: u128,
        stacking_threshold: u128,
    ) -> Result<bool, PoxError> {
        self.as_single_write(|tx| {
            let params = PoxParameters {
                first_burnchain_block_height: first_burn_height,
                prepare_cycle_length,
                reward_cycle_length,
                stacking_threshold,
            };
            tx.store.registry.configure(params)?;
            info!("Burnchain parameters configured";
                  "first_burn_height" => %first_burn_height,
                  "prepare_cycle_length" => %prepare_cycle_length,
                  "reward_cycle_length" => %reward_cycle_length,
                  "stacking_threshold" => %stacking_threshold);
            Ok(true)
        })
    }

    /// Mint `amount` uSTX into an account's unlocked balance
    pub fn credit_account(
        &mut self,
        principal: &PrincipalData,
        amount: u128,
    ) -> Result<(), PoxError> {
        self.as_single_write(|tx| Ok(tx.store.accounts.credit(principal, amount)?))
    }

    pub fn get_account(&self, principal: &PrincipalData, burn_height: u128) -> StxAccount {
        self.store.accounts.get_account(principal, burn_height)
    }

    pub fn burn_height_to_reward_cycle(&self, burn_height: u128) -> Result<u128, PoxError> {
        self.params().burn_height_to_reward_cycle(burn_height)
    }

    pub fn reward_cycle_to_burn_height(&self, reward_cycle: u128) -> Result<u128, PoxError> {
        self.params().reward_cycle_to_burn_height(reward_cycle)
    }

    pub fn current_pox_reward_cycle(&self, ctx: &CallContext) -> Result<u128, PoxError> {
        self.store.current_pox_reward_cycle(ctx.burn_height)
    }

    /// The smallest amount a solo stacker may lock: the configured fraction
    /// of the liquid supply, but never less than the floor.
    pub fn get_stacking_minimum(&self) -> Result<u128, PoxError> {
        let liquid_ustx = self.store.accounts.liquid_supply()?;
        let fraction = liquid_ustx / self.params().stacking_threshold;
        Ok(cmp::max(fraction, self.stacking_minimum_floor))
    }

    /// Checks shared by solo and delegated stacking, without the threshold
    pub fn minimal_can_stack_stx(
        &self,
        pox_addr: &PoxAddress,
        amount_ustx: u128,
        first_reward_cycle: u128,
        num_cycles: u128,
    ) -> Result<bool, PoxError> {
        if amount_ustx == 0 {
            return Err(PoxError::InvalidAmount);
        }
        if !check_pox_lock_period(num_cycles) {
            return Err(PoxError::InvalidLockPeriod);
        }
        first_reward_cycle
            .checked_add(num_cycles)
            .ok_or(PoxError::ArithmeticOverflow)?;
        if !check_pox_addr_version(pox_addr.version) {
            return Err(PoxError::InvalidPoxAddress);
        }
        if !check_pox_addr_hashbytes(pox_addr.version, &pox_addr.hashbytes) {
            return Err(PoxError::InvalidPoxAddress);
        }
        Ok(true)
    }

    pub fn can_stack_stx(
        &self,
        pox_addr: &PoxAddress,
        amount_ustx: u128,
        first_reward_cycle: u128,
        num_cycles: u128,
    ) -> Result<bool, PoxError> {
        if amount_ustx < self.get_stacking_minimum()? {
            return Err(PoxError::ThresholdNotMet);
        }
        self.minimal_can_stack_stx(pox_addr, amount_ustx, first_reward_cycle, num_cycles)
    }

    /// Is the contract caller allowed to act for the sender?
    pub fn check_caller_allowed(&self, ctx: &CallContext) -> bool {
        if ctx.sender == ctx.contract_caller {
            return true;
        }
        let key = AllowanceKey {
            sender: ctx.sender.clone(),
            contract_caller: ctx.contract_caller.clone(),
        };
        match self.store.allowance_contract_callers.get(&key) {
            Some(Some(until_burn_ht)) => ctx.burn_height < *until_burn_ht,
            Some(None) => true,
            None => false,
        }
    }

    pub fn get_allowance_contract_callers(
        &self,
        sender: &PrincipalData,
        contract_caller: &PrincipalData,
    ) -> Option<Option<u128>> {
        let key = AllowanceKey {
            sender: sender.clone(),
            contract_caller: contract_caller.clone(),
        };
        self.store.allowance_contract_callers.get(&key).copied()
    }

    /// Let `caller` act for the sender until `until_burn_ht`, or indefinitely
    pub fn allow_contract_caller(
        &mut self,
        ctx: &CallContext,
        caller: &PrincipalData,
        until_burn_ht: Option<u128>,
    ) -> Result<bool, PoxError> {
        self.as_single_write(|tx| {
            if ctx.sender != ctx.contract_caller {
                return Err(PoxError::PermissionDenied);
            }
            if let Some(until_burn_ht) = until_burn_ht {
                if until_burn_ht <= ctx.burn_height {
                    return Err(PoxError::Expired);
                }
            }
            let key = AllowanceKey {
                sender: ctx.sender.clone(),
                contract_caller: caller.clone(),
            };
            tx.store.allowance_contract_callers.insert(key, until_burn_ht);
            Ok(true)
        })
    }

    /// Returns whether an allowance was removed
    pub fn disallow_contract_caller(
        &mut self,
        ctx: &CallContext,
        caller: &PrincipalData,
    ) -> Result<bool, PoxError> {
        self.as_single_write(|tx| {
            if ctx.sender != ctx.contract_caller {
                return Err(PoxError::PermissionDenied);
            }
            let key = AllowanceKey {
                sender: ctx.sender.clone(),
                contract_caller: caller.clone(),
            };
            Ok(tx.store.allowance_contract_callers.remove(&key).is_some())
        })
    }

    pub fn get_reward_set_size(&self, reward_cycle: u128) -> u128 {
        self.store.get_reward_set_size(reward_cycle)
    }

    pub fn get_total_ustx_stacked(&self, reward_cycle: u128) -> u128 {
        self.store.get_total_ustx_stacked(reward_cycle)
    }

    pub fn get_reward_set_pox_address(
        &self,
        reward_cycle: u128,
        index: u128,
    ) -> Option<&RewardSetEntry> {
        self.store.get_reward_set_pox_address(reward_cycle, index)
    }

    pub fn get_reward_set_entries(&self, reward_cycle: u128) -> &[RewardSetEntry] {
        self.store.get_reward_set_entries(reward_cycle)
    }

    /// Amount a delegate has gathered for `pox_addr` in `reward_cycle` but not
    /// yet committed
    pub fn get_partial_stacked_by_cycle(
        &self,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        sender: &PrincipalData,
    ) -> Option<u128> {
        let key = PartialStackedKey {
            pox_addr: pox_addr.clone(),
            sender: sender.clone(),
            reward_cycle,
        };
        self.store.partial_stacked_by_cycle.get(&key).copied()
    }

    /// Allocate the reward slots of a cycle from its committed entries
    pub fn get_reward_set(&self, reward_cycle: u128) -> Result<RewardSet, PoxError> {
        let entries: Vec<RawRewardSetEntry> = self
            .get_reward_set_entries(reward_cycle)
            .iter()
            .map(RawRewardSetEntry::from)
            .collect();
        let liquid_ustx = self.store.accounts.liquid_supply()?;
        let (threshold, participation) =
            get_reward_threshold_and_participation(self.params(), &entries, liquid_ustx)?;
        debug!("Computing reward set";
               "reward_cycle" => %reward_cycle,
               "entries" => entries.len(),
               "participation" => %participation);
        make_reward_set(threshold, entries)
    }
}
