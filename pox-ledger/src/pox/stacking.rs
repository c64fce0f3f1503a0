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

//! Solo stacking: locking, extending and increasing a principal's own STX.

use crate::address::PoxAddress;
use crate::burnchain::MAX_POX_REWARD_CYCLES;
use crate::errors::PoxError;
use crate::pox::signer::{check_signer_key, SignerAuth};
use crate::pox::store::StackerRecord;
use crate::pox::{check_pox_lock_period, CallContext, PoxEngine};
use crate::signed_structured_data::pox4::Pox4SignatureTopic;
use crate::types::{PrincipalData, StacksPublicKeyBuffer};

/// Result of a successful lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReceipt {
    pub stacker: PrincipalData,
    pub lock_amount: u128,
    pub signer_key: Option<StacksPublicKeyBuffer>,
    pub unlock_burn_height: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendReceipt {
    pub stacker: PrincipalData,
    pub unlock_burn_height: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncreaseReceipt {
    pub stacker: PrincipalData,
    pub total_locked: u128,
}

impl PoxEngine {
    /// The stacker's record while it still covers the current reward cycle
    pub fn get_stacker_info(
        &self,
        ctx: &CallContext,
        stacker: &PrincipalData,
    ) -> Result<Option<&StackerRecord>, PoxError> {
        let current_cycle = self.current_pox_reward_cycle(ctx)?;
        Ok(self.store.active_stacker(stacker, current_cycle))
    }

    /// Resolve the first reward cycle of a new lock from its start height.
    /// The lock may start in the current cycle or the next one, never in the past.
    pub(crate) fn first_reward_cycle_for_start(
        &self,
        ctx: &CallContext,
        start_burn_ht: u128,
    ) -> Result<u128, PoxError> {
        if start_burn_ht < ctx.burn_height {
            return Err(PoxError::InvalidStartBurnHeight);
        }
        let current_cycle = self.current_pox_reward_cycle(ctx)?;
        let first_reward_cycle = self
            .burn_height_to_reward_cycle(start_burn_ht)
            .map_err(|_| PoxError::InvalidStartBurnHeight)?;
        if first_reward_cycle != current_cycle && Some(first_reward_cycle) != current_cycle.checked_add(1) {
            return Err(PoxError::InvalidStartBurnHeight);
        }
        Ok(first_reward_cycle)
    }

    /// Lock `amount_ustx` of the sender's STX for `lock_period` reward cycles,
    /// with rewards paid to `pox_addr`.
    pub fn stack_stx(
        &mut self,
        ctx: &CallContext,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u128,
        lock_period: u128,
        signer: &SignerAuth,
    ) -> Result<LockReceipt, PoxError> {
        self.as_transaction(|tx| {
            let stacker = &ctx.sender;
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if !check_pox_lock_period(lock_period) {
                return Err(PoxError::InvalidLockPeriod);
            }
            if amount_ustx == 0 {
                return Err(PoxError::InvalidAmount);
            }
            if amount_ustx < tx.get_stacking_minimum()? {
                return Err(PoxError::ThresholdNotMet);
            }
            if tx.get_stacker_info(ctx, stacker)?.is_some() {
                return Err(PoxError::AlreadyStacked);
            }
            if tx.store.active_delegation(stacker, ctx.burn_height).is_some() {
                return Err(PoxError::AlreadyDelegated);
            }
            let account = tx.get_account(stacker, ctx.burn_height);
            if account.unlocked < amount_ustx {
                return Err(PoxError::InsufficientFunds);
            }
            pox_addr.validate()?;
            check_signer_key(&signer.signer_key)?;

            let current_cycle = tx.current_pox_reward_cycle(ctx)?;
            tx.consume_signer_key_authorization(
                pox_addr,
                current_cycle,
                Pox4SignatureTopic::StackStx,
                lock_period,
                signer,
                amount_ustx,
            )?;

            let first_reward_cycle = tx.first_reward_cycle_for_start(ctx, start_burn_ht)?;
            tx.can_stack_stx(pox_addr, amount_ustx, first_reward_cycle, lock_period)?;

            let reward_set_indexes = tx.store.add_pox_addr_to_reward_cycles(
                pox_addr,
                first_reward_cycle,
                lock_period,
                amount_ustx,
                stacker,
                signer.signer_key,
            )?;
            let end_cycle = first_reward_cycle
                .checked_add(lock_period)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let unlock_burn_height = tx.reward_cycle_to_burn_height(end_cycle)?;

            tx.store
                .accounts
                .lock(stacker, amount_ustx, unlock_burn_height, ctx.burn_height)?;
            tx.store.stacking_state.insert(
                stacker.clone(),
                StackerRecord {
                    stacker: stacker.clone(),
                    amount_locked: amount_ustx,
                    pox_addr: pox_addr.clone(),
                    lock_period,
                    first_reward_cycle,
                    reward_set_indexes,
                    delegated_to: None,
                    signer_key: Some(signer.signer_key),
                },
            );

            info!("Stacked STX";
                  "stacker" => %stacker,
                  "amount_ustx" => %amount_ustx,
                  "pox_addr" => %pox_addr,
                  "first_reward_cycle" => %first_reward_cycle,
                  "lock_period" => %lock_period,
                  "unlock_burn_height" => %unlock_burn_height);

            Ok(LockReceipt {
                stacker: stacker.clone(),
                lock_amount: amount_ustx,
                signer_key: Some(signer.signer_key),
                unlock_burn_height,
            })
        })
    }

    /// Extend an active solo lock by `extend_count` reward cycles. The total
    /// lock, counted from the next reward cycle, stays within
    /// `MAX_POX_REWARD_CYCLES`.
    pub fn stack_extend(
        &mut self,
        ctx: &CallContext,
        extend_count: u128,
        pox_addr: &PoxAddress,
        signer: &SignerAuth,
    ) -> Result<ExtendReceipt, PoxError> {
        self.as_transaction(|tx| {
            let stacker = &ctx.sender;
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if extend_count < 1 {
                return Err(PoxError::InvalidLockPeriod);
            }
            let current_cycle = tx.current_pox_reward_cycle(ctx)?;
            let record = tx
                .store
                .active_stacker(stacker, current_cycle)
                .cloned()
                .ok_or(PoxError::StackExtendNotLocked)?;
            let amount_ustx = tx.get_account(stacker, ctx.burn_height).locked;
            if amount_ustx == 0 {
                return Err(PoxError::StackExtendNotLocked);
            }
            if record.is_delegated() {
                return Err(PoxError::IsDelegated);
            }
            if tx.store.active_delegation(stacker, ctx.burn_height).is_some() {
                return Err(PoxError::AlreadyDelegated);
            }
            pox_addr.validate()?;
            check_signer_key(&signer.signer_key)?;

            tx.consume_signer_key_authorization(
                pox_addr,
                current_cycle,
                Pox4SignatureTopic::StackExtend,
                extend_count,
                signer,
                0,
            )?;

            let first_extend_cycle = record.end_cycle();
            let new_end_cycle = first_extend_cycle
                .checked_add(extend_count)
                .ok_or(PoxError::ArithmeticOverflow)?;
            // cycles still locked after the current one
            let horizon = new_end_cycle.saturating_sub(current_cycle.saturating_add(1));
            if horizon < 1 || horizon > MAX_POX_REWARD_CYCLES {
                return Err(PoxError::InvalidLockPeriod);
            }
            tx.can_stack_stx(pox_addr, amount_ustx, first_extend_cycle, extend_count)?;

            let new_indexes = tx.store.add_pox_addr_to_reward_cycles(
                pox_addr,
                first_extend_cycle,
                extend_count,
                amount_ustx,
                stacker,
                signer.signer_key,
            )?;
            let unlock_burn_height = tx.reward_cycle_to_burn_height(new_end_cycle)?;
            tx.store
                .accounts
                .extend_lock(stacker, unlock_burn_height, ctx.burn_height)?;

            let mut updated = record;
            updated.reward_set_indexes.extend(new_indexes);
            updated.lock_period += extend_count;
            updated.pox_addr = pox_addr.clone();
            updated.signer_key = Some(signer.signer_key);
            tx.store.stacking_state.insert(stacker.clone(), updated);

            info!("Extended STX lock";
                  "stacker" => %stacker,
                  "extend_count" => %extend_count,
                  "unlock_burn_height" => %unlock_burn_height);

            Ok(ExtendReceipt {
                stacker: stacker.clone(),
                unlock_burn_height,
            })
        })
    }

    /// Lock `increase_by` more uSTX under an active solo lock. Reward-set
    /// entries of the cycles after the current one carry the new total.
    pub fn stack_increase(
        &mut self,
        ctx: &CallContext,
        increase_by: u128,
        signer: &SignerAuth,
    ) -> Result<IncreaseReceipt, PoxError> {
        self.as_transaction(|tx| {
            let stacker = &ctx.sender;
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            let current_cycle = tx.current_pox_reward_cycle(ctx)?;
            let record = tx
                .store
                .active_stacker(stacker, current_cycle)
                .cloned()
                .ok_or(PoxError::StackIncreaseNotLocked)?;
            let account = tx.get_account(stacker, ctx.burn_height);
            if account.locked == 0 {
                return Err(PoxError::StackIncreaseNotLocked);
            }
            if record.is_delegated() {
                return Err(PoxError::IsDelegated);
            }
            if increase_by == 0 {
                return Err(PoxError::InvalidAmount);
            }
            if account.unlocked < increase_by {
                return Err(PoxError::InsufficientFunds);
            }
            let new_total = account
                .locked
                .checked_add(increase_by)
                .ok_or(PoxError::ArithmeticOverflow)?;
            if new_total < tx.get_stacking_minimum()? {
                return Err(PoxError::ThresholdNotMet);
            }
            check_signer_key(&signer.signer_key)?;

            tx.consume_signer_key_authorization(
                &record.pox_addr,
                current_cycle,
                Pox4SignatureTopic::StackIncrease,
                record.lock_period,
                signer,
                new_total,
            )?;

            tx.store.increase_reward_cycle_entries(
                stacker,
                record.first_reward_cycle,
                &record.reward_set_indexes,
                current_cycle.saturating_add(1),
                increase_by,
                signer.signer_key,
            )?;
            tx.store
                .accounts
                .increase_lock(stacker, increase_by, ctx.burn_height)?;

            let mut updated = record;
            updated.amount_locked = new_total;
            updated.signer_key = Some(signer.signer_key);
            tx.store.stacking_state.insert(stacker.clone(), updated);

            info!("Increased STX lock";
                  "stacker" => %stacker,
                  "increase_by" => %increase_by,
                  "total_locked" => %new_total);

            Ok(IncreaseReceipt {
                stacker: stacker.clone(),
                total_locked: new_total,
            })
        })
    }
}
