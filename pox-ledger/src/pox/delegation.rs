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

//! Delegated stacking.
//!
//! A stacker grants a delegate the right to lock up to some amount of its
//! STX. The delegate locks it with `delegate_stack_*`, which only records the
//! amount as partially stacked for each covered cycle. Nothing reaches a
//! reward set until the delegate commits the pooled amount for a cycle with
//! `stack_aggregation_commit*`, signed by the pool's signer.

use crate::address::PoxAddress;
use crate::burnchain::MAX_POX_REWARD_CYCLES;
use crate::errors::PoxError;
use crate::pox::signer::{check_signer_key, SignerAuth};
use crate::pox::stacking::{ExtendReceipt, IncreaseReceipt, LockReceipt};
use crate::pox::store::{DelegationRecord, PartialStackedKey, StackerRecord};
use crate::pox::{check_pox_lock_period, CallContext, PoxEngine};
use crate::signed_structured_data::pox4::Pox4SignatureTopic;
use crate::types::PrincipalData;

impl PoxEngine {
    /// The stacker's delegation, if it has not expired at the context height
    pub fn get_check_delegation(
        &self,
        ctx: &CallContext,
        stacker: &PrincipalData,
    ) -> Option<&DelegationRecord> {
        self.store.active_delegation(stacker, ctx.burn_height)
    }

    /// Let `delegate_to` lock up to `amount_ustx` of the sender's STX,
    /// replacing any earlier grant.
    pub fn delegate_stx(
        &mut self,
        ctx: &CallContext,
        amount_ustx: u128,
        delegate_to: &PrincipalData,
        until_burn_ht: Option<u128>,
        pox_addr: Option<&PoxAddress>,
    ) -> Result<bool, PoxError> {
        self.as_single_write(|tx| {
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if let Some(pox_addr) = pox_addr {
                pox_addr.validate()?;
            }
            tx.store.delegation_state.insert(
                ctx.sender.clone(),
                DelegationRecord {
                    amount_ustx,
                    delegated_to: delegate_to.clone(),
                    until_burn_ht,
                    pox_addr: pox_addr.cloned(),
                },
            );
            info!("Delegated STX";
                  "stacker" => %ctx.sender,
                  "delegate" => %delegate_to,
                  "amount_ustx" => %amount_ustx,
                  "until_burn_ht" => ?until_burn_ht);
            Ok(true)
        })
    }

    /// Withdraw the sender's active grant, returning it
    pub fn revoke_delegate_stx(&mut self, ctx: &CallContext) -> Result<DelegationRecord, PoxError> {
        self.as_single_write(|tx| {
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if tx.get_check_delegation(ctx, &ctx.sender).is_none() {
                return Err(PoxError::DelegationAlreadyRevoked);
            }
            let revoked = tx
                .store
                .delegation_state
                .remove(&ctx.sender)
                .ok_or(PoxError::Unreachable)?;
            info!("Revoked STX delegation";
                  "stacker" => %ctx.sender,
                  "delegate" => %revoked.delegated_to);
            Ok(revoked)
        })
    }

    /// The grant `stacker` gave to the sender, checked against the address
    /// the sender wants to stack to.
    fn delegation_for(
        &self,
        ctx: &CallContext,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
    ) -> Result<DelegationRecord, PoxError> {
        let delegation = self
            .get_check_delegation(ctx, stacker)
            .cloned()
            .ok_or(PoxError::NoSuchPrincipal)?;
        if delegation.delegated_to != ctx.sender {
            return Err(PoxError::PermissionDenied);
        }
        if let Some(required) = delegation.pox_addr.as_ref() {
            if required != pox_addr {
                return Err(PoxError::DelegationPoxAddrRequired);
            }
        }
        Ok(delegation)
    }

    /// Lock `amount_ustx` of a delegating stacker's STX. The amount is pooled
    /// under the sender for each covered cycle until it is committed.
    pub fn delegate_stack_stx(
        &mut self,
        ctx: &CallContext,
        stacker: &PrincipalData,
        amount_ustx: u128,
        pox_addr: &PoxAddress,
        start_burn_ht: u128,
        lock_period: u128,
    ) -> Result<LockReceipt, PoxError> {
        self.as_transaction(|tx| {
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if !check_pox_lock_period(lock_period) {
                return Err(PoxError::InvalidLockPeriod);
            }
            let first_reward_cycle = tx.first_reward_cycle_for_start(ctx, start_burn_ht)?;
            let end_cycle = first_reward_cycle
                .checked_add(lock_period)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let unlock_burn_height = tx.reward_cycle_to_burn_height(end_cycle)?;

            let delegation = tx.delegation_for(ctx, stacker, pox_addr)?;
            if amount_ustx > delegation.amount_ustx {
                return Err(PoxError::DelegationTooMuchLocked);
            }
            if let Some(until_burn_ht) = delegation.until_burn_ht {
                if until_burn_ht < unlock_burn_height {
                    return Err(PoxError::DelegationExpiresDuringLock);
                }
            }

            if tx.get_stacker_info(ctx, stacker)?.is_some() {
                return Err(PoxError::AlreadyStacked);
            }
            if tx.get_account(stacker, ctx.burn_height).unlocked < amount_ustx {
                return Err(PoxError::InsufficientFunds);
            }
            tx.minimal_can_stack_stx(pox_addr, amount_ustx, first_reward_cycle, lock_period)?;

            tx.store.add_pox_partial_stacked(
                pox_addr,
                &ctx.sender,
                first_reward_cycle,
                lock_period,
                amount_ustx,
            )?;
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
                    reward_set_indexes: vec![],
                    delegated_to: Some(ctx.sender.clone()),
                    signer_key: None,
                },
            );

            info!("Delegate stacked STX";
                  "delegate" => %ctx.sender,
                  "stacker" => %stacker,
                  "amount_ustx" => %amount_ustx,
                  "first_reward_cycle" => %first_reward_cycle,
                  "lock_period" => %lock_period);

            Ok(LockReceipt {
                stacker: stacker.clone(),
                lock_amount: amount_ustx,
                signer_key: None,
                unlock_burn_height,
            })
        })
    }

    pub fn delegate_stack_extend(
        &mut self,
        ctx: &CallContext,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        extend_count: u128,
    ) -> Result<ExtendReceipt, PoxError> {
        self.as_transaction(|tx| {
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
                .ok_or(PoxError::NotCurrentStacker)?;
            if !record.is_delegated() {
                return Err(PoxError::NotDelegated);
            }
            // only the delegate that created the lock may change it
            if record.delegated_to.as_ref() != Some(&ctx.sender) {
                return Err(PoxError::PermissionDenied);
            }
            let amount_ustx = tx.get_account(stacker, ctx.burn_height).locked;
            if amount_ustx == 0 {
                return Err(PoxError::StackExtendNotLocked);
            }

            let first_extend_cycle = record.end_cycle();
            let new_end_cycle = first_extend_cycle
                .checked_add(extend_count)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let unlock_burn_height = tx.reward_cycle_to_burn_height(new_end_cycle)?;

            let delegation = tx.delegation_for(ctx, stacker, pox_addr)?;
            if amount_ustx > delegation.amount_ustx {
                return Err(PoxError::DelegationTooMuchLocked);
            }
            if let Some(until_burn_ht) = delegation.until_burn_ht {
                if until_burn_ht < unlock_burn_height {
                    return Err(PoxError::DelegationExpiresDuringLock);
                }
            }

            let horizon = new_end_cycle.saturating_sub(current_cycle.saturating_add(1));
            if horizon < 1 || horizon > MAX_POX_REWARD_CYCLES {
                return Err(PoxError::InvalidLockPeriod);
            }
            tx.minimal_can_stack_stx(pox_addr, amount_ustx, first_extend_cycle, extend_count)?;

            tx.store.add_pox_partial_stacked(
                pox_addr,
                &ctx.sender,
                first_extend_cycle,
                extend_count,
                amount_ustx,
            )?;
            tx.store
                .accounts
                .extend_lock(stacker, unlock_burn_height, ctx.burn_height)?;

            let mut updated = record;
            updated.lock_period += extend_count;
            updated.pox_addr = pox_addr.clone();
            tx.store.stacking_state.insert(stacker.clone(), updated);

            info!("Delegate extended STX lock";
                  "delegate" => %ctx.sender,
                  "stacker" => %stacker,
                  "extend_count" => %extend_count,
                  "unlock_burn_height" => %unlock_burn_height);

            Ok(ExtendReceipt {
                stacker: stacker.clone(),
                unlock_burn_height,
            })
        })
    }

    /// Lock more of a delegating stacker's STX. Only the cycles after the
    /// current one receive the additional amount.
    pub fn delegate_stack_increase(
        &mut self,
        ctx: &CallContext,
        stacker: &PrincipalData,
        pox_addr: &PoxAddress,
        increase_by: u128,
    ) -> Result<IncreaseReceipt, PoxError> {
        self.as_transaction(|tx| {
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if increase_by == 0 {
                return Err(PoxError::InvalidAmount);
            }
            let current_cycle = tx.current_pox_reward_cycle(ctx)?;
            let record = tx
                .store
                .active_stacker(stacker, current_cycle)
                .cloned()
                .ok_or(PoxError::NotCurrentStacker)?;
            if !record.is_delegated() {
                return Err(PoxError::NotDelegated);
            }
            // only the delegate that created the lock may change it
            if record.delegated_to.as_ref() != Some(&ctx.sender) {
                return Err(PoxError::PermissionDenied);
            }
            let account = tx.get_account(stacker, ctx.burn_height);
            if account.locked == 0 {
                return Err(PoxError::StackIncreaseNotLocked);
            }
            if account.unlocked < increase_by {
                return Err(PoxError::InsufficientFunds);
            }
            if record.pox_addr != *pox_addr {
                return Err(PoxError::DelegationPoxAddrRequired);
            }

            let new_total = account
                .locked
                .checked_add(increase_by)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let delegation = tx.delegation_for(ctx, stacker, pox_addr)?;
            if new_total > delegation.amount_ustx {
                return Err(PoxError::DelegationTooMuchLocked);
            }
            if let Some(until_burn_ht) = delegation.until_burn_ht {
                if until_burn_ht < account.unlock_height {
                    return Err(PoxError::DelegationExpiresDuringLock);
                }
            }

            let first_increase_cycle = current_cycle.saturating_add(1);
            let num_cycles = record.end_cycle().saturating_sub(first_increase_cycle);
            tx.minimal_can_stack_stx(pox_addr, new_total, first_increase_cycle, num_cycles)?;

            tx.store.add_pox_partial_stacked(
                pox_addr,
                &ctx.sender,
                first_increase_cycle,
                num_cycles,
                increase_by,
            )?;
            tx.store
                .accounts
                .increase_lock(stacker, increase_by, ctx.burn_height)?;

            let mut updated = record;
            updated.amount_locked = new_total;
            tx.store.stacking_state.insert(stacker.clone(), updated);

            info!("Delegate increased STX lock";
                  "delegate" => %ctx.sender,
                  "stacker" => %stacker,
                  "increase_by" => %increase_by,
                  "total_locked" => %new_total);

            Ok(IncreaseReceipt {
                stacker: stacker.clone(),
                total_locked: new_total,
            })
        })
    }

    pub fn stack_aggregation_commit(
        &mut self,
        ctx: &CallContext,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        signer: &SignerAuth,
    ) -> Result<bool, PoxError> {
        self.stack_aggregation_commit_indexed(ctx, pox_addr, reward_cycle, signer)
            .map(|_| true)
    }

    /// Commit the amount pooled for `pox_addr` in a future cycle as a new
    /// reward slot, returning the slot's index.
    pub fn stack_aggregation_commit_indexed(
        &mut self,
        ctx: &CallContext,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        signer: &SignerAuth,
    ) -> Result<u128, PoxError> {
        self.as_transaction(|tx| {
            let key = PartialStackedKey {
                pox_addr: pox_addr.clone(),
                sender: ctx.sender.clone(),
                reward_cycle,
            };
            let amount_ustx = tx
                .store
                .partial_stacked_by_cycle
                .get(&key)
                .copied()
                .ok_or(PoxError::NoSuchPrincipal)?;
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if reward_cycle <= tx.current_pox_reward_cycle(ctx)? {
                return Err(PoxError::InvalidLockPeriod);
            }
            check_signer_key(&signer.signer_key)?;
            tx.consume_signer_key_authorization(
                pox_addr,
                reward_cycle,
                Pox4SignatureTopic::AggregationCommit,
                1,
                signer,
                amount_ustx,
            )?;
            tx.can_stack_stx(pox_addr, amount_ustx, reward_cycle, 1)?;

            let index = tx.store.add_pox_addr_to_ith_reward_cycle(
                reward_cycle,
                pox_addr,
                amount_ustx,
                None,
                signer.signer_key,
            )?;
            tx.store.log_partial_stacked(key, amount_ustx)?;

            info!("Committed pooled STX";
                  "delegate" => %ctx.sender,
                  "pox_addr" => %pox_addr,
                  "reward_cycle" => %reward_cycle,
                  "index" => %index,
                  "amount_ustx" => %amount_ustx);
            Ok(index)
        })
    }

    /// Fold newly pooled STX into the slot committed earlier at `index`
    pub fn stack_aggregation_increase(
        &mut self,
        ctx: &CallContext,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        index: u128,
        signer: &SignerAuth,
    ) -> Result<bool, PoxError> {
        self.as_transaction(|tx| {
            let key = PartialStackedKey {
                pox_addr: pox_addr.clone(),
                sender: ctx.sender.clone(),
                reward_cycle,
            };
            let partial_ustx = tx
                .store
                .partial_stacked_by_cycle
                .get(&key)
                .copied()
                .ok_or(PoxError::NoSuchPrincipal)?;
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::PermissionDenied);
            }
            if reward_cycle <= tx.current_pox_reward_cycle(ctx)? {
                return Err(PoxError::InvalidLockPeriod);
            }
            let entry = tx
                .get_reward_set_pox_address(reward_cycle, index)
                .cloned()
                .ok_or(PoxError::DelegationNoRewardSlot)?;
            let increased_ustx = entry
                .total_ustx
                .checked_add(partial_ustx)
                .ok_or(PoxError::ArithmeticOverflow)?;
            tx.minimal_can_stack_stx(pox_addr, increased_ustx, reward_cycle, 1)?;
            if increased_ustx < tx.get_stacking_minimum()? {
                return Err(PoxError::ThresholdNotMet);
            }
            if entry.stacker.is_some() || entry.pox_addr != *pox_addr {
                return Err(PoxError::DelegationWrongRewardSlot);
            }
            check_signer_key(&signer.signer_key)?;
            tx.consume_signer_key_authorization(
                pox_addr,
                reward_cycle,
                Pox4SignatureTopic::AggregationIncrease,
                1,
                signer,
                increased_ustx,
            )?;

            let cycle_total = tx
                .get_total_ustx_stacked(reward_cycle)
                .checked_add(partial_ustx)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| {
                    tx.store
                        .reward_cycle_pox_address_list
                        .get_mut(&reward_cycle)?
                        .get_mut(i)
                })
                .ok_or(PoxError::Unreachable)?;
            slot.total_ustx = increased_ustx;
            slot.signer = signer.signer_key;
            tx.store
                .reward_cycle_total_stacked
                .insert(reward_cycle, cycle_total);

            tx.store.log_partial_stacked(key, partial_ustx)?;

            info!("Increased committed pool slot";
                  "delegate" => %ctx.sender,
                  "pox_addr" => %pox_addr,
                  "reward_cycle" => %reward_cycle,
                  "index" => %index,
                  "total_ustx" => %increased_ustx);
            Ok(true)
        })
    }
}
