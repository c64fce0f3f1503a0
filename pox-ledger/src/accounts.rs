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

//! STX balances and the locks that stacking places on them.

use std::collections::BTreeMap;

use crate::types::PrincipalData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockingError {
    #[error("account already has an active lock")]
    PoxAlreadyLocked,
    #[error("insufficient unlocked balance")]
    PoxInsufficientBalance,
    #[error("extend requested on an account without an active lock")]
    PoxExtendNotLocked,
    #[error("increase requested on an account without an active lock")]
    PoxIncreaseNotLocked,
    #[error("invalid lock increase")]
    PoxInvalidIncrease,
    #[error("balance overflow")]
    Overflow,
}

/// Balance of a single principal, as `stx-account` reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StxAccount {
    pub unlocked: u128,
    pub locked: u128,
    pub unlock_height: u128,
}

impl StxAccount {
    pub fn new(unlocked: u128) -> StxAccount {
        StxAccount {
            unlocked,
            locked: 0,
            unlock_height: 0,
        }
    }

    /// Does this account still hold locked tokens at `burn_height`?
    pub fn has_locked_tokens(&self, burn_height: u128) -> bool {
        self.locked > 0 && burn_height < self.unlock_height
    }

    /// Release the lock if its unlock height has been reached
    pub fn unlock_if_due(&mut self, burn_height: u128) {
        if self.locked > 0 && burn_height >= self.unlock_height {
            self.unlocked = self.unlocked.saturating_add(self.locked);
            self.locked = 0;
            self.unlock_height = 0;
        }
    }

    /// The account as observed at `burn_height`
    pub fn at_burn_height(mut self, burn_height: u128) -> StxAccount {
        self.unlock_if_due(burn_height);
        self
    }

    pub fn total_balance(&self) -> Result<u128, LockingError> {
        self.unlocked
            .checked_add(self.locked)
            .ok_or(LockingError::Overflow)
    }

    pub fn lock(
        &mut self,
        amount: u128,
        unlock_height: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        self.unlock_if_due(burn_height);
        if self.has_locked_tokens(burn_height) {
            return Err(LockingError::PoxAlreadyLocked);
        }
        if self.unlocked < amount {
            return Err(LockingError::PoxInsufficientBalance);
        }
        self.unlocked -= amount;
        self.locked = amount;
        self.unlock_height = unlock_height;
        Ok(())
    }

    pub fn extend_lock(
        &mut self,
        unlock_height: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        self.unlock_if_due(burn_height);
        if !self.has_locked_tokens(burn_height) {
            return Err(LockingError::PoxExtendNotLocked);
        }
        self.unlock_height = unlock_height;
        Ok(())
    }

    pub fn increase_lock(
        &mut self,
        increase_by: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        self.unlock_if_due(burn_height);
        if !self.has_locked_tokens(burn_height) {
            return Err(LockingError::PoxIncreaseNotLocked);
        }
        if increase_by == 0 {
            return Err(LockingError::PoxInvalidIncrease);
        }
        if self.unlocked < increase_by {
            return Err(LockingError::PoxInsufficientBalance);
        }
        self.unlocked -= increase_by;
        self.locked += increase_by;
        Ok(())
    }
}

/// All STX balances known to the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountLedger {
    accounts: BTreeMap<PrincipalData, StxAccount>,
}

impl AccountLedger {
    pub fn new() -> AccountLedger {
        AccountLedger::default()
    }

    /// Balance of `principal` as of `burn_height`, with any due unlock applied
    pub fn get_account(&self, principal: &PrincipalData, burn_height: u128) -> StxAccount {
        self.accounts
            .get(principal)
            .copied()
            .unwrap_or_default()
            .at_burn_height(burn_height)
    }

    /// Add freshly minted STX to an account's unlocked balance
    pub fn credit(&mut self, principal: &PrincipalData, amount: u128) -> Result<(), LockingError> {
        let account = self.accounts.entry(principal.clone()).or_default();
        let unlocked = account
            .unlocked
            .checked_add(amount)
            .ok_or(LockingError::Overflow)?;
        unlocked
            .checked_add(account.locked)
            .ok_or(LockingError::Overflow)?;
        account.unlocked = unlocked;
        Ok(())
    }

    /// Sum of every balance, locked or not
    pub fn liquid_supply(&self) -> Result<u128, LockingError> {
        self.accounts.values().try_fold(0u128, |total, account| {
            total
                .checked_add(account.total_balance()?)
                .ok_or(LockingError::Overflow)
        })
    }

    pub fn lock(
        &mut self,
        principal: &PrincipalData,
        amount: u128,
        unlock_height: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        let account = self.accounts.entry(principal.clone()).or_default();
        account.lock(amount, unlock_height, burn_height)?;
        debug!("STX lock applied";
               "account" => %principal,
               "locked_ustx" => %account.locked,
               "available_ustx" => %account.unlocked,
               "unlock_burn_height" => %account.unlock_height);
        Ok(())
    }

    pub fn extend_lock(
        &mut self,
        principal: &PrincipalData,
        unlock_height: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        let account = self
            .accounts
            .get_mut(principal)
            .ok_or(LockingError::PoxExtendNotLocked)?;
        account.extend_lock(unlock_height, burn_height)?;
        debug!("STX lock extended";
               "account" => %principal,
               "locked_ustx" => %account.locked,
               "unlock_burn_height" => %account.unlock_height);
        Ok(())
    }

    pub fn increase_lock(
        &mut self,
        principal: &PrincipalData,
        increase_by: u128,
        burn_height: u128,
    ) -> Result<(), LockingError> {
        let account = self
            .accounts
            .get_mut(principal)
            .ok_or(LockingError::PoxIncreaseNotLocked)?;
        account.increase_lock(increase_by, burn_height)?;
        debug!("STX lock increased";
               "account" => %principal,
               "locked_ustx" => %account.locked,
               "available_ustx" => %account.unlocked);
        Ok(())
    }
}
