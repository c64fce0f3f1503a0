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

use crate::address::PoxAddress;
use crate::errors::PoxError;
use crate::pox::store::{PartialStackedKey, PoxStore};
use crate::reward_set::RewardSetEntry;
use crate::types::{PrincipalData, StacksPublicKeyBuffer};

impl PoxStore {
    pub fn get_reward_set_size(&self, reward_cycle: u128) -> u128 {
        self.reward_cycle_pox_address_list
            .get(&reward_cycle)
            .map(|entries| entries.len() as u128)
            .unwrap_or(0)
    }

    pub fn get_total_ustx_stacked(&self, reward_cycle: u128) -> u128 {
        self.reward_cycle_total_stacked
            .get(&reward_cycle)
            .copied()
            .unwrap_or(0)
    }

    pub fn get_reward_set_pox_address(
        &self,
        reward_cycle: u128,
        index: u128,
    ) -> Option<&RewardSetEntry> {
        let index = usize::try_from(index).ok()?;
        self.reward_cycle_pox_address_list
            .get(&reward_cycle)?
            .get(index)
    }

    pub fn get_reward_set_entries(&self, reward_cycle: u128) -> &[RewardSetEntry] {
        self.reward_cycle_pox_address_list
            .get(&reward_cycle)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Append a slot to one cycle's reward set, returning its index
    pub(crate) fn add_pox_addr_to_ith_reward_cycle(
        &mut self,
        reward_cycle: u128,
        pox_addr: &PoxAddress,
        amount_ustx: u128,
        stacker: Option<&PrincipalData>,
        signer: StacksPublicKeyBuffer,
    ) -> Result<u128, PoxError> {
        let total = self.get_total_ustx_stacked(reward_cycle);
        let new_total = total
            .checked_add(amount_ustx)
            .ok_or(PoxError::ArithmeticOverflow)?;

        let entries = self
            .reward_cycle_pox_address_list
            .entry(reward_cycle)
            .or_default();
        let index = entries.len() as u128;
        entries.push(RewardSetEntry {
            reward_cycle,
            index,
            pox_addr: pox_addr.clone(),
            signer,
            total_ustx: amount_ustx,
            stacker: stacker.cloned(),
        });
        self.reward_cycle_total_stacked.insert(reward_cycle, new_total);

        trace!("Added reward set entry";
               "reward_cycle" => %reward_cycle,
               "index" => %index,
               "pox_addr" => %pox_addr,
               "total_ustx" => %amount_ustx);
        Ok(index)
    }

    /// Append a slot to each of `num_cycles` cycles starting at
    /// `first_reward_cycle`, returning the indexes in cycle order
    pub(crate) fn add_pox_addr_to_reward_cycles(
        &mut self,
        pox_addr: &PoxAddress,
        first_reward_cycle: u128,
        num_cycles: u128,
        amount_ustx: u128,
        stacker: &PrincipalData,
        signer: StacksPublicKeyBuffer,
    ) -> Result<Vec<u128>, PoxError> {
        let mut indexes = vec![];
        for i in 0..num_cycles {
            let reward_cycle = first_reward_cycle
                .checked_add(i)
                .ok_or(PoxError::ArithmeticOverflow)?;
            indexes.push(self.add_pox_addr_to_ith_reward_cycle(
                reward_cycle,
                pox_addr,
                amount_ustx,
                Some(stacker),
                signer,
            )?);
        }
        Ok(indexes)
    }

    /// Add a delegated amount to the delegate's uncommitted total for each cycle
    pub(crate) fn add_pox_partial_stacked(
        &mut self,
        pox_addr: &PoxAddress,
        sender: &PrincipalData,
        first_reward_cycle: u128,
        num_cycles: u128,
        amount_ustx: u128,
    ) -> Result<(), PoxError> {
        for i in 0..num_cycles {
            let reward_cycle = first_reward_cycle
                .checked_add(i)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let key = PartialStackedKey {
                pox_addr: pox_addr.clone(),
                sender: sender.clone(),
                reward_cycle,
            };
            let stacked = self.partial_stacked_by_cycle.entry(key).or_insert(0);
            *stacked = stacked
                .checked_add(amount_ustx)
                .ok_or(PoxError::ArithmeticOverflow)?;
        }
        Ok(())
    }

    /// Move a committed pooled amount out of the uncommitted map
    pub(crate) fn log_partial_stacked(
        &mut self,
        key: PartialStackedKey,
        amount_ustx: u128,
    ) -> Result<(), PoxError> {
        self.partial_stacked_by_cycle.remove(&key);
        let logged = self.logged_partial_stacked_by_cycle.entry(key).or_insert(0);
        *logged = logged
            .checked_add(amount_ustx)
            .ok_or(PoxError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Raise a solo stacker's slots in every cycle from `first_increased_cycle`
    /// on, moving them to the new signer key.
    pub(crate) fn increase_reward_cycle_entries(
        &mut self,
        stacker: &PrincipalData,
        first_reward_cycle: u128,
        reward_set_indexes: &[u128],
        first_increased_cycle: u128,
        increase_by: u128,
        signer: StacksPublicKeyBuffer,
    ) -> Result<(), PoxError> {
        for (offset, index) in reward_set_indexes.iter().enumerate() {
            let reward_cycle = first_reward_cycle
                .checked_add(offset as u128)
                .ok_or(PoxError::ArithmeticOverflow)?;
            if reward_cycle < first_increased_cycle {
                continue;
            }
            let new_total = self
                .get_total_ustx_stacked(reward_cycle)
                .checked_add(increase_by)
                .ok_or(PoxError::ArithmeticOverflow)?;
            let entry = usize::try_from(*index)
                .ok()
                .and_then(|i| {
                    self.reward_cycle_pox_address_list
                        .get_mut(&reward_cycle)?
                        .get_mut(i)
                })
                .ok_or(PoxError::InvalidIncrease)?;
            if entry.stacker.as_ref() != Some(stacker) {
                return Err(PoxError::InvalidIncrease);
            }
            entry.total_ustx = entry
                .total_ustx
                .checked_add(increase_by)
                .ok_or(PoxError::ArithmeticOverflow)?;
            entry.signer = signer;
            self.reward_cycle_total_stacked.insert(reward_cycle, new_total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::burnchain::PoxParameters;
    use crate::types::StacksAddress;
    use crate::util::hash::Hash160;

    fn principal(b: u8) -> PrincipalData {
        PrincipalData::from(StacksAddress::new(26, Hash160([b; 20])))
    }

    fn signer(b: u8) -> StacksPublicKeyBuffer {
        StacksPublicKeyBuffer([b; 33])
    }

    #[test]
    fn entries_are_appended_per_cycle() {
        let mut store = PoxStore::new(PoxParameters::testnet_default());
        let addr = PoxAddress::standard_burn_address();

        let first = store
            .add_pox_addr_to_reward_cycles(&addr, 1, 3, 100, &principal(1), signer(1))
            .unwrap();
        let second = store
            .add_pox_addr_to_reward_cycles(&addr, 2, 2, 50, &principal(2), signer(2))
            .unwrap();
        assert_eq!(first, vec![0, 0, 0]);
        assert_eq!(second, vec![1, 1]);

        assert_eq!(store.get_reward_set_size(0), 0);
        assert_eq!(store.get_reward_set_size(1), 1);
        assert_eq!(store.get_reward_set_size(2), 2);
        assert_eq!(store.get_total_ustx_stacked(2), 150);
        assert_eq!(store.get_total_ustx_stacked(4), 0);

        let entry = store.get_reward_set_pox_address(3, 1).unwrap();
        assert_eq!(entry.total_ustx, 50);
        assert_eq!(entry.stacker, Some(principal(2)));
        assert!(store.get_reward_set_pox_address(3, 2).is_none());
        assert!(store.get_reward_set_pox_address(9, 0).is_none());
        assert!(store.get_reward_set_pox_address(1, u128::MAX).is_none());
    }

    #[test]
    fn increase_skips_past_cycles_and_checks_owner() {
        let mut store = PoxStore::new(PoxParameters::testnet_default());
        let addr = PoxAddress::standard_burn_address();
        let indexes = store
            .add_pox_addr_to_reward_cycles(&addr, 1, 3, 100, &principal(1), signer(1))
            .unwrap();

        store
            .increase_reward_cycle_entries(&principal(1), 1, &indexes, 2, 25, signer(3))
            .unwrap();
        assert_eq!(store.get_reward_set_pox_address(1, 0).unwrap().total_ustx, 100);
        assert_eq!(store.get_reward_set_pox_address(2, 0).unwrap().total_ustx, 125);
        assert_eq!(store.get_reward_set_pox_address(3, 0).unwrap().signer, signer(3));
        assert_eq!(store.get_total_ustx_stacked(1), 100);
        assert_eq!(store.get_total_ustx_stacked(3), 125);

        assert_eq!(
            store.increase_reward_cycle_entries(&principal(2), 1, &indexes, 2, 25, signer(3)),
            Err(PoxError::InvalidIncrease)
        );
    }

    #[test]
    fn partial_stacked_accumulates() {
        let mut store = PoxStore::new(PoxParameters::testnet_default());
        let addr = PoxAddress::standard_burn_address();
        store
            .add_pox_partial_stacked(&addr, &principal(9), 2, 2, 10)
            .unwrap();
        store
            .add_pox_partial_stacked(&addr, &principal(9), 3, 1, 5)
            .unwrap();
        let key = |cycle| PartialStackedKey {
            pox_addr: addr.clone(),
            sender: principal(9),
            reward_cycle: cycle,
        };
        assert_eq!(store.partial_stacked_by_cycle.get(&key(2)), Some(&10));
        assert_eq!(store.partial_stacked_by_cycle.get(&key(3)), Some(&15));
        assert_eq!(store.partial_stacked_by_cycle.get(&key(4)), None);
        // nothing reaches the reward set until the delegate commits
        assert_eq!(store.get_reward_set_size(2), 0);
    }
}
