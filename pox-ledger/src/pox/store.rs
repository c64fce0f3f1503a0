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

//! All state the stacking ledger owns. Every map that is iterated to produce
//! consensus output is ordered.

use std::collections::{BTreeMap, BTreeSet};

use crate::accounts::AccountLedger;
use crate::address::PoxAddress;
use crate::burnchain::{ParameterRegistry, PoxParameters};
use crate::errors::PoxError;
use crate::reward_set::RewardSetEntry;
use crate::signed_structured_data::pox4::Pox4SignatureTopic;
use crate::types::{PrincipalData, StacksPublicKeyBuffer};

/// A principal's lock, solo or through a delegate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackerRecord {
    pub stacker: PrincipalData,
    pub amount_locked: u128,
    pub pox_addr: PoxAddress,
    pub lock_period: u128,
    pub first_reward_cycle: u128,
    /// One index per covered cycle for solo stackers, empty for delegated ones
    pub reward_set_indexes: Vec<u128>,
    pub delegated_to: Option<PrincipalData>,
    pub signer_key: Option<StacksPublicKeyBuffer>,
}

impl StackerRecord {
    /// First reward cycle after the lock ends
    pub fn end_cycle(&self) -> u128 {
        self.first_reward_cycle.saturating_add(self.lock_period)
    }

    pub fn is_active(&self, current_cycle: u128) -> bool {
        current_cycle < self.end_cycle()
    }

    pub fn is_delegated(&self) -> bool {
        self.delegated_to.is_some() || self.reward_set_indexes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub amount_ustx: u128,
    pub delegated_to: PrincipalData,
    pub until_burn_ht: Option<u128>,
    pub pox_addr: Option<PoxAddress>,
}

impl DelegationRecord {
    pub fn is_active(&self, burn_height: u128) -> bool {
        match self.until_burn_ht {
            Some(until_burn_ht) => burn_height <= until_burn_ht,
            None => true,
        }
    }
}

/// Key of the partially-stacked amounts a delegate has not yet committed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartialStackedKey {
    pub pox_addr: PoxAddress,
    pub sender: PrincipalData,
    pub reward_cycle: u128,
}

/// Replay-guard key of a consumed signer authorization
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignerAuthKey {
    pub signer_key: StacksPublicKeyBuffer,
    pub reward_cycle: u128,
    pub topic: Pox4SignatureTopic,
    pub period: u128,
    pub max_amount: u128,
    pub auth_id: u128,
}

/// Key of an authorization a signer registered ahead of time
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PresetAuthKey {
    pub pox_addr: PoxAddress,
    pub period: u128,
    pub reward_cycle: u128,
    pub topic: Pox4SignatureTopic,
    pub signer_key: StacksPublicKeyBuffer,
    pub max_amount: u128,
    pub auth_id: u128,
}

impl PresetAuthKey {
    pub fn replay_key(&self) -> SignerAuthKey {
        SignerAuthKey {
            signer_key: self.signer_key,
            reward_cycle: self.reward_cycle,
            topic: self.topic,
            period: self.period,
            max_amount: self.max_amount,
            auth_id: self.auth_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AllowanceKey {
    pub sender: PrincipalData,
    pub contract_caller: PrincipalData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoxStore {
    pub registry: ParameterRegistry,
    pub accounts: AccountLedger,
    pub stacking_state: BTreeMap<PrincipalData, StackerRecord>,
    pub delegation_state: BTreeMap<PrincipalData, DelegationRecord>,
    pub reward_cycle_pox_address_list: BTreeMap<u128, Vec<RewardSetEntry>>,
    pub reward_cycle_total_stacked: BTreeMap<u128, u128>,
    pub partial_stacked_by_cycle: BTreeMap<PartialStackedKey, u128>,
    pub logged_partial_stacked_by_cycle: BTreeMap<PartialStackedKey, u128>,
    pub allowance_contract_callers: BTreeMap<AllowanceKey, Option<u128>>,
    pub used_signer_key_authorizations: BTreeSet<SignerAuthKey>,
    pub signer_key_authorizations: BTreeMap<PresetAuthKey, bool>,
}

impl PoxStore {
    pub fn new(defaults: PoxParameters) -> PoxStore {
        PoxStore {
            registry: ParameterRegistry::new(defaults),
            accounts: AccountLedger::new(),
            stacking_state: BTreeMap::new(),
            delegation_state: BTreeMap::new(),
            reward_cycle_pox_address_list: BTreeMap::new(),
            reward_cycle_total_stacked: BTreeMap::new(),
            partial_stacked_by_cycle: BTreeMap::new(),
            logged_partial_stacked_by_cycle: BTreeMap::new(),
            allowance_contract_callers: BTreeMap::new(),
            used_signer_key_authorizations: BTreeSet::new(),
            signer_key_authorizations: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &PoxParameters {
        self.registry.params()
    }

    pub fn current_pox_reward_cycle(&self, burn_height: u128) -> Result<u128, PoxError> {
        self.params().burn_height_to_reward_cycle(burn_height)
    }

    /// The stacker's record, if it still covers `current_cycle`
    pub fn active_stacker(
        &self,
        stacker: &PrincipalData,
        current_cycle: u128,
    ) -> Option<&StackerRecord> {
        self.stacking_state
            .get(stacker)
            .filter(|record| record.is_active(current_cycle))
    }

    /// The stacker's delegation, if it has not expired at `burn_height`
    pub fn active_delegation(
        &self,
        stacker: &PrincipalData,
        burn_height: u128,
    ) -> Option<&DelegationRecord> {
        self.delegation_state
            .get(stacker)
            .filter(|record| record.is_active(burn_height))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::StacksAddress;
    use crate::util::hash::Hash160;

    fn principal(b: u8) -> PrincipalData {
        PrincipalData::from(StacksAddress::new(26, Hash160([b; 20])))
    }

    #[test]
    fn delegation_expiry_is_inclusive() {
        let record = DelegationRecord {
            amount_ustx: 1,
            delegated_to: principal(2),
            until_burn_ht: Some(10),
            pox_addr: None,
        };
        assert!(record.is_active(9));
        assert!(record.is_active(10));
        assert!(!record.is_active(11));

        let forever = DelegationRecord {
            until_burn_ht: None,
            ..record
        };
        assert!(forever.is_active(u128::MAX));
    }

    #[test]
    fn stacker_visibility() {
        let record = StackerRecord {
            stacker: principal(1),
            amount_locked: 100,
            pox_addr: PoxAddress::standard_burn_address(),
            lock_period: 6,
            first_reward_cycle: 1,
            reward_set_indexes: vec![0; 6],
            delegated_to: None,
            signer_key: None,
        };
        assert!(record.is_active(0));
        assert!(record.is_active(1));
        assert!(record.is_active(6));
        assert!(!record.is_active(7));
        assert!(!record.is_delegated());

        let mut store = PoxStore::new(PoxParameters::testnet_default());
        store.stacking_state.insert(principal(1), record);
        assert!(store.active_stacker(&principal(1), 6).is_some());
        assert!(store.active_stacker(&principal(1), 7).is_none());
        assert!(store.stacking_state.contains_key(&principal(1)));
    }
}
