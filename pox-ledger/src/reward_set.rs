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

//! Reward-set entries, and the slot allocation computed from them at the
//! start of a reward cycle.

use std::cmp;
use std::collections::BTreeMap;

use crate::address::PoxAddress;
use crate::burnchain::{PoxParameters, POX_MAXIMAL_SCALING, POX_THRESHOLD_STEPS_USTX};
use crate::errors::PoxError;
use crate::types::{PrincipalData, StacksPublicKeyBuffer};

/// One committed `(address, signer, amount)` slot in a cycle's reward set.
/// Entries are never merged by address; see `make_reward_set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSetEntry {
    pub reward_cycle: u128,
    pub index: u128,
    pub pox_addr: PoxAddress,
    pub signer: StacksPublicKeyBuffer,
    pub total_ustx: u128,
    /// Absent for entries committed by a delegate on behalf of a pool
    pub stacker: Option<PrincipalData>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRewardSetEntry {
    pub reward_address: PoxAddress,
    pub amount_stacked: u128,
    pub stacker: Option<PrincipalData>,
    pub signer: Option<StacksPublicKeyBuffer>,
}

impl From<&RewardSetEntry> for RawRewardSetEntry {
    fn from(entry: &RewardSetEntry) -> RawRewardSetEntry {
        RawRewardSetEntry {
            reward_address: entry.pox_addr.clone(),
            amount_stacked: entry.total_ustx,
            stacker: entry.stacker.clone(),
            signer: Some(entry.signer),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct SignerEntry {
    pub signing_key: StacksPublicKeyBuffer,
    pub stacked_amt: u128,
    pub weight: u32,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct RewardSet {
    pub rewarded_addresses: Vec<PoxAddress>,
    /// Principals whose stacked amount did not earn a slot, with the amount
    /// they had locked. They become eligible for an early unlock.
    pub missed_reward_slots: Vec<(PrincipalData, u128)>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signers: Option<Vec<SignerEntry>>,
    pub pox_ustx_threshold: u128,
}

pub fn make_signer_set(
    threshold: u128,
    entries: &[RawRewardSetEntry],
) -> Result<Option<Vec<SignerEntry>>, PoxError> {
    let Some(first_entry) = entries.first() else {
        // entries is empty: there's no signer set
        return Ok(None);
    };
    if threshold == 0 {
        return Err(PoxError::InvalidAmount);
    }
    // signing keys must be all-or-nothing in the reward set
    let expects_signing_keys = first_entry.signer.is_some();
    if entries
        .iter()
        .any(|entry| entry.signer.is_some() != expects_signing_keys)
    {
        error!("Stacking set contains mismatched entries with and without signing keys");
        return Err(PoxError::CorruptedState);
    }
    if !expects_signing_keys {
        return Ok(None);
    }

    let mut signer_set: BTreeMap<StacksPublicKeyBuffer, u128> = BTreeMap::new();
    for entry in entries.iter() {
        let Some(signing_key) = entry.signer else {
            return Err(PoxError::CorruptedState);
        };
        let stacked_amt = signer_set.entry(signing_key).or_insert(0);
        *stacked_amt = stacked_amt
            .checked_add(entry.amount_stacked)
            .ok_or(PoxError::ArithmeticOverflow)?;
    }

    let mut signers = vec![];
    for (signing_key, stacked_amt) in signer_set.into_iter() {
        let weight =
            u32::try_from(stacked_amt / threshold).map_err(|_| PoxError::CorruptedState)?;
        if weight == 0 {
            continue;
        }
        signers.push(SignerEntry {
            signing_key,
            stacked_amt,
            weight,
        });
    }

    // the signer participation bit vector depends on this ordering
    signers.sort_by_key(|entry| entry.signing_key);

    Ok(Some(signers))
}

/// Given a threshold and set of registered addresses, return a reward set where
///   every entry address has stacked more than the threshold, and addresses
///   are repeated floor(stacked_amt / threshold) times.
/// If an address appears in `addresses` multiple times, then the address's associated amounts
///   are summed.
pub fn make_reward_set(
    threshold: u128,
    mut addresses: Vec<RawRewardSetEntry>,
) -> Result<RewardSet, PoxError> {
    // a cycle nobody stacked in has an empty reward set, whatever the threshold
    if addresses.is_empty() {
        return Ok(RewardSet {
            rewarded_addresses: vec![],
            missed_reward_slots: vec![],
            signers: None,
            pox_ustx_threshold: threshold,
        });
    }
    if threshold == 0 {
        return Err(PoxError::InvalidAmount);
    }
    let mut reward_set = vec![];
    let mut missed_slots = vec![];
    // the way that we sum addresses relies on sorting.
    addresses.sort_by_cached_key(|k| k.reward_address.to_burnchain_repr());

    let signer_set = make_signer_set(threshold, &addresses)?;

    while let Some(RawRewardSetEntry {
        reward_address: address,
        amount_stacked: mut stacked_amt,
        stacker,
        ..
    }) = addresses.pop()
    {
        let mut contributed_stackers = vec![];
        if let Some(stacker) = stacker {
            contributed_stackers.push((stacker, stacked_amt));
        }
        // addresses are sorted, so every other entry for this address sits
        // at the end of the list
        while addresses.last().map(|x| &x.reward_address) == Some(&address) {
            let Some(next_contrib) = addresses.pop() else {
                break;
            };
            if let Some(stacker) = next_contrib.stacker {
                contributed_stackers.push((stacker, next_contrib.amount_stacked));
            }
            stacked_amt = stacked_amt
                .checked_add(next_contrib.amount_stacked)
                .ok_or(PoxError::ArithmeticOverflow)?;
        }
        let slots_taken =
            u32::try_from(stacked_amt / threshold).map_err(|_| PoxError::CorruptedState)?;
        info!(
            "Reward slots taken";
            "reward_address" => %address,
            "slots_taken" => slots_taken,
            "stacked_amt" => %stacked_amt,
            "pox_threshold" => %threshold,
        );
        for _ in 0..slots_taken {
            reward_set.push(address.clone());
        }
        // a stacker that did not qualify for a slot is added to the unlock list
        if slots_taken == 0 && !contributed_stackers.is_empty() {
            info!(
                "Stacker missed reward slot, added to unlock list";
                "reward_address" => %address,
                "threshold" => %threshold,
                "stacked_amount" => %stacked_amt
            );
            contributed_stackers.sort_by(|a, b| a.0.cmp(&b.0));
            while let Some((contributor, amt)) = contributed_stackers.pop() {
                let mut total_amount = amt;
                while contributed_stackers.last().map(|(stacker, ..)| stacker)
                    == Some(&contributor)
                {
                    let Some((_, additional)) = contributed_stackers.pop() else {
                        break;
                    };
                    total_amount = total_amount
                        .checked_add(additional)
                        .ok_or(PoxError::ArithmeticOverflow)?;
                }
                missed_slots.push((contributor, total_amount));
            }
        }
    }
    info!("Reward set calculated"; "slots_occupied" => reward_set.len());
    Ok(RewardSet {
        rewarded_addresses: reward_set,
        missed_reward_slots: missed_slots,
        signers: signer_set,
        pox_ustx_threshold: threshold,
    })
}

/// Slot threshold for a given participation, never scaled below
/// `1/POX_MAXIMAL_SCALING` of the liquid supply, rounded up to the next
/// `POX_THRESHOLD_STEPS_USTX`.
pub fn get_threshold_from_participation(
    liquid_ustx: u128,
    participation: u128,
    reward_slots: u128,
) -> Result<u128, PoxError> {
    if reward_slots == 0 {
        return Err(PoxError::InvalidParameters);
    }
    let scale_by = cmp::max(participation, liquid_ustx / POX_MAXIMAL_SCALING);
    let threshold_precise = scale_by / reward_slots;
    let ceil_amount = match threshold_precise % POX_THRESHOLD_STEPS_USTX {
        0 => 0,
        remainder => POX_THRESHOLD_STEPS_USTX - remainder,
    };
    threshold_precise
        .checked_add(ceil_amount)
        .ok_or(PoxError::ArithmeticOverflow)
}

/// Returns `(threshold, participation)` for a cycle's entries
pub fn get_reward_threshold_and_participation(
    pox_settings: &PoxParameters,
    addresses: &[RawRewardSetEntry],
    liquid_ustx: u128,
) -> Result<(u128, u128), PoxError> {
    let participation = addresses.iter().try_fold(0u128, |agg, entry| {
        agg.checked_add(entry.amount_stacked)
            .ok_or(PoxError::ArithmeticOverflow)
    })?;

    if participation > liquid_ustx {
        error!("More stacking participation than liquid STX";
               "participation" => %participation,
               "liquid_ustx" => %liquid_ustx);
        return Err(PoxError::CorruptedState);
    }

    let threshold =
        get_threshold_from_participation(liquid_ustx, participation, pox_settings.reward_slots())?;
    info!(
        "PoX participation threshold is {}, participation is {}",
        threshold, participation
    );
    Ok((threshold, participation))
}
