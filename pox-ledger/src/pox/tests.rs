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

use rstest::rstest;

use super::*;
use crate::address::{ADDRESS_VERSION_P2PKH, ADDRESS_VERSION_P2WSH};
use crate::reward_set::SignerEntry;
use crate::signed_structured_data::pox4::{make_pox_4_signer_key_signature, Pox4SignatureTopic};
use crate::types::{StacksAddress, StacksPublicKeyBuffer};
use crate::util::hash::Hash160;
use crate::util::secp256k1::{MessageSignature, Secp256k1PrivateKey, Secp256k1PublicKey};

const INITIAL_BALANCE: u128 = 1_000_000_000;
const MIN_USTX: u128 = 1_000_000;
const CYCLE_LEN: u128 = 1_050;

/// Drives a testnet engine, advancing the burn height between calls
struct PoxTestSim {
    engine: PoxEngine,
    height: u128,
    next_auth_id: u128,
}

impl PoxTestSim {
    fn new() -> PoxTestSim {
        PoxTestSim {
            engine: PoxEngine::testnet().with_stacking_minimum_floor(MIN_USTX),
            height: 0,
            next_auth_id: 1,
        }
    }

    fn fund(&mut self, principals: &[&PrincipalData], amount: u128) {
        for principal in principals {
            self.engine.credit_account(principal, amount).unwrap();
        }
    }

    fn ctx(&self, sender: &PrincipalData) -> CallContext {
        CallContext::new(sender.clone(), self.height)
    }

    fn advance_to(&mut self, height: u128) {
        assert!(height >= self.height, "burn height only moves forward");
        self.height = height;
    }

    fn advance_to_cycle(&mut self, reward_cycle: u128) {
        let height = self.engine.reward_cycle_to_burn_height(reward_cycle).unwrap();
        self.advance_to(height);
    }

    fn current_cycle(&self) -> u128 {
        self.engine.burn_height_to_reward_cycle(self.height).unwrap()
    }

    fn next_cycle_start(&self) -> u128 {
        self.engine
            .reward_cycle_to_burn_height(self.current_cycle() + 1)
            .unwrap()
    }

    /// A signed authorization with a fresh auth id
    fn sign(
        &mut self,
        signer: &Secp256k1PrivateKey,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: Pox4SignatureTopic,
        period: u128,
        max_amount: u128,
    ) -> SignerAuth {
        let auth_id = self.next_auth_id;
        self.next_auth_id += 1;
        let sig = make_pox_4_signer_key_signature(
            pox_addr,
            signer,
            reward_cycle,
            &topic,
            self.engine.chain_id(),
            period,
            max_amount,
            auth_id,
        )
        .unwrap();
        SignerAuth::with_signature(sig, signer_key(signer), max_amount, auth_id)
    }

    /// Solo-stack starting with the next reward cycle
    fn stack(
        &mut self,
        stacker: &PrincipalData,
        amount: u128,
        pox_addr: &PoxAddress,
        lock_period: u128,
        signer: &Secp256k1PrivateKey,
    ) -> Result<LockReceipt, PoxError> {
        let cycle = self.current_cycle();
        let auth = self.sign(
            signer,
            pox_addr,
            cycle,
            Pox4SignatureTopic::StackStx,
            lock_period,
            amount,
        );
        let start = self.next_cycle_start();
        let ctx = self.ctx(stacker);
        self.engine
            .stack_stx(&ctx, amount, pox_addr, start, lock_period, &auth)
    }

    fn stacker_info(&self, stacker: &PrincipalData) -> Option<StackerRecord> {
        self.engine
            .get_stacker_info(&self.ctx(stacker), stacker)
            .unwrap()
            .cloned()
    }
}

fn principal(b: u8) -> PrincipalData {
    PrincipalData::from(StacksAddress::new(26, Hash160([b; 20])))
}

fn pox_addr(b: u8) -> PoxAddress {
    PoxAddress::new(ADDRESS_VERSION_P2PKH, vec![b; 20])
}

fn signer_privk(seed: u8) -> Secp256k1PrivateKey {
    Secp256k1PrivateKey::from_seed(&[0x51, seed])
}

fn signer_key(privk: &Secp256k1PrivateKey) -> StacksPublicKeyBuffer {
    StacksPublicKeyBuffer::from_public_key(&Secp256k1PublicKey::from_private(privk))
}

#[test]
fn lock_is_visible_for_its_lock_period() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);

    let receipt = sim
        .stack(&alice, 10_000_000, &pox_addr(1), 6, &signer)
        .unwrap();
    assert_eq!(receipt.lock_amount, 10_000_000);
    assert_eq!(receipt.signer_key, Some(signer_key(&signer)));
    assert_eq!(receipt.unlock_burn_height, 7 * CYCLE_LEN);

    for cycle in 1..=6 {
        sim.advance_to_cycle(cycle);
        let info = sim.stacker_info(&alice).expect("still stacking");
        assert_eq!(info.first_reward_cycle, 1);
        assert_eq!(info.lock_period, 6);
        assert_eq!(info.reward_set_indexes, vec![0; 6]);
        assert_eq!(sim.engine.get_reward_set_size(cycle), 1);
    }

    sim.advance_to_cycle(7);
    assert!(sim.stacker_info(&alice).is_none());
    assert_eq!(sim.engine.get_reward_set_size(7), 0);
    assert_eq!(sim.engine.get_total_ustx_stacked(7), 0);
}

#[test]
fn stackers_sharing_an_address_keep_distinct_slots() {
    let mut sim = PoxTestSim::new();
    let stackers = [principal(1), principal(2), principal(3)];
    let signer = signer_privk(1);
    sim.fund(&[&stackers[0], &stackers[1], &stackers[2]], INITIAL_BALANCE);

    let amount = 10_000_000;
    for stacker in stackers.iter() {
        sim.stack(stacker, amount, &pox_addr(7), 1, &signer).unwrap();
    }

    assert_eq!(sim.engine.get_reward_set_size(1), 3);
    assert_eq!(sim.engine.get_total_ustx_stacked(1), 3 * amount);
    for (i, stacker) in stackers.iter().enumerate() {
        let entry = sim
            .engine
            .get_reward_set_pox_address(1, i as u128)
            .unwrap();
        assert_eq!(entry.index, i as u128);
        assert_eq!(entry.pox_addr, pox_addr(7));
        assert_eq!(entry.total_ustx, amount);
        assert_eq!(entry.stacker.as_ref(), Some(stacker));
    }
    assert!(sim.engine.get_reward_set_pox_address(1, 3).is_none());
    assert_eq!(sim.engine.get_reward_set_size(2), 0);
}

#[rstest]
#[case::below_minimum(PoxAddress::standard_burn_address(), MIN_USTX - 1, 1, 1, PoxError::ThresholdNotMet)]
#[case::zero_amount(PoxAddress::standard_burn_address(), 0, 1, 1, PoxError::ThresholdNotMet)]
#[case::no_cycles(PoxAddress::standard_burn_address(), MIN_USTX, 1, 0, PoxError::InvalidLockPeriod)]
#[case::too_many_cycles(PoxAddress::standard_burn_address(), MIN_USTX, 1, 13, PoxError::InvalidLockPeriod)]
#[case::unknown_version(PoxAddress::new(7, vec![0; 20]), MIN_USTX, 1, 1, PoxError::InvalidPoxAddress)]
#[case::short_hashbytes(PoxAddress::new(ADDRESS_VERSION_P2WSH, vec![0; 20]), MIN_USTX, 1, 1, PoxError::InvalidPoxAddress)]
#[case::cycle_overflow(PoxAddress::standard_burn_address(), MIN_USTX, u128::MAX, 1, PoxError::ArithmeticOverflow)]
fn can_stack_stx_rejects(
    #[case] addr: PoxAddress,
    #[case] amount: u128,
    #[case] first_reward_cycle: u128,
    #[case] num_cycles: u128,
    #[case] expected: PoxError,
) {
    let engine = PoxEngine::testnet().with_stacking_minimum_floor(MIN_USTX);
    assert_eq!(
        engine.can_stack_stx(&addr, amount, first_reward_cycle, num_cycles),
        Err(expected)
    );
}

#[test]
fn can_stack_stx_accepts() {
    let engine = PoxEngine::testnet().with_stacking_minimum_floor(MIN_USTX);
    let addr = PoxAddress::standard_burn_address();
    assert_eq!(engine.can_stack_stx(&addr, MIN_USTX, 1, 12), Ok(true));
    assert_eq!(
        engine.can_stack_stx(&PoxAddress::new(ADDRESS_VERSION_P2WSH, vec![1; 32]), MIN_USTX, 1, 1),
        Ok(true)
    );
    // the minimal check skips the threshold but still wants a positive amount
    assert_eq!(engine.minimal_can_stack_stx(&addr, 1, 1, 1), Ok(true));
    assert_eq!(
        engine.minimal_can_stack_stx(&addr, 0, 1, 1),
        Err(PoxError::InvalidAmount)
    );
}

#[test]
fn stacking_minimum_follows_liquid_supply() {
    let mut sim = PoxTestSim::new();
    assert_eq!(sim.engine.get_stacking_minimum(), Ok(MIN_USTX));
    // 8000 * 2_000_000 uSTX liquid: the fraction exceeds the floor
    sim.fund(&[&principal(1)], 16_000_000_000);
    assert_eq!(sim.engine.get_stacking_minimum(), Ok(2_000_000));
}

#[test]
fn delegation_expires_after_until_height() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let pool = principal(10);

    assert_eq!(
        sim.engine
            .delegate_stx(&sim.ctx(&alice), 10_000_000, &pool, Some(10), None),
        Ok(true)
    );
    assert_eq!(
        sim.engine
            .delegate_stx(&sim.ctx(&bob), 10_000_000, &pool, None, Some(&pox_addr(3))),
        Ok(true)
    );

    sim.advance_to(10);
    let grant = sim
        .engine
        .get_check_delegation(&sim.ctx(&alice), &alice)
        .cloned()
        .unwrap();
    assert_eq!(grant.delegated_to, pool);
    assert_eq!(grant.until_burn_ht, Some(10));

    sim.advance_to(11);
    assert!(sim.engine.get_check_delegation(&sim.ctx(&alice), &alice).is_none());
    assert_eq!(
        sim.engine.revoke_delegate_stx(&sim.ctx(&alice)),
        Err(PoxError::DelegationAlreadyRevoked)
    );

    sim.advance_to(1_000_000);
    assert!(sim.engine.get_check_delegation(&sim.ctx(&bob), &bob).is_some());
}

#[test]
fn delegation_can_be_replaced_and_revoked_once() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let ctx = sim.ctx(&alice);

    sim.engine
        .delegate_stx(&ctx, 10_000_000, &principal(10), None, None)
        .unwrap();
    sim.engine
        .delegate_stx(&ctx, 20_000_000, &principal(11), None, None)
        .unwrap();
    let grant = sim.engine.get_check_delegation(&ctx, &alice).cloned().unwrap();
    assert_eq!(grant.amount_ustx, 20_000_000);
    assert_eq!(grant.delegated_to, principal(11));

    let revoked = sim.engine.revoke_delegate_stx(&ctx).unwrap();
    assert_eq!(revoked, grant);
    assert!(sim.engine.get_check_delegation(&ctx, &alice).is_none());
    assert_eq!(
        sim.engine.revoke_delegate_stx(&ctx),
        Err(PoxError::DelegationAlreadyRevoked)
    );

    assert_eq!(
        sim.engine
            .delegate_stx(&ctx, 1, &principal(10), None, Some(&PoxAddress::new(9, vec![0; 20]))),
        Err(PoxError::InvalidPoxAddress)
    );
}

#[test]
fn delegating_principal_cannot_stack_solo() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    sim.fund(&[&alice], INITIAL_BALANCE);
    sim.engine
        .delegate_stx(&sim.ctx(&alice), 10_000_000, &principal(10), None, None)
        .unwrap();
    assert_eq!(
        sim.stack(&alice, 10_000_000, &pox_addr(1), 1, &signer_privk(1)),
        Err(PoxError::AlreadyDelegated)
    );
}

#[test]
fn stack_stx_checks_caller_funds_and_existing_lock() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);

    assert_eq!(
        sim.stack(&alice, INITIAL_BALANCE + 1, &pox_addr(1), 1, &signer),
        Err(PoxError::InsufficientFunds)
    );
    assert_eq!(
        sim.stack(&alice, MIN_USTX - 1, &pox_addr(1), 1, &signer),
        Err(PoxError::ThresholdNotMet)
    );
    assert_eq!(
        sim.stack(&alice, MIN_USTX, &pox_addr(1), 13, &signer),
        Err(PoxError::InvalidLockPeriod)
    );
    assert_eq!(
        sim.stack(&alice, MIN_USTX, &PoxAddress::new(7, vec![1; 20]), 1, &signer),
        Err(PoxError::InvalidPoxAddress)
    );

    sim.stack(&alice, MIN_USTX, &pox_addr(1), 2, &signer).unwrap();
    assert_eq!(
        sim.stack(&alice, MIN_USTX, &pox_addr(1), 1, &signer),
        Err(PoxError::AlreadyStacked)
    );
}

#[test]
fn start_burn_height_must_be_current_or_next_cycle() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);
    sim.advance_to(2 * CYCLE_LEN + 10);

    let amount = 10_000_000;
    for start in [2 * CYCLE_LEN + 9, 4 * CYCLE_LEN, CYCLE_LEN] {
        let auth = sim.sign(&signer, &pox_addr(1), 2, Pox4SignatureTopic::StackStx, 1, amount);
        assert_eq!(
            sim.engine
                .stack_stx(&sim.ctx(&alice), amount, &pox_addr(1), start, 1, &auth),
            Err(PoxError::InvalidStartBurnHeight)
        );
    }

    let auth = sim.sign(&signer, &pox_addr(1), 2, Pox4SignatureTopic::StackStx, 1, amount);
    let receipt = sim
        .engine
        .stack_stx(&sim.ctx(&alice), amount, &pox_addr(1), 2 * CYCLE_LEN + 10, 1, &auth)
        .unwrap();
    assert_eq!(receipt.unlock_burn_height, 3 * CYCLE_LEN);
    assert_eq!(sim.engine.get_reward_set_size(2), 1);
}

#[test]
fn signer_authorization_is_single_use() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let signer = signer_privk(1);
    sim.fund(&[&alice, &bob], INITIAL_BALANCE);

    let amount = 10_000_000;
    let auth = sim.sign(&signer, &pox_addr(1), 0, Pox4SignatureTopic::StackStx, 1, amount);
    let start = sim.next_cycle_start();

    sim.engine
        .stack_stx(&sim.ctx(&alice), amount, &pox_addr(1), start, 1, &auth)
        .unwrap();
    assert_eq!(
        sim.engine
            .stack_stx(&sim.ctx(&bob), amount, &pox_addr(1), start, 1, &auth),
        Err(PoxError::ReusedSignerKey)
    );
    assert_eq!(sim.engine.get_reward_set_size(1), 1);
}

#[test]
fn failed_call_leaves_no_trace() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);

    let amount = 10_000_000;
    let auth = sim.sign(&signer, &pox_addr(1), 0, Pox4SignatureTopic::StackStx, 1, amount);
    let before = sim.engine.clone();

    // rejected only after the authorization was checked and consumed
    assert_eq!(
        sim.engine
            .stack_stx(&sim.ctx(&alice), amount, &pox_addr(1), 5 * CYCLE_LEN, 1, &auth),
        Err(PoxError::InvalidStartBurnHeight)
    );
    assert_eq!(sim.engine, before);

    let start = sim.next_cycle_start();
    sim.engine
        .stack_stx(&sim.ctx(&alice), amount, &pox_addr(1), start, 1, &auth)
        .unwrap();
    assert_ne!(sim.engine, before);
}

#[test]
fn signature_failures() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    let other = signer_privk(2);
    sim.fund(&[&alice], INITIAL_BALANCE);

    let amount = 10_000_000;
    let start = sim.next_cycle_start();
    let ctx = sim.ctx(&alice);

    let capped = sim.sign(&signer, &pox_addr(1), 0, Pox4SignatureTopic::StackStx, 1, amount - 1);
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &capped),
        Err(PoxError::SignerAuthAmountTooHigh)
    );

    let forged = sim.sign(&other, &pox_addr(1), 0, Pox4SignatureTopic::StackStx, 1, amount);
    let forged = SignerAuth {
        signer_key: signer_key(&signer),
        ..forged
    };
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &forged),
        Err(PoxError::InvalidSignaturePubkey)
    );

    let wrong_topic = sim.sign(&signer, &pox_addr(1), 0, Pox4SignatureTopic::StackExtend, 1, amount);
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &wrong_topic),
        Err(PoxError::InvalidSignaturePubkey)
    );

    let garbage = SignerAuth::with_signature(MessageSignature::empty(), signer_key(&signer), amount, 1);
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &garbage),
        Err(PoxError::InvalidSignatureRecover)
    );

    let unregistered = SignerAuth::preset(signer_key(&signer), amount, 1);
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &unregistered),
        Err(PoxError::NotAllowed)
    );

    let bad_key = SignerAuth::preset(StacksPublicKeyBuffer([0; 33]), amount, 1);
    assert_eq!(
        sim.engine.stack_stx(&ctx, amount, &pox_addr(1), start, 1, &bad_key),
        Err(PoxError::InvalidSignerKey)
    );
}

#[test]
fn preset_authorization_replaces_signature() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let signer = signer_privk(1);
    let key = signer_key(&signer);
    let signer_principal = PrincipalData::from(StacksAddress::p2pkh(
        false,
        &Secp256k1PublicKey::from_private(&signer),
    ));
    sim.fund(&[&alice, &bob], INITIAL_BALANCE);

    let amount = 10_000_000;
    let addr = pox_addr(1);
    let topic = Pox4SignatureTopic::StackStx;

    assert_eq!(
        sim.engine.set_signer_key_authorization(
            &sim.ctx(&alice), &addr, 1, 0, topic, &key, true, amount, 3
        ),
        Err(PoxError::NotAllowed)
    );
    assert_eq!(
        sim.engine.set_signer_key_authorization(
            &sim.ctx(&signer_principal), &addr, 0, 0, topic, &key, true, amount, 3
        ),
        Err(PoxError::InvalidLockPeriod)
    );
    assert_eq!(
        sim.engine.set_signer_key_authorization(
            &sim.ctx(&signer_principal), &addr, 1, 0, topic, &key, true, amount, 3
        ),
        Ok(true)
    );

    let auth = SignerAuth::preset(key, amount, 3);
    let start = sim.next_cycle_start();
    sim.engine
        .verify_signer_key_sig(&addr, 0, topic, 1, &auth, amount)
        .unwrap();
    sim.engine
        .stack_stx(&sim.ctx(&alice), amount, &addr, start, 1, &auth)
        .unwrap();

    assert_eq!(
        sim.engine
            .stack_stx(&sim.ctx(&bob), amount, &addr, start, 1, &auth),
        Err(PoxError::ReusedSignerKey)
    );
    assert_eq!(
        sim.engine.set_signer_key_authorization(
            &sim.ctx(&signer_principal), &addr, 1, 0, topic, &key, true, amount, 3
        ),
        Err(PoxError::SignerAuthUsed)
    );

    sim.advance_to_cycle(2);
    assert_eq!(
        sim.engine.set_signer_key_authorization(
            &sim.ctx(&signer_principal), &addr, 1, 1, topic, &key, true, amount, 4
        ),
        Err(PoxError::InvalidRewardCycle)
    );
}

#[test]
fn contract_caller_needs_an_allowance() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let contract = PrincipalData::Contract(StacksAddress::new(26, Hash160([9; 20])), "pool".into());
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);

    let amount = 10_000_000;
    let start = sim.next_cycle_start();
    let via_contract = CallContext::via_contract(alice.clone(), contract.clone(), sim.height);
    let auth = sim.sign(&signer, &pox_addr(1), 0, Pox4SignatureTopic::StackStx, 1, amount);

    assert_eq!(
        sim.engine
            .stack_stx(&via_contract, amount, &pox_addr(1), start, 1, &auth),
        Err(PoxError::PermissionDenied)
    );
    assert_eq!(
        sim.engine.allow_contract_caller(&via_contract, &contract, None),
        Err(PoxError::PermissionDenied)
    );
    assert_eq!(
        sim.engine
            .allow_contract_caller(&sim.ctx(&alice), &contract, Some(sim.height)),
        Err(PoxError::Expired)
    );
    assert_eq!(
        sim.engine
            .allow_contract_caller(&sim.ctx(&alice), &contract, Some(100)),
        Ok(true)
    );
    assert_eq!(
        sim.engine.get_allowance_contract_callers(&alice, &contract),
        Some(Some(100))
    );
    assert!(sim
        .engine
        .check_caller_allowed(&CallContext::via_contract(alice.clone(), contract.clone(), 99)));
    assert!(!sim
        .engine
        .check_caller_allowed(&CallContext::via_contract(alice.clone(), contract.clone(), 100)));

    sim.engine
        .stack_stx(&via_contract, amount, &pox_addr(1), start, 1, &auth)
        .unwrap();

    assert_eq!(
        sim.engine.disallow_contract_caller(&sim.ctx(&alice), &contract),
        Ok(true)
    );
    assert_eq!(
        sim.engine.disallow_contract_caller(&sim.ctx(&alice), &contract),
        Ok(false)
    );
    assert!(!sim.engine.check_caller_allowed(&via_contract));
}

#[test]
fn delegated_stx_reach_reward_set_only_through_commit() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let carol = principal(3);
    let pool = principal(10);
    let pool_addr = pox_addr(10);
    let signer = signer_privk(1);
    sim.fund(&[&alice, &bob, &carol], INITIAL_BALANCE);

    for stacker in [&alice, &bob, &carol] {
        sim.engine
            .delegate_stx(&sim.ctx(stacker), 50_000_000, &pool, None, Some(&pool_addr))
            .unwrap();
    }

    let pool_ctx = sim.ctx(&pool);
    let receipt = sim
        .engine
        .delegate_stack_stx(&pool_ctx, &alice, 20_000_000, &pool_addr, CYCLE_LEN, 2)
        .unwrap();
    assert_eq!(receipt.signer_key, None);
    assert_eq!(receipt.unlock_burn_height, 3 * CYCLE_LEN);
    assert_eq!(sim.engine.get_account(&alice, 0).locked, 20_000_000);

    let info = sim.stacker_info(&alice).unwrap();
    assert_eq!(info.delegated_to, Some(pool.clone()));
    assert!(info.reward_set_indexes.is_empty());

    // locked, but not yet in any reward set
    assert_eq!(sim.engine.get_reward_set_size(1), 0);
    assert_eq!(sim.engine.get_total_ustx_stacked(1), 0);
    assert_eq!(
        sim.engine.get_partial_stacked_by_cycle(&pool_addr, 1, &pool),
        Some(20_000_000)
    );

    let commit = sim.sign(&signer, &pool_addr, 1, Pox4SignatureTopic::AggregationCommit, 1, 20_000_000);
    assert_eq!(
        sim.engine
            .stack_aggregation_commit_indexed(&pool_ctx, &pool_addr, 1, &commit),
        Ok(0)
    );
    assert_eq!(sim.engine.get_reward_set_size(1), 1);
    assert_eq!(sim.engine.get_total_ustx_stacked(1), 20_000_000);
    let entry = sim.engine.get_reward_set_pox_address(1, 0).unwrap();
    assert_eq!(entry.stacker, None);
    assert_eq!(entry.signer, signer_key(&signer));
    assert_eq!(sim.engine.get_partial_stacked_by_cycle(&pool_addr, 1, &pool), None);
    assert_eq!(
        sim.engine.get_partial_stacked_by_cycle(&pool_addr, 2, &pool),
        Some(20_000_000)
    );
    assert_eq!(sim.engine.get_reward_set_size(2), 0);

    // a second member joins and the pool folds it into the committed slot
    sim.engine
        .delegate_stack_stx(&pool_ctx, &bob, 5_000_000, &pool_addr, CYCLE_LEN, 1)
        .unwrap();
    let increase = sim.sign(
        &signer,
        &pool_addr,
        1,
        Pox4SignatureTopic::AggregationIncrease,
        1,
        25_000_000,
    );
    assert_eq!(
        sim.engine
            .stack_aggregation_increase(&pool_ctx, &pool_addr, 1, 0, &increase),
        Ok(true)
    );
    assert_eq!(sim.engine.get_reward_set_size(1), 1);
    assert_eq!(sim.engine.get_total_ustx_stacked(1), 25_000_000);
    assert_eq!(
        sim.engine.get_reward_set_pox_address(1, 0).unwrap().total_ustx,
        25_000_000
    );

    sim.engine
        .delegate_stack_stx(&pool_ctx, &carol, 5_000_000, &pool_addr, CYCLE_LEN, 1)
        .unwrap();
    let any = SignerAuth::preset(signer_key(&signer), 0, 0);
    assert_eq!(
        sim.engine
            .stack_aggregation_increase(&pool_ctx, &pool_addr, 1, 4, &any),
        Err(PoxError::DelegationNoRewardSlot)
    );
    assert_eq!(
        sim.engine
            .stack_aggregation_commit(&pool_ctx, &pool_addr, 3, &any),
        Err(PoxError::NoSuchPrincipal)
    );
    let commit = sim.sign(&signer, &pool_addr, 1, Pox4SignatureTopic::AggregationCommit, 1, 5_000_000);
    assert_eq!(
        sim.engine
            .stack_aggregation_commit(&pool_ctx, &pool_addr, 1, &commit),
        Ok(true)
    );
    assert_eq!(sim.engine.get_reward_set_size(1), 2);
    assert_eq!(sim.engine.get_total_ustx_stacked(1), 30_000_000);
}

#[test]
fn aggregation_increase_rejects_solo_slot() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let pool = principal(10);
    let addr = pox_addr(10);
    let signer = signer_privk(1);
    sim.fund(&[&alice, &bob], INITIAL_BALANCE);

    sim.stack(&alice, 10_000_000, &addr, 1, &signer).unwrap();
    sim.engine
        .delegate_stx(&sim.ctx(&bob), 10_000_000, &pool, None, None)
        .unwrap();
    sim.engine
        .delegate_stack_stx(&sim.ctx(&pool), &bob, 10_000_000, &addr, CYCLE_LEN, 1)
        .unwrap();

    let increase = sim.sign(&signer, &addr, 1, Pox4SignatureTopic::AggregationIncrease, 1, 20_000_000);
    assert_eq!(
        sim.engine
            .stack_aggregation_increase(&sim.ctx(&pool), &addr, 1, 0, &increase),
        Err(PoxError::DelegationWrongRewardSlot)
    );
}

#[test]
fn delegate_stack_stx_enforces_the_grant() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let carol = principal(3);
    let pool = principal(10);
    let mallory = principal(66);
    let pool_addr = pox_addr(10);
    sim.fund(&[&alice, &bob, &carol], INITIAL_BALANCE);

    sim.engine
        .delegate_stx(&sim.ctx(&alice), 10_000_000, &pool, Some(2_000), Some(&pool_addr))
        .unwrap();

    let pool_ctx = sim.ctx(&pool);
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&sim.ctx(&mallory), &alice, 5_000_000, &pool_addr, CYCLE_LEN, 1),
        Err(PoxError::PermissionDenied)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&pool_ctx, &alice, 5_000_000, &pox_addr(11), CYCLE_LEN, 1),
        Err(PoxError::DelegationPoxAddrRequired)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&pool_ctx, &alice, 20_000_000, &pool_addr, CYCLE_LEN, 1),
        Err(PoxError::DelegationTooMuchLocked)
    );
    // the lock would end at 2100, after the grant expires
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&pool_ctx, &alice, 5_000_000, &pool_addr, CYCLE_LEN, 1),
        Err(PoxError::DelegationExpiresDuringLock)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&pool_ctx, &bob, 5_000_000, &pool_addr, CYCLE_LEN, 1),
        Err(PoxError::NoSuchPrincipal)
    );

    sim.stack(&carol, 5_000_000, &pool_addr, 1, &signer_privk(1)).unwrap();
    sim.engine
        .delegate_stx(&sim.ctx(&carol), 10_000_000, &pool, None, None)
        .unwrap();
    assert_eq!(
        sim.engine
            .delegate_stack_stx(&pool_ctx, &carol, 5_000_000, &pool_addr, CYCLE_LEN, 1),
        Err(PoxError::AlreadyStacked)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_extend(&pool_ctx, &carol, &pool_addr, 1),
        Err(PoxError::NotDelegated)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_increase(&pool_ctx, &bob, &pool_addr, 1),
        Err(PoxError::NotCurrentStacker)
    );
}

#[test]
fn delegate_extends_and_increases_a_lock() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let pool = principal(10);
    let addr = pox_addr(10);
    sim.fund(&[&alice], INITIAL_BALANCE);

    sim.engine
        .delegate_stx(&sim.ctx(&alice), 30_000_000, &pool, None, None)
        .unwrap();
    let pool_ctx = sim.ctx(&pool);
    sim.engine
        .delegate_stack_stx(&pool_ctx, &alice, 10_000_000, &addr, CYCLE_LEN, 1)
        .unwrap();

    let receipt = sim
        .engine
        .delegate_stack_extend(&pool_ctx, &alice, &addr, 2)
        .unwrap();
    assert_eq!(receipt.unlock_burn_height, 4 * CYCLE_LEN);
    assert_eq!(sim.engine.get_account(&alice, 0).unlock_height, 4 * CYCLE_LEN);
    assert_eq!(sim.stacker_info(&alice).unwrap().lock_period, 3);
    for cycle in 1..=3 {
        assert_eq!(
            sim.engine.get_partial_stacked_by_cycle(&addr, cycle, &pool),
            Some(10_000_000)
        );
    }
    assert_eq!(
        sim.engine
            .delegate_stack_extend(&pool_ctx, &alice, &addr, 10),
        Err(PoxError::InvalidLockPeriod)
    );

    let receipt = sim
        .engine
        .delegate_stack_increase(&pool_ctx, &alice, &addr, 5_000_000)
        .unwrap();
    assert_eq!(receipt.total_locked, 15_000_000);
    assert_eq!(sim.engine.get_account(&alice, 0).locked, 15_000_000);
    for cycle in 1..=3 {
        assert_eq!(
            sim.engine.get_partial_stacked_by_cycle(&addr, cycle, &pool),
            Some(15_000_000)
        );
    }

    assert_eq!(
        sim.engine
            .delegate_stack_increase(&pool_ctx, &alice, &addr, 20_000_000),
        Err(PoxError::DelegationTooMuchLocked)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_increase(&pool_ctx, &alice, &pox_addr(11), 1),
        Err(PoxError::DelegationPoxAddrRequired)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_increase(&pool_ctx, &alice, &addr, 0),
        Err(PoxError::InvalidAmount)
    );
}

#[test]
fn stack_extend_pushes_unlock_height() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let addr = pox_addr(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice, &bob], INITIAL_BALANCE);

    sim.stack(&alice, 10_000_000, &addr, 2, &signer).unwrap();
    sim.advance_to_cycle(1);

    let too_far = sim.sign(&signer, &addr, 1, Pox4SignatureTopic::StackExtend, 12, 0);
    assert_eq!(
        sim.engine
            .stack_extend(&sim.ctx(&alice), 12, &addr, &too_far),
        Err(PoxError::InvalidLockPeriod)
    );

    let auth = sim.sign(&signer, &addr, 1, Pox4SignatureTopic::StackExtend, 3, 0);
    let receipt = sim
        .engine
        .stack_extend(&sim.ctx(&alice), 3, &addr, &auth)
        .unwrap();
    assert_eq!(receipt.unlock_burn_height, 6 * CYCLE_LEN);
    assert_eq!(
        sim.engine.get_account(&alice, sim.height).unlock_height,
        6 * CYCLE_LEN
    );

    let info = sim.stacker_info(&alice).unwrap();
    assert_eq!(info.lock_period, 5);
    assert_eq!(info.reward_set_indexes.len(), 5);
    assert_eq!(sim.engine.get_reward_set_size(5), 1);
    assert_eq!(sim.engine.get_reward_set_size(6), 0);

    let auth = sim.sign(&signer, &addr, 1, Pox4SignatureTopic::StackExtend, 1, 0);
    assert_eq!(
        sim.engine.stack_extend(&sim.ctx(&bob), 1, &addr, &auth),
        Err(PoxError::StackExtendNotLocked)
    );
}

#[test]
fn stack_increase_raises_future_cycles() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let bob = principal(2);
    let carol = principal(3);
    let pool = principal(10);
    let addr = pox_addr(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice, &bob, &carol], INITIAL_BALANCE);

    sim.stack(&alice, 10_000_000, &addr, 3, &signer).unwrap();
    sim.advance_to_cycle(1);

    let auth = sim.sign(&signer, &addr, 1, Pox4SignatureTopic::StackIncrease, 3, 15_000_000);
    let receipt = sim
        .engine
        .stack_increase(&sim.ctx(&alice), 5_000_000, &auth)
        .unwrap();
    assert_eq!(receipt.total_locked, 15_000_000);

    assert_eq!(sim.engine.get_reward_set_pox_address(1, 0).unwrap().total_ustx, 10_000_000);
    assert_eq!(sim.engine.get_reward_set_pox_address(2, 0).unwrap().total_ustx, 15_000_000);
    assert_eq!(sim.engine.get_reward_set_pox_address(3, 0).unwrap().total_ustx, 15_000_000);
    assert_eq!(sim.engine.get_total_ustx_stacked(3), 15_000_000);

    let account = sim.engine.get_account(&alice, sim.height);
    assert_eq!(account.locked, 15_000_000);
    assert_eq!(account.unlocked, INITIAL_BALANCE - 15_000_000);
    assert_eq!(sim.stacker_info(&alice).unwrap().amount_locked, 15_000_000);

    let any = SignerAuth::preset(signer_key(&signer), u128::MAX, 0);
    assert_eq!(
        sim.engine.stack_increase(&sim.ctx(&alice), 0, &any),
        Err(PoxError::InvalidAmount)
    );
    assert_eq!(
        sim.engine
            .stack_increase(&sim.ctx(&alice), INITIAL_BALANCE, &any),
        Err(PoxError::InsufficientFunds)
    );
    assert_eq!(
        sim.engine.stack_increase(&sim.ctx(&bob), 1, &any),
        Err(PoxError::StackIncreaseNotLocked)
    );

    sim.engine
        .delegate_stx(&sim.ctx(&carol), 10_000_000, &pool, None, None)
        .unwrap();
    let start = sim.next_cycle_start();
    sim.engine
        .delegate_stack_stx(&sim.ctx(&pool), &carol, 10_000_000, &addr, start, 2)
        .unwrap();
    assert_eq!(
        sim.engine.stack_increase(&sim.ctx(&carol), 1, &any),
        Err(PoxError::IsDelegated)
    );
}

#[test]
fn funds_unlock_at_recorded_height() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let signer = signer_privk(1);
    sim.fund(&[&alice], INITIAL_BALANCE);

    let amount = 10_000_000;
    let receipt = sim.stack(&alice, amount, &pox_addr(1), 1, &signer).unwrap();
    assert_eq!(receipt.unlock_burn_height, 2 * CYCLE_LEN);

    let locked = sim.engine.get_account(&alice, 2 * CYCLE_LEN - 1);
    assert_eq!(locked.locked, amount);
    assert_eq!(locked.unlocked, INITIAL_BALANCE - amount);

    let unlocked = sim.engine.get_account(&alice, 2 * CYCLE_LEN);
    assert_eq!(unlocked.locked, 0);
    assert_eq!(unlocked.unlocked, INITIAL_BALANCE);

    sim.advance_to(2 * CYCLE_LEN);
    assert!(sim.stacker_info(&alice).is_none());
    let receipt = sim
        .stack(&alice, INITIAL_BALANCE, &pox_addr(1), 1, &signer)
        .unwrap();
    assert_eq!(receipt.unlock_burn_height, 4 * CYCLE_LEN);
}

#[test]
fn burnchain_parameters_configure_once() {
    let mut engine = PoxEngine::testnet();
    assert_eq!(
        engine.set_burnchain_parameters(0, 20, 20, 1),
        Err(PoxError::InvalidParameters)
    );
    assert_eq!(engine.set_burnchain_parameters(100, 5, 20, 1_000), Ok(true));
    assert_eq!(
        engine.set_burnchain_parameters(100, 5, 20, 1_000),
        Err(PoxError::AlreadyConfigured)
    );
    assert_eq!(
        engine.burn_height_to_reward_cycle(99),
        Err(PoxError::HeightPrecedesGenesis)
    );
    assert_eq!(engine.burn_height_to_reward_cycle(120), Ok(1));
    assert_eq!(engine.reward_cycle_to_burn_height(3), Ok(160));
    assert_eq!(
        engine.current_pox_reward_cycle(&CallContext::new(principal(1), 139)),
        Ok(1)
    );
}

#[test]
fn reward_set_allocates_slots_per_signer() {
    let mut sim = PoxTestSim::new();
    let stackers = [principal(1), principal(2), principal(3)];
    let signer = signer_privk(1);
    // 1M STX each
    sim.fund(&[&stackers[0], &stackers[1], &stackers[2]], 1_000_000_000_000);

    for stacker in stackers.iter() {
        sim.stack(stacker, 200_000_000_000, &pox_addr(1), 1, &signer)
            .unwrap();
    }

    let reward_set = sim.engine.get_reward_set(1).unwrap();
    assert_eq!(reward_set.pox_ustx_threshold, 10_000_000_000);
    assert_eq!(reward_set.rewarded_addresses.len(), 60);
    assert!(reward_set.rewarded_addresses.iter().all(|a| *a == pox_addr(1)));
    assert!(reward_set.missed_reward_slots.is_empty());
    assert_eq!(
        reward_set.signers,
        Some(vec![SignerEntry {
            signing_key: signer_key(&signer),
            stacked_amt: 600_000_000_000,
            weight: 60,
        }])
    );

    let empty = sim.engine.get_reward_set(2).unwrap();
    assert!(empty.rewarded_addresses.is_empty());
    assert_eq!(empty.signers, None);
}

#[test]
fn only_the_locking_delegate_changes_a_delegated_lock() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let pool_a = principal(10);
    let pool_b = principal(11);
    let addr = pox_addr(10);
    sim.fund(&[&alice], INITIAL_BALANCE);

    sim.engine
        .delegate_stx(&sim.ctx(&alice), 30_000_000, &pool_a, None, None)
        .unwrap();
    sim.engine
        .delegate_stack_stx(&sim.ctx(&pool_a), &alice, 10_000_000, &addr, CYCLE_LEN, 1)
        .unwrap();

    // alice moves her grant to another pool while still locked by the first
    sim.engine.revoke_delegate_stx(&sim.ctx(&alice)).unwrap();
    sim.engine
        .delegate_stx(&sim.ctx(&alice), 30_000_000, &pool_b, None, None)
        .unwrap();

    let pool_b_ctx = sim.ctx(&pool_b);
    assert_eq!(
        sim.engine
            .delegate_stack_increase(&pool_b_ctx, &alice, &addr, 5_000_000),
        Err(PoxError::PermissionDenied)
    );
    assert_eq!(
        sim.engine
            .delegate_stack_extend(&pool_b_ctx, &alice, &addr, 1),
        Err(PoxError::PermissionDenied)
    );
    // the first pool no longer holds a grant either
    assert_eq!(
        sim.engine
            .delegate_stack_extend(&sim.ctx(&pool_a), &alice, &addr, 1),
        Err(PoxError::NoSuchPrincipal)
    );

    let account = sim.engine.get_account(&alice, sim.height);
    assert_eq!(account.locked, 10_000_000);
    assert_eq!(account.unlock_height, 2 * CYCLE_LEN);
    let info = sim.stacker_info(&alice).unwrap();
    assert_eq!(info.delegated_to, Some(pool_a.clone()));
    assert_eq!(info.lock_period, 1);
    assert_eq!(
        sim.engine.get_partial_stacked_by_cycle(&addr, 1, &pool_a),
        Some(10_000_000)
    );
    for cycle in 1..=2 {
        assert_eq!(sim.engine.get_partial_stacked_by_cycle(&addr, cycle, &pool_b), None);
    }
}

#[test]
fn reward_set_of_an_unused_cycle_is_empty() {
    let engine = PoxEngine::testnet();
    let reward_set = engine.get_reward_set(1).unwrap();
    assert!(reward_set.rewarded_addresses.is_empty());
    assert!(reward_set.missed_reward_slots.is_empty());
    assert_eq!(reward_set.signers, None);
}

#[test]
fn single_write_calls_leave_no_trace_when_rejected() {
    let mut sim = PoxTestSim::new();
    let alice = principal(1);
    let pool = principal(10);
    let contract = PrincipalData::Contract(StacksAddress::new(26, Hash160([9; 20])), "pool".into());
    sim.fund(&[&alice], u128::MAX - 1);
    let before = sim.engine.clone();

    assert_eq!(
        sim.engine.credit_account(&alice, 2),
        Err(PoxError::ArithmeticOverflow)
    );
    assert_eq!(
        sim.engine.revoke_delegate_stx(&sim.ctx(&alice)),
        Err(PoxError::DelegationAlreadyRevoked)
    );
    assert_eq!(
        sim.engine.delegate_stx(
            &sim.ctx(&alice),
            1,
            &pool,
            None,
            Some(&PoxAddress::new(7, vec![0; 20]))
        ),
        Err(PoxError::InvalidPoxAddress)
    );
    let via_contract = CallContext::via_contract(alice.clone(), contract.clone(), 0);
    assert_eq!(
        sim.engine.allow_contract_caller(&via_contract, &contract, None),
        Err(PoxError::PermissionDenied)
    );
    assert_eq!(sim.engine, before);

    sim.engine.credit_account(&alice, 1).unwrap();
    assert_eq!(sim.engine.get_account(&alice, 0).unlocked, u128::MAX);
}
