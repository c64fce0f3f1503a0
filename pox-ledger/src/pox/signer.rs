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

//! Signer-key authorizations: signatures over a pox-4 signer message, or
//! authorizations the signer registered ahead of time, each usable once.

use crate::address::PoxAddress;
use crate::errors::PoxError;
use crate::pox::store::{PresetAuthKey, SignerAuthKey};
use crate::pox::{CallContext, PoxEngine};
use crate::signed_structured_data::pox4::{
    make_pox_4_signer_key_message_hash, Pox4SignatureTopic,
};
use crate::types::{PrincipalData, StacksAddress, StacksPublicKeyBuffer};
use crate::util::hash::Sha256Sum;
use crate::util::secp256k1::{MessageSignature, Secp256k1PublicKey};

/// The signer arguments every stacking call carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerAuth {
    pub signer_sig: Option<MessageSignature>,
    pub signer_key: StacksPublicKeyBuffer,
    pub max_amount: u128,
    pub auth_id: u128,
}

impl SignerAuth {
    pub fn with_signature(
        signer_sig: MessageSignature,
        signer_key: StacksPublicKeyBuffer,
        max_amount: u128,
        auth_id: u128,
    ) -> SignerAuth {
        SignerAuth {
            signer_sig: Some(signer_sig),
            signer_key,
            max_amount,
            auth_id,
        }
    }

    /// Rely on an authorization registered with `set_signer_key_authorization`
    pub fn preset(signer_key: StacksPublicKeyBuffer, max_amount: u128, auth_id: u128) -> SignerAuth {
        SignerAuth {
            signer_sig: None,
            signer_key,
            max_amount,
            auth_id,
        }
    }
}

/// The signer key must decode to a curve point
pub fn check_signer_key(signer_key: &StacksPublicKeyBuffer) -> Result<(), PoxError> {
    signer_key
        .to_public_key()
        .map(|_| ())
        .ok_or(PoxError::InvalidSignerKey)
}

impl PoxEngine {
    pub fn get_signer_key_message_hash(
        &self,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: Pox4SignatureTopic,
        period: u128,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<Sha256Sum, PoxError> {
        Ok(make_pox_4_signer_key_message_hash(
            pox_addr,
            reward_cycle,
            &topic,
            self.chain_id(),
            period,
            max_amount,
            auth_id,
        )?)
    }

    /// Check a signer authorization for `amount` without consuming it
    pub fn verify_signer_key_sig(
        &self,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: Pox4SignatureTopic,
        period: u128,
        auth: &SignerAuth,
        amount: u128,
    ) -> Result<(), PoxError> {
        if amount > auth.max_amount {
            return Err(PoxError::SignerAuthAmountTooHigh);
        }
        match auth.signer_sig.as_ref() {
            Some(signer_sig) => {
                let msg_hash = self.get_signer_key_message_hash(
                    pox_addr,
                    reward_cycle,
                    topic,
                    period,
                    auth.max_amount,
                    auth.auth_id,
                )?;
                let recovered = Secp256k1PublicKey::recover_to_pubkey(msg_hash.as_bytes(), signer_sig)
                    .map_err(|_| PoxError::InvalidSignatureRecover)?;
                if recovered.to_bytes_compressed() != auth.signer_key.0 {
                    return Err(PoxError::InvalidSignaturePubkey);
                }
                Ok(())
            }
            None => {
                let key = PresetAuthKey {
                    pox_addr: pox_addr.clone(),
                    period,
                    reward_cycle,
                    topic,
                    signer_key: auth.signer_key,
                    max_amount: auth.max_amount,
                    auth_id: auth.auth_id,
                };
                let allowed = self
                    .store
                    .signer_key_authorizations
                    .get(&key)
                    .copied()
                    .unwrap_or(false);
                if !allowed {
                    return Err(PoxError::NotAllowed);
                }
                Ok(())
            }
        }
    }

    /// Verify a signer authorization and mark it used. Only ever called on a
    /// staged engine, so the mark is discarded if the call fails later.
    pub(crate) fn consume_signer_key_authorization(
        &mut self,
        pox_addr: &PoxAddress,
        reward_cycle: u128,
        topic: Pox4SignatureTopic,
        period: u128,
        auth: &SignerAuth,
        amount: u128,
    ) -> Result<(), PoxError> {
        self.verify_signer_key_sig(pox_addr, reward_cycle, topic, period, auth, amount)?;
        let replay_key = SignerAuthKey {
            signer_key: auth.signer_key,
            reward_cycle,
            topic,
            period,
            max_amount: auth.max_amount,
            auth_id: auth.auth_id,
        };
        if !self.store.used_signer_key_authorizations.insert(replay_key) {
            debug!("Signer key authorization already used";
                   "signer_key" => %auth.signer_key,
                   "reward_cycle" => %reward_cycle,
                   "topic" => %topic,
                   "auth_id" => %auth.auth_id);
            return Err(PoxError::ReusedSignerKey);
        }
        Ok(())
    }

    /// Register (or withdraw) an authorization in place of a signature. Only
    /// the account controlled by the signer key may do this.
    pub fn set_signer_key_authorization(
        &mut self,
        ctx: &CallContext,
        pox_addr: &PoxAddress,
        period: u128,
        reward_cycle: u128,
        topic: Pox4SignatureTopic,
        signer_key: &StacksPublicKeyBuffer,
        allowed: bool,
        max_amount: u128,
        auth_id: u128,
    ) -> Result<bool, PoxError> {
        self.as_single_write(|tx| {
            if !tx.check_caller_allowed(ctx) {
                return Err(PoxError::NotAllowed);
            }
            let signer_principal =
                PrincipalData::from(StacksAddress::p2pkh_from_buffer(tx.is_mainnet(), signer_key));
            if ctx.sender != signer_principal {
                return Err(PoxError::NotAllowed);
            }
            if period < 1 {
                return Err(PoxError::InvalidLockPeriod);
            }
            if reward_cycle < tx.current_pox_reward_cycle(ctx)? {
                return Err(PoxError::InvalidRewardCycle);
            }
            let key = PresetAuthKey {
                pox_addr: pox_addr.clone(),
                period,
                reward_cycle,
                topic,
                signer_key: *signer_key,
                max_amount,
                auth_id,
            };
            if tx
                .store
                .used_signer_key_authorizations
                .contains(&key.replay_key())
            {
                return Err(PoxError::SignerAuthUsed);
            }
            info!("Signer key authorization set";
                  "signer_key" => %signer_key,
                  "reward_cycle" => %reward_cycle,
                  "topic" => %topic,
                  "allowed" => allowed);
            tx.store.signer_key_authorizations.insert(key, allowed);
            Ok(allowed)
        })
    }
}
