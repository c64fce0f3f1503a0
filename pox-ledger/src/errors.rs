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

use crate::accounts::LockingError;

/// Every way a ledger call can be rejected. The numeric codes are stable and
/// match the error constants of the PoX boot contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum PoxError {
    #[error("stacker has insufficient unlocked funds")]
    InsufficientFunds,
    #[error("lock period out of range")]
    InvalidLockPeriod,
    #[error("principal is already stacking")]
    AlreadyStacked,
    #[error("no such principal")]
    NoSuchPrincipal,
    #[error("expired")]
    Expired,
    #[error("funds are already locked")]
    StxLocked,
    #[error("caller is not allowed to act for the sender")]
    PermissionDenied,
    #[error("amount does not meet the stacking minimum")]
    ThresholdNotMet,
    #[error("PoX address already in use")]
    PoxAddressInUse,
    #[error("invalid PoX address")]
    InvalidPoxAddress,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("not allowed")]
    NotAllowed,
    #[error("principal is already delegating")]
    AlreadyDelegated,
    #[error("delegation expires during the lock period")]
    DelegationExpiresDuringLock,
    #[error("delegated amount is too small for this lock")]
    DelegationTooMuchLocked,
    #[error("delegation requires a different PoX address")]
    DelegationPoxAddrRequired,
    #[error("start burn height does not fall in an allowed reward cycle")]
    InvalidStartBurnHeight,
    #[error("principal is not currently stacking")]
    NotCurrentStacker,
    #[error("stack-extend called without an active lock")]
    StackExtendNotLocked,
    #[error("stack-increase called without an active lock")]
    StackIncreaseNotLocked,
    #[error("no reward slot at that index")]
    DelegationNoRewardSlot,
    #[error("reward slot does not belong to this delegate")]
    DelegationWrongRewardSlot,
    #[error("stacker is stacking through a delegate")]
    IsDelegated,
    #[error("stacker is not stacking through a delegate")]
    NotDelegated,
    #[error("invalid signer key")]
    InvalidSignerKey,
    #[error("signer key authorization already consumed")]
    ReusedSignerKey,
    #[error("delegation already revoked")]
    DelegationAlreadyRevoked,
    #[error("signature does not match the signer key")]
    InvalidSignaturePubkey,
    #[error("failed to recover a public key from the signature")]
    InvalidSignatureRecover,
    #[error("invalid reward cycle")]
    InvalidRewardCycle,
    #[error("amount exceeds the maximum authorized by the signer")]
    SignerAuthAmountTooHigh,
    #[error("signer authorization already used")]
    SignerAuthUsed,
    #[error("invalid increase")]
    InvalidIncrease,
    #[error("corrupted stacking state")]
    CorruptedState,
    #[error("unreachable stacking state")]
    Unreachable,
    #[error("burnchain parameters are already configured")]
    AlreadyConfigured,
    #[error("invalid burnchain parameters")]
    InvalidParameters,
    #[error("burn height precedes the first burnchain block height")]
    HeightPrecedesGenesis,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl PoxError {
    /// The stable error code surfaced to callers
    pub fn code(&self) -> u32 {
        match self {
            PoxError::InsufficientFunds => 1,
            PoxError::InvalidLockPeriod => 2,
            PoxError::AlreadyStacked => 3,
            PoxError::NoSuchPrincipal => 4,
            PoxError::Expired => 5,
            PoxError::StxLocked => 6,
            PoxError::PermissionDenied => 9,
            PoxError::ThresholdNotMet => 11,
            PoxError::PoxAddressInUse => 12,
            PoxError::InvalidPoxAddress => 13,
            PoxError::InvalidAmount => 18,
            PoxError::NotAllowed => 19,
            PoxError::AlreadyDelegated => 20,
            PoxError::DelegationExpiresDuringLock => 21,
            PoxError::DelegationTooMuchLocked => 22,
            PoxError::DelegationPoxAddrRequired => 23,
            PoxError::InvalidStartBurnHeight => 24,
            PoxError::NotCurrentStacker => 25,
            PoxError::StackExtendNotLocked => 26,
            PoxError::StackIncreaseNotLocked => 27,
            PoxError::DelegationNoRewardSlot => 28,
            PoxError::DelegationWrongRewardSlot => 29,
            PoxError::IsDelegated => 30,
            PoxError::NotDelegated => 31,
            PoxError::InvalidSignerKey => 32,
            PoxError::ReusedSignerKey => 33,
            PoxError::DelegationAlreadyRevoked => 34,
            PoxError::InvalidSignaturePubkey => 35,
            PoxError::InvalidSignatureRecover => 36,
            PoxError::InvalidRewardCycle => 37,
            PoxError::SignerAuthAmountTooHigh => 38,
            PoxError::SignerAuthUsed => 39,
            PoxError::InvalidIncrease => 40,
            PoxError::CorruptedState => 254,
            PoxError::Unreachable => 255,
            // registry and arithmetic failures live outside the contract's code space
            PoxError::AlreadyConfigured => 1001,
            PoxError::InvalidParameters => 1002,
            PoxError::HeightPrecedesGenesis => 1003,
            PoxError::ArithmeticOverflow => 1004,
        }
    }
}

impl From<LockingError> for PoxError {
    fn from(e: LockingError) -> PoxError {
        match e {
            LockingError::PoxAlreadyLocked => PoxError::StxLocked,
            LockingError::PoxInsufficientBalance => PoxError::InsufficientFunds,
            LockingError::PoxExtendNotLocked => PoxError::StackExtendNotLocked,
            LockingError::PoxIncreaseNotLocked => PoxError::StackIncreaseNotLocked,
            LockingError::PoxInvalidIncrease => PoxError::InvalidIncrease,
            LockingError::Overflow => PoxError::ArithmeticOverflow,
        }
    }
}
