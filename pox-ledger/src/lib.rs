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

//! # pox-ledger: the Proof-of-Transfer stacking ledger.
//!
//! Reward-cycle arithmetic, STX lock accounting, solo and delegated
//! stacking, signer-key authorizations and per-cycle reward sets, driven as
//! a deterministic state machine by a caller-supplied burn height.

#![allow(clippy::too_many_arguments)]

#[allow(unused_imports)]
#[macro_use(o, slog_log, slog_trace, slog_debug, slog_info, slog_warn, slog_error)]
extern crate slog;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod util;

pub mod accounts;
pub mod address;
pub mod burnchain;
pub mod cli;
pub mod config;
pub mod errors;
pub mod pox;
pub mod reward_set;
pub mod signed_structured_data;
pub mod types;

pub use crate::errors::PoxError;
pub use crate::pox::{CallContext, PoxEngine};

pub mod consts {
    pub const CHAIN_ID_MAINNET: u32 = 0x00000001;
    pub const CHAIN_ID_TESTNET: u32 = 0x80000000;

    /// Address versions for standard principals
    pub const C32_ADDRESS_VERSION_MAINNET_SINGLESIG: u8 = 22; // P
    pub const C32_ADDRESS_VERSION_MAINNET_MULTISIG: u8 = 20; // M
    pub const C32_ADDRESS_VERSION_TESTNET_SINGLESIG: u8 = 26; // T
    pub const C32_ADDRESS_VERSION_TESTNET_MULTISIG: u8 = 21; // N

    /// One STX, in micro-STX
    pub const MICROSTACKS_PER_STACKS: u128 = 1_000_000;
}
