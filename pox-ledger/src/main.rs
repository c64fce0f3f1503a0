//! # pox-ledger: command line tools for the PoX stacking ledger.
//!
//! Generates and checks signer-key authorizations for stacking calls, and
//! answers reward-cycle questions for a configured burnchain.
//!
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
extern crate serde_json;
extern crate slog;

use std::process;

use clap::Parser;
use pox_ledger::cli::{
    Cli, Command, ConfigArgs, GenerateStackingSignatureArgs, MessageHashArgs, RewardCycleArgs,
};
use pox_ledger::config::Config;
use pox_ledger::{debug, error, info};
use slog::{slog_debug, slog_error, slog_info};

fn load_config(path: &std::path::Path) -> Result<Config, String> {
    Config::try_from(&path.to_path_buf()).map_err(|e| format!("Invalid config: {e}"))
}

fn handle_generate_stacking_signature(
    args: GenerateStackingSignatureArgs,
) -> Result<(), String> {
    debug!("Generating stacking signature...");
    let config = load_config(&args.config)?;
    let private_key = config
        .signer_private_key
        .as_ref()
        .ok_or_else(|| "Config has no signer_private_key".to_string())?;
    let output = args
        .auth
        .sign(private_key, config.to_chain_id())
        .map_err(|e| format!("Failed to sign: {e}"))?;

    if args.json {
        let json = serde_json::to_string(&output).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        println!(
            "\nSigner Public Key: 0x{}\nSigner Key Signature: 0x{}\n\n",
            output.signer_key, output.signer_signature
        );
        println!(
            "\nAuth ID: {}\nReward cycle: {}\nPeriod: {}\nMax amount: {}\nPoX address: {}\nMethod: {}\n",
            output.auth_id,
            output.reward_cycle,
            output.period,
            output.max_amount,
            output.pox_address,
            output.method
        );
    }
    Ok(())
}

fn handle_message_hash(args: MessageHashArgs) -> Result<(), String> {
    debug!("Computing signer key message hash...");
    let msg_hash = args
        .auth
        .message_hash(args.chain_id)
        .map_err(|e| format!("Failed to hash message: {e}"))?;
    println!("{}", msg_hash.to_hex());
    Ok(())
}

fn handle_reward_cycle(args: RewardCycleArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let params = config.pox_parameters();
    let reward_cycle = params
        .burn_height_to_reward_cycle(args.burn_height)
        .map_err(|e| format!("No reward cycle for height {}: {e}", args.burn_height))?;
    let cycle_start = params
        .reward_cycle_to_burn_height(reward_cycle)
        .map_err(|e| e.to_string())?;
    let json = serde_json::json!({
        "burnHeight": args.burn_height.to_string(),
        "rewardCycle": reward_cycle.to_string(),
        "rewardCycleStart": cycle_start.to_string(),
        "inPreparePhase": params.is_in_prepare_phase(args.burn_height),
    });
    println!("{json}");
    Ok(())
}

fn handle_check_config(args: ConfigArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    // building the engine applies the burnchain table
    config.make_engine().map_err(|e| format!("Invalid config: {e}"))?;
    info!("Config is valid");
    println!("Config: {config}");
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::GenerateStackingSignature(args) => handle_generate_stacking_signature(args),
        Command::MessageHash(args) => handle_message_hash(args),
        Command::RewardCycle(args) => handle_reward_cycle(args),
        Command::CheckConfig(args) => handle_check_config(args),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
