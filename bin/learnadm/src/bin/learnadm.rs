// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use clap::Parser;

use flowlearn::ExecCtx;
use flowlearn::NullLog;
use flowlearn::PrintlnLog;
use flowlearn::api::API_VERSION;
use flowlearn::engine::AtomicCounters;
use flowlearn::engine::Flow;
use flowlearn::engine::PacketCtx;
use flowlearn::engine::wire::to_hex;
use learnadm::load_actions;
use learnadm::print_actions_into;
use learnadm::print_counters_into;
use learnadm::print_report_into;
use std::io::Write;

/// Inspect and exercise OpenFlow learning actions.
///
/// Wherever an ACTIONS argument is taken it may be hex wire bytes or
/// an action list in the text grammar. A bare list of learn arguments
/// (`table=10,NXM_OF_ETH_SRC[]`) is read as a single learn action.
#[derive(Debug, Parser)]
#[command(version=learnadm_version())]
enum Command {
    /// Parse actions and print their canonical text and encoding.
    Parse { actions: String },

    /// Decode wire bytes given in hex.
    Decode {
        hex: String,

        /// Dump the decoded actions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check actions for installation in a rule matching a flow.
    Check {
        actions: String,

        /// The flow of the rule, as `field=value` pairs.
        #[arg(long, default_value = "")]
        flow: String,
    },

    /// Execute actions for a packet and print the requests they make.
    Exec {
        actions: String,

        /// The packet's fields, as `field=value` pairs.
        #[arg(long, default_value = "")]
        flow: String,

        /// The table of the rule whose actions are running.
        #[arg(long, default_value_t = 0)]
        rule_table: u8,

        /// Run the actions this many times, as for a series of packets.
        #[arg(long, default_value_t = 1)]
        times: u32,

        /// Dump the flow modifications as JSON.
        #[arg(long)]
        json: bool,

        /// Print engine log messages.
        #[arg(short, long)]
        verbose: bool,
    },
}

fn learnadm_version() -> String {
    format!("{}.{API_VERSION}", env!("CARGO_PKG_VERSION"))
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    let mut out = std::io::stdout().lock();
    match cmd {
        Command::Parse { actions } => {
            let actions = load_actions(&actions)?;
            writeln!(out, "{actions}\n")?;
            print_actions_into(&mut out, &actions)?;
            writeln!(out, "{}", to_hex(&actions.to_bytes()?))?;
        }

        Command::Decode { hex, json } => {
            let actions = load_actions(&hex)?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&actions)?)?;
            } else {
                writeln!(out, "{actions}\n")?;
                print_actions_into(&mut out, &actions)?;
            }
        }

        Command::Check { actions, flow } => {
            let actions = load_actions(&actions)?;
            let flow: Flow = flow.parse()?;
            learnadm::check(&actions, &flow)?;
            writeln!(out, "ok")?;
        }

        Command::Exec { actions, flow, rule_table, times, json, verbose } => {
            let mut actions = load_actions(&actions)?;
            let flow: Flow = flow.parse()?;
            let ectx = if verbose {
                ExecCtx { log: Box::new(PrintlnLog) }
            } else {
                ExecCtx { log: Box::new(NullLog) }
            };
            let counters = AtomicCounters::new();
            let pkt = PacketCtx { flow: &flow, rule_table_id: rule_table };

            let mut reports = vec![];
            for pass in 1..=times {
                let report =
                    learnadm::execute(&mut actions, &ectx, &counters, &pkt);
                if !json {
                    print_report_into(&mut out, pass, &report)?;
                }
                reports.push(report);
            }

            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&reports)?)?;
            } else {
                print_counters_into(&mut out, &counters)?;
            }
        }
    }

    Ok(())
}
