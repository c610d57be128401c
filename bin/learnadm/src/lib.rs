// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Learning action administration library.
//!
//! Everything `learnadm` does beyond argument handling lives here so
//! it can be tested without a terminal.

use flowlearn::ExecCtx;
use flowlearn::api::CounterSelector;
use flowlearn::engine::Action;
use flowlearn::engine::ActionList;
use flowlearn::engine::AtomicCounters;
use flowlearn::engine::DecodeError;
use flowlearn::engine::Flow;
use flowlearn::engine::FlowMod;
use flowlearn::engine::LearnAction;
use flowlearn::engine::PacketCtx;
use flowlearn::engine::ParseErr;
use flowlearn::engine::ValidationError;
use flowlearn::engine::check::check_actions;
use flowlearn::engine::wire::from_hex;
use flowlearn::print::print_delete_into;
use flowlearn::print::print_flow_mod_into;
use flowlearn::print::print_learn_into;
use flowlearn::print::write_hrb;
use serde::Serialize;
use std::io::Write;
use tabwriter::TabWriter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad hex input: {0}")]
    Hex(String),

    #[error("failed to decode actions: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to parse actions: {0}")]
    Parse(#[from] ParseErr),

    #[error("actions rejected: {0}")]
    Invalid(#[from] ValidationError),
}

/// Whether `input` reads as hex wire bytes rather than grammar text.
pub fn is_hex(input: &str) -> bool {
    let digits = input.trim().trim_start_matches("0x");
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_hexdigit() || c.is_ascii_whitespace())
}

/// Load an action list from the command line.
///
/// Hex input is decoded from the wire format. Anything else is parsed
/// as an action list, or failing that as the arguments of a single
/// learn action (`table=10,NXM_OF_ETH_SRC[]`), which is how operators
/// usually write one.
pub fn load_actions(input: &str) -> Result<ActionList, Error> {
    if is_hex(input) {
        let bytes = from_hex(input).map_err(Error::Hex)?;
        return Ok(ActionList::decode(&bytes, 0)?);
    }

    match input.parse::<ActionList>() {
        Ok(actions) => Ok(actions),
        Err(ParseErr::UnknownAction(_)) => {
            let learn: LearnAction = input.parse()?;
            Ok(ActionList::from(vec![Action::Learn(learn)]))
        }
        Err(e) => Err(e.into()),
    }
}

/// Check `actions` for installation in a rule matching `flow`.
pub fn check(actions: &ActionList, flow: &Flow) -> Result<(), Error> {
    Ok(check_actions(actions, flow)?)
}

/// What one pass over an action list produced.
#[derive(Debug, Default, Serialize)]
pub struct ExecReport {
    pub flow_mods: Vec<FlowMod>,
    /// Previous values returned by increment actions, in order.
    pub counter_values: Vec<u64>,
}

/// Run every learning and counter action of `actions` once for `pkt`.
///
/// Timeout actions run when a rule expires, not per packet, so they
/// are skipped here. Ordinary actions have no effect on the learned
/// state and are skipped as well.
pub fn execute(
    actions: &mut ActionList,
    ectx: &ExecCtx,
    counters: &AtomicCounters,
    pkt: &PacketCtx,
) -> ExecReport {
    let mut report = ExecReport::default();

    for action in actions.iter_mut() {
        match action {
            Action::Learn(learn) => {
                report.flow_mods.push(learn.execute(ectx, counters, pkt))
            }
            Action::Delete(delete) => {
                report.flow_mods.push(delete.execute(ectx, counters, pkt))
            }
            Action::IncrementTableId(_) | Action::IncrementCookie => {
                report.counter_values.extend(action.execute_counter(counters))
            }
            _ => (),
        }
    }

    report
}

/// Print each action: learning actions as tables, the rest as text.
pub fn print_actions_into(
    out: &mut impl Write,
    actions: &ActionList,
) -> std::io::Result<()> {
    for action in actions.iter() {
        match action {
            Action::Learn(learn) => print_learn_into(out, learn)?,
            Action::Delete(delete) => print_delete_into(out, delete)?,
            other => writeln!(out, "{other}")?,
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Print what pass number `pass` of [`execute`] produced.
pub fn print_report_into(
    out: &mut impl Write,
    pass: u32,
    report: &ExecReport,
) -> std::io::Result<()> {
    writeln!(out, "Packet {pass}")?;
    write_hrb(out)?;
    if !report.counter_values.is_empty() {
        writeln!(out, "counter values: {:?}\n", report.counter_values)?;
    }
    for fm in &report.flow_mods {
        print_flow_mod_into(out, fm)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Print the counters in a table.
pub fn print_counters_into(
    writer: &mut impl Write,
    counters: &AtomicCounters,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "INGRESS\tEGRESS\tCOOKIE")?;
    writeln!(
        t,
        "{}\t{}\t{:#x}",
        counters.current(CounterSelector::Ingress),
        counters.current(CounterSelector::Egress),
        counters.current_cookie(),
    )?;
    t.flush()
}

#[cfg(test)]
mod test {
    use super::*;
    use flowlearn::NullLog;
    use flowlearn::engine::flow_mod::FlowModCommand;

    #[test]
    fn hex_detection() {
        assert!(is_hex("0xffff0010"));
        assert!(is_hex("ffff 0010 0000 2320"));
        assert!(!is_hex("increment_cookie"));
        assert!(!is_hex("table=10"));
        assert!(!is_hex("0x"));
    }

    #[test]
    fn load_text_and_hex() {
        let text = load_actions("increment_cookie,output:in_port").unwrap();
        assert_eq!(text.len(), 2);

        let hex = flowlearn::engine::wire::to_hex(&text.to_bytes().unwrap());
        assert_eq!(load_actions(&hex).unwrap(), text);
    }

    #[test]
    fn load_bare_learn() {
        let actions = load_actions("table=10,NXM_OF_ETH_SRC[]").unwrap();
        assert!(matches!(&actions[..], [Action::Learn(l)] if l.table_id == 10));

        assert!(matches!(
            load_actions("table=10,NXM_OF_NOPE[]"),
            Err(Error::Parse(ParseErr::UnknownField(_)))
        ));
    }

    #[test]
    fn execute_mixed_list() {
        let mut actions = load_actions(
            "increment_table_id(INGRESS),\
             learn_learn(use_atomic_table=INGRESS,NXM_OF_ETH_SRC[]),\
             learn_delete(table=5,NXM_OF_ETH_SRC[]),\
             timeout_act(increment_cookie)",
        )
        .unwrap();
        let ectx = ExecCtx { log: Box::new(NullLog) };
        let counters = AtomicCounters::new();
        let flow = Flow::new();
        let pkt = PacketCtx { flow: &flow, rule_table_id: 0 };

        let report = execute(&mut actions, &ectx, &counters, &pkt);
        assert_eq!(report.counter_values, vec![0]);
        assert_eq!(report.flow_mods.len(), 2);
        assert_eq!(report.flow_mods[0].table_id, 1);
        assert_eq!(report.flow_mods[1].command, FlowModCommand::Delete);
        assert_eq!(counters.current_cookie(), 0);

        let mut out = Vec::new();
        print_counters_into(&mut out, &counters).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("INGRESS"));
        assert!(out.contains("0x0"));
    }

    #[test]
    fn report_goes_to_one_writer() {
        let mut actions = load_actions(
            "increment_cookie,learn_learn(table=3,NXM_OF_ETH_SRC[])",
        )
        .unwrap();
        let ectx = ExecCtx { log: Box::new(NullLog) };
        let counters = AtomicCounters::new();
        let flow = Flow::new();
        let pkt = PacketCtx { flow: &flow, rule_table_id: 0 };
        let report = execute(&mut actions, &ectx, &counters, &pkt);

        let mut out = Vec::new();
        print_report_into(&mut out, 2, &report).unwrap();
        let out = String::from_utf8(out).unwrap();

        // Pass header, counter values, then the flow mod, in order.
        let pass = out.find("Packet 2").unwrap();
        let values = out.find("counter values: [0]").unwrap();
        let fm = out.find("Flow Mod").unwrap();
        assert!(pass < values && values < fm, "{out}");

        let mut out = Vec::new();
        print_actions_into(&mut out, &actions).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("increment_cookie\n"), "{out}");
        assert!(out.contains("Learn"), "{out}");
    }
}
