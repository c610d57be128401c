// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print learning actions and flow modifications in a human-friendly
//! manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both learnadm and integration tests.

use crate::engine::action::Action;
use crate::engine::flow_mod::FlowMod;
use crate::engine::learn::LearnAction;
use crate::engine::learn_delete::DeleteLearnAction;
use crate::engine::spec::FieldSpec;
use crate::engine::spec::SpecDst;
use crate::engine::spec::SpecSrc;
use std::io::Write;
use std::string::String;
use std::string::ToString;
use tabwriter::TabWriter;

/// Print a [`LearnAction`].
pub fn print_learn(learn: &LearnAction) -> std::io::Result<()> {
    print_learn_into(&mut std::io::stdout(), learn)
}

/// Print a [`LearnAction`] into a given writer.
pub fn print_learn_into(
    writer: &mut impl Write,
    learn: &LearnAction,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Learn")?;
    write_hrb(&mut t)?;
    writeln!(t, "TABLE\tSPEC\tPRI\tIDLE\tHARD\tFIN IDLE\tFIN HARD\tCOOKIE")?;
    writeln!(
        t,
        "{}\t{:?}\t{}\t{}\t{}\t{}\t{}\t{:#x} ({:?})",
        learn.table_id,
        learn.table_spec,
        learn.priority,
        learn.idle_timeout,
        learn.hard_timeout,
        learn.fin_idle_timeout,
        learn.fin_hard_timeout,
        learn.cookie,
        learn.cookie_spec,
    )?;
    t.flush()?;

    writeln!(t, "\nSpecs")?;
    write_hr(&mut t)?;
    print_specs(&mut t, &learn.specs)?;
    t.flush()?;

    writeln!(t, "\nActions")?;
    write_hr(&mut t)?;
    print_actions(&mut t, &learn.actions)?;
    t.flush()
}

/// Print a [`DeleteLearnAction`].
pub fn print_delete(delete: &DeleteLearnAction) -> std::io::Result<()> {
    print_delete_into(&mut std::io::stdout(), delete)
}

/// Print a [`DeleteLearnAction`] into a given writer.
pub fn print_delete_into(
    writer: &mut impl Write,
    delete: &DeleteLearnAction,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Learn Delete")?;
    write_hrb(&mut t)?;
    writeln!(t, "TABLE\tSPEC\tPRI\tCOOKIE")?;
    writeln!(
        t,
        "{}\t{:?}\t{}\t{:#x} ({:?})",
        delete.table_id,
        delete.table_spec,
        delete.priority,
        delete.cookie,
        delete.cookie_spec,
    )?;
    t.flush()?;

    writeln!(t, "\nSpecs")?;
    write_hr(&mut t)?;
    print_specs(&mut t, &delete.specs)?;
    t.flush()
}

/// Print a [`FlowMod`].
pub fn print_flow_mod(fm: &FlowMod) -> std::io::Result<()> {
    print_flow_mod_into(&mut std::io::stdout(), fm)
}

/// Print a [`FlowMod`] into a given writer.
pub fn print_flow_mod_into(
    writer: &mut impl Write,
    fm: &FlowMod,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Flow Mod")?;
    write_hrb(&mut t)?;
    writeln!(t, "CMD\tTABLE\tPRI\tIDLE\tHARD\tCOOKIE")?;
    let cookie = if fm.modify_cookie {
        format!("{:#x}", fm.new_cookie)
    } else {
        format!("{:#x}/{:#x}", fm.cookie, fm.cookie_mask)
    };
    writeln!(
        t,
        "{:?}\t{}\t{}\t{}\t{}\t{cookie}",
        fm.command, fm.table_id, fm.priority, fm.idle_timeout, fm.hard_timeout,
    )?;
    writeln!(t, "\nmatch: {}", fm.flow_match)?;
    t.flush()?;

    writeln!(t, "\nActions")?;
    write_hr(&mut t)?;
    print_actions(&mut t, &fm.actions)?;
    t.flush()
}

fn print_specs(t: &mut impl Write, specs: &[FieldSpec]) -> std::io::Result<()> {
    writeln!(t, "IDX\tSRC\tDST\tBITS\tDEFER")?;
    for (i, spec) in specs.iter().enumerate() {
        let src = match spec.src() {
            SpecSrc::Field(sf) => sf.to_string(),
            SpecSrc::Immediate(v) => format!("{v:#x}"),
        };
        let dst: String = match spec.dst() {
            SpecDst::Match(sf) => format!("match {sf}"),
            SpecDst::Load(sf) => format!("load {sf}"),
            SpecDst::Output => "output".to_string(),
            SpecDst::Reserved => "reserved".to_string(),
        };
        writeln!(t, "{i}\t{src}\t{dst}\t{}\t{}", spec.n_bits(), spec.defer())?;
    }
    Ok(())
}

fn print_actions(t: &mut impl Write, actions: &[Action]) -> std::io::Result<()> {
    if actions.is_empty() {
        return writeln!(t, "none");
    }
    for (i, action) in actions.iter().enumerate() {
        writeln!(t, "{i}\t{action}")?;
    }
    Ok(())
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn spec_table() {
        let learn: LearnAction =
            "table=3,NXM_NX_REG0[](defer=2),output:NXM_NX_REG1[0..15]"
                .parse()
                .unwrap();
        let mut out = Vec::new();
        print_learn_into(&mut out, &learn).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.contains("IDX"));
        assert!(out.contains("NXM_NX_REG0[]"));
        assert!(out.contains("match NXM_NX_REG0[]"));
        assert!(out.contains("output"));
        assert!(out.contains("none"));
    }
}
