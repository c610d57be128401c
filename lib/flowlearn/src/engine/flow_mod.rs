// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The flow modification produced by executing a learning action,
//! and the per-spec rules for building it.

use super::action::Action;
use super::counter::AtomicCounters;
use super::field::Flow;
use super::field::Match;
use super::field::Subfield;
use super::field::low_mask;
use super::spec::FieldSpec;
use super::spec::SpecDst;
use super::wire::DecodeError;
use crate::api::CounterSelector;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::cmp::min;
use serde::Serialize;

pub const OFPP_MAX: u16 = 0xff00;
pub const OFPP_IN_PORT: u16 = 0xfff8;
pub const OFPP_TABLE: u16 = 0xfff9;
pub const OFPP_NORMAL: u16 = 0xfffa;
pub const OFPP_FLOOD: u16 = 0xfffb;
pub const OFPP_ALL: u16 = 0xfffc;
pub const OFPP_CONTROLLER: u16 = 0xfffd;
pub const OFPP_LOCAL: u16 = 0xfffe;
pub const OFPP_NONE: u16 = 0xffff;

/// The table a reserved-destination spec resubmits to.
pub const RESERVED_RESUBMIT_TABLE: u8 = 2;

/// A buffer id meaning "no buffered packet".
pub const NO_BUFFER: u32 = u32::MAX;

/// The cookie value that leaves a learned rule's cookie untouched.
pub const COOKIE_UNCHANGED: u64 = u64::MAX;

/// The priority of a learned rule when none is given.
pub const DEFAULT_PRIORITY: u16 = 0x8000;

/// The table a learned rule goes to when none is given.
pub const DEFAULT_TABLE: u8 = 1;

/// Can a learned rule output to `port`?
///
/// Physical ports are allowed, as are the logical ports that make
/// sense for a learned rule.
pub fn output_port_allowed(port: u16) -> bool {
    port < OFPP_MAX
        || matches!(port, OFPP_IN_PORT | OFPP_FLOOD | OFPP_ALL | OFPP_LOCAL)
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
    pub struct FlowModFlags: u16 {
        const SEND_FLOW_REM = 1;
    }
}

impl FlowModFlags {
    pub fn from_wire(flags: u16) -> Result<Self, DecodeError> {
        Self::from_bits(flags).ok_or(DecodeError::UnsupportedFlags(flags))
    }
}

/// How the table of a learned rule is chosen.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum TableSpec {
    /// The table id carried by the action.
    #[default]
    Explicit = 0,
    /// The table of the rule whose action is executing.
    RuleTable = 2,
    /// The current value of the ingress counter.
    IngressAtomic = 3,
    /// The current value of the egress counter.
    EgressAtomic = 4,
}

impl TryFrom<u8> for TableSpec {
    type Error = DecodeError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Self::Explicit),
            2 => Ok(Self::RuleTable),
            3 => Ok(Self::IngressAtomic),
            4 => Ok(Self::EgressAtomic),
            _ => Err(DecodeError::BadTableSpec(val)),
        }
    }
}

impl TableSpec {
    pub fn atomic(sel: CounterSelector) -> Self {
        match sel {
            CounterSelector::Ingress => Self::IngressAtomic,
            CounterSelector::Egress => Self::EgressAtomic,
        }
    }

    pub fn counter(self) -> Option<CounterSelector> {
        match self {
            Self::IngressAtomic => Some(CounterSelector::Ingress),
            Self::EgressAtomic => Some(CounterSelector::Egress),
            Self::Explicit | Self::RuleTable => None,
        }
    }

    /// The table a rule learned by `pkt` lands in.
    pub fn resolve(
        self,
        table_id: u8,
        pkt: &PacketCtx,
        counters: &AtomicCounters,
    ) -> u8 {
        match self {
            Self::Explicit => table_id,
            Self::RuleTable => pkt.rule_table_id,
            Self::IngressAtomic | Self::EgressAtomic => match self.counter() {
                Some(sel) => counters.current(sel),
                None => table_id,
            },
        }
    }
}

/// How the cookie of a learned rule is chosen.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum CookieSpec {
    #[default]
    Explicit = 0,
    Atomic = 1,
}

impl TryFrom<u8> for CookieSpec {
    type Error = DecodeError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(Self::Explicit),
            1 => Ok(Self::Atomic),
            _ => Err(DecodeError::BadCookieSpec(val)),
        }
    }
}

impl CookieSpec {
    pub fn resolve(self, cookie: u64, counters: &AtomicCounters) -> u64 {
        match self {
            Self::Explicit => cookie,
            Self::Atomic => counters.current_cookie(),
        }
    }
}

/// The packet a learning action is executing for.
#[derive(Clone, Copy, Debug)]
pub struct PacketCtx<'a> {
    pub flow: &'a Flow,
    /// The table of the rule whose actions are running.
    pub rule_table_id: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FlowModCommand {
    Add,
    Modify,
    ModifyStrict,
    Delete,
    DeleteStrict,
}

/// A request to the flow table, as built by a learning action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FlowMod {
    pub table_id: u8,
    pub command: FlowModCommand,
    pub flow_match: Match,
    pub priority: u16,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub new_cookie: u64,
    pub modify_cookie: bool,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub flags: FlowModFlags,
    pub buffer_id: u32,
    pub out_port: u16,
    pub actions: Vec<Action>,
}

impl FlowMod {
    /// An empty request: catchall match, no actions.
    pub fn new(table_id: u8, command: FlowModCommand) -> Self {
        Self {
            table_id,
            command,
            flow_match: Match::catchall(),
            priority: DEFAULT_PRIORITY,
            cookie: 0,
            cookie_mask: 0,
            new_cookie: 0,
            modify_cookie: false,
            idle_timeout: 0,
            hard_timeout: 0,
            flags: FlowModFlags::empty(),
            buffer_id: NO_BUFFER,
            out_port: OFPP_NONE,
            actions: Vec::new(),
        }
    }

    /// Carry out one spec for a packet with fields `flow`.
    ///
    /// Match specs narrow the learned match; the others append
    /// actions for the learned rule. An output spec whose value is
    /// not a usable port adds nothing.
    pub fn apply_spec(&mut self, spec: &FieldSpec, flow: &Flow) {
        let val = spec.value(flow);

        match spec.dst() {
            SpecDst::Match(dst) => self.flow_match.set_subfield(dst, val),

            SpecDst::Load(dst) => {
                let mut ofs = 0;
                while ofs < spec.n_bits() {
                    let chunk = min(spec.n_bits() - ofs, 64);
                    let part =
                        Subfield::new(dst.field, dst.ofs.saturating_add(ofs), chunk);
                    let bits = (val >> ofs) & low_mask(chunk);
                    self.actions.push(Action::RegLoad {
                        dst: part,
                        value: bits as u64,
                    });
                    ofs += chunk;
                }
            }

            SpecDst::Output => {
                if let Ok(port) = u16::try_from(val) {
                    if output_port_allowed(port) {
                        self.actions.push(Action::Output { port, max_len: 0 });
                    }
                }
            }

            SpecDst::Reserved => self.actions.push(Action::Resubmit {
                in_port: OFPP_IN_PORT,
                table: RESERVED_RESUBMIT_TABLE,
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::field::Field;
    use crate::engine::spec::Deferral;
    use crate::engine::spec::SpecSrc;

    #[test]
    fn port_filter() {
        assert!(output_port_allowed(1));
        assert!(output_port_allowed(OFPP_MAX - 1));
        assert!(!output_port_allowed(OFPP_MAX));
        assert!(output_port_allowed(OFPP_IN_PORT));
        assert!(output_port_allowed(OFPP_FLOOD));
        assert!(output_port_allowed(OFPP_ALL));
        assert!(output_port_allowed(OFPP_LOCAL));
        assert!(!output_port_allowed(OFPP_CONTROLLER));
        assert!(!output_port_allowed(OFPP_NONE));
    }

    #[test]
    fn wide_load_is_chunked() {
        let flow = Flow::new()
            .with(Field::TunId, 0x1111_2222_3333_4444)
            .with(Field::Reg0, 0xaaaa_bbbb);
        let mut fm = FlowMod::new(1, FlowModCommand::ModifyStrict);

        let spec = FieldSpec::copy_load(
            Subfield::whole(Field::TunId),
            Subfield::whole(Field::TunId),
        )
        .unwrap();
        fm.apply_spec(&spec, &flow);
        assert_eq!(
            fm.actions,
            vec![Action::RegLoad {
                dst: Subfield::whole(Field::TunId),
                value: 0x1111_2222_3333_4444,
            }]
        );

        // Chunking only looks at the spec width, so a 96-bit load is
        // split at the 64-bit boundary whatever its destination.
        let spec = FieldSpec::new(
            96,
            SpecSrc::Immediate(0xdead_0000_0000_0000_beef),
            SpecDst::Load(Subfield::new(Field::Reg0, 0, 96)),
            Deferral::Never,
        )
        .unwrap();
        fm.actions.clear();
        fm.apply_spec(&spec, &flow);
        assert_eq!(
            fm.actions,
            vec![
                Action::RegLoad {
                    dst: Subfield::new(Field::Reg0, 0, 64),
                    value: 0x0000_0000_0000_beef,
                },
                Action::RegLoad {
                    dst: Subfield::new(Field::Reg0, 64, 32),
                    value: 0xdead,
                },
            ]
        );
    }

    #[test]
    fn output_spec() {
        let src = Subfield::whole(Field::Reg1);
        let spec = FieldSpec::output(src).unwrap();
        let mut fm = FlowMod::new(1, FlowModCommand::ModifyStrict);

        fm.apply_spec(&spec, &Flow::new().with(Field::Reg1, 7));
        assert_eq!(fm.actions, vec![Action::Output { port: 7, max_len: 0 }]);

        fm.actions.clear();
        fm.apply_spec(&spec, &Flow::new().with(Field::Reg1, 0x1_0000));
        fm.apply_spec(&spec, &Flow::new().with(Field::Reg1, 0xff05));
        assert!(fm.actions.is_empty());
    }

    #[test]
    fn table_spec_resolution() {
        let counters = AtomicCounters::new();
        counters.increment(CounterSelector::Egress, 9);
        let flow = Flow::new();
        let pkt = PacketCtx { flow: &flow, rule_table_id: 40 };

        assert_eq!(TableSpec::Explicit.resolve(5, &pkt, &counters), 5);
        assert_eq!(TableSpec::RuleTable.resolve(5, &pkt, &counters), 40);
        assert_eq!(TableSpec::IngressAtomic.resolve(5, &pkt, &counters), 0);
        assert_eq!(TableSpec::EgressAtomic.resolve(5, &pkt, &counters), 9);
        assert_eq!(TableSpec::try_from(1), Err(DecodeError::BadTableSpec(1)));
    }
}
