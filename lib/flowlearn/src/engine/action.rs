// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Action lists.
//!
//! A learn action carries the actions of the rule it learns, and a
//! timeout action carries the actions to run when a rule expires.
//! Both are held as an [`ActionList`]: a list of tagged [`Action`]s
//! which encodes to a run of 8-byte aligned actions. Learning actions
//! nest, so the list is a tree, walked depth first by the deferral
//! resolver.
//!
//! Actions this engine does not interpret are kept as
//! [`Action::Opaque`] bytes and written back unchanged.

use super::counter::AtomicCounters;
use super::field::Field;
use super::field::Subfield;
use super::field::low_mask;
use super::flow_mod::OFPP_ALL;
use super::flow_mod::OFPP_CONTROLLER;
use super::flow_mod::OFPP_FLOOD;
use super::flow_mod::OFPP_IN_PORT;
use super::flow_mod::OFPP_LOCAL;
use super::flow_mod::OFPP_NORMAL;
use super::flow_mod::OFPP_TABLE;
use super::learn::LearnAction;
use super::learn_delete::DeleteLearnAction;
use super::timeout::TimeoutAction;
use super::wire::ACTION_ALIGN;
use super::wire::ActionHdrRaw;
use super::wire::Cursor;
use super::wire::DecodeError;
use super::wire::DecodeResult;
use super::wire::EncodeResult;
use super::wire::FinTimeoutRaw;
use super::wire::IncrementCookieRaw;
use super::wire::IncrementTableIdRaw;
use super::wire::MAX_NESTING;
use super::wire::NX_VENDOR_ID;
use super::wire::NXAST_FIN_TIMEOUT;
use super::wire::NXAST_INCREMENT_COOKIE;
use super::wire::NXAST_INCREMENT_TABLE_ID;
use super::wire::NXAST_LEARN_DELETE;
use super::wire::NXAST_LEARN_LEARN;
use super::wire::NXAST_REG_LOAD;
use super::wire::NXAST_RESUBMIT_TABLE;
use super::wire::NXAST_TIMEOUT_ACT;
use super::wire::OFPAT_OUTPUT;
use super::wire::OFPAT_VENDOR;
use super::wire::OutputRaw;
use super::wire::RegLoadRaw;
use super::wire::ResubmitRaw;
use super::wire::VendorHdrRaw;
use super::wire::check_zeros;
use super::wire::to_hex;
use crate::api::CounterSelector;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use core::mem::size_of;
use core::ops::Deref;
use core::ops::DerefMut;
use itertools::Itertools;
use serde::Serialize;
use zerocopy::IntoBytes;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U32;
use zerocopy::byteorder::network_endian::U64;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    Resubmit { in_port: u16, table: u8 },
    RegLoad { dst: Subfield, value: u64 },
    FinTimeout { idle_timeout: u16, hard_timeout: u16 },
    IncrementTableId(CounterSelector),
    IncrementCookie,
    Learn(LearnAction),
    Delete(DeleteLearnAction),
    Timeout(TimeoutAction),
    Opaque(Vec<u8>),
}

impl Action {
    /// Decode the single action filling `bytes`.
    ///
    /// The caller has already checked the framing: `bytes` is exactly
    /// the declared length of the action, which is a non-zero
    /// multiple of 8.
    fn decode(bytes: &[u8], depth: u8) -> DecodeResult<Self> {
        let mut cur = Cursor::new(bytes);
        let hdr: ActionHdrRaw = cur.clone().read()?;

        match hdr.typ.get() {
            OFPAT_OUTPUT => {
                let raw: OutputRaw = exact(bytes)?;
                return Ok(Self::Output {
                    port: raw.port.get(),
                    max_len: raw.max_len.get(),
                });
            }
            OFPAT_VENDOR if bytes.len() >= size_of::<VendorHdrRaw>() => (),
            _ => return Ok(Self::Opaque(bytes.to_vec())),
        }

        let vhdr: VendorHdrRaw = cur.read()?;
        if vhdr.vendor.get() != NX_VENDOR_ID {
            return Ok(Self::Opaque(bytes.to_vec()));
        }

        match vhdr.subtype.get() {
            NXAST_REG_LOAD => {
                let raw: RegLoadRaw = exact(bytes)?;
                let ofs_nbits = raw.ofs_nbits.get();
                let n_bits = (ofs_nbits & 0x3f) + 1;
                let dst_hdr = raw.dst.get();
                let field = Field::from_nxm_header(dst_hdr)
                    .ok_or(DecodeError::UnknownField(dst_hdr))?;
                let value = raw.value.get();
                if u128::from(value) & !low_mask(n_bits) != 0 {
                    return Err(DecodeError::LoadOverflow { value, n_bits });
                }
                Ok(Self::RegLoad {
                    dst: Subfield::new(field, ofs_nbits >> 6, n_bits),
                    value,
                })
            }

            NXAST_RESUBMIT_TABLE => {
                let raw: ResubmitRaw = exact(bytes)?;
                check_zeros(&raw.pad)?;
                Ok(Self::Resubmit { in_port: raw.in_port.get(), table: raw.table })
            }

            NXAST_FIN_TIMEOUT => {
                let raw: FinTimeoutRaw = exact(bytes)?;
                check_zeros(&raw.pad)?;
                Ok(Self::FinTimeout {
                    idle_timeout: raw.idle_timeout.get(),
                    hard_timeout: raw.hard_timeout.get(),
                })
            }

            NXAST_INCREMENT_TABLE_ID => {
                let raw: IncrementTableIdRaw = exact(bytes)?;
                check_zeros(&raw.pad)?;
                let sel = CounterSelector::try_from(raw.selector)
                    .map_err(DecodeError::BadSelector)?;
                Ok(Self::IncrementTableId(sel))
            }

            NXAST_INCREMENT_COOKIE => {
                let raw: IncrementCookieRaw = exact(bytes)?;
                check_zeros(&raw.pad)?;
                Ok(Self::IncrementCookie)
            }

            NXAST_LEARN_LEARN => {
                Ok(Self::Learn(LearnAction::decode(bytes, depth)?))
            }

            NXAST_LEARN_DELETE => {
                Ok(Self::Delete(DeleteLearnAction::decode(bytes)?))
            }

            NXAST_TIMEOUT_ACT => {
                Ok(Self::Timeout(TimeoutAction::decode(bytes, depth)?))
            }

            _ => Ok(Self::Opaque(bytes.to_vec())),
        }
    }

    /// Encode the action, failing only if it is too large for the
    /// 16-bit length field.
    pub fn encode(&self, buf: &mut Vec<u8>) -> EncodeResult<()> {
        match self {
            Self::Output { port, max_len } => {
                let raw = OutputRaw {
                    typ: U16::new(OFPAT_OUTPUT),
                    len: U16::new(size_of::<OutputRaw>() as u16),
                    port: U16::new(*port),
                    max_len: U16::new(*max_len),
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::Resubmit { in_port, table } => {
                let raw = ResubmitRaw {
                    hdr: vendor_hdr::<ResubmitRaw>(NXAST_RESUBMIT_TABLE),
                    in_port: U16::new(*in_port),
                    table: *table,
                    pad: [0; 3],
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::RegLoad { dst, value } => {
                let ofs_nbits = dst.ofs << 6 | (dst.n_bits.saturating_sub(1) & 0x3f);
                let raw = RegLoadRaw {
                    hdr: vendor_hdr::<RegLoadRaw>(NXAST_REG_LOAD),
                    ofs_nbits: U16::new(ofs_nbits),
                    dst: U32::new(dst.field.nxm_header()),
                    value: U64::new(*value),
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::FinTimeout { idle_timeout, hard_timeout } => {
                let raw = FinTimeoutRaw {
                    hdr: vendor_hdr::<FinTimeoutRaw>(NXAST_FIN_TIMEOUT),
                    idle_timeout: U16::new(*idle_timeout),
                    hard_timeout: U16::new(*hard_timeout),
                    pad: [0; 2],
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::IncrementTableId(sel) => {
                let raw = IncrementTableIdRaw {
                    hdr: vendor_hdr::<IncrementTableIdRaw>(
                        NXAST_INCREMENT_TABLE_ID,
                    ),
                    selector: u8::from(*sel),
                    pad: [0; 5],
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::IncrementCookie => {
                let raw = IncrementCookieRaw {
                    hdr: vendor_hdr::<IncrementCookieRaw>(NXAST_INCREMENT_COOKIE),
                    pad: [0; 6],
                };
                buf.extend_from_slice(raw.as_bytes());
            }

            Self::Learn(learn) => learn.encode(buf)?,
            Self::Delete(delete) => delete.encode(buf)?,
            Self::Timeout(timeout) => timeout.encode(buf)?,
            Self::Opaque(bytes) => buf.extend_from_slice(bytes),
        }
        Ok(())
    }

    /// Run a counter action, returning the counter's previous value.
    ///
    /// Returns `None` for actions that do not touch the counters.
    pub fn execute_counter(&self, counters: &AtomicCounters) -> Option<u64> {
        match self {
            Self::IncrementTableId(sel) => {
                Some(u64::from(counters.increment(*sel, 1)))
            }
            Self::IncrementCookie => Some(counters.increment_cookie(1)),
            _ => None,
        }
    }
}

fn vendor_hdr<T>(subtype: u16) -> VendorHdrRaw {
    // Fixed-size actions are all well under the length limit.
    VendorHdrRaw::new(subtype, size_of::<T>() as u16)
}

/// Read a fixed-size action which must fill `bytes` exactly.
fn exact<T>(bytes: &[u8]) -> DecodeResult<T>
where
    T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
{
    if bytes.len() != size_of::<T>() {
        return Err(DecodeError::BadActionLen(bytes.len()));
    }
    Cursor::new(bytes).read()
}

/// An ordered list of actions with a byte-exact wire form.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionList {
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a run of actions filling `bytes`.
    ///
    /// `depth` is the nesting level of the list: zero for a top-level
    /// list, one for the actions inside a top-level learn, and so on.
    pub fn decode(bytes: &[u8], depth: u8) -> DecodeResult<Self> {
        if depth > MAX_NESTING {
            return Err(DecodeError::TooDeep(MAX_NESTING));
        }

        let mut cur = Cursor::new(bytes);
        let mut actions = Vec::new();

        while !cur.is_empty() {
            let hdr: ActionHdrRaw = cur.clone().read()?;
            let len = usize::from(hdr.len.get());
            if len < ACTION_ALIGN || len % ACTION_ALIGN != 0 {
                return Err(DecodeError::BadActionLen(len));
            }
            let body = cur.take(len)?;
            actions.push(Action::decode(body, depth)?);
        }

        Ok(Self { actions })
    }

    /// Encode every action in order. On error `buf` is left as it
    /// was.
    pub fn encode(&self, buf: &mut Vec<u8>) -> EncodeResult<()> {
        let start = buf.len();
        for action in &self.actions {
            if let Err(e) = action.encode(buf) {
                buf.truncate(start);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn into_inner(self) -> Vec<Action> {
        self.actions
    }
}

impl From<Vec<Action>> for ActionList {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

impl Deref for ActionList {
    type Target = Vec<Action>;

    fn deref(&self) -> &Self::Target {
        &self.actions
    }
}

impl DerefMut for ActionList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.actions
    }
}

/// The operator name of a logical port, if it has one.
pub fn port_name(port: u16) -> Option<&'static str> {
    match port {
        OFPP_IN_PORT => Some("in_port"),
        OFPP_TABLE => Some("table"),
        OFPP_NORMAL => Some("normal"),
        OFPP_FLOOD => Some("flood"),
        OFPP_ALL => Some("all"),
        OFPP_CONTROLLER => Some("controller"),
        OFPP_LOCAL => Some("local"),
        _ => None,
    }
}

pub(crate) struct PortDisplay(pub u16);

impl Display for PortDisplay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match port_name(self.0) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Output { port, max_len: 0 } => {
                write!(f, "output:{}", PortDisplay(*port))
            }
            Self::Output { port, max_len } => {
                write!(f, "output(port={},max_len={max_len})", PortDisplay(*port))
            }
            Self::Resubmit { in_port: OFPP_IN_PORT, table } => {
                write!(f, "resubmit(,{table})")
            }
            Self::Resubmit { in_port, table } => {
                write!(f, "resubmit({},{table})", PortDisplay(*in_port))
            }
            Self::RegLoad { dst, value } => write!(f, "load:{value:#x}->{dst}"),
            Self::FinTimeout { idle_timeout, hard_timeout } => {
                let args = [("idle_timeout", idle_timeout), ("hard_timeout", hard_timeout)]
                    .iter()
                    .filter(|(_, v)| **v != 0)
                    .map(|(k, v)| format!("{k}={v}"))
                    .join(",");
                write!(f, "fin_timeout({args})")
            }
            Self::IncrementTableId(sel) => write!(f, "increment_table_id({sel})"),
            Self::IncrementCookie => write!(f, "increment_cookie"),
            Self::Learn(learn) => write!(f, "learn_learn({learn})"),
            Self::Delete(delete) => write!(f, "learn_delete({delete})"),
            Self::Timeout(timeout) => write!(f, "timeout_act({timeout})"),
            Self::Opaque(bytes) => write!(f, "opaque({})", to_hex(bytes)),
        }
    }
}

impl Display for ActionList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.actions.iter().join(","))
    }
}
