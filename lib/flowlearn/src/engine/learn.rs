// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The learn action.
//!
//! When executed, a learn action builds a new flow rule out of the
//! packet that triggered it: its specs decide what the rule matches
//! on and what it loads or outputs, and its nested actions are
//! appended to the rule verbatim.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            0xffff             |              len              |
//! |                          0x00002320                           |
//! |           subtype=43          |         idle_timeout          |
//! |         hard_timeout          |           priority            |
//! |                            cookie                             |
//! |                                                               |
//! |             flags             |   table_id    |  table_spec   |
//! |       fin_idle_timeout        |       fin_hard_timeout        |
//! |learn_on_timeo.|  cookie_spec  |   rear_pad    |       0       |
//! |                            n_specs                            |
//! |                          nested_len                           |
//! |                               0                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             specs ...             |   nested actions ...      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          rear_pad zero bytes, to an 8-byte boundary           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use super::action::Action;
use super::action::ActionList;
use super::counter::AtomicCounters;
use super::deferral::resolve_nested;
use super::deferral::resolve_specs;
use super::field::Wildcards;
use super::flow_mod::COOKIE_UNCHANGED;
use super::flow_mod::CookieSpec;
use super::flow_mod::DEFAULT_PRIORITY;
use super::flow_mod::DEFAULT_TABLE;
use super::flow_mod::FlowMod;
use super::flow_mod::FlowModCommand;
use super::flow_mod::FlowModFlags;
use super::flow_mod::PacketCtx;
use super::flow_mod::TableSpec;
use super::spec::FieldSpec;
use super::spec::SpecSrc;
use super::spec::decode_specs;
use super::spec::encode_specs;
use super::wire::Cursor;
use super::wire::DecodeError;
use super::wire::DecodeResult;
use super::wire::EncodeResult;
use super::wire::LEARN_HDR_LEN;
use super::wire::LearnHdrRaw;
use super::wire::NXAST_LEARN_LEARN;
use super::wire::VendorHdrRaw;
use super::wire::check_zeros;
use super::wire::pad_len;
use super::wire::put_zeros;
use super::wire::wire_len;
use crate::ExecCtx;
use alloc::vec::Vec;
use serde::Serialize;
use zerocopy::IntoBytes;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U32;
use zerocopy::byteorder::network_endian::U64;

/// The table id no learning action may name.
pub const INVALID_TABLE_ID: u8 = 0xff;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LearnAction {
    pub priority: u16,
    pub cookie: u64,
    pub table_id: u8,
    pub flags: FlowModFlags,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub fin_idle_timeout: u16,
    pub fin_hard_timeout: u16,
    pub learn_on_timeout: bool,
    pub table_spec: TableSpec,
    pub cookie_spec: CookieSpec,
    pub specs: Vec<FieldSpec>,
    pub actions: ActionList,
}

impl Default for LearnAction {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            cookie: 0,
            table_id: DEFAULT_TABLE,
            flags: FlowModFlags::empty(),
            idle_timeout: 0,
            hard_timeout: 0,
            fin_idle_timeout: 0,
            fin_hard_timeout: 0,
            learn_on_timeout: false,
            table_spec: TableSpec::Explicit,
            cookie_spec: CookieSpec::Explicit,
            specs: Vec::new(),
            actions: ActionList::new(),
        }
    }
}

impl LearnAction {
    /// Decode the learn action filling `bytes`, found at nesting level
    /// `depth`.
    pub fn decode(bytes: &[u8], depth: u8) -> DecodeResult<Self> {
        let raw: LearnHdrRaw = Cursor::new(bytes).read()?;
        let len = bytes.len();
        if usize::from(raw.hdr.len.get()) != len || pad_len(len) != 0 {
            return Err(DecodeError::BadActionLen(len));
        }
        check_zeros(&[raw.pad0])?;
        check_zeros(&raw.pad1)?;

        if raw.table_id == INVALID_TABLE_ID {
            return Err(DecodeError::BadTableId);
        }
        let flags = FlowModFlags::from_wire(raw.flags.get())?;
        let table_spec = TableSpec::try_from(raw.table_spec)?;
        let cookie_spec = CookieSpec::try_from(raw.cookie_spec)?;
        let learn_on_timeout = match raw.learn_on_timeout {
            0 => false,
            1 => true,
            v => return Err(DecodeError::BadBool(v)),
        };

        // The nested actions sit just before the rear padding, and the
        // specs fill everything between the header and them.
        let rear_pad = usize::from(raw.rear_pad);
        let nested_len = usize::try_from(raw.nested_len.get())
            .map_err(|_| DecodeError::BadNestedLen(usize::MAX))?;
        let nested_end = len
            .checked_sub(rear_pad)
            .filter(|end| *end >= LEARN_HDR_LEN)
            .ok_or(DecodeError::BadNestedLen(rear_pad))?;
        let nested_start = nested_end
            .checked_sub(nested_len)
            .filter(|start| *start >= LEARN_HDR_LEN)
            .ok_or(DecodeError::BadNestedLen(nested_len))?;
        check_zeros(&bytes[nested_end..])?;

        let specs = decode_specs(&bytes[LEARN_HDR_LEN..nested_start], true)?;
        let declared = raw.n_specs.get();
        if usize::try_from(declared).ok() != Some(specs.len()) {
            return Err(DecodeError::SpecCountMismatch {
                declared,
                found: specs.len(),
            });
        }

        let actions = ActionList::decode(
            &bytes[nested_start..nested_end],
            depth.saturating_add(1),
        )?;

        Ok(Self {
            priority: raw.priority.get(),
            cookie: raw.cookie.get(),
            table_id: raw.table_id,
            flags,
            idle_timeout: raw.idle_timeout.get(),
            hard_timeout: raw.hard_timeout.get(),
            fin_idle_timeout: raw.fin_idle_timeout.get(),
            fin_hard_timeout: raw.fin_hard_timeout.get(),
            learn_on_timeout,
            table_spec,
            cookie_spec,
            specs,
            actions,
        })
    }

    /// Encode the action.
    ///
    /// The body is built first so that the length, spec count, nested
    /// length, and padding in the header are known when it is written.
    /// Fails if the whole action would not fit the 16-bit length
    /// field, leaving `buf` untouched.
    pub fn encode(&self, buf: &mut Vec<u8>) -> EncodeResult<()> {
        let mut body = Vec::new();
        encode_specs(&self.specs, &mut body, true);
        let nested_start = body.len();
        self.actions.encode(&mut body)?;
        let nested_len = body.len() - nested_start;
        let rear_pad = pad_len(LEARN_HDR_LEN + body.len());
        put_zeros(&mut body, rear_pad);

        let len = wire_len(LEARN_HDR_LEN + body.len())?;
        // Both are bounded by the action length.
        let n_specs = wire_len(self.specs.len())?;
        let nested_len = wire_len(nested_len)?;

        let raw = LearnHdrRaw {
            hdr: VendorHdrRaw::new(NXAST_LEARN_LEARN, len),
            idle_timeout: U16::new(self.idle_timeout),
            hard_timeout: U16::new(self.hard_timeout),
            priority: U16::new(self.priority),
            cookie: U64::new(self.cookie),
            flags: U16::new(self.flags.bits()),
            table_id: self.table_id,
            table_spec: self.table_spec as u8,
            fin_idle_timeout: U16::new(self.fin_idle_timeout),
            fin_hard_timeout: U16::new(self.fin_hard_timeout),
            learn_on_timeout: u8::from(self.learn_on_timeout),
            cookie_spec: self.cookie_spec as u8,
            // Always below 8.
            rear_pad: rear_pad as u8,
            pad0: 0,
            n_specs: U32::new(u32::from(n_specs)),
            nested_len: U32::new(u32::from(nested_len)),
            pad1: [0; 4],
        };

        buf.extend_from_slice(raw.as_bytes());
        buf.extend_from_slice(&body);
        Ok(())
    }

    pub fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Build the flow modification this action requests for `pkt`.
    ///
    /// Deferred specs of this action are aged first, so a spec whose
    /// count has run out is pinned and used in the same execution.
    /// Deferred specs of nested learn actions are aged before the
    /// nested actions are copied into the result.
    ///
    /// Each call ages deferrals, so the caller must execute an action
    /// instance exactly once per packet.
    pub fn execute(
        &mut self,
        ectx: &ExecCtx,
        counters: &AtomicCounters,
        pkt: &PacketCtx,
    ) -> FlowMod {
        resolve_specs(&mut self.specs, pkt.flow, ectx);

        let table_id = self.table_spec.resolve(self.table_id, pkt, counters);
        let mut fm = FlowMod::new(table_id, FlowModCommand::ModifyStrict);
        fm.priority = self.priority;
        fm.new_cookie = self.cookie_spec.resolve(self.cookie, counters);
        fm.modify_cookie = fm.new_cookie != COOKIE_UNCHANGED;
        fm.idle_timeout = self.idle_timeout;
        fm.hard_timeout = self.hard_timeout;
        fm.flags = self.flags;

        if self.fin_idle_timeout != 0 || self.fin_hard_timeout != 0 {
            fm.actions.push(Action::FinTimeout {
                idle_timeout: self.fin_idle_timeout,
                hard_timeout: self.fin_hard_timeout,
            });
        }

        for spec in &self.specs {
            fm.apply_spec(spec, pkt.flow);
        }

        resolve_nested(&mut self.actions, pkt.flow, ectx);
        fm.actions.extend(self.actions.iter().cloned());
        fm
    }

    /// Mark every field this action reads as significant in `wc`.
    ///
    /// A rule whose actions include this one produces different
    /// results for packets differing in any of these bits.
    pub fn mask_sources(&self, wc: &mut Wildcards) {
        for spec in &self.specs {
            if let SpecSrc::Field(sf) = spec.src() {
                wc.unwildcard(sf);
            }
        }
    }
}
