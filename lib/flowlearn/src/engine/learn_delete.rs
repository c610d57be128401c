// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The learn-delete action: remove the rules a packet would have
//! learned.
//!
//! Only match specs mean anything here. Their specs carry no
//! deferral byte.

use super::counter::AtomicCounters;
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
use super::learn::INVALID_TABLE_ID;
use super::spec::DstType;
use super::spec::FieldSpec;
use super::spec::SpecSrc;
use super::spec::decode_specs;
use super::spec::encode_specs;
use super::wire::Cursor;
use super::wire::DELETE_HDR_LEN;
use super::wire::DecodeError;
use super::wire::DecodeResult;
use super::wire::EncodeResult;
use super::wire::DeleteHdrRaw;
use super::wire::NXAST_LEARN_DELETE;
use super::wire::VendorHdrRaw;
use super::wire::check_zeros;
use super::wire::pad_len;
use super::wire::put_zeros;
use super::wire::wire_len;
use crate::ExecCtx;
use crate::LogLevel;
use alloc::vec::Vec;
use serde::Serialize;
use zerocopy::IntoBytes;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U64;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeleteLearnAction {
    pub priority: u16,
    pub cookie: u64,
    pub table_id: u8,
    pub flags: FlowModFlags,
    pub table_spec: TableSpec,
    pub cookie_spec: CookieSpec,
    pub specs: Vec<FieldSpec>,
}

impl Default for DeleteLearnAction {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            cookie: 0,
            table_id: DEFAULT_TABLE,
            flags: FlowModFlags::empty(),
            table_spec: TableSpec::Explicit,
            cookie_spec: CookieSpec::Explicit,
            specs: Vec::new(),
        }
    }
}

impl DeleteLearnAction {
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let raw: DeleteHdrRaw = Cursor::new(bytes).read()?;
        let len = bytes.len();
        if usize::from(raw.hdr.len.get()) != len || pad_len(len) != 0 {
            return Err(DecodeError::BadActionLen(len));
        }
        check_zeros(&raw.pad)?;

        if raw.table_id == INVALID_TABLE_ID {
            return Err(DecodeError::BadTableId);
        }

        Ok(Self {
            priority: raw.priority.get(),
            cookie: raw.cookie.get(),
            table_id: raw.table_id,
            flags: FlowModFlags::from_wire(raw.flags.get())?,
            table_spec: TableSpec::try_from(raw.table_spec)?,
            cookie_spec: CookieSpec::try_from(raw.cookie_spec)?,
            specs: decode_specs(&bytes[DELETE_HDR_LEN..], false)?,
        })
    }

    /// Encode the action, or fail without touching `buf` if it would
    /// not fit the 16-bit length field.
    pub fn encode(&self, buf: &mut Vec<u8>) -> EncodeResult<()> {
        let mut body = Vec::new();
        encode_specs(&self.specs, &mut body, false);
        let pad = pad_len(DELETE_HDR_LEN + body.len());
        put_zeros(&mut body, pad);
        let len = wire_len(DELETE_HDR_LEN + body.len())?;

        let raw = DeleteHdrRaw {
            hdr: VendorHdrRaw::new(NXAST_LEARN_DELETE, len),
            priority: U16::new(self.priority),
            flags: U16::new(self.flags.bits()),
            table_id: self.table_id,
            table_spec: self.table_spec as u8,
            cookie: U64::new(self.cookie),
            cookie_spec: self.cookie_spec as u8,
            pad: [0; 7],
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

    /// Build the delete request matching the rules `pkt` would have
    /// learned.
    ///
    /// The cookie, unless it is the all-ones sentinel, must match
    /// exactly.
    pub fn execute(
        &self,
        ectx: &ExecCtx,
        counters: &AtomicCounters,
        pkt: &PacketCtx,
    ) -> FlowMod {
        let table_id = self.table_spec.resolve(self.table_id, pkt, counters);
        let mut fm = FlowMod::new(table_id, FlowModCommand::Delete);
        fm.priority = self.priority;
        fm.flags = self.flags;

        let cookie = self.cookie_spec.resolve(self.cookie, counters);
        if cookie != COOKIE_UNCHANGED {
            fm.cookie = cookie;
            fm.cookie_mask = u64::MAX;
        }

        for spec in &self.specs {
            if spec.dst_type() == DstType::Match {
                fm.apply_spec(spec, pkt.flow);
            } else {
                ectx.log.log(
                    LogLevel::Warn,
                    &format!(
                        "learn_delete: ignoring {:?} spec",
                        spec.dst_type()
                    ),
                );
            }
        }

        fm
    }

    pub fn mask_sources(&self, wc: &mut Wildcards) {
        for spec in &self.specs {
            if let SpecSrc::Field(sf) = spec.src() {
                wc.unwildcard(sf);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::NullLog;
    use crate::api::CounterSelector;
    use crate::engine::field::Field;
    use crate::engine::field::Flow;
    use crate::engine::field::Subfield;
    use crate::engine::wire::DecodeErrorKind;
    use alloc::boxed::Box;

    fn tcp_delete() -> DeleteLearnAction {
        DeleteLearnAction {
            table_id: 10,
            cookie: 0x1234,
            specs: vec![
                FieldSpec::imm_match(0x800, Subfield::whole(Field::EthType))
                    .unwrap(),
                FieldSpec::copy_match(
                    Subfield::whole(Field::IpSrc),
                    Subfield::whole(Field::IpDst),
                )
                .unwrap(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn round_trip() {
        let del = tcp_delete();
        let bytes = del.to_bytes().unwrap();
        // 32 header, 2+2+6 immediate spec, 2+6+6 field spec.
        assert_eq!(bytes.len(), 56);
        assert_eq!(&bytes[8..10], &[0, 42]);
        assert_eq!(DeleteLearnAction::decode(&bytes), Ok(del));
    }

    #[test]
    fn decode_errors() {
        let bytes = tcp_delete().to_bytes().unwrap();

        let mut bad = bytes.clone();
        bad[14] = 0xff;
        assert_eq!(DeleteLearnAction::decode(&bad), Err(DecodeError::BadTableId));

        let mut bad = bytes.clone();
        bad[24] = 2;
        assert_eq!(
            DeleteLearnAction::decode(&bad),
            Err(DecodeError::BadCookieSpec(2))
        );

        let mut bad = bytes.clone();
        bad[30] = 1;
        assert_eq!(
            DeleteLearnAction::decode(&bad),
            Err(DecodeError::NonzeroPadding)
        );

        let err = DeleteLearnAction::decode(&bytes[..24]).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::BadLen);
    }

    #[test]
    fn execute_cookie_mask() {
        let ectx = ExecCtx { log: Box::new(NullLog) };
        let counters = AtomicCounters::new();
        let flow = Flow::new()
            .with(Field::EthType, 0x800)
            .with(Field::IpSrc, 0x0a00_0001);
        let pkt = PacketCtx { flow: &flow, rule_table_id: 0 };

        let mut del = tcp_delete();
        let fm = del.execute(&ectx, &counters, &pkt);
        assert_eq!(fm.command, FlowModCommand::Delete);
        assert_eq!(fm.table_id, 10);
        assert_eq!((fm.cookie, fm.cookie_mask), (0x1234, u64::MAX));
        assert_eq!(fm.flow_match.get(Field::IpDst), (0x0a00_0001, 0xffff_ffff));
        assert!(fm.actions.is_empty());

        del.cookie = COOKIE_UNCHANGED;
        let fm = del.execute(&ectx, &counters, &pkt);
        assert_eq!((fm.cookie, fm.cookie_mask), (0, 0));
    }

    #[test]
    fn execute_atomic_table() {
        let ectx = ExecCtx { log: Box::new(NullLog) };
        let counters = AtomicCounters::new();
        counters.increment(CounterSelector::Ingress, 1);
        counters.increment(CounterSelector::Ingress, 1);
        let flow = Flow::new();
        let pkt = PacketCtx { flow: &flow, rule_table_id: 0 };

        let del = DeleteLearnAction {
            table_spec: TableSpec::IngressAtomic,
            ..tcp_delete()
        };
        assert_eq!(del.execute(&ectx, &counters, &pkt).table_id, 2);
    }
}
