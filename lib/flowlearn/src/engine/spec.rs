// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The field spec: one value copy performed by a learning action.
//!
//! A spec reads `n_bits` from its source, either a subfield of the
//! packet or an immediate constant, and sends them to a destination:
//! a match criterion of the learned rule, a register load performed
//! by the learned rule, an output port, or a fixed resubmit.
//!
//! On the wire each spec is a TLV whose 16-bit header packs the
//! width and the source and destination types.
//!
//! ```text
//!   15  14   13   12  11   10   9                   0
//! +-------+-----+--------+----+----------------------+
//! |  0 0  | src |  dst   | 0  |        n_bits        |
//! +-------+-----+--------+----+----------------------+
//! ```
//!
//! The header is followed by a deferral byte (learn actions only),
//! the source (a 4-byte NXM header and 2-byte bit offset, or
//! `2 * ceil(n_bits / 16)` bytes of immediate value), and, for match
//! and load destinations, the destination subfield.

use super::field::Field;
use super::field::Flow;
use super::field::Subfield;
use super::field::low_mask;
use super::wire::Cursor;
use super::wire::DecodeError;
use super::wire::DecodeResult;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Serialize;
use thiserror::Error;

/// The widest value a spec can carry.
pub const MAX_SPEC_BITS: u16 = 128;

pub const SPEC_NBITS_MASK: u16 = 0x03ff;
pub const SPEC_DST_SHIFT: u16 = 11;
pub const SPEC_DST_MASK: u16 = 0x1800;
pub const SPEC_SRC_MASK: u16 = 0x2000;
pub const SPEC_RESERVED_MASK: u16 = 0xc400;

/// Wire value of a deferral byte that never pins.
pub const DEFER_NEVER: u8 = 0xff;

/// The length of an encoded subfield: NXM header plus bit offset.
const SUBFIELD_LEN: usize = 6;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SrcType {
    Field,
    Immediate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum DstType {
    Match,
    Load,
    Output,
    Reserved,
}

impl DstType {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => Self::Match,
            1 => Self::Load,
            2 => Self::Output,
            _ => Self::Reserved,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Self::Match => 0,
            Self::Load => 1,
            Self::Output => 2,
            Self::Reserved => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SpecSrc {
    Field(Subfield),
    Immediate(u128),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SpecDst {
    Match(Subfield),
    Load(Subfield),
    Output,
    Reserved,
}

impl SpecDst {
    pub fn dst_type(&self) -> DstType {
        match self {
            Self::Match(_) => DstType::Match,
            Self::Load(_) => DstType::Load,
            Self::Output => DstType::Output,
            Self::Reserved => DstType::Reserved,
        }
    }

    pub fn subfield(&self) -> Option<&Subfield> {
        match self {
            Self::Match(sf) | Self::Load(sf) => Some(sf),
            Self::Output | Self::Reserved => None,
        }
    }
}

/// How many more executions read the live field before its value is
/// pinned as an immediate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Deferral {
    Count(u8),
    Never,
}

impl Deferral {
    pub fn from_wire(val: u8) -> Self {
        if val == DEFER_NEVER { Self::Never } else { Self::Count(val) }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Count(n) => n,
            Self::Never => DEFER_NEVER,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum SpecError {
    #[error("spec width {0} not in 1..=128")]
    BadWidth(u16),
    #[error("invalid spec combination: {src:?} -> {dst:?}")]
    BadCombination { src: SrcType, dst: DstType },
    #[error("subfield width {sf} does not match spec width {spec}")]
    WidthMismatch { sf: u16, spec: u16 },
    #[error("immediate {0:#x} wider than the spec")]
    ImmediateTooWide(u128),
    #[error("deferral requires a field source and a match or load")]
    BadDeferral,
    #[error("deferral count {0} out of range")]
    DeferralTooLarge(u8),
}

/// One step of deferral resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeferralStep {
    /// The spec has no pending deferral.
    Inactive,
    /// The count was decremented; this many executions remain.
    Counted(u8),
    /// The live value was captured and is now an immediate.
    Pinned(u128),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct FieldSpec {
    n_bits: u16,
    src: SpecSrc,
    dst: SpecDst,
    defer: Deferral,
}

impl FieldSpec {
    /// Build a spec, enforcing every invariant of the model.
    pub fn new(
        n_bits: u16,
        src: SpecSrc,
        dst: SpecDst,
        defer: Deferral,
    ) -> Result<Self, SpecError> {
        if n_bits == 0 || n_bits > MAX_SPEC_BITS {
            return Err(SpecError::BadWidth(n_bits));
        }

        if matches!(src, SpecSrc::Immediate(_))
            && matches!(dst, SpecDst::Output | SpecDst::Reserved)
        {
            return Err(SpecError::BadCombination {
                src: SrcType::Immediate,
                dst: dst.dst_type(),
            });
        }

        let width_check = |sf: &Subfield| {
            if sf.n_bits != n_bits {
                Err(SpecError::WidthMismatch { sf: sf.n_bits, spec: n_bits })
            } else {
                Ok(())
            }
        };

        match &src {
            SpecSrc::Field(sf) => width_check(sf)?,
            SpecSrc::Immediate(v) => {
                if v & !low_mask(n_bits) != 0 {
                    return Err(SpecError::ImmediateTooWide(*v));
                }
            }
        }

        if let Some(sf) = dst.subfield() {
            width_check(sf)?;
        }

        if let Deferral::Count(n) = defer {
            if n == DEFER_NEVER {
                return Err(SpecError::DeferralTooLarge(n));
            }
            let deferrable = matches!(src, SpecSrc::Field(_))
                && matches!(dst, SpecDst::Match(_) | SpecDst::Load(_));
            if !deferrable {
                return Err(SpecError::BadDeferral);
            }
        }

        Ok(Self { n_bits, src, dst, defer })
    }

    /// Match the learned rule on `dst` with the bits of `src`.
    pub fn copy_match(src: Subfield, dst: Subfield) -> Result<Self, SpecError> {
        Self::new(src.n_bits, SpecSrc::Field(src), SpecDst::Match(dst), Deferral::Never)
    }

    /// Match the learned rule on `dst` with a literal value.
    pub fn imm_match(val: u128, dst: Subfield) -> Result<Self, SpecError> {
        Self::new(dst.n_bits, SpecSrc::Immediate(val), SpecDst::Match(dst), Deferral::Never)
    }

    /// Have the learned rule load the bits of `src` into `dst`.
    pub fn copy_load(src: Subfield, dst: Subfield) -> Result<Self, SpecError> {
        Self::new(src.n_bits, SpecSrc::Field(src), SpecDst::Load(dst), Deferral::Never)
    }

    /// Have the learned rule load a literal value into `dst`.
    pub fn imm_load(val: u128, dst: Subfield) -> Result<Self, SpecError> {
        Self::new(dst.n_bits, SpecSrc::Immediate(val), SpecDst::Load(dst), Deferral::Never)
    }

    /// Have the learned rule output to the port held in `src`.
    pub fn output(src: Subfield) -> Result<Self, SpecError> {
        Self::new(src.n_bits, SpecSrc::Field(src), SpecDst::Output, Deferral::Never)
    }

    pub fn reserved(src: Subfield) -> Result<Self, SpecError> {
        Self::new(src.n_bits, SpecSrc::Field(src), SpecDst::Reserved, Deferral::Never)
    }

    /// The same spec with its deferral replaced.
    pub fn with_defer(self, defer: Deferral) -> Result<Self, SpecError> {
        Self::new(self.n_bits, self.src, self.dst, defer)
    }

    pub fn n_bits(&self) -> u16 {
        self.n_bits
    }

    pub fn src(&self) -> &SpecSrc {
        &self.src
    }

    pub fn dst(&self) -> &SpecDst {
        &self.dst
    }

    pub fn defer(&self) -> Deferral {
        self.defer
    }

    pub fn src_type(&self) -> SrcType {
        match self.src {
            SpecSrc::Field(_) => SrcType::Field,
            SpecSrc::Immediate(_) => SrcType::Immediate,
        }
    }

    pub fn dst_type(&self) -> DstType {
        self.dst.dst_type()
    }

    /// The value this spec carries for a packet with fields `flow`.
    pub fn value(&self, flow: &Flow) -> u128 {
        match &self.src {
            SpecSrc::Field(sf) => flow.read_subfield(sf),
            SpecSrc::Immediate(v) => *v,
        }
    }

    /// Age the deferral by one execution, pinning the live value of
    /// the source once the count has run out.
    pub fn step_deferral(&mut self, flow: &Flow) -> DeferralStep {
        match self.defer {
            Deferral::Never => DeferralStep::Inactive,
            Deferral::Count(0) => {
                let val = self.value(flow);
                self.src = SpecSrc::Immediate(val);
                self.defer = Deferral::Never;
                DeferralStep::Pinned(val)
            }
            Deferral::Count(n) => {
                self.defer = Deferral::Count(n - 1);
                DeferralStep::Counted(n - 1)
            }
        }
    }

    pub fn header(&self) -> u16 {
        let src_bit = match self.src {
            SpecSrc::Field(_) => 0,
            SpecSrc::Immediate(_) => SPEC_SRC_MASK,
        };
        src_bit | self.dst_type().bits() << SPEC_DST_SHIFT | self.n_bits
    }

    fn imm_len(n_bits: u16) -> usize {
        2 * usize::from(n_bits).div_ceil(16)
    }

    /// The encoded length of this spec.
    pub fn encoded_len(&self, with_defer: bool) -> usize {
        let src_len = match self.src {
            SpecSrc::Field(_) => SUBFIELD_LEN,
            SpecSrc::Immediate(_) => Self::imm_len(self.n_bits),
        };
        let dst_len = if self.dst.subfield().is_some() { SUBFIELD_LEN } else { 0 };
        2 + usize::from(with_defer) + src_len + dst_len
    }

    pub fn encode(&self, buf: &mut Vec<u8>, with_defer: bool) {
        buf.extend_from_slice(&self.header().to_be_bytes());
        if with_defer {
            buf.push(self.defer.to_wire());
        }

        match &self.src {
            SpecSrc::Field(sf) => put_subfield(buf, sf),
            SpecSrc::Immediate(v) => {
                let n = Self::imm_len(self.n_bits);
                buf.extend_from_slice(&v.to_be_bytes()[16 - n..]);
            }
        }

        if let Some(sf) = self.dst.subfield() {
            put_subfield(buf, sf);
        }
    }

    /// Decode the spec whose header has already been read.
    pub fn decode_body(
        header: u16,
        cur: &mut Cursor,
        with_defer: bool,
    ) -> DecodeResult<Self> {
        if header & SPEC_RESERVED_MASK != 0 {
            return Err(DecodeError::BadSpecHeader(header));
        }

        let n_bits = header & SPEC_NBITS_MASK;
        if n_bits == 0 || n_bits > MAX_SPEC_BITS {
            return Err(DecodeError::BadSpecHeader(header));
        }

        let src_type = if header & SPEC_SRC_MASK == 0 {
            SrcType::Field
        } else {
            SrcType::Immediate
        };
        let dst_type = DstType::from_bits(header >> SPEC_DST_SHIFT);

        if src_type == SrcType::Immediate
            && matches!(dst_type, DstType::Output | DstType::Reserved)
        {
            return Err(DecodeError::BadCombination {
                src: src_type,
                dst: dst_type,
            });
        }

        let src_len = match src_type {
            SrcType::Field => SUBFIELD_LEN,
            SrcType::Immediate => Self::imm_len(n_bits),
        };
        let dst_len = match dst_type {
            DstType::Match | DstType::Load => SUBFIELD_LEN,
            DstType::Output | DstType::Reserved => 0,
        };
        let need = usize::from(with_defer) + src_len + dst_len;
        if cur.remaining() < need {
            return Err(DecodeError::Truncated { need, avail: cur.remaining() });
        }

        let defer = if with_defer {
            Deferral::from_wire(cur.read_u8()?)
        } else {
            Deferral::Never
        };

        let src = match src_type {
            SrcType::Field => SpecSrc::Field(read_subfield(cur, n_bits)?),
            SrcType::Immediate => {
                let mut raw = [0u8; 16];
                let bytes = cur.take(src_len)?;
                raw[16 - src_len..].copy_from_slice(bytes);
                SpecSrc::Immediate(u128::from_be_bytes(raw) & low_mask(n_bits))
            }
        };

        let dst = match dst_type {
            DstType::Match => SpecDst::Match(read_subfield(cur, n_bits)?),
            DstType::Load => SpecDst::Load(read_subfield(cur, n_bits)?),
            DstType::Output => SpecDst::Output,
            DstType::Reserved => SpecDst::Reserved,
        };

        Ok(Self::new(n_bits, src, dst, defer)?)
    }
}

fn put_subfield(buf: &mut Vec<u8>, sf: &Subfield) {
    buf.extend_from_slice(&sf.field.nxm_header().to_be_bytes());
    buf.extend_from_slice(&sf.ofs.to_be_bytes());
}

fn read_subfield(cur: &mut Cursor, n_bits: u16) -> DecodeResult<Subfield> {
    let hdr = cur.read_u32()?;
    let field =
        Field::from_nxm_header(hdr).ok_or(DecodeError::UnknownField(hdr))?;
    let ofs = cur.read_u16()?;
    Ok(Subfield::new(field, ofs, n_bits))
}

/// Encode a spec list; a zero header is never written since the list
/// length is implied by its container.
pub fn encode_specs(specs: &[FieldSpec], buf: &mut Vec<u8>, with_defer: bool) {
    for spec in specs {
        spec.encode(buf, with_defer);
    }
}

/// Decode the spec list filling `region`.
///
/// The list ends at a zero header or when fewer than two bytes
/// remain; anything left over must be zero padding.
pub fn decode_specs(
    region: &[u8],
    with_defer: bool,
) -> DecodeResult<Vec<FieldSpec>> {
    let mut cur = Cursor::new(region);
    let mut specs = Vec::new();

    while cur.remaining() >= 2 {
        let header = cur.peek_u16()?;
        if header == 0 {
            break;
        }
        cur.read_u16()?;
        specs.push(FieldSpec::decode_body(header, &mut cur, with_defer)?);
    }

    super::wire::check_zeros(cur.rest())?;
    Ok(specs)
}

impl Display for Deferral {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Never => write!(f, "never"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::wire::DecodeErrorKind;

    fn eth_copy() -> FieldSpec {
        FieldSpec::copy_match(
            Subfield::whole(Field::EthSrc),
            Subfield::whole(Field::EthDst),
        )
        .unwrap()
    }

    #[test]
    fn header_packing() {
        let spec = eth_copy();
        assert_eq!(spec.header(), 48);

        let spec = FieldSpec::imm_load(5, Subfield::whole(Field::Reg0)).unwrap();
        assert_eq!(spec.header(), SPEC_SRC_MASK | 1 << SPEC_DST_SHIFT | 32);

        let spec = FieldSpec::output(Subfield::new(Field::Reg1, 0, 16)).unwrap();
        assert_eq!(spec.header(), 2 << SPEC_DST_SHIFT | 16);
    }

    #[test]
    fn invariants() {
        let reg0 = Subfield::whole(Field::Reg0);
        let reg1_lo = Subfield::new(Field::Reg1, 0, 16);

        assert_eq!(
            FieldSpec::copy_match(reg0, reg1_lo),
            Err(SpecError::WidthMismatch { sf: 16, spec: 32 })
        );
        assert_eq!(
            FieldSpec::imm_match(0x1_0000, reg1_lo),
            Err(SpecError::ImmediateTooWide(0x1_0000))
        );
        assert_eq!(
            FieldSpec::new(16, SpecSrc::Immediate(1), SpecDst::Output, Deferral::Never),
            Err(SpecError::BadCombination {
                src: SrcType::Immediate,
                dst: DstType::Output
            })
        );
        assert_eq!(
            FieldSpec::new(0, SpecSrc::Immediate(0), SpecDst::Load(reg0), Deferral::Never),
            Err(SpecError::BadWidth(0))
        );
        assert_eq!(
            FieldSpec::imm_match(1, reg0).unwrap().with_defer(Deferral::Count(1)),
            Err(SpecError::BadDeferral)
        );
        assert_eq!(
            FieldSpec::output(reg1_lo).unwrap().with_defer(Deferral::Count(1)),
            Err(SpecError::BadDeferral)
        );
        assert!(eth_copy().with_defer(Deferral::Count(254)).is_ok());
    }

    #[test]
    fn decode_field_match() {
        let spec = eth_copy().with_defer(Deferral::Count(3)).unwrap();
        let mut buf = Vec::new();
        spec.encode(&mut buf, true);
        assert_eq!(buf.len(), spec.encoded_len(true));
        assert_eq!(
            buf,
            [
                0x00, 0x30, 0x03, 0x00, 0x00, 0x04, 0x06, 0x00, 0x00, 0x00,
                0x00, 0x02, 0x06, 0x00, 0x00,
            ]
        );
        assert_eq!(decode_specs(&buf, true), Ok(vec![spec]));
    }

    #[test]
    fn decode_immediate_width() {
        // A 20-bit immediate occupies four bytes.
        let spec =
            FieldSpec::imm_match(0xabcde, Subfield::new(Field::Reg2, 4, 20))
                .unwrap();
        let mut buf = Vec::new();
        spec.encode(&mut buf, false);
        assert_eq!(&buf[2..6], &[0x00, 0x0a, 0xbc, 0xde]);
        assert_eq!(decode_specs(&buf, false), Ok(vec![spec]));
    }

    #[test]
    fn decode_stops_at_zero_header() {
        let mut buf = Vec::new();
        eth_copy().encode(&mut buf, true);
        buf.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decode_specs(&buf, true), Ok(vec![eth_copy()]));

        buf.push(1);
        assert_eq!(decode_specs(&buf, true), Err(DecodeError::NonzeroPadding));
    }

    #[test]
    fn decode_rejects_immediate_output() {
        let header = SPEC_SRC_MASK | 2 << SPEC_DST_SHIFT | 16;
        let mut buf = header.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0xff, 0x00, 0x01]);
        let err = decode_specs(&buf, true).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadCombination {
                src: SrcType::Immediate,
                dst: DstType::Output
            }
        );
        assert_eq!(err.kind(), DecodeErrorKind::BadArgument);
    }

    #[test]
    fn decode_overrun() {
        let mut buf = Vec::new();
        eth_copy().encode(&mut buf, true);
        buf.truncate(buf.len() - 1);
        let err = decode_specs(&buf, true).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { need: 13, avail: 12 });
        assert_eq!(err.kind(), DecodeErrorKind::BadLen);
    }

    #[test]
    fn decode_reserved_header_bits() {
        let buf = (0x8000u16 | 16).to_be_bytes();
        assert_eq!(
            decode_specs(&buf, false),
            Err(DecodeError::BadSpecHeader(0x8010))
        );
    }

    #[test]
    fn deferral_steps() {
        let flow = Flow::new().with(Field::EthSrc, 0x1122_3344_5566);
        let mut spec = eth_copy().with_defer(Deferral::Count(1)).unwrap();

        assert_eq!(spec.step_deferral(&flow), DeferralStep::Counted(0));
        assert_eq!(spec.src_type(), SrcType::Field);
        assert_eq!(spec.step_deferral(&flow), DeferralStep::Pinned(0x1122_3344_5566));
        assert_eq!(*spec.src(), SpecSrc::Immediate(0x1122_3344_5566));
        assert_eq!(spec.defer(), Deferral::Never);
        assert_eq!(spec.step_deferral(&flow), DeferralStep::Inactive);
    }
}
