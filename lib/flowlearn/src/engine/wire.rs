// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Wire-level plumbing shared by every action codec.
//!
//! All actions use the OpenFlow action framing: a 16-bit type and a
//! 16-bit length covering the whole action, which must be a multiple
//! of 8. Vendor actions (type `0xffff`) follow that with the Nicira
//! vendor id and a 16-bit subtype.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         type = 0xffff         |              len              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    vendor = 0x00002320                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            subtype            |         body ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Every integer is big-endian. Fixed-size envelopes are described by
//! the `*Raw` structs below; variable-length bodies are walked with a
//! [`Cursor`], whose reads are all bounds-checked.

use super::spec::DstType;
use super::spec::SpecError;
use super::spec::SrcType;
use alloc::string::String;
use alloc::vec::Vec;
use core::mem::size_of;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::network_endian::U16;
use zerocopy::byteorder::network_endian::U32;
use zerocopy::byteorder::network_endian::U64;

pub const OFPAT_OUTPUT: u16 = 0;
pub const OFPAT_VENDOR: u16 = 0xffff;
pub const NX_VENDOR_ID: u32 = 0x0000_2320;

pub const NXAST_REG_LOAD: u16 = 7;
pub const NXAST_RESUBMIT_TABLE: u16 = 14;
pub const NXAST_FIN_TIMEOUT: u16 = 19;
pub const NXAST_INCREMENT_TABLE_ID: u16 = 40;
pub const NXAST_INCREMENT_COOKIE: u16 = 41;
pub const NXAST_LEARN_DELETE: u16 = 42;
pub const NXAST_LEARN_LEARN: u16 = 43;
pub const NXAST_TIMEOUT_ACT: u16 = 44;

/// Every action is a multiple of this many bytes.
pub const ACTION_ALIGN: usize = 8;

/// Actions may embed other actions; decoding gives up past this depth.
pub const MAX_NESTING: u8 = 16;

/// The OpenFlow error code a decode failure maps to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeErrorKind {
    BadLen,
    BadArgument,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DecodeError {
    #[error("truncated: need {need} bytes, {avail} available")]
    Truncated { need: usize, avail: usize },
    #[error("bad action length: {0}")]
    BadActionLen(usize),
    #[error("bad nested action length: {0}")]
    BadNestedLen(usize),
    #[error("bad spec header: {0:#06x}")]
    BadSpecHeader(u16),
    #[error("invalid spec combination: {src:?} -> {dst:?}")]
    BadCombination { src: SrcType, dst: DstType },
    #[error("table id 255 is not valid for learning actions")]
    BadTableId,
    #[error("unsupported flags: {0:#x}")]
    UnsupportedFlags(u16),
    #[error("unknown table spec: {0}")]
    BadTableSpec(u8),
    #[error("unknown cookie spec: {0}")]
    BadCookieSpec(u8),
    #[error("bad boolean: {0}")]
    BadBool(u8),
    #[error("bad counter selector: {0}")]
    BadSelector(u8),
    #[error("unknown field: {0:#010x}")]
    UnknownField(u32),
    #[error("register load value {value:#x} wider than {n_bits} bits")]
    LoadOverflow { value: u64, n_bits: u16 },
    #[error("non-zero padding")]
    NonzeroPadding,
    #[error("declared {declared} specs, found {found}")]
    SpecCountMismatch { declared: u32, found: usize },
    #[error("actions nested deeper than {0} levels")]
    TooDeep(u8),
    #[error("{0}")]
    Spec(#[from] SpecError),
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            Self::Truncated { .. }
            | Self::BadActionLen(_)
            | Self::BadNestedLen(_) => DecodeErrorKind::BadLen,
            _ => DecodeErrorKind::BadArgument,
        }
    }
}

pub type DecodeResult<T> = core::result::Result<T, DecodeError>;

/// A bounds-checked reader over an untrusted byte slice.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread bytes.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let avail = self.remaining();
        if n > avail {
            return Err(DecodeError::Truncated { need: n, avail });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read a fixed-layout value.
    pub fn read<T: FromBytes + KnownLayout + Immutable>(
        &mut self,
    ) -> DecodeResult<T> {
        let need = size_of::<T>();
        let avail = self.remaining();
        let bytes = self.take(need)?;
        T::read_from_bytes(bytes)
            .map_err(|_| DecodeError::Truncated { need, avail })
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        Ok(self.read::<U16>()?.get())
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        Ok(self.read::<U32>()?.get())
    }

    /// Look at the next big-endian `u16` without consuming it.
    pub fn peek_u16(&self) -> DecodeResult<u16> {
        self.clone().read_u16()
    }
}

/// The number of zero bytes needed to bring `len` to an 8-byte
/// boundary.
pub const fn pad_len(len: usize) -> usize {
    (ACTION_ALIGN - len % ACTION_ALIGN) % ACTION_ALIGN
}

pub fn put_zeros(buf: &mut Vec<u8>, n: usize) {
    buf.resize(buf.len() + n, 0);
}

pub fn check_zeros(bytes: &[u8]) -> DecodeResult<()> {
    if bytes.iter().any(|b| *b != 0) {
        return Err(DecodeError::NonzeroPadding);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum EncodeError {
    #[error("encoding is {0} bytes, over the 65535 byte limit")]
    TooLong(usize),
}

pub type EncodeResult<T> = core::result::Result<T, EncodeError>;

/// Convert an encoded length to a 16-bit length field.
pub(crate) fn wire_len(len: usize) -> EncodeResult<u16> {
    u16::try_from(len).map_err(|_| EncodeError::TooLong(len))
}

/// The framing common to every action.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ActionHdrRaw {
    pub typ: U16,
    pub len: U16,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct VendorHdrRaw {
    pub typ: U16,
    pub len: U16,
    pub vendor: U32,
    pub subtype: U16,
}

impl VendorHdrRaw {
    pub fn new(subtype: u16, len: u16) -> Self {
        Self {
            typ: U16::new(OFPAT_VENDOR),
            len: U16::new(len),
            vendor: U32::new(NX_VENDOR_ID),
            subtype: U16::new(subtype),
        }
    }
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct OutputRaw {
    pub typ: U16,
    pub len: U16,
    pub port: U16,
    pub max_len: U16,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ResubmitRaw {
    pub hdr: VendorHdrRaw,
    pub in_port: U16,
    pub table: u8,
    pub pad: [u8; 3],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RegLoadRaw {
    pub hdr: VendorHdrRaw,
    /// `ofs << 6 | (n_bits - 1)`
    pub ofs_nbits: U16,
    pub dst: U32,
    pub value: U64,
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FinTimeoutRaw {
    pub hdr: VendorHdrRaw,
    pub idle_timeout: U16,
    pub hard_timeout: U16,
    pub pad: [u8; 2],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct IncrementTableIdRaw {
    pub hdr: VendorHdrRaw,
    pub selector: u8,
    pub pad: [u8; 5],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct IncrementCookieRaw {
    pub hdr: VendorHdrRaw,
    pub pad: [u8; 6],
}

/// The fixed part of a learn action.
///
/// It is followed by the spec list, then `nested_len` bytes of
/// nested actions, then `rear_pad` bytes of zero padding.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct LearnHdrRaw {
    pub hdr: VendorHdrRaw,
    pub idle_timeout: U16,
    pub hard_timeout: U16,
    pub priority: U16,
    pub cookie: U64,
    pub flags: U16,
    pub table_id: u8,
    pub table_spec: u8,
    pub fin_idle_timeout: U16,
    pub fin_hard_timeout: U16,
    pub learn_on_timeout: u8,
    pub cookie_spec: u8,
    pub rear_pad: u8,
    pub pad0: u8,
    pub n_specs: U32,
    pub nested_len: U32,
    pub pad1: [u8; 4],
}

/// The fixed part of a delete action, followed by the spec list and
/// zero padding.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DeleteHdrRaw {
    pub hdr: VendorHdrRaw,
    pub priority: U16,
    pub flags: U16,
    pub table_id: u8,
    pub table_spec: u8,
    pub cookie: U64,
    pub cookie_spec: u8,
    pub pad: [u8; 7],
}

#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TimeoutHdrRaw {
    pub hdr: VendorHdrRaw,
    pub nested_len: U16,
    pub pad: [u8; 4],
}

pub const LEARN_HDR_LEN: usize = size_of::<LearnHdrRaw>();
pub const DELETE_HDR_LEN: usize = size_of::<DeleteHdrRaw>();
pub const TIMEOUT_HDR_LEN: usize = size_of::<TimeoutHdrRaw>();

/// Render bytes as lowercase hex with no separators.
pub fn to_hex(bytes: &[u8]) -> String {
    use core::fmt::Write;

    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Parse hex digits, ignoring whitespace and an optional `0x` prefix.
pub fn from_hex(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = s
        .trim_start_matches("0x")
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits: {s}"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16);
            let lo = (pair[1] as char).to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4 | lo) as u8),
                _ => Err(format!("bad hex digit in: {s}")),
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_sizes() {
        assert_eq!(size_of::<VendorHdrRaw>(), 10);
        assert_eq!(size_of::<OutputRaw>(), 8);
        assert_eq!(size_of::<ResubmitRaw>(), 16);
        assert_eq!(size_of::<RegLoadRaw>(), 24);
        assert_eq!(size_of::<FinTimeoutRaw>(), 16);
        assert_eq!(size_of::<IncrementTableIdRaw>(), 16);
        assert_eq!(size_of::<IncrementCookieRaw>(), 16);
        assert_eq!(LEARN_HDR_LEN, 48);
        assert_eq!(DELETE_HDR_LEN, 32);
        assert_eq!(TIMEOUT_HDR_LEN, 16);
    }

    #[test]
    fn cursor_bounds() {
        let bytes = [0x12, 0x34, 0x56];
        let mut cur = Cursor::new(&bytes);
        assert_eq!(cur.peek_u16(), Ok(0x1234));
        assert_eq!(cur.read_u16(), Ok(0x1234));
        assert_eq!(cur.remaining(), 1);
        let err = cur.read_u16().unwrap_err();
        assert_eq!(err, DecodeError::Truncated { need: 2, avail: 1 });
        assert_eq!(err.kind(), DecodeErrorKind::BadLen);
        // A failed read consumes nothing.
        assert_eq!(cur.read_u8(), Ok(0x56));
        assert!(cur.is_empty());
    }

    #[test]
    fn padding() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(51), 5);
        assert_eq!(pad_len(56), 0);
        assert!(check_zeros(&[0, 0, 0]).is_ok());
        assert_eq!(check_zeros(&[0, 1]), Err(DecodeError::NonzeroPadding));
        assert_eq!(
            DecodeError::NonzeroPadding.kind(),
            DecodeErrorKind::BadArgument
        );
    }

    #[test]
    fn hex() {
        assert_eq!(to_hex(&[0xde, 0xad, 0x01]), "dead01");
        assert_eq!(from_hex("0xdead01"), Ok(vec![0xde, 0xad, 0x01]));
        assert_eq!(from_hex("de ad"), Ok(vec![0xde, 0xad]));
        assert!(from_hex("dea").is_err());
        assert!(from_hex("zz").is_err());
    }
}
