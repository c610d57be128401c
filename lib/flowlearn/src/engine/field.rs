// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The packet fields a learning action can read, match, or load.
//!
//! Each field is identified on the wire by its NXM header: a 32-bit
//! value packing the vendor class, the field number, a has-mask bit,
//! and the payload length in bytes.
//!
//! ```text
//!  31                16 15          9   8   7            0
//! +--------------------+-------------+-----+--------------+
//! |       vendor       |    field    | hm  |    length    |
//! +--------------------+-------------+-----+--------------+
//! ```
//!
//! Alongside the header, the catalog records the width of every
//! field, whether a match on the field may be partial (maskable),
//! whether the field is a legal target of a register load (writable),
//! and the prerequisite which must hold before the field has a
//! meaning at all. For example, `ip_src` is only defined for packets
//! with an `eth_type` of IPv4.

use super::ParseErr;
use super::ParseResult;
use super::parse::parse_num;
use crate::api::Ipv4Addr;
use crate::api::MacAddr;
use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

pub const FIELD_COUNT: usize = 25;

pub const ETHERTYPE_IPV4: u128 = 0x0800;
pub const IP_PROTO_ICMP: u128 = 1;
pub const IP_PROTO_TCP: u128 = 6;
pub const IP_PROTO_UDP: u128 = 17;

/// Return a value with the low `n_bits` bits set.
pub const fn low_mask(n_bits: u16) -> u128 {
    if n_bits >= 128 { u128::MAX } else { (1u128 << n_bits) - 1 }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Field {
    InPort,
    EthDst,
    EthSrc,
    EthType,
    VlanTci,
    IpTos,
    IpProto,
    IpSrc,
    IpDst,
    TcpSrc,
    TcpDst,
    UdpSrc,
    UdpDst,
    IcmpType,
    IcmpCode,
    Reg0,
    Reg1,
    Reg2,
    Reg3,
    Reg4,
    Reg5,
    Reg6,
    Reg7,
    TunId,
    IpTtl,
}

/// What must be true of a packet before a field is meaningful.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Prereq {
    None,
    Ipv4,
    Tcp,
    Udp,
    Icmp,
}

impl Prereq {
    /// The exact field values this prerequisite demands.
    pub fn requirements(self) -> &'static [(Field, u128)] {
        match self {
            Self::None => &[],
            Self::Ipv4 => &[(Field::EthType, ETHERTYPE_IPV4)],
            Self::Tcp => &[
                (Field::EthType, ETHERTYPE_IPV4),
                (Field::IpProto, IP_PROTO_TCP),
            ],
            Self::Udp => &[
                (Field::EthType, ETHERTYPE_IPV4),
                (Field::IpProto, IP_PROTO_UDP),
            ],
            Self::Icmp => &[
                (Field::EthType, ETHERTYPE_IPV4),
                (Field::IpProto, IP_PROTO_ICMP),
            ],
        }
    }
}

/// How a full-width value of the field is written by operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueFormat {
    Mac,
    Ipv4,
    Hex,
    Decimal,
}

#[derive(Debug)]
pub struct FieldInfo {
    pub field: Field,
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub nxm_name: &'static str,
    pub nxm_header: u32,
    pub n_bits: u16,
    pub maskable: bool,
    pub writable: bool,
    pub prereq: Prereq,
    pub format: ValueFormat,
}

macro_rules! field_table {
    ($(
        $var:ident, $name:literal, $alias:expr, $nxm:literal, $hdr:literal,
        $bits:literal, $maskable:literal, $writable:literal, $pre:ident,
        $fmt:ident;
    )*) => {
        static FIELDS: [FieldInfo; FIELD_COUNT] = [$(
            FieldInfo {
                field: Field::$var,
                name: $name,
                alias: $alias,
                nxm_name: $nxm,
                nxm_header: $hdr,
                n_bits: $bits,
                maskable: $maskable,
                writable: $writable,
                prereq: Prereq::$pre,
                format: ValueFormat::$fmt,
            },
        )*];

        impl Field {
            pub const ALL: [Field; FIELD_COUNT] = [$(Field::$var,)*];
        }
    };
}

// The rows must follow the declaration order of `Field`.
field_table! {
    InPort, "in_port", None, "NXM_OF_IN_PORT", 0x0000_0002,
        16, false, true, None, Decimal;
    EthDst, "eth_dst", Some("dl_dst"), "NXM_OF_ETH_DST", 0x0000_0206,
        48, true, true, None, Mac;
    EthSrc, "eth_src", Some("dl_src"), "NXM_OF_ETH_SRC", 0x0000_0406,
        48, true, true, None, Mac;
    EthType, "eth_type", Some("dl_type"), "NXM_OF_ETH_TYPE", 0x0000_0602,
        16, false, false, None, Hex;
    VlanTci, "vlan_tci", None, "NXM_OF_VLAN_TCI", 0x0000_0802,
        16, true, true, None, Hex;
    IpTos, "ip_tos", Some("nw_tos"), "NXM_OF_IP_TOS", 0x0000_0a01,
        8, false, true, Ipv4, Decimal;
    IpProto, "ip_proto", Some("nw_proto"), "NXM_OF_IP_PROTO", 0x0000_0c01,
        8, false, false, Ipv4, Decimal;
    IpSrc, "ip_src", Some("nw_src"), "NXM_OF_IP_SRC", 0x0000_0e04,
        32, true, true, Ipv4, Ipv4;
    IpDst, "ip_dst", Some("nw_dst"), "NXM_OF_IP_DST", 0x0000_1004,
        32, true, true, Ipv4, Ipv4;
    TcpSrc, "tcp_src", None, "NXM_OF_TCP_SRC", 0x0000_1202,
        16, false, true, Tcp, Decimal;
    TcpDst, "tcp_dst", None, "NXM_OF_TCP_DST", 0x0000_1402,
        16, false, true, Tcp, Decimal;
    UdpSrc, "udp_src", None, "NXM_OF_UDP_SRC", 0x0000_1602,
        16, false, true, Udp, Decimal;
    UdpDst, "udp_dst", None, "NXM_OF_UDP_DST", 0x0000_1802,
        16, false, true, Udp, Decimal;
    IcmpType, "icmp_type", None, "NXM_OF_ICMP_TYPE", 0x0000_1a01,
        8, false, false, Icmp, Decimal;
    IcmpCode, "icmp_code", None, "NXM_OF_ICMP_CODE", 0x0000_1c01,
        8, false, false, Icmp, Decimal;
    Reg0, "reg0", None, "NXM_NX_REG0", 0x0001_0004,
        32, true, true, None, Hex;
    Reg1, "reg1", None, "NXM_NX_REG1", 0x0001_0204,
        32, true, true, None, Hex;
    Reg2, "reg2", None, "NXM_NX_REG2", 0x0001_0404,
        32, true, true, None, Hex;
    Reg3, "reg3", None, "NXM_NX_REG3", 0x0001_0604,
        32, true, true, None, Hex;
    Reg4, "reg4", None, "NXM_NX_REG4", 0x0001_0804,
        32, true, true, None, Hex;
    Reg5, "reg5", None, "NXM_NX_REG5", 0x0001_0a04,
        32, true, true, None, Hex;
    Reg6, "reg6", None, "NXM_NX_REG6", 0x0001_0c04,
        32, true, true, None, Hex;
    Reg7, "reg7", None, "NXM_NX_REG7", 0x0001_0e04,
        32, true, true, None, Hex;
    TunId, "tun_id", None, "NXM_NX_TUN_ID", 0x0001_2008,
        64, true, true, None, Hex;
    IpTtl, "ip_ttl", Some("nw_ttl"), "NXM_NX_IP_TTL", 0x0001_3a01,
        8, false, true, Ipv4, Decimal;
}

impl Field {
    pub fn info(self) -> &'static FieldInfo {
        &FIELDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn nxm_name(self) -> &'static str {
        self.info().nxm_name
    }

    pub fn nxm_header(self) -> u32 {
        self.info().nxm_header
    }

    pub fn n_bits(self) -> u16 {
        self.info().n_bits
    }

    pub fn full_mask(self) -> u128 {
        low_mask(self.n_bits())
    }

    pub fn from_nxm_header(hdr: u32) -> Option<Self> {
        FIELDS.iter().find(|i| i.nxm_header == hdr).map(|i| i.field)
    }

    /// Look up a field by its short name, its alias, or its NXM name.
    pub fn from_name(name: &str) -> Option<Self> {
        FIELDS
            .iter()
            .find(|i| {
                i.name == name || i.alias == Some(name) || i.nxm_name == name
            })
            .map(|i| i.field)
    }

    /// Format a full-width value of this field the way an operator
    /// would write it.
    pub fn format_value(self, val: u128) -> String {
        match self.info().format {
            ValueFormat::Mac => MacAddr::from(val as u64).to_string(),
            ValueFormat::Ipv4 => Ipv4Addr::from(val as u32).to_string(),
            ValueFormat::Hex => format!("{val:#x}"),
            ValueFormat::Decimal => format!("{val}"),
        }
    }

    /// Parse a full-width value of this field.
    ///
    /// Numbers are accepted for every field, in addition to the
    /// address notation of MAC and IPv4 fields.
    pub fn parse_value(self, s: &str) -> ParseResult<u128> {
        let val = match self.info().format {
            ValueFormat::Mac if s.contains(':') => {
                u64::from(MacAddr::from_str(s)?) as u128
            }
            ValueFormat::Ipv4 if s.contains('.') => {
                u32::from(Ipv4Addr::from_str(s)?) as u128
            }
            _ => parse_num(s)?,
        };

        if val & !self.full_mask() != 0 {
            return Err(ParseErr::ValTooWide(s.to_string(), self.n_bits()));
        }

        Ok(val)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A contiguous run of bits within a field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Subfield {
    pub field: Field,
    pub ofs: u16,
    pub n_bits: u16,
}

impl Subfield {
    pub fn new(field: Field, ofs: u16, n_bits: u16) -> Self {
        Self { field, ofs, n_bits }
    }

    /// The subfield covering every bit of `field`.
    pub fn whole(field: Field) -> Self {
        Self { field, ofs: 0, n_bits: field.n_bits() }
    }

    pub fn is_whole(&self) -> bool {
        self.ofs == 0 && self.n_bits == self.field.n_bits()
    }

    /// Is this subfield non-empty and inside its field?
    pub fn in_range(&self) -> bool {
        self.n_bits > 0
            && u32::from(self.ofs) + u32::from(self.n_bits)
                <= u32::from(self.field.n_bits())
    }

    /// The bits of the field this subfield covers.
    pub fn mask(&self) -> u128 {
        low_mask(self.n_bits).checked_shl(u32::from(self.ofs)).unwrap_or(0)
            & self.field.full_mask()
    }
}

impl FromStr for Subfield {
    type Err = ParseErr;

    /// Parse `NAME[]`, `NAME[start..end]` (inclusive), `NAME[bit]`, or
    /// a bare `NAME` meaning the whole field.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseErr::BadSubfield(s.to_string());

        let Some((name, rest)) = s.split_once('[') else {
            let field = Field::from_name(s)
                .ok_or_else(|| ParseErr::UnknownField(s.to_string()))?;
            return Ok(Self::whole(field));
        };

        let field = Field::from_name(name)
            .ok_or_else(|| ParseErr::UnknownField(name.to_string()))?;
        let range = rest.strip_suffix(']').ok_or_else(bad)?;

        if range.is_empty() {
            return Ok(Self::whole(field));
        }

        let (start, end) = match range.split_once("..") {
            Some((a, b)) => (
                a.parse::<u16>().map_err(|_| bad())?,
                b.parse::<u16>().map_err(|_| bad())?,
            ),
            None => {
                let bit = range.parse::<u16>().map_err(|_| bad())?;
                (bit, bit)
            }
        };

        // The full u16 range is one bit too many for n_bits.
        let n_bits = end
            .checked_sub(start)
            .and_then(|d| d.checked_add(1))
            .ok_or_else(bad)?;
        let sf = Self::new(field, start, n_bits);
        if !sf.in_range() {
            return Err(bad());
        }
        Ok(sf)
    }
}

impl Display for Subfield {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.field.nxm_name();
        if self.is_whole() {
            write!(f, "{name}[]")
        } else if self.n_bits == 1 {
            write!(f, "{name}[{}]", self.ofs)
        } else {
            let end = u32::from(self.ofs) + u32::from(self.n_bits) - 1;
            write!(f, "{name}[{}..{end}]", self.ofs)
        }
    }
}

/// The field values of a live packet.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Flow {
    vals: [u128; FIELD_COUNT],
}

impl Flow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> u128 {
        self.vals[field as usize]
    }

    /// Set a field, truncating `val` to the field's width.
    pub fn set(&mut self, field: Field, val: u128) -> &mut Self {
        self.vals[field as usize] = val & field.full_mask();
        self
    }

    pub fn with(mut self, field: Field, val: u128) -> Self {
        self.set(field, val);
        self
    }

    /// Read the bits of `sf`, shifted down to bit zero.
    pub fn read_subfield(&self, sf: &Subfield) -> u128 {
        self.get(sf.field).checked_shr(u32::from(sf.ofs)).unwrap_or(0)
            & low_mask(sf.n_bits)
    }

    pub fn satisfies(&self, prereq: Prereq) -> bool {
        prereq.requirements().iter().all(|(f, v)| self.get(*f) == *v)
    }
}

impl FromStr for Flow {
    type Err = ParseErr;

    /// Parse a comma-separated list of `field=value` assignments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flow = Flow::new();
        for assign in s.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let (name, val) = assign
                .split_once('=')
                .ok_or_else(|| ParseErr::MissingValue(assign.to_string()))?;
            let field = Field::from_name(name)
                .ok_or_else(|| ParseErr::UnknownField(name.to_string()))?;
            flow.set(field, field.parse_value(val)?);
        }
        Ok(flow)
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = Field::ALL
            .iter()
            .filter(|fld| self.get(**fld) != 0)
            .map(|fld| format!("{fld}={}", fld.format_value(self.get(*fld))))
            .join(",");
        write!(f, "{s}")
    }
}

/// Per-field masks; a set bit means the bit is significant.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Wildcards {
    masks: [u128; FIELD_COUNT],
}

impl Wildcards {
    /// Every bit of every field is wildcarded.
    pub fn catchall() -> Self {
        Self::default()
    }

    pub fn mask(&self, field: Field) -> u128 {
        self.masks[field as usize]
    }

    pub fn unwildcard(&mut self, sf: &Subfield) {
        self.masks[sf.field as usize] |= sf.mask();
    }

    pub fn is_exact(&self, field: Field) -> bool {
        self.mask(field) == field.full_mask()
    }
}

/// A flow match: a value and mask for each field.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Match {
    vals: [u128; FIELD_COUNT],
    wc: Wildcards,
}

impl Match {
    pub fn catchall() -> Self {
        Self::default()
    }

    /// Match the bits of `sf` against `val`, which is given shifted
    /// down to bit zero.
    pub fn set_subfield(&mut self, sf: &Subfield, val: u128) {
        let mask = sf.mask();
        let bits = val.checked_shl(u32::from(sf.ofs)).unwrap_or(0) & mask;
        let i = sf.field as usize;
        self.vals[i] = (self.vals[i] & !mask) | bits;
        self.wc.unwildcard(sf);
    }

    pub fn set_exact(&mut self, field: Field, val: u128) {
        self.set_subfield(&Subfield::whole(field), val);
    }

    /// The value and mask of `field`.
    pub fn get(&self, field: Field) -> (u128, u128) {
        (self.vals[field as usize], self.wc.mask(field))
    }

    pub fn wildcards(&self) -> &Wildcards {
        &self.wc
    }

    pub fn is_catchall(&self) -> bool {
        Field::ALL.iter().all(|f| self.wc.mask(*f) == 0)
    }

    /// Does this match pin every field `prereq` demands?
    pub fn satisfies(&self, prereq: Prereq) -> bool {
        prereq
            .requirements()
            .iter()
            .all(|(f, v)| self.wc.is_exact(*f) && self.get(*f).0 == *v)
    }

    /// Would a packet with field values `flow` hit this match?
    pub fn matches(&self, flow: &Flow) -> bool {
        Field::ALL.iter().all(|f| {
            let (val, mask) = self.get(*f);
            flow.get(*f) & mask == val
        })
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_catchall() {
            return write!(f, "*");
        }

        let s = Field::ALL
            .iter()
            .filter(|fld| self.wc.mask(**fld) != 0)
            .map(|fld| {
                let (val, mask) = self.get(*fld);
                if mask == fld.full_mask() {
                    format!("{fld}={}", fld.format_value(val))
                } else {
                    format!("{fld}={val:#x}/{mask:#x}")
                }
            })
            .join(",");
        write!(f, "{s}")
    }
}
