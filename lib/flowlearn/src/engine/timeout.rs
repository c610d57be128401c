// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The timeout action: a list of actions the switch runs when the
//! rule carrying it expires.

use super::action::ActionList;
use super::wire::Cursor;
use super::wire::DecodeError;
use super::wire::DecodeResult;
use super::wire::EncodeResult;
use super::wire::NXAST_TIMEOUT_ACT;
use super::wire::TIMEOUT_HDR_LEN;
use super::wire::TimeoutHdrRaw;
use super::wire::VendorHdrRaw;
use super::wire::check_zeros;
use super::wire::pad_len;
use super::wire::put_zeros;
use super::wire::wire_len;
use alloc::vec::Vec;
use serde::Serialize;
use zerocopy::IntoBytes;
use zerocopy::byteorder::network_endian::U16;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TimeoutAction {
    pub actions: ActionList,
}

impl TimeoutAction {
    pub fn decode(bytes: &[u8], depth: u8) -> DecodeResult<Self> {
        let raw: TimeoutHdrRaw = Cursor::new(bytes).read()?;
        let len = bytes.len();
        if usize::from(raw.hdr.len.get()) != len || pad_len(len) != 0 {
            return Err(DecodeError::BadActionLen(len));
        }
        check_zeros(&raw.pad)?;

        let nested_len = usize::from(raw.nested_len.get());
        let nested_end = TIMEOUT_HDR_LEN
            .checked_add(nested_len)
            .filter(|end| *end <= len)
            .ok_or(DecodeError::BadNestedLen(nested_len))?;
        check_zeros(&bytes[nested_end..])?;

        let actions = ActionList::decode(
            &bytes[TIMEOUT_HDR_LEN..nested_end],
            depth.saturating_add(1),
        )?;
        Ok(Self { actions })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> EncodeResult<()> {
        let mut body = Vec::new();
        self.actions.encode(&mut body)?;
        let nested_len = body.len();
        let pad = pad_len(TIMEOUT_HDR_LEN + nested_len);
        put_zeros(&mut body, pad);

        let raw = TimeoutHdrRaw {
            hdr: VendorHdrRaw::new(
                NXAST_TIMEOUT_ACT,
                wire_len(TIMEOUT_HDR_LEN + body.len())?,
            ),
            nested_len: U16::new(wire_len(nested_len)?),
            pad: [0; 4],
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
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::action::Action;
    use crate::engine::wire::DecodeErrorKind;

    #[test]
    fn round_trip() {
        let act = TimeoutAction {
            actions: ActionList::from(vec![
                Action::IncrementCookie,
                Action::Output { port: 3, max_len: 0 },
            ]),
        };
        let bytes = act.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16 + 16 + 8);
        assert_eq!(&bytes[10..12], &[0, 24]);
        assert_eq!(TimeoutAction::decode(&bytes, 0), Ok(act));
    }

    #[test]
    fn empty() {
        let bytes = TimeoutAction::default().to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(TimeoutAction::decode(&bytes, 0), Ok(TimeoutAction::default()));
    }

    #[test]
    fn nested_len_overrun() {
        let mut bytes = TimeoutAction::default().to_bytes().unwrap();
        bytes[11] = 8;
        let err = TimeoutAction::decode(&bytes, 0).unwrap_err();
        assert_eq!(err, DecodeError::BadNestedLen(8));
        assert_eq!(err.kind(), DecodeErrorKind::BadLen);
    }
}
