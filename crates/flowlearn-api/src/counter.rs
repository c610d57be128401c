// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// Selects one of the two table-allocation counters.
///
/// The discriminants are the values carried on the wire by the
/// increment-table-id action.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[repr(u8)]
pub enum CounterSelector {
    Ingress = 1,
    Egress = 2,
}

impl TryFrom<u8> for CounterSelector {
    type Error = u8;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            1 => Ok(Self::Ingress),
            2 => Ok(Self::Egress),
            _ => Err(val),
        }
    }
}

impl From<CounterSelector> for u8 {
    fn from(sel: CounterSelector) -> u8 {
        sel as u8
    }
}

impl FromStr for CounterSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INGRESS" => Ok(Self::Ingress),
            "EGRESS" => Ok(Self::Egress),
            _ => Err(format!(
                "invalid counter spec: {s}, must be 'INGRESS' or 'EGRESS'"
            )),
        }
    }
}

impl Display for CounterSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Ingress => "INGRESS",
            Self::Egress => "EGRESS",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn selector_text() {
        assert_eq!("ingress".parse::<CounterSelector>(), Ok(CounterSelector::Ingress));
        assert_eq!("EGRESS".parse::<CounterSelector>(), Ok(CounterSelector::Egress));
        assert!("both".parse::<CounterSelector>().is_err());
        assert_eq!(CounterSelector::Egress.to_string(), "EGRESS");
    }

    #[test]
    fn selector_wire() {
        assert_eq!(CounterSelector::try_from(1), Ok(CounterSelector::Ingress));
        assert_eq!(CounterSelector::try_from(0), Err(0));
        assert_eq!(u8::from(CounterSelector::Egress), 2);
    }
}
