// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Counters used to allocate table ids and cookies at learn time.
//!
//! The pipeline is split into three contiguous table zones. Rules
//! learned into the ingress or egress zone get their table id from
//! the matching counter, which the increment-table-id action bumps
//! when a new table is put into service. Counters wrap naturally.

use crate::api::CounterSelector;
use core::sync::atomic::AtomicU8;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// The first table of the production zone.
pub const PRODUCTION_TABLE_START: u8 = 150;
/// The first table of the egress zone.
pub const EGRESS_TABLE_START: u8 = 200;
/// One past the last table of the egress zone.
pub const EGRESS_TABLE_END: u8 = 254;

/// The counters shared by every learning action executing on behalf
/// of one switch.
///
/// Only atomicity is promised: concurrent increments are each
/// observed exactly once, in no particular order.
#[derive(Debug, Default)]
pub struct AtomicCounters {
    ingress: AtomicU8,
    egress: AtomicU8,
    cookie: AtomicU64,
}

impl AtomicCounters {
    pub const fn new() -> Self {
        Self {
            ingress: AtomicU8::new(0),
            egress: AtomicU8::new(0),
            cookie: AtomicU64::new(0),
        }
    }

    fn counter(&self, sel: CounterSelector) -> &AtomicU8 {
        match sel {
            CounterSelector::Ingress => &self.ingress,
            CounterSelector::Egress => &self.egress,
        }
    }

    /// Add `n` to the selected counter, returning its previous value.
    pub fn increment(&self, sel: CounterSelector, n: u8) -> u8 {
        self.counter(sel).fetch_add(n, Ordering::Relaxed)
    }

    pub fn current(&self, sel: CounterSelector) -> u8 {
        self.increment(sel, 0)
    }

    /// Add `n` to the cookie counter, returning its previous value.
    pub fn increment_cookie(&self, n: u64) -> u64 {
        self.cookie.fetch_add(n, Ordering::Relaxed)
    }

    pub fn current_cookie(&self) -> u64 {
        self.increment_cookie(0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableZone {
    Ingress,
    Production,
    Egress,
}

impl TableZone {
    /// Classify a table id, or `None` for ids past the egress zone.
    pub fn classify(table_id: u8) -> Option<Self> {
        match table_id {
            0..PRODUCTION_TABLE_START => Some(Self::Ingress),
            PRODUCTION_TABLE_START..EGRESS_TABLE_START => Some(Self::Production),
            EGRESS_TABLE_START..EGRESS_TABLE_END => Some(Self::Egress),
            _ => None,
        }
    }

    /// The counter that allocates tables in this zone.
    pub fn counter(self) -> Option<CounterSelector> {
        match self {
            Self::Ingress => Some(CounterSelector::Ingress),
            Self::Production => None,
            Self::Egress => Some(CounterSelector::Egress),
        }
    }
}

/// The counter that allocates `table_id`, if any.
pub fn counter_for_table(table_id: u8) -> Option<CounterSelector> {
    TableZone::classify(table_id).and_then(TableZone::counter)
}
