// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Learning actions for an OpenFlow-style software switch.
//!
//! A learning action derives a new flow rule from the packet that
//! triggered it. This crate holds the in-memory model of those
//! actions, their wire codec and text grammar, the validator run when
//! an action is installed, and the executor that turns an action plus
//! a live packet into a [`engine::flow_mod::FlowMod`].

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::large_enum_variant)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

#[macro_use]
extern crate cfg_if;

use alloc::boxed::Box;

pub mod api;
pub mod engine;
pub mod provider;

pub use provider::LogLevel;
pub use provider::LogProvider;
pub use provider::NullLog;

cfg_if! {
    if #[cfg(any(feature = "std", test))] {
        pub mod print;
        pub use provider::PrintlnLog;
    }
}

/// The execution context handed to the executor.
///
/// Carries the providers an action may need while it runs on the
/// packet path.
pub struct ExecCtx {
    pub log: Box<dyn LogProvider>,
}
