// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod counter;
pub mod ip;
pub mod mac;

pub use counter::*;
pub use ip::*;
pub use mac::*;

/// The overall version of the learning-action API. Anytime a wire
/// layout or API type is added, removed, or modified, this number
/// should increment.
pub const API_VERSION: u64 = 3;
