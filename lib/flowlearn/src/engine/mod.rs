// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The learning-action engine.
pub mod action;
pub mod check;
pub mod counter;
pub mod deferral;
pub mod field;
pub mod flow_mod;
pub mod learn;
pub mod learn_delete;
pub mod parse;
pub mod spec;
pub mod timeout;
pub mod wire;

use alloc::string::String;
use spec::SpecError;
use thiserror::Error;

pub use action::Action;
pub use action::ActionList;
pub use check::ValidationError;
pub use counter::AtomicCounters;
pub use field::Field;
pub use field::Flow;
pub use field::Match;
pub use field::Subfield;
pub use flow_mod::FlowMod;
pub use flow_mod::PacketCtx;
pub use learn::LearnAction;
pub use learn_delete::DeleteLearnAction;
pub use spec::FieldSpec;
pub use timeout::TimeoutAction;
pub use wire::DecodeError;
pub use wire::EncodeError;

/// An error from the text grammar.
///
/// Every variant carries enough of the offending input to produce a
/// useful message on its own.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseErr {
    #[error("unbalanced delimiters: {0}")]
    Unbalanced(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("malformed subfield: {0}")]
    BadSubfield(String),
    #[error("malformed integer: {0}")]
    MalformedInt(String),
    #[error("value {0} does not fit in {1} bits")]
    ValTooWide(String, u16),
    #[error("{0}: table id 255 not valid for learning actions")]
    BadTable(String),
    #[error("deferral syntax: (defer=N) with N below 255: {0}")]
    BadDeferral(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("malformed spec {0}: {1}")]
    BadSpec(String, SpecError),
    #[error("{0}")]
    TooLong(#[from] EncodeError),
    #[error("{0}")]
    Other(String),
}

pub type ParseResult<T> = core::result::Result<T, ParseErr>;

impl From<String> for ParseErr {
    fn from(err: String) -> Self {
        ParseErr::Other(err)
    }
}
