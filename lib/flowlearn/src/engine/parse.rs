// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The operator-facing text grammar.
//!
//! A learn action is written as comma-separated `key[=value]` tokens:
//!
//! ```text
//! table=10,idle_timeout=60,eth_type=0x800,
//!     NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[](defer=3),
//!     load:NXM_OF_IN_PORT[]->NXM_NX_REG0[0..15],
//!     actions={output:in_port}
//! ```
//!
//! Keys naming a property of the action set it; anything else is a
//! field spec. Formatting prints the properties in a fixed order,
//! omits defaults, and is the inverse of parsing.

use super::ParseErr;
use super::ParseResult;
use super::action::Action;
use super::action::ActionList;
use super::action::port_name;
use super::field::Field;
use super::field::Subfield;
use super::field::low_mask;
use super::flow_mod::CookieSpec;
use super::flow_mod::DEFAULT_PRIORITY;
use super::flow_mod::DEFAULT_TABLE;
use super::flow_mod::FlowModFlags;
use super::flow_mod::OFPP_ALL;
use super::flow_mod::OFPP_CONTROLLER;
use super::flow_mod::OFPP_FLOOD;
use super::flow_mod::OFPP_IN_PORT;
use super::flow_mod::OFPP_LOCAL;
use super::flow_mod::OFPP_NORMAL;
use super::flow_mod::OFPP_TABLE;
use super::flow_mod::TableSpec;
use super::learn::INVALID_TABLE_ID;
use super::learn::LearnAction;
use super::learn_delete::DeleteLearnAction;
use super::spec::Deferral;
use super::spec::DEFER_NEVER;
use super::spec::FieldSpec;
use super::spec::SpecDst;
use super::spec::SpecError;
use super::spec::SpecSrc;
use super::timeout::TimeoutAction;
use super::wire::from_hex;
use crate::api::CounterSelector;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;

const NAMED_PORTS: [u16; 7] = [
    OFPP_IN_PORT,
    OFPP_TABLE,
    OFPP_NORMAL,
    OFPP_FLOOD,
    OFPP_ALL,
    OFPP_CONTROLLER,
    OFPP_LOCAL,
];

/// Parse a `0x`-prefixed hex or a decimal integer.
pub(crate) fn parse_num(s: &str) -> ParseResult<u128> {
    let s = s.trim();
    let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => s.parse::<u128>(),
    };
    res.map_err(|_| ParseErr::MalformedInt(s.to_string()))
}

fn parse_int<T: TryFrom<u128>>(s: &str, bits: u16) -> ParseResult<T> {
    T::try_from(parse_num(s)?).map_err(|_| ParseErr::ValTooWide(s.to_string(), bits))
}

fn parse_port(s: &str) -> ParseResult<u16> {
    match NAMED_PORTS.iter().find(|p| port_name(**p) == Some(s)) {
        Some(port) => Ok(*port),
        None => parse_int(s, 16),
    }
}

fn is_numeric(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
}

/// Parse an immediate that must fit in `n_bits`.
fn parse_imm(s: &str, n_bits: u16) -> ParseResult<u128> {
    let val = parse_num(s)?;
    if val & !low_mask(n_bits) != 0 {
        return Err(ParseErr::ValTooWide(s.to_string(), n_bits));
    }
    Ok(val)
}

/// Split `s` at the commas not enclosed in parentheses, braces, or
/// brackets. Empty tokens are dropped.
fn split_top(s: &str) -> ParseResult<Vec<&str>> {
    let mut toks = Vec::new();
    let mut closers = Vec::new();
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => closers.push(')'),
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            ')' | '}' | ']' => {
                if closers.pop() != Some(c) {
                    return Err(ParseErr::Unbalanced(s.to_string()));
                }
            }
            ',' if closers.is_empty() => {
                toks.push(s[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }

    if !closers.is_empty() {
        return Err(ParseErr::Unbalanced(s.to_string()));
    }

    toks.push(s[start..].trim());
    toks.retain(|t| !t.is_empty());
    Ok(toks)
}

fn split_key(tok: &str) -> (&str, Option<&str>) {
    match tok.split_once('=') {
        Some((k, v)) => (k.trim(), Some(v.trim())),
        None => (tok, None),
    }
}

fn need<'a>(key: &str, val: Option<&'a str>) -> ParseResult<&'a str> {
    val.ok_or_else(|| ParseErr::MissingValue(key.to_string()))
}

/// A bare key means "on"; `key=N` means "on" for non-zero `N`.
fn parse_switch(val: Option<&str>) -> ParseResult<bool> {
    match val {
        None => Ok(true),
        Some(v) => Ok(parse_num(v)? != 0),
    }
}

/// `name(args)` to `args`.
fn call_args<'a>(tok: &'a str, name: &str) -> Option<&'a str> {
    tok.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')
}

/// Split a trailing `(defer=N)` off a spec token.
fn strip_defer(tok: &str) -> ParseResult<(&str, Deferral)> {
    let Some(idx) = tok.rfind("(defer=") else {
        return Ok((tok, Deferral::Never));
    };

    let count = tok[idx..]
        .strip_prefix("(defer=")
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| ParseErr::BadDeferral(tok.to_string()))?;
    let n = parse_num(count)
        .ok()
        .and_then(|n| u8::try_from(n).ok())
        .filter(|n| *n != DEFER_NEVER)
        .ok_or_else(|| ParseErr::BadDeferral(tok.to_string()))?;

    Ok((&tok[..idx], Deferral::Count(n)))
}

/// Parse one field spec token.
fn parse_spec(tok: &str, allow_defer: bool) -> ParseResult<FieldSpec> {
    let (body, defer) = strip_defer(tok)?;
    if defer != Deferral::Never && !allow_defer {
        return Err(ParseErr::BadDeferral(tok.to_string()));
    }

    let spec = if let Some(rest) = body.strip_prefix("load:") {
        let (src, dst) = rest
            .split_once("->")
            .ok_or_else(|| ParseErr::MissingValue(tok.to_string()))?;
        let dst: Subfield = dst.parse()?;
        if is_numeric(src) {
            FieldSpec::imm_load(parse_imm(src, dst.n_bits)?, dst)
        } else {
            FieldSpec::copy_load(src.parse()?, dst)
        }
    } else if let Some(src) = body.strip_prefix("output:") {
        FieldSpec::output(src.parse()?)
    } else if let Some(src) = body.strip_prefix("reserved:") {
        FieldSpec::reserved(src.parse()?)
    } else {
        match split_key(body) {
            (name, None) => {
                let sf: Subfield = name.parse()?;
                FieldSpec::copy_match(sf, sf)
            }

            // A field name with a value in the field's own notation.
            (name, Some(val)) if !name.contains('[') => {
                let field = Field::from_name(name)
                    .ok_or_else(|| ParseErr::UnknownField(name.to_string()))?;
                FieldSpec::imm_match(field.parse_value(val)?, Subfield::whole(field))
            }

            (dst, Some(src)) => {
                let dst: Subfield = dst.parse()?;
                if is_numeric(src) {
                    FieldSpec::imm_match(parse_imm(src, dst.n_bits)?, dst)
                } else {
                    FieldSpec::copy_match(src.parse()?, dst)
                }
            }
        }
    };

    let bad = |e: SpecError| ParseErr::BadSpec(tok.to_string(), e);
    spec.map_err(bad)?.with_defer(defer).map_err(bad)
}

/// The properties learn and delete actions share.
struct Envelope {
    priority: u16,
    cookie: u64,
    table_id: u8,
    flags: FlowModFlags,
    table_spec: TableSpec,
    cookie_spec: CookieSpec,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            cookie: 0,
            table_id: DEFAULT_TABLE,
            flags: FlowModFlags::empty(),
            table_spec: TableSpec::Explicit,
            cookie_spec: CookieSpec::Explicit,
        }
    }
}

impl Envelope {
    /// Apply `key`, returning false if it is not an envelope key.
    fn apply(&mut self, tok: &str, key: &str, val: Option<&str>) -> ParseResult<bool> {
        match key {
            "table" => {
                let table_id = parse_int(need(key, val)?, 8)?;
                if table_id == INVALID_TABLE_ID {
                    return Err(ParseErr::BadTable(tok.to_string()));
                }
                self.table_id = table_id;
            }
            "priority" => self.priority = parse_int(need(key, val)?, 16)?,
            "cookie" => self.cookie = parse_int(need(key, val)?, 64)?,
            "send_flow_rem" => {
                self.flags.set(FlowModFlags::SEND_FLOW_REM, parse_switch(val)?);
            }
            "use_atomic_table" => {
                let sel = CounterSelector::from_str(need(key, val)?)?;
                self.table_spec = TableSpec::atomic(sel);
            }
            "use_rule_table" => {
                if parse_switch(val)? {
                    self.table_spec = TableSpec::RuleTable;
                }
            }
            "use_atomic_cookie" => {
                if parse_switch(val)? {
                    self.cookie_spec = CookieSpec::Atomic;
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn table_spec_arg(table_spec: TableSpec) -> Option<String> {
    match table_spec {
        TableSpec::Explicit => None,
        TableSpec::RuleTable => Some("use_rule_table=1".to_string()),
        TableSpec::IngressAtomic | TableSpec::EgressAtomic => table_spec
            .counter()
            .map(|sel| format!("use_atomic_table={sel}")),
    }
}

fn cookie_spec_arg(cookie_spec: CookieSpec) -> Option<String> {
    match cookie_spec {
        CookieSpec::Explicit => None,
        CookieSpec::Atomic => Some("use_atomic_cookie=1".to_string()),
    }
}

impl FromStr for LearnAction {
    type Err = ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut env = Envelope::default();
        let mut learn = LearnAction::default();

        for tok in split_top(s)? {
            let (key, val) = split_key(tok);
            match key {
                "idle_timeout" => learn.idle_timeout = parse_int(need(key, val)?, 16)?,
                "hard_timeout" => learn.hard_timeout = parse_int(need(key, val)?, 16)?,
                "fin_idle_timeout" => {
                    learn.fin_idle_timeout = parse_int(need(key, val)?, 16)?
                }
                "fin_hard_timeout" => {
                    learn.fin_hard_timeout = parse_int(need(key, val)?, 16)?
                }
                "learn_on_timeout" => learn.learn_on_timeout = parse_switch(val)?,
                "actions" => {
                    let list = need(key, val)?;
                    let inner = list
                        .strip_prefix('{')
                        .and_then(|l| l.strip_suffix('}'))
                        .ok_or_else(|| ParseErr::Unbalanced(tok.to_string()))?;
                    learn.actions = inner.parse()?;
                }
                _ => {
                    if !env.apply(tok, key, val)? {
                        learn.specs.push(parse_spec(tok, true)?);
                    }
                }
            }
        }

        learn.priority = env.priority;
        learn.cookie = env.cookie;
        learn.table_id = env.table_id;
        learn.flags = env.flags;
        learn.table_spec = env.table_spec;
        learn.cookie_spec = env.cookie_spec;
        learn.to_bytes()?;
        Ok(learn)
    }
}

impl FromStr for DeleteLearnAction {
    type Err = ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut env = Envelope::default();
        let mut specs = Vec::new();

        for tok in split_top(s)? {
            let (key, val) = split_key(tok);
            if !env.apply(tok, key, val)? {
                specs.push(parse_spec(tok, false)?);
            }
        }

        let delete = DeleteLearnAction {
            priority: env.priority,
            cookie: env.cookie,
            table_id: env.table_id,
            flags: env.flags,
            table_spec: env.table_spec,
            cookie_spec: env.cookie_spec,
            specs,
        };
        delete.to_bytes()?;
        Ok(delete)
    }
}

impl FromStr for TimeoutAction {
    type Err = ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let timeout = Self { actions: s.parse()? };
        timeout.to_bytes()?;
        Ok(timeout)
    }
}

impl FromStr for ActionList {
    type Err = ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let actions = split_top(s)?
            .into_iter()
            .map(Action::from_str)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Self::from(actions))
    }
}

impl FromStr for Action {
    type Err = ParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s == "increment_cookie" {
            return Ok(Self::IncrementCookie);
        }

        if let Some(port) = s.strip_prefix("output:") {
            return Ok(Self::Output { port: parse_port(port)?, max_len: 0 });
        }

        if let Some(rest) = s.strip_prefix("load:") {
            let (val, dst) = rest
                .split_once("->")
                .ok_or_else(|| ParseErr::MissingValue(s.to_string()))?;
            let dst: Subfield = dst.parse()?;
            if dst.n_bits > 64 {
                return Err(ParseErr::Other(format!(
                    "load destination {dst} wider than 64 bits"
                )));
            }
            let value = parse_imm(val, dst.n_bits)?;
            return Ok(Self::RegLoad { dst, value: value as u64 });
        }

        let unknown = || ParseErr::UnknownAction(s.to_string());
        let (name, _) = s.split_once('(').ok_or_else(unknown)?;
        let args = call_args(s, name)
            .ok_or_else(|| ParseErr::Unbalanced(s.to_string()))?;

        match name {
            "output" => {
                let mut port = None;
                let mut max_len = 0;
                for tok in split_top(args)? {
                    match split_key(tok) {
                        ("port", Some(v)) => port = Some(parse_port(v)?),
                        ("max_len", Some(v)) => max_len = parse_int(v, 16)?,
                        (k, _) => return Err(ParseErr::MissingValue(k.to_string())),
                    }
                }
                let port = port.ok_or_else(|| ParseErr::MissingValue("port".to_string()))?;
                Ok(Self::Output { port, max_len })
            }

            "resubmit" => {
                let (port, table) = args
                    .split_once(',')
                    .ok_or_else(|| ParseErr::MissingValue(s.to_string()))?;
                let in_port = match port.trim() {
                    "" => OFPP_IN_PORT,
                    p => parse_port(p)?,
                };
                Ok(Self::Resubmit { in_port, table: parse_int(table, 8)? })
            }

            "fin_timeout" => {
                let mut idle_timeout = 0;
                let mut hard_timeout = 0;
                for tok in split_top(args)? {
                    match split_key(tok) {
                        ("idle_timeout", Some(v)) => idle_timeout = parse_int(v, 16)?,
                        ("hard_timeout", Some(v)) => hard_timeout = parse_int(v, 16)?,
                        (k, _) => return Err(ParseErr::MissingValue(k.to_string())),
                    }
                }
                Ok(Self::FinTimeout { idle_timeout, hard_timeout })
            }

            "increment_table_id" => {
                Ok(Self::IncrementTableId(CounterSelector::from_str(args.trim())?))
            }
            "learn_learn" => Ok(Self::Learn(args.parse()?)),
            "learn_delete" => Ok(Self::Delete(args.parse()?)),
            "timeout_act" => Ok(Self::Timeout(args.parse()?)),

            "opaque" => {
                // The bytes must decode back to this same opaque action,
                // or the text would not survive a trip through the wire.
                let bytes = from_hex(args)?;
                let list = ActionList::decode(&bytes, 0).map_err(|e| {
                    ParseErr::Other(format!("opaque action {args}: {e}"))
                })?;
                match &list[..] {
                    [Self::Opaque(_)] => Ok(Self::Opaque(bytes)),
                    [known] => Err(ParseErr::Other(format!(
                        "opaque action {args} is a known action: {known}"
                    ))),
                    _ => Err(ParseErr::Other(format!(
                        "opaque action is not a single framed action: {args}"
                    ))),
                }
            }

            _ => Err(unknown()),
        }
    }
}

impl Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.src(), self.dst()) {
            (SpecSrc::Immediate(v), SpecDst::Match(dst)) if dst.is_whole() => {
                write!(f, "{}={}", dst.field.name(), dst.field.format_value(*v))?
            }
            (SpecSrc::Immediate(v), SpecDst::Match(dst)) => write!(f, "{dst}={v:#x}")?,
            (SpecSrc::Field(src), SpecDst::Match(dst)) if src == dst => {
                write!(f, "{dst}")?
            }
            (SpecSrc::Field(src), SpecDst::Match(dst)) => write!(f, "{dst}={src}")?,
            (SpecSrc::Immediate(v), SpecDst::Load(dst)) => {
                write!(f, "load:{v:#x}->{dst}")?
            }
            (SpecSrc::Field(src), SpecDst::Load(dst)) => write!(f, "load:{src}->{dst}")?,
            (SpecSrc::Field(src), SpecDst::Output) => write!(f, "output:{src}")?,
            (SpecSrc::Field(src), SpecDst::Reserved) => write!(f, "reserved:{src}")?,
            // Rejected by the constructor.
            (SpecSrc::Immediate(v), SpecDst::Output | SpecDst::Reserved) => {
                write!(f, "{:?}:{v:#x}", self.dst_type())?
            }
        }

        if let Deferral::Count(n) = self.defer() {
            write!(f, "(defer={n})")?;
        }
        Ok(())
    }
}

impl Display for LearnAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut args = vec![format!("table={}", self.table_id)];

        let timeouts = [
            ("idle_timeout", self.idle_timeout),
            ("hard_timeout", self.hard_timeout),
            ("fin_idle_timeout", self.fin_idle_timeout),
            ("fin_hard_timeout", self.fin_hard_timeout),
        ];
        for (key, val) in timeouts {
            if val != 0 {
                args.push(format!("{key}={val}"));
            }
        }

        if self.priority != DEFAULT_PRIORITY {
            args.push(format!("priority={}", self.priority));
        }
        if self.flags.contains(FlowModFlags::SEND_FLOW_REM) {
            args.push("send_flow_rem".to_string());
        }
        if self.cookie != 0 {
            args.push(format!("cookie={:#x}", self.cookie));
        }
        if self.learn_on_timeout {
            args.push("learn_on_timeout".to_string());
        }
        args.extend(table_spec_arg(self.table_spec));
        args.extend(cookie_spec_arg(self.cookie_spec));
        args.extend(self.specs.iter().map(ToString::to_string));
        if !self.actions.is_empty() {
            args.push(format!("actions={{{}}}", self.actions));
        }

        write!(f, "{}", args.join(","))
    }
}

impl Display for DeleteLearnAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut args = vec![format!("table={}", self.table_id)];

        if self.priority != DEFAULT_PRIORITY {
            args.push(format!("priority={}", self.priority));
        }
        if self.flags.contains(FlowModFlags::SEND_FLOW_REM) {
            args.push("send_flow_rem".to_string());
        }
        if self.cookie != 0 {
            args.push(format!("cookie={:#x}", self.cookie));
        }
        args.extend(table_spec_arg(self.table_spec));
        args.extend(cookie_spec_arg(self.cookie_spec));
        args.extend(self.specs.iter().map(ToString::to_string));

        write!(f, "{}", args.join(","))
    }
}

impl Display for TimeoutAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.actions)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const KITCHEN_SINK: &str = "table=10,idle_timeout=60,priority=100,\
        send_flow_rem,cookie=0x1f,eth_type=0x800,NXM_OF_VLAN_TCI[0..11],\
        NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[](defer=3),\
        load:NXM_OF_IN_PORT[]->NXM_NX_REG0[0..15],load:0x5->NXM_NX_REG1[],\
        output:NXM_NX_REG2[0..15],actions={output:in_port,increment_cookie}";

    #[test]
    fn numbers() {
        assert_eq!(parse_num("0x1F"), Ok(31));
        assert_eq!(parse_num("42"), Ok(42));
        assert!(matches!(parse_num("0xzz"), Err(ParseErr::MalformedInt(_))));
        assert!(matches!(parse_num(""), Err(ParseErr::MalformedInt(_))));
    }

    #[test]
    fn tokenizer() {
        assert_eq!(
            split_top("a=1, b={c,d(e,f)},g[1..2]").unwrap(),
            vec!["a=1", "b={c,d(e,f)}", "g[1..2]"]
        );
        assert!(matches!(split_top("a={b"), Err(ParseErr::Unbalanced(_))));
        assert!(matches!(split_top("a=(b]"), Err(ParseErr::Unbalanced(_))));
    }

    #[test]
    fn parse_simple() {
        let learn: LearnAction = "table=5,NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[]"
            .parse()
            .unwrap();
        assert_eq!(learn.table_id, 5);
        assert_eq!(learn.priority, DEFAULT_PRIORITY);
        assert_eq!(
            learn.specs,
            vec![
                FieldSpec::copy_match(
                    Subfield::whole(Field::EthSrc),
                    Subfield::whole(Field::EthDst),
                )
                .unwrap()
            ]
        );
        assert_eq!(learn.to_string(), "table=5,NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[]");
    }

    #[test]
    fn defaults() {
        let learn: LearnAction = "".parse().unwrap();
        assert_eq!(learn, LearnAction::default());
        assert_eq!(learn.to_string(), "table=1");
    }

    #[test]
    fn canonical_form() {
        let learn: LearnAction = KITCHEN_SINK.parse().unwrap();
        assert_eq!(learn.idle_timeout, 60);
        assert_eq!(learn.flags, FlowModFlags::SEND_FLOW_REM);
        assert_eq!(learn.specs.len(), 6);
        assert_eq!(learn.specs[2].defer(), Deferral::Count(3));
        assert_eq!(learn.to_string(), KITCHEN_SINK);
    }

    #[test]
    fn key_order_is_canonicalized() {
        let learn: LearnAction =
            "NXM_NX_REG0[],cookie=0x2,priority=7,table=9,use_atomic_table=egress"
                .parse()
                .unwrap();
        assert_eq!(
            learn.to_string(),
            "table=9,priority=7,cookie=0x2,use_atomic_table=EGRESS,NXM_NX_REG0[]"
        );
    }

    #[test]
    fn field_value_notation() {
        let learn: LearnAction =
            "eth_src=aa:bb:cc:dd:ee:ff,nw_dst=10.0.0.1,NXM_NX_REG3[8..15]=0x7f"
                .parse()
                .unwrap();
        assert_eq!(
            learn.specs[0].src(),
            &SpecSrc::Immediate(0xaabb_ccdd_eeff)
        );
        assert_eq!(learn.specs[1].src(), &SpecSrc::Immediate(0x0a00_0001));
        assert_eq!(
            learn.to_string(),
            "table=1,eth_src=AA:BB:CC:DD:EE:FF,ip_dst=10.0.0.1,\
             NXM_NX_REG3[8..15]=0x7f"
        );
    }

    #[test]
    fn nested_round_trip() {
        let text = "table=2,actions={learn_learn(table=3,NXM_NX_REG0[],\
            actions={learn_delete(table=4,use_atomic_table=INGRESS,\
            ip_src=10.0.0.1)}),timeout_act(output:2,resubmit(,5))}";
        let learn: LearnAction = text.parse().unwrap();
        assert_eq!(learn.to_string(), text);

        let Action::Learn(inner) = &learn.actions[0] else {
            panic!("expected nested learn: {:?}", learn.actions[0]);
        };
        let Action::Delete(del) = &inner.actions[0] else {
            panic!("expected nested delete: {:?}", inner.actions[0]);
        };
        assert_eq!(del.table_spec, TableSpec::IngressAtomic);

        let bytes = learn.to_bytes().unwrap();
        assert_eq!(LearnAction::decode(&bytes, 0), Ok(learn));
    }

    #[test]
    fn errors() {
        assert!(matches!(
            "table=255".parse::<LearnAction>(),
            Err(ParseErr::BadTable(_))
        ));
        assert!(matches!(
            "NXM_OF_ETH_DST[]=NXM_OF_IP_SRC[]".parse::<LearnAction>(),
            Err(ParseErr::BadSpec(_, SpecError::WidthMismatch { .. }))
        ));
        assert!(matches!(
            "NXM_NX_REG0[0..7]=0x100".parse::<LearnAction>(),
            Err(ParseErr::ValTooWide(_, 8))
        ));
        assert!(matches!(
            "eth_type=0x800(defer=1)".parse::<LearnAction>(),
            Err(ParseErr::BadSpec(_, SpecError::BadDeferral))
        ));
        assert!(matches!(
            "NXM_NX_REG0[](defer=255)".parse::<LearnAction>(),
            Err(ParseErr::BadDeferral(_))
        ));
        assert!(matches!(
            "bogus=1".parse::<LearnAction>(),
            Err(ParseErr::UnknownField(_))
        ));
        assert!(matches!(
            "table=1,actions={output:1".parse::<LearnAction>(),
            Err(ParseErr::Unbalanced(_))
        ));
        assert!(matches!(
            "idle_timeout".parse::<LearnAction>(),
            Err(ParseErr::MissingValue(_))
        ));
        assert!(matches!(
            "NXM_NX_REG0[](defer=2)".parse::<DeleteLearnAction>(),
            Err(ParseErr::BadDeferral(_))
        ));
    }

    #[test]
    fn delete_grammar() {
        let text = "table=7,priority=9,cookie=0xff,use_atomic_cookie=1,\
            eth_type=0x800,NXM_OF_IP_DST[]=NXM_OF_IP_SRC[]";
        let del: DeleteLearnAction = text.parse().unwrap();
        assert_eq!(del.cookie_spec, CookieSpec::Atomic);
        assert_eq!(del.specs.len(), 2);
        assert_eq!(del.to_string(), text);
    }

    #[test]
    fn actions() {
        let cases = [
            ("output:3", Action::Output { port: 3, max_len: 0 }),
            (
                "output(port=flood,max_len=128)",
                Action::Output { port: OFPP_FLOOD, max_len: 128 },
            ),
            ("resubmit(,7)", Action::Resubmit { in_port: OFPP_IN_PORT, table: 7 }),
            ("resubmit(3,7)", Action::Resubmit { in_port: 3, table: 7 }),
            (
                "load:0xab->NXM_NX_REG2[4..11]",
                Action::RegLoad { dst: Subfield::new(Field::Reg2, 4, 8), value: 0xab },
            ),
            (
                "fin_timeout(hard_timeout=9)",
                Action::FinTimeout { idle_timeout: 0, hard_timeout: 9 },
            ),
            (
                "increment_table_id(INGRESS)",
                Action::IncrementTableId(CounterSelector::Ingress),
            ),
            ("increment_cookie", Action::IncrementCookie),
            (
                "opaque(001900080a0b0c0d)",
                Action::Opaque(vec![0, 0x19, 0, 8, 0xa, 0xb, 0xc, 0xd]),
            ),
        ];

        for (text, action) in cases {
            assert_eq!(text.parse::<Action>(), Ok(action.clone()), "{text}");
            assert_eq!(action.to_string(), text);
        }

        assert!(matches!("bogus".parse::<Action>(), Err(ParseErr::UnknownAction(_))));
        assert!(matches!(
            "load:0x100->NXM_NX_REG2[4..11]".parse::<Action>(),
            Err(ParseErr::ValTooWide(_, 8))
        ));
        assert!(matches!(
            "opaque(0019000c)".parse::<Action>(),
            Err(ParseErr::Other(_))
        ));
    }
}
