// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests and benchmarks.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;

// Let's make our lives easier and pub use a bunch of stuff.
pub use flowlearn::ExecCtx;
pub use flowlearn::LogLevel;
pub use flowlearn::LogProvider;
pub use flowlearn::NullLog;
pub use flowlearn::api::CounterSelector;
pub use flowlearn::api::Ipv4Addr;
pub use flowlearn::api::MacAddr;
pub use flowlearn::engine::Action;
pub use flowlearn::engine::ActionList;
pub use flowlearn::engine::AtomicCounters;
pub use flowlearn::engine::DecodeError;
pub use flowlearn::engine::DeleteLearnAction;
pub use flowlearn::engine::EncodeError;
pub use flowlearn::engine::Field;
pub use flowlearn::engine::FieldSpec;
pub use flowlearn::engine::Flow;
pub use flowlearn::engine::Match;
pub use flowlearn::engine::FlowMod;
pub use flowlearn::engine::LearnAction;
pub use flowlearn::engine::PacketCtx;
pub use flowlearn::engine::ParseErr;
pub use flowlearn::engine::Subfield;
pub use flowlearn::engine::TimeoutAction;
pub use flowlearn::engine::ValidationError;
pub use flowlearn::engine::counter::TableZone;
pub use flowlearn::engine::counter::counter_for_table;
pub use flowlearn::engine::field::ETHERTYPE_IPV4;
pub use flowlearn::engine::field::IP_PROTO_TCP;
pub use flowlearn::engine::field::IP_PROTO_UDP;
pub use flowlearn::engine::field::Wildcards;
pub use flowlearn::engine::flow_mod::OFPP_FLOOD;
pub use flowlearn::engine::flow_mod::OFPP_IN_PORT;
pub use flowlearn::engine::flow_mod::OFPP_MAX;
pub use flowlearn::engine::flow_mod::CookieSpec;
pub use flowlearn::engine::flow_mod::FlowModCommand;
pub use flowlearn::engine::flow_mod::TableSpec;
pub use flowlearn::engine::spec::Deferral;
pub use flowlearn::engine::spec::DstType;
pub use flowlearn::engine::spec::SpecDst;
pub use flowlearn::engine::spec::SpecSrc;
pub use flowlearn::engine::wire::DecodeErrorKind;
pub use flowlearn::engine::wire::from_hex;
pub use flowlearn::engine::wire::to_hex;

pub const GUEST_MAC: MacAddr = MacAddr::from_const([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
pub const GW_MAC: MacAddr = MacAddr::from_const([0xa8, 0x40, 0x25, 0xff, 0x77, 0x77]);
pub const GUEST_IP: &str = "10.0.0.5";
pub const REMOTE_IP: &str = "192.168.1.10";

/// A log provider which keeps every message, for assertions.
#[derive(Clone, Default)]
pub struct CaptureLog {
    msgs: Arc<Mutex<Vec<String>>>,
}

impl CaptureLog {
    pub fn messages(&self) -> Vec<String> {
        self.msgs.lock().unwrap().clone()
    }
}

impl LogProvider for CaptureLog {
    fn log(&self, level: LogLevel, msg: &str) {
        self.msgs.lock().unwrap().push(format!("{level} {msg}"));
    }
}

/// An execution context that drops all logging.
pub fn ectx() -> ExecCtx {
    ExecCtx { log: Box::new(NullLog) }
}

/// An execution context whose log can be inspected afterward.
pub fn capture_ectx() -> (ExecCtx, CaptureLog) {
    let log = CaptureLog::default();
    (ExecCtx { log: Box::new(log.clone()) }, log)
}

/// The flow value of a dotted-quad IPv4 address.
pub fn ip(s: &str) -> u128 {
    u128::from(u32::from(s.parse::<Ipv4Addr>().unwrap()))
}

/// The flow value of a MAC address.
pub fn mac(m: MacAddr) -> u128 {
    u128::from(u64::from(m))
}

/// A plain Ethernet frame from the guest.
pub fn eth_flow() -> Flow {
    Flow::new()
        .with(Field::InPort, 1)
        .with(Field::EthSrc, mac(GUEST_MAC))
        .with(Field::EthDst, mac(GW_MAC))
        .with(Field::EthType, 0x86dd)
}

/// A TCP segment from the guest to a remote host.
pub fn tcp_flow() -> Flow {
    Flow::new()
        .with(Field::InPort, 1)
        .with(Field::EthSrc, mac(GUEST_MAC))
        .with(Field::EthDst, mac(GW_MAC))
        .with(Field::EthType, ETHERTYPE_IPV4)
        .with(Field::IpProto, IP_PROTO_TCP)
        .with(Field::IpSrc, ip(GUEST_IP))
        .with(Field::IpDst, ip(REMOTE_IP))
        .with(Field::IpTtl, 64)
        .with(Field::TcpSrc, 44490)
        .with(Field::TcpDst, 443)
}

/// A UDP datagram from the guest to a remote host.
pub fn udp_flow() -> Flow {
    Flow::new()
        .with(Field::InPort, 1)
        .with(Field::EthSrc, mac(GUEST_MAC))
        .with(Field::EthDst, mac(GW_MAC))
        .with(Field::EthType, ETHERTYPE_IPV4)
        .with(Field::IpProto, IP_PROTO_UDP)
        .with(Field::IpSrc, ip(GUEST_IP))
        .with(Field::IpDst, ip(REMOTE_IP))
        .with(Field::UdpSrc, 5353)
        .with(Field::UdpDst, 53)
}

/// The classic MAC learning action: remember which port a source
/// address was seen on.
pub fn mac_learning() -> LearnAction {
    "table=10,idle_timeout=300,priority=100,\
     NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[],\
     load:NXM_OF_IN_PORT[]->NXM_NX_REG0[0..15]"
        .parse()
        .unwrap()
}

/// Learn the reverse direction of a TCP connection, with the remote
/// port pinned after a few packets.
pub fn tcp_reverse() -> LearnAction {
    "table=20,idle_timeout=60,fin_idle_timeout=5,use_atomic_cookie=1,\
     eth_type=0x800,ip_proto=6,\
     NXM_OF_IP_DST[]=NXM_OF_IP_SRC[],NXM_OF_IP_SRC[]=NXM_OF_IP_DST[],\
     NXM_OF_TCP_DST[]=NXM_OF_TCP_SRC[](defer=2),\
     output:NXM_OF_IN_PORT[],\
     actions={increment_cookie}"
        .parse()
        .unwrap()
}

/// A learn action nesting another learn, a delete, and a timeout
/// action.
pub fn nested_learn() -> LearnAction {
    "table=30,NXM_OF_ETH_SRC[],\
     actions={learn_learn(use_atomic_table=INGRESS,NXM_NX_REG1[]=NXM_NX_REG0[](defer=1),\
     actions={output:flood}),\
     learn_delete(table=31,NXM_OF_ETH_DST[]=NXM_OF_ETH_SRC[]),\
     timeout_act(increment_table_id(INGRESS),resubmit(,40))}"
        .parse()
        .unwrap()
}
