// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Install-time validation of learning actions.
//!
//! An action is checked against the flow of the rule it is installed
//! in: any packet reaching it satisfies that flow, so a source is only
//! readable if the flow meets its prerequisites. Destinations are
//! checked against the match being learned, as accumulated spec by
//! spec, since the learned rule must itself be valid.

use super::action::Action;
use super::field::Field;
use super::field::Flow;
use super::field::Match;
use super::field::Subfield;
use super::flow_mod::OFPP_IN_PORT;
use super::flow_mod::OFPP_MAX;
use super::flow_mod::OFPP_NONE;
use super::learn::INVALID_TABLE_ID;
use super::learn::LearnAction;
use super::learn_delete::DeleteLearnAction;
use super::spec::DstType;
use super::spec::FieldSpec;
use super::spec::SpecDst;
use super::spec::SpecSrc;
use super::timeout::TimeoutAction;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ValidationError {
    #[error("subfield {0} out of range")]
    SubfieldOutOfRange(Subfield),
    #[error("prerequisites of {0} not met")]
    Prerequisites(Field),
    #[error("{0} cannot be partially matched")]
    NotMaskable(Field),
    #[error("{0} cannot be loaded")]
    NotWritable(Field),
    #[error("invalid output port {0:#x}")]
    BadOutPort(u16),
    #[error("table id 255 is not valid for learning actions")]
    BadTableId,
    #[error("learn_delete does not support {0:?} destinations")]
    UnsupportedDeleteDestination(DstType),
}

pub type ValidationResult<T> = core::result::Result<T, ValidationError>;

fn check_range(sf: &Subfield) -> ValidationResult<()> {
    if !sf.in_range() {
        return Err(ValidationError::SubfieldOutOfRange(*sf));
    }
    Ok(())
}

fn check_src(sf: &Subfield, flow: &Flow) -> ValidationResult<()> {
    check_range(sf)?;
    if !flow.satisfies(sf.field.info().prereq) {
        return Err(ValidationError::Prerequisites(sf.field));
    }
    Ok(())
}

fn check_match_dst(sf: &Subfield, learned: &Match) -> ValidationResult<()> {
    check_range(sf)?;
    let info = sf.field.info();
    if !info.maskable && !sf.is_whole() {
        return Err(ValidationError::NotMaskable(sf.field));
    }
    if !learned.satisfies(info.prereq) {
        return Err(ValidationError::Prerequisites(sf.field));
    }
    Ok(())
}

fn check_load_dst(sf: &Subfield, learned: &Match) -> ValidationResult<()> {
    check_range(sf)?;
    let info = sf.field.info();
    if !info.writable {
        return Err(ValidationError::NotWritable(sf.field));
    }
    if !learned.satisfies(info.prereq) {
        return Err(ValidationError::Prerequisites(sf.field));
    }
    Ok(())
}

fn check_table(table_id: u8) -> ValidationResult<()> {
    if table_id == INVALID_TABLE_ID {
        return Err(ValidationError::BadTableId);
    }
    Ok(())
}

/// Check a spec list in order, returning the match it would learn
/// from a packet with fields `flow`.
///
/// Match specs are folded into the learned match as they pass, so a
/// later spec may rely on an earlier one for its prerequisites: an
/// `eth_type=0x800` spec makes a following `ip_dst` spec legal.
pub fn check_specs(specs: &[FieldSpec], flow: &Flow) -> ValidationResult<Match> {
    let mut learned = Match::catchall();

    for spec in specs {
        if let SpecSrc::Field(sf) = spec.src() {
            check_src(sf, flow)?;
        }

        match spec.dst() {
            SpecDst::Match(dst) => {
                check_match_dst(dst, &learned)?;
                learned.set_subfield(dst, spec.value(flow));
            }
            SpecDst::Load(dst) => check_load_dst(dst, &learned)?,
            SpecDst::Output | SpecDst::Reserved => (),
        }
    }

    Ok(learned)
}

/// Check the actions a learned rule would carry.
pub fn check_actions(actions: &[Action], flow: &Flow) -> ValidationResult<()> {
    for action in actions {
        match action {
            Action::Output { port, .. } => {
                if *port == OFPP_NONE || (OFPP_MAX..OFPP_IN_PORT).contains(port) {
                    return Err(ValidationError::BadOutPort(*port));
                }
            }
            Action::RegLoad { dst, .. } => {
                check_range(dst)?;
                if !dst.field.info().writable {
                    return Err(ValidationError::NotWritable(dst.field));
                }
            }
            Action::Learn(learn) => learn.check(flow)?,
            Action::Delete(delete) => delete.check(flow)?,
            Action::Timeout(timeout) => timeout.check(flow)?,
            Action::Resubmit { .. }
            | Action::FinTimeout { .. }
            | Action::IncrementTableId(_)
            | Action::IncrementCookie
            | Action::Opaque(_) => (),
        }
    }
    Ok(())
}

impl LearnAction {
    /// Check this action for installation in a rule matching `flow`.
    pub fn check(&self, flow: &Flow) -> ValidationResult<()> {
        check_table(self.table_id)?;
        check_specs(&self.specs, flow)?;
        check_actions(&self.actions, flow)
    }
}

impl DeleteLearnAction {
    pub fn check(&self, flow: &Flow) -> ValidationResult<()> {
        check_table(self.table_id)?;
        if let Some(spec) =
            self.specs.iter().find(|s| s.dst_type() != DstType::Match)
        {
            return Err(ValidationError::UnsupportedDeleteDestination(
                spec.dst_type(),
            ));
        }
        check_specs(&self.specs, flow)?;
        Ok(())
    }
}

impl TimeoutAction {
    pub fn check(&self, flow: &Flow) -> ValidationResult<()> {
        check_actions(&self.actions, flow)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::action::ActionList;
    use crate::engine::field::ETHERTYPE_IPV4;
    use crate::engine::field::IP_PROTO_TCP;

    fn whole(field: Field) -> Subfield {
        Subfield::whole(field)
    }

    #[test]
    fn source_prerequisites() {
        let spec =
            FieldSpec::copy_match(whole(Field::IpSrc), whole(Field::Reg0)).unwrap();
        assert_eq!(
            check_specs(&[spec], &Flow::new()),
            Err(ValidationError::Prerequisites(Field::IpSrc))
        );

        let ip = Flow::new().with(Field::EthType, ETHERTYPE_IPV4);
        assert!(check_specs(&[spec], &ip).is_ok());
    }

    #[test]
    fn match_destination_prerequisites() {
        let flow = Flow::new()
            .with(Field::EthType, ETHERTYPE_IPV4)
            .with(Field::IpProto, IP_PROTO_TCP);
        let dst =
            FieldSpec::copy_match(whole(Field::TcpSrc), whole(Field::TcpDst)).unwrap();

        // The learned match says nothing about the protocol yet.
        assert_eq!(
            check_specs(&[dst], &flow),
            Err(ValidationError::Prerequisites(Field::TcpDst))
        );

        let specs = [
            FieldSpec::imm_match(ETHERTYPE_IPV4, whole(Field::EthType)).unwrap(),
            FieldSpec::imm_match(IP_PROTO_TCP, whole(Field::IpProto)).unwrap(),
            dst,
        ];
        let learned = check_specs(&specs, &flow.clone().with(Field::TcpSrc, 80))
            .unwrap();
        assert_eq!(learned.get(Field::TcpDst), (80, 0xffff));
    }

    #[test]
    fn partial_match_of_unmaskable() {
        let spec = FieldSpec::imm_match(1, Subfield::new(Field::InPort, 0, 8)).unwrap();
        assert_eq!(
            check_specs(&[spec], &Flow::new()),
            Err(ValidationError::NotMaskable(Field::InPort))
        );

        let spec = FieldSpec::imm_match(1, Subfield::new(Field::Reg2, 4, 8)).unwrap();
        assert!(check_specs(&[spec], &Flow::new()).is_ok());
    }

    #[test]
    fn load_of_read_only() {
        let spec = FieldSpec::imm_load(0x800, whole(Field::EthType)).unwrap();
        assert_eq!(
            check_specs(&[spec], &Flow::new()),
            Err(ValidationError::NotWritable(Field::EthType))
        );
    }

    #[test]
    fn out_of_range() {
        let sf = Subfield::new(Field::Reg0, 24, 16);
        let spec = FieldSpec::imm_match(1, sf).unwrap();
        assert_eq!(
            check_specs(&[spec], &Flow::new()),
            Err(ValidationError::SubfieldOutOfRange(sf))
        );
    }

    #[test]
    fn nested_actions() {
        let mut learn = LearnAction {
            actions: ActionList::from(vec![Action::Output { port: 0xff10, max_len: 0 }]),
            ..Default::default()
        };
        assert_eq!(
            learn.check(&Flow::new()),
            Err(ValidationError::BadOutPort(0xff10))
        );

        learn.actions = ActionList::from(vec![Action::Output {
            port: OFPP_IN_PORT,
            max_len: 0,
        }]);
        assert!(learn.check(&Flow::new()).is_ok());

        learn.actions = ActionList::from(vec![Action::Timeout(TimeoutAction {
            actions: ActionList::from(vec![Action::RegLoad {
                dst: whole(Field::IpProto),
                value: 6,
            }]),
        })]);
        assert_eq!(
            learn.check(&Flow::new()),
            Err(ValidationError::NotWritable(Field::IpProto))
        );
    }

    #[test]
    fn delete_destinations() {
        let del = DeleteLearnAction {
            specs: vec![FieldSpec::output(Subfield::new(Field::Reg0, 0, 16)).unwrap()],
            ..Default::default()
        };
        assert_eq!(
            del.check(&Flow::new()),
            Err(ValidationError::UnsupportedDeleteDestination(DstType::Output))
        );
    }

    #[test]
    fn table_255() {
        let learn = LearnAction { table_id: 255, ..Default::default() };
        assert_eq!(learn.check(&Flow::new()), Err(ValidationError::BadTableId));
    }
}
