// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Deferred spec resolution.
//!
//! A deferred spec reads its source live for a number of executions,
//! then captures the value it sees and keeps it as an immediate from
//! then on. Every execution of the owning action ages its own specs
//! and those of learn actions nested within it, at any depth.

use super::action::Action;
use super::field::Flow;
use super::spec::DeferralStep;
use super::spec::FieldSpec;
use crate::ExecCtx;
use crate::LogLevel;

/// Age the deferral of each spec by one execution.
pub fn resolve_specs(specs: &mut [FieldSpec], flow: &Flow, ectx: &ExecCtx) {
    for spec in specs.iter_mut() {
        if let DeferralStep::Pinned(val) = spec.step_deferral(flow) {
            let dst = match spec.dst().subfield() {
                Some(sf) => format!("{sf}"),
                None => format!("{:?}", spec.dst_type()),
            };
            ectx.log.log(
                LogLevel::Note,
                &format!("learn: deferred spec for {dst} pinned to {val:#x}"),
            );
        }
    }
}

/// Age the deferred specs of every learn action in `actions`,
/// depth-first.
///
/// Only learn actions are visited. The specs of a delete action carry
/// no deferral, and a timeout action's list belongs to the rule it
/// expires with.
pub fn resolve_nested(actions: &mut [Action], flow: &Flow, ectx: &ExecCtx) {
    for action in actions.iter_mut() {
        if let Action::Learn(learn) = action {
            resolve_specs(&mut learn.specs, flow, ectx);
            resolve_nested(&mut learn.actions, flow, ectx);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::action::ActionList;
    use crate::engine::field::Field;
    use crate::engine::field::Subfield;
    use crate::engine::learn::LearnAction;
    use crate::engine::spec::Deferral;
    use crate::engine::spec::SpecSrc;
    use crate::engine::timeout::TimeoutAction;
    use crate::provider::LogProvider;
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<String>>>);

    impl LogProvider for Capture {
        fn log(&self, level: LogLevel, msg: &str) {
            self.0.lock().unwrap().push(format!("{level} {msg}"));
        }
    }

    fn deferred(n: u8) -> FieldSpec {
        FieldSpec::copy_match(
            Subfield::whole(Field::Reg0),
            Subfield::whole(Field::Reg1),
        )
        .unwrap()
        .with_defer(Deferral::Count(n))
        .unwrap()
    }

    #[test]
    fn pins_after_count() {
        let cap = Capture::default();
        let ectx = ExecCtx { log: Box::new(cap.clone()) };
        let mut specs = vec![deferred(1)];

        resolve_specs(&mut specs, &Flow::new().with(Field::Reg0, 5), &ectx);
        assert_eq!(specs[0].defer(), Deferral::Count(0));
        assert_eq!(specs[0].src(), &SpecSrc::Field(Subfield::whole(Field::Reg0)));
        assert!(cap.0.lock().unwrap().is_empty());

        resolve_specs(&mut specs, &Flow::new().with(Field::Reg0, 6), &ectx);
        assert_eq!(specs[0].defer(), Deferral::Never);
        assert_eq!(specs[0].src(), &SpecSrc::Immediate(6));
        assert_eq!(
            cap.0.lock().unwrap().as_slice(),
            &["[NOTE] learn: deferred spec for NXM_NX_REG1[] pinned to 0x6"]
        );

        // Pinned for good.
        resolve_specs(&mut specs, &Flow::new().with(Field::Reg0, 7), &ectx);
        assert_eq!(specs[0].src(), &SpecSrc::Immediate(6));
    }

    #[test]
    fn nested_learn_only() {
        let ectx = ExecCtx { log: Box::new(crate::NullLog) };
        let inner = LearnAction { specs: vec![deferred(0)], ..Default::default() };
        let mut actions = vec![
            Action::Learn(LearnAction {
                actions: ActionList::from(vec![Action::Learn(inner.clone())]),
                ..Default::default()
            }),
            Action::Timeout(TimeoutAction {
                actions: ActionList::from(vec![Action::Learn(inner.clone())]),
            }),
        ];

        resolve_nested(&mut actions, &Flow::new().with(Field::Reg0, 9), &ectx);

        let Action::Learn(outer) = &actions[0] else { panic!() };
        let Action::Learn(pinned) = &outer.actions[0] else { panic!() };
        assert_eq!(pinned.specs[0].src(), &SpecSrc::Immediate(9));

        let Action::Timeout(timeout) = &actions[1] else { panic!() };
        assert_eq!(timeout.actions[0], Action::Learn(inner));
    }
}
