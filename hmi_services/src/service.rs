//! Run-to-completion driver binding a concrete service to its state machine.
//!
//! A [`Serviceable`] supplies readiness rules and entry/exit actions. The
//! [`Service`] wrapper owns the machine, dispatches actions for every
//! transition and keeps stepping until the state is stable. Flag changes
//! and faults requested by actions are queued in a [`ServiceContext`] and
//! applied once the running action returns, so actions never re-enter the
//! machine.

use tracing::error;

use crate::error::ServiceError;
use crate::machine::{ServiceStateMachine, Transition, TransitionResult};
use crate::observer::{LogObserver, ServiceObserver};
use crate::state::{ServiceState, StateKey, Trigger};
use crate::status::{ReadinessFlags, Statuses};

/// Upper bound on transitions performed for one external input.
pub const MAX_SETTLE_STEPS: usize = 64;

/// Configuration handle passed to [`Serviceable::configure`].
pub struct ServiceRules<'a> {
    machine: &'a mut ServiceStateMachine,
}

impl ServiceRules<'_> {
    /// Register the readiness rule of `key`.
    ///
    /// # Errors
    ///
    /// See [`ServiceStateMachine::configure`].
    pub fn configure(&mut self, key: StateKey, statuses: Statuses) -> Result<(), ServiceError> {
        self.machine.configure(key, statuses)
    }

    /// Give a flag its initial value.
    pub fn initial_flag(&mut self, name: &str, value: bool) {
        self.machine.set_flag(name, value);
    }
}

/// Requests queued by an action for the running service.
#[derive(Debug, Default)]
pub struct ServiceContext {
    flags: Vec<(String, bool)>,
    fault: Option<String>,
}

impl ServiceContext {
    /// Set a readiness flag once the action returns.
    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.flags.push((name.into(), value));
    }

    /// Report a fault once the action returns. The last reason wins.
    pub fn report_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }
}

/// A concrete service: readiness rules plus entry/exit actions.
pub trait Serviceable {
    /// Register readiness rules. Called once by [`Service::new`].
    fn configure(&self, rules: &mut ServiceRules<'_>) -> Result<(), ServiceError>;

    /// Runs before `transition.from` is left.
    fn on_exit(&mut self, _transition: &Transition, _ctx: &mut ServiceContext) {}

    /// Runs after `transition.to` is entered.
    fn on_enter(&mut self, _transition: &Transition, _ctx: &mut ServiceContext) {}
}

/// A [`Serviceable`] driven by its own [`ServiceStateMachine`].
pub struct Service<S> {
    name: String,
    machine: ServiceStateMachine,
    inner: S,
    observers: Vec<Box<dyn ServiceObserver>>,
    last_fault: Option<String>,
}

impl<S: Serviceable> Service<S> {
    /// Configure `inner` and wrap it. A [`LogObserver`] is attached.
    ///
    /// # Errors
    ///
    /// Any error returned by `inner.configure()`.
    pub fn new(name: impl Into<String>, inner: S) -> Result<Self, ServiceError> {
        let mut machine = ServiceStateMachine::new();
        inner.configure(&mut ServiceRules {
            machine: &mut machine,
        })?;

        Ok(Self {
            name: name.into(),
            machine,
            inner,
            observers: vec![Box::new(LogObserver)],
            last_fault: None,
        })
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state snapshot.
    pub fn current_state(&self) -> ServiceState {
        self.machine.current_state()
    }

    /// Flag values.
    pub fn flags(&self) -> &ReadinessFlags {
        self.machine.flags()
    }

    /// Reason given with the most recent fault.
    pub fn last_fault(&self) -> Option<&str> {
        self.last_fault.as_deref()
    }

    /// The wrapped service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The wrapped service, mutably. Use [`update`](Self::update) when the
    /// call may change flags or report a fault.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Attach an observer after the existing ones.
    pub fn add_observer(&mut self, observer: impl ServiceObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// `start()` trigger.
    pub fn start(&mut self) -> TransitionResult {
        self.fire(Trigger::Start)
    }

    /// `stop()` trigger.
    pub fn stop(&mut self) -> TransitionResult {
        self.fire(Trigger::Stop)
    }

    /// `report_fault()` trigger. Accepted in every state.
    pub fn report_fault(&mut self, reason: impl Into<String>) -> TransitionResult {
        self.record_fault(reason.into());
        self.fire(Trigger::Fault)
    }

    /// `request_repair()` trigger.
    pub fn request_repair(&mut self) -> TransitionResult {
        self.fire(Trigger::Repair)
    }

    /// `evacuate()` trigger.
    pub fn evacuate(&mut self) -> TransitionResult {
        self.fire(Trigger::Evacuate)
    }

    /// Update one flag and settle.
    pub fn set_flag(&mut self, name: &str, value: bool) {
        if self.machine.set_flag(name, value) {
            self.settle(None);
        }
    }

    /// Run `f` against the wrapped service, then apply what it queued.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut S, &mut ServiceContext) -> R) -> R {
        let mut ctx = ServiceContext::default();
        let out = f(&mut self.inner, &mut ctx);
        let next = self.apply(ctx);
        self.settle(next);
        out
    }

    fn fire(&mut self, trigger: Trigger) -> TransitionResult {
        let result = self.machine.handle(trigger);
        match result {
            TransitionResult::Ok(transition) => self.settle(Some(transition)),
            TransitionResult::Ignored(reason) => {
                let state = self.machine.current_state();
                for observer in &mut self.observers {
                    observer.on_ignored(&self.name, state, trigger, reason);
                }
            }
        }
        result
    }

    /// Dispatch `first` (if any), then step until stable.
    ///
    /// Every transition the machine entered has its actions run. Once
    /// [`MAX_SETTLE_STEPS`] were dispatched, queued flags are still applied
    /// but neither the rules nor a queued fault move the machine again.
    fn settle(&mut self, first: Option<Transition>) {
        let mut next = first.or_else(|| self.machine.evaluate());
        let mut steps = 0;

        while let Some(transition) = next.take() {
            steps += 1;

            let mut ctx = ServiceContext::default();
            self.inner.on_exit(&transition, &mut ctx);
            for observer in &mut self.observers {
                observer.on_transition(&self.name, &transition);
            }
            self.inner.on_enter(&transition, &mut ctx);

            if steps >= MAX_SETTLE_STEPS {
                self.apply_flags(&ctx);
                if let Some(reason) = ctx.fault {
                    self.record_fault(reason);
                }
                error!(
                    service = %self.name,
                    state = %self.machine.current_state(),
                    "Readiness rules did not settle after {} transitions",
                    MAX_SETTLE_STEPS
                );
                return;
            }

            next = self.apply(ctx).or_else(|| self.machine.evaluate());
        }
    }

    fn apply_flags(&mut self, ctx: &ServiceContext) {
        for (name, value) in &ctx.flags {
            self.machine.set_flag(name, *value);
        }
    }

    /// Apply queued flags; a queued fault yields the `Broken` transition.
    fn apply(&mut self, ctx: ServiceContext) -> Option<Transition> {
        self.apply_flags(&ctx);
        let reason = ctx.fault?;
        self.record_fault(reason);
        match self.machine.handle(Trigger::Fault) {
            TransitionResult::Ok(transition) => Some(transition),
            TransitionResult::Ignored(_) => None,
        }
    }

    fn record_fault(&mut self, reason: String) {
        for observer in &mut self.observers {
            observer.on_fault(&self.name, &reason);
        }
        self.last_fault = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Activity;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Link {
        journal: Vec<String>,
        fail_on_start: bool,
    }

    impl Serviceable for Link {
        fn configure(&self, rules: &mut ServiceRules<'_>) -> Result<(), ServiceError> {
            rules.configure(StateKey::Starting, Statuses::all(["connected"]))?;
            rules.configure(StateKey::Stopping, Statuses::all(["disconnected"]))?;
            rules.initial_flag("disconnected", true);
            Ok(())
        }

        fn on_exit(&mut self, t: &Transition, _ctx: &mut ServiceContext) {
            self.journal.push(format!("exit {}", t.from));
        }

        fn on_enter(&mut self, t: &Transition, ctx: &mut ServiceContext) {
            self.journal.push(format!("enter {}", t.to));
            match t.to {
                ServiceState::Starting if self.fail_on_start => ctx.report_fault("no route"),
                ServiceState::Starting => {
                    ctx.set_flag("disconnected", false);
                    ctx.set_flag("connected", true);
                }
                ServiceState::Stopping => {
                    ctx.set_flag("connected", false);
                    ctx.set_flag("disconnected", true);
                }
                _ => {}
            }
        }
    }

    type Seen = Rc<RefCell<Vec<String>>>;

    struct Recorder(Seen);

    impl ServiceObserver for Recorder {
        fn on_transition(&mut self, _service: &str, t: &Transition) {
            self.0.borrow_mut().push(format!("{}->{}", t.from, t.to));
        }

        fn on_ignored(&mut self, _s: &str, _st: ServiceState, trigger: Trigger, _r: &'static str) {
            self.0.borrow_mut().push(format!("ignored {trigger}"));
        }
    }

    #[test]
    fn actions_drive_start_and_stop() {
        let mut service = Service::new("link", Link::default()).unwrap();
        let seen = Seen::default();
        service.add_observer(Recorder(Rc::clone(&seen)));

        assert!(service.start().is_ok());
        assert_eq!(service.current_state(), ServiceState::Started(Activity::Active));

        assert!(service.stop().is_ok());
        assert_eq!(service.current_state(), ServiceState::Stopped);

        assert_eq!(
            *seen.borrow(),
            vec![
                "Stopped->Starting",
                "Starting->Started.Active",
                "Started.Active->Stopping",
                "Stopping->Stopped",
            ]
        );
        assert_eq!(
            service.inner().journal[..4],
            ["exit Stopped", "enter Starting", "exit Starting", "enter Started.Active"]
        );
    }

    #[test]
    fn fault_queued_by_action() {
        let mut service = Service::new(
            "link",
            Link {
                fail_on_start: true,
                ..Default::default()
            },
        )
        .unwrap();

        service.start();
        assert_eq!(service.current_state(), ServiceState::Broken);
        assert_eq!(service.last_fault(), Some("no route"));
    }

    #[test]
    fn ignored_trigger_is_observed() {
        let mut service = Service::new("link", Link::default()).unwrap();
        let seen = Seen::default();
        service.add_observer(Recorder(Rc::clone(&seen)));

        assert!(matches!(service.stop(), TransitionResult::Ignored(_)));
        assert_eq!(*seen.borrow(), vec!["ignored stop"]);
    }

    #[test]
    fn update_applies_flags() {
        let mut service = Service::new("link", Link::default()).unwrap();
        service.start();
        service.update(|_, ctx| ctx.report_fault("lost"));
        assert_eq!(service.current_state(), ServiceState::Broken);

        service.inner_mut().fail_on_start = false;
        assert!(service.request_repair().is_ok());
        assert!(service.current_state().is_started());
    }

    #[derive(Default)]
    struct Flapping {
        entered: Vec<ServiceState>,
    }

    impl Serviceable for Flapping {
        fn configure(&self, rules: &mut ServiceRules<'_>) -> Result<(), ServiceError> {
            rules.configure(StateKey::Idling, Statuses::all(["idle"]))
        }

        fn on_enter(&mut self, t: &Transition, ctx: &mut ServiceContext) {
            self.entered.push(t.to);
            match t.to {
                ServiceState::Started(Activity::Idling) => ctx.set_flag("idle", false),
                ServiceState::Started(Activity::Active) => ctx.set_flag("idle", true),
                _ => {}
            }
        }
    }

    #[test]
    fn oscillating_rules_are_bounded() {
        let mut service = Service::new("flap", Flapping::default()).unwrap();
        service.start();
        assert!(service.current_state().is_started());

        let entered = &service.inner().entered;
        assert_eq!(entered.len(), MAX_SETTLE_STEPS);
        assert_eq!(entered.last(), Some(&service.current_state()));
    }

    #[test]
    fn bounded_settle_resumes_on_next_input() {
        let mut service = Service::new("flap", Flapping::default()).unwrap();
        service.start();

        service.update(|_, _| ());
        let entered = &service.inner().entered;
        assert_eq!(entered.len(), 2 * MAX_SETTLE_STEPS);
        assert_eq!(entered.last(), Some(&service.current_state()));
    }
}
