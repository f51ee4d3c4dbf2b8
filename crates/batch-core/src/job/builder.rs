use std::collections::HashSet;

use super::{Job, JobParametersIncrementer, JobParametersValidator, Transition, TransitionRule};
use crate::errors::BatchError;
use crate::listener::SharedListener;
use crate::step::Step;

/// Builder de `Job`. `build` valida la definición completa y devuelve un job
/// inmutable.
pub struct JobBuilder<C> {
    name: String,
    steps: Vec<Box<dyn Step<C>>>,
    transitions: Vec<TransitionRule>,
    restartable: bool,
    listeners: Vec<SharedListener>,
    fail_on_listener_error: bool,
    validator: Option<Box<dyn JobParametersValidator>>,
    incrementer: Option<Box<dyn JobParametersIncrementer>>,
}

impl<C: 'static> JobBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               steps: Vec::new(),
               transitions: Vec::new(),
               restartable: true,
               listeners: Vec::new(),
               fail_on_listener_error: false,
               validator: None,
               incrementer: None }
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Regla `from --[pattern]--> target`.
    pub fn transition(mut self, from: &str, pattern: &str, target: Transition) -> Self {
        self.transitions.push(TransitionRule { from: from.to_string(),
                                               pattern: pattern.to_string(),
                                               target });
        self
    }

    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    pub fn listener(mut self, listener: SharedListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn fail_on_listener_error(mut self, strict: bool) -> Self {
        self.fail_on_listener_error = strict;
        self
    }

    pub fn validator(mut self, validator: impl JobParametersValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn incrementer(mut self, incrementer: impl JobParametersIncrementer + 'static) -> Self {
        self.incrementer = Some(Box::new(incrementer));
        self
    }

    pub fn build(self) -> Result<Job<C>, BatchError> {
        let invalid = |why: String| BatchError::Configuration(format!("job {}: {why}", self.name));
        if self.name.trim().is_empty() {
            return Err(BatchError::Configuration("job name must not be empty".into()));
        }
        if self.steps.is_empty() {
            return Err(invalid("at least one step is required".into()));
        }
        let mut names = HashSet::new();
        for step in &self.steps {
            if step.name().trim().is_empty() {
                return Err(invalid("step name must not be empty".into()));
            }
            if !names.insert(step.name()) {
                return Err(invalid(format!("duplicate step name {}", step.name())));
            }
        }
        for rule in &self.transitions {
            if !names.contains(rule.from.as_str()) {
                return Err(invalid(format!("transition from unknown step {}", rule.from)));
            }
            if let Transition::To(target) = &rule.target {
                if !names.contains(target.as_str()) {
                    return Err(invalid(format!("transition to unknown step {target}")));
                }
            }
        }
        Ok(Job { name: self.name,
                 steps: self.steps,
                 transitions: self.transitions,
                 restartable: self.restartable,
                 listeners: self.listeners,
                 fail_on_listener_error: self.fail_on_listener_error,
                 validator: self.validator,
                 incrementer: self.incrementer })
    }
}
