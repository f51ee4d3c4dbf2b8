//! Transiciones condicionales entre steps.
//!
//! Cada regla asocia (step origen, patrón de exit code) a un destino. Los
//! patrones admiten `*` (cualquier secuencia) y `?` (un carácter). Si varias
//! reglas coinciden gana la más específica: coincidencia exacta antes que
//! comodines y, entre comodines, la de patrón más largo. Sin reglas para el
//! step, COMPLETED avanza al siguiente step declarado, STOPPED detiene el job
//! y cualquier otro estado lo falla.

use crate::model::{BatchStatus, ExitStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    To(String),
    End,
    Fail,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: String,
    pub pattern: String,
    pub target: Transition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NextStep {
    Step(usize),
    End(ExitStatus),
    Fail(ExitStatus),
    Stop,
}

pub fn matches_pattern(pattern: &str, code: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = code.chars().collect();
    let (mut pi, mut ci) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ci));
            pi += 1;
        } else if let Some((sp, sc)) = star {
            pi = sp + 1;
            ci = sc + 1;
            star = Some((sp, sc + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|ch| *ch == '*')
}

fn specificity(pattern: &str, code: &str) -> (u8, usize) {
    if pattern == code {
        (2, pattern.len())
    } else {
        (1, pattern.chars().filter(|c| *c != '*').count())
    }
}

/// Decide el siguiente paso tras ejecutar `steps[index]`.
pub(crate) fn resolve(rules: &[TransitionRule],
                      steps: &[&str],
                      index: usize,
                      status: BatchStatus,
                      exit: &ExitStatus)
                      -> NextStep {
    let from = steps[index];
    let chosen = rules.iter()
                      .filter(|r| r.from == from && matches_pattern(&r.pattern, &exit.exit_code))
                      .max_by_key(|r| specificity(&r.pattern, &exit.exit_code));
    match chosen.map(|r| &r.target) {
        Some(Transition::To(name)) => match steps.iter().position(|s| s == name) {
            Some(i) => NextStep::Step(i),
            None => NextStep::Fail(ExitStatus::failed().with_description(format!("unknown step {name}"))),
        },
        Some(Transition::End) => NextStep::End(ExitStatus::completed()),
        Some(Transition::Fail) => NextStep::Fail(exit.clone()),
        Some(Transition::Stop) => NextStep::Stop,
        None => match status {
            BatchStatus::Completed if index + 1 < steps.len() => NextStep::Step(index + 1),
            BatchStatus::Completed => NextStep::End(exit.clone()),
            BatchStatus::Stopped => NextStep::Stop,
            _ => NextStep::Fail(exit.clone()),
        },
    }
}
