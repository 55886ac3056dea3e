//! History invariants checked at the end of every run.

use crate::core::types::{Phase, Step};

/// Check history invariants:
/// - Step numbers are exactly `1..=N`
/// - A CLOSE step only ever appears last
/// - A trailing CLOSE step implies `Finished`
/// - Executed step numbers exist, are strictly increasing and never CLOSE
pub fn validate_history(phase: Phase, steps: &[Step], executed: &[u32]) -> Vec<String> {
    let mut errors = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let expected = index as u32 + 1;
        if step.step_number != expected {
            errors.push(format!(
                "step at position {} has number {} (expected {})",
                index, step.step_number, expected
            ));
        }
        if step.is_close() && index + 1 != steps.len() {
            errors.push(format!("CLOSE step {} is not last", step.step_number));
        }
    }

    if steps.last().is_some_and(Step::is_close) && phase != Phase::Finished {
        errors.push(format!("history ends with CLOSE but phase is {phase:?}"));
    }

    if !executed.windows(2).all(|pair| pair[0] < pair[1]) {
        errors.push("executed steps are out of order".to_string());
    }
    for number in executed {
        match steps.iter().find(|step| step.step_number == *number) {
            None => errors.push(format!("executed step {number} is not in history")),
            Some(step) if step.is_close() => {
                errors.push(format!("CLOSE step {number} was executed"));
            }
            Some(_) => {}
        }
    }

    errors
}
