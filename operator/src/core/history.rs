//! Append-only step history.

use serde::Serialize;

use crate::core::types::{PlannedStep, Step};

/// Returned when appending after a CLOSE step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("history is closed at step {closed_at}")]
pub struct HistoryClosed {
    pub closed_at: u32,
}

/// Ordered, append-only sequence of steps.
///
/// Numbers are assigned here (`len + 1`) so every producer gets the same
/// strictly increasing sequence. A CLOSE step seals the history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct History {
    steps: Vec<Step>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number and append a planned step, returning the stored entry.
    pub fn append(&mut self, planned: PlannedStep) -> Result<&Step, HistoryClosed> {
        if let Some(last) = self.steps.last().filter(|step| step.is_close()) {
            return Err(HistoryClosed {
                closed_at: last.step_number,
            });
        }
        let number = self.next_step_number();
        self.steps.push(Step::numbered(number, planned));
        Ok(&self.steps[self.steps.len() - 1])
    }

    pub fn next_step_number(&self) -> u32 {
        self.steps.len() as u32 + 1
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True once a CLOSE step has been appended.
    pub fn is_closed(&self) -> bool {
        self.last().is_some_and(Step::is_close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Tool;
    use crate::test_support::planned;

    #[test]
    fn append_numbers_from_one() {
        let mut history = History::new();
        assert_eq!(history.next_step_number(), 1);
        let first = history.append(planned(Tool::Goto)).expect("append").step_number;
        let second = history.append(planned(Tool::Act)).expect("append").step_number;
        assert_eq!((first, second), (1, 2));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn close_step_seals_history() {
        let mut history = History::new();
        history.append(planned(Tool::Goto)).expect("append");
        history.append(planned(Tool::Close)).expect("append");
        assert!(history.is_closed());

        let err = history.append(planned(Tool::Act)).unwrap_err();
        assert_eq!(err, HistoryClosed { closed_at: 2 });
        assert_eq!(history.len(), 2);
    }
}
