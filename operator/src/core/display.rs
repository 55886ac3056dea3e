//! Projection of loop state into user-facing status.

use crate::core::types::{DisplayState, Phase, Step, Tool};
use crate::error::Failure;

/// Map loop state to a display state.
///
/// Rules are checked in order; the first match wins.
pub fn project(phase: Phase, steps: &[Step], session_active: bool) -> DisplayState {
    if phase == Phase::Finished {
        return DisplayState::Success;
    }
    if phase == Phase::Failed {
        return DisplayState::Error;
    }
    if phase == Phase::Initializing
        || (steps.is_empty() && request_in_flight(phase, session_active))
    {
        return DisplayState::Loading;
    }
    if phase == Phase::Idle {
        return DisplayState::Idle;
    }
    match steps.last() {
        None => DisplayState::Thinking,
        Some(step) => tool_display(step.tool),
    }
}

fn request_in_flight(phase: Phase, session_active: bool) -> bool {
    session_active && matches!(phase, Phase::Planning | Phase::Executing)
}

fn tool_display(tool: Tool) -> DisplayState {
    match tool {
        Tool::Goto | Tool::Observe | Tool::Navback => DisplayState::Browsing,
        Tool::Act => DisplayState::Acting,
        Tool::Extract | Tool::Wait => DisplayState::Thinking,
        Tool::Close => DisplayState::Success,
    }
}

/// One-line message shown next to the display state.
pub fn status_line(phase: Phase, steps: &[Step], failure: Option<&Failure>) -> String {
    match phase {
        Phase::Finished => return "Task completed successfully!".to_string(),
        Phase::Failed => {
            let reason = failure.map_or("unknown error", |f| f.message.as_str());
            return format!("Task failed: {reason}");
        }
        Phase::Initializing => return "Processing your request...".to_string(),
        Phase::Idle | Phase::Planning | Phase::Executing => {}
    }
    match steps.last() {
        None if phase == Phase::Planning => "Processing your request...".to_string(),
        None => "Analyzing your goal...".to_string(),
        Some(step) => step.display_text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::step;

    #[test]
    fn finished_wins_over_everything() {
        let steps = vec![step(1, Tool::Act)];
        assert_eq!(project(Phase::Finished, &steps, true), DisplayState::Success);
        assert_eq!(project(Phase::Finished, &[], false), DisplayState::Success);
    }

    #[test]
    fn failed_is_error_and_keeps_last_step_visible_in_status() {
        let steps = vec![step(1, Tool::Goto)];
        assert_eq!(project(Phase::Failed, &steps, false), DisplayState::Error);
        let failure = Failure {
            kind: ErrorKind::ExecutionFailed,
            message: "boom".to_string(),
        };
        assert_eq!(
            status_line(Phase::Failed, &steps, Some(&failure)),
            "Task failed: boom"
        );
    }

    #[test]
    fn loading_while_initializing_or_first_plan_in_flight() {
        assert_eq!(project(Phase::Initializing, &[], false), DisplayState::Loading);
        assert_eq!(project(Phase::Planning, &[], true), DisplayState::Loading);
    }

    #[test]
    fn idle_and_empty_without_session() {
        assert_eq!(project(Phase::Idle, &[], false), DisplayState::Idle);
        assert_eq!(project(Phase::Planning, &[], false), DisplayState::Thinking);
    }

    #[test]
    fn last_tool_drives_display() {
        let cases = [
            (Tool::Goto, DisplayState::Browsing),
            (Tool::Observe, DisplayState::Browsing),
            (Tool::Navback, DisplayState::Browsing),
            (Tool::Act, DisplayState::Acting),
            (Tool::Extract, DisplayState::Thinking),
            (Tool::Wait, DisplayState::Thinking),
            (Tool::Close, DisplayState::Success),
        ];
        for (tool, expected) in cases {
            let steps = vec![step(1, Tool::Goto), step(2, tool)];
            assert_eq!(project(Phase::Executing, &steps, true), expected, "{tool}");
        }
    }

    #[test]
    fn projection_is_deterministic() {
        let steps = vec![step(1, Tool::Observe)];
        let first = project(Phase::Planning, &steps, true);
        for _ in 0..10 {
            assert_eq!(project(Phase::Planning, &steps, true), first);
        }
    }

    #[test]
    fn status_uses_last_step_text() {
        let steps = vec![step(1, Tool::Goto)];
        assert_eq!(
            status_line(Phase::Executing, &steps, None),
            steps[0].display_text
        );
        assert_eq!(status_line(Phase::Idle, &[], None), "Analyzing your goal...");
        assert_eq!(
            status_line(Phase::Finished, &steps, None),
            "Task completed successfully!"
        );
    }
}
