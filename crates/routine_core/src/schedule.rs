//! Overlap validation for proposed task windows.

use crate::clock::{self, Interval};
use crate::error::AppError;
use crate::model::{Task, TaskSummary};
use time::{Date, UtcOffset};

/// A proposed time window as the request layer hands it over.
#[derive(Debug, Clone, Copy)]
pub struct IntervalRequest<'a> {
    pub date: Date,
    pub start: &'a str,
    pub end: &'a str,
    pub offset: UtcOffset,
    /// Set when editing: the task being edited never conflicts with itself.
    pub exclude_task_id: Option<&'a str>,
}

/// Parses and anchors the requested window without looking at any task.
///
/// Format errors win over range errors.
pub fn parse_interval(request: &IntervalRequest<'_>) -> Result<Interval, AppError> {
    let start = clock::parse_clock_time(request.start)?;
    let end = clock::parse_clock_time(request.end)?;
    Interval::on(request.date, start, end, request.offset)
}

/// Decides whether `request` may be committed for `owner_id` given the
/// owner's current tasks.
///
/// Format and range errors are reported before any existing task is looked
/// at. On conflict every overlapping task is reported, ordered by start time.
pub fn validate_interval(
    tasks: &[Task],
    owner_id: &str,
    request: &IntervalRequest<'_>,
) -> Result<Interval, AppError> {
    let proposed = parse_interval(request)?;
    admit_interval(tasks, owner_id, proposed, request.exclude_task_id)
}

/// Accepts an already parsed window unless it intersects another task.
pub fn admit_interval(
    tasks: &[Task],
    owner_id: &str,
    proposed: Interval,
    exclude_task_id: Option<&str>,
) -> Result<Interval, AppError> {
    let conflicts = find_conflicts(tasks, owner_id, &proposed, exclude_task_id)?;
    if !conflicts.is_empty() {
        tracing::warn!(
            owner = owner_id,
            conflicts = conflicts.len(),
            "proposed interval overlaps existing tasks"
        );
        return Err(AppError::OverlapConflict(conflicts));
    }

    tracing::debug!(
        owner = owner_id,
        start = %proposed.start(),
        end = %proposed.end(),
        "interval accepted"
    );
    Ok(proposed)
}

/// Existing tasks of `owner_id` intersecting `proposed`.
pub fn find_conflicts(
    tasks: &[Task],
    owner_id: &str,
    proposed: &Interval,
    exclude_task_id: Option<&str>,
) -> Result<Vec<TaskSummary>, AppError> {
    let mut conflicts = Vec::new();
    for task in tasks {
        if task.owner_id != owner_id || exclude_task_id == Some(task.id.as_str()) {
            continue;
        }

        let existing = Interval::new(task.start_time, task.end_time).map_err(|_| {
            AppError::invalid_data(format!("task {} has an empty time window", task.id))
        })?;
        if existing.overlaps(proposed) {
            conflicts.push(task.summary());
        }
    }

    conflicts.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
    Ok(conflicts)
}
