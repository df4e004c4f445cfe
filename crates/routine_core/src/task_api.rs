use crate::clock::{self, Interval};
use crate::error::AppError;
use crate::model::{CompletionStatus, Priority, Recurrence, Task, TaskCompletion};
use crate::schedule::{self, IntervalRequest};
use crate::storage::Store;
use crate::storage::json_store::validate_owner_id;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// Fields of a task about to be created. `date` and `offset` anchor the
/// `HH:mm` start and end; the request layer decides them.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub recurrence: Recurrence,
    pub date: Date,
    pub start: String,
    pub end: String,
    pub offset: UtcOffset,
}

/// Partial edit. When any of `date`, `start` or `end` is set the window is
/// re-validated; missing parts default to the task's current day and times.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub recurrence: Option<Recurrence>,
    pub date: Option<Date>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl TaskUpdate {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.recurrence.is_none()
            && !self.reschedules()
    }

    fn reschedules(&self) -> bool {
        self.date.is_some() || self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub completion: TaskCompletion,
    /// `None` only for records whose task vanished outside this API.
    pub task_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySummary {
    pub date: Date,
    pub total_tasks: usize,
    pub completed_tasks: usize,
}

pub fn validate_new_interval(
    owner_id: &str,
    date: Date,
    start: &str,
    end: &str,
    exclude_task_id: Option<&str>,
) -> Result<Interval, AppError> {
    let store = Store::from_env()?;
    validate_new_interval_with_store(&store, owner_id, date, start, end, exclude_task_id)
}

pub fn create_task(owner_id: &str, new_task: &NewTask) -> Result<Task, AppError> {
    let store = Store::from_env()?;
    create_task_with_store(&store, owner_id, new_task)
}

pub fn list_tasks(owner_id: &str, on: Option<Date>) -> Result<Vec<Task>, AppError> {
    let store = Store::from_env()?;
    list_tasks_with_store(&store, owner_id, on)
}

pub fn get_task(owner_id: &str, id: &str) -> Result<Task, AppError> {
    let store = Store::from_env()?;
    get_task_with_store(&store, owner_id, id)
}

pub fn update_task(owner_id: &str, id: &str, update: &TaskUpdate) -> Result<Task, AppError> {
    let store = Store::from_env()?;
    update_task_with_store(&store, owner_id, id, update)
}

pub fn delete_task(owner_id: &str, id: &str) -> Result<Task, AppError> {
    let store = Store::from_env()?;
    delete_task_with_store(&store, owner_id, id)
}

pub fn mark_completed(task_id: &str, user_id: &str, date: Date) -> Result<TaskCompletion, AppError> {
    let store = Store::from_env()?;
    mark_completed_with_store(&store, task_id, user_id, date)
}

pub fn task_history(owner_id: &str) -> Result<Vec<HistoryEntry>, AppError> {
    let store = Store::from_env()?;
    task_history_with_store(&store, owner_id)
}

pub fn daily_summary(owner_id: &str, date: Date) -> Result<DaySummary, AppError> {
    let store = Store::from_env()?;
    daily_summary_with_store(&store, owner_id, date)
}

fn require_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(trimmed)
}

fn require_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("name is required"));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn task_not_found(id: &str) -> AppError {
    AppError::not_found(format!("task {id} not found"))
}

fn validate_new_interval_with_store(
    store: &Store,
    owner_id: &str,
    date: Date,
    start: &str,
    end: &str,
    exclude_task_id: Option<&str>,
) -> Result<Interval, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let exclude_task_id = exclude_task_id.map(str::trim);
    let proposed = schedule::parse_interval(&IntervalRequest {
        date,
        start,
        end,
        offset: clock::local_offset(),
        exclude_task_id,
    })?;

    let state = store.load(owner_id)?;
    // Edits keep the task's own offset.
    let proposed = match exclude_task_id
        .and_then(|id| state.tasks.iter().find(|task| task.id == id))
    {
        Some(task) => proposed.at_offset(task.start_time.offset()),
        None => proposed,
    };
    schedule::admit_interval(&state.tasks, owner_id, proposed, exclude_task_id)
}

fn create_task_with_store(
    store: &Store,
    owner_id: &str,
    new_task: &NewTask,
) -> Result<Task, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let name = require_name(&new_task.name)?;

    let _lock = store.lock_owner(owner_id)?;
    let mut state = store.load(owner_id)?;
    let interval = schedule::validate_interval(
        &state.tasks,
        owner_id,
        &IntervalRequest {
            date: new_task.date,
            start: &new_task.start,
            end: &new_task.end,
            offset: new_task.offset,
            exclude_task_id: None,
        },
    )?;

    let now = OffsetDateTime::now_utc();
    let task = Task {
        id: format!("task-{}", Uuid::new_v4()),
        owner_id: owner_id.to_string(),
        name,
        description: normalize_description(new_task.description.as_deref()),
        priority: new_task.priority,
        start_time: interval.start(),
        end_time: interval.end(),
        recurrence: new_task.recurrence,
        created_at: now,
        updated_at: now,
    };

    state.tasks.push(task.clone());
    store.save(owner_id, &state)?;
    tracing::info!(owner = owner_id, task = %task.id, "task created");

    Ok(task)
}

fn list_tasks_with_store(
    store: &Store,
    owner_id: &str,
    on: Option<Date>,
) -> Result<Vec<Task>, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let mut tasks = store.load(owner_id)?.tasks;
    match on {
        Some(date) => {
            tasks.retain(|task| task.date() == date);
            tasks.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        }
        None => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    Ok(tasks)
}

fn get_task_with_store(store: &Store, owner_id: &str, id: &str) -> Result<Task, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let trimmed_id = require_id(id)?;
    store
        .load(owner_id)?
        .tasks
        .into_iter()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| task_not_found(trimmed_id))
}

fn update_task_with_store(
    store: &Store,
    owner_id: &str,
    id: &str,
    update: &TaskUpdate,
) -> Result<Task, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let trimmed_id = require_id(id)?;
    if update.is_empty() {
        return Err(AppError::invalid_input("no changes requested"));
    }
    let name = update.name.as_deref().map(require_name).transpose()?;

    let _lock = store.lock_owner(owner_id)?;
    let mut state = store.load(owner_id)?;
    let index = state
        .tasks
        .iter()
        .position(|task| task.id == trimmed_id)
        .ok_or_else(|| task_not_found(trimmed_id))?;

    let interval = if update.reschedules() {
        let current = &state.tasks[index];
        let start = update
            .start
            .clone()
            .unwrap_or_else(|| clock::format_clock_time(current.start_time));
        let end = update
            .end
            .clone()
            .unwrap_or_else(|| clock::format_clock_time(current.end_time));
        let request = IntervalRequest {
            date: update.date.unwrap_or_else(|| current.date()),
            start: &start,
            end: &end,
            offset: current.start_time.offset(),
            exclude_task_id: Some(trimmed_id),
        };
        Some(schedule::validate_interval(&state.tasks, owner_id, &request)?)
    } else {
        None
    };

    let task = &mut state.tasks[index];
    if let Some(name) = name {
        task.name = name;
    }
    if let Some(description) = update.description.as_deref() {
        task.description = normalize_description(Some(description));
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }
    if let Some(recurrence) = update.recurrence {
        task.recurrence = recurrence;
    }
    if let Some(interval) = interval {
        task.start_time = interval.start();
        task.end_time = interval.end();
    }
    task.updated_at = OffsetDateTime::now_utc();
    let updated = task.clone();

    store.save(owner_id, &state)?;
    tracing::info!(owner = owner_id, task = %updated.id, "task updated");

    Ok(updated)
}

/// Removes the task together with its completion records.
fn delete_task_with_store(store: &Store, owner_id: &str, id: &str) -> Result<Task, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let trimmed_id = require_id(id)?;

    let _lock = store.lock_owner(owner_id)?;
    let mut state = store.load(owner_id)?;
    let index = state
        .tasks
        .iter()
        .position(|task| task.id == trimmed_id)
        .ok_or_else(|| task_not_found(trimmed_id))?;

    let removed = state.tasks.remove(index);
    let before = state.completions.len();
    state
        .completions
        .retain(|record| record.task_id != removed.id);
    store.save(owner_id, &state)?;
    tracing::info!(
        owner = owner_id,
        task = %removed.id,
        completions = before - state.completions.len(),
        "task deleted"
    );

    Ok(removed)
}

fn mark_completed_with_store(
    store: &Store,
    task_id: &str,
    user_id: &str,
    date: Date,
) -> Result<TaskCompletion, AppError> {
    let user_id = validate_owner_id(user_id)?;
    let trimmed_id = require_id(task_id)?;

    let _lock = store.lock_owner(user_id)?;
    let mut state = store.load(user_id)?;
    if !state.tasks.iter().any(|task| task.id == trimmed_id) {
        return Err(task_not_found(trimmed_id));
    }

    let existing = state
        .completions
        .iter()
        .position(|record| record.matches(trimmed_id, user_id, date));
    if let Some(index) = existing
        && state.completions[index].is_completed()
    {
        return Err(AppError::already_completed(format!(
            "task {} already completed on {}",
            trimmed_id,
            clock::format_calendar_date(date)
        )));
    }

    let now = OffsetDateTime::now_utc();
    let record = match existing {
        Some(index) => {
            let record = &mut state.completions[index];
            record.status = CompletionStatus::Completed;
            record.completed_at = Some(now);
            record.updated_at = now;
            record.clone()
        }
        None => {
            let record = TaskCompletion {
                task_id: trimmed_id.to_string(),
                user_id: user_id.to_string(),
                date,
                status: CompletionStatus::Completed,
                completed_at: Some(now),
                created_at: now,
                updated_at: now,
            };
            state.completions.push(record.clone());
            record
        }
    };

    store.save(user_id, &state)?;
    tracing::info!(
        owner = user_id,
        task = trimmed_id,
        date = %clock::format_calendar_date(date),
        "task marked completed"
    );

    Ok(record)
}

fn task_history_with_store(store: &Store, owner_id: &str) -> Result<Vec<HistoryEntry>, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let state = store.load(owner_id)?;
    let mut completions = state.completions;
    completions.sort_by(|a, b| b.date.cmp(&a.date).then(a.task_id.cmp(&b.task_id)));

    Ok(completions
        .into_iter()
        .map(|completion| {
            let task_name = state
                .tasks
                .iter()
                .find(|task| task.id == completion.task_id)
                .map(|task| task.name.clone());
            HistoryEntry {
                completion,
                task_name,
            }
        })
        .collect())
}

fn daily_summary_with_store(
    store: &Store,
    owner_id: &str,
    date: Date,
) -> Result<DaySummary, AppError> {
    let owner_id = validate_owner_id(owner_id)?;
    let state = store.load(owner_id)?;
    let completed_tasks = state
        .completions
        .iter()
        .filter(|record| record.date == date && record.is_completed())
        .count();

    Ok(DaySummary {
        date,
        total_tasks: state.tasks.len(),
        completed_tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        NewTask, TaskUpdate, create_task_with_store, daily_summary_with_store,
        delete_task_with_store, get_task_with_store, list_tasks_with_store,
        mark_completed_with_store, task_history_with_store, update_task_with_store,
        validate_new_interval_with_store,
    };
    use crate::model::{CompletionStatus, Priority, Recurrence, TaskCompletion};
    use crate::storage::{OwnerState, Store};
    use std::path::PathBuf;
    use std::sync::Barrier;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::macros::{date, datetime};
    use time::{Date, Duration, UtcOffset};

    const DAY: Date = date!(2025 - 03 - 22);

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("routine-{nanos}-{file_name}"))
    }

    fn new_task(name: &str, start: &str, end: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            description: None,
            priority: Priority::Medium,
            recurrence: Recurrence::Daily,
            date: DAY,
            start: start.to_string(),
            end: end.to_string(),
            offset: UtcOffset::UTC,
        }
    }

    fn reschedule(start: &str, end: &str) -> TaskUpdate {
        TaskUpdate {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..TaskUpdate::default()
        }
    }

    #[test]
    fn create_task_persists_normalized_window() {
        let root = temp_path("create");
        let store = Store::new(&root);

        let mut draft = new_task("  stretch ", "09:00", "10:00");
        draft.description = Some("   ".to_string());
        draft.priority = Priority::High;
        let task = create_task_with_store(&store, "alice", &draft).unwrap();
        let loaded = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert!(task.id.starts_with("task-"));
        assert_eq!(task.owner_id, "alice");
        assert_eq!(task.name, "stretch");
        assert_eq!(task.description, None);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.recurrence, Recurrence::Daily);
        assert_eq!(task.start_time, datetime!(2025-03-22 09:00 UTC));
        assert_eq!(task.end_time, datetime!(2025-03-22 10:00 UTC));
        assert_eq!(task.created_at, task.updated_at);
        assert_eq!(loaded.tasks, vec![task]);
    }

    #[test]
    fn create_task_rejects_blank_name_and_bad_owner() {
        let root = temp_path("create-invalid");
        let store = Store::new(&root);

        let blank = create_task_with_store(&store, "alice", &new_task("  ", "09:00", "10:00"))
            .unwrap_err();
        let owner = create_task_with_store(&store, "../alice", &new_task("run", "09:00", "10:00"))
            .unwrap_err();
        let exists = root.exists();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(blank.code(), "invalid_input");
        assert_eq!(owner.code(), "invalid_input");
        assert!(!exists);
    }

    #[test]
    fn create_task_follows_overlap_scenario() {
        let root = temp_path("scenario");
        let store = Store::new(&root);

        let morning = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        let next = create_task_with_store(&store, "alice", &new_task("walk", "10:00", "11:00"));
        let straddle =
            create_task_with_store(&store, "alice", &new_task("call", "09:30", "10:30"))
                .unwrap_err();
        let early = create_task_with_store(&store, "alice", &new_task("gym", "08:00", "09:30"))
            .unwrap_err();
        let loaded = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert!(next.is_ok());
        assert_eq!(straddle.code(), "overlap_conflict");
        assert!(straddle.conflicts().iter().any(|c| c.id == morning.id));
        assert_eq!(early.code(), "overlap_conflict");
        assert_eq!(early.conflicts().len(), 1);
        assert_eq!(early.conflicts()[0].id, morning.id);
        assert_eq!(loaded.tasks.len(), 2);
    }

    #[test]
    fn create_task_rejects_inverted_range_before_touching_store() {
        let root = temp_path("create-range");
        let store = Store::new(&root);

        let err = create_task_with_store(&store, "alice", &new_task("nap", "14:00", "13:00"))
            .unwrap_err();
        let state = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(err.code(), "invalid_range");
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn validate_new_interval_is_read_only() {
        let root = temp_path("validate");
        let store = Store::new(&root);
        create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00")).unwrap();
        let other_day = DAY + Duration::days(3);

        let free =
            validate_new_interval_with_store(&store, "alice", other_day, "09:00", "10:00", None)
                .unwrap();
        let bad_format =
            validate_new_interval_with_store(&store, "alice", DAY, "9", "10:00", None).unwrap_err();
        let loaded = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(free.duration(), Duration::hours(1));
        assert_eq!(free.start().date(), other_day);
        assert_eq!(bad_format.code(), "invalid_format");
        assert_eq!(loaded.tasks.len(), 1);
    }

    #[test]
    fn validate_new_interval_agrees_with_update_for_foreign_offset() {
        let root = temp_path("validate-offset");
        let store = Store::new(&root);
        let plus_two = UtcOffset::from_hms(2, 0, 0).unwrap();
        let mut read = new_task("read", "09:00", "10:00");
        read.offset = plus_two;
        let mut walk = new_task("walk", "10:00", "11:00");
        walk.offset = plus_two;
        let read = create_task_with_store(&store, "alice", &read).unwrap();
        let walk = create_task_with_store(&store, "alice", &walk).unwrap();

        let check = validate_new_interval_with_store(
            &store,
            "alice",
            DAY,
            "09:00",
            "10:30",
            Some(&read.id),
        );
        let widened = reschedule("09:00", "10:30");
        let edit = update_task_with_store(&store, "alice", &read.id, &widened);
        let shrink =
            validate_new_interval_with_store(&store, "alice", DAY, "09:00", "09:45", Some(&read.id))
                .unwrap();
        std::fs::remove_dir_all(&root).ok();

        let check = check.unwrap_err();
        assert_eq!(check.code(), "overlap_conflict");
        assert_eq!(check.conflicts()[0].id, walk.id);
        assert_eq!(edit.unwrap_err().code(), "overlap_conflict");
        assert_eq!(shrink.start(), datetime!(2025-03-22 09:00 +2));
        assert_eq!(shrink.end(), datetime!(2025-03-22 09:45 +2));
    }

    #[test]
    fn update_task_shrinks_own_window_without_self_conflict() {
        let root = temp_path("update-self");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let updated =
            update_task_with_store(&store, "alice", &task.id, &reschedule("09:00", "09:45"))
                .unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(updated.id, task.id);
        assert_eq!(updated.start_time, datetime!(2025-03-22 09:00 UTC));
        assert_eq!(updated.end_time, datetime!(2025-03-22 09:45 UTC));
        assert!(updated.updated_at >= task.updated_at);
        assert_eq!(updated.created_at, task.created_at);
    }

    #[test]
    fn update_task_keeps_original_day_and_missing_bound() {
        let root = temp_path("update-day");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let update = TaskUpdate {
            end: Some("11:30".to_string()),
            ..TaskUpdate::default()
        };
        let updated = update_task_with_store(&store, "alice", &task.id, &update).unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(updated.start_time, datetime!(2025-03-22 09:00 UTC));
        assert_eq!(updated.end_time, datetime!(2025-03-22 11:30 UTC));
    }

    #[test]
    fn update_task_can_move_to_another_day() {
        let root = temp_path("update-move");
        let store = Store::new(&root);
        let first = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        create_task_with_store(&store, "alice", &new_task("walk", "10:00", "11:00")).unwrap();

        let update = TaskUpdate {
            date: Some(date!(2025 - 03 - 23)),
            start: Some("10:00".to_string()),
            end: Some("11:00".to_string()),
            ..TaskUpdate::default()
        };
        let moved = update_task_with_store(&store, "alice", &first.id, &update).unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(moved.start_time, datetime!(2025-03-23 10:00 UTC));
        assert_eq!(moved.end_time, datetime!(2025-03-23 11:00 UTC));
    }

    #[test]
    fn update_task_rejects_overlap_and_leaves_store_unchanged() {
        let root = temp_path("update-overlap");
        let store = Store::new(&root);
        let first = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        let second = create_task_with_store(&store, "alice", &new_task("walk", "10:00", "11:00"))
            .unwrap();
        let before = store.load("alice").unwrap();

        let err = update_task_with_store(&store, "alice", &first.id, &reschedule("09:00", "10:30"))
            .unwrap_err();
        let after = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(err.code(), "overlap_conflict");
        assert_eq!(err.conflicts().len(), 1);
        assert_eq!(err.conflicts()[0].id, second.id);
        assert_eq!(before, after);
    }

    #[test]
    fn update_task_changes_metadata_without_rescheduling() {
        let root = temp_path("update-meta");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let update = TaskUpdate {
            name: Some("read fiction".to_string()),
            description: Some("chapter 3".to_string()),
            priority: Some(Priority::Low),
            recurrence: Some(Recurrence::Weekly),
            ..TaskUpdate::default()
        };
        let updated = update_task_with_store(&store, "alice", &task.id, &update).unwrap();
        let loaded = get_task_with_store(&store, "alice", &task.id).unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(updated.name, "read fiction");
        assert_eq!(updated.description.as_deref(), Some("chapter 3"));
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.recurrence, Recurrence::Weekly);
        assert_eq!(updated.start_time, task.start_time);
        assert_eq!(loaded, updated);
    }

    #[test]
    fn update_task_rejects_empty_blank_and_foreign_edits() {
        let root = temp_path("update-invalid");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let empty =
            update_task_with_store(&store, "alice", &task.id, &TaskUpdate::default()).unwrap_err();
        let blank = update_task_with_store(
            &store,
            "alice",
            &task.id,
            &TaskUpdate {
                name: Some(" ".to_string()),
                ..TaskUpdate::default()
            },
        )
        .unwrap_err();
        let foreign = update_task_with_store(&store, "bob", &task.id, &reschedule("12:00", "13:00"))
            .unwrap_err();
        let range = update_task_with_store(&store, "alice", &task.id, &reschedule("10:00", "10:00"))
            .unwrap_err();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(empty.code(), "invalid_input");
        assert_eq!(blank.code(), "invalid_input");
        assert_eq!(foreign.code(), "not_found");
        assert_eq!(range.code(), "invalid_range");
    }

    #[test]
    fn get_task_hides_other_owners_tasks() {
        let root = temp_path("get-foreign");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let own = get_task_with_store(&store, "alice", &task.id).unwrap();
        let foreign = get_task_with_store(&store, "bob", &task.id).unwrap_err();
        let missing = get_task_with_store(&store, "alice", "task-missing").unwrap_err();
        let blank = get_task_with_store(&store, "alice", " ").unwrap_err();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(own, task);
        assert_eq!(foreign.code(), "not_found");
        assert_eq!(missing.code(), "not_found");
        assert_eq!(blank.code(), "invalid_input");
    }

    #[test]
    fn list_tasks_orders_by_creation_or_by_start_for_a_day() {
        let root = temp_path("list");
        let store = Store::new(&root);
        let late = create_task_with_store(&store, "alice", &new_task("late", "15:00", "16:00"))
            .unwrap();
        let early = create_task_with_store(&store, "alice", &new_task("early", "07:00", "08:00"))
            .unwrap();
        let mut tomorrow_draft = new_task("tomorrow", "07:00", "08:00");
        tomorrow_draft.date = date!(2025 - 03 - 23);
        let tomorrow = create_task_with_store(&store, "alice", &tomorrow_draft).unwrap();

        let all = list_tasks_with_store(&store, "alice", None).unwrap();
        let day = list_tasks_with_store(&store, "alice", Some(DAY)).unwrap();
        let other = list_tasks_with_store(&store, "bob", None).unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(all.len(), 3);
        assert!(all[0].created_at >= all[1].created_at);
        assert!(all[1].created_at >= all[2].created_at);
        assert!(all.iter().any(|task| task.id == tomorrow.id));
        let day_ids: Vec<&str> = day.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(day_ids, vec![early.id.as_str(), late.id.as_str()]);
        assert!(other.is_empty());
    }

    #[test]
    fn delete_task_cascades_completion_records() {
        let root = temp_path("delete");
        let store = Store::new(&root);
        let doomed = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        let kept = create_task_with_store(&store, "alice", &new_task("walk", "10:00", "11:00"))
            .unwrap();
        mark_completed_with_store(&store, &doomed.id, "alice", DAY).unwrap();
        mark_completed_with_store(&store, &kept.id, "alice", DAY).unwrap();

        let removed = delete_task_with_store(&store, "alice", &doomed.id).unwrap();
        let state = store.load("alice").unwrap();
        let again = delete_task_with_store(&store, "alice", &doomed.id).unwrap_err();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(removed.id, doomed.id);
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.completions.len(), 1);
        assert_eq!(state.completions[0].task_id, kept.id);
        assert_eq!(again.code(), "not_found");
    }

    #[test]
    fn delete_task_frees_the_window() {
        let root = temp_path("delete-free");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        delete_task_with_store(&store, "alice", &task.id).unwrap();
        let recreated = create_task_with_store(&store, "alice", &new_task("read", "09:30", "10:30"));
        std::fs::remove_dir_all(&root).ok();

        assert!(recreated.is_ok());
    }

    #[test]
    fn mark_completed_is_idempotent_per_day() {
        let root = temp_path("complete");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let first = mark_completed_with_store(&store, &task.id, "alice", DAY).unwrap();
        let second = mark_completed_with_store(&store, &task.id, "alice", DAY).unwrap_err();
        let state = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(first.status, CompletionStatus::Completed);
        assert!(first.completed_at.is_some());
        assert_eq!(first.date, DAY);
        assert_eq!(second.code(), "already_completed");
        assert_eq!(state.completions, vec![first]);
    }

    #[test]
    fn mark_completed_keeps_one_record_per_date() {
        let root = temp_path("complete-dates");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        mark_completed_with_store(&store, &task.id, "alice", DAY).unwrap();
        mark_completed_with_store(&store, &task.id, "alice", date!(2025 - 03 - 23)).unwrap();
        let state = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(state.completions.len(), 2);
    }

    #[test]
    fn mark_completed_upgrades_pending_record_in_place() {
        let root = temp_path("complete-upgrade");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        let mut state = store.load("alice").unwrap();
        state.completions.push(TaskCompletion {
            task_id: task.id.clone(),
            user_id: "alice".to_string(),
            date: DAY,
            status: CompletionStatus::NotCompleted,
            completed_at: None,
            created_at: datetime!(2025-03-22 06:00 UTC),
            updated_at: datetime!(2025-03-22 06:00 UTC),
        });
        store.save("alice", &state).unwrap();

        let record = mark_completed_with_store(&store, &task.id, "alice", DAY).unwrap();
        let loaded = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(record.status, CompletionStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.created_at, datetime!(2025-03-22 06:00 UTC));
        assert_eq!(loaded.completions, vec![record]);
    }

    #[test]
    fn mark_completed_requires_owned_task() {
        let root = temp_path("complete-missing");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();

        let missing = mark_completed_with_store(&store, "task-missing", "alice", DAY).unwrap_err();
        let foreign = mark_completed_with_store(&store, &task.id, "bob", DAY).unwrap_err();
        let bob_state = store.load("bob").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(missing.code(), "not_found");
        assert_eq!(foreign.code(), "not_found");
        assert_eq!(bob_state, OwnerState::default());
    }

    #[test]
    fn task_history_joins_names_newest_first() {
        let root = temp_path("history");
        let store = Store::new(&root);
        let task = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        mark_completed_with_store(&store, &task.id, "alice", date!(2025 - 03 - 20)).unwrap();
        mark_completed_with_store(&store, &task.id, "alice", date!(2025 - 03 - 22)).unwrap();

        let history = task_history_with_store(&store, "alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].completion.date, date!(2025 - 03 - 22));
        assert_eq!(history[1].completion.date, date!(2025 - 03 - 20));
        assert!(
            history
                .iter()
                .all(|entry| entry.task_name.as_deref() == Some("read"))
        );
    }

    #[test]
    fn daily_summary_counts_completed_records() {
        let root = temp_path("summary");
        let store = Store::new(&root);
        let first = create_task_with_store(&store, "alice", &new_task("read", "09:00", "10:00"))
            .unwrap();
        create_task_with_store(&store, "alice", &new_task("walk", "10:00", "11:00")).unwrap();
        mark_completed_with_store(&store, &first.id, "alice", DAY).unwrap();
        mark_completed_with_store(&store, &first.id, "alice", date!(2025 - 03 - 21)).unwrap();

        let summary = daily_summary_with_store(&store, "alice", DAY).unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(summary.date, DAY);
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.completed_tasks, 1);
    }

    #[test]
    fn racing_overlapping_creates_commit_at_most_one() {
        let root = temp_path("race");
        let store = Store::new(&root);
        let barrier = Barrier::new(2);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = [("09:00", "10:00"), ("09:30", "10:30")]
                .into_iter()
                .map(|(start, end)| {
                    let store = &store;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        create_task_with_store(store, "alice", &new_task("race", start, end))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });
        let state = store.load("alice").unwrap();
        std::fs::remove_dir_all(&root).ok();

        let committed = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(committed, 1);
        let rejected = results.iter().find_map(|result| result.as_ref().err()).unwrap();
        assert_eq!(rejected.code(), "overlap_conflict");
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn racing_creates_for_different_owners_both_commit() {
        let root = temp_path("race-owners");
        let store = Store::new(&root);
        let barrier = Barrier::new(2);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["alice", "bob"]
                .into_iter()
                .map(|owner| {
                    let store = &store;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        create_task_with_store(store, owner, &new_task("race", "09:00", "10:00"))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });
        let alice = store.load("alice").unwrap();
        let bob = store.load("bob").unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert!(results.iter().all(|result| result.is_ok()));
        assert_eq!(alice.tasks.len(), 1);
        assert_eq!(bob.tasks.len(), 1);
    }
}
