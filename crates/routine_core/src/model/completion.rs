use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    #[default]
    NotCompleted,
}

/// Daily completion marker, unique per `(task_id, user_id, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub task_id: String,
    pub user_id: String,
    #[serde(with = "calendar_date")]
    pub date: Date,
    #[serde(default)]
    pub status: CompletionStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TaskCompletion {
    pub fn matches(&self, task_id: &str, user_id: &str, date: Date) -> bool {
        self.task_id == task_id && self.user_id == user_id && self.date == date
    }

    pub fn is_completed(&self) -> bool {
        self.status == CompletionStatus::Completed
    }
}
