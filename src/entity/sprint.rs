use chrono::{Duration, NaiveDate};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Sprint {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub goal: String,
    pub is_active: bool,
    pub is_hidden: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Sprint {
    /// A new active sprint spanning `length_days` starting at `start`.
    pub fn new(project_id: Uuid, name: impl Into<String>, start: NaiveDate, length_days: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            goal: String::new(),
            is_active: true,
            is_hidden: false,
            start_date: start,
            end_date: start + Duration::days(length_days.max(1) - 1),
        }
    }

    /// The natural key `(project, name)`.
    pub fn key(&self) -> (Uuid, &str) {
        (self.project_id, self.name.as_str())
    }
}
