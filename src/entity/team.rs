use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Color;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub color: Color,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: role.into(),
            color: Color::default(),
        }
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub project_id: Option<Uuid>,
}

impl Activity {
    pub fn new(message: impl Into<String>, project_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: message.into(),
            project_id,
        }
    }
}
