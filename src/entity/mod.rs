mod color;
mod metrics;
mod project;
mod snapshot;
mod sprint;
mod task;
mod team;

pub use color::Color;
pub use metrics::{BurndownPoint, VelocityPoint};
pub use project::{DerivedFields, PatchOutcome, Project, ProjectPatch};
pub use snapshot::Snapshot;
pub use sprint::Sprint;
pub use task::{Task, TaskPriority, TaskStatus};
pub use team::{Activity, TeamMember};
