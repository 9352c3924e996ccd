/// Planned versus completed work for one sprint.
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityPoint {
    pub sprint: String,
    pub planned: u32,
    pub completed: u32,
}

/// Remaining work on a given day of a burndown chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BurndownPoint {
    pub day: String,
    pub remaining: f64,
}
