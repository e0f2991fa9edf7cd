use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    InProgress,
    OnHold,
    Resolved,
    Closed,
    Reopened,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::New,
        Status::InProgress,
        Status::OnHold,
        Status::Resolved,
        Status::Closed,
        Status::Reopened,
        Status::Cancelled,
    ];

    /// Statuses whose SLA flag is still evaluated.
    pub const SLA_TRACKED: [Status; 5] = [
        Status::New,
        Status::InProgress,
        Status::OnHold,
        Status::Reopened,
        Status::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::InProgress => "in_progress",
            Status::OnHold => "on_hold",
            Status::Resolved => "resolved",
            Status::Closed => "closed",
            Status::Reopened => "reopened",
            Status::Cancelled => "cancelled",
        }
    }

    pub fn is_sla_tracked(&self) -> bool {
        Self::SLA_TRACKED.contains(self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "new" => Ok(Status::New),
            "in_progress" => Ok(Status::InProgress),
            "on_hold" => Ok(Status::OnHold),
            "resolved" => Ok(Status::Resolved),
            "closed" => Ok(Status::Closed),
            "reopened" => Ok(Status::Reopened),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            _ => Err(Error::Validation(format!(
                "Invalid status '{}'. Must be one of: new, in_progress, on_hold, resolved, closed, reopened, cancelled",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(Error::Validation(format!(
                "Invalid priority '{}'. Must be one of: low, medium, high, critical",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Hardware,
    Software,
    Network,
    Security,
    Access,
    Services,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hardware => "hardware",
            Category::Software => "software",
            Category::Network => "network",
            Category::Security => "security",
            Category::Access => "access",
            Category::Services => "services",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hardware" => Ok(Category::Hardware),
            "software" => Ok(Category::Software),
            "network" => Ok(Category::Network),
            "security" => Ok(Category::Security),
            "access" => Ok(Category::Access),
            "services" => Ok(Category::Services),
            _ => Err(Error::Validation(format!(
                "Invalid category '{}'. Must be one of: hardware, software, network, security, access, services",
                s
            ))),
        }
    }
}

/// Derived summary of how close a ticket is to missing its deadlines.
///
/// Variants are ordered by severity so `max` picks the most critical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaFlag {
    Ok,
    Near,
    Breached,
}

impl SlaFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaFlag::Ok => "ok",
            SlaFlag::Near => "near",
            SlaFlag::Breached => "breached",
        }
    }
}

impl Default for SlaFlag {
    fn default() -> Self {
        SlaFlag::Ok
    }
}

impl fmt::Display for SlaFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SlaFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ok" => Ok(SlaFlag::Ok),
            "near" => Ok(SlaFlag::Near),
            "breached" => Ok(SlaFlag::Breached),
            _ => Err(Error::Validation(format!("Invalid SLA flag '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EndUser,
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::EndUser => "end_user",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Agent | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "end_user" | "user" => Ok(Role::EndUser),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::Validation(format!(
                "Invalid role '{}'. Must be one of: end_user, agent, admin",
                s
            ))),
        }
    }
}

/// An acting principal as resolved by the actor directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub ticket_number: String,
    pub subject: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub reporter_id: i64,
    pub assignee_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub sla_response_deadline: Option<DateTime<Utc>>,
    pub sla_resolution_deadline: Option<DateTime<Utc>>,
    pub sla_flag: SlaFlag,
}

/// A ticket that has been validated and numbered but not yet persisted.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_number: String,
    pub subject: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub reporter_id: i64,
    pub created_at: DateTime<Utc>,
    pub sla_response_deadline: Option<DateTime<Utc>>,
    pub sla_resolution_deadline: Option<DateTime<Utc>>,
    pub sla_flag: SlaFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub from_status: Option<Status>,
    pub to_status: Status,
    pub actor_id: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub ticket_id: i64,
    pub from_status: Option<Status>,
    pub to_status: Status,
    pub actor_id: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing filter. `reporter_id` is forced for end users by the service.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<i64>,
    pub reporter_id: Option<i64>,
}
