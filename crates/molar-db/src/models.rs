use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// State of a treatment plan.
///
/// `Completed`, `Rejected`, and `Cancelled` are terminal. Plan state never
/// regresses; the only writers are the lifecycle engine and the item
/// completion coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Draft,
    Presented,
    Accepted,
    InProgress,
    Completed,
    Rejected,
    Cancelled,
}

impl PlanState {
    /// Whether the plan has reached a state it can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }

    /// Whether clinical work may be recorded against the plan's items.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress)
    }
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Presented => "presented",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanState {
    type Err = PlanStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "presented" => Ok(Self::Presented),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(PlanStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanState`] string.
#[derive(Debug, Clone)]
pub struct PlanStateParseError(pub String);

impl fmt::Display for PlanStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan state: {:?}", self.0)
    }
}

impl std::error::Error for PlanStateParseError {}

// ---------------------------------------------------------------------------

/// State of a single plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

impl FromStr for ItemState {
    type Err = ItemStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ItemStateParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ItemState`] string.
#[derive(Debug, Clone)]
pub struct ItemStateParseError(pub String);

impl fmt::Display for ItemStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item state: {:?}", self.0)
    }
}

impl std::error::Error for ItemStateParseError {}

// ---------------------------------------------------------------------------

/// Clinical priority of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl fmt::Display for PlanPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanPriority {
    type Err = PlanPriorityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(PlanPriorityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanPriority`] string.
#[derive(Debug, Clone)]
pub struct PlanPriorityParseError(pub String);

impl fmt::Display for PlanPriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan priority: {:?}", self.0)
    }
}

impl std::error::Error for PlanPriorityParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A treatment plan -- an ordered set of priced procedures proposed to a
/// patient.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TreatmentPlan {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub title: String,
    pub description: String,
    pub state: PlanState,
    pub priority: PlanPriority,
    pub internal_notes: String,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub presented_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// One procedure line within a plan, with its own completion lifecycle and
/// frozen price.
///
/// The four `price_*` columns are snapshots captured once at creation; the
/// repository never joins them against live catalog data.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanItem {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub service_id: Uuid,
    pub material_id: Option<Uuid>,
    /// 1-based order within the plan, unique per plan.
    pub position: i32,
    pub state: ItemState,
    pub notes: String,
    pub estimated_date: Option<NaiveDate>,
    pub realized_date: Option<DateTime<Utc>>,
    /// The clinical episode that realized this item, if any.
    pub episode_id: Option<Uuid>,
    pub price_service: Decimal,
    pub price_fixed_materials: Decimal,
    pub price_material: Decimal,
    pub price_total: Decimal,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_state_display_roundtrip() {
        let variants = [
            PlanState::Draft,
            PlanState::Presented,
            PlanState::Accepted,
            PlanState::InProgress,
            PlanState::Completed,
            PlanState::Rejected,
            PlanState::Cancelled,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: PlanState = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn plan_state_invalid() {
        let result = "bogus".parse::<PlanState>();
        assert!(result.is_err());
    }

    #[test]
    fn plan_state_terminal_set() {
        assert!(PlanState::Completed.is_terminal());
        assert!(PlanState::Rejected.is_terminal());
        assert!(PlanState::Cancelled.is_terminal());
        assert!(!PlanState::Draft.is_terminal());
        assert!(!PlanState::Presented.is_terminal());
        assert!(!PlanState::Accepted.is_terminal());
        assert!(!PlanState::InProgress.is_terminal());
    }

    #[test]
    fn plan_state_active_set() {
        assert!(PlanState::Accepted.is_active());
        assert!(PlanState::InProgress.is_active());
        assert!(!PlanState::Draft.is_active());
        assert!(!PlanState::Completed.is_active());
    }

    #[test]
    fn item_state_display_roundtrip() {
        let variants = [ItemState::Pending, ItemState::InProgress, ItemState::Completed];
        for v in &variants {
            let s = v.to_string();
            let parsed: ItemState = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn item_state_invalid() {
        let result = "done".parse::<ItemState>();
        assert!(result.is_err());
    }

    #[test]
    fn plan_priority_display_roundtrip() {
        let variants = [
            PlanPriority::Low,
            PlanPriority::Medium,
            PlanPriority::High,
            PlanPriority::Urgent,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: PlanPriority = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn plan_priority_invalid() {
        let result = "critical".parse::<PlanPriority>();
        assert!(result.is_err());
    }
}
