//! The engine's error taxonomy.
//!
//! Every core operation returns a success value or exactly one of these
//! variants; the engine never logs-and-swallows. Retries for transient
//! failures belong to the caller, except `link_episode_to_item`, which is
//! itself safe to call more than once.

use uuid::Uuid;

use molar_db::models::PlanState;

/// Result alias used by every core operation.
pub type PlanResult<T> = Result<T, PlanError>;

/// Typed failure of a core operation.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Input rejected before any state change: empty plan presented, empty
    /// cancel reason, missing mandatory material selection.
    #[error("{0}")]
    Validation(String),

    /// An illegal state edge was attempted; state is unchanged.
    #[error("invalid plan transition: {from} -> {to}")]
    InvalidTransition { from: PlanState, to: PlanState },

    /// Item mutation outside DRAFT, or completion attempted while the plan
    /// is not accepting clinical work.
    #[error("plan is locked (state: {state})")]
    PlanLocked { state: PlanState },

    /// A write lost an optimistic-concurrency race; refetch and retry.
    #[error("concurrent modification: {entity} {id} was changed by another writer")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// The item was already realized by a different clinical episode.
    #[error("item {item_id} is already linked to episode {linked_episode_id}")]
    EpisodeLinkConflict {
        item_id: Uuid,
        linked_episode_id: Uuid,
    },

    /// Transient persistence failure; the operation may be retried by the
    /// caller once the store recovers.
    #[error("store unavailable")]
    Store(#[from] sqlx::Error),
}

impl PlanError {
    pub fn plan_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "plan", id }
    }

    pub fn item_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "item", id }
    }

    pub fn service_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "service",
            id,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
