mod destination;
mod engine;
#[cfg(test)]
pub(crate) mod fake;
mod marker;

pub use destination::{
    Destination, ExistingObject, IssueDraft, ObjectKind, PullRequestDraft, Upsert,
};
pub use engine::{EngineOptions, FallbackPolicy, ImportOutcome, ImportRequest, UpsertEngine};

#[cfg(test)]
pub use engine::HISTORICAL_MR_LABEL;
