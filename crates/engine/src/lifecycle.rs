//! Explicit lifecycle states.
//!
//! Accounts and recurring bills can be paused, transactions and categories
//! can only be removed. Each entity picks the state machine it supports and
//! every change goes through [`transition`].

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

pub trait LifecycleState: Copy + Eq + Sized {
    fn as_str(self) -> &'static str;

    fn can_transition(self, to: Self) -> bool;
}

/// Validate `from -> to` for the entity named `label`.
pub fn transition<S: LifecycleState>(from: S, to: S, label: &str) -> ResultEngine<S> {
    if !from.can_transition(to) {
        return Err(EngineError::InvalidTransition(format!(
            "{label} cannot go from {} to {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(to)
}

/// `Active ⇄ Inactive`, both `→ Deleted`; `Deleted` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Active,
    Inactive,
    Deleted,
}

impl ActivityState {
    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl LifecycleState for ActivityState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Inactive)
                | (Self::Inactive, Self::Active)
                | (Self::Active | Self::Inactive, Self::Deleted)
        )
    }
}

impl TryFrom<&str> for ActivityState {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(EngineError::Validation(format!(
                "invalid activity state: {other}"
            ))),
        }
    }
}

/// `Live → Deleted`; `Deleted` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Live,
    Deleted,
}

impl LifecycleState for RecordState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Deleted => "deleted",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!((self, to), (Self::Live, Self::Deleted))
    }
}

impl TryFrom<&str> for RecordState {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "live" => Ok(Self::Live),
            "deleted" => Ok(Self::Deleted),
            other => Err(EngineError::Validation(format!(
                "invalid record state: {other}"
            ))),
        }
    }
}
