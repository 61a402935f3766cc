//! Participant directory adapters.
//!
//! The messaging core only ever reads participants. Two adapters are
//! provided: one over the `participants` table and a fixed in-memory set.

use crate::types::{MessagingError, MessagingResult};
use courier_database::{Participant, ParticipantRepository};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Resolves participant identity from an external source.
pub trait ParticipantDirectory: Send + Sync + 'static {
    /// Look up a participant. Unknown ids yield `UnknownParticipant`.
    fn resolve_participant(&self, id: &str) -> impl Future<Output = MessagingResult<Participant>> + Send;
}

impl<D: ParticipantDirectory> ParticipantDirectory for Arc<D> {
    fn resolve_participant(&self, id: &str) -> impl Future<Output = MessagingResult<Participant>> + Send {
        (**self).resolve_participant(id)
    }
}

/// Directory backed by the `participants` table.
#[derive(Clone)]
pub struct SqlDirectory {
    participants: ParticipantRepository,
}

impl SqlDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            participants: ParticipantRepository::new(pool),
        }
    }

    pub async fn list(&self) -> MessagingResult<Vec<Participant>> {
        Ok(self.participants.list().await?)
    }
}

impl ParticipantDirectory for SqlDirectory {
    async fn resolve_participant(&self, id: &str) -> MessagingResult<Participant> {
        self.participants
            .find_by_id(id)
            .await?
            .ok_or_else(|| MessagingError::unknown_participant(id))
    }
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    participants: HashMap<String, Participant>,
}

impl StaticDirectory {
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Self {
        Self {
            participants: participants
                .into_iter()
                .map(|participant| (participant.id.clone(), participant))
                .collect(),
        }
    }

    pub fn with(mut self, participant: Participant) -> Self {
        self.participants.insert(participant.id.clone(), participant);
        self
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl ParticipantDirectory for StaticDirectory {
    async fn resolve_participant(&self, id: &str) -> MessagingResult<Participant> {
        self.participants
            .get(id)
            .cloned()
            .ok_or_else(|| MessagingError::unknown_participant(id))
    }
}
