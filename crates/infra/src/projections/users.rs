//! User directory read model.
//!
//! Holds the password hash so login can look a user up by email without
//! replaying the user's stream. The hash is never serialized.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_auth::{Role, UserEvent};
use stockroom_core::{AggregateId, UserId};
use stockroom_events::EventEnvelope;

use super::{Projection, ProjectionError, StreamCursors, decode_payload};
use crate::aggregate_types;
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReadModel {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection that maintains the live user directory.
#[derive(Debug)]
pub struct UserDirectoryProjection<S>
where
    S: ReadStore<UserId, UserReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> UserDirectoryProjection<S>
where
    S: ReadStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(user_id)
    }

    /// Case-insensitive email lookup.
    pub fn find_by_email(&self, email: &str) -> Option<UserReadModel> {
        let needle = email.trim().to_lowercase();
        self.store.list().into_iter().find(|u| u.email == needle)
    }

    pub fn find_by_username(&self, username: &str) -> Option<UserReadModel> {
        let needle = username.trim().to_lowercase();
        self.store
            .list()
            .into_iter()
            .find(|u| u.username.to_lowercase() == needle)
    }

    /// Every live user, oldest first.
    pub fn list(&self) -> Vec<UserReadModel> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub fn with_roles(&self, roles: &[Role]) -> Vec<UserReadModel> {
        self.list().into_iter().filter(|u| roles.contains(&u.role)).collect()
    }

    fn apply_event(&self, event: UserEvent) -> Result<(), ProjectionError> {
        match event {
            UserEvent::Registered(e) => {
                self.store.upsert(
                    e.user_id,
                    UserReadModel {
                        id: e.user_id,
                        username: e.username,
                        email: e.email,
                        password_hash: e.password_hash,
                        role: e.role,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::ProfileUpdated(e) => {
                let mut row = self.existing(&e.user_id)?;
                if let Some(username) = e.username {
                    row.username = username;
                }
                if let Some(email) = e.email {
                    row.email = email;
                }
                row.updated_at = e.occurred_at;
                self.store.upsert(e.user_id, row);
            }
            UserEvent::PasswordChanged(e) => {
                let mut row = self.existing(&e.user_id)?;
                row.password_hash = e.password_hash;
                row.updated_at = e.occurred_at;
                self.store.upsert(e.user_id, row);
            }
            UserEvent::RoleChanged(e) => {
                let mut row = self.existing(&e.user_id)?;
                row.role = e.to;
                row.updated_at = e.occurred_at;
                self.store.upsert(e.user_id, row);
            }
            UserEvent::Deleted(e) => {
                self.store.remove(&e.user_id);
            }
        }
        Ok(())
    }

    fn existing(&self, user_id: &UserId) -> Result<UserReadModel, ProjectionError> {
        self.store
            .get(user_id)
            .ok_or_else(|| ProjectionError::StreamMismatch(format!("user {user_id} has no directory row")))
    }
}

fn user_of(event: &UserEvent) -> AggregateId {
    let id = match event {
        UserEvent::Registered(e) => e.user_id,
        UserEvent::ProfileUpdated(e) => e.user_id,
        UserEvent::PasswordChanged(e) => e.user_id,
        UserEvent::RoleChanged(e) => e.user_id,
        UserEvent::Deleted(e) => e.user_id,
    };
    AggregateId::from(id)
}

impl<S> Projection for UserDirectoryProjection<S>
where
    S: ReadStore<UserId, UserReadModel>,
{
    fn name(&self) -> &'static str {
        "user_directory"
    }

    fn aggregate_type(&self) -> &'static str {
        aggregate_types::USER
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != self.aggregate_type() {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                self.apply_event(decode_payload(envelope, user_of)?)
            })
            .map(|_| ())
    }

    fn cursor(&self, aggregate_id: AggregateId) -> u64 {
        self.cursors.position(aggregate_id)
    }

    fn reset(&self) {
        self.cursors.reset(|| self.store.clear());
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
