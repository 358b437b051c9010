//! User aggregate (event-sourced).
//!
//! Holds the credentials and role of one account. Password hashing happens
//! before a command is built; the aggregate only ever sees PHC strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError, Email, UserId};
use stockroom_events::Event;

use crate::{Role, authorize_role_assignment};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

/// Trim and check a username: 3 to 30 characters of letters, digits, `_`, `.` or `-`.
pub fn validate_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(DomainError::validation(format!(
            "username must be {USERNAME_MIN_LEN}-{USERNAME_MAX_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(DomainError::validation(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username.to_string())
}

/// Aggregate root: User.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    username: String,
    email: String,
    password_hash: String,
    role: Role,
    version: u64,
    created: bool,
    deleted: bool,
}

impl User {
    /// Empty, not-yet-registered instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            username: String::new(),
            email: String::new(),
            password_hash: String::new(),
            role: Role::Staff,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_live(&self) -> bool {
        self.created && !self.deleted
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// Commands

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub user_id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePassword {
    pub user_id: UserId,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRole {
    pub user_id: UserId,
    pub role: Role,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteUser {
    pub user_id: UserId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Register(RegisterUser),
    UpdateProfile(UpdateProfile),
    ChangePassword(ChangePassword),
    ChangeRole(ChangeRole),
    Delete(DeleteUser),
}

// Events

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Only the fields that actually changed are `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub user_id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub user_id: UserId,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub user_id: UserId,
    pub from: Role,
    pub to: Role,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: UserId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    ProfileUpdated(ProfileUpdated),
    PasswordChanged(PasswordChanged),
    RoleChanged(RoleChanged),
    Deleted(UserDeleted),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered(_) => "auth.user.registered",
            UserEvent::ProfileUpdated(_) => "auth.user.profile_updated",
            UserEvent::PasswordChanged(_) => "auth.user.password_changed",
            UserEvent::RoleChanged(_) => "auth.user.role_changed",
            UserEvent::Deleted(_) => "auth.user.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Registered(e) => e.occurred_at,
            UserEvent::ProfileUpdated(e) => e.occurred_at,
            UserEvent::PasswordChanged(e) => e.occurred_at,
            UserEvent::RoleChanged(e) => e.occurred_at,
            UserEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.username = e.username.clone();
                self.email = e.email.clone();
                self.password_hash = e.password_hash.clone();
                self.role = e.role;
                self.created = true;
            }
            UserEvent::ProfileUpdated(e) => {
                if let Some(username) = &e.username {
                    self.username = username.clone();
                }
                if let Some(email) = &e.email {
                    self.email = email.clone();
                }
            }
            UserEvent::PasswordChanged(e) => {
                self.password_hash = e.password_hash.clone();
            }
            UserEvent::RoleChanged(e) => {
                self.role = e.to;
            }
            UserEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => self.handle_register(cmd),
            UserCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            UserCommand::ChangePassword(cmd) => self.handle_change_password(cmd),
            UserCommand::ChangeRole(cmd) => self.handle_change_role(cmd),
            UserCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl User {
    fn ensure_live(&self, user_id: UserId) -> Result<(), DomainError> {
        if !self.is_live() {
            return Err(DomainError::not_found());
        }
        if self.id != user_id {
            return Err(DomainError::invariant("user_id mismatch"));
        }
        Ok(())
    }

    fn ensure_hash(password_hash: &str) -> Result<(), DomainError> {
        if !password_hash.starts_with('$') {
            return Err(DomainError::validation("password must be stored as a PHC hash"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        let username = validate_username(&cmd.username)?;
        let email = Email::parse(&cmd.email)?;
        Self::ensure_hash(&cmd.password_hash)?;

        Ok(vec![UserEvent::Registered(UserRegistered {
            user_id: cmd.user_id,
            username,
            email: email.into_inner(),
            password_hash: cmd.password_hash.clone(),
            role: cmd.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.user_id)?;

        if cmd.username.is_none() && cmd.email.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }

        let username = cmd
            .username
            .as_deref()
            .map(validate_username)
            .transpose()?
            .filter(|u| *u != self.username);
        let email = cmd
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()?
            .map(Email::into_inner)
            .filter(|e| *e != self.email);

        if username.is_none() && email.is_none() {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::ProfileUpdated(ProfileUpdated {
            user_id: cmd.user_id,
            username,
            email,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_password(&self, cmd: &ChangePassword) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.user_id)?;
        Self::ensure_hash(&cmd.password_hash)?;

        Ok(vec![UserEvent::PasswordChanged(PasswordChanged {
            user_id: cmd.user_id,
            password_hash: cmd.password_hash.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_role(&self, cmd: &ChangeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.user_id)?;

        if cmd.actor_id == self.id {
            return Err(DomainError::validation("you cannot change your own role"));
        }
        authorize_role_assignment(cmd.actor_role, self.role, cmd.role)
            .map_err(|_| DomainError::Unauthorized)?;

        if cmd.role == self.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleChanged(RoleChanged {
            user_id: cmd.user_id,
            from: self.role,
            to: cmd.role,
            changed_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_live(cmd.user_id)?;

        if cmd.actor_id == self.id {
            return Err(DomainError::validation("you cannot delete your own account"));
        }

        Ok(vec![UserEvent::Deleted(UserDeleted {
            user_id: cmd.user_id,
            deleted_by: cmd.actor_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
