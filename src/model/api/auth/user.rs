use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::{api::id::ApiId, db::user::User, mongodb::Id};

/// A kind of user of our application, having defined rights.
pub trait Role {
    /// The rights of this user type.
    const RIGHTS: Rights;
}

/// Marker for tokens held by voters.
pub struct Voter;

/// Marker for tokens held by RT administrators.
pub struct Admin;

impl Role for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

impl Role for Admin {
    const RIGHTS: Rights = Rights::Admin;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// An authenticated identity, as seen by the voting protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Id,
    pub rights: Rights,
    pub rt_id: Id,
}

impl Caller {
    /// Is this caller an administrator of the given RT?
    pub fn administers(&self, rt_id: Id) -> bool {
        self.rights == Rights::Admin && self.rt_id == rt_id
    }
}

/// A signed-in user, as reported back to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescription {
    pub id: ApiId,
    pub username: String,
    pub rights: Rights,
    pub rt_id: ApiId,
}

impl From<&User> for UserDescription {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.into(),
            username: user.username.clone(),
            rights: user.rights,
            rt_id: user.rt_id.into(),
        }
    }
}
