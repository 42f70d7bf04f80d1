//! Roles and the capabilities they resolve to.

use serde::{Deserialize, Serialize};

/// Role assigned to every user of the back office.
///
/// Roles are stored server-side and never taken from client input. Views and
/// route guards dispatch on [`Capability`] and [`Dashboard`], not on role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access to users, tasks, documents and hours.
    Admin,
    /// Staff member with assigned tasks.
    Employee,
    /// Default role for newly registered accounts.
    #[default]
    Member,
}

/// A single permission granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// List, edit and delete users.
    ManageUsers,
    /// Create, edit, delete and export every task.
    ManageTasks,
    /// See tasks assigned to oneself.
    ViewOwnTasks,
    /// List and delete uploaded documents.
    ManageDocuments,
    /// Upload documents.
    UploadDocuments,
    /// See work hours and presence of every user.
    ViewAllHours,
    /// See one's own work hours.
    ViewOwnHours,
    /// Join the presence channel and accrue hours.
    TrackPresence,
}

impl Capability {
    /// All capability variants for iteration.
    pub const ALL: [Capability; 8] = [
        Capability::ManageUsers,
        Capability::ManageTasks,
        Capability::ViewOwnTasks,
        Capability::ManageDocuments,
        Capability::UploadDocuments,
        Capability::ViewAllHours,
        Capability::ViewOwnHours,
        Capability::TrackPresence,
    ];
}

/// Dashboard a user lands on after signing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dashboard {
    Admin,
    Employee,
    Member,
}

impl Role {
    /// All role variants for iteration.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Employee, Role::Member];

    /// Capabilities granted to this role.
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Role::Admin => &Capability::ALL,
            Role::Employee => &[
                Capability::ViewOwnTasks,
                Capability::UploadDocuments,
                Capability::ViewOwnHours,
                Capability::TrackPresence,
            ],
            Role::Member => &[
                Capability::UploadDocuments,
                Capability::ViewOwnHours,
                Capability::TrackPresence,
            ],
        }
    }

    /// Check whether this role grants a capability.
    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn dashboard(self) -> Dashboard {
        match self {
            Role::Admin => Dashboard::Admin,
            Role::Employee => Dashboard::Employee,
            Role::Member => Dashboard::Member,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "employee" => Ok(Role::Employee),
            "member" => Ok(Role::Member),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
