use serde::{Deserialize, Serialize};

/// A person the recognizer can be trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i32,
    pub fullname: String,
    /// Student number, when one is on file.
    #[serde(default)]
    pub nim: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// Resolves recognizer labels to people.
pub trait IdentityStore: Send {
    /// The active record for `id`; archived records never resolve.
    fn find_one(&self, id: i32) -> Option<UserRecord>;
}
