use std::fmt;

/// Routing key: one session per user per client type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    /// Application user identifier.
    pub user_id: String,
    /// Client kind.
    pub client_type: u8,
}

impl RouteKey {
    /// Build a key.
    pub fn new(user_id: impl Into<String>, client_type: u8) -> Self {
        Self { user_id: user_id.into(), client_type }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.client_type)
    }
}
