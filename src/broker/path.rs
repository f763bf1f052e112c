//! Fully qualified resource paths for messaging resources.
//!
//! Topics live at `projects/<project>/topics/<name>` and subscriptions at
//! `projects/<project>/subscriptions/<name>`. Callers may supply either a
//! short name or a full path; the last path segment is taken as the name.

use std::fmt;

/// Extract the short resource name from a name-or-path string.
fn short_name(input: &str) -> &str {
    input.rsplit('/').next().unwrap_or(input)
}

/// Handle to a topic: short name plus fully qualified path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPath {
    name: String,
    path: String,
}

impl TopicPath {
    /// Build a topic path from a project and a short name or full path.
    pub fn new(project: &str, name_or_path: &str) -> Self {
        let name = short_name(name_or_path).to_string();
        let path = format!("projects/{project}/topics/{name}");
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Handle to a subscription: short name plus fully qualified path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPath {
    name: String,
    path: String,
}

impl SubscriptionPath {
    /// Build a subscription path from a project and a short name or full path.
    pub fn new(project: &str, name_or_path: &str) -> Self {
        let name = short_name(name_or_path).to_string();
        let path = format!("projects/{project}/subscriptions/{name}");
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
