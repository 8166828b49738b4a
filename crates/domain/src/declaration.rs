use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Immutable description of a callable tool, as stored by the registry
/// and declared to the model.  Identity is the `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Schema>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            response: None,
        }
    }
}

impl PartialEq for ToolDeclaration {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ToolDeclaration {}

impl Hash for ToolDeclaration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_the_name() {
        let a = ToolDeclaration::new("add", "adds");
        let b = ToolDeclaration::new("add", "a different description");
        assert_eq!(a, b);
        assert_ne!(a, ToolDeclaration::new("sub", "adds"));
    }

    #[test]
    fn json_omits_missing_schemas() {
        let json = serde_json::to_value(ToolDeclaration::new("ping", "")).unwrap();
        assert!(json.get("parameters").is_none());
        let back: ToolDeclaration = serde_json::from_value(json).unwrap();
        assert_eq!(back.name, "ping");
    }
}
