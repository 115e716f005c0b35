use serde::{Deserialize, Serialize};

/// A server-side configuration group such as "Browser".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationGroup {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub items: Vec<ConfigurationItem>,
}

/// A value inside a configuration group such as "Chrome".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    pub id: i64,
    pub title: String,
}

impl ConfigurationGroup {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, id: i64, title: impl Into<String>) -> Self {
        self.items.push(ConfigurationItem {
            id,
            title: title.into(),
        });
        self
    }

    pub fn find_item(&self, title: &str) -> Option<&ConfigurationItem> {
        self.items.iter().find(|item| item.title == title)
    }
}
