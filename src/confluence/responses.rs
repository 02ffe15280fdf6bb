//! Serde models for the REST payloads the client consumes.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Space {
    pub id: i64,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub version: Option<Version>,
    #[serde(default)]
    pub ancestors: Vec<Ancestor>,
    pub body: Option<Body>,
}

impl Page {
    pub fn version_number(&self) -> u32 {
        self.version.as_ref().map(|v| v.number).unwrap_or(1)
    }

    /// The direct parent is the last entry of the ancestor chain.
    pub fn parent_id(&self) -> Option<&str> {
        self.ancestors.last().map(|a| a.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub number: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ancestor {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub value: String,
    pub representation: String,
}

/// Paged listing envelope; `limit`/`start` drive pagination.
#[derive(Debug, Clone, Deserialize)]
pub struct PageResults {
    pub results: Vec<Page>,
    pub start: Option<u32>,
    pub limit: Option<u32>,
    pub size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

/// Error envelope Confluence attaches to non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
}
