use std::collections::BTreeMap;

use specta::Type;

/// Captured result of one `mscs` invocation.
///
/// Lines are kept exactly as the tool emitted them (minus the line terminator).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub exit_code: i32,
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One world as reported by `mscs status`, optionally enriched with its
/// `server.properties`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct WorldRecord {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub is_active: bool,
    pub players: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

impl WorldRecord {
    pub fn inactive(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            is_active: false,
            players: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub username: String,
    pub is_online: bool,
    pub is_whitelisted: bool,
    pub is_blacklisted: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Type)]
pub struct WorldsResponse {
    pub worlds: Vec<WorldRecord>,
}
