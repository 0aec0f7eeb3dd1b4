//! Seed settings.

use serde::Deserialize;

/// Credentials of the superuser created in the global tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RootUserConfig {
    pub username: String,
    pub password: String,
    /// Defaults to `<username>@<global tenant domain>`.
    pub email: Option<String>,
}

impl Default for RootUserConfig {
    fn default() -> Self {
        Self {
            username: "root".into(),
            password: String::new(),
            email: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapConfig {
    pub root_user: RootUserConfig,
}
