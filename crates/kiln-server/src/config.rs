//! Server configuration.
//!
//! Loaded in order (later sources win):
//! 1. Built-in defaults
//! 2. `kiln.toml` (or the file named by `KILN_CONFIG`), if present
//! 3. `KILN__`-prefixed environment variables, e.g.
//!    `KILN__CERTIFICATE__KEYSIZE=4096` or `KILN__ROOTUSER__PASSWORD=...`

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use kiln_auth::AuthConfig;
use kiln_bootstrap::{BootstrapConfig, RootUserConfig};
use kiln_core::models::certificate::CertificateConfig;
use kiln_db::DbConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub database: DbConfig,
    /// Subject defaults for every issued certificate.
    pub certificate: CertificateConfig,
    #[serde(alias = "rootuser")]
    pub root_user: RootUserConfig,
    pub storage: StorageConfig,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub bind: String,
    #[serde(alias = "requesttimeoutsecs")]
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Certificates are mirrored to disk under `path` when it is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

/// Serialized form of [`AuthConfig`]. Keys may be given inline or as file
/// paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    #[serde(alias = "jwtprivatekey")]
    pub jwt_private_key: Option<String>,
    #[serde(alias = "jwtprivatekeyfile")]
    pub jwt_private_key_file: Option<PathBuf>,
    #[serde(alias = "jwtpublickey")]
    pub jwt_public_key: Option<String>,
    #[serde(alias = "jwtpublickeyfile")]
    pub jwt_public_key_file: Option<PathBuf>,
    pub issuer: String,
    #[serde(alias = "accesstokenlifetimesecs")]
    pub access_token_lifetime_secs: u64,
    #[serde(alias = "refreshtokenlifetimesecs")]
    pub refresh_token_lifetime_secs: u64,
    pub pepper: Option<String>,
    /// 64 hex characters.
    #[serde(alias = "twofactorkey")]
    pub two_factor_key: Option<String>,
    #[serde(alias = "minpasswordlength")]
    pub min_password_length: usize,
    #[serde(alias = "apikeyprefixlength")]
    pub api_key_prefix_length: usize,
    #[serde(alias = "totpissuer")]
    pub totp_issuer: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        let defaults = AuthConfig::default();
        Self {
            jwt_private_key: None,
            jwt_private_key_file: None,
            jwt_public_key: None,
            jwt_public_key_file: None,
            issuer: defaults.jwt_issuer,
            access_token_lifetime_secs: defaults.access_token_lifetime_secs,
            refresh_token_lifetime_secs: defaults.refresh_token_lifetime_secs,
            pepper: None,
            two_factor_key: None,
            min_password_length: defaults.min_password_length,
            api_key_prefix_length: defaults.api_key_prefix_length,
            totp_issuer: defaults.totp_issuer,
        }
    }
}

impl AuthSettings {
    /// Resolve key files and decode the two-factor key.
    pub fn to_auth_config(&self) -> Result<AuthConfig, ConfigError> {
        let private_key = read_key(
            "auth.jwtPrivateKey",
            &self.jwt_private_key,
            &self.jwt_private_key_file,
        )?;
        let public_key = read_key(
            "auth.jwtPublicKey",
            &self.jwt_public_key,
            &self.jwt_public_key_file,
        )?;
        let two_factor_encryption_key = self
            .two_factor_key
            .as_deref()
            .map(decode_two_factor_key)
            .transpose()?;

        Ok(AuthConfig {
            jwt_private_key_pem: private_key,
            jwt_public_key_pem: public_key,
            access_token_lifetime_secs: self.access_token_lifetime_secs,
            refresh_token_lifetime_secs: self.refresh_token_lifetime_secs,
            jwt_issuer: self.issuer.clone(),
            pepper: self.pepper.clone().filter(|pepper| !pepper.is_empty()),
            min_password_length: self.min_password_length,
            two_factor_encryption_key,
            totp_issuer: self.totp_issuer.clone(),
            api_key_prefix_length: self.api_key_prefix_length,
        })
    }
}

fn read_key(
    key: &str,
    inline: &Option<String>,
    file: &Option<PathBuf>,
) -> Result<String, ConfigError> {
    match (inline, file) {
        (Some(pem), _) if !pem.trim().is_empty() => Ok(pem.clone()),
        (_, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Message(format!("{key}File: cannot read {}: {e}", path.display()))
        }),
        _ => Err(ConfigError::Message(format!(
            "{key} or {key}File must be set"
        ))),
    }
}

fn decode_two_factor_key(raw: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| ConfigError::Message(format!("auth.twoFactorKey: {e}")))?;
    bytes.try_into().map_err(|_| {
        ConfigError::Message("auth.twoFactorKey must decode to exactly 32 bytes".into())
    })
}

impl ServerConfig {
    /// Load from `KILN_CONFIG` (default `kiln`, any supported extension)
    /// plus the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KILN_CONFIG").unwrap_or_else(|_| "kiln".to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("KILN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Message("server.bind must not be empty".into()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "server.requestTimeoutSecs must be > 0".into(),
            ));
        }
        if self.certificate.expires_in_years > 100 {
            return Err(ConfigError::Message(
                "certificate.expiresInYears must be at most 100".into(),
            ));
        }
        if self.auth.access_token_lifetime_secs == 0 {
            return Err(ConfigError::Message(
                "auth.accessTokenLifetimeSecs must be > 0".into(),
            ));
        }
        if self.auth.min_password_length == 0 {
            return Err(ConfigError::Message(
                "auth.minPasswordLength must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn bootstrap(&self) -> BootstrapConfig {
        BootstrapConfig {
            root_user: self.root_user.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use kiln_core::models::certificate::KeySize;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.url, "mem://");
        assert_eq!(config.certificate.key_size, KeySize::Rsa2048);
        assert_eq!(config.root_user.username, "root");
    }

    #[test]
    fn reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "127.0.0.1:9443"

[certificate]
country = "DE"
organization = "Example"

[storage]
path = "/var/lib/kiln/certs"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9443");
        assert_eq!(config.certificate.country, "DE");
        assert_eq!(config.certificate.organization, "Example");
        assert_eq!(
            config.storage.path,
            Some(PathBuf::from("/var/lib/kiln/certs"))
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load_from("/nonexistent/kiln-config").unwrap();
        assert_eq!(config.server.request_timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = ServerConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_keys_are_required() {
        let err = AuthSettings::default().to_auth_config().unwrap_err();
        assert!(err.to_string().contains("auth.jwtPrivateKey"));
    }

    #[test]
    fn two_factor_key_must_be_32_bytes() {
        let settings = AuthSettings {
            jwt_private_key: Some("private".into()),
            jwt_public_key: Some("public".into()),
            two_factor_key: Some("abcd".into()),
            ..Default::default()
        };
        assert!(settings.to_auth_config().is_err());

        let settings = AuthSettings {
            two_factor_key: Some("2a".repeat(32)),
            ..settings
        };
        let config = settings.to_auth_config().unwrap();
        assert_eq!(config.two_factor_encryption_key, Some([0x2a; 32]));
    }

    #[test]
    fn auth_settings_carry_into_the_auth_config() {
        let settings = AuthSettings {
            jwt_private_key: Some("private".into()),
            jwt_public_key: Some("public".into()),
            issuer: "kiln-staging".into(),
            pepper: Some(String::new()),
            totp_issuer: "Kiln Staging".into(),
            api_key_prefix_length: 8,
            ..Default::default()
        };
        let config = settings.to_auth_config().unwrap();
        assert_eq!(config.jwt_private_key_pem, "private");
        assert_eq!(config.jwt_issuer, "kiln-staging");
        assert_eq!(config.totp_issuer, "Kiln Staging");
        assert_eq!(config.api_key_prefix_length, 8);
        assert_eq!(config.pepper, None);
    }
}
