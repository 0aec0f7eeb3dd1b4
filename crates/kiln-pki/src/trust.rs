//! OS trust-store installation.

use std::fmt;
use std::future::Future;
use std::path::Path;

use kiln_core::{AppContext, Diagnostics, KilnError, KilnResult};
use tokio::process::Command;
use tracing::{info, warn};

const MODULE: &str = "pki";

/// Trust store a certificate is installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStore {
    Root,
    Ca,
    WebHosting,
}

impl TrustStore {
    /// Store name as `certutil` spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Ca => "CA",
            Self::WebHosting => "WebHosting",
        }
    }
}

impl fmt::Display for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait TrustBackend: Send + Sync {
    fn install(
        &self,
        ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> impl Future<Output = KilnResult<()>> + Send;

    fn uninstall(
        &self,
        ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> impl Future<Output = KilnResult<()>> + Send;
}

/// Platforms without a supported trust store. Succeeds, leaving a
/// `not_implemented` error in the diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrust;

impl NoopTrust {
    fn skip(operation: &str, pem_path: &Path, store: TrustStore, diagnostics: &mut Diagnostics) {
        let err = KilnError::NotImplemented(format!(
            "trust store {operation} ({store}) for {}",
            pem_path.display()
        ));
        warn!(path = %pem_path.display(), store = %store, "Trust store not supported here");
        diagnostics.record(MODULE, &err);
    }
}

impl TrustBackend for NoopTrust {
    async fn install(
        &self,
        _ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        Self::skip("install", pem_path, store, diagnostics);
        Ok(())
    }

    async fn uninstall(
        &self,
        _ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        Self::skip("uninstall", pem_path, store, diagnostics);
        Ok(())
    }
}

/// `certutil -enterprise -f -v -{AddStore|RemoveStore} <store> <path>`.
#[derive(Debug, Clone)]
pub struct WindowsCertutil {
    program: String,
}

impl Default for WindowsCertutil {
    fn default() -> Self {
        Self {
            program: "certutil".into(),
        }
    }
}

impl WindowsCertutil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` instead of `certutil`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(
        &self,
        ctx: &AppContext,
        verb: &str,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        let command = format!(
            "{} -enterprise -f -v {verb} {store} {}",
            self.program,
            pem_path.display()
        );
        let output = ctx
            .run(async {
                Command::new(&self.program)
                    .args(["-enterprise", "-f", "-v", verb, store.as_str()])
                    .arg(pem_path)
                    .kill_on_drop(true)
                    .output()
                    .await
                    .map_err(|e| KilnError::External {
                        command: command.clone(),
                        stderr: e.to_string(),
                    })
            })
            .await;
        let result = output.and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                Err(KilnError::External {
                    command: command.clone(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        });
        diagnostics.capture(MODULE, result)?;
        diagnostics.add_path_entry_with_metadata(
            format!("trust-{}", verb.trim_start_matches('-').to_ascii_lowercase()),
            MODULE,
            serde_json::json!({ "store": store.as_str(), "path": pem_path.display().to_string() }),
        );
        info!(store = %store, path = %pem_path.display(), verb, "Updated trust store");
        Ok(())
    }
}

impl TrustBackend for WindowsCertutil {
    async fn install(
        &self,
        ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        self.run(ctx, "-AddStore", pem_path, store, diagnostics).await
    }

    async fn uninstall(
        &self,
        ctx: &AppContext,
        pem_path: &Path,
        store: TrustStore,
        diagnostics: &mut Diagnostics,
    ) -> KilnResult<()> {
        self.run(ctx, "-RemoveStore", pem_path, store, diagnostics).await
    }
}

#[cfg(windows)]
pub type DefaultTrustBackend = WindowsCertutil;
#[cfg(not(windows))]
pub type DefaultTrustBackend = NoopTrust;
