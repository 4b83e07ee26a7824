use crate::auth::KeyRing;
use crate::identity::ProviderKind;
use anyhow::{anyhow, bail, Context, Result};
use metadata_core::DEFAULT_SERVICE;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub service: String,
    pub db: String,
    pub collection: String,
    pub verbose: u8,
    pub provider: ProviderKind,
    pub maglab_users_file: Option<PathBuf>,
    pub keys: KeyRing,
    pub tls: Option<TlsPaths>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |k: &str, d: &str| get(k).filter(|v| !v.is_empty()).unwrap_or_else(|| d.into());

        let addr = or("METADATA_ADDR", "0.0.0.0:8300");
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("METADATA_ADDR: invalid address {addr:?}"))?;
        let verbose = or("VERBOSE", "0");
        let verbose: u8 = verbose
            .parse()
            .with_context(|| format!("VERBOSE: expected a small integer, got {verbose:?}"))?;
        let provider: ProviderKind = or("USER_PROVIDER", "chess").parse()?;
        let maglab_users_file = get("MAGLAB_USERS_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if provider == ProviderKind::Maglab && maglab_users_file.is_none() {
            bail!("USER_PROVIDER=maglab requires MAGLAB_USERS_FILE");
        }

        let keys = KeyRing {
            active: get("CAP_KEY_ACTIVE")
                .filter(|v| !v.is_empty())
                .map(|s| (or("CAP_KEY_ACTIVE_ID", "active"), s)),
            next: get("CAP_KEY_NEXT")
                .filter(|v| !v.is_empty())
                .map(|s| (or("CAP_KEY_NEXT_ID", "next"), s)),
        };

        let tls = match (get("TLS_CERT_PATH"), get("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(anyhow!("TLS_CERT_PATH and TLS_KEY_PATH must be set together")),
        };

        let collection = or("METADATA_COLLECTION", "meta");
        if collection.contains('.') {
            bail!("METADATA_COLLECTION must not contain '.'");
        }

        Ok(Self {
            addr,
            service: or("METADATA_SERVICE", DEFAULT_SERVICE),
            db: or("METADATA_DB", "foxden"),
            collection,
            verbose,
            provider,
            maglab_users_file,
            keys,
            tls,
        })
    }

    /// Store key for the configured collection: `<db>.<collection>`.
    pub fn collection_key(&self) -> String {
        format!("{}.{}", self.db, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = load(&[]).unwrap();
        assert_eq!(c.addr, "0.0.0.0:8300".parse::<SocketAddr>().unwrap());
        assert_eq!(c.service, "MetaData");
        assert_eq!(c.collection_key(), "foxden.meta");
        assert_eq!(c.verbose, 0);
        assert_eq!(c.provider, ProviderKind::Chess);
        assert!(c.keys.is_empty());
        assert!(c.tls.is_none());
    }

    #[test]
    fn overrides_and_keys() {
        let c = load(&[
            ("METADATA_ADDR", "127.0.0.1:9000"),
            ("METADATA_DB", "chess"),
            ("METADATA_COLLECTION", "records"),
            ("VERBOSE", "2"),
            ("CAP_KEY_ACTIVE", "s1"),
            ("CAP_KEY_NEXT", "s2"),
            ("CAP_KEY_NEXT_ID", "2026-10"),
        ])
        .unwrap();
        assert_eq!(c.collection_key(), "chess.records");
        assert_eq!(c.verbose, 2);
        assert_eq!(c.keys.active, Some(("active".into(), "s1".into())));
        assert_eq!(c.keys.next, Some(("2026-10".into(), "s2".into())));
    }

    #[test]
    fn invalid_values_fail() {
        assert!(load(&[("METADATA_ADDR", "nowhere")]).is_err());
        assert!(load(&[("VERBOSE", "loud")]).is_err());
        assert!(load(&[("USER_PROVIDER", "ldap")]).is_err());
        assert!(load(&[("USER_PROVIDER", "maglab")]).is_err());
        assert!(load(&[("TLS_CERT_PATH", "/tmp/c.pem")]).is_err());
        assert!(load(&[("METADATA_COLLECTION", "a.b")]).is_err());
    }
}
