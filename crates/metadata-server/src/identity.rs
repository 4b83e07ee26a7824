use anyhow::{bail, Context};
use metadata_core::{MetaError, Result, UserIdentity};
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Chess,
    Maglab,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chess" => Ok(ProviderKind::Chess),
            "maglab" => Ok(ProviderKind::Maglab),
            other => bail!("USER_PROVIDER: unknown identity provider {other:?}"),
        }
    }
}

/// Maps a verified token subject to a user identity. Selected once at
/// startup.
#[derive(Debug)]
pub enum IdentityProvider {
    /// Any authenticated subject is a valid user.
    Chess,
    /// Subjects must appear in a JSON roster (`user -> attributes`).
    Maglab {
        roster_path: PathBuf,
        roster: RwLock<HashMap<String, Map<String, JsonValue>>>,
    },
}

impl IdentityProvider {
    pub fn new(kind: ProviderKind, roster_path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(match kind {
            ProviderKind::Chess => IdentityProvider::Chess,
            ProviderKind::Maglab => IdentityProvider::Maglab {
                roster_path: roster_path.context("maglab provider requires a roster file")?,
                roster: RwLock::new(HashMap::new()),
            },
        })
    }

    pub fn init(&self) -> anyhow::Result<()> {
        match self {
            IdentityProvider::Chess => {
                info!("identity provider: chess");
            }
            IdentityProvider::Maglab {
                roster_path,
                roster,
            } => {
                let raw = std::fs::read(roster_path)
                    .with_context(|| format!("reading {}", roster_path.display()))?;
                let users: HashMap<String, Map<String, JsonValue>> = serde_json::from_slice(&raw)
                    .with_context(|| format!("parsing {}", roster_path.display()))?;
                info!(users = users.len(), "identity provider: maglab");
                *roster.write() = users;
            }
        }
        Ok(())
    }

    pub fn lookup(&self, user: &str) -> Result<UserIdentity> {
        match self {
            IdentityProvider::Chess => Ok(UserIdentity::new(user)),
            IdentityProvider::Maglab { roster, .. } => roster
                .read()
                .get(user)
                .map(|attrs| UserIdentity {
                    user: user.to_string(),
                    attributes: attrs.clone(),
                })
                .ok_or_else(|| MetaError::MissingIdentity(format!("unknown user {user}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses() {
        assert_eq!("CHESS".parse::<ProviderKind>().unwrap(), ProviderKind::Chess);
        assert_eq!("maglab".parse::<ProviderKind>().unwrap(), ProviderKind::Maglab);
        assert!("ldap".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn chess_accepts_any_user() {
        let p = IdentityProvider::new(ProviderKind::Chess, None).unwrap();
        p.init().unwrap();
        assert_eq!(p.lookup("bob").unwrap(), UserIdentity::new("bob"));
    }

    #[test]
    fn maglab_uses_roster() {
        let path = std::env::temp_dir().join(format!("maglab-roster-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"alice": {"group": "nmr"}}"#).unwrap();
        let p = IdentityProvider::new(ProviderKind::Maglab, Some(path.clone())).unwrap();
        p.init().unwrap();
        let alice = p.lookup("alice").unwrap();
        assert_eq!(alice.attributes["group"], JsonValue::from("nmr"));
        assert!(matches!(p.lookup("mallory"), Err(MetaError::MissingIdentity(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn maglab_requires_roster() {
        assert!(IdentityProvider::new(ProviderKind::Maglab, None).is_err());
        let p = IdentityProvider::new(
            ProviderKind::Maglab,
            Some(PathBuf::from("/nonexistent/roster.json")),
        )
        .unwrap();
        assert!(p.init().is_err());
    }
}
