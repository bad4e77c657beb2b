//! Read-only grant status for a bare identity.
//!
//! Anyone holding just an identity string (a data processor, an auditor)
//! can check whether the grant behind it is live. No key is held, so no
//! mutating call can be expressed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crypto::Identity;
use crate::error::RecordResult;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GrantStatus {
    /// Revoked; takes precedence over publication.
    Revoked { at: u64 },
    Granted { at: u64 },
    Unpublished,
}

impl GrantStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    /// Suggested exit code for CLI: only a revocation is a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Revoked { .. } => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |at: u64| {
            i64::try_from(at)
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                .map_or_else(|| at.to_string(), |t| t.to_rfc3339())
        };
        match self {
            Self::Revoked { at } => write!(f, "Revoked at {}", render(*at)),
            Self::Granted { at } => write!(f, "Granted at {}", render(*at)),
            Self::Unpublished => f.write_str("Not published"),
        }
    }
}

/// Grant status together with the ledger height it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantReport {
    pub identity: Identity,
    pub status: GrantStatus,
    pub height: u64,
}

#[derive(Clone)]
pub struct StatusQuery {
    identity: Identity,
    ledger: Arc<dyn Ledger>,
}

impl fmt::Debug for StatusQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusQuery")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl StatusQuery {
    pub fn new(identity: Identity, ledger: Arc<dyn Ledger>) -> Self {
        Self { identity, ledger }
    }

    /// Parse `identity` and build a query for it.
    pub fn for_address(identity: &str, ledger: Arc<dyn Ledger>) -> RecordResult<Self> {
        Ok(Self::new(Identity::parse(identity)?, ledger))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub async fn is_published_at(&self) -> RecordResult<u64> {
        Ok(self.ledger.published_at(&self.identity).await?)
    }

    pub async fn is_revoked_at(&self) -> RecordResult<u64> {
        Ok(self.ledger.revoked_at(&self.identity).await?)
    }

    pub async fn grant_status(&self) -> RecordResult<GrantStatus> {
        let revoked = self.is_revoked_at().await?;
        if revoked > 0 {
            return Ok(GrantStatus::Revoked { at: revoked });
        }
        let published = self.is_published_at().await?;
        Ok(if published > 0 {
            GrantStatus::Granted { at: published }
        } else {
            GrantStatus::Unpublished
        })
    }

    pub async fn report(&self) -> RecordResult<GrantReport> {
        let height = self.ledger.block_height().await?;
        let status = self.grant_status().await?;
        tracing::debug!(identity = %self.identity, height, status = %status, "grant status resolved");
        Ok(GrantReport {
            identity: self.identity.clone(),
            status,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyMaterial, Signer};
    use crate::ledger::MemoryLedger;

    #[tokio::test]
    async fn test_status_transitions() {
        let ledger = Arc::new(MemoryLedger::new());
        let key = KeyMaterial::generate();
        let query = StatusQuery::new(key.identity().clone(), ledger.clone());

        assert_eq!(query.grant_status().await.unwrap(), GrantStatus::Unpublished);

        ledger.publish(&key).await.unwrap();
        let granted = query.grant_status().await.unwrap();
        assert!(granted.is_granted());
        assert_eq!(granted.exit_code(), 0);

        ledger.revoke(&key).await.unwrap();
        let revoked = query.grant_status().await.unwrap();
        assert!(matches!(revoked, GrantStatus::Revoked { .. }));
        assert_eq!(revoked.exit_code(), 1);

        let report = query.report().await.unwrap();
        assert_eq!(report.height, 2);
        assert_eq!(&report.identity, key.identity());
    }

    #[test]
    fn test_for_address_rejects_garbage() {
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        assert!(StatusQuery::for_address("not-an-address", ledger).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            GrantStatus::Granted { at: 0 }.to_string(),
            "Granted at 1970-01-01T00:00:00+00:00"
        );
        assert_eq!(GrantStatus::Unpublished.to_string(), "Not published");
    }
}
