//! `IDENTITY_INSERT` bracketing for a write session.

use tracing::debug;

use crate::core::{quote_ident, TargetWriter, WriteSession};
use crate::error::Result;

/// Enables explicit identity values for one table on one session.
///
/// When the table has no identity column both [`begin`](Self::begin) and
/// [`end`](Self::end) are no-ops. Call each once per session, never per row.
#[derive(Debug, Clone)]
pub struct IdentityGuard {
    table: String,
    enabled: bool,
}

impl IdentityGuard {
    /// Ask the destination whether `table` has an identity column.
    pub async fn resolve(target: &dyn TargetWriter, table: &str) -> Result<Self> {
        let enabled = target.has_identity_column(table).await?;
        Ok(Self::new(table, enabled))
    }

    pub fn new(table: impl Into<String>, enabled: bool) -> Self {
        Self {
            table: table.into(),
            enabled,
        }
    }

    /// Whether the table has an identity column.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allow explicit values in the identity column.
    pub async fn begin(&self, session: &mut dyn WriteSession) -> Result<()> {
        if self.enabled {
            debug!("{}: IDENTITY_INSERT ON", self.table);
            session.execute(&self.statement("ON")).await?;
        }
        Ok(())
    }

    /// Restore generated identity values.
    pub async fn end(&self, session: &mut dyn WriteSession) -> Result<()> {
        if self.enabled {
            debug!("{}: IDENTITY_INSERT OFF", self.table);
            session.execute(&self.statement("OFF")).await?;
        }
        Ok(())
    }

    fn statement(&self, state: &str) -> String {
        format!("SET IDENTITY_INSERT {} {}", quote_ident(&self.table), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTarget, Statement};

    #[tokio::test]
    async fn test_guard_brackets_session_when_identity() {
        let target = FakeTarget::new().with_identity("Orders");
        let guard = IdentityGuard::resolve(&target, "Orders").await.unwrap();
        assert!(guard.is_enabled());

        let mut session = target.open_fake_session();
        guard.begin(&mut session).await.unwrap();
        guard.end(&mut session).await.unwrap();

        assert_eq!(
            target.statements(),
            vec![
                Statement::Execute("SET IDENTITY_INSERT [Orders] ON".into()),
                Statement::Execute("SET IDENTITY_INSERT [Orders] OFF".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_guard_is_noop_without_identity() {
        let target = FakeTarget::new();
        let guard = IdentityGuard::resolve(&target, "Notes").await.unwrap();
        assert!(!guard.is_enabled());

        let mut session = target.open_fake_session();
        guard.begin(&mut session).await.unwrap();
        guard.end(&mut session).await.unwrap();
        assert!(target.statements().is_empty());
    }
}
