use pgshift_postgres::replication::subscription::{
    create_subscription_sql, disable_subscription_sql, enable_subscription_sql,
    lookup_subscription_sql,
};
use pgshift_postgres::replication::{session_started_at, subscription_lookup_pattern};
use tracing::{info, warn};

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::gateway::SqlGateway;

/// What the target knows about a migration of a given source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionLookup {
    /// A migration is in flight under this subscription.
    Found(String),
    /// No migration is in flight, a fresh one may start.
    Absent,
}

impl SubscriptionLookup {
    pub fn name(&self) -> Option<&str> {
        match self {
            SubscriptionLookup::Found(name) => Some(name),
            SubscriptionLookup::Absent => None,
        }
    }
}

/// Manages the subscription on the target.
#[derive(Debug)]
pub struct SubscriptionManager<'a, G> {
    gateway: &'a G,
}

impl<'a, G> SubscriptionManager<'a, G>
where
    G: SqlGateway,
{
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Finds the subscription of an in-flight migration of `source_database`.
    ///
    /// A probe that cannot complete is an error: without it there is no way to tell a fresh
    /// start from a resume.
    pub async fn lookup_subscription_name(
        &self,
        source_database: &str,
    ) -> MigrateResult<SubscriptionLookup> {
        let query = lookup_subscription_sql(&subscription_lookup_pattern(source_database)?);

        let Some(rows) = self.gateway.execute_query(&query, true).await? else {
            bail!(
                ErrorKind::SubscriptionProbeFailed,
                "Could not determine whether a migration is in progress",
                format!("query `{query}` failed on {}", self.gateway.target())
            );
        };

        let (names, foreign): (Vec<&str>, Vec<&str>) = rows
            .iter()
            .filter_map(|row| row.get(0))
            .partition(|name| session_started_at(source_database, name).is_some());
        if !foreign.is_empty() {
            info!(
                subscriptions = ?foreign,
                "ignoring subscriptions that do not belong to a migration of this database"
            );
        }
        if names.len() > 1 {
            warn!(subscriptions = ?names, "several migrations found, resuming the first one");
        }

        Ok(match names.first() {
            Some(name) => SubscriptionLookup::Found(name.to_string()),
            None => SubscriptionLookup::Absent,
        })
    }

    /// Creates the subscription, which immediately starts copying the published tables.
    pub async fn create_subscription(
        &self,
        subscription: &str,
        publication: &str,
        source_connection_url: &str,
    ) -> MigrateResult<bool> {
        info!(
            %subscription,
            %publication,
            endpoint = %self.gateway.target(),
            "creating subscription"
        );

        let sql = create_subscription_sql(subscription, source_connection_url, publication);
        let created = self.gateway.execute_query(&sql, false).await?.is_some();
        if !created {
            warn!(%subscription, "subscription was not created");
        }

        Ok(created)
    }

    /// Stops applying changes. The subscription and its slot are kept.
    pub async fn disable(&self, subscription: &str) -> MigrateResult<bool> {
        info!(%subscription, "disabling subscription");

        let sql = disable_subscription_sql(subscription);
        Ok(self.gateway.execute_query(&sql, false).await?.is_some())
    }

    /// Resumes applying changes from where the slot stopped.
    pub async fn enable(&self, subscription: &str) -> MigrateResult<bool> {
        info!(%subscription, "enabling subscription");

        let sql = enable_subscription_sql(subscription);
        Ok(self.gateway.execute_query(&sql, false).await?.is_some())
    }
}
