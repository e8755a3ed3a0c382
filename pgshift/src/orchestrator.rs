//! The migration state machine.
//!
//! A run moves through [`MigrationPhase`]s strictly in order. Where it starts is decided by
//! looking for the subscription of an in-flight migration on the target:
//!
//! - no subscription: the schema is restored with primary keys only, then the publication and
//!   the subscription are created, which starts the initial copy;
//! - a subscription: the run resumes by waiting for the initial copy to finish.
//!
//! Once the copy is done, the subscription is paused while the remaining indexes and
//! constraints are restored, then resumed for steady-state streaming.

use std::fmt;

use pgshift_config::shared::{MigratorConfig, ProbeFailureAction};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::bail;
use crate::bootstrap::provision_replication_role;
use crate::catalog::{SchemaSet, SourceCatalog};
use crate::dump::{DumpDocument, DumpExtractor, DumpSection};
use crate::error::{ErrorKind, MigrateResult};
use crate::gateway::{SqlGateway, TransactionOutcome};
use crate::replication::publication::PublicationManager;
use crate::replication::subscription::{SubscriptionLookup, SubscriptionManager};
use crate::replication::sync::{SyncOutcome, SyncPoller};
use crate::rewrite::{SnapshotRewriter, rewriter_for, strip_restrict_markers, strip_schema_create};
use crate::session::{Clock, MigrationSession, system_clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    NotStarted,
    /// Provisioning the replication role on the source.
    Bootstrapping,
    /// Restoring the schema and primary keys, then wiring publication and subscription.
    BulkCopying,
    AwaitingInitialSync,
    /// Restoring the deferred indexes and constraints with the subscription paused.
    FinalizingConstraints,
    Steady,
    Aborted,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::NotStarted => "not_started",
            MigrationPhase::Bootstrapping => "bootstrapping",
            MigrationPhase::BulkCopying => "bulk_copying",
            MigrationPhase::AwaitingInitialSync => "awaiting_initial_sync",
            MigrationPhase::FinalizingConstraints => "finalizing_constraints",
            MigrationPhase::Steady => "steady",
            MigrationPhase::Aborted => "aborted",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The subscription is streaming and every constraint is in place.
    Completed,
    /// No subscription existed after bootstrap, so there was nothing to wait for.
    NoReplicationRunning,
}

/// Summary of a run that did not abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,
    /// Every phase entered, in order, starting with [`MigrationPhase::NotStarted`].
    pub phases: Vec<MigrationPhase>,
    pub subscription_name: Option<String>,
    /// Set when this run started the migration rather than resuming it.
    pub session: Option<MigrationSession>,
}

/// Drives one migration from the source to the target.
pub struct MigrationOrchestrator<G, D> {
    config: MigratorConfig,
    source: G,
    target: G,
    dump: D,
    rewriter: Box<dyn SnapshotRewriter>,
    clock: Clock,
    phases: Vec<MigrationPhase>,
}

impl<G, D> MigrationOrchestrator<G, D>
where
    G: SqlGateway,
    D: DumpExtractor,
{
    pub fn new(config: MigratorConfig, source: G, target: G, dump: D) -> Self {
        let rewriter = rewriter_for(config.rewrite);

        Self {
            config,
            source,
            target,
            dump,
            rewriter,
            clock: system_clock,
            phases: vec![MigrationPhase::NotStarted],
        }
    }

    /// Replaces the clock the session name is derived from.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(MigrationPhase::NotStarted)
    }

    pub fn phases(&self) -> &[MigrationPhase] {
        &self.phases
    }

    /// Runs the migration from wherever the target says it stands.
    ///
    /// An error leaves the orchestrator in [`MigrationPhase::Aborted`].
    pub async fn run(&mut self) -> MigrateResult<MigrationReport> {
        info!(
            source = %self.config.source,
            destination = %self.config.target,
            "starting migration"
        );

        let result = self.drive().await;
        if let Err(err) = &result {
            self.enter(MigrationPhase::Aborted);
            error!(error = %err, "migration aborted");
        }

        result
    }

    async fn drive(&mut self) -> MigrateResult<MigrationReport> {
        let excluded_schemas = self.config.excluded_schemas.clone();
        let infos = SourceCatalog::new(&self.source)
            .retrieve_db_infos(excluded_schemas.as_deref())
            .await?;

        let schemas = SchemaSet::from_db_infos(&infos, excluded_schemas.as_deref());
        if schemas
            .user_schemas(&self.config.dump.metadata_schemas)
            .next()
            .is_none()
        {
            bail!(
                ErrorKind::NoEligibleSchemas,
                "No schema left to migrate",
                format!(
                    "database {}, excluded schemas: {:?}",
                    self.config.source.database, excluded_schemas
                )
            );
        }

        let source_database = self.config.source.database.clone();

        let mut session = None;
        match SubscriptionManager::new(&self.target)
            .lookup_subscription_name(&source_database)
            .await?
        {
            SubscriptionLookup::Absent => {
                session = Some(self.establish_replication(&schemas).await?);
            }
            SubscriptionLookup::Found(subscription) => {
                info!(%subscription, "migration already in progress, resuming");
            }
        }

        let subscription = match SubscriptionManager::new(&self.target)
            .lookup_subscription_name(&source_database)
            .await?
        {
            SubscriptionLookup::Found(subscription) => subscription,
            SubscriptionLookup::Absent => {
                info!("No replication running, exiting");
                return Ok(self.report(MigrationOutcome::NoReplicationRunning, None, session));
            }
        };

        self.enter(MigrationPhase::AwaitingInitialSync);
        self.await_initial_sync(&subscription).await?;

        self.enter(MigrationPhase::FinalizingConstraints);
        self.finalize_constraints(&schemas, &subscription).await?;

        self.enter(MigrationPhase::Steady);
        info!(%subscription, "migration complete, subscription is streaming");

        Ok(self.report(
            MigrationOutcome::Completed,
            Some(subscription),
            session,
        ))
    }

    /// Bootstraps the source, restores the schema with primary keys on the target and starts
    /// replication under a fresh session.
    async fn establish_replication(
        &mut self,
        schemas: &SchemaSet,
    ) -> MigrateResult<MigrationSession> {
        self.enter(MigrationPhase::Bootstrapping);
        match &self.config.replication_role {
            Some(role) => {
                provision_replication_role(
                    &self.source,
                    role,
                    schemas,
                    &self.config.dump.metadata_schemas,
                )
                .await?;
            }
            None => info!("no replication role configured, skipping provisioning"),
        }

        self.enter(MigrationPhase::BulkCopying);
        let pre_data = self.dump_section(schemas, DumpSection::PreData).await?;
        self.restore(DumpSection::PreData, "schema", &strip_schema_create(&pre_data))
            .await?;

        let post_data = self.dump_section(schemas, DumpSection::PostData).await?;
        let primary_keys = self.rewriter.extract_primary_key_statements(&post_data);
        self.restore(DumpSection::PostData, "primary keys", &primary_keys)
            .await?;

        let session = MigrationSession::start(&self.config.source.database, self.clock);
        let publication = session.publication_name()?;
        let subscription = session.subscription_name()?;
        info!(session = %session.unique_name, "replication session started");

        let publications = PublicationManager::new(&self.source);
        publications.create_publication(&publication).await?;
        let summary = publications
            .attach_all_eligible_tables(
                &publication,
                schemas.excluded_clause(),
                &self.config.dump.metadata_schemas,
                &self.excluded_table_names(),
            )
            .await?;
        info!(
            %publication,
            attached = summary.attached.len(),
            failed = summary.failed.len(),
            "publication populated"
        );

        SubscriptionManager::new(&self.target)
            .create_subscription(
                &subscription,
                &publication,
                self.config.replication_source_url.expose_secret(),
            )
            .await?;

        Ok(session)
    }

    async fn await_initial_sync(&self, subscription: &str) -> MigrateResult<()> {
        let outcome = SyncPoller::new(&self.target, &self.config.sync, self.excluded_table_names())
            .await_initial_sync(subscription)
            .await;

        let SyncOutcome::ProbeFailed {
            attempts,
            last_error,
        } = outcome
        else {
            return Ok(());
        };

        match self.config.sync.on_probe_failure {
            ProbeFailureAction::Proceed => {
                warn!(
                    %subscription,
                    attempts,
                    error = %last_error,
                    "initial sync could not be confirmed, finalizing constraints anyway"
                );
                Ok(())
            }
            ProbeFailureAction::Abort => bail!(
                ErrorKind::SyncProbeFailed,
                "Initial sync could not be confirmed",
                format!("subscription {subscription}, {attempts} failed probes, last error: {last_error}")
            ),
        }
    }

    /// Restores everything but primary keys while the subscription is paused.
    async fn finalize_constraints(
        &self,
        schemas: &SchemaSet,
        subscription: &str,
    ) -> MigrateResult<()> {
        let subscriptions = SubscriptionManager::new(&self.target);

        if !subscriptions.disable(subscription).await? {
            warn!(%subscription, "subscription could not be disabled");
        }

        let post_data = self.dump_section(schemas, DumpSection::PostData).await?;
        let deferred = self.rewriter.strip_primary_key_statements(&post_data);
        self.restore(DumpSection::PostData, "indexes and constraints", &deferred)
            .await?;

        if !subscriptions.enable(subscription).await? {
            warn!(%subscription, "subscription could not be enabled");
        }

        Ok(())
    }

    async fn dump_section(
        &self,
        schemas: &SchemaSet,
        section: DumpSection,
    ) -> MigrateResult<DumpDocument> {
        let document = self.dump.dump(&self.config.source, schemas, section).await?;

        Ok(strip_restrict_markers(&document))
    }

    /// Applies `document` on the target in one transaction. A rolled back restore is logged
    /// and the run carries on.
    async fn restore(
        &self,
        section: DumpSection,
        content: &'static str,
        document: &DumpDocument,
    ) -> MigrateResult<TransactionOutcome> {
        if document.is_blank() {
            info!(%section, content, "nothing to restore");
            return Ok(TransactionOutcome::Committed);
        }

        info!(
            %section,
            content,
            lines = document.len(),
            endpoint = %self.target.target(),
            "restoring dump"
        );

        let outcome = self.target.execute_transactional(&document.to_sql()).await?;
        match outcome {
            TransactionOutcome::Committed => info!(%section, content, "restore committed"),
            TransactionOutcome::RolledBack => {
                error!(%section, content, "restore rolled back, continuing")
            }
        }

        Ok(outcome)
    }

    fn excluded_table_names(&self) -> Vec<String> {
        self.config
            .dump
            .excluded_table_names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    fn enter(&mut self, phase: MigrationPhase) {
        info!(%phase, "entering phase");
        self.phases.push(phase);
    }

    fn report(
        &self,
        outcome: MigrationOutcome,
        subscription_name: Option<String>,
        session: Option<MigrationSession>,
    ) -> MigrationReport {
        MigrationReport {
            outcome,
            phases: self.phases.clone(),
            subscription_name,
            session,
        }
    }
}

#[cfg(test)]
mod tests {
    use pgshift_config::shared::ReplicationRoleConfig;

    use super::*;
    use crate::test_utils::gateway::StubResponse;
    use crate::test_utils::scenario::{
        MigrationScenario, SESSION_PUBLICATION, SESSION_SUBSCRIPTION, found, not_found,
    };

    #[tokio::test(start_paused = true)]
    async fn fresh_run_walks_every_phase() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found(), found()]);

        let mut orchestrator = scenario.orchestrator();
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Completed);
        assert_eq!(
            report.phases,
            vec![
                MigrationPhase::NotStarted,
                MigrationPhase::Bootstrapping,
                MigrationPhase::BulkCopying,
                MigrationPhase::AwaitingInitialSync,
                MigrationPhase::FinalizingConstraints,
                MigrationPhase::Steady,
            ]
        );
        assert_eq!(report.subscription_name.as_deref(), Some(SESSION_SUBSCRIPTION));
        assert_eq!(
            report.session.map(|session| session.unique_name),
            Some("db_primary_20240309_070501".to_string())
        );
        assert_eq!(
            scenario.dump.sections(),
            vec![
                DumpSection::PreData,
                DumpSection::PostData,
                DumpSection::PostData
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restores_schema_then_primary_keys_then_the_rest() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found(), found()]);

        scenario.orchestrator().run().await.unwrap();

        let transactions = scenario.target.transactions();
        assert_eq!(transactions.len(), 3);

        let schema = &transactions[0];
        assert!(schema.contains("CREATE TABLE included.table_to_replicate ("));
        assert!(!schema.contains("CREATE SCHEMA public;"));
        assert!(!schema.contains("\\restrict"));

        let primary_keys = &transactions[1];
        assert!(primary_keys.contains("ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);"));
        assert!(!primary_keys.contains("CREATE INDEX"));
        assert!(!primary_keys.contains("FOREIGN KEY"));

        let deferred = &transactions[2];
        assert!(deferred.contains("CREATE INDEX table_to_replicate_name_idx"));
        assert!(deferred.contains("FOREIGN KEY (parent_id)"));
        assert!(!deferred.contains("PRIMARY KEY"));
        assert!(!deferred.contains("\\unrestrict"));
    }

    #[tokio::test(start_paused = true)]
    async fn publication_and_subscription_use_the_session_name() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found(), found()]);

        scenario.orchestrator().run().await.unwrap();

        assert!(
            scenario
                .source
                .executed(&format!("CREATE PUBLICATION {SESSION_PUBLICATION}"))
        );
        let subscriptions = scenario.target.statements_starting_with("CREATE SUBSCRIPTION");
        assert_eq!(subscriptions.len(), 1);
        assert!(subscriptions[0].contains(&format!(
            "CREATE SUBSCRIPTION {SESSION_SUBSCRIPTION} CONNECTION 'postgresql://replicator@source:5432/db_primary' PUBLICATION {SESSION_PUBLICATION}"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_is_paused_around_constraint_restore() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![found()]);

        scenario.orchestrator().run().await.unwrap();

        let toggles = scenario.target.statements_starting_with("ALTER SUBSCRIPTION");
        assert_eq!(
            toggles,
            vec![
                format!("ALTER SUBSCRIPTION {SESSION_SUBSCRIPTION} DISABLE"),
                format!("ALTER SUBSCRIPTION {SESSION_SUBSCRIPTION} ENABLE"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resume_skips_dump_restore_and_publication() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![found()]);

        let report = scenario.orchestrator().run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Completed);
        assert!(report.session.is_none());
        assert!(!report.phases.contains(&MigrationPhase::Bootstrapping));
        assert!(!report.phases.contains(&MigrationPhase::BulkCopying));
        assert_eq!(scenario.dump.sections(), vec![DumpSection::PostData]);
        assert!(scenario.source.statements_starting_with("CREATE PUBLICATION").is_empty());
        assert!(scenario.target.statements_starting_with("CREATE SUBSCRIPTION").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_subscription_after_bootstrap_is_benign() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found()]);

        let report = scenario.orchestrator().run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::NoReplicationRunning);
        assert!(report.subscription_name.is_none());
        assert!(!report.phases.contains(&MigrationPhase::AwaitingInitialSync));
        assert_eq!(
            scenario.target.times_executed(&scenario.pending_query()),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_aborts_before_any_change() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![StubResponse::Fail]);

        let mut orchestrator = scenario.orchestrator();
        let err = orchestrator.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SubscriptionProbeFailed);
        assert_eq!(orchestrator.phase(), MigrationPhase::Aborted);
        assert!(scenario.dump.calls().is_empty());
        assert!(scenario.target.transactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_target_aborts() {
        let scenario = MigrationScenario::new(None);
        scenario.target.set_unreachable(true);

        let mut orchestrator = scenario.orchestrator();
        let err = orchestrator.run().await.unwrap_err();

        assert!(err.is_connectivity());
        assert_eq!(
            orchestrator.phases(),
            &[MigrationPhase::NotStarted, MigrationPhase::Aborted]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rolled_back_restore_does_not_stop_the_run() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found(), found()]);
        scenario.target.reject_batches_containing("CREATE INDEX");

        let report = scenario.orchestrator().run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Completed);
        assert_eq!(scenario.target.transactions().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dump_failure_aborts_the_run() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![not_found()]);
        scenario.dump.set_failing(true);

        let mut orchestrator = scenario.orchestrator();
        let err = orchestrator.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DumpFailed);
        assert_eq!(orchestrator.phase(), MigrationPhase::Aborted);
        assert!(scenario.source.statements_starting_with("CREATE PUBLICATION").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn excluding_every_schema_aborts() {
        let excluded = vec![
            "information_schema".to_string(),
            "public".to_string(),
            "included".to_string(),
            "excluded".to_string(),
        ];
        let scenario = MigrationScenario::new(Some(excluded));

        let err = scenario.orchestrator().run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoEligibleSchemas);
        assert!(scenario.target.statements().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_of_another_migration_is_not_resumed() {
        let scenario = MigrationScenario::new(None);
        let foreign = StubResponse::rows(vec![vec!["subscription_db_primary_v2_20240309_070501"]]);
        scenario.subscription_lookups(vec![foreign, found()]);

        let report = scenario.orchestrator().run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Completed);
        assert!(report.session.is_some());
        assert!(report.phases.contains(&MigrationPhase::BulkCopying));
        assert_eq!(
            scenario
                .source
                .statements_starting_with("CREATE PUBLICATION")
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_metadata_schema_left_aborts() {
        let excluded = vec![
            "public".to_string(),
            "included".to_string(),
            "excluded".to_string(),
        ];
        let scenario = MigrationScenario::new(Some(excluded));

        let err = scenario.orchestrator().run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoEligibleSchemas);
        assert!(scenario.dump.calls().is_empty());
        assert!(scenario.target.statements().is_empty());
        assert!(
            scenario
                .source
                .statements_starting_with("CREATE PUBLICATION")
                .is_empty()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_proceeds_by_default() {
        let scenario = MigrationScenario::new(None);
        scenario.subscription_lookups(vec![found()]);
        scenario.sync_states(vec![StubResponse::Disconnect]);

        let report = scenario.orchestrator().run().await.unwrap();

        assert_eq!(report.outcome, MigrationOutcome::Completed);
        assert!(report.phases.contains(&MigrationPhase::FinalizingConstraints));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_aborts_when_configured() {
        let mut scenario = MigrationScenario::new(None);
        scenario.config.sync.on_probe_failure = ProbeFailureAction::Abort;
        scenario.subscription_lookups(vec![found()]);
        scenario.sync_states(vec![StubResponse::Fail]);

        let mut orchestrator = scenario.orchestrator();
        let err = orchestrator.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SyncProbeFailed);
        assert_eq!(orchestrator.phase(), MigrationPhase::Aborted);
        assert!(
            scenario
                .target
                .statements_starting_with("ALTER SUBSCRIPTION")
                .is_empty()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn configured_role_is_provisioned_during_bootstrap() {
        let mut scenario = MigrationScenario::new(None);
        scenario.config.replication_role = Some(ReplicationRoleConfig {
            name: "replicator".to_string(),
            password: None,
        });
        scenario.subscription_lookups(vec![not_found(), found()]);

        scenario.orchestrator().run().await.unwrap();

        assert_eq!(scenario.source.statements_starting_with("DO $pgshift$").len(), 1);
        assert!(
            scenario
                .source
                .executed("GRANT USAGE ON SCHEMA included TO replicator")
        );
        assert!(
            !scenario
                .source
                .statements()
                .iter()
                .any(|statement| statement.contains("SCHEMA information_schema"))
        );
    }
}
