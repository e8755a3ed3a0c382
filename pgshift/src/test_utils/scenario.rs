//! A source/target pair primed like a small database with an `included` and an `excluded`
//! schema, shared by the orchestrator tests.

use chrono::{NaiveDate, NaiveDateTime};
use pgshift_config::shared::{ConnectionTarget, MigratorConfig};
use pgshift_postgres::catalog::{
    database_size_query, eligible_tables_query, excluded_schema_clause, schema_listing_query,
    user_table_count_query,
};
use pgshift_postgres::replication::subscription::{
    lookup_subscription_sql, pending_tables_query, sync_progress_query,
};
use pgshift_postgres::replication::subscription_lookup_pattern;

use crate::orchestrator::MigrationOrchestrator;
use crate::test_utils::dump::StubDumpExtractor;
use crate::test_utils::gateway::{StubGateway, StubResponse};

pub const SOURCE_DATABASE: &str = "db_primary";
pub const TARGET_DATABASE: &str = "db_secondary";
pub const REPLICATION_SOURCE_URL: &str = "postgresql://replicator@source:5432/db_primary";
pub const SESSION_PUBLICATION: &str = "publication_db_primary_20240309_070501";
pub const SESSION_SUBSCRIPTION: &str = "subscription_db_primary_20240309_070501";

/// Schemas of the source database and the tables they hold.
const SOURCE_LAYOUT: &[(&str, &[&str])] = &[
    ("information_schema", &[]),
    ("public", &[]),
    ("included", &["table_to_replicate", "table_to_replicate2"]),
    ("excluded", &["table_to_replicate3"]),
];

/// Always returns 2024-03-09 07:05:01, the timestamp embedded in the session constants.
pub fn fixed_clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .and_then(|date| date.and_hms_opt(7, 5, 1))
        .expect("valid timestamp")
}

/// Lookup answer naming the session's subscription.
pub fn found() -> StubResponse {
    StubResponse::rows(vec![vec![SESSION_SUBSCRIPTION]])
}

/// Lookup answer with no subscription.
pub fn not_found() -> StubResponse {
    StubResponse::rows(vec![])
}

pub struct MigrationScenario {
    pub config: MigratorConfig,
    pub source: StubGateway,
    pub target: StubGateway,
    pub dump: StubDumpExtractor,
}

impl MigrationScenario {
    /// Primes the source catalog as the server would answer with `excluded_schemas` applied.
    ///
    /// Every subscription table is reported ready; the subscription lookup is left for the test
    /// to script.
    pub fn new(excluded_schemas: Option<Vec<String>>) -> Self {
        let config = MigratorConfig::new(
            ConnectionTarget::new(
                format!("host=source dbname={SOURCE_DATABASE}"),
                SOURCE_DATABASE,
            ),
            ConnectionTarget::new(
                format!("host=target dbname={TARGET_DATABASE}"),
                TARGET_DATABASE,
            ),
            REPLICATION_SOURCE_URL,
        )
        .with_excluded_schemas(excluded_schemas);

        let scenario = Self {
            source: StubGateway::new(config.source.clone()),
            target: StubGateway::new(config.target.clone()),
            dump: StubDumpExtractor::default(),
            config,
        };
        scenario.prime_source();
        scenario.sync_states(vec![StubResponse::rows(vec![])]);
        scenario.target.respond(&scenario.progress_query(), vec![vec!["2", "2"]]);

        scenario
    }

    /// Builds an orchestrator over clones of the stubs, so the scenario can inspect them later.
    pub fn orchestrator(&self) -> MigrationOrchestrator<StubGateway, StubDumpExtractor> {
        MigrationOrchestrator::new(
            self.config.clone(),
            self.source.clone(),
            self.target.clone(),
            self.dump.clone(),
        )
        .with_clock(fixed_clock)
    }

    pub fn lookup_query(&self) -> String {
        let pattern = subscription_lookup_pattern(SOURCE_DATABASE).expect("valid database name");
        lookup_subscription_sql(&pattern)
    }

    pub fn pending_query(&self) -> String {
        pending_tables_query(SESSION_SUBSCRIPTION, &self.excluded_table_names())
    }

    pub fn progress_query(&self) -> String {
        sync_progress_query(SESSION_SUBSCRIPTION, &self.excluded_table_names())
    }

    pub fn eligible_tables_query(&self) -> String {
        eligible_tables_query(
            &self.excluded_clause(),
            &self.config.dump.metadata_schemas,
            &self.excluded_table_names(),
        )
    }

    /// Scripts successive answers of the subscription lookup.
    pub fn subscription_lookups(&self, responses: Vec<StubResponse>) {
        self.target.respond_sequence(&self.lookup_query(), responses);
    }

    /// Scripts successive answers of the pending-tables probe.
    pub fn sync_states(&self, responses: Vec<StubResponse>) {
        self.target.respond_sequence(&self.pending_query(), responses);
    }

    fn prime_source(&self) {
        let excluded = self.config.excluded_schemas.clone().unwrap_or_default();
        let visible: Vec<&(&str, &[&str])> = SOURCE_LAYOUT
            .iter()
            .filter(|(schema, _)| !excluded.iter().any(|e| e == schema))
            .collect();

        self.source.respond(
            &schema_listing_query(&self.excluded_clause()),
            visible.iter().map(|(schema, _)| vec![*schema]).collect(),
        );
        self.source.respond(
            &database_size_query(SOURCE_DATABASE),
            vec![vec!["7937 kB"]],
        );
        self.source.respond(user_table_count_query(), vec![vec!["3"]]);

        let tables = visible
            .iter()
            .filter(|(schema, _)| !self.config.dump.metadata_schemas.iter().any(|m| m == schema))
            .flat_map(|(schema, tables)| tables.iter().map(move |table| vec![*schema, *table]))
            .collect();
        self.source.respond(&self.eligible_tables_query(), tables);
    }

    fn excluded_clause(&self) -> String {
        excluded_schema_clause(self.config.excluded_schemas.as_deref())
    }

    fn excluded_table_names(&self) -> Vec<String> {
        self.config
            .dump
            .excluded_table_names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}
