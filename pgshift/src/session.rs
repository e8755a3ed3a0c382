use chrono::{Local, NaiveDateTime};
use pgshift_postgres::replication::{publication_name, subscription_name, unique_session_name};

use crate::error::MigrateResult;

/// Source of the session timestamp.
pub type Clock = fn() -> NaiveDateTime;

/// Local wall-clock time, the default [`Clock`].
pub fn system_clock() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Identity of one fresh migration attempt.
///
/// Only exists while the orchestrator runs; a resumed run finds its subscription by name
/// pattern instead of recomputing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSession {
    pub unique_name: String,
    pub started_at: NaiveDateTime,
}

impl MigrationSession {
    pub fn start(database: &str, clock: Clock) -> Self {
        let started_at = clock();

        Self {
            unique_name: unique_session_name(database, started_at),
            started_at,
        }
    }

    pub fn publication_name(&self) -> MigrateResult<String> {
        Ok(publication_name(&self.unique_name)?)
    }

    pub fn subscription_name(&self) -> MigrateResult<String> {
        Ok(subscription_name(&self.unique_name)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn fixed_clock() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
    }

    #[test]
    fn session_names_derive_from_the_clock() {
        let session = MigrationSession::start("db_primary", fixed_clock);

        assert_eq!(session.unique_name, "db_primary_20250131_235958");
        assert_eq!(
            session.publication_name().unwrap(),
            "publication_db_primary_20250131_235958"
        );
        assert_eq!(
            session.subscription_name().unwrap(),
            "subscription_db_primary_20250131_235958"
        );
    }
}
