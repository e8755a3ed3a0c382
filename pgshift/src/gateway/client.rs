use std::io::BufReader;

use pgshift_config::shared::ConnectionTarget;
use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Connection, NoTls, SimpleQueryMessage, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::MigrateResult;
use crate::gateway::base::{QueryRows, Row, SqlGateway, TransactionOutcome};

/// Drives a Postgres connection in the background until the client is dropped.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        if let Err(err) = connection.await {
            error!("an error occurred during the postgres connection: {}", err);
        }
    }
    .instrument(span);

    // Dropping the `Client` closes the connection, so the handle is not needed.
    tokio::spawn(task);
}

/// [`SqlGateway`] that opens one connection per call and closes it before returning.
#[derive(Debug, Clone)]
pub struct PgGateway {
    target: ConnectionTarget,
}

impl PgGateway {
    pub fn new(target: ConnectionTarget) -> Self {
        Self { target }
    }

    async fn connect(&self) -> MigrateResult<Client> {
        let result = match self.target.tls.enabled {
            true => self.connect_tls().await,
            false => self.connect_no_tls().await,
        };

        result.inspect_err(|err| {
            error!(endpoint = %self.target, error = %err, "failed to connect to postgres");
        })
    }

    async fn connect_no_tls(&self) -> MigrateResult<Client> {
        let config = self.target.to_connect_options()?;

        let (client, connection) = config.connect(NoTls).await?;
        spawn_postgres_connection::<NoTls>(connection);

        debug!(endpoint = %self.target, "connected to postgres without tls");

        Ok(client)
    }

    async fn connect_tls(&self) -> MigrateResult<Client> {
        let config = self.target.to_connect_options()?;

        let mut root_store = rustls::RootCertStore::empty();
        let mut root_certs_reader = BufReader::new(self.target.tls.trusted_root_certs.as_bytes());
        for cert in rustls_pemfile::certs(&mut root_certs_reader) {
            let cert = cert?;
            root_store.add(cert)?;
        }

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let (client, connection) = config.connect(MakeRustlsConnect::new(tls_config)).await?;
        spawn_postgres_connection::<MakeRustlsConnect>(connection);

        debug!(endpoint = %self.target, "connected to postgres with tls");

        Ok(client)
    }

    fn report_failure(&self, sql: &str, err: &tokio_postgres::Error) {
        let reason = match err.as_db_error() {
            Some(db_error) => format!("{} ({})", db_error.message(), db_error.code().code()),
            None => err.to_string(),
        };

        error!(endpoint = %self.target, query = sql, error = %reason, "statement failed");
    }
}

fn collect_rows(messages: Vec<SimpleQueryMessage>) -> QueryRows {
    messages
        .into_iter()
        .filter_map(|message| match message {
            SimpleQueryMessage::Row(row) => {
                Some((0..row.len()).map(|index| row.get(index)).collect::<Row>())
            }
            _ => None,
        })
        .collect()
}

#[async_trait::async_trait]
impl SqlGateway for PgGateway {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn execute_query(&self, sql: &str, fetch: bool) -> MigrateResult<Option<QueryRows>> {
        let client = self.connect().await?;

        let result = client.simple_query(sql).await;
        drop(client);

        match result {
            Ok(messages) if fetch => Ok(Some(collect_rows(messages))),
            Ok(_) => Ok(Some(QueryRows::new())),
            Err(err) => {
                self.report_failure(sql, &err);
                Ok(None)
            }
        }
    }

    async fn execute_transactional(&self, batch: &str) -> MigrateResult<TransactionOutcome> {
        if batch.trim().is_empty() {
            debug!(endpoint = %self.target, "empty batch, nothing to apply");
            return Ok(TransactionOutcome::Committed);
        }

        let mut client = self.connect().await?;
        let transaction = client.transaction().await?;

        if let Err(err) = transaction.batch_execute(batch).await {
            self.report_failure(batch, &err);
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(endpoint = %self.target, error = %rollback_err, "rollback failed, the connection is closed instead");
            }
            info!(endpoint = %self.target, "batch rolled back");

            return Ok(TransactionOutcome::RolledBack);
        }

        match transaction.commit().await {
            Ok(()) => Ok(TransactionOutcome::Committed),
            Err(err) => {
                self.report_failure("COMMIT", &err);
                Ok(TransactionOutcome::RolledBack)
            }
        }
    }
}
