use pg_escape::{quote_identifier, quote_literal};

use crate::types::SubscriptionRelState;

/// Finds subscriptions of the current database whose name matches `pattern` (see
/// `subscription_lookup_pattern`).
///
/// `pg_subscription` is shared by every database of the cluster, hence the `subdbid` filter.
pub fn lookup_subscription_sql(pattern: &str) -> String {
    format!(
        "select subname from pg_subscription where subname like {} and subdbid = (select oid from pg_database where datname = current_database()) order by subname",
        quote_literal(pattern)
    )
}

/// Creates an enabled subscription that copies existing data through a slot of the same name.
pub fn create_subscription_sql(
    subscription: &str,
    connection_url: &str,
    publication: &str,
) -> String {
    format!(
        "CREATE SUBSCRIPTION {} CONNECTION {} PUBLICATION {} with (copy_data=true, create_slot=true, enabled=true, slot_name={});",
        quote_identifier(subscription),
        quote_literal(connection_url),
        quote_identifier(publication),
        quote_literal(subscription)
    )
}

pub fn enable_subscription_sql(subscription: &str) -> String {
    format!("ALTER SUBSCRIPTION {} ENABLE", quote_identifier(subscription))
}

pub fn disable_subscription_sql(subscription: &str) -> String {
    format!("ALTER SUBSCRIPTION {} DISABLE", quote_identifier(subscription))
}

fn relation_filter(subscription: &str, excluded_table_names: &[String]) -> String {
    let mut filter = format!("s.subname = {}", quote_literal(subscription));
    if !excluded_table_names.is_empty() {
        let excluded = excluded_table_names
            .iter()
            .map(|name| quote_literal(name))
            .collect::<Vec<_>>()
            .join(",");
        filter.push_str(&format!(" AND c.relname NOT IN ({excluded})"));
    }

    filter
}

/// Lists `(schema, table, state)` for every relation of the subscription that is not ready yet.
pub fn pending_tables_query(subscription: &str, excluded_table_names: &[String]) -> String {
    format!(
        "SELECT n.nspname, c.relname, sr.srsubstate FROM pg_subscription_rel sr \
         JOIN pg_subscription s ON s.oid = sr.srsubid \
         JOIN pg_class c ON c.oid = sr.srrelid \
         JOIN pg_namespace n ON n.oid = c.relnamespace \
         WHERE sr.srsubstate <> {} AND {} \
         ORDER BY n.nspname, c.relname",
        quote_literal(SubscriptionRelState::Ready.as_code()),
        relation_filter(subscription, excluded_table_names)
    )
}

/// Returns one `(ready, total)` row for the subscription's relations.
pub fn sync_progress_query(subscription: &str, excluded_table_names: &[String]) -> String {
    format!(
        "SELECT count(*) FILTER (WHERE sr.srsubstate = {}), count(*) FROM pg_subscription_rel sr \
         JOIN pg_subscription s ON s.oid = sr.srsubid \
         JOIN pg_class c ON c.oid = sr.srrelid \
         WHERE {}",
        quote_literal(SubscriptionRelState::Ready.as_code()),
        relation_filter(subscription, excluded_table_names)
    )
}
