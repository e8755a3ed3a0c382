use pg_escape::quote_identifier;

use crate::types::TableName;

/// Creates an empty publication, tables are attached one at a time afterwards.
pub fn create_publication_sql(publication: &str) -> String {
    format!("CREATE PUBLICATION {}", quote_identifier(publication))
}

pub fn add_table_sql(publication: &str, table: &TableName) -> String {
    format!(
        "ALTER PUBLICATION {} ADD TABLE {}",
        quote_identifier(publication),
        table.as_quoted_identifier()
    )
}
