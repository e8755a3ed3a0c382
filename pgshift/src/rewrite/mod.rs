//! Splitting of dump text into primary-key and non-primary-key statements.
//!
//! Primary keys are restored before the subscription starts copying, so that the copy can
//! apply updates and deletes. Every other post-data statement (secondary indexes, foreign
//! keys, triggers) is deferred until the initial copy is done.

mod line_window;
mod markers;
mod statement;

use pgshift_config::shared::RewriteStrategy;

pub use line_window::LineWindowRewriter;
pub use markers::{strip_restrict_markers, strip_schema_create};
pub use statement::StatementRewriter;

use crate::dump::DumpDocument;

/// The two halves of a post-data dump.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatementPartition {
    pub with_primary_key: DumpDocument,
    pub without_primary_key: DumpDocument,
}

/// Splits a dump into primary-key statements and everything else.
pub trait SnapshotRewriter: Send + Sync {
    fn partition(&self, document: &DumpDocument) -> StatementPartition;

    /// Keeps only the statements that define a primary key.
    fn extract_primary_key_statements(&self, document: &DumpDocument) -> DumpDocument {
        self.partition(document).with_primary_key
    }

    /// Keeps everything except the statements that define a primary key.
    fn strip_primary_key_statements(&self, document: &DumpDocument) -> DumpDocument {
        self.partition(document).without_primary_key
    }
}

/// Returns the rewriter implementing `strategy`.
pub fn rewriter_for(strategy: RewriteStrategy) -> Box<dyn SnapshotRewriter> {
    match strategy {
        RewriteStrategy::Statement => Box::new(StatementRewriter),
        RewriteStrategy::LineWindow => Box::new(LineWindowRewriter),
    }
}

/// Whether `text` contains `ADD CONSTRAINT` followed by `PRIMARY KEY`, ignoring case.
pub fn is_primary_key_definition(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    match upper.find("ADD CONSTRAINT") {
        Some(index) => upper[index..].contains("PRIMARY KEY"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::test_utils::fixtures::POST_DATA_DUMP;

    fn post_data() -> DumpDocument {
        strip_restrict_markers(&DumpDocument::from_text(POST_DATA_DUMP))
    }

    #[test]
    fn primary_key_definitions_are_matched_case_insensitively() {
        assert!(is_primary_key_definition(
            "    ADD CONSTRAINT t_pkey PRIMARY KEY (id);"
        ));
        assert!(is_primary_key_definition(
            "alter table only t add constraint t_pkey primary key (id);"
        ));
        assert!(!is_primary_key_definition(
            "    ADD CONSTRAINT t_fkey FOREIGN KEY (a) REFERENCES u(id);"
        ));
        assert!(!is_primary_key_definition("PRIMARY KEY (id) ADD CONSTRAINT"));
    }

    #[test]
    fn strategies_agree_on_primary_keys_of_a_pg_dump_document() {
        let document = post_data();

        let statement = rewriter_for(RewriteStrategy::Statement).partition(&document);
        assert_snapshot!(statement.with_primary_key.lines().join("\n"), @r"
        ALTER TABLE ONLY excluded.table_to_replicate3
            ADD CONSTRAINT table_to_replicate3_pkey PRIMARY KEY (id);
        ALTER TABLE ONLY included.table_to_replicate
            ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);
        ALTER TABLE ONLY included.table_to_replicate2
            ADD CONSTRAINT table_to_replicate2_pkey PRIMARY KEY (id);
        ");

        let line_window = rewriter_for(RewriteStrategy::LineWindow).partition(&document);
        assert_snapshot!(line_window.with_primary_key.lines().join("\n"), @r"
        ALTER TABLE ONLY excluded.table_to_replicate3    ADD CONSTRAINT table_to_replicate3_pkey PRIMARY KEY (id);
        ALTER TABLE ONLY included.table_to_replicate    ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);
        ALTER TABLE ONLY included.table_to_replicate2    ADD CONSTRAINT table_to_replicate2_pkey PRIMARY KEY (id);
        ");
    }

    #[test]
    fn strategies_agree_on_what_is_deferred() {
        let document = post_data();

        for strategy in [RewriteStrategy::Statement, RewriteStrategy::LineWindow] {
            let deferred = rewriter_for(strategy).strip_primary_key_statements(&document);
            let deferred: Vec<&str> = deferred.non_blank_lines().filter(|l| !l.starts_with("--")).collect();

            assert_eq!(
                deferred,
                vec![
                    "SET statement_timeout = 0;",
                    "SELECT pg_catalog.set_config('search_path', '', false);",
                    "CREATE INDEX table_to_replicate_name_idx ON included.table_to_replicate USING btree (name);",
                    "ALTER TABLE ONLY included.table_to_replicate2",
                    "    ADD CONSTRAINT table_to_replicate2_parent_fkey FOREIGN KEY (parent_id) REFERENCES included.table_to_replicate(id);",
                ],
                "{strategy:?}"
            );
        }
    }
}
