use crate::dump::DumpDocument;
use crate::rewrite::{SnapshotRewriter, StatementPartition, is_primary_key_definition};

/// Pairs every primary-key line with the physical line before it.
///
/// Relies on `pg_dump` printing `ALTER TABLE ONLY <table>` and `ADD CONSTRAINT ... PRIMARY KEY`
/// on two consecutive lines. The last line of a document is never a trigger, so it always lands
/// in the non-primary-key half together with the line before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineWindowRewriter;

impl LineWindowRewriter {
    /// Whether line `index` closes a primary-key statement started on the line before.
    fn is_trigger(lines: &[String], index: usize) -> bool {
        if index + 1 >= lines.len() {
            return false;
        }

        let line = &lines[index];
        if !line.to_ascii_uppercase().contains("PRIMARY KEY") {
            return false;
        }

        let previous = index.checked_sub(1).map(|i| lines[i].as_str()).unwrap_or("");
        is_primary_key_definition(&format!("{previous}{line}"))
    }
}

impl SnapshotRewriter for LineWindowRewriter {
    fn partition(&self, document: &DumpDocument) -> StatementPartition {
        let lines = document.lines();

        let mut with_primary_key = Vec::new();
        let mut without_primary_key = Vec::new();
        let mut line_before: Option<&String> = None;

        for (index, line) in lines.iter().enumerate() {
            if Self::is_trigger(lines, index) {
                let header = index.checked_sub(1).map(|i| lines[i].as_str()).unwrap_or("");
                with_primary_key.push(format!("{header}{line}"));
                // The header belongs to the primary-key statement.
                line_before = None;
                continue;
            }

            if let Some(previous) = line_before.take() {
                without_primary_key.push(previous.clone());
            }
            line_before = Some(line);
        }

        if let Some(previous) = line_before {
            without_primary_key.push(previous.clone());
        }

        StatementPartition {
            with_primary_key: DumpDocument::from_lines(with_primary_key),
            without_primary_key: DumpDocument::from_lines(without_primary_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_DATA: &str = "\
ALTER TABLE ONLY included.table_to_replicate
    ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);

CREATE INDEX table_to_replicate_name_idx ON included.table_to_replicate USING btree (name);

ALTER TABLE ONLY included.table_to_replicate2
    ADD CONSTRAINT table_to_replicate2_pkey PRIMARY KEY (id);

ALTER TABLE ONLY included.table_to_replicate2
    ADD CONSTRAINT table_to_replicate2_fkey FOREIGN KEY (parent_id) REFERENCES included.table_to_replicate(id);

-- PostgreSQL database dump complete
";

    #[test]
    fn primary_keys_are_joined_with_their_header() {
        let partition = LineWindowRewriter.partition(&DumpDocument::from_text(POST_DATA));

        assert_eq!(
            partition.with_primary_key.lines(),
            &[
                "ALTER TABLE ONLY included.table_to_replicate    ADD CONSTRAINT table_to_replicate_pkey PRIMARY KEY (id);".to_string(),
                "ALTER TABLE ONLY included.table_to_replicate2    ADD CONSTRAINT table_to_replicate2_pkey PRIMARY KEY (id);".to_string(),
            ]
        );
    }

    #[test]
    fn stripped_half_keeps_everything_else_in_order() {
        let partition = LineWindowRewriter.partition(&DumpDocument::from_text(POST_DATA));

        let kept = partition.without_primary_key.non_blank_lines().collect::<Vec<_>>();
        assert_eq!(
            kept,
            vec![
                "CREATE INDEX table_to_replicate_name_idx ON included.table_to_replicate USING btree (name);",
                "ALTER TABLE ONLY included.table_to_replicate2",
                "    ADD CONSTRAINT table_to_replicate2_fkey FOREIGN KEY (parent_id) REFERENCES included.table_to_replicate(id);",
                "-- PostgreSQL database dump complete",
            ]
        );
    }

    #[test]
    fn every_non_blank_line_lands_in_one_half() {
        let document = DumpDocument::from_text(POST_DATA);
        let partition = LineWindowRewriter.partition(&document);

        // Each primary-key entry merges two source lines.
        let accounted = partition.with_primary_key.len() * 2
            + partition.without_primary_key.non_blank_lines().count();
        assert_eq!(accounted, document.non_blank_lines().count());
    }

    #[test]
    fn split_constraint_header_is_paired() {
        let document = DumpDocument::from_text(
            "ALTER TABLE t ADD CONSTRAINT t_pk\nPRIMARY KEY (id);\nCREATE INDEX i ON t (a);\n",
        );

        let partition = LineWindowRewriter.partition(&document);

        assert_eq!(
            partition.with_primary_key.lines(),
            &["ALTER TABLE t ADD CONSTRAINT t_pkPRIMARY KEY (id);".to_string()]
        );
        assert_eq!(
            partition.without_primary_key.lines(),
            &["CREATE INDEX i ON t (a);".to_string()]
        );
    }

    #[test]
    fn dump_without_primary_keys_is_left_untouched() {
        let document = DumpDocument::from_text("CREATE INDEX i ON t (a);\n\nCREATE INDEX j ON t (b);\n");

        let partition = LineWindowRewriter.partition(&document);

        assert!(partition.with_primary_key.is_empty());
        assert_eq!(partition.without_primary_key, document);
    }

    #[test]
    fn last_line_is_never_a_trigger() {
        let document = DumpDocument::from_text(
            "ALTER TABLE ONLY t\n    ADD CONSTRAINT t_pkey PRIMARY KEY (id);",
        );

        let partition = LineWindowRewriter.partition(&document);

        assert!(partition.with_primary_key.is_empty());
        assert_eq!(partition.without_primary_key, document);
    }
}
