use std::fmt;

/// Section of a `pg_dump` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpSection {
    /// Types, tables, functions: everything needed before data can be loaded.
    PreData,
    /// Indexes, constraints, triggers: everything built on top of the data.
    PostData,
}

impl DumpSection {
    /// Value of `pg_dump --section`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpSection::PreData => "pre-data",
            DumpSection::PostData => "post-data",
        }
    }
}

impl fmt::Display for DumpSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain SQL dump as an ordered list of lines.
///
/// Documents are never edited in place, every rewrite builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DumpDocument {
    lines: Vec<String>,
}

impl DumpDocument {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True when every line is whitespace.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }

    /// Lines that carry content.
    pub fn non_blank_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !line.trim().is_empty())
    }

    /// Renders the document as one executable batch, one line per line.
    pub fn to_sql(&self) -> String {
        let mut sql = self.lines.join("\n");
        if !sql.is_empty() {
            sql.push('\n');
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_through_lines() {
        let document = DumpDocument::from_text("SET a = 1;\n\nCREATE TABLE t (id int);\n");

        assert_eq!(document.len(), 3);
        assert_eq!(
            document.non_blank_lines().collect::<Vec<_>>(),
            vec!["SET a = 1;", "CREATE TABLE t (id int);"]
        );
        assert_eq!(document.to_sql(), "SET a = 1;\n\nCREATE TABLE t (id int);\n");
    }

    #[test]
    fn empty_documents_render_nothing() {
        let document = DumpDocument::from_text("");

        assert!(document.is_empty());
        assert!(document.is_blank());
        assert_eq!(document.to_sql(), "");
    }
}
