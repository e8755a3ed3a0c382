use crate::dump::DumpDocument;
use crate::rewrite::{SnapshotRewriter, StatementPartition, is_primary_key_definition};

/// Groups lines into statements and classifies each statement as a whole.
///
/// A statement ends on the line where a `;` is the last token outside quotes and comments.
/// Single-quoted literals (`E'…'` escapes included), double-quoted identifiers and dollar-quoted
/// bodies are skipped, so a
/// function body that mentions `PRIMARY KEY` is not mistaken for a constraint. Lines outside any
/// statement (blank lines, comments, psql meta-commands) go to the non-primary-key half, and
/// every line keeps its physical layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementRewriter;

/// A run of consecutive lines forming one unit of the partition.
#[derive(Debug, Default)]
struct Group<'a> {
    lines: Vec<&'a str>,
    /// Text of the group outside quotes and comments, used for classification.
    code: String,
}

impl Group<'_> {
    fn is_primary_key(&self) -> bool {
        let code = self.code.trim_start().to_ascii_uppercase();
        code.starts_with("ALTER TABLE") && is_primary_key_definition(&code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    /// `E'…'`, where a backslash escapes the next character.
    Escape,
    Double,
    Dollar(String),
}

/// Line-by-line scanner state.
struct Tokenizer {
    quote: Quote,
}

impl Tokenizer {
    fn new() -> Self {
        Self { quote: Quote::None }
    }

    /// Scans `line`, appending code outside quotes to `code`.
    ///
    /// Returns whether the line terminates a statement.
    fn scan(&mut self, line: &str, code: &mut String) -> bool {
        let chars: Vec<char> = line.chars().collect();
        let mut terminated = false;
        let mut index = 0;

        while index < chars.len() {
            let current = chars[index];
            match &self.quote {
                Quote::Single => {
                    if current == '\'' {
                        self.quote = Quote::None;
                    }
                }
                Quote::Escape => match current {
                    '\\' => {
                        index += 2;
                        continue;
                    }
                    '\'' => self.quote = Quote::None,
                    _ => {}
                },
                Quote::Double => {
                    if current == '"' {
                        self.quote = Quote::None;
                    }
                }
                Quote::Dollar(tag) => {
                    if current == '$' && matches_at(&chars, index, tag) {
                        index += tag.chars().count();
                        self.quote = Quote::None;
                        continue;
                    }
                }
                Quote::None => match current {
                    '-' if chars.get(index + 1) == Some(&'-') => break,
                    '\'' => {
                        self.quote = match is_escape_prefix(&chars, index) {
                            true => Quote::Escape,
                            false => Quote::Single,
                        };
                        terminated = false;
                    }
                    '"' => {
                        self.quote = Quote::Double;
                        code.push(current);
                        terminated = false;
                    }
                    '$' => match dollar_tag(&chars, index) {
                        Some(tag) => {
                            index += tag.chars().count();
                            self.quote = Quote::Dollar(tag);
                            terminated = false;
                            continue;
                        }
                        None => {
                            code.push(current);
                            terminated = false;
                        }
                    },
                    ';' => {
                        code.push(current);
                        terminated = true;
                    }
                    other => {
                        code.push(other);
                        if !other.is_whitespace() {
                            terminated = false;
                        }
                    }
                },
            }
            index += 1;
        }

        code.push('\n');
        terminated && self.quote == Quote::None
    }
}

/// Parses a `$tag$` opener at `index`, the tag being empty or an identifier.
fn dollar_tag(chars: &[char], index: usize) -> Option<String> {
    let mut end = index + 1;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
        end += 1;
    }

    if end >= chars.len() || chars[end] != '$' {
        return None;
    }
    // `$1` is a positional parameter, not a tag.
    if chars.get(index + 1).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(chars[index..=end].iter().collect())
}

/// Whether the quote at `index` opens an escape string, i.e. follows a standalone `E`.
fn is_escape_prefix(chars: &[char], index: usize) -> bool {
    let Some(prefix) = index.checked_sub(1).map(|i| chars[i]) else {
        return false;
    };
    let standalone = index
        .checked_sub(2)
        .is_none_or(|i| !(chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$'));

    matches!(prefix, 'E' | 'e') && standalone
}

fn matches_at(chars: &[char], index: usize, tag: &str) -> bool {
    let tag: Vec<char> = tag.chars().collect();
    chars.len() >= index + tag.len() && chars[index..index + tag.len()] == tag[..]
}

fn is_standalone(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with("--") || trimmed.starts_with('\\')
}

impl SnapshotRewriter for StatementRewriter {
    fn partition(&self, document: &DumpDocument) -> StatementPartition {
        let mut with_primary_key = Vec::new();
        let mut without_primary_key = Vec::new();

        let mut tokenizer = Tokenizer::new();
        let mut group = Group::default();

        for line in document.lines() {
            if group.lines.is_empty() && is_standalone(line) {
                without_primary_key.push(line.clone());
                continue;
            }

            group.lines.push(line);
            if tokenizer.scan(line, &mut group.code) {
                let finished = std::mem::take(&mut group);
                let target = if finished.is_primary_key() {
                    &mut with_primary_key
                } else {
                    &mut without_primary_key
                };
                target.extend(finished.lines.into_iter().map(str::to_owned));
            }
        }

        // An unterminated trailing statement is left for the server to reject.
        without_primary_key.extend(group.lines.into_iter().map(str::to_owned));

        StatementPartition {
            with_primary_key: DumpDocument::from_lines(with_primary_key),
            without_primary_key: DumpDocument::from_lines(without_primary_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(text: &str) -> StatementPartition {
        StatementRewriter.partition(&DumpDocument::from_text(text))
    }

    #[test]
    fn two_line_constraint_is_one_statement() {
        let partition = partition(
            "ALTER TABLE t ADD CONSTRAINT t_pk\nPRIMARY KEY (id);\nCREATE INDEX i ON t (a);\n",
        );

        assert_eq!(
            partition.with_primary_key.lines(),
            &[
                "ALTER TABLE t ADD CONSTRAINT t_pk".to_string(),
                "PRIMARY KEY (id);".to_string()
            ]
        );
        assert_eq!(
            partition.without_primary_key.lines(),
            &["CREATE INDEX i ON t (a);".to_string()]
        );
    }

    #[test]
    fn constraint_layout_does_not_matter() {
        let partition = partition(
            "ALTER TABLE ONLY public.orders\n    ADD CONSTRAINT orders_pkey\n    PRIMARY KEY\n    (id);\n",
        );

        assert_eq!(partition.with_primary_key.len(), 4);
        assert!(partition.without_primary_key.is_empty());
    }

    #[test]
    fn quoted_text_is_not_classified() {
        let text = "\
COMMENT ON TABLE t IS 'ALTER TABLE t ADD CONSTRAINT x PRIMARY KEY (id);';
CREATE FUNCTION f() RETURNS void
    LANGUAGE plpgsql
    AS $_$
BEGIN
  EXECUTE 'ALTER TABLE t ADD CONSTRAINT x PRIMARY KEY (id);';
END;
$_$;
";
        let partition = partition(text);

        assert!(partition.with_primary_key.is_empty());
        assert_eq!(partition.without_primary_key.len(), 8);
    }

    #[test]
    fn escaped_quote_does_not_leave_the_literal_open() {
        let text = "\
COMMENT ON INDEX i IS E'it\\'s; PRIMARY KEY';
ALTER TABLE ONLY t
    ADD CONSTRAINT t_pkey PRIMARY KEY (id);
COMMENT ON TABLE t IS 'plain \\';
ALTER TABLE ONLY u
    ADD CONSTRAINT u_pkey PRIMARY KEY (id);
";
        let partition = partition(text);

        assert_eq!(
            partition.with_primary_key.lines(),
            &[
                "ALTER TABLE ONLY t".to_string(),
                "    ADD CONSTRAINT t_pkey PRIMARY KEY (id);".to_string(),
                "ALTER TABLE ONLY u".to_string(),
                "    ADD CONSTRAINT u_pkey PRIMARY KEY (id);".to_string(),
            ]
        );
        assert_eq!(partition.without_primary_key.len(), 2);
    }

    #[test]
    fn semicolon_inside_dollar_body_does_not_end_the_statement() {
        let text = "\
CREATE FUNCTION f() RETURNS trigger AS $$
BEGIN
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;
ALTER TABLE ONLY t
    ADD CONSTRAINT t_pkey PRIMARY KEY (id);
";
        let partition = partition(text);

        assert_eq!(
            partition.with_primary_key.lines(),
            &[
                "ALTER TABLE ONLY t".to_string(),
                "    ADD CONSTRAINT t_pkey PRIMARY KEY (id);".to_string()
            ]
        );
        assert_eq!(partition.without_primary_key.len(), 5);
    }

    #[test]
    fn comments_and_blank_lines_stay_with_the_remainder() {
        let text = "\
--
-- Name: t t_pkey; Type: CONSTRAINT; Schema: public; Owner: postgres
--

ALTER TABLE ONLY public.t
    ADD CONSTRAINT t_pkey PRIMARY KEY (id); -- trailing note
";
        let partition = partition(text);

        assert_eq!(partition.with_primary_key.len(), 2);
        assert_eq!(
            partition.without_primary_key.lines(),
            &[
                "--".to_string(),
                "-- Name: t t_pkey; Type: CONSTRAINT; Schema: public; Owner: postgres".to_string(),
                "--".to_string(),
                "".to_string(),
            ]
        );
    }

    #[test]
    fn every_line_lands_in_exactly_one_half() {
        let text = "\
SET statement_timeout = 0;
CREATE INDEX i ON public.t USING btree (a);

ALTER TABLE ONLY public.t
    ADD CONSTRAINT t_pkey PRIMARY KEY (id);
ALTER TABLE ONLY public.u
    ADD CONSTRAINT u_t_fkey FOREIGN KEY (t_id) REFERENCES public.t(id);
";
        let document = DumpDocument::from_text(text);
        let partition = StatementRewriter.partition(&document);

        assert_eq!(
            partition.with_primary_key.len() + partition.without_primary_key.len(),
            document.len()
        );
        assert_eq!(partition.with_primary_key.len(), 2);
    }

    #[test]
    fn unterminated_statement_is_kept() {
        let partition = partition("ALTER TABLE ONLY t\n    ADD CONSTRAINT t_pkey PRIMARY KEY (id)");

        assert!(partition.with_primary_key.is_empty());
        assert_eq!(partition.without_primary_key.len(), 2);
    }
}
