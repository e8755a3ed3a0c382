use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pgshift_config::shared::ConnectionTarget;

use crate::catalog::SchemaSet;
use crate::dump::{DumpDocument, DumpExtractor, DumpSection};
use crate::error::{ErrorKind, MigrateResult};
use crate::test_utils::fixtures::{POST_DATA_DUMP, PRE_DATA_DUMP};
use crate::bail;

/// One recorded dump request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCall {
    pub section: DumpSection,
    pub schemas: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<DumpSection, String>,
    calls: Vec<DumpCall>,
    failing: bool,
}

/// [`DumpExtractor`] returning canned text per section.
#[derive(Debug, Clone)]
pub struct StubDumpExtractor {
    inner: Arc<Mutex<Inner>>,
}

impl StubDumpExtractor {
    pub fn new(pre_data: &str, post_data: &str) -> Self {
        let mut documents = HashMap::new();
        documents.insert(DumpSection::PreData, pre_data.to_string());
        documents.insert(DumpSection::PostData, post_data.to_string());

        Self {
            inner: Arc::new(Mutex::new(Inner {
                documents,
                ..Inner::default()
            })),
        }
    }

    /// Makes every dump fail as if `pg_dump` exited with an error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> Vec<DumpCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn sections(&self) -> Vec<DumpSection> {
        self.calls().into_iter().map(|call| call.section).collect()
    }
}

impl Default for StubDumpExtractor {
    fn default() -> Self {
        Self::new(PRE_DATA_DUMP, POST_DATA_DUMP)
    }
}

#[async_trait::async_trait]
impl DumpExtractor for StubDumpExtractor {
    async fn dump(
        &self,
        _source: &ConnectionTarget,
        schemas: &SchemaSet,
        section: DumpSection,
    ) -> MigrateResult<DumpDocument> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(DumpCall {
            section,
            schemas: schemas.names().to_vec(),
        });

        if inner.failing {
            bail!(
                ErrorKind::DumpFailed,
                "pg_dump exited with an error",
                format!("section {section}, exit status: 1")
            );
        }

        let text = inner.documents.get(&section).cloned().unwrap_or_default();
        Ok(DumpDocument::from_text(&text))
    }
}
