//! classify → resolve → fetch → reconcile, per identifier.

use std::sync::Arc;

use adsdesk_core::{CollectionEntry, CollectionStore, OptionsConfig};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::ads::AdsClient;
use crate::error::{PipelineError, Result, Stage};
use crate::fetch::{DocumentFetcher, DocumentUnavailable, FetchOutcome};
use crate::identifiers::{Identifier, classify};
use crate::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use crate::record::{CanonicalRecord, DeliveryPath};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub download_pdf: bool,
    /// Fetch again even if a live attachment exists, and replace it when different.
    pub force_refetch: bool,
    pub dry_run: bool,
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            download_pdf: true,
            force_refetch: false,
            dry_run: false,
            concurrency: 4,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(options: &OptionsConfig) -> Self {
        Self {
            download_pdf: options.download_pdf,
            concurrency: options.concurrency,
            ..Self::default()
        }
    }
}

/// What happened to the full-text document for one article.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Attached { path: DeliveryPath, source_url: String },
    AlreadyAttached,
    Skipped,
    Unavailable(DocumentUnavailable),
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleReport {
    pub input: String,
    pub identifier: Identifier,
    pub dedup_key: String,
    pub title: String,
    pub outcome: ReconcileOutcome,
    pub entry_id: Uuid,
    pub attachment: Option<String>,
    pub document: DocumentStatus,
}

pub struct Pipeline {
    ads: AdsClient,
    fetcher: DocumentFetcher,
    reconciler: Reconciler,
    store: Arc<dyn CollectionStore>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        ads: AdsClient,
        fetcher: DocumentFetcher,
        store: Arc<dyn CollectionStore>,
        options: PipelineOptions,
    ) -> Self {
        let reconciler = Reconciler::new(
            store.clone(),
            ReconcileOptions {
                dry_run: options.dry_run,
                replace_attachment: options.force_refetch,
            },
        );
        Self {
            ads,
            fetcher,
            reconciler,
            store,
            options,
        }
    }

    /// Runs one identifier end to end.
    pub async fn process(&self, input: &str) -> std::result::Result<ArticleReport, PipelineError> {
        let identifier = classify(input);
        tracing::debug!(input, kind = identifier.kind(), "classified");

        let record = self
            .ads
            .resolve(&identifier)
            .await
            .map_err(|e| PipelineError::new(input, Stage::Resolve, e))?;

        let (document, fetched) = self
            .retrieve(&record)
            .await
            .map_err(|e| PipelineError::new(input, Stage::Reconcile, e))?;

        let report = self
            .reconciler
            .reconcile(&record, fetched.as_ref())
            .await
            .map_err(|e| PipelineError::new(input, Stage::Reconcile, e))?;

        let document = match (document, fetched) {
            (None, Some(doc)) if report.document_attached => DocumentStatus::Attached {
                path: doc.path,
                source_url: doc.source_url,
            },
            (None, _) => DocumentStatus::AlreadyAttached,
            (Some(status), _) => status,
        };

        Ok(ArticleReport {
            input: input.to_string(),
            identifier,
            dedup_key: report.dedup_key,
            title: record.title,
            outcome: report.outcome,
            entry_id: report.entry_id,
            attachment: report.attachment,
            document,
        })
    }

    /// Runs all identifiers with bounded concurrency. Results keep input order
    /// and one failure never stops the others.
    pub async fn process_all(
        &self,
        inputs: &[String],
    ) -> Vec<std::result::Result<ArticleReport, PipelineError>> {
        stream::iter(inputs.iter().map(|input| self.process(input)))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Returns a final status when no document is handed to the reconciler
    /// for attaching, or `None` together with the fetched document.
    async fn retrieve(
        &self,
        record: &CanonicalRecord,
    ) -> Result<(Option<DocumentStatus>, Option<crate::fetch::FetchedDocument>)> {
        if !self.options.download_pdf {
            return Ok((Some(DocumentStatus::Skipped), None));
        }
        if !self.options.force_refetch
            && self.stored_entry(record)?.is_some_and(|entry| entry.has_live_attachment())
        {
            tracing::debug!(key = %record.dedup_key, "document already attached, not fetching");
            return Ok((Some(DocumentStatus::AlreadyAttached), None));
        }

        match self.fetcher.fetch(record).await {
            FetchOutcome::Fetched(doc) => Ok((None, Some(doc))),
            FetchOutcome::Unavailable(unavailable) => {
                tracing::warn!(
                    key = %record.dedup_key,
                    attempts = unavailable.attempts.len(),
                    "no document could be retrieved, storing metadata only"
                );
                Ok((Some(DocumentStatus::Unavailable(unavailable)), None))
            }
        }
    }

    fn stored_entry(&self, record: &CanonicalRecord) -> Result<Option<CollectionEntry>> {
        if let Some(entry) = self.store.find_by_key(&record.dedup_key)? {
            return Ok(Some(entry));
        }
        for alias in record.bibcode.iter().chain(&record.alternate_bibcodes) {
            if let Some(entry) = self.store.find_by_alternate_key(alias)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use adsdesk_core::SqliteCollection;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ScienceError;
    use crate::fetch::{Relay, RelaySession};

    struct UnreachableRelay;

    #[async_trait::async_trait]
    impl Relay for UnreachableRelay {
        async fn connect(&self) -> Result<RelaySession> {
            Err(ScienceError::Relay("ssh: connect to host gate.example.edu: timed out".to_string()))
        }

        fn describe(&self) -> String {
            "astro@gate.example.edu:22".to_string()
        }
    }

    const PDF: &[u8] = b"%PDF-1.5\n% conroy 2013\n";

    struct Fixture {
        server: ServerGuard,
        dir: TempDir,
        store: Arc<SqliteCollection>,
    }

    impl Fixture {
        async fn new() -> Self {
            let server = Server::new_async().await;
            let dir = TempDir::new().unwrap();
            let store = Arc::new(SqliteCollection::in_memory(&dir.path().join("files")).unwrap());
            Self { server, dir, store }
        }

        fn pipeline(&self, options: PipelineOptions) -> Pipeline {
            self.pipeline_with(DocumentFetcher::new(Duration::from_secs(5)).unwrap(), options)
        }

        fn pipeline_with(&self, fetcher: DocumentFetcher, options: PipelineOptions) -> Pipeline {
            let ads = AdsClient::new_for_tests(&self.server.url(), Some("test-token"));
            Pipeline::new(ads, fetcher, self.store.clone(), options)
        }

        fn count(&self) -> usize {
            self.store.database().count_entries().unwrap()
        }

        async fn mock_search(&mut self, query: &str, doc: serde_json::Value) -> mockito::Mock {
            let body = json!({"response": {"numFound": 1, "docs": [doc]}}).to_string();
            self.server
                .mock("GET", "/search/query")
                .match_query(Matcher::UrlEncoded("q".to_string(), query.to_string()))
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(body)
                .create_async()
                .await
        }

        async fn mock_export(&mut self) -> mockito::Mock {
            self.server
                .mock("POST", "/export/bibtex")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!({"export": "@ARTICLE{key,\n}"}).to_string())
                .create_async()
                .await
        }
    }

    fn conroy(esources: &[&str]) -> serde_json::Value {
        json!({
            "bibcode": "2013ARA&A..51..105C",
            "alternate_bibcode": ["2013arXiv1301.7095C"],
            "identifier": ["2013ARA&A..51..105C", "arXiv:1301.7095"],
            "title": ["Modeling the Panchromatic Spectral Energy Distributions of Galaxies"],
            "author": ["Conroy, Charlie"],
            "year": "2013",
            "doi": ["10.1146/annurev-astro-082812-141017"],
            "esources": esources
        })
    }

    #[tokio::test]
    async fn bibcode_with_eprint_is_inserted_then_unchanged() {
        let mut fx = Fixture::new().await;
        let _search = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&["EPRINT_PDF", "PUB_PDF"]))
            .await;
        let _export = fx.mock_export().await;
        let eprint = fx
            .server
            .mock("GET", Matcher::Regex(r"/EPRINT_PDF$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body(PDF)
            .expect(1)
            .create_async()
            .await;

        let pipeline = fx.pipeline(PipelineOptions::default());
        let first = pipeline.process("2013ARA&A..51..105C").await.unwrap();
        assert_eq!(first.outcome, ReconcileOutcome::Inserted);
        assert!(matches!(
            first.document,
            DocumentStatus::Attached { path: DeliveryPath::Direct, .. }
        ));
        assert!(first.attachment.as_deref().unwrap().ends_with("2013ARA_A..51..105C.pdf"));

        let second = pipeline.process("2013ARA&A..51..105C").await.unwrap();
        assert_eq!(second.outcome, ReconcileOutcome::Unchanged);
        assert!(matches!(second.document, DocumentStatus::AlreadyAttached));

        eprint.assert_async().await;
        assert_eq!(fx.count(), 1);
        assert_eq!(std::fs::read_dir(fx.dir.path().join("files")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn doi_entry_is_keyed_by_bibcode() {
        let mut fx = Fixture::new().await;
        let _search = fx
            .mock_search("doi:\"10.1146/annurev-astro-082812-141017\"", conroy(&[]))
            .await;
        let _export = fx.mock_export().await;

        let pipeline = fx.pipeline(PipelineOptions::default());
        let report = pipeline
            .process("https://doi.org/10.1146/annurev-astro-082812-141017")
            .await
            .unwrap();

        assert_eq!(report.dedup_key, "2013ARA&A..51..105C");
        assert_eq!(report.identifier.kind(), "doi");
        assert!(fx.store.find_by_key("2013ARA&A..51..105C").unwrap().is_some());
    }

    #[tokio::test]
    async fn arxiv_form_of_stored_article_is_unchanged() {
        let mut fx = Fixture::new().await;
        let _by_bibcode = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&[]))
            .await;
        let _by_arxiv = fx
            .mock_search("identifier:\"arXiv:1301.7095\"", conroy(&[]))
            .await;
        let _export = fx.mock_export().await;

        let pipeline = fx.pipeline(PipelineOptions {
            download_pdf: false,
            ..PipelineOptions::default()
        });
        pipeline.process("2013ARA&A..51..105C").await.unwrap();
        let again = pipeline.process("arXiv:1301.7095").await.unwrap();

        assert_eq!(again.outcome, ReconcileOutcome::Unchanged);
        assert!(matches!(again.document, DocumentStatus::Skipped));
        assert_eq!(fx.count(), 1);
    }

    #[tokio::test]
    async fn paywalled_article_is_stored_without_document() {
        let mut fx = Fixture::new().await;
        let _search = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&["PUB_PDF", "PUB_HTML"]))
            .await;
        let _export = fx.mock_export().await;
        let _pub_pdf = fx
            .server
            .mock("GET", Matcher::Regex(r"/PUB_PDF$".to_string()))
            .with_status(403)
            .create_async()
            .await;
        let _pub_html = fx
            .server
            .mock("GET", Matcher::Regex(r"/PUB_HTML$".to_string()))
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body>Subscribe to read</body></html>")
            .create_async()
            .await;

        let pipeline = fx.pipeline(PipelineOptions::default());
        let report = pipeline.process("2013ARA&A..51..105C").await.unwrap();

        assert_eq!(report.outcome, ReconcileOutcome::Inserted);
        assert!(report.attachment.is_none());
        match report.document {
            DocumentStatus::Unavailable(unavailable) => {
                assert_eq!(
                    unavailable.attempted_paths(),
                    vec![DeliveryPath::Direct, DeliveryPath::Gateway]
                );
                assert_eq!(unavailable.attempts[1].reason, "HTTP 403");
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert!(fx.store.find_by_key("2013ARA&A..51..105C").unwrap().is_some());
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let mut fx = Fixture::new().await;
        let _found = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&[]))
            .await;
        let _missing = fx
            .server
            .mock("GET", "/search/query")
            .match_query(Matcher::UrlEncoded("q".to_string(), "no such paper".to_string()))
            .with_status(200)
            .with_body(json!({"response": {"numFound": 0, "docs": []}}).to_string())
            .create_async()
            .await;
        let _export = fx.mock_export().await;

        let pipeline = fx.pipeline(PipelineOptions {
            download_pdf: false,
            concurrency: 2,
            ..PipelineOptions::default()
        });
        let inputs = vec!["no such paper".to_string(), "2013ARA&A..51..105C".to_string()];
        let results = pipeline.process_all(&inputs).await;

        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.input, "no such paper");
        assert_eq!(err.stage, Stage::Resolve);
        assert!(matches!(err.source, ScienceError::NotFound(_)));
        assert_eq!(results[1].as_ref().unwrap().outcome, ReconcileOutcome::Inserted);
    }

    #[tokio::test]
    async fn dry_run_leaves_collection_empty() {
        let mut fx = Fixture::new().await;
        let _search = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&["EPRINT_PDF"]))
            .await;
        let _export = fx.mock_export().await;
        let _eprint = fx
            .server
            .mock("GET", Matcher::Regex(r"/EPRINT_PDF$".to_string()))
            .with_status(200)
            .with_body(PDF)
            .create_async()
            .await;

        let pipeline = fx.pipeline(PipelineOptions {
            dry_run: true,
            ..PipelineOptions::default()
        });
        let report = pipeline.process("2013ARA&A..51..105C").await.unwrap();

        assert_eq!(report.outcome, ReconcileOutcome::Inserted);
        assert_eq!(fx.count(), 0);
        assert!(!fx.dir.path().join("files").exists());
    }

    #[tokio::test]
    async fn every_path_failing_still_stores_metadata() {
        let mut fx = Fixture::new().await;
        let _search = fx
            .mock_search("identifier:\"2013ARA&A..51..105C\"", conroy(&["PUB_PDF"]))
            .await;
        let _export = fx.mock_export().await;
        let _pub_pdf = fx
            .server
            .mock("GET", Matcher::Regex(r"/PUB_PDF$".to_string()))
            .with_status(403)
            .create_async()
            .await;

        let fetcher = DocumentFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_relay(Arc::new(UnreachableRelay));
        let pipeline = fx.pipeline_with(fetcher, PipelineOptions::default());
        let report = pipeline.process("2013ARA&A..51..105C").await.unwrap();

        assert_eq!(report.outcome, ReconcileOutcome::Inserted);
        assert!(report.attachment.is_none());
        match report.document {
            DocumentStatus::Unavailable(unavailable) => {
                assert_eq!(unavailable.attempted_paths(), DeliveryPath::DEFAULT_POLICY.to_vec());
                assert!(unavailable.attempts[2].reason.contains("timed out"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        let stored = fx.store.find_by_key("2013ARA&A..51..105C").unwrap().unwrap();
        assert!(stored.attachment.is_none());
        assert_eq!(fx.count(), 1);
    }

    fn series_doc(bibcode: &str, numeral: &str) -> serde_json::Value {
        json!({
            "bibcode": bibcode,
            "title": [format!("The Dark Energy Survey: Cosmology Results from Weak Lensing. {numeral}")],
            "author": ["Smith, Jane"],
            "year": "2020",
            "esources": ["EPRINT_PDF"]
        })
    }

    #[tokio::test]
    async fn second_series_paper_gets_its_own_entry_and_document() {
        let mut fx = Fixture::new().await;
        let _first = fx
            .mock_search("identifier:\"2020ApJ...900....1S\"", series_doc("2020ApJ...900....1S", "I"))
            .await;
        let _second = fx
            .mock_search("identifier:\"2020ApJ...901....2S\"", series_doc("2020ApJ...901....2S", "II"))
            .await;
        let _export = fx.mock_export().await;
        let first_pdf = fx
            .server
            .mock("GET", Matcher::Regex(r"/2020ApJ\.\.\.900\.\.\.\.1S/EPRINT_PDF$".to_string()))
            .with_status(200)
            .with_body(b"%PDF-1.5 paper one")
            .expect(1)
            .create_async()
            .await;
        let second_pdf = fx
            .server
            .mock("GET", Matcher::Regex(r"/2020ApJ\.\.\.901\.\.\.\.2S/EPRINT_PDF$".to_string()))
            .with_status(200)
            .with_body(b"%PDF-1.5 paper two")
            .expect(1)
            .create_async()
            .await;

        let pipeline = fx.pipeline(PipelineOptions::default());
        pipeline.process("2020ApJ...900....1S").await.unwrap();
        let second = pipeline.process("2020ApJ...901....2S").await.unwrap();

        first_pdf.assert_async().await;
        second_pdf.assert_async().await;
        assert_eq!(second.outcome, ReconcileOutcome::Inserted);
        assert!(matches!(second.document, DocumentStatus::Attached { .. }));
        assert_eq!(fx.count(), 2);

        let paper_one = fx.store.find_by_key("2020ApJ...900....1S").unwrap().unwrap();
        let paper_two = fx.store.find_by_key("2020ApJ...901....2S").unwrap().unwrap();
        assert_ne!(
            paper_one.attachment.unwrap().sha256,
            paper_two.attachment.unwrap().sha256
        );
    }
}
