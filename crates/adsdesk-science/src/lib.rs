//! Resolves astronomy paper identifiers through NASA ADS, retrieves their
//! full text and files them into the local collection.

pub mod ads;
pub mod error;
pub mod fetch;
pub mod http;
pub mod identifiers;
pub mod pipeline;
pub mod reconcile;
pub mod record;

pub use ads::AdsClient;
pub use error::{PipelineError, Result, ScienceError, Stage, Unavailable};
pub use fetch::relay::{Relay, RelaySession, SshRelay};
pub use fetch::{DocumentFetcher, DocumentUnavailable, FetchAttempt, FetchOutcome, FetchedDocument};
pub use identifiers::{Identifier, classify};
pub use pipeline::{ArticleReport, DocumentStatus, Pipeline, PipelineOptions};
pub use reconcile::{MatchRoute, ReconcileOptions, ReconcileOutcome, ReconcileReport, Reconciler};
pub use record::{Candidate, CanonicalRecord, DeliveryPath, DocumentLocation, LinkKind};
