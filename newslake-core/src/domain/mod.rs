//! Domain types: windows, article records, batches, gold feature rows.

pub mod article;
pub mod batch;
pub mod gold;
pub mod window;

pub use article::{article_id, dedupe_records, ArticleRecord, SilverRecord};
pub use batch::{BronzeBatch, FetchMetadata, QueryOutcome, QueryStatus};
pub use gold::{ranked_from_string, ranked_to_string, GoldFeatureRow, RankedCount};
pub use window::FetchWindow;
