pub mod corpus;
pub mod dates;
pub mod iso_date;
pub mod metadata;
pub mod phase;
pub mod signals;
pub mod text;
pub mod timeline;

pub use corpus::{HistoricalDealRecord, RecordMetadata};
pub use metadata::DealMetadata;
pub use phase::{Phase, Sentiment};
pub use timeline::{MentionKind, TimelineEvent};
