// Data layer for the pipeline core: the content item unit of work and the
// persistence seam it flows through.

pub mod content_item;
pub mod repository;

pub use content_item::{
    compute_fingerprint, AuditEntry, ContentItem, FailureRecord, PerformanceSnapshot, StageOutputs,
};
pub use repository::{InMemoryItemRepository, ItemRepository, ReadyFilter};
