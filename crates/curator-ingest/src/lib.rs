//! Bulk child ingest.
//!
//! One [`BatchItemProcessor`] call turns an uploaded file into a child node
//! and a media record inside a single unit of work. The
//! [`BatchCoordinator`] drives those calls over a whole upload set and
//! reports the outcome through a status messenger.

pub mod access;
pub mod coordinator;
pub mod field;
pub mod processor;
pub mod validation;

pub use access::{check_add_children, AccessPolicy, AllowAll};
pub use coordinator::{BatchCoordinator, BatchReport, BatchRun, StepOutcome};
pub use field::FieldResolver;
pub use processor::{BatchItemProcessor, ItemOutcome};
pub use validation::{Validate, ValidationAggregator};
