//! Pipeline d'import : fenêtrage, groupement, écriture concurrente bornée
//!
//! ```text
//! FeatureSource → Window(offset, limit) → Batcher(batch_size) → BoundedSink(max_concurrency)
//!                                                                   │
//!                                               RowWriter::write_rows(batch)
//!                                                                   │ échec
//!                                              réconciliation ligne à ligne
//! ```

pub mod batcher;
pub mod orchestrator;
pub mod sink;
pub mod types;
pub mod window;
pub mod writer;

pub use batcher::Batcher;
pub use orchestrator::{run_import, run_import_detailed};
pub use sink::{BoundedSink, SinkHandler, SinkState};
pub use types::{Batch, BatchId, EndReason, ImportOutcome, ProcessResult, RowFailure};
pub use window::{Admission, Window};
pub use writer::RowWriter;
