//! Cancellable render task pipeline.
//!
//! Content blocks that take a while to turn into something displayable
//! (diagrams, formulas) are registered as tasks while the document is
//! built, stand in the document as placeholders, and are rendered together
//! once the document is in place.
//!
//! # Architecture
//! - [`AsyncTaskManager`] owns the pending queue and the current
//!   [`Generation`]. A batch fans out on a single task and applies results
//!   in completion order, consulting the [`RenderCache`](folio_cache::RenderCache)
//!   before each renderer call.
//! - [`PlaceholderReconciler`] re-validates a placeholder's source hash
//!   before painting a result onto it, so a slow result never lands on a
//!   node that has since been regenerated for different content.
//! - [`Document`] and [`Renderer`] are the only views this crate has of
//!   the outside world.

mod config;
mod document;
pub mod error;
mod generation;
mod manager;
pub mod markup;
mod reconcile;
mod task;

pub use crate::config::PipelineConfig;
pub use crate::document::{Document, MemoryDocument, Mutation, NodeId};
pub use crate::generation::Generation;
pub use crate::manager::{AsyncTaskManager, BatchReport, Progress};
pub use crate::reconcile::{PlaceholderReconciler, Reconciliation};
pub use crate::task::{CreatedTask, InitialStatus, Renderer, RendererHandle, TaskId, TaskResolver};
