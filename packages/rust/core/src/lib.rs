//! Core pipeline orchestration and domain logic for WriterPack.
//!
//! This crate ties together trend keywords, research, internal link
//! suggestions and drafting into one run that yields a [`WriterPack`]
//! (see [`pipeline::Orchestrator`]). External services are reached only
//! through the traits in [`capabilities`].
//!
//! [`WriterPack`]: writerpack_shared::WriterPack

pub mod capabilities;
pub mod clock;
pub mod links;
pub mod parse;
pub mod pipeline;
pub mod research;
pub mod retry;
pub mod trends;
pub mod writer;

#[cfg(test)]
pub mod test_support;

pub use capabilities::{
    DraftModel, MemoryTrendCache, PackLog, PublishSink, PublishedDraft, ResearchModel, SiteSearch,
    TextGenerator, TrendCache, TrendRow, TrendSource,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use pipeline::{
    Capabilities, Orchestrator, PipelineRequest, PipelineRun, PipelineSettings, PipelineState,
    ProgressReporter, PublishOutcome, PublishRequest, SilentProgress, SinkOutcome,
};
pub use retry::RetryPolicy;
