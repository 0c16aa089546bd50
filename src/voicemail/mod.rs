//! # Voicemail Pipeline
//!
//! The three event handlers and the pieces they share:
//!
//! - [`processing`]: queue batch of call records → reconstructed recordings in storage
//! - [`transcribe`]: recording created → transcription job started
//! - [`packaging`]: transcript created → call record updated, message posted, call routed

pub mod packaging;
pub mod processing;
pub mod publisher;
pub mod record;
pub mod session;
pub mod transcribe;

pub use packaging::{PackagingOrchestrator, PackagingResult, RoutingPolicy};
pub use processing::{AudioProcessingHandler, BatchSummary};
pub use publisher::ArtifactPublisher;
pub use record::{ObjectCreatedEvent, QueueBatch};
pub use transcribe::{RecordingTranscriber, TranscribeOutcome};
