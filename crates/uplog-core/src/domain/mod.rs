//! Domain layer
//!
//! Pure business types for the report upload engine:
//!
//! - [`report`] - A cached diagnostic file and its redaction variant
//! - [`kind`] - The four report kinds and their per-kind parameters
//! - [`consent`] - User consent state and the upload gate rules
//! - [`queue`] - Ordered, duplicate-free pending queue
//! - [`session`] - The upload session state machine
//! - [`errors`] - Domain error types

pub mod consent;
pub mod errors;
pub mod kind;
pub mod queue;
pub mod report;
pub mod session;

pub use consent::{AccountlessPersonalDataPolicy, AnonymousDataPolicy, ConsentState, Screening};
pub use errors::DomainError;
pub use kind::ReportKind;
pub use queue::PendingQueue;
pub use report::{Report, ReportVariant};
pub use session::{
    DeleteReason, FailureClass, SessionCommand, SessionEvent, SessionState, TransferId,
    Transition, UploadSession,
};
