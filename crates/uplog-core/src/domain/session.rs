//! Upload session state machine
//!
//! The [`UploadSession`] owns the pending queue and reconciles four
//! independently changing inputs: newly discovered reports, connectivity,
//! user consent, and the completion of the single in-flight transfer.
//!
//! The session never performs I/O. [`UploadSession::handle`] takes one
//! [`SessionEvent`] and returns a [`Transition`]: the resulting state plus the
//! side effects the runtime must carry out (start or cancel a transfer,
//! delete files). This keeps the state machine testable without a
//! filesystem or network.
//!
//! ## States
//!
//! ```text
//!              queue non-empty + online + allowed
//!   Idle ───────────────────────────────────────────▶ Uploading
//!    ▲                                                  │   │
//!    │ queue drained        success / permanent failure │   │ transient failure,
//!    └──────────────────────────────────────────────────┘   │ rejected request
//!                                                           ▼
//!                                   Suspended ◀─────────────┘
//!                                   (work kept, waits for the next trigger)
//! ```
//!
//! At most one transfer is in flight: a transfer is only started while no
//! other one is recorded, and the record is only cleared by that transfer's
//! own completion.
//!
//! ## Startup sweep
//!
//! Live notifications may arrive before the collector's startup batch. Until
//! that batch is handled the session remembers every location it deleted or
//! skipped, and the batch is filtered against them so a report already
//! settled is not queued a second time.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::consent::{should_drop_queue, ConsentState, Screening};
use super::queue::PendingQueue;
use super::report::Report;

// ============================================================================
// Identifiers and classifications
// ============================================================================

/// Identifies one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upload session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing queued
    #[default]
    Idle,
    /// One transfer in flight
    Uploading,
    /// Work queued but no transfer running: offline, upload disallowed,
    /// or waiting for a trigger after a failure
    Suspended,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Uploading => "uploading",
            SessionState::Suspended => "suspended",
        };
        write!(f, "{}", s)
    }
}

/// How a failed transfer affects its report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The report itself is bad: delete it and move on to the next one
    Permanent,
    /// The request was refused as malformed: delete the report and stop
    /// until the next trigger
    Rejected,
    /// Connectivity problem or cancellation: keep the report at the head
    Transient,
}

/// Why files are being deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteReason {
    /// Accepted by the collection service
    Uploaded,
    /// Unreadable or refused as structurally invalid
    Invalid,
    /// Part of a request refused as malformed
    Rejected,
    /// Purged by a consent change
    ConsentRevoked,
    /// Recorded before sign-in without consent to upload it
    Screened,
}

impl DeleteReason {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteReason::Uploaded => "uploaded",
            DeleteReason::Invalid => "invalid",
            DeleteReason::Rejected => "rejected",
            DeleteReason::ConsentRevoked => "consent_revoked",
            DeleteReason::Screened => "screened",
        }
    }
}

// ============================================================================
// Events, commands, transitions
// ============================================================================

/// Something that happened outside the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Reports were announced by producers
    ReportsQueued(Vec<Report>),
    /// The startup sweep listed the reports already on disk
    ReportsCollected(Vec<Report>),
    /// Reachability of the collection service changed
    ConnectivityChanged(bool),
    /// The user's consent changed to the given state
    ConsentChanged(ConsentState),
    /// A transfer started by this session completed
    TransferFinished {
        /// Transfer that completed
        id: TransferId,
        /// `Ok` when the service accepted the report
        result: Result<(), FailureClass>,
    },
}

/// Side effect the runtime must perform
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Start uploading `report`
    StartTransfer {
        /// Identifier to report back in [`SessionEvent::TransferFinished`]
        id: TransferId,
        /// Report to upload
        report: Report,
        /// Account to attribute the upload to
        account: Option<String>,
    },
    /// Cancel the given transfer; its completion will still be delivered
    CancelTransfer(TransferId),
    /// Delete report files from disk
    DeleteFiles {
        /// Files to delete
        locations: Vec<PathBuf>,
        /// Why they are deleted
        reason: DeleteReason,
    },
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State after the event
    pub state: SessionState,
    /// Side effects to perform, in order
    pub commands: Vec<SessionCommand>,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: TransferId,
    report: Report,
    cancelling: bool,
    /// A trigger arrived while cancelling; restart once the cancellation lands
    resume_on_settle: bool,
}

// ============================================================================
// UploadSession
// ============================================================================

/// Upload state machine of one engine instance
#[derive(Debug)]
pub struct UploadSession {
    queue: PendingQueue,
    consent: ConsentState,
    online: bool,
    in_flight: Option<InFlight>,
    state: SessionState,
    next_transfer: u64,
    /// The kind writes redacted `.anon` copies next to full reports
    paired_variants: bool,
    /// Set once the startup batch has been handled
    collected: bool,
    /// Locations dequeued before the startup batch arrived
    settled_before_sweep: HashSet<PathBuf>,
}

impl UploadSession {
    /// Creates an idle session with an empty queue
    pub fn new(consent: ConsentState, online: bool) -> Self {
        Self {
            queue: PendingQueue::new(),
            consent,
            online,
            in_flight: None,
            state: SessionState::Idle,
            next_transfer: 1,
            paired_variants: false,
            collected: false,
            settled_before_sweep: HashSet::new(),
        }
    }

    /// Screens reports as full/redacted pairs
    pub fn with_paired_variants(mut self, paired: bool) -> Self {
        self.paired_variants = paired;
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pending queue, including the report being uploaded
    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Consent the session currently applies
    pub fn consent(&self) -> &ConsentState {
        &self.consent
    }

    /// Last known reachability
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Report currently being uploaded
    pub fn current(&self) -> Option<&Report> {
        self.in_flight.as_ref().map(|f| &f.report)
    }

    /// Identifier of the transfer currently in flight
    pub fn current_transfer(&self) -> Option<TransferId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    /// Applies one event and returns the resulting transition
    pub fn handle(&mut self, event: SessionEvent) -> Transition {
        let mut commands = Vec::new();

        match event {
            SessionEvent::ReportsQueued(batch) => {
                if self.queue.append(batch) > 0 {
                    self.reconsider(&mut commands);
                }
            }
            SessionEvent::ReportsCollected(batch) => {
                self.collected = true;
                let settled = std::mem::take(&mut self.settled_before_sweep);
                let fresh = batch
                    .into_iter()
                    .filter(|r| !settled.contains(r.location()));
                if self.queue.append(fresh) > 0 {
                    self.reconsider(&mut commands);
                }
            }
            SessionEvent::ConnectivityChanged(online) => {
                self.on_connectivity_changed(online, &mut commands);
            }
            SessionEvent::ConsentChanged(consent) => {
                self.on_consent_changed(consent, &mut commands);
            }
            SessionEvent::TransferFinished { id, result } => {
                self.on_transfer_finished(id, result, &mut commands);
            }
        }

        if !self.collected {
            for command in &commands {
                if let SessionCommand::DeleteFiles { locations, .. } = command {
                    self.settled_before_sweep.extend(locations.iter().cloned());
                }
            }
        }

        self.settle();
        Transition {
            state: self.state,
            commands,
        }
    }

    fn on_connectivity_changed(&mut self, online: bool, commands: &mut Vec<SessionCommand>) {
        if online == self.online {
            return;
        }
        self.online = online;

        if online {
            self.reconsider(commands);
        } else {
            // Do not wait for a timeout
            self.cancel_in_flight(commands);
        }
    }

    fn on_consent_changed(&mut self, consent: ConsentState, commands: &mut Vec<SessionCommand>) {
        if consent == self.consent {
            return;
        }
        let old = std::mem::replace(&mut self.consent, consent);

        if should_drop_queue(&old, &self.consent) {
            self.cancel_in_flight(commands);
            let locations = self.queue.drop_all();
            if !locations.is_empty() {
                commands.push(SessionCommand::DeleteFiles {
                    locations,
                    reason: DeleteReason::ConsentRevoked,
                });
            }
        } else if !self.consent.is_upload_allowed() {
            self.cancel_in_flight(commands);
        }

        if self.consent.is_upload_allowed() {
            self.reconsider(commands);
        }
    }

    fn on_transfer_finished(
        &mut self,
        id: TransferId,
        result: Result<(), FailureClass>,
        commands: &mut Vec<SessionCommand>,
    ) {
        if self.current_transfer() != Some(id) {
            return;
        }
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        // The report may have been purged while the transfer was running
        let location = flight.report.location().to_path_buf();
        let still_queued = self.queue.contains(&location);

        match result {
            Ok(()) => {
                if still_queued {
                    self.queue.remove(&location);
                    let mut locations = vec![location];
                    let sibling = self
                        .queue
                        .sibling_of(&flight.report)
                        .map(|r| r.location().to_path_buf());
                    if let Some(sibling) = sibling {
                        self.queue.remove(&sibling);
                        locations.push(sibling);
                    }
                    commands.push(SessionCommand::DeleteFiles {
                        locations,
                        reason: DeleteReason::Uploaded,
                    });
                }
                self.advance(commands);
            }
            Err(FailureClass::Permanent) => {
                if still_queued {
                    self.queue.remove(&location);
                    commands.push(SessionCommand::DeleteFiles {
                        locations: vec![location],
                        reason: DeleteReason::Invalid,
                    });
                }
                self.advance(commands);
            }
            Err(FailureClass::Rejected) => {
                if still_queued {
                    self.queue.remove(&location);
                    commands.push(SessionCommand::DeleteFiles {
                        locations: vec![location],
                        reason: DeleteReason::Rejected,
                    });
                }
            }
            Err(FailureClass::Transient) => {
                if flight.resume_on_settle {
                    self.advance(commands);
                }
            }
        }
    }

    /// Re-evaluates after a trigger: starts the head if possible, or
    /// remembers the trigger if a cancellation is still landing.
    fn reconsider(&mut self, commands: &mut Vec<SessionCommand>) {
        match self.in_flight.as_mut() {
            Some(flight) => {
                if flight.cancelling {
                    flight.resume_on_settle = true;
                }
            }
            None => self.advance(commands),
        }
    }

    /// Starts the head of the queue if nothing is in flight and conditions hold
    fn advance(&mut self, commands: &mut Vec<SessionCommand>) {
        while self.in_flight.is_none() {
            if !self.online || !self.consent.is_upload_allowed() {
                break;
            }
            let Some(head) = self.queue.peek_head() else {
                break;
            };

            match self.consent.screen(head, self.paired_variants) {
                Screening::Upload => {}
                Screening::Discard => {
                    let location = head.location().to_path_buf();
                    self.queue.remove(&location);
                    commands.push(SessionCommand::DeleteFiles {
                        locations: vec![location],
                        reason: DeleteReason::Screened,
                    });
                    continue;
                }
                Screening::Skip => {
                    let location = head.location().to_path_buf();
                    self.queue.remove(&location);
                    if !self.collected {
                        self.settled_before_sweep.insert(location);
                    }
                    continue;
                }
            }

            let report = head.clone();
            let id = TransferId(self.next_transfer);
            self.next_transfer += 1;

            commands.push(SessionCommand::StartTransfer {
                id,
                report: report.clone(),
                account: self.consent.account.clone(),
            });
            self.in_flight = Some(InFlight {
                id,
                report,
                cancelling: false,
                resume_on_settle: false,
            });
        }
    }

    fn cancel_in_flight(&mut self, commands: &mut Vec<SessionCommand>) {
        if let Some(flight) = self.in_flight.as_mut() {
            if !flight.cancelling {
                flight.cancelling = true;
                commands.push(SessionCommand::CancelTransfer(flight.id));
            }
            flight.resume_on_settle = false;
        }
    }

    fn settle(&mut self) {
        self.state = if self.in_flight.is_some() {
            SessionState::Uploading
        } else if self.queue.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Suspended
        };
    }
}
