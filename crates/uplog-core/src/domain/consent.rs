//! User consent and the upload gate
//!
//! [`ConsentState`] combines account presence with two data policies. The
//! rules in this module decide three things:
//!
//! 1. whether uploading is currently permitted ([`ConsentState::is_upload_allowed`]),
//! 2. whether a consent change must purge every queued report
//!    ([`should_drop_queue`]),
//! 3. what to do with a specific report once it reaches the head of the
//!    queue ([`ConsentState::screen`]).
//!
//! ## Drop asymmetry
//!
//! | old state              | new state              | queue  |
//! |------------------------|------------------------|--------|
//! | no account             | account present        | kept   |
//! | account A              | account B / no account | purged |
//! | no account, allowed    | no account, denied     | purged |
//! | no account, denied     | no account, denied     | kept   |
//!
//! A new identity must never inherit data cached for another one, while a
//! user signing in keeps the data recorded just before.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::report::{Report, ReportVariant};

/// Whether data may be collected at all when no account is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousDataPolicy {
    /// Anonymous data may be collected
    Allow,
    /// Anonymous data must not be collected
    #[default]
    Deny,
}

/// Whether data collected without an account may be uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountlessPersonalDataPolicy {
    /// Data recorded while signed out may be uploaded
    AllowUpload,
    /// Data recorded while signed out is retained but never uploaded
    #[default]
    DenyUpload,
}

/// Outcome of screening one report against the current consent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screening {
    /// The report may be uploaded
    Upload,
    /// The report must be deleted without upload
    Discard,
    /// The report leaves the queue but stays on disk
    Skip,
}

/// Snapshot of the user's consent
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentState {
    /// Identifier of the signed-in account, if any
    pub account: Option<String>,
    /// Collection policy for anonymous data
    pub anonymous_data: AnonymousDataPolicy,
    /// Upload policy for data recorded while signed out
    pub accountless_personal_data: AccountlessPersonalDataPolicy,
    /// When `account` was last set
    pub account_changed_at: Option<DateTime<Utc>>,
}

impl ConsentState {
    /// Signed-out state with the given policies
    pub fn anonymous(
        anonymous_data: AnonymousDataPolicy,
        accountless_personal_data: AccountlessPersonalDataPolicy,
    ) -> Self {
        Self {
            account: None,
            anonymous_data,
            accountless_personal_data,
            account_changed_at: None,
        }
    }

    /// Signed-in state, stamped with the current time
    pub fn signed_in(account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            account_changed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Sets the accountless upload policy
    pub fn with_accountless_policy(mut self, policy: AccountlessPersonalDataPolicy) -> Self {
        self.accountless_personal_data = policy;
        self
    }

    /// Overrides the account change time
    pub fn with_account_changed_at(mut self, at: DateTime<Utc>) -> Self {
        self.account_changed_at = Some(at);
        self
    }

    /// Whether an account is signed in
    pub fn has_account(&self) -> bool {
        self.account.is_some()
    }

    /// Upload is permitted with an account, or when both anonymous
    /// collection and accountless upload are allowed.
    pub fn is_upload_allowed(&self) -> bool {
        self.account.is_some()
            || (self.anonymous_data == AnonymousDataPolicy::Allow
                && self.accountless_personal_data == AccountlessPersonalDataPolicy::AllowUpload)
    }

    /// Decides what happens to `report` under this consent
    ///
    /// `paired` is set for kinds that write a full report next to a redacted
    /// `.anon` copy.
    ///
    /// | account | accountless upload | report                  | outcome |
    /// |---------|--------------------|-------------------------|---------|
    /// | none    | any                | full, paired kind       | skip    |
    /// | present | denied             | created before sign-in  | discard |
    /// | present | allowed            | redacted, paired kind   | discard |
    /// | any     | any                | anything else           | upload  |
    ///
    /// A skipped full report stays on disk for a later signed-in session.
    ///
    /// When `account_changed_at` is unknown nothing counts as recorded before
    /// sign-in. That is the state after a restart under an unchanged account,
    /// and its backlog belongs to that account.
    pub fn screen(&self, report: &Report, paired: bool) -> Screening {
        let redacted = report.variant() == ReportVariant::Redacted;

        if self.account.is_none() {
            return if paired && !redacted {
                Screening::Skip
            } else {
                Screening::Upload
            };
        }

        match self.accountless_personal_data {
            AccountlessPersonalDataPolicy::DenyUpload => match self.account_changed_at {
                Some(changed_at) if report.created_at() < changed_at => Screening::Discard,
                _ => Screening::Upload,
            },
            AccountlessPersonalDataPolicy::AllowUpload if paired && redacted => Screening::Discard,
            AccountlessPersonalDataPolicy::AllowUpload => Screening::Upload,
        }
    }
}

/// Whether moving from `old` to `new` consent must purge the pending queue
pub fn should_drop_queue(old: &ConsentState, new: &ConsentState) -> bool {
    if old == new {
        return false;
    }

    match (&old.account, &new.account) {
        // Switching or signing out: cached data belongs to the previous identity
        (Some(previous), Some(current)) => previous != current,
        (Some(_), None) => true,
        // Signing in keeps what was recorded before
        (None, Some(_)) => false,
        (None, None) => old.is_upload_allowed() && !new.is_upload_allowed(),
    }
}
