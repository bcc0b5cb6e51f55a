/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Error type shared by all fallible model operations.
//!
//! Mutating operations report invariant violations through errors rather than
//! aborting, so an embedder can decide how loudly to fail. Errors for which
//! [`IsolationError::is_fatal`] returns true mean the model detected a state
//! that would have let two principals share a process they must not share,
//! and the embedder should treat the renderer in question as compromised.

use std::fmt;

use base::id::{BrowsingInstanceId, RendererProcessId, SiteInstanceGroupId, SiteInstanceId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IsolationError {
    /// The site instance already has a site assigned. A site can be assigned
    /// exactly once.
    SiteAlreadySet(SiteInstanceId),
    /// A site instance without a site was queried or mutated in a way that
    /// requires one.
    SiteNotSet(SiteInstanceId),
    /// A process could not be locked because it already carries a lock that
    /// contradicts the requested one.
    ProcessLockMismatch {
        process: RendererProcessId,
        current: String,
        requested: String,
    },
    /// The storage partition recorded when the partition was first queried
    /// does not match the partition of the site being assigned.
    StoragePartitionMismatch {
        site_instance: SiteInstanceId,
        expected: String,
        actual: String,
    },
    /// The web-exposed isolation state of a navigation does not match the
    /// state of the browsing instance it was placed in.
    IsolationStateMismatch(BrowsingInstanceId),
    UnknownBrowsingInstance(BrowsingInstanceId),
    UnknownSiteInstance(SiteInstanceId),
    UnknownSiteInstanceGroup(SiteInstanceGroupId),
    UnknownRendererProcess(RendererProcessId),
}

impl IsolationError {
    /// Whether this error indicates a broken security invariant rather than
    /// a stale handle.
    pub fn is_fatal(&self) -> bool {
        match *self {
            IsolationError::SiteAlreadySet(_) |
            IsolationError::ProcessLockMismatch { .. } |
            IsolationError::StoragePartitionMismatch { .. } |
            IsolationError::IsolationStateMismatch(_) => true,
            IsolationError::SiteNotSet(_) |
            IsolationError::UnknownBrowsingInstance(_) |
            IsolationError::UnknownSiteInstance(_) |
            IsolationError::UnknownSiteInstanceGroup(_) |
            IsolationError::UnknownRendererProcess(_) => false,
        }
    }
}

impl fmt::Display for IsolationError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IsolationError::SiteAlreadySet(id) => {
                write!(formatter, "site instance {} already has a site", id)
            },
            IsolationError::SiteNotSet(id) => {
                write!(formatter, "site instance {} has no site", id)
            },
            IsolationError::ProcessLockMismatch {
                process,
                ref current,
                ref requested,
            } => write!(
                formatter,
                "process {} is locked to {} but {} was requested",
                process, current, requested
            ),
            IsolationError::StoragePartitionMismatch {
                site_instance,
                ref expected,
                ref actual,
            } => write!(
                formatter,
                "site instance {} was placed in partition {} but its site uses {}",
                site_instance, expected, actual
            ),
            IsolationError::IsolationStateMismatch(id) => write!(
                formatter,
                "web-exposed isolation state does not match browsing instance {}",
                id
            ),
            IsolationError::UnknownBrowsingInstance(id) => {
                write!(formatter, "no browsing instance with id {}", id)
            },
            IsolationError::UnknownSiteInstance(id) => {
                write!(formatter, "no site instance with id {}", id)
            },
            IsolationError::UnknownSiteInstanceGroup(id) => {
                write!(formatter, "no site instance group with id {}", id)
            },
            IsolationError::UnknownRendererProcess(id) => {
                write!(formatter, "no renderer process with id {}", id)
            },
        }
    }
}
