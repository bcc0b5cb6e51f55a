/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Site instance records.

use base::id::{BrowsingInstanceId, SiteInstanceGroupId, SiteInstanceId};
use bulkhead_url::BulkheadUrl;
use rustc_hash::FxHashSet;

use crate::site_info::SiteInfo;
use crate::url_info::StoragePartitionConfig;

/// How aggressively a site instance reuses existing processes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessReusePolicy {
    /// All instances of this site share one process, across browsing
    /// instances.
    ProcessPerSite,
    /// Prefer a process that already hosts this site or is committing it,
    /// used for service workers.
    ReusePendingOrCommittedSite,
    Default,
}

/// How the process of a site instance was obtained, for diagnostics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessAssignment {
    Unknown,
    ReusedExistingProcess,
    CreatedNewProcess,
}

/// A group of documents that must share a process: same browsing instance,
/// same site. The site may be assigned lazily, but at most once.
pub(crate) struct SiteInstance {
    pub id: SiteInstanceId,
    pub browsing_instance: BrowsingInstanceId,
    /// Empty until a site is assigned, then immutable.
    pub site_info: SiteInfo,
    pub has_site: bool,
    /// The URL that the site was derived from, kept because several URLs
    /// can map onto one site.
    pub original_url: Option<BulkheadUrl>,
    pub group: Option<SiteInstanceGroupId>,
    pub process_reuse_policy: ProcessReusePolicy,
    pub is_for_service_worker: bool,
    pub process_assignment: ProcessAssignment,
    /// Holders outside the model. The record is torn down when this drops
    /// to zero.
    pub external_ref_count: usize,
    /// Set on the one default site instance of a browsing instance; the set
    /// holds the site URLs that were folded into it.
    pub default_site_url_set: Option<FxHashSet<String>>,
    /// The partition handed out before a site was assigned, if any. A later
    /// site assignment must agree with it.
    pub partition_handed_out: Option<StoragePartitionConfig>,
}

impl SiteInstance {
    pub(crate) fn new(
        id: SiteInstanceId,
        browsing_instance: BrowsingInstanceId,
        site_info: SiteInfo,
    ) -> SiteInstance {
        SiteInstance {
            id,
            browsing_instance,
            site_info,
            has_site: false,
            original_url: None,
            group: None,
            process_reuse_policy: ProcessReusePolicy::Default,
            is_for_service_worker: false,
            process_assignment: ProcessAssignment::Unknown,
            external_ref_count: 1,
            default_site_url_set: None,
            partition_handed_out: None,
        }
    }

    pub(crate) fn is_default_site_instance(&self) -> bool {
        self.default_site_url_set.is_some()
    }
}
