/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Renderer process records and the bookkeeping needed to pick a process
//! for a site instance: locks, sole-host registrations for consolidated
//! sites, and which processes already host which sites.

use std::fmt;

use base::id::{IdGenerator, RendererProcessId};
use bulkhead_url::BulkheadUrl;
use log::debug;
use rustc_hash::FxHashMap;

use crate::config::IsolationConfig;
use crate::embedder::EmbedderPolicy;
use crate::security_policy::{IsolationContext, SecurityPolicy};
use crate::site_info::SiteInfo;
use crate::url_info::{StoragePartitionConfig, WebExposedIsolationInfo};

/// What a renderer process is allowed to host. Starts out invalid, is set
/// on first use and only ever tightens: an allow-any-site lock can later be
/// upgraded to a site lock, but a site lock can never change.
#[derive(Clone)]
pub struct ProcessLock(Option<SiteInfo>);

impl ProcessLock {
    /// The lock of a process nothing has committed into yet.
    pub fn invalid() -> ProcessLock {
        ProcessLock(None)
    }

    /// A lock that admits any site sharing the given partition, isolation
    /// state and frame tree kind, for processes hosting only sites that need
    /// no dedicated process.
    pub fn allow_any_site(
        storage_partition_config: StoragePartitionConfig,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> ProcessLock {
        ProcessLock(Some(SiteInfo::empty(
            storage_partition_config,
            web_exposed_isolation_info,
            is_guest,
            is_fenced,
        )))
    }

    pub fn from_site_info(site_info: SiteInfo) -> ProcessLock {
        ProcessLock(Some(site_info))
    }

    pub fn is_invalid(&self) -> bool {
        self.0.is_none()
    }

    pub fn is_locked_to_site(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|site_info| site_info.process_lock_url().is_some())
    }

    pub fn allows_any_site(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|site_info| site_info.process_lock_url().is_none())
    }

    pub fn lock_url(&self) -> Option<&BulkheadUrl> {
        self.0.as_ref().and_then(SiteInfo::process_lock_url)
    }

    pub fn site_info(&self) -> Option<&SiteInfo> {
        self.0.as_ref()
    }
}

impl PartialEq for ProcessLock {
    fn eq(&self, other: &ProcessLock) -> bool {
        self.0.as_ref().map(SiteInfo::process_lock_key) ==
            other.0.as_ref().map(SiteInfo::process_lock_key)
    }
}

impl Eq for ProcessLock {}

impl fmt::Display for ProcessLock {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self.0.as_ref() {
            None => write!(formatter, "invalid"),
            Some(site_info) if site_info.process_lock_url().is_none() => {
                write!(formatter, "allow-any-site")?;
                if !site_info.storage_partition_config().is_default() {
                    write!(
                        formatter,
                        ", partition={}",
                        site_info.storage_partition_config()
                    )?;
                }
                if site_info.web_exposed_isolation_info().is_isolated() {
                    write!(formatter, ", {}", site_info.web_exposed_isolation_info())?;
                }
                Ok(())
            },
            Some(site_info) => write!(formatter, "locked to {}", site_info),
        }
    }
}

impl fmt::Debug for ProcessLock {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "ProcessLock({})", self)
    }
}

/// One renderer process as this engine sees it.
pub struct RendererProcess {
    id: RendererProcessId,
    lock: ProcessLock,
    /// Whether any site instance has committed content into this process.
    /// Unused processes may still be claimed for any site.
    is_used: bool,
    is_live: bool,
}

impl RendererProcess {
    pub fn id(&self) -> RendererProcessId {
        self.id
    }

    pub fn lock(&self) -> &ProcessLock {
        &self.lock
    }

    pub fn is_used(&self) -> bool {
        self.is_used
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub(crate) fn set_lock(&mut self, lock: ProcessLock) {
        debug!("Process {}: lock set to {}", self.id, lock);
        self.lock = lock;
    }

    pub(crate) fn mark_used(&mut self) {
        self.is_used = true;
    }

    pub(crate) fn mark_exited(&mut self) {
        self.is_live = false;
    }
}

/// All renderer processes, plus the site-to-process maps used when reusing
/// them.
#[derive(Default)]
pub struct ProcessRegistry {
    processes: FxHashMap<RendererProcessId, RendererProcess>,
    /// For sites consolidated into one process per site: the process every
    /// browsing instance funnels that site into.
    sole_hosts_by_site: FxHashMap<SiteInfo, RendererProcessId>,
    /// How many site instances of a given site each process currently hosts
    /// or is expecting a commit for.
    site_counts: FxHashMap<SiteInfo, FxHashMap<RendererProcessId, u32>>,
}

impl ProcessRegistry {
    pub fn new() -> ProcessRegistry {
        ProcessRegistry::default()
    }

    pub fn create_process(&mut self, ids: &IdGenerator) -> RendererProcessId {
        let id = ids.next_renderer_process_id();
        self.processes.insert(
            id,
            RendererProcess {
                id,
                lock: ProcessLock::invalid(),
                is_used: false,
                is_live: true,
            },
        );
        debug!("Process {}: created", id);
        id
    }

    pub fn get(&self, id: RendererProcessId) -> Option<&RendererProcess> {
        self.processes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RendererProcessId) -> Option<&mut RendererProcess> {
        self.processes.get_mut(&id)
    }

    pub fn contains(&self, id: RendererProcessId) -> bool {
        self.processes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub(crate) fn remove(&mut self, id: RendererProcessId) {
        self.processes.remove(&id);
        self.sole_hosts_by_site.retain(|_, host| *host != id);
        for counts in self.site_counts.values_mut() {
            counts.remove(&id);
        }
        self.site_counts.retain(|_, counts| !counts.is_empty());
    }

    /// Register the one process all site instances of `site_info` should
    /// share. The first registration wins and stays until the process goes
    /// away.
    pub(crate) fn register_sole_host(&mut self, site_info: &SiteInfo, process: RendererProcessId) {
        self.sole_hosts_by_site
            .entry(site_info.clone())
            .or_insert_with(|| {
                debug!("Process {}: sole host for {}", process, site_info);
                process
            });
    }

    pub fn sole_host_for_site(&self, site_info: &SiteInfo) -> Option<RendererProcessId> {
        self.sole_hosts_by_site.get(site_info).copied()
    }

    pub(crate) fn increment_site_count(
        &mut self,
        site_info: &SiteInfo,
        process: RendererProcessId,
    ) {
        *self
            .site_counts
            .entry(site_info.clone())
            .or_default()
            .entry(process)
            .or_insert(0) += 1;
    }

    pub(crate) fn decrement_site_count(
        &mut self,
        site_info: &SiteInfo,
        process: RendererProcessId,
    ) {
        let Some(counts) = self.site_counts.get_mut(site_info) else {
            return;
        };
        if let Some(count) = counts.get_mut(&process) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&process);
            }
        }
        if counts.is_empty() {
            self.site_counts.remove(site_info);
        }
    }

    /// Whether `process` may host a document with the given descriptor.
    pub fn is_suitable_host(
        &self,
        process: &RendererProcess,
        ctx: &IsolationContext,
        site_info: &SiteInfo,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> bool {
        match process.lock.site_info() {
            // Nothing has run in this process, so anything may claim it.
            None => true,
            Some(lock_info) if process.lock.is_locked_to_site() => {
                lock_info.process_lock_key() == site_info.process_lock_key()
            },
            Some(lock_info) => {
                lock_info.storage_partition_config() == site_info.storage_partition_config() &&
                    lock_info.web_exposed_isolation_info() ==
                        site_info.web_exposed_isolation_info() &&
                    lock_info.is_guest() == site_info.is_guest() &&
                    lock_info.is_fenced() == site_info.is_fenced() &&
                    lock_info.is_jit_disabled() == site_info.is_jit_disabled() &&
                    lock_info.is_pdf() == site_info.is_pdf() &&
                    !site_info.should_lock_process_to_site(ctx, config, embedder, policy)
            },
        }
    }

    /// A live process already hosting `site_info`, if a suitable one exists.
    /// Prefers the lowest process id so reuse is deterministic.
    pub fn find_process_hosting_site(
        &self,
        ctx: &IsolationContext,
        site_info: &SiteInfo,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> Option<RendererProcessId> {
        let counts = self.site_counts.get(site_info)?;
        counts
            .keys()
            .filter_map(|id| self.processes.get(id))
            .filter(|process| process.is_live)
            .filter(|process| {
                self.is_suitable_host(process, ctx, site_info, config, embedder, policy)
            })
            .map(RendererProcess::id)
            .min()
    }

    /// Any live suitable process, used once the process limit is hit.
    pub fn find_any_suitable_process(
        &self,
        ctx: &IsolationContext,
        site_info: &SiteInfo,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> Option<RendererProcessId> {
        self.processes
            .values()
            .filter(|process| process.is_live)
            .filter(|process| {
                self.is_suitable_host(process, ctx, site_info, config, embedder, policy)
            })
            .map(RendererProcess::id)
            .min()
    }
}
