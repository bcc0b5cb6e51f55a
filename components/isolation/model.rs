/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The process model itself.
//!
//! [`Bulkhead`] owns every browsing instance, site instance, site instance
//! group and renderer process record, and hands out ids instead of
//! references. The embedder drives it from navigation code: derive or look
//! up a site instance for a URL, ask for its process, and release the
//! instance when the last frame using it goes away. All site instances
//! handed out are reference counted; every operation that returns a
//! [`SiteInstanceId`] gives the caller one reference to release.

use std::collections::VecDeque;

use base::id::{
    BrowsingInstanceId, IdGenerator, RendererProcessId, SiteInstanceGroupId, SiteInstanceId,
};
use bulkhead_url::{BulkheadUrl, ImmutableOrigin};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use url::Host;

use crate::browsing_instance::BrowsingInstance;
use crate::config::{IsolationConfig, SandboxGrouping};
use crate::embedder::{DefaultEmbedderPolicy, EmbedderPolicy, is_renderer_debug_url};
use crate::error::IsolationError;
use crate::process::{ProcessLock, ProcessRegistry, RendererProcess};
use crate::pub_domains::reg_suffix;
use crate::security_policy::{IsolatedOriginSource, IsolationContext, SecurityPolicy};
use crate::site_info::{SiteInfo, site_for_origin};
use crate::site_instance::{ProcessAssignment, ProcessReusePolicy, SiteInstance};
use crate::site_instance_group::{GroupEvent, SiteInstanceGroup};
use crate::url_info::{StoragePartitionConfig, UrlInfo, WebExposedIsolationInfo};

pub struct Bulkhead {
    config: IsolationConfig,
    embedder: Box<dyn EmbedderPolicy>,
    ids: IdGenerator,
    browsing_instances: FxHashMap<BrowsingInstanceId, BrowsingInstance>,
    site_instances: FxHashMap<SiteInstanceId, SiteInstance>,
    groups: FxHashMap<SiteInstanceGroupId, SiteInstanceGroup>,
    processes: ProcessRegistry,
    policy: SecurityPolicy,
    events: VecDeque<GroupEvent>,
}

impl Bulkhead {
    pub fn new(config: IsolationConfig) -> Bulkhead {
        Bulkhead::with_embedder(config, Box::new(DefaultEmbedderPolicy))
    }

    pub fn with_embedder(config: IsolationConfig, embedder: Box<dyn EmbedderPolicy>) -> Bulkhead {
        Bulkhead {
            config,
            embedder,
            ids: IdGenerator::default(),
            browsing_instances: FxHashMap::default(),
            site_instances: FxHashMap::default(),
            groups: FxHashMap::default(),
            processes: ProcessRegistry::new(),
            policy: SecurityPolicy::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    pub fn security_policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Drain the notifications produced since the last call.
    pub fn take_events(&mut self) -> Vec<GroupEvent> {
        self.events.drain(..).collect()
    }

    // Creation.

    pub fn create_browsing_instance(
        &mut self,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
    ) -> BrowsingInstanceId {
        self.create_browsing_instance_internal(web_exposed_isolation_info, is_guest, false)
    }

    fn create_browsing_instance_internal(
        &mut self,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> BrowsingInstanceId {
        let id = self.ids.next_browsing_instance_id();
        self.browsing_instances.insert(
            id,
            BrowsingInstance::new(id, web_exposed_isolation_info, is_guest, is_fenced),
        );
        id
    }

    /// A fresh site instance with no site, in a fresh browsing instance.
    /// Used for tabs whose first URL is not known yet.
    pub fn create_site_instance(&mut self) -> SiteInstanceId {
        let browsing_instance = self.create_browsing_instance_internal(
            WebExposedIsolationInfo::default(),
            false,
            false,
        );
        // The browsing instance was just created, so this cannot fail.
        self.new_site_instance_in(browsing_instance)
            .expect("newly created browsing instance disappeared")
    }

    /// A site instance for `url_info` in a fresh browsing instance.
    pub fn create_site_instance_for_url_info(
        &mut self,
        url_info: &UrlInfo,
        is_guest: bool,
    ) -> Result<SiteInstanceId, IsolationError> {
        let web_exposed_isolation_info = url_info
            .web_exposed_isolation_info
            .clone()
            .unwrap_or_default();
        let browsing_instance =
            self.create_browsing_instance_internal(web_exposed_isolation_info, is_guest, false);
        self.get_site_instance_for_url(browsing_instance, url_info, true)
    }

    /// A site instance for a service worker. Never placed in a default site
    /// instance: workers have no frames whose placement could be shared.
    pub fn create_site_instance_for_service_worker(
        &mut self,
        url_info: &UrlInfo,
        can_reuse_process: bool,
        is_guest: bool,
    ) -> Result<SiteInstanceId, IsolationError> {
        let web_exposed_isolation_info = url_info
            .web_exposed_isolation_info
            .clone()
            .unwrap_or_default();
        let browsing_instance =
            self.create_browsing_instance_internal(web_exposed_isolation_info, is_guest, false);
        let id = self.get_site_instance_for_url(browsing_instance, url_info, false)?;
        if let Some(record) = self.site_instances.get_mut(&id) {
            record.is_for_service_worker = true;
            if can_reuse_process {
                record.process_reuse_policy = ProcessReusePolicy::ReusePendingOrCommittedSite;
            }
        }
        Ok(id)
    }

    /// A site instance for a fenced frame embedded by `embedder_instance`.
    /// Fenced frames get their own browsing instance so they cannot script
    /// their embedder, but inherit its site and, when possible, its process.
    pub fn create_site_instance_for_fenced_frame(
        &mut self,
        embedder_instance: SiteInstanceId,
    ) -> Result<SiteInstanceId, IsolationError> {
        let (embedder_browsing_instance, embedder_site_info, embedder_has_site, is_default) = {
            let site_instance = self
                .site_instances
                .get(&embedder_instance)
                .ok_or(IsolationError::UnknownSiteInstance(embedder_instance))?;
            (
                site_instance.browsing_instance,
                site_instance.site_info.clone(),
                site_instance.has_site,
                site_instance.is_default_site_instance(),
            )
        };
        let (web_exposed_isolation_info, is_guest) = {
            let browsing_instance = self
                .browsing_instances
                .get(&embedder_browsing_instance)
                .ok_or(IsolationError::UnknownBrowsingInstance(
                    embedder_browsing_instance,
                ))?;
            (
                browsing_instance.web_exposed_isolation_info.clone(),
                browsing_instance.isolation_context.is_guest(),
            )
        };
        let browsing_instance =
            self.create_browsing_instance_internal(web_exposed_isolation_info, is_guest, true);
        let id = self.new_site_instance_in(browsing_instance)?;
        if embedder_has_site && !is_default {
            self.set_site_info_internal(id, embedder_site_info.fenced_clone(), None)?;
        }
        let embedder_process = self
            .site_instances
            .get(&embedder_instance)
            .and_then(|site_instance| site_instance.group)
            .and_then(|group| self.groups.get(&group))
            .map(|group| group.process);
        if let Some(process) = embedder_process {
            self.reuse_current_process_if_possible(id, process)?;
        }
        Ok(id)
    }

    /// The site instance for `url_info` within a browsing instance, creating
    /// it if the site has none yet. At most one site instance exists per
    /// site and browsing instance.
    pub fn get_site_instance_for_url(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        url_info: &UrlInfo,
        allow_default_instance: bool,
    ) -> Result<SiteInstanceId, IsolationError> {
        let (ctx, browsing_instance_isolation) = {
            let record = self
                .browsing_instances
                .get(&browsing_instance)
                .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
            (
                record.isolation_context,
                record.web_exposed_isolation_info.clone(),
            )
        };
        let url_info = self.patch_web_exposed_isolation(url_info, &browsing_instance_isolation);
        let site_info =
            SiteInfo::create(&ctx, &url_info, &self.config, &*self.embedder, &self.policy);
        self.record_origin_keying_decision(&ctx, &url_info);

        if allow_default_instance &&
            self.can_be_placed_in_default_site_instance(&ctx, &url_info.url, &site_info)
        {
            return self.get_or_create_default_site_instance(
                browsing_instance,
                browsing_instance_isolation,
                &ctx,
                &url_info,
                &site_info,
            );
        }

        let existing = self
            .browsing_instances
            .get(&browsing_instance)
            .and_then(|record| record.site_instance_map.get(&site_info).copied());
        if let Some(existing) = existing {
            if let Some(site_instance) = self.site_instances.get_mut(&existing) {
                site_instance.external_ref_count += 1;
            }
            return Ok(existing);
        }
        let id = self.new_site_instance_in(browsing_instance)?;
        self.set_site_info_internal(id, site_info, Some(url_info.url.clone()))?;
        Ok(id)
    }

    /// The site instance for an already computed descriptor, creating one if
    /// necessary. Used for placements that are not driven by a navigation
    /// URL, like sandboxed frame variants of an existing site.
    pub fn get_site_instance_for_site_info(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        site_info: SiteInfo,
    ) -> Result<SiteInstanceId, IsolationError> {
        if !self.browsing_instances.contains_key(&browsing_instance) {
            return Err(IsolationError::UnknownBrowsingInstance(browsing_instance));
        }
        let existing = self
            .browsing_instances
            .get(&browsing_instance)
            .and_then(|record| record.site_instance_map.get(&site_info).copied());
        if let Some(existing) = existing {
            if let Some(site_instance) = self.site_instances.get_mut(&existing) {
                site_instance.external_ref_count += 1;
            }
            return Ok(existing);
        }
        let id = self.new_site_instance_in(browsing_instance)?;
        self.set_site_info_internal(id, site_info, None)?;
        Ok(id)
    }

    /// The site instance for `url_info` in the same browsing instance as
    /// `site_instance`. This is the instance a same-window navigation
    /// should commit into.
    pub fn get_related_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
        url_info: &UrlInfo,
    ) -> Result<SiteInstanceId, IsolationError> {
        let browsing_instance = self
            .site_instances
            .get(&site_instance)
            .ok_or(IsolationError::UnknownSiteInstance(site_instance))?
            .browsing_instance;
        self.get_site_instance_for_url(browsing_instance, url_info, true)
    }

    /// A site instance for a sandboxed document of the same site as
    /// `site_instance`, in the same browsing instance.
    pub fn get_compatible_sandboxed_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
        unique_sandbox_id: Option<u64>,
    ) -> Result<SiteInstanceId, IsolationError> {
        let (browsing_instance, has_site, site_info, original_url) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (
                record.browsing_instance,
                record.has_site,
                record.site_info.clone(),
                record.original_url.clone(),
            )
        };
        if !has_site {
            return Err(IsolationError::SiteNotSet(site_instance));
        }
        let sandbox_key = if self.config.sandbox_grouping == SandboxGrouping::PerDocument {
            unique_sandbox_id
        } else {
            None
        };
        let sandboxed = site_info.sandboxed_clone(sandbox_key);
        let id = self.get_site_instance_for_site_info(browsing_instance, sandboxed)?;
        if let Some(record) = self.site_instances.get_mut(&id) {
            if record.original_url.is_none() {
                record.original_url = original_url;
            }
        }
        Ok(id)
    }

    // Reference counting.

    pub fn retain_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<(), IsolationError> {
        let record = self
            .site_instances
            .get_mut(&site_instance)
            .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
        record.external_ref_count += 1;
        Ok(())
    }

    /// Drop one reference. The site instance is torn down when the last
    /// reference goes, and its browsing instance with the last site
    /// instance.
    pub fn release_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<(), IsolationError> {
        let remaining = {
            let record = self
                .site_instances
                .get_mut(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            record.external_ref_count = record.external_ref_count.saturating_sub(1);
            record.external_ref_count
        };
        if remaining > 0 {
            return Ok(());
        }
        self.teardown_site_instance(site_instance);
        Ok(())
    }

    // Site assignment.

    /// Assign the site derived from `url_info`. Can be done at most once;
    /// everything else about the site instance follows from it.
    pub fn set_site(
        &mut self,
        site_instance: SiteInstanceId,
        url_info: &UrlInfo,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, has_site) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (record.browsing_instance, record.has_site)
        };
        if has_site {
            return Err(IsolationError::SiteAlreadySet(site_instance));
        }
        let (ctx, browsing_instance_isolation) = {
            let record = self
                .browsing_instances
                .get(&browsing_instance)
                .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
            (
                record.isolation_context,
                record.web_exposed_isolation_info.clone(),
            )
        };
        let url_info = self.patch_web_exposed_isolation(url_info, &browsing_instance_isolation);
        let site_info =
            SiteInfo::create(&ctx, &url_info, &self.config, &*self.embedder, &self.policy);
        self.record_origin_keying_decision(&ctx, &url_info);
        self.set_site_info_internal(site_instance, site_info, Some(url_info.url.clone()))
    }

    /// Assign a precomputed principal directly. Callers that already hold the
    /// exact `SiteInfo` skip site derivation; the single-assignment rule of
    /// `set_site` still applies.
    pub fn set_site_info(
        &mut self,
        site_instance: SiteInstanceId,
        site_info: SiteInfo,
    ) -> Result<(), IsolationError> {
        self.set_site_info_internal(site_instance, site_info, None)
    }

    /// Either fold the site instance into its browsing instance's default
    /// site instance role, or assign the site normally. Used when a site is
    /// assigned late, at response time, and the URL turns out not to need a
    /// dedicated process.
    pub fn convert_to_default_or_set_site(
        &mut self,
        site_instance: SiteInstanceId,
        url_info: &UrlInfo,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, has_site) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (record.browsing_instance, record.has_site)
        };
        if has_site {
            return Err(IsolationError::SiteAlreadySet(site_instance));
        }
        let (ctx, browsing_instance_isolation, has_default) = {
            let record = self
                .browsing_instances
                .get(&browsing_instance)
                .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
            (
                record.isolation_context,
                record.web_exposed_isolation_info.clone(),
                record.default_site_instance.is_some(),
            )
        };
        let url_info = self.patch_web_exposed_isolation(url_info, &browsing_instance_isolation);
        let site_info =
            SiteInfo::create(&ctx, &url_info, &self.config, &*self.embedder, &self.policy);
        self.record_origin_keying_decision(&ctx, &url_info);
        if !has_default &&
            self.can_be_placed_in_default_site_instance(&ctx, &url_info.url, &site_info)
        {
            let default_info = SiteInfo::create_for_default_site_instance(
                site_info.storage_partition_config().clone(),
                browsing_instance_isolation,
                ctx.is_guest(),
                ctx.is_fenced(),
            );
            if let Some(record) = self.site_instances.get_mut(&site_instance) {
                let mut covered = FxHashSet::default();
                if let Some(site_url) = site_info.site_url() {
                    covered.insert(site_url.as_str().to_owned());
                }
                record.default_site_url_set = Some(covered);
            }
            return self.set_site_info_internal(
                site_instance,
                default_info,
                Some(url_info.url.clone()),
            );
        }
        self.set_site_info_internal(site_instance, site_info, Some(url_info.url.clone()))
    }

    // Process assignment.

    pub fn create_process(&mut self) -> RendererProcessId {
        self.processes.create_process(&self.ids)
    }

    /// The process of a site instance, assigning one first if needed.
    /// Assignment prefers, in order: the browsing instance's default
    /// process, the sole host of a consolidated site, a process already
    /// hosting the site for service worker reuse, any suitable process once
    /// the process limit is reached, and finally a new process.
    pub fn get_process(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<RendererProcessId, IsolationError> {
        let (browsing_instance, group, has_site, site_info, reuse_policy) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (
                record.browsing_instance,
                record.group,
                record.has_site,
                record.site_info.clone(),
                record.process_reuse_policy,
            )
        };
        if let Some(group) = group {
            return Ok(self
                .groups
                .get(&group)
                .ok_or(IsolationError::UnknownSiteInstanceGroup(group))?
                .process);
        }
        let ctx = self
            .browsing_instances
            .get(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?
            .isolation_context;

        let use_process_per_site =
            has_site && site_info.should_use_process_per_site(&self.config, &*self.embedder);
        let reuse_policy = if reuse_policy == ProcessReusePolicy::ProcessPerSite &&
            !use_process_per_site
        {
            // The embedder's answer changed between the site assignment and
            // now; fall back to normal placement.
            if let Some(record) = self.site_instances.get_mut(&site_instance) {
                record.process_reuse_policy = ProcessReusePolicy::Default;
            }
            ProcessReusePolicy::Default
        } else {
            reuse_policy
        };

        let mut chosen = None;
        let default_process = self
            .browsing_instances
            .get(&browsing_instance)
            .and_then(|record| record.group_manager.default_process());
        if let Some(process) = default_process {
            if self.process_may_host(process, &ctx, &site_info) {
                chosen = Some(process);
            }
        }
        if chosen.is_none() && use_process_per_site {
            if let Some(process) = self.processes.sole_host_for_site(&site_info) {
                if self.process_may_host(process, &ctx, &site_info) {
                    chosen = Some(process);
                }
            }
        }
        if chosen.is_none() && reuse_policy == ProcessReusePolicy::ReusePendingOrCommittedSite &&
            has_site
        {
            chosen = self.processes.find_process_hosting_site(
                &ctx,
                &site_info,
                &self.config,
                &*self.embedder,
                &self.policy,
            );
        }
        if chosen.is_none() {
            if let Some(limit) = self.config.process_limit {
                if self.processes.len() >= limit {
                    chosen = self.processes.find_any_suitable_process(
                        &ctx,
                        &site_info,
                        &self.config,
                        &*self.embedder,
                        &self.policy,
                    );
                }
            }
        }
        let (process, assignment) = match chosen {
            Some(process) => (process, ProcessAssignment::ReusedExistingProcess),
            None => (
                self.processes.create_process(&self.ids),
                ProcessAssignment::CreatedNewProcess,
            ),
        };
        self.set_process_internal(site_instance, process, assignment)?;
        Ok(process)
    }

    /// Whether the site instance already has a process, without assigning
    /// one. True also when its site is consolidated and the sole host for
    /// that site is alive.
    pub fn has_process(&self, site_instance: SiteInstanceId) -> bool {
        let Some(record) = self.site_instances.get(&site_instance) else {
            return false;
        };
        if record.group.is_some() {
            return true;
        }
        if record.has_site &&
            record
                .site_info
                .should_use_process_per_site(&self.config, &*self.embedder)
        {
            if let Some(process) = self.processes.sole_host_for_site(&record.site_info) {
                return self
                    .processes
                    .get(process)
                    .is_some_and(RendererProcess::is_live);
            }
        }
        false
    }

    /// Bind the site instance to `process` if that is allowed, keeping the
    /// current binding otherwise. Lets an embedder keep a new site instance
    /// in the process of the frame that created it.
    pub fn reuse_current_process_if_possible(
        &mut self,
        site_instance: SiteInstanceId,
        process: RendererProcessId,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, site_info) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (record.browsing_instance, record.site_info.clone())
        };
        if self.has_process(site_instance) {
            return Ok(());
        }
        let Some(ctx) = self
            .browsing_instances
            .get(&browsing_instance)
            .map(|record| record.isolation_context)
        else {
            return Err(IsolationError::UnknownBrowsingInstance(browsing_instance));
        };
        if !self.process_may_host(process, &ctx, &site_info) {
            return Ok(());
        }
        self.set_process_internal(site_instance, process, ProcessAssignment::ReusedExistingProcess)
    }

    // Suitability and same-site checks.

    /// Whether a navigation to `url_info` can commit into this site
    /// instance without violating its placement.
    pub fn is_suitable_for_url_info(
        &self,
        site_instance: SiteInstanceId,
        url_info: &UrlInfo,
    ) -> bool {
        let Some(record) = self.site_instances.get(&site_instance) else {
            return false;
        };
        let Some(browsing_instance) = self.browsing_instances.get(&record.browsing_instance)
        else {
            return false;
        };
        let ctx = browsing_instance.isolation_context;
        if is_renderer_debug_url(&url_info.url) {
            return true;
        }
        // about:blank inherits its creator, so any instance fits, except an
        // error page one: reloading it must produce the error page again.
        if url_info.url.is_about_blank() && !record.site_info.is_error_page() {
            return true;
        }
        let sandboxed = url_info.is_sandboxed && self.config.isolate_sandboxed_iframes;
        if sandboxed != record.site_info.is_sandboxed() {
            return false;
        }
        let url_info = self.patch_web_exposed_isolation(
            url_info,
            &browsing_instance.web_exposed_isolation_info,
        );
        let derived = self.site_info_for_url_in(browsing_instance, &url_info, true);
        if record.is_default_site_instance() && derived != record.site_info {
            return false;
        }
        if !self.has_process(site_instance) {
            if !record.has_site {
                return true;
            }
            if record.site_info == derived {
                return true;
            }
            let self_dedicated = record.site_info.requires_dedicated_process(
                &ctx,
                &self.config,
                &*self.embedder,
                &self.policy,
            );
            let derived_dedicated = derived.requires_dedicated_process(
                &ctx,
                &self.config,
                &*self.embedder,
                &self.policy,
            );
            return !self_dedicated && !derived_dedicated;
        }
        let process = record
            .group
            .and_then(|group| self.groups.get(&group))
            .map(|group| group.process)
            .or_else(|| self.processes.sole_host_for_site(&record.site_info));
        let Some(process) = process.and_then(|process| self.processes.get(process)) else {
            return false;
        };
        self.processes.is_suitable_host(
            process,
            &ctx,
            &derived,
            &self.config,
            &*self.embedder,
            &self.policy,
        )
    }

    /// Whether `url_info` belongs to the site of this site instance.
    pub fn is_same_site(&self, site_instance: SiteInstanceId, url_info: &UrlInfo) -> bool {
        let Some(record) = self.site_instances.get(&site_instance) else {
            return false;
        };
        let Some(browsing_instance) = self.browsing_instances.get(&record.browsing_instance)
        else {
            return false;
        };
        let ctx = browsing_instance.isolation_context;
        let url_info = self.patch_web_exposed_isolation(
            url_info,
            &browsing_instance.web_exposed_isolation_info,
        );
        if record.is_default_site_instance() {
            if url_info.url.is_about_blank() {
                return true;
            }
            let derived =
                SiteInfo::create(&ctx, &url_info, &self.config, &*self.embedder, &self.policy);
            return self.can_be_placed_in_default_site_instance(&ctx, &url_info.url, &derived) &&
                !browsing_instance.has_site_instance(&derived);
        }
        if !record.has_site {
            return false;
        }
        let Some(site_url) = record.site_info.site_url() else {
            return false;
        };
        let src = UrlInfo::new(site_url.clone());
        let compare_effective_urls = self
            .embedder
            .should_compare_effective_urls(record.original_url.as_ref(), &url_info.url);
        self.urls_are_same_site_in(browsing_instance, &src, &url_info, compare_effective_urls)
    }

    /// Whether two URLs belong to the same site within a browsing instance.
    pub fn urls_are_same_site(
        &self,
        browsing_instance: BrowsingInstanceId,
        src: &UrlInfo,
        dest: &UrlInfo,
        should_compare_effective_urls: bool,
    ) -> bool {
        let Some(record) = self.browsing_instances.get(&browsing_instance) else {
            return false;
        };
        self.urls_are_same_site_in(record, src, dest, should_compare_effective_urls)
    }

    /// The descriptor a navigation to `url_info` resolves to in this
    /// browsing instance. With `is_related`, resolution may produce the
    /// shared default descriptor, the way a same-instance lookup would.
    pub fn derive_site_info(
        &self,
        browsing_instance: BrowsingInstanceId,
        url_info: &UrlInfo,
        is_related: bool,
    ) -> Result<SiteInfo, IsolationError> {
        let record = self
            .browsing_instances
            .get(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
        let url_info =
            self.patch_web_exposed_isolation(url_info, &record.web_exposed_isolation_info);
        Ok(self.site_info_for_url_in(record, &url_info, is_related))
    }

    /// Whether navigating to `url` should permanently assign a site to the
    /// instance that hosts it. about:blank inherits instead of assigning.
    pub fn should_assign_site_for_url(&self, url: &BulkheadUrl) -> bool {
        !url.is_about_blank() && self.embedder.should_assign_site_for_url(url)
    }

    // Isolated origins.

    /// Isolate origins in all future browsing instances. Existing placements
    /// stay where they are.
    pub fn add_future_isolated_origins(
        &mut self,
        origins: Vec<ImmutableOrigin>,
        source: IsolatedOriginSource,
    ) {
        let first_affected = self.ids.peek_browsing_instance_id();
        self.policy
            .add_future_isolated_origins(origins, source, first_affected);
    }

    /// Isolate the site of `url` in all future browsing instances, in
    /// response to a runtime signal like a user typing a password there.
    pub fn start_isolating_site(&mut self, url: &BulkheadUrl, source: IsolatedOriginSource) {
        let origin = url.origin();
        if !origin.is_tuple() {
            return;
        }
        let Some(site_url) = site_for_origin(&origin) else {
            return;
        };
        let site_origin = site_url.origin();
        self.add_future_isolated_origins(vec![site_origin], source);
    }

    // Process lifecycle.

    /// Forget a process and unbind every group that used it. Site instances
    /// that survive get a fresh process on their next `get_process`.
    pub fn destroy_process(&mut self, process: RendererProcessId) -> Result<(), IsolationError> {
        if !self.processes.contains(process) {
            return Err(IsolationError::UnknownRendererProcess(process));
        }
        let bound: Vec<SiteInstanceGroupId> = self
            .groups
            .values()
            .filter(|group| group.process == process)
            .map(|group| group.id)
            .collect();
        for group_id in bound {
            if let Some(group) = self.groups.remove(&group_id) {
                for member in &group.site_instances {
                    if let Some(record) = self.site_instances.get_mut(member) {
                        record.group = None;
                        record.process_assignment = ProcessAssignment::Unknown;
                    }
                }
                debug!(
                    "Site instance group {}: destroyed with process {}",
                    group_id, process
                );
            }
        }
        for record in self.browsing_instances.values_mut() {
            record.group_manager.on_process_destroyed(process);
        }
        self.processes.remove(process);
        self.policy.remove_process_state(process);
        debug!("Process {}: destroyed", process);
        Ok(())
    }

    /// Record that a renderer process exited. Its groups stay bound until
    /// the embedder destroys the process, but each reports the exit.
    pub fn process_exited(&mut self, process: RendererProcessId) -> Result<(), IsolationError> {
        self.processes
            .get_mut(process)
            .ok_or(IsolationError::UnknownRendererProcess(process))?
            .mark_exited();
        let mut bound: Vec<SiteInstanceGroupId> = self
            .groups
            .values()
            .filter(|group| group.process == process)
            .map(|group| group.id)
            .collect();
        bound.sort();
        for group_id in bound {
            self.events
                .push_back(GroupEvent::RenderProcessGone(group_id, process));
        }
        debug!("Process {}: exited", process);
        Ok(())
    }

    // Frame and contents accounting.

    pub fn increment_active_frame_count(
        &mut self,
        group: SiteInstanceGroupId,
    ) -> Result<(), IsolationError> {
        let record = self
            .groups
            .get_mut(&group)
            .ok_or(IsolationError::UnknownSiteInstanceGroup(group))?;
        record.active_frame_count += 1;
        Ok(())
    }

    pub fn decrement_active_frame_count(
        &mut self,
        group: SiteInstanceGroupId,
    ) -> Result<(), IsolationError> {
        let reached_zero = {
            let record = self
                .groups
                .get_mut(&group)
                .ok_or(IsolationError::UnknownSiteInstanceGroup(group))?;
            let was = record.active_frame_count;
            record.active_frame_count = was.saturating_sub(1);
            was == 1
        };
        if reached_zero {
            self.events.push_back(GroupEvent::ActiveFrameCountIsZero(group));
        }
        Ok(())
    }

    pub fn increment_related_active_contents(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<(), IsolationError> {
        let browsing_instance = self
            .site_instances
            .get(&site_instance)
            .ok_or(IsolationError::UnknownSiteInstance(site_instance))?
            .browsing_instance;
        let record = self
            .browsing_instances
            .get_mut(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
        record.active_contents_count += 1;
        Ok(())
    }

    pub fn decrement_related_active_contents(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<(), IsolationError> {
        let browsing_instance = self
            .site_instances
            .get(&site_instance)
            .ok_or(IsolationError::UnknownSiteInstance(site_instance))?
            .browsing_instance;
        let record = self
            .browsing_instances
            .get_mut(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
        record.active_contents_count = record.active_contents_count.saturating_sub(1);
        Ok(())
    }

    /// How many tabs or other top level contents are alive in the browsing
    /// instance of this site instance.
    pub fn related_active_contents_count(&self, site_instance: SiteInstanceId) -> Option<u32> {
        let record = self.site_instances.get(&site_instance)?;
        self.browsing_instances
            .get(&record.browsing_instance)
            .map(|record| record.active_contents_count)
    }

    // Introspection.

    pub fn browsing_instance_of(
        &self,
        site_instance: SiteInstanceId,
    ) -> Option<BrowsingInstanceId> {
        self.site_instances
            .get(&site_instance)
            .map(|record| record.browsing_instance)
    }

    /// Whether two site instances belong to the same browsing instance.
    pub fn is_related(&self, left: SiteInstanceId, right: SiteInstanceId) -> bool {
        match (self.site_instances.get(&left), self.site_instances.get(&right)) {
            (Some(a), Some(b)) => a.browsing_instance == b.browsing_instance,
            _ => false,
        }
    }

    pub fn group_of(&self, site_instance: SiteInstanceId) -> Option<SiteInstanceGroupId> {
        self.site_instances
            .get(&site_instance)
            .and_then(|record| record.group)
    }

    pub fn process_of_group(&self, group: SiteInstanceGroupId) -> Option<RendererProcessId> {
        self.groups.get(&group).map(|record| record.process)
    }

    pub fn has_site(&self, site_instance: SiteInstanceId) -> bool {
        self.site_instances
            .get(&site_instance)
            .is_some_and(|record| record.has_site)
    }

    pub fn site_info_of(&self, site_instance: SiteInstanceId) -> Option<&SiteInfo> {
        self.site_instances
            .get(&site_instance)
            .map(|record| &record.site_info)
    }

    pub fn site_url_of(&self, site_instance: SiteInstanceId) -> Option<BulkheadUrl> {
        self.site_instances
            .get(&site_instance)
            .filter(|record| record.has_site)
            .and_then(|record| record.site_info.site_url().cloned())
    }

    pub fn original_url_of(&self, site_instance: SiteInstanceId) -> Option<BulkheadUrl> {
        self.site_instances
            .get(&site_instance)
            .and_then(|record| record.original_url.clone())
    }

    pub fn is_default_site_instance(&self, site_instance: SiteInstanceId) -> bool {
        self.site_instances
            .get(&site_instance)
            .is_some_and(SiteInstance::is_default_site_instance)
    }

    /// Whether the default site instance absorbed the site of `site_url`.
    pub fn default_site_instance_covers(
        &self,
        site_instance: SiteInstanceId,
        site_url: &BulkheadUrl,
    ) -> bool {
        self.site_instances
            .get(&site_instance)
            .and_then(|record| record.default_site_url_set.as_ref())
            .is_some_and(|covered| covered.contains(site_url.as_str()))
    }

    pub fn is_for_service_worker(&self, site_instance: SiteInstanceId) -> bool {
        self.site_instances
            .get(&site_instance)
            .is_some_and(|record| record.is_for_service_worker)
    }

    pub fn process_assignment_of(
        &self,
        site_instance: SiteInstanceId,
    ) -> Option<ProcessAssignment> {
        self.site_instances
            .get(&site_instance)
            .map(|record| record.process_assignment)
    }

    /// Whether documents in this site instance must not share their process
    /// with any other site. False until a site is assigned.
    pub fn requires_dedicated_process(&self, site_instance: SiteInstanceId) -> bool {
        let Some(record) = self.site_instances.get(&site_instance) else {
            return false;
        };
        if !record.has_site {
            return false;
        }
        let Some(ctx) = self
            .browsing_instances
            .get(&record.browsing_instance)
            .map(|record| record.isolation_context)
        else {
            return false;
        };
        record
            .site_info
            .requires_dedicated_process(&ctx, &self.config, &*self.embedder, &self.policy)
    }

    /// The storage partition of a site instance. Asking before a site is
    /// assigned pins the answer: a later site assignment with a different
    /// partition is rejected.
    pub fn storage_partition_config(
        &mut self,
        site_instance: SiteInstanceId,
    ) -> Result<StoragePartitionConfig, IsolationError> {
        let record = self
            .site_instances
            .get_mut(&site_instance)
            .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
        let partition = record.site_info.storage_partition_config().clone();
        if !record.has_site {
            record.partition_handed_out = Some(partition.clone());
        }
        Ok(partition)
    }

    pub fn process(&self, process: RendererProcessId) -> Option<&RendererProcess> {
        self.processes.get(process)
    }

    pub fn process_lock(&self, process: RendererProcessId) -> Option<&ProcessLock> {
        self.processes.get(process).map(RendererProcess::lock)
    }

    pub fn active_frame_count(&self, group: SiteInstanceGroupId) -> Option<u32> {
        self.groups.get(&group).map(|record| record.active_frame_count)
    }

    pub fn browsing_instance_count(&self) -> usize {
        self.browsing_instances.len()
    }

    pub fn site_instance_count(&self) -> usize {
        self.site_instances.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    // Internal helpers.

    /// Navigations that do not state their isolation inherit the browsing
    /// instance's, so that descriptors computed for them stay compatible.
    fn patch_web_exposed_isolation(
        &self,
        url_info: &UrlInfo,
        web_exposed_isolation_info: &WebExposedIsolationInfo,
    ) -> UrlInfo {
        let mut url_info = url_info.clone();
        if url_info.web_exposed_isolation_info.is_none() {
            url_info.web_exposed_isolation_info = Some(web_exposed_isolation_info.clone());
        }
        url_info
    }

    fn site_info_for_url_in(
        &self,
        browsing_instance: &BrowsingInstance,
        url_info: &UrlInfo,
        allow_default_instance: bool,
    ) -> SiteInfo {
        let ctx = browsing_instance.isolation_context;
        let site_info =
            SiteInfo::create(&ctx, url_info, &self.config, &*self.embedder, &self.policy);
        if allow_default_instance &&
            self.can_be_placed_in_default_site_instance(&ctx, &url_info.url, &site_info)
        {
            return SiteInfo::create_for_default_site_instance(
                site_info.storage_partition_config().clone(),
                browsing_instance.web_exposed_isolation_info.clone(),
                ctx.is_guest(),
                ctx.is_fenced(),
            );
        }
        site_info
    }

    fn can_be_placed_in_default_site_instance(
        &self,
        ctx: &IsolationContext,
        url: &BulkheadUrl,
        site_info: &SiteInfo,
    ) -> bool {
        if !self.config.use_default_site_instance {
            return false;
        }
        // File URLs must not share a default instance: access to local files
        // is granted per process.
        if url.scheme() == "file" {
            return false;
        }
        if !self.should_assign_site_for_url(url) {
            return false;
        }
        !site_info.requires_dedicated_process(ctx, &self.config, &*self.embedder, &self.policy)
    }

    fn get_or_create_default_site_instance(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        ctx: &IsolationContext,
        url_info: &UrlInfo,
        site_info: &SiteInfo,
    ) -> Result<SiteInstanceId, IsolationError> {
        let default_info = SiteInfo::create_for_default_site_instance(
            site_info.storage_partition_config().clone(),
            web_exposed_isolation_info,
            ctx.is_guest(),
            ctx.is_fenced(),
        );
        let covered_site = site_info
            .site_url()
            .map(|site_url| site_url.as_str().to_owned());
        let existing = self
            .browsing_instances
            .get(&browsing_instance)
            .and_then(|record| record.default_site_instance);
        if let Some(existing) = existing {
            if let Some(record) = self.site_instances.get_mut(&existing) {
                record.external_ref_count += 1;
                if let (Some(covered), Some(site)) =
                    (record.default_site_url_set.as_mut(), covered_site)
                {
                    covered.insert(site);
                }
                return Ok(existing);
            }
        }
        let id = self.new_site_instance_in(browsing_instance)?;
        if let Some(record) = self.site_instances.get_mut(&id) {
            let mut covered = FxHashSet::default();
            if let Some(site) = covered_site {
                covered.insert(site);
            }
            record.default_site_url_set = Some(covered);
        }
        self.set_site_info_internal(id, default_info, Some(url_info.url.clone()))?;
        Ok(id)
    }

    fn new_site_instance_in(
        &mut self,
        browsing_instance: BrowsingInstanceId,
    ) -> Result<SiteInstanceId, IsolationError> {
        let id = self.ids.next_site_instance_id();
        let record = self
            .browsing_instances
            .get_mut(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?;
        let site_info = SiteInfo::empty(
            StoragePartitionConfig::default(),
            record.web_exposed_isolation_info.clone(),
            record.isolation_context.is_guest(),
            record.isolation_context.is_fenced(),
        );
        record.site_instance_ids.insert(id);
        self.site_instances
            .insert(id, SiteInstance::new(id, browsing_instance, site_info));
        debug!(
            "Site instance {}: created in browsing instance {}",
            id, browsing_instance
        );
        Ok(id)
    }

    /// Store a site assignment and apply all its side effects, in order:
    /// register the instance with its browsing instance, record any header
    /// driven isolation, adopt process-per-site reuse, and lock an already
    /// assigned process.
    fn set_site_info_internal(
        &mut self,
        site_instance: SiteInstanceId,
        site_info: SiteInfo,
        original_url: Option<BulkheadUrl>,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, partition_handed_out) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            if record.has_site {
                return Err(IsolationError::SiteAlreadySet(site_instance));
            }
            (record.browsing_instance, record.partition_handed_out.clone())
        };
        let browsing_instance_isolation = self
            .browsing_instances
            .get(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?
            .web_exposed_isolation_info
            .clone();
        if site_info.web_exposed_isolation_info() != &browsing_instance_isolation {
            return Err(IsolationError::IsolationStateMismatch(browsing_instance));
        }
        if let Some(expected) = partition_handed_out {
            if &expected != site_info.storage_partition_config() {
                return Err(IsolationError::StoragePartitionMismatch {
                    site_instance,
                    expected: expected.to_string(),
                    actual: site_info.storage_partition_config().to_string(),
                });
            }
        }
        debug!("Site instance {}: site set to {}", site_instance, site_info);

        let use_process_per_site =
            site_info.should_use_process_per_site(&self.config, &*self.embedder);
        {
            let record = self
                .site_instances
                .get_mut(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            record.site_info = site_info.clone();
            record.has_site = true;
            if original_url.is_some() {
                record.original_url = original_url;
            }
            if use_process_per_site {
                record.process_reuse_policy = ProcessReusePolicy::ProcessPerSite;
            }
        }
        if let Some(record) = self.browsing_instances.get_mut(&browsing_instance) {
            record.register_site_instance(site_instance, &site_info);
        }

        if site_info.requires_origin_keyed_process() {
            if let Some(lock_url) = site_info.process_lock_url() {
                let origin = lock_url.origin();
                if origin.is_tuple() {
                    self.policy.add_isolated_origin_for_browsing_instance(
                        browsing_instance,
                        origin,
                        true,
                        IsolatedOriginSource::WebTriggered,
                    );
                }
            }
        }
        if site_info.does_site_request_dedicated_process_for_coop() {
            if let Some(lock_url) = site_info.process_lock_url() {
                let origin = lock_url.origin();
                if let Some(site_url) = site_for_origin(&origin) {
                    let site_origin = site_url.origin();
                    if site_origin.is_tuple() {
                        self.policy.add_isolated_origin_for_browsing_instance(
                            browsing_instance,
                            site_origin,
                            false,
                            IsolatedOriginSource::WebTriggered,
                        );
                    }
                }
            }
        }

        let group = self
            .site_instances
            .get(&site_instance)
            .and_then(|record| record.group);
        if let Some(group) = group {
            let process = self
                .groups
                .get(&group)
                .ok_or(IsolationError::UnknownSiteInstanceGroup(group))?
                .process;
            self.lock_process_if_needed(site_instance, process)?;
            if use_process_per_site {
                self.processes.register_sole_host(&site_info, process);
            }
            self.processes.increment_site_count(&site_info, process);
            self.maybe_set_default_process(browsing_instance, site_instance, process);
        }
        Ok(())
    }

    fn set_process_internal(
        &mut self,
        site_instance: SiteInstanceId,
        process: RendererProcessId,
        assignment: ProcessAssignment,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, has_site, site_info, reuse_policy) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (
                record.browsing_instance,
                record.has_site,
                record.site_info.clone(),
                record.process_reuse_policy,
            )
        };
        if !self.processes.contains(process) {
            return Err(IsolationError::UnknownRendererProcess(process));
        }
        let existing_group = self
            .browsing_instances
            .get(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?
            .group_manager
            .group_for_process(process)
            .filter(|group| self.groups.contains_key(group));
        let group = match existing_group {
            Some(group) => group,
            None => {
                let group = self.ids.next_site_instance_group_id();
                self.groups
                    .insert(group, SiteInstanceGroup::new(group, browsing_instance, process));
                if let Some(record) = self.browsing_instances.get_mut(&browsing_instance) {
                    record.group_manager.set_group_for_process(process, group);
                }
                debug!(
                    "Site instance group {}: created for process {} in browsing instance {}",
                    group, process, browsing_instance
                );
                group
            },
        };
        if let Some(record) = self.groups.get_mut(&group) {
            record.site_instances.insert(site_instance);
        }
        if let Some(record) = self.site_instances.get_mut(&site_instance) {
            record.group = Some(group);
            record.process_assignment = assignment;
        }
        debug!(
            "Site instance {}: assigned to process {} ({:?})",
            site_instance, process, assignment
        );
        self.lock_process_if_needed(site_instance, process)?;
        if has_site {
            if reuse_policy == ProcessReusePolicy::ProcessPerSite {
                self.processes.register_sole_host(&site_info, process);
            }
            self.processes.increment_site_count(&site_info, process);
        }
        self.maybe_set_default_process(browsing_instance, site_instance, process);
        Ok(())
    }

    /// Give the process the lock its site instance requires, or fail if it
    /// already carries a contradictory one. An unlocked process may be
    /// upgraded from allow-any-site to a site lock, never the reverse.
    fn lock_process_if_needed(
        &mut self,
        site_instance: SiteInstanceId,
        process: RendererProcessId,
    ) -> Result<(), IsolationError> {
        let (browsing_instance, has_site, site_info) = {
            let record = self
                .site_instances
                .get(&site_instance)
                .ok_or(IsolationError::UnknownSiteInstance(site_instance))?;
            (
                record.browsing_instance,
                record.has_site,
                record.site_info.clone(),
            )
        };
        let ctx = self
            .browsing_instances
            .get(&browsing_instance)
            .ok_or(IsolationError::UnknownBrowsingInstance(browsing_instance))?
            .isolation_context;
        let should_lock = has_site &&
            site_info.should_lock_process_to_site(
                &ctx,
                &self.config,
                &*self.embedder,
                &self.policy,
            );
        let (lock_is_invalid, lock_is_to_site, lock_display) = {
            let record = self
                .processes
                .get(process)
                .ok_or(IsolationError::UnknownRendererProcess(process))?;
            (
                record.lock().is_invalid(),
                record.lock().is_locked_to_site(),
                record.lock().to_string(),
            )
        };

        if !has_site {
            // A site may still be assigned later, so leave the process
            // claimable by anything compatible.
            if lock_is_to_site {
                return Err(IsolationError::ProcessLockMismatch {
                    process,
                    current: lock_display,
                    requested: "allow-any-site".to_owned(),
                });
            }
            if lock_is_invalid {
                let lock = ProcessLock::allow_any_site(
                    site_info.storage_partition_config().clone(),
                    site_info.web_exposed_isolation_info().clone(),
                    site_info.is_guest(),
                    site_info.is_fenced(),
                );
                self.set_process_lock(process, lock, &ctx)?;
            }
            self.policy.include_isolation_context(process, &ctx);
            return Ok(());
        }

        if should_lock {
            let lock_to_set = ProcessLock::from_site_info(site_info.clone());
            if !lock_is_to_site {
                self.set_process_lock(process, lock_to_set, &ctx)?;
            } else {
                let matches = self
                    .processes
                    .get(process)
                    .is_some_and(|record| *record.lock() == lock_to_set);
                if !matches {
                    return Err(IsolationError::ProcessLockMismatch {
                        process,
                        current: lock_display,
                        requested: lock_to_set.to_string(),
                    });
                }
            }
        } else {
            if lock_is_to_site {
                return Err(IsolationError::ProcessLockMismatch {
                    process,
                    current: lock_display,
                    requested: "allow-any-site".to_owned(),
                });
            }
            if lock_is_invalid {
                let lock = ProcessLock::allow_any_site(
                    site_info.storage_partition_config().clone(),
                    site_info.web_exposed_isolation_info().clone(),
                    site_info.is_guest(),
                    site_info.is_fenced(),
                );
                self.set_process_lock(process, lock, &ctx)?;
            }
        }
        if let Some(record) = self.processes.get_mut(process) {
            record.mark_used();
        }
        self.policy.include_isolation_context(process, &ctx);
        Ok(())
    }

    fn set_process_lock(
        &mut self,
        process: RendererProcessId,
        lock: ProcessLock,
        ctx: &IsolationContext,
    ) -> Result<(), IsolationError> {
        self.processes
            .get_mut(process)
            .ok_or(IsolationError::UnknownRendererProcess(process))?
            .set_lock(lock);
        self.policy.include_isolation_context(process, ctx);
        Ok(())
    }

    fn process_may_host(
        &self,
        process: RendererProcessId,
        ctx: &IsolationContext,
        site_info: &SiteInfo,
    ) -> bool {
        let Some(record) = self.processes.get(process) else {
            return false;
        };
        record.is_live() &&
            self.processes.is_suitable_host(
                record,
                ctx,
                site_info,
                &self.config,
                &*self.embedder,
                &self.policy,
            )
    }

    fn maybe_set_default_process(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        site_instance: SiteInstanceId,
        process: RendererProcessId,
    ) {
        if !self.config.share_default_process {
            return;
        }
        let Some(record) = self.site_instances.get(&site_instance) else {
            return;
        };
        if !record.has_site || record.group.is_none() {
            return;
        }
        let Some(ctx) = self
            .browsing_instances
            .get(&browsing_instance)
            .map(|record| record.isolation_context)
        else {
            return;
        };
        if record
            .site_info
            .requires_dedicated_process(&ctx, &self.config, &*self.embedder, &self.policy)
        {
            return;
        }
        if let Some(record) = self.browsing_instances.get_mut(&browsing_instance) {
            record.group_manager.maybe_set_default_process(process);
        }
    }

    fn record_origin_keying_decision(&mut self, ctx: &IsolationContext, url_info: &UrlInfo) {
        let origin = url_info.url.origin();
        if !origin.is_tuple() {
            return;
        }
        let state = self.policy.determine_origin_agent_cluster_isolation(
            ctx,
            &origin,
            url_info.requested_origin_agent_cluster_state(),
        );
        self.policy
            .record_origin_agent_cluster_decision(ctx.browsing_instance_id(), origin, state);
    }

    fn urls_are_same_site_in(
        &self,
        browsing_instance: &BrowsingInstance,
        src: &UrlInfo,
        dest: &UrlInfo,
        should_compare_effective_urls: bool,
    ) -> bool {
        let ctx = browsing_instance.isolation_context;
        let (src_url, dest_url) = if should_compare_effective_urls {
            (
                self.embedder.effective_url(&src.url),
                self.embedder.effective_url(&dest.url),
            )
        } else {
            (src.url.clone(), dest.url.clone())
        };
        if is_renderer_debug_url(&src_url) || is_renderer_debug_url(&dest_url) {
            return true;
        }
        if src.is_sandboxed != dest.is_sandboxed {
            return false;
        }
        // about:blank as destination inherits the source's site.
        if dest_url.is_about_blank() {
            return true;
        }
        if src_url.eq_ignoring_fragment(&dest_url) {
            return true;
        }
        if src_url.scheme() != dest_url.scheme() {
            return false;
        }
        let src_origin = src_url.origin();
        let dest_origin = dest_url.origin();
        let sandboxed_per_origin = src.is_sandboxed &&
            dest.is_sandboxed &&
            self.config.isolate_sandboxed_iframes &&
            self.config.sandbox_grouping == SandboxGrouping::PerOrigin;
        if self.config.strict_origin_isolation || sandboxed_per_origin {
            return src_origin == dest_origin;
        }
        if !same_registrable_domain(&src_url, &dest_url) {
            return false;
        }
        if src_origin == dest_origin {
            return true;
        }
        let src_match =
            self.policy
                .matching_isolated_origin(&ctx, &src_origin, src.requests_origin_keyed_process);
        let dest_match = self.policy.matching_isolated_origin(
            &ctx,
            &dest_origin,
            dest.requests_origin_keyed_process,
        );
        // When either side is covered by an isolated origin, both must fall
        // under the same one.
        if src_match.is_some() || dest_match.is_some() {
            return src_match == dest_match;
        }
        true
    }

    fn teardown_site_instance(&mut self, site_instance: SiteInstanceId) {
        let Some(record) = self.site_instances.remove(&site_instance) else {
            return;
        };
        debug!("Site instance {}: destroyed", site_instance);
        if let Some(group) = record.group {
            let mut emptied = None;
            if let Some(group_record) = self.groups.get_mut(&group) {
                group_record.site_instances.remove(&site_instance);
                if record.has_site {
                    let process = group_record.process;
                    self.processes.decrement_site_count(&record.site_info, process);
                }
                if group_record.site_instances.is_empty() {
                    emptied = Some((group_record.process, group_record.browsing_instance));
                }
            }
            if let Some((process, browsing_instance)) = emptied {
                self.groups.remove(&group);
                if let Some(record) = self.browsing_instances.get_mut(&browsing_instance) {
                    record.group_manager.remove_group_for_process(process);
                }
                debug!("Site instance group {}: destroyed", group);
            }
        }
        if let Some(browsing_record) = self.browsing_instances.get_mut(&record.browsing_instance) {
            if record.has_site {
                browsing_record.unregister_site_instance(site_instance, &record.site_info);
            }
            browsing_record.site_instance_ids.remove(&site_instance);
            if browsing_record.site_instance_ids.is_empty() {
                if browsing_record.active_contents_count > 0 {
                    warn!(
                        "Browsing instance {} destroyed with {} active contents",
                        browsing_record.id, browsing_record.active_contents_count
                    );
                }
                let browsing_instance = record.browsing_instance;
                self.browsing_instances.remove(&browsing_instance);
                self.policy.remove_browsing_instance_state(browsing_instance);
                debug!("Browsing instance {}: destroyed", browsing_instance);
            }
        }
    }
}

/// Whether two URLs share a registrable domain, or host for hosts that have
/// no registrable domain. Schemes are compared by the caller.
fn same_registrable_domain(a: &BulkheadUrl, b: &BulkheadUrl) -> bool {
    match (a.host(), b.host()) {
        (Some(Host::Domain(a_host)), Some(Host::Domain(b_host))) => {
            reg_suffix(a_host) == reg_suffix(b_host)
        },
        (Some(a_host), Some(b_host)) => a_host == b_host,
        _ => false,
    }
}
