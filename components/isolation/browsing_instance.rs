/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Browsing instance records. A browsing instance is the unit of script
//! connectivity: documents that can name or script each other always live
//! in the same one, and within it each site maps to at most one site
//! instance.

use base::id::{BrowsingInstanceId, SiteInstanceId};
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::group_manager::SiteInstanceGroupManager;
use crate::security_policy::IsolationContext;
use crate::site_info::SiteInfo;
use crate::url_info::WebExposedIsolationInfo;

pub(crate) struct BrowsingInstance {
    pub id: BrowsingInstanceId,
    pub isolation_context: IsolationContext,
    /// The cross-origin isolation state every document in this browsing
    /// instance must agree with.
    pub web_exposed_isolation_info: WebExposedIsolationInfo,
    /// At most one site instance per site.
    pub site_instance_map: FxHashMap<SiteInfo, SiteInstanceId>,
    /// Every site instance in this browsing instance, registered or not.
    pub site_instance_ids: FxHashSet<SiteInstanceId>,
    /// Tabs and other top level contents currently alive in this browsing
    /// instance.
    pub active_contents_count: u32,
    pub default_site_instance: Option<SiteInstanceId>,
    pub group_manager: SiteInstanceGroupManager,
}

impl BrowsingInstance {
    pub(crate) fn new(
        id: BrowsingInstanceId,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> BrowsingInstance {
        debug!("Browsing instance {}: created", id);
        BrowsingInstance {
            id,
            isolation_context: IsolationContext::new(id, is_guest, is_fenced),
            web_exposed_isolation_info,
            site_instance_map: FxHashMap::default(),
            site_instance_ids: FxHashSet::default(),
            active_contents_count: 0,
            default_site_instance: None,
            group_manager: SiteInstanceGroupManager::default(),
        }
    }

    /// Make `site_instance` the canonical instance for its site. The first
    /// registration for a site wins; instances that lose the race keep
    /// working but are not returned by lookups.
    pub(crate) fn register_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
        site_info: &SiteInfo,
    ) {
        if site_info.is_default() && self.default_site_instance.is_none() {
            self.default_site_instance = Some(site_instance);
        }
        let id = self.id;
        self.site_instance_map
            .entry(site_info.clone())
            .or_insert_with(|| {
                debug!(
                    "Browsing instance {}: site instance {} registered for {}",
                    id, site_instance, site_info
                );
                site_instance
            });
    }

    /// Remove `site_instance` from the site map if it is the registered
    /// instance for its site.
    pub(crate) fn unregister_site_instance(
        &mut self,
        site_instance: SiteInstanceId,
        site_info: &SiteInfo,
    ) {
        if let Some(registered) = self.site_instance_map.get(site_info) {
            if *registered == site_instance {
                self.site_instance_map.remove(site_info);
            }
        }
        if self.default_site_instance == Some(site_instance) {
            self.default_site_instance = None;
        }
    }

    pub(crate) fn has_site_instance(&self, site_info: &SiteInfo) -> bool {
        self.site_instance_map.contains_key(site_info)
    }
}
