/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Per browsing instance bookkeeping of site instance groups: which group
//! belongs to which process, and the optional default process that sites
//! not needing isolation coalesce into.

use base::id::{RendererProcessId, SiteInstanceGroupId};
use log::debug;
use rustc_hash::FxHashMap;

#[derive(Default)]
pub(crate) struct SiteInstanceGroupManager {
    /// The process that site instances without isolation requirements get
    /// placed in when process sharing is enabled.
    default_process: Option<RendererProcessId>,
    groups_by_process: FxHashMap<RendererProcessId, SiteInstanceGroupId>,
}

impl SiteInstanceGroupManager {
    pub(crate) fn group_for_process(
        &self,
        process: RendererProcessId,
    ) -> Option<SiteInstanceGroupId> {
        self.groups_by_process.get(&process).copied()
    }

    pub(crate) fn set_group_for_process(
        &mut self,
        process: RendererProcessId,
        group: SiteInstanceGroupId,
    ) {
        self.groups_by_process.insert(process, group);
    }

    pub(crate) fn remove_group_for_process(&mut self, process: RendererProcessId) {
        self.groups_by_process.remove(&process);
    }

    pub(crate) fn default_process(&self) -> Option<RendererProcessId> {
        self.default_process
    }

    /// Adopt `process` as the default process if none is set yet. Called
    /// once a site instance both knows its site and has a process.
    pub(crate) fn maybe_set_default_process(&mut self, process: RendererProcessId) {
        if self.default_process.is_some() {
            return;
        }
        debug!("Process {}: now the default process", process);
        self.default_process = Some(process);
    }

    pub(crate) fn on_process_destroyed(&mut self, process: RendererProcessId) {
        self.groups_by_process.remove(&process);
        if self.default_process == Some(process) {
            self.default_process = None;
        }
    }
}
