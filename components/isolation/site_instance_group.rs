/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Site instance groups. A group collects the site instances of one
//! browsing instance that share a renderer process, and carries the frame
//! accounting the embedder needs to know when that process has nothing
//! left to show.

use base::id::{BrowsingInstanceId, RendererProcessId, SiteInstanceGroupId, SiteInstanceId};
use rustc_hash::FxHashSet;

pub(crate) struct SiteInstanceGroup {
    pub id: SiteInstanceGroupId,
    pub browsing_instance: BrowsingInstanceId,
    pub process: RendererProcessId,
    /// Frames currently rendered by this group across all its site
    /// instances.
    pub active_frame_count: u32,
    pub site_instances: FxHashSet<SiteInstanceId>,
}

impl SiteInstanceGroup {
    pub(crate) fn new(
        id: SiteInstanceGroupId,
        browsing_instance: BrowsingInstanceId,
        process: RendererProcessId,
    ) -> SiteInstanceGroup {
        SiteInstanceGroup {
            id,
            browsing_instance,
            process,
            active_frame_count: 0,
            site_instances: FxHashSet::default(),
        }
    }
}

/// Notifications the embedder polls after driving the model. Mirrors what
/// observers of a group would be told.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupEvent {
    /// The last active frame of a group went away. The embedder may shut
    /// the process down if nothing else keeps it alive.
    ActiveFrameCountIsZero(SiteInstanceGroupId),
    /// The renderer process of a group exited. All groups bound to the
    /// process report this.
    RenderProcessGone(SiteInstanceGroupId, RendererProcessId),
}
