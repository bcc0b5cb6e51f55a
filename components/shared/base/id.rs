/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Identifiers for the entities of the process model. Ids are never reused
//! within a [`IdGenerator`]'s lifetime, so a stale id can be detected simply
//! by failing to find it in the corresponding table.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub fn value(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                self.0.fmt(formatter)
            }
        }
    };
}

id_type!(
    /// Identifies a group of site instances that can script each other.
    BrowsingInstanceId
);

id_type!(
    /// Identifies a single site instance within its browsing instance.
    SiteInstanceId
);

id_type!(
    /// Identifies a set of site instances sharing one renderer process
    /// within one browsing instance.
    SiteInstanceGroupId
);

id_type!(
    /// Identifies a renderer process known to the registry.
    RendererProcessId
);

/// Allocates ids for all entity tables. Owned by the model rather than kept
/// in process-wide statics so that independent models never share a
/// namespace.
#[derive(Debug)]
pub struct IdGenerator {
    next_browsing_instance_id: Cell<u32>,
    next_site_instance_id: Cell<u32>,
    next_site_instance_group_id: Cell<u32>,
    next_renderer_process_id: Cell<u32>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> IdGenerator {
        IdGenerator {
            next_browsing_instance_id: Cell::new(1),
            next_site_instance_id: Cell::new(1),
            next_site_instance_group_id: Cell::new(1),
            next_renderer_process_id: Cell::new(1),
        }
    }

    pub fn next_browsing_instance_id(&self) -> BrowsingInstanceId {
        BrowsingInstanceId(self.advance(&self.next_browsing_instance_id))
    }

    /// The id that will be handed out by the next call to
    /// [`IdGenerator::next_browsing_instance_id`]. Used to scope dynamically
    /// isolated origins to browsing instances that do not exist yet.
    pub fn peek_browsing_instance_id(&self) -> BrowsingInstanceId {
        BrowsingInstanceId(self.next_browsing_instance_id.get())
    }

    pub fn next_site_instance_id(&self) -> SiteInstanceId {
        SiteInstanceId(self.advance(&self.next_site_instance_id))
    }

    pub fn next_site_instance_group_id(&self) -> SiteInstanceGroupId {
        SiteInstanceGroupId(self.advance(&self.next_site_instance_group_id))
    }

    pub fn next_renderer_process_id(&self) -> RendererProcessId {
        RendererProcessId(self.advance(&self.next_renderer_process_id))
    }

    fn advance(&self, cell: &Cell<u32>) -> u32 {
        let id = cell.get();
        cell.set(id + 1);
        id
    }
}
