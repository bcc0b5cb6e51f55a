/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

mod browsing_instance;
mod config;
mod embedder;
mod error;
mod group_manager;
mod model;
mod process;
pub mod pub_domains;
mod security_policy;
mod site_info;
mod site_instance;
mod site_instance_group;
mod url_info;

pub use crate::config::{IsolationConfig, SandboxGrouping};
pub use crate::embedder::{DefaultEmbedderPolicy, EmbedderPolicy, is_renderer_debug_url};
pub use crate::error::IsolationError;
pub use crate::model::Bulkhead;
pub use crate::process::{ProcessLock, RendererProcess};
pub use crate::security_policy::{IsolatedOriginSource, IsolationContext, SecurityPolicy};
pub use crate::site_info::{
    SiteInfo, default_site_url, determine_process_lock_url, error_site_url, site_for_origin,
    site_for_url,
};
pub use crate::site_instance::ProcessAssignment;
pub use crate::site_instance_group::GroupEvent;
pub use crate::url_info::{
    OriginAgentClusterState, StoragePartitionConfig, UrlInfo, WebExposedIsolationInfo,
};
