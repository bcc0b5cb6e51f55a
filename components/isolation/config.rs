/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Process model configuration. A [`IsolationConfig`] is fixed for the
//! lifetime of the model that owns it; changing process models between two
//! navigations of one browsing instance is never supported.

use serde::{Deserialize, Serialize};

/// How sandboxed frames are grouped into site instances when
/// [`IsolationConfig::isolate_sandboxed_iframes`] is on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SandboxGrouping {
    /// All sandboxed frames from one site share a site instance.
    PerSite,
    /// Sandboxed frames are keyed by their full origin.
    PerOrigin,
    /// Every sandboxed document gets its own site instance, keyed by the
    /// unique sandbox id the embedder attached to the navigation.
    PerDocument,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IsolationConfig {
    /// Give every site a dedicated process.
    pub site_per_process: bool,
    /// Key sites by full origin rather than scheme and registrable domain.
    pub strict_origin_isolation: bool,
    /// Consolidate all site instances for one site into a single process,
    /// across browsing instances.
    pub process_per_site: bool,
    /// Place sites that do not require a dedicated process into a single
    /// shared site instance per browsing instance. Mutually exclusive with
    /// `share_default_process`.
    pub use_default_site_instance: bool,
    /// Keep one site instance per site, but let the ones that do not require
    /// a dedicated process share one default process per browsing instance.
    /// Mutually exclusive with `use_default_site_instance`.
    pub share_default_process: bool,
    /// Put sandboxed frames into site instances separate from their site.
    pub isolate_sandboxed_iframes: bool,
    /// How sandboxed frames are keyed when they are isolated.
    pub sandbox_grouping: SandboxGrouping,
    /// Soft cap on renderer processes. Above the cap, allocation prefers
    /// reusing any suitable existing process over spawning.
    pub process_limit: Option<usize>,
}

impl IsolationConfig {
    /// Full site isolation: every site gets its own process.
    pub fn strict() -> IsolationConfig {
        IsolationConfig {
            site_per_process: true,
            strict_origin_isolation: false,
            process_per_site: false,
            use_default_site_instance: false,
            share_default_process: false,
            isolate_sandboxed_iframes: false,
            sandbox_grouping: SandboxGrouping::PerSite,
            process_limit: None,
        }
    }

    /// Partial isolation: only sites that explicitly require it get their
    /// own process, everything else shares a default site instance per
    /// browsing instance.
    pub fn sharing() -> IsolationConfig {
        IsolationConfig {
            site_per_process: false,
            strict_origin_isolation: false,
            process_per_site: false,
            use_default_site_instance: true,
            share_default_process: false,
            isolate_sandboxed_iframes: false,
            sandbox_grouping: SandboxGrouping::PerSite,
            process_limit: None,
        }
    }
}

impl Default for IsolationConfig {
    fn default() -> Self {
        IsolationConfig::strict()
    }
}
