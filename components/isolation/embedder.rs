/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Embedder hooks that tune site and process placement decisions without
//! changing the model's invariants. All hooks have conservative defaults, so
//! embedders implement only what they need.

use bulkhead_url::BulkheadUrl;

/// URLs that are renderer debug commands rather than navigations. They run
/// in whatever process currently hosts the frame, so every site instance is
/// suitable for them.
pub fn is_renderer_debug_url(url: &BulkheadUrl) -> bool {
    if url.scheme() == "javascript" {
        return true;
    }
    url.scheme() == "chrome" &&
        matches!(url.host_str(), Some("crash") | Some("hang") | Some("kill"))
}

pub trait EmbedderPolicy {
    /// Map a URL to the URL whose site should be used for site instance
    /// selection. Lets an embedder group URLs under an application URL while
    /// process locks keep using the real one.
    fn effective_url(&self, url: &BulkheadUrl) -> BulkheadUrl {
        url.clone()
    }

    /// Whether effective URLs should be taken into account when deciding if
    /// `dest_url` belongs in a site instance whose site was assigned for
    /// `original_url`.
    fn should_compare_effective_urls(
        &self,
        original_url: Option<&BulkheadUrl>,
        dest_url: &BulkheadUrl,
    ) -> bool {
        let _ = (original_url, dest_url);
        true
    }

    /// Whether navigating to this URL should permanently assign a site to
    /// the site instance that hosts it.
    fn should_assign_site_for_url(&self, url: &BulkheadUrl) -> bool {
        let _ = url;
        true
    }

    /// Whether this site must have a dedicated process even when the
    /// configured process model would not give it one.
    fn does_site_require_dedicated_process(&self, site_url: &BulkheadUrl) -> bool {
        let _ = site_url;
        false
    }

    /// Whether a process hosting this site should be locked to it. Only
    /// consulted for sites that already require a dedicated process.
    fn should_lock_process_to_site(&self, site_url: &BulkheadUrl) -> bool {
        let _ = site_url;
        true
    }

    /// Whether all instances of this site should be consolidated into one
    /// process, regardless of browsing instance.
    fn should_use_process_per_site(&self, site_url: &BulkheadUrl) -> bool {
        let _ = site_url;
        false
    }

    /// Whether the renderer process for this lock URL must run without JIT.
    fn is_jit_disabled_for_site(&self, lock_url: &BulkheadUrl) -> bool {
        let _ = lock_url;
        false
    }
}

/// The hook implementation used when the embedder does not install one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEmbedderPolicy;

impl EmbedderPolicy for DefaultEmbedderPolicy {}
