/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Mapping URLs to sites.
//!
//! A [`SiteInfo`] is the complete principal descriptor of a site instance:
//! the site URL documents are grouped under, the URL processes get locked
//! to, and every additional bit that forbids sharing a process (sandbox
//! status, storage partition, cross-origin isolation, and so on). Two
//! site instances are interchangeable exactly when their [`SiteInfo`]s
//! compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use bulkhead_url::{BulkheadUrl, ImmutableOrigin};
use url::{Host, Position};

use crate::config::{IsolationConfig, SandboxGrouping};
use crate::embedder::EmbedderPolicy;
use crate::pub_domains::reg_suffix;
use crate::security_policy::{IsolationContext, SecurityPolicy};
use crate::url_info::{StoragePartitionConfig, UrlInfo, WebExposedIsolationInfo};

/// The site URL shared by everything placed in a default site instance.
/// Uses a reserved TLD so it can never collide with a real site.
pub fn default_site_url() -> BulkheadUrl {
    static URL: LazyLock<BulkheadUrl> = LazyLock::new(|| {
        BulkheadUrl::parse("http://unisolated.invalid").expect("default site URL must parse")
    });
    URL.clone()
}

/// The site URL assigned to error pages, which are always isolated from the
/// sites whose load failed.
pub fn error_site_url() -> BulkheadUrl {
    static URL: LazyLock<BulkheadUrl> = LazyLock::new(|| {
        BulkheadUrl::parse("chrome-error://chromewebdata").expect("error site URL must parse")
    });
    URL.clone()
}

const ERROR_PAGE_SCHEME: &str = "chrome-error";

#[derive(Clone)]
pub struct SiteInfo {
    site_url: Option<BulkheadUrl>,
    process_lock_url: Option<BulkheadUrl>,
    requires_origin_keyed_process: bool,
    is_sandboxed: bool,
    unique_sandbox_id: Option<u64>,
    storage_partition_config: StoragePartitionConfig,
    web_exposed_isolation_info: WebExposedIsolationInfo,
    is_guest: bool,
    does_site_request_dedicated_process_for_coop: bool,
    is_jit_disabled: bool,
    is_pdf: bool,
    is_fenced: bool,
}

impl SiteInfo {
    /// Compute the [`SiteInfo`] a navigation resolves to within the given
    /// browsing instance.
    pub fn create(
        ctx: &IsolationContext,
        url_info: &UrlInfo,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> SiteInfo {
        let storage_partition_config =
            url_info.storage_partition_config.clone().unwrap_or_default();
        let web_exposed_isolation_info =
            url_info.web_exposed_isolation_info.clone().unwrap_or_default();

        if url_info.url.scheme() == ERROR_PAGE_SCHEME {
            return SiteInfo::create_for_error_page(
                storage_partition_config,
                web_exposed_isolation_info,
                ctx.is_guest(),
                ctx.is_fenced(),
            );
        }

        let requires_origin_keyed_process = {
            let origin = url_info.url.origin();
            origin.is_tuple() &&
                policy
                    .determine_origin_agent_cluster_isolation(
                        ctx,
                        &origin,
                        url_info.requested_origin_agent_cluster_state(),
                    )
                    .requires_origin_keyed_process
        };

        let is_sandboxed = url_info.is_sandboxed && config.isolate_sandboxed_iframes;
        let unique_sandbox_id = if is_sandboxed &&
            config.sandbox_grouping == SandboxGrouping::PerDocument
        {
            url_info.unique_sandbox_id
        } else {
            None
        };

        let site_url = site_for_url(ctx, url_info, true, config, embedder, policy);
        let process_lock_url = determine_process_lock_url(ctx, url_info, config, embedder, policy);
        let is_jit_disabled = url_info.is_pdf ||
            process_lock_url
                .as_ref()
                .is_some_and(|lock_url| embedder.is_jit_disabled_for_site(lock_url));

        SiteInfo {
            site_url,
            process_lock_url,
            requires_origin_keyed_process,
            is_sandboxed,
            unique_sandbox_id,
            storage_partition_config,
            web_exposed_isolation_info,
            is_guest: ctx.is_guest(),
            does_site_request_dedicated_process_for_coop: url_info.requests_coop_isolation,
            is_jit_disabled,
            is_pdf: url_info.is_pdf,
            is_fenced: ctx.is_fenced(),
        }
    }

    pub fn create_for_error_page(
        storage_partition_config: StoragePartitionConfig,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> SiteInfo {
        SiteInfo {
            site_url: Some(error_site_url()),
            process_lock_url: Some(error_site_url()),
            requires_origin_keyed_process: false,
            is_sandboxed: false,
            unique_sandbox_id: None,
            storage_partition_config,
            web_exposed_isolation_info,
            is_guest,
            does_site_request_dedicated_process_for_coop: false,
            is_jit_disabled: false,
            is_pdf: false,
            is_fenced,
        }
    }

    /// The shared [`SiteInfo`] of a default site instance. All sites that do
    /// not require a dedicated process map onto this one descriptor.
    pub fn create_for_default_site_instance(
        storage_partition_config: StoragePartitionConfig,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> SiteInfo {
        SiteInfo {
            site_url: Some(default_site_url()),
            process_lock_url: Some(default_site_url()),
            requires_origin_keyed_process: false,
            is_sandboxed: false,
            unique_sandbox_id: None,
            storage_partition_config,
            web_exposed_isolation_info,
            is_guest,
            does_site_request_dedicated_process_for_coop: false,
            is_jit_disabled: false,
            is_pdf: false,
            is_fenced,
        }
    }

    /// The descriptor of a site instance that has no site yet.
    pub(crate) fn empty(
        storage_partition_config: StoragePartitionConfig,
        web_exposed_isolation_info: WebExposedIsolationInfo,
        is_guest: bool,
        is_fenced: bool,
    ) -> SiteInfo {
        SiteInfo {
            site_url: None,
            process_lock_url: None,
            requires_origin_keyed_process: false,
            is_sandboxed: false,
            unique_sandbox_id: None,
            storage_partition_config,
            web_exposed_isolation_info,
            is_guest,
            does_site_request_dedicated_process_for_coop: false,
            is_jit_disabled: false,
            is_pdf: false,
            is_fenced,
        }
    }

    /// A copy of this descriptor for a sandboxed document of the same site.
    pub fn sandboxed_clone(&self, unique_sandbox_id: Option<u64>) -> SiteInfo {
        let mut result = self.clone();
        result.is_sandboxed = true;
        result.unique_sandbox_id = unique_sandbox_id;
        result
    }

    /// A copy of this descriptor for a fenced frame embedding the same site.
    pub(crate) fn fenced_clone(&self) -> SiteInfo {
        let mut result = self.clone();
        result.is_fenced = true;
        result
    }

    pub fn site_url(&self) -> Option<&BulkheadUrl> {
        self.site_url.as_ref()
    }

    pub fn process_lock_url(&self) -> Option<&BulkheadUrl> {
        self.process_lock_url.as_ref()
    }

    pub fn requires_origin_keyed_process(&self) -> bool {
        self.requires_origin_keyed_process
    }

    pub fn is_sandboxed(&self) -> bool {
        self.is_sandboxed
    }

    pub fn unique_sandbox_id(&self) -> Option<u64> {
        self.unique_sandbox_id
    }

    pub fn storage_partition_config(&self) -> &StoragePartitionConfig {
        &self.storage_partition_config
    }

    pub fn web_exposed_isolation_info(&self) -> &WebExposedIsolationInfo {
        &self.web_exposed_isolation_info
    }

    pub fn is_guest(&self) -> bool {
        self.is_guest
    }

    pub fn does_site_request_dedicated_process_for_coop(&self) -> bool {
        self.does_site_request_dedicated_process_for_coop
    }

    pub fn is_jit_disabled(&self) -> bool {
        self.is_jit_disabled
    }

    pub fn is_pdf(&self) -> bool {
        self.is_pdf
    }

    pub fn is_fenced(&self) -> bool {
        self.is_fenced
    }

    pub fn is_error_page(&self) -> bool {
        self.site_url
            .as_ref()
            .is_some_and(|url| *url == error_site_url())
    }

    pub fn is_default(&self) -> bool {
        self.site_url
            .as_ref()
            .is_some_and(|url| *url == default_site_url())
    }

    /// Whether documents of this site must never share a process with any
    /// other site.
    pub fn requires_dedicated_process(
        &self,
        ctx: &IsolationContext,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> bool {
        let Some(site_url) = self.site_url.as_ref() else {
            return false;
        };
        if config.site_per_process {
            return true;
        }
        if self.does_site_request_dedicated_process_for_coop {
            return true;
        }
        let site_origin = site_url.origin();
        if site_origin.is_tuple() &&
            policy.is_isolated_origin(ctx, &site_origin, self.requires_origin_keyed_process)
        {
            return true;
        }
        if self.is_sandboxed {
            return true;
        }
        if self.is_error_page() {
            return true;
        }
        if self.is_pdf {
            return true;
        }
        embedder.does_site_require_dedicated_process(site_url)
    }

    /// Whether a process hosting this site should be locked so that no other
    /// site can ever be committed into it.
    pub fn should_lock_process_to_site(
        &self,
        ctx: &IsolationContext,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
        policy: &SecurityPolicy,
    ) -> bool {
        if !self.requires_dedicated_process(ctx, config, embedder, policy) {
            return false;
        }
        let Some(site_url) = self.site_url.as_ref() else {
            return false;
        };
        embedder.should_lock_process_to_site(site_url)
    }

    /// Whether all site instances for this site should funnel into a single
    /// process, across browsing instances.
    pub fn should_use_process_per_site(
        &self,
        config: &IsolationConfig,
        embedder: &dyn EmbedderPolicy,
    ) -> bool {
        if self.is_error_page() {
            return true;
        }
        if config.process_per_site {
            return true;
        }
        let Some(site_url) = self.site_url.as_ref() else {
            return false;
        };
        embedder.should_use_process_per_site(site_url)
    }

    /// Like equality, but also requires the COOP isolation request bit to
    /// agree. Plain equality ignores that bit so that a site that newly
    /// serves the header still maps onto its existing instance.
    pub fn is_exact_match(&self, other: &SiteInfo) -> bool {
        self == other &&
            self.does_site_request_dedicated_process_for_coop ==
                other.does_site_request_dedicated_process_for_coop
    }

    /// Whether two descriptors would produce identical process locks.
    /// Ignores the site URL: two sites with the same lock URL can share a
    /// suitably locked process.
    pub fn has_same_process_lock(&self, other: &SiteInfo) -> bool {
        self.process_lock_key() == other.process_lock_key()
    }

    fn principal_key(
        &self,
    ) -> (
        Option<&str>,
        Option<&str>,
        bool,
        bool,
        Option<u64>,
        &StoragePartitionConfig,
        &WebExposedIsolationInfo,
        bool,
        bool,
        bool,
        bool,
    ) {
        (
            self.site_url.as_ref().map(BulkheadUrl::as_str),
            self.process_lock_url.as_ref().map(BulkheadUrl::as_str),
            self.requires_origin_keyed_process,
            self.is_sandboxed,
            self.unique_sandbox_id,
            &self.storage_partition_config,
            &self.web_exposed_isolation_info,
            self.is_guest,
            self.is_jit_disabled,
            self.is_pdf,
            self.is_fenced,
        )
    }

    pub(crate) fn process_lock_key(
        &self,
    ) -> (
        Option<&str>,
        bool,
        bool,
        Option<u64>,
        bool,
        bool,
        &WebExposedIsolationInfo,
        &StoragePartitionConfig,
        bool,
    ) {
        (
            self.process_lock_url.as_ref().map(BulkheadUrl::as_str),
            self.requires_origin_keyed_process,
            self.is_sandboxed,
            self.unique_sandbox_id,
            self.is_pdf,
            self.is_guest,
            &self.web_exposed_isolation_info,
            &self.storage_partition_config,
            self.is_fenced,
        )
    }
}

// Equality and hashing ignore the COOP request bit, see `is_exact_match`.
impl PartialEq for SiteInfo {
    fn eq(&self, other: &SiteInfo) -> bool {
        self.principal_key() == other.principal_key()
    }
}

impl Eq for SiteInfo {}

impl Hash for SiteInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.principal_key().hash(state);
    }
}

impl fmt::Display for SiteInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self.site_url.as_ref() {
            Some(site_url) => write!(formatter, "{}", site_url)?,
            None => write!(formatter, "empty site")?,
        }
        match self.process_lock_url.as_ref() {
            Some(lock_url) if self.site_url.as_ref() != Some(lock_url) => {
                write!(formatter, ", locked to {}", lock_url)?
            },
            Some(_) => {},
            None => write!(formatter, ", empty lock")?,
        }
        if self.requires_origin_keyed_process {
            write!(formatter, ", origin-keyed")?;
        }
        if self.is_sandboxed {
            write!(formatter, ", sandboxed")?;
            if let Some(id) = self.unique_sandbox_id {
                write!(formatter, " (id={})", id)?;
            }
        }
        if self.web_exposed_isolation_info.is_isolated() {
            write!(formatter, ", {}", self.web_exposed_isolation_info)?;
        }
        if self.is_guest {
            write!(formatter, ", guest")?;
        }
        if self.does_site_request_dedicated_process_for_coop {
            write!(formatter, ", requests coop isolation")?;
        }
        if self.is_jit_disabled {
            write!(formatter, ", jitless")?;
        }
        if self.is_pdf {
            write!(formatter, ", pdf")?;
        }
        if !self.storage_partition_config.is_default() {
            write!(formatter, ", partition={}", self.storage_partition_config)?;
        }
        if self.is_fenced {
            write!(formatter, ", is_fenced")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SiteInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "SiteInfo({})", self)
    }
}

/// The URL a process hosting this navigation gets locked to. Never takes
/// effective URLs into account: a hosted app shares a site with its
/// application URL, but its process may only ever be locked to the real
/// origin it serves.
pub fn determine_process_lock_url(
    ctx: &IsolationContext,
    url_info: &UrlInfo,
    config: &IsolationConfig,
    embedder: &dyn EmbedderPolicy,
    policy: &SecurityPolicy,
) -> Option<BulkheadUrl> {
    site_for_url(ctx, url_info, false, config, embedder, policy)
}

/// The site URL for a navigation, optionally resolved through the
/// embedder's effective URL mapping.
pub fn site_for_url(
    ctx: &IsolationContext,
    url_info: &UrlInfo,
    use_effective_urls: bool,
    config: &IsolationConfig,
    embedder: &dyn EmbedderPolicy,
    policy: &SecurityPolicy,
) -> Option<BulkheadUrl> {
    if url_info.url.scheme() == ERROR_PAGE_SCHEME {
        return Some(error_site_url());
    }
    let url = if use_effective_urls {
        embedder.effective_url(&url_info.url)
    } else {
        url_info.url.clone()
    };
    site_for_url_impl(
        ctx,
        &url,
        url_info.is_sandboxed && config.isolate_sandboxed_iframes,
        url_info.requests_origin_keyed_process,
        config,
        policy,
    )
}

fn site_for_url_impl(
    ctx: &IsolationContext,
    url: &BulkheadUrl,
    is_sandboxed: bool,
    requests_origin_keyed_process: bool,
    config: &IsolationConfig,
    policy: &SecurityPolicy,
) -> Option<BulkheadUrl> {
    // Nested schemes resolve to the site of the URL they wrap.
    if url.scheme() == "blob" || url.scheme() == "filesystem" {
        if let Ok(inner) = BulkheadUrl::parse(url.path()) {
            return site_for_url_impl(
                ctx,
                &inner,
                is_sandboxed,
                requests_origin_keyed_process,
                config,
                policy,
            );
        }
    }

    if url.scheme() == "file" {
        // All file URLs share one site; their origins are not comparable.
        return BulkheadUrl::parse("file:///").ok();
    }

    if url.host_str().is_some_and(|host| !host.is_empty()) {
        let scheme = url.scheme();
        let origin_keyed =
            (scheme == "http" || scheme == "https") && config.strict_origin_isolation;
        let sandboxed_per_origin =
            is_sandboxed && config.sandbox_grouping == SandboxGrouping::PerOrigin;
        if origin_keyed || sandboxed_per_origin {
            return origin_site(url);
        }

        let origin = url.origin();
        if origin.is_tuple() {
            if let Some(isolated_origin) =
                policy.matching_isolated_origin(ctx, &origin, requests_origin_keyed_process)
            {
                return BulkheadUrl::parse(&isolated_origin.ascii_serialization()).ok();
            }
        }

        return site_for_scheme_and_host(url);
    }

    // No host. Data and opaque blob URLs are their own site; everything else
    // collapses onto its scheme.
    match url.scheme() {
        "data" | "blob" => BulkheadUrl::parse(&url[..Position::AfterQuery]).ok(),
        scheme => BulkheadUrl::parse(&format!("{}:", scheme)).ok(),
    }
}

/// The site of an origin: its scheme plus its registrable domain, with the
/// port dropped. IP addresses and hosts that are themselves a public suffix
/// keep the full host.
pub fn site_for_origin(origin: &ImmutableOrigin) -> Option<BulkheadUrl> {
    let scheme = origin.scheme()?;
    let host = origin.host()?;
    let registrable = match *host {
        Host::Domain(ref domain) => reg_suffix(domain).to_owned(),
        Host::Ipv4(_) | Host::Ipv6(_) => host.to_string(),
    };
    BulkheadUrl::parse(&format!("{}://{}", scheme, registrable)).ok()
}

fn site_for_scheme_and_host(url: &BulkheadUrl) -> Option<BulkheadUrl> {
    let registrable = match url.host()? {
        Host::Domain(domain) => reg_suffix(domain).to_owned(),
        Host::Ipv4(_) | Host::Ipv6(_) => url.host_str()?.to_owned(),
    };
    BulkheadUrl::parse(&format!("{}://{}", url.scheme(), registrable)).ok()
}

/// The full origin of a URL as a site URL, keeping any non-default port.
fn origin_site(url: &BulkheadUrl) -> Option<BulkheadUrl> {
    let origin = url.as_url().origin();
    if !matches!(origin, url::Origin::Tuple(..)) {
        return None;
    }
    BulkheadUrl::parse(&origin.ascii_serialization()).ok()
}
