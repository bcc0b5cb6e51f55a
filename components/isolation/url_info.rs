/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Navigation descriptors. A [`UrlInfo`] packages a URL together with
//! everything else about the navigation that influences where its document
//! may live: isolation requests made through headers, sandbox state and the
//! storage partition the embedder picked.

use std::fmt;

use bulkhead_url::{BulkheadUrl, ImmutableOrigin};
use serde::{Deserialize, Serialize};

/// Identifies the storage partition a document reads its data from.
/// Documents in different partitions never share a process.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StoragePartitionConfig {
    partition_domain: String,
    partition_name: String,
    in_memory: bool,
}

impl StoragePartitionConfig {
    pub fn new(partition_domain: &str, partition_name: &str, in_memory: bool) -> Self {
        StoragePartitionConfig {
            partition_domain: partition_domain.to_owned(),
            partition_name: partition_name.to_owned(),
            in_memory,
        }
    }

    pub fn is_default(&self) -> bool {
        self.partition_domain.is_empty() && self.partition_name.is_empty() && !self.in_memory
    }

    pub fn partition_domain(&self) -> &str {
        &self.partition_domain
    }

    pub fn partition_name(&self) -> &str {
        &self.partition_name
    }

    pub fn in_memory(&self) -> bool {
        self.in_memory
    }
}

impl fmt::Display for StoragePartitionConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        if self.is_default() {
            return write!(formatter, "default");
        }
        write!(formatter, "{}.{}", self.partition_domain, self.partition_name)?;
        if self.in_memory {
            write!(formatter, ", in-memory")?;
        }
        Ok(())
    }
}

/// The cross-origin isolation state a document was committed with. Isolated
/// documents can only share a browsing instance with documents isolated to
/// the same origin.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum WebExposedIsolationInfo {
    NotIsolated,
    /// Cross-origin isolated through COOP and COEP headers.
    Isolated(ImmutableOrigin),
    /// An isolated application, with stronger guarantees than plain
    /// cross-origin isolation.
    IsolatedApplication(ImmutableOrigin),
}

impl WebExposedIsolationInfo {
    pub fn is_isolated(&self) -> bool {
        !matches!(self, WebExposedIsolationInfo::NotIsolated)
    }

    pub fn is_isolated_application(&self) -> bool {
        matches!(self, WebExposedIsolationInfo::IsolatedApplication(_))
    }

    pub fn origin(&self) -> Option<&ImmutableOrigin> {
        match *self {
            WebExposedIsolationInfo::NotIsolated => None,
            WebExposedIsolationInfo::Isolated(ref origin) |
            WebExposedIsolationInfo::IsolatedApplication(ref origin) => Some(origin),
        }
    }
}

impl Default for WebExposedIsolationInfo {
    fn default() -> Self {
        WebExposedIsolationInfo::NotIsolated
    }
}

impl fmt::Display for WebExposedIsolationInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            WebExposedIsolationInfo::NotIsolated => write!(formatter, "not isolated"),
            WebExposedIsolationInfo::Isolated(ref origin) => {
                write!(
                    formatter,
                    "cross-origin isolated, coi-origin='{}'",
                    origin.ascii_serialization()
                )
            },
            WebExposedIsolationInfo::IsolatedApplication(ref origin) => write!(
                formatter,
                "cross-origin isolated application, coi-origin='{}'",
                origin.ascii_serialization()
            ),
        }
    }
}

/// The origin-keying state of an origin within one browsing instance, as
/// requested by `Origin-Agent-Cluster` headers and pinned by the first
/// document of that origin to commit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OriginAgentClusterState {
    /// The origin gets its own agent cluster, visible to script.
    pub is_origin_agent_cluster: bool,
    /// The agent cluster additionally gets its own process.
    pub requires_origin_keyed_process: bool,
}

impl OriginAgentClusterState {
    pub fn non_isolated() -> Self {
        OriginAgentClusterState {
            is_origin_agent_cluster: false,
            requires_origin_keyed_process: false,
        }
    }

    pub fn origin_keyed_process() -> Self {
        OriginAgentClusterState {
            is_origin_agent_cluster: true,
            requires_origin_keyed_process: true,
        }
    }
}

/// A URL plus the navigation state that influences site instance selection.
#[derive(Clone, Debug)]
pub struct UrlInfo {
    pub url: BulkheadUrl,
    /// The navigation requested an origin agent cluster through its headers.
    pub requests_origin_agent_cluster: bool,
    /// The requested agent cluster should also get a dedicated process.
    pub requests_origin_keyed_process: bool,
    /// A `Cross-Origin-Opener-Policy` header asked for this site to be
    /// isolated.
    pub requests_coop_isolation: bool,
    pub is_pdf: bool,
    pub is_sandboxed: bool,
    /// Set by the embedder when sandboxed frames are keyed per document.
    pub unique_sandbox_id: Option<u64>,
    /// The partition the embedder placed this navigation in; the default
    /// partition when absent.
    pub storage_partition_config: Option<StoragePartitionConfig>,
    /// The cross-origin isolation state the response was served with, when
    /// known.
    pub web_exposed_isolation_info: Option<WebExposedIsolationInfo>,
}

impl UrlInfo {
    pub fn new(url: BulkheadUrl) -> UrlInfo {
        UrlInfo {
            url,
            requests_origin_agent_cluster: false,
            requests_origin_keyed_process: false,
            requests_coop_isolation: false,
            is_pdf: false,
            is_sandboxed: false,
            unique_sandbox_id: None,
            storage_partition_config: None,
            web_exposed_isolation_info: None,
        }
    }

    pub fn with_origin_keyed_process(mut self) -> UrlInfo {
        self.requests_origin_agent_cluster = true;
        self.requests_origin_keyed_process = true;
        self
    }

    pub fn with_coop_isolation(mut self) -> UrlInfo {
        self.requests_coop_isolation = true;
        self
    }

    pub fn with_pdf(mut self) -> UrlInfo {
        self.is_pdf = true;
        self
    }

    pub fn with_sandbox(mut self, unique_sandbox_id: Option<u64>) -> UrlInfo {
        self.is_sandboxed = true;
        self.unique_sandbox_id = unique_sandbox_id;
        self
    }

    pub fn with_storage_partition(mut self, config: StoragePartitionConfig) -> UrlInfo {
        self.storage_partition_config = Some(config);
        self
    }

    pub fn with_web_exposed_isolation(mut self, info: WebExposedIsolationInfo) -> UrlInfo {
        self.web_exposed_isolation_info = Some(info);
        self
    }

    /// The origin agent cluster state this navigation asks for, before any
    /// stored decision for the origin is taken into account.
    pub fn requested_origin_agent_cluster_state(&self) -> OriginAgentClusterState {
        OriginAgentClusterState {
            is_origin_agent_cluster: self.requests_origin_agent_cluster,
            requires_origin_keyed_process: self.requests_origin_keyed_process,
        }
    }
}
