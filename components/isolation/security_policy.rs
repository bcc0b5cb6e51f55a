/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tracking of isolated origins and of which browsing instances each
//! renderer process has been exposed to.
//!
//! Origins can be marked for isolation at runtime, but an origin that has
//! already committed non-isolated somewhere must keep its old placement
//! there. Isolation decisions are therefore scoped: global entries apply
//! only to browsing instances created after the entry, and header driven
//! decisions are pinned per browsing instance by whichever document of the
//! origin commits first.

use std::collections::BTreeSet;

use base::id::{BrowsingInstanceId, RendererProcessId};
use bulkhead_url::ImmutableOrigin;
use log::{info, warn};
use rustc_hash::FxHashMap;
use strum::Display;
use url::Host;

use crate::url_info::OriginAgentClusterState;

/// Where a site instance lives: its browsing instance, plus the flags that
/// scope everything inside it to guest or fenced frame trees.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IsolationContext {
    browsing_instance_id: BrowsingInstanceId,
    is_guest: bool,
    is_fenced: bool,
}

impl IsolationContext {
    pub fn new(
        browsing_instance_id: BrowsingInstanceId,
        is_guest: bool,
        is_fenced: bool,
    ) -> IsolationContext {
        IsolationContext {
            browsing_instance_id,
            is_guest,
            is_fenced,
        }
    }

    pub fn browsing_instance_id(&self) -> BrowsingInstanceId {
        self.browsing_instance_id
    }

    pub fn is_guest(&self) -> bool {
        self.is_guest
    }

    pub fn is_fenced(&self) -> bool {
        self.is_fenced
    }
}

/// What asked for an origin to be isolated. Only used for logging.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IsolatedOriginSource {
    BuiltIn,
    CommandLine,
    Policy,
    UserTriggered,
    WebTriggered,
    Test,
}

struct IsolatedOriginEntry {
    origin: ImmutableOrigin,
    /// Browsing instances with an id below this one keep their existing
    /// placement for the origin.
    applies_from: BrowsingInstanceId,
    #[allow(dead_code)]
    source: IsolatedOriginSource,
}

/// An isolated origin recorded for one browsing instance only, originating
/// from an `Origin-Agent-Cluster` or `Cross-Origin-Opener-Policy` header.
struct BrowsingInstanceIsolatedOrigin {
    origin: ImmutableOrigin,
    is_origin_agent_cluster: bool,
}

#[derive(Default)]
struct BrowsingInstanceState {
    isolated_origins: Vec<BrowsingInstanceIsolatedOrigin>,
    origin_agent_cluster_states: FxHashMap<ImmutableOrigin, OriginAgentClusterState>,
}

#[derive(Default)]
pub struct SecurityPolicy {
    isolated_origins: Vec<IsolatedOriginEntry>,
    browsing_instance_states: FxHashMap<BrowsingInstanceId, BrowsingInstanceState>,
    process_browsing_instances: FxHashMap<RendererProcessId, BTreeSet<BrowsingInstanceId>>,
}

impl SecurityPolicy {
    pub fn new() -> SecurityPolicy {
        SecurityPolicy::default()
    }

    /// Isolate the given origins in all future browsing instances.
    /// `first_affected` is the id the next browsing instance will get;
    /// existing browsing instances keep their current placements.
    pub fn add_future_isolated_origins(
        &mut self,
        origins: Vec<ImmutableOrigin>,
        source: IsolatedOriginSource,
        first_affected: BrowsingInstanceId,
    ) {
        for origin in origins {
            if !is_valid_isolated_origin(&origin) {
                warn!(
                    "Ignoring invalid isolated origin {}",
                    origin.ascii_serialization()
                );
                continue;
            }
            if self.isolated_origins.iter().any(|entry| entry.origin == origin) {
                continue;
            }
            info!(
                "Isolating {} for future browsing instances ({})",
                origin.ascii_serialization(),
                source
            );
            self.isolated_origins.push(IsolatedOriginEntry {
                origin,
                applies_from: first_affected,
                source,
            });
        }
    }

    /// Isolate an origin within a single browsing instance, in response to a
    /// header served by that origin.
    pub fn add_isolated_origin_for_browsing_instance(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        origin: ImmutableOrigin,
        is_origin_agent_cluster: bool,
        source: IsolatedOriginSource,
    ) {
        if !is_valid_isolated_origin(&origin) {
            return;
        }
        let state = self.browsing_instance_states.entry(browsing_instance).or_default();
        if state.isolated_origins.iter().any(|existing| {
            existing.origin == origin && existing.is_origin_agent_cluster == is_origin_agent_cluster
        }) {
            return;
        }
        info!(
            "Isolating {} in browsing instance {} ({})",
            origin.ascii_serialization(),
            browsing_instance,
            source
        );
        state.isolated_origins.push(BrowsingInstanceIsolatedOrigin {
            origin,
            is_origin_agent_cluster,
        });
    }

    /// The most specific isolated origin covering `origin` in this context,
    /// if any. A subdomain matches an isolated origin for its parent domain;
    /// ports are ignored. Origin keyed agent clusters match only themselves
    /// and take precedence.
    pub fn matching_isolated_origin(
        &self,
        ctx: &IsolationContext,
        origin: &ImmutableOrigin,
        requests_origin_keyed_process: bool,
    ) -> Option<ImmutableOrigin> {
        let requested = if requests_origin_keyed_process {
            OriginAgentClusterState::origin_keyed_process()
        } else {
            OriginAgentClusterState::non_isolated()
        };
        if self
            .determine_origin_agent_cluster_isolation(ctx, origin, requested)
            .requires_origin_keyed_process
        {
            return Some(origin.clone());
        }

        let mut best: Option<&ImmutableOrigin> = None;
        let global = self
            .isolated_origins
            .iter()
            .filter(|entry| entry.applies_from <= ctx.browsing_instance_id())
            .map(|entry| &entry.origin);
        let scoped = self
            .browsing_instance_states
            .get(&ctx.browsing_instance_id())
            .into_iter()
            .flat_map(|state| state.isolated_origins.iter())
            .filter(|entry| !entry.is_origin_agent_cluster)
            .map(|entry| &entry.origin);
        for candidate in global.chain(scoped) {
            if !isolated_origin_matches(candidate, origin) {
                continue;
            }
            let better = match best {
                Some(current) => host_length(candidate) > host_length(current),
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best.cloned()
    }

    pub fn is_isolated_origin(
        &self,
        ctx: &IsolationContext,
        origin: &ImmutableOrigin,
        requests_origin_keyed_process: bool,
    ) -> bool {
        self.matching_isolated_origin(ctx, origin, requests_origin_keyed_process)
            .is_some()
    }

    /// The origin agent cluster state to use for `origin` in this browsing
    /// instance. A decision pinned by an earlier document of the origin wins
    /// over whatever the current navigation requests.
    pub fn determine_origin_agent_cluster_isolation(
        &self,
        ctx: &IsolationContext,
        origin: &ImmutableOrigin,
        requested: OriginAgentClusterState,
    ) -> OriginAgentClusterState {
        if let Some(stored) = self
            .browsing_instance_states
            .get(&ctx.browsing_instance_id())
            .and_then(|state| state.origin_agent_cluster_states.get(origin))
        {
            return *stored;
        }
        requested
    }

    /// Pin the origin agent cluster outcome for an origin in a browsing
    /// instance. The first recorded decision wins; later documents of the
    /// same origin see the pinned state regardless of their own headers.
    pub fn record_origin_agent_cluster_decision(
        &mut self,
        browsing_instance: BrowsingInstanceId,
        origin: ImmutableOrigin,
        state: OriginAgentClusterState,
    ) {
        self.browsing_instance_states
            .entry(browsing_instance)
            .or_default()
            .origin_agent_cluster_states
            .entry(origin)
            .or_insert(state);
    }

    /// Remember that a process hosts content from a browsing instance. The
    /// set only grows while the process lives; it scopes which isolated
    /// origin entries the process was subject to.
    pub fn include_isolation_context(
        &mut self,
        process: RendererProcessId,
        ctx: &IsolationContext,
    ) {
        self.process_browsing_instances
            .entry(process)
            .or_default()
            .insert(ctx.browsing_instance_id());
    }

    pub fn browsing_instances_for_process(
        &self,
        process: RendererProcessId,
    ) -> Option<&BTreeSet<BrowsingInstanceId>> {
        self.process_browsing_instances.get(&process)
    }

    pub fn remove_browsing_instance_state(&mut self, browsing_instance: BrowsingInstanceId) {
        self.browsing_instance_states.remove(&browsing_instance);
        for instances in self.process_browsing_instances.values_mut() {
            instances.remove(&browsing_instance);
        }
    }

    pub fn remove_process_state(&mut self, process: RendererProcessId) {
        self.process_browsing_instances.remove(&process);
    }
}

/// Isolating an origin only makes sense for tuple origins on web schemes
/// with a host that is more than a bare label.
fn is_valid_isolated_origin(origin: &ImmutableOrigin) -> bool {
    let Some(scheme) = origin.scheme() else {
        return false;
    };
    if scheme != "http" && scheme != "https" {
        return false;
    }
    match origin.host() {
        Some(&Host::Domain(ref domain)) => domain == "localhost" || domain.contains('.'),
        Some(_) => true,
        None => false,
    }
}

fn isolated_origin_matches(isolated: &ImmutableOrigin, origin: &ImmutableOrigin) -> bool {
    let (Some(isolated_scheme), Some(origin_scheme)) = (isolated.scheme(), origin.scheme()) else {
        return false;
    };
    if isolated_scheme != origin_scheme {
        return false;
    }
    match (isolated.host(), origin.host()) {
        (Some(&Host::Domain(ref isolated_host)), Some(&Host::Domain(ref origin_host))) => {
            origin_host == isolated_host ||
                origin_host.ends_with(&format!(".{}", isolated_host))
        },
        (Some(isolated_host), Some(origin_host)) => isolated_host == origin_host,
        _ => false,
    }
}

fn host_length(origin: &ImmutableOrigin) -> usize {
    match origin.host() {
        Some(&Host::Domain(ref domain)) => domain.len(),
        Some(host) => host.to_string().len(),
        None => 0,
    }
}
