/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use base::id::IdGenerator;
use bulkhead_url::{BulkheadUrl, ImmutableOrigin};
use isolation::{
    Bulkhead, IsolatedOriginSource, IsolationConfig, IsolationContext, OriginAgentClusterState,
    SecurityPolicy, UrlInfo,
};

fn url(input: &str) -> BulkheadUrl {
    BulkheadUrl::parse(input).expect("invalid test URL")
}

fn info(input: &str) -> UrlInfo {
    UrlInfo::new(url(input))
}

fn origin(input: &str) -> ImmutableOrigin {
    url(input).origin()
}

/// A config where only explicitly isolated origins force dedicated
/// processes.
fn partial_isolation() -> IsolationConfig {
    let mut config = IsolationConfig::strict();
    config.site_per_process = false;
    config
}

#[test]
fn test_future_isolation_applies_to_new_browsing_instances_only() {
    let mut model = Bulkhead::new(partial_isolation());
    let old = model
        .create_site_instance_for_url_info(&info("https://isolated.example.com/"), false)
        .expect("creation failed");
    assert!(!model.requires_dedicated_process(old));

    model.add_future_isolated_origins(
        vec![origin("https://isolated.example.com")],
        IsolatedOriginSource::Test,
    );
    // The old browsing instance keeps its placement.
    assert!(!model.requires_dedicated_process(old));
    assert_eq!(
        model.site_url_of(old).map(|url| url.as_str().to_owned()),
        Some("https://example.com/".to_owned())
    );

    let new = model
        .create_site_instance_for_url_info(&info("https://isolated.example.com/"), false)
        .expect("creation failed");
    assert!(model.requires_dedicated_process(new));
    assert_eq!(
        model.site_url_of(new).map(|url| url.as_str().to_owned()),
        Some("https://isolated.example.com/".to_owned())
    );
}

#[test]
fn test_isolated_origin_matches_subdomains() {
    let mut policy = SecurityPolicy::new();
    let ids = IdGenerator::new();
    let browsing_instance = ids.next_browsing_instance_id();
    let ctx = IsolationContext::new(browsing_instance, false, false);
    policy.add_future_isolated_origins(
        vec![origin("https://isolated.com")],
        IsolatedOriginSource::Test,
        browsing_instance,
    );

    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://isolated.com"), false),
        Some(origin("https://isolated.com"))
    );
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://sub.isolated.com"), false),
        Some(origin("https://isolated.com"))
    );
    // Ports are ignored when matching.
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://isolated.com:8443"), false),
        Some(origin("https://isolated.com"))
    );
    // A lookalike suffix is not a subdomain.
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://isolated.com.evil.org"), false),
        None
    );
    // The scheme must match.
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("http://isolated.com"), false),
        None
    );
}

#[test]
fn test_longest_matching_isolated_origin_wins() {
    let mut policy = SecurityPolicy::new();
    let ids = IdGenerator::new();
    let browsing_instance = ids.next_browsing_instance_id();
    let ctx = IsolationContext::new(browsing_instance, false, false);
    policy.add_future_isolated_origins(
        vec![origin("https://example.com"), origin("https://sub.example.com")],
        IsolatedOriginSource::Test,
        browsing_instance,
    );

    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://a.sub.example.com"), false),
        Some(origin("https://sub.example.com"))
    );
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://other.example.com"), false),
        Some(origin("https://example.com"))
    );
}

#[test]
fn test_origin_agent_cluster_pins_the_first_decision() {
    let mut policy = SecurityPolicy::new();
    let ids = IdGenerator::new();
    let browsing_instance = ids.next_browsing_instance_id();
    let ctx = IsolationContext::new(browsing_instance, false, false);
    let app = origin("https://app.example.com");
    policy.record_origin_agent_cluster_decision(
        browsing_instance,
        app.clone(),
        OriginAgentClusterState::origin_keyed_process(),
    );

    // A later document of the origin without the header still sees the
    // pinned state.
    let state = policy.determine_origin_agent_cluster_isolation(
        &ctx,
        &app,
        OriginAgentClusterState::non_isolated(),
    );
    assert_eq!(state, OriginAgentClusterState::origin_keyed_process());

    // Recording again does not overwrite the pin.
    policy.record_origin_agent_cluster_decision(
        browsing_instance,
        app.clone(),
        OriginAgentClusterState::non_isolated(),
    );
    let state = policy.determine_origin_agent_cluster_isolation(
        &ctx,
        &app,
        OriginAgentClusterState::non_isolated(),
    );
    assert_eq!(state, OriginAgentClusterState::origin_keyed_process());

    // An origin keyed agent cluster matches only itself.
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &app, false),
        Some(app.clone())
    );
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("https://other.example.com"), false),
        None
    );
}

#[test]
fn test_origin_keyed_process_sites_key_on_the_full_origin() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let keyed_info = info("https://app.example.com/page").with_origin_keyed_process();
    let keyed = model
        .create_site_instance_for_url_info(&keyed_info, false)
        .expect("creation failed");
    assert_eq!(
        model.site_url_of(keyed).map(|url| url.as_str().to_owned()),
        Some("https://app.example.com/".to_owned())
    );

    // The decision is pinned for the origin, so a navigation without the
    // header lands in the same instance.
    let related = model
        .get_related_site_instance(keyed, &info("https://app.example.com/other"))
        .expect("lookup failed");
    assert_eq!(keyed, related);
}

#[test]
fn test_start_isolating_site_isolates_the_registrable_domain() {
    let mut model = Bulkhead::new(partial_isolation());
    model.start_isolating_site(
        &url("https://login.bank.example.com/form"),
        IsolatedOriginSource::UserTriggered,
    );

    let instance = model
        .create_site_instance_for_url_info(&info("https://other.example.com/"), false)
        .expect("creation failed");
    assert!(model.requires_dedicated_process(instance));
    assert_eq!(
        model.site_url_of(instance).map(|url| url.as_str().to_owned()),
        Some("https://example.com/".to_owned())
    );
}

#[test]
fn test_coop_isolation_is_scoped_to_the_browsing_instance() {
    let mut model = Bulkhead::new(partial_isolation());
    let coop_info = info("https://app.example.com/").with_coop_isolation();
    let coop = model
        .create_site_instance_for_url_info(&coop_info, false)
        .expect("creation failed");
    assert!(model.requires_dedicated_process(coop));
    assert_eq!(
        model.site_url_of(coop).map(|url| url.as_str().to_owned()),
        Some("https://example.com/".to_owned())
    );

    // The whole site is isolated within this browsing instance, so a
    // sibling subdomain maps onto the same instance.
    let related = model
        .get_related_site_instance(coop, &info("https://sub.example.com/x"))
        .expect("lookup failed");
    assert_eq!(coop, related);

    // Other browsing instances are not affected by the header.
    let fresh = model
        .create_site_instance_for_url_info(&info("https://sub.example.com/"), false)
        .expect("creation failed");
    assert!(!model.requires_dedicated_process(fresh));
}

#[test]
fn test_invalid_isolated_origins_are_ignored() {
    let mut policy = SecurityPolicy::new();
    let ids = IdGenerator::new();
    let browsing_instance = ids.next_browsing_instance_id();
    let ctx = IsolationContext::new(browsing_instance, false, false);
    policy.add_future_isolated_origins(
        vec![
            origin("http://intranet"),
            origin("http://localhost"),
            origin("http://127.0.0.1"),
            origin("data:text/html,hi"),
        ],
        IsolatedOriginSource::Test,
        browsing_instance,
    );

    // Single label hosts other than localhost cannot be isolated.
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("http://intranet"), false),
        None
    );
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("http://localhost"), false),
        Some(origin("http://localhost"))
    );
    assert_eq!(
        policy.matching_isolated_origin(&ctx, &origin("http://127.0.0.1"), false),
        Some(origin("http://127.0.0.1"))
    );
}
