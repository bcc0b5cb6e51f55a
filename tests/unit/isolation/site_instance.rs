/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use bulkhead_url::BulkheadUrl;
use isolation::{
    Bulkhead, IsolatedOriginSource, IsolationConfig, IsolationError, SandboxGrouping,
    StoragePartitionConfig, UrlInfo, WebExposedIsolationInfo, default_site_url,
};

fn url(input: &str) -> BulkheadUrl {
    BulkheadUrl::parse(input).expect("invalid test URL")
}

fn info(input: &str) -> UrlInfo {
    UrlInfo::new(url(input))
}

#[test]
fn test_same_site_navigations_share_a_site_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://mail.example.com/inbox"), false)
        .expect("creation failed");
    let second = model
        .get_related_site_instance(first, &info("https://docs.example.com/doc"))
        .expect("lookup failed");
    assert_eq!(first, second);
    assert_eq!(
        model.site_url_of(first).map(|url| url.as_str().to_owned()),
        Some("https://example.com/".to_owned())
    );
    assert_eq!(model.site_instance_count(), 1);
}

#[test]
fn test_cross_site_navigations_get_their_own_site_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://mail.example.com/"), false)
        .expect("creation failed");
    let second = model
        .get_related_site_instance(first, &info("https://other.net/page"))
        .expect("lookup failed");
    assert_ne!(first, second);
    // Related instances stay in the same browsing instance.
    assert_eq!(
        model.browsing_instance_of(first),
        model.browsing_instance_of(second)
    );
    assert_eq!(model.site_instance_count(), 2);
    assert_eq!(model.browsing_instance_count(), 1);
}

#[test]
fn test_relatedness_follows_the_browsing_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    let sibling = model
        .get_related_site_instance(first, &info("https://other.net/"))
        .expect("lookup failed");
    let foreign = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    assert!(model.is_related(first, sibling));
    assert!(model.is_related(first, first));
    assert!(!model.is_related(first, foreign));
    assert!(!model.is_related(sibling, foreign));
}

#[test]
fn test_a_site_can_be_assigned_only_once() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    assert!(!model.has_site(instance));
    model
        .set_site(instance, &info("https://a.example.com/"))
        .expect("first assignment failed");
    assert!(model.has_site(instance));

    let error = model
        .set_site(instance, &info("https://b.example.com/"))
        .expect_err("second assignment succeeded");
    assert_eq!(error, IsolationError::SiteAlreadySet(instance));
    assert!(error.is_fatal());
}

#[test]
fn test_a_precomputed_principal_can_be_assigned_directly() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    let browsing_instance = model
        .browsing_instance_of(instance)
        .expect("missing browsing instance");
    let site_info = model
        .derive_site_info(browsing_instance, &info("https://a.example.com/"), false)
        .expect("derivation failed");
    model
        .set_site_info(instance, site_info.clone())
        .expect("assignment failed");
    assert!(model.has_site(instance));
    assert_eq!(
        model.site_url_of(instance).map(|url| url.as_str().to_owned()),
        Some("https://example.com/".to_owned())
    );

    let error = model
        .set_site_info(instance, site_info)
        .expect_err("second assignment succeeded");
    assert_eq!(error, IsolationError::SiteAlreadySet(instance));
}

#[test]
fn test_first_registered_instance_for_a_site_wins() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let late = model.create_site_instance();
    let early = model
        .get_related_site_instance(late, &info("https://a.example.com/"))
        .expect("lookup failed");
    assert_ne!(late, early);

    // `late` now claims the same site, but `early` registered it first.
    model
        .set_site(late, &info("https://b.example.com/"))
        .expect("assignment failed");
    let found = model
        .get_related_site_instance(late, &info("https://c.example.com/"))
        .expect("lookup failed");
    assert_eq!(found, early);
}

#[test]
fn test_default_site_instance_absorbs_unisolated_sites() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let instance = model
        .create_site_instance_for_url_info(&info("http://a.example.com/"), false)
        .expect("creation failed");
    assert!(model.is_default_site_instance(instance));
    assert_eq!(model.site_url_of(instance), Some(default_site_url()));

    let other = model
        .get_related_site_instance(instance, &info("http://other.org/"))
        .expect("lookup failed");
    assert_eq!(instance, other);
    assert_eq!(model.site_instance_count(), 1);
    assert!(model.default_site_instance_covers(instance, &url("http://example.com/")));
    assert!(model.default_site_instance_covers(instance, &url("http://other.org/")));
    assert!(!model.default_site_instance_covers(instance, &url("http://unrelated.net/")));
}

#[test]
fn test_file_urls_never_join_the_default_site_instance() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let instance = model
        .create_site_instance_for_url_info(&info("file:///tmp/page.html"), false)
        .expect("creation failed");
    assert!(!model.is_default_site_instance(instance));
    assert_eq!(
        model.site_url_of(instance).map(|url| url.as_str().to_owned()),
        Some("file:///".to_owned())
    );
}

#[test]
fn test_isolated_site_keeps_its_own_instance_in_sharing_mode() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    model.add_future_isolated_origins(
        vec![url("https://secure.example.com").origin()],
        IsolatedOriginSource::Test,
    );
    let isolated = model
        .create_site_instance_for_url_info(&info("https://secure.example.com/login"), false)
        .expect("creation failed");
    assert!(!model.is_default_site_instance(isolated));
    assert!(model.requires_dedicated_process(isolated));

    let shared = model
        .get_related_site_instance(isolated, &info("http://plain.org/"))
        .expect("lookup failed");
    assert_ne!(isolated, shared);
    assert!(model.is_default_site_instance(shared));
}

#[test]
fn test_convert_to_default_or_set_site() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let instance = model.create_site_instance();
    model
        .convert_to_default_or_set_site(instance, &info("http://plain.example.com/"))
        .expect("conversion failed");
    assert!(model.is_default_site_instance(instance));

    // Without a default-instance policy the same call assigns the site.
    let mut strict = Bulkhead::new(IsolationConfig::strict());
    let instance = strict.create_site_instance();
    strict
        .convert_to_default_or_set_site(instance, &info("http://plain.example.com/"))
        .expect("assignment failed");
    assert!(!strict.is_default_site_instance(instance));
    assert_eq!(
        strict.site_url_of(instance).map(|url| url.as_str().to_owned()),
        Some("http://example.com/".to_owned())
    );
}

#[test]
fn test_isolation_state_must_match_the_browsing_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    let isolated_info = info("https://app.example.com/").with_web_exposed_isolation(
        WebExposedIsolationInfo::Isolated(url("https://app.example.com").origin()),
    );
    let error = model
        .set_site(instance, &isolated_info)
        .expect_err("mismatched isolation state was accepted");
    assert!(matches!(error, IsolationError::IsolationStateMismatch(_)));
    assert!(error.is_fatal());

    // A browsing instance created for the isolated navigation accepts it.
    let isolated = model
        .create_site_instance_for_url_info(&isolated_info, false)
        .expect("creation failed");
    assert!(
        model
            .site_info_of(isolated)
            .expect("no site info")
            .web_exposed_isolation_info()
            .is_isolated()
    );

    // Navigations that do not state their isolation inherit it.
    let related = model
        .get_related_site_instance(isolated, &info("https://app.example.com/other"))
        .expect("lookup failed");
    assert_eq!(isolated, related);
}

#[test]
fn test_storage_partition_is_pinned_by_the_first_query() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    let partition = model
        .storage_partition_config(instance)
        .expect("partition query failed");
    assert!(partition.is_default());

    let partitioned = info("https://widget.example.com/")
        .with_storage_partition(StoragePartitionConfig::new("ext", "widgets", false));
    let error = model
        .set_site(instance, &partitioned)
        .expect_err("partition change was accepted");
    assert!(matches!(error, IsolationError::StoragePartitionMismatch { .. }));
    assert!(error.is_fatal());
}

#[test]
fn test_is_same_site_matches_the_registrable_domain() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("https://mail.example.com/"), false)
        .expect("creation failed");
    assert!(model.is_same_site(instance, &info("https://docs.example.com/d")));
    assert!(model.is_same_site(instance, &info("https://example.com/")));
    assert!(model.is_same_site(instance, &info("about:blank")));
    assert!(!model.is_same_site(instance, &info("http://example.com/")));
    assert!(!model.is_same_site(instance, &info("https://example.com.evil.net/")));
    assert!(!model.is_same_site(instance, &info("https://other.org/")));
}

#[test]
fn test_sandbox_state_splits_the_site() {
    let mut config = IsolationConfig::strict();
    config.isolate_sandboxed_iframes = true;
    let mut model = Bulkhead::new(config);
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    assert!(!model.is_same_site(instance, &info("https://app.example.com/").with_sandbox(None)));
    assert!(!model.is_suitable_for_url_info(
        instance,
        &info("https://app.example.com/").with_sandbox(None)
    ));
}

#[test]
fn test_is_same_site_for_the_default_instance() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let instance = model
        .create_site_instance_for_url_info(&info("http://a.org/"), false)
        .expect("creation failed");
    assert!(model.is_default_site_instance(instance));
    assert!(model.is_same_site(instance, &info("http://b.org/x")));
    assert!(model.is_same_site(instance, &info("about:blank")));
    // File URLs cannot be absorbed, so they are never same-site with it.
    assert!(!model.is_same_site(instance, &info("file:///tmp/x.html")));
}

#[test]
fn test_suitability_for_unsited_and_sited_instances() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let unsited = model.create_site_instance();
    assert!(model.is_suitable_for_url_info(unsited, &info("https://anything.example.com/")));

    let sited = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    assert!(model.is_suitable_for_url_info(sited, &info("https://b.example.com/x")));
    assert!(!model.is_suitable_for_url_info(sited, &info("https://other.net/")));
    // Renderer debug URLs run wherever the frame already is.
    assert!(model.is_suitable_for_url_info(sited, &info("javascript:void(0)")));
    assert!(model.is_suitable_for_url_info(sited, &info("about:blank")));
}

#[test]
fn test_default_instance_is_not_suitable_for_isolated_urls() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let instance = model
        .create_site_instance_for_url_info(&info("http://a.org/"), false)
        .expect("creation failed");
    assert!(model.is_suitable_for_url_info(instance, &info("http://b.org/")));
    assert!(!model.is_suitable_for_url_info(instance, &info("file:///tmp/x.html")));
}

#[test]
fn test_error_pages_use_the_error_site() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("chrome-error://chromewebdata/"), false)
        .expect("creation failed");
    let site_info = model.site_info_of(instance).expect("no site info");
    assert!(site_info.is_error_page());
    assert!(model.requires_dedicated_process(instance));
    // Reloading an error page must produce the error page again, so even
    // about:blank does not fit into its instance.
    assert!(!model.is_suitable_for_url_info(instance, &info("about:blank")));
}

#[test]
fn test_compatible_sandboxed_site_instance() {
    let mut config = IsolationConfig::strict();
    config.isolate_sandboxed_iframes = true;
    let mut model = Bulkhead::new(config);
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let sandboxed = model
        .get_compatible_sandboxed_site_instance(instance, Some(7))
        .expect("no sandboxed instance");
    assert_ne!(instance, sandboxed);
    assert_eq!(
        model.browsing_instance_of(instance),
        model.browsing_instance_of(sandboxed)
    );
    let site_info = model.site_info_of(sandboxed).expect("no site info");
    assert!(site_info.is_sandboxed());
    // Grouped per site, so the sandbox id is not part of the key.
    assert_eq!(site_info.unique_sandbox_id(), None);

    let again = model
        .get_compatible_sandboxed_site_instance(instance, Some(8))
        .expect("no sandboxed instance");
    assert_eq!(sandboxed, again);
}

#[test]
fn test_per_document_sandboxing_keys_on_the_sandbox_id() {
    let mut config = IsolationConfig::strict();
    config.isolate_sandboxed_iframes = true;
    config.sandbox_grouping = SandboxGrouping::PerDocument;
    let mut model = Bulkhead::new(config);
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let first = model
        .get_compatible_sandboxed_site_instance(instance, Some(7))
        .expect("no sandboxed instance");
    let second = model
        .get_compatible_sandboxed_site_instance(instance, Some(8))
        .expect("no sandboxed instance");
    assert_ne!(first, second);
    assert_eq!(
        model.site_info_of(first).expect("no site info").unique_sandbox_id(),
        Some(7)
    );
}

#[test]
fn test_sandboxed_instance_requires_a_site() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    let error = model
        .get_compatible_sandboxed_site_instance(instance, None)
        .expect_err("sandboxed clone of an unsited instance");
    assert_eq!(error, IsolationError::SiteNotSet(instance));
    assert!(!error.is_fatal());
}

#[test]
fn test_fenced_frames_get_a_separate_browsing_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let embedder = model
        .create_site_instance_for_url_info(&info("https://host.example.com/"), false)
        .expect("creation failed");
    let fenced = model
        .create_site_instance_for_fenced_frame(embedder)
        .expect("creation failed");
    assert_ne!(embedder, fenced);
    assert_ne!(
        model.browsing_instance_of(embedder),
        model.browsing_instance_of(fenced)
    );
    let site_info = model.site_info_of(fenced).expect("no site info");
    assert!(site_info.is_fenced());
    assert_eq!(
        site_info.site_url().map(|url| url.as_str()),
        Some("https://example.com/")
    );
}

#[test]
fn test_guest_state_is_part_of_the_descriptor() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let guest = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), true)
        .expect("creation failed");
    assert!(model.site_info_of(guest).expect("no site info").is_guest());

    let plain = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    assert!(!model.site_info_of(plain).expect("no site info").is_guest());
}

#[test]
fn test_release_drops_instances_and_their_browsing_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    // A same-site lookup hands out a second reference to the same instance.
    let second = model
        .get_related_site_instance(first, &info("https://a.example.com/x"))
        .expect("lookup failed");
    assert_eq!(first, second);

    model.release_site_instance(first).expect("release failed");
    assert_eq!(model.site_instance_count(), 1);
    model.release_site_instance(first).expect("release failed");
    assert_eq!(model.site_instance_count(), 0);
    assert_eq!(model.browsing_instance_count(), 0);
}

#[test]
fn test_related_active_contents_are_counted_per_browsing_instance() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    let second = model
        .get_related_site_instance(first, &info("https://other.net/"))
        .expect("lookup failed");
    assert_eq!(model.related_active_contents_count(first), Some(0));

    model.increment_related_active_contents(first).expect("increment failed");
    model.increment_related_active_contents(second).expect("increment failed");
    // Both instances share the browsing instance, so they see one count.
    assert_eq!(model.related_active_contents_count(first), Some(2));
    assert_eq!(model.related_active_contents_count(second), Some(2));

    model.decrement_related_active_contents(first).expect("decrement failed");
    assert_eq!(model.related_active_contents_count(second), Some(1));
}

#[test]
fn test_derive_site_info_honours_the_default_instance() {
    let mut model = Bulkhead::new(IsolationConfig::sharing());
    let browsing_instance =
        model.create_browsing_instance(WebExposedIsolationInfo::default(), false);
    let related = model
        .derive_site_info(browsing_instance, &info("http://plain.org/"), true)
        .expect("derivation failed");
    assert!(related.is_default());
    let unrelated = model
        .derive_site_info(browsing_instance, &info("http://plain.org/"), false)
        .expect("derivation failed");
    assert!(!unrelated.is_default());
    assert_eq!(
        unrelated.site_url().map(|url| url.as_str()),
        Some("http://plain.org/")
    );
}
