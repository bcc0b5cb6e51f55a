/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use bulkhead_url::BulkheadUrl;
use isolation::{Bulkhead, GroupEvent, IsolationConfig, ProcessAssignment, UrlInfo};

fn url(input: &str) -> BulkheadUrl {
    BulkheadUrl::parse(input).expect("invalid test URL")
}

fn info(input: &str) -> UrlInfo {
    UrlInfo::new(url(input))
}

#[test]
fn test_get_process_creates_and_locks_a_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let process = model.get_process(instance).expect("no process");

    let lock = model.process_lock(process).expect("no lock");
    assert!(lock.is_locked_to_site());
    assert_eq!(
        lock.lock_url().map(|url| url.as_str()),
        Some("https://example.com/")
    );
    assert!(model.process(process).expect("no record").is_used());
    assert_eq!(
        model.process_assignment_of(instance),
        Some(ProcessAssignment::CreatedNewProcess)
    );

    let group = model.group_of(instance).expect("no group");
    assert_eq!(model.process_of_group(group), Some(process));
    // Asking again keeps the binding.
    assert_eq!(model.get_process(instance), Ok(process));
    assert_eq!(model.process_count(), 1);
}

#[test]
fn test_unsited_instance_gets_an_unlocked_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model.create_site_instance();
    let process = model.get_process(instance).expect("no process");

    let lock = model.process_lock(process).expect("no lock");
    assert!(lock.allows_any_site());
    assert!(!lock.is_locked_to_site());
    // Nothing has committed yet, so the process may still be claimed.
    assert!(!model.process(process).expect("no record").is_used());

    // Assigning a site upgrades the lock in place.
    model
        .set_site(instance, &info("https://app.example.com/"))
        .expect("assignment failed");
    let lock = model.process_lock(process).expect("no lock");
    assert!(lock.is_locked_to_site());
    assert_eq!(
        lock.lock_url().map(|url| url.as_str()),
        Some("https://example.com/")
    );
    assert!(model.process(process).expect("no record").is_used());
    assert_eq!(model.get_process(instance), Ok(process));
}

#[test]
fn test_cross_site_instances_get_separate_processes() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    let second = model
        .get_related_site_instance(first, &info("https://other.net/"))
        .expect("lookup failed");

    let first_process = model.get_process(first).expect("no process");
    let second_process = model.get_process(second).expect("no process");
    assert_ne!(first_process, second_process);
    assert_ne!(model.group_of(first), model.group_of(second));
    assert_eq!(model.process_count(), 2);
}

#[test]
fn test_browsing_instances_do_not_share_processes_by_default() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let second = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    assert_ne!(first, second);

    let first_process = model.get_process(first).expect("no process");
    let second_process = model.get_process(second).expect("no process");
    assert_ne!(first_process, second_process);
    assert_eq!(model.process_count(), 2);
}

#[test]
fn test_process_per_site_consolidates_across_browsing_instances() {
    let mut config = IsolationConfig::strict();
    config.process_per_site = true;
    let mut model = Bulkhead::new(config);
    let first = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let second = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");

    let first_process = model.get_process(first).expect("no process");
    let second_process = model.get_process(second).expect("no process");
    assert_eq!(first_process, second_process);
    // One group per browsing instance, even over a shared process.
    assert_ne!(model.group_of(first), model.group_of(second));
    assert_eq!(
        model.process_assignment_of(second),
        Some(ProcessAssignment::ReusedExistingProcess)
    );
    assert_eq!(model.process_count(), 1);
}

#[test]
fn test_error_pages_share_their_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let first = model
        .create_site_instance_for_url_info(&info("chrome-error://chromewebdata/"), false)
        .expect("creation failed");
    let second = model
        .create_site_instance_for_url_info(&info("chrome-error://chromewebdata/"), false)
        .expect("creation failed");

    let first_process = model.get_process(first).expect("no process");
    let second_process = model.get_process(second).expect("no process");
    assert_eq!(first_process, second_process);
    assert_eq!(model.process_count(), 1);
}

#[test]
fn test_service_worker_reuses_the_site_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let tab = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let tab_process = model.get_process(tab).expect("no process");

    let script = info("https://app.example.com/sw.js");
    let worker = model
        .create_site_instance_for_service_worker(&script, true, false)
        .expect("creation failed");
    assert!(model.is_for_service_worker(worker));
    assert_ne!(
        model.browsing_instance_of(tab),
        model.browsing_instance_of(worker)
    );

    let worker_process = model.get_process(worker).expect("no process");
    assert_eq!(tab_process, worker_process);
    assert_eq!(
        model.process_assignment_of(worker),
        Some(ProcessAssignment::ReusedExistingProcess)
    );
}

#[test]
fn test_service_worker_without_reuse_gets_a_fresh_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let tab = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let tab_process = model.get_process(tab).expect("no process");

    let worker = model
        .create_site_instance_for_service_worker(
            &info("https://app.example.com/sw.js"),
            false,
            false,
        )
        .expect("creation failed");
    let worker_process = model.get_process(worker).expect("no process");
    assert_ne!(tab_process, worker_process);
}

#[test]
fn test_process_limit_prefers_reuse_over_spawning() {
    let mut config = IsolationConfig::strict();
    config.site_per_process = false;
    config.process_limit = Some(1);
    let mut model = Bulkhead::new(config);
    let first = model
        .create_site_instance_for_url_info(&info("http://a.org/"), false)
        .expect("creation failed");
    let first_process = model.get_process(first).expect("no process");

    let second = model
        .create_site_instance_for_url_info(&info("http://b.net/"), false)
        .expect("creation failed");
    let second_process = model.get_process(second).expect("no process");
    assert_eq!(first_process, second_process);
    assert_ne!(model.group_of(first), model.group_of(second));
    assert_eq!(
        model.process_assignment_of(second),
        Some(ProcessAssignment::ReusedExistingProcess)
    );
    assert_eq!(model.process_count(), 1);
}

#[test]
fn test_process_limit_never_mixes_dedicated_sites() {
    let mut config = IsolationConfig::strict();
    config.process_limit = Some(1);
    let mut model = Bulkhead::new(config);
    let first = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    let first_process = model.get_process(first).expect("no process");

    // Under full isolation every site needs its own lock, so the limit
    // cannot force sharing.
    let second = model
        .create_site_instance_for_url_info(&info("https://other.net/"), false)
        .expect("creation failed");
    let second_process = model.get_process(second).expect("no process");
    assert_ne!(first_process, second_process);
    assert_eq!(model.process_count(), 2);
}

#[test]
fn test_share_default_process_groups_unisolated_sites() {
    let mut config = IsolationConfig::strict();
    config.site_per_process = false;
    config.share_default_process = true;
    let mut model = Bulkhead::new(config);
    let first = model
        .create_site_instance_for_url_info(&info("http://a.org/"), false)
        .expect("creation failed");
    let second = model
        .get_related_site_instance(first, &info("http://b.net/"))
        .expect("lookup failed");
    assert_ne!(first, second);

    let first_process = model.get_process(first).expect("no process");
    let second_process = model.get_process(second).expect("no process");
    assert_eq!(first_process, second_process);
    // Distinct site instances, one group.
    assert_eq!(model.group_of(first), model.group_of(second));
    assert_eq!(model.group_count(), 1);
}

#[test]
fn test_reuse_current_process_if_possible() {
    let mut config = IsolationConfig::strict();
    config.site_per_process = false;
    let mut model = Bulkhead::new(config);
    let opener = model
        .create_site_instance_for_url_info(&info("http://a.org/"), false)
        .expect("creation failed");
    let process = model.get_process(opener).expect("no process");

    let popup = model
        .get_related_site_instance(opener, &info("http://b.net/"))
        .expect("lookup failed");
    model
        .reuse_current_process_if_possible(popup, process)
        .expect("reuse failed");
    assert_eq!(model.group_of(popup), model.group_of(opener));
    assert_eq!(model.get_process(popup), Ok(process));
}

#[test]
fn test_reuse_current_process_declines_an_unsuitable_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let opener = model
        .create_site_instance_for_url_info(&info("https://a.example.com/"), false)
        .expect("creation failed");
    let process = model.get_process(opener).expect("no process");

    let popup = model
        .get_related_site_instance(opener, &info("https://other.net/"))
        .expect("lookup failed");
    // The process is locked to a.example.com, so the request is ignored.
    model
        .reuse_current_process_if_possible(popup, process)
        .expect("reuse failed");
    assert_eq!(model.group_of(popup), None);
    let popup_process = model.get_process(popup).expect("no process");
    assert_ne!(popup_process, process);
}

#[test]
fn test_active_frame_count_reports_reaching_zero() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    model.get_process(instance).expect("no process");
    let group = model.group_of(instance).expect("no group");

    model.increment_active_frame_count(group).expect("increment failed");
    model.increment_active_frame_count(group).expect("increment failed");
    assert_eq!(model.active_frame_count(group), Some(2));

    model.decrement_active_frame_count(group).expect("decrement failed");
    assert_eq!(model.take_events(), vec![]);

    model.decrement_active_frame_count(group).expect("decrement failed");
    assert_eq!(
        model.take_events(),
        vec![GroupEvent::ActiveFrameCountIsZero(group)]
    );
    // Events are drained on read.
    assert_eq!(model.take_events(), vec![]);
}

#[test]
fn test_process_exit_notifies_every_bound_group() {
    let mut config = IsolationConfig::strict();
    config.process_per_site = true;
    let mut model = Bulkhead::new(config);
    let first = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let second = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let process = model.get_process(first).expect("no process");
    assert_eq!(model.get_process(second), Ok(process));
    let first_group = model.group_of(first).expect("no group");
    let second_group = model.group_of(second).expect("no group");

    model.process_exited(process).expect("exit failed");
    assert_eq!(
        model.take_events(),
        vec![
            GroupEvent::RenderProcessGone(first_group, process),
            GroupEvent::RenderProcessGone(second_group, process),
        ]
    );
    assert!(!model.process(process).expect("no record").is_live());
    // The binding survives until the embedder destroys the process.
    assert_eq!(model.group_of(first), Some(first_group));
}

#[test]
fn test_destroy_process_unbinds_its_groups() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let process = model.get_process(instance).expect("no process");
    model.destroy_process(process).expect("destroy failed");

    assert_eq!(model.group_of(instance), None);
    assert_eq!(model.process_count(), 0);
    assert!(model.process(process).is_none());
    assert_eq!(
        model.process_assignment_of(instance),
        Some(ProcessAssignment::Unknown)
    );

    // The surviving instance gets a fresh process on demand.
    let replacement = model.get_process(instance).expect("no process");
    assert_ne!(replacement, process);
    assert_eq!(
        model.process_assignment_of(instance),
        Some(ProcessAssignment::CreatedNewProcess)
    );
}

#[test]
fn test_release_tears_down_instance_and_group_but_not_process() {
    let mut model = Bulkhead::new(IsolationConfig::strict());
    let instance = model
        .create_site_instance_for_url_info(&info("https://app.example.com/"), false)
        .expect("creation failed");
    let process = model.get_process(instance).expect("no process");

    model.retain_site_instance(instance).expect("retain failed");
    model.release_site_instance(instance).expect("release failed");
    assert_eq!(model.site_instance_count(), 1);

    model.release_site_instance(instance).expect("release failed");
    assert_eq!(model.site_instance_count(), 0);
    assert_eq!(model.group_count(), 0);
    assert_eq!(model.browsing_instance_count(), 0);
    // Process records outlive the instances; the lock stays until the
    // embedder destroys the process.
    assert_eq!(model.process_count(), 1);
    assert!(model.process_lock(process).expect("no lock").is_locked_to_site());
}
