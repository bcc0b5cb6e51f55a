/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Implementation of public domain matching.
//!
//! The list is a file located in the `resources` folder and loaded once on
//! first use. Private registries are kept in the table on purpose: two
//! subdomains of a shared hosting suffix must never be treated as same-site.
//!
//! The list file is a trimmed copy of the upstream public suffix list. File
//! format is described at <https://publicsuffix.org/list/>.

use std::sync::LazyLock;

use rustc_hash::FxHashSet;

static PUB_DOMAINS: LazyLock<PubDomainRules> =
    LazyLock::new(|| PubDomainRules::parse(include_str!("resources/public_domains.txt")));

#[derive(Clone, Debug, Default)]
pub struct PubDomainRules {
    rules: FxHashSet<String>,
    wildcards: FxHashSet<String>,
    exceptions: FxHashSet<String>,
}

impl PubDomainRules {
    pub fn parse(content: &str) -> PubDomainRules {
        let mut result = PubDomainRules::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if let Some(domain) = line.strip_prefix('!') {
                result.exceptions.insert(domain.to_owned());
            } else if let Some(domain) = line.strip_prefix("*.") {
                result.wildcards.insert(domain.to_owned());
            } else {
                result.rules.insert(line.to_owned());
            }
        }
        result
    }

    /// Byte offsets of the public suffix and the registrable suffix of
    /// `domain`. Walks the suffixes of `domain` from longest to shortest, so
    /// the most specific rule wins, as the list format requires.
    fn suffix_offsets(&self, domain: &str) -> (usize, usize) {
        let mut starts = vec![0];
        for (index, byte) in domain.bytes().enumerate() {
            if byte == b'.' {
                starts.push(index + 1);
            }
        }

        for (position, &start) in starts.iter().enumerate() {
            let suffix = &domain[start..];
            let longer_start = if position == 0 {
                start
            } else {
                starts[position - 1]
            };
            if self.exceptions.contains(suffix) {
                // An exception cancels a wildcard: the matched suffix is
                // itself registrable, under the next shorter suffix.
                let pub_start = starts.get(position + 1).copied().unwrap_or(start);
                return (pub_start, start);
            }
            if self.rules.contains(suffix) {
                return (start, longer_start);
            }
            if let Some((_, rest)) = suffix.split_once('.') {
                if self.wildcards.contains(rest) {
                    return (start, longer_start);
                }
            }
        }

        // No explicit rule matched; the last label is an implicit public
        // suffix.
        let last = starts.last().copied().unwrap_or(0);
        let second_last = if starts.len() >= 2 {
            starts[starts.len() - 2]
        } else {
            last
        };
        (last, second_last)
    }
}

/// The public suffix of a domain, for example `co.uk` for `bbc.co.uk`.
pub fn pub_suffix(domain: &str) -> &str {
    let domain = domain.trim_start_matches('.');
    let (pub_start, _) = PUB_DOMAINS.suffix_offsets(domain);
    &domain[pub_start..]
}

/// The registrable suffix of a domain: the public suffix plus one more
/// label, for example `bbc.co.uk` for `news.bbc.co.uk`. For a domain that is
/// itself a public suffix, the domain is returned unchanged.
pub fn reg_suffix(domain: &str) -> &str {
    let domain = domain.trim_start_matches('.');
    let (_, reg_start) = PUB_DOMAINS.suffix_offsets(domain);
    &domain[reg_start..]
}

pub fn is_pub_domain(domain: &str) -> bool {
    pub_suffix(domain) == domain.trim_start_matches('.')
}

pub fn is_reg_domain(domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    reg_suffix(domain) == domain && !is_pub_domain(domain)
}
