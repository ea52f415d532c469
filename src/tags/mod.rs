// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Version tag derivation
//!
//! Every place in a run that needs an image tag or a recorded version goes
//! through [`TagResolver`]. Resolution is a pure function of the
//! [`TriggerContext`] and the resolver's settings, so the containerize, scan,
//! publish and record stages always agree on the primary tag.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TagSettings;
use crate::trigger::{EventKind, TriggerContext};

/// Maximum length of a container image tag
const MAX_TAG_LEN: usize = 128;

/// Rule that produced a tag
///
/// Variant order is the declared ordering of a tag set; the first present
/// scheme is the primary tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TagScheme {
    ShortCommitHash,
    BranchRef,
    ProposedChangeRef,
    FixedLabel,
}

impl TagScheme {
    pub const ALL: [TagScheme; 4] = [
        TagScheme::ShortCommitHash,
        TagScheme::BranchRef,
        TagScheme::ProposedChangeRef,
        TagScheme::FixedLabel,
    ];
}

impl fmt::Display for TagScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortCommitHash => write!(f, "sha"),
            Self::BranchRef => write!(f, "branch"),
            Self::ProposedChangeRef => write!(f, "change"),
            Self::FixedLabel => write!(f, "label"),
        }
    }
}

/// A single derived tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub value: String,
    pub scheme: TagScheme,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Ordered set of tags derived for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    /// The single canonical identifier (the short commit hash when present)
    pub fn primary(&self) -> Option<&Tag> {
        self.tags.first()
    }

    pub fn get(&self, scheme: TagScheme) -> Option<&Tag> {
        self.tags.iter().find(|t| t.scheme == scheme)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn values(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.value.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Fully-qualified image references, one per tag
    pub fn image_refs(&self, image: &str) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| format!("{}:{}", image, t.value))
            .collect()
    }
}

/// Derives tags from a trigger context
#[derive(Debug, Clone)]
pub struct TagResolver {
    rules: Vec<TagScheme>,
    short_length: usize,
    fixed_label: String,
}

impl TagResolver {
    /// Resolver applying every rule
    pub fn new(settings: &TagSettings) -> Self {
        Self::with_rules(settings, &TagScheme::ALL)
    }

    /// Resolver restricted to a subset of rules
    ///
    /// Values are computed by the same functions as the full resolver, so a
    /// restricted resolver always agrees with it on the tags both produce.
    pub fn with_rules(settings: &TagSettings, rules: &[TagScheme]) -> Self {
        let mut rules = rules.to_vec();
        rules.sort();
        rules.dedup();
        Self {
            rules,
            short_length: settings.short_length.max(1),
            fixed_label: settings.fixed_label.clone(),
        }
    }

    /// Resolve the tag set for a context
    pub fn resolve(&self, ctx: &TriggerContext) -> TagSet {
        let tags = self
            .rules
            .iter()
            .filter_map(|scheme| self.apply(*scheme, ctx))
            .collect();
        TagSet { tags }
    }

    /// Resolve only the primary tag value
    pub fn primary(&self, ctx: &TriggerContext) -> Option<String> {
        self.resolve(ctx).primary().map(|t| t.value.clone())
    }

    fn apply(&self, scheme: TagScheme, ctx: &TriggerContext) -> Option<Tag> {
        let value = match scheme {
            TagScheme::ShortCommitHash => Some(short_commit(ctx.commit_id(), self.short_length)),
            TagScheme::BranchRef => match ctx.event_kind() {
                EventKind::DirectPush => Some(sanitize(ctx.branch_name())),
                EventKind::ProposedChange => None,
            },
            TagScheme::ProposedChangeRef => match ctx.event_kind() {
                EventKind::ProposedChange => ctx
                    .proposed_change_id()
                    .map(|id| sanitize(&format!("pr-{}", id))),
                EventKind::DirectPush => None,
            },
            TagScheme::FixedLabel => Some(sanitize(&self.fixed_label)),
        }?;

        if value.is_empty() {
            return None;
        }

        Some(Tag { value, scheme })
    }
}

/// Fixed-length prefix of a commit id, lowercased
pub fn short_commit(commit_id: &str, length: usize) -> String {
    commit_id
        .chars()
        .take(length)
        .collect::<String>()
        .to_lowercase()
}

/// Map an arbitrary ref name onto the container tag alphabet
fn sanitize(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    // Tags may not start with '.' or '-'
    mapped
        .trim_start_matches(['.', '-'])
        .chars()
        .take(MAX_TAG_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TagSettings {
        TagSettings::default()
    }

    #[test]
    fn test_push_tags_in_declared_order() {
        let ctx = TriggerContext::direct_push("main", "9F8E7D6C5B4A3210").unwrap();
        let tags = TagResolver::new(&settings()).resolve(&ctx);

        assert_eq!(tags.values(), vec!["9f8e7d6", "main", "latest"]);
        assert_eq!(tags.primary().unwrap().scheme, TagScheme::ShortCommitHash);
        assert!(tags.get(TagScheme::ProposedChangeRef).is_none());
    }

    #[test]
    fn test_proposed_change_tags() {
        let ctx = TriggerContext::proposed_change("42", "main", "abc1234").unwrap();
        let tags = TagResolver::new(&settings()).resolve(&ctx);

        assert_eq!(tags.values(), vec!["abc1234", "pr-42", "latest"]);
        assert!(tags.get(TagScheme::BranchRef).is_none());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = TagResolver::new(&settings());
        let ctx = TriggerContext::direct_push("feature/x", "deadbeefcafe").unwrap();
        let first = resolver.resolve(&ctx);
        for _ in 0..10 {
            assert_eq!(resolver.resolve(&ctx), first);
        }
        assert_eq!(TagResolver::new(&settings()).resolve(&ctx.clone()), first);
    }

    #[test]
    fn test_restricted_rules_agree_on_primary() {
        let ctx = TriggerContext::direct_push("main", "0123456789abcdef").unwrap();
        let full = TagResolver::new(&settings()).resolve(&ctx);
        let only_sha =
            TagResolver::with_rules(&settings(), &[TagScheme::ShortCommitHash]).resolve(&ctx);

        assert_eq!(only_sha.len(), 1);
        assert_eq!(only_sha.primary(), full.primary());
    }

    #[test]
    fn test_rule_order_does_not_matter() {
        let ctx = TriggerContext::direct_push("main", "0123456789").unwrap();
        let a = TagResolver::with_rules(
            &settings(),
            &[TagScheme::FixedLabel, TagScheme::ShortCommitHash],
        )
        .resolve(&ctx);
        let b = TagResolver::with_rules(
            &settings(),
            &[TagScheme::ShortCommitHash, TagScheme::FixedLabel],
        )
        .resolve(&ctx);
        assert_eq!(a, b);
    }

    #[test]
    fn test_branch_names_are_sanitized() {
        let ctx = TriggerContext::direct_push("feature/Add Thing", "abcdef0123").unwrap();
        let tags = TagResolver::new(&settings()).resolve(&ctx);
        assert_eq!(tags.get(TagScheme::BranchRef).unwrap().value, "feature-Add-Thing");
    }

    #[test]
    fn test_short_commit_shorter_than_length() {
        assert_eq!(short_commit("abc", 7), "abc");
        assert_eq!(short_commit("ABCDEF0123", 7), "abcdef0");
    }

    #[test]
    fn test_image_refs() {
        let ctx = TriggerContext::direct_push("main", "abcdef0123").unwrap();
        let tags = TagResolver::new(&settings()).resolve(&ctx);
        assert_eq!(
            tags.image_refs("ghcr.io/acme/app"),
            vec![
                "ghcr.io/acme/app:abcdef0",
                "ghcr.io/acme/app:main",
                "ghcr.io/acme/app:latest"
            ]
        );
    }
}
