//! Keyed dedup-and-merge primitives shared by both reports.

use crate::evidence::{EvidenceRecord, HostSets, LinkSets, StorageMap};
use std::collections::{BTreeMap, BTreeSet};

/// Records in merge order: the primary target first, the rest by target.
///
/// Every first-wins merge folds records in this order, so the reports do not
/// depend on the order in which workers delivered them.
pub fn merge_order<'a>(records: &'a [EvidenceRecord], primary: &str) -> Vec<&'a EvidenceRecord> {
    let mut ordered: Vec<&EvidenceRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        (a.target != primary, &a.target).cmp(&(b.target != primary, &b.target))
    });
    ordered
}

/// Append every item of `from` whose key is not in `into` yet.
///
/// The first occurrence of a key wins; later ones are discarded whole.
pub fn merge_by_key<T, K, F>(into: &mut Vec<T>, from: impl IntoIterator<Item = T>, key: F)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut seen: BTreeSet<K> = into.iter().map(&key).collect();
    for item in from {
        if seen.insert(key(&item)) {
            into.push(item);
        }
    }
}

/// Like [`merge_by_key`], but a repeated key is folded into the existing
/// entry with `combine` instead of being dropped.
pub fn merge_or_combine<T, K, F, C>(
    into: &mut Vec<T>,
    from: impl IntoIterator<Item = T>,
    key: F,
    combine: C,
) where
    K: Ord,
    F: Fn(&T) -> K,
    C: Fn(&mut T, T),
{
    let mut index: BTreeMap<K, usize> = into
        .iter()
        .enumerate()
        .map(|(i, item)| (key(item), i))
        .collect();

    for item in from {
        let k = key(&item);
        match index.get(&k) {
            Some(&i) => combine(&mut into[i], item),
            None => {
                index.insert(k, into.len());
                into.push(item);
            }
        }
    }
}

/// Collapse duplicate keys already present in `items`, keeping the first.
pub fn dedup_by_key<T, K, F>(items: &mut Vec<T>, key: F)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let all = std::mem::take(items);
    merge_by_key(items, all, key);
}

/// Merge storage entries; first value wins per `(origin, key)`.
pub fn merge_storage(into: &mut StorageMap, from: StorageMap) {
    for (origin, entries) in from {
        let slot = into.entry(origin).or_default();
        for (key, value) in entries {
            slot.entry(key).or_insert(value);
        }
    }
}

/// Merge link sets by href within each category already present in `into`.
pub fn merge_link_sets(into: &mut LinkSets, mut from: LinkSets) {
    for (category, links) in into.iter_mut() {
        if let Some(more) = from.remove(category) {
            merge_by_key(links, more, |l| l.identity());
        }
    }
}

/// Merge host strings within each `(category, party)` already present in `into`.
pub fn merge_host_sets(into: &mut HostSets, mut from: HostSets) {
    for (category, parties) in into.iter_mut() {
        let Some(mut other) = from.remove(category) else {
            continue;
        };
        for (party, hosts) in parties.iter_mut() {
            if let Some(more) = other.remove(party) {
                merge_by_key(hosts, more, |h| h.clone());
            }
        }
    }
}
