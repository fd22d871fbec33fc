use crate::constants::OUTPUT_INDENT;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

/// Visit counts keyed by url path, then by date.
///
/// Urls keep first-insertion order so that merging partitions in index order
/// reproduces the order in which paths first appear in the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregate {
    by_url: IndexMap<String, HashMap<String, u64>>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, url: &str, date: &str) {
        self.add(url, date, 1);
    }

    pub fn add(&mut self, url: &str, date: &str, count: u64) {
        if let Some(dates) = self.by_url.get_mut(url) {
            if let Some(c) = dates.get_mut(date) {
                *c += count;
            } else {
                dates.insert(date.to_owned(), count);
            }
            return;
        }
        let mut dates = HashMap::new();
        dates.insert(date.to_owned(), count);
        self.by_url.insert(url.to_owned(), dates);
    }

    /// Count for one pair; absent pairs count as 0.
    pub fn get(&self, url: &str, date: &str) -> u64 {
        self.by_url.get(url).and_then(|d| d.get(date)).copied().unwrap_or(0)
    }

    /// Adds every count of `other` into `self`. A pair present on both sides
    /// ends up with the sum, never with either side's value alone.
    pub fn merge(&mut self, other: Aggregate) {
        for (url, dates) in other.by_url {
            match self.by_url.entry(url) {
                Entry::Occupied(mut slot) => {
                    let mine = slot.get_mut();
                    for (date, count) in dates {
                        *mine.entry(date).or_insert(0) += count;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(dates);
                }
            }
        }
    }

    /// Folds partition aggregates in the order given.
    pub fn merge_all<I>(parts: I) -> Aggregate
    where
        I: IntoIterator<Item = Aggregate>,
    {
        parts.into_iter().fold(Aggregate::new(), |mut acc, part| {
            acc.merge(part);
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    pub fn url_count(&self) -> usize {
        self.by_url.len()
    }

    pub fn pair_count(&self) -> usize {
        self.by_url.values().map(HashMap::len).sum()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.by_url.values().flat_map(HashMap::values).sum()
    }

    pub fn into_sorted(self) -> SortedAggregate {
        SortedAggregate(
            self.by_url
                .into_iter()
                .map(|(url, dates)| (url, dates.into_iter().collect::<BTreeMap<_, _>>()))
                .collect(),
        )
    }
}

/// Final form of the counts: dates ascending within each url.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortedAggregate(IndexMap<String, BTreeMap<String, u64>>);

impl SortedAggregate {
    pub fn get(&self, url: &str) -> Option<&BTreeMap<String, u64>> {
        self.0.get(url)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    /// Pretty JSON with four-space indentation and a trailing newline.
    pub fn write_json<W: Write>(&self, mut w: W) -> io::Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(OUTPUT_INDENT);
        let mut ser = serde_json::Serializer::with_formatter(&mut w, formatter);
        self.serialize(&mut ser).map_err(io::Error::from)?;
        w.write_all(b"\n")
    }

    pub fn to_json_pretty(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;
        Ok(buf)
    }
}
