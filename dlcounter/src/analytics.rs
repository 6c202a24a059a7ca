use std::collections::BTreeMap;

use crate::{
    invariants::{FileId, Timestamp},
    models::DownloadEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    pub count: u64,
    pub latest: Timestamp,
}

/// Per-file deltas plus the watermark they advance the store to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increments {
    pub deltas: BTreeMap<FileId, Increment>,
    pub watermark: Option<Timestamp>,
}

impl Increments {
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.deltas.values().map(|i| i.count).sum()
    }
}

/// Admitted download events of one run, grouped by file.
///
/// Event times are kept so the deltas can be recomputed against a newer
/// watermark if another run commits first.
#[derive(Debug, Default)]
pub struct Tally {
    events: BTreeMap<FileId, Vec<Timestamp>>,
}

impl Tally {
    pub fn record(&mut self, event: DownloadEvent) {
        self.events
            .entry(event.file)
            .or_default()
            .push(event.timestamp);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn counts(&self) -> BTreeMap<FileId, u64> {
        self.events
            .iter()
            .map(|(file, times)| (file.clone(), times.len() as u64))
            .collect()
    }

    /// Deltas for events strictly newer than `watermark`.
    pub fn increments_after(&self, watermark: Option<Timestamp>) -> Increments {
        let mut out = Increments {
            watermark,
            ..Increments::default()
        };
        for (file, times) in &self.events {
            let mut newer = times.iter().copied().filter(|t| Some(*t) > watermark);
            let Some(first) = newer.next() else {
                continue;
            };
            let increment = newer.fold(
                Increment {
                    count: 1,
                    latest: first,
                },
                |acc, t| Increment {
                    count: acc.count + 1,
                    latest: acc.latest.max(t),
                },
            );
            out.watermark = out.watermark.max(Some(increment.latest));
            out.deltas.insert(file.clone(), increment);
        }
        out
    }
}
