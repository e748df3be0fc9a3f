//! Manifest reconstruction
//!
//! Rebuilds, per producer, the ordered event history and the captured
//! output streams from raw manifest text.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::event::{split_header, Channel, ManifestEvent, StateTag};

/// One state-channel event of a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateRecord {
    pub timestamp: NaiveDateTime,
    /// Trimmed state content; may be an unrecognised tag
    pub state: String,
}

impl StateRecord {
    /// The recognised lifecycle tag, if any
    pub fn tag(&self) -> Option<StateTag> {
        self.state.parse().ok()
    }
}

/// Everything one producer wrote, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProducerLog {
    events: Vec<ManifestEvent>,
}

impl ProducerLog {
    pub fn events(&self) -> &[ManifestEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ordered state history
    pub fn states(&self) -> Vec<StateRecord> {
        self.events
            .iter()
            .filter(|e| e.channel == Channel::State)
            .map(|e| StateRecord {
                timestamp: e.timestamp,
                state: e.content.trim().to_string(),
            })
            .collect()
    }

    /// Concatenated stdout, one event per line, channel tags stripped
    pub fn stdout(&self) -> String {
        self.stream(Channel::Stdout)
    }

    /// Concatenated stderr, one event per line, channel tags stripped
    pub fn stderr(&self) -> String {
        self.stream(Channel::Stderr)
    }

    fn stream(&self, channel: Channel) -> String {
        self.events
            .iter()
            .filter(|e| e.channel == channel)
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Most recent timestamp of a state event whose content equals `state`
    /// (case-insensitive).
    pub fn last_time(&self, state: &str) -> Option<NaiveDateTime> {
        self.events
            .iter()
            .rev()
            .find(|e| e.channel == Channel::State && e.content.trim().eq_ignore_ascii_case(state.trim()))
            .map(|e| e.timestamp)
    }

    /// The suffix of this log that starts at the last `submitted` event.
    ///
    /// A fresh submission supersedes everything an earlier submission
    /// produced, so reconciliation only ever looks at this window. Logs with
    /// no submission at all are returned whole.
    pub fn current_generation(&self) -> ProducerLog {
        let start = self
            .events
            .iter()
            .rposition(|e| e.state_tag() == Some(StateTag::Submitted))
            .unwrap_or(0);
        ProducerLog {
            events: self.events[start..].to_vec(),
        }
    }
}

/// A reconstructed manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    producers: BTreeMap<String, ProducerLog>,
    /// Lines seen before the first timestamped line
    orphaned_lines: usize,
}

impl Manifest {
    /// Reconstruct a manifest from its full text
    pub fn parse(text: &str) -> Self {
        Self::parse_since(text, None)
    }

    /// Reconstruct a manifest, discarding events strictly before `cutoff`.
    pub fn parse_since(text: &str, cutoff: Option<NaiveDateTime>) -> Self {
        let mut manifest = Manifest::default();
        let mut pending: Option<ManifestEvent> = None;

        for line in text.lines() {
            match split_header(line) {
                Some(header) => {
                    if let Some(event) = pending.take() {
                        manifest.flush(event, cutoff);
                    }
                    pending = Some(header.into_event());
                }
                None => match pending.as_mut() {
                    Some(event) => {
                        event.content.push('\n');
                        event.content.push_str(line);
                    }
                    None => manifest.orphaned_lines += 1,
                },
            }
        }

        if let Some(event) = pending.take() {
            manifest.flush(event, cutoff);
        }

        manifest
    }

    fn flush(&mut self, event: ManifestEvent, cutoff: Option<NaiveDateTime>) {
        if cutoff.is_some_and(|cutoff| event.timestamp < cutoff) {
            return;
        }
        self.producers
            .entry(event.producer.clone())
            .or_default()
            .events
            .push(event);
    }

    /// Log of one producer, if it wrote anything
    pub fn producer(&self, short_id: &str) -> Option<&ProducerLog> {
        self.producers.get(short_id)
    }

    /// Short ids of every producer, sorted
    pub fn producers(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn orphaned_lines(&self) -> usize {
        self.orphaned_lines
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Per producer, the most recent timestamp of a state event whose
    /// content case-insensitively equals `state`.
    pub fn last_time(&self, state: &str) -> BTreeMap<String, NaiveDateTime> {
        self.producers
            .iter()
            .filter_map(|(id, log)| log.last_time(state).map(|t| (id.clone(), t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    const SAMPLE: &str = "\
2024-03-01 10:00:00 [proc0000] submitted
2024-03-01 10:00:00 [aaaa1111] submitted
2024-03-01 10:00:00 [bbbb2222] submitted
2024-03-01 10:00:01 [aaaa1111] started
2024-03-01 10:00:01 [bbbb2222] STARTED
2024-03-01 10:00:02 [aaaa1111] [stdout] first line
second line

fourth line
2024-03-01 10:00:02 [bbbb2222] [stderr] Traceback:
  something broke
2024-03-01 10:00:03 [aaaa1111] [stdout] again
2024-03-01 10:00:03 [aaaa1111] completed
2024-03-01 10:00:04 [bbbb2222] failed
";

    #[test]
    fn test_reconstructs_state_history() {
        let manifest = Manifest::parse(SAMPLE);

        let states: Vec<_> = manifest
            .producer("aaaa1111")
            .unwrap()
            .states()
            .into_iter()
            .map(|r| (r.timestamp, r.state))
            .collect();
        assert_eq!(
            states,
            vec![
                (ts("2024-03-01 10:00:00"), "submitted".to_string()),
                (ts("2024-03-01 10:00:01"), "started".to_string()),
                (ts("2024-03-01 10:00:03"), "completed".to_string()),
            ]
        );

        let b_states: Vec<_> = manifest
            .producer("bbbb2222")
            .unwrap()
            .states()
            .into_iter()
            .map(|r| r.state)
            .collect();
        assert_eq!(b_states, vec!["submitted", "STARTED", "failed"]);
    }

    #[test]
    fn test_reconstructs_streams_byte_exact() {
        let manifest = Manifest::parse(SAMPLE);

        let a = manifest.producer("aaaa1111").unwrap();
        assert_eq!(a.stdout(), "first line\nsecond line\n\nfourth line\nagain");
        assert_eq!(a.stderr(), "");

        let b = manifest.producer("bbbb2222").unwrap();
        assert_eq!(b.stderr(), "Traceback:\n  something broke");
        assert_eq!(b.stdout(), "");
    }

    #[test]
    fn test_producers_listed() {
        let manifest = Manifest::parse(SAMPLE);
        let ids: Vec<_> = manifest.producers().collect();
        assert_eq!(ids, vec!["aaaa1111", "bbbb2222", "proc0000"]);
    }

    #[test]
    fn test_last_time_case_insensitive() {
        let manifest = Manifest::parse(SAMPLE);
        let started = manifest.last_time("started");

        assert_eq!(started.get("aaaa1111"), Some(&ts("2024-03-01 10:00:01")));
        assert_eq!(started.get("bbbb2222"), Some(&ts("2024-03-01 10:00:01")));
        assert!(started.get("proc0000").is_none());
    }

    #[test]
    fn test_last_time_picks_latest() {
        let text = "\
2024-03-01 10:00:00 [aaaa1111] started
2024-03-01 10:00:09 [aaaa1111] started
2024-03-01 10:00:05 [aaaa1111] completed
";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.last_time("started")["aaaa1111"], ts("2024-03-01 10:00:09"));
    }

    #[test]
    fn test_cutoff_discards_strictly_earlier() {
        let manifest = Manifest::parse_since(SAMPLE, Some(ts("2024-03-01 10:00:02")));

        let a = manifest.producer("aaaa1111").unwrap();
        let states: Vec<_> = a.states().into_iter().map(|r| r.state).collect();
        assert_eq!(states, vec!["completed"]);
        // the stdout event stamped exactly at the cutoff is kept
        assert!(a.stdout().starts_with("first line"));
        assert!(manifest.producer("proc0000").is_none());
    }

    #[test]
    fn test_orphaned_lines_counted() {
        let manifest = Manifest::parse("garbage\nmore garbage\n2024-03-01 10:00:00 [aaaa1111] started\n");
        assert_eq!(manifest.orphaned_lines(), 2);
        assert_eq!(manifest.producer("aaaa1111").unwrap().states().len(), 1);
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::parse("");
        assert!(manifest.is_empty());
        assert!(manifest.last_time("started").is_empty());
    }

    #[test]
    fn test_current_generation_starts_at_last_submission() {
        let text = "\
2024-03-01 10:00:00 [aaaa1111] submitted
2024-03-01 10:00:01 [aaaa1111] started
2024-03-01 10:00:02 [aaaa1111] [stdout] old
2024-03-01 10:00:03 [aaaa1111] completed
2024-03-01 10:00:04 [aaaa1111] submitted
2024-03-01 10:00:05 [aaaa1111] started
";
        let manifest = Manifest::parse(text);
        let generation = manifest.producer("aaaa1111").unwrap().current_generation();

        let states: Vec<_> = generation.states().into_iter().map(|r| r.state).collect();
        assert_eq!(states, vec!["submitted", "started"]);
        assert_eq!(generation.stdout(), "");
    }

    #[test]
    fn test_current_generation_without_submission_is_whole_log() {
        let text = "2024-03-01 10:00:01 [aaaa1111] started\n2024-03-01 10:00:03 [aaaa1111] completed\n";
        let manifest = Manifest::parse(text);
        let log = manifest.producer("aaaa1111").unwrap();
        assert_eq!(log.current_generation(), log.clone());
    }
}
