//! Splitting a snapshot into size-bounded, pre-serialized batches.

use crate::io::Timestamp;
use crate::step::{DataPoint, Snapshot};
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// A contiguous slice of a snapshot plus its encoded JSON envelope.
///
/// The payload is built once; retries resend the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position within the publish cycle, starting at 0
    pub index: usize,
    pub step_start: Timestamp,
    pub step: Duration,
    pub points: Vec<DataPoint>,
    pub payload: Bytes,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    step_start: Timestamp,
    step_ms: u64,
    points: &'a [DataPoint],
}

fn encode(step_start: Timestamp, step: Duration, points: &[DataPoint]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Envelope {
        step_start,
        step_ms: u64::try_from(step.as_millis()).unwrap_or(u64::MAX),
        points,
    })
}

/// Partition `snapshot` into batches of at most `max_items` points whose
/// encoded payload is at most `max_bytes`, preserving snapshot order.
///
/// A single point larger than `max_bytes` cannot be split; it is shipped in a
/// batch of its own and a warning is logged.
pub fn partition(
    snapshot: &Snapshot,
    max_items: usize,
    max_bytes: usize,
) -> serde_json::Result<Vec<Batch>> {
    let max_items = max_items.max(1);
    // `{"step_start":..,"step_ms":..,"points":[]}`; each point adds its own
    // length plus a comma separator.
    let overhead = encode(snapshot.step_start, snapshot.step, &[])?.len();

    let mut groups: Vec<Vec<DataPoint>> = Vec::new();
    let mut current: Vec<DataPoint> = Vec::new();
    let mut current_bytes = overhead;

    for point in &snapshot.points {
        let size = serde_json::to_vec(point)?.len();
        let separator = usize::from(!current.is_empty());

        if !current.is_empty()
            && (current.len() >= max_items || current_bytes + separator + size > max_bytes)
        {
            groups.push(std::mem::take(&mut current));
            current_bytes = overhead;
        }

        if current.is_empty() && overhead + size > max_bytes {
            warn!(
                meter = %point.id,
                bytes = overhead + size,
                max_bytes,
                "Data point exceeds the batch byte limit; sending it alone"
            );
        }

        current_bytes += usize::from(!current.is_empty()) + size;
        current.push(point.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, points)| {
            let payload = encode(snapshot.step_start, snapshot.step, &points)?;
            Ok(Batch {
                index,
                step_start: snapshot.step_start,
                step: snapshot.step,
                points,
                payload: Bytes::from(payload),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::MeterId;
    use crate::step::{build_snapshot, FrozenState};

    fn snapshot(n: usize) -> Snapshot {
        build_snapshot(
            Timestamp(60_000),
            Duration::from_secs(60),
            (0..n).map(|i| {
                (
                    MeterId::new(format!("meter.{i:03}")),
                    FrozenState::Counter(i as f64),
                )
            }),
        )
    }

    #[test]
    fn test_empty_snapshot_has_no_batches() {
        assert!(partition(&snapshot(0), 10, 10_000).unwrap().is_empty());
    }

    #[test]
    fn test_item_limit_preserves_order() {
        let snap = snapshot(7);
        let batches = partition(&snap, 3, 1_000_000).unwrap();

        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(
            batches.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        let flattened: Vec<_> = batches.iter().flat_map(|b| b.points.clone()).collect();
        assert_eq!(flattened, snap.points);
    }

    #[test]
    fn test_byte_limit_is_respected_exactly() {
        let snap = snapshot(40);
        let max_bytes = 400;
        let batches = partition(&snap, 1_000, max_bytes).unwrap();

        assert!(batches.len() > 1);
        for batch in &batches {
            assert!(
                batch.payload.len() <= max_bytes,
                "batch {} is {} bytes",
                batch.index,
                batch.payload.len()
            );
        }
        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, 40);
    }

    #[test]
    fn test_payload_is_the_json_envelope() {
        let batches = partition(&snapshot(2), 10, 10_000).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&batches[0].payload).unwrap();

        assert_eq!(json["step_start"], 60_000);
        assert_eq!(json["step_ms"], 60_000);
        assert_eq!(json["points"].as_array().unwrap().len(), 2);
        assert_eq!(json["points"][1]["name"], "meter.001");
        assert_eq!(json["points"][1]["type"], "count");
    }

    #[test]
    fn test_oversized_point_ships_alone() {
        let snap = build_snapshot(
            Timestamp(0),
            Duration::from_secs(1),
            vec![
                (MeterId::new("small"), FrozenState::Counter(1.0)),
                (
                    MeterId::new("wide").with_tag("blob", "x".repeat(600)),
                    FrozenState::Counter(1.0),
                ),
            ],
        );

        let batches = partition(&snap, 100, 300).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].points[0].id.name(), "wide");
    }
}
