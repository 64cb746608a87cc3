use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::mta::proto::{NyctDirection, VehicleStopStatus};

/// Direction a train is traveling, as reported by the NYCT trip extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainDirection {
    North,
    South,
    East,
    West,
    Unknown,
}

impl TrainDirection {
    /// Decode the raw NYCT direction value. Absent or unmapped values are `Unknown`.
    pub fn from_nyct(raw: Option<i32>) -> Self {
        match raw.map(NyctDirection::try_from) {
            Some(Ok(NyctDirection::North)) => TrainDirection::North,
            Some(Ok(NyctDirection::South)) => TrainDirection::South,
            Some(Ok(NyctDirection::East)) => TrainDirection::East,
            Some(Ok(NyctDirection::West)) => TrainDirection::West,
            Some(Err(_)) | None => TrainDirection::Unknown,
        }
    }

    /// Short code: "N", "S", "E", "W" or "Unknown".
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainDirection::North => "N",
            TrainDirection::South => "S",
            TrainDirection::East => "E",
            TrainDirection::West => "W",
            TrainDirection::Unknown => "Unknown",
        }
    }
}

/// Movement status of a vehicle relative to its current stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleStatus {
    Incoming,
    Stopped,
    InTransit,
    Unknown,
}

impl VehicleStatus {
    /// Map the raw GTFS-RT status. Unset and unrecognized values are `Unknown`.
    pub fn from_gtfs(raw: Option<i32>) -> Self {
        match raw.map(VehicleStopStatus::try_from) {
            Some(Ok(VehicleStopStatus::IncomingAt)) => VehicleStatus::Incoming,
            Some(Ok(VehicleStopStatus::StoppedAt)) => VehicleStatus::Stopped,
            Some(Ok(VehicleStopStatus::InTransitTo)) => VehicleStatus::InTransit,
            Some(Err(_)) | None => VehicleStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Incoming => "Incoming",
            VehicleStatus::Stopped => "Stopped",
            VehicleStatus::InTransit => "In Transit",
            VehicleStatus::Unknown => "Unknown",
        }
    }
}

impl Serialize for TrainDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Serialize for VehicleStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f32,
    pub longitude: f32,
}

/// One upcoming stop of a trip, in feed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopInfo {
    pub stop_id: String,
    pub arrival_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub scheduled_track: Option<String>,
    pub actual_track: Option<String>,
}

/// Merged live state of one train, keyed by trip id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainPosition {
    /// Same value as `trip_id`.
    pub id: String,
    pub trip_id: String,
    pub route_id: String,
    pub train_id: Option<String>,
    pub direction: TrainDirection,
    pub is_assigned: bool,
    pub current_stop_id: Option<String>,
    pub current_status: VehicleStatus,
    pub last_movement: Option<DateTime<Utc>>,
    pub position: Option<Coordinates>,
    pub next_stops: Vec<StopInfo>,
}

/// Reconciled positions of one feed, plus the header timestamp they came with.
#[derive(Debug, Clone)]
pub struct FeedPositions {
    pub positions: Vec<TrainPosition>,
    pub feed_timestamp: Option<DateTime<Utc>>,
}

/// Immutable snapshot of every configured feed's positions.
///
/// Published by the fetch task via ArcSwap, read lock-free by the web handlers.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    /// Feed URL → positions from that feed's last successful fetch.
    pub feeds: HashMap<String, FeedPositions>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PositionSnapshot {
    pub fn empty() -> Self {
        PositionSnapshot {
            feeds: HashMap::new(),
            fetched_at: None,
        }
    }

    pub fn train_count(&self) -> usize {
        self.feeds.values().map(|f| f.positions.len()).sum()
    }

    /// All positions, optionally restricted to one route, sorted by (route, trip).
    pub fn trains(&self, route: Option<&str>) -> Vec<&TrainPosition> {
        let mut trains: Vec<&TrainPosition> = self
            .feeds
            .values()
            .flat_map(|f| f.positions.iter())
            .filter(|t| route.is_none_or(|r| t.route_id == r))
            .collect();
        trains.sort_by(|a, b| {
            a.route_id
                .cmp(&b.route_id)
                .then_with(|| a.trip_id.cmp(&b.trip_id))
        });
        trains
    }

    pub fn find_trip(&self, trip_id: &str) -> Option<&TrainPosition> {
        self.feeds
            .values()
            .flat_map(|f| f.positions.iter())
            .find(|t| t.trip_id == trip_id)
    }

    /// Oldest header timestamp across feeds.
    pub fn oldest_feed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.feeds.values().filter_map(|f| f.feed_timestamp).min()
    }
}

/// Convert epoch seconds to a UTC timestamp. Out-of-range values yield `None`.
pub fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_position(trip: &str, route: &str) -> TrainPosition {
        TrainPosition {
            id: trip.into(),
            trip_id: trip.into(),
            route_id: route.into(),
            train_id: None,
            direction: TrainDirection::Unknown,
            is_assigned: false,
            current_stop_id: None,
            current_status: VehicleStatus::Unknown,
            last_movement: None,
            position: None,
            next_stops: Vec::new(),
        }
    }

    fn snapshot_with(feeds: Vec<(&str, Vec<TrainPosition>, Option<i64>)>) -> PositionSnapshot {
        PositionSnapshot {
            feeds: feeds
                .into_iter()
                .map(|(url, positions, ts)| {
                    (
                        url.to_string(),
                        FeedPositions {
                            positions,
                            feed_timestamp: ts.and_then(epoch_to_utc),
                        },
                    )
                })
                .collect(),
            fetched_at: None,
        }
    }

    #[test]
    fn test_direction_decoding_is_total() {
        assert_eq!(TrainDirection::from_nyct(Some(1)).as_str(), "N");
        assert_eq!(TrainDirection::from_nyct(Some(3)).as_str(), "S");
        assert_eq!(TrainDirection::from_nyct(Some(2)).as_str(), "E");
        assert_eq!(TrainDirection::from_nyct(Some(4)).as_str(), "W");
        assert_eq!(TrainDirection::from_nyct(None).as_str(), "Unknown");
        assert_eq!(TrainDirection::from_nyct(Some(0)).as_str(), "Unknown");
        assert_eq!(TrainDirection::from_nyct(Some(99)).as_str(), "Unknown");
    }

    #[test]
    fn test_vehicle_status_strings() {
        assert_eq!(VehicleStatus::from_gtfs(Some(0)).as_str(), "Incoming");
        assert_eq!(VehicleStatus::from_gtfs(Some(1)).as_str(), "Stopped");
        assert_eq!(VehicleStatus::from_gtfs(Some(2)).as_str(), "In Transit");
        assert_eq!(VehicleStatus::from_gtfs(None).as_str(), "Unknown");
        assert_eq!(VehicleStatus::from_gtfs(Some(7)).as_str(), "Unknown");
    }

    #[test]
    fn test_serialized_strings() {
        for dir in [
            TrainDirection::North,
            TrainDirection::South,
            TrainDirection::East,
            TrainDirection::West,
            TrainDirection::Unknown,
        ] {
            let json = serde_json::to_value(dir).unwrap();
            assert_eq!(json, dir.as_str());
        }
        let json = serde_json::to_value(VehicleStatus::InTransit).unwrap();
        assert_eq!(json, "In Transit");
    }

    #[test]
    fn test_epoch_zero_is_a_real_timestamp() {
        let ts = epoch_to_utc(0).unwrap();
        assert_eq!(ts.timestamp(), 0);
        assert!(epoch_to_utc(i64::MAX).is_none());
    }

    #[test]
    fn test_snapshot_empty() {
        let snap = PositionSnapshot::empty();
        assert_eq!(snap.train_count(), 0);
        assert!(snap.trains(None).is_empty());
        assert!(snap.oldest_feed_timestamp().is_none());
    }

    #[test]
    fn test_snapshot_trains_sorted_and_filtered() {
        let snap = snapshot_with(vec![
            ("feed-l", vec![make_position("T9", "L"), make_position("T1", "L")], Some(200)),
            ("feed-1", vec![make_position("T5", "1")], Some(100)),
        ]);

        let all: Vec<&str> = snap.trains(None).iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(all, vec!["T5", "T1", "T9"]);

        let l_only = snap.trains(Some("L"));
        assert_eq!(l_only.len(), 2);
        assert!(l_only.iter().all(|t| t.route_id == "L"));

        assert_eq!(snap.train_count(), 3);
        assert_eq!(snap.oldest_feed_timestamp().unwrap().timestamp(), 100);
    }

    #[test]
    fn test_snapshot_find_trip() {
        let snap = snapshot_with(vec![("feed", vec![make_position("T1", "4")], None)]);
        assert_eq!(snap.find_trip("T1").unwrap().route_id, "4");
        assert!(snap.find_trip("T2").is_none());
    }
}
