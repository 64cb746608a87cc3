//! Merge vehicle positions and trip updates into one record per trip.
//!
//! Pure and stateless: every call works only on the index it is given.

use std::collections::HashSet;

use crate::models::{
    epoch_to_utc, Coordinates, StopInfo, TrainDirection, TrainPosition, VehicleStatus,
};

use super::index::FeedIndex;
use super::proto::{StopTimeEvent, TripDescriptor, TripUpdate, VehiclePosition};

/// Produce one [`TrainPosition`] per trip id seen in either table.
///
/// Output order is unspecified.
pub fn reconcile(index: &FeedIndex<'_>) -> Vec<TrainPosition> {
    let trip_ids: HashSet<&str> = index
        .vehicle_by_trip
        .keys()
        .chain(index.update_by_trip.keys())
        .copied()
        .collect();

    trip_ids
        .into_iter()
        .filter_map(|trip_id| {
            build_train_position(
                trip_id,
                index.vehicle_by_trip.get(trip_id).copied(),
                index.update_by_trip.get(trip_id).copied(),
            )
        })
        .collect()
}

/// Merge the vehicle and update observed for `trip_id`.
///
/// The vehicle's descriptor takes precedence over the update's. Returns `None`
/// only when neither is present.
pub fn build_train_position(
    trip_id: &str,
    vehicle: Option<&VehiclePosition>,
    update: Option<&TripUpdate>,
) -> Option<TrainPosition> {
    let trip = vehicle
        .and_then(|v| v.trip.as_ref())
        .or(update.map(|u| &u.trip))?;

    let NyctTrip {
        direction,
        is_assigned,
        train_id,
    } = NyctTrip::decode(trip);

    // Current stop, status and movement come from the vehicle only.
    let current_stop_id = vehicle.and_then(|v| v.stop_id.clone());
    let current_status = VehicleStatus::from_gtfs(vehicle.and_then(|v| v.current_status));
    let last_movement = vehicle
        .and_then(|v| v.timestamp)
        .and_then(|ts| i64::try_from(ts).ok())
        .and_then(epoch_to_utc);
    let position = vehicle.and_then(|v| v.position.as_ref()).map(|p| Coordinates {
        latitude: p.latitude,
        longitude: p.longitude,
    });

    Some(TrainPosition {
        id: trip_id.to_string(),
        trip_id: trip_id.to_string(),
        route_id: trip.route_id.clone().unwrap_or_default(),
        train_id,
        direction,
        is_assigned,
        current_stop_id,
        current_status,
        last_movement,
        position,
        next_stops: update.map(extract_stop_infos).unwrap_or_default(),
    })
}

/// One [`StopInfo`] per stop time update, in feed order. Nothing is dropped,
/// even entries with neither arrival nor departure.
pub fn extract_stop_infos(update: &TripUpdate) -> Vec<StopInfo> {
    update
        .stop_time_update
        .iter()
        .map(|stu| {
            let tracks = stu.nyct_stop_time_update.as_ref();
            StopInfo {
                stop_id: stu.stop_id.clone().unwrap_or_default(),
                arrival_time: event_time(stu.arrival.as_ref()),
                departure_time: event_time(stu.departure.as_ref()),
                scheduled_track: tracks.and_then(|t| t.scheduled_track.clone()),
                actual_track: tracks.and_then(|t| t.actual_track.clone()),
            }
        })
        .collect()
}

/// Predicted time of an event, only when `time` is explicitly set.
fn event_time(event: Option<&StopTimeEvent>) -> Option<chrono::DateTime<chrono::Utc>> {
    event.and_then(|e| e.time).and_then(epoch_to_utc)
}

/// Decoded NYCT trip extension, with defaults for an absent block.
#[derive(Debug, PartialEq)]
struct NyctTrip {
    direction: TrainDirection,
    is_assigned: bool,
    train_id: Option<String>,
}

impl NyctTrip {
    fn decode(trip: &TripDescriptor) -> Self {
        match trip.nyct_trip_descriptor {
            Some(ref nyct) => NyctTrip {
                direction: TrainDirection::from_nyct(nyct.direction),
                is_assigned: nyct.is_assigned.unwrap_or(false),
                train_id: nyct.train_id.clone(),
            },
            None => NyctTrip {
                direction: TrainDirection::Unknown,
                is_assigned: false,
                train_id: None,
            },
        }
    }
}
