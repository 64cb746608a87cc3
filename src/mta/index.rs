use std::collections::HashMap;

use tracing::debug;

use super::proto::{FeedMessage, TripDescriptor, TripUpdate, VehiclePosition};

/// Vehicle positions and trip updates of one feed, keyed by trip id.
///
/// Borrows from the feed it was built from. When a trip id repeats within one
/// kind, the entity later in feed order wins.
#[derive(Debug, Default)]
pub struct FeedIndex<'a> {
    pub vehicle_by_trip: HashMap<&'a str, &'a VehiclePosition>,
    pub update_by_trip: HashMap<&'a str, &'a TripUpdate>,
}

impl<'a> FeedIndex<'a> {
    /// Split the feed's entities into the two lookup tables in one pass.
    ///
    /// Entities carrying neither payload are skipped, as are descriptors
    /// without a non-empty trip id.
    pub fn build(feed: &'a FeedMessage) -> Self {
        let mut index = FeedIndex::default();

        for entity in &feed.entity {
            if let Some(ref vehicle) = entity.vehicle {
                match vehicle.trip.as_ref().and_then(trip_key) {
                    Some(trip_id) => {
                        index.vehicle_by_trip.insert(trip_id, vehicle);
                    }
                    None => debug!("Entity {} has a vehicle without a trip id", entity.id),
                }
            }

            if let Some(ref update) = entity.trip_update {
                match trip_key(&update.trip) {
                    Some(trip_id) => {
                        index.update_by_trip.insert(trip_id, update);
                    }
                    None => debug!("Entity {} has a trip update without a trip id", entity.id),
                }
            }
        }

        index
    }

    pub fn is_empty(&self) -> bool {
        self.vehicle_by_trip.is_empty() && self.update_by_trip.is_empty()
    }
}

fn trip_key(trip: &TripDescriptor) -> Option<&str> {
    trip.trip_id.as_deref().filter(|id| !id.is_empty())
}
