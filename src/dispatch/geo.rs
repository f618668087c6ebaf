//! Haversine distance, radius filtering, and board ordering.

use geo::{point, HaversineDistance};

use crate::db::{Ride, User};

/// Great-circle distance between two coordinate pairs in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = point!(x: lon1, y: lat1);
    let b = point!(x: lon2, y: lat2);
    a.haversine_distance(&b) / 1000.0
}

/// Distance from a position to a ride's pickup point, or `None` when the
/// ride has no pickup coordinates.
pub fn pickup_distance_km(lat: f64, lon: f64, ride: &Ride) -> Option<f64> {
    match (ride.pickup_latitude, ride.pickup_longitude) {
        (Some(p_lat), Some(p_lon)) => Some(haversine_km(lat, lon, p_lat, p_lon)),
        _ => None,
    }
}

/// Filter unassigned rides to those within `radius_km` of the driver and
/// order them for the offer board.
///
/// Rides without pickup coordinates are always included. Ordering is
/// newest first by `created_at`, ties broken by ascending distance with
/// unknown distance sorting last.
pub fn board_entries(
    rides: Vec<Ride>,
    driver_lat: f64,
    driver_lon: f64,
    radius_km: f64,
) -> Vec<(Ride, Option<f64>)> {
    let mut entries: Vec<(Ride, Option<f64>)> = rides
        .into_iter()
        .filter_map(|ride| {
            match pickup_distance_km(driver_lat, driver_lon, &ride) {
                Some(d) if d > radius_km => None,
                d => Some((ride, d)),
            }
        })
        .collect();

    entries.sort_by(|(a, da), (b, db)| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| match (da, db) {
                (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });

    entries
}

/// Online drivers within `radius_km` of a position, nearest first
pub fn nearby_drivers(
    drivers: Vec<User>,
    lat: f64,
    lon: f64,
    radius_km: f64,
) -> Vec<(User, f64)> {
    let mut entries: Vec<(User, f64)> = drivers
        .into_iter()
        .filter_map(|driver| {
            let (d_lat, d_lon) = match (driver.last_latitude, driver.last_longitude) {
                (Some(a), Some(b)) => (a, b),
                _ => return None,
            };
            let distance = haversine_km(lat, lon, d_lat, d_lon);
            (distance <= radius_km).then_some((driver, distance))
        })
        .collect();

    entries.sort_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ride(id: &str, created_at: &str, coords: Option<(f64, f64)>) -> Ride {
        Ride {
            id: id.to_string(),
            passenger_id: "p1".to_string(),
            driver_id: None,
            pickup_address: "A".to_string(),
            pickup_latitude: coords.map(|(lat, _)| lat),
            pickup_longitude: coords.map(|(_, lon)| lon),
            destination_address: "B".to_string(),
            destination_latitude: None,
            destination_longitude: None,
            passengers: 1,
            ride_type: "now".to_string(),
            scheduled_at: None,
            distance_miles: None,
            duration_minutes: None,
            proposed_fare: 10.0,
            accepted_fare: None,
            final_fare: None,
            status: "pending".to_string(),
            cancellation_reason: None,
            cancelled_by: None,
            version: 0,
            client_request_id: None,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // London to Paris is roughly 344 km
        let d = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 344.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let d = haversine_km(40.7128, -74.0060, 40.7128, -74.0060);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn test_board_excludes_rides_outside_radius() {
        // Driver in central Berlin; one pickup ~1 km away, one ~25 km away
        let rides = vec![
            ride("near", "2026-01-01T10:00:00+00:00", Some((52.5250, 13.4050))),
            ride("far", "2026-01-01T10:00:00+00:00", Some((52.3000, 13.6000))),
        ];
        let entries = board_entries(rides, 52.5200, 13.4050, 15.0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.id, "near");
    }

    #[test]
    fn test_board_always_includes_rides_without_coordinates() {
        let rides = vec![ride("blind", "2026-01-01T10:00:00+00:00", None)];
        let entries = board_entries(rides, 52.52, 13.405, 15.0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, None);
    }

    #[test]
    fn test_board_sorts_newest_first() {
        let rides = vec![
            ride("old", "2026-01-01T09:00:00+00:00", Some((52.5210, 13.4050))),
            ride("new", "2026-01-01T11:00:00+00:00", Some((52.5290, 13.4050))),
        ];
        let entries = board_entries(rides, 52.52, 13.405, 15.0);
        assert_eq!(entries[0].0.id, "new");
        assert_eq!(entries[1].0.id, "old");
    }

    #[test]
    fn test_board_breaks_ties_by_distance_with_unknown_last() {
        let t = "2026-01-01T10:00:00+00:00";
        let rides = vec![
            ride("unknown", t, None),
            ride("farther", t, Some((52.5500, 13.4050))),
            ride("closer", t, Some((52.5210, 13.4050))),
        ];
        let entries = board_entries(rides, 52.52, 13.405, 15.0);
        let order: Vec<&str> = entries.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(order, vec!["closer", "farther", "unknown"]);
    }

    fn driver(id: &str, coords: Option<(f64, f64)>) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            password_hash: String::new(),
            name: id.to_string(),
            phone: None,
            role: "driver".to_string(),
            status: "verified".to_string(),
            online: 1,
            last_latitude: coords.map(|(lat, _)| lat),
            last_longitude: coords.map(|(_, lon)| lon),
            located_at: None,
            rating_average: 0.0,
            rating_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_nearby_drivers_sorted_by_distance() {
        let drivers = vec![
            driver("far", Some((52.5800, 13.4050))),
            driver("close", Some((52.5210, 13.4050))),
            driver("outside", Some((53.0000, 13.4050))),
            driver("no_fix", None),
        ];
        let entries = nearby_drivers(drivers, 52.52, 13.405, 10.0);
        let order: Vec<&str> = entries.iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(order, vec!["close", "far"]);
    }
}
