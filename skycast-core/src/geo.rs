//! Time + displacement gate in front of the update pipeline.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::Location;
use crate::state::UpdateState;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const DEFAULT_DISPLACEMENT_THRESHOLD_M: f64 = 1000.0;

/// Equirectangular distance in meters. Only meaningful for short hops.
pub fn planar_distance_m(a: Location, b: Location) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let x = d_lon * ((lat1 + lat2) / 2.0).cos();
    let y = lat2 - lat1;
    (x * x + y * y).sqrt() * EARTH_RADIUS_M
}

/// Pure predicate deciding whether a new update cycle may start.
#[derive(Debug, Clone, Copy)]
pub struct GeoRateLimiter {
    min_retry_interval: TimeDelta,
    threshold_m: f64,
}

impl GeoRateLimiter {
    pub fn new(min_retry_interval: TimeDelta, threshold_m: f64) -> Self {
        Self { min_retry_interval, threshold_m }
    }

    /// Denies only when a cycle is still in flight, the cooldown has not
    /// elapsed, and the device has not moved past the threshold.
    pub fn permit(&self, state: &UpdateState, now: DateTime<Utc>, candidate: Location) -> bool {
        if !state.in_progress() {
            return true;
        }

        // An end past the representable range means the cooldown never elapses.
        let cooling_down = match state.last_attempt_at {
            Some(at) => at.checked_add_signed(self.min_retry_interval).is_none_or(|end| now < end),
            None => false,
        };
        if !cooling_down {
            return true;
        }

        match state.last_fetch_location {
            Some(previous) => planar_distance_m(previous, candidate) >= self.threshold_m,
            None => true,
        }
    }
}

impl Default for GeoRateLimiter {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(60), DEFAULT_DISPLACEMENT_THRESHOLD_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Slot;

    const HOME: Location = Location { latitude: 41.739841, longitude: -93.620774 };

    fn busy_state(at: DateTime<Utc>) -> UpdateState {
        let mut state = UpdateState::default();
        state.begin(at, HOME, &[Slot::Conditions]);
        state
    }

    /// Roughly `meters` due north of HOME.
    fn north_of_home(meters: f64) -> Location {
        let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
        Location::new(HOME.latitude + d_lat, HOME.longitude)
    }

    #[test]
    fn distance_is_zero_for_same_point() {
        assert_eq!(planar_distance_m(HOME, HOME), 0.0);
    }

    #[test]
    fn distance_matches_small_meridian_hop() {
        let d = planar_distance_m(HOME, north_of_home(1500.0));
        assert!((d - 1500.0).abs() < 0.01, "{d}");
    }

    #[test]
    fn distance_accounts_for_latitude_on_longitude_hops() {
        // One degree of longitude near 41.7N is ~83 km, not ~111 km.
        let east = Location::new(HOME.latitude, HOME.longitude + 1.0);
        let d = planar_distance_m(HOME, east);
        assert!(d > 82_000.0 && d < 84_000.0, "{d}");
    }

    #[test]
    fn idle_state_always_permits() {
        let limiter = GeoRateLimiter::default();
        let now = Utc::now();
        let mut state = busy_state(now);
        state.finish(Slot::Conditions);

        for seconds in [0, 1, 30, 59, 60, 3600] {
            for meters in [0.0, 10.0, 999.0, 1000.0, 50_000.0] {
                let t = now + TimeDelta::seconds(seconds);
                assert!(limiter.permit(&state, t, north_of_home(meters)));
            }
        }
    }

    #[test]
    fn first_call_is_permitted() {
        let limiter = GeoRateLimiter::default();
        assert!(limiter.permit(&UpdateState::default(), Utc::now(), HOME));
    }

    #[test]
    fn busy_state_denies_only_inside_cooldown_and_radius() {
        let limiter = GeoRateLimiter::default();
        let start = Utc::now();
        let state = busy_state(start);

        for seconds in [0i64, 1, 30, 59, 60, 61, 600] {
            for meters in [0.0, 10.0, 500.0, 990.0, 1010.0, 5000.0] {
                let now = start + TimeDelta::seconds(seconds);
                let within_cooldown = seconds < 60;
                let within_radius = meters < 1000.0;
                let expected = !(within_cooldown && within_radius);
                assert_eq!(
                    limiter.permit(&state, now, north_of_home(meters)),
                    expected,
                    "t+{seconds}s, {meters}m"
                );
            }
        }
    }

    #[test]
    fn busy_state_without_prior_location_permits() {
        let limiter = GeoRateLimiter::default();
        let now = Utc::now();
        let mut state = busy_state(now);
        state.last_fetch_location = None;
        assert!(limiter.permit(&state, now, HOME));
    }

    #[test]
    fn cooldown_end_beyond_calendar_does_not_panic() {
        let limiter = GeoRateLimiter::default();
        let at = DateTime::<Utc>::MAX_UTC;
        let state = busy_state(at);
        assert!(!limiter.permit(&state, at, HOME));
        assert!(limiter.permit(&state, at, north_of_home(5000.0)));
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let limiter = GeoRateLimiter::new(TimeDelta::seconds(60), 100.0);
        let now = Utc::now();
        let state = busy_state(now);
        assert!(!limiter.permit(&state, now, north_of_home(50.0)));
        assert!(limiter.permit(&state, now, north_of_home(150.0)));
    }
}
