//! # Autopilots
//!
//! Three independent closed-loop controllers, one per axis group:
//! vertical (height), rotational (yaw) and horizontal (position). Each is
//! a cooperative task that reads live telemetry every 25 ms and drives the
//! latched stick axes with a deadband (bang-bang) controller until the
//! target is inside the tolerance band or the operation is cancelled. The
//! keep-alive sender transports the stick values; the autopilots only send
//! one explicit stick update, on exit, to make sure the axes they owned
//! are seen as zeroed.
//!
//! At most one autopilot per axis group can be active; starting a second
//! returns [Error::AlreadyNavigating]. They can run concurrently with each
//! other and with user commands:
//!
//! ``` no_run
//! # async fn manoeuvre(drone: &tello_lib::Tello) -> tello_lib::Result<()> {
//! let climb = drone.auto_fly_to_height(15).await?;
//! let turn = drone.auto_turn_to_yaw(120).await?;
//! climb.recv_async().await.ok();
//! turn.recv_async().await.ok();
//! # Ok(())
//! # }
//! ```
//!
//! The horizontal autopilot navigates relative to a *home point* captured
//! with [set_home](crate::Tello::set_home); it relies on the downward
//! visual-odometry sensor and cancels itself when the light gets too low
//! for it to work.

use std::sync::RwLock;
use std::time::Duration;

use flume as channel;
use log::{debug, warn};

use crate::drone::ConnState;
use crate::{Error, Result, Tello};

const AUTOPILOT_PERIOD: Duration = Duration::from_millis(25);

/// Maximum vertical displacement for the height autopilot, in decimetres.
pub const AUTO_HEIGHT_LIMIT_DM: i16 = 300;
/// Maximum horizontal displacement for the XY autopilot, in metres.
pub const AUTO_XY_LIMIT_M: f32 = 200.0;
/// Default accuracy attained by the XY autopilot, in metres.
pub const AUTO_XY_TOLERANCE_M: f32 = 0.3;

// Deadband geometry: full throw beyond the fast band, half throw inside it.
const HEIGHT_FAST_BAND_DM: i16 = 4;
const YAW_FAST_BAND_DEG: i16 = 10;
const XY_FAST_BAND_M: f32 = 3.0;

const SPEED_SCALE_MIN: f32 = 0.25;
const SPEED_SCALE_MAX: f32 = 1.0;
const FULL_THROW: f32 = 32767.0;
const HALF_THROW: f32 = 16384.0;

/// Per-axis-group activity flags and the home point, each behind its own
/// lock so one controller can observe cancellation without blocking the
/// receive dispatcher or the other controllers.
#[derive(Default)]
pub(crate) struct NavState {
    pub(crate) height: RwLock<bool>,
    pub(crate) yaw: RwLock<bool>,
    pub(crate) xy: RwLock<XyNav>,
}

#[derive(Default)]
pub(crate) struct XyNav {
    pub(crate) active: bool,
    pub(crate) home_valid: bool,
    pub(crate) home_x: f32,
    pub(crate) home_y: f32,
    pub(crate) home_yaw: i16,
}

fn speed_throws(scale: f32) -> (i16, i16) {
    let scale = scale.clamp(SPEED_SCALE_MIN, SPEED_SCALE_MAX);
    ((FULL_THROW * scale) as i16, (HALF_THROW * scale) as i16)
}

fn normalize_degrees(degrees: i16) -> i16 {
    if degrees < 0 {
        degrees + 360
    } else {
        degrees
    }
}

/// Signed shortest-path distance between two headings in 0..360, in
/// -180..=180.
fn shortest_yaw_delta(target: i16, current: i16) -> i16 {
    let mut delta = target - current;
    if delta > 180 {
        delta -= 360;
    } else if delta < -180 {
        delta += 360;
    }
    delta
}

/// Rotate the world-frame distance-to-target into the drone's body frame.
fn calc_xy_deltas(
    yaw_deg: i16,
    current_x: f32,
    current_y: f32,
    target_x: f32,
    target_y: f32,
) -> (f32, f32) {
    let yaw = f64::from(normalize_degrees(yaw_deg)).to_radians();
    let (sin, cos) = (yaw.sin() as f32, yaw.cos() as f32);

    let dx = cos * (target_x - current_x) - sin * (target_y - current_y);
    let dy = sin * (target_x - current_x) + cos * (target_y - current_y);
    (dx, dy)
}

fn xy_band(delta: f32, tolerance: f32, fast: i16, slow: i16) -> i16 {
    if delta.abs() <= tolerance {
        0
    } else if delta >= XY_FAST_BAND_M {
        fast
    } else if delta <= -XY_FAST_BAND_M {
        -fast
    } else if delta > 0.0 {
        slow
    } else {
        -slow
    }
}

impl Tello {
    /// Start vertical movement to the given height in decimetres (so 10
    /// means one metre), at full speed and exact-match tolerance.
    ///
    /// Returns immediately; a background task navigates until the target
    /// is reached or [cancel_auto_fly_to_height](Tello::cancel_auto_fly_to_height)
    /// is called. Receiving on the returned channel signals completion
    /// either way.
    pub async fn auto_fly_to_height(&self, dm: i16) -> Result<channel::Receiver<bool>> {
        self.auto_fly_to_height_config(dm, 1.0, 0).await
    }

    /// As [auto_fly_to_height](Tello::auto_fly_to_height), with a speed
    /// scale (0.25..1.0) and a tolerance band in decimetres.
    pub async fn auto_fly_to_height_config(
        &self,
        dm: i16,
        speed: f32,
        tolerance: i16,
    ) -> Result<channel::Receiver<bool>> {
        if dm > AUTO_HEIGHT_LIMIT_DM || dm < -AUTO_HEIGHT_LIMIT_DM {
            return Err(Error::NavigationLimitExceeded);
        }
        {
            let mut active = self.nav.height.write().unwrap();
            if *active {
                return Err(Error::AlreadyNavigating);
            }
            *active = true;
        }

        let (fast, slow) = speed_throws(speed);
        let tolerance = tolerance.abs();
        let (done_tx, done_rx) = channel::bounded(1);
        let ctrl = self.ctrl.clone();
        let fd = self.fd.clone();
        let nav = self.nav.clone();

        tokio::spawn(async move {
            loop {
                let stopped = !*nav.height.read().unwrap();
                let connected = ctrl.inner.lock().await.state == ConnState::Connected;
                if stopped || !connected {
                    *nav.height.write().unwrap() = false;
                    ctrl.inner.lock().await.sticks.ly = 0;
                    let _ = ctrl.send_stick_update().await;
                    let _ = done_tx.try_send(true);
                    return;
                }

                // delta is positive when we are too low
                let delta = dm - fd.read().unwrap().fd.height;
                if delta.abs() <= tolerance {
                    // we're there, clean up on the next tick
                    *nav.height.write().unwrap() = false;
                } else {
                    let throttle = if delta > HEIGHT_FAST_BAND_DM {
                        fast
                    } else if delta > 0 {
                        slow
                    } else if delta < -HEIGHT_FAST_BAND_DM {
                        -fast
                    } else {
                        -slow
                    };
                    ctrl.inner.lock().await.sticks.ly = throttle;
                }

                tokio::time::sleep(AUTOPILOT_PERIOD).await;
            }
        });

        Ok(done_rx)
    }

    /// Stop any in-flight height navigation. The drone should stop moving
    /// vertically.
    pub fn cancel_auto_fly_to_height(&self) {
        *self.nav.height.write().unwrap() = false;
    }

    /// Start rotational movement to the given absolute yaw, which must be
    /// between -180 and +180 degrees.
    pub async fn auto_turn_to_yaw(&self, yaw_deg: i16) -> Result<channel::Receiver<bool>> {
        self.auto_turn_to_yaw_config(yaw_deg, 1.0, 0).await
    }

    /// As [auto_turn_to_yaw](Tello::auto_turn_to_yaw), with a speed scale
    /// (0.25..1.0) and a tolerance band in degrees.
    ///
    /// The controller always takes the shortest path around the circle.
    pub async fn auto_turn_to_yaw_config(
        &self,
        yaw_deg: i16,
        speed: f32,
        tolerance: i16,
    ) -> Result<channel::Receiver<bool>> {
        if !(-180..=180).contains(&yaw_deg) {
            return Err(Error::NavigationLimitExceeded);
        }
        let target = normalize_degrees(yaw_deg);
        {
            let mut active = self.nav.yaw.write().unwrap();
            if *active {
                return Err(Error::AlreadyNavigating);
            }
            *active = true;
        }

        let (fast, slow) = speed_throws(speed);
        let tolerance = tolerance.abs();
        let (done_tx, done_rx) = channel::bounded(1);
        let ctrl = self.ctrl.clone();
        let fd = self.fd.clone();
        let nav = self.nav.clone();

        tokio::spawn(async move {
            loop {
                let stopped = !*nav.yaw.read().unwrap();
                let connected = ctrl.inner.lock().await.state == ConnState::Connected;
                if stopped || !connected {
                    *nav.yaw.write().unwrap() = false;
                    ctrl.inner.lock().await.sticks.lx = 0;
                    let _ = ctrl.send_stick_update().await;
                    let _ = done_tx.try_send(true);
                    return;
                }

                let current = normalize_degrees(fd.read().unwrap().fd.imu.yaw);
                let delta = shortest_yaw_delta(target, current);
                if delta.abs() <= tolerance {
                    *nav.yaw.write().unwrap() = false;
                } else {
                    let throw = if delta > YAW_FAST_BAND_DEG {
                        fast
                    } else if delta > 0 {
                        slow
                    } else if delta < -YAW_FAST_BAND_DEG {
                        -fast
                    } else {
                        -slow
                    };
                    ctrl.inner.lock().await.sticks.lx = throw;
                }

                tokio::time::sleep(AUTOPILOT_PERIOD).await;
            }
        });

        Ok(done_rx)
    }

    /// Start rotational movement by the given amount, between -180 and
    /// +180 degrees; negative values rotate anticlockwise.
    pub async fn auto_turn_by_deg(&self, delta_deg: i16) -> Result<channel::Receiver<bool>> {
        if !(-180..=180).contains(&delta_deg) {
            return Err(Error::NavigationLimitExceeded);
        }

        let current = self.fd.read().unwrap().fd.imu.yaw;
        let mut target = current + delta_deg;
        if target > 180 {
            target -= 360;
        } else if target < -180 {
            target += 360;
        }
        self.auto_turn_to_yaw(target).await
    }

    /// Stop any in-flight yaw navigation. The drone should stop rotating.
    pub fn cancel_auto_turn(&self) {
        *self.nav.yaw.write().unwrap() = false;
    }

    /// Capture the current MVO position and IMU yaw as the home point for
    /// horizontal navigation.
    ///
    /// Call it after takeoff to establish an origin, or mid-flight to set
    /// a waypoint. Taking off invalidates any previously set home point.
    pub fn set_home(&self) -> Result<()> {
        let mut xy = self.nav.xy.write().unwrap();
        if xy.active {
            return Err(Error::AlreadyNavigating);
        }
        let state = self.fd.read().unwrap();
        xy.home_x = state.fd.mvo.position_x;
        xy.home_y = state.fd.mvo.position_y;
        xy.home_yaw = normalize_degrees(state.fd.imu.yaw);
        xy.home_valid = true;
        debug!(
            "home set at ({:.2}, {:.2}) facing {}",
            xy.home_x, xy.home_y, xy.home_yaw
        );
        Ok(())
    }

    /// Whether a home point is currently set.
    pub fn is_home_set(&self) -> bool {
        self.nav.xy.read().unwrap().home_valid
    }

    pub(crate) fn invalidate_home(&self) {
        self.nav.xy.write().unwrap().home_valid = false;
    }

    /// Start horizontal movement to (x, y) in metres from the home point,
    /// which must have been set beforehand with [set_home](Tello::set_home).
    pub async fn auto_fly_to_xy(&self, x: f32, y: f32) -> Result<channel::Receiver<bool>> {
        self.auto_fly_to_xy_config(x, y, 1.0, AUTO_XY_TOLERANCE_M).await
    }

    /// As [auto_fly_to_xy](Tello::auto_fly_to_xy), with a speed scale
    /// (0.25..1.0) and a tolerance band in metres.
    ///
    /// The position feed comes from the downward visual-odometry sensor,
    /// which needs adequate light; the navigation cancels itself when the
    /// reported light strength drops too low to trust it.
    pub async fn auto_fly_to_xy_config(
        &self,
        x: f32,
        y: f32,
        speed: f32,
        tolerance: f32,
    ) -> Result<channel::Receiver<bool>> {
        if x.abs() > AUTO_XY_LIMIT_M || y.abs() > AUTO_XY_LIMIT_M {
            return Err(Error::NavigationLimitExceeded);
        }
        let (origin_x, origin_y);
        {
            let mut xy = self.nav.xy.write().unwrap();
            if xy.active {
                return Err(Error::AlreadyNavigating);
            }
            if !xy.home_valid {
                return Err(Error::HomeNotSet);
            }
            xy.active = true;
            origin_x = xy.home_x;
            origin_y = xy.home_y;
        }

        let target_x = x + origin_x;
        let target_y = y + origin_y;
        let (fast, slow) = speed_throws(speed);
        let tolerance = tolerance.abs();
        let (done_tx, done_rx) = channel::bounded(1);
        let ctrl = self.ctrl.clone();
        let fd = self.fd.clone();
        let nav = self.nav.clone();

        tokio::spawn(async move {
            loop {
                let stopped = !nav.xy.read().unwrap().active;
                let connected = ctrl.inner.lock().await.state == ConnState::Connected;
                if stopped || !connected {
                    nav.xy.write().unwrap().active = false;
                    {
                        let mut inner = ctrl.inner.lock().await;
                        inner.sticks.rx = 0;
                        inner.sticks.ry = 0;
                    }
                    let _ = ctrl.send_stick_update().await;
                    let _ = done_tx.try_send(true);
                    return;
                }

                let (light, yaw, current_x, current_y) = {
                    let state = fd.read().unwrap();
                    (
                        state.fd.light_strength,
                        state.fd.imu.yaw,
                        state.fd.mvo.position_x,
                        state.fd.mvo.position_y,
                    )
                };
                if light <= 1 {
                    warn!("light too low for visual odometry, cancelling XY navigation");
                    nav.xy.write().unwrap().active = false;
                    continue;
                }

                let (dx, dy) = calc_xy_deltas(yaw, current_x, current_y, target_x, target_y);
                let roll = xy_band(dx, tolerance, fast, slow);
                let pitch = xy_band(dy, tolerance, fast, slow);
                {
                    let mut inner = ctrl.inner.lock().await;
                    inner.sticks.rx = roll;
                    inner.sticks.ry = pitch;
                }
                if roll == 0 && pitch == 0 {
                    // inside the tolerance band on both axes
                    nav.xy.write().unwrap().active = false;
                }

                tokio::time::sleep(AUTOPILOT_PERIOD).await;
            }
        });

        Ok(done_rx)
    }

    /// Stop any in-flight XY navigation. The drone should stop.
    pub fn cancel_auto_fly_to_xy(&self) {
        self.nav.xy.write().unwrap().active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_path_never_exceeds_half_a_turn() {
        // a drone at 190 (i.e. -170) asked for 170 should turn -20, not +340
        assert_eq!(shortest_yaw_delta(170, 190), -20);
        assert_eq!(shortest_yaw_delta(190, 170), 20);
        assert_eq!(shortest_yaw_delta(350, 10), -20);
        assert_eq!(shortest_yaw_delta(10, 350), 20);
        assert_eq!(shortest_yaw_delta(180, 0), 180);
        assert_eq!(shortest_yaw_delta(0, 0), 0);
    }

    #[test]
    fn negative_headings_normalize_into_the_circle() {
        assert_eq!(normalize_degrees(-170), 190);
        assert_eq!(normalize_degrees(0), 0);
        assert_eq!(normalize_degrees(45), 45);
    }

    #[test]
    fn level_yaw_leaves_deltas_in_world_frame() {
        let (dx, dy) = calc_xy_deltas(0, 1.0, 2.0, 4.0, 6.0);
        assert!((dx - 3.0).abs() < 1e-5);
        assert!((dy - 4.0).abs() < 1e-5);
    }

    #[test]
    fn quarter_turn_swaps_the_axes() {
        let (dx, dy) = calc_xy_deltas(90, 0.0, 0.0, 3.0, 4.0);
        assert!((dx - -4.0).abs() < 1e-4);
        assert!((dy - 3.0).abs() < 1e-4);
    }

    #[test]
    fn xy_bands_cover_stop_slow_and_fast() {
        let (fast, slow) = speed_throws(1.0);
        assert_eq!(xy_band(0.1, 0.3, fast, slow), 0);
        assert_eq!(xy_band(-0.3, 0.3, fast, slow), 0);
        assert_eq!(xy_band(1.0, 0.3, fast, slow), slow);
        assert_eq!(xy_band(-1.0, 0.3, fast, slow), -slow);
        assert_eq!(xy_band(3.5, 0.3, fast, slow), fast);
        assert_eq!(xy_band(-3.5, 0.3, fast, slow), -fast);
    }

    #[test]
    fn speed_scale_is_clamped() {
        assert_eq!(speed_throws(1.0), (32767, 16384));
        assert_eq!(speed_throws(0.5), (16383, 8192));
        assert_eq!(speed_throws(5.0), (32767, 16384));
        assert_eq!(speed_throws(0.0), ((32767.0f32 * 0.25) as i16, 4096));
    }
}
