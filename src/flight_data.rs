//! # Flight data
//!
//! [FlightData] is the library's amalgamated store of the latest telemetry.
//! Different fields arrive at different rates: the 24-byte flight-status
//! payload carries the bulk, while wifi strength, light strength, query
//! replies and the embedded flight log fill in the rest. Only the receive
//! dispatcher writes these fields; [get_flight_data](crate::Tello::get_flight_data)
//! hands out consistent snapshots.

use std::time::Instant;

use crate::packet::VideoBitrate;

/// Motion-visual-odometry position and velocity, decoded from log packets.
///
/// Positions are metres (floats), velocities are deciunits (signed 16-bit).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Mvo {
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub velocity_x: i16,
    pub velocity_y: i16,
    pub velocity_z: i16,
}

/// Inertial-measurement-unit orientation, decoded from log packets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Imu {
    pub quaternion_w: f32,
    pub quaternion_x: f32,
    pub quaternion_y: f32,
    pub quaternion_z: f32,
    /// Degrees Celsius.
    pub temperature: i16,
    /// Derived from the quaternion, integer degrees in -180..180.
    pub yaw: i16,
}

/// Our current knowledge of the drone's state.
#[derive(Debug, Clone, Default)]
pub struct FlightData {
    pub battery_critical: bool,
    pub battery_low: bool,
    pub battery_milli_volts: i16,
    pub battery_percentage: i8,
    pub battery_state: bool,
    pub camera_state: u8,
    pub down_visual_state: bool,
    pub drone_fly_time_left: i16,
    pub drone_hover: bool,
    pub east_speed: i16,
    pub electrical_machinery_state: u8,
    pub em_open: bool,
    pub factory_mode: bool,
    pub flying: bool,
    pub fly_mode: u8,
    pub fly_time: i16,
    pub front_in: bool,
    pub front_lsc: bool,
    pub front_out: bool,
    pub gravity_state: bool,
    /// Decimetres.
    pub height: i16,
    pub imu: Imu,
    pub imu_calibration_state: i8,
    pub imu_state: bool,
    pub light_strength: u8,
    /// When the last light-strength beacon arrived; doubles as the
    /// connection liveness marker.
    pub light_strength_updated: Option<Instant>,
    pub low_battery_threshold: u8,
    pub max_height: u8,
    pub mvo: Mvo,
    pub north_speed: i16,
    pub on_ground: bool,
    pub outage_recording: bool,
    pub over_temp: bool,
    pub power_state: bool,
    pub pressure_state: bool,
    pub smart_video_exit_mode: i16,
    pub ssid: String,
    pub throw_fly_timer: i8,
    pub version: String,
    pub vertical_speed: i16,
    pub video_bitrate: VideoBitrate,
    pub wifi_interference: u8,
    pub wifi_strength: u8,
    pub wind_state: bool,
}

impl FlightData {
    /// Apply a 24-byte flight-status payload to this snapshot.
    pub(crate) fn update_from_status(&mut self, pl: &[u8]) {
        if pl.len() < 24 {
            log::warn!("short flight status payload ({} bytes)", pl.len());
            return;
        }

        self.height = i16::from_le_bytes([pl[0], pl[1]]);
        self.north_speed = i16::from_le_bytes([pl[2], pl[3]]);
        self.east_speed = i16::from_le_bytes([pl[4], pl[5]]);
        self.vertical_speed = -i16::from_le_bytes([pl[6], pl[7]]);
        self.fly_time = i16::from_le_bytes([pl[8], pl[9]]);

        self.imu_state = pl[10] & 1 == 1;
        self.pressure_state = pl[10] >> 1 & 1 == 1;
        self.down_visual_state = pl[10] >> 2 & 1 == 1;
        self.power_state = pl[10] >> 3 & 1 == 1;
        self.battery_state = pl[10] >> 4 & 1 == 1;
        self.gravity_state = pl[10] >> 5 & 1 == 1;
        // bit 6 unknown
        self.wind_state = pl[10] >> 7 & 1 == 1;

        self.imu_calibration_state = pl[11] as i8;
        self.battery_percentage = pl[12] as i8;
        self.drone_fly_time_left = i16::from_le_bytes([pl[13], pl[14]]);
        self.battery_milli_volts = i16::from_le_bytes([pl[15], pl[16]]);

        self.flying = pl[17] & 1 == 1;
        self.on_ground = pl[17] >> 1 & 1 == 1;
        self.em_open = pl[17] >> 2 & 1 == 1;
        self.drone_hover = pl[17] >> 3 & 1 == 1;
        self.outage_recording = pl[17] >> 4 & 1 == 1;
        self.battery_low = pl[17] >> 5 & 1 == 1;
        self.battery_critical = pl[17] >> 6 & 1 == 1;
        self.factory_mode = pl[17] >> 7 & 1 == 1;

        self.fly_mode = pl[18];
        self.throw_fly_timer = pl[19] as i8;
        self.camera_state = pl[20];
        self.electrical_machinery_state = pl[21];

        self.front_in = pl[22] & 1 == 1;
        self.front_out = pl[22] >> 1 & 1 == 1;
        self.front_lsc = pl[22] >> 2 & 1 == 1;
        self.over_temp = pl[23] & 1 == 1;
    }
}

/// Convert a quaternion to (pitch, roll, yaw) Euler angles in integer
/// degrees, using the standard aerospace conversion. The sine of pitch is
/// clamped to [-1, 1] so slightly denormalized quaternions stay finite.
pub fn quat_to_euler_deg(qx: f32, qy: f32, qz: f32, qw: f32) -> (i32, i32, i32) {
    let (x, y, z, w) = (
        f64::from(qx),
        f64::from(qy),
        f64::from(qz),
        f64::from(qw),
    );

    let sin_pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
    let pitch = sin_pitch.asin().to_degrees();
    let roll = (2.0 * (w * x + y * z))
        .atan2(1.0 - 2.0 * (x * x + y * y))
        .to_degrees();
    let yaw = (2.0 * (w * z + x * y))
        .atan2(1.0 - 2.0 * (y * y + z * z))
        .to_degrees();

    (
        pitch.round() as i32,
        roll.round() as i32,
        yaw.round() as i32,
    )
}

/// Fast path for the one Euler angle the autopilots care about.
pub(crate) fn quat_to_yaw_deg(qx: f32, qy: f32, qz: f32, qw: f32) -> i16 {
    let (x, y, z, w) = (
        f64::from(qx),
        f64::from(qy),
        f64::from(qz),
        f64::from(qw),
    );
    (2.0 * (w * z + x * y))
        .atan2(1.0 - 2.0 * (y * y + z * z))
        .to_degrees()
        .round() as i16
}
