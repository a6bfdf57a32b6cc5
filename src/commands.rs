//! # One-shot commands
//!
//! Every command here serializes a single frame under the control writer
//! lock (taking a fresh sequence number) and returns as soon as the
//! datagram has been handed to the socket. The protocol is fire-and-forget:
//! there is no per-command acknowledgement, though some commands provoke a
//! reply that the receive dispatcher folds into the flight data; the
//! `get_*` queries work that way.
//!
//! Commands fail with [Error::NotConnected](crate::Error::NotConnected)
//! unless the control channel is connected.

use crate::drone::Control;
use crate::packet::{
    FlipType, SmartVideoCmd, VideoBitrate, MSG_DO_BOUNCE, MSG_DO_FLIP, MSG_DO_LAND,
    MSG_DO_PALM_LAND, MSG_DO_SMART_VIDEO, MSG_DO_TAKEOFF, MSG_DO_THROW_TAKEOFF,
    MSG_QUERY_ATTITUDE, MSG_QUERY_HEIGHT_LIMIT, MSG_QUERY_LOW_BATT_THRESH, MSG_QUERY_SSID,
    MSG_QUERY_VERSION, MSG_QUERY_VIDEO_BITRATE, MSG_QUERY_VIDEO_SPSPPS, MSG_SET_HEIGHT_LIMIT,
    MSG_SET_LOW_BATT_THRESH, MSG_SET_VIDEO_BITRATE, MSG_SWITCH_PIC_VIDEO, PT_DATA2, PT_FLIP,
    PT_GET, PT_SET,
};
use crate::sticks::StickMessage;
use crate::{Result, Tello};

/// Full speed for a 100% motion request.
const MOTION_UNIT: i16 = 327;

/// # Flight primitives
impl Tello {
    /// Send a normal takeoff request. Any previously set home point is
    /// invalidated until the drone is flying again.
    pub async fn take_off(&self) -> Result<()> {
        self.invalidate_home();
        self.send_packet(PT_SET, MSG_DO_TAKEOFF, Vec::new()).await
    }

    /// Initiate a 'throw and go' launch. Any previously set home point is
    /// invalidated.
    pub async fn throw_take_off(&self) -> Result<()> {
        self.invalidate_home();
        self.send_packet(PT_GET, MSG_DO_THROW_TAKEOFF, Vec::new())
            .await
    }

    /// Send a normal land request.
    pub async fn land(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_LAND, vec![0]).await
    }

    /// Cancel a land request in progress.
    pub async fn stop_landing(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_LAND, vec![1]).await
    }

    /// Initiate a palm landing: the drone settles onto a hand held below it.
    pub async fn palm_land(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_PALM_LAND, vec![0]).await
    }

    /// Toggle the drone's bouncing mode.
    pub async fn bounce(&self) -> Result<()> {
        let mut inner = self.ctrl.inner.lock().await;
        let starting = !inner.bouncing;
        let payload = vec![if starting { 0x30 } else { 0x31 }];
        Control::send_locked(&mut inner, PT_SET, MSG_DO_BOUNCE, payload).await?;
        inner.bouncing = starting;
        Ok(())
    }

    /// Perform a flip in the given direction.
    pub async fn flip(&self, direction: FlipType) -> Result<()> {
        self.send_packet(PT_FLIP, MSG_DO_FLIP, vec![direction as u8])
            .await
    }

    /// Flip forwards.
    pub async fn forward_flip(&self) -> Result<()> {
        self.flip(FlipType::Forward).await
    }

    /// Flip backwards.
    pub async fn back_flip(&self) -> Result<()> {
        self.flip(FlipType::Backward).await
    }

    /// Flip to the left.
    pub async fn left_flip(&self) -> Result<()> {
        self.flip(FlipType::Left).await
    }

    /// Flip to the right.
    pub async fn right_flip(&self) -> Result<()> {
        self.flip(FlipType::Right).await
    }

    /// Begin a preprogrammed 'smart video' flight manoeuvre.
    pub async fn start_smart_video(&self, cmd: SmartVideoCmd) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_SMART_VIDEO, vec![cmd as u8 | 0x01])
            .await
    }

    /// End a preprogrammed 'smart video' flight manoeuvre.
    pub async fn stop_smart_video(&self, cmd: SmartVideoCmd) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_SMART_VIDEO, vec![cmd as u8])
            .await
    }
}

/// # Motion macros
///
/// Conveniences over the latched stick axes. Like
/// [update_sticks](Tello::update_sticks) they only set values for the
/// keep-alive sender to transmit, so the drone keeps doing this until told
/// otherwise.
impl Tello {
    /// Set all sticks to neutral, which should halt all motion. Useful as
    /// a panic action.
    pub async fn hover(&self) {
        self.update_sticks(&StickMessage::default()).await;
    }

    /// Start moving forward at a given speed between 0 and 100.
    pub async fn forward(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            ry: motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start moving backward at a given speed between 0 and 100.
    pub async fn backward(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            ry: -motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start moving left at a given speed between 0 and 100.
    pub async fn left(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            rx: -motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start moving right at a given speed between 0 and 100.
    pub async fn right(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            rx: motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start moving up at a given speed between 0 and 100.
    pub async fn up(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            ly: motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start moving down at a given speed between 0 and 100.
    pub async fn down(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            ly: -motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start rotating clockwise at a given speed between 0 and 100.
    pub async fn clockwise(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            lx: motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Start rotating anticlockwise at a given speed between 0 and 100.
    pub async fn anticlockwise(&self, pct: u8) {
        self.update_sticks(&StickMessage {
            lx: -motion_speed(pct),
            ..Default::default()
        })
        .await;
    }

    /// Select the 'fast' (sports) or 'slow' (normal) flight mode. The flag
    /// travels with every stick update rather than as its own command.
    pub async fn set_sports_mode(&self, sports: bool) {
        self.ctrl.inner.lock().await.sports_mode = sports;
    }

    /// Shorthand for [set_sports_mode(true)](Tello::set_sports_mode).
    pub async fn set_fast_mode(&self) {
        self.set_sports_mode(true).await;
    }

    /// Shorthand for [set_sports_mode(false)](Tello::set_sports_mode).
    pub async fn set_slow_mode(&self) {
        self.set_sports_mode(false).await;
    }
}

/// # Queries and settings
impl Tello {
    /// Ask for the drone's SSID; the answer lands in
    /// [FlightData::ssid](crate::FlightData::ssid).
    pub async fn get_ssid(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_SSID, Vec::new()).await
    }

    /// Ask for the firmware version; the answer lands in
    /// [FlightData::version](crate::FlightData::version).
    pub async fn get_version(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_VERSION, Vec::new()).await
    }

    /// Ask for the height limit; the answer lands in
    /// [FlightData::max_height](crate::FlightData::max_height).
    pub async fn get_max_height(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_HEIGHT_LIMIT, Vec::new())
            .await
    }

    /// Ask for the low-battery warning threshold; the answer lands in
    /// [FlightData::low_battery_threshold](crate::FlightData::low_battery_threshold).
    pub async fn get_low_battery_threshold(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_LOW_BATT_THRESH, Vec::new())
            .await
    }

    /// Ask for the current video bitrate setting; the answer lands in
    /// [FlightData::video_bitrate](crate::FlightData::video_bitrate).
    pub async fn get_video_bitrate(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_VIDEO_BITRATE, Vec::new())
            .await
    }

    /// Ask for the drone's attitude report.
    pub async fn query_attitude(&self) -> Result<()> {
        self.send_packet(PT_GET, MSG_QUERY_ATTITUDE, Vec::new())
            .await
    }

    /// Set the low-battery warning threshold, as a battery percentage.
    pub async fn set_low_battery_threshold(&self, pct: u8) -> Result<()> {
        self.send_packet(PT_SET, MSG_SET_LOW_BATT_THRESH, vec![pct])
            .await
    }

    /// Set the height limit, in decimetres.
    pub async fn set_height_limit(&self, dm: u16) -> Result<()> {
        self.send_packet(PT_SET, MSG_SET_HEIGHT_LIMIT, dm.to_le_bytes().to_vec())
            .await
    }
}

/// # Video settings
impl Tello {
    /// Ask the drone to start sending video frames to the port announced
    /// at connection time. See [video_connect](Tello::video_connect) for
    /// receiving them.
    ///
    /// The drone stops sending after a while without consumers; simply
    /// call this again to restart the stream.
    pub async fn start_video(&self) -> Result<()> {
        self.ctrl
            .send_unsequenced(PT_DATA2, MSG_QUERY_VIDEO_SPSPPS, Vec::new())
            .await
    }

    /// Ask the drone to use the given bitrate (or auto) for video encoding.
    pub async fn set_video_bitrate(&self, vbr: VideoBitrate) -> Result<()> {
        self.send_packet(PT_SET, MSG_SET_VIDEO_BITRATE, vec![vbr as u8])
            .await
    }

    /// Switch video to the normal 4:3 field of view.
    pub async fn set_video_normal(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_SWITCH_PIC_VIDEO, vec![0]).await
    }

    /// Switch video to the wide 16:9 field of view.
    pub async fn set_video_wide(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_SWITCH_PIC_VIDEO, vec![1]).await
    }
}

fn motion_speed(pct: u8) -> i16 {
    i16::from(pct.min(100)) * MOTION_UNIT
}
