//! # Tello drone client library
//!
//! This crate speaks the Ryze/DJI Tello's native binary protocol over two
//! UDP sockets: a bidirectional control channel carrying framed commands
//! and telemetry, and a one-way video channel carrying raw H.264 frames.
//! No app, no SDK mode: this is the same low-level protocol the official
//! app uses, which exposes the full flight envelope (flips, palm landing,
//! picture download, the embedded flight log) and continuous stick
//! control.
//!
//! The entry point is [Tello]. Connecting starts a receive dispatcher and
//! a 40 ms keep-alive/stick sender in the background; from then on the
//! handle can be shared freely between tasks:
//!
//! ``` no_run
//! use std::time::Duration;
//! use tello_lib::Tello;
//!
//! #[tokio::main]
//! async fn main() -> tello_lib::Result<()> {
//!     let drone = Tello::new();
//!     drone.connect().await?;
//!
//!     drone.take_off().await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!
//!     // climb to 1.5 m and face east, concurrently
//!     let climb = drone.auto_fly_to_height(15).await?;
//!     let turn = drone.auto_turn_to_yaw(90).await?;
//!     climb.recv_async().await.ok();
//!     turn.recv_async().await.ok();
//!
//!     drone.land().await?;
//!     drone.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Safety of flight
//!
//! The drone enters failsafe and lands when keep-alives stop arriving, and
//! this library mirrors that: if the drone's beacons stop for 5 seconds the
//! connection is marked dead and the keep-alive sender exits. Commands are
//! fire-and-forget UDP; anything critical should be confirmed through the
//! telemetry in [FlightData].

mod autopilot;
mod commands;
mod crc;
mod drone;
mod error;
mod flight_data;
mod flight_log;
pub mod packet;
mod pictures;
mod sticks;

pub use crate::autopilot::{AUTO_HEIGHT_LIMIT_DM, AUTO_XY_LIMIT_M, AUTO_XY_TOLERANCE_M};
pub use crate::drone::{
    Tello, DEFAULT_DRONE_ADDR, DEFAULT_DRONE_CONTROL_PORT, DEFAULT_LOCAL_CONTROL_PORT,
    DEFAULT_LOCAL_VIDEO_PORT,
};
pub use crate::error::{Error, Result};
pub use crate::flight_data::{quat_to_euler_deg, FlightData, Imu, Mvo};
pub use crate::packet::{FlipType, SmartVideoCmd, VideoBitrate};
pub use crate::sticks::StickMessage;
