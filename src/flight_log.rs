//! # Embedded flight-log decoding
//!
//! Inside a `LogData` message the drone ships a second, nested record
//! format: records delimited by an ASCII `U` separator, each with its own
//! length, type and single-byte XOR key. The record body (header included)
//! is XOR-obfuscated against the key. Only two record types feed the
//! telemetry store: motion-visual-odometry (position/velocity) and IMU
//! (orientation quaternion and temperature).

use crate::flight_data::{quat_to_yaw_deg, FlightData};

pub(crate) const LOG_RECORD_SEPARATOR: u8 = 0x55;

pub(crate) const LOG_REC_NEW_MVO: u16 = 0x001d;
pub(crate) const LOG_REC_IMU: u16 = 0x0800;

// Validity flags at offset 86 of a decoded MVO record
const LOG_VALID_VEL_X: u8 = 0x01;
const LOG_VALID_VEL_Y: u8 = 0x02;
const LOG_VALID_VEL_Z: u8 = 0x04;
const LOG_VALID_POS_X: u8 = 0x10;
const LOG_VALID_POS_Y: u8 = 0x20;
const LOG_VALID_POS_Z: u8 = 0x40;

// Field offsets within a decoded record, counted from the separator
const MVO_FLAGS_OFFSET: usize = 86;
const MVO_VEL_X_OFFSET: usize = 12;
const MVO_VEL_Y_OFFSET: usize = 14;
const MVO_VEL_Z_OFFSET: usize = 16;
const MVO_POS_Y_OFFSET: usize = 20;
const MVO_POS_X_OFFSET: usize = 24;
const MVO_POS_Z_OFFSET: usize = 28;
const IMU_QUAT_W_OFFSET: usize = 58;
const IMU_QUAT_X_OFFSET: usize = 62;
const IMU_QUAT_Y_OFFSET: usize = 66;
const IMU_QUAT_Z_OFFSET: usize = 70;
const IMU_TEMPERATURE_OFFSET: usize = 116;

fn le_i16(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn le_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Walk the records of a `LogData` payload and apply the MVO and IMU
/// updates to the telemetry snapshot. Decode problems are logged and the
/// rest of the payload is skipped; they are never fatal.
pub(crate) fn parse_log_packet(fd: &mut FlightData, data: &[u8]) {
    if data.len() < 2 {
        return;
    }
    let mut pos = 1;
    while pos + 6 < data.len() {
        if data[pos] != LOG_RECORD_SEPARATOR {
            log::debug!("bad log record separator 0x{:02x}", data[pos]);
            break;
        }
        let rec_len = le_i16(data, pos + 1) as u16 as usize;
        if rec_len < 7 {
            log::debug!("implausible log record length {}", rec_len);
            break;
        }
        let rec_type = le_i16(data, pos + 4) as u16;
        let xor_val = data[pos + 6];

        let end = (pos + rec_len).min(data.len());
        let decoded: Vec<u8> = data[pos..end].iter().map(|b| b ^ xor_val).collect();

        match rec_type {
            LOG_REC_NEW_MVO => apply_mvo_record(fd, &decoded),
            LOG_REC_IMU => apply_imu_record(fd, &decoded),
            _ => log::debug!("skipping log record type 0x{:04x}", rec_type),
        }

        pos += rec_len;
    }
}

/// MVO fields are flag-gated: the drone only vouches for the axes whose
/// validity bit is set, so unset axes keep their previous value. Note that
/// position Y precedes X in the decoded buffer.
fn apply_mvo_record(fd: &mut FlightData, rec: &[u8]) {
    if rec.len() <= MVO_FLAGS_OFFSET {
        log::debug!("short MVO record ({} bytes)", rec.len());
        return;
    }
    let flags = rec[MVO_FLAGS_OFFSET];

    if flags & LOG_VALID_VEL_X != 0 {
        fd.mvo.velocity_x = le_i16(rec, MVO_VEL_X_OFFSET);
    }
    if flags & LOG_VALID_VEL_Y != 0 {
        fd.mvo.velocity_y = le_i16(rec, MVO_VEL_Y_OFFSET);
    }
    if flags & LOG_VALID_VEL_Z != 0 {
        fd.mvo.velocity_z = -le_i16(rec, MVO_VEL_Z_OFFSET);
    }
    if flags & LOG_VALID_POS_X != 0 {
        fd.mvo.position_x = le_f32(rec, MVO_POS_X_OFFSET);
    }
    if flags & LOG_VALID_POS_Y != 0 {
        fd.mvo.position_y = le_f32(rec, MVO_POS_Y_OFFSET);
    }
    if flags & LOG_VALID_POS_Z != 0 {
        fd.mvo.position_z = le_f32(rec, MVO_POS_Z_OFFSET);
    }
}

fn apply_imu_record(fd: &mut FlightData, rec: &[u8]) {
    if rec.len() < IMU_TEMPERATURE_OFFSET + 2 {
        log::debug!("short IMU record ({} bytes)", rec.len());
        return;
    }
    fd.imu.quaternion_w = le_f32(rec, IMU_QUAT_W_OFFSET);
    fd.imu.quaternion_x = le_f32(rec, IMU_QUAT_X_OFFSET);
    fd.imu.quaternion_y = le_f32(rec, IMU_QUAT_Y_OFFSET);
    fd.imu.quaternion_z = le_f32(rec, IMU_QUAT_Z_OFFSET);
    fd.imu.temperature = le_i16(rec, IMU_TEMPERATURE_OFFSET) / 100;
    fd.imu.yaw = quat_to_yaw_deg(
        fd.imu.quaternion_x,
        fd.imu.quaternion_y,
        fd.imu.quaternion_z,
        fd.imu.quaternion_w,
    );
}
