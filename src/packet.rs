//! # Framing for the Tello binary control protocol
//!
//! Every control datagram except the initial connection handshake is a
//! variable-length frame: a fixed `0xCC` header byte, a 13-bit frame length,
//! a CRC-8 over the first three bytes, a direction/type byte, a 16-bit
//! message ID, a 16-bit sequence number, an optional payload and a trailing
//! CRC-16. All multi-byte fields are little-endian.
//!
//! The message-ID catalog below is the set of messages observed on the wire;
//! unknown IDs are tolerated and logged by the receive dispatcher.

use crate::crc::{calculate_crc16, calculate_crc8};
use crate::{Error, Result};

/// Leading byte of every framed control message.
pub const MSG_HDR: u8 = 0xcc;

/// Smallest possible raw frame: header through CRC-16 with no payload.
pub const MIN_PKT_SIZE: usize = 11;

// Packet types, 3 and 7 unobserved
pub const PT_EXTENDED: u8 = 0;
pub const PT_GET: u8 = 1;
pub const PT_DATA1: u8 = 2;
pub const PT_DATA2: u8 = 4;
pub const PT_SET: u8 = 5;
pub const PT_FLIP: u8 = 6;

// Message IDs
pub const MSG_DO_CONNECT: u16 = 0x0001;
pub const MSG_CONNECTED: u16 = 0x0002;
pub const MSG_QUERY_SSID: u16 = 0x0011;
pub const MSG_SET_SSID: u16 = 0x0012;
pub const MSG_QUERY_SSID_PASS: u16 = 0x0013;
pub const MSG_SET_SSID_PASS: u16 = 0x0014;
pub const MSG_QUERY_WIFI_REGION: u16 = 0x0015;
pub const MSG_SET_WIFI_REGION: u16 = 0x0016;
pub const MSG_WIFI_STRENGTH: u16 = 0x001a;
pub const MSG_SET_VIDEO_BITRATE: u16 = 0x0020;
pub const MSG_SET_DYN_ADJ_RATE: u16 = 0x0021;
pub const MSG_EIS_SETTING: u16 = 0x0024;
pub const MSG_QUERY_VIDEO_SPSPPS: u16 = 0x0025;
pub const MSG_QUERY_VIDEO_BITRATE: u16 = 0x0028;
pub const MSG_DO_TAKE_PIC: u16 = 0x0030;
pub const MSG_SWITCH_PIC_VIDEO: u16 = 0x0031;
pub const MSG_DO_START_REC: u16 = 0x0032;
pub const MSG_EXPOSURE_VALS: u16 = 0x0034;
pub const MSG_LIGHT_STRENGTH: u16 = 0x0035;
pub const MSG_QUERY_JPEG_QUALITY: u16 = 0x0037;
pub const MSG_ERROR_1: u16 = 0x0043;
pub const MSG_ERROR_2: u16 = 0x0044;
pub const MSG_QUERY_VERSION: u16 = 0x0045;
pub const MSG_SET_DATE_TIME: u16 = 0x0046;
pub const MSG_QUERY_ACTIVATION_TIME: u16 = 0x0047;
pub const MSG_QUERY_LOADER_VERSION: u16 = 0x0049;
pub const MSG_SET_STICK: u16 = 0x0050;
pub const MSG_DO_TAKEOFF: u16 = 0x0054;
pub const MSG_DO_LAND: u16 = 0x0055;
pub const MSG_FLIGHT_STATUS: u16 = 0x0056;
pub const MSG_SET_HEIGHT_LIMIT: u16 = 0x0058;
pub const MSG_DO_FLIP: u16 = 0x005c;
pub const MSG_DO_THROW_TAKEOFF: u16 = 0x005d;
pub const MSG_DO_PALM_LAND: u16 = 0x005e;
pub const MSG_FILE_SIZE: u16 = 0x0062;
pub const MSG_FILE_DATA: u16 = 0x0063;
pub const MSG_FILE_DONE: u16 = 0x0064;
pub const MSG_DO_SMART_VIDEO: u16 = 0x0080;
pub const MSG_SMART_VIDEO_STATUS: u16 = 0x0081;
pub const MSG_LOG_HEADER: u16 = 0x1050;
pub const MSG_LOG_DATA: u16 = 0x1051;
pub const MSG_LOG_CONFIG: u16 = 0x1052;
pub const MSG_DO_BOUNCE: u16 = 0x1053;
pub const MSG_DO_CALIBRATION: u16 = 0x1054;
pub const MSG_SET_LOW_BATT_THRESH: u16 = 0x1055;
pub const MSG_QUERY_HEIGHT_LIMIT: u16 = 0x1056;
pub const MSG_QUERY_LOW_BATT_THRESH: u16 = 0x1057;
pub const MSG_SET_ATTITUDE: u16 = 0x1058;
pub const MSG_QUERY_ATTITUDE: u16 = 0x1059;

/// Directions for the [flip](crate::Tello::flip) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlipType {
    Forward = 0,
    Left = 1,
    Backward = 2,
    Right = 3,
    ForwardLeft = 4,
    BackwardLeft = 5,
    BackwardRight = 6,
    ForwardRight = 7,
}

/// Preprogrammed 'smart video' manoeuvres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SmartVideoCmd {
    /// Slowly rotate around 360 degrees.
    Sv360 = 1 << 2,
    /// Circle around a point in front of the drone.
    SvCircle = 2 << 2,
    /// Perform the 'up and out' manoeuvre.
    SvUpOut = 3 << 2,
}

/// Video bit rates accepted by [set_video_bitrate](crate::Tello::set_video_bitrate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum VideoBitrate {
    /// Let the drone choose the best rate for the current connection.
    #[default]
    Auto = 0,
    Vbr1M = 1,
    Vbr1M5 = 2,
    Vbr2M = 3,
    Vbr3M = 4,
    Vbr4M = 5,
}

impl From<u8> for VideoBitrate {
    fn from(code: u8) -> Self {
        match code {
            1 => VideoBitrate::Vbr1M,
            2 => VideoBitrate::Vbr1M5,
            3 => VideoBitrate::Vbr2M,
            4 => VideoBitrate::Vbr3M,
            5 => VideoBitrate::Vbr4M,
            _ => VideoBitrate::Auto,
        }
    }
}

/// A decoded control frame.
///
/// The direction flags and packet type/subtype are carried in a single byte
/// on the wire; they are kept as separate fields here. Payload CRCs are
/// recomputed on encode and verified on decode, so they do not appear as
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub from_drone: bool,
    pub to_drone: bool,
    pub packet_type: u8,
    pub packet_subtype: u8,
    pub message_id: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// A client-to-drone packet with the given type, message ID and payload.
    pub fn new(packet_type: u8, message_id: u16, sequence: u16, payload: Vec<u8>) -> Self {
        Self {
            from_drone: false,
            to_drone: true,
            packet_type,
            packet_subtype: 0,
            message_id,
            sequence,
            payload,
        }
    }

    /// Serialize into raw frame bytes, computing both CRCs.
    pub fn to_buffer(&self) -> Vec<u8> {
        let packet_size = MIN_PKT_SIZE + self.payload.len();
        let mut buff = vec![0u8; packet_size];

        buff[0] = MSG_HDR;
        buff[1] = (packet_size << 3) as u8;
        buff[2] = (packet_size >> 5) as u8;
        buff[3] = calculate_crc8(&buff[0..3]);
        buff[4] = self.packet_subtype | (self.packet_type << 3);
        if self.to_drone {
            buff[4] |= 0x40;
        }
        if self.from_drone {
            buff[4] |= 0x80;
        }
        buff[5] = self.message_id as u8;
        buff[6] = (self.message_id >> 8) as u8;
        buff[7] = self.sequence as u8;
        buff[8] = (self.sequence >> 8) as u8;
        buff[9..9 + self.payload.len()].copy_from_slice(&self.payload);

        let crc16 = calculate_crc16(&buff[0..packet_size - 2]);
        buff[packet_size - 2] = crc16 as u8;
        buff[packet_size - 1] = (crc16 >> 8) as u8;

        buff
    }

    /// Decode a raw frame.
    ///
    /// A frame that does not start with [MSG_HDR] or whose declared length
    /// does not fit the buffer is rejected. A CRC mismatch is logged but the
    /// frame is still decoded; the drone's own frames occasionally disagree
    /// with the published tables on some firmware revisions.
    pub fn from_buffer(buff: &[u8]) -> Result<Packet> {
        if buff.len() < MIN_PKT_SIZE {
            return Err(Error::ProtocolError(format!(
                "frame too short ({} bytes)",
                buff.len()
            )));
        }
        if buff[0] != MSG_HDR {
            return Err(Error::ProtocolError(format!(
                "unexpected header byte 0x{:02x}",
                buff[0]
            )));
        }

        let size13 = ((buff[1] as u16 | (buff[2] as u16) << 8) >> 3) as usize;
        if size13 < MIN_PKT_SIZE || size13 > buff.len() {
            return Err(Error::ProtocolError(format!(
                "declared frame size {} does not fit buffer of {}",
                size13,
                buff.len()
            )));
        }

        if buff[3] != calculate_crc8(&buff[0..3]) {
            log::warn!("header CRC mismatch on incoming frame");
        }
        let crc16 = buff[size13 - 2] as u16 | (buff[size13 - 1] as u16) << 8;
        if crc16 != calculate_crc16(&buff[0..size13 - 2]) {
            log::warn!("frame CRC mismatch on incoming frame");
        }

        Ok(Packet {
            from_drone: buff[4] & 0x80 != 0,
            to_drone: buff[4] & 0x40 != 0,
            packet_type: (buff[4] >> 3) & 0x07,
            packet_subtype: buff[4] & 0x07,
            message_id: buff[5] as u16 | (buff[6] as u16) << 8,
            sequence: buff[7] as u16 | (buff[8] as u16) << 8,
            payload: buff[9..size13 - 2].to_vec(),
        })
    }
}

/// Expected prefix of the drone's reply to a connection request.
pub const CONNECTION_ACK: &[u8] = b"conn_ack:";

/// Total length of the connection-acknowledgement datagram.
pub const CONNECTION_ACK_LEN: usize = 11;

/// The initial connection request.
///
/// This is the one message that is not framed: the ASCII literal
/// `conn_req:lh` with the trailing `l`/`h` bytes replaced by the client's
/// local video listen port, little-endian.
pub fn connection_request(video_port: u16) -> Vec<u8> {
    let mut msg = b"conn_req:lh".to_vec();
    msg[9] = video_port as u8;
    msg[10] = (video_port >> 8) as u8;
    msg
}
