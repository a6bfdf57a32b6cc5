//! # The Tello
//!
//! [Tello] owns the two UDP endpoints and the shared drone state, and is the
//! entry point of the crate. Creating one is cheap; [connect](Tello::connect)
//! dials the drone's control port, performs the `conn_req`/`conn_ack`
//! handshake and starts two background tasks:
//!
//! - the **receive dispatcher**, which demultiplexes incoming control
//!   datagrams by message ID into the telemetry store, and
//! - the **keep-alive sender**, which serializes the latched stick axes
//!   into a `SetStick` datagram every 40 ms and doubles as the liveness
//!   watchdog (the drone beacons its light strength about once a second;
//!   silence means the link is gone).
//!
//! The drone state is partitioned in two: the control partition (socket,
//! connection state, sequence counter, stick axes) lives behind an async
//! mutex that also serializes every send, so frames are contiguous on the
//! wire and sequence numbers are assigned in send order. The telemetry
//! partition (flight data, picture buffers) lives behind a reader/writer
//! lock that is never held across an await point.
//!
//! ``` no_run
//! # async fn fly() -> tello_lib::Result<()> {
//! let drone = tello_lib::Tello::new();
//! drone.connect().await?;
//! drone.take_off().await?;
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! drone.land().await?;
//! drone.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use flume as channel;
use futures::lock::Mutex;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::autopilot::NavState;
use crate::flight_data::FlightData;
use crate::flight_log::parse_log_packet;
use crate::packet::{self, Packet, CONNECTION_ACK, CONNECTION_ACK_LEN, MSG_HDR};
use crate::packet::{
    MSG_DO_LAND, MSG_DO_TAKEOFF, MSG_ERROR_1, MSG_ERROR_2, MSG_FILE_DATA, MSG_FILE_SIZE,
    MSG_FLIGHT_STATUS, MSG_LIGHT_STRENGTH, MSG_LOG_CONFIG, MSG_LOG_DATA, MSG_LOG_HEADER,
    MSG_QUERY_HEIGHT_LIMIT, MSG_QUERY_LOW_BATT_THRESH, MSG_QUERY_SSID, MSG_QUERY_VERSION,
    MSG_QUERY_VIDEO_BITRATE, MSG_SET_DATE_TIME, MSG_SET_LOW_BATT_THRESH, MSG_SET_STICK,
    MSG_SMART_VIDEO_STATUS, MSG_SWITCH_PIC_VIDEO, MSG_WIFI_STRENGTH, PT_DATA1, PT_DATA2,
};
use crate::pictures::{self, FileAssembly, ReceivedFile};
use crate::sticks::{stick_payload, StickMessage};
use crate::{Error, Result};

// Network defaults
pub const DEFAULT_DRONE_ADDR: &str = "192.168.10.1";
pub const DEFAULT_DRONE_CONTROL_PORT: u16 = 8889;
pub const DEFAULT_LOCAL_CONTROL_PORT: u16 = 8800;
pub const DEFAULT_LOCAL_VIDEO_PORT: u16 = 6038;

// Timing
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const KEEP_ALIVE_PERIOD: Duration = Duration::from_millis(40);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_POLL_PERIOD: Duration = Duration::from_millis(200);
const STICK_LISTENER_POLL_PERIOD: Duration = Duration::from_millis(100);

// Buffers and queue depths
const CTRL_BUFFER_SIZE: usize = 4096;
const VIDEO_BUFFER_SIZE: usize = 2048;
const VIDEO_QUEUE_DEPTH: usize = 100;
const FLIGHT_DATA_QUEUE_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// The control partition: everything the send path touches.
pub(crate) struct ControlInner {
    pub(crate) socket: Option<Arc<UdpSocket>>,
    pub(crate) state: ConnState,
    pub(crate) seq: u16,
    pub(crate) sticks: StickMessage,
    pub(crate) sports_mode: bool,
    pub(crate) bouncing: bool,
    pub(crate) stick_listening: bool,
}

/// One writer lock serializes every control-socket send and guards the
/// sequence counter, so frames never interleave on the wire.
pub(crate) struct Control {
    pub(crate) inner: Mutex<ControlInner>,
}

impl Control {
    async fn transmit(inner: &ControlInner, buff: &[u8]) -> Result<()> {
        match &inner.socket {
            Some(socket) => {
                socket.send(buff).await?;
                Ok(())
            }
            None => Err(Error::NotConnected),
        }
    }

    /// Send a command frame with a fresh sequence number.
    pub(crate) async fn send(
        &self,
        packet_type: u8,
        message_id: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::send_locked(&mut inner, packet_type, message_id, payload).await
    }

    /// As [send](Control::send), for callers that already hold the control lock.
    pub(crate) async fn send_locked(
        inner: &mut ControlInner,
        packet_type: u8,
        message_id: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        if inner.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        inner.seq = inner.seq.wrapping_add(1);
        let pk = Packet::new(packet_type, message_id, inner.seq, payload);
        Self::transmit(inner, &pk.to_buffer()).await
    }

    /// Send a frame whose sequence field is always zero (stick updates and
    /// the video start request).
    pub(crate) async fn send_unsequenced(
        &self,
        packet_type: u8,
        message_id: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        let pk = Packet::new(packet_type, message_id, 0, payload);
        Self::transmit(&inner, &pk.to_buffer()).await
    }

    /// Serialize the current stick axes and send them immediately.
    pub(crate) async fn send_stick_update(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.state != ConnState::Connected {
            return Err(Error::NotConnected);
        }
        let (hour, minute, second, millis) = wall_clock_hms_millis();
        let payload = stick_payload(&inner.sticks, inner.sports_mode, hour, minute, second, millis);
        let pk = Packet::new(PT_DATA2, MSG_SET_STICK, 0, payload);
        Self::transmit(&inner, &pk.to_buffer()).await
    }
}

/// The telemetry partition: flight data, picture-assembly buffers and the
/// streaming flag, updated by the receive dispatcher.
pub(crate) struct FlightState {
    pub(crate) fd: FlightData,
    pub(crate) file_temp: Option<FileAssembly>,
    pub(crate) files: Vec<ReceivedFile>,
    pub(crate) streaming: bool,
}

/// A connection to a Tello drone.
///
/// All methods take `&self`; the instance can be shared freely between
/// tasks. Once [disconnect](Tello::disconnect) has run (or the liveness
/// watchdog has fired), commands return [Error::NotConnected] until
/// [connect](Tello::connect) is called again.
pub struct Tello {
    pub(crate) ctrl: Arc<Control>,
    pub(crate) fd: Arc<RwLock<FlightState>>,
    pub(crate) nav: Arc<NavState>,
    pub(crate) disconnect: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Tello {
    /// A disconnected drone handle.
    pub fn new() -> Self {
        Tello {
            ctrl: Arc::new(Control {
                inner: Mutex::new(ControlInner {
                    socket: None,
                    state: ConnState::Disconnected,
                    seq: 0,
                    sticks: StickMessage::default(),
                    sports_mode: false,
                    bouncing: false,
                    stick_listening: false,
                }),
            }),
            fd: Arc::new(RwLock::new(FlightState {
                fd: FlightData::default(),
                file_temp: None,
                files: Vec::new(),
                streaming: false,
            })),
            nav: Arc::new(NavState::default()),
            disconnect: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect to a drone on the default network addresses
    /// (drone 192.168.10.1:8889, local port 8800).
    pub async fn connect(&self) -> Result<()> {
        self.connect_to(
            DEFAULT_DRONE_ADDR,
            DEFAULT_DRONE_CONTROL_PORT,
            DEFAULT_LOCAL_CONTROL_PORT,
        )
        .await
    }

    /// Connect to a drone at the provided network address.
    ///
    /// Dials the drone's control port from `local_port` (0 picks an
    /// ephemeral port), starts the receive dispatcher, sends the connection
    /// request and waits up to 3 seconds for the drone to acknowledge. On
    /// success the keep-alive sender starts and commands may be issued.
    pub async fn connect_to(
        &self,
        drone_addr: &str,
        drone_port: u16,
        local_port: u16,
    ) -> Result<()> {
        let (conn_tx, conn_rx) = channel::bounded(1);
        {
            let mut inner = self.ctrl.inner.lock().await;
            match inner.state {
                ConnState::Connected => return Err(Error::AlreadyConnected),
                ConnState::Connecting => return Err(Error::ConnectionInProgress),
                ConnState::Disconnected => {}
            }

            let socket = UdpSocket::bind(("0.0.0.0", local_port))
                .await
                .map_err(Error::Connect)?;
            socket
                .connect((drone_addr, drone_port))
                .await
                .map_err(Error::Connect)?;
            let socket = Arc::new(socket);

            inner.socket = Some(socket.clone());
            inner.state = ConnState::Connecting;
            inner.seq = 0;
            inner.sticks = StickMessage::default();
            self.disconnect.store(false, Relaxed);

            let rx_task = tokio::spawn(control_receive_loop(
                self.ctrl.clone(),
                self.fd.clone(),
                self.disconnect.clone(),
                socket.clone(),
                conn_tx,
            ));
            self.tasks.lock().await.push(rx_task);

            // say hello to the drone, announcing where video should go
            socket
                .send(&packet::connection_request(DEFAULT_LOCAL_VIDEO_PORT))
                .await
                .map_err(Error::Connect)?;
        }

        match tokio::time::timeout(CONNECT_TIMEOUT, conn_rx.recv_async()).await {
            Ok(Ok(())) => {
                let ka_task = tokio::spawn(keep_alive(self.ctrl.clone(), self.fd.clone()));
                self.tasks.lock().await.push(ka_task);
                Ok(())
            }
            _ => {
                self.disconnect.store(true, Relaxed);
                let mut inner = self.ctrl.inner.lock().await;
                inner.state = ConnState::Disconnected;
                inner.socket = None;
                Err(Error::ConnectTimeout)
            }
        }
    }

    /// Whether the control channel is currently connected.
    ///
    /// Turns false after [disconnect](Tello::disconnect), and also when the
    /// liveness watchdog has declared the link dead.
    pub async fn connected(&self) -> bool {
        self.ctrl.inner.lock().await.state == ConnState::Connected
    }

    /// Close the control channel.
    ///
    /// Clears the connected flag, drops the sockets and waits for the
    /// background tasks to finish. Observer queues (flight-data stream,
    /// video frames) close once their tasks notice the shutdown.
    pub async fn disconnect(&self) {
        self.disconnect.store(true, Relaxed);
        {
            let mut inner = self.ctrl.inner.lock().await;
            inner.state = ConnState::Disconnected;
            inner.socket = None;
        }
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// The current known state of the drone, as a snapshot.
    pub fn get_flight_data(&self) -> FlightData {
        self.fd.read().unwrap().fd.clone()
    }

    /// Start a task that snapshots the flight data every `period_ms`
    /// milliseconds into the returned queue.
    ///
    /// The streamer never blocks: if the consumer falls behind, updates are
    /// lost. The queue closes when the control channel disconnects or the
    /// receiver is dropped. A second stream cannot be started while one is
    /// running.
    pub async fn stream_flight_data(&self, period_ms: u64) -> Result<channel::Receiver<FlightData>> {
        {
            let mut state = self.fd.write().unwrap();
            if state.streaming {
                return Err(Error::AlreadyStreaming);
            }
            state.streaming = true;
        }

        let (tx, rx) = channel::bounded(FLIGHT_DATA_QUEUE_DEPTH);
        let ctrl = self.ctrl.clone();
        let fd = self.fd.clone();
        let disconnect = self.disconnect.clone();
        tokio::spawn(async move {
            let period = Duration::from_millis(period_ms);
            loop {
                if disconnect.load(Relaxed) || ctrl.inner.lock().await.state != ConnState::Connected
                {
                    break;
                }
                let snapshot = fd.read().unwrap().fd.clone();
                if let Err(channel::TrySendError::Disconnected(_)) = tx.try_send(snapshot) {
                    break;
                }
                tokio::time::sleep(period).await;
            }
            fd.write().unwrap().streaming = false;
        });

        Ok(rx)
    }

    /// Latch new stick positions. The keep-alive sender transmits the most
    /// recent values on its next tick; nothing is sent immediately.
    pub async fn update_sticks(&self, sticks: &StickMessage) {
        self.ctrl.inner.lock().await.sticks = *sticks;
    }

    /// Start a task that applies [StickMessage]s from the returned channel
    /// as they arrive, e.g. fed from a joystick-reading thread.
    ///
    /// The listener stops when [stop_stick_listener](Tello::stop_stick_listener)
    /// is called, the sender is dropped, or the connection closes.
    pub async fn start_stick_listener(&self) -> Result<channel::Sender<StickMessage>> {
        {
            let mut inner = self.ctrl.inner.lock().await;
            if inner.stick_listening {
                return Err(Error::AlreadyListening);
            }
            inner.stick_listening = true;
        }

        let (tx, rx) = channel::unbounded();
        let ctrl = self.ctrl.clone();
        let disconnect = self.disconnect.clone();
        tokio::spawn(async move {
            loop {
                if disconnect.load(Relaxed) || !ctrl.inner.lock().await.stick_listening {
                    break;
                }
                match tokio::time::timeout(STICK_LISTENER_POLL_PERIOD, rx.recv_async()).await {
                    Ok(Ok(sticks)) => ctrl.inner.lock().await.sticks = sticks,
                    Ok(Err(channel::RecvError::Disconnected)) => break,
                    Err(_) => continue,
                }
            }
            ctrl.inner.lock().await.stick_listening = false;
        });

        Ok(tx)
    }

    /// Stop a running stick listener. A no-op when none is running.
    pub async fn stop_stick_listener(&self) {
        self.ctrl.inner.lock().await.stick_listening = false;
    }

    /// Open the video channel on the default local port (6038, the port
    /// announced to the drone at connection time).
    ///
    /// Returns a bounded queue of raw video frames: each received datagram
    /// minus its 2-byte link-layer prefix, H.264 payload passed through
    /// opaquely. Frames are dropped when the queue is full. Call
    /// [start_video](Tello::start_video) to ask the drone to begin sending.
    pub async fn video_connect(&self) -> Result<channel::Receiver<Vec<u8>>> {
        self.video_connect_to(DEFAULT_LOCAL_VIDEO_PORT).await
    }

    /// As [video_connect](Tello::video_connect), listening on the given port.
    pub async fn video_connect_to(&self, local_port: u16) -> Result<channel::Receiver<Vec<u8>>> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))
            .await
            .map_err(Error::Connect)?;

        let (tx, rx) = channel::bounded(VIDEO_QUEUE_DEPTH);
        let disconnect = self.disconnect.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; VIDEO_BUFFER_SIZE];
            while !disconnect.load(Relaxed) {
                let n = match tokio::time::timeout(RECV_POLL_PERIOD, socket.recv_from(&mut buf))
                    .await
                {
                    Err(_) => continue,
                    Ok(Err(e)) => {
                        debug!("video socket closed: {}", e);
                        break;
                    }
                    Ok(Ok((n, _))) => n,
                };
                if n <= 2 {
                    continue;
                }
                if let Err(channel::TrySendError::Disconnected(_)) = tx.try_send(buf[2..n].to_vec())
                {
                    break;
                }
            }
        });
        self.tasks.lock().await.push(task);

        Ok(rx)
    }

    /// Send a sequenced command frame on the control socket.
    pub(crate) async fn send_packet(
        &self,
        packet_type: u8,
        message_id: u16,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.ctrl.send(packet_type, message_id, payload).await
    }
}

impl Default for Tello {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Tello {
    fn drop(&mut self) {
        self.disconnect.store(true, Relaxed);
    }
}

/// Receive loop for the control socket.
///
/// While connecting, only the `conn_ack:` handshake reply is interesting.
/// After that every datagram should be a framed message; anything that does
/// not decode is logged and dropped, never fatal. A socket error is treated
/// as a clean shutdown.
async fn control_receive_loop(
    ctrl: Arc<Control>,
    fd: Arc<RwLock<FlightState>>,
    disconnect: Arc<AtomicBool>,
    socket: Arc<UdpSocket>,
    conn_tx: channel::Sender<()>,
) {
    let mut buf = [0u8; CTRL_BUFFER_SIZE];
    while !disconnect.load(Relaxed) {
        let n = match tokio::time::timeout(RECV_POLL_PERIOD, socket.recv(&mut buf)).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                debug!("control socket closed: {}", e);
                break;
            }
            Ok(Ok(n)) => n,
        };

        // the initial connect response is not a framed message
        let connecting = { ctrl.inner.lock().await.state == ConnState::Connecting };
        if connecting {
            if n == CONNECTION_ACK_LEN && buf.starts_with(CONNECTION_ACK) {
                ctrl.inner.lock().await.state = ConnState::Connected;
                fd.write().unwrap().fd.light_strength_updated = Some(Instant::now());
                let _ = conn_tx.try_send(());
                info!("connection acknowledged by drone");
            } else {
                warn!(
                    "unexpected response to connection request ({} bytes)",
                    n
                );
            }
            continue;
        }

        if buf[0] != MSG_HDR {
            warn!("unexpected message header 0x{:02x} from drone", buf[0]);
            continue;
        }
        let pkt = match Packet::from_buffer(&buf[..n]) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!("dropping undecodable frame: {}", e);
                continue;
            }
        };
        dispatch(&ctrl, &fd, pkt).await;
    }
}

/// Demultiplex one incoming message and update the telemetry store,
/// answering the handful of messages the drone expects a reply to.
async fn dispatch(ctrl: &Arc<Control>, fd: &Arc<RwLock<FlightState>>, pkt: Packet) {
    let pl = &pkt.payload;
    match pkt.message_id {
        MSG_FLIGHT_STATUS => {
            fd.write().unwrap().fd.update_from_status(pl);
        }
        MSG_LIGHT_STRENGTH => {
            if !pl.is_empty() {
                let mut state = fd.write().unwrap();
                state.fd.light_strength = pl[0];
                state.fd.light_strength_updated = Some(Instant::now());
            }
        }
        MSG_LOG_HEADER => {
            // acknowledge with the log session ID so the stream keeps flowing
            if pl.len() >= 2 {
                let ack = vec![0, pl[0], pl[1]];
                if let Err(e) = ctrl.send(PT_DATA1, MSG_LOG_HEADER, ack).await {
                    debug!("could not acknowledge log header: {}", e);
                }
            }
        }
        MSG_LOG_DATA => {
            parse_log_packet(&mut fd.write().unwrap().fd, pl);
        }
        MSG_SET_DATE_TIME => {
            // the drone is asking us for the current time
            if let Err(e) = ctrl.send(PT_DATA1, MSG_SET_DATE_TIME, date_time_payload()).await {
                debug!("could not answer time request: {}", e);
            }
        }
        MSG_FILE_SIZE => pictures::handle_file_size(ctrl, fd, pl).await,
        MSG_FILE_DATA => pictures::handle_file_data(ctrl, fd, pl).await,
        MSG_QUERY_HEIGHT_LIMIT => {
            if pl.len() >= 2 {
                fd.write().unwrap().fd.max_height = pl[1];
            }
        }
        MSG_QUERY_LOW_BATT_THRESH => {
            if pl.len() >= 2 {
                fd.write().unwrap().fd.low_battery_threshold = pl[1];
            }
        }
        MSG_QUERY_SSID => {
            if pl.len() > 2 {
                fd.write().unwrap().fd.ssid = String::from_utf8_lossy(&pl[2..]).into_owned();
            }
        }
        MSG_QUERY_VERSION => {
            if pl.len() > 1 {
                fd.write().unwrap().fd.version = String::from_utf8_lossy(&pl[1..]).into_owned();
            }
        }
        MSG_QUERY_VIDEO_BITRATE => {
            if pl.len() >= 2 {
                fd.write().unwrap().fd.video_bitrate = pl[1].into();
            }
        }
        MSG_WIFI_STRENGTH => {
            if pl.len() >= 2 {
                let mut state = fd.write().unwrap();
                state.fd.wifi_strength = pl[0];
                state.fd.wifi_interference = pl[1];
            }
        }
        MSG_SMART_VIDEO_STATUS => {
            if !pl.is_empty() {
                fd.write().unwrap().fd.smart_video_exit_mode = (pl[0] >> 2) as i16;
            }
        }
        MSG_ERROR_1 | MSG_ERROR_2 => {
            warn!(
                "drone reported error (id 0x{:04x}): {:02x?}",
                pkt.message_id, pl
            );
        }
        // echoes of our own commands, nothing to do
        MSG_DO_LAND | MSG_DO_TAKEOFF | MSG_LOG_CONFIG | MSG_SWITCH_PIC_VIDEO
        | MSG_SET_LOW_BATT_THRESH => {
            debug!("command echo for message 0x{:04x}", pkt.message_id);
        }
        other => {
            debug!(
                "unknown message id 0x{:04x} from drone ({} byte payload)",
                other,
                pl.len()
            );
        }
    }
}

/// The keep-alive sender.
///
/// Ticks every 40 ms: transmits the latched stick axes and checks that a
/// light-strength beacon arrived within the liveness window. Exits as soon
/// as the connection state drops, and drops the connection itself when the
/// drone goes silent.
async fn keep_alive(ctrl: Arc<Control>, fd: Arc<RwLock<FlightState>>) {
    let mut ticker = tokio::time::interval(KEEP_ALIVE_PERIOD);
    loop {
        ticker.tick().await;

        match ctrl.send_stick_update().await {
            Ok(()) => {}
            Err(Error::NotConnected) => break,
            Err(e) => debug!("keep-alive send failed: {}", e),
        }

        let last_beacon = fd.read().unwrap().fd.light_strength_updated;
        if let Some(last) = last_beacon {
            if last.elapsed() > LIVENESS_TIMEOUT {
                warn!(
                    "no light-strength beacon for {:?}, marking drone disconnected",
                    LIVENESS_TIMEOUT
                );
                ctrl.inner.lock().await.state = ConnState::Disconnected;
                break;
            }
        }
    }
}

/// Hour/minute/second and sub-second milliseconds of the wall clock (UTC).
fn wall_clock_hms_millis() -> (u8, u8, u8, u16) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    (
        (secs / 3600 % 24) as u8,
        (secs / 60 % 60) as u8,
        (secs % 60) as u8,
        now.subsec_millis() as u16,
    )
}

/// The 15-byte reply to the drone's `SetDateTime` request: a reserved zero
/// then year, month, day, hour, minute, second and milliseconds, each as a
/// 16-bit little-endian value.
fn date_time_payload() -> Vec<u8> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() as i64;
    let (year, month, day) = civil_from_days(secs.div_euclid(86400));
    let tod = secs.rem_euclid(86400);

    let mut payload = Vec::with_capacity(15);
    payload.push(0);
    for field in [
        year as u16,
        month as u16,
        day as u16,
        (tod / 3600) as u16,
        (tod / 60 % 60) as u16,
        (tod % 60) as u16,
        now.subsec_millis() as u16,
    ] {
        payload.extend_from_slice(&field.to_le_bytes());
    }
    payload
}

/// Proleptic Gregorian date for a day count relative to 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719468;
    let era = (if z >= 0 { z } else { z - 146096 }) / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    (year + i64::from(month <= 2), month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_from_days_reference_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11016), (2000, 2, 29));
        assert_eq!(civil_from_days(19723), (2024, 1, 1));
    }

    #[test]
    fn date_time_payload_shape() {
        let payload = date_time_payload();
        assert_eq!(payload.len(), 15);
        assert_eq!(payload[0], 0);
        let year = u16::from_le_bytes([payload[1], payload[2]]);
        assert!(year >= 2024);
        let month = u16::from_le_bytes([payload[3], payload[4]]);
        assert!((1..=12).contains(&month));
        let day = u16::from_le_bytes([payload[5], payload[6]]);
        assert!((1..=31).contains(&day));
    }
}
