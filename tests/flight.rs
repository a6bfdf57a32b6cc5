// End-to-end tests against a synthetic peer drone on localhost UDP.
//
// The fake drone answers the connection handshake, records the frames the
// library sends, and injects telemetry, so every scenario here runs the
// real codec, dispatcher, keep-alive and autopilot tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tello_lib::packet::{
    Packet, MSG_DO_LAND, MSG_DO_TAKEOFF, MSG_FILE_DATA, MSG_FILE_DONE, MSG_FILE_SIZE,
    MSG_FLIGHT_STATUS, MSG_HDR, MSG_LIGHT_STRENGTH, MSG_LOG_DATA, MSG_QUERY_VIDEO_BITRATE,
    MSG_SET_STICK, MSG_SET_VIDEO_BITRATE, MSG_WIFI_STRENGTH, PT_DATA1, PT_GET, PT_SET,
};
use tello_lib::{Error, StickMessage, Tello, VideoBitrate};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

const TEST_STEP_TIMEOUT: Duration = Duration::from_secs(5);

struct FakeDrone {
    socket: Arc<UdpSocket>,
    port: u16,
}

impl FakeDrone {
    async fn bind() -> FakeDrone {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        FakeDrone {
            socket: Arc::new(socket),
            port,
        }
    }

    /// Wait for `conn_req:` and acknowledge it. Returns the client address.
    async fn accept(&self) -> SocketAddr {
        let mut buf = [0u8; 2048];
        loop {
            let (n, addr) = self.socket.recv_from(&mut buf).await.unwrap();
            if buf[..n].starts_with(b"conn_req:") {
                // the ack is the same shape: 9 literal bytes plus two more
                self.socket.send_to(b"conn_ack:lh", addr).await.unwrap();
                return addr;
            }
        }
    }

    /// Next well-formed frame that is not a stick keep-alive.
    async fn recv_command(&self) -> Packet {
        let mut buf = [0u8; 2048];
        let fut = async {
            loop {
                let (n, _) = self.socket.recv_from(&mut buf).await.unwrap();
                if n == 0 || buf[0] != MSG_HDR {
                    continue;
                }
                if let Ok(pkt) = Packet::from_buffer(&buf[..n]) {
                    if pkt.message_id != MSG_SET_STICK {
                        return pkt;
                    }
                }
            }
        };
        timeout(TEST_STEP_TIMEOUT, fut).await.expect("no command frame arrived")
    }

    /// Next stick keep-alive frame, decoded into its four 11-bit slots
    /// (rx, ry, ly, lx).
    async fn recv_stick_slots(&self) -> (u16, u16, u16, u16) {
        let mut buf = [0u8; 2048];
        let fut = async {
            loop {
                let (n, _) = self.socket.recv_from(&mut buf).await.unwrap();
                if n == 0 || buf[0] != MSG_HDR {
                    continue;
                }
                if let Ok(pkt) = Packet::from_buffer(&buf[..n]) {
                    if pkt.message_id == MSG_SET_STICK && pkt.payload.len() >= 6 {
                        let mut packed: u64 = 0;
                        for (i, byte) in pkt.payload[..6].iter().enumerate() {
                            packed |= (*byte as u64) << (8 * i);
                        }
                        return (
                            (packed & 0x7ff) as u16,
                            ((packed >> 11) & 0x7ff) as u16,
                            ((packed >> 22) & 0x7ff) as u16,
                            ((packed >> 33) & 0x7ff) as u16,
                        );
                    }
                }
            }
        };
        timeout(TEST_STEP_TIMEOUT, fut).await.expect("no stick frame arrived")
    }

    async fn send(&self, client: SocketAddr, pkt: &Packet) {
        self.socket.send_to(&pkt.to_buffer(), client).await.unwrap();
    }
}

fn from_drone(packet_type: u8, message_id: u16, payload: Vec<u8>) -> Packet {
    let mut pkt = Packet::new(packet_type, message_id, 0, payload);
    pkt.from_drone = true;
    pkt.to_drone = false;
    pkt
}

fn flight_status(height_dm: i16, fly_time: i16) -> Packet {
    let mut pl = vec![0u8; 24];
    pl[0..2].copy_from_slice(&height_dm.to_le_bytes());
    pl[8..10].copy_from_slice(&fly_time.to_le_bytes());
    from_drone(PT_DATA1, MSG_FLIGHT_STATUS, pl)
}

fn light_strength(value: u8) -> Packet {
    from_drone(PT_DATA1, MSG_LIGHT_STRENGTH, vec![value])
}

/// A LogData payload holding one IMU record whose quaternion encodes a pure
/// rotation of `yaw_deg` about the vertical axis (XOR key zero).
fn imu_log_packet(yaw_deg: f64) -> Packet {
    let half = yaw_deg.to_radians() / 2.0;
    let (qz, qw) = (half.sin() as f32, half.cos() as f32);

    let mut record = vec![0u8; 120];
    record[0] = 0x55;
    record[1] = 120;
    record[4] = 0x00;
    record[5] = 0x08; // IMU record type
    record[6] = 0x00; // XOR key
    record[58..62].copy_from_slice(&qw.to_le_bytes());
    record[70..74].copy_from_slice(&qz.to_le_bytes());

    let mut payload = vec![0u8];
    payload.extend_from_slice(&record);
    from_drone(PT_DATA1, MSG_LOG_DATA, payload)
}

async fn connect(tello: &Tello, drone: &FakeDrone) -> SocketAddr {
    let (result, client) = tokio::join!(tello.connect_to("127.0.0.1", drone.port, 0), drone.accept());
    result.expect("connect failed");
    client
}

#[tokio::test]
async fn connect_take_off_and_land() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    connect(&tello, &drone).await;
    assert!(tello.connected().await);

    tello.take_off().await.unwrap();
    tello.land().await.unwrap();

    let first = drone.recv_command().await;
    assert_eq!(first.message_id, MSG_DO_TAKEOFF);
    assert_eq!(first.packet_type, PT_SET);
    assert!(first.payload.is_empty());

    let second = drone.recv_command().await;
    assert_eq!(second.message_id, MSG_DO_LAND);
    assert_eq!(second.payload, vec![0]);
    assert_ne!(first.sequence, second.sequence);

    tello.disconnect().await;
    assert!(!tello.connected().await);
    assert!(matches!(tello.land().await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn connect_times_out_without_ack() {
    // a bound socket that never answers
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = silent.local_addr().unwrap().port();

    let tello = Tello::new();
    let result = tello.connect_to("127.0.0.1", port, 0).await;
    assert!(matches!(result, Err(Error::ConnectTimeout)));
    assert!(!tello.connected().await);
}

#[tokio::test]
async fn commands_require_a_connection() {
    let tello = Tello::new();
    assert!(matches!(tello.take_off().await, Err(Error::NotConnected)));
    assert!(matches!(tello.take_picture().await, Err(Error::NotConnected)));
    assert!(matches!(tello.start_video().await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    connect(&tello, &drone).await;

    let again = tello.connect_to("127.0.0.1", drone.port, 0).await;
    assert!(matches!(again, Err(Error::AlreadyConnected)));
    tello.disconnect().await;
}

#[tokio::test]
async fn bitrate_query_updates_flight_data() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    tello.set_video_bitrate(VideoBitrate::Vbr4M).await.unwrap();
    let set = drone.recv_command().await;
    assert_eq!(set.message_id, MSG_SET_VIDEO_BITRATE);
    assert_eq!(set.payload, vec![5]);

    tello.get_video_bitrate().await.unwrap();
    let query = drone.recv_command().await;
    assert_eq!(query.message_id, MSG_QUERY_VIDEO_BITRATE);
    assert_eq!(query.packet_type, PT_GET);

    drone
        .send(client, &from_drone(PT_DATA1, MSG_QUERY_VIDEO_BITRATE, vec![0, 5]))
        .await;

    let mut observed = VideoBitrate::Auto;
    for _ in 0..50 {
        observed = tello.get_flight_data().video_bitrate;
        if observed == VideoBitrate::Vbr4M {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(observed, VideoBitrate::Vbr4M);
    tello.disconnect().await;
}

#[tokio::test]
async fn flight_data_stream_delivers_snapshots() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    drone
        .send(client, &from_drone(PT_DATA1, MSG_WIFI_STRENGTH, vec![55, 2]))
        .await;

    let stream = tello.stream_flight_data(30).await.unwrap();
    assert!(matches!(
        tello.stream_flight_data(30).await,
        Err(Error::AlreadyStreaming)
    ));

    let mut last_fly_time = 0;
    for fly_time in [10i16, 20, 30] {
        drone.send(client, &flight_status(0, fly_time)).await;
        let sample = timeout(TEST_STEP_TIMEOUT, stream.recv_async())
            .await
            .expect("stream stalled")
            .expect("stream closed");
        assert!(sample.fly_time >= last_fly_time);
        last_fly_time = sample.fly_time;
        sleep(Duration::from_millis(50)).await;
    }

    let wifi = tello.get_flight_data().wifi_strength;
    assert_eq!(wifi, 55);

    // queue closes once the connection goes away
    tello.disconnect().await;
    let closed = timeout(TEST_STEP_TIMEOUT, async {
        while stream.recv_async().await.is_ok() {}
    })
    .await
    .is_ok();
    assert!(closed);
}

#[tokio::test]
async fn sticks_are_latched_and_transmitted() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    connect(&tello, &drone).await;

    // neutral first
    let (rx, ry, ly, lx) = drone.recv_stick_slots().await;
    assert_eq!((rx, ry, ly, lx), (1024, 1024, 1024, 1024));

    tello
        .update_sticks(&StickMessage {
            ry: 32767,
            ..Default::default()
        })
        .await;

    let mut saw_forward = false;
    for _ in 0..20 {
        let (_, ry, _, _) = drone.recv_stick_slots().await;
        if ry == 1683 {
            saw_forward = true;
            break;
        }
    }
    assert!(saw_forward);
    tello.disconnect().await;
}

#[tokio::test]
async fn stick_listener_feeds_the_keep_alive() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    connect(&tello, &drone).await;

    let feed = tello.start_stick_listener().await.unwrap();
    assert!(matches!(
        tello.start_stick_listener().await,
        Err(Error::AlreadyListening)
    ));

    feed.send(StickMessage {
        lx: -32768,
        ..Default::default()
    })
    .unwrap();

    let mut saw_turn = false;
    for _ in 0..20 {
        let (_, _, _, lx) = drone.recv_stick_slots().await;
        if lx == 364 {
            saw_turn = true;
            break;
        }
    }
    assert!(saw_turn);

    tello.stop_stick_listener().await;
    tello.disconnect().await;
}

#[tokio::test]
async fn picture_transfer_reassembles_out_of_order_chunks() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    // 10 chunks of 100 bytes: piece 0 holds chunks 0..8, piece 1 the rest
    let chunk_size = 100u32;
    let file: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let file_id = 42u16;

    let mut announce = vec![1u8]; // JPEG
    announce.extend_from_slice(&(file.len() as u32).to_le_bytes());
    announce.extend_from_slice(&file_id.to_le_bytes());
    drone.send(client, &from_drone(PT_DATA1, MSG_FILE_SIZE, announce)).await;

    let size_ack = drone.recv_command().await;
    assert_eq!(size_ack.message_id, MSG_FILE_SIZE);
    assert_eq!(size_ack.packet_type, PT_DATA1);

    let chunk_packet = |chunk_num: u32| {
        let start = (chunk_num * chunk_size) as usize;
        let data = &file[start..start + chunk_size as usize];
        let mut pl = Vec::new();
        pl.extend_from_slice(&file_id.to_le_bytes());
        pl.extend_from_slice(&(chunk_num / 8).to_le_bytes());
        pl.extend_from_slice(&chunk_num.to_le_bytes());
        pl.extend_from_slice(&(chunk_size as u16).to_le_bytes());
        pl.extend_from_slice(data);
        from_drone(PT_DATA1, MSG_FILE_DATA, pl)
    };

    // piece 0 reversed, with a duplicate in the middle, then piece 1
    for chunk in (0..8u32).rev() {
        drone.send(client, &chunk_packet(chunk)).await;
    }
    drone.send(client, &chunk_packet(3)).await; // retransmission
    drone.send(client, &chunk_packet(9)).await;
    drone.send(client, &chunk_packet(8)).await;

    // watch for the acks: one mid-transfer piece ack, one final, one FileDone
    let mut piece_acks = Vec::new();
    let mut file_done = None;
    while file_done.is_none() {
        let pkt = drone.recv_command().await;
        match pkt.message_id {
            MSG_FILE_DATA => piece_acks.push(pkt),
            MSG_FILE_DONE => file_done = Some(pkt),
            other => panic!("unexpected message 0x{:04x} during transfer", other),
        }
    }

    assert!(piece_acks.iter().any(|pkt| pkt.payload[0] == 0));
    assert!(piece_acks.iter().any(|pkt| pkt.payload[0] == 1));
    let done = file_done.unwrap();
    assert_eq!(done.packet_type, PT_GET);
    assert_eq!(
        u32::from_le_bytes([done.payload[2], done.payload[3], done.payload[4], done.payload[5]]),
        file.len() as u32
    );

    assert_eq!(tello.num_pics(), 1);

    let prefix = std::env::temp_dir().join(format!("tello_pic_test_{}", std::process::id()));
    let prefix = prefix.to_str().unwrap().to_owned();
    let written = tello.save_all_pics(&prefix).unwrap();
    assert_eq!(written, 1);
    assert_eq!(tello.num_pics(), 0);

    let path = format!("{}_0.jpg", prefix);
    let saved = std::fs::read(&path).unwrap();
    assert_eq!(saved, file);
    let _ = std::fs::remove_file(&path);

    tello.disconnect().await;
}

#[tokio::test]
async fn height_autopilot_reaches_target_and_zeroes_the_stick() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    drone.send(client, &flight_status(0, 0)).await;
    sleep(Duration::from_millis(100)).await;

    let done = tello.auto_fly_to_height(50).await.unwrap();
    assert!(matches!(
        tello.auto_fly_to_height(10).await,
        Err(Error::AlreadyNavigating)
    ));

    // while climbing, the throttle slot should be pushed well up
    let mut saw_climb = false;
    for _ in 0..40 {
        let (_, _, ly, _) = drone.recv_stick_slots().await;
        if ly > 1600 {
            saw_climb = true;
            break;
        }
    }
    assert!(saw_climb);

    drone.send(client, &flight_status(50, 0)).await;
    let completed = timeout(TEST_STEP_TIMEOUT, done.recv_async())
        .await
        .expect("navigation did not complete");
    assert_eq!(completed, Ok(true));

    // after completion the latched throttle must return to neutral; drain
    // the backlog of climb-era frames first
    let mut back_to_neutral = false;
    for _ in 0..40 {
        let (_, _, ly, _) = drone.recv_stick_slots().await;
        if ly == 1024 {
            back_to_neutral = true;
            break;
        }
    }
    assert!(back_to_neutral);

    tello.disconnect().await;
}

#[tokio::test]
async fn cancelled_autopilot_signals_completion() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    drone.send(client, &flight_status(0, 0)).await;
    sleep(Duration::from_millis(100)).await;

    let done = tello.auto_fly_to_height(200).await.unwrap();
    sleep(Duration::from_millis(150)).await;
    tello.cancel_auto_fly_to_height();

    let completed = timeout(TEST_STEP_TIMEOUT, done.recv_async())
        .await
        .expect("cancellation was not signalled");
    assert_eq!(completed, Ok(true));

    // the axis group is free again
    let done = tello.auto_fly_to_height(0).await.unwrap();
    let completed = timeout(TEST_STEP_TIMEOUT, done.recv_async())
        .await
        .expect("second navigation did not complete");
    assert_eq!(completed, Ok(true));

    tello.disconnect().await;
}

#[tokio::test]
async fn turn_autopilot_takes_the_short_way_round() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    // facing -170; turning to +170 should go anticlockwise (lx below neutral)
    drone.send(client, &imu_log_packet(-170.0)).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(tello.get_flight_data().imu.yaw, -170);

    let done = tello.auto_turn_to_yaw(170).await.unwrap();

    let mut saw_anticlockwise = false;
    for _ in 0..40 {
        let (_, _, _, lx) = drone.recv_stick_slots().await;
        if lx < 1024 {
            saw_anticlockwise = true;
            break;
        }
        assert!(lx == 1024, "turned the long way round");
    }
    assert!(saw_anticlockwise);

    drone.send(client, &imu_log_packet(170.0)).await;
    let completed = timeout(TEST_STEP_TIMEOUT, done.recv_async())
        .await
        .expect("turn did not complete");
    assert_eq!(completed, Ok(true));

    tello.disconnect().await;
}

#[tokio::test]
async fn two_autopilots_run_concurrently() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    drone.send(client, &flight_status(0, 0)).await;
    drone.send(client, &imu_log_packet(0.0)).await;
    sleep(Duration::from_millis(100)).await;

    let climb = tello.auto_fly_to_height(4).await.unwrap();
    let turn = tello.auto_turn_to_yaw(120).await.unwrap();

    drone.send(client, &flight_status(4, 0)).await;
    drone.send(client, &imu_log_packet(120.0)).await;

    let climbed = timeout(TEST_STEP_TIMEOUT, climb.recv_async())
        .await
        .expect("climb did not complete");
    let turned = timeout(TEST_STEP_TIMEOUT, turn.recv_async())
        .await
        .expect("turn did not complete");
    assert_eq!(climbed, Ok(true));
    assert_eq!(turned, Ok(true));

    tello.land().await.unwrap();
    tello.disconnect().await;
}

#[tokio::test]
async fn xy_autopilot_requires_home() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    connect(&tello, &drone).await;

    assert!(!tello.is_home_set());
    assert!(matches!(
        tello.auto_fly_to_xy(1.0, 1.0).await,
        Err(Error::HomeNotSet)
    ));

    tello.set_home().unwrap();
    assert!(tello.is_home_set());

    // takeoff invalidates the home point again
    tello.take_off().await.unwrap();
    assert!(!tello.is_home_set());

    assert!(matches!(
        tello.auto_fly_to_xy(500.0, 0.0).await,
        Err(Error::NavigationLimitExceeded)
    ));

    tello.disconnect().await;
}

#[tokio::test]
async fn concurrent_commands_get_distinct_contiguous_sequences() {
    let drone = FakeDrone::bind().await;
    let tello = Arc::new(Tello::new());
    connect(&tello, &drone).await;

    let callers = 12;
    let mut handles = Vec::new();
    for _ in 0..callers {
        let tello = tello.clone();
        handles.push(tokio::spawn(async move {
            tello.take_picture().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut sequences = Vec::new();
    for _ in 0..callers {
        sequences.push(drone.recv_command().await.sequence);
    }
    sequences.sort_unstable();
    let first = sequences[0];
    let expected: Vec<u16> = (0..callers as u16).map(|i| first + i).collect();
    assert_eq!(sequences, expected);

    tello.disconnect().await;
}

#[tokio::test]
async fn liveness_loss_disconnects_cleanly() {
    let drone = FakeDrone::bind().await;
    let tello = Tello::new();
    let client = connect(&tello, &drone).await;

    // a beacon keeps the link alive past the initial stamp
    drone.send(client, &light_strength(3)).await;
    sleep(Duration::from_millis(200)).await;
    assert!(tello.connected().await);
    assert_eq!(tello.get_flight_data().light_strength, 3);

    // then silence: the watchdog should declare the link dead
    sleep(Duration::from_millis(5600)).await;
    assert!(!tello.connected().await);
    assert!(matches!(tello.take_off().await, Err(Error::NotConnected)));

    tello.disconnect().await;
}

#[tokio::test]
async fn video_frames_lose_their_link_prefix() {
    let tello = Tello::new();
    let frames = match tello.video_connect().await {
        Ok(frames) => frames,
        // 6038 can be taken on a shared machine, nothing to test then
        Err(_) => return,
    };

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut datagram = vec![0xab, 0xcd];
    datagram.extend_from_slice(b"h264 payload bytes");
    sender
        .send_to(&datagram, ("127.0.0.1", tello_lib::DEFAULT_LOCAL_VIDEO_PORT))
        .await
        .unwrap();

    let frame = timeout(TEST_STEP_TIMEOUT, frames.recv_async())
        .await
        .expect("no video frame arrived")
        .expect("video queue closed");
    assert_eq!(frame, b"h264 payload bytes");
}
