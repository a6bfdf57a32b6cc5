//! # Stick-position messages
//!
//! The keep-alive datagram doubles as the stick-position channel: every
//! 40 ms the library serializes the latched stick axes into a `SetStick`
//! message. Each signed-16 axis is rescaled to an 11-bit value centred on
//! 1024, the four axes and the sports-mode flag are packed into a 48-bit
//! little-endian word, and a 5-byte wall-clock suffix is appended.

/// Values of a joystick update.
///
/// Axes follow the SDL convention: signed 16-bit with 0 at the neutral
/// position. `lx` is yaw, `ly` is throttle, `rx` is roll and `ry` is pitch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StickMessage {
    pub rx: i16,
    pub ry: i16,
    pub lx: i16,
    pub ly: i16,
}

/// Rescale a signed-16 axis to the wire's 11-bit range (nominally 364..1684).
fn axis_to_wire(value: i16) -> u64 {
    ((f64::from(value) / 49.672).floor() as i64 + 1024) as u64
}

/// Pack the four axes and the sports-mode flag into the 48-bit axis field.
///
/// Slot layout: Rx in bits 0..10, Ry in 11..21, Ly in 22..32, Lx in 33..43;
/// bit 44 carries the sports-mode flag.
pub(crate) fn pack_axes(sticks: &StickMessage, sports_mode: bool) -> [u8; 6] {
    let mut packed = axis_to_wire(sticks.rx) & 0x07ff;
    packed |= (axis_to_wire(sticks.ry) & 0x07ff) << 11;
    packed |= (axis_to_wire(sticks.ly) & 0x07ff) << 22;
    packed |= (axis_to_wire(sticks.lx) & 0x07ff) << 33;
    if sports_mode {
        packed |= 1 << 44;
    }

    let mut field = [0u8; 6];
    for (i, byte) in field.iter_mut().enumerate() {
        *byte = (packed >> (8 * i)) as u8;
    }
    field
}

/// Build the 11-byte `SetStick` payload: the packed axis field followed by
/// hour, minute, second and the low two bytes of the millisecond count.
pub(crate) fn stick_payload(
    sticks: &StickMessage,
    sports_mode: bool,
    hour: u8,
    minute: u8,
    second: u8,
    millis: u16,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(11);
    payload.extend_from_slice(&pack_axes(sticks, sports_mode));
    payload.push(hour);
    payload.push(minute);
    payload.push(second);
    payload.push(millis as u8);
    payload.push((millis >> 8) as u8);
    payload
}
