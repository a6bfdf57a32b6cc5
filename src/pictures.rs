//! # Picture transfer
//!
//! A JPEG snapshot arrives as a chunked file transfer with two levels of
//! fragmentation: the file is split into *pieces* of up to eight *chunks*
//! each. Chunks may repeat and may arrive out of order within a piece.
//! The drone expects an acknowledgement for the announced file size, one
//! for every completed piece, and a final acknowledgement plus a
//! `FileDone` message once every byte has arrived. Completed files stay in
//! memory until [save_all_pics](crate::Tello::save_all_pics) writes them out.

use std::sync::{Arc, RwLock};

use log::{debug, warn};

use crate::drone::{Control, FlightState, Tello};
use crate::packet::{
    MSG_DO_TAKE_PIC, MSG_FILE_DATA, MSG_FILE_DONE, MSG_FILE_SIZE, PT_DATA1, PT_GET, PT_SET,
};
use crate::Result;

pub(crate) const FILE_TYPE_JPEG: u8 = 1;

const CHUNKS_PER_PIECE: usize = 8;

// Bound on the piece index we are willing to allocate buffers for; a JPEG
// is a few hundred pieces at most.
const MAX_PIECES: u32 = 1 << 16;

/// A file being received, piece by piece.
pub(crate) struct FileAssembly {
    file_id: u16,
    file_type: u8,
    expected_size: u32,
    accumulated_size: u32,
    pieces: Vec<FilePiece>,
}

#[derive(Default)]
struct FilePiece {
    chunks: Vec<FileChunk>,
}

struct FileChunk {
    chunk_num: u32,
    data: Vec<u8>,
}

/// A fully reassembled file.
pub(crate) struct ReceivedFile {
    pub(crate) file_type: u8,
    pub(crate) bytes: Vec<u8>,
}

/// Concatenate chunks within each piece in ascending chunk order, then
/// pieces in ascending index order.
fn reassemble(mut assembly: FileAssembly) -> ReceivedFile {
    let mut bytes = Vec::with_capacity(assembly.accumulated_size as usize);
    for piece in &mut assembly.pieces {
        piece.chunks.sort_by_key(|chunk| chunk.chunk_num);
        for chunk in &piece.chunks {
            bytes.extend_from_slice(&chunk.data);
        }
    }
    ReceivedFile {
        file_type: assembly.file_type,
        bytes,
    }
}

fn piece_ack_payload(done: u8, file_id: u16, piece_num: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(7);
    payload.push(done);
    payload.extend_from_slice(&file_id.to_le_bytes());
    payload.extend_from_slice(&piece_num.to_le_bytes());
    payload
}

/// `FileSize` announces a new transfer: file type, 32-bit size, 16-bit ID.
pub(crate) async fn handle_file_size(
    ctrl: &Arc<Control>,
    fd: &Arc<RwLock<FlightState>>,
    pl: &[u8],
) {
    if pl.len() < 7 {
        warn!("short FileSize payload ({} bytes)", pl.len());
        return;
    }
    let file_type = pl[0];
    let expected_size = u32::from_le_bytes([pl[1], pl[2], pl[3], pl[4]]);
    let file_id = u16::from_le_bytes([pl[5], pl[6]]);

    if file_type != FILE_TYPE_JPEG {
        warn!("ignoring transfer of unexpected file type {}", file_type);
        return;
    }
    debug!(
        "starting receipt of file {} ({} bytes expected)",
        file_id, expected_size
    );

    fd.write().unwrap().file_temp = Some(FileAssembly {
        file_id,
        file_type,
        expected_size,
        accumulated_size: 0,
        pieces: Vec::new(),
    });

    if let Err(e) = ctrl.send(PT_DATA1, MSG_FILE_SIZE, vec![0]).await {
        debug!("could not acknowledge file size: {}", e);
    }
}

/// `FileData` carries one chunk: file ID, piece number, chunk number,
/// declared chunk length, then the chunk bytes.
pub(crate) async fn handle_file_data(
    ctrl: &Arc<Control>,
    fd: &Arc<RwLock<FlightState>>,
    pl: &[u8],
) {
    if pl.len() < 12 {
        warn!("short FileData payload ({} bytes)", pl.len());
        return;
    }
    let file_id = u16::from_le_bytes([pl[0], pl[1]]);
    let piece_num = u32::from_le_bytes([pl[2], pl[3], pl[4], pl[5]]);
    let chunk_num = u32::from_le_bytes([pl[6], pl[7], pl[8], pl[9]]);
    let chunk_data = &pl[12..];

    let piece_completed;
    let mut file_completed = None;
    {
        let mut state = fd.write().unwrap();
        let assembly = match state.file_temp.as_mut() {
            Some(assembly) if assembly.file_id == file_id => assembly,
            Some(_) | None => {
                debug!("chunk for unexpected file {}", file_id);
                return;
            }
        };
        if piece_num >= MAX_PIECES {
            warn!("implausible piece number {}", piece_num);
            return;
        }
        if assembly.pieces.len() <= piece_num as usize {
            assembly
                .pieces
                .resize_with(piece_num as usize + 1, FilePiece::default);
        }

        let piece = &mut assembly.pieces[piece_num as usize];
        if piece.chunks.iter().any(|chunk| chunk.chunk_num == chunk_num) {
            return; // retransmission of a chunk we already hold
        }
        if piece.chunks.len() >= CHUNKS_PER_PIECE {
            warn!("more than {} chunks in piece {}", CHUNKS_PER_PIECE, piece_num);
            return;
        }
        piece.chunks.push(FileChunk {
            chunk_num,
            data: chunk_data.to_vec(),
        });
        assembly.accumulated_size += chunk_data.len() as u32;

        piece_completed = piece.chunks.len() == CHUNKS_PER_PIECE;
        if assembly.accumulated_size >= assembly.expected_size {
            let finished = state.file_temp.take().unwrap();
            file_completed = Some(finished.accumulated_size);
            let file = reassemble(finished);
            state.files.push(file);
        }
    }

    match file_completed {
        Some(size) => {
            debug!("file {} complete ({} bytes)", file_id, size);
            let ack = piece_ack_payload(1, file_id, piece_num);
            if let Err(e) = ctrl.send(PT_DATA1, MSG_FILE_DATA, ack).await {
                debug!("could not acknowledge final piece: {}", e);
            }
            let mut done = Vec::with_capacity(6);
            done.extend_from_slice(&file_id.to_le_bytes());
            done.extend_from_slice(&size.to_le_bytes());
            if let Err(e) = ctrl.send(PT_GET, MSG_FILE_DONE, done).await {
                debug!("could not send FileDone: {}", e);
            }
        }
        None if piece_completed => {
            let ack = piece_ack_payload(0, file_id, piece_num);
            if let Err(e) = ctrl.send(PT_DATA1, MSG_FILE_DATA, ack).await {
                debug!("could not acknowledge piece: {}", e);
            }
        }
        None => {}
    }
}

impl Tello {
    /// Request a JPEG snapshot.
    ///
    /// The process takes a little while and the video stream may freeze
    /// during photography; sometimes the drone does not honour the request
    /// at all. Received pictures accumulate in memory until
    /// [save_all_pics](Tello::save_all_pics) is called.
    pub async fn take_picture(&self) -> Result<()> {
        self.send_packet(PT_SET, MSG_DO_TAKE_PIC, Vec::new()).await
    }

    /// The number of JPEG pictures currently held in memory.
    pub fn num_pics(&self) -> usize {
        self.fd
            .read()
            .unwrap()
            .files
            .iter()
            .filter(|file| file.file_type == FILE_TYPE_JPEG)
            .count()
    }

    /// Write all stored JPEG pictures to disk as `prefix_0.jpg`,
    /// `prefix_1.jpg`, … and return how many were written.
    ///
    /// The in-memory store is cleared, matching the drone's own behaviour
    /// of forgetting a picture once it has been collected.
    pub fn save_all_pics(&self, prefix: &str) -> Result<usize> {
        let files = std::mem::take(&mut self.fd.write().unwrap().files);

        let mut written = 0;
        for file in &files {
            if file.file_type != FILE_TYPE_JPEG {
                continue;
            }
            let filename = format!("{}_{}.jpg", prefix, written);
            std::fs::write(&filename, &file.bytes)?;
            written += 1;
        }
        Ok(written)
    }
}
