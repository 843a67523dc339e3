//! OGG serializer for the speech recognizer.
//!
//! The recognizer consumes OGG_OPUS over a streaming session. Each RTP
//! payload becomes one OGG page; granule positions advance by the Opus
//! packet's 48 kHz sample count. Sessions rotate periodically, and every
//! new session must see fresh ID and comment pages, hence [`OggWriter::reset`].

use std::sync::atomic::{AtomicU32, Ordering};

use crate::crc::PageCrc;
use crate::error::MediaError;
use crate::opus::packet_samples;

const HEADER_TYPE_NONE: u8 = 0x00;
const HEADER_TYPE_BEGINNING_OF_STREAM: u8 = 0x02;

const VENDOR: &[u8] = b"livegpt";

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(0xDEC0_0001);

/// Serializes Opus packets into an in-memory OGG bit-stream.
pub struct OggWriter {
    buf: Vec<u8>,
    sample_rate: u32,
    channels: u8,
    serial: u32,
    page_index: u32,
    granule: u64,
}

impl OggWriter {
    /// Creates a writer and emits the ID and comment pages into its buffer.
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        let mut writer = Self {
            buf: Vec::new(),
            sample_rate,
            channels,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            page_index: 0,
            granule: 0,
        };
        writer.write_headers();
        writer
    }

    /// Starts a new logical stream: clears position state and re-emits
    /// the ID and comment pages. Pending bytes are discarded.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.page_index = 0;
        self.granule = 0;
        self.serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.write_headers();
    }

    /// Appends one Opus packet as an audio page.
    pub fn write_packet(&mut self, payload: &[u8]) -> Result<(), MediaError> {
        let samples = packet_samples(payload)?;
        self.granule += samples;
        let granule = self.granule;
        self.write_page(HEADER_TYPE_NONE, granule, payload);
        Ok(())
    }

    /// Drains the serialized bytes produced so far.
    pub fn take_pages(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Bytes currently pending in the buffer.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn write_headers(&mut self) {
        // ID page (RFC 7845 §5.1), exactly 19 payload bytes.
        let mut id = Vec::with_capacity(19);
        id.extend_from_slice(b"OpusHead");
        id.push(1); // version
        id.push(self.channels);
        id.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
        id.extend_from_slice(&self.sample_rate.to_le_bytes());
        id.extend_from_slice(&0u16.to_le_bytes()); // output gain
        id.push(0); // channel map
        self.write_page(HEADER_TYPE_BEGINNING_OF_STREAM, 0, &id);

        // Comment page (RFC 7845 §5.2) with an empty user comment list.
        let mut comment = Vec::with_capacity(8 + 4 + VENDOR.len() + 4);
        comment.extend_from_slice(b"OpusTags");
        comment.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
        comment.extend_from_slice(VENDOR);
        comment.extend_from_slice(&0u32.to_le_bytes());
        self.write_page(HEADER_TYPE_NONE, 0, &comment);
    }

    fn write_page(&mut self, header_type: u8, granule: u64, payload: &[u8]) {
        let segments = lacing_values(payload.len());

        let mut page = Vec::with_capacity(27 + segments.len() + payload.len());
        page.extend_from_slice(b"OggS");
        page.push(0); // stream structure version
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&self.serial.to_le_bytes());
        page.extend_from_slice(&self.page_index.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes()); // checksum, patched below
        page.push(segments.len() as u8);
        page.extend_from_slice(&segments);
        page.extend_from_slice(payload);

        let mut crc = PageCrc::new();
        crc.update_slice(&page);
        page[22..26].copy_from_slice(&crc.finish().to_le_bytes());

        self.page_index += 1;
        self.buf.extend_from_slice(&page);
    }
}

/// Splits a payload length into OGG lacing values. A length that is an
/// exact multiple of 255 requires a terminating zero lacing value.
fn lacing_values(mut len: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(len / 255 + 1);
    while len >= 255 {
        values.push(255);
        len -= 255;
    }
    values.push(len as u8);
    values
}
