//! OGG packetizer: extracts whole Opus packets from an OGG bit-stream.
//!
//! Stock OGG readers stop at page granularity; the outbound room track
//! needs individual Opus packets because each one becomes a media sample
//! with its own duration. A packet may lap across segments: segments of
//! exactly 255 bytes continue into the next one, the first shorter
//! segment terminates the packet (RFC 3533 §5).

use std::io::{ErrorKind, Read};

use bytes::Bytes;

use crate::crc::PageCrc;
use crate::error::MediaError;

const PAGE_HEADER_LEN: usize = 27;
const PAGE_SIGNATURE: &[u8; 4] = b"OggS";
const HEADER_TYPE_BEGINNING_OF_STREAM: u8 = 0x02;

const ID_PAGE_SIGNATURE: &[u8; 8] = b"OpusHead";
const ID_PAGE_PAYLOAD_LEN: usize = 19;

/// Metadata parsed from the stream's ID page (RFC 7845 §5.1).
///
/// Note that `sample_rate` is the *input* rate the encoder saw, not the
/// rate to use for playback; granule positions always count 48 kHz
/// samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggIdHeader {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub sample_rate: u32,
    pub output_gain: u16,
    pub channel_map: u8,
}

#[derive(Debug)]
struct Page {
    segments: Vec<u8>,
    payload: Vec<u8>,
    segment: usize,
    offset: usize,
}

/// Reads OGG pages and yields whole Opus packets.
#[derive(Debug)]
pub struct OggPacketizer<R> {
    stream: R,
    header: OggIdHeader,
    page: Option<Page>,
    validate_crc: bool,
}

impl<R: Read> OggPacketizer<R> {
    /// Validates the ID page, skips the comment page, and positions the
    /// packetizer at the first audio packet. Page checksums are verified.
    pub fn new(stream: R) -> Result<Self, MediaError> {
        Self::with_crc(stream, true)
    }

    /// Like [`OggPacketizer::new`] but without per-page CRC validation.
    pub fn without_crc(stream: R) -> Result<Self, MediaError> {
        Self::with_crc(stream, false)
    }

    fn with_crc(stream: R, validate_crc: bool) -> Result<Self, MediaError> {
        let mut packetizer = Self {
            stream,
            header: OggIdHeader {
                version: 0,
                channels: 0,
                pre_skip: 0,
                sample_rate: 0,
                output_gain: 0,
                channel_map: 0,
            },
            page: None,
            validate_crc,
        };

        packetizer.read_id_page()?;
        // The comment page carries no audio; drop it.
        let _ = packetizer.read_page();

        Ok(packetizer)
    }

    /// The ID header parsed at construction.
    pub fn id_header(&self) -> &OggIdHeader {
        &self.header
    }

    fn read_id_page(&mut self) -> Result<(), MediaError> {
        let page = self
            .read_page()?
            .ok_or(MediaError::Io(ErrorKind::UnexpectedEof.into()))?;

        if page.header_type != HEADER_TYPE_BEGINNING_OF_STREAM {
            return Err(MediaError::BadIdPageType);
        }
        if page.payload.len() != ID_PAGE_PAYLOAD_LEN {
            return Err(MediaError::BadIdPageLength);
        }
        if &page.payload[..8] != ID_PAGE_SIGNATURE {
            return Err(MediaError::BadIdPagePayloadSignature);
        }

        self.header = OggIdHeader {
            version: page.payload[8],
            channels: page.payload[9],
            pre_skip: u16::from_le_bytes([page.payload[10], page.payload[11]]),
            sample_rate: u32::from_le_bytes([
                page.payload[12],
                page.payload[13],
                page.payload[14],
                page.payload[15],
            ]),
            output_gain: u16::from_le_bytes([page.payload[16], page.payload[17]]),
            channel_map: page.payload[18],
        };
        Ok(())
    }

    fn read_page(&mut self) -> Result<Option<RawPage>, MediaError> {
        let mut header = [0u8; PAGE_HEADER_LEN];
        match self.stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if &header[..4] != PAGE_SIGNATURE {
            return Err(MediaError::BadPageSignature);
        }

        let segment_count = header[26] as usize;
        let mut segments = vec![0u8; segment_count];
        self.stream.read_exact(&mut segments)?;

        let payload_len: usize = segments.iter().map(|&s| s as usize).sum();
        let mut payload = vec![0u8; payload_len];
        self.stream.read_exact(&mut payload)?;

        if self.validate_crc {
            let mut crc = PageCrc::new();
            for (index, &byte) in header.iter().enumerate() {
                // The checksum field itself is computed as zero.
                if (22..26).contains(&index) {
                    crc.update(0);
                } else {
                    crc.update(byte);
                }
            }
            crc.update_slice(&segments);
            crc.update_slice(&payload);

            let expected = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
            if crc.finish() != expected {
                return Err(MediaError::ChecksumMismatch);
            }
        }

        Ok(Some(RawPage {
            header_type: header[5],
            segments,
            payload,
        }))
    }

    /// Yields the next Opus packet, or `None` at end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Bytes>, MediaError> {
        loop {
            if self.page.is_none() {
                match self.read_page()? {
                    Some(raw) => {
                        if raw.segments.is_empty() {
                            continue; // nothing lives on this page
                        }
                        self.page = Some(Page {
                            segments: raw.segments,
                            payload: raw.payload,
                            segment: 0,
                            offset: 0,
                        });
                    }
                    None => return Ok(None),
                }
            }

            let page = self.page.as_mut().expect("page populated above");

            let mut packet_size = 0usize;
            let mut page_exhausted = false;
            loop {
                let segment = page.segments[page.segment] as usize;
                packet_size += segment;

                page.segment += 1;
                if page.segment == page.segments.len() {
                    page_exhausted = true;
                    break;
                }
                if segment != 255 {
                    break;
                }
            }

            let packet = Bytes::copy_from_slice(&page.payload[page.offset..page.offset + packet_size]);
            page.offset += packet_size;

            if page_exhausted {
                self.page = None;
            }
            return Ok(Some(packet));
        }
    }
}

struct RawPage {
    header_type: u8,
    segments: Vec<u8>,
    payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg_writer::OggWriter;
    use std::io::Cursor;

    fn stream_with(packets: &[&[u8]]) -> Vec<u8> {
        let mut writer = OggWriter::new(48_000, 1);
        for p in packets {
            writer.write_packet(p).unwrap();
        }
        writer.take_pages()
    }

    #[test]
    fn parses_id_header() {
        let bytes = stream_with(&[&[0xf8, 1, 2]]);
        let packetizer = OggPacketizer::new(Cursor::new(bytes)).unwrap();
        let header = packetizer.id_header();
        assert_eq!(header.version, 1);
        assert_eq!(header.channels, 1);
        assert_eq!(header.sample_rate, 48_000);
    }

    #[test]
    fn yields_packets_in_order() {
        let packets: Vec<Vec<u8>> = vec![
            vec![0xf8, 0xde, 0xad],
            vec![0xf8; 100],
            vec![0xf9, 0x01],
        ];
        let refs: Vec<&[u8]> = packets.iter().map(|p| p.as_slice()).collect();
        let bytes = stream_with(&refs);

        let mut packetizer = OggPacketizer::new(Cursor::new(bytes)).unwrap();
        for expected in &packets {
            let got = packetizer.read_packet().unwrap().unwrap();
            assert_eq!(&got[..], expected.as_slice());
        }
        assert!(packetizer.read_packet().unwrap().is_none());
    }

    #[test]
    fn reassembles_lapped_segments() {
        // 700 bytes laps across 255 + 255 + 190 segments.
        let mut big = vec![0u8; 700];
        big[0] = 0xf8;
        for (i, b) in big.iter_mut().enumerate().skip(1) {
            *b = (i % 251) as u8;
        }
        let bytes = stream_with(&[&big]);

        let mut packetizer = OggPacketizer::new(Cursor::new(bytes)).unwrap();
        let got = packetizer.read_packet().unwrap().unwrap();
        assert_eq!(&got[..], big.as_slice());
        assert!(packetizer.read_packet().unwrap().is_none());
    }

    #[test]
    fn packet_of_exact_segment_multiple() {
        // 510 bytes: 255 + 255 + terminating 0 lacing value.
        let mut exact = vec![0u8; 510];
        exact[0] = 0xf8;
        let bytes = stream_with(&[&exact, &[0xf8, 7]]);

        let mut packetizer = OggPacketizer::new(Cursor::new(bytes)).unwrap();
        assert_eq!(&packetizer.read_packet().unwrap().unwrap()[..], &exact[..]);
        assert_eq!(
            &packetizer.read_packet().unwrap().unwrap()[..],
            &[0xf8, 7][..]
        );
        assert!(packetizer.read_packet().unwrap().is_none());
    }

    #[test]
    fn detects_corrupt_page() {
        let mut bytes = stream_with(&[&[0xf8, 1, 2, 3]]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut packetizer = OggPacketizer::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            packetizer.read_packet(),
            Err(MediaError::ChecksumMismatch)
        ));
    }

    #[test]
    fn corrupt_page_passes_without_crc() {
        let mut bytes = stream_with(&[&[0xf8, 1, 2, 3]]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut packetizer = OggPacketizer::without_crc(Cursor::new(bytes)).unwrap();
        assert!(packetizer.read_packet().unwrap().is_some());
    }

    #[test]
    fn rejects_missing_id_page() {
        let err = OggPacketizer::new(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = stream_with(&[&[0xf8]]);
        bytes[0] = b'X';
        let err = OggPacketizer::new(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, MediaError::BadPageSignature));
    }

    #[test]
    fn rejects_non_opus_id_payload() {
        let mut bytes = stream_with(&[&[0xf8]]);
        // Corrupt the OpusHead magic inside the first page payload
        // (27-byte header + 1 lacing byte precede it), then fix the CRC
        // by disabling validation.
        bytes[28] = b'X';
        let err = OggPacketizer::without_crc(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, MediaError::BadIdPagePayloadSignature));
    }
}
