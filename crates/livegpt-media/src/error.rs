use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid opus packet")]
    InvalidPacket,

    #[error("bad page header signature")]
    BadPageSignature,

    #[error("wrong header, expected beginning of stream")]
    BadIdPageType,

    #[error("payload for id page must be 19 bytes")]
    BadIdPageLength,

    #[error("bad id page payload signature")]
    BadIdPagePayloadSignature,

    #[error("expected and actual checksum do not match")]
    ChecksumMismatch,

    #[error("stream must contain a single audio channel, got {0}")]
    UnsupportedChannelCount(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
