use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpegError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("codec {0:?} cannot be carried as {1}")]
    UnsupportedCodec(crate::av::CodecId, crate::av::MediaKind),

    #[error("stream type 0x{0:02x} is not supported")]
    UnsupportedStreamType(u8),

    #[error("a track with stream type 0x{0:02x} already exists")]
    DuplicateStreamType(u8),

    #[error("track {0} does not exist")]
    TrackNotFound(usize),

    #[error("no tracks have been added")]
    NoTracks,

    #[error("write_header must be called before input")]
    HeaderNotWritten,

    #[error("tracks cannot be added after write_header")]
    HeaderAlreadyWritten,

    #[error("crc mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    Crc { expected: u32, actual: u32 },

    #[error("handler aborted after {consumed} bytes: {source}")]
    HandlerAborted {
        consumed: usize,
        #[source]
        source: Box<MpegError>,
    },
}

pub type Result<T> = std::result::Result<T, MpegError>;
