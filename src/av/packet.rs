use bytes::Bytes;

/// One elementary frame handed to the TS muxer.
///
/// Timestamps are in the 90 kHz media clock.
#[derive(Debug, Clone)]
pub struct Packet {
    pub data: Bytes,
    pub pts: u64,
    pub dts: u64,
    pub track_index: usize,
    pub is_key: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: 0,
            dts: 0,
            track_index: 0,
            is_key: false,
        }
    }

    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = dts;
        self
    }

    pub fn with_track_index(mut self, index: usize) -> Self {
        self.track_index = index;
        self
    }

    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }
}
