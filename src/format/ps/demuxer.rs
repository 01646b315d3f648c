use log::{debug, trace, warn};

use super::types::*;
use crate::av::{CodecId, MediaKind};
use crate::codec::find_start_code;
use crate::config::DemuxerConfig;
use crate::error::{MpegError, Result};
use crate::format::pes::PESHeader;
use crate::format::ts::types::StreamType;

/// A slice of elementary stream payload, valid for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EsFragment<'a> {
    pub data: &'a [u8],
    /// ES bytes declared by the PES header, 0 when unbounded
    pub total: usize,
    /// First fragment of its PES packet
    pub first: bool,
    pub kind: MediaKind,
    pub codec: CodecId,
    pub dts: u64,
    pub pts: u64,
}

/// Receives what [`PsDemuxer::input`] extracts.
pub trait EsHandler {
    fn on_es(&mut self, fragment: EsFragment<'_>) -> Result<()>;

    /// Bytes dropped while looking for the next structure.
    fn on_resync(&mut self, _skipped: usize) {}

    /// A PES packet whose payload is skipped: its stream id is missing from
    /// the stream map, or the mapped stream type is not supported.
    fn on_unknown_stream(&mut self, _stream_id: u8, _stream_type: Option<u8>) {}
}

impl<F> EsHandler for F
where
    F: FnMut(EsFragment<'_>) -> Result<()>,
{
    fn on_es(&mut self, fragment: EsFragment<'_>) -> Result<()> {
        self(fragment)
    }
}

#[derive(Debug, Clone, Copy)]
struct EsTarget {
    kind: MediaKind,
    codec: CodecId,
    dts: u64,
    pts: u64,
}

/// The payload of the PES packet currently being read.
#[derive(Debug)]
struct PesPayload {
    /// `None` while the payload is discarded
    target: Option<EsTarget>,
    total: usize,
    unbounded: bool,
    delivered: usize,
}

enum Step {
    NeedMore,
    Skip(usize),
    Pes(usize, PesPayload),
}

/// Incremental MPEG program stream demuxer.
///
/// `input` consumes as much of the buffer as forms complete structures and
/// returns the count; the caller keeps the rest and presents it again with
/// more data appended.
#[derive(Debug, Default)]
pub struct PsDemuxer {
    config: DemuxerConfig,
    pack_header: Option<PackHeader>,
    system_header: Option<SystemHeader>,
    psm_version: Option<u8>,
    streams: Vec<ElementaryStream>,
    payload: Option<PesPayload>,
    last_timestamps: Option<(u64, u64)>,
}

impl PsDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DemuxerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Most recent pack header.
    pub fn pack_header(&self) -> Option<&PackHeader> {
        self.pack_header.as_ref()
    }

    pub fn system_header(&self) -> Option<&SystemHeader> {
        self.system_header.as_ref()
    }

    /// Elementary streams learned from program stream maps so far.
    pub fn streams(&self) -> &[ElementaryStream] {
        &self.streams
    }

    /// Demuxes as much of `data` as possible and returns the bytes consumed.
    /// The rest must be passed again, with more data appended.
    ///
    /// PES packets that arrive before the first program stream map are
    /// skipped one at a time using their declared length, so anything after
    /// them in the same buffer, a later map included, is still parsed. A
    /// handler error stops the call with [`MpegError::HandlerAborted`], whose
    /// `consumed` count includes the fragment the handler rejected.
    pub fn input<H>(&mut self, data: &[u8], handler: &mut H) -> Result<usize>
    where
        H: EsHandler + ?Sized,
    {
        let mut pos = 0;

        while pos < data.len() {
            if self.payload.is_some() {
                match self.read_payload(&data[pos..], handler) {
                    Ok(0) if self.payload.is_some() => break,
                    Ok(n) => pos += n,
                    Err((n, err)) => {
                        return Err(MpegError::HandlerAborted {
                            consumed: pos + n,
                            source: Box::new(err),
                        })
                    }
                }
                continue;
            }

            match self.read_structure(&data[pos..], handler) {
                Step::NeedMore => break,
                Step::Skip(n) => pos += n,
                Step::Pes(n, payload) => {
                    pos += n;
                    self.payload = Some(payload);
                }
            }
        }

        Ok(pos)
    }

    /// Drops all parse state, including the learned stream map.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Self::with_config(config);
    }

    pub fn close(&mut self) {
        self.reset();
    }

    // Returns the bytes consumed from `data`; the payload stays open when
    // more are needed. A handler error carries the count consumed including
    // the failed fragment.
    fn read_payload<H>(
        &mut self,
        data: &[u8],
        handler: &mut H,
    ) -> std::result::Result<usize, (usize, MpegError)>
    where
        H: EsHandler + ?Sized,
    {
        let lookahead = self.config.lookahead;
        let Some(payload) = self.payload.as_mut() else {
            return Ok(0);
        };

        let (len, done) = if payload.unbounded {
            match find_system_start_code(data) {
                Some(at) => (at, true),
                None => (data.len().saturating_sub(3), false),
            }
        } else {
            let remaining = payload.total - payload.delivered;
            let len = remaining.min(data.len());
            (len, len == remaining)
        };

        if payload.target.is_some() && payload.delivered == 0 && !done {
            let wanted = if payload.unbounded {
                lookahead
            } else {
                lookahead.min(payload.total)
            };
            if len < wanted {
                return Ok(0);
            }
        }

        let mut result = Ok(len);
        if len > 0 {
            if let Some(target) = payload.target {
                let fragment = EsFragment {
                    data: &data[..len],
                    total: if payload.unbounded { 0 } else { payload.total },
                    first: payload.delivered == 0,
                    kind: target.kind,
                    codec: target.codec,
                    dts: target.dts,
                    pts: target.pts,
                };
                if let Err(err) = handler.on_es(fragment) {
                    result = Err((len, err));
                }
            }
            payload.delivered += len;
        }

        if done {
            trace!("PES payload done after {} bytes", payload.delivered);
            self.payload = None;
        }
        result
    }

    fn read_structure<H>(&mut self, data: &[u8], handler: &mut H) -> Step
    where
        H: EsHandler + ?Sized,
    {
        let Some(at) = find_prefix(data) else {
            let skipped = data.len().saturating_sub(3);
            if skipped > 0 {
                handler.on_resync(skipped);
                return Step::Skip(skipped);
            }
            return Step::NeedMore;
        };
        if at > 0 {
            trace!("skipped {} bytes before start code", at);
            handler.on_resync(at);
            return Step::Skip(at);
        }
        if data.len() < 4 {
            return Step::NeedMore;
        }

        let code = data[3];
        let parsed = match code {
            START_CODE_PACK => PackHeader::parse(data).map(|r| {
                r.map(|(header, size)| {
                    trace!("pack header scr={}", header.scr_base);
                    self.pack_header = Some(header);
                    size
                })
            }),
            START_CODE_SYSTEM_HEADER => SystemHeader::parse(data).map(|r| {
                r.map(|(header, size)| {
                    trace!("system header with {} stream bounds", header.streams.len());
                    self.system_header = Some(header);
                    size
                })
            }),
            START_CODE_PSM => ProgramStreamMap::parse(data).map(|r| {
                r.map(|(map, size)| {
                    self.learn_stream_map(map);
                    size
                })
            }),
            STREAM_ID_PRIVATE_1 | STREAM_ID_PADDING | STREAM_ID_PRIVATE_2 => {
                Ok(length_prefixed_size(data))
            }
            id if is_audio_stream_id(id) || is_video_stream_id(id) => {
                return match PESHeader::parse(data) {
                    Ok(Some(header)) => self.open_payload(header, handler),
                    Ok(None) => Step::NeedMore,
                    Err(err) => self.resync(err, handler),
                };
            }
            other => {
                trace!("ignoring start code 0x{:02x}", other);
                handler.on_resync(4);
                return Step::Skip(4);
            }
        };

        match parsed {
            Ok(Some(size)) => Step::Skip(size),
            Ok(None) => Step::NeedMore,
            Err(err) => self.resync(err, handler),
        }
    }

    fn resync<H>(&mut self, err: MpegError, handler: &mut H) -> Step
    where
        H: EsHandler + ?Sized,
    {
        warn!("resynchronising after malformed structure: {}", err);
        handler.on_resync(4);
        Step::Skip(4)
    }

    fn learn_stream_map(&mut self, map: ProgramStreamMap) {
        if !map.crc_valid {
            warn!("program stream map CRC mismatch, using it anyway");
        }
        if self.psm_version != Some(map.version) {
            debug!(
                "program stream map version {} with {} streams",
                map.version,
                map.streams.len()
            );
            self.psm_version = Some(map.version);
        }
        for stream in map.streams {
            if self.streams.iter().any(|s| s.stream_id == stream.stream_id) {
                continue;
            }
            debug!(
                "stream 0x{:02x} has stream type 0x{:02x}",
                stream.stream_id, stream.stream_type
            );
            self.streams.push(stream);
        }
    }

    fn open_payload<H>(&mut self, header: PESHeader, handler: &mut H) -> Step
    where
        H: EsHandler + ?Sized,
    {
        let header_size = header.header_size();
        let unbounded = header.packet_length == 0;
        let total = header.es_length();

        let timestamps = match (header.pts, header.dts) {
            (Some(pts), Some(dts)) => Some((dts, pts)),
            (Some(pts), None) => Some((pts, pts)),
            (None, Some(dts)) => Some((dts, dts)),
            (None, None) => self.last_timestamps,
        };
        if timestamps.is_some() {
            self.last_timestamps = timestamps;
        }
        let (dts, pts) = timestamps.unwrap_or_default();

        let target = if self.streams.is_empty() {
            trace!(
                "discarding PES 0x{:02x} before any program stream map",
                header.stream_id
            );
            None
        } else {
            match self.target_for(header.stream_id) {
                Ok((kind, codec)) => Some(EsTarget {
                    kind,
                    codec,
                    dts,
                    pts,
                }),
                Err(stream_type) => {
                    warn!(
                        "skipping PES for stream 0x{:02x} (stream type {:?})",
                        header.stream_id, stream_type
                    );
                    handler.on_unknown_stream(header.stream_id, stream_type);
                    None
                }
            }
        };

        trace!(
            "PES 0x{:02x} es_length={} dts={} pts={}",
            header.stream_id,
            total,
            dts,
            pts
        );
        Step::Pes(
            header_size,
            PesPayload {
                target,
                total,
                unbounded,
                delivered: 0,
            },
        )
    }

    // Err carries the stream type when the stream id is mapped to one we
    // cannot carry.
    fn target_for(&self, stream_id: u8) -> std::result::Result<(MediaKind, CodecId), Option<u8>> {
        let stream = self
            .streams
            .iter()
            .find(|s| s.stream_id == stream_id)
            .ok_or(None)?;
        let codec = StreamType::try_from(stream.stream_type)
            .map_err(|_| Some(stream.stream_type))?
            .codec();
        Ok((codec.media_kind(), codec))
    }
}

// Offset of the next `00 00 01` prefix.
fn find_prefix(data: &[u8]) -> Option<usize> {
    find_start_code(data, 0).map(|(at, len)| at + len - 3)
}

// Offset of the next start code that can end an unbounded PES payload.
fn find_system_start_code(data: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(at) = find_prefix(&data[from..]).map(|at| from + at) {
        match data.get(at + 3) {
            Some(&code) if code >= START_CODE_SYSTEM_MIN => return Some(at),
            Some(_) => from = at + 1,
            None => return None,
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Fragment {
        data: Vec<u8>,
        total: usize,
        first: bool,
        kind: MediaKind,
        codec: CodecId,
        dts: u64,
        pts: u64,
    }

    #[derive(Default)]
    struct Collector {
        fragments: Vec<Fragment>,
        resyncs: usize,
        unknown: Vec<(u8, Option<u8>)>,
    }

    impl EsHandler for Collector {
        fn on_es(&mut self, f: EsFragment<'_>) -> Result<()> {
            self.fragments.push(Fragment {
                data: f.data.to_vec(),
                total: f.total,
                first: f.first,
                kind: f.kind,
                codec: f.codec,
                dts: f.dts,
                pts: f.pts,
            });
            Ok(())
        }

        fn on_resync(&mut self, skipped: usize) {
            self.resyncs += skipped;
        }

        fn on_unknown_stream(&mut self, stream_id: u8, stream_type: Option<u8>) {
            self.unknown.push((stream_id, stream_type));
        }
    }

    pub(crate) fn psm(streams: &[(StreamType, u8)]) -> BytesMut {
        let map = ProgramStreamMap {
            current_next: true,
            streams: streams
                .iter()
                .map(|&(t, id)| ElementaryStream::new(t, id))
                .collect(),
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        map.write_to(&mut buf);
        buf
    }

    pub(crate) fn pes(buf: &mut BytesMut, stream_id: u8, pts: Option<u64>, dts: Option<u64>, es: &[u8]) {
        let mut header = PESHeader::new(stream_id);
        if let Some(pts) = pts {
            header = header.with_pts(pts);
        }
        if let Some(dts) = dts {
            header = header.with_dts(dts);
        }
        header.packet_length = (header.encoded_len() - 6 + es.len()) as u16;
        header.write_to(buf);
        buf.put_slice(es);
    }

    fn av_stream() -> BytesMut {
        let mut buf = BytesMut::new();
        PackHeader::default().write_to(&mut buf);
        buf.extend_from_slice(&psm(&[(StreamType::H264, 0xe0), (StreamType::G711A, 0xc0)]));
        pes(&mut buf, 0xe0, Some(3600), Some(3000), &[0, 0, 0, 1, 0x65, 0x88, 0x84]);
        pes(&mut buf, 0xc0, Some(3000), None, &[0xd5; 160]);
        buf
    }

    #[test]
    fn test_single_call() {
        let data = av_stream();
        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        let consumed = demuxer.input(&data, &mut collector).unwrap();

        assert_eq!(consumed, data.len());
        assert_eq!(collector.resyncs, 0);
        assert_eq!(
            collector.fragments,
            vec![
                Fragment {
                    data: vec![0, 0, 0, 1, 0x65, 0x88, 0x84],
                    total: 7,
                    first: true,
                    kind: MediaKind::Video,
                    codec: CodecId::H264,
                    dts: 3000,
                    pts: 3600,
                },
                Fragment {
                    data: vec![0xd5; 160],
                    total: 160,
                    first: true,
                    kind: MediaKind::Audio,
                    codec: CodecId::G711A,
                    dts: 3000,
                    pts: 3000,
                },
            ]
        );
        assert_eq!(demuxer.streams().len(), 2);
        assert!(demuxer.pack_header().is_some());
    }

    #[test]
    fn test_short_reads_roll_back() {
        let data = av_stream();
        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();

        // Half a pack header
        assert_eq!(demuxer.input(&data[..8], &mut collector).unwrap(), 0);
        // Pack header plus half the PSM
        assert_eq!(demuxer.input(&data[..20], &mut collector).unwrap(), 14);
        assert!(demuxer.streams().is_empty());
        assert!(collector.fragments.is_empty());
    }

    #[test]
    fn test_lookahead_holds_first_fragment() {
        let data = av_stream();
        let video_start = data.len() - (14 + 160) - (19 + 7);
        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();

        // PES header plus 2 payload bytes: header consumed, payload held back
        let consumed = demuxer
            .input(&data[..video_start + 19 + 2], &mut collector)
            .unwrap();
        assert_eq!(consumed, video_start + 19);
        assert!(collector.fragments.is_empty());

        let consumed = demuxer
            .input(&data[video_start + 19..video_start + 19 + 6], &mut collector)
            .unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(collector.fragments.len(), 1);
        assert!(collector.fragments[0].first);

        demuxer
            .input(&data[video_start + 25..], &mut collector)
            .unwrap();
        assert_eq!(collector.fragments.len(), 3);
        assert_eq!(collector.fragments[1].data, vec![0x84]);
        assert!(!collector.fragments[1].first);
        assert_eq!(collector.fragments[1].total, 7);
    }

    #[test]
    fn test_pes_before_stream_map_is_discarded() {
        let mut data = BytesMut::new();
        pes(&mut data, 0xe0, Some(1), None, &[1, 2, 3, 4, 5, 6, 7, 8]);
        data.extend_from_slice(&psm(&[(StreamType::H265, 0xe0)]));
        pes(&mut data, 0xe0, Some(2), None, &[0, 0, 1, 0x26, 0x01]);

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        assert_eq!(demuxer.input(&data, &mut collector).unwrap(), data.len());
        assert_eq!(collector.fragments.len(), 1);
        assert_eq!(collector.fragments[0].codec, CodecId::H265);
        assert_eq!(collector.fragments[0].pts, 2);
    }

    #[test]
    fn test_unknown_stream_is_skipped() {
        let mut data = psm(&[(StreamType::Aac, 0xc0)]);
        pes(&mut data, 0xe0, Some(1), None, &[9; 32]);
        data.extend_from_slice(&raw_psm(0x03, 0xc1));
        pes(&mut data, 0xc1, Some(1), None, &[8; 16]);
        pes(&mut data, 0xc0, Some(1), None, &[0xff, 0xf1, 0x50, 0x80, 0x01, 0x1f, 0xfc]);

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        assert_eq!(demuxer.input(&data, &mut collector).unwrap(), data.len());
        assert_eq!(collector.unknown, vec![(0xe0, None), (0xc1, Some(0x03))]);
        assert_eq!(collector.fragments.len(), 1);
        assert_eq!(collector.fragments[0].codec, CodecId::Aac);
    }

    fn raw_psm(stream_type: u8, stream_id: u8) -> BytesMut {
        let map = ProgramStreamMap {
            current_next: true,
            version: 1,
            streams: vec![ElementaryStream {
                stream_type,
                stream_id,
                descriptors: Vec::new(),
            }],
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        map.write_to(&mut buf);
        buf
    }

    #[test]
    fn test_resync_over_garbage() {
        let mut data = BytesMut::new();
        data.put_slice(&[0x12, 0x34, 0x00, 0x00, 0x01, 0x42, 0x77]);
        data.extend_from_slice(&av_stream());

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        assert_eq!(demuxer.input(&data, &mut collector).unwrap(), data.len());
        // 2 leading bytes, the bogus start code, then one byte before the pack
        assert_eq!(collector.resyncs, 2 + 4 + 1);
        assert_eq!(collector.fragments.len(), 2);
    }

    #[test]
    fn test_trailing_bytes_keep_possible_prefix() {
        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        let consumed = demuxer
            .input(&[0xaa, 0xbb, 0xcc, 0xdd, 0x00, 0x00], &mut collector)
            .unwrap();
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_private_and_padding_skipped() {
        let mut data = psm(&[(StreamType::G711U, 0xc0)]);
        data.put_slice(&[0x00, 0x00, 0x01, STREAM_ID_PADDING, 0x00, 0x04, 0xff, 0xff, 0xff, 0xff]);
        data.put_slice(&[0x00, 0x00, 0x01, STREAM_ID_PRIVATE_1, 0x00, 0x02, 0x80, 0x01]);
        pes(&mut data, 0xc0, None, Some(900), &[0x7f; 8]);

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        assert_eq!(demuxer.input(&data, &mut collector).unwrap(), data.len());
        assert_eq!(collector.resyncs, 0);
        assert_eq!(collector.fragments.len(), 1);
        assert_eq!(collector.fragments[0].pts, 900);
        assert_eq!(collector.fragments[0].dts, 900);
    }

    #[test]
    fn test_timestamps_inherited() {
        let mut data = psm(&[(StreamType::H264, 0xe0)]);
        pes(&mut data, 0xe0, Some(7200), Some(3600), &[0, 0, 0, 1, 0x41, 0x9a, 0x00]);
        pes(&mut data, 0xe0, None, None, &[1, 2, 3, 4, 5, 6]);

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        demuxer.input(&data, &mut collector).unwrap();
        assert_eq!(collector.fragments.len(), 2);
        assert_eq!(collector.fragments[1].dts, 3600);
        assert_eq!(collector.fragments[1].pts, 7200);
        assert!(collector.fragments[1].first);
    }

    #[test]
    fn test_unbounded_pes() {
        let mut data = psm(&[(StreamType::H264, 0xe0)]);
        let mut header = PESHeader::new(0xe0).with_pts(90);
        header.packet_length = 0;
        header.write_to(&mut data);
        let payload = [0, 0, 0, 1, 0x65, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        data.put_slice(&payload);
        let end = data.len();
        PackHeader::default().write_to(&mut data);

        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();

        // Without the next pack the last 3 bytes stay behind
        let consumed = demuxer.input(&data[..end], &mut collector).unwrap();
        assert_eq!(consumed, end - 3);
        assert_eq!(collector.fragments.len(), 1);
        assert_eq!(collector.fragments[0].total, 0);
        assert_eq!(collector.fragments[0].data, payload[..payload.len() - 3].to_vec());

        let consumed = demuxer.input(&data[end - 3..], &mut collector).unwrap();
        assert_eq!(consumed, data.len() - (end - 3));
        assert_eq!(collector.fragments.len(), 2);
        assert_eq!(collector.fragments[1].data, vec![7, 8, 9]);
        assert!(!collector.fragments[1].first);
    }

    #[test]
    fn test_handler_error_reports_consumed() {
        let data = av_stream();
        let mut demuxer = PsDemuxer::new();
        let mut calls = 0;
        let mut handler = |_f: EsFragment<'_>| -> Result<()> {
            calls += 1;
            Err(MpegError::Codec("stop".into()))
        };

        let err = demuxer.input(&data, &mut handler).unwrap_err();
        match err {
            MpegError::HandlerAborted { consumed, .. } => {
                assert_eq!(consumed, data.len() - (14 + 160));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_reset_forgets_stream_map() {
        let data = av_stream();
        let mut demuxer = PsDemuxer::new();
        let mut collector = Collector::default();
        demuxer.input(&data, &mut collector).unwrap();
        demuxer.reset();
        assert!(demuxer.streams().is_empty());
        assert!(demuxer.pack_header().is_none());
    }
}
