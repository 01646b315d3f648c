use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use super::types::*;
use crate::av::{CodecId, MediaKind, Packet};
use crate::codec::aac::{parse_audio_specific_config, AdtsTemplate};
use crate::codec::{h264, h265, is_decoder_config_record, parse_decoder_config_record};
use crate::config::MuxerConfig;
use crate::error::{MpegError, Result};
use crate::format::pes::PESHeader;

/// Destination for finished 188-byte packets.
///
/// `allocate` hands out the buffer a packet is built in and `write` takes it
/// back once full, so callers can pool buffers.
pub trait PacketSink {
    /// Returns an empty buffer with room for at least `size` bytes.
    fn allocate(&mut self, size: usize) -> BytesMut {
        BytesMut::with_capacity(size)
    }

    fn write(&mut self, packet: BytesMut) -> Result<()>;
}

impl PacketSink for Vec<u8> {
    fn write(&mut self, packet: BytesMut) -> Result<()> {
        self.extend_from_slice(&packet);
        Ok(())
    }
}

/// Sink built from an allocate closure and a write closure.
pub struct CallbackSink<A, W> {
    allocate: A,
    write: W,
}

impl<A, W> CallbackSink<A, W>
where
    A: FnMut(usize) -> BytesMut,
    W: FnMut(BytesMut),
{
    pub fn new(allocate: A, write: W) -> Self {
        Self { allocate, write }
    }
}

impl<A, W> PacketSink for CallbackSink<A, W>
where
    A: FnMut(usize) -> BytesMut,
    W: FnMut(BytesMut),
{
    fn allocate(&mut self, size: usize) -> BytesMut {
        (self.allocate)(size)
    }

    fn write(&mut self, packet: BytesMut) -> Result<()> {
        (self.write)(packet);
        Ok(())
    }
}

/// Sink over any `std::io::Write`.
pub struct IoSink<W: Write>(pub W);

impl<W: Write> PacketSink for IoSink<W> {
    fn write(&mut self, packet: BytesMut) -> Result<()> {
        self.0.write_all(&packet)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Prefix {
    None,
    Adts(AdtsTemplate),
    /// Annex-B parameter sets, written before every keyframe.
    Extradata(Bytes),
}

#[derive(Debug)]
struct TsTrack {
    kind: MediaKind,
    stream_type: StreamType,
    prefix: Prefix,
    writer: PesWriter,
}

/// Per-PID packetizer state.
#[derive(Debug)]
struct PesWriter {
    pid: u16,
    stream_id: u8,
    /// Written right after the PES header of every frame.
    marker: &'static [u8],
    continuity_counter: u8,
}

/// Packs elementary frames into a single-program transport stream.
///
/// ```rust
/// use mpegio::av::{CodecId, MediaKind};
/// use mpegio::format::ts::{TsMuxer, TS_PACKET_SIZE};
///
/// # fn main() -> mpegio::Result<()> {
/// let mut muxer = TsMuxer::new(Vec::new());
/// let video = muxer.add_track(MediaKind::Video, CodecId::H264, None)?;
/// muxer.write_header()?;
///
/// muxer.input(video, &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88], 3600, 3600, true)?;
/// assert_eq!(muxer.sink().len() % TS_PACKET_SIZE, 0);
/// # Ok(())
/// # }
/// ```
pub struct TsMuxer<S: PacketSink> {
    config: MuxerConfig,
    sink: S,
    tracks: Vec<TsTrack>,
    header_written: bool,
    pat_counter: u8,
    pmt_counter: u8,
    start_ts: Option<u64>,
    end_ts: Option<u64>,
}

impl<S: PacketSink> TsMuxer<S> {
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, MuxerConfig::default())
    }

    pub fn with_config(sink: S, config: MuxerConfig) -> Self {
        Self {
            config,
            sink,
            tracks: Vec::new(),
            header_written: false,
            pat_counter: 0,
            pmt_counter: 0,
            start_ts: None,
            end_ts: None,
        }
    }

    /// Adds an elementary stream and returns its track index.
    ///
    /// `extradata` is an AudioSpecificConfig for AAC, and Annex-B parameter
    /// sets or an avcC/hvcC record for video.
    pub fn add_track(
        &mut self,
        kind: MediaKind,
        codec: CodecId,
        extradata: Option<&[u8]>,
    ) -> Result<usize> {
        if self.header_written {
            return Err(MpegError::HeaderAlreadyWritten);
        }
        if codec.media_kind() != kind {
            return Err(MpegError::UnsupportedCodec(codec, kind));
        }

        let stream_type = StreamType::from(codec);
        if self.tracks.iter().any(|t| t.stream_type == stream_type) {
            return Err(MpegError::DuplicateStreamType(stream_type.into()));
        }

        let prefix = match extradata.filter(|d| !d.is_empty()) {
            Some(data) if codec == CodecId::Aac => {
                let config = parse_audio_specific_config(data)?;
                Prefix::Adts(AdtsTemplate::new(&config)?)
            }
            Some(data) if kind == MediaKind::Video => {
                if is_decoder_config_record(data) {
                    let record = parse_decoder_config_record(codec, data)?;
                    Prefix::Extradata(Bytes::from(record.annexb()))
                } else {
                    Prefix::Extradata(Bytes::copy_from_slice(data))
                }
            }
            _ => Prefix::None,
        };

        let pid = (self.config.pid_base + self.tracks.len() as u16) & 0x1fff;
        let marker: &'static [u8] = match codec {
            CodecId::H264 if self.config.write_aud => &h264::AUD,
            CodecId::H265 if self.config.write_aud => &h265::AUD,
            _ => &[],
        };
        log::debug!(
            "adding {} track {:?} (stream type 0x{:02x}) on PID 0x{:04x}",
            kind,
            codec,
            u8::from(stream_type),
            pid
        );

        self.tracks.push(TsTrack {
            kind,
            stream_type,
            prefix,
            writer: PesWriter {
                pid,
                stream_id: match kind {
                    MediaKind::Video => STREAM_ID_VIDEO,
                    MediaKind::Audio => STREAM_ID_AUDIO,
                },
                marker,
                continuity_counter: 0,
            },
        });
        Ok(self.tracks.len() - 1)
    }

    /// Writes one PAT and one PMT packet. May be repeated, e.g. at the start
    /// of every segment.
    pub fn write_header(&mut self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(MpegError::NoTracks);
        }

        let pat = PAT::single_program(
            self.config.transport_stream_id,
            self.config.program_number,
            self.config.pmt_pid,
        );
        let mut section = BytesMut::with_capacity(TS_PAYLOAD_SIZE);
        pat.write_section(self.config.psi_crc, &mut section);
        self.pat_counter = self.write_psi_packet(PID_PAT, self.pat_counter, &section)?;

        section.clear();
        self.pmt().write_section(self.config.psi_crc, &mut section);
        self.pmt_counter = self.write_psi_packet(self.config.pmt_pid, self.pmt_counter, &section)?;

        if !self.header_written {
            log::debug!("wrote PAT/PMT for {} tracks", self.tracks.len());
        }
        self.header_written = true;
        Ok(())
    }

    fn pmt(&self) -> PMT {
        let pcr_pid = self
            .tracks
            .iter()
            .find(|t| t.kind == MediaKind::Video)
            .or_else(|| self.tracks.first())
            .map_or(PID_NULL, |t| t.writer.pid);

        PMT {
            program_number: self.config.program_number,
            pcr_pid,
            program_descriptors: Vec::new(),
            elementary_stream_infos: self
                .tracks
                .iter()
                .map(|t| ElementaryStreamInfo {
                    stream_type: t.stream_type.into(),
                    elementary_pid: t.writer.pid,
                    descriptors: Vec::new(),
                })
                .collect(),
        }
    }

    /// Returns the next continuity counter for `pid`.
    fn write_psi_packet(&mut self, pid: u16, counter: u8, section: &[u8]) -> Result<u8> {
        debug_assert!(section.len() < TS_PAYLOAD_SIZE);

        let mut packet = self.sink.allocate(TS_PACKET_SIZE);
        packet.clear();
        TSHeader {
            payload_unit_start: true,
            ..TSHeader::new(pid, counter)
        }
        .write_to(&mut packet);
        packet.put_u8(0); // pointer_field
        packet.put_slice(section);
        packet.put_bytes(0xff, TS_PACKET_SIZE - packet.len());

        self.sink.write(packet)?;
        Ok((counter + 1) & 0x0f)
    }

    /// Packs one frame. `pts`/`dts` are 90 kHz ticks.
    pub fn input(
        &mut self,
        track_index: usize,
        data: &[u8],
        pts: u64,
        dts: u64,
        key: bool,
    ) -> Result<()> {
        if !self.header_written {
            return Err(MpegError::HeaderNotWritten);
        }
        if data.is_empty() {
            return Err(MpegError::InvalidData("empty frame".into()));
        }
        let track = self
            .tracks
            .get_mut(track_index)
            .ok_or(MpegError::TrackNotFound(track_index))?;

        let adts;
        let prefix: &[u8] = match &track.prefix {
            Prefix::Adts(template) => {
                adts = template.header(data.len())?;
                &adts
            }
            Prefix::Extradata(extra) if key => &extra[..],
            _ => &[],
        };

        match self.start_ts {
            Some(start) if pts < start => {
                self.end_ts = Some(start);
                self.start_ts = Some(pts);
            }
            Some(_) => self.end_ts = Some(pts),
            None => {
                self.start_ts = Some(pts);
                self.end_ts = Some(pts);
            }
        }
        let with_pcr = track.kind == MediaKind::Video && self.start_ts == Some(pts);

        track.writer.write(
            &mut self.sink,
            &[prefix, data],
            pts & TIMESTAMP_MASK,
            dts & TIMESTAMP_MASK,
            with_pcr,
        )
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.input(
            packet.track_index,
            &packet.data,
            packet.pts,
            packet.dts,
            packet.is_key,
        )
    }

    /// Starts a new session on the same tracks: timestamps and continuity
    /// counters go back to zero.
    pub fn reset(&mut self) {
        log::debug!("resetting TS muxer session");
        self.start_ts = None;
        self.end_ts = None;
        self.pat_counter = 0;
        self.pmt_counter = 0;
        for track in &mut self.tracks {
            track.writer.continuity_counter = 0;
        }
    }

    /// Drops all tracks; `add_track` and `write_header` start over.
    pub fn clear(&mut self) {
        self.reset();
        self.tracks.clear();
        self.header_written = false;
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// PTS span of the frames written since the last reset.
    pub fn duration(&self) -> u64 {
        match (self.start_ts, self.end_ts) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }

    pub fn pid(&self, track_index: usize) -> Option<u16> {
        self.tracks.get(track_index).map(|t| t.writer.pid)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl PesWriter {
    /// Splits one PES packet over as many TS packets as it takes.
    fn write<S: PacketSink>(
        &mut self,
        sink: &mut S,
        parts: &[&[u8]],
        pts: u64,
        dts: u64,
        with_pcr: bool,
    ) -> Result<()> {
        let size: usize = parts.iter().map(|p| p.len()).sum();

        let mut pes = PESHeader::new(self.stream_id).with_pts(pts).with_dts(dts);
        let pes_packet_length = pes.encoded_len() - 6 + self.marker.len() + size;
        pes.packet_length = u16::try_from(pes_packet_length).unwrap_or(0);

        let mut header_size = pes.encoded_len() + self.marker.len();
        let mut remain = size;
        let mut part = 0;
        let mut offset = 0;
        let mut first = true;

        while remain > 0 {
            let mut field = if first && with_pcr {
                Some(AdaptationField::with_pcr(Pcr::from_clock(pts * 300)))
            } else {
                None
            };
            let mut field_len = field.as_ref().map_or(0, |f| f.encoded_len());

            let space = TS_PAYLOAD_SIZE - field_len;
            if header_size + remain < space {
                let fill = space - header_size - remain;
                match field.as_mut() {
                    Some(f) => f.stuffing += fill,
                    None if fill == 1 => {}
                    None => field = Some(AdaptationField::stuffing(fill)),
                }
                field_len += fill;
            }

            let mut packet = sink.allocate(TS_PACKET_SIZE);
            packet.clear();
            TSHeader {
                payload_unit_start: first,
                adaptation_field_exists: field_len > 0,
                ..TSHeader::new(self.pid, self.continuity_counter)
            }
            .write_to(&mut packet);

            match &field {
                Some(f) => f.write_to(&mut packet),
                None if field_len == 1 => write_empty_adaptation_field(&mut packet),
                None => {}
            }

            if header_size > 0 {
                debug_assert!(TS_PACKET_SIZE - packet.len() > header_size);
                pes.write_to(&mut packet);
                packet.put_slice(self.marker);
                header_size = 0;
            }

            while packet.len() < TS_PACKET_SIZE && remain > 0 {
                let src = parts[part];
                let n = (src.len() - offset).min(TS_PACKET_SIZE - packet.len());
                packet.put_slice(&src[offset..offset + n]);
                offset += n;
                remain -= n;
                if offset == src.len() {
                    part += 1;
                    offset = 0;
                }
            }

            debug_assert_eq!(packet.len(), TS_PACKET_SIZE);
            sink.write(packet)?;
            self.continuity_counter = (self.continuity_counter + 1) & 0x0f;
            first = false;
        }

        log::trace!(
            "PID 0x{:04x}: {} byte frame, pts {} dts {}",
            self.pid,
            size,
            pts,
            dts
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ts::parser::TSPacketParser;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    const SPS_PPS: [u8; 12] = [
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x00, 0x01, 0x68, 0xce,
    ];

    fn packets(data: &[u8]) -> Vec<&[u8]> {
        assert_eq!(data.len() % TS_PACKET_SIZE, 0);
        data.chunks(TS_PACKET_SIZE).collect()
    }

    #[test]
    fn test_header_packets() {
        let mut muxer = TsMuxer::new(Vec::new());
        muxer.add_track(MediaKind::Audio, CodecId::G711A, None).unwrap();
        muxer.add_track(MediaKind::Video, CodecId::H265, None).unwrap();
        muxer.write_header().unwrap();

        let out = muxer.into_sink();
        let parser = TSPacketParser::new();
        let pkts = packets(&out);
        assert_eq!(pkts.len(), 2);

        let pat_packet = parser.parse_packet(pkts[0]).unwrap();
        assert_eq!(pat_packet.header.pid, PID_PAT);
        assert!(pat_packet.header.payload_unit_start);
        let pat = parser
            .parse_pat_section(parser.section_data(pat_packet.payload).unwrap())
            .unwrap();
        assert_eq!(pat.entries[0].program_map_pid, PID_PMT);

        let pmt_packet = parser.parse_packet(pkts[1]).unwrap();
        assert_eq!(pmt_packet.header.pid, PID_PMT);
        let pmt = parser
            .parse_pmt_section(parser.section_data(pmt_packet.payload).unwrap())
            .unwrap();
        assert_eq!(pmt.pcr_pid, 0x101);
        let entries: Vec<(u8, u16)> = pmt
            .elementary_stream_infos
            .iter()
            .map(|e| (e.stream_type, e.elementary_pid))
            .collect();
        assert_eq!(entries, vec![(0x90, 0x100), (0x24, 0x101)]);

        assert!(pkts[1].ends_with(&[0xff, 0xff]));
    }

    #[test]
    fn test_psi_counters_advance() {
        let mut muxer = TsMuxer::new(Vec::new());
        muxer.add_track(MediaKind::Audio, CodecId::Aac, None).unwrap();
        muxer.write_header().unwrap();
        muxer.write_header().unwrap();

        let out = muxer.into_sink();
        let pkts = packets(&out);
        assert_eq!(pkts[0][3] & 0x0f, 0);
        assert_eq!(pkts[2][3] & 0x0f, 1);
        assert_eq!(pkts[3][3] & 0x0f, 1);
    }

    #[test]
    fn test_video_keyframe_layout() {
        let mut muxer = TsMuxer::new(Vec::new());
        let video = muxer
            .add_track(MediaKind::Video, CodecId::H264, Some(&SPS_PPS))
            .unwrap();
        muxer.write_header().unwrap();
        muxer.sink_mut().clear();

        let frame: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        muxer.input(video, &frame, 9000, 6000, true).unwrap();

        let out = muxer.into_sink();
        let parser = TSPacketParser::new();
        let mut payload = Vec::new();
        for (i, raw) in packets(&out).iter().enumerate() {
            let packet = parser.parse_packet(raw).unwrap();
            assert_eq!(packet.header.pid, 0x100);
            assert_eq!(packet.header.continuity_counter as usize, i % 16);
            assert_eq!(packet.header.payload_unit_start, i == 0);
            if i == 0 {
                let pcr = packet.adaptation_field.as_ref().unwrap().pcr.unwrap();
                assert_eq!(pcr.clock(), 9000 * 300);
            }
            payload.extend_from_slice(packet.payload);
        }

        let pes = PESHeader::parse(&payload).unwrap().unwrap();
        assert_eq!(pes.stream_id, STREAM_ID_VIDEO);
        assert_eq!(pes.pts, Some(9000));
        assert_eq!(pes.dts, Some(6000));
        assert_eq!(pes.es_length(), h264::AUD.len() + SPS_PPS.len() + frame.len());

        let es = &payload[pes.header_size()..];
        let mut expected = h264::AUD.to_vec();
        expected.extend_from_slice(&SPS_PPS);
        expected.extend_from_slice(&frame);
        assert_eq!(es, &expected[..]);
    }

    #[test]
    fn test_pcr_only_on_session_start() {
        let mut muxer = TsMuxer::new(Vec::new());
        muxer.add_track(MediaKind::Video, CodecId::H264, None).unwrap();
        muxer.write_header().unwrap();
        muxer.sink_mut().clear();

        muxer.input(0, &[0x65; 300], 3000, 3000, true).unwrap();
        let first_len = muxer.sink().len();
        muxer.input(0, &[0x41; 300], 6000, 6000, false).unwrap();

        let out = muxer.into_sink();
        let parser = TSPacketParser::new();
        let second = parser.parse_packet(&out[first_len..]).unwrap();
        assert!(second.header.payload_unit_start);
        assert!(second
            .adaptation_field
            .map_or(true, |f| f.pcr.is_none()));
    }

    #[test]
    fn test_adaptation_field_fill_sizes() {
        // audio: 19 byte PES header, no AUD, no PCR
        for (len, af) in [(165usize, None), (164, Some(1usize)), (163, Some(2)), (10, Some(155))] {
            let mut muxer = TsMuxer::new(Vec::new());
            muxer.add_track(MediaKind::Audio, CodecId::G711U, None).unwrap();
            muxer.write_header().unwrap();
            muxer.sink_mut().clear();

            muxer.input(0, &vec![0xd5; len], 100, 100, true).unwrap();
            let out = muxer.into_sink();
            assert_eq!(out.len(), TS_PACKET_SIZE, "len {}", len);

            let header = TSPacketParser::new().parse_header(&out).unwrap();
            match af {
                None => assert!(!header.adaptation_field_exists),
                Some(size) => {
                    assert!(header.adaptation_field_exists);
                    assert_eq!(out[4] as usize, size - 1);
                    if size >= 2 {
                        assert_eq!(out[5], 0x00);
                    }
                }
            }
            assert!(out.ends_with(&vec![0xd5; len]));
        }
    }

    #[test]
    fn test_aac_gets_adts_header() {
        let mut muxer = TsMuxer::new(Vec::new());
        let audio = muxer
            .add_track(MediaKind::Audio, CodecId::Aac, Some(&[0x12, 0x10]))
            .unwrap();
        muxer.write_header().unwrap();
        muxer.sink_mut().clear();

        muxer.input(audio, &[0x21; 20], 1000, 1000, true).unwrap();
        let out = muxer.into_sink();
        let packet = TSPacketParser::new().parse_packet(&out).unwrap();
        let adts = &packet.payload[19..26];

        let header = crate::codec::aac::parse_adts_header(adts).unwrap();
        assert_eq!(header.frame_length, 27);
        assert_eq!(header.channel_configuration, 2);
        assert_eq!(&packet.payload[26..], &[0x21; 20]);
    }

    #[test]
    fn test_large_frame_has_unbounded_pes_length() {
        let mut muxer = TsMuxer::new(Vec::new());
        muxer.add_track(MediaKind::Video, CodecId::H265, None).unwrap();
        muxer.write_header().unwrap();
        muxer.sink_mut().clear();

        muxer.input(0, &vec![0x26; 70_000], 0, 0, true).unwrap();
        let out = muxer.into_sink();
        let packet = TSPacketParser::new().parse_packet(&out).unwrap();
        let pes = PESHeader::parse(packet.payload).unwrap().unwrap();
        assert_eq!(pes.packet_length, 0);
        assert_eq!(&packet.payload[19..26], &h265::AUD);

        let last = TSPacketParser::new()
            .parse_packet(&out[out.len() - TS_PACKET_SIZE..])
            .unwrap();
        let count = out.len() / TS_PACKET_SIZE;
        assert_eq!(last.header.continuity_counter as usize, (count - 1) % 16);
    }

    #[test]
    fn test_misuse_errors() {
        let mut muxer = TsMuxer::new(Vec::new());
        assert!(matches!(muxer.write_header(), Err(MpegError::NoTracks)));
        assert!(matches!(
            muxer.add_track(MediaKind::Audio, CodecId::H264, None),
            Err(MpegError::UnsupportedCodec(CodecId::H264, MediaKind::Audio))
        ));

        muxer.add_track(MediaKind::Video, CodecId::H264, None).unwrap();
        assert!(matches!(
            muxer.add_track(MediaKind::Video, CodecId::H264, None),
            Err(MpegError::DuplicateStreamType(0x1b))
        ));
        assert!(matches!(
            muxer.input(0, &[1, 2, 3], 0, 0, true),
            Err(MpegError::HeaderNotWritten)
        ));

        muxer.write_header().unwrap();
        assert!(matches!(
            muxer.add_track(MediaKind::Audio, CodecId::Aac, None),
            Err(MpegError::HeaderAlreadyWritten)
        ));
        assert!(matches!(
            muxer.input(3, &[1, 2, 3], 0, 0, true),
            Err(MpegError::TrackNotFound(3))
        ));
        assert!(matches!(
            muxer.input(0, &[], 0, 0, true),
            Err(MpegError::InvalidData(_))
        ));
    }

    #[test]
    fn test_duration_reset_and_clear() {
        let mut muxer = TsMuxer::new(Vec::new());
        muxer.add_track(MediaKind::Audio, CodecId::G711A, None).unwrap();
        muxer.write_header().unwrap();

        muxer.input(0, &[0xd5; 160], 9000, 9000, true).unwrap();
        muxer.input(0, &[0xd5; 160], 3000, 3000, true).unwrap();
        assert_eq!(muxer.duration(), 6000);
        muxer.input(0, &[0xd5; 160], 12000, 12000, true).unwrap();
        assert_eq!(muxer.duration(), 9000);

        muxer.reset();
        assert_eq!(muxer.duration(), 0);
        muxer.sink_mut().clear();
        muxer.input(0, &[0xd5; 160], 0, 0, true).unwrap();
        assert_eq!(muxer.sink()[3] & 0x0f, 0);
        assert_eq!(muxer.sink()[1] & 0x40, 0x40);

        muxer.clear();
        assert_eq!(muxer.track_count(), 0);
        assert!(matches!(
            muxer.input(0, &[1], 0, 0, true),
            Err(MpegError::HeaderNotWritten)
        ));
        muxer.add_track(MediaKind::Video, CodecId::H264, None).unwrap();
    }

    #[test]
    fn test_callback_sink_and_avcc_extradata() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let allocations = Rc::new(RefCell::new(0usize));
        let sink = {
            let written = written.clone();
            let allocations = allocations.clone();
            CallbackSink::new(
                move |size| {
                    *allocations.borrow_mut() += 1;
                    BytesMut::with_capacity(size)
                },
                move |packet: BytesMut| written.borrow_mut().push(packet.freeze()),
            )
        };

        let avcc = [
            0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1, 0x00, 0x02, 0x67, 0x42, 0x01, 0x00, 0x02, 0x68,
            0xce,
        ];
        let config = MuxerConfig {
            write_aud: false,
            ..Default::default()
        };
        let mut muxer = TsMuxer::with_config(sink, config);
        muxer
            .add_track(MediaKind::Video, CodecId::H264, Some(&avcc))
            .unwrap();
        muxer.write_header().unwrap();
        muxer.input(0, &[0x65, 0x88], 0, 0, true).unwrap();

        let written = written.borrow();
        assert_eq!(written.len(), 3);
        assert_eq!(*allocations.borrow(), 3);
        let packet = TSPacketParser::new().parse_packet(&written[2]).unwrap();
        assert_eq!(
            &packet.payload[19..],
            &[0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x65, 0x88]
        );
    }
}
