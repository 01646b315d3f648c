use bytes::{Buf, BytesMut};
use log::{debug, warn};

use super::demuxer::{EsFragment, EsHandler, PsDemuxer};
use crate::av::{CodecId, MediaKind};
use crate::codec::KeyframeScanner;
use crate::config::DemuxerConfig;
use crate::error::{MpegError, Result};

/// Receives frames reassembled from a program stream.
///
/// Payload arrives through `on_part_packet` as it is demuxed; one of
/// `on_loss_packet` or `on_complete_packet` closes each frame.
pub trait PacketHandler {
    /// `first` marks the first bytes of a new frame. `data` is only valid
    /// for the duration of the call.
    fn on_part_packet(
        &mut self,
        track: usize,
        kind: MediaKind,
        codec: CodecId,
        data: &[u8],
        first: bool,
    );

    /// The frame ended with fewer bytes than its PES header declared.
    fn on_loss_packet(&mut self, track: usize, kind: MediaKind, codec: CodecId);

    fn on_complete_packet(
        &mut self,
        track: usize,
        kind: MediaKind,
        codec: CodecId,
        dts: u64,
        pts: u64,
        key: bool,
    ) -> Result<()>;
}

/// Optional per-session hooks for counting what the demuxer sees.
pub trait DemuxObserver {
    fn on_fragment(&mut self, _fragment: &EsFragment<'_>) {}

    fn on_resync(&mut self, _skipped: usize) {}

    fn on_unknown_stream(&mut self, _stream_id: u8, _stream_type: Option<u8>) {}

    fn on_frame_complete(&mut self, _track: usize, _kind: MediaKind, _size: usize) {}

    fn on_frame_lost(&mut self, _track: usize, _kind: MediaKind, _received: usize, _expected: usize) {}
}

#[derive(Debug)]
struct PendingFrame {
    kind: MediaKind,
    codec: CodecId,
    /// Declared by the frame's first PES header, 0 when unbounded
    total: usize,
    received: usize,
    dts: u64,
    pts: u64,
    keyframe: KeyframeScanner,
}

/// Turns ES fragments into partial, lost and complete frame events.
///
/// A frame ends when the first fragment of a PES packet arrives with a later
/// timestamp or a different media kind, or on [`FrameAssembler::flush`].
pub struct FrameAssembler<H> {
    handler: H,
    observer: Option<Box<dyn DemuxObserver>>,
    pending: Option<PendingFrame>,
    tracks: Vec<MediaKind>,
}

impl<H: PacketHandler> FrameAssembler<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            observer: None,
            pending: None,
            tracks: Vec::new(),
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn DemuxObserver>) {
        self.observer = Some(observer);
    }

    /// Track index of `kind`, in order of first appearance.
    fn track_index(&mut self, kind: MediaKind) -> usize {
        match self.tracks.iter().position(|k| *k == kind) {
            Some(index) => index,
            None => {
                debug!("track {} is {}", self.tracks.len(), kind);
                self.tracks.push(kind);
                self.tracks.len() - 1
            }
        }
    }

    /// Closes the pending frame, if any.
    pub fn flush(&mut self) -> Result<()> {
        let Some(frame) = self.pending.take() else {
            return Ok(());
        };
        let track = self.track_index(frame.kind);

        if frame.received < frame.total {
            warn!(
                "lost {} frame on track {}: {} of {} bytes",
                frame.kind, track, frame.received, frame.total
            );
            if let Some(observer) = self.observer.as_mut() {
                observer.on_frame_lost(track, frame.kind, frame.received, frame.total);
            }
            self.handler.on_loss_packet(track, frame.kind, frame.codec);
            return Ok(());
        }

        if let Some(observer) = self.observer.as_mut() {
            observer.on_frame_complete(track, frame.kind, frame.received);
        }
        let key = frame.kind == MediaKind::Video && frame.keyframe.is_keyframe();
        self.handler
            .on_complete_packet(track, frame.kind, frame.codec, frame.dts, frame.pts, key)
    }

    /// Drops the pending frame without reporting it.
    pub fn discard(&mut self) {
        self.pending = None;
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<H: PacketHandler> EsHandler for FrameAssembler<H> {
    fn on_es(&mut self, fragment: EsFragment<'_>) -> Result<()> {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_fragment(&fragment);
        }

        let ends_pending = self.pending.as_ref().is_some_and(|frame| {
            fragment.dts > frame.dts || fragment.pts > frame.pts || fragment.kind != frame.kind
        });
        if fragment.first && ends_pending {
            self.flush()?;
        }

        let frame = self.pending.get_or_insert_with(|| PendingFrame {
            kind: fragment.kind,
            codec: fragment.codec,
            total: fragment.total,
            received: 0,
            dts: fragment.dts,
            pts: fragment.pts,
            keyframe: KeyframeScanner::new(fragment.codec),
        });
        let starts_frame = frame.received == 0;
        frame.received += fragment.data.len();

        // Every fragment counts until the first slice NAL unit decides
        if frame.kind == MediaKind::Video {
            frame.keyframe.push(fragment.data);
        }

        let track = self.track_index(fragment.kind);
        self.handler.on_part_packet(
            track,
            fragment.kind,
            fragment.codec,
            fragment.data,
            starts_frame,
        );
        Ok(())
    }

    fn on_resync(&mut self, skipped: usize) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_resync(skipped);
        }
    }

    fn on_unknown_stream(&mut self, stream_id: u8, stream_type: Option<u8>) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_unknown_stream(stream_id, stream_type);
        }
    }
}

/// A PS demux session: demuxer, frame assembly and the bytes carried over
/// between `input` calls.
///
/// ```rust
/// use mpegio::av::{CodecId, MediaKind};
/// use mpegio::format::ps::{PacketHandler, PsDemuxerContext};
///
/// struct Frames(Vec<Vec<u8>>, Vec<u8>);
///
/// impl PacketHandler for Frames {
///     fn on_part_packet(&mut self, _: usize, _: MediaKind, _: CodecId, data: &[u8], _: bool) {
///         self.1.extend_from_slice(data);
///     }
///
///     fn on_loss_packet(&mut self, _: usize, _: MediaKind, _: CodecId) {
///         self.1.clear();
///     }
///
///     fn on_complete_packet(
///         &mut self, _: usize, _: MediaKind, _: CodecId, _: u64, _: u64, _: bool,
///     ) -> mpegio::Result<()> {
///         self.0.push(std::mem::take(&mut self.1));
///         Ok(())
///     }
/// }
///
/// let mut session = PsDemuxerContext::new(Frames(Vec::new(), Vec::new()));
/// session.input(&[0x00, 0x00, 0x01, 0xba])?;
/// session.flush()?;
/// assert!(session.handler().0.is_empty());
/// # Ok::<(), mpegio::MpegError>(())
/// ```
pub struct PsDemuxerContext<H> {
    demuxer: PsDemuxer,
    probe: BytesMut,
    assembler: FrameAssembler<H>,
}

impl<H: PacketHandler> PsDemuxerContext<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(DemuxerConfig::default(), handler)
    }

    pub fn with_config(config: DemuxerConfig, handler: H) -> Self {
        Self {
            demuxer: PsDemuxer::with_config(config),
            probe: BytesMut::new(),
            assembler: FrameAssembler::new(handler),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn DemuxObserver>) -> Self {
        self.assembler.set_observer(observer);
        self
    }

    /// Feeds the next chunk of the program stream. Any split of the stream
    /// into chunks produces the same events.
    pub fn input(&mut self, data: &[u8]) -> Result<()> {
        if self.probe.is_empty() {
            let result = self.demuxer.input(data, &mut self.assembler);
            let consumed = consumed_by(&result, data.len());
            self.probe.extend_from_slice(&data[consumed..]);
            return result.map(|_| ());
        }

        self.probe.extend_from_slice(data);
        let result = self.demuxer.input(&self.probe, &mut self.assembler);
        let consumed = consumed_by(&result, self.probe.len());
        self.probe.advance(consumed);
        result.map(|_| ())
    }

    /// Closes the frame in flight. Bytes still waiting for more input are
    /// kept.
    pub fn flush(&mut self) -> Result<()> {
        self.assembler.flush()
    }

    /// Ends the session without reporting the frame in flight.
    pub fn close(&mut self) {
        debug!(
            "closing PS session with {} buffered bytes",
            self.probe.len()
        );
        self.assembler.discard();
        self.probe.clear();
        self.demuxer.close();
    }

    /// Elementary streams declared by the program stream map.
    pub fn track_count(&self) -> usize {
        self.demuxer.streams().len()
    }

    pub fn demuxer(&self) -> &PsDemuxer {
        &self.demuxer
    }

    /// Bytes held until more input arrives.
    pub fn buffered(&self) -> usize {
        self.probe.len()
    }

    pub fn handler(&self) -> &H {
        self.assembler.handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.assembler.handler_mut()
    }

    pub fn into_handler(self) -> H {
        self.assembler.into_handler()
    }
}

fn consumed_by(result: &Result<usize>, available: usize) -> usize {
    match result {
        Ok(n) => *n,
        Err(MpegError::HandlerAborted { consumed, .. }) => *consumed,
        Err(_) => 0,
    }
    .min(available)
}
