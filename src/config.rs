use std::env;
use std::str::FromStr;

use crate::format::ts::types::{PID_PMT, TS_PACKET_START_PID};

/// Settings for one PS demux session.
#[derive(Debug, Clone)]
pub struct DemuxerConfig {
    /// Bytes of a new PES payload that must be buffered before the first
    /// fragment is handed out, so keyframe sniffing sees a whole NAL header.
    pub lookahead: usize,
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self { lookahead: 6 }
    }
}

impl DemuxerConfig {
    /// Defaults overridden by `MPEGIO_LOOKAHEAD` when it is set and parses.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(lookahead) = env_value("MPEGIO_LOOKAHEAD") {
            config.lookahead = lookahead;
        }
        config
    }
}

/// Settings for one TS mux session.
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// PID of the first elementary track; later tracks count up from here.
    pub pid_base: u16,
    pub pmt_pid: u16,
    pub program_number: u16,
    pub transport_stream_id: u16,
    /// Prefix every video PES with an access unit delimiter.
    pub write_aud: bool,
    /// Append CRC32 to PAT/PMT sections.
    pub psi_crc: bool,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            pid_base: TS_PACKET_START_PID,
            pmt_pid: PID_PMT,
            program_number: 1,
            transport_stream_id: 1,
            write_aud: true,
            psi_crc: true,
        }
    }
}

impl MuxerConfig {
    /// Defaults overridden by the `MPEGIO_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(pid) = env_value::<u16>("MPEGIO_PID_BASE") {
            config.pid_base = pid & 0x1fff;
        }
        if let Some(pid) = env_value::<u16>("MPEGIO_PMT_PID") {
            config.pmt_pid = pid & 0x1fff;
        }
        if let Some(program) = env_value("MPEGIO_PROGRAM_NUMBER") {
            config.program_number = program;
        }
        if let Some(write_aud) = env_value("MPEGIO_WRITE_AUD") {
            config.write_aud = write_aud;
        }
        if let Some(psi_crc) = env_value("MPEGIO_PSI_CRC") {
            config.psi_crc = psi_crc;
        }

        config
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| v.to_string().parse().ok()),
        None => raw.parse().ok(),
    };
    if parsed.is_none() {
        log::warn!("ignoring unparsable {}={:?}", key, raw);
    }
    parsed
}
