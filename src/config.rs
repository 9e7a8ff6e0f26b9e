//! Host-level configuration for programs embedding this crate.
//!
//! Nothing under `format::` or `utils::` reads from this module: every codec is a pure
//! function of its input bytes. This exists only for host programs that want a shared place to
//! stash tunables (e.g. how large a jitter buffer to allocate, or what pcap capture length to
//! enforce) without plumbing them through every call site by hand.

use lazy_static::lazy_static;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::RwLock;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Host-level tunables. None of these are consulted by any decode/encode path in this crate.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default jitter buffer capacity for new [`crate::format::rtp::JitterBuffer`]s.
    pub rtp_jitter_buffer_size: usize,
    /// Maximum captured-packet length a pcap reader will accept before treating the record as
    /// malformed rather than truncating silently.
    pub pcap_snaplen: u32,
    /// Suggested read/write buffer size for host programs streaming WAV audio data chunks.
    pub wav_buffer_size: usize,
    /// Suggested capacity hint when a host program pre-sizes a buffer for an HLS playlist line.
    pub hls_line_length_hint: usize,
    /// Suggested capacity hint when a host program pre-sizes a buffer for an SDP line.
    pub sdp_line_length_hint: usize,
    /// Suggested capacity hint when a host program pre-sizes a buffer for a CMCD token list.
    pub cmcd_line_length_hint: usize,
}

impl Config {
    fn new() -> Self {
        let mut config = Config {
            rtp_jitter_buffer_size: 64,
            pcap_snaplen: 262_144,
            wav_buffer_size: 4096,
            hls_line_length_hint: 128,
            sdp_line_length_hint: 96,
            cmcd_line_length_hint: 256,
        };

        if let Ok(size) = env::var("BROADCORE_RTP_JITTER_BUFFER_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.rtp_jitter_buffer_size = parsed;
            }
        }
        if let Ok(snaplen) = env::var("BROADCORE_PCAP_SNAPLEN") {
            if let Ok(parsed) = snaplen.parse() {
                config.pcap_snaplen = parsed;
            }
        }
        if let Ok(size) = env::var("BROADCORE_WAV_BUFFER_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.wav_buffer_size = parsed;
            }
        }
        if let Ok(hint) = env::var("BROADCORE_HLS_LINE_LENGTH_HINT") {
            if let Ok(parsed) = hint.parse() {
                config.hls_line_length_hint = parsed;
            }
        }
        if let Ok(hint) = env::var("BROADCORE_SDP_LINE_LENGTH_HINT") {
            if let Ok(parsed) = hint.parse() {
                config.sdp_line_length_hint = parsed;
            }
        }
        if let Ok(hint) = env::var("BROADCORE_CMCD_LINE_LENGTH_HINT") {
            if let Ok(parsed) = hint.parse() {
                config.cmcd_line_length_hint = parsed;
            }
        }

        let config_paths = ["./config.toml", "./broadcore_config.toml"];
        for path in &config_paths {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    for line in content.lines() {
                        let Some((key, value)) = line.split_once('=') else {
                            continue;
                        };
                        let key = key.trim();
                        let value = value.trim().trim_matches('"').trim_matches('\'');
                        if value.is_empty() {
                            continue;
                        }
                        match key {
                            "rtp_jitter_buffer_size" => {
                                if let Ok(parsed) = value.parse() {
                                    config.rtp_jitter_buffer_size = parsed;
                                }
                            }
                            "pcap_snaplen" => {
                                if let Ok(parsed) = value.parse() {
                                    config.pcap_snaplen = parsed;
                                }
                            }
                            "wav_buffer_size" => {
                                if let Ok(parsed) = value.parse() {
                                    config.wav_buffer_size = parsed;
                                }
                            }
                            "hls_line_length_hint" => {
                                if let Ok(parsed) = value.parse() {
                                    config.hls_line_length_hint = parsed;
                                }
                            }
                            "sdp_line_length_hint" => {
                                if let Ok(parsed) = value.parse() {
                                    config.sdp_line_length_hint = parsed;
                                }
                            }
                            "cmcd_line_length_hint" => {
                                if let Ok(parsed) = value.parse() {
                                    config.cmcd_line_length_hint = parsed;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        config
    }

    pub fn reload() {
        let new_config = Config::new();
        if let Ok(mut config) = CONFIG.write() {
            *config = new_config;
        }
    }
}

/// Returns the configured default RTP jitter buffer size.
pub fn rtp_jitter_buffer_size() -> usize {
    CONFIG.read().unwrap().rtp_jitter_buffer_size
}

/// Returns the configured pcap capture-length ceiling.
pub fn pcap_snaplen() -> u32 {
    CONFIG.read().unwrap().pcap_snaplen
}

/// Returns the configured WAV audio chunk buffer size hint.
pub fn wav_buffer_size() -> usize {
    CONFIG.read().unwrap().wav_buffer_size
}

/// Returns the configured HLS playlist line-length hint.
pub fn hls_line_length_hint() -> usize {
    CONFIG.read().unwrap().hls_line_length_hint
}

/// Returns the configured SDP line-length hint.
pub fn sdp_line_length_hint() -> usize {
    CONFIG.read().unwrap().sdp_line_length_hint
}

/// Returns the configured CMCD token list length hint.
pub fn cmcd_line_length_hint() -> usize {
    CONFIG.read().unwrap().cmcd_line_length_hint
}

/// Creates a default config template file if it doesn't exist.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# broadcore configuration
# This is a template for host programs embedding broadcore; nothing in the
# codec core reads this file.

rtp_jitter_buffer_size = "64"
pcap_snaplen = "262144"
wav_buffer_size = "4096"
hls_line_length_hint = "128"
sdp_line_length_hint = "96"
cmcd_line_length_hint = "256"
"#;
        std::fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sane_tunables() {
        let config = Config::new();
        assert!(config.rtp_jitter_buffer_size > 0);
        assert!(config.pcap_snaplen > 0);
        assert!(config.wav_buffer_size > 0);
        assert!(config.hls_line_length_hint > 0);
        assert!(config.sdp_line_length_hint > 0);
        assert!(config.cmcd_line_length_hint > 0);
    }
}
