//! Configuration for nfanon
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - CryptoPAn key parsing

use crate::anon::KEY_LEN;
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum accepted length of the `-K` argument: `0x` + 64 hex digits
pub const MAX_KEY_ARG_LEN: usize = 66;

/// Hard cap on the worker pool size
pub const MAX_WORKERS: usize = 32;

/// Default worker ceiling; more cores than this are left idle
const DEFAULT_WORKER_CAP: usize = 8;

/// Anonymize IP addresses in flow-record archives
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nfanon",
    version,
    about = "Anonymize IP addresses in flow-record archives using CryptoPAn",
    long_about = "Reads flow-record archives, replaces every IP address with a \
                  prefix-preserving CryptoPAn pseudonym, clears AS numbers, and \
                  writes the records back with framing, statistics and \
                  compression preserved.",
    after_help = "EXAMPLES:\n    \
        nfanon -K 0123456789abcdef0123456789abcdef -r nfcapd.202601011200\n    \
        nfanon -K 0x0123...ef -r /data/flows/           # whole directory, in place\n    \
        nfanon -K <key> -r nfcapd.202601011200 -w anon.nf"
)]
pub struct CliArgs {
    /// CryptoPAn key: exactly 32 characters, or 0x followed by 64 hex digits
    ///
    /// Required, but checked after parsing so its absence reports through
    /// the normal setup-error path (exit 255) rather than clap's own code.
    #[arg(short = 'K', long = "key", value_name = "KEY")]
    pub key: Option<String>,

    /// Log filter directive for the log sink (e.g. "nfanon=debug")
    #[arg(short = 'L', long = "log-filter", value_name = "FILTER")]
    pub log_filter: Option<String>,

    /// Do not print the progress spinner, banner and summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Input: a single archive file, or a directory of archives
    ///
    /// Required; absence is checked after parsing, like the key.
    #[arg(short = 'r', long = "read", value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output file; without it each input is anonymized in place
    #[arg(short = 'w', long = "write", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of worker threads (default: min(cores, 8))
    #[arg(long, value_name = "NUM")]
    pub workers: Option<usize>,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct AnonConfig {
    /// Raw 32-byte CryptoPAn key
    pub key: [u8; KEY_LEN],

    /// Input file or directory
    pub input: PathBuf,

    /// Single output file; `None` selects in-place mode
    pub output: Option<PathBuf>,

    /// Worker pool size
    pub worker_count: usize,

    /// Show spinner, banner and summary
    pub show_progress: bool,
}

impl AnonConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let key_text = args.key.ok_or(ConfigError::MissingKey)?;
        if key_text.len() > MAX_KEY_ARG_LEN {
            return Err(ConfigError::KeyTooLong {
                len: key_text.len(),
                max: MAX_KEY_ARG_LEN,
            });
        }
        let key = parse_key(&key_text)?;

        let input = args.input.ok_or(ConfigError::MissingInput)?;
        if !input.is_file() && !input.is_dir() {
            return Err(ConfigError::InvalidInputPath { path: input });
        }

        let worker_count = match args.workers {
            Some(n) => {
                if n == 0 || n > MAX_WORKERS {
                    return Err(ConfigError::InvalidWorkerCount {
                        count: n,
                        max: MAX_WORKERS,
                    });
                }
                n
            }
            None => default_workers(),
        };

        Ok(Self {
            key,
            input,
            output: args.output,
            worker_count,
            show_progress: !args.quiet,
        })
    }
}

/// Parse a CryptoPAn key argument
///
/// Accepted forms:
/// - exactly 32 ASCII characters, taken as the raw key bytes
/// - `0x` followed by 64 hex digits
pub fn parse_key(text: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let mut key = [0u8; KEY_LEN];

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.len() != 2 * KEY_LEN || !hex.is_ascii() {
            return Err(ConfigError::InvalidKey {
                reason: format!("expected {} hex digits after 0x", 2 * KEY_LEN),
            });
        }
        for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(pair).expect("ASCII checked above");
            key[i] = u8::from_str_radix(pair, 16).map_err(|_| ConfigError::InvalidKey {
                reason: format!("'{}' is not a hex byte", pair),
            })?;
        }
        return Ok(key);
    }

    if text.len() == KEY_LEN && text.is_ascii() {
        key.copy_from_slice(text.as_bytes());
        return Ok(key);
    }

    Err(ConfigError::InvalidKey {
        reason: format!(
            "expected {} characters or 0x + {} hex digits, got {} characters",
            KEY_LEN,
            2 * KEY_LEN,
            text.len()
        ),
    })
}

fn default_workers() -> usize {
    // anonymization is CPU bound; leave large hosts mostly alone
    num_cpus::get().clamp(1, DEFAULT_WORKER_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(key: Option<&str>, input: Option<&str>) -> CliArgs {
        CliArgs {
            key: key.map(String::from),
            log_filter: None,
            quiet: true,
            input: input.map(PathBuf::from),
            output: None,
            workers: None,
        }
    }

    #[test]
    fn test_missing_key_is_a_setup_error() {
        let err = AnonConfig::from_args(args(None, Some("/tmp"))).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey));
    }

    #[test]
    fn test_missing_input_is_a_setup_error() {
        let err = AnonConfig::from_args(args(Some("abcdefghijklmnopqrstuvwxyz012345"), None))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingInput));
    }

    #[test]
    fn test_parse_ascii_key() {
        let key = parse_key("abcdefghijklmnopqrstuvwxyz012345").unwrap();
        assert_eq!(&key[..4], b"abcd");
        assert_eq!(key[31], b'5');
    }

    #[test]
    fn test_parse_hex_key() {
        let text = format!("0x{}", "0f".repeat(32));
        let key = parse_key(&text).unwrap();
        assert_eq!(key, [0x0F; KEY_LEN]);
    }

    #[test]
    fn test_parse_key_rejects_wrong_length() {
        assert!(parse_key("short").is_err());
        assert!(parse_key(&"a".repeat(33)).is_err());
        assert!(parse_key("0x1234").is_err());
    }

    #[test]
    fn test_parse_key_rejects_bad_hex() {
        let text = format!("0x{}", "zz".repeat(32));
        assert!(parse_key(&text).is_err());
    }

    #[test]
    fn test_hex_check_before_utf8_boundary() {
        // multi-byte characters must not panic the hex path
        let text = format!("0x{}", "é".repeat(32));
        assert!(parse_key(&text).is_err());
    }

    #[test]
    fn test_default_workers_capped() {
        let n = default_workers();
        assert!(n >= 1);
        assert!(n <= 8);
    }
}
