use crate::config::{Encoding, LineTerminator, MalformedLinePolicy, TailConfig};
use crate::error::{Result, TailError};

/// Turns the raw bytes of one complete line into text.
///
/// Callers hand over whole lines only, so a multi-byte character is never
/// split between two calls.
#[derive(Debug, Clone, Copy)]
pub struct LineDecoder {
    encoding: Encoding,
    policy: MalformedLinePolicy,
    terminator: LineTerminator,
}

impl LineDecoder {
    pub fn new(config: &TailConfig) -> Self {
        Self {
            encoding: config.encoding,
            policy: config.malformed_line,
            terminator: config.line_terminator,
        }
    }

    /// Decode a line whose first byte sits at `offset` in the file.
    /// `terminated` tells whether the bytes were followed by `\n`.
    pub fn decode(&self, bytes: &[u8], offset: u64, terminated: bool) -> Result<String> {
        let bytes = if terminated {
            strip_cr(bytes, self.terminator)
        } else {
            bytes
        };

        match self.encoding {
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Encoding::Utf8 => match std::str::from_utf8(bytes) {
                Ok(text) => Ok(text.to_owned()),
                Err(e) => match self.policy {
                    MalformedLinePolicy::Substitute => {
                        tracing::warn!(
                            offset,
                            valid_up_to = e.valid_up_to(),
                            "Malformed utf-8 in line, substituting"
                        );
                        Ok(String::from_utf8_lossy(bytes).into_owned())
                    }
                    MalformedLinePolicy::FailFast => Err(TailError::Decode {
                        offset,
                        encoding: self.encoding,
                    }),
                },
            },
        }
    }
}

fn strip_cr(bytes: &[u8], terminator: LineTerminator) -> &[u8] {
    match (terminator, bytes.split_last()) {
        (LineTerminator::Crlf, Some((b'\r', rest))) => rest,
        _ => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(encoding: Encoding, policy: MalformedLinePolicy, terminator: LineTerminator) -> LineDecoder {
        LineDecoder::new(&TailConfig {
            encoding,
            malformed_line: policy,
            line_terminator: terminator,
            ..Default::default()
        })
    }

    #[test]
    fn test_decode_utf8() {
        let d = LineDecoder::new(&TailConfig::default());
        assert_eq!(d.decode("héllo ✓".as_bytes(), 0, true).unwrap(), "héllo ✓");
    }

    #[test]
    fn test_strip_cr_only_when_terminated() {
        let d = LineDecoder::new(&TailConfig::default());
        assert_eq!(d.decode(b"abc\r", 0, true).unwrap(), "abc");
        assert_eq!(d.decode(b"abc\r", 0, false).unwrap(), "abc\r");
        assert_eq!(d.decode(b"\r", 0, true).unwrap(), "");
    }

    #[test]
    fn test_lf_only_keeps_cr() {
        let d = decoder(Encoding::Utf8, MalformedLinePolicy::Substitute, LineTerminator::Lf);
        assert_eq!(d.decode(b"abc\r", 0, true).unwrap(), "abc\r");
    }

    #[test]
    fn test_substitute_malformed() {
        let d = LineDecoder::new(&TailConfig::default());
        assert_eq!(d.decode(b"ok\xffok", 0, true).unwrap(), "ok\u{fffd}ok");
    }

    #[test]
    fn test_fail_fast_malformed() {
        let d = decoder(Encoding::Utf8, MalformedLinePolicy::FailFast, LineTerminator::Crlf);
        let err = d.decode(b"\xc3", 17, true).unwrap_err();
        assert!(matches!(
            err,
            TailError::Decode {
                offset: 17,
                encoding: Encoding::Utf8
            }
        ));
    }

    #[test]
    fn test_latin1_never_fails() {
        let d = decoder(Encoding::Latin1, MalformedLinePolicy::FailFast, LineTerminator::Crlf);
        assert_eq!(d.decode(b"caf\xe9", 0, true).unwrap(), "café");
    }
}
