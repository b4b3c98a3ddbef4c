// Incremental UTF-8 assembly of decoded token bytes

use encoding_rs::{Decoder, UTF_8};

/// Turns the raw bytes of successive tokens into text.
///
/// Byte-level vocabularies split multi-byte characters across tokens; the
/// leading bytes are held until the character is complete. Malformed bytes
/// become U+FFFD.
pub struct TokenTextDecoder {
    decoder: Decoder,
}

impl std::fmt::Debug for TokenTextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTextDecoder").finish_non_exhaustive()
    }
}

impl Default for TokenTextDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTextDecoder {
    pub fn new() -> Self {
        Self {
            decoder: UTF_8.new_decoder_without_bom_handling(),
        }
    }

    /// Feed one token's bytes and return the text they complete, which may be
    /// empty. Bytes still pending when generation ends are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        let mut text = String::with_capacity(capacity);
        let _ = self.decoder.decode_to_string(bytes, &mut text, false);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_tokens_pass_through() {
        let mut decoder = TokenTextDecoder::new();
        assert_eq!(decoder.push(b"Hello"), "Hello");
        assert_eq!(decoder.push(b" world"), " world");
    }

    #[test]
    fn test_character_split_across_tokens_is_joined() {
        let clef = "𝄞".as_bytes();
        assert_eq!(clef.len(), 4);

        let mut decoder = TokenTextDecoder::new();
        assert_eq!(decoder.push(&clef[..2]), "");
        assert_eq!(decoder.push(&clef[2..3]), "");
        assert_eq!(decoder.push(&[clef[3], b'!']), "𝄞!");
    }

    #[test]
    fn test_accented_and_cjk_text_is_lossless() {
        let answer = "Café, 東京へ行きます。";
        let mut decoder = TokenTextDecoder::new();
        // One byte per token is the worst case for a byte-level vocabulary
        let text: String = answer.bytes().map(|b| decoder.push(&[b])).collect();
        assert_eq!(text, answer);
    }

    #[test]
    fn test_malformed_bytes_are_replaced() {
        let mut decoder = TokenTextDecoder::new();
        assert_eq!(decoder.push(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }
}
