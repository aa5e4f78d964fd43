//! MessagePack frame codec.
//!
//! Every frame on the socket is an outer MessagePack map carrying a
//! content-encoding tag and the encoded inner message. Outbound frames are
//! always `identity`; inbound frames may arrive in any of the four encodings
//! and must all be accepted.

use std::io::Read;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content encoding of a frame payload. Tag values are lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Brotli,
    Zstd,
}

/// Outer frame: encoding tag plus the (possibly compressed) inner message.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    encoding: ContentEncoding,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
}

/// Codec failures. Decode errors name the failing layer but never echo the
/// raw bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("{context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: rmp_serde::decode::Error,
    },

    #[error("payload decompression ({encoding:?}) failed: {source}")]
    Decompress {
        encoding: ContentEncoding,
        #[source]
        source: std::io::Error,
    },
}

/// Encode a message into an identity-encoded outer frame.
///
/// `to_vec_named` keeps struct fields and enum tags as strings, which is what
/// gives unit variants their bare-string form and data-carrying variants the
/// `{tag: value}` map form.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let inner = rmp_serde::to_vec_named(message)?;
    let frame = Frame {
        encoding: ContentEncoding::Identity,
        payload: inner,
    };
    Ok(rmp_serde::to_vec_named(&frame)?)
}

/// Decode an outer frame, unwrap its content encoding, and decode the inner
/// message.
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let frame: Frame = rmp_serde::from_slice(bytes).map_err(|source| CodecError::Decode {
        context: "outer frame",
        source,
    })?;
    let inner = decompress(frame.encoding, frame.payload)?;
    rmp_serde::from_slice(&inner).map_err(|source| CodecError::Decode {
        context: "inner message",
        source,
    })
}

fn decompress(encoding: ContentEncoding, payload: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    let inflate = |encoding| move |source| CodecError::Decompress { encoding, source };
    match encoding {
        ContentEncoding::Identity => Ok(payload),
        ContentEncoding::Gzip => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(payload.as_slice())
                .read_to_end(&mut out)
                .map_err(inflate(encoding))?;
            Ok(out)
        }
        ContentEncoding::Brotli => {
            let mut out = Vec::new();
            brotli::Decompressor::new(payload.as_slice(), 4096)
                .read_to_end(&mut out)
                .map_err(inflate(encoding))?;
            Ok(out)
        }
        ContentEncoding::Zstd => {
            zstd::stream::decode_all(payload.as_slice()).map_err(inflate(encoding))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use solana_sdk::pubkey::Pubkey;

    use super::*;
    use crate::protocol::{ClientMessage, ServerMessage};

    fn frame_with_encoding(encoding: ContentEncoding, payload: Vec<u8>) -> Vec<u8> {
        rmp_serde::to_vec_named(&Frame { encoding, payload }).unwrap()
    }

    fn sample_message() -> ServerMessage {
        ServerMessage::StreamEnd {
            correlation_id: 7,
            reason: "done".to_string(),
        }
    }

    #[test]
    fn test_identity_round_trip() {
        let message = ClientMessage::StopStream { correlation_id: 42 };
        let bytes = encode_message(&message).unwrap();
        let decoded: ClientMessage = decode_message(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_unit_variant_is_a_bare_string() {
        let inner = rmp_serde::to_vec_named(&ClientMessage::GetInfo).unwrap();
        // fixstr of length 7 followed by the tag itself
        assert_eq!(inner[0], 0xa7);
        assert_eq!(&inner[1..], b"GetInfo");
    }

    #[test]
    fn test_data_variant_is_a_single_entry_map() {
        let inner = rmp_serde::to_vec_named(&ClientMessage::StopStream { correlation_id: 1 }).unwrap();
        // fixmap of size 1, then the tag string
        assert_eq!(inner[0], 0x81);
        assert_eq!(inner[1], 0xaa);
        assert_eq!(&inner[2..12], b"StopStream");
    }

    #[test]
    fn test_pubkeys_travel_as_32_byte_bin() {
        let mint = Pubkey::new_unique();
        let message = ClientMessage::NewSwapQuoteStream {
            correlation_id: 1,
            input_mint: mint,
            output_mint: mint,
            amount: 1,
            user_pubkey: mint,
            slippage_bps: 50,
            max_quotes: 8,
            interval_ms: 500,
        };
        let inner = rmp_serde::to_vec_named(&message).unwrap();
        // bin8 marker followed by a 32-byte length
        let marker = [0xc4u8, 32];
        assert!(inner.windows(2).any(|w| w == marker));
        // and never the 44-character base58 form
        let base58 = mint.to_string();
        assert!(!inner.windows(base58.len()).any(|w| w == base58.as_bytes()));
    }

    #[test]
    fn test_gzip_payload_accepted() {
        let inner = rmp_serde::to_vec_named(&sample_message()).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&inner).unwrap();
        let bytes = frame_with_encoding(ContentEncoding::Gzip, encoder.finish().unwrap());
        let decoded: ServerMessage = decode_message(&bytes).unwrap();
        assert_eq!(decoded, sample_message());
    }

    #[test]
    fn test_brotli_payload_accepted() {
        let inner = rmp_serde::to_vec_named(&sample_message()).unwrap();
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            writer.write_all(&inner).unwrap();
        }
        let bytes = frame_with_encoding(ContentEncoding::Brotli, compressed);
        let decoded: ServerMessage = decode_message(&bytes).unwrap();
        assert_eq!(decoded, sample_message());
    }

    #[test]
    fn test_zstd_payload_accepted() {
        let inner = rmp_serde::to_vec_named(&sample_message()).unwrap();
        let compressed = zstd::stream::encode_all(inner.as_slice(), 0).unwrap();
        let bytes = frame_with_encoding(ContentEncoding::Zstd, compressed);
        let decoded: ServerMessage = decode_message(&bytes).unwrap();
        assert_eq!(decoded, sample_message());
    }

    #[test]
    fn test_unknown_variant_is_an_error() {
        // A frame whose inner message carries a tag no ServerMessage variant has.
        let inner = rmp_serde::to_vec_named(&ClientMessage::GetInfo).unwrap();
        let bytes = frame_with_encoding(ContentEncoding::Identity, inner);
        let result: Result<ServerMessage, _> = decode_message(&bytes);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_garbage_frame_is_an_error() {
        let result: Result<ServerMessage, _> = decode_message(&[0xff, 0x00, 0x13]);
        assert!(matches!(
            result,
            Err(CodecError::Decode {
                context: "outer frame",
                ..
            })
        ));
    }
}
