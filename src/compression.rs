//! (De)compression support.

use crate::error::SpnetError;
use crate::models::Compression;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use zune_inflate::{DeflateDecoder, DeflateOptions};

/// First two bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses some data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Uncompressed data
pub fn compress(compression: Compression, data: &[u8]) -> Result<Bytes, SpnetError> {
    let level = flate2::Compression::default();
    let compressed = match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };
    Ok(compressed.into())
}

/// Decompresses some Bytes and returns the uncompressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Compressed data [Bytes](bytes::Bytes)
pub fn decompress(compression: Compression, data: &Bytes) -> Result<Bytes, SpnetError> {
    match compression {
        Compression::Gzip => decompress_flate2_gzip(data),
        Compression::Zlib => decompress_zune_zlib(data),
    }
}

/// Guess the compression algorithm of some data from its header.
///
/// Anything that is not gzip is assumed to be zlib.
pub fn detect(data: &[u8]) -> Compression {
    if data.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else {
        Compression::Zlib
    }
}

/// Decompresses some Bytes compressed with either supported algorithm.
pub fn decompress_auto(data: &Bytes) -> Result<Bytes, SpnetError> {
    decompress(detect(data), data)
}

fn decompress_flate2_gzip(data: &Bytes) -> Result<Bytes, SpnetError> {
    let mut decoder = GzDecoder::<&[u8]>::new(data);
    let mut buf = Vec::with_capacity(data.len());
    decoder.read_to_end(&mut buf)?;
    Ok(buf.into())
}

fn decompress_zune_zlib(data: &Bytes) -> Result<Bytes, SpnetError> {
    let options = DeflateOptions::default().set_size_hint(data.len());
    let mut decoder = DeflateDecoder::new_with_options(data, options);
    let data = decoder.decode_zlib()?;
    Ok(data.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zune_inflate::errors::DecodeErrorStatus;

    #[test]
    fn test_decompress_gzip() {
        let compressed = compress(Compression::Gzip, b"hello world").unwrap();
        assert_eq!(&GZIP_MAGIC, &compressed[..2]);
        let result = decompress(Compression::Gzip, &compressed).unwrap();
        assert_eq!(result, b"hello world".as_ref());
    }

    #[test]
    fn test_decompress_zlib() {
        let compressed = compress(Compression::Zlib, b"hello world").unwrap();
        let result = decompress(Compression::Zlib, &compressed).unwrap();
        assert_eq!(result, b"hello world".as_ref());
    }

    #[test]
    fn test_decompress_auto() {
        for compression in [Compression::Gzip, Compression::Zlib] {
            let compressed = compress(compression, b"hello world").unwrap();
            assert_eq!(compression, detect(&compressed));
            let result = decompress_auto(&compressed).unwrap();
            assert_eq!(result, b"hello world".as_ref());
        }
    }

    #[test]
    fn test_decompress_empty() {
        let compressed = compress(Compression::Zlib, b"").unwrap();
        assert!(decompress_auto(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_decompress_invalid_gzip() {
        let invalid = b"invalid format";
        let err = decompress(Compression::Gzip, &invalid.as_ref().into()).unwrap_err();
        match err {
            SpnetError::Io(io_err) => {
                assert_eq!(io_err.kind(), std::io::ErrorKind::InvalidInput);
                assert_eq!(io_err.to_string(), "invalid gzip header");
            }
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn test_decompress_invalid_zlib() {
        let invalid = b"invalid format";
        let err = decompress_auto(&invalid.as_ref().into()).unwrap_err();
        match err {
            SpnetError::DecompressionZune(zune_err) => match zune_err.error {
                DecodeErrorStatus::GenericStr(message) => {
                    assert_eq!(message, "Unknown zlib compression method 9");
                }
                err => panic!("unexpected zune error {:?}", err),
            },
            err => panic!("unexpected error {}", err),
        }
    }
}
