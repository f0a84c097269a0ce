use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use kube::ResourceExt;
use thiserror::Error;

use crate::apis::Proxy;

pub const COMPRESSED_SPEC_ANNOTATION: &str = "gloo.solo.io/compressed_spec";

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("unable to serialize proxy spec {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unable to compress proxy spec {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to decode compressed proxy spec {0}")]
    Encoding(#[from] base64::DecodeError),
}

pub fn is_compressed(proxy: &Proxy) -> bool {
    proxy.annotations().contains_key(COMPRESSED_SPEC_ANNOTATION)
}

/// Moves the spec into an annotation as base64 encoded zlib compressed json and leaves the
/// listeners empty.
pub fn compress_proxy(proxy: &mut Proxy) -> Result<(), CompressionError> {
    let json = serde_json::to_vec(&proxy.spec)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    proxy.annotations_mut().insert(COMPRESSED_SPEC_ANNOTATION.to_owned(), STANDARD.encode(compressed));
    proxy.spec.listeners.clear();
    Ok(())
}

/// Restores a spec stored by [`compress_proxy`]. Proxies without the annotation are left alone.
pub fn decompress_proxy(proxy: &mut Proxy) -> Result<(), CompressionError> {
    let Some(encoded) = proxy.annotations_mut().remove(COMPRESSED_SPEC_ANNOTATION) else {
        return Ok(());
    };
    let compressed = STANDARD.decode(encoded)?;
    let mut json = vec![];
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;
    proxy.spec = serde_json::from_slice(&json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{Listener, ProxySpec};

    #[test]
    fn test_compression_is_transparent() {
        let mut proxy = Proxy::new(
            "gateway-proxy",
            ProxySpec {
                listeners: vec![Listener { name: "listener-::-8080".to_owned(), bind_address: "::".to_owned(), bind_port: 8080, ..Default::default() }],
            },
        );
        let original = proxy.clone();

        compress_proxy(&mut proxy).unwrap();
        assert!(is_compressed(&proxy));
        assert!(proxy.spec.listeners.is_empty());

        decompress_proxy(&mut proxy).unwrap();
        assert!(!is_compressed(&proxy));
        assert_eq!(proxy.spec, original.spec);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let mut proxy = Proxy::new("gateway-proxy", ProxySpec::default());
        proxy.annotations_mut().insert(COMPRESSED_SPEC_ANNOTATION.to_owned(), "not base64!".to_owned());
        assert!(matches!(decompress_proxy(&mut proxy), Err(CompressionError::Encoding(_))));
    }
}
