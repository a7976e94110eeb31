use deepcompare_common::{AvailableAlgorithms, DeepCompareError, HashAlgorithm};
use digest::DynDigest;
use tracing::debug;

/// Bytes read per chunk while hashing a file
pub const HASH_CHUNK_SIZE: usize = 64 * 1024; // 64KB buffer

/// A streaming digest that can be moved to the engine's worker thread
pub type BoxedHasher = Box<dyn DynDigest + Send>;

/// Instantiate a fresh digest for `algorithm`.
///
/// Fails with `UnsupportedAlgorithm` when this build was compiled without the
/// algorithm's family.
pub fn new_hasher(algorithm: HashAlgorithm) -> Result<BoxedHasher, DeepCompareError> {
    match algorithm {
        HashAlgorithm::Sha1 => Ok(Box::new(sha1::Sha1::default())),
        #[cfg(feature = "md5")]
        HashAlgorithm::Md5 => Ok(Box::new(md5::Md5::default())),
        #[cfg(feature = "sha2-family")]
        HashAlgorithm::Sha256 => Ok(Box::new(sha2::Sha256::default())),
        #[cfg(feature = "sha2-family")]
        HashAlgorithm::Sha384 => Ok(Box::new(sha2::Sha384::default())),
        #[cfg(feature = "sha2-family")]
        HashAlgorithm::Sha512 => Ok(Box::new(sha2::Sha512::default())),
        #[cfg(feature = "sha2-family")]
        HashAlgorithm::Sha512_224 => Ok(Box::new(sha2::Sha512_224::default())),
        #[cfg(feature = "sha2-family")]
        HashAlgorithm::Sha512_256 => Ok(Box::new(sha2::Sha512_256::default())),
        #[cfg(feature = "sha3-family")]
        HashAlgorithm::Sha3_224 => Ok(Box::new(sha3::Sha3_224::default())),
        #[cfg(feature = "sha3-family")]
        HashAlgorithm::Sha3_256 => Ok(Box::new(sha3::Sha3_256::default())),
        #[cfg(feature = "sha3-family")]
        HashAlgorithm::Sha3_384 => Ok(Box::new(sha3::Sha3_384::default())),
        #[cfg(feature = "sha3-family")]
        HashAlgorithm::Sha3_512 => Ok(Box::new(sha3::Sha3_512::default())),
        #[cfg(feature = "blake3")]
        HashAlgorithm::Blake3 => Ok(Box::new(blake3::Hasher::new())),
        #[allow(unreachable_patterns)]
        other => Err(DeepCompareError::UnsupportedAlgorithm(other.name().to_string())),
    }
}

/// Find out which algorithms this build can instantiate.
///
/// Meant to be called once at startup; the returned set is passed down to
/// whatever needs to validate or default an algorithm choice.
pub fn probe_algorithms() -> AvailableAlgorithms {
    let available: Vec<HashAlgorithm> = HashAlgorithm::ALL
        .iter()
        .copied()
        .filter(|algorithm| new_hasher(*algorithm).is_ok())
        .collect();
    debug!("Available hash algorithms: {:?}", available);
    AvailableAlgorithms::new(available)
}

/// Finish `hasher` as lower-case hex and leave it ready for the next input
pub fn finalize_hex(hasher: &mut dyn DynDigest) -> String {
    hex::encode(hasher.finalize_reset())
}

/// Hash an in-memory buffer in one go
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Result<String, DeepCompareError> {
    let mut hasher = new_hasher(algorithm)?;
    hasher.update(data);
    Ok(finalize_hex(hasher.as_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_always_available() {
        let available = probe_algorithms();
        assert!(available.contains(HashAlgorithm::Sha1));
    }

    #[cfg(feature = "sha2-family")]
    #[test]
    fn test_default_prefers_sha256() {
        assert_eq!(probe_algorithms().preferred_default(), HashAlgorithm::Sha256);
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha1, b"abc").unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[cfg(feature = "sha2-family")]
    #[test]
    fn test_known_sha256_digest() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha256, b"abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[cfg(feature = "md5")]
    #[test]
    fn test_known_md5_digest() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, b"abc").unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_every_available_algorithm_is_deterministic() {
        for algorithm in probe_algorithms().iter() {
            let first = hash_bytes(algorithm, b"deep compare").unwrap();
            let second = hash_bytes(algorithm, b"deep compare").unwrap();
            assert_eq!(first, second, "{} not deterministic", algorithm);
            assert_ne!(first, hash_bytes(algorithm, b"deep comparE").unwrap());
        }
    }

    #[test]
    fn test_finalize_resets_state() {
        let mut hasher = new_hasher(HashAlgorithm::Sha1).unwrap();
        hasher.update(b"first");
        let _ = finalize_hex(hasher.as_mut());

        hasher.update(b"abc");
        assert_eq!(
            finalize_hex(hasher.as_mut()),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[cfg(not(feature = "blake3"))]
    #[test]
    fn test_disabled_algorithm_is_unsupported() {
        assert!(matches!(
            new_hasher(HashAlgorithm::Blake3),
            Err(DeepCompareError::UnsupportedAlgorithm(_))
        ));
    }
}
