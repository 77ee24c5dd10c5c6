use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha384, Sha512};

use crate::domain::{FirmwareError, HashAlgorithm};

/// Hex digest of the file at `path`.
pub fn package_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String, FirmwareError> {
    match algorithm {
        HashAlgorithm::Sha384 => {
            let hasher = hash_file(path, Sha384::new())?;
            Ok(format!("{:x}", hasher.finalize()))
        }
        HashAlgorithm::Sha512 => {
            let hasher = hash_file(path, Sha512::new())?;
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

/// Feed the file at `path` through `hasher` in fixed-size chunks.
fn hash_file<D: Digest>(path: &Path, mut hasher: D) -> Result<D, FirmwareError> {
    let file = File::open(path)
        .map_err(|e| FirmwareError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| FirmwareError::io(format!("reading {}", path.display()), e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher)
}
