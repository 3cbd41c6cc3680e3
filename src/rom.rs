use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::mmu::ROM_SIZE;

/// A 12 KiB ROM image covering $D000-$FFFF.
///
/// Shorter files are zero-padded at the top; the reset and interrupt
/// vectors then read as zero until a system file is loaded.
pub struct RomImage {
    data: Vec<u8>,
}

impl RomImage {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file =
            File::open(path).with_context(|| format!("opening ROM file {}", path.display()))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .with_context(|| format!("reading ROM file {}", path.display()))?;
        Self::from_bytes(&data).with_context(|| format!("loading ROM file {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            bail!("ROM image is empty");
        }

        if bytes.len() > ROM_SIZE {
            bail!(
                "ROM image too large: {} bytes (max {} bytes)",
                bytes.len(),
                ROM_SIZE
            );
        }

        let mut data = vec![0x00; ROM_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);

        log::debug!("ROM image loaded, {} bytes", bytes.len());

        Ok(Self { data })
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_image_is_zero_padded() {
        let rom = RomImage::from_bytes(&[0xEA; 16]).unwrap();
        let data = rom.into_data();
        assert_eq!(data.len(), ROM_SIZE);
        assert_eq!(data[15], 0xEA);
        assert_eq!(data[16], 0x00);
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(RomImage::from_bytes(&[]).is_err());
    }

    #[test]
    fn oversized_image_is_rejected() {
        assert!(RomImage::from_bytes(&vec![0u8; ROM_SIZE + 1]).is_err());
    }
}
