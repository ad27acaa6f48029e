use std::fs::File;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{ByteOrder, PixelsId};
use crate::store::Store;

/// Open handle on the pixel data of one image.
///
/// Each buffer variant reports its own byte order; callers never inspect the
/// concrete type.
pub trait PixelBuffer {
    fn path(&self) -> &Utf8Path;
    fn byte_order(&self) -> ByteOrder;
}

/// Raw planar pixel file. Always written big-endian.
#[derive(Debug)]
pub struct RomioPixelBuffer {
    path: Utf8PathBuf,
    _file: File,
}

impl RomioPixelBuffer {
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let file = File::open(path.as_std_path())?;
        Ok(Self {
            path: path.to_owned(),
            _file: file,
        })
    }
}

impl PixelBuffer for RomioPixelBuffer {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Big
    }
}

/// TIFF-wrapped resolution pyramid; the byte order comes from the TIFF header.
#[derive(Debug)]
pub struct PyramidPixelBuffer {
    path: Utf8PathBuf,
    byte_order: ByteOrder,
}

impl PyramidPixelBuffer {
    pub fn open(path: &Utf8Path) -> io::Result<Self> {
        let mut file = File::open(path.as_std_path())?;
        let mut header = [0u8; 2];
        file.read_exact(&mut header)?;
        let byte_order = match &header {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{path} is not a TIFF pyramid"),
                ));
            }
        };
        Ok(Self {
            path: path.to_owned(),
            byte_order,
        })
    }
}

impl PixelBuffer for PyramidPixelBuffer {
    fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

pub struct PixelBufferFactory;

impl PixelBufferFactory {
    /// Opens the pyramid when one exists, otherwise the raw pixel file.
    pub fn open(store: &Store, pixels: PixelsId) -> io::Result<Box<dyn PixelBuffer>> {
        let pyramid = store.pyramid_path(pixels);
        if pyramid.as_std_path().is_file() {
            return Ok(Box::new(PyramidPixelBuffer::open(&pyramid)?));
        }
        let raw = store.pixels_path(pixels);
        Ok(Box::new(RomioPixelBuffer::open(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(pixels: &[(&str, &str)]) -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("Pixels")).unwrap();
        for (name, content) in pixels {
            std::fs::write(root.join("Pixels").join(name), content).unwrap();
        }
        (temp, Store::new_with_root(root))
    }

    #[test]
    fn pyramid_byte_order_from_header() {
        let (_temp, store) = store_with(&[("1_pyramid", "II*\0"), ("2_pyramid", "MM\0*")]);
        let little = PixelBufferFactory::open(&store, PixelsId::new(1)).unwrap();
        assert_eq!(little.byte_order(), ByteOrder::Little);
        let big = PixelBufferFactory::open(&store, PixelsId::new(2)).unwrap();
        assert_eq!(big.byte_order(), ByteOrder::Big);
    }

    #[test]
    fn raw_pixels_are_big_endian() {
        let (_temp, store) = store_with(&[("3", "\0\0\0\0")]);
        let buffer = PixelBufferFactory::open(&store, PixelsId::new(3)).unwrap();
        assert_eq!(buffer.byte_order(), ByteOrder::Big);
        assert!(buffer.path().ends_with("Pixels/3"));
    }

    #[test]
    fn empty_pyramid_fails_to_open() {
        let (_temp, store) = store_with(&[("4_pyramid", "")]);
        assert!(PixelBufferFactory::open(&store, PixelsId::new(4)).is_err());
    }

    #[test]
    fn missing_pixels_fail_to_open() {
        let (_temp, store) = store_with(&[]);
        assert!(PixelBufferFactory::open(&store, PixelsId::new(5)).is_err());
    }
}
