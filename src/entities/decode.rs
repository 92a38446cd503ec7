//! Animation decode: frame archive + metadata -> `FrameSequence`
//!
//! The archive is a zip of still images; metadata lists them in display
//! order with a per-frame delay. Images are decoded with the `image` crate
//! into RGBA8 so the render sink never sees format differences.

use std::io::{Cursor, Read};

use log::debug;
use zip::ZipArchive;

use super::frame::{Frame, FrameSequence};
use super::records::UgoiraMeta;
use crate::error::FetchError;

/// Decode every frame listed in `meta` from `archive`.
///
/// # Errors
///
/// `FetchError::Decode` if the archive is corrupt, a listed file is
/// missing, an image fails to decode, or the metadata lists no frames.
pub fn decode_ugoira(meta: &UgoiraMeta, archive: &[u8]) -> Result<FrameSequence, FetchError> {
    if meta.frames.is_empty() {
        return Err(FetchError::decode("animation metadata lists no frames"));
    }

    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut frames = Vec::with_capacity(meta.frames.len());
    let mut buf = Vec::new();

    for entry in &meta.frames {
        buf.clear();
        let mut file = zip
            .by_name(&entry.file)
            .map_err(|e| FetchError::decode(format!("{}: {}", entry.file, e)))?;
        file.read_to_end(&mut buf)
            .map_err(|e| FetchError::decode(format!("{}: {}", entry.file, e)))?;
        drop(file);

        let image = image::load_from_memory(&buf)
            .map_err(|e| FetchError::decode(format!("{}: {}", entry.file, e)))?
            .to_rgba8();
        frames.push(Frame::new(image, entry.delay, entry.file.clone()));
    }

    let seq = FrameSequence::from(frames);
    debug!(
        "Decoded {} frames ({} KB, loop {} ms)",
        seq.len(),
        seq.mem() / 1024,
        seq.duration().as_millis()
    );
    Ok(seq)
}

/// Build an in-memory archive of solid PNG frames. Test fixture shared by
/// the decode, source and registry tests.
#[cfg(test)]
pub(crate) fn fixture_archive(frames: &[(&str, [u8; 4])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut out = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut out);
        for (name, rgba) in frames {
            let img = image::RgbaImage::from_pixel(3, 2, image::Rgba(*rgba));
            let mut png = Cursor::new(Vec::new());
            img.write_to(&mut png, image::ImageFormat::Png).unwrap();
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(png.get_ref()).unwrap();
        }
        zip.finish().unwrap();
    }
    out.into_inner()
}
