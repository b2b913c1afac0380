//! Container format sniffer: identifies a file from the magic bytes at its start.

use crate::ConsumerValue;

use super::consumer::BlockConsumer;

/// Bytes of the stream head kept for matching.
const HEAD_LEN: usize = 16;

/// `(offset, magic, format)`. First match wins, so longer magics sharing a prefix come first.
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"\x1A\x45\xDF\xA3", "matroska"),
    (4, b"ftyp", "mp4"),
    (0, b"RIFF", "riff"),
    (0, b"OggS", "ogg"),
    (0, b"fLaC", "flac"),
    (0, b"ID3", "mp3"),
    (0, b"FLV", "flv"),
    (0, b"\x30\x26\xB2\x75\x8E\x66\xCF\x11", "asf"),
    (0, b"\x00\x00\x01\xBA", "mpeg-ps"),
    (0, b"\x89PNG\r\n\x1A\n", "png"),
    (0, b"\xFF\xD8\xFF", "jpeg"),
    (0, b"GIF8", "gif"),
    (0, b"%PDF", "pdf"),
    (0, b"PK\x03\x04", "zip"),
    (0, b"Rar!\x1A\x07", "rar"),
    (0, b"7z\xBC\xAF\x27\x1C", "7z"),
    (0, b"\x1F\x8B", "gzip"),
    (0, b"\x7FELF", "elf"),
];

/// RIFF containers carry their real type at offset 8.
const RIFF_TYPES: &[(&[u8], &str)] = &[(b"AVI ", "avi"), (b"WAVE", "wav"), (b"WEBP", "webp")];

/// File extensions each format is expected under. The first is the one suggested on mismatch.
const FORMAT_EXTENSIONS: &[(&str, &[&str])] = &[
    ("matroska", &["mkv", "mka", "mks", "mk3d", "webm"]),
    ("mp4", &["mp4", "m4v", "m4a", "mov", "3gp"]),
    ("avi", &["avi"]),
    ("wav", &["wav"]),
    ("webp", &["webp"]),
    ("riff", &["riff"]),
    ("ogg", &["ogg", "ogm", "ogv", "oga", "opus"]),
    ("flac", &["flac"]),
    ("mp3", &["mp3"]),
    ("flv", &["flv"]),
    ("asf", &["asf", "wmv", "wma"]),
    ("mpeg-ps", &["mpg", "mpeg", "vob"]),
    ("png", &["png"]),
    ("jpeg", &["jpg", "jpeg"]),
    ("gif", &["gif"]),
    ("pdf", &["pdf"]),
    ("zip", &["zip"]),
    ("rar", &["rar"]),
    ("7z", &["7z"]),
    ("gzip", &["gz", "tgz"]),
    ("elf", &["elf", "so", "o", ""]),
];

fn extensions_of(format: &str) -> &'static [&'static str] {
    FORMAT_EXTENSIONS
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, exts)| *exts)
        .unwrap_or(&[])
}

/// Extension to suggest for a detected format.
pub fn suggested_extension(format: &str) -> &str {
    extensions_of(format).first().copied().unwrap_or(format)
}

/// Whether `ext` (no dot, any case) fits `format`. An unrecognised stream only fits no extension.
pub fn extension_matches(format: Option<&str>, ext: &str) -> bool {
    match format {
        Some(f) => extensions_of(f).iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => ext.is_empty(),
    }
}

#[derive(Default)]
pub struct FormatSniffer {
    head: Vec<u8>,
}

impl FormatSniffer {
    pub fn boxed() -> Box<dyn BlockConsumer> {
        Box::new(Self::default())
    }
}

/// Match `head` (the first bytes of a stream) against known signatures.
pub fn detect_format(head: &[u8]) -> Option<&'static str> {
    let (_, _, format) = SIGNATURES.iter().find(|(offset, magic, _)| {
        head.get(*offset..offset + magic.len())
            .is_some_and(|window| window == *magic)
    })?;
    if *format == "riff"
        && let Some(kind) = head.get(8..12)
        && let Some((_, riff)) = RIFF_TYPES.iter().find(|(tag, _)| *tag == kind)
    {
        return Some(*riff);
    }
    Some(*format)
}

impl BlockConsumer for FormatSniffer {
    fn consume(&mut self, block: &[u8]) {
        let missing = HEAD_LEN.saturating_sub(self.head.len());
        if missing > 0 {
            self.head
                .extend_from_slice(&block[..missing.min(block.len())]);
        }
    }

    fn finish(self: Box<Self>) -> ConsumerValue {
        ConsumerValue::Format(detect_format(&self.head))
    }
}
