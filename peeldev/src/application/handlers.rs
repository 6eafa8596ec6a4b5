use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use peel_core::error::Result;
use peel_core::{ExtractedFile, peel_path};

/// Extract every file: data forks land at `<output_dir>/<name>`, Mac
/// metadata and resource forks go into an AppleDouble sidecar next to
/// each data file.
pub fn handle_extract(archive: PathBuf, output_dir: PathBuf) -> Result<()> {
    let files = peel_path(&archive)?;
    for file in &files {
        let rel = sanitize_name(&file.meta.name);
        let out_path = output_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, &file.data_fork)?;
        info!(
            "extract: {} (data {} bytes, rsrc {} bytes)",
            rel.display(),
            file.data_fork.len(),
            file.rsrc_fork.len()
        );
        if needs_sidecar(file) {
            fs::write(sidecar_path(&out_path), apple_double(file))?;
        }
    }
    Ok(())
}

/// Archive member names are untrusted Mac OS Roman bytes: render them to
/// Unicode, then drop empty, current and parent components before they can
/// escape the destination.
fn sanitize_name(name: &[u8]) -> PathBuf {
    let name = super::macroman::to_string(name);
    let mut path = PathBuf::new();
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        path.push(part);
    }
    if path.as_os_str().is_empty() {
        path.push("unnamed");
    }
    path
}

fn needs_sidecar(file: &ExtractedFile) -> bool {
    !file.rsrc_fork.is_empty()
        || file.meta.file_type.0 != 0
        || file.meta.creator.0 != 0
        || file.meta.finder_flags != 0
}

fn sidecar_path(data_path: &Path) -> PathBuf {
    let name = data_path.file_name().unwrap_or_default();
    let mut sidecar = String::from("._");
    sidecar.push_str(&name.to_string_lossy());
    data_path.with_file_name(sidecar)
}

const APPLE_DOUBLE_MAGIC: u32 = 0x0005_1607;
const APPLE_DOUBLE_VERSION: u32 = 0x0002_0000;
const ENTRY_FINDER_INFO: u32 = 9;
const ENTRY_RSRC_FORK: u32 = 2;

/// AppleDouble sidecar: a Finder-info entry always, a resource-fork entry
/// when the fork is nonempty.
fn apple_double(file: &ExtractedFile) -> Vec<u8> {
    let entries: u16 = if file.rsrc_fork.is_empty() { 1 } else { 2 };
    let finder_offset = 26 + 12 * u32::from(entries);

    let mut out = Vec::with_capacity(finder_offset as usize + 32 + file.rsrc_fork.len());
    out.extend_from_slice(&APPLE_DOUBLE_MAGIC.to_be_bytes());
    out.extend_from_slice(&APPLE_DOUBLE_VERSION.to_be_bytes());
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&entries.to_be_bytes());

    out.extend_from_slice(&ENTRY_FINDER_INFO.to_be_bytes());
    out.extend_from_slice(&finder_offset.to_be_bytes());
    out.extend_from_slice(&32u32.to_be_bytes());
    if !file.rsrc_fork.is_empty() {
        out.extend_from_slice(&ENTRY_RSRC_FORK.to_be_bytes());
        out.extend_from_slice(&(finder_offset + 32).to_be_bytes());
        out.extend_from_slice(&(file.rsrc_fork.len() as u32).to_be_bytes());
    }

    out.extend_from_slice(&file.meta.file_type.0.to_be_bytes());
    out.extend_from_slice(&file.meta.creator.0.to_be_bytes());
    out.extend_from_slice(&file.meta.finder_flags.to_be_bytes());
    out.extend_from_slice(&[0u8; 22]);
    out.extend_from_slice(&file.rsrc_fork);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use peel_core::{FileMeta, FourCC};

    #[test]
    fn sanitize_strips_traversal_components() {
        assert_eq!(sanitize_name(b"a/b.txt"), PathBuf::from("a/b.txt"));
        assert_eq!(sanitize_name(b"../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(sanitize_name(b""), PathBuf::from("unnamed"));
        assert_eq!(sanitize_name(b"./x"), PathBuf::from("x"));
    }

    #[test]
    fn sidecar_sits_beside_the_data_file() {
        assert_eq!(
            sidecar_path(Path::new("out/dir/file.txt")),
            PathBuf::from("out/dir/._file.txt")
        );
    }

    #[test]
    fn apple_double_layout() {
        let file = ExtractedFile {
            meta: FileMeta::new(
                b"f",
                FourCC::from_bytes(*b"TEXT"),
                FourCC::from_bytes(*b"ttxt"),
                0x0100,
            ),
            data_fork: Vec::new(),
            rsrc_fork: b"RSRC".to_vec(),
        };
        let ad = apple_double(&file);
        assert_eq!(&ad[0..4], &0x0005_1607u32.to_be_bytes());
        assert_eq!(&ad[4..8], &0x0002_0000u32.to_be_bytes());
        assert_eq!(&ad[24..26], &2u16.to_be_bytes()); // two entries
        // finder info descriptor: id 9, offset 50, length 32
        assert_eq!(&ad[26..30], &9u32.to_be_bytes());
        assert_eq!(&ad[30..34], &50u32.to_be_bytes());
        assert_eq!(&ad[34..38], &32u32.to_be_bytes());
        // resource descriptor: id 2, offset 82, length 4
        assert_eq!(&ad[38..42], &2u32.to_be_bytes());
        assert_eq!(&ad[42..46], &82u32.to_be_bytes());
        assert_eq!(&ad[46..50], &4u32.to_be_bytes());
        // finder info then fork bytes
        assert_eq!(&ad[50..54], b"TEXT");
        assert_eq!(&ad[54..58], b"ttxt");
        assert_eq!(&ad[58..60], &0x0100u16.to_be_bytes());
        assert_eq!(&ad[82..86], b"RSRC");
        assert_eq!(ad.len(), 86);
    }

    #[test]
    fn metadata_free_file_needs_no_sidecar() {
        let plain = ExtractedFile {
            data_fork: b"bytes".to_vec(),
            ..Default::default()
        };
        assert!(!needs_sidecar(&plain));
    }
}
