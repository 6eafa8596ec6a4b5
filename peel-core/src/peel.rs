use std::borrow::Cow;
use std::path::Path;

use log::{debug, warn};

use crate::container::{binhex, compactpro, macbinary, sit};
use crate::domain::ExtractedFile;
use crate::error::{PeelError, Result};

const TAG: &str = "peel";

/// Wrapper layers a single input may nest before the peel gives up.
const DEPTH_LIMIT: usize = 32;

/// The formats the peeler recognizes. Probe order is fixed, wrappers
/// before archives: wrapper signatures are strong, archive magics are
/// weak enough to false-positive inside wrapped payloads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    BinHex,
    MacBinary,
    StuffIt,
    CompactPro,
}

const HANDLERS: [Format; 4] = [
    Format::BinHex,
    Format::MacBinary,
    Format::StuffIt,
    Format::CompactPro,
];

impl Format {
    pub fn name(self) -> &'static str {
        match self {
            Format::BinHex => "hqx",
            Format::MacBinary => "bin",
            Format::StuffIt => "sit",
            Format::CompactPro => "cpt",
        }
    }

    /// Wrappers peel to a single buffer; archives produce a file list.
    pub fn is_wrapper(self) -> bool {
        matches!(self, Format::BinHex | Format::MacBinary)
    }

    fn probe(self, data: &[u8]) -> bool {
        match self {
            Format::BinHex => binhex::detect(data),
            Format::MacBinary => macbinary::detect(data),
            Format::StuffIt => sit::detect(data),
            Format::CompactPro => compactpro::detect(data),
        }
    }
}

/// Probe the handler table in order and report the first match.
pub fn detect(data: &[u8]) -> Option<Format> {
    HANDLERS.into_iter().find(|f| f.probe(data))
}

/// Chain wrapper layers until an archive or an unrecognized blob is
/// reached, then resolve nested wrappers inside the extracted files.
pub fn peel(data: &[u8]) -> Result<Vec<ExtractedFile>> {
    peel_layers(data, 0)
}

/// Slurp a file and peel it. The only operation here that touches disk.
pub fn peel_path(path: &Path) -> Result<Vec<ExtractedFile>> {
    let data = std::fs::read(path)?;
    peel(&data)
}

fn peel_layers(data: &[u8], depth_used: usize) -> Result<Vec<ExtractedFile>> {
    let mut current = Cow::Borrowed(data);
    for layer in depth_used..DEPTH_LIMIT {
        let format = match detect(&current) {
            Some(f) => f,
            None => {
                // terminal blob: hand it back as one nameless file
                let file = ExtractedFile {
                    data_fork: current.into_owned(),
                    ..Default::default()
                };
                return Ok(if file.is_empty() { Vec::new() } else { vec![file] });
            }
        };
        debug!("peel: layer {layer} is {}", format.name());
        match format {
            Format::BinHex => current = Cow::Owned(binhex::peel_data(&current)?),
            Format::MacBinary => current = Cow::Owned(macbinary::peel_data(&current)?),
            Format::StuffIt => return repeel(sit::extract(&current)?, layer + 1),
            Format::CompactPro => return repeel(compactpro::extract(&current)?, layer + 1),
        }
    }
    Err(PeelError::format(
        TAG,
        format!("nesting depth exceeds {DEPTH_LIMIT} layers"),
    ))
}

/// One pass over freshly extracted files: a data fork that detects as a
/// *wrapper* is peeled in place. Archive signatures inside forks are
/// deliberately not chased, and a failed sub-peel keeps the original file.
fn repeel(files: Vec<ExtractedFile>, depth_used: usize) -> Result<Vec<ExtractedFile>> {
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let wrapped = matches!(detect(&file.data_fork), Some(f) if f.is_wrapper());
        if !wrapped {
            out.push(file);
            continue;
        }
        match peel_layers(&file.data_fork, depth_used) {
            Ok(sub) if !sub.is_empty() => {
                debug!(
                    "peel: {} resolved to {} nested file(s)",
                    file.meta.name_lossy(),
                    sub.len()
                );
                out.extend(sub);
            }
            Ok(_) => out.push(file),
            Err(e) => {
                warn!("peel: keeping {} as extracted ({e})", file.meta.name_lossy());
                out.push(file);
            }
        }
    }
    Ok(out)
}
