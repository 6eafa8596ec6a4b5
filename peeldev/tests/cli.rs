use std::process::Command;

use crc::{CRC_16_ARC, Crc};

const ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Minimal classic StuffIt archive: one folder holding one stored file
/// with both forks.
fn sample_sit(name: &[u8], data: &[u8], rsrc: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"SIT!");
    out.extend_from_slice(&3u16.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"rLau");
    out.push(5);
    out.extend_from_slice(&[0; 7]);

    let folder = |method: u8, name: &[u8]| {
        let mut h = [0u8; 112];
        h[0] = method;
        h[1] = method;
        h[2] = name.len() as u8;
        h[3..3 + name.len()].copy_from_slice(name);
        let crc = ARC.checksum(&h[..110]);
        h[110..112].copy_from_slice(&crc.to_be_bytes());
        h
    };
    out.extend_from_slice(&folder(0x20, b"Extras"));

    let mut h = [0u8; 112];
    h[2] = name.len() as u8;
    h[3..3 + name.len()].copy_from_slice(name);
    h[66..70].copy_from_slice(b"TEXT");
    h[70..74].copy_from_slice(b"ttxt");
    h[84..88].copy_from_slice(&(rsrc.len() as u32).to_be_bytes());
    h[88..92].copy_from_slice(&(data.len() as u32).to_be_bytes());
    h[92..96].copy_from_slice(&(rsrc.len() as u32).to_be_bytes());
    h[96..100].copy_from_slice(&(data.len() as u32).to_be_bytes());
    h[100..102].copy_from_slice(&ARC.checksum(rsrc).to_be_bytes());
    h[102..104].copy_from_slice(&ARC.checksum(data).to_be_bytes());
    let crc = ARC.checksum(&h[..110]);
    h[110..112].copy_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(&h);
    out.extend_from_slice(rsrc);
    out.extend_from_slice(data);

    out.extend_from_slice(&folder(0x21, b""));

    let total = out.len() as u32;
    out[6..10].copy_from_slice(&total.to_be_bytes());
    out
}

#[test]
fn extracts_archive_with_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("sample.sit");
    std::fs::write(&archive, sample_sit(b"notes", b"data body", b"RSRC")).unwrap();
    let out_dir = dir.path().join("out");

    let status = Command::new(env!("CARGO_BIN_EXE_peeler"))
        .arg(&archive)
        .arg(&out_dir)
        .status()
        .unwrap();
    assert!(status.success());

    let data = std::fs::read(out_dir.join("Extras/notes")).unwrap();
    assert_eq!(data, b"data body");

    let sidecar = std::fs::read(out_dir.join("Extras/._notes")).unwrap();
    assert_eq!(&sidecar[0..4], &0x0005_1607u32.to_be_bytes());
    assert_eq!(&sidecar[24..26], &2u16.to_be_bytes());
    assert!(sidecar.ends_with(b"RSRC"));
}

#[test]
fn missing_archive_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_peeler"))
        .arg(dir.path().join("nope.sit"))
        .arg(dir.path())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}
