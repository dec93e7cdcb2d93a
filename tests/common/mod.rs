#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use tempdir::TempDir;

const ALIGNMENT_PADDING: &[u8] = &[0, 0, 0];

/// A container entry for [`write_container`].
pub struct Item<'a> {
    pub name: &'a str,
    pub content: &'a [u8],
    pub deflate: bool,
}

pub fn stored<'a>(name: &'a str, content: &'a [u8]) -> Item<'a> {
    Item { name, content, deflate: false }
}

pub fn deflated<'a>(name: &'a str, content: &'a [u8]) -> Item<'a> {
    Item { name, content, deflate: true }
}

/// Writes a minimal ZIP container holding `items` to `path`.
pub fn write_container(path: &Path, items: &[Item]) -> anyhow::Result<()> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for item in items {
        let mut crc = flate2::Crc::new();
        crc.update(item.content);
        let data = if item.deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(item.content)?;
            encoder.finish()?
        } else {
            item.content.to_vec()
        };
        let method: u16 = if item.deflate { 8 } else { 0 };
        let offset = out.len() as u32;

        out.write_u32::<LittleEndian>(0x0403_4b50)?;
        out.write_u16::<LittleEndian>(20)?; // version needed
        out.write_u16::<LittleEndian>(0x0800)?; // utf-8 names
        out.write_u16::<LittleEndian>(method)?;
        out.write_u32::<LittleEndian>(0)?; // time, date
        out.write_u32::<LittleEndian>(crc.sum())?;
        out.write_u32::<LittleEndian>(data.len() as u32)?;
        out.write_u32::<LittleEndian>(item.content.len() as u32)?;
        out.write_u16::<LittleEndian>(item.name.len() as u16)?;
        // alignment padding, as zipalign leaves it; the central record has none
        out.write_u16::<LittleEndian>(ALIGNMENT_PADDING.len() as u16)?;
        out.extend_from_slice(item.name.as_bytes());
        out.extend_from_slice(ALIGNMENT_PADDING);
        out.extend_from_slice(&data);

        central.write_u32::<LittleEndian>(0x0201_4b50)?;
        central.write_u16::<LittleEndian>(20)?; // made by
        central.write_u16::<LittleEndian>(20)?; // version needed
        central.write_u16::<LittleEndian>(0x0800)?;
        central.write_u16::<LittleEndian>(method)?;
        central.write_u32::<LittleEndian>(0)?;
        central.write_u32::<LittleEndian>(crc.sum())?;
        central.write_u32::<LittleEndian>(data.len() as u32)?;
        central.write_u32::<LittleEndian>(item.content.len() as u32)?;
        central.write_u16::<LittleEndian>(item.name.len() as u16)?;
        central.write_u16::<LittleEndian>(0)?; // extra
        central.write_u16::<LittleEndian>(0)?; // comment
        central.write_u16::<LittleEndian>(0)?; // disk
        central.write_u16::<LittleEndian>(0)?; // internal attributes
        central.write_u32::<LittleEndian>(0)?; // external attributes
        central.write_u32::<LittleEndian>(offset)?;
        central.extend_from_slice(item.name.as_bytes());
    }

    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.write_u32::<LittleEndian>(0x0605_4b50)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(items.len() as u16)?;
    out.write_u16::<LittleEndian>(items.len() as u16)?;
    out.write_u32::<LittleEndian>(central.len() as u32)?;
    out.write_u32::<LittleEndian>(central_offset)?;
    out.write_u16::<LittleEndian>(0)?;

    std::fs::write(path, out)?;
    Ok(())
}

/// Lays out a small decoded project under `root`.
pub fn write_project(root: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(root.join("res/values"))?;
    std::fs::create_dir_all(root.join("smali/com/example"))?;
    std::fs::create_dir_all(root.join("assets/empty"))?;
    std::fs::write(root.join("AndroidManifest.xml"), b"<manifest package=\"com.example\"/>")?;
    std::fs::write(root.join("res/values/strings.xml"), b"<resources><string name=\"app\">x</string></resources>")?;
    std::fs::write(root.join("smali/com/example/Main.smali"), b".class public Lcom/example/Main;")?;
    Ok(())
}

// Helper function: Creates a temporary directory for tests
pub fn setup_test_env() -> TempDir {
    TempDir::new("pkgdir_kit_test").unwrap()
}
