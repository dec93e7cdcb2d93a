use std::env;

use anyhow::{Context, Result};
use pkgdir_kit::{AnyBackend, Directory, bind};

// usage: cargo run --example tree -- <decoded dir | container file>
fn main() -> Result<()> {
    let location = env::args().nth(1).context("expected a directory or container path")?;

    // a directory binds to the disk backend, a file is opened as a container
    let mut root = bind(&location).with_context(|| format!("cannot bind {location}"))?;
    println!("{}", root.location());
    print_tree(&mut root, 1)?;

    for failure in root.failures() {
        eprintln!("warning: {failure}");
    }
    Ok(())
}

fn print_tree(dir: &mut Directory<AnyBackend>, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);

    let dirs: Vec<String> = dir.list_directories()?.keys().cloned().collect();
    for name in dirs {
        println!("{indent}{name}/");
        print_tree(dir.resolve(&name)?, depth + 1)?;
    }

    for name in dir.list_files()? {
        let size = dir.file_size(&name)?;
        let stored = dir.compressed_size(&name)?;
        if stored == size {
            println!("{indent}{name} ({size} bytes)");
        } else {
            println!("{indent}{name} ({size} bytes, {stored} stored)");
        }
    }
    Ok(())
}
