mod common;

use std::fs;
use std::io::Read;

use anyhow::Result;
use common::{setup_test_env, write_project};
use pkgdir_kit::{Directory, DirectoryError, DiskBackend, FsBackend, Operation, bind};

#[test]
fn test_sorted_listings() -> Result<()> {
    let temp_dir = setup_test_env();
    for name in ["b.txt", "a.txt", "B.txt"] {
        fs::write(temp_dir.path().join(name), b"x")?;
    }
    fs::create_dir(temp_dir.path().join("c"))?;
    fs::create_dir(temp_dir.path().join("C"))?;

    let mut root = bind(&temp_dir.path().display().to_string())?;
    assert_eq!(root.list_files()?, vec!["B.txt", "a.txt", "b.txt"]);
    let dirs: Vec<_> = root.list_directories()?.keys().cloned().collect();
    assert_eq!(dirs, vec!["C", "c"]);
    Ok(())
}

#[test]
fn test_project_copy_between_folders() -> Result<()> {
    let temp_dir = setup_test_env();
    let src = temp_dir.path().join("src");
    write_project(&src)?;
    fs::create_dir(temp_dir.path().join("dst"))?;

    let mut from = Directory::new(DiskBackend::new(&src)?);
    let mut to = Directory::new(DiskBackend::with_folder(temp_dir.path(), "dst")?);
    from.copy_to(&mut to)?;

    assert_eq!(
        to.list_files_recursive()?,
        vec![
            "AndroidManifest.xml",
            "res/values/strings.xml",
            "smali/com/example/Main.smali"
        ]
    );
    assert!(temp_dir.path().join("dst/assets/empty").is_dir());
    assert_eq!(
        fs::read(temp_dir.path().join("dst/smali/com/example/Main.smali"))?,
        fs::read(src.join("smali/com/example/Main.smali"))?
    );
    Ok(())
}

#[test]
fn test_with_folder_decodes_spaces() -> Result<()> {
    let temp_dir = setup_test_env();
    fs::create_dir_all(temp_dir.path().join("build dir/out"))?;

    let base = format!("{}/build%20dir", temp_dir.path().display());
    let backend = DiskBackend::with_folder(&base, "out")?;
    assert_eq!(backend.path(), temp_dir.path().join("build dir/out"));
    assert!(backend.enumerate()?.is_empty());
    Ok(())
}

#[test]
fn test_bind_file_path_with_spaces() -> Result<()> {
    let temp_dir = setup_test_env();
    let dir = temp_dir.path().join("My Project");
    write_project(&dir)?;

    let mut root = bind(&format!("{}/My%20Project", temp_dir.path().display()))?;
    let mut manifest = String::new();
    root.open_read("AndroidManifest.xml")?
        .read_to_string(&mut manifest)?;
    assert!(manifest.starts_with("<manifest"));
    Ok(())
}

#[test]
fn test_errors_name_the_entry() -> Result<()> {
    let temp_dir = setup_test_env();
    write_project(temp_dir.path())?;
    let mut root = bind(&temp_dir.path().display().to_string())?;

    match root.file_size("res/values").err() {
        Some(DirectoryError::NotAFile(path)) => assert!(path.ends_with("res/values")),
        other => panic!("unexpected result: {other:?}"),
    }
    match root.resolve("AndroidManifest.xml/x").err() {
        Some(DirectoryError::NotADirectory(path)) => {
            assert!(path.ends_with("AndroidManifest.xml"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_failures_are_reported_not_raised() -> Result<()> {
    #[cfg(unix)]
    {
        let temp_dir = setup_test_env();
        write_project(temp_dir.path())?;
        std::os::unix::fs::symlink("missing-target", temp_dir.path().join("dangling"))?;

        let mut root = bind(&temp_dir.path().display().to_string())?;
        let dirs: Vec<_> = root.list_directories()?.keys().cloned().collect();
        assert_eq!(dirs, vec!["assets", "res", "smali"]);

        let failures = root.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, Operation::Listing);
        assert!(failures[0].to_string().contains("dangling"));
    }
    Ok(())
}
