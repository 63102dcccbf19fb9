use std::fs;
use tarlift_core::inventory::{scan, total_size, InventoryOptions};
use tarlift_core::Error;

fn tree() -> tempfile::TempDir {
    let td = tempfile::tempdir().unwrap();
    let root = td.path();
    fs::create_dir_all(root.join("docs/old")).unwrap();
    fs::create_dir_all(root.join("media")).unwrap();
    fs::write(root.join("readme.TXT"), vec![b'r'; 10]).unwrap();
    fs::write(root.join("docs/a.md"), vec![b'a'; 200]).unwrap();
    fs::write(root.join("docs/old/b.md"), vec![b'b'; 300]).unwrap();
    fs::write(root.join("media/clip.mp4"), vec![b'c'; 4000]).unwrap();
    td
}

#[test]
fn scan_lists_every_regular_file_in_sorted_order() {
    let td = tree();
    let inv = scan(td.path(), &InventoryOptions::default()).unwrap();
    let rels: Vec<&str> = inv.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(rels, ["docs/a.md", "docs/old/b.md", "media/clip.mp4", "readme.TXT"]);
    assert_eq!(inv.total_size, 4510);
    let clip = &inv.files[2];
    assert_eq!(clip.size, 4000);
    assert_eq!(clip.abs_path, td.path().join("media/clip.mp4"));
    assert!(clip.mtime > 0.0);
}

#[test]
fn stat_pass_agrees_with_scan() {
    let td = tree();
    let opts = InventoryOptions { excludes: vec!["**/*.md".into()], skip_dir: None, upload_name: None };
    let inv = scan(td.path(), &opts).unwrap();
    assert_eq!(total_size(td.path(), &opts).unwrap(), inv.total_size);
    assert_eq!(inv.total_size, 4010);
    assert_eq!(total_size(td.path(), &InventoryOptions::default()).unwrap(), 4510);
}

#[test]
fn excluded_directories_are_pruned() {
    let td = tree();
    let opts = InventoryOptions { excludes: vec!["docs/old".into()], skip_dir: None, upload_name: None };
    let inv = scan(td.path(), &opts).unwrap();
    assert!(inv.files.iter().all(|f| !f.rel_path.starts_with("docs/old")));
    assert_eq!(inv.len(), 3);
    assert_eq!(total_size(td.path(), &opts).unwrap(), inv.total_size);
}

#[test]
fn work_dir_inside_source_is_skipped() {
    let td = tree();
    let work = td.path().join("out");
    fs::create_dir(&work).unwrap();
    fs::write(work.join("up_part1.tar.gz"), b"not source").unwrap();
    let opts = InventoryOptions { excludes: vec![], skip_dir: Some(work), upload_name: None };
    let inv = scan(td.path(), &opts).unwrap();
    assert!(inv.files.iter().all(|f| !f.rel_path.starts_with("out/")));
    assert_eq!(total_size(td.path(), &opts).unwrap(), 4510);
}

#[test]
fn work_dir_equal_to_source_leaves_earlier_artifacts_out() {
    let td = tree();
    let root = td.path();
    for name in [
        "up_part1.tar.gz",
        "up_part1.tar.gz.json",
        "up_part12.tar.gz",
        "up_master.json",
        "up_master.lock",
    ] {
        fs::write(root.join(name), b"earlier run").unwrap();
    }
    // same-looking names that are not this upload's artifacts stay in
    fs::write(root.join("up_partial.tar.gz"), vec![b'p'; 5]).unwrap();
    fs::write(root.join("docs/up_master.json"), vec![b'd'; 7]).unwrap();
    fs::write(root.join("other_part1.tar.gz"), vec![b'o'; 3]).unwrap();

    let opts = InventoryOptions {
        excludes: vec![],
        skip_dir: Some(root.to_path_buf()),
        upload_name: Some("up".into()),
    };
    let inv = scan(root, &opts).unwrap();
    let rels: Vec<&str> = inv.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(
        rels,
        [
            "docs/a.md",
            "docs/old/b.md",
            "docs/up_master.json",
            "media/clip.mp4",
            "other_part1.tar.gz",
            "readme.TXT",
            "up_partial.tar.gz",
        ]
    );
    assert_eq!(inv.total_size, 4510 + 5 + 7 + 3);
    assert_eq!(total_size(root, &opts).unwrap(), inv.total_size);
}

#[cfg(unix)]
#[test]
fn symlinks_are_not_followed() {
    let td = tree();
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.bin"), vec![0u8; 999]).unwrap();
    std::os::unix::fs::symlink(outside.path(), td.path().join("linkdir")).unwrap();
    std::os::unix::fs::symlink(td.path().join("readme.TXT"), td.path().join("link.txt")).unwrap();

    let inv = scan(td.path(), &InventoryOptions::default()).unwrap();
    assert_eq!(inv.len(), 4);
    assert!(inv.files.iter().all(|f| !f.rel_path.starts_with("link")));
    assert_eq!(total_size(td.path(), &InventoryOptions::default()).unwrap(), 4510);
}

#[test]
fn missing_root_is_an_inventory_error() {
    let td = tempfile::tempdir().unwrap();
    let err = scan(&td.path().join("nope"), &InventoryOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Inventory { .. }), "{err}");
    assert!(total_size(&td.path().join("nope"), &InventoryOptions::default()).is_err());
}

#[test]
fn bad_pattern_is_rejected() {
    let td = tree();
    let opts = InventoryOptions { excludes: vec!["[".into()], skip_dir: None, upload_name: None };
    assert!(matches!(scan(td.path(), &opts), Err(Error::Pattern(_))));
}

#[cfg(unix)]
#[test]
fn unreadable_subtree_aborts_the_scan() {
    use std::os::unix::fs::PermissionsExt;
    let td = tree();
    let locked = td.path().join("docs/old");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    // root ignores permission bits
    let readable = fs::read_dir(&locked).is_ok();
    let res = scan(td.path(), &InventoryOptions::default());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    if readable {
        return;
    }
    assert!(matches!(res, Err(Error::Inventory { .. })));
}
