use std::fs;
use tarlift_core::checksum::{sha256_bytes, sha256_file};
use tarlift_core::Error;

#[test]
fn sha256_is_stable_lowercase_hex() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("blob.bin");
    let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&p, &data).unwrap();

    let a = sha256_file(&p, None, None).unwrap();
    let b = sha256_file(&p, None, None).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.bytes().all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c)));
    assert_eq!(a, sha256_bytes(&data));
}

#[test]
fn sha256_of_known_input() {
    assert_eq!(sha256_bytes(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
}

#[test]
fn hashing_counts_bytes_and_honours_cancel() {
    let td = tempfile::tempdir().unwrap();
    let p = td.path().join("blob.bin");
    fs::write(&p, vec![7u8; 100_000]).unwrap();

    let progress = tarlift_core::progress::Progress::new(false);
    sha256_file(&p, Some(&progress), None).unwrap();
    assert_eq!(progress.bytes_done(), 100_000);

    let token = tarlift_core::cancel::CancelToken::new();
    token.cancel();
    assert!(matches!(sha256_file(&p, None, Some(&token)), Err(Error::Cancelled)));
}

#[test]
fn restarted_progress_keeps_a_single_reporter() {
    use std::time::Duration;
    let progress = tarlift_core::progress::Progress::with_interval(true, Duration::from_millis(20));
    progress.start();
    progress.stop();
    progress.start();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(progress.reporters(), 1);
    progress.stop();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(progress.reporters(), 0);
}

#[cfg(unix)]
mod unix {
    use std::process::Command;
    use std::time::{Duration, Instant};
    use tarlift_core::archive::{Archiver, TarArchiver};
    use tarlift_core::cancel::CancelToken;
    use tarlift_core::exec::{run, RunOptions};
    use tarlift_core::Error;

    #[test]
    fn captures_stdout_and_feeds_stdin() {
        let out = run(
            Command::new("cat"),
            RunOptions { stdin: Some(b"hello\n".to_vec()), capture_stdout: true, ..Default::default() },
        )
        .unwrap();
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo nope >&2; exit 3"]);
        let err = run(cmd, RunOptions::default()).unwrap_err();
        match err {
            Error::CommandFailed { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let t0 = Instant::now();
        let err = run(cmd, RunOptions { timeout: Some(Duration::from_millis(300)), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{err}");
        assert!(t0.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancelled_command_is_killed() {
        let token = CancelToken::new();
        let t = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            t.cancel();
        });
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let t0 = Instant::now();
        let err = run(cmd, RunOptions { cancel: Some(&token), ..Default::default() }).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(t0.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn ssh_gets_an_unbracketed_ipv6_host() {
        use tarlift_core::remote::RemoteTarget;
        use tarlift_core::transfer::{RemoteHasher, SshRemoteHasher};
        // echo prints the argv ssh would have received
        let hasher = SshRemoteHasher { program: "echo".into(), timeout: None };
        let target = RemoteTarget::parse("root@[fe80::1]:/data").unwrap();
        let err = hasher.remote_sha256(&target, "up_part1.tar.gz", &CancelToken::new()).unwrap_err();
        match err {
            Error::BadDigest(out) => {
                assert_eq!(out, "root@fe80::1 sha256sum -- '/data/up_part1.tar.gz'")
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn tar_archiver_writes_a_gzip_archive() {
        let td = tempfile::tempdir().unwrap();
        let src = td.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("sub/a.txt"), b"alpha").unwrap();
        std::fs::write(src.join("-dash.txt"), b"dash").unwrap();
        let out = td.path().join("x_part1.tar.gz");
        TarArchiver::default()
            .create(&src, &["sub/a.txt", "-dash.txt"], &out, &CancelToken::new())
            .unwrap();
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn tar_archiver_fails_on_missing_file() {
        let td = tempfile::tempdir().unwrap();
        let out = td.path().join("x_part1.tar.gz");
        let err = TarArchiver::default()
            .create(td.path(), &["missing.bin"], &out, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }), "{err}");
    }
}
