use super::*;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mattecut_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn fake_worker(script: &str) -> WorkerCommand {
    WorkerCommand::new("sh").with_args(["-c", script, "fake-worker"])
}

fn job(dir: &Path, script: &str) -> CleanJob {
    CleanJob::new(
        fake_worker(script),
        Tunables {
            output_dir: dir.join("out"),
            ..Tunables::default()
        },
    )
}

#[cfg(unix)]
#[test]
fn progress_is_parsed_and_mask_removed_after_success() {
    let dir = scratch("clean_ok");
    let input = dir.join("clip.mp4");
    std::fs::write(&input, b"x").unwrap();
    let script = r#"
        test "$1" = "--input" || exit 9
        test -f "$4" || exit 8
        echo "PROGRESS:0.4500"
        echo "loading model"
        echo "PROGRESS:1.0"
    "#;

    let mut events = Vec::new();
    let out = job(&dir, script)
        .run(
            &input,
            &GrayImage::new(8, 8),
            false,
            &CancelToken::new(),
            &mut |ev| events.push(ev),
        )
        .unwrap();

    assert_eq!(out, dir.join("out").join("clip_Clean_001.mp4"));
    assert_eq!(
        events,
        vec![
            WorkerEvent::Progress(0.45),
            WorkerEvent::Log("loading model".to_string()),
            WorkerEvent::Progress(1.0),
        ]
    );
    assert!(!dir.join("out").join("clip_Clean_001_mask.png").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn non_zero_exit_is_a_failure_and_keeps_the_mask() {
    let dir = scratch("clean_fail");
    let input = dir.join("clip.mp4");
    std::fs::write(&input, b"x").unwrap();

    let err = job(&dir, "echo PROGRESS:0.1; echo 'remux failed' >&2; exit 5")
        .run(
            &input,
            &GrayImage::new(8, 8),
            true,
            &CancelToken::new(),
            &mut |_| {},
        )
        .unwrap_err();

    match err {
        MatteError::WorkerFailed { code, detail } => {
            assert_eq!(code, Some(5));
            assert!(detail.contains("remux failed"));
            assert!(detail.contains("clip_Clean_001.mov.log"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dir.join("out").join("clip_Clean_001_mask.png").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn cancel_kills_a_worker_that_has_gone_quiet() {
    let dir = scratch("clean_cancel");
    let input = dir.join("clip.mp4");
    std::fs::write(&input, b"x").unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let started = std::time::Instant::now();
    let err = job(&dir, "echo PROGRESS:0.1; exec sleep 30")
        .run(&input, &GrayImage::new(8, 8), false, &cancel, &mut |ev| {
            if matches!(ev, WorkerEvent::Progress(_)) {
                trigger.cancel();
            }
        })
        .unwrap_err();

    assert!(matches!(err, MatteError::Cancelled), "{err}");
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert!(dir.join("out").join("clip_Clean_001_mask.png").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_input_fails_before_spawning() {
    let dir = scratch("clean_missing");
    let err = job(&dir, "exit 0")
        .run(
            &dir.join("absent.mp4"),
            &GrayImage::new(2, 2),
            false,
            &CancelToken::new(),
            &mut |_| {},
        )
        .unwrap_err();
    assert!(matches!(err, MatteError::InputNotFound(_)));
    assert!(!dir.join("out").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sibling_worker_lives_next_to_the_executable() {
    let cmd = WorkerCommand::sibling().unwrap();
    let name = cmd.program.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(WORKER_BIN));
    assert!(cmd.leading_args.is_empty());
}
