//! Local execution tests
//!
//! These run real `bash` processes inside temporary directories and inspect
//! the log files they leave behind.

use std::fs;
use std::sync::{Arc, Mutex};

use jobrunner::{
    ArrayJobSpec, BackendType, DependencySet, ExecutionFailure, JobDescriptor, JobRunner,
    LOCAL_JOB_ID, RunnerConfig, RunnerError,
};
use tempfile::TempDir;

fn local_runner() -> JobRunner {
    JobRunner::new(RunnerConfig::for_backend(BackendType::Local)).unwrap()
}

fn write_array_file(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("array_file");
    fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_single_job_log_keeps_program_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logfile.log");

    let job = JobDescriptor::new(
        "JobName",
        "(echo text to stdout; echo text to stderr 1>&2)",
        &log,
    );
    let id = local_runner()
        .run(&job, &DependencySet::new())
        .await
        .unwrap();

    assert_eq!(id, LOCAL_JOB_ID);
    assert_eq!(
        fs::read_to_string(&log).unwrap(),
        "text to stdout\ntext to stderr\n"
    );
}

#[tokio::test]
async fn test_quiet_job_writes_same_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logfile.log");

    let job = JobDescriptor::new(
        "JobName",
        "(echo text to stdout; echo text to stderr 1>&2)",
        &log,
    )
    .quiet(true);
    local_runner()
        .run(&job, &DependencySet::new())
        .await
        .unwrap();

    assert_eq!(
        fs::read_to_string(&log).unwrap(),
        "text to stdout\ntext to stderr\n"
    );
}

#[tokio::test]
async fn test_log_path_with_spaces() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("my logs.txt");

    let job = JobDescriptor::new("JobName", "echo spaced", &log).quiet(true);
    local_runner()
        .run(&job, &DependencySet::new())
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&log).unwrap(), "spaced\n");
}

#[tokio::test]
async fn test_array_job_writes_one_log_per_subtask() {
    let dir = tempfile::tempdir().unwrap();
    let array_file = write_array_file(&dir, "World 1\nWorld 2\nWorld 3\n");
    let log = dir.path().join("logfile.log");

    let job = JobDescriptor::new("JobName", "echo Hello {1} {2}", &log);
    let id = local_runner()
        .run_array(&job, &ArrayJobSpec::new(&array_file), &DependencySet::new())
        .await
        .unwrap();
    assert_eq!(id, LOCAL_JOB_ID);

    for n in 1..=3 {
        let path = dir.path().join(format!("logfile.log-{n}"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("Hello World {n}\n")
        );
    }
    assert!(!dir.path().join("logfile.log-4").exists());
}

#[tokio::test]
async fn test_array_job_bounded_pool_runs_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let lines: String = (1..=8).map(|n| format!("item{n}\n")).collect();
    let array_file = write_array_file(&dir, &lines);
    let log = dir.path().join("pool.log");

    let job = JobDescriptor::new("JobName", "echo {1}", &log).quiet(true);
    let array = ArrayJobSpec::new(&array_file).with_max_concurrent(2);
    local_runner()
        .run_array(&job, &array, &DependencySet::new())
        .await
        .unwrap();

    for n in 1..=8 {
        let path = dir.path().join(format!("pool.log-{n}"));
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("item{n}\n"));
    }
}

#[tokio::test]
async fn test_failing_command_propagates_status() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logfile.log");

    let job = JobDescriptor::new("JobName", "exit 100", &log);
    let err = local_runner()
        .run(&job, &DependencySet::new())
        .await
        .unwrap_err();

    match err {
        RunnerError::ExecutionFailed(failure) => {
            assert_eq!(failure.status, 100);
            assert!(failure.command.contains("exit 100"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_tee_does_not_mask_failure() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logfile.log");

    let job = JobDescriptor::new("JobName", "(echo partial; false)", &log);
    let err = local_runner()
        .run(&job, &DependencySet::new())
        .await
        .unwrap_err();
    assert_eq!(err.exit_status(), Some(1));
}

#[tokio::test]
async fn test_exception_handler_receives_failure_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logfile.log");
    let received: Arc<Mutex<Vec<ExecutionFailure>>> = Arc::default();

    let runner = local_runner().with_exception_handler({
        let received = Arc::clone(&received);
        move |failure: &ExecutionFailure| received.lock().unwrap().push(failure.clone())
    });

    let job = JobDescriptor::new("JobName", "exit 100", &log).quiet(true);
    let id = runner.run(&job, &DependencySet::new()).await.unwrap();

    assert_eq!(id, LOCAL_JOB_ID);
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, 100);
}

#[tokio::test]
async fn test_array_failure_routed_to_handler() {
    let dir = tempfile::tempdir().unwrap();
    let array_file = write_array_file(&dir, "0\n3\n0\n");
    let log = dir.path().join("logfile.log");
    let received: Arc<Mutex<Vec<ExecutionFailure>>> = Arc::default();

    let runner = local_runner().with_exception_handler({
        let received = Arc::clone(&received);
        move |failure: &ExecutionFailure| received.lock().unwrap().push(failure.clone())
    });

    let job = JobDescriptor::new("JobName", "exit {1}", &log).quiet(true);
    runner
        .run_array(&job, &ArrayJobSpec::new(&array_file), &DependencySet::new())
        .await
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, 3);
    assert_eq!(received[0].subtask, Some(2));
}

#[tokio::test]
async fn test_missing_array_file() {
    let dir = tempfile::tempdir().unwrap();
    let job = JobDescriptor::new("JobName", "echo {1}", dir.path().join("log"));

    let err = local_runner()
        .run_array(
            &job,
            &ArrayJobSpec::new(dir.path().join("nonexistent")),
            &DependencySet::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::MissingArrayInput { .. }));
    assert!(err.to_string().contains("does not exist"));
    assert!(err.to_string().contains("Cannot start array job JobName"));
}

#[tokio::test]
async fn test_empty_array_file() {
    let dir = tempfile::tempdir().unwrap();
    let array_file = write_array_file(&dir, "\n  \n");
    let job = JobDescriptor::new("JobName", "echo {1}", dir.path().join("log"));

    let err = local_runner()
        .run_array(&job, &ArrayJobSpec::new(&array_file), &DependencySet::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::MissingArrayInput { .. }));
    assert!(err.to_string().contains("is empty"));
}

#[test]
fn test_backend_names_are_case_insensitive() {
    for name in ["Grid", "grid", "GRID"] {
        assert_eq!(RunnerConfig::new(name).unwrap().backend, BackendType::Grid);
    }
    assert_eq!(
        RunnerConfig::new("Local").unwrap().backend,
        BackendType::Local
    );
    assert!(matches!(
        RunnerConfig::new("foobar").unwrap_err(),
        RunnerError::Configuration(_)
    ));
}
