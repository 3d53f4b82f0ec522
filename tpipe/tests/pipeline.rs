use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

fn tpipe<I, S>(args: I) -> Output
	where I: IntoIterator<Item = S>, S: AsRef<std::ffi::OsStr>
{
	tpipe_in(args, None)
}

fn tpipe_in<I, S>(args: I, dir: Option<&Path>) -> Output
	where I: IntoIterator<Item = S>, S: AsRef<std::ffi::OsStr>
{
	let mut cmd = Command::new(env!("CARGO_BIN_EXE_tpipe"));
	cmd.args(args).env_remove("TPIPE_LOG");
	if let Some(dir) = dir {
		cmd.current_dir(dir);
	}
	cmd.output().expect("running tpipe")
}

fn stdout(out: &Output) -> String {
	String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
	String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Report text with every number (pids, timings, counters) blanked out.
fn shape(out: &Output) -> String {
	let mut shaped = String::new();
	for c in stdout(out).chars() {
		if !c.is_ascii_digit() {
			shaped.push(c);
		} else if !shaped.ends_with('#') {
			shaped.push('#');
		}
	}
	shaped
}

fn real_seconds(out: &Output) -> Vec<f64> {
	stdout(out).lines()
		.filter_map(|l| l.trim_start().strip_prefix("real "))
		.map(|rest| rest.split('s').next().unwrap().parse().unwrap())
		.collect()
}

#[test]
fn empty_invocation_does_nothing() {
	let out = tpipe(Vec::<&str>::new());
	assert_eq!(out.status.code(), Some(0));
	assert!(out.stdout.is_empty());
	assert!(out.stderr.is_empty());
}

#[test]
fn empty_stage_is_a_usage_error() {
	let dir = tempfile::tempdir().unwrap();
	let marker = dir.path().join("ran");
	let touch = format!("touch {}", marker.display());
	let out = tpipe(vec!["sh", "-c", touch.as_str(), "!", "!", "cat"]);
	assert_eq!(out.status.code(), Some(2));
	assert!(stderr(&out).contains("stage 1 is empty"), "{}", stderr(&out));
	assert!(out.stdout.is_empty());
	assert!(!marker.exists(), "a stage was spawned despite the usage error");

	let out = tpipe(vec!["echo", "hi", "!"]);
	assert_eq!(out.status.code(), Some(2));
}

#[test]
fn single_stage_writes_straight_to_stdout() {
	let out = tpipe(vec!["echo", "hello"]);
	assert_eq!(out.status.code(), Some(0));
	let text = stdout(&out);
	let lines: Vec<&str> = text.lines().collect();
	assert_eq!(lines.len(), 4, "{}", text);
	// The creation notice and the program's own output race each other.
	let mut head = lines[.. 2].to_vec();
	head.sort();
	assert!(head[0].starts_with("Process ") && head[0].ends_with("created with command echo"), "{}", text);
	assert_eq!(head[1], "hello");
	assert!(lines[2].ends_with("(echo) exited normally with status 0"), "{}", text);
	assert!(lines[3].contains("real ") && lines[3].contains("user ") && lines[3].contains("system ")
	        && lines[3].contains("context switches "), "{}", text);
}

#[test]
fn two_stages_pass_bytes_through_the_pipe() {
	let dir = tempfile::tempdir().unwrap();
	let file = dir.path().join("out.txt");
	let sink = format!("cat > '{}'", file.display());
	let out = tpipe(vec!["printf", "hello\\n", "!", "sh", "-c", sink.as_str()]);
	assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
	assert_eq!(fs::read(&file).unwrap(), b"hello\n");
	assert_eq!(stdout(&out).matches("exited normally with status 0").count(), 2);
}

#[test]
fn middle_stages_see_end_of_stream() {
	let out = tpipe(vec!["echo", "x", "!", "cat", "!", "cat", "!", "cat", "!", "wc", "-c"]);
	assert_eq!(out.status.code(), Some(0));
	assert!(stdout(&out).lines().any(|l| l.trim() == "2"), "{}", stdout(&out));
	assert_eq!(stdout(&out).matches("created with command").count(), 5);
}

#[test]
fn large_output_does_not_deadlock() {
	let out = tpipe(vec!["head", "-c", "1000000", "/dev/zero", "!", "wc", "-c"]);
	assert_eq!(out.status.code(), Some(0));
	assert!(stdout(&out).lines().any(|l| l.trim() == "1000000"), "{}", stdout(&out));
}

#[test]
fn closed_reader_ends_the_writer() {
	let out = tpipe(vec!["yes", "!", "head", "-n", "1"]);
	assert_eq!(out.status.code(), Some(0));
	let text = stdout(&out);
	assert!(text.contains("(yes) terminated by signal 13"), "{}", text);
	assert!(text.contains("(head) exited normally with status 0"), "{}", text);
}

#[test]
fn missing_program_is_an_exec_failure() {
	let out = tpipe(vec!["/no/such/binary"]);
	assert_eq!(out.status.code(), Some(127));
	assert!(stderr(&out).contains("tpipe: /no/such/binary: exec failed"), "{}", stderr(&out));
	let text = stdout(&out);
	assert!(text.contains("(/no/such/binary) could not be executed"), "{}", text);
	assert!(!text.contains("exited normally"), "{}", text);
}

#[test]
fn missing_bare_name_is_an_exec_failure() {
	let out = tpipe(vec!["echo", "x", "!", "tpipe-no-such-program"]);
	assert_eq!(out.status.code(), Some(127));
	assert!(stderr(&out).contains("tpipe: tpipe-no-such-program: exec failed"), "{}", stderr(&out));
	assert!(stdout(&out).contains("(echo) "), "{}", stdout(&out));
}

#[test]
fn non_executable_file_cannot_execute() {
	let dir = tempfile::tempdir().unwrap();
	let file = dir.path().join("data");
	fs::write(&file, "not a program").unwrap();
	let out = tpipe(vec![file.to_str().unwrap()]);
	assert_eq!(out.status.code(), Some(126));
	assert!(stdout(&out).contains("could not be executed"), "{}", stdout(&out));
}

#[test]
fn relative_path_is_canonicalized() {
	let dir = tempfile::tempdir().unwrap();
	let script = dir.path().join("hello.sh");
	fs::write(&script, "#!/bin/sh\necho from-script\n").unwrap();
	fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
	let out = tpipe_in(vec!["./hello.sh"], Some(dir.path()));
	assert_eq!(out.status.code(), Some(0), "{}", stderr(&out));
	let text = stdout(&out);
	let canonical = fs::canonicalize(&script).unwrap();
	assert!(text.contains(&format!("created with command {}", canonical.display())), "{}", text);
	assert!(text.contains("from-script"), "{}", text);
}

#[test]
fn exit_code_is_reported_and_propagated() {
	let out = tpipe(vec!["sh", "-c", "exit 3"]);
	assert!(stdout(&out).contains("(sh) exited normally with status 3"), "{}", stdout(&out));
	assert_eq!(out.status.code(), Some(3));
}

#[test]
fn only_the_last_stage_sets_the_exit_code() {
	let out = tpipe(vec!["sh", "-c", "exit 3", "!", "true"]);
	assert_eq!(out.status.code(), Some(0));
	let out = tpipe(vec!["true", "!", "sh", "-c", "exit 4"]);
	assert_eq!(out.status.code(), Some(4));
}

#[test]
fn killed_stage_is_reported_as_signaled() {
	let out = tpipe(vec!["sh", "-c", "kill -9 $$"]);
	assert!(stdout(&out).contains("(sh) terminated by signal 9 (SIGKILL"), "{}", stdout(&out));
	assert!(!stdout(&out).contains("exited normally"));
	assert_eq!(out.status.code(), Some(128 + 9));
}

#[test]
fn stages_get_default_interrupt_handling() {
	let out = tpipe(vec!["sh", "-c", "kill -INT $$; exit 0"]);
	assert!(stdout(&out).contains("terminated by signal 2 (SIGINT"), "{}", stdout(&out));
	assert_eq!(out.status.code(), Some(128 + 2));
}

#[test]
fn repeated_runs_have_the_same_shape() {
	let args = vec!["printf", "a", "!", "sh", "-c", "cat > /dev/null"];
	let first = tpipe(args.clone());
	let second = tpipe(args);
	assert_eq!(first.status.code(), second.status.code());
	assert_eq!(shape(&first), shape(&second));
}

#[test]
fn elapsed_time_covers_sleep() {
	let out = tpipe(vec!["sleep", "0.3"]);
	assert_eq!(out.status.code(), Some(0));
	let real = real_seconds(&out);
	assert_eq!(real.len(), 1, "{}", stdout(&out));
	assert!(real[0] >= 0.3, "{}", stdout(&out));
}

#[test]
fn early_stage_is_not_charged_for_a_slow_one() {
	let out = tpipe(vec!["sh", "-c", "sleep 1", "!", "true"]);
	assert_eq!(out.status.code(), Some(0));
	let real = real_seconds(&out);
	assert_eq!(real.len(), 2, "{}", stdout(&out));
	assert!(real[0] >= 1.0, "{}", stdout(&out));
	assert!(real[1] < 0.5, "{}", stdout(&out));
}

#[test]
fn exec_failure_is_reported_once() {
	let out = tpipe(vec!["/no/such/binary"]);
	assert_eq!(stderr(&out).matches("/no/such/binary").count(), 1, "{}", stderr(&out));
}

#[test]
fn reports_come_in_launch_order() {
	let out = tpipe(vec!["sh", "-c", "sleep 0.2", "!", "true"]);
	let text = stdout(&out);
	let sh = text.find("(sh) exited").unwrap();
	let t = text.find("(true) exited").unwrap();
	assert!(sh < t, "{}", text);
}

#[test]
fn debug_logging_goes_to_stderr() {
	let out = Command::new(env!("CARGO_BIN_EXE_tpipe"))
		.args(["true", "!", "true"])
		.env("TPIPE_LOG", "debug")
		.output()
		.unwrap();
	assert_eq!(out.status.code(), Some(0));
	assert!(stderr(&out).contains("pipe table allocated"), "{}", stderr(&out));
	assert!(!stdout(&out).contains("pipe table allocated"));
}
