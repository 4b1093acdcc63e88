//! Shared fixtures for the end-to-end suites.
//!
//! The container runtime is replaced by a shell script that answers the
//! readiness checks and, for `run`, prints a canned NDJSON transcript chosen
//! by the prompt (the last argument): `hang`, `structured`, or anything else
//! for the normal tool run.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use agentbox::config::{load_config, Config};

pub const IMAGE: &str = "agentbox-test";

pub const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s1"}"#;
pub const TOOL: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"tu_1","name":"ls","input":{}}]}}"#;
pub const TOOL_RESULT: &str = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tu_1","content":"a.txt"}]}}"#;
pub const DONE: &str = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Done."}]}}"#;
pub const RESULT_OK: &str = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":2,"result":"Done."}"#;
/// A result whose summary fields are not the usual scalars.
pub const RESULT_STRUCTURED: &str = r#"{"type":"result","is_error":false,"num_turns":2.0,"result":{"text":"Done."}}"#;

/// A scratch directory unique to this process and call.
pub fn temp_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "agentbox-it-{label}-{}-{n}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("mkdir");
    dir
}

fn printf_lines(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| format!("printf '%s\\n' '{line}'\n"))
        .collect()
}

/// Write the fake runtime CLI into `dir`. Each `run` stores its arguments in
/// `dir/run-args-<n>` (one per line).
pub fn write_fake_runtime(dir: &Path) -> PathBuf {
    let dir_text = dir.display();
    let script = format!(
        "#!/bin/sh\n\
         case \"$1\" in\n\
         system) exit 0 ;;\n\
         image) echo '{IMAGE}  latest'; exit 0 ;;\n\
         build) exit 0 ;;\n\
         run)\n\
         n=$(ls {dir_text} | grep -c '^run-args-')\n\
         printf '%s\\n' \"$@\" > {dir_text}/run-args-$n\n\
         for last in \"$@\"; do :; done\n\
         case \"$last\" in\n\
         hang)\n\
         {hang}exec sleep 30 ;;\n\
         structured)\n\
         {structured};;\n\
         *)\n\
         {normal};;\n\
         esac\n\
         exit 0 ;;\n\
         esac\n\
         exit 1\n",
        hang = printf_lines(&[INIT, TOOL]),
        structured = printf_lines(&[INIT, DONE, RESULT_STRUCTURED]),
        normal = printf_lines(&[INIT, TOOL, TOOL_RESULT, DONE, RESULT_OK]),
    );
    let path = dir.join("fake-container");
    fs::write(&path, script).expect("write runtime");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Lay out a root directory with a credential file and a config pointing at
/// the fake runtime, then load it the way the binary does.
pub fn test_config(label: &str) -> (Config, PathBuf) {
    agentbox::logging::init_test();
    let root = temp_dir(label);
    let runtime = write_fake_runtime(&root);
    fs::write(root.join(".env"), "CLAUDE_CODE_OAUTH_TOKEN=tok-test\n").expect("env file");
    let config_path = root.join("agentbox.toml");
    fs::write(
        &config_path,
        format!(
            "[paths]\nroot = \"{}\"\n\n[container]\ncommand = \"{}\"\nimage = \"{IMAGE}\"\n\n[persistence]\nflush_event_threshold = 2\n",
            root.display(),
            runtime.display()
        ),
    )
    .expect("write config");
    let config = load_config(Some(config_path.to_string_lossy().as_ref())).expect("load config");
    (config, root)
}

/// Arguments of the `n`th `run` invocation, one per element.
pub fn run_args(root: &Path, n: usize) -> Vec<String> {
    fs::read_to_string(root.join(format!("run-args-{n}")))
        .expect("run args")
        .lines()
        .map(str::to_string)
        .collect()
}
