//! Generated remote scripts
//!
//! Three artifacts drive one remote execution:
//! - the master script, run once per submission, fans out to every due
//!   Runner's jobscript through the host's submitter
//! - one jobscript per Runner, which invokes the shared bootstrap and
//!   records a failure if the bootstrap dies without recording one itself
//! - the shared bootstrap, holding the job function, every Runner's
//!   argument binding and the staleness guard
//!
//! Every script wraps its body in `{ ...; exit; }` so the shell has parsed
//! all of it before anything runs; a re-staged copy may replace the file
//! while an older execution is still in flight.

use regex_lite::Regex;
use std::sync::OnceLock;

use crate::shell::quote;

/// Exit status of a bootstrap that already recorded `failed` itself
pub const RECORDED_FAILURE_STATUS: i32 = 86;

/// Marker comment ending every line of the master script that submits a Runner
pub const SUBMISSION_MARKER: &str = "# submission line";

const TS_FN: &str = "_ts() { date -u '+%Y-%m-%d %H:%M:%S'; }";

/// One Runner launched by the master script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub short_id: String,
    /// Jobscript file name, relative to the remote directory
    pub jobscript: String,
    /// Launch in the background so Runners execute concurrently
    pub background: bool,
}

/// Master script for one submission
#[derive(Debug, Clone)]
pub struct MasterScript<'a> {
    pub process_name: &'a str,
    pub process_short_id: &'a str,
    /// Manifest file name, relative to the remote directory
    pub manifest: &'a str,
    pub submitter: &'a str,
    pub submissions: &'a [Submission],
}

impl MasterScript<'_> {
    pub fn render(&self) -> String {
        let psid = self.process_short_id;
        let mut lines = vec![
            "#!/usr/bin/env bash".to_string(),
            format!("# remora master script: {}", self.process_name),
            "{".to_string(),
            "export sourcedir=\"$PWD\"".to_string(),
            format!("_manifest=\"$sourcedir\"/{}", quote(self.manifest)),
            TS_FN.to_string(),
            "_submit_failed() {".to_string(),
            "    _msg=$(cat \"$2\" 2>/dev/null)".to_string(),
            "    if [ -n \"$_msg\" ]; then".to_string(),
            "        printf '%s [%s] [stderr] %s\\n' \"$(_ts)\" \"$1\" \"$_msg\" >> \"$_manifest\"".to_string(),
            "    fi".to_string(),
            "    printf '%s [%s] failed\\n' \"$(_ts)\" \"$1\" >> \"$_manifest\"".to_string(),
            // the runner is already failed by the time the process sees the error
            "    if [ -n \"$_msg\" ]; then".to_string(),
            format!(
                "        printf '%s [%s] [stderr] %s\\n' \"$(_ts)\" {} \"$_msg\" >> \"$_manifest\"",
                psid
            ),
            "    fi".to_string(),
            "}".to_string(),
            "_now=$(_ts)".to_string(),
            format!("echo \"$_now [{}] submitted\"", psid),
            format!("printf '%s [%s] submitted\\n' \"$_now\" {} >> \"$_manifest\"", psid),
        ];

        for submission in self.submissions {
            lines.push(format!(
                "printf '%s [%s] submitted\\n' \"$(_ts)\" {} >> \"$_manifest\"",
                submission.short_id
            ));
        }

        for submission in self.submissions {
            let background = if submission.background { " &" } else { "" };
            let capture = format!("\".{}.$$.submit\"", submission.short_id);
            lines.push(format!(
                "( {submitter} {jobscript} 2>{capture} || _submit_failed {sid} {capture}; rm -f {capture} ) >/dev/null 2>&1 </dev/null{background}  {marker}",
                submitter = self.submitter,
                jobscript = quote(&submission.jobscript),
                capture = capture,
                sid = submission.short_id,
                background = background,
                marker = SUBMISSION_MARKER,
            ));
        }

        lines.push("exit 0".to_string());
        lines.push("}".to_string());
        let mut script = lines.join("\n");
        script.push('\n');
        script
    }
}

/// Jobscript of one Runner
#[derive(Debug, Clone)]
pub struct Jobscript<'a> {
    pub short_id: &'a str,
    pub process_name: &'a str,
    pub runner_name: &'a str,
    pub function_name: &'a str,
    pub interpreter: &'a str,
    /// Bootstrap file name, relative to the remote directory
    pub bootstrap: &'a str,
    /// Manifest file name, relative to the remote directory
    pub manifest: &'a str,
}

impl Jobscript<'_> {
    pub fn render(&self) -> String {
        let lines = [
            "#!/usr/bin/env bash".to_string(),
            format!("# remora jobscript: {}", self.runner_name),
            "{".to_string(),
            format!("export REMORA_ID={}", self.short_id),
            "cd \"${sourcedir:-.}\" || exit 0".to_string(),
            format!("_manifest={}", quote(self.manifest)),
            TS_FN.to_string(),
            "_out=$(mktemp \"${TMPDIR:-/tmp}/remora.XXXXXX\")".to_string(),
            "_err=$(mktemp \"${TMPDIR:-/tmp}/remora.XXXXXX\")".to_string(),
            format!(
                "{} {} --id {} --process {} --runner {} --function {} --manifest {} >\"$_out\" 2>\"$_err\"",
                self.interpreter,
                quote(self.bootstrap),
                self.short_id,
                quote(self.process_name),
                quote(self.runner_name),
                quote(self.function_name),
                quote(self.manifest),
            ),
            "_status=$?".to_string(),
            format!(
                "if [ \"$_status\" -ne 0 ] && [ \"$_status\" -ne {} ]; then",
                RECORDED_FAILURE_STATUS
            ),
            "    if [ -s \"$_out\" ]; then printf '%s [%s] [stdout] %s\\n' \"$(_ts)\" \"$REMORA_ID\" \"$(cat \"$_out\")\" >> \"$_manifest\"; fi".to_string(),
            "    if [ -s \"$_err\" ]; then printf '%s [%s] [stderr] %s\\n' \"$(_ts)\" \"$REMORA_ID\" \"$(cat \"$_err\")\" >> \"$_manifest\"; fi".to_string(),
            "    printf '%s [%s] failed\\n' \"$(_ts)\" \"$REMORA_ID\" >> \"$_manifest\"".to_string(),
            "fi".to_string(),
            "rm -f \"$_out\" \"$_err\"".to_string(),
            "exit 0".to_string(),
            "}".to_string(),
        ];
        let mut script = lines.join("\n");
        script.push('\n');
        script
    }
}

/// Argument binding and integrity checks of one Runner, embedded in the
/// bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub short_id: String,
    /// Positional arguments in declared order
    pub args: Vec<String>,
    /// Result file name, relative to the remote directory
    pub result: String,
    /// `(file name, sha256)` pairs verified before the function runs
    pub checks: Vec<(String, String)>,
}

const BOOTSTRAP_PROLOGUE: &str = r#"ID=""
PROCESS=""
RUNNER=""
FUNCTION=""
MANIFEST=""
while [ $# -gt 0 ]; do
    if [ $# -lt 2 ]; then
        echo "missing value for $1" >&2
        exit 2
    fi
    case "$1" in
        --id) ID="$2" ;;
        --process) PROCESS="$2" ;;
        --runner) RUNNER="$2" ;;
        --function) FUNCTION="$2" ;;
        --manifest) MANIFEST="$2" ;;
        *) echo "unknown argument: $1" >&2; exit 2 ;;
    esac
    shift 2
done
if [ -z "$ID" ] || [ -z "$PROCESS" ] || [ -z "$FUNCTION" ] || [ -z "$MANIFEST" ]; then
    echo "usage: $0 --id ID --process NAME --runner NAME --function NAME --manifest FILE" >&2
    exit 2
fi
_ts() { date -u '+%Y-%m-%d %H:%M:%S'; }
_state() { printf '%s [%s] %s\n' "$(_ts)" "$ID" "$1" >> "$MANIFEST"; }
_line() { printf '%s [%s] [%s] %s\n' "$(_ts)" "$ID" "$1" "$2" >> "$MANIFEST"; }
_emit() { if [ -s "$2" ]; then _line "$1" "$(cat "$2")"; fi; }
_fail() { _line stderr "$1"; _state failed; exit 86; }
_sha256() {
    if command -v sha256sum >/dev/null 2>&1; then
        sha256sum "$1" | cut -d' ' -f1
    else
        shasum -a 256 "$1" | cut -d' ' -f1
    fi
}
_verify() {
    if [ ! -f "$1" ]; then
        _fail "integrity check failed: $1 is missing"
    fi
    _actual=$(_sha256 "$1")
    if [ "$_actual" != "$2" ]; then
        _fail "integrity mismatch for $1: expected $2, got $_actual"
    fi
}
_last_time() {
    grep -aiE "^.{19} \[$ID\] (\[state\] )?(started|submitted)[[:space:]]*$" "$MANIFEST" 2>/dev/null | tail -n 1 | cut -c1-19
}"#;

const BOOTSTRAP_MAIN: &str = r#"_main() {
    # the guard compares against this exact stamp, so it must not be read twice
    START=$(_ts)
    printf '%s [%s] started\n' "$START" "$ID" >> "$MANIFEST"
    _bind "$ID" || _fail "no argument binding for runner $ID"
    for _check in "${REMORA_CHECKS[@]}"; do
        _verify "${_check%:*}" "${_check##*:}"
    done
    _out=$(mktemp "${TMPDIR:-/tmp}/remora.XXXXXX")
    _err=$(mktemp "${TMPDIR:-/tmp}/remora.XXXXXX")
    ( "$FUNCTION" "${REMORA_ARGS[@]}" ) >"$_out" 2>"$_err" </dev/null
    _status=$?
    if [ "$_status" -ne 0 ]; then
        _emit stdout "$_out"
        _emit stderr "$_err"
        rm -f "$_out" "$_err"
        _state failed
        exit 86
    fi
    # a newer start or submission of this runner supersedes this execution
    _latest=$(_last_time)
    if [[ -n "$_latest" && "$_latest" > "$START" ]]; then
        rm -f "$_out" "$_err"
        exit 0
    fi
    _emit stdout "$_out"
    _emit stderr "$_err"
    printf '%s' "$(cat "$_out")" > "$REMORA_RESULT.partial.$$"
    mv -f "$REMORA_RESULT.partial.$$" "$REMORA_RESULT"
    rm -f "$_out" "$_err"
    _state completed
    exit 0
}
_main; exit $?"#;

/// Shared bootstrap: prologue, job function, bindings, main sequence
#[derive(Debug, Clone)]
pub struct Bootstrap<'a> {
    pub process_name: &'a str,
    pub function_source: &'a str,
    pub bindings: &'a [Binding],
}

impl Bootstrap<'_> {
    pub fn render(&self) -> String {
        let mut script = String::new();
        script.push_str("#!/usr/bin/env bash\n");
        script.push_str(&format!("# remora bootstrap: {}\n", self.process_name));
        script.push_str("{\n");
        script.push_str(BOOTSTRAP_PROLOGUE);
        script.push_str("\n### function ###\n");
        script.push_str(self.function_source);
        if !self.function_source.ends_with('\n') {
            script.push('\n');
        }
        script.push_str("### bindings ###\n");
        script.push_str(&self.render_bindings());
        script.push_str(BOOTSTRAP_MAIN);
        script.push_str("\n}\n");
        script
    }

    fn render_bindings(&self) -> String {
        let mut lines = vec!["_bind() {".to_string(), "    case \"$1\" in".to_string()];
        for binding in self.bindings {
            let args = binding.args.iter().map(|a| quote(a)).collect::<Vec<_>>().join(" ");
            let checks = binding
                .checks
                .iter()
                .map(|(name, hash)| quote(&format!("{}:{}", name, hash)))
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(format!("        {})", binding.short_id));
            lines.push(format!("            REMORA_ARGS=({})", args));
            lines.push(format!("            REMORA_RESULT={}", quote(&binding.result)));
            lines.push(format!("            REMORA_CHECKS=({})", checks));
            lines.push("            ;;".to_string());
        }
        lines.push("        *)".to_string());
        lines.push("            return 1".to_string());
        lines.push("            ;;".to_string());
        lines.push("    esac".to_string());
        lines.push("}".to_string());
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// The master script's submission lines with their 1-based line numbers
pub fn submission_lines(master: &str) -> Vec<(usize, &str)> {
    master
        .lines()
        .enumerate()
        .filter(|(_, line)| line.trim_end().ends_with(SUBMISSION_MARKER))
        .map(|(idx, line)| (idx + 1, line))
        .collect()
}

/// Line numbers at which the shell reported `command not found`
pub fn command_not_found_lines(stderr: &str) -> Vec<usize> {
    static NOT_FOUND: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = NOT_FOUND
        .get_or_init(|| Regex::new(r"line (\d+): .*command not found").ok())
        .as_ref()
    else {
        return Vec::new();
    };
    re.captures_iter(stderr)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}
