//! Custom actions attached to a rule: an HTTP call or a local script.

use crate::error::{NotifyError, Result};
use crate::tasks::TaskQueue;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MESSAGE_PLACEHOLDER: &str = "#MESSAGE";
pub const SCRIPT_SCHEME: &str = "script://";
pub const HTTP_TASK_LABEL: &str = "Notification";
/// Delay before a queued HTTP call or script starts.
pub const ACTION_TASK_DELAY: Duration = Duration::from_millis(200);

/// What a custom action resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomAction {
    Http(String),
    Script { executable: PathBuf, args: String },
}

/// Parses `action` after substituting `#MESSAGE` with `subject`.
///
/// Relative script paths resolve against `scripts_dir`. Any `../` segment is
/// rejected before the path is touched.
pub fn parse_custom_action(action: &str, subject: &str, scripts_dir: &Path) -> Result<CustomAction> {
    let action = action.replace(MESSAGE_PLACEHOLDER, subject);

    if action.starts_with("http://") || action.starts_with("https://") {
        return Ok(CustomAction::Http(action));
    }

    let Some(script) = action.strip_prefix(SCRIPT_SCHEME) else {
        return Err(NotifyError::UnsupportedAction(action));
    };
    if script.contains("../") {
        return Err(NotifyError::UnsafeAction(script.to_string()));
    }

    let (exe, args) = script.split_once(' ').unwrap_or((script, ""));
    let executable = if exe.starts_with('/') {
        PathBuf::from(exe)
    } else {
        scripts_dir.join(exe)
    };
    Ok(CustomAction::Script {
        executable,
        args: args.to_string(),
    })
}

/// Resolves and enqueues a custom action. Scripts are only queued when the
/// executable exists.
pub fn run_custom_action(
    action: &str,
    subject: &str,
    scripts_dir: &Path,
    tasks: &dyn TaskQueue,
) -> Result<CustomAction> {
    let parsed = parse_custom_action(action, subject, scripts_dir)?;
    match &parsed {
        CustomAction::Http(url) => tasks.enqueue_http(ACTION_TASK_DELAY, url, HTTP_TASK_LABEL),
        CustomAction::Script { executable, args } => {
            if !executable.exists() {
                return Err(NotifyError::ScriptNotFound(executable.clone()));
            }
            tasks.enqueue_script(ACTION_TASK_DELAY, executable, args);
        }
    }
    Ok(parsed)
}

/// Splits a script argument string into argv entries.
///
/// Whitespace separates arguments. Single quotes keep their content as is,
/// double quotes group words and honour `\"` and `\\`. No shell is involved.
pub fn split_script_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = args.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_arg = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_arg = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    out.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            _ => {
                in_arg = true;
                current.push(c);
            }
        }
    }
    if in_arg {
        out.push(current);
    }
    out
}
