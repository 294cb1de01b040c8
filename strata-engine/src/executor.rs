//! Script execution seam
//!
//! The scheduler spawns step scripts through [`ScriptRunner`] so it never
//! knows about zones directly. The production implementation executes inside
//! a run's zone via the store; tests substitute a plain shell runner.

use tokio::process::Child;

use strata_store::{BUILD_DIR, ExecutionContext};

/// Spawns step scripts with piped stdout/stderr for line streaming.
pub trait ScriptRunner: Send + Sync {
    fn spawn_script(&self, script: &str, env: &[(String, String)]) -> std::io::Result<Child>;
}

/// Executes step scripts inside a run's zone
///
/// Scripts are paths relative to the build area and are run under
/// `/usr/bin/sh -x` so every command they execute lands in the log stream.
pub struct ZoneScriptRunner {
    ctx: ExecutionContext,
}

impl ZoneScriptRunner {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    fn render_command(&self, script: &str, env: &[(String, String)]) -> String {
        let mut command = format!("cd {} && env", BUILD_DIR);
        for (key, value) in env {
            command.push(' ');
            command.push_str(key);
            command.push('=');
            command.push_str(&shell_quote(value));
        }
        command.push_str(" /usr/bin/sh -x ");
        command.push_str(script);
        command
    }
}

impl ScriptRunner for ZoneScriptRunner {
    fn spawn_script(&self, script: &str, env: &[(String, String)]) -> std::io::Result<Child> {
        self.ctx.spawn(&self.render_command(script, env))
    }
}

/// Single-quotes a value for the zone's shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain_and_quoted() {
        assert_eq!(shell_quote("main"), "'main'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_render_command_shape() {
        let runner = ZoneScriptRunner::new(ExecutionContext::run("katarineko", "a1b2c3d4"));
        let env = vec![("STRATA_STEP".to_string(), "build".to_string())];
        let command = runner.render_command("katarineko/build.sh", &env);
        assert_eq!(
            command,
            "cd /build && env STRATA_STEP='build' /usr/bin/sh -x katarineko/build.sh"
        );
    }
}
