//! Running external engines (color and reconstruction).

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// One external process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Short program name for messages.
    pub fn engine_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

impl EngineOutcome {
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

pub trait EngineRunner {
    fn run(&self, invocation: &Invocation) -> std::io::Result<EngineOutcome>;
}

/// Runs invocations as child processes, blocking until they exit. The
/// engine's own output goes straight to the terminal.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl EngineRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> std::io::Result<EngineOutcome> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        log::debug!("Running {:?}", invocation);
        let status = command.status()?;
        Ok(EngineOutcome {
            success: status.success(),
            code: status.code(),
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records invocations and fails the ones `fail_when` selects.
    pub struct FakeRunner<F: Fn(&Invocation) -> bool> {
        pub calls: RefCell<Vec<Invocation>>,
        fail_when: F,
    }

    impl<F: Fn(&Invocation) -> bool> FakeRunner<F> {
        pub fn new(fail_when: F) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_when,
            }
        }
    }

    impl<F: Fn(&Invocation) -> bool> EngineRunner for FakeRunner<F> {
        fn run(&self, invocation: &Invocation) -> std::io::Result<EngineOutcome> {
            self.calls.borrow_mut().push(invocation.clone());
            let failed = (self.fail_when)(invocation);
            Ok(EngineOutcome {
                success: !failed,
                code: Some(if failed { 1 } else { 0 }),
            })
        }
    }
}
