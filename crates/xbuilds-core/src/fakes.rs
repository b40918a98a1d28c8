//! In-memory process runner (testing only)
//!
//! [`ScriptedRunner`] answers invocations from per-program handlers, records
//! every call, and can hand unscripted programs to a real runner. Handlers
//! may touch the filesystem under `invocation.cwd` to play the part of a
//! build system.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, SweepError};
use crate::process::{Invocation, ProcessOutput, ProcessRunner};

type Handler = Box<dyn Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync>;

/// Scripted [`ProcessRunner`] keyed by program name.
#[derive(Default)]
pub struct ScriptedRunner {
    handlers: HashMap<String, Handler>,
    fallback: Option<Arc<dyn ProcessRunner>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program` with `handler`.
    pub fn on<F>(mut self, program: &str, handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync + 'static,
    {
        self.handlers.insert(program.to_string(), Box::new(handler));
        self
    }

    /// Answer every call to `program` with a copy of `output`.
    pub fn respond(self, program: &str, output: ProcessOutput) -> Self {
        self.on(program, move |_| Ok(output.clone()))
    }

    /// Send programs without a handler to `runner` instead of failing.
    pub fn with_fallback(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.fallback = Some(runner);
        self
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Invocations of a single program, in order.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.program == program)
            .collect()
    }
}

/// Exit-code-only output.
pub fn exit_with(code: i32) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        ..ProcessOutput::default()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(handler) = self.handlers.get(&invocation.program) {
            return handler(invocation);
        }
        match &self.fallback {
            Some(runner) => runner.run(invocation).await,
            None => Err(SweepError::Spawn {
                program: invocation.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no scripted handler"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_response_and_recording() {
        let runner = ScriptedRunner::new().respond("ccache", exit_with(0));
        let out = runner
            .run(&Invocation::new("ccache", "/tmp").arg("-s"))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(runner.calls_to("ccache").len(), 1);
        assert_eq!(runner.calls_to("ccache")[0].args, vec!["-s".to_string()]);
    }

    #[tokio::test]
    async fn test_unscripted_program_fails_to_spawn() {
        let runner = ScriptedRunner::new();
        let err = runner.run(&Invocation::new("make", "/tmp")).await.unwrap_err();
        assert!(matches!(err, SweepError::Spawn { .. }));
        assert_eq!(runner.calls().len(), 1);
    }
}
