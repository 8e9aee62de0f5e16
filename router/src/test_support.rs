//! Scripted doubles for supervisors, workers, and the agent executor.

use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::agents::{DecisionContext, Supervisor, Worker};
use crate::core::decision::parse_symbol;
use crate::core::types::{ConversationState, RoutingDecision};
use crate::io::executor::{ExecRequest, Executor};

/// One scripted supervisor reply.
#[derive(Debug, Clone)]
pub enum ScriptedDecision {
    /// A raw symbol run through the closed-vocabulary parser.
    Symbol(String),
    /// A decision returned as-is, bypassing vocabulary checks.
    Unchecked(RoutingDecision),
    /// The reasoning procedure itself failed.
    Fail(String),
}

/// Supervisor that replays a fixed list of decisions.
///
/// When the script runs out, the last entry repeats; an empty script always
/// finishes.
#[derive(Debug, Default)]
pub struct ScriptedSupervisor {
    script: Mutex<VecDeque<ScriptedDecision>>,
    calls: AtomicU32,
}

impl ScriptedSupervisor {
    pub fn new(script: Vec<ScriptedDecision>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Script of bare symbols, e.g. `["A", "FINISH"]`.
    pub fn symbols(symbols: &[&str]) -> Self {
        Self::new(
            symbols
                .iter()
                .map(|s| ScriptedDecision::Symbol((*s).to_string()))
                .collect(),
        )
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Option<ScriptedDecision> {
        let mut script = self.script.lock().ok()?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

impl Supervisor for ScriptedSupervisor {
    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<RoutingDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next() {
            None => Ok(RoutingDecision::Finish),
            Some(ScriptedDecision::Symbol(raw)) => Ok(parse_symbol(&raw, ctx.members)?),
            Some(ScriptedDecision::Unchecked(decision)) => Ok(decision),
            Some(ScriptedDecision::Fail(message)) => Err(anyhow!(message)),
        }
    }
}

/// Worker that replays scripted results, repeating the last one.
#[derive(Debug)]
pub struct ScriptedWorker {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicU32,
}

impl ScriptedWorker {
    pub fn new(script: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(output: &str) -> Self {
        Self::new(vec![Ok(output.to_string())])
    }

    pub fn failing(message: &str) -> Self {
        Self::new(vec![Err(message.to_string())])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Worker for ScriptedWorker {
    fn act(&self, _state: &ConversationState) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self
            .script
            .lock()
            .map_err(|_| anyhow!("worker script poisoned"))?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("worker script is empty")),
        }
    }
}

/// Executor that writes one fixed JSON reply and records the last request.
#[derive(Debug)]
pub struct CapturingExecutor {
    output: Value,
    last_request: Mutex<Option<ExecRequest>>,
}

impl CapturingExecutor {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            last_request: Mutex::new(None),
        }
    }

    pub fn last_request(&self) -> Option<ExecRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

impl Executor for CapturingExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        write_reply(request, &self.output)
    }
}

/// Executor that replays a queue of JSON replies, one per call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    replies: Mutex<VecDeque<Value>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<()> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        let reply = self
            .replies
            .lock()
            .map_err(|_| anyhow!("reply queue poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no replies left"))?;
        write_reply(request, &reply)
    }
}

fn write_reply(request: &ExecRequest, reply: &Value) -> Result<()> {
    if let Some(parent) = request.output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut buf = serde_json::to_string_pretty(reply)?;
    buf.push('\n');
    fs::write(&request.output_path, buf)?;
    Ok(())
}
