use rustc_hash::FxHashSet;

use super::{Machine, RuntimeError, State};

/// Resume commands accepted while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Continue,
    StepInto,
    StepOver,
    StepOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEventKind {
    Entered,
    Stepped,
    Paused,
    Terminated,
    ErrorHalted,
}

/// One frame of a pause snapshot. Bindings are in declaration order,
/// initialised slots only; the innermost declaration wins for shadowed
/// names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub function: String,
    pub bindings: Vec<(String, String)>,
}

/// Emitted at every pause and at termination. `line` and `call_stack`
/// reflect the state before the paused statement executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent {
    pub kind: DebugEventKind,
    pub line: u32,
    /// Outermost frame first.
    pub call_stack: Vec<FrameSnapshot>,
    pub message: Option<String>,
}

/// Drives a [`Machine`] one statement at a time. Pauses happen only at
/// statement boundaries; a breakpoint line pauses on every arrival under
/// every command. After Terminated or ErrorHalted every further command
/// returns the terminal event again.
pub struct DebugController<'ir> {
    machine: Machine<'ir>,
    breakpoints: FxHashSet<u32>,
    terminal: Option<DebugEvent>,
}

impl<'ir> DebugController<'ir> {
    pub fn new(machine: Machine<'ir>) -> Self {
        DebugController {
            machine,
            breakpoints: FxHashSet::default(),
            terminal: None,
        }
    }

    pub fn machine(&self) -> &Machine<'ir> {
        &self.machine
    }

    pub fn add_breakpoint(&mut self, line: u32) {
        self.breakpoints.insert(line);
    }

    pub fn remove_breakpoint(&mut self, line: u32) {
        self.breakpoints.remove(&line);
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Start the program and pause before the first statement of the entry
    /// function.
    pub fn launch(&mut self) -> DebugEvent {
        if let Some(event) = self.terminal.clone() {
            return event;
        }
        if self.machine.state() == State::Created
            && let Err(err) = self.machine.start()
        {
            return self.halt(err);
        }
        self.machine.state = State::Paused;
        let event = self.pause(DebugEventKind::Entered);
        tracing::debug!(line = event.line, "debug session entered");
        event
    }

    pub fn resume(&mut self, command: Command) -> DebugEvent {
        if let Some(event) = self.terminal.clone() {
            return event;
        }
        if self.machine.state() == State::Created {
            return self.launch();
        }
        let resume_depth = self.machine.depth();
        self.machine.state = State::Running;
        tracing::debug!(?command, depth = resume_depth, "resumed");
        loop {
            match self.machine.advance() {
                Ok(true) => {
                    let event = DebugEvent {
                        kind: DebugEventKind::Terminated,
                        line: 0,
                        call_stack: Vec::new(),
                        message: None,
                    };
                    self.terminal = Some(event.clone());
                    return event;
                }
                Err(err) => return self.halt(err),
                Ok(false) => {}
            }
            if !self.machine.at_statement_boundary() {
                continue;
            }
            let line = self.machine.current_line();
            if self.breakpoints.contains(&line) {
                self.machine.state = State::Paused;
                tracing::debug!(line, "breakpoint hit");
                return self.pause(DebugEventKind::Paused);
            }
            let stop = match command {
                Command::Continue => false,
                Command::StepInto => true,
                Command::StepOver => self.machine.depth() <= resume_depth,
                Command::StepOut => self.machine.depth() < resume_depth,
            };
            if stop {
                self.machine.state = State::Paused;
                return self.pause(DebugEventKind::Stepped);
            }
        }
    }

    fn pause(&self, kind: DebugEventKind) -> DebugEvent {
        DebugEvent {
            kind,
            line: self.machine.current_line(),
            call_stack: capture_stack(&self.machine),
            message: None,
        }
    }

    fn halt(&mut self, err: RuntimeError) -> DebugEvent {
        let event = DebugEvent {
            kind: DebugEventKind::ErrorHalted,
            line: err.line(),
            call_stack: capture_stack(&self.machine),
            message: Some(err.to_string()),
        };
        self.terminal = Some(event.clone());
        event
    }
}

fn capture_stack(machine: &Machine<'_>) -> Vec<FrameSnapshot> {
    machine
        .frames
        .iter()
        .map(|frame| {
            let function = machine.program.function(frame.function);
            let mut bindings: Vec<(String, String)> = Vec::new();
            if let Some(function) = function {
                for (index, cell) in frame.slots.iter().enumerate() {
                    let Some(value) = cell else { continue };
                    let name = function
                        .slot_names
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| format!("slot{index}"));
                    let rendered = value.binding_text();
                    if let Some(entry) = bindings.iter_mut().find(|(bound, _)| *bound == name) {
                        entry.1 = rendered;
                    } else {
                        bindings.push((name, rendered));
                    }
                }
            }
            FrameSnapshot {
                function: function.map_or_else(|| "?".to_string(), |f| f.name.clone()),
                bindings,
            }
        })
        .collect()
}

/// Adapter for externally produced line traces: turns `(line, bindings)`
/// pairs into the same Entered/Stepped/Terminated sequence native stepping
/// produces, so foreign tracers feed the same consumers.
pub fn wrap_line_trace<I>(function: &str, pairs: I) -> Vec<DebugEvent>
where
    I: IntoIterator<Item = (u32, Vec<(String, String)>)>,
{
    let mut events = Vec::new();
    for (line, bindings) in pairs {
        let kind = if events.is_empty() {
            DebugEventKind::Entered
        } else {
            DebugEventKind::Stepped
        };
        events.push(DebugEvent {
            kind,
            line,
            call_stack: vec![FrameSnapshot {
                function: function.to_string(),
                bindings,
            }],
            message: None,
        });
    }
    events.push(DebugEvent {
        kind: DebugEventKind::Terminated,
        line: 0,
        call_stack: Vec::new(),
        message: None,
    });
    events
}
