use std::fmt;

/// Externally visible lifecycle state of a capture worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Stopped,
    Running,
    Paused,
    Halted,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Running => "running",
            WorkerState::Paused => "paused",
            WorkerState::Halted => "halted",
        };
        f.write_str(name)
    }
}

/// Command flags shared between the control thread and the worker.
///
/// `halted` is orthogonal to `paused`: ending a halt returns to whichever of
/// running or paused was in effect. Every transition reports whether it
/// changed anything so callers can log no-ops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub active: bool,
    pub paused: bool,
    pub halted: bool,
}

impl ControlState {
    pub fn state(&self) -> WorkerState {
        match (self.active, self.halted, self.paused) {
            (false, _, _) => WorkerState::Stopped,
            (true, true, _) => WorkerState::Halted,
            (true, false, true) => WorkerState::Paused,
            (true, false, false) => WorkerState::Running,
        }
    }

    /// True while the worker should sleep instead of reading frames.
    pub fn is_suspended(&self) -> bool {
        self.active && (self.paused || self.halted)
    }

    /// True when the worker may read and publish.
    pub fn is_working(&self) -> bool {
        self.active && !self.paused && !self.halted
    }

    pub fn activate(&mut self) {
        *self = Self {
            active: true,
            paused: false,
            halted: false,
        };
    }

    pub fn pause(&mut self) -> bool {
        let changed = self.active && !self.paused;
        self.paused |= changed;
        changed
    }

    pub fn resume(&mut self) -> bool {
        let changed = self.active && self.paused;
        self.paused &= !changed;
        changed
    }

    pub fn halt(&mut self) -> bool {
        let changed = self.active && !self.halted;
        self.halted |= changed;
        changed
    }

    pub fn end_halt(&mut self) -> bool {
        let changed = self.active && self.halted;
        self.halted &= !changed;
        changed
    }

    pub fn stop(&mut self) -> bool {
        let changed = self.active;
        *self = Self::default();
        changed
    }
}
