/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the worker is going down
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    /// A component died and the worker cannot carry on
    Error(String),
}

impl ShutdownReason {
    /// Process exit code for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::Error(_) => 1,
        }
    }
}

pub(super) const BUS_COMPONENT: &str = "bus";
pub(super) const CONTROL_COMPONENT: &str = "control";
pub(super) const LOOP_COMPONENT: &str = "loop";
