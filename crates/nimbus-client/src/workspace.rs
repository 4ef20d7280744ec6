use std::sync::Arc;

use crate::control_plane::ControlPlane;
use crate::waiter::PollPolicy;

/// The handle every orchestration call goes through: one control plane plus
/// the default poll policy. Built once at startup and passed explicitly.
#[derive(Clone)]
pub struct Workspace {
    control_plane: Arc<dyn ControlPlane>,
    poll: PollPolicy,
}

impl Workspace {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            control_plane,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn control_plane(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }
}
