use std::sync::Arc;

use mcs_supervisor::Supervisor;

#[derive(Clone)]
pub struct AdminState {
    pub supervisor: Arc<Supervisor>,
}
