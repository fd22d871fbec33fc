use crate::error::Result;
use crate::worker::PartialResult;

// ========== Partial-result handoff ==========

/// Parks one worker's result until the orchestrator collects it.
///
/// Each artifact is saved once by its worker, then loaded once and deleted
/// once by the orchestrator. Workers never see each other's artifacts.
pub trait PartialStore {
    type Handle: Send;

    fn save(&self, worker: usize, result: &PartialResult) -> Result<Self::Handle>;
    fn load(&self, handle: &Self::Handle) -> Result<PartialResult>;
    fn delete(&self, handle: Self::Handle) -> Result<()>;

    /// Handle under which `worker` saves, whether or not it has done so yet.
    fn handle_for(&self, worker: usize) -> Self::Handle;
}
