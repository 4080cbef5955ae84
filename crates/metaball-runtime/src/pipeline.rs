//! Runs the acquisition loop and (optionally) the recording coordinator on
//! their own threads and stops them together.

use std::time::Duration;

use metaball_types::MetaballError;
use tracing::info;

use crate::acquisition::{AcquisitionLoop, AcquisitionStats};
use crate::recording::RecordingCoordinator;
use crate::state::SharedRecordingState;
use crate::worker::{WorkerExit, WorkerHandle, spawn_worker};

/// How each worker ended.
#[derive(Debug)]
pub struct PipelineReport {
    pub acquisition: WorkerExit<AcquisitionStats>,
    pub recorder: Option<WorkerExit<usize>>,
}

pub struct Pipeline {
    state: SharedRecordingState,
    acquisition: WorkerHandle<AcquisitionStats>,
    recorder: Option<WorkerHandle<usize>>,
}

impl Pipeline {
    /// Spawn the workers.  Both observe `state`.
    pub fn start(
        state: SharedRecordingState,
        acquisition: AcquisitionLoop,
        recorder: Option<RecordingCoordinator>,
    ) -> Result<Self, MetaballError> {
        let acquisition = spawn_worker("acquisition", move || acquisition.run())?;
        let recorder = match recorder {
            Some(mut rc) => {
                let spawned = spawn_worker("recorder", move || {
                    rc.run();
                    rc.sessions().len()
                });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        state.request_stop();
                        return Err(e);
                    }
                }
            }
            None => None,
        };
        Ok(Self {
            state,
            acquisition,
            recorder,
        })
    }

    pub fn state(&self) -> &SharedRecordingState {
        &self.state
    }

    /// True once any worker has exited on its own.
    pub fn any_finished(&self) -> bool {
        self.acquisition.is_finished()
            || self.recorder.as_ref().is_some_and(WorkerHandle::is_finished)
    }

    /// Raise `should_stop` and join every worker, each within `timeout`.
    pub fn stop(self, timeout: Duration) -> PipelineReport {
        self.state.request_stop();
        info!("stopping pipeline");
        let acquisition = self.acquisition.join_timeout(timeout);
        let recorder = self.recorder.map(|r| r.join_timeout(timeout));
        PipelineReport {
            acquisition,
            recorder,
        }
    }
}
