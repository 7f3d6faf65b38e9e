use std::time::Duration;

use thiserror::Error;

use crate::stage::StageKind;

/// Output collaborators that can fail independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkKind {
    Renderer,
    Status,
    Log,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SinkKind::Renderer => "renderer",
            SinkKind::Status => "status sink",
            SinkKind::Log => "record log",
        };
        f.write_str(name)
    }
}

/// Failure classes seen by the pipeline.
///
/// Only `StartupFault` and `AlreadyStarted` are ever returned to a caller. The
/// others are logged and counted where they happen; stages keep looping.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage transient fault: {source}")]
    TransientFault {
        stage: StageKind,
        source: anyhow::Error,
    },
    #[error("{sink} fault: {source}")]
    SinkFault {
        sink: SinkKind,
        source: anyhow::Error,
    },
    #[error("startup failed ({component}): {source}")]
    StartupFault {
        component: &'static str,
        source: anyhow::Error,
    },
    #[error("{stage} stage did not stop within {grace:?}; abandoned")]
    ShutdownTimeout { stage: StageKind, grace: Duration },
    #[error("pipeline already started")]
    AlreadyStarted,
}

impl PipelineError {
    pub(crate) fn startup(component: &'static str, source: impl Into<anyhow::Error>) -> Self {
        PipelineError::StartupFault {
            component,
            source: source.into(),
        }
    }
}
