use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::PipelineLike;

/// The process-wide pipeline singleton.
///
/// The first caller of [`ensure_ready`][Self::ensure_ready] constructs the
/// pipeline; concurrent callers await that same construction and every later
/// call returns the same handle. A failed construction leaves the cell empty,
/// so the next call may attempt it again — there is no poisoned state.
pub struct PipelineCell {
    cell: OnceCell<Arc<dyn PipelineLike>>,
}

impl PipelineCell {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Creates a cell that is already in the ready state.
    pub fn preloaded(pipeline: Arc<dyn PipelineLike>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(pipeline)),
        }
    }

    pub fn get(&self) -> Option<&Arc<dyn PipelineLike>> {
        self.cell.get()
    }

    /// Returns the pipeline, constructing it through `load` if this is the
    /// first call. `load` runs at most once per successful construction.
    pub async fn ensure_ready<F, Fut>(&self, load: F) -> Result<&Arc<dyn PipelineLike>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn PipelineLike>>>,
    {
        self.cell.get_or_try_init(load).await
    }
}

impl Default for PipelineCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use image::DynamicImage;

    use super::*;
    use crate::{GenerationError, GenerationRequest, PipelineCapabilities};

    struct NullPipeline;

    impl PipelineLike for NullPipeline {
        fn capabilities(&self) -> PipelineCapabilities {
            PipelineCapabilities::default()
        }

        fn run(&self, _request: &GenerationRequest) -> Result<DynamicImage, GenerationError> {
            Ok(DynamicImage::new_rgb8(1, 1))
        }
    }

    #[tokio::test]
    async fn constructs_exactly_once_under_concurrent_access() {
        let cell = PipelineCell::new();
        let loads = AtomicUsize::new(0);
        let load = || async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullPipeline) as Arc<dyn PipelineLike>)
        };

        let (first, second) = tokio::join!(cell.ensure_ready(load), cell.ensure_ready(load));
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(first, second));
    }

    #[tokio::test]
    async fn failed_construction_is_retried_on_the_next_call() {
        let cell = PipelineCell::new();

        let err = cell
            .ensure_ready(|| async { Err(anyhow!("weights unavailable")) })
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("weights unavailable"));
        assert!(cell.get().is_none());

        cell.ensure_ready(|| async { Ok(Arc::new(NullPipeline) as Arc<dyn PipelineLike>) })
            .await
            .unwrap();
        assert!(cell.get().is_some());
    }

    #[tokio::test]
    async fn preloaded_cell_never_invokes_the_loader() {
        let cell = PipelineCell::preloaded(Arc::new(NullPipeline));
        let loads = AtomicUsize::new(0);

        cell.ensure_ready(|| async {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullPipeline) as Arc<dyn PipelineLike>)
        })
        .await
        .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }
}
