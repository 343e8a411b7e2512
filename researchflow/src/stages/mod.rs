//! Stage trait and implementations.
//!
//! Stages are the units of work the orchestrator sequences. Each one turns
//! the previous stage's items into new items, calling collaborators through
//! the [`StageInvoker`] it is handed.

mod io;
mod item;

pub use io::{StageInput, StageOutput};
pub use item::ResearchItem;

use crate::errors::Result;
use crate::invoke::StageInvoker;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for pipeline stages.
#[async_trait]
pub trait StageLogic: Send + Sync + Debug {
    /// Returns the name of the stage; unique within a pipeline.
    fn name(&self) -> &str;

    /// Whether the stage is pointless without items from the previous stage.
    ///
    /// When true and the previous stage produced nothing, the orchestrator
    /// records a partial run instead of calling [`run`](Self::run).
    fn requires_input(&self) -> bool {
        true
    }

    /// Executes the stage.
    async fn run(&self, input: StageInput, invoker: &StageInvoker) -> Result<StageOutput>;
}

/// An async closure adapted into a stage.
///
/// The closure receives an owned clone of the gateway, which only holds
/// shared handles.
pub struct FnStage<F, Fut>
where
    F: Fn(StageInput, StageInvoker) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput>> + Send,
{
    name: String,
    requires_input: bool,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut>
where
    F: Fn(StageInput, StageInvoker) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput>> + Send,
{
    /// Creates a new closure stage that requires input.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            requires_input: true,
            func,
            _phantom: PhantomData,
        }
    }

    /// Sets whether the stage requires items from the previous stage.
    #[must_use]
    pub fn with_requires_input(mut self, requires_input: bool) -> Self {
        self.requires_input = requires_input;
        self
    }
}

impl<F, Fut> Debug for FnStage<F, Fut>
where
    F: Fn(StageInput, StageInvoker) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("requires_input", &self.requires_input)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> StageLogic for FnStage<F, Fut>
where
    F: Fn(StageInput, StageInvoker) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutput>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_input(&self) -> bool {
        self.requires_input
    }

    async fn run(&self, input: StageInput, invoker: &StageInvoker) -> Result<StageOutput> {
        (self.func)(input, invoker.clone()).await
    }
}
