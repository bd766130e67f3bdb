//! The five-phase handler chain dispatcher. Phases run strictly in order;
//! handlers within a phase run in registration order.

use tracing::trace;

use crate::context::PipelineContext;
use crate::default_handlers::{
    BlockSelfReferential, CrossReferenceResolver, EntityTypeValidator, ExtractEntityType,
    ForgetDeleteAndStop, LogProcessingResult, SetForgetFlag,
};
use crate::handler::{admits, HandlerOutcome, RegisteredHandler};
use crate::object::{HandlerPhase, KnowledgeObject};

pub struct KnowledgePipeline {
    handlers: Vec<RegisteredHandler>,
}

impl KnowledgePipeline {
    /// Build a pipeline with no handlers registered.
    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, phase: HandlerPhase, handler: Box<dyn crate::handler::Handler>) {
        self.handlers.push(RegisteredHandler { phase, handler });
    }

    /// The default handler registry. Manifest and Network phases are
    /// intentionally empty.
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::empty();
        pipeline.register(HandlerPhase::Rid, Box::new(BlockSelfReferential));
        pipeline.register(HandlerPhase::Rid, Box::new(SetForgetFlag));
        pipeline.register(HandlerPhase::Rid, Box::new(ForgetDeleteAndStop));
        pipeline.register(HandlerPhase::Rid, Box::new(ExtractEntityType));
        pipeline.register(HandlerPhase::Bundle, Box::new(EntityTypeValidator));
        pipeline.register(HandlerPhase::Bundle, Box::new(CrossReferenceResolver));
        pipeline.register(HandlerPhase::Final, Box::new(LogProcessingResult));
        pipeline
    }

    /// Run `object` through every phase in order. Returns the final object
    /// state even if a handler stopped the chain early.
    pub async fn process(&self, mut object: KnowledgeObject, ctx: &PipelineContext) -> KnowledgeObject {
        'phases: for phase in HandlerPhase::ALL {
            for registered in self.handlers.iter().filter(|r| r.phase == phase) {
                if !admits(registered.handler.as_ref(), &object) {
                    continue;
                }
                trace!(phase = ?phase, handler = registered.handler.name(), rid = %object.rid);
                object = match registered.handler.handle(object, ctx).await {
                    HandlerOutcome::Continue(o) => o,
                    HandlerOutcome::StopChain(o) => {
                        object = o;
                        break 'phases;
                    }
                };
            }
        }
        object
    }
}

impl Default for KnowledgePipeline {
    fn default() -> Self {
        Self::with_defaults()
    }
}
