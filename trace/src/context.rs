use std::sync::Arc;

use io_context::Context;

use crate::basetypes::{SpanID, TraceFlags, TraceID};
use crate::id_generator::{IDGenerator, DEFAULT_ID_GENERATOR};

/// TraceContext identifies one position in a trace tree. It is the state that
/// must propagate across process boundaries.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default)]
pub struct TraceContext {
    /// trace_id is shared by every span of the trace.
    pub trace_id: TraceID,
    /// span_id identifies this span.
    pub span_id: SpanID,
    /// parent_span_id is the span that caused this one, none for roots.
    pub parent_span_id: Option<SpanID>,
    /// trace_flags carries the sampling decision.
    pub trace_flags: TraceFlags,
}

impl TraceContext {
    /// new_root starts a new trace using the default id generator.
    pub fn new_root(sampled: bool) -> Self {
        Self::new_root_with(&**DEFAULT_ID_GENERATOR, sampled)
    }

    /// new_root_with starts a new trace drawing ids from id_generator.
    pub fn new_root_with(id_generator: &dyn IDGenerator, sampled: bool) -> Self {
        TraceContext {
            trace_id: id_generator.new_trace_id(),
            span_id: id_generator.new_span_id(),
            parent_span_id: None,
            trace_flags: TraceFlags::default().with_sampled(sampled),
        }
    }

    /// child derives the context of a span caused by this one. The trace id
    /// and flags are inherited.
    pub fn child(&self) -> Self {
        self.child_with(&**DEFAULT_ID_GENERATOR)
    }

    /// child_with is child drawing the new span id from id_generator.
    pub fn child_with(&self, id_generator: &dyn IDGenerator) -> Self {
        TraceContext {
            trace_id: self.trace_id,
            span_id: id_generator.new_span_id(),
            parent_span_id: Some(self.span_id),
            trace_flags: self.trace_flags,
        }
    }

    /// is_sampled returns true if the span will be exported.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// is_root reports whether the context has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// is_valid reports whether both ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    pub(crate) fn set_sampled(&mut self, sampled: bool) {
        self.trace_flags = self.trace_flags.with_sampled(sampled);
    }
}

const TRACE_CONTEXT_KEY: &str = "LUMEN_TRACE_CONTEXT_KEY";

/// current returns the trace context carried by ctx.
pub fn current(ctx: &Context) -> Option<&TraceContext> {
    ctx.get_value(TRACE_CONTEXT_KEY)
}

/// with_trace_context returns a child of parent that carries trace_context.
/// Work started from the returned context parents onto trace_context.
pub fn with_trace_context(parent: &Arc<Context>, trace_context: TraceContext) -> Context {
    let mut ctx = Context::create_child(parent);
    ctx.add_value(TRACE_CONTEXT_KEY, trace_context);
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: TraceID = TraceID([1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 4, 8, 16, 32, 64, 128]);
    const SID: SpanID = SpanID([1, 2, 4, 8, 16, 32, 64, 128]);

    #[test]
    fn root_context_has_no_parent() {
        let sampled = TraceContext::new_root(true);
        assert!(sampled.is_root());
        assert!(sampled.is_sampled());
        assert!(sampled.is_valid());

        let unsampled = TraceContext::new_root(false);
        assert!(!unsampled.is_sampled());
        assert_ne!(sampled.trace_id, unsampled.trace_id);
    }

    #[test]
    fn child_inherits_trace_and_flags() {
        for flags in &[TraceFlags(0), TraceFlags(1)] {
            let parent = TraceContext {
                trace_id: TID,
                span_id: SID,
                parent_span_id: None,
                trace_flags: *flags,
            };
            let child = parent.child();
            assert_eq!(child.trace_id, parent.trace_id);
            assert_eq!(child.parent_span_id, Some(parent.span_id));
            assert_eq!(child.trace_flags, parent.trace_flags);
            assert_ne!(child.span_id, parent.span_id);

            let grandchild = child.child();
            assert_eq!(grandchild.trace_id, TID);
            assert_eq!(grandchild.parent_span_id, Some(child.span_id));
        }
    }

    #[test]
    fn context_roundtrip() {
        let trace_context = TraceContext {
            trace_id: TID,
            span_id: SID,
            parent_span_id: None,
            trace_flags: TraceFlags(1),
        };
        let ctx = with_trace_context(&Context::background().freeze(), trace_context);
        assert_eq!(current(&ctx), Some(&trace_context));
    }

    #[test]
    fn background_has_no_trace_context() {
        assert!(current(&Context::background()).is_none());
    }
}
