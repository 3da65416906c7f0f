//! # Activity Tracing
//!
//! Capability interface for nested activities around session and operation
//! work. Activities are backed by `tracing` spans, so any subscriber installed
//! by the host receives them; [`NoopTracer`] produces disabled spans.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, Span};

/// Starts named activities
pub trait Tracer: Send + Sync + fmt::Debug {
    fn start_activity(&self, name: &'static str, tags: &[(&str, &str)]) -> Activity;
}

struct ActivityInner {
    name: &'static str,
    span: Span,
    started: Instant,
    enabled: bool,
}

impl Drop for ActivityInner {
    fn drop(&mut self) {
        if self.enabled {
            let _entered = self.span.enter();
            debug!(
                activity = self.name,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "activity finished"
            );
        }
    }
}

/// Handle to a running activity; finishes when the last clone drops
#[derive(Clone)]
pub struct Activity {
    inner: Arc<ActivityInner>,
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("name", &self.inner.name)
            .field("enabled", &self.inner.enabled)
            .finish()
    }
}

impl Activity {
    fn new(name: &'static str, span: Span, enabled: bool) -> Self {
        Self {
            inner: Arc::new(ActivityInner {
                name,
                span,
                started: Instant::now(),
                enabled,
            }),
        }
    }

    /// Disabled activity; children are disabled too
    pub fn none() -> Self {
        Self::new("none", Span::none(), false)
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }
}

impl Tracer for Activity {
    fn start_activity(&self, name: &'static str, tags: &[(&str, &str)]) -> Activity {
        if !self.inner.enabled {
            return Activity::none();
        }
        let span = debug_span!(
            parent: &self.inner.span,
            "activity",
            activity = name,
            tags = %format_tags(tags)
        );
        Activity::new(name, span, true)
    }
}

/// Default tracer emitting `tracing` spans under the current span
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn start_activity(&self, name: &'static str, tags: &[(&str, &str)]) -> Activity {
        let span = debug_span!("activity", activity = name, tags = %format_tags(tags));
        Activity::new(name, span, true)
    }
}

/// Tracer with no listener attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_activity(&self, _name: &'static str, _tags: &[(&str, &str)]) -> Activity {
        Activity::none()
    }
}

fn format_tags(tags: &[(&str, &str)]) -> String {
    tags.iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_children_are_disabled() {
        let root = NoopTracer.start_activity("Session", &[("session_id", "s1")]);
        let child = root.start_activity("Operation", &[]);
        assert!(!root.is_enabled());
        assert!(!child.is_enabled());
    }

    #[test]
    fn test_tracing_activity_nests() {
        let root = TracingTracer.start_activity("Session", &[("session_id", "s1")]);
        let child = root.start_activity("Execution", &[]);
        assert!(child.is_enabled());
        assert_eq!(child.name(), "Execution");
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(format_tags(&[("a", "1"), ("b", "2")]), "a=1,b=2");
        assert_eq!(format_tags(&[]), "");
    }
}
