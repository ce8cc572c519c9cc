//! Declarative registration: route tables bound to controller instances.
//!
//! A [`ControllerRoutes`] describes the patterns a controller type
//! serves, holding unbound method references keyed by the type itself.
//! Exporting binds every entry to a concrete instance and yields a fresh
//! [`Registry`]; exports are independent, so two instances of the same
//! controller never share state through the route table.

use std::future::Future;
use std::sync::Arc;

use rmpv::Value;

use crate::message::PatternType;
use crate::middleware::Middleware;
use crate::registry::{Handler, HandlerFuture, HandlerResult, Registry};

type UnboundHandler<C> = Arc<dyn Fn(Arc<C>, Value) -> HandlerFuture + Send + Sync>;

struct RouteEntry<C> {
    pattern: String,
    kind: PatternType,
    method: UnboundHandler<C>,
}

/// Route table for controller type `C`.
pub struct ControllerRoutes<C> {
    entries: Vec<RouteEntry<C>>,
    middleware: Vec<(String, Vec<Arc<Middleware>>)>,
}

impl<C: Send + Sync + 'static> ControllerRoutes<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Declares a request route served by a method of `C`.
    pub fn request<F, Fut>(&mut self, pattern: impl Into<String>, method: F) -> &mut Self
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.entries.push(RouteEntry {
            pattern: pattern.into(),
            kind: PatternType::Request,
            method: Arc::new(move |instance, data| Box::pin(method(instance, data))),
        });
        self
    }

    /// Declares an event route served by a method of `C`.
    pub fn event<F, Fut>(&mut self, pattern: impl Into<String>, method: F) -> &mut Self
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.entries.push(RouteEntry {
            pattern: pattern.into(),
            kind: PatternType::Event,
            method: Arc::new(move |instance, data| Box::pin(method(instance, data))),
        });
        self
    }

    /// Attaches per-pattern middleware carried into every export.
    pub fn middleware_for(
        &mut self,
        pattern: impl Into<String>,
        chain: Vec<Arc<Middleware>>,
    ) -> &mut Self {
        self.middleware.push((pattern.into(), chain));
        self
    }

    /// Binds every route to `instance` and returns the populated
    /// registry.
    pub fn export(&self, instance: Arc<C>) -> Registry {
        let mut registry = Registry::new();
        for entry in &self.entries {
            let method = entry.method.clone();
            let instance = instance.clone();
            let handler: Arc<Handler> = Arc::new(move |data| method(instance.clone(), data));
            match entry.kind {
                PatternType::Request => registry.insert_request(entry.pattern.clone(), handler),
                PatternType::Event => registry.insert_event(entry.pattern.clone(), handler),
            }
        }
        for (pattern, chain) in &self.middleware {
            registry.use_for_pattern(pattern.clone(), chain.clone());
        }
        registry
    }

    /// Constructs the instance and exports in one step.
    pub fn export_default(&self) -> Registry
    where
        C: Default,
    {
        self.export(Arc::new(C::default()))
    }
}

impl<C: Send + Sync + 'static> Default for ControllerRoutes<C> {
    fn default() -> Self {
        Self::new()
    }
}
