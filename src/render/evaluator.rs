//! Node evaluator
//!
//! Walks a component's layout and Node tree, resolving descriptors
//! against the scope stack, call-site locals, configured globals and
//! registered tools. Evaluation is strictly sequential: nodes run in
//! layout order, and within a node every sub-expression completes
//! before the next one starts, so stateful tools observe a
//! deterministic call order.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::fs;

use crate::cache::{CacheEntry, TemplateCache};
use crate::config::EngineConfig;
use crate::error::{FxError, Result};
use crate::render::scope::ScopeStack;
use crate::render::FxValue;
use crate::template::builder::build;
use crate::template::condition::{BinaryOp, Condition, UnaryOp};
use crate::template::descriptor::{Descriptor, PathSegment};
use crate::template::Node;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-component render context
struct RenderCtx {
    component: String,
    /// Values passed at the call site, reachable as bare references
    locals: FxValue,
    /// Pre-rendered `$replace` bodies, consumed by `$place`
    replacements: HashMap<String, String>,
}

/// Renders components against a config and a shared component cache
pub struct Evaluator<'a> {
    config: &'a EngineConfig,
    cache: &'a TemplateCache,
}

impl<'a> Evaluator<'a> {
    pub fn new(config: &'a EngineConfig, cache: &'a TemplateCache) -> Self {
        Self { config, cache }
    }

    /// Render a component by dotted path with the given locals.
    pub async fn render(&self, component: &str, locals: FxValue) -> Result<String> {
        self.render_with(component, locals, HashMap::new()).await
    }

    /// Render with caller-supplied replacements for the component's
    /// top-level `$place` slots.
    pub async fn render_with(
        &self,
        component: &str,
        locals: FxValue,
        replacements: HashMap<String, String>,
    ) -> Result<String> {
        if !matches!(locals, FxValue::Object(_)) {
            return Err(FxError::Usage(
                "render locals must be an object".to_string(),
            ));
        }
        self.render_component(component, locals, replacements).await
    }

    /// Load and parse a component without rendering it.
    pub async fn check(&self, component: &str) -> Result<()> {
        self.load_component(component).await.map(|_| ())
    }

    async fn render_component(
        &self,
        component: &str,
        locals: FxValue,
        replacements: HashMap<String, String>,
    ) -> Result<String> {
        let (layout, nodes) = self.load_component(component).await?;
        let mut scopes = ScopeStack::new();
        let ctx = RenderCtx {
            component: component.to_string(),
            locals,
            replacements,
        };
        let output = self
            .eval_nodes(layout, &nodes, &mut scopes, &ctx)
            .await?;
        Ok(post_process(&output))
    }

    async fn load_component(&self, component: &str) -> Result<(String, Arc<Vec<Node>>)> {
        let path = self.config.component_path(component);

        if self.config.cache {
            if let Some(entry) = self.cache.get(&path) {
                match &*entry {
                    CacheEntry::Parsed { layout, nodes, .. } => {
                        return Ok((layout.clone(), nodes.clone()));
                    }
                    CacheEntry::Unparsed { template } => {
                        let block =
                            build(template, 1, true).map_err(|e| e.in_component(component))?;
                        let nodes = Arc::new(block.nodes);
                        self.cache.store_parsed(
                            &path,
                            template.clone(),
                            block.layout.clone(),
                            nodes.clone(),
                        );
                        return Ok((block.layout, nodes));
                    }
                }
            }
        }

        let template = self.read_component(&path, component).await?;
        let block = build(&template, 1, true).map_err(|e| e.in_component(component))?;
        let nodes = Arc::new(block.nodes);
        if self.config.cache {
            self.cache
                .store_parsed(&path, template, block.layout.clone(), nodes.clone());
        }
        Ok((block.layout, nodes))
    }

    async fn read_component(&self, path: &std::path::Path, component: &str) -> Result<String> {
        match fs::read_to_string(path).await {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FxError::ComponentUndefined(component.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Raw text of a component, for `$include`.
    async fn read_include(&self, component: &str) -> Result<String> {
        let path = self.config.component_path(component);
        if self.config.cache {
            if let Some(entry) = self.cache.get(&path) {
                return Ok(entry.template().to_string());
            }
        }
        let template = self.read_component(&path, component).await?;
        if self.config.cache {
            self.cache.store_template(&path, template.clone());
        }
        Ok(template)
    }

    async fn eval_nodes(
        &self,
        layout: String,
        nodes: &[Node],
        scopes: &mut ScopeStack,
        ctx: &RenderCtx,
    ) -> Result<String> {
        let mut output = layout;
        for node in nodes {
            let rendered = self.eval_node(node, &mut *scopes, ctx).await?;
            output = output.replacen(node.placeholder(), &rendered, 1);
        }
        Ok(output)
    }

    fn eval_node<'s>(
        &'s self,
        node: &'s Node,
        scopes: &'s mut ScopeStack,
        ctx: &'s RenderCtx,
    ) -> BoxFuture<'s, Result<String>> {
        Box::pin(async move {
            match node {
                Node::If(n) => {
                    for branch in &n.branches {
                        if self
                            .eval_condition(&branch.condition, &*scopes, ctx)
                            .await?
                        {
                            return self
                                .eval_nodes(
                                    branch.body.layout.clone(),
                                    &branch.body.nodes,
                                    &mut *scopes,
                                    ctx,
                                )
                                .await;
                        }
                    }
                    match &n.else_body {
                        Some(body) => {
                            self.eval_nodes(body.layout.clone(), &body.nodes, &mut *scopes, ctx)
                                .await
                        }
                        None => Ok(String::new()),
                    }
                }
                Node::ForEach(n) => {
                    let value = self.eval_descriptor(&n.collection, &*scopes, ctx).await?;
                    let FxValue::Array(items) = value else {
                        return Err(FxError::Render {
                            component: ctx.component.clone(),
                            message: format!(
                                "foreach collection is not an array (line {})",
                                n.line
                            ),
                        });
                    };
                    // One scope frame shared across iterations; each pass
                    // reassigns the item and index bindings in place.
                    let mut output = String::new();
                    scopes.push();
                    for (i, item) in items.into_iter().enumerate() {
                        scopes.assign(n.item.as_str(), item);
                        if let Some(index) = &n.index {
                            scopes.assign(index.as_str(), FxValue::from(i));
                        }
                        let result = self
                            .eval_nodes(n.body.layout.clone(), &n.body.nodes, &mut *scopes, ctx)
                            .await;
                        match result {
                            Ok(text) => output.push_str(&text),
                            Err(e) => {
                                scopes.pop();
                                return Err(e);
                            }
                        }
                    }
                    scopes.pop();
                    Ok(output)
                }
                Node::Render(n) => {
                    let mut locals = IndexMap::new();
                    for (key, descriptor) in &n.locals {
                        let value = self.eval_descriptor(descriptor, &*scopes, ctx).await?;
                        locals.insert(key.clone(), value);
                    }
                    let mut replacements = HashMap::new();
                    for (key, block) in &n.replacements {
                        let rendered = self
                            .eval_nodes(block.layout.clone(), &block.nodes, &mut *scopes, ctx)
                            .await?;
                        replacements.insert(key.clone(), rendered);
                    }
                    self.render_component(&n.path, FxValue::Object(locals), replacements)
                        .await
                }
                Node::Include(n) => self.read_include(&n.path).await,
                Node::Print(n) => {
                    let value = self.eval_descriptor(&n.value, &*scopes, ctx).await?;
                    Ok(value.to_output_string())
                }
                Node::Log(n) => {
                    let value = self.eval_descriptor(&n.value, &*scopes, ctx).await?;
                    let message = value.to_output_string();
                    match &self.config.log_sink {
                        Some(sink) => sink(&message),
                        None => tracing::info!("{}", message),
                    }
                    Ok(String::new())
                }
                Node::Place(n) => match ctx.replacements.get(&n.key) {
                    Some(rendered) => Ok(rendered.clone()),
                    None => Err(FxError::Render {
                        component: ctx.component.clone(),
                        message: format!(
                            "no replacement provided for place '{}' (line {})",
                            n.key, n.line
                        ),
                    }),
                },
            }
        })
    }

    fn eval_descriptor<'s>(
        &'s self,
        descriptor: &'s Descriptor,
        scopes: &'s ScopeStack,
        ctx: &'s RenderCtx,
    ) -> BoxFuture<'s, Result<FxValue>> {
        Box::pin(async move {
            match descriptor {
                Descriptor::Scalar(s) => Ok(s.value.clone()),
                Descriptor::Reference(r) => {
                    let base = scopes
                        .lookup(&r.key)
                        .or_else(|| ctx.locals.get_property(&r.key));
                    let Some(base) = base else {
                        if self.config.env.is_development() {
                            tracing::debug!(
                                "undefined reference '{}' in component '{}' (line {})",
                                r.key,
                                ctx.component,
                                r.line
                            );
                        }
                        return Ok(FxValue::Undefined);
                    };
                    Ok(resolve_path(base, &r.path))
                }
                Descriptor::Global(g) => {
                    let base = self
                        .config
                        .globals
                        .get_property(&g.key)
                        .ok_or_else(|| FxError::UndefinedGlobal(g.key.clone()))?;
                    Ok(resolve_path(base, &g.path))
                }
                Descriptor::Tool(t) => {
                    let tool = self
                        .config
                        .tools
                        .lookup(&t.key)
                        .ok_or_else(|| FxError::UndefinedTool(t.key.clone()))?
                        .clone();
                    let mut args = Vec::with_capacity(t.args.len());
                    for arg in &t.args {
                        args.push(self.eval_descriptor(arg, scopes, ctx).await?);
                    }
                    let result = tool(args).await.map_err(|e| match e {
                        e @ FxError::Tool { .. } => e,
                        other => FxError::Tool {
                            name: t.key.clone(),
                            message: other.to_string(),
                        },
                    })?;
                    Ok(resolve_path(&result, &t.path))
                }
            }
        })
    }

    /// A binary condition evaluates its parenthesized side first when
    /// exactly one side is parenthesized; otherwise left to right.
    /// Logical operators short-circuit on the first side evaluated.
    fn eval_condition<'s>(
        &'s self,
        condition: &'s Condition,
        scopes: &'s ScopeStack,
        ctx: &'s RenderCtx,
    ) -> BoxFuture<'s, Result<bool>> {
        Box::pin(async move {
            match condition {
                Condition::Operand { value, .. } => {
                    Ok(self.eval_descriptor(value, scopes, ctx).await?.is_truthy())
                }
                Condition::Unary {
                    operator: UnaryOp::Not,
                    operand,
                    ..
                } => Ok(!self.eval_condition(operand, scopes, ctx).await?),
                Condition::Binary {
                    operator,
                    left,
                    right,
                    ..
                } => {
                    let right_first = right.parenthesized() && !left.parenthesized();
                    if operator.is_logical() {
                        let (first, second) = if right_first {
                            (right, left)
                        } else {
                            (left, right)
                        };
                        let first_result = self.eval_condition(first, scopes, ctx).await?;
                        return match operator {
                            BinaryOp::And if !first_result => Ok(false),
                            BinaryOp::Or if first_result => Ok(true),
                            _ => self.eval_condition(second, scopes, ctx).await,
                        };
                    }

                    let (left_value, right_value) = if right_first {
                        let rv = self.eval_comparand(right, scopes, ctx).await?;
                        let lv = self.eval_comparand(left, scopes, ctx).await?;
                        (lv, rv)
                    } else {
                        let lv = self.eval_comparand(left, scopes, ctx).await?;
                        let rv = self.eval_comparand(right, scopes, ctx).await?;
                        (lv, rv)
                    };

                    use std::cmp::Ordering;
                    Ok(match operator {
                        BinaryOp::Eq => left_value.loose_eq(&right_value),
                        BinaryOp::Ne => !left_value.loose_eq(&right_value),
                        BinaryOp::StrictEq => left_value.strict_eq(&right_value),
                        BinaryOp::StrictNe => !left_value.strict_eq(&right_value),
                        BinaryOp::Lt => {
                            matches!(left_value.compare(&right_value), Some(Ordering::Less))
                        }
                        BinaryOp::Le => matches!(
                            left_value.compare(&right_value),
                            Some(Ordering::Less | Ordering::Equal)
                        ),
                        BinaryOp::Gt => {
                            matches!(left_value.compare(&right_value), Some(Ordering::Greater))
                        }
                        BinaryOp::Ge => matches!(
                            left_value.compare(&right_value),
                            Some(Ordering::Greater | Ordering::Equal)
                        ),
                        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                    })
                }
            }
        })
    }

    /// A comparison operand is a plain value, or a parenthesized
    /// condition whose boolean result is compared.
    async fn eval_comparand(
        &self,
        condition: &Condition,
        scopes: &ScopeStack,
        ctx: &RenderCtx,
    ) -> Result<FxValue> {
        match condition {
            Condition::Operand { value, .. } => self.eval_descriptor(value, scopes, ctx).await,
            _ => Ok(FxValue::Bool(
                self.eval_condition(condition, scopes, ctx).await?,
            )),
        }
    }
}

fn resolve_path(value: &FxValue, path: &[PathSegment]) -> FxValue {
    let mut current = value;
    for segment in path {
        if current.is_nullish() {
            return FxValue::Undefined;
        }
        let next = match segment {
            PathSegment::Key(key) => current.get_property(key),
            PathSegment::Index(index) => current.get_index(*index),
        };
        match next {
            Some(v) => current = v,
            None => return FxValue::Undefined,
        }
    }
    current.clone()
}

/// Trim every line and drop blank ones, joining with newlines. Runs
/// on each component's output after all placeholders are filled.
pub fn post_process(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
