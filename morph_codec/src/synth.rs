//! Routine synthesizer.
//!
//! A routine is assembled as a flat list of operations (steps plus
//! `block`/`otherwise`/`close_block` markers), the same way a code
//! generator would emit lines, and then lowered into a tree of composed
//! closures by [`Synthesizer::finalize`]. Routines refer to each other by
//! name through [`RoutineHandle`]s, which are bound once every routine of
//! the session has been lowered; this is what lets a routine call itself.

use crate::errors::{CodecError, CodecResult, ErrorKind};
use crate::value::Instance;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Where a field's value was found in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Key(String),
    Path(Vec<String>),
    Index(usize),
}

impl Location {
    pub fn fetch<'a>(&self, input: &'a Value) -> Option<&'a Value> {
        match self {
            Location::Key(key) => input.get(key.as_str()),
            Location::Path(path) => path.iter().try_fold(input, |v, key| v.get(key.as_str())),
            Location::Index(idx) => input.get(*idx),
        }
    }
}

/// Routine-local storage cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Slot {
    #[default]
    Vacant,
    Located(Location),
    Instance(Instance),
    Dynamic(Value),
}

/// Mutable state of one routine invocation.
#[derive(Debug, Default)]
pub struct Locals {
    slots: Vec<Slot>,
    cursor: Vec<String>,
    consumed: HashSet<String>,
    missing: Vec<String>,
}

impl Locals {
    fn with_slots(count: usize) -> Self {
        Self {
            slots: vec![Slot::Vacant; count],
            ..Self::default()
        }
    }

    pub fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx)
    }

    pub fn slot_mut(&mut self, idx: usize) -> &mut Slot {
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, Slot::Vacant);
        }
        &mut self.slots[idx]
    }

    pub fn set(&mut self, idx: usize, slot: Slot) {
        *self.slot_mut(idx) = slot;
    }

    pub fn take(&mut self, idx: usize) -> Slot {
        self.slots.get_mut(idx).map(std::mem::take).unwrap_or_default()
    }

    pub fn is_vacant(&self, idx: usize) -> bool {
        matches!(self.slot(idx), None | Some(Slot::Vacant))
    }

    /// Key of the innermost `ForEachKey` block being run.
    pub fn current_key(&self) -> Option<&str> {
        self.cursor.last().map(String::as_str)
    }

    pub fn consume(&mut self, key: impl Into<String>) {
        self.consumed.insert(key.into());
    }

    pub fn is_consumed(&self, key: &str) -> bool {
        self.consumed.contains(key)
    }

    pub fn mark_missing(&mut self, field: impl Into<String>) {
        self.missing.push(field.into());
    }

    pub fn take_missing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.missing)
    }
}

pub type Step<I> = Arc<dyn Fn(&I, &mut Locals) -> CodecResult<()> + Send + Sync>;
pub type Cond<I> = Arc<dyn Fn(&I, &Locals) -> bool + Send + Sync>;
pub type KeySource<I> = Arc<dyn Fn(&I, &Locals) -> Vec<String> + Send + Sync>;
pub type Recover<I> = Arc<dyn Fn(CodecError, &I, &mut Locals) -> CodecResult<()> + Send + Sync>;
pub type Finish<I, O> = Arc<dyn Fn(&I, &mut Locals) -> CodecResult<O> + Send + Sync>;

pub enum BlockKind<I> {
    /// Runs the block when the condition holds, the `otherwise` part if not.
    If(Cond<I>),
    /// Runs the block once per key, exposed through `Locals::current_key`.
    ForEachKey(KeySource<I>),
    /// Hands any failure of the block to the recovery closure.
    Guard(Recover<I>),
}

impl<I> BlockKind<I> {
    pub fn when(cond: impl Fn(&I, &Locals) -> bool + Send + Sync + 'static) -> Self {
        BlockKind::If(Arc::new(cond))
    }

    pub fn for_each_key(source: impl Fn(&I, &Locals) -> Vec<String> + Send + Sync + 'static) -> Self {
        BlockKind::ForEachKey(Arc::new(source))
    }

    pub fn guard(
        recover: impl Fn(CodecError, &I, &mut Locals) -> CodecResult<()> + Send + Sync + 'static,
    ) -> Self {
        BlockKind::Guard(Arc::new(recover))
    }

    fn label(&self) -> &'static str {
        match self {
            BlockKind::If(_) => "if",
            BlockKind::ForEachKey(_) => "for-each-key",
            BlockKind::Guard(_) => "guard",
        }
    }
}

enum Op<I> {
    Emit(Step<I>),
    Open(BlockKind<I>),
    Otherwise,
    Close,
}

/// A routine under construction.
pub struct RoutineDraft<I, O> {
    name: String,
    ops: Vec<Op<I>>,
    slots: usize,
    finish: Option<Finish<I, O>>,
}

impl<I: 'static, O: 'static> RoutineDraft<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emit(
        &mut self,
        step: impl Fn(&I, &mut Locals) -> CodecResult<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.ops.push(Op::Emit(Arc::new(step)));
        self
    }

    pub fn block(&mut self, kind: BlockKind<I>) -> &mut Self {
        self.ops.push(Op::Open(kind));
        self
    }

    pub fn otherwise(&mut self) -> &mut Self {
        self.ops.push(Op::Otherwise);
        self
    }

    pub fn close_block(&mut self) -> &mut Self {
        self.ops.push(Op::Close);
        self
    }

    pub fn allocate_slot(&mut self) -> usize {
        self.slots += 1;
        self.slots - 1
    }

    /// Produces the routine's result once every step has run.
    pub fn finish(&mut self, f: impl Fn(&I, &mut Locals) -> CodecResult<O> + Send + Sync + 'static) {
        self.finish = Some(Arc::new(f));
    }

    fn lower(self) -> CodecResult<Routine<I, O>> {
        let malformed = |reason: &str| {
            CodecError::new(ErrorKind::MalformedRoutine {
                routine: self.name.clone(),
                reason: reason.to_string(),
            })
        };
        let finish = self.finish.clone().ok_or_else(|| malformed("no result step"))?;

        let mut stack: Vec<Frame<I>> = vec![Frame::root()];
        for op in self.ops {
            match op {
                Op::Emit(step) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.push(Node::Step(step));
                    }
                }
                Op::Open(kind) => stack.push(Frame::open(kind)),
                Op::Otherwise => {
                    let frame = stack.last_mut().ok_or_else(|| malformed("empty block stack"))?;
                    match (&frame.kind, &frame.otherwise) {
                        (Some(BlockKind::If(_)), None) => frame.otherwise = Some(Vec::new()),
                        (Some(BlockKind::If(_)), Some(_)) => {
                            return Err(malformed("second `otherwise` in one `if` block"));
                        }
                        _ => return Err(malformed("`otherwise` outside an `if` block")),
                    }
                }
                Op::Close => {
                    if stack.len() < 2 {
                        return Err(malformed("`close_block` without an open block"));
                    }
                    let node = stack.pop().and_then(Frame::into_node);
                    if let (Some(node), Some(parent)) = (node, stack.last_mut()) {
                        parent.push(node);
                    }
                }
            }
        }
        if stack.len() != 1 {
            let open = stack.last().and_then(|f| f.kind.as_ref()).map_or("?", BlockKind::label);
            return Err(malformed(&format!("unclosed `{open}` block")));
        }
        let body = stack.pop().map(|root| lower_nodes(root.then)).unwrap_or_else(noop);
        Ok(Routine {
            inner: Arc::new(RoutineInner {
                name: self.name,
                slots: self.slots,
                body,
                finish,
            }),
        })
    }
}

enum Node<I> {
    Step(Step<I>),
    If {
        cond: Cond<I>,
        then: Vec<Node<I>>,
        otherwise: Vec<Node<I>>,
    },
    ForEach {
        source: KeySource<I>,
        body: Vec<Node<I>>,
    },
    Guard {
        recover: Recover<I>,
        body: Vec<Node<I>>,
    },
}

struct Frame<I> {
    kind: Option<BlockKind<I>>,
    then: Vec<Node<I>>,
    otherwise: Option<Vec<Node<I>>>,
}

impl<I> Frame<I> {
    fn root() -> Self {
        Self {
            kind: None,
            then: Vec::new(),
            otherwise: None,
        }
    }

    fn open(kind: BlockKind<I>) -> Self {
        Self {
            kind: Some(kind),
            then: Vec::new(),
            otherwise: None,
        }
    }

    fn push(&mut self, node: Node<I>) {
        match &mut self.otherwise {
            Some(nodes) => nodes.push(node),
            None => self.then.push(node),
        }
    }

    fn into_node(self) -> Option<Node<I>> {
        let node = match self.kind? {
            BlockKind::If(cond) => Node::If {
                cond,
                then: self.then,
                otherwise: self.otherwise.unwrap_or_default(),
            },
            BlockKind::ForEachKey(source) => Node::ForEach {
                source,
                body: self.then,
            },
            BlockKind::Guard(recover) => Node::Guard {
                recover,
                body: self.then,
            },
        };
        Some(node)
    }
}

fn noop<I: 'static>() -> Step<I> {
    Arc::new(|_, _| Ok(()))
}

fn lower_nodes<I: 'static>(nodes: Vec<Node<I>>) -> Step<I> {
    let mut steps: Vec<Step<I>> = nodes.into_iter().map(lower_node).collect();
    match steps.len() {
        0 => noop(),
        1 => steps.remove(0),
        _ => Arc::new(move |input, locals| {
            for step in &steps {
                step(input, locals)?;
            }
            Ok(())
        }),
    }
}

fn lower_node<I: 'static>(node: Node<I>) -> Step<I> {
    match node {
        Node::Step(step) => step,
        Node::If {
            cond,
            then,
            otherwise,
        } => {
            let then = lower_nodes(then);
            let otherwise = lower_nodes(otherwise);
            Arc::new(move |input, locals| {
                if cond(input, locals) {
                    then(input, locals)
                } else {
                    otherwise(input, locals)
                }
            })
        }
        Node::ForEach { source, body } => {
            let body = lower_nodes(body);
            Arc::new(move |input, locals| {
                for key in source(input, locals) {
                    locals.cursor.push(key);
                    let result = body(input, locals);
                    locals.cursor.pop();
                    result?;
                }
                Ok(())
            })
        }
        Node::Guard { recover, body } => {
            let body = lower_nodes(body);
            Arc::new(move |input, locals| match body(input, locals) {
                Ok(()) => Ok(()),
                Err(err) => recover(err, input, locals),
            })
        }
    }
}

struct RoutineInner<I, O> {
    name: String,
    slots: usize,
    body: Step<I>,
    finish: Finish<I, O>,
}

/// A finished, callable routine. Cloning shares it.
pub struct Routine<I, O> {
    inner: Arc<RoutineInner<I, O>>,
}

impl<I, O> Clone for Routine<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> fmt::Debug for Routine<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.inner.name)
            .field("slots", &self.inner.slots)
            .finish()
    }
}

impl<I: 'static, O: 'static> Routine<I, O> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn call(&self, input: &I) -> CodecResult<O> {
        let mut locals = Locals::with_slots(self.inner.slots);
        (self.inner.body)(input, &mut locals)?;
        (self.inner.finish)(input, &mut locals)
    }

    /// True when both values are the same compiled routine.
    pub fn same(&self, other: &Routine<I, O>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Late-bound reference to a routine of the same session.
pub struct RoutineHandle<I, O> {
    name: String,
    cell: Arc<OnceLock<Routine<I, O>>>,
}

impl<I, O> Clone for RoutineHandle<I, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<I: 'static, O: 'static> RoutineHandle<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_linked(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn call(&self, input: &I) -> CodecResult<O> {
        match self.cell.get() {
            Some(routine) => routine.call(input),
            None => Err(CodecError::new(ErrorKind::UnlinkedRoutine {
                name: self.name.clone(),
            })),
        }
    }
}

/// Routines from earlier sessions that handles may bind to.
pub struct Environment<I, O> {
    routines: HashMap<String, Routine<I, O>>,
}

impl<I, O> Default for Environment<I, O> {
    fn default() -> Self {
        Self {
            routines: HashMap::new(),
        }
    }
}

impl<I, O> Environment<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, routine: Routine<I, O>) {
        self.routines.insert(name.into(), routine);
    }

    pub fn get(&self, name: &str) -> Option<&Routine<I, O>> {
        self.routines.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

/// One synthesis session: every routine opened here is lowered and linked
/// together.
pub struct Synthesizer<I, O> {
    opened: HashSet<String>,
    drafts: Vec<RoutineDraft<I, O>>,
    cells: HashMap<String, Arc<OnceLock<Routine<I, O>>>>,
}

impl<I, O> Default for Synthesizer<I, O> {
    fn default() -> Self {
        Self {
            opened: HashSet::new(),
            drafts: Vec::new(),
            cells: HashMap::new(),
        }
    }
}

impl<I: 'static, O: 'static> Synthesizer<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_routine(&mut self, name: impl Into<String>) -> CodecResult<RoutineDraft<I, O>> {
        let name = name.into();
        if !self.opened.insert(name.clone()) {
            return Err(CodecError::new(ErrorKind::DuplicateRoutineName { name }));
        }
        Ok(RoutineDraft {
            name,
            ops: Vec::new(),
            slots: 0,
            finish: None,
        })
    }

    pub fn submit(&mut self, draft: RoutineDraft<I, O>) {
        self.drafts.push(draft);
    }

    /// Handle to the routine called `name`, bound by `finalize`.
    pub fn reference(&mut self, name: &str) -> RoutineHandle<I, O> {
        let cell = self
            .cells
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(OnceLock::new()));
        RoutineHandle {
            name: name.to_string(),
            cell: Arc::clone(cell),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.cells.is_empty()
    }

    /// Lowers every submitted draft and binds every handle, first to this
    /// session's routines and then to `env`.
    pub fn finalize(self, env: &Environment<I, O>) -> CodecResult<HashMap<String, Routine<I, O>>> {
        let submitted: HashSet<&str> = self.drafts.iter().map(|d| d.name.as_str()).collect();
        if let Some(name) = self.opened.iter().find(|n| !submitted.contains(n.as_str())) {
            return Err(CodecError::new(ErrorKind::MalformedRoutine {
                routine: name.clone(),
                reason: "opened but never submitted".to_string(),
            }));
        }
        let mut routines = HashMap::new();
        for draft in self.drafts {
            let routine = draft.lower()?;
            routines.insert(routine.name().to_string(), routine);
        }
        for (name, cell) in &self.cells {
            let target = routines
                .get(name)
                .or_else(|| env.get(name))
                .ok_or_else(|| CodecError::new(ErrorKind::UnlinkedRoutine { name: name.clone() }))?;
            /* a cell can only be set here, once per session */
            let _ = cell.set(target.clone());
        }
        Ok(routines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /* Counts array nesting depth by calling itself through a handle. */
    fn depth_session() -> Synthesizer<Value, Instance> {
        let mut synth = Synthesizer::new();
        let this = synth.reference("depth");
        let mut draft = synth.open_routine("depth").expect("open");
        let slot = draft.allocate_slot();
        draft
            .block(BlockKind::when(|v: &Value, _| v.is_array()))
            .emit(move |v, locals| {
                let inner = match v.get(0) {
                    Some(first) => this.call(first)?,
                    None => Instance::Int(0),
                };
                let depth = inner.as_i64().unwrap_or(0) + 1;
                locals.set(slot, Slot::Instance(Instance::Int(depth)));
                Ok(())
            })
            .otherwise()
            .emit(move |_, locals| {
                locals.set(slot, Slot::Instance(Instance::Int(0)));
                Ok(())
            })
            .close_block();
        draft.finish(move |_, locals| match locals.take(slot) {
            Slot::Instance(i) => Ok(i),
            _ => Err(CodecError::custom("no depth")),
        });
        synth.submit(draft);
        synth
    }

    #[test]
    fn self_reference_links_after_finalize() {
        let routines = depth_session().finalize(&Environment::new()).expect("finalize");
        let depth = &routines["depth"];
        assert_eq!(depth.call(&json!([[[1]]])).expect("call"), Instance::Int(3));
        assert_eq!(depth.call(&json!(5)).expect("call"), Instance::Int(0));
    }

    #[test]
    fn duplicate_names_fail() {
        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let _first = synth.open_routine("r").expect("open");
        let err = synth.open_routine("r").err().expect("duplicate name");
        assert!(matches!(err.kind(), ErrorKind::DuplicateRoutineName { .. }));
    }

    #[test]
    fn unbalanced_blocks_are_malformed() {
        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let mut draft = synth.open_routine("open").expect("open");
        draft.block(BlockKind::when(|_, _| true)).emit(|_, _| Ok(()));
        draft.finish(|_, _| Ok(Instance::Null));
        synth.submit(draft);
        let err = synth.finalize(&Environment::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MalformedRoutine { .. }));
        assert!(err.to_string().contains("unclosed `if` block"));

        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let mut draft = synth.open_routine("close").expect("open");
        draft.close_block().finish(|_, _| Ok(Instance::Null));
        synth.submit(draft);
        assert!(synth.finalize(&Environment::new()).is_err());

        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let mut draft = synth.open_routine("else").expect("open");
        draft
            .block(BlockKind::guard(|e, _, _| Err(e)))
            .otherwise()
            .close_block()
            .finish(|_, _| Ok(Instance::Null));
        synth.submit(draft);
        assert!(synth.finalize(&Environment::new()).is_err());
    }

    #[test]
    fn unlinked_handles_fail() {
        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let handle = synth.reference("later");
        let err = handle.call(&json!(1)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnlinkedRoutine { .. }));
        let err = synth.finalize(&Environment::new()).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnlinkedRoutine { .. }));
    }

    #[test]
    fn handles_fall_back_to_environment() {
        let earlier = depth_session().finalize(&Environment::new()).expect("finalize");
        let mut env = Environment::new();
        env.insert("depth-from-before", earlier["depth"].clone());

        let mut synth: Synthesizer<Value, Instance> = Synthesizer::new();
        let handle = synth.reference("depth-from-before");
        synth.finalize(&env).expect("finalize");
        assert_eq!(handle.call(&json!([[]])).expect("call"), Instance::Int(2));
    }

    #[test]
    fn loops_and_guards() {
        let mut synth: Synthesizer<Value, Value> = Synthesizer::new();
        let mut draft = synth.open_routine("keys").expect("open");
        let out = draft.allocate_slot();
        draft
            .emit(move |_, locals| {
                locals.set(out, Slot::Dynamic(json!([])));
                Ok(())
            })
            .block(BlockKind::guard(|e, _, _| Err(e.at_key("obj"))))
            .block(BlockKind::for_each_key(|v: &Value, _| {
                v.as_object().map(|o| o.keys().cloned().collect()).unwrap_or_default()
            }))
            .emit(move |_, locals| {
                let key = locals.current_key().unwrap_or_default().to_string();
                if key == "bad" {
                    return Err(CodecError::custom("bad key"));
                }
                if let Slot::Dynamic(Value::Array(items)) = locals.slot_mut(out) {
                    items.push(Value::String(key));
                }
                Ok(())
            })
            .close_block()
            .close_block();
        draft.finish(move |_, locals| match locals.take(out) {
            Slot::Dynamic(v) => Ok(v),
            _ => Ok(Value::Null),
        });
        synth.submit(draft);
        let routines = synth.finalize(&Environment::new()).expect("finalize");
        let keys = &routines["keys"];
        assert_eq!(keys.call(&json!({"a": 1, "b": 2})).expect("call"), json!(["a", "b"]));
        let err = keys.call(&json!({"bad": 1})).unwrap_err();
        assert_eq!(err.path().to_string(), "obj");
    }
}
