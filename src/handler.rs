//! Handler traits, slot descriptors and the signature analyzer.
//!
//! # From function to route
//!
//! A handler is any async function whose parameters are a [`Context`] and/or
//! one [`Metadata`] record, in any order, and whose output is made of at most
//! one response value and at most one error:
//!
//! ```text
//! async fn get_user(ctx: Context, m: GetUser) -> Result<Json<User>, ApiError>
//!        ↓ Handler::params() / Handler::outputs()
//! [Context, Metadata(GetUser)]  [Response(Json<User>), Error(ApiError)]
//!        ↓ analyze()
//! Signature { context: 0, metadata: 1, response: 0, error: 1 }
//!        ↓ erase()
//! Arc<dyn Fn(Arguments) -> BoxFuture<…>>   ← stored in the compiled route
//! ```
//!
//! Slots come from trait impls, so "not callable" and "not a record" are
//! compile errors. What the type system cannot rule out (two contexts, two
//! records, two responses, two errors) is caught by [`analyze`] when the
//! route is built.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::context::Context;
use crate::error::{ApiError, BoxError, BuildError};
use crate::metadata::{self, Binder, Metadata};
use crate::registry::Registry;
use crate::render::{HandlerError, Render};
use crate::route::RouteInfo;
use crate::value::Json;

// ── Internal types ───────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What an erased handler call produces: every output value in declaration
/// order, or a failure to assemble the call.
pub(crate) type CallResult = Result<Vec<ReturnValue>, ApiError>;

/// A handler with its receiver (if any) bound, ready for the route table.
pub(crate) type ErasedCall = Arc<dyn Fn(Arguments) -> BoxFuture<CallResult> + Send + Sync>;

// ── Parameter slots ──────────────────────────────────────────────────────────

/// What the analyzer needs to know about a metadata record type.
#[derive(Clone, Copy)]
pub struct RecordType {
    type_name: &'static str,
    new: fn() -> Box<dyn Any + Send>,
    walk: fn(&Registry, &mut RouteInfo) -> Result<Vec<Binder>, BuildError>,
}

impl RecordType {
    pub fn of<M: Metadata>() -> Self {
        Self { type_name: std::any::type_name::<M>(), new: new_record::<M>, walk: metadata::walk::<M> }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Any + Send> {
        (self.new)()
    }

    pub(crate) fn walk(&self, registry: &Registry, info: &mut RouteInfo) -> Result<Vec<Binder>, BuildError> {
        (self.walk)(registry, info)
    }
}

fn new_record<M: Metadata>() -> Box<dyn Any + Send> {
    Box::new(M::default())
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordType").field(&self.type_name).finish()
    }
}

/// The role of one handler parameter.
#[derive(Clone, Copy, Debug)]
pub enum ParamSlot {
    Context,
    Metadata(RecordType),
}

/// The values a dispatch prepared for one call.
#[derive(Default)]
pub struct Arguments {
    pub(crate) context: Option<Context>,
    pub(crate) record: Option<Box<dyn Any + Send>>,
}

/// A type a handler may take as a parameter: [`Context`] or any
/// [`Metadata`] record.
pub trait Param: Send + Sized + 'static {
    #[doc(hidden)]
    fn slot() -> ParamSlot;
    #[doc(hidden)]
    fn take(args: &mut Arguments) -> Option<Self>;
}

impl Param for Context {
    fn slot() -> ParamSlot {
        ParamSlot::Context
    }

    fn take(args: &mut Arguments) -> Option<Self> {
        args.context.take()
    }
}

impl<M: Metadata> Param for M {
    fn slot() -> ParamSlot {
        ParamSlot::Metadata(RecordType::of::<M>())
    }

    fn take(args: &mut Arguments) -> Option<Self> {
        args.record.take()?.downcast::<M>().ok().map(|m| *m)
    }
}

// ── Output slots ─────────────────────────────────────────────────────────────

/// The role of one handler output.
#[derive(Clone, Debug)]
pub enum OutputSlot {
    Response { type_name: &'static str, example: Option<serde_json::Value> },
    Error { type_name: &'static str },
}

impl OutputSlot {
    pub fn response<T: ?Sized>(example: Option<serde_json::Value>) -> Self {
        Self::Response { type_name: std::any::type_name::<T>(), example }
    }

    pub fn error<T: ?Sized>() -> Self {
        Self::Error { type_name: std::any::type_name::<T>() }
    }
}

/// One output value, classified for rendering.
pub enum ReturnValue {
    /// Nothing to write: an empty `200 OK`.
    Absent,
    /// Serialised JSON, written with `200 OK`.
    Plain(Vec<u8>),
    /// A value that renders itself.
    Custom(Box<dyn Render>),
    Error(HandlerError),
}

impl ReturnValue {
    pub fn custom<T: Render>(value: T) -> Self {
        Self::Custom(Box::new(value))
    }

    /// Serialises `value`; a failure becomes an error value.
    pub fn plain<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::Plain(bytes),
            Err(e) => Self::Error(HandlerError::new(e)),
        }
    }

    pub fn error<E: Into<BoxError> + 'static>(error: E) -> Self {
        Self::Error(HandlerError::new(error))
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Plain(bytes) => f.debug_tuple("Plain").field(&String::from_utf8_lossy(bytes)).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// A single handler output value.
pub trait ReturnSlot: Send + 'static {
    fn slot() -> OutputSlot;
    fn into_value(self) -> ReturnValue;
}

impl<T> ReturnSlot for Json<T>
where
    T: Serialize + Default + Send + 'static,
{
    fn slot() -> OutputSlot {
        OutputSlot::response::<T>(serde_json::to_value(T::default()).ok())
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::plain(&self.0)
    }
}

impl ReturnSlot for String {
    fn slot() -> OutputSlot {
        OutputSlot::response::<Self>(Some(serde_json::Value::String(String::new())))
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::plain(&self)
    }
}

impl ReturnSlot for serde_json::Value {
    fn slot() -> OutputSlot {
        OutputSlot::response::<Self>(Some(serde_json::Value::Null))
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::plain(&self)
    }
}

impl<T: ReturnSlot> ReturnSlot for Option<T> {
    fn slot() -> OutputSlot {
        T::slot()
    }

    fn into_value(self) -> ReturnValue {
        self.map_or(ReturnValue::Absent, T::into_value)
    }
}

impl ReturnSlot for ApiError {
    fn slot() -> OutputSlot {
        OutputSlot::error::<Self>()
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::error(self)
    }
}

impl ReturnSlot for BoxError {
    fn slot() -> OutputSlot {
        OutputSlot::error::<Self>()
    }

    fn into_value(self) -> ReturnValue {
        ReturnValue::error(self)
    }
}

/// Everything an async handler may resolve to.
pub trait Output: Send + 'static {
    fn slots() -> Vec<OutputSlot>;
    fn into_values(self) -> Vec<ReturnValue>;
}

impl Output for () {
    fn slots() -> Vec<OutputSlot> {
        Vec::new()
    }

    fn into_values(self) -> Vec<ReturnValue> {
        Vec::new()
    }
}

impl<A: ReturnSlot> Output for A {
    fn slots() -> Vec<OutputSlot> {
        vec![A::slot()]
    }

    fn into_values(self) -> Vec<ReturnValue> {
        vec![self.into_value()]
    }
}

impl<A: ReturnSlot, B: ReturnSlot> Output for (A, B) {
    fn slots() -> Vec<OutputSlot> {
        vec![A::slot(), B::slot()]
    }

    fn into_values(self) -> Vec<ReturnValue> {
        vec![self.0.into_value(), self.1.into_value()]
    }
}

impl<A: ReturnSlot, B: ReturnSlot, C: ReturnSlot> Output for (A, B, C) {
    fn slots() -> Vec<OutputSlot> {
        vec![A::slot(), B::slot(), C::slot()]
    }

    fn into_values(self) -> Vec<ReturnValue> {
        vec![self.0.into_value(), self.1.into_value(), self.2.into_value()]
    }
}

/// `Ok` values fill the inner slots; `Err` fills the trailing error slot.
impl<R, E> Output for Result<R, E>
where
    R: Output,
    E: Into<BoxError> + Send + 'static,
{
    fn slots() -> Vec<OutputSlot> {
        let mut slots = R::slots();
        slots.push(OutputSlot::error::<E>());
        slots
    }

    fn into_values(self) -> Vec<ReturnValue> {
        match self {
            Ok(value) => {
                let mut values = value.into_values();
                values.push(ReturnValue::Absent);
                values
            }
            Err(e) => {
                let mut values: Vec<ReturnValue> = R::slots().iter().map(|_| ReturnValue::Absent).collect();
                values.push(ReturnValue::error(e));
                values
            }
        }
    }
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

/// Where each role sits in a handler's parameter and output lists.
#[derive(Clone, Debug)]
pub struct Signature {
    pub(crate) context: Option<usize>,
    pub(crate) metadata: Option<(usize, RecordType)>,
    pub(crate) response: Option<usize>,
    pub(crate) error: Option<usize>,
    pub(crate) outputs: usize,
    pub(crate) response_example: Option<serde_json::Value>,
}

impl Signature {
    pub fn context_position(&self) -> Option<usize> {
        self.context
    }

    pub fn metadata_position(&self) -> Option<usize> {
        self.metadata.map(|(i, _)| i)
    }

    pub fn metadata_type(&self) -> Option<&'static str> {
        self.metadata.map(|(_, t)| t.type_name())
    }

    pub fn response_position(&self) -> Option<usize> {
        self.response
    }

    pub fn error_position(&self) -> Option<usize> {
        self.error
    }

    pub fn response_example(&self) -> Option<&serde_json::Value> {
        self.response_example.as_ref()
    }
}

/// Classifies every slot, failing when a role is claimed twice.
pub fn analyze(params: &[ParamSlot], outputs: &[OutputSlot]) -> Result<Signature, BuildError> {
    let mut signature = Signature {
        context: None,
        metadata: None,
        response: None,
        error: None,
        outputs: outputs.len(),
        response_example: None,
    };

    for (i, slot) in params.iter().enumerate() {
        match slot {
            ParamSlot::Context if signature.context.is_some() => return Err(BuildError::MultipleContexts),
            ParamSlot::Context => signature.context = Some(i),
            ParamSlot::Metadata(_) if signature.metadata.is_some() => return Err(BuildError::MultipleMetadata),
            ParamSlot::Metadata(record) => signature.metadata = Some((i, *record)),
        }
    }

    for (i, slot) in outputs.iter().enumerate() {
        match slot {
            OutputSlot::Error { .. } if signature.error.is_some() => return Err(BuildError::MultipleErrors),
            OutputSlot::Error { .. } => signature.error = Some(i),
            OutputSlot::Response { .. } if signature.response.is_some() => return Err(BuildError::MultipleResponses),
            OutputSlot::Response { example, .. } => {
                signature.response = Some(i);
                signature.response_example.clone_from(example);
            }
        }
    }

    Ok(signature)
}

// ── Handler traits ───────────────────────────────────────────────────────────

/// Implemented for every async function that can serve as a free-standing
/// endpoint: zero to three [`Param`]s, resolving to an [`Output`].
///
/// Sealed; the blanket impls below are the only ones.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn params() -> Vec<ParamSlot>;
    #[doc(hidden)]
    fn outputs() -> Vec<OutputSlot>;
    #[doc(hidden)]
    fn call(&self, args: Arguments) -> BoxFuture<CallResult>;

    /// Runs the analyzer over this handler's slots.
    fn signature() -> Result<Signature, BuildError> {
        analyze(&Self::params(), &Self::outputs())
    }
}

/// Implemented for every async method of `A` taking `self: Arc<Self>` plus
/// zero to three [`Param`]s.
pub trait MethodHandler<A, Args>: private::SealedMethod<A, Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn params() -> Vec<ParamSlot>;
    #[doc(hidden)]
    fn outputs() -> Vec<OutputSlot>;
    #[doc(hidden)]
    fn call(&self, receiver: Arc<A>, args: Arguments) -> BoxFuture<CallResult>;

    fn signature() -> Result<Signature, BuildError> {
        analyze(&Self::params(), &Self::outputs())
    }
}

mod private {
    pub trait Sealed<Args> {}
    pub trait SealedMethod<A, Args> {}
}

fn missing_argument() -> BoxFuture<CallResult> {
    Box::pin(async { Err(ApiError::internal("handler argument was not prepared")) })
}

macro_rules! impl_handler {
    ($($P:ident),*) => {
        impl<F, Fut, O, $($P,)*> private::Sealed<($($P,)*)> for F
        where
            F: Fn($($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = O> + Send + 'static,
            O: Output,
            $($P: Param,)*
        {
        }

        impl<F, Fut, O, $($P,)*> Handler<($($P,)*)> for F
        where
            F: Fn($($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = O> + Send + 'static,
            O: Output,
            $($P: Param,)*
        {
            fn params() -> Vec<ParamSlot> {
                vec![$($P::slot()),*]
            }

            fn outputs() -> Vec<OutputSlot> {
                O::slots()
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, mut args: Arguments) -> BoxFuture<CallResult> {
                $(let Some($P) = $P::take(&mut args) else { return missing_argument() };)*
                let fut = (self)($($P),*);
                Box::pin(async move { Ok(fut.await.into_values()) })
            }
        }

        impl<A, F, Fut, O, $($P,)*> private::SealedMethod<A, ($($P,)*)> for F
        where
            A: Send + Sync + 'static,
            F: Fn(Arc<A>, $($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = O> + Send + 'static,
            O: Output,
            $($P: Param,)*
        {
        }

        impl<A, F, Fut, O, $($P,)*> MethodHandler<A, ($($P,)*)> for F
        where
            A: Send + Sync + 'static,
            F: Fn(Arc<A>, $($P),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = O> + Send + 'static,
            O: Output,
            $($P: Param,)*
        {
            fn params() -> Vec<ParamSlot> {
                vec![$($P::slot()),*]
            }

            fn outputs() -> Vec<OutputSlot> {
                O::slots()
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, receiver: Arc<A>, mut args: Arguments) -> BoxFuture<CallResult> {
                $(let Some($P) = $P::take(&mut args) else { return missing_argument() };)*
                let fut = (self)(receiver, $($P),*);
                Box::pin(async move { Ok(fut.await.into_values()) })
            }
        }
    };
}

impl_handler!();
impl_handler!(P1);
impl_handler!(P1, P2);
impl_handler!(P1, P2, P3);

// ── Erasure ──────────────────────────────────────────────────────────────────

pub(crate) fn erase<H, Args>(handler: H) -> ErasedCall
where
    H: Handler<Args>,
    Args: 'static,
{
    Arc::new(move |args| handler.call(args))
}

pub(crate) fn erase_method<A, H, Args>(handler: H, receiver: Arc<A>) -> ErasedCall
where
    A: Send + Sync + 'static,
    H: MethodHandler<A, Args>,
    Args: 'static,
{
    Arc::new(move |args| handler.call(Arc::clone(&receiver), args))
}
