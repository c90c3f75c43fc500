//! Service registration.
//!
//! A service is an instance plus a table of named methods. Each method is
//! registered with a handler taking the shared instance, a decoded argument
//! and a [`CallContext`], and resolving to a reply or a [`ServiceError`].
//! That signature is the calling convention: a handler of any other shape
//! does not type-check, so nothing needs to be filtered out at runtime.
//!
//! The argument and reply types of a method are captured once, when the
//! method is added, inside an erased invocation handle. Dispatch only ever
//! deals in encoded bytes.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use tinyrpc_common::protocol::Seq;
use tinyrpc_common::{Codec, Result, RpcError};

/// Error returned by a service method.
///
/// Any standard error converts into it with `?`; ad-hoc failures use
/// [`ServiceError::new`]. The message travels to the caller as an
/// application error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        ServiceError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for ServiceError {
    fn from(err: E) -> Self {
        ServiceError::new(err.to_string())
    }
}

/// Per-invocation context handed to every method.
///
/// The context is cancelled when the server gives up waiting for the
/// invocation; long-running methods should watch [`CallContext::cancelled`].
#[derive(Debug, Clone)]
pub struct CallContext {
    seq: Seq,
    service_method: String,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new(seq: Seq, service_method: impl Into<String>) -> Self {
        CallContext {
            seq,
            service_method: service_method.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the server has abandoned this invocation.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

/// Invocation bound to a decoded argument, ready to run.
pub(crate) type PreparedCall = Box<dyn FnOnce(CallContext) -> BoxFuture<'static, Result<Vec<u8>>> + Send>;

type Prepare = dyn Fn(Codec, &[u8]) -> Result<PreparedCall> + Send + Sync;

/// Type and invocation metadata of one registered method.
pub struct MethodDescriptor {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    prepare: Box<Prepare>,
    new_reply: fn(Codec) -> Result<Vec<u8>>,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Encodes a fresh, empty reply value.
    pub fn new_reply(&self, codec: Codec) -> Result<Vec<u8>> {
        (self.new_reply)(codec)
    }

    /// Decodes the argument, returning an invocation that can run elsewhere.
    pub(crate) fn prepare(&self, codec: Codec, body: &[u8]) -> Result<PreparedCall> {
        (self.prepare)(codec, body)
    }

    /// Decodes `body`, runs the method and returns the encoded reply.
    pub async fn invoke(&self, codec: Codec, body: &[u8], ctx: CallContext) -> Result<Vec<u8>> {
        let call = self.prepare(codec, body)?;
        call(ctx).await
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .finish()
    }
}

/// A named table of invocable methods.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<Arc<MethodDescriptor>> {
        self.methods.get(name).cloned()
    }

    /// Method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Builds a [`Service`] around an instance.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tinyrpc_server::{ServiceBuilder, ServiceError};
///
/// #[derive(Default)]
/// struct Arith;
///
/// #[derive(Serialize, Deserialize)]
/// struct Args { a: i64, b: i64 }
///
/// let service = ServiceBuilder::new(Arith)
///     .method("Add", |_arith, args: Args, _ctx| async move {
///         Ok::<_, ServiceError>(args.a + args.b)
///     })
///     .build();
///
/// assert_eq!(service.name(), "Arith");
/// assert_eq!(service.method_names(), vec!["Add"]);
/// ```
pub struct ServiceBuilder<S> {
    instance: Arc<S>,
    name: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    /// Starts a service named after the instance's type.
    pub fn new(instance: S) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc(instance: Arc<S>) -> Self {
        ServiceBuilder {
            instance,
            name: short_type_name::<S>(),
            methods: HashMap::new(),
        }
    }

    /// Overrides the derived service name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a method.
    ///
    /// A second method with the same name is ignored.
    pub fn method<A, R, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        F: Fn(Arc<S>, A, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, ServiceError>> + Send + 'static,
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            warn!("Service {} already has method {}, ignoring redefinition", self.name, name);
            return self;
        }

        let instance = self.instance.clone();
        let handler = Arc::new(handler);
        let prepare = move |codec: Codec, body: &[u8]| -> Result<PreparedCall> {
            let args: A = codec.decode(body)?;
            let instance = instance.clone();
            let handler = handler.clone();
            let call: PreparedCall = Box::new(move |ctx: CallContext| {
                async move {
                    let reply = (*handler)(instance, args, ctx)
                        .await
                        .map_err(|e| RpcError::Application(e.message))?;
                    codec.encode(&reply)
                }
                .boxed()
            });
            Ok(call)
        };

        debug!("Service {} registers method {}", self.name, name);
        let descriptor = MethodDescriptor {
            name: name.clone(),
            arg_type: type_name::<A>(),
            reply_type: type_name::<R>(),
            prepare: Box::new(prepare),
            new_reply: |codec| codec.encode(&R::default()),
        };
        self.methods.insert(name, Arc::new(descriptor));
        self
    }

    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

/// Last path segment of a type name, without generic parameters.
fn short_type_name<T: ?Sized>() -> String {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
