//! Built-in demo service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinyrpc_server::{CallContext, Service, ServiceBuilder, ServiceError};

/// Integer arithmetic, exposed as service `Arith`.
#[derive(Debug, Default)]
pub struct Arith;

/// Operands of a binary operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args {
    pub a: i64,
    pub b: i64,
}

/// Builds the `Arith` service.
///
/// | Method  | Argument      | Reply                          |
/// |---------|---------------|--------------------------------|
/// | `Add`   | `{"a","b"}`   | `a + b`                        |
/// | `Mul`   | `{"a","b"}`   | `a * b`                        |
/// | `Div`   | `{"a","b"}`   | `a / b`, error when `b == 0`   |
/// | `Sleep` | milliseconds  | the same number, once elapsed  |
pub fn service() -> Service {
    ServiceBuilder::new(Arith)
        .method("Add", |_arith, args: Args, _ctx| async move {
            args.a
                .checked_add(args.b)
                .ok_or_else(|| ServiceError::new("integer overflow"))
        })
        .method("Mul", |_arith, args: Args, _ctx| async move {
            args.a
                .checked_mul(args.b)
                .ok_or_else(|| ServiceError::new("integer overflow"))
        })
        .method("Div", |_arith, args: Args, _ctx| async move {
            if args.b == 0 {
                return Err(ServiceError::new("divide by zero"));
            }
            args.a
                .checked_div(args.b)
                .ok_or_else(|| ServiceError::new("integer overflow"))
        })
        .method("Sleep", |_arith, ms: u64, ctx: CallContext| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
                _ = ctx.cancelled() => Err(ServiceError::new("sleep cancelled")),
            }
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrpc_common::{Codec, CodecType, RpcError};

    async fn invoke<R: serde::de::DeserializeOwned>(
        method: &str,
        args: &impl Serialize,
    ) -> Result<R, RpcError> {
        let service = service();
        let descriptor = service.method(method).unwrap();
        let codec = Codec::for_type(CodecType::Json);
        let body = codec.encode(args).unwrap();
        let reply = descriptor
            .invoke(codec, &body, CallContext::new(1, format!("Arith.{}", method)))
            .await?;
        codec.decode(&reply)
    }

    #[test]
    fn test_service_shape() {
        let service = service();
        assert_eq!(service.name(), "Arith");
        assert_eq!(service.method_names(), vec!["Add", "Div", "Mul", "Sleep"]);
        assert!(service.method("Add").unwrap().arg_type().ends_with("Args"));
        assert_eq!(service.method("Sleep").unwrap().reply_type(), "u64");
    }

    #[tokio::test]
    async fn test_arithmetic() {
        assert_eq!(invoke::<i64>("Add", &Args { a: 2, b: 3 }).await.unwrap(), 5);
        assert_eq!(invoke::<i64>("Mul", &Args { a: 4, b: -3 }).await.unwrap(), -12);
        assert_eq!(invoke::<i64>("Div", &Args { a: 9, b: 2 }).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_divide_by_zero() {
        let err = invoke::<i64>("Div", &Args { a: 1, b: 0 }).await.unwrap_err();
        assert!(matches!(err, RpcError::Application(m) if m == "divide by zero"));
    }

    #[tokio::test]
    async fn test_overflow_is_error() {
        let err = invoke::<i64>("Add", &Args { a: i64::MAX, b: 1 }).await.unwrap_err();
        assert!(matches!(err, RpcError::Application(_)));
    }

    #[tokio::test]
    async fn test_sleep_stops_when_cancelled() {
        let service = service();
        let sleep = service.method("Sleep").unwrap();
        let codec = Codec::default();
        let body = codec.encode(&10_000u64).unwrap();

        let ctx = CallContext::new(1, "Arith.Sleep");
        let token = ctx.cancellation_token();
        let call = tokio::spawn(async move { sleep.invoke(codec, &body, ctx).await });
        token.cancel();

        let err = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, RpcError::Application(m) if m == "sleep cancelled"));
    }
}
