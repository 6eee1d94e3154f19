use std::future::Future;

use futures::future::LocalBoxFuture;

use crate::models::ReplayError;

/// Reproduce una mutación diferida contra la API. La cola no interpreta
/// `kind` ni `payload`; la idempotencia de cada reproducción es
/// responsabilidad de quien implementa este trait.
pub trait Replayer {
    fn replay<'a>(
        &'a self,
        kind: &'a str,
        payload: &'a serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), ReplayError>>;
}

/// Cualquier closure `(kind, payload) -> Future` sirve como replayer
impl<F, Fut> Replayer for F
where
    F: Fn(String, serde_json::Value) -> Fut,
    Fut: Future<Output = Result<(), ReplayError>> + 'static,
{
    fn replay<'a>(
        &'a self,
        kind: &'a str,
        payload: &'a serde_json::Value,
    ) -> LocalBoxFuture<'a, Result<(), ReplayError>> {
        Box::pin(self(kind.to_string(), payload.clone()))
    }
}
