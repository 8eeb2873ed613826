//! Global error handling for the pipeline's hot path.
use crate::api::metrics::{MetricsError, Result};
use once_cell::sync::Lazy;
use std::sync::RwLock;

static GLOBAL_ERROR_HANDLER: Lazy<RwLock<Option<ErrorHandler>>> = Lazy::new(|| RwLock::new(None));

struct ErrorHandler(Box<dyn Fn(MetricsError) + Send + Sync>);

/// Handle an error using the globally configured error handler.
///
/// Writes to stderr if unset. Instrument update errors are routed here so
/// the update path never panics and never blocks on error delivery.
pub fn handle_error(err: MetricsError) {
    match GLOBAL_ERROR_HANDLER.read() {
        Ok(handler) if handler.is_some() => (handler.as_ref().unwrap().0)(err),
        _ => eprintln!("Metrics error occurred {:?}", err),
    }
}

/// Set the global error handler.
pub fn set_error_handler<F>(f: F) -> Result<()>
where
    F: Fn(MetricsError) + Send + Sync + 'static,
{
    GLOBAL_ERROR_HANDLER
        .write()
        .map(|mut handler| *handler = Some(ErrorHandler(Box::new(f))))
        .map_err(Into::into)
}
