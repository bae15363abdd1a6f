//! The process-wide tokio runtime backing submitted workers and
//! blocking entry points.

use std::sync::OnceLock;

use tokio::runtime::Runtime;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Create the engine runtime if it does not exist yet.
///
/// Callers that want the runtime up before the first request can do this
/// at startup; otherwise the first use creates it.
pub fn init() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("tokio runtime construction failed")
    })
}

/// The engine runtime, created on first use.
pub fn get() -> &'static Runtime {
    init()
}

/// Drive a future to completion on the engine runtime.
///
/// Blocks the calling thread until the future finishes, so it must only
/// be used from synchronous code, never from inside a task.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    get().block_on(future)
}

/// Spawn a worker task on the engine runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    get().spawn(future)
}
