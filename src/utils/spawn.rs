use futures::future::LocalBoxFuture;

/// Lanza tareas locales (no `Send`) en el hilo de la UI
pub trait Spawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);
}

impl Spawner for futures::executor::LocalSpawner {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        use futures::task::LocalSpawnExt;

        if let Err(e) = self.spawn_local(task) {
            log::error!("❌ No se pudo lanzar la tarea local: {}", e);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserSpawner;

#[cfg(target_arch = "wasm32")]
mod browser {
    use futures::future::LocalBoxFuture;

    use super::Spawner;

    /// `wasm_bindgen_futures::spawn_local`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserSpawner;

    impl Spawner for BrowserSpawner {
        fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
            wasm_bindgen_futures::spawn_local(task);
        }
    }
}
