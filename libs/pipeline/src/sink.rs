use std::sync::Arc;

use tokio::sync::OnceCell;

use bridge_api::{ClientError, SinkClient};

type SinkFactory = Box<dyn Fn() -> Result<Arc<dyn SinkClient>, ClientError> + Send + Sync>;

// ═══════════════════════════════════════════════════════════════
//  LazySink — один sink client на весь процесс
// ═══════════════════════════════════════════════════════════════

/// Sink client, создаваемый при первом обращении и затем общий для всех
/// partition worker'ов (один пул соединений).
pub struct LazySink {
    factory: SinkFactory,
    cell: OnceCell<Arc<dyn SinkClient>>,
}

impl LazySink {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SinkClient>, ClientError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    /// Получить client, создав его при первом вызове.
    pub async fn get(&self) -> Result<Arc<dyn SinkClient>, ClientError> {
        let client = self
            .cell
            .get_or_try_init(|| async {
                let client = (self.factory)()?;
                tracing::info!("sink client created");
                Ok::<_, ClientError>(client)
            })
            .await?;
        Ok(client.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

impl std::fmt::Debug for LazySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazySink")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bridge_api::{DeliveryReceipt, Envelope};

    use super::*;

    struct NullSink;

    impl SinkClient for NullSink {
        fn deliver<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, ClientError>> + Send + 'a>> {
            Box::pin(async { Ok(DeliveryReceipt { status: 202 }) })
        }
    }

    #[tokio::test]
    async fn factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sink = LazySink::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullSink) as Arc<dyn SinkClient>)
        });

        assert!(!sink.is_initialized());
        let a = sink.get().await.unwrap();
        let b = sink.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.is_initialized());
    }

    #[tokio::test]
    async fn failed_init_is_reported() {
        let sink = LazySink::new(|| Err(ClientError::config("bad uri")));

        let Err(err) = sink.get().await else {
            panic!("factory error must surface");
        };
        assert_eq!(err.kind(), bridge_api::ErrorKind::Config);
        assert!(!sink.is_initialized());
    }
}
