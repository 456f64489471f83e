use std::future::Future;
use std::pin::Pin;

use crate::envelope::Envelope;
use crate::error::ClientError;

/// Positive answer of the sink to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Status code returned by the sink (2xx).
    pub status: u16,
}

/// Destination of envelopes. One instance is shared by every partition
/// worker, so implementations must be safe for concurrent use.
pub trait SinkClient: Send + Sync {
    /// Deliver one envelope. Network failure, a non-success status and
    /// serialization failure are all reported as `Err`.
    fn deliver<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryReceipt, ClientError>> + Send + 'a>>;
}
