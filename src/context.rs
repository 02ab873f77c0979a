use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::device::ReaderSession;
use crate::core::indicator::IndicatorHandle;
use crate::core::transfer::TransferEngine;

/// Shared handles for library mode, cloned into every request context.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub indicator: IndicatorHandle,
    pub reader: ReaderSession,
    pub transfers: TransferEngine,
    pub shutdown: CancellationToken,
}
