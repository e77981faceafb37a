//! Notifier that only writes the summary to the log.

use async_trait::async_trait;
use rotabak_core::capability::Notifier;
use rotabak_core::Result;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        info!("{}\n{}", subject, body.trim_end());
        Ok(())
    }
}
