//! Job bridge: serializes print jobs onto the single BLE worker.
//!
//! One background task owns the printer connection; IPP handlers submit
//! packed pages with a oneshot reply slot and block on the result. The
//! printer can only do one thing, so concurrent Print-Job requests queue
//! here.

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use lxprinter::{DeviceTarget, LxPrinter};
use raster_pipeline::PackedPage;

/// Maximum queued jobs before submitters see backpressure errors.
const QUEUE_CAPACITY: usize = 16;

/// Executes one job's pages against a printer. The seam exists so the
/// dispatch path can be tested without radio hardware.
pub trait JobExecutor: Send + 'static {
    fn print(
        &mut self,
        pages: Vec<PackedPage>,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

struct BridgeJob {
    pages: Vec<PackedPage>,
    reply: oneshot::Sender<anyhow::Result<()>>,
}

/// Handle used by IPP handlers to run a job and wait for it.
#[derive(Clone)]
pub struct PrintBridge {
    tx: mpsc::Sender<BridgeJob>,
}

impl PrintBridge {
    /// Start the worker task that owns the executor.
    pub fn start<E: JobExecutor>(executor: E) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(worker_loop(rx, executor));
        Self { tx }
    }

    /// Submit packed pages and wait for the worker's verdict.
    pub async fn submit(&self, pages: Vec<PackedPage>) -> anyhow::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(BridgeJob {
                pages,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow!("print worker is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("print worker dropped the job"))?
    }
}

/// Sequential job processing; one page at a time over the radio.
async fn worker_loop<E: JobExecutor>(mut rx: mpsc::Receiver<BridgeJob>, mut executor: E) {
    info!("print worker started");
    while let Some(job) = rx.recv().await {
        let result = if job.pages.is_empty() {
            // Nothing to render; an empty Print-Job is still a success.
            Ok(())
        } else {
            executor.print(job.pages).await
        };

        if let Err(e) = &result {
            error!(error = %e, "print job failed");
        }
        let _ = job.reply.send(result);
    }
    info!("print worker stopped");
}

/// The live executor: owns the BLE connection across jobs.
///
/// Discovery and initialization happen on first use; later jobs reuse the
/// connection. Any failure tears the connection down so the next job
/// starts from discovery again.
pub struct BlePrintExecutor {
    target: DeviceTarget,
    black_level: u8,
    printer: Option<LxPrinter>,
}

impl BlePrintExecutor {
    pub fn new(address: Option<String>, name: String, black_level: u8) -> Self {
        let target = match address {
            Some(addr) => DeviceTarget::Address(addr),
            None => DeviceTarget::Name(name),
        };
        Self {
            target,
            black_level,
            printer: None,
        }
    }

    async fn print_pages(&mut self, pages: Vec<PackedPage>) -> anyhow::Result<()> {
        if self.printer.is_none() {
            info!(target = %self.target, "connecting to printer");
            self.printer = Some(LxPrinter::connect(&self.target, self.black_level).await?);
        }
        let printer = self
            .printer
            .as_mut()
            .ok_or_else(|| anyhow!("printer connection missing"))?;

        for (index, page) in pages.into_iter().enumerate() {
            info!(page = index, lines = page.line_count(), "printing page");
            printer.print_lines(page.lines).await?;
        }
        Ok(())
    }
}

impl JobExecutor for BlePrintExecutor {
    fn print(
        &mut self,
        pages: Vec<PackedPage>,
    ) -> impl std::future::Future<Output = anyhow::Result<()>> + Send {
        async move {
            let result = self.print_pages(pages).await;
            if result.is_err() {
                // Force re-discovery on the next job.
                if let Some(mut printer) = self.printer.take() {
                    let _ = printer.disconnect().await;
                }
            }
            result
        }
    }
}
