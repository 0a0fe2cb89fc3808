//! IPP operation dispatch and response assembly.
//!
//! Decodes the request, routes by operation code, and builds the minimal
//! attribute sets a driverless print dialog needs. Print-Job runs the
//! raster pipeline and waits on the job bridge before answering.

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use ipp_proto::tags::*;
use ipp_proto::{IppMessage, Operation};

use crate::bridge::PrintBridge;
use crate::config::AppConfig;

/// Handles decoded IPP requests against the configured printer identity.
pub struct IppService {
    config: AppConfig,
    bridge: PrintBridge,
}

impl IppService {
    pub fn new(config: AppConfig, bridge: PrintBridge) -> Self {
        Self { config, bridge }
    }

    /// The configuration this service was built with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Process one IPP request body and produce the encoded response.
    ///
    /// Never panics and never leaves the client without a well-formed IPP
    /// message; decode failures answer with an internal error carrying the
    /// request-id when the header was readable.
    pub async fn handle_request(&self, body: &[u8]) -> Vec<u8> {
        match IppMessage::decode(body) {
            Ok((request, consumed)) => {
                let document = &body[consumed..];
                self.dispatch(&request, document).await.encode()
            }
            Err(e) => {
                warn!(error = %e, "malformed IPP request");
                let request_id = request_id_best_effort(body);
                error_response(
                    STATUS_SERVER_ERROR_INTERNAL,
                    request_id,
                    "malformed IPP request",
                )
                .encode()
            }
        }
    }

    async fn dispatch(&self, request: &IppMessage, document: &[u8]) -> IppMessage {
        if request.code == OP_SPURIOUS_CRLF {
            // A CRLF landed where the operation-id belongs; the HTTP
            // framing was misread upstream.
            warn!("spurious 0x0D0A operation: transport framing misread");
            return error_response(
                STATUS_SERVER_ERROR_INTERNAL,
                request.request_id,
                "transport framing misread",
            );
        }

        match Operation::from_u16(request.code) {
            Some(Operation::PrintJob) => self.print_job(request, document).await,
            Some(Operation::ValidateJob) => ok_response(request.request_id),
            Some(Operation::CancelJob) => {
                // In-flight BLE streams cannot be aborted; accepted as a
                // no-op.
                info!(request_id = request.request_id, "Cancel-Job acknowledged");
                ok_response(request.request_id)
            }
            Some(Operation::GetJobAttributes) => self.get_job_attributes(request),
            Some(Operation::GetJobs) => ok_response(request.request_id),
            Some(
                Operation::GetPrinterAttributes
                | Operation::CupsGetDefault
                | Operation::CupsListAllPrinters,
            ) => self.get_printer_attributes(request),
            None => {
                warn!(
                    operation = %format_args!("0x{:04X}", request.code),
                    "unsupported IPP operation"
                );
                error_response(
                    STATUS_SERVER_ERROR_OPERATION_NOT_SUPPORTED,
                    request.request_id,
                    "operation not supported",
                )
            }
        }
    }

    /// Print-Job (0x0002): raster the document, hand it to the bridge, and
    /// answer with a pending job.
    async fn print_job(&self, request: &IppMessage, document: &[u8]) -> IppMessage {
        let job_id = i32::from(rand::rng().random_range(1..=u16::MAX));
        info!(
            job_id,
            document_bytes = document.len(),
            request_id = request.request_id,
            "Print-Job received"
        );

        let pages = if document.is_empty() {
            Vec::new()
        } else {
            match raster_pipeline::process_document(document, &self.config.raster).await {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(job_id, error = %e, "rasterization failed");
                    return error_response(
                        STATUS_SERVER_ERROR_INTERNAL,
                        request.request_id,
                        "document rasterization failed",
                    );
                }
            }
        };

        if let Err(e) = self.bridge.submit(pages).await {
            warn!(job_id, error = %e, "print bridge failed");
            return error_response(
                STATUS_SERVER_ERROR_INTERNAL,
                request.request_id,
                "printing failed",
            );
        }

        let mut resp = ok_response(request.request_id);
        self.job_attributes(&mut resp, job_id);
        resp
    }

    /// Job attribute set for a freshly accepted job.
    fn job_attributes(&self, resp: &mut IppMessage, job_id: i32) {
        let base = self.config.printer_uri.trim_end_matches('/');
        let now = Utc::now().timestamp() as i32;

        resp.uri(
            TAG_JOB_ATTRIBUTES,
            "job-uri",
            &format!("{base}/job/{job_id}"),
        )
        .integer_attr(TAG_JOB_ATTRIBUTES, "job-id", job_id)
        .enum_attr(TAG_JOB_ATTRIBUTES, "job-state", JOB_STATE_PENDING)
        .keyword(TAG_JOB_ATTRIBUTES, "job-state-reasons", "job-incoming")
        .keyword(
            TAG_JOB_ATTRIBUTES,
            "job-state-reasons",
            "job-data-insufficient",
        )
        .uri(
            TAG_JOB_ATTRIBUTES,
            "job-printer-uri",
            &self.config.printer_uri,
        )
        .name(
            TAG_JOB_ATTRIBUTES,
            "job-name",
            &format!("Print job {job_id}"),
        )
        .name(
            TAG_JOB_ATTRIBUTES,
            "job-originating-user-name",
            "job-originating-user-name",
        )
        .integer_attr(TAG_JOB_ATTRIBUTES, "time-at-creation", 0)
        .integer_attr(TAG_JOB_ATTRIBUTES, "time-at-processing", 0)
        .integer_attr(TAG_JOB_ATTRIBUTES, "time-at-completed", 0)
        .integer_attr(TAG_JOB_ATTRIBUTES, "job-printer-up-time", now);
    }

    /// Get-Job-Attributes (0x0009): jobs do not persist, so every lookup
    /// answers with a synthetic completed job.
    fn get_job_attributes(&self, request: &IppMessage) -> IppMessage {
        let job_id = request
            .integer(TAG_OPERATION_ATTRIBUTES, "job-id")
            .unwrap_or(0);

        let mut resp = ok_response(request.request_id);
        resp.integer_attr(TAG_JOB_ATTRIBUTES, "job-id", job_id)
            .enum_attr(TAG_JOB_ATTRIBUTES, "job-state", JOB_STATE_COMPLETED)
            .keyword(
                TAG_JOB_ATTRIBUTES,
                "job-state-reasons",
                "job-completed-successfully",
            )
            .integer_attr(
                TAG_JOB_ATTRIBUTES,
                "job-printer-up-time",
                Utc::now().timestamp() as i32,
            );
        resp
    }

    /// Get-Printer-Attributes (0x000B) and the CUPS list/default variants.
    fn get_printer_attributes(&self, request: &IppMessage) -> IppMessage {
        let cfg = &self.config;
        let mut resp = ok_response(request.request_id);

        resp.uri(TAG_PRINTER_ATTRIBUTES, "printer-uri-supported", &cfg.printer_uri)
            .keyword(TAG_PRINTER_ATTRIBUTES, "uri-authentication-supported", "none")
            .keyword(TAG_PRINTER_ATTRIBUTES, "uri-security-supported", "none")
            .name(TAG_PRINTER_ATTRIBUTES, "printer-name", &cfg.printer_name)
            .text(TAG_PRINTER_ATTRIBUTES, "printer-info", &cfg.printer_name)
            .text(
                TAG_PRINTER_ATTRIBUTES,
                "printer-make-and-model",
                &cfg.printer_name,
            )
            .enum_attr(TAG_PRINTER_ATTRIBUTES, "printer-state", PRINTER_STATE_IDLE)
            .keyword(TAG_PRINTER_ATTRIBUTES, "printer-state-reasons", "none")
            .keyword(TAG_PRINTER_ATTRIBUTES, "ipp-versions-supported", "1.1");

        for op in [
            Operation::PrintJob,
            Operation::ValidateJob,
            Operation::CancelJob,
            Operation::GetJobAttributes,
            Operation::GetPrinterAttributes,
        ] {
            resp.enum_attr(
                TAG_PRINTER_ATTRIBUTES,
                "operations-supported",
                op.code() as i32,
            );
        }

        resp.boolean(
            TAG_PRINTER_ATTRIBUTES,
            "multiple-document-jobs-supported",
            false,
        )
        .charset(TAG_PRINTER_ATTRIBUTES, "charset-configured", "utf-8")
        .charset(TAG_PRINTER_ATTRIBUTES, "charset-supported", "utf-8")
        .natural_language(
            TAG_PRINTER_ATTRIBUTES,
            "natural-language-configured",
            "en",
        )
        .natural_language(
            TAG_PRINTER_ATTRIBUTES,
            "generated-natural-language-supported",
            "en",
        )
        .mime_type(
            TAG_PRINTER_ATTRIBUTES,
            "document-format-default",
            "application/pdf",
        )
        .mime_type(
            TAG_PRINTER_ATTRIBUTES,
            "document-format-supported",
            "application/pdf",
        )
        .boolean(TAG_PRINTER_ATTRIBUTES, "printer-is-accepting-jobs", true)
        .integer_attr(TAG_PRINTER_ATTRIBUTES, "queued-job-count", 0)
        .keyword(
            TAG_PRINTER_ATTRIBUTES,
            "pdl-override-supported",
            "not-attempted",
        )
        .integer_attr(
            TAG_PRINTER_ATTRIBUTES,
            "printer-up-time",
            Utc::now().timestamp() as i32,
        )
        .keyword(TAG_PRINTER_ATTRIBUTES, "compression-supported", "none")
        .keyword(TAG_PRINTER_ATTRIBUTES, "media-supported", "roll_57mm")
        .keyword(TAG_PRINTER_ATTRIBUTES, "media-default", "roll_57mm")
        .uri(TAG_PRINTER_ATTRIBUTES, "printer-uuid", &cfg.printer_uuid);

        resp
    }
}

/// A successful response with the two mandatory operation attributes.
fn ok_response(request_id: u32) -> IppMessage {
    let mut resp = IppMessage::response(STATUS_OK, request_id);
    resp.charset(TAG_OPERATION_ATTRIBUTES, "attributes-charset", "utf-8")
        .natural_language(
            TAG_OPERATION_ATTRIBUTES,
            "attributes-natural-language",
            "en",
        )
        .text(TAG_OPERATION_ATTRIBUTES, "status-message", "successful-ok");
    resp
}

/// An error response that still carries the mandatory attributes.
fn error_response(status: u16, request_id: u32, message: &str) -> IppMessage {
    let mut resp = IppMessage::response(status, request_id);
    resp.charset(TAG_OPERATION_ATTRIBUTES, "attributes-charset", "utf-8")
        .natural_language(
            TAG_OPERATION_ATTRIBUTES,
            "attributes-natural-language",
            "en",
        )
        .text(TAG_OPERATION_ATTRIBUTES, "status-message", message);
    resp
}

/// Pull the request-id out of a possibly-broken message so the error
/// response can still echo it.
fn request_id_best_effort(body: &[u8]) -> u32 {
    match body.get(4..8) {
        Some(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => 0,
    }
}
