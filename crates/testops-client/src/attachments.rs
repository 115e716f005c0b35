//! Attachment validation and upload batching.
//!
//! Upload limits: 32 MiB per file, 128 MiB and 20 files per request.
//! Attachments that cannot be uploaded are skipped with a warning; the rest
//! of the batch still goes through.

use testops_proto::Attachment;
use tracing::{info, warn};

pub const MAX_FILE_SIZE: u64 = 32 * 1024 * 1024;
pub const MAX_BATCH_SIZE: u64 = 128 * 1024 * 1024;
pub const MAX_FILES_PER_BATCH: usize = 20;

/// An attachment that passed validation, with its size in bytes.
#[derive(Debug, Clone, Copy)]
pub struct SizedAttachment<'a> {
    pub attachment: &'a Attachment,
    pub size: u64,
}

fn size_of(attachment: &Attachment) -> Result<u64, String> {
    attachment.validate().map_err(|e| e.to_string())?;
    if let Some(content) = &attachment.content {
        return Ok(content.len() as u64);
    }
    match attachment.path() {
        Some(path) => std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|_| format!("file not found: {}", path.display())),
        None => Err("attachment has neither path nor content".to_string()),
    }
}

/// Drops attachments that are malformed, missing on disk, or too large.
pub fn filter_valid(attachments: &[Attachment]) -> Vec<SizedAttachment<'_>> {
    let mut valid = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let name = attachment.display_name();
        match size_of(attachment) {
            Ok(size) if size > MAX_FILE_SIZE => {
                let mb = size as f64 / 1024.0 / 1024.0;
                warn!(
                    "Skipping attachment '{}': file size {:.2} MB exceeds maximum of 32 MB per file",
                    name, mb
                );
            }
            Ok(size) => valid.push(SizedAttachment { attachment, size }),
            Err(reason) => warn!("Skipping attachment '{}': {}", name, reason),
        }
    }

    let skipped = attachments.len() - valid.len();
    if skipped > 0 {
        info!(
            "Filtered out {} invalid attachment(s), proceeding with {} valid attachment(s)",
            skipped,
            valid.len()
        );
    }

    valid
}

/// Groups attachments into request-sized batches, preserving order.
pub fn split_into_batches(attachments: Vec<SizedAttachment<'_>>) -> Vec<Vec<SizedAttachment<'_>>> {
    let mut batches = Vec::new();
    let mut current: Vec<SizedAttachment<'_>> = Vec::new();
    let mut current_size = 0;

    for item in attachments {
        let full = current.len() >= MAX_FILES_PER_BATCH;
        let too_big = current_size + item.size > MAX_BATCH_SIZE;
        if (full || too_big) && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += item.size;
        current.push(item);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
