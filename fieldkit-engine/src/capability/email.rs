//! Email capability
//!
//! Registers `email` (trimmed, lowercased) and `email_status`. Every commit
//! to `email` runs the remote email check and stores the returned tokens.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use fieldkit_common::{FieldValue, Result};

use super::{names, Capability, CapabilityLoader};
use crate::field::{ChangeEvent, FieldSpec, PostCommitHook, TextNormalizer};
use crate::record::Record;

pub const EMAIL: &str = "email";
pub const EMAIL_STATUS: &str = "email_status";

pub struct EmailCapability;

#[async_trait]
impl Capability for EmailCapability {
    fn name(&self) -> &str {
        names::EMAIL
    }

    async fn attach(&self, record: &Arc<Record>, _loader: &CapabilityLoader) -> Result<()> {
        record.register_field(FieldSpec::new(EMAIL).with_filter(Arc::new(TextNormalizer::lower())));
        record.register_field(
            FieldSpec::new(EMAIL_STATUS).with_initial(FieldValue::List(Vec::new())),
        );
        record.add_post_commit_hook(EMAIL, Arc::new(EmailCheck))?;
        Ok(())
    }
}

struct EmailCheck;

#[async_trait]
impl PostCommitHook for EmailCheck {
    async fn after_commit(&self, record: &Arc<Record>, change: &ChangeEvent) {
        let email = change.new_value.as_str().unwrap_or_default().to_string();
        if email.is_empty() {
            record.set_field(EMAIL_STATUS, FieldValue::List(Vec::new())).await;
            return;
        }

        let context = record.context();
        let response = {
            let _busy = context.quiescence.enter();
            context.remote.check_email(&email).await
        };

        match response {
            Ok(status) => {
                // A newer address may have been typed while waiting
                if record.get_text(EMAIL) != email {
                    debug!(record_id = %record.id(), "Discarding email status for outdated value");
                    return;
                }
                record.set_field(EMAIL_STATUS, status).await;
            }
            Err(e) => context.report_swallowed("Email check", &e),
        }
    }
}
