//! LLM API interaction.
//!
//! The text-generation service is an opaque capability: it takes a user
//! message and returns free-form text, with the fixed instructions carried
//! by an awful_aj chat template. Two templates are in play per run: the
//! summarizer and the mail formatter.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//!
//! Each call is a single best-effort attempt; callers decide what a failure
//! means for their item.

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows the pipeline to run against a real backend or an
/// in-memory stand-in.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// # Lifetime Parameters
///
/// * `'a` - The lifetime of the references to config and template
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Reference to the LLM configuration (API keys, endpoints, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Reference to the chat template carrying the system instructions.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(reply) => debug!(
                elapsed_ms = dt.as_millis() as u128,
                reply_bytes = reply.len(),
                "API call succeeded"
            ),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed"),
        }
        res
    }
}

/// User message for the summarizer: the item URL plus its page text.
pub fn summarizer_message(url: &str, page_text: &str) -> String {
    format!("URL: {}\n\nText To Summarize: {}", url, page_text)
}

/// User message for the mail formatter.
pub fn mailer_message(report: &str) -> String {
    format!("Report: {}", report)
}
