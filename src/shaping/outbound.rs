//!
//! Outbound payload composition for the upstream chat-completions API.
//!
//! Prepends the relay-owned identity preamble, keeps only the most recent exchange
//! pairs of the sanitized history, picks the model tier and fixes the generation
//! parameters.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde::Serialize;

use crate::config::{Config, DeliveryMode, LogLevel};
use crate::shaping::inbound::{InboundRequest, Message, Role};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Request body sent to the upstream completion API.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundRequest {
    /** upstream model identifier */
    pub model: String,
    /** identity preamble followed by the trimmed history */
    pub messages: Vec<Message>,
    /** sampling temperature */
    pub temperature: f64,
    /** generation ceiling */
    pub max_tokens: u32,
    /** whether upstream should answer as an event stream */
    pub stream: bool,
}

///
/// Composes outbound payloads from sanitized inbound requests.
///
/// Holds the relay-owned pieces of every payload: the persona, both model tiers,
/// the history window and the per-mode token ceilings.
#[derive(Debug, Clone)]
pub struct RequestComposer {
    /** persona pinned ahead of every conversation */
    identity_prompt: String,
    /** default tier */
    cheap_model: String,
    /** tier used on escalation */
    escalated_model: String,
    /** number of exchange pairs kept */
    history_pairs: usize,
    /** token ceiling when buffering */
    buffered_max_tokens: u32,
    /** token ceiling when streaming */
    streaming_max_tokens: u32,
    /** logging level for debug output control */
    log_level: LogLevel,
}

/* --- constants ------------------------------------------------------------------------------ */

/** fixed sampling temperature */
pub const TEMPERATURE: f64 = 0.3;

/* --- start of code -------------------------------------------------------------------------- */

impl RequestComposer {
    ///
    /// Create a composer from the relay configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            identity_prompt: config.identity_prompt.clone(),
            cheap_model: config.cheap_model.clone(),
            escalated_model: config.escalated_model.clone(),
            history_pairs: config.history_pairs,
            buffered_max_tokens: config.buffered_max_tokens,
            streaming_max_tokens: config.streaming_max_tokens,
            log_level: config.log_level,
        }
    }

    ///
    /// Compose the upstream payload for a sanitized request.
    ///
    /// # Arguments
    ///  * `request` - sanitized inbound request
    ///  * `mode` - how the completion will be delivered
    ///
    /// # Returns
    ///  * Payload ready to be serialized to the upstream API
    pub fn compose(&self, request: InboundRequest, mode: DeliveryMode) -> OutboundRequest {
        let model = self.select_model(&request);
        let history = trim_history(request.messages, self.history_pairs);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(self.preamble());
        messages.extend(history);

        let (max_tokens, stream) = match mode {
            DeliveryMode::Buffered => (self.buffered_max_tokens, false),
            DeliveryMode::Streaming => (self.streaming_max_tokens, true),
        };

        self.debug(&format!(
            "Composed payload: model={}, messages={}, max_tokens={}, stream={}",
            model,
            messages.len(),
            max_tokens,
            stream
        ));

        OutboundRequest { model, messages, temperature: TEMPERATURE, max_tokens, stream }
    }

    ///
    /// The relay-owned system message.
    pub fn preamble(&self) -> Message {
        Message::new(Role::System, self.identity_prompt.clone())
    }

    fn select_model(&self, request: &InboundRequest) -> String {
        if request.meta.wants_escalation() {
            self.escalated_model.clone()
        } else {
            self.cheap_model.clone()
        }
    }

    ///
    /// Log debug message if trace logging is enabled.
    ///
    /// # Arguments
    ///  * `msg` - debug message to log
    pub(crate) fn debug(&self, msg: &str) {
        if self.log_level.is_trace_enabled() {
            tracing::debug!("[TRACE] {}", msg);
        }
    }
}

///
/// Keep the final `2 * pairs` entries of the history, preserving order.
///
/// Older context is dropped, not summarized.
pub fn trim_history(mut history: Vec<Message>, pairs: usize) -> Vec<Message> {
    let keep = pairs.saturating_mul(2);
    if history.len() > keep {
        history.drain(..history.len() - keep);
    }
    history
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::shaping::inbound::RequestMeta;

    fn conversation(len: usize) -> Vec<Message> {
        (0..len)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, format!("m{}", i))
            })
            .collect()
    }

    fn request(messages: Vec<Message>, escalate: Option<Value>) -> InboundRequest {
        InboundRequest { messages, meta: RequestMeta { escalate }, stream: None }
    }

    #[test]
    fn test_trim_keeps_most_recent_pairs_in_order() {
        let trimmed = trim_history(conversation(20), 6);
        assert_eq!(trimmed.len(), 12);
        assert_eq!(trimmed.first().unwrap().content, "m8");
        assert_eq!(trimmed.last().unwrap().content, "m19");
    }

    #[test]
    fn test_trim_leaves_short_history_alone() {
        let trimmed = trim_history(conversation(5), 6);
        assert_eq!(trimmed, conversation(5));
    }

    #[test]
    fn test_preamble_is_first_and_only_system_message() {
        let composer = RequestComposer::new(&Config::new("sk-test"));
        let out = composer.compose(request(conversation(30), None), DeliveryMode::Buffered);

        assert_eq!(out.messages[0].role, Role::System);
        assert_eq!(out.messages[0].content, crate::config::DEFAULT_IDENTITY_PROMPT);
        assert_eq!(out.messages.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(out.messages.len(), 13);
    }

    #[test]
    fn test_model_tier_selection() {
        let composer = RequestComposer::new(&Config::new("sk-test"));

        let cheap = composer.compose(request(vec![], None), DeliveryMode::Buffered);
        assert_eq!(cheap.model, "gpt-4.1-mini");

        let escalated =
            composer.compose(request(vec![], Some(json!(true))), DeliveryMode::Buffered);
        assert_eq!(escalated.model, "gpt-4.1");

        let not_escalated =
            composer.compose(request(vec![], Some(json!(false))), DeliveryMode::Buffered);
        assert_eq!(not_escalated.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_generation_parameters_per_mode() {
        let composer = RequestComposer::new(&Config::new("sk-test"));

        let buffered = composer.compose(request(vec![], None), DeliveryMode::Buffered);
        assert_eq!(buffered.max_tokens, 800);
        assert!(!buffered.stream);

        let streamed = composer.compose(request(vec![], None), DeliveryMode::Streaming);
        assert_eq!(streamed.max_tokens, 500);
        assert!(streamed.stream);
        assert!((streamed.temperature - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialized_shape() {
        let composer = RequestComposer::new(&Config::new("sk-test"));
        let out = composer.compose(
            request(vec![Message::new(Role::User, "hi")], None),
            DeliveryMode::Buffered,
        );
        let value = serde_json::to_value(&out).unwrap();

        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1], json!({"role": "user", "content": "hi"}));
        assert_eq!(value["stream"], false);
        assert_eq!(value["max_tokens"], 800);
    }
}
