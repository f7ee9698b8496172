use serde::{Deserialize, Serialize};

/// Reply language for a session. Detection is sticky: once a language has
/// been established it is kept until a later turn re-detects a valid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    French,
    Arabic,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::Arabic => "arabic",
        }
    }

    pub fn parse(value: &str) -> Option<Language> {
        match value.trim().to_lowercase().as_str() {
            "english" => Some(Language::English),
            "french" => Some(Language::French),
            "arabic" => Some(Language::Arabic),
            _ => None,
        }
    }
}

/// Classified intent of one inbound message. The generator output is
/// untrusted, so anything outside this domain collapses to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    NewOrder,
    RetrieveOrder,
    ListProducts,
    Greeting,
    ReportIssue,
    #[default]
    None,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::NewOrder => "new_order",
            Intent::RetrieveOrder => "retrieve_order",
            Intent::ListProducts => "list_products",
            Intent::Greeting => "greeting",
            Intent::ReportIssue => "report_issue",
            Intent::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Intent> {
        match value.trim().to_lowercase().as_str() {
            "new_order" => Some(Intent::NewOrder),
            "retrieve_order" => Some(Intent::RetrieveOrder),
            "list_products" => Some(Intent::ListProducts),
            "greeting" => Some(Intent::Greeting),
            "report_issue" => Some(Intent::ReportIssue),
            "none" => Some(Intent::None),
            _ => None,
        }
    }
}

/// Category attached to a recorded complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Defective,
    WrongItem,
    MissingItem,
    Delivery,
    Quality,
    Quantity,
    Packaging,
    #[default]
    Other,
}

impl IssueCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCategory::Defective => "defective",
            IssueCategory::WrongItem => "wrong_item",
            IssueCategory::MissingItem => "missing_item",
            IssueCategory::Delivery => "delivery",
            IssueCategory::Quality => "quality",
            IssueCategory::Quantity => "quantity",
            IssueCategory::Packaging => "packaging",
            IssueCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<IssueCategory> {
        match value.trim().to_lowercase().as_str() {
            "defective" => Some(IssueCategory::Defective),
            "wrong_item" => Some(IssueCategory::WrongItem),
            "missing_item" => Some(IssueCategory::MissingItem),
            "delivery" => Some(IssueCategory::Delivery),
            "quality" => Some(IssueCategory::Quality),
            "quantity" => Some(IssueCategory::Quantity),
            "packaging" => Some(IssueCategory::Packaging),
            "other" => Some(IssueCategory::Other),
            _ => None,
        }
    }
}

/// Mid-flow continuation marker. While set, the next inbound message is
/// consumed as the awaited slot value instead of being re-classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStep {
    AwaitingAddress,
}

/// Per-counterparty dialogue memory, mutated once per turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub user_input: String,
    pub language: Language,
    pub intent: Intent,
    #[serde(default)]
    pub pending_step: Option<PendingStep>,
    #[serde(default)]
    pub requested_items: Vec<String>,
    #[serde(default)]
    pub issue_product: Option<String>,
    #[serde(default)]
    pub pending_address: Option<String>,
    #[serde(default)]
    pub last_order_result: Option<OrderReceipt>,
}

impl ConversationState {
    /// An address is only awaited because there is something to ship.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.pending_step == Some(PendingStep::AwaitingAddress)
            && self.requested_items.is_empty()
        {
            return Err("awaiting_address with empty requested_items".to_string());
        }
        Ok(())
    }
}

/// One sellable product, fetched fresh from the commerce platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub delivery_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub items: Vec<String>,
    pub status: String,
}

/// Filter for listing a counterparty's orders, generated from the user's
/// question and validated before execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claim_id: String,
}

/// Inbound message as delivered by the channel layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundMessage {
    pub counterparty_id: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    pub body: String,
}

fn default_display_name() -> String {
    "Unknown".to_string()
}

/// Reply handed back to the channel layer for verbatim delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundReply {
    pub reply: String,
    pub language: Language,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Intent::NewOrder).unwrap(),
            "\"new_order\""
        );
        assert_eq!(
            serde_json::from_str::<Intent>("\"report_issue\"").unwrap(),
            Intent::ReportIssue
        );
    }

    #[test]
    fn language_parse_is_case_insensitive() {
        assert_eq!(Language::parse(" French "), Some(Language::French));
        assert_eq!(Language::parse("klingon"), None);
    }

    #[test]
    fn awaiting_address_requires_items() {
        let mut state = ConversationState {
            pending_step: Some(PendingStep::AwaitingAddress),
            ..ConversationState::default()
        };
        assert!(state.check_invariants().is_err());
        state.requested_items.push("wall lamp".to_string());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn inbound_message_defaults_display_name() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"counterparty_id":"216123","body":"hi"}"#).unwrap();
        assert_eq!(msg.display_name, "Unknown");
    }

    #[test]
    fn inbound_message_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<InboundMessage>(
            r#"{"counterparty_id":"216123","body":"hi","extra":1}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn conversation_state_roundtrips() {
        let state = ConversationState {
            user_input: "order the lamp".to_string(),
            language: Language::French,
            intent: Intent::NewOrder,
            pending_step: Some(PendingStep::AwaitingAddress),
            requested_items: vec!["lamp".to_string()],
            ..ConversationState::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.intent, Intent::NewOrder);
        assert_eq!(back.pending_step, Some(PendingStep::AwaitingAddress));
        assert_eq!(back.requested_items, vec!["lamp".to_string()]);
    }
}
