//! Per-intent turn handlers.
//!
//! Every handler returns user-facing text in the session language. Generated
//! replies are preferred; when the inference service fails or returns
//! something unusable the deterministic templates take over, so a turn never
//! ends without a reply.

use souk_contracts::{
    CatalogEntry, ConversationState, Language, OrderFilter, OrderSummary, PendingStep,
};
use souk_kernel::extract::{self, FieldKey};
use souk_kernel::{prompts, replies, resolve};
use souk_kernel::{run_bounded, CorrectionStep, LoopOutcome, Verdict};
use tokio::sync::Mutex;
use tracing::warn;

use crate::commerce::{Commerce, CustomerInfo};
use crate::inference::Inference;
use crate::users::UserStore;

pub struct TurnContext<'a> {
    pub commerce: &'a dyn Commerce,
    pub inference: &'a dyn Inference,
    pub users: &'a Mutex<UserStore>,
    pub counterparty_id: &'a str,
    pub display_name: &'a str,
    pub max_attempts: u32,
    pub similarity_threshold: f64,
}

async fn generated_reply(inference: &dyn Inference, prompt: &str, fallback: String) -> String {
    match inference.complete(prompt).await {
        Ok(raw) => extract::response(&raw).unwrap_or(fallback),
        Err(err) => {
            warn!(error = %err, "reply generation failed, using template");
            fallback
        }
    }
}

pub async fn greeting(ctx: &TurnContext<'_>, state: &ConversationState) -> String {
    let language = state.language;
    generated_reply(
        ctx.inference,
        &prompts::greeting_reply(language, &state.user_input),
        replies::greeting(language),
    )
    .await
}

pub async fn clarify(ctx: &TurnContext<'_>, state: &ConversationState) -> String {
    let language = state.language;
    generated_reply(
        ctx.inference,
        &prompts::clarification_reply(language, &state.user_input),
        replies::clarification(language),
    )
    .await
}

pub async fn list_products(ctx: &TurnContext<'_>, state: &ConversationState) -> String {
    let language = state.language;
    let catalog = match ctx.commerce.list_products().await {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(error = %err, "product listing failed");
            return replies::try_again(language);
        }
    };
    if catalog.is_empty() {
        return replies::no_products_available(language);
    }

    let rendered = render_catalog(&catalog, language);
    generated_reply(
        ctx.inference,
        &prompts::product_list_reply(language, &rendered),
        replies::product_list(language, &rendered),
    )
    .await
}

fn render_catalog(catalog: &[CatalogEntry], language: Language) -> String {
    catalog
        .iter()
        .map(|p| format!("{} ({} {})", p.name, p.price, replies::currency(language)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Matches user-typed item names onto exact catalog names. Generation is
/// validated against the live catalog; names that survive are canonical.
struct ProductMatchStep<'a> {
    inference: &'a dyn Inference,
    requested: &'a [String],
    catalog: &'a [CatalogEntry],
}

#[async_trait::async_trait]
impl CorrectionStep for ProductMatchStep<'_> {
    type Candidate = Vec<String>;
    type Output = Vec<CatalogEntry>;

    async fn generate(&mut self, last_error: Option<&str>) -> Result<Vec<String>, String> {
        let names: Vec<String> = self.catalog.iter().map(|p| p.name.clone()).collect();
        let prompt = prompts::product_match(self.requested, &names, last_error);
        let raw = self.inference.complete(&prompt).await?;
        Ok(extract::items(&raw, FieldKey::Products))
    }

    async fn assess(&mut self, candidate: Vec<String>) -> Verdict<Vec<CatalogEntry>> {
        if candidate.is_empty() {
            return Verdict::Reject("no product names were returned".to_string());
        }
        if candidate.len() != self.requested.len() {
            return Verdict::Reject(format!(
                "expected {} product name(s), got {}",
                self.requested.len(),
                candidate.len()
            ));
        }
        let mut entries = Vec::with_capacity(candidate.len());
        for name in &candidate {
            let lowered = name.to_lowercase();
            match self
                .catalog
                .iter()
                .find(|p| p.name.to_lowercase() == lowered)
            {
                Some(entry) => entries.push(entry.clone()),
                None => {
                    return Verdict::Reject(format!(
                        "'{name}' is not an exact product name from the available products"
                    ))
                }
            }
        }
        Verdict::Accept(entries)
    }
}

pub async fn new_order(ctx: &TurnContext<'_>, state: &mut ConversationState) -> String {
    let language = state.language;
    if state.requested_items.is_empty() {
        return replies::name_products(language);
    }

    let catalog = match ctx.commerce.list_products().await {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(error = %err, "catalog fetch failed during order");
            return replies::try_again(language);
        }
    };
    if catalog.is_empty() {
        return replies::no_products_available(language);
    }

    let mut step = ProductMatchStep {
        inference: ctx.inference,
        requested: &state.requested_items,
        catalog: &catalog,
    };
    let entries = match run_bounded(&mut step, ctx.max_attempts).await {
        LoopOutcome::Settled(entries) | LoopOutcome::SettledWithCaveat(entries, _) => entries,
        LoopOutcome::Failed(failure) => {
            warn!(
                attempts = failure.attempts,
                last_error = %failure.last_error,
                "product matching exhausted, falling back to direct resolution"
            );
            resolve(&state.requested_items, &catalog, ctx.similarity_threshold)
                .iter()
                .filter_map(|m| m.entry().cloned())
                .collect()
        }
    };

    if entries.is_empty() {
        return replies::products_not_found(language);
    }

    let names: Vec<String> = entries.iter().map(|p| p.name.clone()).collect();
    state.requested_items = names.clone();

    // A counterparty with a stored address orders in one turn; the address
    // slot is only opened when there is nothing on file.
    let stored_address = {
        let mut users = ctx.users.lock().await;
        match users.get_or_create(ctx.counterparty_id, ctx.display_name) {
            Ok(profile) => profile.address.filter(|a| !a.trim().is_empty()),
            Err(err) => {
                warn!(error = %err, "user lookup failed, asking for an address");
                None
            }
        }
    };
    if let Some(address) = stored_address {
        return place_order(ctx, state, &entries, &address).await;
    }

    state.pending_step = Some(PendingStep::AwaitingAddress);
    generated_reply(
        ctx.inference,
        &prompts::address_request_reply(language, &names),
        replies::ask_address(language, &names),
    )
    .await
}

/// An order attempt completes here, successfully or terminally; either way
/// the accumulated items and any open slot are cleared.
async fn place_order(
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    entries: &[CatalogEntry],
    address: &str,
) -> String {
    let language = state.language;
    let names: Vec<String> = entries.iter().map(|p| p.name.clone()).collect();
    let customer = CustomerInfo {
        name: ctx.display_name.to_string(),
        phone: ctx.counterparty_id.to_string(),
        address: address.to_string(),
    };

    let reply = match ctx.commerce.create_order(&customer, entries).await {
        Ok(receipt) => {
            if let Err(err) =
                ctx.users
                    .lock()
                    .await
                    .record_order(ctx.counterparty_id, &receipt.order_id, &names)
            {
                warn!(error = %err, "recording order interaction failed");
            }
            let reply = generated_reply(
                ctx.inference,
                &prompts::order_confirmation_reply(language, &names, &receipt.order_id, address),
                replies::order_confirmed(language, &names, &receipt.order_id, address),
            )
            .await;
            state.last_order_result = Some(receipt);
            reply
        }
        Err(err) => {
            warn!(error = %err, "order creation failed");
            replies::order_failed(language, &names)
        }
    };

    state.pending_step = None;
    state.requested_items.clear();
    state.pending_address = None;
    reply
}

/// Consumes the inbound message as the delivery address and places the order.
pub async fn address_capture(ctx: &TurnContext<'_>, state: &mut ConversationState) -> String {
    let language = state.language;

    if state.requested_items.is_empty() {
        state.pending_step = None;
        return replies::no_items_selected(language);
    }

    // Whatever the counterparty typed is the address; only an empty message
    // keeps the slot open for another try.
    let address = state.user_input.trim().to_string();
    if address.is_empty() {
        return replies::invalid_address(language, &state.requested_items);
    }
    state.pending_address = Some(address.clone());

    {
        let mut users = ctx.users.lock().await;
        if let Err(err) = users
            .get_or_create(ctx.counterparty_id, ctx.display_name)
            .and_then(|_| users.update_address(ctx.counterparty_id, &address))
        {
            warn!(error = %err, "persisting user address failed");
            return replies::try_again(language);
        }
    }

    let catalog = match ctx.commerce.list_products().await {
        Ok(catalog) => catalog,
        Err(err) => {
            warn!(error = %err, "catalog fetch failed during order placement");
            return replies::order_failed(language, &state.requested_items);
        }
    };
    let entries: Vec<CatalogEntry> = state
        .requested_items
        .iter()
        .filter_map(|name| {
            let lowered = name.to_lowercase();
            catalog.iter().find(|p| p.name.to_lowercase() == lowered)
        })
        .cloned()
        .collect();
    if entries.is_empty() {
        // These names matched the catalog when the slot was opened; if none
        // survive the re-check the products have gone away since.
        let names = std::mem::take(&mut state.requested_items);
        state.pending_step = None;
        state.pending_address = None;
        return replies::products_unavailable(language, &names);
    }

    place_order(ctx, state, &entries, &address).await
}

const ORDER_STATUSES: [&str; 4] = ["pending", "processing", "delivered", "cancelled"];
const MAX_ORDER_LIMIT: u32 = 50;

/// Turns the user's question into an executable order filter. A filter that
/// executes cleanly but matches nothing settles the loop; regeneration
/// cannot conjure orders that do not exist.
struct OrderFilterStep<'a> {
    inference: &'a dyn Inference,
    commerce: &'a dyn Commerce,
    counterparty_id: &'a str,
    question: &'a str,
}

#[async_trait::async_trait]
impl CorrectionStep for OrderFilterStep<'_> {
    type Candidate = OrderFilter;
    type Output = Vec<OrderSummary>;

    async fn generate(&mut self, last_error: Option<&str>) -> Result<OrderFilter, String> {
        let prompt = prompts::order_filter(self.question, last_error);
        let raw = self.inference.complete(&prompt).await?;
        let doc = extract::fenced_json(&raw)
            .ok_or_else(|| "completion did not contain a fenced json filter".to_string())?;
        serde_json::from_value(doc).map_err(|e| format!("invalid filter: {e}"))
    }

    async fn assess(&mut self, candidate: OrderFilter) -> Verdict<Vec<OrderSummary>> {
        if let Some(status) = &candidate.status {
            if !ORDER_STATUSES.contains(&status.to_lowercase().as_str()) {
                return Verdict::Reject(format!(
                    "status '{status}' is not one of {}",
                    ORDER_STATUSES.join(", ")
                ));
            }
        }
        if let Some(limit) = candidate.limit {
            if limit == 0 || limit > MAX_ORDER_LIMIT {
                return Verdict::Reject(format!("limit must be between 1 and {MAX_ORDER_LIMIT}"));
            }
        }
        match self
            .commerce
            .list_orders(self.counterparty_id, &candidate)
            .await
        {
            Ok(orders) if orders.is_empty() => {
                Verdict::AcceptWithCaveat(orders, "filter matched no orders".to_string())
            }
            Ok(orders) => Verdict::Accept(orders),
            Err(err) => Verdict::Reject(err),
        }
    }
}

pub async fn retrieve_orders(ctx: &TurnContext<'_>, state: &ConversationState) -> String {
    let language = state.language;
    let mut step = OrderFilterStep {
        inference: ctx.inference,
        commerce: ctx.commerce,
        counterparty_id: ctx.counterparty_id,
        question: &state.user_input,
    };
    match run_bounded(&mut step, ctx.max_attempts).await {
        LoopOutcome::Settled(orders) if !orders.is_empty() => {
            let rendered = render_orders(&orders);
            generated_reply(
                ctx.inference,
                &prompts::orders_list_reply(language, &rendered),
                replies::orders_list(language, &rendered),
            )
            .await
        }
        LoopOutcome::Settled(_) | LoopOutcome::SettledWithCaveat(_, _) => {
            generated_reply(
                ctx.inference,
                &prompts::no_orders_reply(language),
                replies::no_orders(language),
            )
            .await
        }
        LoopOutcome::Failed(failure) => {
            warn!(
                attempts = failure.attempts,
                last_error = %failure.last_error,
                "order filter generation exhausted"
            );
            replies::try_again(language)
        }
    }
}

fn render_orders(orders: &[OrderSummary]) -> String {
    orders
        .iter()
        .map(|o| {
            format!(
                "- Order ID: {}, Items: {}, Status: {}",
                o.order_id,
                o.items.join(", "),
                o.status
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Issues are only accepted for products the counterparty actually ordered.
pub async fn report_issue(ctx: &TurnContext<'_>, state: &ConversationState) -> String {
    let language = state.language;
    let Some(product) = state.issue_product.clone().filter(|p| !p.trim().is_empty()) else {
        return generated_reply(
            ctx.inference,
            &prompts::issue_need_product_reply(language),
            replies::issue_need_product(language),
        )
        .await;
    };

    let filter = OrderFilter {
        limit: Some(MAX_ORDER_LIMIT),
        ..OrderFilter::default()
    };
    let orders = match ctx.commerce.list_orders(ctx.counterparty_id, &filter).await {
        Ok(orders) => orders,
        Err(err) => {
            warn!(error = %err, "order lookup failed during issue report");
            return replies::try_again(language);
        }
    };

    let needle = product.to_lowercase();
    let has_ordered = orders.iter().any(|order| {
        order
            .items
            .iter()
            .any(|item| item.to_lowercase().contains(&needle))
    });
    if !has_ordered {
        return generated_reply(
            ctx.inference,
            &prompts::issue_not_ordered_reply(language, &product),
            replies::issue_not_ordered(language, &product),
        )
        .await;
    }

    let category = match ctx
        .inference
        .complete(&prompts::issue_category(&state.user_input))
        .await
    {
        Ok(raw) => extract::category(&raw),
        Err(err) => {
            warn!(error = %err, "issue categorization failed, recording as other");
            souk_contracts::IssueCategory::Other
        }
    };

    let receipt = {
        let mut users = ctx.users.lock().await;
        users
            .get_or_create(ctx.counterparty_id, ctx.display_name)
            .and_then(|_| {
                users.record_issue(ctx.counterparty_id, &product, &state.user_input, category)
            })
    };
    match receipt {
        Ok(receipt) => {
            generated_reply(
                ctx.inference,
                &prompts::issue_ack_reply(language, &product, &receipt.claim_id),
                replies::issue_recorded(language, &product, &receipt.claim_id),
            )
            .await
        }
        Err(err) => {
            warn!(error = %err, "recording issue claim failed");
            replies::try_again(language)
        }
    }
}
