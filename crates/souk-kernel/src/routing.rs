//! Turn routing. Two states: idle, awaiting an address. Once a multi-turn
//! flow is open it owns the next turn; the inbound message is consumed as
//! the awaited slot value and never re-classified.

use souk_contracts::{Intent, PendingStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AddressCapture,
    Greeting,
    ListProducts,
    NewOrder,
    RetrieveOrders,
    ReportIssue,
    Clarify,
}

pub fn route_turn(pending_step: Option<PendingStep>, intent: Intent) -> Route {
    if pending_step == Some(PendingStep::AwaitingAddress) {
        return Route::AddressCapture;
    }
    match intent {
        Intent::Greeting => Route::Greeting,
        Intent::ListProducts => Route::ListProducts,
        Intent::NewOrder => Route::NewOrder,
        Intent::RetrieveOrder => Route::RetrieveOrders,
        Intent::ReportIssue => Route::ReportIssue,
        Intent::None => Route::Clarify,
    }
}
