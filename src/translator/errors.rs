use thiserror::Error;

use crate::apis::GatewayKind;

/// Internal failures of a translation. Configuration problems never end up here; they are
/// recorded in the reports instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslatorError {
    #[error("route {0} reached conversion with a delegate action")]
    UnexpectedDelegateAction(String),
    #[error("no listener factory registered for {0:?} gateways")]
    MissingListenerFactory(GatewayKind),
}
